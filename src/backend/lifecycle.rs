// Lifecycle controller
//
// Drives bring-up through its fixed sequence of steps and owns everything
// that sequence creates. Owned handles sit on a release ledger in creation
// order; teardown pops it, so release order is always the exact reverse of
// creation no matter where bring-up stopped.

use ash::vk;
use std::fmt;
use std::thread;
use std::time::Duration;

use super::device::{create_logical_device, select_physical_device, LogicalDevice, SelectedDevice};
use super::driver::{Driver, Resource};
use super::error::{BringUpError, Result, Stage};
use super::instance::{create_context, Context, ContextConfig};
use super::pipeline::{assemble_pipeline, GraphicsPipeline};
use super::query::query_surface_support;
use super::shader::ShaderSource;
use super::surface::bind_surface;
use super::swapchain::{create_swapchain, negotiate_swapchain, Swapchain};
use crate::window::WindowSource;

/// LIFO record of owned handles
#[derive(Debug, Default)]
pub struct ReleaseStack {
    entries: Vec<Resource>,
}

impl ReleaseStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resource: Resource) {
        self.entries.push(resource);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first
    #[cfg(test)]
    pub fn entries(&self) -> &[Resource] {
        &self.entries
    }

    /// Checkpoint to release back to later
    pub fn mark(&self) -> usize {
        self.entries.len()
    }

    /// Destroy everything pushed after `mark`, newest first
    pub fn release_to<D: Driver + ?Sized>(&mut self, driver: &mut D, mark: usize) {
        while self.entries.len() > mark {
            if let Some(resource) = self.entries.pop() {
                log::debug!("Releasing {:?}", resource);
                driver.destroy(resource);
            }
        }
    }

    pub fn release_all<D: Driver + ?Sized>(&mut self, driver: &mut D) {
        self.release_to(driver, 0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    SurfaceReady,
    DeviceReady,
    SwapchainReady,
    PipelineReady,
    Running,
    TornDown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Owns the driver and everything brought up on it
pub struct Lifecycle<D: Driver> {
    driver: D,
    config: ContextConfig,
    shader_name: String,
    state: LifecycleState,
    ledger: ReleaseStack,
    /// Ledger height once the logical device exists; resize releases back to it
    device_mark: usize,
    context: Option<Context>,
    surface: Option<vk::SurfaceKHR>,
    selected: Option<SelectedDevice>,
    device: Option<LogicalDevice>,
    swapchain: Option<Swapchain>,
    pipeline: Option<GraphicsPipeline>,
}

impl<D: Driver> Lifecycle<D> {
    pub fn new(driver: D, config: ContextConfig, shader_name: impl Into<String>) -> Self {
        Self {
            driver,
            config,
            shader_name: shader_name.into(),
            state: LifecycleState::Uninitialized,
            ledger: ReleaseStack::new(),
            device_mark: 0,
            context: None,
            surface: None,
            selected: None,
            device: None,
            swapchain: None,
            pipeline: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn selected_device(&self) -> Option<&SelectedDevice> {
        self.selected.as_ref()
    }

    #[cfg(test)]
    pub fn device(&self) -> Option<&LogicalDevice> {
        self.device.as_ref()
    }

    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.swapchain.as_ref()
    }

    #[cfg(test)]
    pub fn pipeline(&self) -> Option<&GraphicsPipeline> {
        self.pipeline.as_ref()
    }

    /// Run every creation step up to `PipelineReady`.
    ///
    /// On failure everything created so far is released before the error is
    /// returned, leaving the controller in `TornDown`. Calling it from any
    /// state but `Uninitialized` is an `InvalidState` error and changes nothing.
    pub fn bring_up<W, S>(&mut self, window: &mut W, shaders: &S) -> Result<()>
    where
        W: WindowSource + ?Sized,
        S: ShaderSource + ?Sized,
    {
        if self.state != LifecycleState::Uninitialized {
            return Err(BringUpError::InvalidState { operation: "bring-up", state: self.state });
        }

        self.try_bring_up(window, shaders).map_err(|err| {
            log::error!("Bring-up failed in state {}: {}", self.state, err);
            self.teardown();
            err
        })?;
        self.report();
        Ok(())
    }

    fn try_bring_up<W, S>(&mut self, window: &mut W, shaders: &S) -> Result<()>
    where
        W: WindowSource + ?Sized,
        S: ShaderSource + ?Sized,
    {
        let target = window.native_handle()?;

        let context = create_context(&mut self.driver, &self.config, target.display, &mut self.ledger)?;
        let layers = context.layers.clone();
        self.context = Some(context);
        let surface = bind_surface(&mut self.driver, target, &mut self.ledger)?;
        self.surface = Some(surface);
        self.transition(LifecycleState::SurfaceReady);

        let selected = select_physical_device(&self.driver, surface)?;
        let device = create_logical_device(&mut self.driver, &selected, &layers, &mut self.ledger)?;
        self.selected = Some(selected);
        self.device = Some(device);
        self.device_mark = self.ledger.mark();
        self.transition(LifecycleState::DeviceReady);

        self.build_presentation(window.current_drawable_size(), shaders)
    }

    /// Swapchain and pipeline for the current surface state
    fn build_presentation<S: ShaderSource + ?Sized>(&mut self, drawable: (u32, u32), shaders: &S) -> Result<()> {
        let (Some(surface), Some(selected)) = (self.surface, self.selected.as_ref()) else {
            return Err(BringUpError::InvalidState { operation: "swapchain creation", state: self.state });
        };
        let families = selected.families;

        let support = query_surface_support(&self.driver, selected.physical_device, surface)
            .map_err(|result| BringUpError::QueryFailed { stage: Stage::Swapchain, result })?;
        let params = negotiate_swapchain(&support, families, drawable)?;
        let swapchain = create_swapchain(&mut self.driver, surface, &params, &mut self.ledger)?;
        let (format, extent) = (swapchain.format.format, swapchain.extent);
        self.swapchain = Some(swapchain);
        self.transition(LifecycleState::SwapchainReady);

        let pipeline = assemble_pipeline(
            &mut self.driver,
            shaders,
            &self.shader_name,
            format,
            extent,
            &mut self.ledger,
        )?;
        self.pipeline = Some(pipeline);
        self.transition(LifecycleState::PipelineReady);
        Ok(())
    }

    /// Poll the window until it asks to close.
    ///
    /// No frames are submitted. A resize rebuilds the swapchain and pipeline;
    /// while the drawable has zero area the rebuild waits.
    pub fn run<W, S>(&mut self, window: &mut W, shaders: &S, idle: Duration) -> Result<()>
    where
        W: WindowSource + ?Sized,
        S: ShaderSource + ?Sized,
    {
        if self.state != LifecycleState::PipelineReady {
            return Err(BringUpError::InvalidState { operation: "run", state: self.state });
        }
        self.transition(LifecycleState::Running);

        let mut deferred = false;
        loop {
            window.poll_events();
            if window.should_close() {
                log::info!("Window closed, leaving frame loop");
                break;
            }

            if window.has_resized() || deferred {
                let (width, height) = window.current_drawable_size();
                if width == 0 || height == 0 {
                    deferred = true;
                } else {
                    deferred = false;
                    if let Err(err) = self.recreate_presentation((width, height), shaders) {
                        log::error!("Swapchain recreation failed: {}", err);
                        self.teardown();
                        return Err(err);
                    }
                }
            }

            if !idle.is_zero() {
                thread::sleep(idle);
            }
        }

        Ok(())
    }

    fn recreate_presentation<S: ShaderSource + ?Sized>(&mut self, drawable: (u32, u32), shaders: &S) -> Result<()> {
        log::info!("Recreating swapchain for {}x{}", drawable.0, drawable.1);

        self.driver
            .wait_idle()
            .map_err(|result| BringUpError::QueryFailed { stage: Stage::Swapchain, result })?;
        self.ledger.release_to(&mut self.driver, self.device_mark);
        self.pipeline = None;
        self.swapchain = None;
        self.state = LifecycleState::DeviceReady;

        self.build_presentation(drawable, shaders)?;
        self.transition(LifecycleState::Running);
        self.report();
        Ok(())
    }

    /// Log every handle currently held
    fn report(&self) {
        if let Some(context) = &self.context {
            log::debug!("Instance {:?}, debug messenger {:?}", context.instance, context.debug_messenger);
        }
        if let Some(selected) = &self.selected {
            log::info!("GPU: {}", selected.name);
        }
        if let Some(device) = &self.device {
            log::debug!(
                "Device {:?}: graphics queue {:?} (family {}), present queue {:?} (family {})",
                device.device,
                device.graphics_queue,
                device.families.graphics,
                device.present_queue,
                device.families.present
            );
        }
        if let Some(swapchain) = &self.swapchain {
            log::info!(
                "Swapchain {:?}: {}x{} {:?} {:?}, {:?} sharing, {} image(s)",
                swapchain.swapchain,
                swapchain.extent.width,
                swapchain.extent.height,
                swapchain.format.format,
                swapchain.present_mode,
                swapchain.sharing,
                swapchain.images.len()
            );
            for image in &swapchain.images {
                log::trace!("Image {:?} -> view {:?}", image.image, image.view);
            }
        }
        if let Some(pipeline) = &self.pipeline {
            log::debug!(
                "Render pass {:?}, layout {:?}, pipeline {:?}",
                pipeline.render_pass,
                pipeline.layout,
                pipeline.pipeline
            );
        }
    }

    /// Release everything in reverse creation order. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if self.state == LifecycleState::TornDown {
            return;
        }

        if !self.ledger.is_empty() {
            if let Err(result) = self.driver.wait_idle() {
                log::warn!("Device wait before teardown failed: {}", result);
            }
            log::info!("Releasing {} resource(s)", self.ledger.len());
            self.ledger.release_all(&mut self.driver);
        }

        self.pipeline = None;
        self.swapchain = None;
        self.device = None;
        self.selected = None;
        self.surface = None;
        self.context = None;
        self.transition(LifecycleState::TornDown);
    }

    fn transition(&mut self, next: LifecycleState) {
        log::info!("Lifecycle: {} -> {}", self.state, next);
        self.state = next;
    }
}

impl<D: Driver> Drop for Lifecycle<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}
