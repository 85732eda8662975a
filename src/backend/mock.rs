// Recording driver for tests
//
// Scripted physical devices, fabricated handles, injectable failures and a
// log of every create/destroy so ordering can be asserted.

use ash::vk::{self, Handle};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle, Win32WindowHandle, WindowsDisplayHandle};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::num::NonZeroIsize;
use std::rc::Rc;

use super::driver::{
    DeviceDesc, Driver, InstanceDesc, NativeHandle, PipelineDesc, RenderPassDesc, Resource, SwapchainDesc,
};
use super::shader::{ShaderKind, ShaderSource};
use super::swapchain::PREFERRED_FORMAT;
use crate::window::WindowSource;

/// Creation calls a failure can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Instance,
    DebugMessenger,
    Surface,
    Device,
    Swapchain,
    ImageView,
    ShaderModule,
    RenderPass,
    PipelineLayout,
    Pipeline,
}

impl Call {
    pub fn of(resource: &Resource) -> Self {
        match resource {
            Resource::Instance(_) => Call::Instance,
            Resource::DebugMessenger(_) => Call::DebugMessenger,
            Resource::Surface(_) => Call::Surface,
            Resource::Device(_) => Call::Device,
            Resource::Swapchain(_) => Call::Swapchain,
            Resource::ImageView(_) => Call::ImageView,
            Resource::ShaderModule(_) => Call::ShaderModule,
            Resource::RenderPass(_) => Call::RenderPass,
            Resource::PipelineLayout(_) => Call::PipelineLayout,
            Resource::Pipeline(_) => Call::Pipeline,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Created(Resource),
    Destroyed(Resource),
}

#[derive(Debug, Default)]
pub struct MockLog {
    pub events: Vec<Event>,
    pub instance_desc: Option<InstanceDesc>,
    pub device_desc: Option<DeviceDesc>,
    pub swapchain_desc: Option<SwapchainDesc>,
    pub render_pass_desc: Option<RenderPassDesc>,
    pub pipeline_desc: Option<PipelineDesc>,
}

impl MockLog {
    pub fn created(&self) -> Vec<Resource> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Created(r) => Some(*r),
                Event::Destroyed(_) => None,
            })
            .collect()
    }

    pub fn destroyed(&self) -> Vec<Resource> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Destroyed(r) => Some(*r),
                Event::Created(_) => None,
            })
            .collect()
    }

    pub fn created_of(&self, call: Call) -> Vec<Resource> {
        self.created().into_iter().filter(|r| Call::of(r) == call).collect()
    }

    /// Created and not yet destroyed, in creation order
    pub fn live(&self) -> Vec<Resource> {
        let destroyed = self.destroyed();
        self.created().into_iter().filter(|r| !destroyed.contains(r)).collect()
    }
}

/// One scripted physical device
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub name: String,
    /// Capability flags and surface support, per family index
    pub queue_families: Vec<(vk::QueueFlags, bool)>,
    pub extensions: Vec<String>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl MockDevice {
    /// One family doing graphics and presentation, swapchain support,
    /// BGRA8/sRGB and FIFO, fixed 800x600 surface
    pub fn adequate(name: &str) -> Self {
        Self {
            name: name.to_string(),
            queue_families: vec![(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, true)],
            extensions: vec!["VK_KHR_swapchain".to_string()],
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                current_extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![PREFERRED_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    pub fn with_queue_families(mut self, families: &[(vk::QueueFlags, bool)]) -> Self {
        self.queue_families = families.to_vec();
        self
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_formats(mut self, formats: &[vk::SurfaceFormatKHR]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    pub fn with_present_modes(mut self, present_modes: &[vk::PresentModeKHR]) -> Self {
        self.present_modes = present_modes.to_vec();
        self
    }

    pub fn with_capabilities(mut self, capabilities: vk::SurfaceCapabilitiesKHR) -> Self {
        self.capabilities = capabilities;
        self
    }
}

pub struct MockDriver {
    pub layers: Vec<String>,
    pub instance_extensions: Vec<String>,
    pub devices: Vec<MockDevice>,
    fail: Option<(Call, usize)>,
    calls: HashMap<Call, usize>,
    next_handle: Cell<u64>,
    support_queries: Cell<usize>,
    log: Rc<RefCell<MockLog>>,
}

const INJECTED: vk::Result = vk::Result::ERROR_INITIALIZATION_FAILED;

impl MockDriver {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        let instance_extensions = [
            "VK_KHR_surface",
            "VK_KHR_win32_surface",
            "VK_KHR_xlib_surface",
            "VK_KHR_xcb_surface",
            "VK_KHR_wayland_surface",
            "VK_EXT_debug_utils",
        ];

        Self {
            layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            instance_extensions: instance_extensions.iter().map(|e| e.to_string()).collect(),
            devices,
            fail: None,
            calls: HashMap::new(),
            next_handle: Cell::new(0x100),
            support_queries: Cell::new(0),
            log: Rc::default(),
        }
    }

    /// Reject the first call of this kind
    pub fn fail_on(self, call: Call) -> Self {
        self.fail_on_nth(call, 0)
    }

    /// Reject the `n`th (zero-based) call of this kind
    pub fn fail_on_nth(mut self, call: Call, n: usize) -> Self {
        self.fail = Some((call, n));
        self
    }

    pub fn log(&self) -> Rc<RefCell<MockLog>> {
        self.log.clone()
    }

    pub fn support_queries(&self) -> usize {
        self.support_queries.get()
    }

    fn handle<H: Handle>(&self) -> H {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        H::from_raw(raw)
    }

    fn device(&self, physical_device: vk::PhysicalDevice) -> &MockDevice {
        &self.devices[physical_device.as_raw() as usize - 1]
    }

    fn create<H: Handle + Copy>(&mut self, call: Call, wrap: fn(H) -> Resource) -> Result<H, vk::Result> {
        let count = self.calls.entry(call).or_insert(0);
        let nth = *count;
        *count += 1;
        if self.fail == Some((call, nth)) {
            return Err(INJECTED);
        }

        let handle: H = self.handle();
        self.log.borrow_mut().events.push(Event::Created(wrap(handle)));
        Ok(handle)
    }
}

impl Driver for MockDriver {
    fn instance_layers(&self) -> Result<Vec<String>, vk::Result> {
        Ok(self.layers.clone())
    }

    fn instance_extensions(&self) -> Result<Vec<String>, vk::Result> {
        Ok(self.instance_extensions.clone())
    }

    fn create_instance(&mut self, desc: &InstanceDesc) -> Result<vk::Instance, vk::Result> {
        self.log.borrow_mut().instance_desc = Some(desc.clone());
        self.create(Call::Instance, Resource::Instance)
    }

    fn create_debug_messenger(&mut self) -> Result<vk::DebugUtilsMessengerEXT, vk::Result> {
        self.create(Call::DebugMessenger, Resource::DebugMessenger)
    }

    fn create_surface(&mut self, _target: NativeHandle) -> Result<vk::SurfaceKHR, vk::Result> {
        self.create(Call::Surface, Resource::Surface)
    }

    fn enumerate_physical_devices(&self) -> Result<Vec<vk::PhysicalDevice>, vk::Result> {
        Ok((1..=self.devices.len() as u64).map(vk::PhysicalDevice::from_raw).collect())
    }

    fn device_name(&self, physical_device: vk::PhysicalDevice) -> String {
        self.device(physical_device).name.clone()
    }

    fn queue_families(&self, physical_device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        self.device(physical_device)
            .queue_families
            .iter()
            .map(|&(queue_flags, _)| vk::QueueFamilyProperties {
                queue_flags,
                queue_count: 1,
                ..Default::default()
            })
            .collect()
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        family: u32,
        _surface: vk::SurfaceKHR,
    ) -> Result<bool, vk::Result> {
        self.support_queries.set(self.support_queries.get() + 1);
        Ok(self.device(physical_device).queue_families[family as usize].1)
    }

    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<String>, vk::Result> {
        Ok(self.device(physical_device).extensions.clone())
    }

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR, vk::Result> {
        Ok(self.device(physical_device).capabilities)
    }

    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, vk::Result> {
        Ok(self.device(physical_device).formats.clone())
    }

    fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::PresentModeKHR>, vk::Result> {
        Ok(self.device(physical_device).present_modes.clone())
    }

    fn create_device(
        &mut self,
        _physical_device: vk::PhysicalDevice,
        desc: &DeviceDesc,
    ) -> Result<vk::Device, vk::Result> {
        self.log.borrow_mut().device_desc = Some(desc.clone());
        self.create(Call::Device, Resource::Device)
    }

    fn device_queue(&self, family: u32, index: u32) -> vk::Queue {
        vk::Queue::from_raw(0x1_0000 + u64::from(family) * 16 + u64::from(index))
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR, vk::Result> {
        self.log.borrow_mut().swapchain_desc = Some(*desc);
        self.create(Call::Swapchain, Resource::Swapchain)
    }

    fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>, vk::Result> {
        let count = self.log.borrow().swapchain_desc.map_or(0, |d| d.image_count);
        Ok((0..count).map(|_| self.handle()).collect())
    }

    fn create_image_view(&mut self, _image: vk::Image, _format: vk::Format) -> Result<vk::ImageView, vk::Result> {
        self.create(Call::ImageView, Resource::ImageView)
    }

    fn create_shader_module(&mut self, _code: &[u32]) -> Result<vk::ShaderModule, vk::Result> {
        self.create(Call::ShaderModule, Resource::ShaderModule)
    }

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<vk::RenderPass, vk::Result> {
        self.log.borrow_mut().render_pass_desc = Some(*desc);
        self.create(Call::RenderPass, Resource::RenderPass)
    }

    fn create_pipeline_layout(&mut self) -> Result<vk::PipelineLayout, vk::Result> {
        self.create(Call::PipelineLayout, Resource::PipelineLayout)
    }

    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> Result<vk::Pipeline, vk::Result> {
        self.log.borrow_mut().pipeline_desc = Some(desc.clone());
        self.create(Call::Pipeline, Resource::Pipeline)
    }

    fn wait_idle(&self) -> Result<(), vk::Result> {
        Ok(())
    }

    fn destroy(&mut self, resource: Resource) {
        let mut log = self.log.borrow_mut();
        assert!(
            log.live().contains(&resource),
            "destroying {:?}, which is not live",
            resource
        );
        log.events.push(Event::Destroyed(resource));
    }
}

/// In-memory SPIR-V by name and stage
#[derive(Debug, Default)]
pub struct MemoryShaders {
    shaders: Vec<(String, ShaderKind, Vec<u32>)>,
}

impl MemoryShaders {
    pub fn triangle() -> Self {
        Self {
            shaders: vec![
                ("triangle".to_string(), ShaderKind::Vertex, vec![0x0723_0203, 1]),
                ("triangle".to_string(), ShaderKind::Fragment, vec![0x0723_0203, 2]),
            ],
        }
    }
}

impl ShaderSource for MemoryShaders {
    fn load(&self, name: &str, kind: ShaderKind) -> io::Result<Vec<u32>> {
        self.shaders
            .iter()
            .find(|(n, k, _)| n == name && *k == kind)
            .map(|(_, _, words)| words.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{}.{}", name, kind.extension())))
    }
}

/// Scripted window: a drawable size, queued resizes and a close after N polls
#[derive(Debug)]
pub struct FakeWindow {
    pub size: (u32, u32),
    pub resizes: Vec<(u32, u32)>,
    pending: Option<(u32, u32)>,
    pub polls: usize,
    pub close_after: usize,
}

impl FakeWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            resizes: Vec::new(),
            pending: None,
            polls: 0,
            close_after: 1,
        }
    }
}

impl WindowSource for FakeWindow {
    fn native_handle(&self) -> Result<NativeHandle, raw_window_handle::HandleError> {
        let hwnd = NonZeroIsize::new(1).ok_or(raw_window_handle::HandleError::Unavailable)?;
        Ok(NativeHandle {
            display: RawDisplayHandle::Windows(WindowsDisplayHandle::new()),
            window: RawWindowHandle::Win32(Win32WindowHandle::new(hwnd)),
        })
    }

    fn current_drawable_size(&mut self) -> (u32, u32) {
        match self.pending.take() {
            Some(size) => size,
            None => self.size,
        }
    }

    fn has_resized(&self) -> bool {
        self.pending.is_some()
    }

    fn poll_events(&mut self) {
        self.polls += 1;
        // A burst collapses to the latest size
        if let Some(&last) = self.resizes.last() {
            self.size = last;
            self.pending = Some(last);
            self.resizes.clear();
        }
    }

    fn should_close(&self) -> bool {
        self.polls >= self.close_after
    }
}
