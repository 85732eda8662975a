// Platform window
//
// A winit window driven by pumping its event loop instead of handing control
// to it. Events reach the owning window through a registry keyed by WindowId.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use raw_window_handle::{HandleError, HasDisplayHandle, HasWindowHandle};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    error::{EventLoopError, OsError},
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

use crate::backend::NativeHandle;

/// What bring-up and the frame loop need from a window
pub trait WindowSource {
    fn native_handle(&self) -> Result<NativeHandle, HandleError>;

    /// Size of a pending resize, clearing it; otherwise the live size
    fn current_drawable_size(&mut self) -> (u32, u32);

    fn has_resized(&self) -> bool;

    /// Drain every pending platform event without blocking
    fn poll_events(&mut self);

    fn should_close(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("Failed to create event loop: {0}")]
    EventLoop(#[from] EventLoopError),

    #[error("Failed to create window: {0}")]
    Os(#[from] OsError),

    #[error("Event loop exited with code {0} before the window existed")]
    Exited(i32),
}

/// Event-side state of one window
#[derive(Debug, Default)]
pub struct WindowState {
    resized: Option<(u32, u32)>,
    close_requested: bool,
}

impl WindowState {
    /// Fold one event in. Later resizes overwrite earlier ones.
    pub fn record(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => self.close_requested = true,
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.resized = Some((size.width, size.height));
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, closing");
                    self.close_requested = true;
                }
            }
            _ => {}
        }
    }

    pub fn take_resize(&mut self) -> Option<(u32, u32)> {
        self.resized.take()
    }
}

type SharedState = Arc<Mutex<WindowState>>;

static REGISTRY: Lazy<Mutex<HashMap<WindowId, SharedState>>> = Lazy::new(Default::default);

fn register(id: WindowId, state: SharedState) {
    REGISTRY.lock().insert(id, state);
}

fn unregister(id: WindowId) {
    REGISTRY.lock().remove(&id);
}

fn lookup(id: WindowId) -> Option<SharedState> {
    REGISTRY.lock().get(&id).cloned()
}

/// Creates the window on the first `resumed`
struct Creator {
    attributes: Option<WindowAttributes>,
    result: Option<Result<Window, OsError>>,
}

impl ApplicationHandler for Creator {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(attributes) = self.attributes.take() {
            self.result = Some(event_loop.create_window(attributes));
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        Dispatcher::dispatch(id, &event);
    }
}

/// Routes events to whichever registered window they belong to
struct Dispatcher;

impl Dispatcher {
    fn dispatch(id: WindowId, event: &WindowEvent) {
        if let Some(state) = lookup(id) {
            state.lock().record(event);
        }
    }
}

impl ApplicationHandler for Dispatcher {
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {}

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        Self::dispatch(id, &event);
    }
}

pub struct PlatformWindow {
    event_loop: EventLoop<()>,
    window: Option<Window>,
    state: SharedState,
}

impl PlatformWindow {
    pub fn create(title: &str, width: u32, height: u32) -> Result<Self, WindowError> {
        let mut event_loop = EventLoop::new()?;
        let mut creator = Creator {
            attributes: Some(
                Window::default_attributes()
                    .with_title(title)
                    .with_inner_size(PhysicalSize::new(width, height)),
            ),
            result: None,
        };

        let window = loop {
            if let PumpStatus::Exit(code) = event_loop.pump_app_events(Some(Duration::ZERO), &mut creator) {
                return Err(WindowError::Exited(code));
            }
            if let Some(result) = creator.result.take() {
                break result?;
            }
        };

        let state = SharedState::default();
        register(window.id(), state.clone());
        log::info!("Created window '{}' ({}x{})", title, width, height);

        Ok(Self {
            event_loop,
            window: Some(window),
            state,
        })
    }

    /// Close the window. Safe to call more than once.
    pub fn destroy(&mut self) {
        if let Some(window) = self.window.take() {
            unregister(window.id());
            log::debug!("Destroyed window");
        }
        self.state.lock().close_requested = true;
    }
}

impl WindowSource for PlatformWindow {
    fn native_handle(&self) -> Result<NativeHandle, HandleError> {
        let window = self.window.as_ref().ok_or(HandleError::Unavailable)?;
        Ok(NativeHandle {
            display: window.display_handle()?.as_raw(),
            window: window.window_handle()?.as_raw(),
        })
    }

    fn current_drawable_size(&mut self) -> (u32, u32) {
        if let Some(size) = self.state.lock().take_resize() {
            return size;
        }
        self.window.as_ref().map_or((0, 0), |window| {
            let size = window.inner_size();
            (size.width, size.height)
        })
    }

    fn has_resized(&self) -> bool {
        self.state.lock().resized.is_some()
    }

    fn poll_events(&mut self) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut Dispatcher) {
            log::info!("Event loop exited with code {}", code);
            self.state.lock().close_requested = true;
        }
    }

    fn should_close(&self) -> bool {
        self.window.is_none() || self.state.lock().close_requested
    }
}

impl Drop for PlatformWindow {
    fn drop(&mut self) {
        self.destroy();
    }
}
