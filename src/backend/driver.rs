// Driver - the seam between bring-up logic and the graphics API
//
// Bring-up code decides WHAT to create; a Driver knows HOW to issue the call.
// Builders hand the driver plain descriptors (no raw pointers), the driver
// returns plain handles. Every owned handle is named by a `Resource` so the
// lifecycle controller can release it later without knowing its type.

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{CStr, CString};

/// Native window handles a surface is bound to
#[derive(Debug, Clone, Copy)]
pub struct NativeHandle {
    pub display: RawDisplayHandle,
    pub window: RawWindowHandle,
}

/// One owned API handle, destroyed with `Driver::destroy`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Instance(vk::Instance),
    DebugMessenger(vk::DebugUtilsMessengerEXT),
    Surface(vk::SurfaceKHR),
    Device(vk::Device),
    Swapchain(vk::SwapchainKHR),
    ImageView(vk::ImageView),
    ShaderModule(vk::ShaderModule),
    RenderPass(vk::RenderPass),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
}

#[derive(Debug, Clone)]
pub struct InstanceDesc {
    pub app_name: CString,
    pub extensions: Vec<CString>,
    pub layers: Vec<CString>,
    /// Chain a debug messenger into instance creation
    pub diagnostics: bool,
}

#[derive(Debug, Clone)]
pub struct DeviceDesc {
    /// Unique queue family indices, one queue each
    pub queue_families: Vec<u32>,
    pub queue_priority: f32,
    pub extensions: Vec<CString>,
    pub layers: Vec<CString>,
}

/// How swapchain images are shared between queue families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharing {
    Exclusive,
    Concurrent([u32; 2]),
}

#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub sharing: Sharing,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPassDesc {
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderStageDesc {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
}

#[derive(Debug, Clone)]
pub struct PipelineDesc {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub stages: Vec<ShaderStageDesc>,
    pub entry_point: &'static CStr,
    pub topology: vk::PrimitiveTopology,
    pub extent: vk::Extent2D,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub blend_enable: bool,
    pub color_write_mask: vk::ColorComponentFlags,
}

/// Low-level graphics API calls used during bring-up.
///
/// Queries take `&self` and never mutate. Creation calls either return a
/// handle the caller now owns or the raw API result that rejected them.
pub trait Driver {
    fn instance_layers(&self) -> Result<Vec<String>, vk::Result>;
    fn instance_extensions(&self) -> Result<Vec<String>, vk::Result>;
    fn create_instance(&mut self, desc: &InstanceDesc) -> Result<vk::Instance, vk::Result>;
    fn create_debug_messenger(&mut self) -> Result<vk::DebugUtilsMessengerEXT, vk::Result>;
    fn create_surface(&mut self, target: NativeHandle) -> Result<vk::SurfaceKHR, vk::Result>;

    fn enumerate_physical_devices(&self) -> Result<Vec<vk::PhysicalDevice>, vk::Result>;
    fn device_name(&self, physical_device: vk::PhysicalDevice) -> String;
    fn queue_families(&self, physical_device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;
    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> Result<bool, vk::Result>;
    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<String>, vk::Result>;
    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR, vk::Result>;
    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, vk::Result>;
    fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::PresentModeKHR>, vk::Result>;

    fn create_device(
        &mut self,
        physical_device: vk::PhysicalDevice,
        desc: &DeviceDesc,
    ) -> Result<vk::Device, vk::Result>;
    fn device_queue(&self, family: u32, index: u32) -> vk::Queue;

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR, vk::Result>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>, vk::Result>;
    fn create_image_view(&mut self, image: vk::Image, format: vk::Format) -> Result<vk::ImageView, vk::Result>;

    fn create_shader_module(&mut self, code: &[u32]) -> Result<vk::ShaderModule, vk::Result>;
    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<vk::RenderPass, vk::Result>;
    fn create_pipeline_layout(&mut self) -> Result<vk::PipelineLayout, vk::Result>;
    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> Result<vk::Pipeline, vk::Result>;

    /// Wait until the device has no work in flight. No-op without a device.
    fn wait_idle(&self) -> Result<(), vk::Result>;

    /// Release one handle. Must tolerate handles whose parent is already gone.
    fn destroy(&mut self, resource: Resource);
}
