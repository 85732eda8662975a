// Vulkan driver - ash implementation of the Driver seam
//
// Owns the loader entry and the ash dispatch tables (instance, device and
// extension loaders). Raw handles go out to the caller; the tables stay
// here until the matching Instance/Device resource is destroyed.

use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr::{self, NonNull};

use super::driver::{
    DeviceDesc, Driver, InstanceDesc, NativeHandle, PipelineDesc, RenderPassDesc, Resource,
    Sharing, SwapchainDesc,
};
use super::error::BringUpError;
use super::instance::debug_messenger_info;

const ENGINE_NAME: &CStr = c"No Engine";

/// Returned when a call needs a dispatch table that was never created
const NOT_READY: vk::Result = vk::Result::ERROR_INITIALIZATION_FAILED;

pub struct AshDriver {
    entry: Entry,
    instance: Option<ash::Instance>,
    debug_utils: Option<DebugUtils>,
    surface_loader: Option<khr::Surface>,
    device: Option<ash::Device>,
    swapchain_loader: Option<khr::Swapchain>,
}

impl AshDriver {
    /// Load the system Vulkan library
    pub fn load() -> Result<Self, BringUpError> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| BringUpError::LoaderUnavailable(e.to_string()))?;

        Ok(Self {
            entry,
            instance: None,
            debug_utils: None,
            surface_loader: None,
            device: None,
            swapchain_loader: None,
        })
    }

    fn instance(&self) -> Result<&ash::Instance, vk::Result> {
        self.instance.as_ref().ok_or(NOT_READY)
    }

    fn device(&self) -> Result<&ash::Device, vk::Result> {
        self.device.as_ref().ok_or(NOT_READY)
    }

    fn surface_loader(&self) -> Result<&khr::Surface, vk::Result> {
        self.surface_loader.as_ref().ok_or(NOT_READY)
    }
}

fn names(properties: &[vk::ExtensionProperties]) -> Vec<String> {
    properties
        .iter()
        .map(|p| unsafe { CStr::from_ptr(p.extension_name.as_ptr()) }.to_string_lossy().into_owned())
        .collect()
}

fn pointers(strings: &[CString]) -> Vec<*const c_char> {
    strings.iter().map(|s| s.as_ptr()).collect()
}

impl Driver for AshDriver {
    fn instance_layers(&self) -> Result<Vec<String>, vk::Result> {
        let layers = self.entry.enumerate_instance_layer_properties()?;
        Ok(layers
            .iter()
            .map(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) }.to_string_lossy().into_owned())
            .collect())
    }

    fn instance_extensions(&self) -> Result<Vec<String>, vk::Result> {
        let extensions = self.entry.enumerate_instance_extension_properties(None)?;
        Ok(names(&extensions))
    }

    fn create_instance(&mut self, desc: &InstanceDesc) -> Result<vk::Instance, vk::Result> {
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&desc.app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let extensions = pointers(&desc.extensions);
        let layers = pointers(&desc.layers);

        // Covers messages emitted by vkCreateInstance/vkDestroyInstance themselves
        let mut debug_info = debug_messenger_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        if desc.diagnostics {
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance = unsafe { self.entry.create_instance(&create_info, None) }?;
        let handle = instance.handle();

        self.surface_loader = Some(khr::Surface::new(&self.entry, &instance));
        self.instance = Some(instance);
        Ok(handle)
    }

    fn create_debug_messenger(&mut self) -> Result<vk::DebugUtilsMessengerEXT, vk::Result> {
        let debug_utils = DebugUtils::new(&self.entry, self.instance()?);
        let create_info = debug_messenger_info();

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?;
        self.debug_utils = Some(debug_utils);
        Ok(messenger)
    }

    fn create_surface(&mut self, target: NativeHandle) -> Result<vk::SurfaceKHR, vk::Result> {
        let entry = &self.entry;
        let instance = self.instance()?;

        unsafe {
            match (target.display, target.window) {
                (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
                    let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const c_void;
                    let hwnd = handle.hwnd.get() as *const c_void;
                    let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                        .hinstance(hinstance)
                        .hwnd(hwnd);
                    khr::Win32Surface::new(entry, instance).create_win32_surface(&create_info, None)
                }
                (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
                    let dpy = display.display.map_or(ptr::null_mut(), NonNull::as_ptr);
                    let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                        .dpy(dpy.cast())
                        .window(window.window);
                    khr::XlibSurface::new(entry, instance).create_xlib_surface(&create_info, None)
                }
                (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(window)) => {
                    let connection = display.connection.map_or(ptr::null_mut(), NonNull::as_ptr);
                    let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                        .connection(connection.cast())
                        .window(window.window.get());
                    khr::XcbSurface::new(entry, instance).create_xcb_surface(&create_info, None)
                }
                (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
                    let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                        .display(display.display.as_ptr().cast())
                        .surface(window.surface.as_ptr().cast());
                    khr::WaylandSurface::new(entry, instance).create_wayland_surface(&create_info, None)
                }
                _ => Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT),
            }
        }
    }

    fn enumerate_physical_devices(&self) -> Result<Vec<vk::PhysicalDevice>, vk::Result> {
        unsafe { self.instance()?.enumerate_physical_devices() }
    }

    fn device_name(&self, physical_device: vk::PhysicalDevice) -> String {
        let Ok(instance) = self.instance() else {
            return String::new();
        };
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        name.to_string_lossy().into_owned()
    }

    fn queue_families(&self, physical_device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        match self.instance() {
            Ok(instance) => unsafe { instance.get_physical_device_queue_family_properties(physical_device) },
            Err(_) => Vec::new(),
        }
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> Result<bool, vk::Result> {
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_support(physical_device, family, surface)
        }
    }

    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<String>, vk::Result> {
        let extensions = unsafe { self.instance()?.enumerate_device_extension_properties(physical_device) }?;
        Ok(names(&extensions))
    }

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR, vk::Result> {
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_capabilities(physical_device, surface)
        }
    }

    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, vk::Result> {
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_formats(physical_device, surface)
        }
    }

    fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::PresentModeKHR>, vk::Result> {
        unsafe {
            self.surface_loader()?
                .get_physical_device_surface_present_modes(physical_device, surface)
        }
    }

    fn create_device(
        &mut self,
        physical_device: vk::PhysicalDevice,
        desc: &DeviceDesc,
    ) -> Result<vk::Device, vk::Result> {
        let instance = self.instance()?;

        let priorities = [desc.queue_priority];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = desc
            .queue_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions = pointers(&desc.extensions);
        let layers = pointers(&desc.layers);
        let features = vk::PhysicalDeviceFeatures::default();

        // Device layers are ignored by current loaders but still read by old ones
        #[allow(deprecated)]
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }?;
        let handle = device.handle();
        let swapchain_loader = khr::Swapchain::new(instance, &device);

        self.swapchain_loader = Some(swapchain_loader);
        self.device = Some(device);
        Ok(handle)
    }

    fn device_queue(&self, family: u32, index: u32) -> vk::Queue {
        match self.device() {
            Ok(device) => unsafe { device.get_device_queue(family, index) },
            Err(_) => vk::Queue::null(),
        }
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR, vk::Result> {
        let loader = self.swapchain_loader.as_ref().ok_or(NOT_READY)?;

        let (sharing_mode, family_indices): (vk::SharingMode, &[u32]) = match &desc.sharing {
            Sharing::Exclusive => (vk::SharingMode::EXCLUSIVE, &[]),
            Sharing::Concurrent(indices) => (vk::SharingMode::CONCURRENT, indices.as_slice()),
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(desc.surface)
            .min_image_count(desc.image_count)
            .image_format(desc.format.format)
            .image_color_space(desc.format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        unsafe { loader.create_swapchain(&create_info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>, vk::Result> {
        let loader = self.swapchain_loader.as_ref().ok_or(NOT_READY)?;
        unsafe { loader.get_swapchain_images(swapchain) }
    }

    fn create_image_view(&mut self, image: vk::Image, format: vk::Format) -> Result<vk::ImageView, vk::Result> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe { self.device()?.create_image_view(&create_info, None) }
    }

    fn create_shader_module(&mut self, code: &[u32]) -> Result<vk::ShaderModule, vk::Result> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.device()?.create_shader_module(&create_info, None) }
    }

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<vk::RenderPass, vk::Result> {
        let color_attachment = vk::AttachmentDescription::builder()
            .format(desc.format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(desc.load_op)
            .store_op(desc.store_op)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(desc.initial_layout)
            .final_layout(desc.final_layout)
            .build();

        let color_attachment_ref = vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build();

        let color_attachments = &[color_attachment_ref];
        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(color_attachments)
            .build();

        let attachments = &[color_attachment];
        let subpasses = &[subpass];
        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(attachments)
            .subpasses(subpasses);

        unsafe { self.device()?.create_render_pass(&render_pass_info, None) }
    }

    fn create_pipeline_layout(&mut self) -> Result<vk::PipelineLayout, vk::Result> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        unsafe { self.device()?.create_pipeline_layout(&layout_info, None) }
    }

    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> Result<vk::Pipeline, vk::Result> {
        let device = self.device()?;

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
            .stages
            .iter()
            .map(|stage| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.stage)
                    .module(stage.module)
                    .name(desc.entry_point)
                    .build()
            })
            .collect();

        // Geometry comes from gl_VertexIndex, nothing is bound
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(desc.topology)
            .primitive_restart_enable(false);

        let viewport = vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(desc.extent.width as f32)
            .height(desc.extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0)
            .build();

        let scissor = vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(desc.extent)
            .build();

        let viewports = &[viewport];
        let scissors = &[scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(viewports)
            .scissors(scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(desc.polygon_mode)
            .line_width(1.0)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_test)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(desc.color_write_mask)
            .blend_enable(desc.blend_enable)
            .build();

        let color_blend_attachments = &[color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| e)?
        };

        pipelines.into_iter().next().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn wait_idle(&self) -> Result<(), vk::Result> {
        match &self.device {
            Some(device) => unsafe { device.device_wait_idle() },
            None => Ok(()),
        }
    }

    fn destroy(&mut self, resource: Resource) {
        unsafe {
            match resource {
                Resource::Instance(_) => {
                    self.surface_loader = None;
                    if let Some(instance) = self.instance.take() {
                        instance.destroy_instance(None);
                    }
                }
                Resource::DebugMessenger(messenger) => {
                    if let Some(debug_utils) = self.debug_utils.take() {
                        debug_utils.destroy_debug_utils_messenger(messenger, None);
                    }
                }
                Resource::Surface(surface) => {
                    if let Some(loader) = &self.surface_loader {
                        loader.destroy_surface(surface, None);
                    }
                }
                Resource::Device(_) => {
                    self.swapchain_loader = None;
                    if let Some(device) = self.device.take() {
                        device.destroy_device(None);
                    }
                }
                Resource::Swapchain(swapchain) => {
                    if let Some(loader) = &self.swapchain_loader {
                        loader.destroy_swapchain(swapchain, None);
                    }
                }
                Resource::ImageView(view) => {
                    if let Some(device) = &self.device {
                        device.destroy_image_view(view, None);
                    }
                }
                Resource::ShaderModule(module) => {
                    if let Some(device) = &self.device {
                        device.destroy_shader_module(module, None);
                    }
                }
                Resource::RenderPass(render_pass) => {
                    if let Some(device) = &self.device {
                        device.destroy_render_pass(render_pass, None);
                    }
                }
                Resource::PipelineLayout(layout) => {
                    if let Some(device) = &self.device {
                        device.destroy_pipeline_layout(layout, None);
                    }
                }
                Resource::Pipeline(pipeline) => {
                    if let Some(device) = &self.device {
                        device.destroy_pipeline(pipeline, None);
                    }
                }
            }
        }
    }
}
