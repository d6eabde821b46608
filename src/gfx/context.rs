//! Instance and device bring-up: Vulkan instance, debug messenger, surface,
//! and the one-time physical-device selection.

use crate::gfx::error::{RenderError, SelectError};
use ash::{
    khr::{surface, swapchain},
    vk, Device, Entry, Instance,
};
use log::{debug, error, info, warn};
use std::ffi;
use winit::{
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::Window,
};

/// Result of device selection, fixed for the lifetime of the process.
/// Graphics and presentation may live on different queue families; both
/// indices are retained.
pub struct DeviceCaps {
    pub physical: vk::PhysicalDevice,
    pub graphics_family: u32,
    pub present_family: u32,
    pub features: vk::PhysicalDeviceFeatures,
}

impl DeviceCaps {
    /// Queue families to create, deduplicated: listing the same family twice
    /// in `DeviceCreateInfo` is invalid.
    pub fn unique_families(&self) -> Vec<u32> {
        if self.graphics_family == self.present_family {
            vec![self.graphics_family]
        } else {
            vec![self.graphics_family, self.present_family]
        }
    }
}

pub fn create_instance(entry: &Entry, window: &Window) -> Result<Instance, RenderError> {
    let app_info = vk::ApplicationInfo::default()
        .application_name(c"meshview")
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(c"No Engine")
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_3);

    let mut extension_names =
        ash_window::enumerate_required_extensions(window.display_handle()?.as_raw())?.to_vec();
    if cfg!(debug_assertions) {
        extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    let layers_names_raw: Vec<*const ffi::c_char> = if cfg!(debug_assertions) {
        vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
    } else {
        vec![]
    };

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layers_names_raw);

    unsafe { Ok(entry.create_instance(&create_info, None)?) }
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut ffi::c_void,
) -> vk::Bool32 {
    let message = unsafe { ffi::CStr::from_ptr((*p_callback_data).p_message) };
    let severity = format!("{:?}", message_severity).to_lowercase();
    let ty = format!("{:?}", message_type).to_lowercase();
    let log_message = format!("[vulkan_{}_{}] {}", severity, ty, message.to_string_lossy());

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("{}", log_message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("{}", log_message),
        _ => debug!("{}", log_message),
    }
    vk::FALSE
}

pub fn setup_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Result<(Option<ash::ext::debug_utils::Instance>, Option<vk::DebugUtilsMessengerEXT>), vk::Result>
{
    if !cfg!(debug_assertions) {
        return Ok((None, None));
    }
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback));
    let loader = ash::ext::debug_utils::Instance::new(entry, instance);
    let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };
    Ok((Some(loader), Some(messenger)))
}

pub fn create_surface(
    entry: &Entry,
    instance: &Instance,
    window: &Window,
) -> Result<vk::SurfaceKHR, RenderError> {
    unsafe {
        Ok(ash_window::create_surface(
            entry,
            instance,
            window.display_handle()?.as_raw(),
            window.window_handle()?.as_raw(),
            None,
        )?)
    }
}

/// Picks the highest-ranked suitable device. Discrete GPUs and
/// tessellation-capable feature sets rank higher; ties go to the device
/// enumerated first.
pub fn select_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<DeviceCaps, SelectError> {
    let pdevices = unsafe { instance.enumerate_physical_devices()? };

    let mut best: Option<(u32, DeviceCaps)> = None;
    for pdevice in pdevices {
        let Some(caps) = suitability(instance, pdevice, surface_loader, surface)? else {
            continue;
        };

        let properties = unsafe { instance.get_physical_device_properties(pdevice) };
        let mut score = 0u32;
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 10;
        }
        if caps.features.tessellation_shader == vk::TRUE {
            score += 1;
        }

        debug!(
            "Candidate device {:?} scored {}",
            properties.device_name_as_c_str().unwrap_or_default(),
            score
        );

        // Strict comparison keeps the first-enumerated device on ties.
        if best.as_ref().is_none_or(|(best_score, _)| score > *best_score) {
            best = Some((score, caps));
        }
    }

    match best {
        Some((_, caps)) => {
            let properties = unsafe { instance.get_physical_device_properties(caps.physical) };
            info!(
                "Selected device {:?} (graphics family {}, present family {})",
                properties.device_name_as_c_str().unwrap_or_default(),
                caps.graphics_family,
                caps.present_family
            );
            Ok(caps)
        }
        None => Err(SelectError::NoSuitableDevice),
    }
}

/// A device is suitable when it exposes geometry shaders, a graphics queue
/// family, a presentation-capable queue family for this surface, and at
/// least one surface format and present mode. Families are discovered
/// independently by first-match scan.
fn suitability(
    instance: &Instance,
    pdevice: vk::PhysicalDevice,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<Option<DeviceCaps>, SelectError> {
    let features = unsafe { instance.get_physical_device_features(pdevice) };
    if features.geometry_shader != vk::TRUE {
        return Ok(None);
    }

    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(pdevice) };

    let graphics_family = queue_families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32);

    let mut present_family = None;
    for index in 0..queue_families.len() as u32 {
        let supported = unsafe {
            surface_loader.get_physical_device_surface_support(pdevice, index, surface)?
        };
        if supported {
            present_family = Some(index);
            break;
        }
    }

    let (Some(graphics_family), Some(present_family)) = (graphics_family, present_family) else {
        return Ok(None);
    };

    let formats =
        unsafe { surface_loader.get_physical_device_surface_formats(pdevice, surface)? };
    let present_modes =
        unsafe { surface_loader.get_physical_device_surface_present_modes(pdevice, surface)? };
    if formats.is_empty() || present_modes.is_empty() {
        return Ok(None);
    }

    Ok(Some(DeviceCaps {
        physical: pdevice,
        graphics_family,
        present_family,
        features,
    }))
}

/// Builds the logical device plus its graphics and present queues. The two
/// queues may alias when one family serves both roles.
pub fn create_logical_device(
    instance: &Instance,
    caps: &DeviceCaps,
) -> Result<(Device, vk::Queue, vk::Queue), vk::Result> {
    let queue_priorities = [1.0];
    let queue_create_infos: Vec<_> = caps
        .unique_families()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&queue_priorities)
        })
        .collect();

    let device_extensions = [swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default().geometry_shader(true);
    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&device_extensions)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(caps.physical, &create_info, None)? };
    let graphics_queue = unsafe { device.get_device_queue(caps.graphics_family, 0) };
    let present_queue = unsafe { device.get_device_queue(caps.present_family, 0) };
    Ok((device, graphics_queue, present_queue))
}
