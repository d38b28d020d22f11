//! Commands the loader implements at the bottom of the chain.
//!
//! `get_instance_proc_addr` and `get_device_proc_addr` consult this table
//! before asking the driver. Device extension commands handed out through
//! `vkGetInstanceProcAddr` get a checked variant that verifies the extension
//! on the device at call time.

use std::ffi::CStr;
use std::sync::OnceLock;

use ash::vk;
use tracing::error;

use crate::debug_report;
use crate::dispatch::get_data;
use crate::extensions::Extension;
use crate::swapchain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookType {
    Global,
    Instance,
    Device,
}

#[derive(Clone, Copy)]
pub struct ProcHook {
    pub name: &'static str,
    pub kind: HookType,
    pub extension: Extension,
    pub proc_: vk::PFN_vkVoidFunction,
    pub checked_proc: vk::PFN_vkVoidFunction,
}

macro_rules! hook {
    ($name:literal, $kind:ident, $ext:ident) => {
        ProcHook {
            name: $name,
            kind: HookType::$kind,
            extension: Extension::$ext,
            proc_: None,
            checked_proc: None,
        }
    };
    ($name:literal, $kind:ident, $ext:ident, $proc:path) => {
        ProcHook {
            name: $name,
            kind: HookType::$kind,
            extension: Extension::$ext,
            proc_: Some(unsafe { std::mem::transmute($proc as *const ()) }),
            checked_proc: None,
        }
    };
    ($name:literal, $kind:ident, $ext:ident, $proc:path, $checked:path) => {
        ProcHook {
            name: $name,
            kind: HookType::$kind,
            extension: Extension::$ext,
            proc_: Some(unsafe { std::mem::transmute($proc as *const ()) }),
            checked_proc: Some(unsafe { std::mem::transmute($checked as *const ()) }),
        }
    };
}

fn build_hooks() -> Vec<ProcHook> {
    let mut hooks = vec![
        hook!("vkAcquireImageANDROID", Device, AndroidNativeBuffer),
        hook!("vkAcquireNextImageKHR", Device, KhrSwapchain, swapchain::acquire_next_image, checked_acquire_next_image),
        hook!("vkAllocateCommandBuffers", Device, Core, super::allocate_command_buffers),
        hook!("vkCreateAndroidSurfaceKHR", Instance, KhrAndroidSurface, swapchain::create_android_surface),
        hook!("vkCreateDebugReportCallbackEXT", Instance, ExtDebugReport, debug_report::create_debug_report_callback),
        hook!("vkCreateDevice", Instance, Core, super::create_device),
        hook!("vkCreateInstance", Global, Core, super::create_instance),
        hook!("vkCreateSwapchainKHR", Device, KhrSwapchain, swapchain::create_swapchain, checked_create_swapchain),
        hook!("vkDebugReportMessageEXT", Instance, ExtDebugReport, debug_report::debug_report_message),
        hook!("vkDestroyDebugReportCallbackEXT", Instance, ExtDebugReport, debug_report::destroy_debug_report_callback),
        hook!("vkDestroyDevice", Device, Core, super::destroy_device),
        hook!("vkDestroyInstance", Instance, Core, super::destroy_instance),
        hook!("vkDestroySurfaceKHR", Instance, KhrSurface, swapchain::destroy_surface),
        hook!("vkDestroySwapchainKHR", Device, KhrSwapchain, swapchain::destroy_swapchain, checked_destroy_swapchain),
        hook!("vkEnumerateDeviceExtensionProperties", Instance, Core, super::enumerate_device_extension_properties),
        hook!("vkEnumerateInstanceExtensionProperties", Global, Core, super::enumerate_instance_extension_properties),
        hook!("vkEnumeratePhysicalDevices", Instance, Core, super::enumerate_physical_devices),
        hook!("vkGetDeviceProcAddr", Device, Core, super::get_device_proc_addr),
        hook!("vkGetDeviceQueue", Device, Core, super::get_device_queue),
        hook!("vkGetInstanceProcAddr", Instance, Core, super::get_instance_proc_addr),
        hook!("vkGetPhysicalDeviceSurfaceCapabilitiesKHR", Instance, KhrSurface, swapchain::get_physical_device_surface_capabilities),
        hook!("vkGetPhysicalDeviceSurfaceFormatsKHR", Instance, KhrSurface, swapchain::get_physical_device_surface_formats),
        hook!("vkGetPhysicalDeviceSurfacePresentModesKHR", Instance, KhrSurface, swapchain::get_physical_device_surface_present_modes),
        hook!("vkGetPhysicalDeviceSurfaceSupportKHR", Instance, KhrSurface, swapchain::get_physical_device_surface_support),
        hook!("vkGetSwapchainGrallocUsageANDROID", Device, AndroidNativeBuffer),
        hook!("vkGetSwapchainImagesKHR", Device, KhrSwapchain, swapchain::get_swapchain_images, checked_get_swapchain_images),
        hook!("vkImportNativeFenceANDROID", Device, AndroidNativeBuffer),
        hook!("vkQueuePresentKHR", Device, KhrSwapchain, swapchain::queue_present, checked_queue_present),
        hook!("vkQueueSignalNativeFenceANDROID", Device, AndroidNativeBuffer),
        hook!("vkQueueSignalReleaseImageANDROID", Device, AndroidNativeBuffer),
    ];
    hooks.sort_by_key(|hook| hook.name);
    hooks
}

static HOOKS: OnceLock<Vec<ProcHook>> = OnceLock::new();

/// Every hook, sorted by name.
pub fn all() -> &'static [ProcHook] {
    HOOKS.get_or_init(build_hooks)
}

/// Binary search the hook table.
pub fn find(name: &CStr) -> Option<&'static ProcHook> {
    let name = name.to_str().ok()?;
    let hooks = all();
    hooks
        .binary_search_by(|hook| hook.name.cmp(name))
        .ok()
        .map(|index| &hooks[index])
}

fn swapchain_enabled(device: vk::Device, command: &str) -> bool {
    let data = unsafe { get_data(device) };
    if data.hook_extensions.contains(Extension::KhrSwapchain) {
        return true;
    }
    error!("{} not enabled. {} not executed.", Extension::KhrSwapchain, command);
    false
}

unsafe extern "system" fn checked_create_swapchain(
    device: vk::Device,
    p_create_info: *const vk::SwapchainCreateInfoKHR<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_swapchain: *mut vk::SwapchainKHR,
) -> vk::Result {
    if !swapchain_enabled(device, "vkCreateSwapchainKHR") {
        return vk::Result::SUCCESS;
    }
    unsafe { swapchain::create_swapchain(device, p_create_info, p_allocator, p_swapchain) }
}

unsafe extern "system" fn checked_destroy_swapchain(
    device: vk::Device,
    swapchain: vk::SwapchainKHR,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if swapchain_enabled(device, "vkDestroySwapchainKHR") {
        unsafe { swapchain::destroy_swapchain(device, swapchain, p_allocator) }
    }
}

unsafe extern "system" fn checked_get_swapchain_images(
    device: vk::Device,
    swapchain: vk::SwapchainKHR,
    p_swapchain_image_count: *mut u32,
    p_swapchain_images: *mut vk::Image,
) -> vk::Result {
    if !swapchain_enabled(device, "vkGetSwapchainImagesKHR") {
        return vk::Result::SUCCESS;
    }
    unsafe { swapchain::get_swapchain_images(device, swapchain, p_swapchain_image_count, p_swapchain_images) }
}

unsafe extern "system" fn checked_acquire_next_image(
    device: vk::Device,
    swapchain: vk::SwapchainKHR,
    timeout: u64,
    semaphore: vk::Semaphore,
    fence: vk::Fence,
    p_image_index: *mut u32,
) -> vk::Result {
    if !swapchain_enabled(device, "vkAcquireNextImageKHR") {
        return vk::Result::SUCCESS;
    }
    unsafe { swapchain::acquire_next_image(device, swapchain, timeout, semaphore, fence, p_image_index) }
}

unsafe extern "system" fn checked_queue_present(queue: vk::Queue, p_present_info: *const vk::PresentInfoKHR<'_>) -> vk::Result {
    let data = unsafe { get_data(queue) };
    if !data.hook_extensions.contains(Extension::KhrSwapchain) {
        error!("{} not enabled. vkQueuePresentKHR not executed.", Extension::KhrSwapchain);
        return vk::Result::SUCCESS;
    }
    unsafe { swapchain::queue_present(queue, p_present_info) }
}
