//! Entry points the loader itself calls on the driver.

use std::ffi::CStr;

use ash::vk;
use droidvk_core::LoaderError;
use tracing::{error, warn};

use crate::dispatch::cast_proc;
use crate::extensions::{Extension, ExtensionSet};
use crate::native_buffer::{
    PFN_vkAcquireImageANDROID, PFN_vkGetSwapchainGrallocUsageANDROID, PFN_vkImportNativeFenceANDROID,
    PFN_vkQueueSignalNativeFenceANDROID, PFN_vkQueueSignalReleaseImageANDROID,
};

struct Resolver<F> {
    scope: &'static str,
    resolve: F,
    missing: Vec<String>,
}

impl<F: Fn(&CStr) -> vk::PFN_vkVoidFunction> Resolver<F> {
    fn new(scope: &'static str, resolve: F) -> Self {
        Self {
            scope,
            resolve,
            missing: Vec::new(),
        }
    }

    unsafe fn optional<T: Copy>(&self, name: &CStr) -> Option<T> {
        (self.resolve)(name).map(|proc| unsafe { cast_proc(proc) })
    }

    /// Resolve a required entry; a missing one is recorded and `None` returned.
    unsafe fn required<T: Copy>(&mut self, name: &CStr) -> Option<T> {
        let proc = unsafe { self.optional(name) };
        if proc.is_none() {
            error!("missing {} driver proc: {}", self.scope, name.to_string_lossy());
            self.missing.push(name.to_string_lossy().into_owned());
        }
        proc
    }

    fn finish<T>(self, table: Option<T>) -> Result<T, LoaderError> {
        match table {
            Some(table) if self.missing.is_empty() => Ok(table),
            _ => Err(LoaderError::IncompatibleDriver(format!(
                "missing {} driver procs: {}",
                self.scope,
                self.missing.join(", ")
            ))),
        }
    }
}

/// Driver instance entry points.
#[derive(Clone, Copy)]
pub struct InstanceDriverTable {
    pub destroy_instance: vk::PFN_vkDestroyInstance,
    pub enumerate_physical_devices: vk::PFN_vkEnumeratePhysicalDevices,
    pub get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub create_device: vk::PFN_vkCreateDevice,
    pub enumerate_device_extension_properties: vk::PFN_vkEnumerateDeviceExtensionProperties,
    pub create_debug_report_callback: Option<vk::PFN_vkCreateDebugReportCallbackEXT>,
    pub destroy_debug_report_callback: Option<vk::PFN_vkDestroyDebugReportCallbackEXT>,
    pub debug_report_message: Option<vk::PFN_vkDebugReportMessageEXT>,
}

impl InstanceDriverTable {
    /// # Safety
    /// `resolve` must return entry points of the driver instance.
    pub unsafe fn init(
        resolve: impl Fn(&CStr) -> vk::PFN_vkVoidFunction,
        hal_extensions: ExtensionSet,
    ) -> Result<Self, LoaderError> {
        let mut r = Resolver::new("instance", resolve);
        let debug_report = hal_extensions.contains(Extension::ExtDebugReport);

        let table = unsafe {
            let destroy_instance = r.required(c"vkDestroyInstance");
            let enumerate_physical_devices = r.required(c"vkEnumeratePhysicalDevices");
            let get_instance_proc_addr = r.required(c"vkGetInstanceProcAddr");
            let create_device = r.required(c"vkCreateDevice");
            let enumerate_device_extension_properties = r.required(c"vkEnumerateDeviceExtensionProperties");
            let mut debug_procs = (None, None, None);
            if debug_report {
                debug_procs = (
                    r.required(c"vkCreateDebugReportCallbackEXT"),
                    r.required(c"vkDestroyDebugReportCallbackEXT"),
                    r.required(c"vkDebugReportMessageEXT"),
                );
            }

            match (
                destroy_instance,
                enumerate_physical_devices,
                get_instance_proc_addr,
                create_device,
                enumerate_device_extension_properties,
            ) {
                (
                    Some(destroy_instance),
                    Some(enumerate_physical_devices),
                    Some(get_instance_proc_addr),
                    Some(create_device),
                    Some(enumerate_device_extension_properties),
                ) => Some(Self {
                    destroy_instance,
                    enumerate_physical_devices,
                    get_instance_proc_addr,
                    create_device,
                    enumerate_device_extension_properties,
                    create_debug_report_callback: debug_procs.0,
                    destroy_debug_report_callback: debug_procs.1,
                    debug_report_message: debug_procs.2,
                }),
                _ => None,
            }
        };
        r.finish(table)
    }
}

/// Driver device entry points, including the private native-buffer interface.
#[derive(Clone, Copy)]
pub struct DeviceDriverTable {
    pub get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    pub destroy_device: vk::PFN_vkDestroyDevice,
    pub get_device_queue: vk::PFN_vkGetDeviceQueue,
    pub allocate_command_buffers: vk::PFN_vkAllocateCommandBuffers,
    pub create_image: vk::PFN_vkCreateImage,
    pub destroy_image: vk::PFN_vkDestroyImage,
    pub get_swapchain_gralloc_usage_android: Option<PFN_vkGetSwapchainGrallocUsageANDROID>,
    pub acquire_image_android: Option<PFN_vkAcquireImageANDROID>,
    pub queue_signal_release_image_android: Option<PFN_vkQueueSignalReleaseImageANDROID>,
    pub import_native_fence_android: Option<PFN_vkImportNativeFenceANDROID>,
    pub queue_signal_native_fence_android: Option<PFN_vkQueueSignalNativeFenceANDROID>,
}

impl DeviceDriverTable {
    /// # Safety
    /// `resolve` must return entry points of the driver device.
    pub unsafe fn init(
        resolve: impl Fn(&CStr) -> vk::PFN_vkVoidFunction,
        hal_extensions: ExtensionSet,
    ) -> Result<Self, LoaderError> {
        let mut r = Resolver::new("device", resolve);
        let native_buffer = hal_extensions.contains(Extension::AndroidNativeBuffer);

        let table = unsafe {
            let get_device_proc_addr = r.required(c"vkGetDeviceProcAddr");
            let destroy_device = r.required(c"vkDestroyDevice");
            let get_device_queue = r.required(c"vkGetDeviceQueue");
            let allocate_command_buffers = r.required(c"vkAllocateCommandBuffers");
            let create_image = r.required(c"vkCreateImage");
            let destroy_image = r.required(c"vkDestroyImage");

            // Native-buffer entries never fail device creation; swapchain
            // creation reports their absence instead.
            let (mut gralloc_usage, mut acquire, mut release, mut import_fence, mut signal_fence) =
                (None, None, None, None, None);
            if native_buffer {
                gralloc_usage = r.optional(c"vkGetSwapchainGrallocUsageANDROID");
                acquire = r.optional(c"vkAcquireImageANDROID");
                release = r.optional(c"vkQueueSignalReleaseImageANDROID");
                import_fence = r.optional(c"vkImportNativeFenceANDROID");
                signal_fence = r.optional(c"vkQueueSignalNativeFenceANDROID");

                if gralloc_usage.is_none() {
                    warn!("driver lists VK_ANDROID_native_buffer without vkGetSwapchainGrallocUsageANDROID");
                }
                if acquire.is_none() && import_fence.is_none() {
                    warn!("driver exposes neither vkAcquireImageANDROID nor vkImportNativeFenceANDROID");
                }
                if release.is_none() && signal_fence.is_none() {
                    warn!("driver exposes neither vkQueueSignalReleaseImageANDROID nor vkQueueSignalNativeFenceANDROID");
                }
            }

            match (
                get_device_proc_addr,
                destroy_device,
                get_device_queue,
                allocate_command_buffers,
                create_image,
                destroy_image,
            ) {
                (
                    Some(get_device_proc_addr),
                    Some(destroy_device),
                    Some(get_device_queue),
                    Some(allocate_command_buffers),
                    Some(create_image),
                    Some(destroy_image),
                ) => Some(Self {
                    get_device_proc_addr,
                    destroy_device,
                    get_device_queue,
                    allocate_command_buffers,
                    create_image,
                    destroy_image,
                    get_swapchain_gralloc_usage_android: gralloc_usage,
                    acquire_image_android: acquire,
                    queue_signal_release_image_android: release,
                    import_native_fence_android: import_fence,
                    queue_signal_native_fence_android: signal_fence,
                }),
                _ => None,
            }
        };
        r.finish(table)
    }
}
