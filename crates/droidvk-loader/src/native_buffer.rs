//! `VK_ANDROID_native_buffer`: the private interface between the loader's
//! swapchain and the vendor driver.

use std::ffi::{c_int, c_void};

use ash::vk;

pub const STRUCTURE_TYPE_NATIVE_BUFFER_ANDROID: vk::StructureType = vk::StructureType::from_raw(1_000_010_000);

/// Chained into `VkImageCreateInfo` to wrap a gralloc buffer in a driver image.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NativeBufferAndroid {
    pub s_type: vk::StructureType,
    pub p_next: *const c_void,
    /// `buffer_handle_t` of the gralloc buffer.
    pub handle: *const c_void,
    pub stride: c_int,
    pub format: c_int,
    pub usage: c_int,
}

impl NativeBufferAndroid {
    pub fn new(handle: *const c_void, stride: c_int, format: c_int, usage: c_int) -> Self {
        Self {
            s_type: STRUCTURE_TYPE_NATIVE_BUFFER_ANDROID,
            p_next: std::ptr::null(),
            handle,
            stride,
            format,
            usage,
        }
    }
}

#[allow(non_camel_case_types)]
pub type PFN_vkGetSwapchainGrallocUsageANDROID = unsafe extern "system" fn(
    device: vk::Device,
    format: vk::Format,
    image_usage: vk::ImageUsageFlags,
    gralloc_usage: *mut c_int,
) -> vk::Result;

#[allow(non_camel_case_types)]
pub type PFN_vkAcquireImageANDROID = unsafe extern "system" fn(
    device: vk::Device,
    image: vk::Image,
    native_fence_fd: c_int,
    semaphore: vk::Semaphore,
    fence: vk::Fence,
) -> vk::Result;

#[allow(non_camel_case_types)]
pub type PFN_vkQueueSignalReleaseImageANDROID = unsafe extern "system" fn(
    queue: vk::Queue,
    wait_semaphore_count: u32,
    p_wait_semaphores: *const vk::Semaphore,
    image: vk::Image,
    p_native_fence_fd: *mut c_int,
) -> vk::Result;

/// Legacy acquire: signals only the semaphore.
#[allow(non_camel_case_types)]
pub type PFN_vkImportNativeFenceANDROID =
    unsafe extern "system" fn(device: vk::Device, semaphore: vk::Semaphore, native_fence_fd: c_int) -> vk::Result;

/// Legacy release: signals after all prior queue work.
#[allow(non_camel_case_types)]
pub type PFN_vkQueueSignalNativeFenceANDROID =
    unsafe extern "system" fn(queue: vk::Queue, p_native_fence_fd: *mut c_int) -> vk::Result;
