//! `VK_KHR_surface`, `VK_KHR_android_surface` and `VK_KHR_swapchain` over a
//! native window producer.
//!
//! A swapchain owns one driver image per producer buffer. Each image is
//! either queued (owned by the producer or the compositor) or dequeued
//! (owned by the application); acquire and present move it between the two.
//! The driver learns about buffers through `VkNativeBufferANDROID` and
//! synchronizes with the producer through the native-buffer fence hooks.

use std::ffi::{c_int, c_void};
use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use droidvk_core::LoaderError;
use tracing::{debug, error, info, warn};

use crate::allocator::Allocator;
use crate::dispatch::get_data;
use crate::driver::DeviceData;
use crate::extensions::fill_properties;
use crate::native_buffer::NativeBufferAndroid;
use crate::window::{
    ANativeWindow, AndroidNativeWindow, FenceFd, NativeWindow, WindowBuffer, NATIVE_WINDOW_API_EGL,
    NATIVE_WINDOW_DEFAULT_HEIGHT, NATIVE_WINDOW_DEFAULT_WIDTH, NATIVE_WINDOW_MIN_UNDEQUEUED_BUFFERS,
    NATIVE_WINDOW_SCALING_MODE_SCALE_TO_WINDOW,
};

const MIN_IMAGE_COUNT: u32 = 2;
const MAX_IMAGE_COUNT: u32 = 3;
const MAX_IMAGE_EXTENT: u32 = 4096;

struct Surface {
    window: Arc<dyn NativeWindow>,
}

struct SwapchainImage {
    image: vk::Image,
    buffer: WindowBuffer,
    // Fence the producer returned with the buffer; None while queued.
    dequeue_fence: Option<FenceFd>,
    dequeued: bool,
}

struct Swapchain {
    window: Arc<dyn NativeWindow>,
    images: Vec<SwapchainImage>,
}

/// Ownership of a swapchain image as the loader sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Queued,
    Dequeued,
}

fn surface_of<'a>(surface: vk::SurfaceKHR) -> &'a Surface {
    unsafe { &*(surface.as_raw() as usize as *const Surface) }
}

fn swapchain_of<'a>(swapchain: vk::SwapchainKHR) -> &'a mut Swapchain {
    unsafe { &mut *(swapchain.as_raw() as usize as *mut Swapchain) }
}

// ── Surface ──────────────────────────────────────────────────

/// Wrap a producer in a `VkSurfaceKHR` owned by `instance`.
///
/// # Safety
/// `instance` must be a live loader instance; `p_allocator` null or valid.
pub unsafe fn create_surface_from_window(
    instance: vk::Instance,
    window: Arc<dyn NativeWindow>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) -> Result<vk::SurfaceKHR, LoaderError> {
    let data = unsafe { get_data(instance) };
    let allocator = unsafe { Allocator::resolve(p_allocator, &data.allocator) };
    let surface = allocator.create(Surface { window }, vk::SystemAllocationScope::OBJECT)?;
    Ok(vk::SurfaceKHR::from_raw(surface as usize as u64))
}

pub unsafe extern "system" fn create_android_surface(
    instance: vk::Instance,
    p_create_info: *const vk::AndroidSurfaceCreateInfoKHR<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_surface: *mut vk::SurfaceKHR,
) -> vk::Result {
    let raw = unsafe { (*p_create_info).window } as *mut ANativeWindow;
    let Some(window) = (unsafe { AndroidNativeWindow::from_raw(raw) }) else {
        error!("vkCreateAndroidSurfaceKHR: null window");
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    match unsafe { create_surface_from_window(instance, Arc::new(window), p_allocator) } {
        Ok(surface) => {
            unsafe { *p_surface = surface };
            vk::Result::SUCCESS
        }
        Err(e) => e.into(),
    }
}

pub unsafe extern "system" fn destroy_surface(
    instance: vk::Instance,
    surface: vk::SurfaceKHR,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if surface.is_null() {
        return;
    }
    let data = unsafe { get_data(instance) };
    let allocator = unsafe { Allocator::resolve(p_allocator, &data.allocator) };
    unsafe { allocator.destroy(surface.as_raw() as usize as *mut Surface) };
}

pub unsafe extern "system" fn get_physical_device_surface_support(
    _physical_device: vk::PhysicalDevice,
    _queue_family: u32,
    _surface: vk::SurfaceKHR,
    p_supported: *mut vk::Bool32,
) -> vk::Result {
    unsafe { *p_supported = vk::TRUE };
    vk::Result::SUCCESS
}

pub unsafe extern "system" fn get_physical_device_surface_capabilities(
    _physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    p_capabilities: *mut vk::SurfaceCapabilitiesKHR,
) -> vk::Result {
    let window = &surface_of(surface).window;
    let extent = match (
        window.query(NATIVE_WINDOW_DEFAULT_WIDTH),
        window.query(NATIVE_WINDOW_DEFAULT_HEIGHT),
    ) {
        (Ok(width), Ok(height)) => vk::Extent2D {
            width: width as u32,
            height: height as u32,
        },
        (Err(e), _) | (_, Err(e)) => {
            error!("NATIVE_WINDOW_DEFAULT_WIDTH/HEIGHT query failed: {}", e);
            return vk::Result::ERROR_INITIALIZATION_FAILED;
        }
    };

    unsafe {
        *p_capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: MIN_IMAGE_COUNT,
            max_image_count: MAX_IMAGE_COUNT,
            current_extent: extent,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: MAX_IMAGE_EXTENT,
                height: MAX_IMAGE_EXTENT,
            },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::INHERIT,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::INPUT_ATTACHMENT,
        };
    }
    vk::Result::SUCCESS
}

pub unsafe extern "system" fn get_physical_device_surface_formats(
    _physical_device: vk::PhysicalDevice,
    _surface: vk::SurfaceKHR,
    p_count: *mut u32,
    p_formats: *mut vk::SurfaceFormatKHR,
) -> vk::Result {
    let formats = [
        vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
        vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
    ];
    unsafe { fill_properties(&formats, p_count, p_formats) }
}

pub unsafe extern "system" fn get_physical_device_surface_present_modes(
    _physical_device: vk::PhysicalDevice,
    _surface: vk::SurfaceKHR,
    p_count: *mut u32,
    p_modes: *mut vk::PresentModeKHR,
) -> vk::Result {
    let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
    unsafe { fill_properties(&modes, p_count, p_modes) }
}

// ── Swapchain ────────────────────────────────────────────────

fn window_failed(what: &str, e: droidvk_core::WindowError) -> LoaderError {
    error!("{} failed: {}", what, e);
    LoaderError::InitializationFailed(format!("{what} failed: {e}"))
}

/// Return every dequeued buffer to the producer with its stored fence.
fn cancel_dequeued(swapchain: &mut Swapchain) {
    for img in swapchain.images.iter_mut().filter(|img| img.dequeued) {
        if let Err(e) = swapchain.window.cancel_buffer(&img.buffer, img.dequeue_fence.take()) {
            warn!("cancelBuffer failed: {}", e);
        }
        img.dequeued = false;
    }
}

/// Destroy the driver images, disconnect, and free the record.
unsafe fn release_swapchain(data: &DeviceData, swapchain: *mut Swapchain, allocator: &Allocator) {
    let sc = unsafe { &mut *swapchain };
    cancel_dequeued(sc);
    for img in &sc.images {
        if !img.image.is_null() {
            unsafe { (data.driver.destroy_image)(data.device, img.image, std::ptr::null()) };
        }
    }
    if let Err(e) = sc.window.disconnect(NATIVE_WINDOW_API_EGL) {
        warn!("native window disconnect failed: {}", e);
    }
    unsafe { allocator.destroy(swapchain) };
}

unsafe fn create_swapchain_impl(
    device: vk::Device,
    create_info: &vk::SwapchainCreateInfoKHR<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) -> Result<vk::SwapchainKHR, LoaderError> {
    let data = unsafe { get_data(device) };
    let allocator = unsafe { Allocator::resolve(p_allocator, &data.allocator) };

    if create_info.image_array_layers != 1 {
        debug!("swapchain imageArrayLayers={} not supported", create_info.image_array_layers);
    }
    if create_info.pre_transform != vk::SurfaceTransformFlagsKHR::IDENTITY {
        debug!("swapchain preTransform={:?} not supported", create_info.pre_transform);
    }
    if create_info.present_mode != vk::PresentModeKHR::FIFO {
        debug!("swapchain presentMode={:?} not supported", create_info.present_mode);
    }

    let window = surface_of(create_info.surface).window.clone();

    match window.connect(NATIVE_WINDOW_API_EGL) {
        Ok(()) => {}
        Err(e) if e.is_already_connected() => info!("native window already connected"),
        Err(e) => return Err(window_failed("native_window_api_connect", e)),
    }

    let configure = || -> Result<u32, LoaderError> {
        window
            .set_buffers_dimensions(create_info.image_extent.width, create_info.image_extent.height)
            .map_err(|e| window_failed("native_window_set_buffers_dimensions", e))?;

        let Some(gralloc_usage_fn) = data.driver.get_swapchain_gralloc_usage_android else {
            error!("driver does not implement vkGetSwapchainGrallocUsageANDROID");
            return Err(LoaderError::InitializationFailed(
                "vkGetSwapchainGrallocUsageANDROID unavailable".to_string(),
            ));
        };
        let mut gralloc_usage: c_int = 0;
        let result = unsafe {
            gralloc_usage_fn(device, create_info.image_format, create_info.image_usage, &mut gralloc_usage)
        };
        if result != vk::Result::SUCCESS {
            error!("vkGetSwapchainGrallocUsageANDROID failed: {:?}", result);
            return Err(result.into());
        }
        window
            .set_usage(gralloc_usage)
            .map_err(|e| window_failed("native_window_set_usage", e))?;
        window
            .set_scaling_mode(NATIVE_WINDOW_SCALING_MODE_SCALE_TO_WINDOW)
            .map_err(|e| window_failed("native_window_set_scaling_mode", e))?;

        let min_undequeued = window
            .query(NATIVE_WINDOW_MIN_UNDEQUEUED_BUFFERS)
            .map_err(|e| window_failed("window query NATIVE_WINDOW_MIN_UNDEQUEUED_BUFFERS", e))?;
        let num_images = create_info.min_image_count.max(1) - 1 + min_undequeued.max(0) as u32;
        window
            .set_buffer_count(num_images)
            .map_err(|e| window_failed("native_window_set_buffer_count", e))?;
        Ok(num_images)
    };
    let num_images = match configure() {
        Ok(num_images) => num_images,
        Err(e) => {
            if let Err(e) = window.disconnect(NATIVE_WINDOW_API_EGL) {
                warn!("native window disconnect failed: {}", e);
            }
            return Err(e);
        }
    };

    let swapchain = match allocator.create(
        Swapchain {
            window: window.clone(),
            images: Vec::with_capacity(num_images as usize),
        },
        vk::SystemAllocationScope::OBJECT,
    ) {
        Ok(swapchain) => swapchain,
        Err(e) => {
            if let Err(e) = window.disconnect(NATIVE_WINDOW_API_EGL) {
                warn!("native window disconnect failed: {}", e);
            }
            return Err(e);
        }
    };
    let sc = unsafe { &mut *swapchain };

    // Dequeue every buffer once so each gets a driver image, then hand them
    // all back.
    let mut result = Ok(());
    for _ in 0..num_images {
        let (buffer, fence) = match window.dequeue_buffer() {
            Ok(dequeued) => dequeued,
            Err(e) => {
                result = Err(window_failed("dequeueBuffer", e));
                break;
            }
        };
        sc.images.push(SwapchainImage {
            image: vk::Image::null(),
            buffer,
            dequeue_fence: fence,
            dequeued: true,
        });

        let native_buffer = NativeBufferAndroid::new(buffer.handle, buffer.stride, buffer.format, buffer.usage);
        let image_info = vk::ImageCreateInfo {
            p_next: &native_buffer as *const NativeBufferAndroid as *const c_void,
            image_type: vk::ImageType::TYPE_2D,
            format: create_info.image_format,
            extent: vk::Extent3D {
                width: buffer.width as u32,
                height: buffer.height as u32,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: create_info.image_usage,
            sharing_mode: create_info.image_sharing_mode,
            queue_family_index_count: create_info.queue_family_index_count,
            p_queue_family_indices: create_info.p_queue_family_indices,
            ..Default::default()
        };
        let mut image = vk::Image::null();
        let created = unsafe { (data.driver.create_image)(device, &image_info, std::ptr::null(), &mut image) };
        if created != vk::Result::SUCCESS {
            error!("vkCreateImage w/ native buffer failed: {:?}", created);
            result = Err(created.into());
            break;
        }
        if let Some(last) = sc.images.last_mut() {
            last.image = image;
        }
    }

    cancel_dequeued(sc);

    if let Err(e) = result {
        unsafe { release_swapchain(data, swapchain, &allocator) };
        return Err(e);
    }
    Ok(vk::SwapchainKHR::from_raw(swapchain as usize as u64))
}

pub unsafe extern "system" fn create_swapchain(
    device: vk::Device,
    p_create_info: *const vk::SwapchainCreateInfoKHR<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_swapchain: *mut vk::SwapchainKHR,
) -> vk::Result {
    match unsafe { create_swapchain_impl(device, &*p_create_info, p_allocator) } {
        Ok(swapchain) => {
            unsafe { *p_swapchain = swapchain };
            vk::Result::SUCCESS
        }
        Err(e) => e.into(),
    }
}

pub unsafe extern "system" fn destroy_swapchain(
    device: vk::Device,
    swapchain: vk::SwapchainKHR,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if swapchain.is_null() {
        return;
    }
    let data = unsafe { get_data(device) };
    let allocator = unsafe { Allocator::resolve(p_allocator, &data.allocator) };
    unsafe { release_swapchain(data, swapchain.as_raw() as usize as *mut Swapchain, &allocator) };
}

pub unsafe extern "system" fn get_swapchain_images(
    _device: vk::Device,
    swapchain: vk::SwapchainKHR,
    p_count: *mut u32,
    p_images: *mut vk::Image,
) -> vk::Result {
    let sc = swapchain_of(swapchain);
    let images: Vec<vk::Image> = sc.images.iter().map(|img| img.image).collect();
    unsafe { fill_properties(&images, p_count, p_images) }
}

/// Per-image ownership of a live swapchain, in image order.
///
/// # Safety
/// `swapchain` must be a live swapchain created by the loader.
pub unsafe fn swapchain_image_states(swapchain: vk::SwapchainKHR) -> Vec<ImageState> {
    swapchain_of(swapchain)
        .images
        .iter()
        .map(|img| {
            if img.dequeued {
                ImageState::Dequeued
            } else {
                ImageState::Queued
            }
        })
        .collect()
}

pub unsafe extern "system" fn acquire_next_image(
    device: vk::Device,
    swapchain: vk::SwapchainKHR,
    timeout: u64,
    semaphore: vk::Semaphore,
    fence: vk::Fence,
    p_image_index: *mut u32,
) -> vk::Result {
    let data = unsafe { get_data(device) };
    let sc = swapchain_of(swapchain);

    // TODO: honour finite timeouts once the producer exposes a timed dequeue.
    if timeout != u64::MAX {
        warn!("vkAcquireNextImageKHR: non-infinite timeouts not supported, waiting forever");
    }

    let (buffer, fence_fd) = match sc.window.dequeue_buffer() {
        Ok(dequeued) => dequeued,
        Err(e) => {
            error!("dequeueBuffer failed: {}", e);
            return vk::Result::ERROR_INITIALIZATION_FAILED;
        }
    };

    let Some(idx) = sc.images.iter().position(|img| img.buffer.id == buffer.id) else {
        error!("dequeueBuffer returned unrecognized buffer");
        if let Err(e) = sc.window.cancel_buffer(&buffer, fence_fd) {
            warn!("cancelBuffer failed: {}", e);
        }
        return vk::Result::ERROR_OUT_OF_DATE_KHR;
    };

    let img = &mut sc.images[idx];
    img.dequeued = true;
    img.dequeue_fence = fence_fd;

    let driver_fence = match &img.dequeue_fence {
        Some(stored) => match stored.try_clone() {
            Ok(dup) => Some(dup),
            Err(e) => {
                error!("dup(fence) failed, stalls until signalled: {}", e);
                if let Err(e) = stored.wait_forever() {
                    error!("waiting on dequeue fence failed: {}", e);
                }
                None
            }
        },
        None => None,
    };

    // The driver owns the descriptor from here on, also on failure.
    let raw_fence = FenceFd::into_raw(driver_fence);
    let result = if let Some(acquire) = data.driver.acquire_image_android {
        unsafe { acquire(device, img.image, raw_fence, semaphore, fence) }
    } else if let Some(import) = data.driver.import_native_fence_android {
        unsafe { import(device, semaphore, raw_fence) }
    } else {
        drop(unsafe { FenceFd::from_raw(raw_fence) });
        error!("driver implements neither vkAcquireImageANDROID nor vkImportNativeFenceANDROID");
        vk::Result::ERROR_INITIALIZATION_FAILED
    };

    if result != vk::Result::SUCCESS {
        if let Err(e) = sc.window.cancel_buffer(&img.buffer, img.dequeue_fence.take()) {
            warn!("cancelBuffer failed: {}", e);
        }
        img.dequeued = false;
        return result;
    }

    unsafe { *p_image_index = idx as u32 };
    vk::Result::SUCCESS
}

pub unsafe extern "system" fn queue_present(queue: vk::Queue, p_present_info: *const vk::PresentInfoKHR<'_>) -> vk::Result {
    let data = unsafe { get_data(queue) };
    let info = unsafe { &*p_present_info };
    let count = info.swapchain_count as usize;
    let swapchains = unsafe { std::slice::from_raw_parts(info.p_swapchains, count) };
    let indices = unsafe { std::slice::from_raw_parts(info.p_image_indices, count) };
    let mut results = if info.p_results.is_null() {
        None
    } else {
        Some(unsafe { std::slice::from_raw_parts_mut(info.p_results, count) })
    };

    let mut final_result = vk::Result::SUCCESS;
    for (sc_index, (&swapchain, &image_index)) in swapchains.iter().zip(indices).enumerate() {
        let sc = swapchain_of(swapchain);
        let window = sc.window.clone();
        let Some(img) = sc.images.get_mut(image_index as usize) else {
            error!("vkQueuePresentKHR: image index {} out of range for {} images", image_index, sc.images.len());
            if let Some(results) = results.as_deref_mut() {
                results[sc_index] = vk::Result::ERROR_OUT_OF_DATE_KHR;
            }
            if final_result == vk::Result::SUCCESS {
                final_result = vk::Result::ERROR_OUT_OF_DATE_KHR;
            }
            continue;
        };

        let mut fence: c_int = -1;
        let mut result = if let Some(release) = data.driver.queue_signal_release_image_android {
            unsafe { release(queue, info.wait_semaphore_count, info.p_wait_semaphores, img.image, &mut fence) }
        } else if let Some(signal) = data.driver.queue_signal_native_fence_android {
            unsafe { signal(queue, &mut fence) }
        } else {
            error!("driver implements neither vkQueueSignalReleaseImageANDROID nor vkQueueSignalNativeFenceANDROID");
            vk::Result::ERROR_INITIALIZATION_FAILED
        };
        let fence = unsafe { FenceFd::from_raw(fence) };

        if result != vk::Result::SUCCESS {
            error!("vkQueueSignalReleaseImageANDROID failed: {:?}", result);
        } else {
            if let Err(e) = window.queue_buffer(&img.buffer, fence) {
                error!("queueBuffer failed: {}", e);
                result = vk::Result::ERROR_INITIALIZATION_FAILED;
            }
            img.dequeue_fence = None;
            img.dequeued = false;
        }

        if let Some(results) = results.as_deref_mut() {
            results[sc_index] = result;
        }
        if result != vk::Result::SUCCESS && final_result == vk::Result::SUCCESS {
            final_result = result;
        }
    }
    final_result
}
