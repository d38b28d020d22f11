//! A recording driver installed as the HAL.
//!
//! Handles are loader-dispatchable allocations. Create infos the driver
//! receives are captured so tests can check what survived sanitation.

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use ash::vk;
use ash::vk::Handle;
use parking_lot::{Mutex, MutexGuard};
use vulkan::dispatch::DispatchableHandle;
use vulkan::driver::create_info::{LOADER_DEVICE_CREATE_INFO, LOADER_INSTANCE_CREATE_INFO};
use vulkan::extensions::{cstr_array, fill_properties, set_name, ANDROID_NATIVE_BUFFER_NAME};
use vulkan::hal::HalDevice;
use vulkan::native_buffer::{NativeBufferAndroid, STRUCTURE_TYPE_NATIVE_BUFFER_ANDROID};

use super::record;

pub const DRIVER_INSTANCE_EXTENSION: &CStr = c"VK_KHR_get_physical_device_properties2";
pub const DRIVER_DEVICE_EXTENSION: &CStr = c"VK_KHR_maintenance1";
pub const DEVICE_NAME: &CStr = c"droidvk test gpu";
pub const GRALLOC_USAGE: c_int = 0x933;
pub const PHYSICAL_DEVICE_COUNT: usize = 2;

#[derive(Default)]
pub struct DriverState {
    pub instance_extensions: Vec<CString>,
    pub instance_layer_count: u32,
    pub instance_saw_loader_struct: bool,
    pub device_extensions: Vec<CString>,
    pub device_layer_count: u32,
    pub device_saw_loader_struct: bool,
    pub live_instances: usize,
    pub live_devices: usize,
    pub live_images: usize,
    pub images_created: usize,
    pub native_buffer_handles: Vec<usize>,
    pub acquired: usize,
    pub released: usize,
    /// Result `vkAcquireImageANDROID` returns when set.
    pub fail_acquire: Option<vk::Result>,
    /// `vkCreateImage` fails once this many images were created.
    pub fail_create_image_after: Option<usize>,
    /// Report a physical device that lacks the loader magic.
    pub foreign_physical_device: bool,
    physical_devices: HashMap<u64, Vec<u64>>,
    queues: HashMap<u64, u64>,
    command_buffers: Vec<u64>,
}

static STATE: OnceLock<Mutex<DriverState>> = OnceLock::new();
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn state() -> MutexGuard<'static, DriverState> {
    STATE.get_or_init(|| Mutex::new(DriverState::default())).lock()
}

/// Clear the per-test captures. Live object counts are kept.
pub fn reset() {
    let mut st = state();
    st.instance_extensions.clear();
    st.instance_layer_count = 0;
    st.instance_saw_loader_struct = false;
    st.device_extensions.clear();
    st.device_layer_count = 0;
    st.device_saw_loader_struct = false;
    st.images_created = 0;
    st.native_buffer_handles.clear();
    st.acquired = 0;
    st.released = 0;
    st.fail_acquire = None;
    st.fail_create_image_after = None;
    st.foreign_physical_device = false;
}

pub fn hal_device() -> HalDevice {
    HalDevice {
        enumerate_instance_extension_properties,
        create_instance,
        get_instance_proc_addr,
    }
}

fn next_handle() -> *mut DispatchableHandle {
    DispatchableHandle::new(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

fn ext_props(name: &CStr, spec_version: u32) -> vk::ExtensionProperties {
    let mut props = vk::ExtensionProperties {
        spec_version,
        ..Default::default()
    };
    set_name(&mut props.extension_name, name);
    props
}

unsafe fn has_struct(p_next: *const c_void, s_type: vk::StructureType) -> bool {
    let mut next = p_next as *const vk::BaseInStructure<'_>;
    while !next.is_null() {
        if unsafe { (*next).s_type } == s_type {
            return true;
        }
        next = unsafe { (*next).p_next };
    }
    false
}

unsafe fn owned_names(names: *const *const c_char, count: u32) -> Vec<CString> {
    unsafe { cstr_array(names, count) }.into_iter().map(CStr::to_owned).collect()
}

// ── Instance ────────────────────────────────────────────────

unsafe extern "system" fn enumerate_instance_extension_properties(
    p_layer_name: *const c_char,
    p_property_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    if !p_layer_name.is_null() {
        return vk::Result::ERROR_LAYER_NOT_PRESENT;
    }
    let list = [ext_props(DRIVER_INSTANCE_EXTENSION, 1)];
    unsafe { fill_properties(&list, p_property_count, p_properties) }
}

unsafe extern "system" fn create_instance(
    p_create_info: *const vk::InstanceCreateInfo<'_>,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
    p_instance: *mut vk::Instance,
) -> vk::Result {
    let info = unsafe { &*p_create_info };
    let handle = next_handle();
    let physical_devices = (0..PHYSICAL_DEVICE_COUNT)
        .map(|_| next_handle() as usize as u64)
        .collect();

    let mut st = state();
    st.instance_extensions = unsafe { owned_names(info.pp_enabled_extension_names, info.enabled_extension_count) };
    st.instance_layer_count = info.enabled_layer_count;
    st.instance_saw_loader_struct = unsafe { has_struct(info.p_next, LOADER_INSTANCE_CREATE_INFO) };
    st.physical_devices.insert(handle as usize as u64, physical_devices);
    st.live_instances += 1;
    drop(st);

    record("driver:vkCreateInstance");
    unsafe { *p_instance = DispatchableHandle::as_handle(handle) };
    vk::Result::SUCCESS
}

unsafe extern "system" fn destroy_instance(instance: vk::Instance, _p_allocator: *const vk::AllocationCallbacks<'_>) {
    if instance.is_null() {
        return;
    }
    record("driver:vkDestroyInstance");
    let mut st = state();
    for raw in st.physical_devices.remove(&instance.as_raw()).unwrap_or_default() {
        unsafe { DispatchableHandle::destroy(raw as usize as *mut DispatchableHandle) };
    }
    st.live_instances -= 1;
    unsafe { DispatchableHandle::destroy(DispatchableHandle::from_handle(instance)) };
}

unsafe extern "system" fn enumerate_physical_devices(
    instance: vk::Instance,
    p_physical_device_count: *mut u32,
    p_physical_devices: *mut vk::PhysicalDevice,
) -> vk::Result {
    let st = state();
    if st.foreign_physical_device {
        // Two words, no loader magic.
        let foreign: &'static mut [usize; 2] = Box::leak(Box::new([0, 0]));
        let devices = [vk::PhysicalDevice::from_raw(foreign.as_ptr() as usize as u64)];
        drop(st);
        return unsafe { fill_properties(&devices, p_physical_device_count, p_physical_devices) };
    }
    let devices: Vec<vk::PhysicalDevice> = st
        .physical_devices
        .get(&instance.as_raw())
        .map(|raws| raws.iter().map(|&raw| vk::PhysicalDevice::from_raw(raw)).collect())
        .unwrap_or_default();
    drop(st);
    unsafe { fill_properties(&devices, p_physical_device_count, p_physical_devices) }
}

unsafe extern "system" fn get_physical_device_properties(
    physical_device: vk::PhysicalDevice,
    p_properties: *mut vk::PhysicalDeviceProperties,
) {
    let mut props = vk::PhysicalDeviceProperties {
        api_version: vk::API_VERSION_1_0,
        device_id: unsafe { DispatchableHandle::get_id(DispatchableHandle::from_handle(physical_device)) } as u32,
        device_type: vk::PhysicalDeviceType::VIRTUAL_GPU,
        ..Default::default()
    };
    set_name(&mut props.device_name, DEVICE_NAME);
    unsafe { *p_properties = props };
}

unsafe extern "system" fn enumerate_device_extension_properties(
    _physical_device: vk::PhysicalDevice,
    p_layer_name: *const c_char,
    p_property_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    if !p_layer_name.is_null() {
        return vk::Result::ERROR_LAYER_NOT_PRESENT;
    }
    let list = [ext_props(ANDROID_NATIVE_BUFFER_NAME, 8), ext_props(DRIVER_DEVICE_EXTENSION, 2)];
    unsafe { fill_properties(&list, p_property_count, p_properties) }
}

// ── Device ──────────────────────────────────────────────────

unsafe extern "system" fn create_device(
    _physical_device: vk::PhysicalDevice,
    p_create_info: *const vk::DeviceCreateInfo<'_>,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
    p_device: *mut vk::Device,
) -> vk::Result {
    let info = unsafe { &*p_create_info };
    let handle = next_handle();

    let mut st = state();
    st.device_extensions = unsafe { owned_names(info.pp_enabled_extension_names, info.enabled_extension_count) };
    st.device_layer_count = info.enabled_layer_count;
    st.device_saw_loader_struct = unsafe { has_struct(info.p_next, LOADER_DEVICE_CREATE_INFO) };
    st.live_devices += 1;
    drop(st);

    record("driver:vkCreateDevice");
    unsafe { *p_device = DispatchableHandle::as_handle(handle) };
    vk::Result::SUCCESS
}

unsafe extern "system" fn destroy_device(device: vk::Device, _p_allocator: *const vk::AllocationCallbacks<'_>) {
    if device.is_null() {
        return;
    }
    record("driver:vkDestroyDevice");
    let mut st = state();
    if let Some(queue) = st.queues.remove(&device.as_raw()) {
        unsafe { DispatchableHandle::destroy(queue as usize as *mut DispatchableHandle) };
    }
    st.live_devices -= 1;
    unsafe { DispatchableHandle::destroy(DispatchableHandle::from_handle(device)) };
}

unsafe extern "system" fn get_device_queue(device: vk::Device, _family: u32, _index: u32, p_queue: *mut vk::Queue) {
    let raw = *state()
        .queues
        .entry(device.as_raw())
        .or_insert_with(|| next_handle() as usize as u64);
    unsafe { *p_queue = vk::Queue::from_raw(raw) };
}

unsafe extern "system" fn allocate_command_buffers(
    _device: vk::Device,
    p_allocate_info: *const vk::CommandBufferAllocateInfo<'_>,
    p_command_buffers: *mut vk::CommandBuffer,
) -> vk::Result {
    let count = unsafe { (*p_allocate_info).command_buffer_count } as usize;
    let out = unsafe { std::slice::from_raw_parts_mut(p_command_buffers, count) };
    let mut st = state();
    for slot in out {
        let raw = next_handle() as usize as u64;
        st.command_buffers.push(raw);
        *slot = vk::CommandBuffer::from_raw(raw);
    }
    vk::Result::SUCCESS
}

unsafe extern "system" fn device_wait_idle(_device: vk::Device) -> vk::Result {
    record("driver:vkDeviceWaitIdle");
    vk::Result::SUCCESS
}

unsafe extern "system" fn create_image(
    _device: vk::Device,
    p_create_info: *const vk::ImageCreateInfo<'_>,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
    p_image: *mut vk::Image,
) -> vk::Result {
    let info = unsafe { &*p_create_info };
    let mut st = state();
    if st.fail_create_image_after == Some(st.images_created) {
        return vk::Result::ERROR_OUT_OF_HOST_MEMORY;
    }
    let mut next = info.p_next as *const vk::BaseInStructure<'_>;
    while !next.is_null() {
        if unsafe { (*next).s_type } == STRUCTURE_TYPE_NATIVE_BUFFER_ANDROID {
            let native = unsafe { &*(next as *const NativeBufferAndroid) };
            st.native_buffer_handles.push(native.handle as usize);
        }
        next = unsafe { (*next).p_next };
    }
    st.images_created += 1;
    st.live_images += 1;
    unsafe { *p_image = vk::Image::from_raw(NEXT_ID.fetch_add(1, Ordering::Relaxed)) };
    vk::Result::SUCCESS
}

unsafe extern "system" fn destroy_image(_device: vk::Device, image: vk::Image, _p_allocator: *const vk::AllocationCallbacks<'_>) {
    if !image.is_null() {
        state().live_images -= 1;
    }
}

// ── Native buffer ───────────────────────────────────────────

unsafe extern "system" fn get_swapchain_gralloc_usage(
    _device: vk::Device,
    _format: vk::Format,
    _image_usage: vk::ImageUsageFlags,
    gralloc_usage: *mut c_int,
) -> vk::Result {
    unsafe { *gralloc_usage = GRALLOC_USAGE };
    vk::Result::SUCCESS
}

unsafe extern "system" fn acquire_image(
    _device: vk::Device,
    _image: vk::Image,
    native_fence_fd: c_int,
    _semaphore: vk::Semaphore,
    _fence: vk::Fence,
) -> vk::Result {
    if native_fence_fd >= 0 {
        unsafe { libc::close(native_fence_fd) };
    }
    let mut st = state();
    st.acquired += 1;
    st.fail_acquire.unwrap_or(vk::Result::SUCCESS)
}

unsafe extern "system" fn queue_signal_release_image(
    _queue: vk::Queue,
    _wait_semaphore_count: u32,
    _p_wait_semaphores: *const vk::Semaphore,
    _image: vk::Image,
    p_native_fence_fd: *mut c_int,
) -> vk::Result {
    state().released += 1;
    unsafe { *p_native_fence_fd = libc::eventfd(1, libc::EFD_CLOEXEC) };
    vk::Result::SUCCESS
}

// ── Proc addresses ──────────────────────────────────────────

unsafe extern "system" fn get_instance_proc_addr(_instance: vk::Instance, p_name: *const c_char) -> vk::PFN_vkVoidFunction {
    let name = unsafe { CStr::from_ptr(p_name) };
    unsafe {
        match name.to_bytes() {
            b"vkCreateInstance" => Some(std::mem::transmute(create_instance as *const ())),
            b"vkDestroyInstance" => Some(std::mem::transmute(destroy_instance as *const ())),
            b"vkEnumeratePhysicalDevices" => Some(std::mem::transmute(enumerate_physical_devices as *const ())),
            b"vkGetPhysicalDeviceProperties" => Some(std::mem::transmute(get_physical_device_properties as *const ())),
            b"vkEnumerateDeviceExtensionProperties" => {
                Some(std::mem::transmute(enumerate_device_extension_properties as *const ()))
            }
            b"vkCreateDevice" => Some(std::mem::transmute(create_device as *const ())),
            b"vkGetInstanceProcAddr" => Some(std::mem::transmute(get_instance_proc_addr as *const ())),
            b"vkGetDeviceProcAddr" => Some(std::mem::transmute(get_device_proc_addr as *const ())),
            _ => None,
        }
    }
}

unsafe extern "system" fn get_device_proc_addr(_device: vk::Device, p_name: *const c_char) -> vk::PFN_vkVoidFunction {
    let name = unsafe { CStr::from_ptr(p_name) };
    unsafe {
        match name.to_bytes() {
            b"vkGetDeviceProcAddr" => Some(std::mem::transmute(get_device_proc_addr as *const ())),
            b"vkDestroyDevice" => Some(std::mem::transmute(destroy_device as *const ())),
            b"vkGetDeviceQueue" => Some(std::mem::transmute(get_device_queue as *const ())),
            b"vkAllocateCommandBuffers" => Some(std::mem::transmute(allocate_command_buffers as *const ())),
            b"vkDeviceWaitIdle" => Some(std::mem::transmute(device_wait_idle as *const ())),
            b"vkCreateImage" => Some(std::mem::transmute(create_image as *const ())),
            b"vkDestroyImage" => Some(std::mem::transmute(destroy_image as *const ())),
            b"vkGetSwapchainGrallocUsageANDROID" => Some(std::mem::transmute(get_swapchain_gralloc_usage as *const ())),
            b"vkAcquireImageANDROID" => Some(std::mem::transmute(acquire_image as *const ())),
            b"vkQueueSignalReleaseImageANDROID" => Some(std::mem::transmute(queue_signal_release_image as *const ())),
            _ => None,
        }
    }
}
