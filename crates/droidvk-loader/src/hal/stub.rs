//! Driver used when the device has no Vulkan HAL. Instances can be created
//! but report no physical devices.

use std::ffi::{c_char, CStr};
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use ash::vk::Handle;

use super::HalDevice;
use crate::dispatch::DispatchableHandle;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

pub(super) fn device() -> HalDevice {
    HalDevice {
        enumerate_instance_extension_properties,
        create_instance,
        get_instance_proc_addr,
    }
}

unsafe extern "system" fn enumerate_instance_extension_properties(
    layer_name: *const c_char,
    count: *mut u32,
    _properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    if !layer_name.is_null() {
        return vk::Result::ERROR_LAYER_NOT_PRESENT;
    }
    unsafe { *count = 0 };
    vk::Result::SUCCESS
}

unsafe extern "system" fn create_instance(
    _create_info: *const vk::InstanceCreateInfo<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    instance: *mut vk::Instance,
) -> vk::Result {
    let id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);
    unsafe { *instance = DispatchableHandle::as_handle(DispatchableHandle::new(id)) };
    vk::Result::SUCCESS
}

unsafe extern "system" fn destroy_instance(instance: vk::Instance, _allocator: *const vk::AllocationCallbacks<'_>) {
    if instance.is_null() {
        return;
    }
    unsafe { DispatchableHandle::destroy(DispatchableHandle::from_handle(instance)) };
}

unsafe extern "system" fn enumerate_physical_devices(
    _instance: vk::Instance,
    count: *mut u32,
    _devices: *mut vk::PhysicalDevice,
) -> vk::Result {
    unsafe { *count = 0 };
    vk::Result::SUCCESS
}

unsafe extern "system" fn create_device(
    _physical_device: vk::PhysicalDevice,
    _create_info: *const vk::DeviceCreateInfo<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    _device: *mut vk::Device,
) -> vk::Result {
    vk::Result::ERROR_INITIALIZATION_FAILED
}

unsafe extern "system" fn enumerate_device_extension_properties(
    _physical_device: vk::PhysicalDevice,
    _layer_name: *const c_char,
    count: *mut u32,
    _properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    unsafe { *count = 0 };
    vk::Result::SUCCESS
}

unsafe extern "system" fn get_device_proc_addr(_device: vk::Device, _name: *const c_char) -> vk::PFN_vkVoidFunction {
    None
}

unsafe extern "system" fn get_instance_proc_addr(_instance: vk::Instance, p_name: *const c_char) -> vk::PFN_vkVoidFunction {
    let name = unsafe { CStr::from_ptr(p_name) }.to_str().ok()?;

    unsafe {
        match name {
            "vkCreateInstance" => Some(std::mem::transmute(create_instance as *const ())),
            "vkEnumerateInstanceExtensionProperties" => {
                Some(std::mem::transmute(enumerate_instance_extension_properties as *const ()))
            }
            "vkDestroyInstance" => Some(std::mem::transmute(destroy_instance as *const ())),
            "vkEnumeratePhysicalDevices" => Some(std::mem::transmute(enumerate_physical_devices as *const ())),
            "vkGetInstanceProcAddr" => Some(std::mem::transmute(get_instance_proc_addr as *const ())),
            "vkGetDeviceProcAddr" => Some(std::mem::transmute(get_device_proc_addr as *const ())),
            "vkCreateDevice" => Some(std::mem::transmute(create_device as *const ())),
            "vkEnumerateDeviceExtensionProperties" => {
                Some(std::mem::transmute(enumerate_device_extension_properties as *const ()))
            }
            _ => None,
        }
    }
}
