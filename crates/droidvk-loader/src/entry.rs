//! Exported global entry points and the commands the loader intercepts.
//!
//! Everything else is exported as a trampoline generated with the dispatch
//! tables in `api_table`.

use std::ffi::{c_char, CStr};

use ash::vk;
use ash::vk::Handle;
use tracing::{error, warn};

use crate::api_table::{DeviceTable, InstanceTable};
use crate::chain;
use crate::dispatch::get_data;
use crate::extensions::fill_properties;
use crate::layers;

fn fail(command: &str, e: droidvk_core::LoaderError) -> vk::Result {
    warn!("{} failed: {}", command, e);
    e.into()
}

unsafe fn optional_name<'a>(name: *const c_char) -> Option<&'a CStr> {
    if name.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(name) })
    }
}

// ── Instance ────────────────────────────────────────────────

#[no_mangle]
pub unsafe extern "system" fn vkCreateInstance(
    p_create_info: *const vk::InstanceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_instance: *mut vk::Instance,
) -> vk::Result {
    let Some(ctx) = crate::ensure_initialized() else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    if p_create_info.is_null() || p_instance.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }

    match unsafe { chain::create_instance(ctx, &*p_create_info, p_allocator) } {
        Ok(instance) => {
            unsafe { *p_instance = instance };
            vk::Result::SUCCESS
        }
        Err(e) => fail("vkCreateInstance", e),
    }
}

#[no_mangle]
pub unsafe extern "system" fn vkDestroyInstance(instance: vk::Instance, p_allocator: *const vk::AllocationCallbacks<'_>) {
    if !instance.is_null() {
        unsafe { chain::destroy_instance(instance, p_allocator) };
    }
}

#[no_mangle]
pub unsafe extern "system" fn vkEnumerateInstanceLayerProperties(
    p_property_count: *mut u32,
    p_properties: *mut vk::LayerProperties,
) -> vk::Result {
    if crate::ensure_initialized().is_none() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    unsafe { fill_properties(&layers::instance_layer_properties(), p_property_count, p_properties) }
}

#[no_mangle]
pub unsafe extern "system" fn vkEnumerateInstanceExtensionProperties(
    p_layer_name: *const c_char,
    p_property_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    let Some(ctx) = crate::ensure_initialized() else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    match chain::instance_extensions(ctx, unsafe { optional_name(p_layer_name) }) {
        Ok(list) => unsafe { fill_properties(&list, p_property_count, p_properties) },
        Err(e) => fail("vkEnumerateInstanceExtensionProperties", e),
    }
}

// ── Device ──────────────────────────────────────────────────

#[no_mangle]
pub unsafe extern "system" fn vkCreateDevice(
    physical_device: vk::PhysicalDevice,
    p_create_info: *const vk::DeviceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_device: *mut vk::Device,
) -> vk::Result {
    let Some(ctx) = crate::ensure_initialized() else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    if p_create_info.is_null() || p_device.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }

    match unsafe { chain::create_device(ctx, physical_device, &*p_create_info, p_allocator) } {
        Ok(device) => {
            unsafe { *p_device = device };
            vk::Result::SUCCESS
        }
        Err(e) => fail("vkCreateDevice", e),
    }
}

#[no_mangle]
pub unsafe extern "system" fn vkDestroyDevice(device: vk::Device, p_allocator: *const vk::AllocationCallbacks<'_>) {
    if !device.is_null() {
        unsafe { chain::destroy_device(device, p_allocator) };
    }
}

#[no_mangle]
pub unsafe extern "system" fn vkEnumerateDeviceLayerProperties(
    _physical_device: vk::PhysicalDevice,
    p_property_count: *mut u32,
    p_properties: *mut vk::LayerProperties,
) -> vk::Result {
    unsafe { fill_properties(&layers::device_layer_properties(), p_property_count, p_properties) }
}

#[no_mangle]
pub unsafe extern "system" fn vkEnumerateDeviceExtensionProperties(
    physical_device: vk::PhysicalDevice,
    p_layer_name: *const c_char,
    p_property_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    match unsafe { chain::device_extensions(physical_device, optional_name(p_layer_name)) } {
        Ok(list) => unsafe { fill_properties(&list, p_property_count, p_properties) },
        Err(e) => fail("vkEnumerateDeviceExtensionProperties", e),
    }
}

// ── Proc addresses ──────────────────────────────────────────

/// Commands valid with a null instance.
fn global_proc(name: &str) -> vk::PFN_vkVoidFunction {
    unsafe {
        match name {
            "vkCreateInstance" => Some(std::mem::transmute(vkCreateInstance as *const ())),
            "vkEnumerateInstanceLayerProperties" => {
                Some(std::mem::transmute(vkEnumerateInstanceLayerProperties as *const ()))
            }
            "vkEnumerateInstanceExtensionProperties" => {
                Some(std::mem::transmute(vkEnumerateInstanceExtensionProperties as *const ()))
            }
            _ => None,
        }
    }
}

/// Commands the loader answers itself instead of the dispatch tables.
fn intercepted_proc(name: &str) -> vk::PFN_vkVoidFunction {
    unsafe {
        match name {
            "vkCreateDevice" => Some(std::mem::transmute(vkCreateDevice as *const ())),
            "vkDestroyInstance" => Some(std::mem::transmute(vkDestroyInstance as *const ())),
            "vkDestroyDevice" => Some(std::mem::transmute(vkDestroyDevice as *const ())),
            "vkEnumerateDeviceLayerProperties" => {
                Some(std::mem::transmute(vkEnumerateDeviceLayerProperties as *const ()))
            }
            "vkEnumerateDeviceExtensionProperties" => {
                Some(std::mem::transmute(vkEnumerateDeviceExtensionProperties as *const ()))
            }
            "vkGetInstanceProcAddr" => Some(std::mem::transmute(vkGetInstanceProcAddr as *const ())),
            "vkGetDeviceProcAddr" => Some(std::mem::transmute(vkGetDeviceProcAddr as *const ())),
            _ => None,
        }
    }
}

#[no_mangle]
pub unsafe extern "system" fn vkGetInstanceProcAddr(instance: vk::Instance, p_name: *const c_char) -> vk::PFN_vkVoidFunction {
    if p_name.is_null() {
        return None;
    }
    let Ok(name) = unsafe { CStr::from_ptr(p_name) }.to_str() else {
        return None;
    };

    if instance.is_null() {
        let proc = global_proc(name);
        if proc.is_none() {
            error!("invalid vkGetInstanceProcAddr(VK_NULL_HANDLE, \"{}\") call", name);
        }
        return proc;
    }

    if let Some(proc) = global_proc(name).or_else(|| intercepted_proc(name)) {
        return Some(proc);
    }
    let data = unsafe { get_data(instance) };
    data.dispatch.get(name).or_else(|| DeviceTable::trampoline(name))
}

#[no_mangle]
pub unsafe extern "system" fn vkGetDeviceProcAddr(device: vk::Device, p_name: *const c_char) -> vk::PFN_vkVoidFunction {
    if device.is_null() {
        error!("invalid vkGetDeviceProcAddr(VK_NULL_HANDLE, ...) call");
        return None;
    }
    let name = if p_name.is_null() {
        None
    } else {
        unsafe { CStr::from_ptr(p_name) }.to_str().ok()
    };
    let Some(name) = name.filter(|name| !is_non_device_command(name)) else {
        error!(
            "invalid vkGetDeviceProcAddr({:#x}, \"{}\") call",
            device.as_raw(),
            name.unwrap_or("(null)")
        );
        return None;
    };

    match name {
        "vkGetDeviceProcAddr" | "vkDestroyDevice" => intercepted_proc(name),
        _ => unsafe { get_data(device) }.dispatch.get(name),
    }
}

fn is_non_device_command(name: &str) -> bool {
    global_proc(name).is_some()
        || InstanceTable::NAMES.contains(&name)
        || matches!(
            name,
            "vkCreateDevice" | "vkEnumerateDeviceLayerProperties" | "vkEnumerateDeviceExtensionProperties" | "vkGetInstanceProcAddr"
        )
}
