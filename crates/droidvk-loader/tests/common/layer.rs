//! Two static test layers, `VK_LAYER_TEST_alpha` and `VK_LAYER_TEST_beta`.
//!
//! Both follow the link protocol: read the next proc-address queries from the
//! loader's link record, advance it, then call down. Every intercepted call
//! is recorded as `<layer>:<command>`.

use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use std::sync::OnceLock;

use ash::vk;
use ash::vk::Handle;
use parking_lot::Mutex;
use vulkan::chain::{find_device_link, find_instance_link};
use vulkan::extensions::{fill_properties, set_name};
use vulkan::layers::{register_static_layer_library, StaticLayerLibrary};

use super::record;

pub const ALPHA: &CStr = c"VK_LAYER_TEST_alpha";
pub const BETA: &CStr = c"VK_LAYER_TEST_beta";
pub const ALPHA_INSTANCE_EXTENSION: &CStr = c"VK_EXT_test_alpha";
pub const ALPHA_DEVICE_EXTENSION: &CStr = c"VK_EXT_test_alpha_device";
pub const BETA_INSTANCE_EXTENSION: &CStr = c"VK_EXT_test_beta";

const NAMES: [&CStr; 2] = [ALPHA, BETA];
const SHORT_NAMES: [&str; 2] = ["alpha", "beta"];

#[derive(Default)]
struct Links {
    instances: HashMap<(usize, u64), vk::PFN_vkGetInstanceProcAddr>,
    devices: HashMap<(usize, u64), vk::PFN_vkGetDeviceProcAddr>,
}

static LINKS: OnceLock<Mutex<Links>> = OnceLock::new();

fn links() -> parking_lot::MutexGuard<'static, Links> {
    LINKS.get_or_init(|| Mutex::new(Links::default())).lock()
}

pub fn register_layers() {
    assert_eq!(
        register_static_layer_library(StaticLayerLibrary {
            name: "alpha",
            lookup: lookup::<0>,
        }),
        1
    );
    assert_eq!(
        register_static_layer_library(StaticLayerLibrary {
            name: "beta",
            lookup: lookup::<1>,
        }),
        1
    );
}

fn instance_extensions(id: usize) -> Vec<vk::ExtensionProperties> {
    let name = if id == 0 { ALPHA_INSTANCE_EXTENSION } else { BETA_INSTANCE_EXTENSION };
    let mut props = vk::ExtensionProperties {
        spec_version: 1,
        ..Default::default()
    };
    set_name(&mut props.extension_name, name);
    vec![props]
}

fn device_extensions(id: usize) -> Vec<vk::ExtensionProperties> {
    if id != 0 {
        return Vec::new();
    }
    let mut props = vk::ExtensionProperties {
        spec_version: 1,
        ..Default::default()
    };
    set_name(&mut props.extension_name, ALPHA_DEVICE_EXTENSION);
    vec![props]
}

fn layer_properties(id: usize) -> vk::LayerProperties {
    let mut props = vk::LayerProperties {
        spec_version: vk::API_VERSION_1_0,
        implementation_version: 1,
        ..Default::default()
    };
    set_name(&mut props.layer_name, NAMES[id]);
    set_name(&mut props.description, c"droidvk test layer");
    props
}

fn lookup<const ID: usize>(symbol: &CStr) -> vk::PFN_vkVoidFunction {
    let prefixed_gipa = ID == 0 && symbol.to_bytes() == b"VK_LAYER_TEST_alphaGetInstanceProcAddr";
    let prefixed_gdpa = ID == 0 && symbol.to_bytes() == b"VK_LAYER_TEST_alphaGetDeviceProcAddr";
    unsafe {
        match symbol.to_bytes() {
            b"vkEnumerateInstanceLayerProperties" => Some(std::mem::transmute(enumerate_instance_layers::<ID> as *const ())),
            b"vkEnumerateInstanceExtensionProperties" => {
                Some(std::mem::transmute(enumerate_instance_extensions::<ID> as *const ()))
            }
            b"vkEnumerateDeviceLayerProperties" => Some(std::mem::transmute(enumerate_device_layers::<ID> as *const ())),
            b"vkEnumerateDeviceExtensionProperties" => {
                Some(std::mem::transmute(enumerate_device_extensions::<ID> as *const ()))
            }
            // alpha exports only the prefixed queries, beta only the plain ones.
            b"vkGetInstanceProcAddr" if ID == 1 => Some(std::mem::transmute(get_instance_proc_addr::<ID> as *const ())),
            b"vkGetDeviceProcAddr" if ID == 1 => Some(std::mem::transmute(get_device_proc_addr::<ID> as *const ())),
            _ if prefixed_gipa => Some(std::mem::transmute(get_instance_proc_addr::<ID> as *const ())),
            _ if prefixed_gdpa => Some(std::mem::transmute(get_device_proc_addr::<ID> as *const ())),
            _ => None,
        }
    }
}

// ── Enumeration ─────────────────────────────────────────────

unsafe extern "system" fn enumerate_instance_layers<const ID: usize>(
    p_property_count: *mut u32,
    p_properties: *mut vk::LayerProperties,
) -> vk::Result {
    unsafe { fill_properties(&[layer_properties(ID)], p_property_count, p_properties) }
}

unsafe extern "system" fn enumerate_device_layers<const ID: usize>(
    _physical_device: vk::PhysicalDevice,
    p_property_count: *mut u32,
    p_properties: *mut vk::LayerProperties,
) -> vk::Result {
    unsafe { fill_properties(&[layer_properties(ID)], p_property_count, p_properties) }
}

unsafe fn is_own_name<const ID: usize>(p_layer_name: *const c_char) -> bool {
    !p_layer_name.is_null() && unsafe { CStr::from_ptr(p_layer_name) } == NAMES[ID]
}

unsafe extern "system" fn enumerate_instance_extensions<const ID: usize>(
    p_layer_name: *const c_char,
    p_property_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    if !unsafe { is_own_name::<ID>(p_layer_name) } {
        return vk::Result::ERROR_LAYER_NOT_PRESENT;
    }
    unsafe { fill_properties(&instance_extensions(ID), p_property_count, p_properties) }
}

unsafe extern "system" fn enumerate_device_extensions<const ID: usize>(
    _physical_device: vk::PhysicalDevice,
    p_layer_name: *const c_char,
    p_property_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    if !unsafe { is_own_name::<ID>(p_layer_name) } {
        return vk::Result::ERROR_LAYER_NOT_PRESENT;
    }
    unsafe { fill_properties(&device_extensions(ID), p_property_count, p_properties) }
}

// ── Instance chain ──────────────────────────────────────────

unsafe extern "system" fn create_instance<const ID: usize>(
    p_create_info: *const vk::InstanceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_instance: *mut vk::Instance,
) -> vk::Result {
    record(format!("{}:vkCreateInstance", SHORT_NAMES[ID]));
    let Some(link_info) = (unsafe { find_instance_link((*p_create_info).p_next) }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let link = unsafe { &*link_info.p_layer_info };
    let next_gipa = link.pfn_next_get_instance_proc_addr;
    link_info.p_layer_info = link.p_next;

    let Some(next_create) = (unsafe { next_gipa(vk::Instance::null(), c"vkCreateInstance".as_ptr()) }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let next_create: vk::PFN_vkCreateInstance = unsafe { std::mem::transmute(next_create) };
    let result = unsafe { next_create(p_create_info, p_allocator, p_instance) };
    if result == vk::Result::SUCCESS {
        links().instances.insert((ID, unsafe { *p_instance }.as_raw()), next_gipa);
    }
    result
}

unsafe extern "system" fn destroy_instance<const ID: usize>(
    instance: vk::Instance,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    record(format!("{}:vkDestroyInstance", SHORT_NAMES[ID]));
    let Some(next_gipa) = links().instances.remove(&(ID, instance.as_raw())) else {
        return;
    };
    if let Some(next) = unsafe { next_gipa(instance, c"vkDestroyInstance".as_ptr()) } {
        let next: vk::PFN_vkDestroyInstance = unsafe { std::mem::transmute(next) };
        unsafe { next(instance, p_allocator) };
    }
}

unsafe extern "system" fn get_instance_proc_addr<const ID: usize>(
    instance: vk::Instance,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    let name = unsafe { CStr::from_ptr(p_name) };
    unsafe {
        match name.to_bytes() {
            b"vkGetInstanceProcAddr" => Some(std::mem::transmute(get_instance_proc_addr::<ID> as *const ())),
            b"vkCreateInstance" => Some(std::mem::transmute(create_instance::<ID> as *const ())),
            b"vkDestroyInstance" => Some(std::mem::transmute(destroy_instance::<ID> as *const ())),
            b"vkCreateDevice" => Some(std::mem::transmute(create_device::<ID> as *const ())),
            b"vkGetDeviceProcAddr" => Some(std::mem::transmute(get_device_proc_addr::<ID> as *const ())),
            _ if instance.is_null() => None,
            _ => {
                let next = links().instances.get(&(ID, instance.as_raw())).copied()?;
                next(instance, p_name)
            }
        }
    }
}

// ── Device chain ────────────────────────────────────────────

unsafe extern "system" fn create_device<const ID: usize>(
    physical_device: vk::PhysicalDevice,
    p_create_info: *const vk::DeviceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_device: *mut vk::Device,
) -> vk::Result {
    record(format!("{}:vkCreateDevice", SHORT_NAMES[ID]));
    let Some(link_info) = (unsafe { find_device_link((*p_create_info).p_next) }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let link = unsafe { &*link_info.p_layer_info };
    let (next_gipa, next_gdpa) = (link.pfn_next_get_instance_proc_addr, link.pfn_next_get_device_proc_addr);
    link_info.p_layer_info = link.p_next;

    let Some(next_create) = (unsafe { next_gipa(vk::Instance::null(), c"vkCreateDevice".as_ptr()) }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let next_create: vk::PFN_vkCreateDevice = unsafe { std::mem::transmute(next_create) };
    let result = unsafe { next_create(physical_device, p_create_info, p_allocator, p_device) };
    if result == vk::Result::SUCCESS {
        links().devices.insert((ID, unsafe { *p_device }.as_raw()), next_gdpa);
    }
    result
}

unsafe extern "system" fn destroy_device<const ID: usize>(device: vk::Device, p_allocator: *const vk::AllocationCallbacks<'_>) {
    record(format!("{}:vkDestroyDevice", SHORT_NAMES[ID]));
    let Some(next_gdpa) = links().devices.remove(&(ID, device.as_raw())) else {
        return;
    };
    if let Some(next) = unsafe { next_gdpa(device, c"vkDestroyDevice".as_ptr()) } {
        let next: vk::PFN_vkDestroyDevice = unsafe { std::mem::transmute(next) };
        unsafe { next(device, p_allocator) };
    }
}

unsafe extern "system" fn device_wait_idle<const ID: usize>(device: vk::Device) -> vk::Result {
    record(format!("{}:vkDeviceWaitIdle", SHORT_NAMES[ID]));
    let Some(next_gdpa) = links().devices.get(&(ID, device.as_raw())).copied() else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    match unsafe { next_gdpa(device, c"vkDeviceWaitIdle".as_ptr()) } {
        Some(next) => {
            let next: vk::PFN_vkDeviceWaitIdle = unsafe { std::mem::transmute(next) };
            unsafe { next(device) }
        }
        None => vk::Result::ERROR_DEVICE_LOST,
    }
}

unsafe extern "system" fn get_device_proc_addr<const ID: usize>(
    device: vk::Device,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    let name = unsafe { CStr::from_ptr(p_name) };
    unsafe {
        match name.to_bytes() {
            b"vkGetDeviceProcAddr" => Some(std::mem::transmute(get_device_proc_addr::<ID> as *const ())),
            b"vkDestroyDevice" => Some(std::mem::transmute(destroy_device::<ID> as *const ())),
            b"vkDeviceWaitIdle" => Some(std::mem::transmute(device_wait_idle::<ID> as *const ())),
            _ => {
                let next = links().devices.get(&(ID, device.as_raw())).copied()?;
                next(device, p_name)
            }
        }
    }
}
