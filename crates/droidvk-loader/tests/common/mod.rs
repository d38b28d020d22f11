//! Shared fixtures for the loader integration tests.
//!
//! Every test binary installs the recording driver as the HAL and registers
//! the two static test layers before the loader initializes. The loader
//! state is process-wide, so tests in one binary run serialized.

#![allow(dead_code)]

pub mod alloc;
pub mod driver;
pub mod layer;
pub mod window;

use std::ffi::{c_char, CStr};
use std::sync::{Arc, Once};

use ash::vk;
use droidvk_core::config::LoaderConfig;
use parking_lot::{Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use vulkan::LoaderContext;

static SERIAL: Mutex<()> = Mutex::new(());
static INIT: Once = Once::new();
static EVENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// Initialize the loader with no forced layers.
pub fn setup() -> MutexGuard<'static, ()> {
    setup_with(&[])
}

/// Initialize the loader with property overrides. Only the first call in a
/// test binary decides the properties.
pub fn setup_with(properties: &[(&str, &str)]) -> MutexGuard<'static, ()> {
    let guard = SERIAL.lock();
    INIT.call_once(|| {
        let mut config = LoaderConfig::default();
        config.layers.layer_path = "/nonexistent/droidvk-test/layers".to_string();
        config.layers.debug_layer_path = "/nonexistent/droidvk-test/debug-layers".to_string();
        config.logging.filter = "debug".to_string();
        config.properties = properties
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        assert!(vulkan::configure(LoaderContext::new(config, true)));
        assert!(vulkan::hal::preload(driver::hal_device()));
        layer::register_layers();
        assert!(vulkan::ensure_initialized().is_some());
    });
    take_events();
    driver::reset();
    guard
}

// ── Call recording ──────────────────────────────────────────

pub fn record(event: impl Into<String>) {
    EVENTS.lock().push(event.into());
}

pub fn take_events() -> Vec<String> {
    std::mem::take(&mut *EVENTS.lock())
}

// ── Log capture ─────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with every log event on this thread captured as text.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, capture.contents())
}

// ── Object helpers ──────────────────────────────────────────

fn name_ptrs(names: &[&CStr]) -> Vec<*const c_char> {
    names.iter().map(|name| name.as_ptr()).collect()
}

pub fn try_create_instance_with(
    layers: &[&CStr],
    extensions: &[&CStr],
    allocator: Option<&vk::AllocationCallbacks<'_>>,
) -> Result<vk::Instance, vk::Result> {
    let layer_ptrs = name_ptrs(layers);
    let extension_ptrs = name_ptrs(extensions);
    let app_info = vk::ApplicationInfo::default()
        .application_name(c"droidvk-test")
        .api_version(vk::API_VERSION_1_0);
    let info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layer_ptrs)
        .enabled_extension_names(&extension_ptrs);

    let mut instance = vk::Instance::null();
    let p_allocator = allocator.map_or(std::ptr::null(), |a| a as *const vk::AllocationCallbacks<'_>);
    let result = unsafe { vulkan::entry::vkCreateInstance(&info, p_allocator, &mut instance) };
    if result == vk::Result::SUCCESS {
        Ok(instance)
    } else {
        Err(result)
    }
}

pub fn try_create_instance(layers: &[&CStr], extensions: &[&CStr]) -> Result<vk::Instance, vk::Result> {
    try_create_instance_with(layers, extensions, None)
}

pub fn create_instance(layers: &[&CStr], extensions: &[&CStr]) -> vk::Instance {
    match try_create_instance(layers, extensions) {
        Ok(instance) => instance,
        Err(other) => panic!("expected instance, got {:?}", other),
    }
}

pub fn destroy_instance(instance: vk::Instance) {
    unsafe { vulkan::entry::vkDestroyInstance(instance, std::ptr::null()) };
}

pub fn physical_devices(instance: vk::Instance) -> Vec<vk::PhysicalDevice> {
    let mut count = 0u32;
    let result = unsafe { vulkan::api_table::vkEnumeratePhysicalDevices(instance, &mut count, std::ptr::null_mut()) };
    assert_eq!(result, vk::Result::SUCCESS);
    let mut devices = vec![vk::PhysicalDevice::null(); count as usize];
    let result = unsafe { vulkan::api_table::vkEnumeratePhysicalDevices(instance, &mut count, devices.as_mut_ptr()) };
    assert_eq!(result, vk::Result::SUCCESS);
    devices.truncate(count as usize);
    devices
}

pub fn try_create_device(
    physical_device: vk::PhysicalDevice,
    layers: &[&CStr],
    extensions: &[&CStr],
) -> Result<vk::Device, vk::Result> {
    let layer_ptrs = name_ptrs(layers);
    let extension_ptrs = name_ptrs(extensions);
    let priorities = [1.0f32];
    let queue_info = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(0)
        .queue_priorities(&priorities)];
    let mut info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_info)
        .enabled_extension_names(&extension_ptrs);
    info.enabled_layer_count = layer_ptrs.len() as u32;
    info.pp_enabled_layer_names = layer_ptrs.as_ptr();

    let mut device = vk::Device::null();
    let result = unsafe { vulkan::entry::vkCreateDevice(physical_device, &info, std::ptr::null(), &mut device) };
    if result == vk::Result::SUCCESS {
        Ok(device)
    } else {
        Err(result)
    }
}

pub fn create_device(physical_device: vk::PhysicalDevice, layers: &[&CStr], extensions: &[&CStr]) -> vk::Device {
    match try_create_device(physical_device, layers, extensions) {
        Ok(device) => device,
        Err(other) => panic!("expected device, got {:?}", other),
    }
}

pub fn destroy_device(device: vk::Device) {
    unsafe { vulkan::entry::vkDestroyDevice(device, std::ptr::null()) };
}

pub fn instance_extension_names(layer: Option<&CStr>) -> Result<Vec<String>, vk::Result> {
    let layer = layer.map_or(std::ptr::null(), |name| name.as_ptr());
    let mut count = 0u32;
    let result = unsafe { vulkan::entry::vkEnumerateInstanceExtensionProperties(layer, &mut count, std::ptr::null_mut()) };
    if result != vk::Result::SUCCESS {
        return Err(result);
    }
    let mut props = vec![vk::ExtensionProperties::default(); count as usize];
    let result = unsafe { vulkan::entry::vkEnumerateInstanceExtensionProperties(layer, &mut count, props.as_mut_ptr()) };
    if result != vk::Result::SUCCESS {
        return Err(result);
    }
    Ok(names_of(&props[..count as usize]))
}

pub fn device_extension_names(physical_device: vk::PhysicalDevice, layer: Option<&CStr>) -> Result<Vec<String>, vk::Result> {
    let layer = layer.map_or(std::ptr::null(), |name| name.as_ptr());
    let mut count = 0u32;
    let result = unsafe {
        vulkan::entry::vkEnumerateDeviceExtensionProperties(physical_device, layer, &mut count, std::ptr::null_mut())
    };
    if result != vk::Result::SUCCESS {
        return Err(result);
    }
    let mut props = vec![vk::ExtensionProperties::default(); count as usize];
    let result = unsafe {
        vulkan::entry::vkEnumerateDeviceExtensionProperties(physical_device, layer, &mut count, props.as_mut_ptr())
    };
    if result != vk::Result::SUCCESS {
        return Err(result);
    }
    Ok(names_of(&props[..count as usize]))
}

pub fn names_of(props: &[vk::ExtensionProperties]) -> Vec<String> {
    props
        .iter()
        .map(|ext| vulkan::extensions::name_of(&ext.extension_name).to_string_lossy().into_owned())
        .collect()
}

/// Resolve `name` through `vkGetInstanceProcAddr` and cast it.
pub unsafe fn instance_proc<F: Copy>(instance: vk::Instance, name: &CStr) -> Option<F> {
    unsafe { vulkan::entry::vkGetInstanceProcAddr(instance, name.as_ptr()) }.map(|proc| unsafe { vulkan::dispatch::cast_proc(proc) })
}

/// Resolve `name` through `vkGetDeviceProcAddr` and cast it.
pub unsafe fn device_proc<F: Copy>(device: vk::Device, name: &CStr) -> Option<F> {
    unsafe { vulkan::entry::vkGetDeviceProcAddr(device, name.as_ptr()) }.map(|proc| unsafe { vulkan::dispatch::cast_proc(proc) })
}

/// Number of open file descriptors in this process.
pub fn open_fd_count() -> usize {
    std::fs::read_dir("/proc/self/fd").map(|dir| dir.count()).unwrap_or(0)
}
