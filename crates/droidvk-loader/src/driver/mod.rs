//! The bottom of the layer chain: the loader's view of the vendor driver.
//!
//! Functions here are what the last layer (or the loader top, when no layers
//! are active) reaches. They sanitize create infos, create the instance and
//! device records, stamp dispatchable handles, and answer proc-address
//! queries from the hook table before falling through to the driver.

pub mod create_info;
pub mod hooks;
pub mod tables;

use std::collections::HashSet;
use std::ffi::{c_char, c_void, CStr};

use ash::vk;
use ash::vk::Handle;
use droidvk_core::LoaderError;
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::allocator::Allocator;
use crate::api_table::{DeviceTable, InstanceTable};
use crate::chain::ActiveLayer;
use crate::debug_report::DebugReportCallbackList;
use crate::dispatch::{self, cast_proc, get_data, get_data_mut, Dispatchable, StubLog};
use crate::extensions::{
    fill_properties, name_of, set_name, Extension, ExtensionSet, ANDROID_NATIVE_BUFFER_NAME,
    EXT_DEBUG_REPORT_SPEC_VERSION, KHR_SWAPCHAIN_SPEC_VERSION,
};
use crate::hal::{self, Hal};

use create_info::CreateInfoWrapper;
use hooks::HookType;
pub use tables::{DeviceDriverTable, InstanceDriverTable};

/// Physical devices tracked per instance.
pub const MAX_PHYSICAL_DEVICES: usize = 4;

/// Loader state behind every instance and physical device handle.
#[repr(C)]
pub struct InstanceData {
    /// Application-facing table. Must stay the first field.
    pub dispatch: InstanceTable,
    pub driver: InstanceDriverTable,
    pub hook_extensions: ExtensionSet,
    pub allocator: Allocator,
    pub get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    /// The handle the driver returned.
    pub instance: vk::Instance,
    pub(crate) layers: Vec<ActiveLayer>,
    pub(crate) debug_callback: Option<(vk::DebugReportCallbackEXT, vk::PFN_vkDestroyDebugReportCallbackEXT)>,
    pub debug_report_callbacks: DebugReportCallbackList,
    physical_devices: Mutex<Vec<vk::PhysicalDevice>>,
    reported: Mutex<HashSet<&'static str>>,
}

impl InstanceData {
    fn new(
        instance: vk::Instance,
        driver: InstanceDriverTable,
        hook_extensions: ExtensionSet,
        allocator: Allocator,
        get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    ) -> Self {
        Self {
            dispatch: InstanceTable::stubbed(),
            driver,
            hook_extensions,
            allocator,
            get_device_proc_addr,
            instance,
            layers: Vec::new(),
            debug_callback: None,
            debug_report_callbacks: DebugReportCallbackList::new(),
            physical_devices: Mutex::new(Vec::new()),
            reported: Mutex::new(HashSet::new()),
        }
    }

    /// Layers active on this instance, in chain order.
    pub fn active_layers(&self) -> &[ActiveLayer] {
        &self.layers
    }

    /// Physical devices the driver has returned so far.
    pub fn physical_devices(&self) -> Vec<vk::PhysicalDevice> {
        self.physical_devices.lock().clone()
    }

    fn is_known_physical_device(&self, physical_device: vk::PhysicalDevice) -> bool {
        self.physical_devices.lock().contains(&physical_device)
    }
}

impl StubLog for InstanceData {
    fn first_report(&self, command: &'static str) -> bool {
        self.reported.lock().insert(command)
    }
}

/// Loader state behind every device, queue and command buffer handle.
#[repr(C)]
pub struct DeviceData {
    /// Application-facing table. Must stay the first field.
    pub dispatch: DeviceTable,
    pub driver: DeviceDriverTable,
    pub hook_extensions: ExtensionSet,
    pub allocator: Allocator,
    pub device: vk::Device,
    pub instance: *const InstanceData,
    pub(crate) layers: Vec<ActiveLayer>,
    reported: Mutex<HashSet<&'static str>>,
}

impl DeviceData {
    pub fn active_layers(&self) -> &[ActiveLayer] {
        &self.layers
    }

    /// The record of the instance this device was created from.
    pub fn instance_data(&self) -> &InstanceData {
        unsafe { &*self.instance }
    }
}

impl StubLog for DeviceData {
    fn first_report(&self, command: &'static str) -> bool {
        self.reported.lock().insert(command)
    }
}

impl Dispatchable for vk::Instance {
    type Data = InstanceData;
}

impl Dispatchable for vk::PhysicalDevice {
    type Data = InstanceData;
}

impl Dispatchable for vk::Device {
    type Data = DeviceData;
}

impl Dispatchable for vk::Queue {
    type Data = DeviceData;
}

impl Dispatchable for vk::CommandBuffer {
    type Data = DeviceData;
}

fn open_hal() -> Result<&'static Hal, LoaderError> {
    hal::get().ok_or_else(|| LoaderError::InitializationFailed("Vulkan HAL is not open".to_string()))
}

fn report(command: &str, result: Result<(), LoaderError>) -> vk::Result {
    match result {
        Ok(()) => vk::Result::SUCCESS,
        Err(e) => {
            warn!("{} failed: {}", command, e);
            e.into()
        }
    }
}

// ── Instance ─────────────────────────────────────────────────

pub unsafe extern "system" fn create_instance(
    p_create_info: *const vk::InstanceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_instance: *mut vk::Instance,
) -> vk::Result {
    let result = unsafe { create_instance_impl(&*p_create_info, p_allocator) }.map(|instance| unsafe {
        *p_instance = instance;
    });
    report("vkCreateInstance", result)
}

unsafe fn create_instance_impl(
    create_info: &vk::InstanceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) -> Result<vk::Instance, LoaderError> {
    let hal = open_hal()?;
    let allocator = unsafe { Allocator::resolve(p_allocator, &Allocator::default_allocator()) };
    let wrapper = unsafe { CreateInfoWrapper::for_instance(create_info, hal) }?;

    let mut instance = vk::Instance::null();
    let result = unsafe { hal.create_instance(wrapper.info(), p_allocator, &mut instance) };
    if result != vk::Result::SUCCESS {
        return Err(result.into());
    }

    let destroy = |instance: vk::Instance| unsafe {
        if let Some(proc) = hal.get_instance_proc_addr(instance, c"vkDestroyInstance".as_ptr()) {
            cast_proc::<vk::PFN_vkDestroyInstance>(proc)(instance, p_allocator);
        }
    };

    let driver = match unsafe {
        InstanceDriverTable::init(
            |name| hal.get_instance_proc_addr(instance, name.as_ptr()),
            wrapper.hal_extensions(),
        )
    } {
        Ok(driver) => driver,
        Err(e) => {
            destroy(instance);
            return Err(e);
        }
    };

    let Some(get_device_proc_addr) = (unsafe { hal.get_instance_proc_addr(instance, c"vkGetDeviceProcAddr".as_ptr()) })
    else {
        error!("missing instance driver proc: vkGetDeviceProcAddr");
        destroy(instance);
        return Err(LoaderError::IncompatibleDriver("missing vkGetDeviceProcAddr".to_string()));
    };

    let data = InstanceData::new(
        instance,
        driver,
        wrapper.hook_extensions(),
        allocator,
        unsafe { cast_proc(get_device_proc_addr) },
    );
    let data = match allocator.create(data, vk::SystemAllocationScope::INSTANCE) {
        Ok(data) => data,
        Err(e) => {
            destroy(instance);
            return Err(e);
        }
    };

    if !unsafe { dispatch::set_dispatch(instance, data as *const c_void) } {
        destroy(instance);
        unsafe { allocator.destroy(data) };
        return Err(LoaderError::IncompatibleDriver("instance handle lacks the loader magic".to_string()));
    }
    Ok(instance)
}

pub unsafe extern "system" fn destroy_instance(instance: vk::Instance, p_allocator: *const vk::AllocationCallbacks<'_>) {
    if instance.is_null() {
        return;
    }
    let data = unsafe { get_data_mut(instance) };
    let (destroy, allocator) = unsafe { ((*data).driver.destroy_instance, (*data).allocator) };
    unsafe {
        destroy(instance, p_allocator);
        allocator.destroy(data);
    }
}

pub unsafe extern "system" fn enumerate_physical_devices(
    instance: vk::Instance,
    p_physical_device_count: *mut u32,
    p_physical_devices: *mut vk::PhysicalDevice,
) -> vk::Result {
    let data = unsafe { get_data(instance) };
    let result = unsafe { (data.driver.enumerate_physical_devices)(instance, p_physical_device_count, p_physical_devices) };
    if !matches!(result, vk::Result::SUCCESS | vk::Result::INCOMPLETE) || p_physical_devices.is_null() {
        return result;
    }

    let count = unsafe { *p_physical_device_count } as usize;
    let devices = unsafe { std::slice::from_raw_parts(p_physical_devices, count) };
    let mut known = data.physical_devices.lock();
    for &physical_device in devices {
        if !unsafe { dispatch::set_dispatch(physical_device, data as *const InstanceData as *const c_void) } {
            return vk::Result::ERROR_INCOMPATIBLE_DRIVER;
        }
        if !known.contains(&physical_device) {
            if known.len() < MAX_PHYSICAL_DEVICES {
                known.push(physical_device);
            } else {
                warn!("more than {} physical devices; {:#x} is not tracked", MAX_PHYSICAL_DEVICES, physical_device.as_raw());
            }
        }
    }
    result
}

/// The driver-plane instance extension list: the loader's own extensions
/// followed by the driver's.
pub fn driver_instance_extensions(hal: &Hal) -> Result<Vec<vk::ExtensionProperties>, LoaderError> {
    let mut list = vec![Extension::KhrSurface.properties(), Extension::KhrAndroidSurface.properties()];
    if hal.debug_report_index().is_none() {
        list.push(Extension::ExtDebugReport.properties());
    }
    for mut ext in hal.instance_extensions()? {
        if name_of(&ext.extension_name) == Extension::ExtDebugReport.c_name() {
            ext.spec_version = ext.spec_version.min(EXT_DEBUG_REPORT_SPEC_VERSION);
        }
        list.push(ext);
    }
    Ok(list)
}

pub unsafe extern "system" fn enumerate_instance_extension_properties(
    p_layer_name: *const c_char,
    p_property_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    let hal = match open_hal() {
        Ok(hal) => hal,
        Err(e) => return e.into(),
    };
    if !p_layer_name.is_null() {
        return unsafe { hal.enumerate_instance_extension_properties(p_layer_name, p_property_count, p_properties) };
    }
    match driver_instance_extensions(hal) {
        Ok(list) => unsafe { fill_properties(&list, p_property_count, p_properties) },
        Err(e) => e.into(),
    }
}

pub unsafe extern "system" fn enumerate_device_extension_properties(
    physical_device: vk::PhysicalDevice,
    p_layer_name: *const c_char,
    p_property_count: *mut u32,
    p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    let data = unsafe { get_data(physical_device) };
    let result = unsafe {
        (data.driver.enumerate_device_extension_properties)(physical_device, p_layer_name, p_property_count, p_properties)
    };
    if p_properties.is_null() || !matches!(result, vk::Result::SUCCESS | vk::Result::INCOMPLETE) {
        return result;
    }

    let count = unsafe { *p_property_count } as usize;
    for ext in unsafe { std::slice::from_raw_parts_mut(p_properties, count) } {
        if name_of(&ext.extension_name) == ANDROID_NATIVE_BUFFER_NAME {
            set_name(&mut ext.extension_name, Extension::KhrSwapchain.c_name());
            ext.spec_version = KHR_SWAPCHAIN_SPEC_VERSION;
        }
    }
    result
}

// ── Device ───────────────────────────────────────────────────

pub unsafe extern "system" fn create_device(
    physical_device: vk::PhysicalDevice,
    p_create_info: *const vk::DeviceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_device: *mut vk::Device,
) -> vk::Result {
    let result = unsafe { create_device_impl(physical_device, &*p_create_info, p_allocator) }
        .map(|device| unsafe { *p_device = device });
    report("vkCreateDevice", result)
}

unsafe fn create_device_impl(
    physical_device: vk::PhysicalDevice,
    create_info: &vk::DeviceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) -> Result<vk::Device, LoaderError> {
    let instance_data = unsafe { get_data(physical_device) };
    if !instance_data.is_known_physical_device(physical_device) {
        warn!(
            "vkCreateDevice: physical device {:#x} was not enumerated",
            physical_device.as_raw()
        );
    }
    let allocator = unsafe { Allocator::resolve(p_allocator, &instance_data.allocator) };
    let wrapper = unsafe { CreateInfoWrapper::for_device(physical_device, create_info, instance_data) }?;

    let mut device = vk::Device::null();
    let result = unsafe { (instance_data.driver.create_device)(physical_device, wrapper.info(), p_allocator, &mut device) };
    if result != vk::Result::SUCCESS {
        return Err(result.into());
    }

    let get_device_proc_addr = instance_data.get_device_proc_addr;
    let destroy = |device: vk::Device| unsafe {
        if let Some(proc) = get_device_proc_addr(device, c"vkDestroyDevice".as_ptr()) {
            cast_proc::<vk::PFN_vkDestroyDevice>(proc)(device, p_allocator);
        }
    };

    let driver = match unsafe {
        DeviceDriverTable::init(|name| get_device_proc_addr(device, name.as_ptr()), wrapper.hal_extensions())
    } {
        Ok(driver) => driver,
        Err(e) => {
            destroy(device);
            return Err(e);
        }
    };

    let data = DeviceData {
        dispatch: DeviceTable::stubbed(),
        driver,
        hook_extensions: wrapper.hook_extensions(),
        allocator,
        device,
        instance: instance_data,
        layers: Vec::new(),
        reported: Mutex::new(HashSet::new()),
    };
    let data = match allocator.create(data, vk::SystemAllocationScope::DEVICE) {
        Ok(data) => data,
        Err(e) => {
            destroy(device);
            return Err(e);
        }
    };

    if !unsafe { dispatch::set_dispatch(device, data as *const c_void) } {
        destroy(device);
        unsafe { allocator.destroy(data) };
        return Err(LoaderError::IncompatibleDriver("device handle lacks the loader magic".to_string()));
    }
    Ok(device)
}

pub unsafe extern "system" fn destroy_device(device: vk::Device, p_allocator: *const vk::AllocationCallbacks<'_>) {
    if device.is_null() {
        return;
    }
    let data = unsafe { get_data_mut(device) };
    let (destroy, allocator) = unsafe { ((*data).driver.destroy_device, (*data).allocator) };
    unsafe {
        destroy(device, p_allocator);
        allocator.destroy(data);
    }
}

pub unsafe extern "system" fn get_device_queue(
    device: vk::Device,
    queue_family_index: u32,
    queue_index: u32,
    p_queue: *mut vk::Queue,
) {
    let data = unsafe { get_data(device) };
    unsafe {
        (data.driver.get_device_queue)(device, queue_family_index, queue_index, p_queue);
        if !(*p_queue).is_null() {
            dispatch::set_dispatch(*p_queue, data as *const DeviceData as *const c_void);
        }
    }
}

pub unsafe extern "system" fn allocate_command_buffers(
    device: vk::Device,
    p_allocate_info: *const vk::CommandBufferAllocateInfo<'_>,
    p_command_buffers: *mut vk::CommandBuffer,
) -> vk::Result {
    let data = unsafe { get_data(device) };
    let result = unsafe { (data.driver.allocate_command_buffers)(device, p_allocate_info, p_command_buffers) };
    if result == vk::Result::SUCCESS {
        let count = unsafe { (*p_allocate_info).command_buffer_count } as usize;
        for &command_buffer in unsafe { std::slice::from_raw_parts(p_command_buffers, count) } {
            unsafe { dispatch::set_dispatch(command_buffer, data as *const DeviceData as *const c_void) };
        }
    }
    result
}

// ── Proc addresses ───────────────────────────────────────────

pub unsafe extern "system" fn get_instance_proc_addr(instance: vk::Instance, p_name: *const c_char) -> vk::PFN_vkVoidFunction {
    let name = unsafe { CStr::from_ptr(p_name) };
    let Some(hook) = hooks::find(name) else {
        if instance.is_null() {
            return None;
        }
        let data = unsafe { get_data(instance) };
        return unsafe { (data.driver.get_instance_proc_addr)(instance, p_name) };
    };

    match hook.kind {
        HookType::Global => hook.proc_,
        // Layers written against the v0 interface look up vkCreateDevice
        // without an instance.
        _ if instance.is_null() => {
            if name == c"vkCreateDevice" {
                hook.proc_
            } else {
                error!("invalid vkGetInstanceProcAddr({}) call with a null instance", name.to_string_lossy());
                None
            }
        }
        HookType::Instance => {
            let data = unsafe { get_data(instance) };
            if data.hook_extensions.contains(hook.extension) {
                hook.proc_
            } else {
                None
            }
        }
        HookType::Device => {
            if hook.extension == Extension::Core {
                hook.proc_
            } else {
                hook.checked_proc
            }
        }
    }
}

pub unsafe extern "system" fn get_device_proc_addr(device: vk::Device, p_name: *const c_char) -> vk::PFN_vkVoidFunction {
    let name = unsafe { CStr::from_ptr(p_name) };
    let data = unsafe { get_data(device) };
    match hooks::find(name) {
        Some(hook) if hook.kind == HookType::Device => {
            if data.hook_extensions.contains(hook.extension) {
                hook.proc_
            } else {
                None
            }
        }
        _ => unsafe { (data.driver.get_device_proc_addr)(device, p_name) },
    }
}
