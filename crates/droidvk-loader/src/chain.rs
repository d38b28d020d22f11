//! The layer chain between the exported entry points and the driver plane.
//!
//! A chain is built for every instance and device: forced layers first,
//! then the layers the application asked for, each linked to the next
//! through the standard `VkLayer{Instance,Device}CreateInfo` link records.
//! The last link points at the driver plane. The head's proc-address query
//! fills the application-facing dispatch table.

use std::ffi::{c_char, c_void, CStr, CString};
use std::mem;
use std::ptr;

use ash::vk;
use droidvk_core::LoaderError;
use tracing::{debug, error, info, trace, warn};

use crate::api_table::{DeviceTable, InstanceTable};
use crate::dispatch::{cast_proc, get_data, get_data_mut};
use crate::driver::{
    self,
    create_info::{LOADER_DEVICE_CREATE_INFO, LOADER_INSTANCE_CREATE_INFO},
};
use crate::extensions::{contains_extension, cstr_array, enumerate_into_vec, merge_extensions, Extension, ExtensionSet};
use crate::hal;
use crate::layers::{self, LayerRef};
use crate::LoaderContext;

/// `VK_LAYER_LINK_INFO`
pub const LAYER_FUNCTION_LINK: i32 = 0;

/// `VkLayerInstanceLink`
#[repr(C)]
pub struct LayerInstanceLink {
    pub p_next: *mut LayerInstanceLink,
    pub pfn_next_get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
}

/// `VkLayerDeviceLink`
#[repr(C)]
pub struct LayerDeviceLink {
    pub p_next: *mut LayerDeviceLink,
    pub pfn_next_get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub pfn_next_get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
}

/// `VkLayerInstanceCreateInfo` with `function == VK_LAYER_LINK_INFO`.
#[repr(C)]
pub struct LayerInstanceCreateInfo {
    pub s_type: vk::StructureType,
    pub p_next: *const c_void,
    pub function: i32,
    pub p_layer_info: *mut LayerInstanceLink,
}

/// `VkLayerDeviceCreateInfo` with `function == VK_LAYER_LINK_INFO`.
#[repr(C)]
pub struct LayerDeviceCreateInfo {
    pub s_type: vk::StructureType,
    pub p_next: *const c_void,
    pub function: i32,
    pub p_layer_info: *mut LayerDeviceLink,
}

/// Find the link record a layer receives in its instance create info.
///
/// # Safety
/// `p_next` must be a valid structure chain.
pub unsafe fn find_instance_link<'a>(p_next: *const c_void) -> Option<&'a mut LayerInstanceCreateInfo> {
    let mut next = p_next as *const vk::BaseInStructure<'_>;
    while !next.is_null() {
        if unsafe { (*next).s_type } == LOADER_INSTANCE_CREATE_INFO {
            let info = next as *mut LayerInstanceCreateInfo;
            if unsafe { (*info).function } == LAYER_FUNCTION_LINK {
                return Some(unsafe { &mut *info });
            }
        }
        next = unsafe { (*next).p_next };
    }
    None
}

/// Find the link record a layer receives in its device create info.
///
/// # Safety
/// `p_next` must be a valid structure chain.
pub unsafe fn find_device_link<'a>(p_next: *const c_void) -> Option<&'a mut LayerDeviceCreateInfo> {
    let mut next = p_next as *const vk::BaseInStructure<'_>;
    while !next.is_null() {
        if unsafe { (*next).s_type } == LOADER_DEVICE_CREATE_INFO {
            let info = next as *mut LayerDeviceCreateInfo;
            if unsafe { (*info).function } == LAYER_FUNCTION_LINK {
                return Some(unsafe { &mut *info });
            }
        }
        next = unsafe { (*next).p_next };
    }
    None
}

/// A layer activated on an instance or device.
pub struct ActiveLayer {
    layer: LayerRef,
    implicit: bool,
}

impl ActiveLayer {
    pub fn name(&self) -> &CStr {
        self.layer.name()
    }

    /// Whether the layer was forced on by properties.
    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    pub fn layer_ref(&self) -> &LayerRef {
        &self.layer
    }
}

/// Release activations last-activated first.
pub(crate) fn release_layers(mut layers: Vec<ActiveLayer>) {
    while let Some(layer) = layers.pop() {
        trace!("released layer {}", layer.name().to_string_lossy());
        drop(layer);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Instance,
    Device,
}

impl Scope {
    fn as_str(self) -> &'static str {
        match self {
            Scope::Instance => "instance",
            Scope::Device => "device",
        }
    }
}

struct LayerChain {
    scope: Scope,
    layers: Vec<ActiveLayer>,
}

impl LayerChain {
    fn activate(scope: Scope, requested: &[&CStr], ctx: &LoaderContext) -> Result<Self, LoaderError> {
        let mut chain = Self {
            scope,
            layers: Vec::new(),
        };

        for implicit in ctx.implicit_layers() {
            let Ok(name) = CString::new(implicit.name) else {
                continue;
            };
            if chain.contains(&name) {
                continue;
            }
            match chain.load(&name) {
                Ok(layer) => chain.push(layer, true),
                Err(_) => warn!("Ignored missing implicit layer {}", name.to_string_lossy()),
            }
        }

        for &name in requested {
            if chain.contains(name) {
                if !chain.layers.iter().any(|active| active.implicit && active.name() == name) {
                    warn!("Ignored duplicated layer {}", name.to_string_lossy());
                }
                continue;
            }
            match chain.load(name) {
                Ok(layer) => chain.push(layer, false),
                Err(e) => {
                    error!("Failed to load layer {}", name.to_string_lossy());
                    return Err(e);
                }
            }
        }

        Ok(chain)
    }

    fn load(&self, name: &CStr) -> Result<LayerRef, LoaderError> {
        match self.scope {
            Scope::Instance => layers::get_instance_layer_ref(name),
            Scope::Device => layers::get_device_layer_ref(name),
        }
    }

    fn push(&mut self, layer: LayerRef, implicit: bool) {
        info!("Loaded {} layer {}", self.scope.as_str(), layer.name().to_string_lossy());
        self.layers.push(ActiveLayer { layer, implicit });
    }

    fn contains(&self, name: &CStr) -> bool {
        self.layers.iter().any(|active| active.name() == name)
    }

    fn take_layers(&mut self) -> Vec<ActiveLayer> {
        mem::take(&mut self.layers)
    }

    /// `vkGetInstanceProcAddr` of the first element of the chain.
    fn head_get_instance_proc_addr(&self) -> vk::PFN_vkGetInstanceProcAddr {
        match self.layers.first() {
            Some(first) => first.layer.get_instance_proc_addr(),
            None => driver::get_instance_proc_addr,
        }
    }

    /// `vkGetDeviceProcAddr` of the first element of the chain.
    fn head_get_device_proc_addr(&self) -> vk::PFN_vkGetDeviceProcAddr {
        self.layers
            .first()
            .and_then(|first| first.layer.get_device_proc_addr())
            .unwrap_or(driver::get_device_proc_addr)
    }

    /// One link per active layer; element `i` leads to the element after
    /// layer `i`. The `p_next` pointers stay valid while the vector is not
    /// resized.
    fn instance_links(&self) -> Vec<LayerInstanceLink> {
        let mut links: Vec<LayerInstanceLink> = (0..self.layers.len())
            .map(|i| LayerInstanceLink {
                p_next: ptr::null_mut(),
                pfn_next_get_instance_proc_addr: match self.layers.get(i + 1) {
                    Some(next) => next.layer.get_instance_proc_addr(),
                    None => driver::get_instance_proc_addr,
                },
            })
            .collect();
        let base = links.as_mut_ptr();
        let count = links.len();
        for (i, link) in links.iter_mut().enumerate() {
            if i + 1 < count {
                link.p_next = unsafe { base.add(i + 1) };
            }
        }
        links
    }

    fn device_links(&self) -> Vec<LayerDeviceLink> {
        let mut links: Vec<LayerDeviceLink> = (0..self.layers.len())
            .map(|i| match self.layers.get(i + 1) {
                Some(next) => LayerDeviceLink {
                    p_next: ptr::null_mut(),
                    pfn_next_get_instance_proc_addr: next.layer.get_instance_proc_addr(),
                    pfn_next_get_device_proc_addr: next
                        .layer
                        .get_device_proc_addr()
                        .unwrap_or(driver::get_device_proc_addr),
                },
                None => LayerDeviceLink {
                    p_next: ptr::null_mut(),
                    pfn_next_get_instance_proc_addr: driver::get_instance_proc_addr,
                    pfn_next_get_device_proc_addr: driver::get_device_proc_addr,
                },
            })
            .collect();
        let base = links.as_mut_ptr();
        let count = links.len();
        for (i, link) in links.iter_mut().enumerate() {
            if i + 1 < count {
                link.p_next = unsafe { base.add(i + 1) };
            }
        }
        links
    }

    fn is_layer_extension(&self, name: &CStr) -> bool {
        self.layers.iter().any(|active| {
            let layer = active.layer.layer();
            let list = match self.scope {
                Scope::Instance => layer.instance_extensions(),
                Scope::Device => layer.device_extensions(),
            };
            contains_extension(list, name)
        })
    }

    fn validate_extensions(&self, requested: &[&CStr], driver_list: &[vk::ExtensionProperties]) -> Result<(), LoaderError> {
        for &name in requested {
            if !self.is_layer_extension(name) && !contains_extension(driver_list, name) {
                error!(
                    "Failed to enable missing {} extension {}",
                    self.scope.as_str(),
                    name.to_string_lossy()
                );
                return Err(LoaderError::ExtensionNotPresent(name.to_string_lossy().into_owned()));
            }
        }
        Ok(())
    }
}

impl Drop for LayerChain {
    fn drop(&mut self) {
        release_layers(self.take_layers());
    }
}

// ── Instance ─────────────────────────────────────────────────

/// Build the chain for a new instance and create it through the chain head.
///
/// # Safety
/// Arguments follow `vkCreateInstance`.
pub unsafe fn create_instance(
    ctx: &LoaderContext,
    create_info: &vk::InstanceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) -> Result<vk::Instance, LoaderError> {
    let requested_layers = unsafe { cstr_array(create_info.pp_enabled_layer_names, create_info.enabled_layer_count) };
    let mut chain = LayerChain::activate(Scope::Instance, &requested_layers, ctx)?;

    let mut extension_names: Vec<*const c_char> =
        unsafe { cstr_array(create_info.pp_enabled_extension_names, create_info.enabled_extension_count) }
            .iter()
            .map(|name| name.as_ptr())
            .collect();
    let install_callback = ctx.debug_callback_enabled();
    if install_callback {
        let debug_report = Extension::ExtDebugReport.c_name();
        if !extension_names
            .iter()
            .any(|&name| unsafe { CStr::from_ptr(name) } == debug_report)
        {
            extension_names.push(debug_report.as_ptr());
        }
    }
    let requested_extensions: Vec<&CStr> = extension_names.iter().map(|&name| unsafe { CStr::from_ptr(name) }).collect();

    if !requested_extensions.is_empty() {
        let hal = hal::get().ok_or_else(|| LoaderError::InitializationFailed("Vulkan HAL is not open".to_string()))?;
        let driver_list = driver::driver_instance_extensions(hal)?;
        chain.validate_extensions(&requested_extensions, &driver_list)?;
    }

    let mut links = chain.instance_links();
    let link_info = LayerInstanceCreateInfo {
        s_type: LOADER_INSTANCE_CREATE_INFO,
        p_next: create_info.p_next,
        function: LAYER_FUNCTION_LINK,
        p_layer_info: links.as_mut_ptr(),
    };
    let mut info = *create_info;
    if !links.is_empty() {
        info.p_next = &link_info as *const LayerInstanceCreateInfo as *const c_void;
    }
    info.enabled_extension_count = extension_names.len() as u32;
    info.pp_enabled_extension_names = extension_names.as_ptr();

    let get_instance_proc_addr = chain.head_get_instance_proc_addr();
    let Some(create) = (unsafe { get_instance_proc_addr(vk::Instance::null(), c"vkCreateInstance".as_ptr()) }) else {
        return Err(LoaderError::InitializationFailed(
            "chain head does not provide vkCreateInstance".to_string(),
        ));
    };
    let create: vk::PFN_vkCreateInstance = unsafe { cast_proc(create) };

    let mut instance = vk::Instance::null();
    let result = unsafe { create(&info, p_allocator, &mut instance) };
    if result != vk::Result::SUCCESS {
        return Err(result.into());
    }

    let data = unsafe { get_data_mut(instance) };
    let extensions = ExtensionSet::from_names(requested_extensions.iter().copied());
    match InstanceTable::init(|name| unsafe { get_instance_proc_addr(instance, name.as_ptr()) }, extensions) {
        Ok(table) => unsafe { (*data).dispatch = table },
        Err(e) => {
            error!("failed to initialize instance dispatch table: {}", e);
            if let Some(destroy) = unsafe { get_instance_proc_addr(instance, c"vkDestroyInstance".as_ptr()) } {
                unsafe { cast_proc::<vk::PFN_vkDestroyInstance>(destroy)(instance, p_allocator) };
            }
            return Err(e);
        }
    }

    if install_callback {
        if let Err(e) = unsafe { install_debug_callback(instance, get_instance_proc_addr) } {
            unsafe { ((*data).dispatch.destroy_instance)(instance, p_allocator) };
            return Err(e);
        }
    }

    unsafe { (*data).layers = chain.take_layers() };
    Ok(instance)
}

unsafe fn install_debug_callback(
    instance: vk::Instance,
    get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
) -> Result<(), LoaderError> {
    let create = unsafe { get_instance_proc_addr(instance, c"vkCreateDebugReportCallbackEXT".as_ptr()) };
    let destroy = unsafe { get_instance_proc_addr(instance, c"vkDestroyDebugReportCallbackEXT".as_ptr()) };
    let (Some(create), Some(destroy)) = (create, destroy) else {
        error!("Broken VK_EXT_debug_report support");
        return Err(LoaderError::InitializationFailed("broken VK_EXT_debug_report support".to_string()));
    };
    let create: vk::PFN_vkCreateDebugReportCallbackEXT = unsafe { cast_proc(create) };
    let destroy: vk::PFN_vkDestroyDebugReportCallbackEXT = unsafe { cast_proc(destroy) };

    let create_info = vk::DebugReportCallbackCreateInfoEXT::default()
        .flags(vk::DebugReportFlagsEXT::ERROR | vk::DebugReportFlagsEXT::WARNING)
        .pfn_callback(Some(log_debug_report));
    let mut callback = vk::DebugReportCallbackEXT::null();
    let result = unsafe { create(instance, &create_info, ptr::null(), &mut callback) };
    if result != vk::Result::SUCCESS {
        error!("Failed to install debug report callback");
        return Err(LoaderError::InitializationFailed(format!(
            "debug report callback creation failed: {:?}",
            result
        )));
    }

    unsafe { (*get_data_mut(instance)).debug_callback = Some((callback, destroy)) };
    info!("Installed debug report callback");
    Ok(())
}

/// Forwards debug reports to the log at the matching level.
#[allow(clippy::too_many_arguments)]
unsafe extern "system" fn log_debug_report(
    flags: vk::DebugReportFlagsEXT,
    _object_type: vk::DebugReportObjectTypeEXT,
    _object: u64,
    _location: usize,
    message_code: i32,
    p_layer_prefix: *const c_char,
    p_message: *const c_char,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let lossy = |s: *const c_char| {
        if s.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned()
        }
    };
    let prefix = lossy(p_layer_prefix);
    let message = lossy(p_message);

    if flags.contains(vk::DebugReportFlagsEXT::ERROR) {
        error!(target: "vulkan", "[{}] Code {} : {}", prefix, message_code, message);
    } else if flags.intersects(vk::DebugReportFlagsEXT::WARNING | vk::DebugReportFlagsEXT::PERFORMANCE_WARNING) {
        warn!(target: "vulkan", "[{}] Code {} : {}", prefix, message_code, message);
    } else if flags.contains(vk::DebugReportFlagsEXT::INFORMATION) {
        info!(target: "vulkan", "[{}] Code {} : {}", prefix, message_code, message);
    } else if flags.contains(vk::DebugReportFlagsEXT::DEBUG) {
        debug!(target: "vulkan", "[{}] Code {} : {}", prefix, message_code, message);
    } else {
        trace!(target: "vulkan", "[{}] Code {} : {}", prefix, message_code, message);
    }
    vk::FALSE
}

/// Destroy an instance through its chain, then release its layers.
///
/// # Safety
/// `instance` must be a live instance created by [`create_instance`].
pub unsafe fn destroy_instance(instance: vk::Instance, p_allocator: *const vk::AllocationCallbacks<'_>) {
    let data = unsafe { get_data_mut(instance) };

    if let Some((callback, destroy)) = unsafe { (*data).debug_callback.take() } {
        unsafe { destroy(instance, callback, ptr::null()) };
    }

    let layers = unsafe { mem::take(&mut (*data).layers) };
    let destroy = unsafe { (*data).dispatch.destroy_instance };
    // Frees the instance record.
    unsafe { destroy(instance, p_allocator) };
    release_layers(layers);
}

// ── Device ───────────────────────────────────────────────────

/// Build the chain for a new device and create it through the chain head.
///
/// # Safety
/// Arguments follow `vkCreateDevice`; `physical_device` must have been
/// enumerated from a loader instance.
pub unsafe fn create_device(
    ctx: &LoaderContext,
    physical_device: vk::PhysicalDevice,
    create_info: &vk::DeviceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) -> Result<vk::Device, LoaderError> {
    let instance_data = unsafe { get_data(physical_device) };
    let requested_layers = unsafe { cstr_array(create_info.pp_enabled_layer_names, create_info.enabled_layer_count) };
    let mut chain = LayerChain::activate(Scope::Device, &requested_layers, ctx)?;

    let requested_extensions =
        unsafe { cstr_array(create_info.pp_enabled_extension_names, create_info.enabled_extension_count) };
    if !requested_extensions.is_empty() {
        let enumerate = instance_data.dispatch.enumerate_device_extension_properties;
        let driver_list = enumerate_into_vec(|count, props| unsafe {
            enumerate(physical_device, ptr::null(), count, props)
        })?;
        chain.validate_extensions(&requested_extensions, &driver_list)?;
    }

    let mut links = chain.device_links();
    let link_info = LayerDeviceCreateInfo {
        s_type: LOADER_DEVICE_CREATE_INFO,
        p_next: create_info.p_next,
        function: LAYER_FUNCTION_LINK,
        p_layer_info: links.as_mut_ptr(),
    };
    let mut info = *create_info;
    if !links.is_empty() {
        info.p_next = &link_info as *const LayerDeviceCreateInfo as *const c_void;
    }

    let get_instance_proc_addr = chain.head_get_instance_proc_addr();
    let get_device_proc_addr = chain.head_get_device_proc_addr();
    let Some(create) = (unsafe { get_instance_proc_addr(instance_data.instance, c"vkCreateDevice".as_ptr()) }) else {
        return Err(LoaderError::InitializationFailed(
            "chain head does not provide vkCreateDevice".to_string(),
        ));
    };
    let create: vk::PFN_vkCreateDevice = unsafe { cast_proc(create) };

    let mut device = vk::Device::null();
    let result = unsafe { create(physical_device, &info, p_allocator, &mut device) };
    if result != vk::Result::SUCCESS {
        return Err(result.into());
    }

    let data = unsafe { get_data_mut(device) };
    let extensions = ExtensionSet::from_names(requested_extensions.iter().copied());
    match DeviceTable::init(|name| unsafe { get_device_proc_addr(device, name.as_ptr()) }, extensions) {
        Ok(table) => unsafe { (*data).dispatch = table },
        Err(e) => {
            error!("failed to initialize device dispatch table: {}", e);
            if let Some(destroy) = unsafe { get_device_proc_addr(device, c"vkDestroyDevice".as_ptr()) } {
                unsafe { cast_proc::<vk::PFN_vkDestroyDevice>(destroy)(device, p_allocator) };
            }
            return Err(e);
        }
    }

    unsafe { (*data).layers = chain.take_layers() };
    Ok(device)
}

/// Destroy a device through its chain, then release its layers.
///
/// # Safety
/// `device` must be a live device created by [`create_device`].
pub unsafe fn destroy_device(device: vk::Device, p_allocator: *const vk::AllocationCallbacks<'_>) {
    let data = unsafe { get_data_mut(device) };
    let layers = unsafe { mem::take(&mut (*data).layers) };
    let destroy = unsafe { (*data).dispatch.destroy_device };
    // Frees the device record.
    unsafe { destroy(device, p_allocator) };
    release_layers(layers);
}

// ── Enumeration ──────────────────────────────────────────────

/// Instance extensions: a named layer's own list, or the driver-plane list
/// followed by the extensions of the forced layers.
pub fn instance_extensions(ctx: &LoaderContext, layer_name: Option<&CStr>) -> Result<Vec<vk::ExtensionProperties>, LoaderError> {
    if let Some(name) = layer_name {
        return layers::instance_layer_extensions(name)
            .ok_or_else(|| LoaderError::LayerNotPresent(name.to_string_lossy().into_owned()));
    }

    let hal = hal::get().ok_or_else(|| LoaderError::InitializationFailed("Vulkan HAL is not open".to_string()))?;
    let mut list = driver::driver_instance_extensions(hal)?;
    for implicit in ctx.implicit_layers() {
        let Ok(name) = CString::new(implicit.name) else {
            continue;
        };
        if let Some(extensions) = layers::instance_layer_extensions(&name) {
            merge_extensions(&mut list, &extensions);
        }
    }
    Ok(list)
}

/// Device extensions: a named layer's own list, or the extensions of the
/// instance's requested layers, then the driver-plane list, then those of
/// its forced layers.
///
/// # Safety
/// `physical_device` must have been enumerated from a loader instance.
pub unsafe fn device_extensions(
    physical_device: vk::PhysicalDevice,
    layer_name: Option<&CStr>,
) -> Result<Vec<vk::ExtensionProperties>, LoaderError> {
    if let Some(name) = layer_name {
        return layers::device_layer_extensions(name)
            .ok_or_else(|| LoaderError::LayerNotPresent(name.to_string_lossy().into_owned()));
    }

    let data = unsafe { get_data(physical_device) };
    let mut list = Vec::new();
    for active in data.active_layers().iter().filter(|active| !active.is_implicit()) {
        merge_extensions(&mut list, active.layer.layer().device_extensions());
    }

    let enumerate = data.dispatch.enumerate_device_extension_properties;
    let driver_list = enumerate_into_vec(|count, props| unsafe {
        enumerate(physical_device, ptr::null(), count, props)
    })?;
    merge_extensions(&mut list, &driver_list);

    for active in data.active_layers().iter().filter(|active| active.is_implicit()) {
        merge_extensions(&mut list, active.layer.layer().device_extensions());
    }
    Ok(list)
}

/// Names of the active layers of an instance, in chain order.
///
/// # Safety
/// `instance` must be a live loader instance.
pub unsafe fn instance_layer_names(instance: vk::Instance) -> Vec<CString> {
    let data = unsafe { get_data(instance) };
    data.active_layers().iter().map(|active| active.name().to_owned()).collect()
}

/// Names of the active layers of a device, in chain order.
///
/// # Safety
/// `device` must be a live loader device.
pub unsafe fn device_layer_names(device: vk::Device) -> Vec<CString> {
    let data = unsafe { get_data(device) };
    data.active_layers().iter().map(|active| active.name().to_owned()).collect()
}
