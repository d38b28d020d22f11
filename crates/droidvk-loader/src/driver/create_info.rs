//! Create-info sanitation at the bottom of the layer chain.
//!
//! The driver must never see the loader's layer-link structures, layer names,
//! or extensions the loader implements itself. `VK_KHR_swapchain` is enabled
//! on the driver as `VK_ANDROID_native_buffer`.

use std::ffi::{c_char, c_void, CStr};

use ash::vk;
use droidvk_core::LoaderError;
use tracing::warn;

use crate::extensions::{contains_extension, cstr_array, enumerate_into_vec, Extension, ExtensionSet};
use crate::hal::Hal;

use super::InstanceData;

/// `VK_STRUCTURE_TYPE_LOADER_INSTANCE_CREATE_INFO`
pub const LOADER_INSTANCE_CREATE_INFO: vk::StructureType = vk::StructureType::from_raw(47);
/// `VK_STRUCTURE_TYPE_LOADER_DEVICE_CREATE_INFO`
pub const LOADER_DEVICE_CREATE_INFO: vk::StructureType = vk::StructureType::from_raw(48);

/// Skip the loader structures at the head of a `pNext` chain.
///
/// # Safety
/// `p_next` must be a valid structure chain.
pub unsafe fn strip_loader_structs(p_next: *const c_void, loader_type: vk::StructureType) -> *const c_void {
    let mut next = p_next as *const vk::BaseInStructure<'_>;
    while !next.is_null() && unsafe { (*next).s_type } == loader_type {
        next = unsafe { (*next).p_next };
    }
    next as *const c_void
}

/// A sanitized copy of an instance or device create info.
pub struct CreateInfoWrapper<T> {
    info: T,
    // Backing storage of the rewritten extension name array.
    names: Vec<*const c_char>,
    hook_extensions: ExtensionSet,
    hal_extensions: ExtensionSet,
}

impl<T> CreateInfoWrapper<T> {
    pub fn info(&self) -> &T {
        &self.info
    }

    /// Extensions the loader implements for this object.
    pub fn hook_extensions(&self) -> ExtensionSet {
        self.hook_extensions
    }

    /// Known extensions enabled on the driver.
    pub fn hal_extensions(&self) -> ExtensionSet {
        self.hal_extensions
    }

    fn new(info: T) -> Self {
        Self {
            info,
            names: Vec::new(),
            hook_extensions: ExtensionSet::core(),
            hal_extensions: ExtensionSet::core(),
        }
    }

    fn forward(&mut self, name: &CStr, available: &[vk::ExtensionProperties], known: Option<Extension>) {
        if !contains_extension(available, name) {
            return;
        }
        self.names.push(name.as_ptr());
        if let Some(ext) = known {
            self.hal_extensions.insert(ext);
        }
    }
}

impl<'a> CreateInfoWrapper<vk::InstanceCreateInfo<'a>> {
    /// # Safety
    /// `create_info` must be a valid instance create info.
    pub unsafe fn for_instance(create_info: &vk::InstanceCreateInfo<'a>, hal: &Hal) -> Result<Self, LoaderError> {
        let mut info = *create_info;
        info.p_next = unsafe { strip_loader_structs(info.p_next, LOADER_INSTANCE_CREATE_INFO) };
        info.enabled_layer_count = 0;
        info.pp_enabled_layer_names = std::ptr::null();

        let requested = unsafe { cstr_array(info.pp_enabled_extension_names, info.enabled_extension_count) };
        let mut wrapper = Self::new(info);
        if requested.is_empty() {
            return Ok(wrapper);
        }

        let available = hal.instance_extensions()?;
        for name in requested {
            match Extension::from_name(name) {
                Some(ext @ (Extension::KhrSurface | Extension::KhrAndroidSurface)) => {
                    wrapper.hook_extensions.insert(ext);
                }
                Some(Extension::ExtDebugReport) => {
                    wrapper.hook_extensions.insert(Extension::ExtDebugReport);
                    wrapper.forward(name, &available, Some(Extension::ExtDebugReport));
                }
                None => wrapper.forward(name, &available, None),
                Some(_) => warn!("Ignored invalid instance extension {}", name.to_string_lossy()),
            }
        }

        wrapper.info.enabled_extension_count = wrapper.names.len() as u32;
        wrapper.info.pp_enabled_extension_names = wrapper.names.as_ptr();
        Ok(wrapper)
    }
}

impl<'a> CreateInfoWrapper<vk::DeviceCreateInfo<'a>> {
    /// # Safety
    /// `create_info` must be a valid device create info for `physical_device`.
    pub unsafe fn for_device(
        physical_device: vk::PhysicalDevice,
        create_info: &vk::DeviceCreateInfo<'a>,
        instance_data: &InstanceData,
    ) -> Result<Self, LoaderError> {
        let mut info = *create_info;
        info.p_next = unsafe { strip_loader_structs(info.p_next, LOADER_DEVICE_CREATE_INFO) };
        info.enabled_layer_count = 0;
        info.pp_enabled_layer_names = std::ptr::null();

        let requested = unsafe { cstr_array(info.pp_enabled_extension_names, info.enabled_extension_count) };
        let mut wrapper = Self::new(info);
        if requested.is_empty() {
            return Ok(wrapper);
        }

        let enumerate = instance_data.driver.enumerate_device_extension_properties;
        let available = enumerate_into_vec(|count, props| unsafe {
            enumerate(physical_device, std::ptr::null(), count, props)
        })?;

        for name in requested {
            match Extension::from_name(name) {
                Some(Extension::KhrSwapchain) => {
                    let native = Extension::AndroidNativeBuffer;
                    if contains_extension(&available, native.c_name()) {
                        wrapper.names.push(native.c_name().as_ptr());
                        wrapper.hal_extensions.insert(native);
                        wrapper.hook_extensions.insert(Extension::KhrSwapchain);
                    }
                }
                None => wrapper.forward(name, &available, None),
                Some(_) => warn!("Ignored invalid device extension {}", name.to_string_lossy()),
            }
        }

        wrapper.info.enabled_extension_count = wrapper.names.len() as u32;
        wrapper.info.pp_enabled_extension_names = wrapper.names.as_ptr();
        Ok(wrapper)
    }
}
