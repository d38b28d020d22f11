//! The vendor driver HAL.
//!
//! The driver ships as a hardware module `vulkan.<variant>.so` exporting the
//! `HMI` symbol. Opening its `vk0` device yields the three global entry
//! points the loader bootstraps everything else from. Without a module the
//! loader falls back to an in-process stub driver with no physical devices.

mod stub;

use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ash::vk;
use droidvk_core::config::HalConfig;
use droidvk_core::properties::{Properties, DISABLE_VULKAN_PROPERTY};
use droidvk_core::LoaderError;
use libloading::Library;
use tracing::{debug, error, info, warn};

use crate::extensions::{enumerate_into_vec, name_of, Extension};

pub const HWVULKAN_HARDWARE_MODULE_ID: &str = "vulkan";
pub const HWVULKAN_DEVICE_0: &CStr = c"vk0";

/// `hw_module_t`
#[repr(C)]
pub struct HwModule {
    pub tag: u32,
    pub module_api_version: u16,
    pub hal_api_version: u16,
    pub id: *const c_char,
    pub name: *const c_char,
    pub author: *const c_char,
    pub methods: *const HwModuleMethods,
    pub dso: *mut c_void,
    pub reserved: [usize; 32 - 7],
}

/// `hw_module_methods_t`
#[repr(C)]
pub struct HwModuleMethods {
    pub open: Option<unsafe extern "C" fn(module: *const HwModule, id: *const c_char, device: *mut *mut HwDevice) -> c_int>,
}

/// `hw_device_t`
#[repr(C)]
pub struct HwDevice {
    pub tag: u32,
    pub version: u32,
    pub module: *mut HwModule,
    pub reserved: [usize; 12],
    pub close: Option<unsafe extern "C" fn(device: *mut HwDevice) -> c_int>,
}

/// `hwvulkan_device_t`
#[repr(C)]
pub struct HwVulkanDevice {
    pub common: HwDevice,
    pub enumerate_instance_extension_properties: Option<vk::PFN_vkEnumerateInstanceExtensionProperties>,
    pub create_instance: Option<vk::PFN_vkCreateInstance>,
    pub get_instance_proc_addr: Option<vk::PFN_vkGetInstanceProcAddr>,
}

/// The driver's global entry points.
#[derive(Clone, Copy)]
pub struct HalDevice {
    pub enumerate_instance_extension_properties: vk::PFN_vkEnumerateInstanceExtensionProperties,
    pub create_instance: vk::PFN_vkCreateInstance,
    pub get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalKind {
    /// A vendor module opened from disk.
    Module,
    /// Entry points supplied by the embedding before first use.
    Preloaded,
    /// The built-in driver without physical devices.
    Stub,
}

pub struct Hal {
    device: HalDevice,
    kind: HalKind,
    debug_report_index: Option<usize>,
    _module: Option<Library>,
}

static HAL: OnceLock<Hal> = OnceLock::new();
static PRELOADED: OnceLock<HalDevice> = OnceLock::new();

/// Supply the driver entry points directly instead of searching for a module.
/// Only effective before the loader initializes.
pub fn preload(device: HalDevice) -> bool {
    if HAL.get().is_some() {
        warn!("HAL already open; preloaded device ignored");
        return false;
    }
    PRELOADED.set(device).is_ok()
}

/// The open HAL, if initialization succeeded.
pub fn get() -> Option<&'static Hal> {
    HAL.get()
}

/// Open the HAL. Called once per process.
pub fn open(config: &HalConfig, props: &Properties) -> bool {
    if HAL.get().is_some() {
        return true;
    }

    let hal = match load(config, props) {
        Ok(hal) => hal,
        Err(e) => {
            error!("failed to open Vulkan HAL device: {}", e);
            return false;
        }
    };
    info!("Vulkan HAL opened ({:?})", hal.kind);
    // A concurrent open lost the race; its result is equivalent.
    let _ = HAL.set(hal);
    true
}

fn load(config: &HalConfig, props: &Properties) -> Result<Hal, LoaderError> {
    if let Some(device) = PRELOADED.get() {
        return Ok(Hal::new(*device, HalKind::Preloaded, None));
    }

    if props.get_bool(DISABLE_VULKAN_PROPERTY, false) {
        info!("Vulkan disabled by {}, using stub HAL", DISABLE_VULKAN_PROPERTY);
        return Ok(Hal::new(stub::device(), HalKind::Stub, None));
    }

    let Some(path) = find_module(config, props) else {
        info!("no Vulkan HAL present, using stub HAL");
        return Ok(Hal::new(stub::device(), HalKind::Stub, None));
    };

    let library = unsafe { Library::new(&path) }
        .map_err(|e| LoaderError::InitializationFailed(format!("failed to load {}: {}", path.display(), e)))?;
    let module = match unsafe { library.get::<*const HwModule>(b"HMI\0") } {
        Ok(symbol) => *symbol,
        Err(e) => {
            return Err(LoaderError::InitializationFailed(format!(
                "{} has no HMI symbol: {}",
                path.display(),
                e
            )))
        }
    };

    let device = unsafe { open_device(module) }?;
    debug!("opened {} device of {}", HWVULKAN_HARDWARE_MODULE_ID, path.display());
    Ok(Hal::new(device, HalKind::Module, Some(library)))
}

/// Locate `vulkan.<variant>.so`, trying each variant property and then
/// `default` in every search directory.
pub fn find_module(config: &HalConfig, props: &Properties) -> Option<PathBuf> {
    if let Some(path) = &config.module_path {
        return Some(PathBuf::from(path));
    }

    let mut variants: Vec<String> = config
        .variant_properties
        .iter()
        .filter_map(|key| props.get(key))
        .filter(|value| !value.is_empty())
        .collect();
    variants.push("default".to_string());

    for variant in &variants {
        for dir in &config.search_paths {
            let path = Path::new(dir).join(format!("{}.{}.so", HWVULKAN_HARDWARE_MODULE_ID, variant));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

unsafe fn open_device(module: *const HwModule) -> Result<HalDevice, LoaderError> {
    let failed = |reason: String| LoaderError::InitializationFailed(reason);

    if module.is_null() {
        return Err(failed("null HMI".to_string()));
    }
    let methods = unsafe { (*module).methods };
    let open = if methods.is_null() { None } else { unsafe { (*methods).open } };
    let Some(open) = open else {
        return Err(failed("module has no open method".to_string()));
    };

    let mut device: *mut HwDevice = std::ptr::null_mut();
    let rc = unsafe { open(module, HWVULKAN_DEVICE_0.as_ptr(), &mut device) };
    if rc != 0 {
        return Err(failed(format!("{} ({})", std::io::Error::from_raw_os_error(-rc), rc)));
    }
    if device.is_null() {
        return Err(failed("open returned no device".to_string()));
    }

    let device = unsafe { &*(device as *const HwVulkanDevice) };
    match (
        device.enumerate_instance_extension_properties,
        device.create_instance,
        device.get_instance_proc_addr,
    ) {
        (Some(enumerate_instance_extension_properties), Some(create_instance), Some(get_instance_proc_addr)) => {
            Ok(HalDevice {
                enumerate_instance_extension_properties,
                create_instance,
                get_instance_proc_addr,
            })
        }
        _ => Err(failed("device is missing global entry points".to_string())),
    }
}

impl Hal {
    fn new(device: HalDevice, kind: HalKind, module: Option<Library>) -> Self {
        let mut hal = Self {
            device,
            kind,
            debug_report_index: None,
            _module: module,
        };
        hal.debug_report_index = match hal.instance_extensions() {
            Ok(extensions) => extensions
                .iter()
                .position(|ext| name_of(&ext.extension_name) == Extension::ExtDebugReport.c_name()),
            Err(e) => {
                warn!("HAL vkEnumerateInstanceExtensionProperties failed: {}", e);
                None
            }
        };
        hal
    }

    pub fn kind(&self) -> HalKind {
        self.kind
    }

    /// Position of `VK_EXT_debug_report` in the driver's instance extensions.
    pub fn debug_report_index(&self) -> Option<usize> {
        self.debug_report_index
    }

    pub fn device(&self) -> &HalDevice {
        &self.device
    }

    /// Raw driver enumeration.
    ///
    /// # Safety
    /// Arguments follow `vkEnumerateInstanceExtensionProperties`.
    pub unsafe fn enumerate_instance_extension_properties(
        &self,
        layer_name: *const c_char,
        count: *mut u32,
        properties: *mut vk::ExtensionProperties,
    ) -> vk::Result {
        unsafe { (self.device.enumerate_instance_extension_properties)(layer_name, count, properties) }
    }

    /// The driver's instance extensions.
    pub fn instance_extensions(&self) -> Result<Vec<vk::ExtensionProperties>, LoaderError> {
        enumerate_into_vec(|count, props| unsafe {
            (self.device.enumerate_instance_extension_properties)(std::ptr::null(), count, props)
        })
        .map_err(LoaderError::from)
    }

    /// # Safety
    /// Arguments follow `vkCreateInstance`.
    pub unsafe fn create_instance(
        &self,
        create_info: *const vk::InstanceCreateInfo<'_>,
        allocator: *const vk::AllocationCallbacks<'_>,
        instance: *mut vk::Instance,
    ) -> vk::Result {
        unsafe { (self.device.create_instance)(create_info, allocator, instance) }
    }

    /// # Safety
    /// `name` must be a valid NUL-terminated string.
    pub unsafe fn get_instance_proc_addr(&self, instance: vk::Instance, name: *const c_char) -> vk::PFN_vkVoidFunction {
        unsafe { (self.device.get_instance_proc_addr)(instance, name) }
    }
}
