//! Layer discovery and the layer library manager.
//!
//! Layer libraries (`libVkLayer*.so`) are opened once during discovery to copy
//! their layer and extension property tables, then closed. A library is opened
//! again only while at least one [`LayerRef`] on one of its layers is alive;
//! the library table and its refcounts live behind a single mutex.

use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use droidvk_core::config::LayerConfig;
use droidvk_core::LoaderError;
use libloading::Library;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::extensions::{enumerate_into_vec, name_of};

const LAYER_LIBRARY_PREFIX: &str = "libVkLayer";
const LAYER_LIBRARY_SUFFIX: &str = ".so";

/// A layer library linked into the process, described by a symbol lookup
/// function instead of a file.
#[derive(Clone, Copy)]
pub struct StaticLayerLibrary {
    pub name: &'static str,
    pub lookup: fn(&CStr) -> vk::PFN_vkVoidFunction,
}

enum LibrarySource {
    Path(PathBuf),
    Static(StaticLayerLibrary),
}

impl LibrarySource {
    fn describe(&self) -> String {
        match self {
            LibrarySource::Path(path) => path.display().to_string(),
            LibrarySource::Static(lib) => format!("static:{}", lib.name),
        }
    }
}

/// An open layer library.
enum OpenLibrary {
    Dynamic(Library),
    Static(StaticLayerLibrary),
}

impl OpenLibrary {
    fn open(source: &LibrarySource) -> Result<Self, String> {
        match source {
            LibrarySource::Path(path) => open_dynamic(path).map(OpenLibrary::Dynamic),
            LibrarySource::Static(lib) => Ok(OpenLibrary::Static(*lib)),
        }
    }

    fn symbol(&self, name: &CStr) -> vk::PFN_vkVoidFunction {
        match self {
            OpenLibrary::Dynamic(lib) => unsafe {
                lib.get::<unsafe extern "system" fn()>(name.to_bytes_with_nul())
                    .ok()
                    .map(|sym| *sym)
            },
            OpenLibrary::Static(lib) => (lib.lookup)(name),
        }
    }
}

#[cfg(unix)]
fn open_dynamic(path: &Path) -> Result<Library, String> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};

    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }
        .map(Library::from)
        .map_err(|e| e.to_string())
}

#[cfg(not(unix))]
fn open_dynamic(path: &Path) -> Result<Library, String> {
    unsafe { Library::new(path) }.map_err(|e| e.to_string())
}

struct LayerLibrary {
    source: LibrarySource,
    refcount: usize,
    handle: Option<OpenLibrary>,
}

/// A discovered layer. Immutable after discovery.
pub struct Layer {
    properties: vk::LayerProperties,
    library_index: usize,
    instance_extensions: Vec<vk::ExtensionProperties>,
    device_extensions: Vec<vk::ExtensionProperties>,
    /// Also usable as a device layer.
    is_global: bool,
}

impl Layer {
    pub fn name(&self) -> &CStr {
        name_of(&self.properties.layer_name)
    }

    pub fn properties(&self) -> &vk::LayerProperties {
        &self.properties
    }

    pub fn instance_extensions(&self) -> &[vk::ExtensionProperties] {
        &self.instance_extensions
    }

    pub fn device_extensions(&self) -> &[vk::ExtensionProperties] {
        &self.device_extensions
    }

    pub fn is_global(&self) -> bool {
        self.is_global
    }
}

struct Registry {
    libraries: Vec<LayerLibrary>,
    layers: Vec<Arc<Layer>>,
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry {
    libraries: Vec::new(),
    layers: Vec::new(),
});

/// Scan the layer directories and record every layer found.
pub fn discover_layers(config: &LayerConfig, dumpable: bool) {
    if dumpable {
        discover_layers_in_directory(Path::new(&config.debug_layer_path));
    }
    discover_layers_in_directory(Path::new(&config.layer_path));
}

/// Record every `libVkLayer*.so` in `dir`. A missing directory is not an error.
pub fn discover_layers_in_directory(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("layer directory {} not scanned: {}", dir.display(), e);
            return;
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(LAYER_LIBRARY_PREFIX) && name.ends_with(LAYER_LIBRARY_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    for path in paths {
        add_layer_library(LibrarySource::Path(path));
    }
}

/// Register a layer library linked into the process. Returns the number of
/// layers it contributed.
pub fn register_static_layer_library(library: StaticLayerLibrary) -> usize {
    add_layer_library(LibrarySource::Static(library))
}

fn add_layer_library(source: LibrarySource) -> usize {
    let description = source.describe();
    let library = match OpenLibrary::open(&source) {
        Ok(library) => library,
        Err(e) => {
            warn!("failed to open layer library '{}': {}", description, e);
            return 0;
        }
    };

    let discovered = match read_layer_tables(&library) {
        Ok(layers) => layers,
        Err(e) => {
            warn!("failed to read layers of '{}': {}", description, e);
            return 0;
        }
    };
    drop(library);

    let mut registry = REGISTRY.lock();
    let library_index = registry.libraries.len();
    let mut added = 0;
    for mut layer in discovered {
        let name = layer.name().to_owned();
        if registry.layers.iter().any(|existing| existing.name() == name.as_c_str()) {
            warn!(
                "ignored duplicate layer {} in library {}",
                name.to_string_lossy(),
                description
            );
            continue;
        }
        layer.library_index = library_index;
        info!(
            "added {} layer {} from library {}",
            if layer.is_global { "global" } else { "instance" },
            name.to_string_lossy(),
            description
        );
        registry.layers.push(Arc::new(layer));
        added += 1;
    }

    if added > 0 {
        registry.libraries.push(LayerLibrary {
            source,
            refcount: 0,
            handle: None,
        });
    }
    added
}

type EnumerateDeviceLayerProperties =
    unsafe extern "system" fn(vk::PhysicalDevice, *mut u32, *mut vk::LayerProperties) -> vk::Result;

fn read_layer_tables(library: &OpenLibrary) -> Result<Vec<Layer>, String> {
    let enumerate_instance_layers = library
        .symbol(c"vkEnumerateInstanceLayerProperties")
        .ok_or("missing vkEnumerateInstanceLayerProperties")?;
    let enumerate_instance_extensions = library
        .symbol(c"vkEnumerateInstanceExtensionProperties")
        .ok_or("missing vkEnumerateInstanceExtensionProperties")?;
    let enumerate_device_layers = library.symbol(c"vkEnumerateDeviceLayerProperties");
    let enumerate_device_extensions = library.symbol(c"vkEnumerateDeviceExtensionProperties");

    let (enumerate_instance_layers, enumerate_instance_extensions, enumerate_device_layers, enumerate_device_extensions) = unsafe {
        (
            std::mem::transmute::<unsafe extern "system" fn(), vk::PFN_vkEnumerateInstanceLayerProperties>(
                enumerate_instance_layers,
            ),
            std::mem::transmute::<unsafe extern "system" fn(), vk::PFN_vkEnumerateInstanceExtensionProperties>(
                enumerate_instance_extensions,
            ),
            enumerate_device_layers
                .map(|f| std::mem::transmute::<unsafe extern "system" fn(), EnumerateDeviceLayerProperties>(f)),
            enumerate_device_extensions.map(|f| {
                std::mem::transmute::<unsafe extern "system" fn(), vk::PFN_vkEnumerateDeviceExtensionProperties>(f)
            }),
        )
    };

    let instance_layers = enumerate_into_vec(|count, props| unsafe { enumerate_instance_layers(count, props) })
        .map_err(|e| format!("vkEnumerateInstanceLayerProperties failed: {:?}", e))?;

    let device_layers = match enumerate_device_layers {
        Some(enumerate) => Some(
            enumerate_into_vec(|count, props| unsafe { enumerate(vk::PhysicalDevice::null(), count, props) })
                .map_err(|e| format!("vkEnumerateDeviceLayerProperties failed: {:?}", e))?,
        ),
        None => None,
    };

    let mut layers = Vec::with_capacity(instance_layers.len());
    for properties in instance_layers {
        let name = name_of(&properties.layer_name).to_owned();
        let instance_extensions = enumerate_into_vec(|count, props| unsafe {
            enumerate_instance_extensions(name.as_ptr(), count, props)
        })
        .map_err(|e| {
            format!(
                "vkEnumerateInstanceExtensionProperties({}) failed: {:?}",
                name.to_string_lossy(),
                e
            )
        })?;

        let is_global = match &device_layers {
            Some(device_layers) => device_layers
                .iter()
                .any(|layer| name_of(&layer.layer_name) == name.as_c_str()),
            None => true,
        };

        let device_extensions = match (is_global, enumerate_device_extensions) {
            (true, Some(enumerate)) => enumerate_into_vec(|count, props| unsafe {
                enumerate(vk::PhysicalDevice::null(), name.as_ptr(), count, props)
            })
            .map_err(|e| {
                format!(
                    "vkEnumerateDeviceExtensionProperties({}) failed: {:?}",
                    name.to_string_lossy(),
                    e
                )
            })?,
            _ => Vec::new(),
        };

        layers.push(Layer {
            properties,
            library_index: 0,
            instance_extensions,
            device_extensions,
            is_global,
        });
    }
    Ok(layers)
}

fn find_layer(name: &CStr) -> Option<Arc<Layer>> {
    REGISTRY
        .lock()
        .layers
        .iter()
        .find(|layer| layer.name() == name)
        .cloned()
}

/// Properties of every discovered instance layer, in discovery order.
pub fn instance_layer_properties() -> Vec<vk::LayerProperties> {
    REGISTRY.lock().layers.iter().map(|layer| layer.properties).collect()
}

/// Properties of every discovered layer that is also a device layer.
pub fn device_layer_properties() -> Vec<vk::LayerProperties> {
    REGISTRY
        .lock()
        .layers
        .iter()
        .filter(|layer| layer.is_global)
        .map(|layer| layer.properties)
        .collect()
}

/// Instance extensions of the named layer, or `None` for an unknown layer.
pub fn instance_layer_extensions(name: &CStr) -> Option<Vec<vk::ExtensionProperties>> {
    find_layer(name).map(|layer| layer.instance_extensions.clone())
}

/// Device extensions of the named device layer, or `None` for an unknown layer.
pub fn device_layer_extensions(name: &CStr) -> Option<Vec<vk::ExtensionProperties>> {
    find_layer(name)
        .filter(|layer| layer.is_global)
        .map(|layer| layer.device_extensions.clone())
}

/// Open state of the library providing a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryStatus {
    pub open: bool,
    pub refcount: usize,
}

pub fn library_status(layer_name: &CStr) -> Option<LibraryStatus> {
    let registry = REGISTRY.lock();
    let layer = registry.layers.iter().find(|layer| layer.name() == layer_name)?;
    let library = &registry.libraries[layer.library_index];
    Some(LibraryStatus {
        open: library.handle.is_some(),
        refcount: library.refcount,
    })
}

/// Number of layer libraries currently open.
pub fn open_library_count() -> usize {
    REGISTRY
        .lock()
        .libraries
        .iter()
        .filter(|library| library.handle.is_some())
        .count()
}

/// An activation of a layer. Keeps the layer's library open.
pub struct LayerRef {
    layer: Arc<Layer>,
    get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    get_device_proc_addr: Option<vk::PFN_vkGetDeviceProcAddr>,
}

impl LayerRef {
    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    pub fn name(&self) -> &CStr {
        self.layer.name()
    }

    pub fn get_instance_proc_addr(&self) -> vk::PFN_vkGetInstanceProcAddr {
        self.get_instance_proc_addr
    }

    pub fn get_device_proc_addr(&self) -> Option<vk::PFN_vkGetDeviceProcAddr> {
        self.get_device_proc_addr
    }
}

impl Drop for LayerRef {
    fn drop(&mut self) {
        let mut registry = REGISTRY.lock();
        let library = &mut registry.libraries[self.layer.library_index];
        library.refcount = library.refcount.saturating_sub(1);
        if library.refcount == 0 {
            debug!("closing layer library {}", library.source.describe());
            library.handle = None;
        }
    }
}

/// Activate an instance layer.
pub fn get_instance_layer_ref(name: &CStr) -> Result<LayerRef, LoaderError> {
    activate(name, false)
}

/// Activate a device layer.
pub fn get_device_layer_ref(name: &CStr) -> Result<LayerRef, LoaderError> {
    activate(name, true)
}

fn layer_symbol_name(layer: &CStr, suffix: &str) -> Option<CString> {
    let mut name = layer.to_bytes().to_vec();
    name.extend_from_slice(suffix.as_bytes());
    CString::new(name).ok()
}

fn resolve_gpa(library: &OpenLibrary, layer: &CStr, suffix: &str) -> vk::PFN_vkVoidFunction {
    layer_symbol_name(layer, suffix)
        .and_then(|symbol| library.symbol(&symbol))
        .or_else(|| {
            let fallback = format!("vk{}\0", suffix);
            CStr::from_bytes_with_nul(fallback.as_bytes())
                .ok()
                .and_then(|symbol| library.symbol(symbol))
        })
}

fn activate(name: &CStr, device: bool) -> Result<LayerRef, LoaderError> {
    let not_present = || LoaderError::LayerNotPresent(name.to_string_lossy().into_owned());

    let mut registry = REGISTRY.lock();
    let layer = registry
        .layers
        .iter()
        .find(|layer| layer.name() == name && (!device || layer.is_global))
        .cloned()
        .ok_or_else(not_present)?;

    let library = &mut registry.libraries[layer.library_index];
    if library.refcount == 0 {
        match OpenLibrary::open(&library.source) {
            Ok(handle) => library.handle = Some(handle),
            Err(e) => {
                error!("failed to open layer library '{}': {}", library.source.describe(), e);
                return Err(not_present());
            }
        }
    }
    library.refcount += 1;

    let resolved = library.handle.as_ref().map(|handle| {
        (
            resolve_gpa(handle, name, "GetInstanceProcAddr"),
            resolve_gpa(handle, name, "GetDeviceProcAddr"),
        )
    });
    drop(registry);

    // From here on the activation is live; dropping it on error releases the library.
    let (gipa, gdpa) = resolved.unwrap_or((None, None));
    let (gipa, gdpa) = unsafe {
        (
            gipa.map(|f| std::mem::transmute::<unsafe extern "system" fn(), vk::PFN_vkGetInstanceProcAddr>(f)),
            gdpa.map(|f| std::mem::transmute::<unsafe extern "system" fn(), vk::PFN_vkGetDeviceProcAddr>(f)),
        )
    };

    let Some(get_instance_proc_addr) = gipa else {
        release(layer.library_index);
        error!("layer {} does not export vkGetInstanceProcAddr", name.to_string_lossy());
        return Err(not_present());
    };
    let layer_ref = LayerRef {
        layer,
        get_instance_proc_addr,
        get_device_proc_addr: gdpa,
    };
    if device && layer_ref.get_device_proc_addr.is_none() {
        error!("layer {} does not export vkGetDeviceProcAddr", name.to_string_lossy());
        return Err(not_present());
    }
    Ok(layer_ref)
}

fn release(library_index: usize) {
    let mut registry = REGISTRY.lock();
    let library = &mut registry.libraries[library_index];
    library.refcount = library.refcount.saturating_sub(1);
    if library.refcount == 0 {
        library.handle = None;
    }
}
