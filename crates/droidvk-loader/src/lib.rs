//! droidvk Vulkan loader
//!
//! This library is the `libvulkan` an Android application links against. It
//! exports the Vulkan 1.0 entry points, builds a layer chain for every
//! instance and device, and bottoms out in the vendor driver opened through
//! the Vulkan HAL. The loader itself implements the surface, swapchain and
//! debug-report extensions on top of the driver's `VK_ANDROID_native_buffer`.

use std::sync::OnceLock;

use droidvk_core::config::{default_config_path, LoaderConfig};
use droidvk_core::properties::{implicit_layers, ImplicitLayer, Properties, ENABLE_CALLBACK_PROPERTY};
use tracing::{debug, error};

pub mod allocator;
pub mod api_table;
pub mod chain;
pub mod debug_report;
pub mod dispatch;
pub mod driver;
pub mod entry;
pub mod extensions;
pub mod hal;
pub mod layers;
pub mod native_buffer;
pub mod swapchain;
pub mod window;

pub use entry::{vkCreateInstance, vkGetDeviceProcAddr, vkGetInstanceProcAddr};

// ── Loader context ──────────────────────────────────────────

/// Process-wide loader settings, fixed at first use.
#[derive(Debug, Clone)]
pub struct LoaderContext {
    pub config: LoaderConfig,
    pub properties: Properties,
    /// Whether debug facilities (debug layer directory, forced layers, the
    /// logging debug-report callback) are available.
    pub debuggable: bool,
}

impl LoaderContext {
    pub fn new(config: LoaderConfig, debuggable: bool) -> Self {
        let properties = Properties::new(config.properties.clone());
        Self {
            config,
            properties,
            debuggable,
        }
    }

    /// Settings from the configuration file and the process state.
    pub fn from_environment() -> Self {
        let config = LoaderConfig::load_or_default(&default_config_path());
        Self::new(config, droidvk_common::platform::is_dumpable())
    }

    /// Layers forced on by properties, ordered by priority.
    pub fn implicit_layers(&self) -> Vec<ImplicitLayer> {
        if !self.debuggable {
            return Vec::new();
        }
        implicit_layers(&self.properties)
    }

    /// Whether new instances get the logging debug-report callback.
    pub fn debug_callback_enabled(&self) -> bool {
        self.debuggable && self.properties.get_bool(ENABLE_CALLBACK_PROPERTY, false)
    }
}

static CONTEXT: OnceLock<LoaderContext> = OnceLock::new();
static INITIALIZED: OnceLock<bool> = OnceLock::new();

/// Install the loader settings. Only effective before first use.
pub fn configure(ctx: LoaderContext) -> bool {
    CONTEXT.set(ctx).is_ok()
}

/// The loader settings, read from the environment on first use.
pub fn context() -> &'static LoaderContext {
    CONTEXT.get_or_init(LoaderContext::from_environment)
}

/// Open the HAL and discover layers, once per process.
///
/// Returns the settings when initialization succeeded.
pub fn ensure_initialized() -> Option<&'static LoaderContext> {
    let initialized = *INITIALIZED.get_or_init(|| {
        let ctx = context();
        droidvk_common::try_init_logging(&ctx.config.logging.filter);

        if !hal::open(&ctx.config.hal, &ctx.properties) {
            error!("Vulkan loader initialization failed");
            return false;
        }
        layers::discover_layers(&ctx.config.layers, ctx.debuggable);
        debug!(
            "loader initialized on {} with {} layers",
            droidvk_common::platform::platform_name(),
            layers::instance_layer_properties().len()
        );
        true
    });
    initialized.then(context)
}
