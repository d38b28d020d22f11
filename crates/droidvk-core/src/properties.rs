//! System-property lookup and parsing of the forced ("implicit") layer
//! properties.
//!
//! A property is resolved from, in order: the configuration file's
//! `[properties]` table, the environment (`debug.vulkan.layers` is read from
//! `DEBUG_VULKAN_LAYERS`), and on Android the system property store.

use std::collections::BTreeMap;

use tracing::{trace, warn};

/// Maximum length of a system property value, including the terminator.
pub const PROPERTY_VALUE_MAX: i32 = 92;

/// Colon-separated list of forced layers.
pub const LAYERS_PROPERTY: &str = "debug.vulkan.layers";
/// Prefix of `debug.vulkan.layer.<priority>` entries.
pub const LAYER_PROPERTY_PREFIX: &str = "debug.vulkan.layer.";
/// Installs the loader's logging debug-report callback on new instances.
pub const ENABLE_CALLBACK_PROPERTY: &str = "debug.vulkan.enable_callback";
/// Forces the stub HAL.
pub const DISABLE_VULKAN_PROPERTY: &str = "persist.graphics.vulkan.disable";

/// Highest `debug.vulkan.layer.<N>` index probed in the system store.
pub const LAYER_PROPERTY_PROBE_LIMIT: u32 = 32;

/// Property resolver.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    overrides: BTreeMap<String, String>,
}

impl Properties {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        Self { overrides }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(key) {
            return Some(value.clone());
        }
        if let Ok(value) = std::env::var(env_key(key)) {
            return Some(value);
        }
        system_property(key)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| parse_bool(&v)).unwrap_or(default)
    }

    /// All properties whose key starts with `prefix`, later sources
    /// overriding earlier ones (system store, environment, overrides).
    pub fn list_prefixed(&self, prefix: &str) -> Vec<(String, String)> {
        let mut found = BTreeMap::new();

        if cfg!(target_os = "android") {
            for index in 0..=LAYER_PROPERTY_PROBE_LIMIT {
                let key = format!("{}{}", prefix, index);
                if let Some(value) = system_property(&key) {
                    found.insert(key, value);
                }
            }
        }

        let env_prefix = env_key(prefix);
        for (key, value) in std::env::vars() {
            if let Some(rest) = key.strip_prefix(&env_prefix) {
                found.insert(format!("{}{}", prefix, rest.to_ascii_lowercase()), value);
            }
        }

        for (key, value) in &self.overrides {
            if key.starts_with(prefix) {
                found.insert(key.clone(), value.clone());
            }
        }

        found.into_iter().collect()
    }
}

/// Environment variable name for a property key:
/// `debug.vulkan.layers` becomes `DEBUG_VULKAN_LAYERS`.
pub fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| if c == '.' { '_' } else { c.to_ascii_uppercase() })
        .collect()
}

/// Boolean property parsing, as accepted by the platform property tools.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "y" | "yes" | "on" | "true" => Some(true),
        "0" | "n" | "no" | "off" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(target_os = "android")]
fn system_property(key: &str) -> Option<String> {
    let key = std::ffi::CString::new(key).ok()?;
    let mut buf = [0 as libc::c_char; PROPERTY_VALUE_MAX as usize];
    // SAFETY: the buffer holds PROP_VALUE_MAX bytes as the call requires.
    let len = unsafe { libc::__system_property_get(key.as_ptr(), buf.as_mut_ptr()) };
    if len <= 0 {
        return None;
    }
    // SAFETY: the property store always nul-terminates the value.
    let value = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) };
    Some(value.to_string_lossy().into_owned())
}

#[cfg(not(target_os = "android"))]
fn system_property(_key: &str) -> Option<String> {
    None
}

/// A layer forced on by properties rather than requested by the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplicitLayer {
    pub name: String,
    /// Lower values are activated first (closer to the application).
    pub priority: i32,
}

/// Parse the value of `debug.vulkan.layers`.
///
/// Entries get priorities counting up from `-PROPERTY_VALUE_MAX`, so they
/// always precede indexed entries. Empty entries still consume a priority.
pub fn parse_layer_list(value: &str) -> Vec<ImplicitLayer> {
    let mut layers = Vec::new();
    let mut priority = -PROPERTY_VALUE_MAX;

    for name in value.split(':') {
        if !name.is_empty() {
            layers.push(ImplicitLayer {
                name: name.to_string(),
                priority,
            });
        }
        priority += 1;
    }

    layers
}

/// Parse one `debug.vulkan.layer.<priority>` entry.
pub fn parse_indexed_layer(key: &str, value: &str) -> Option<ImplicitLayer> {
    let suffix = key.strip_prefix(LAYER_PROPERTY_PREFIX)?;
    if value.is_empty() {
        return None;
    }

    let digits: String = suffix.chars().take_while(|c| c.is_ascii_digit()).collect();
    let priority = digits.parse::<i32>().unwrap_or(-1);
    if priority < 0 {
        warn!(
            "Ignored implicit layer {} with invalid priority {}",
            value, suffix
        );
        return None;
    }

    Some(ImplicitLayer {
        name: value.to_string(),
        priority,
    })
}

/// Collect every implicit layer, ordered by priority. Entries sharing a
/// priority keep their discovery order.
pub fn implicit_layers(props: &Properties) -> Vec<ImplicitLayer> {
    let mut layers = props
        .get(LAYERS_PROPERTY)
        .map(|value| parse_layer_list(&value))
        .unwrap_or_default();

    for (key, value) in props.list_prefixed(LAYER_PROPERTY_PREFIX) {
        if let Some(layer) = parse_indexed_layer(&key, &value) {
            layers.push(layer);
        }
    }

    layers.sort_by_key(|layer| layer.priority);
    for layer in &layers {
        trace!("Added implicit layer {}", layer.name);
    }
    layers
}
