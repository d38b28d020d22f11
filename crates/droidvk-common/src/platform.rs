/// Directory scanned for layers when the process is debuggable.
pub const DEBUG_LAYER_DIR: &str = "/data/local/debug/vulkan";

/// Returns the vendor layer directory for the running ABI.
pub fn default_layer_dir() -> String {
    #[cfg(target_pointer_width = "64")]
    {
        "/vendor/lib64/vulkan/layers".to_string()
    }
    #[cfg(not(target_pointer_width = "64"))]
    {
        "/vendor/lib/vulkan/layers".to_string()
    }
}

/// Returns the directories searched for the vendor HAL module, in order.
pub fn default_hal_dirs() -> Vec<String> {
    #[cfg(target_pointer_width = "64")]
    {
        vec!["/vendor/lib64/hw".to_string(), "/system/lib64/hw".to_string()]
    }
    #[cfg(not(target_pointer_width = "64"))]
    {
        vec!["/vendor/lib/hw".to_string(), "/system/lib/hw".to_string()]
    }
}

/// Whether the process may expose debug facilities (debug layers, forced
/// layers, the automatic debug-report callback).
pub fn is_dumpable() -> bool {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        // SAFETY: PR_GET_DUMPABLE takes no pointer arguments.
        let rc = unsafe { libc::prctl(libc::PR_GET_DUMPABLE, 0, 0, 0, 0) };
        rc > 0
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        false
    }
}

/// Returns the platform name string.
pub fn platform_name() -> &'static str {
    #[cfg(target_os = "android")]
    { "android" }
    #[cfg(target_os = "linux")]
    { "linux" }
    #[cfg(not(any(target_os = "android", target_os = "linux")))]
    { "unknown" }
}
