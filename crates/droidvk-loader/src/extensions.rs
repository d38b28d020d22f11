//! Extensions known to the loader, per-record extension bitsets and the
//! count / `VK_INCOMPLETE` enumeration protocol.

use std::ffi::{c_char, CStr};
use std::fmt;

use ash::vk;
use tracing::warn;

/// Extensions the loader knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    AndroidNativeBuffer,
    ExtDebugReport,
    KhrAndroidSurface,
    KhrSurface,
    KhrSwapchain,
    /// Pseudo-extension covering core commands.
    Core,
}

pub const ANDROID_NATIVE_BUFFER_NAME: &CStr = c"VK_ANDROID_native_buffer";
pub const ANDROID_NATIVE_BUFFER_SPEC_VERSION: u32 = 8;

pub const KHR_SURFACE_SPEC_VERSION: u32 = 25;
pub const KHR_ANDROID_SURFACE_SPEC_VERSION: u32 = 6;
pub const EXT_DEBUG_REPORT_SPEC_VERSION: u32 = 10;
pub const KHR_SWAPCHAIN_SPEC_VERSION: u32 = 70;

impl Extension {
    pub const ALL: [Extension; 5] = [
        Extension::AndroidNativeBuffer,
        Extension::ExtDebugReport,
        Extension::KhrAndroidSurface,
        Extension::KhrSurface,
        Extension::KhrSwapchain,
    ];

    pub fn c_name(self) -> &'static CStr {
        match self {
            Extension::AndroidNativeBuffer => ANDROID_NATIVE_BUFFER_NAME,
            Extension::ExtDebugReport => c"VK_EXT_debug_report",
            Extension::KhrAndroidSurface => c"VK_KHR_android_surface",
            Extension::KhrSurface => c"VK_KHR_surface",
            Extension::KhrSwapchain => c"VK_KHR_swapchain",
            Extension::Core => c"VK_core",
        }
    }

    pub fn name(self) -> &'static str {
        // All names are ASCII.
        self.c_name().to_str().unwrap_or("VK_unknown")
    }

    pub fn from_name(name: &CStr) -> Option<Self> {
        Self::ALL.into_iter().find(|ext| ext.c_name() == name)
    }

    /// The spec version the loader implements.
    pub fn spec_version(self) -> u32 {
        match self {
            Extension::AndroidNativeBuffer => ANDROID_NATIVE_BUFFER_SPEC_VERSION,
            Extension::ExtDebugReport => EXT_DEBUG_REPORT_SPEC_VERSION,
            Extension::KhrAndroidSurface => KHR_ANDROID_SURFACE_SPEC_VERSION,
            Extension::KhrSurface => KHR_SURFACE_SPEC_VERSION,
            Extension::KhrSwapchain => KHR_SWAPCHAIN_SPEC_VERSION,
            Extension::Core => 0,
        }
    }

    /// Properties advertising this extension at the loader's spec version.
    pub fn properties(self) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties {
            spec_version: self.spec_version(),
            ..Default::default()
        };
        set_name(&mut props.extension_name, self.c_name());
        props
    }

    fn bit(self) -> u32 {
        1 << self as u32
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of [`Extension`]s.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtensionSet(u32);

impl ExtensionSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// A set holding only [`Extension::Core`].
    pub fn core() -> Self {
        Self(Extension::Core.bit())
    }

    pub fn insert(&mut self, ext: Extension) {
        self.0 |= ext.bit();
    }

    pub fn contains(self, ext: Extension) -> bool {
        self.0 & ext.bit() != 0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Core plus every known extension among `names`.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a CStr>) -> Self {
        let mut set = Self::core();
        for name in names {
            if let Some(ext) = Extension::from_name(name) {
                set.insert(ext);
            }
        }
        set
    }

    pub fn iter(self) -> impl Iterator<Item = Extension> {
        Extension::ALL
            .into_iter()
            .chain(std::iter::once(Extension::Core))
            .filter(move |ext| self.contains(*ext))
    }
}

impl fmt::Debug for ExtensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Borrow a NUL-terminated name stored in a fixed-size Vulkan array.
pub fn name_of(name: &[c_char]) -> &CStr {
    let bytes = unsafe { std::slice::from_raw_parts(name.as_ptr() as *const u8, name.len()) };
    CStr::from_bytes_until_nul(bytes).unwrap_or(c"")
}

/// Store `value` into a fixed-size Vulkan name array, truncating if needed.
pub fn set_name(dst: &mut [c_char], value: &CStr) {
    let bytes = value.to_bytes();
    let len = bytes.len().min(dst.len().saturating_sub(1));
    for (d, s) in dst.iter_mut().zip(&bytes[..len]) {
        *d = *s as c_char;
    }
    for d in &mut dst[len..] {
        *d = 0;
    }
}

/// View a `(count, const char* const*)` pair as C strings.
///
/// # Safety
/// `names` must point to `count` valid NUL-terminated strings when non-null.
pub unsafe fn cstr_array<'a>(names: *const *const c_char, count: u32) -> Vec<&'a CStr> {
    if names.is_null() || count == 0 {
        return Vec::new();
    }
    unsafe { std::slice::from_raw_parts(names, count as usize) }
        .iter()
        .filter(|name| !name.is_null())
        .map(|name| unsafe { CStr::from_ptr(*name) })
        .collect()
}

/// Answer a Vulkan enumeration query from `items`.
///
/// With a null output array the count is written. Otherwise up to `*count`
/// items are copied, `*count` is updated, and `VK_INCOMPLETE` is returned
/// when the array was too small.
///
/// # Safety
/// `count` must be valid; a non-null `out` must hold `*count` elements.
pub unsafe fn fill_properties<T: Copy>(items: &[T], count: *mut u32, out: *mut T) -> vk::Result {
    if out.is_null() {
        unsafe { *count = items.len() as u32 };
        return vk::Result::SUCCESS;
    }
    let capacity = unsafe { *count } as usize;
    let written = capacity.min(items.len());
    unsafe {
        std::ptr::copy_nonoverlapping(items.as_ptr(), out, written);
        *count = written as u32;
    }
    if written < items.len() {
        vk::Result::INCOMPLETE
    } else {
        vk::Result::SUCCESS
    }
}

/// Attempts [`enumerate_into_vec`] makes before giving up on a list that
/// keeps growing.
pub const MAX_ENUMERATION_ATTEMPTS: usize = 8;

/// Drive a two-call enumeration function into a vector.
///
/// Fails with `INCOMPLETE` if the list still grows after
/// [`MAX_ENUMERATION_ATTEMPTS`] count-and-fill rounds.
pub fn enumerate_into_vec<T: Copy + Default>(
    mut call: impl FnMut(*mut u32, *mut T) -> vk::Result,
) -> Result<Vec<T>, vk::Result> {
    for _ in 0..MAX_ENUMERATION_ATTEMPTS {
        let mut count = 0u32;
        let result = call(&mut count, std::ptr::null_mut());
        if result != vk::Result::SUCCESS {
            return Err(result);
        }
        let mut items = vec![T::default(); count as usize];
        let result = call(&mut count, items.as_mut_ptr());
        match result {
            vk::Result::SUCCESS => {
                items.truncate(count as usize);
                return Ok(items);
            }
            // The list grew between the two calls.
            vk::Result::INCOMPLETE => continue,
            error => return Err(error),
        }
    }
    warn!("enumeration still incomplete after {} attempts", MAX_ENUMERATION_ATTEMPTS);
    Err(vk::Result::INCOMPLETE)
}

/// Append the extensions of `extra` not already named in `list`.
pub fn merge_extensions(list: &mut Vec<vk::ExtensionProperties>, extra: &[vk::ExtensionProperties]) {
    for ext in extra {
        let name = name_of(&ext.extension_name);
        if !list.iter().any(|have| name_of(&have.extension_name) == name) {
            list.push(*ext);
        }
    }
}

pub fn contains_extension(list: &[vk::ExtensionProperties], name: &CStr) -> bool {
    list.iter().any(|ext| name_of(&ext.extension_name) == name)
}
