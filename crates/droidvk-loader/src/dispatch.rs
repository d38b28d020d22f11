//! Dispatchable handle management.
//!
//! Dispatchable handles (VkInstance, VkPhysicalDevice, VkDevice, VkQueue,
//! VkCommandBuffer) point to objects whose first two machine words are the
//! ICD loader magic and a dispatch pointer. The driver creates the object
//! with the magic in place; the loader checks it and writes the address of
//! its instance or device record into the second word. Every record starts
//! with its API dispatch table, so the exported entry points reach the table
//! with a single load.

use std::ffi::c_void;

use ash::vk::Handle;
use tracing::error;

use crate::extensions::Extension;

/// The ICD loader magic value. Drivers must place it in new dispatchable objects.
pub const ICD_LOADER_MAGIC: usize = 0x01CDC0DE;

/// The first two words of every dispatchable object.
#[repr(C)]
pub struct DispatchHeader {
    pub magic: usize,
    /// Written by the loader: the instance or device record.
    pub dispatch: *const c_void,
}

/// A dispatchable object as a Rust driver allocates it.
#[repr(C)]
pub struct DispatchableHandle {
    header: DispatchHeader,
    /// Driver-side identifier of the object.
    pub local_id: u64,
}

impl DispatchableHandle {
    /// Allocate a new dispatchable handle on the heap.
    pub fn new(local_id: u64) -> *mut Self {
        Box::into_raw(Box::new(Self {
            header: DispatchHeader {
                magic: ICD_LOADER_MAGIC,
                dispatch: std::ptr::null(),
            },
            local_id,
        }))
    }

    /// Get the local_id from a dispatchable handle pointer.
    ///
    /// # Safety
    /// The pointer must point to a valid DispatchableHandle.
    pub unsafe fn get_id(ptr: *const Self) -> u64 {
        unsafe { (*ptr).local_id }
    }

    /// Free a dispatchable handle.
    ///
    /// # Safety
    /// The pointer must have been created by `DispatchableHandle::new`.
    pub unsafe fn destroy(ptr: *mut Self) {
        drop(unsafe { Box::from_raw(ptr) });
    }

    /// View the object as a Vulkan handle.
    pub fn as_handle<H: Handle>(ptr: *mut Self) -> H {
        H::from_raw(ptr as usize as u64)
    }

    /// Recover the object behind a Vulkan handle.
    pub fn from_handle<H: Handle>(handle: H) -> *mut Self {
        handle.as_raw() as usize as *mut Self
    }
}

fn header_of<H: Handle>(handle: H) -> *mut DispatchHeader {
    handle.as_raw() as usize as *mut DispatchHeader
}

/// Whether `handle` points at an object carrying the loader magic.
///
/// # Safety
/// A non-null handle must point to readable memory of at least two words.
pub unsafe fn has_loader_magic<H: Handle>(handle: H) -> bool {
    let header = header_of(handle);
    !header.is_null() && unsafe { (*header).magic } == ICD_LOADER_MAGIC
}

/// Validate the magic of a driver-created object and install `data` as its
/// dispatch pointer.
///
/// # Safety
/// A non-null handle must point to a writable dispatchable object.
pub unsafe fn set_dispatch<H: Handle + Copy>(handle: H, data: *const c_void) -> bool {
    let header = header_of(handle);
    if header.is_null() {
        error!("driver returned a null {:?} handle", H::TYPE);
        return false;
    }

    let magic = unsafe { (*header).magic };
    if magic != ICD_LOADER_MAGIC {
        error!(
            "invalid dispatchable {:?} {:#x}: magic {:#x}, expected {:#x}",
            H::TYPE,
            handle.as_raw(),
            magic,
            ICD_LOADER_MAGIC
        );
        return false;
    }

    unsafe { (*header).dispatch = data };
    true
}

/// Read the dispatch pointer of a stamped handle.
///
/// # Safety
/// `handle` must have been stamped by [`set_dispatch`] with a `T` record.
#[inline(always)]
pub unsafe fn table_of<H: Handle, T>(handle: H) -> *const T {
    unsafe { (*header_of(handle)).dispatch as *const T }
}

/// Records with a per-command set of already reported stub calls.
pub trait StubLog {
    /// Returns `true` the first time `command` is reported on this record.
    fn first_report(&self, command: &'static str) -> bool;
}

/// Handle types whose dispatch pointer leads to a loader record.
pub trait Dispatchable: Handle + Copy {
    type Data: StubLog;
}

/// Borrow the record behind a stamped handle.
///
/// # Safety
/// `handle` must be a live handle stamped by the loader.
#[inline]
pub unsafe fn get_data<'a, H: Dispatchable>(handle: H) -> &'a H::Data {
    unsafe { &*table_of::<H, H::Data>(handle) }
}

/// Raw access to the record behind a stamped handle, for creation-time writes.
///
/// # Safety
/// `handle` must be a live handle stamped by the loader.
#[inline]
pub unsafe fn get_data_mut<H: Dispatchable>(handle: H) -> *mut H::Data {
    unsafe { table_of::<H, H::Data>(handle) as *mut H::Data }
}

/// Log a call that reached a disabled table slot, once per record and command.
///
/// # Safety
/// `handle` must be a live handle stamped by the loader.
pub unsafe fn report_stub<H: Dispatchable>(handle: H, command: &'static str, extension: Option<Extension>) {
    let data = unsafe { get_data(handle) };
    if !data.first_report(command) {
        return;
    }
    match extension {
        Some(ext) => error!("{} not enabled. Exported {} not executed.", ext, command),
        None => error!("driver does not implement {}. Exported {} not executed.", command, command),
    }
}

/// Reinterpret a resolved `PFN_vkVoidFunction` as its real prototype.
///
/// # Safety
/// `F` must be a function pointer type matching the command's prototype.
#[inline]
pub unsafe fn cast_proc<F: Copy>(proc: unsafe extern "system" fn()) -> F {
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<unsafe extern "system" fn()>());
    unsafe { std::mem::transmute_copy(&proc) }
}
