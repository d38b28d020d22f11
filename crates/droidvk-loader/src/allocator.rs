//! Host memory allocation through `VkAllocationCallbacks`.
//!
//! Every loader record is allocated through the application's callbacks when
//! it supplies them, otherwise through the process default allocator below.

use std::ffi::c_void;
use std::mem::{align_of, size_of};
use std::ptr;

use ash::vk;
use droidvk_core::LoaderError;

unsafe extern "system" fn default_allocate(
    _user_data: *mut c_void,
    size: usize,
    alignment: usize,
    _scope: vk::SystemAllocationScope,
) -> *mut c_void {
    // posix_memalign requires a power-of-two multiple of sizeof(void*).
    let alignment = alignment.max(size_of::<*mut c_void>());
    let mut memory: *mut c_void = ptr::null_mut();
    let rc = unsafe { libc::posix_memalign(&mut memory, alignment, size) };
    if rc != 0 {
        return ptr::null_mut();
    }
    memory
}

unsafe extern "system" fn default_reallocate(
    _user_data: *mut c_void,
    original: *mut c_void,
    size: usize,
    alignment: usize,
    _scope: vk::SystemAllocationScope,
) -> *mut c_void {
    if size == 0 {
        unsafe { libc::free(original) };
        return ptr::null_mut();
    }

    // Never shrink: the caller may rely on the original alignment.
    let old_size = if original.is_null() {
        0
    } else {
        unsafe { libc::malloc_usable_size(original) }
    };
    if size <= old_size {
        return original;
    }

    let alignment = alignment.max(size_of::<*mut c_void>());
    let mut memory: *mut c_void = ptr::null_mut();
    if unsafe { libc::posix_memalign(&mut memory, alignment, size) } != 0 {
        return ptr::null_mut();
    }
    if !original.is_null() {
        unsafe {
            ptr::copy_nonoverlapping(original as *const u8, memory as *mut u8, old_size);
            libc::free(original);
        }
    }
    memory
}

unsafe extern "system" fn default_free(_user_data: *mut c_void, memory: *mut c_void) {
    unsafe { libc::free(memory) };
}

/// A copy of a set of allocation callbacks.
#[derive(Clone, Copy)]
pub struct Allocator {
    callbacks: vk::AllocationCallbacks<'static>,
}

// The callbacks are plain function pointers plus an application cookie the
// application promises is usable from any thread.
unsafe impl Send for Allocator {}
unsafe impl Sync for Allocator {}

impl Allocator {
    /// The process default allocator.
    pub fn default_allocator() -> Self {
        Self {
            callbacks: vk::AllocationCallbacks {
                p_user_data: ptr::null_mut(),
                pfn_allocation: Some(default_allocate),
                pfn_reallocation: Some(default_reallocate),
                pfn_free: Some(default_free),
                ..Default::default()
            },
        }
    }

    /// Copy the application's callbacks, or use `fallback` when there are none.
    ///
    /// # Safety
    /// A non-null `callbacks` must point to valid allocation callbacks.
    pub unsafe fn resolve(callbacks: *const vk::AllocationCallbacks<'_>, fallback: &Self) -> Self {
        if callbacks.is_null() {
            return *fallback;
        }
        let app = unsafe { &*callbacks };
        Self {
            callbacks: vk::AllocationCallbacks {
                p_user_data: app.p_user_data,
                pfn_allocation: app.pfn_allocation,
                pfn_reallocation: app.pfn_reallocation,
                pfn_free: app.pfn_free,
                pfn_internal_allocation: app.pfn_internal_allocation,
                pfn_internal_free: app.pfn_internal_free,
                ..Default::default()
            },
        }
    }

    /// The callbacks as a pointer suitable for passing to a driver.
    pub fn as_ptr(&self) -> *const vk::AllocationCallbacks<'static> {
        &self.callbacks
    }

    pub fn alloc(&self, size: usize, alignment: usize, scope: vk::SystemAllocationScope) -> *mut c_void {
        match self.callbacks.pfn_allocation {
            Some(allocate) => unsafe { allocate(self.callbacks.p_user_data, size, alignment, scope) },
            None => ptr::null_mut(),
        }
    }

    pub fn free(&self, memory: *mut c_void) {
        if memory.is_null() {
            return;
        }
        if let Some(free) = self.callbacks.pfn_free {
            unsafe { free(self.callbacks.p_user_data, memory) };
        }
    }

    /// Move `value` into memory obtained from the callbacks.
    pub fn create<T>(&self, value: T, scope: vk::SystemAllocationScope) -> Result<*mut T, LoaderError> {
        let memory = self.alloc(size_of::<T>().max(1), align_of::<T>(), scope) as *mut T;
        if memory.is_null() {
            return Err(LoaderError::OutOfHostMemory);
        }
        unsafe { memory.write(value) };
        Ok(memory)
    }

    /// Drop a value created by [`Allocator::create`] and release its memory.
    ///
    /// # Safety
    /// `value` must come from `create` on compatible callbacks and must not
    /// be used afterwards.
    pub unsafe fn destroy<T>(&self, value: *mut T) {
        if value.is_null() {
            return;
        }
        unsafe { ptr::drop_in_place(value) };
        self.free(value as *mut c_void);
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::default_allocator()
    }
}
