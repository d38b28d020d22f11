//! Allocation callbacks that track every live allocation by scope.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

use ash::vk;
use parking_lot::Mutex;

#[derive(Default)]
pub struct CountingAllocator {
    live: Mutex<HashMap<usize, vk::SystemAllocationScope>>,
    foreign_frees: AtomicUsize,
    refused: Mutex<Option<vk::SystemAllocationScope>>,
}

impl CountingAllocator {
    /// Boxed so the callbacks' user data stays put.
    pub fn new() -> Box<Self> {
        Box::default()
    }

    pub fn callbacks(&self) -> vk::AllocationCallbacks<'static> {
        vk::AllocationCallbacks {
            p_user_data: self as *const Self as *mut c_void,
            pfn_allocation: Some(allocation),
            pfn_reallocation: Some(reallocation),
            pfn_free: Some(free),
            ..Default::default()
        }
    }

    pub fn live(&self) -> usize {
        self.live.lock().len()
    }

    /// Frees of memory this allocator never handed out.
    pub fn foreign_frees(&self) -> usize {
        self.foreign_frees.load(Ordering::Relaxed)
    }

    /// Fail every allocation in `scope` from now on.
    pub fn refuse(&self, scope: vk::SystemAllocationScope) {
        *self.refused.lock() = Some(scope);
    }

    pub fn live_in(&self, scope: vk::SystemAllocationScope) -> usize {
        self.live.lock().values().filter(|&&s| s == scope).count()
    }
}

unsafe fn tracker<'a>(user_data: *mut c_void) -> &'a CountingAllocator {
    unsafe { &*(user_data as *const CountingAllocator) }
}

unsafe extern "system" fn allocation(
    user_data: *mut c_void,
    size: usize,
    alignment: usize,
    scope: vk::SystemAllocationScope,
) -> *mut c_void {
    let tracker = unsafe { tracker(user_data) };
    if *tracker.refused.lock() == Some(scope) {
        return std::ptr::null_mut();
    }
    let mut memory = std::ptr::null_mut();
    let alignment = alignment.max(std::mem::size_of::<*const c_void>());
    if unsafe { libc::posix_memalign(&mut memory, alignment, size.max(1)) } != 0 {
        return std::ptr::null_mut();
    }
    tracker.live.lock().insert(memory as usize, scope);
    memory
}

unsafe extern "system" fn reallocation(
    user_data: *mut c_void,
    original: *mut c_void,
    size: usize,
    alignment: usize,
    scope: vk::SystemAllocationScope,
) -> *mut c_void {
    // The loader never grows its allocations.
    if original.is_null() {
        unsafe { allocation(user_data, size, alignment, scope) }
    } else {
        std::ptr::null_mut()
    }
}

unsafe extern "system" fn free(user_data: *mut c_void, memory: *mut c_void) {
    if memory.is_null() {
        return;
    }
    let tracker = unsafe { tracker(user_data) };
    if tracker.live.lock().remove(&(memory as usize)).is_none() {
        tracker.foreign_frees.fetch_add(1, Ordering::Relaxed);
        return;
    }
    unsafe { libc::free(memory) };
}
