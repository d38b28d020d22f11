//! `VK_EXT_debug_report`, implemented by the loader.
//!
//! Callbacks live in a singly linked list anchored in the instance record.
//! When the driver implements the extension too, each loader callback is
//! paired with a driver callback so driver messages reach the application.

use std::ffi::{c_char, c_void};
use std::ptr;

use ash::vk;
use ash::vk::Handle;
use droidvk_core::LoaderError;
use parking_lot::RwLock;

use crate::allocator::Allocator;
use crate::dispatch::get_data;

struct Node {
    next: *mut Node,
    flags: vk::DebugReportFlagsEXT,
    callback: vk::PFN_vkDebugReportCallbackEXT,
    user_data: *mut c_void,
    driver_callback: vk::DebugReportCallbackEXT,
}

/// The callbacks registered on one instance.
pub struct DebugReportCallbackList {
    head: RwLock<*mut Node>,
}

impl DebugReportCallbackList {
    pub fn new() -> Self {
        Self {
            head: RwLock::new(ptr::null_mut()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.read().is_null()
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        let head = self.head.read();
        let mut count = 0;
        let mut node = *head;
        while !node.is_null() {
            count += 1;
            node = unsafe { (*node).next };
        }
        count
    }

    fn add(
        &self,
        allocator: &Allocator,
        create_info: &vk::DebugReportCallbackCreateInfoEXT<'_>,
        driver_callback: vk::DebugReportCallbackEXT,
    ) -> Result<*mut Node, LoaderError> {
        let mut head = self.head.write();
        let node = allocator.create(
            Node {
                next: *head,
                flags: create_info.flags,
                callback: create_info.pfn_callback,
                user_data: create_info.p_user_data,
                driver_callback,
            },
            vk::SystemAllocationScope::OBJECT,
        )?;
        *head = node;
        Ok(node)
    }

    /// Unlink `node` and free it.
    ///
    /// # Safety
    /// `node` must have been returned by `add` on this list.
    unsafe fn remove(&self, node: *mut Node, allocator: &Allocator) {
        let mut head = self.head.write();
        let mut link: *mut *mut Node = &mut *head;
        unsafe {
            while !(*link).is_null() {
                if *link == node {
                    *link = (*node).next;
                    allocator.destroy(node);
                    return;
                }
                link = &mut (**link).next;
            }
        }
    }

    /// Deliver a message to every callback whose flags match.
    ///
    /// # Safety
    /// `layer_prefix` and `message` must be valid NUL-terminated strings.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn message(
        &self,
        flags: vk::DebugReportFlagsEXT,
        object_type: vk::DebugReportObjectTypeEXT,
        object: u64,
        location: usize,
        message_code: i32,
        layer_prefix: *const c_char,
        message: *const c_char,
    ) {
        let head = self.head.read();
        let mut node = *head;
        while !node.is_null() {
            let current = unsafe { &*node };
            if current.flags.intersects(flags) {
                if let Some(callback) = current.callback {
                    unsafe {
                        callback(
                            flags,
                            object_type,
                            object,
                            location,
                            message_code,
                            layer_prefix,
                            message,
                            current.user_data,
                        )
                    };
                }
            }
            node = current.next;
        }
    }
}

impl Default for DebugReportCallbackList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DebugReportCallbackList {
    fn drop(&mut self) {
        // Leaked nodes were allocated with callbacks we no longer have.
        let head = *self.head.get_mut();
        if !head.is_null() {
            tracing::warn!("instance destroyed with {} debug report callbacks alive", self.len());
        }
    }
}

pub unsafe extern "system" fn create_debug_report_callback(
    instance: vk::Instance,
    p_create_info: *const vk::DebugReportCallbackCreateInfoEXT<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_callback: *mut vk::DebugReportCallbackEXT,
) -> vk::Result {
    let data = unsafe { get_data(instance) };
    let allocator = unsafe { Allocator::resolve(p_allocator, &data.allocator) };

    let mut driver_callback = vk::DebugReportCallbackEXT::null();
    if let Some(create) = data.driver.create_debug_report_callback {
        let result = unsafe { create(instance, p_create_info, p_allocator, &mut driver_callback) };
        if result != vk::Result::SUCCESS {
            return result;
        }
    }

    match data
        .debug_report_callbacks
        .add(&allocator, unsafe { &*p_create_info }, driver_callback)
    {
        Ok(node) => {
            unsafe { *p_callback = vk::DebugReportCallbackEXT::from_raw(node as usize as u64) };
            vk::Result::SUCCESS
        }
        Err(e) => {
            if let Some(destroy) = data.driver.destroy_debug_report_callback {
                if !driver_callback.is_null() {
                    unsafe { destroy(instance, driver_callback, p_allocator) };
                }
            }
            e.into()
        }
    }
}

pub unsafe extern "system" fn destroy_debug_report_callback(
    instance: vk::Instance,
    callback: vk::DebugReportCallbackEXT,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if callback.is_null() {
        return;
    }
    let data = unsafe { get_data(instance) };
    let allocator = unsafe { Allocator::resolve(p_allocator, &data.allocator) };
    let node = callback.as_raw() as usize as *mut Node;
    let driver_callback = unsafe { (*node).driver_callback };

    unsafe { data.debug_report_callbacks.remove(node, &allocator) };

    if let Some(destroy) = data.driver.destroy_debug_report_callback {
        if !driver_callback.is_null() {
            unsafe { destroy(instance, driver_callback, p_allocator) };
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub unsafe extern "system" fn debug_report_message(
    instance: vk::Instance,
    flags: vk::DebugReportFlagsEXT,
    object_type: vk::DebugReportObjectTypeEXT,
    object: u64,
    location: usize,
    message_code: i32,
    p_layer_prefix: *const c_char,
    p_message: *const c_char,
) {
    let data = unsafe { get_data(instance) };
    if let Some(message) = data.driver.debug_report_message {
        unsafe {
            message(
                instance,
                flags,
                object_type,
                object,
                location,
                message_code,
                p_layer_prefix,
                p_message,
            )
        };
    }
    unsafe {
        data.debug_report_callbacks.message(
            flags,
            object_type,
            object,
            location,
            message_code,
            p_layer_prefix,
            p_message,
        )
    };
}
