//! The native window producer consumed by the swapchain.
//!
//! [`NativeWindow`] is the producer interface the swapchain is written
//! against. [`AndroidNativeWindow`] implements it over a raw
//! `ANativeWindow*` by calling through the window's function table.

use std::ffi::{c_int, c_void};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::ptr::NonNull;

use droidvk_core::WindowError;

// ── Window constants ─────────────────────────────────────────

/// `NATIVE_WINDOW_API_EGL`
pub const NATIVE_WINDOW_API_EGL: i32 = 1;
/// `NATIVE_WINDOW_SCALING_MODE_SCALE_TO_WINDOW`
pub const NATIVE_WINDOW_SCALING_MODE_SCALE_TO_WINDOW: i32 = 1;

pub const NATIVE_WINDOW_WIDTH: i32 = 0;
pub const NATIVE_WINDOW_HEIGHT: i32 = 1;
pub const NATIVE_WINDOW_FORMAT: i32 = 2;
pub const NATIVE_WINDOW_MIN_UNDEQUEUED_BUFFERS: i32 = 3;
pub const NATIVE_WINDOW_DEFAULT_WIDTH: i32 = 6;
pub const NATIVE_WINDOW_DEFAULT_HEIGHT: i32 = 7;

const NATIVE_WINDOW_SET_USAGE: c_int = 0;
const NATIVE_WINDOW_SET_BUFFER_COUNT: c_int = 4;
const NATIVE_WINDOW_SET_BUFFERS_DIMENSIONS: c_int = 8;
const NATIVE_WINDOW_SET_SCALING_MODE: c_int = 10;
const NATIVE_WINDOW_API_CONNECT: c_int = 13;
const NATIVE_WINDOW_API_DISCONNECT: c_int = 14;

// ── Fences ───────────────────────────────────────────────────

/// A sync fence file descriptor. Closed on drop unless handed on.
#[derive(Debug)]
pub struct FenceFd(OwnedFd);

impl FenceFd {
    /// Take ownership of a raw descriptor; `-1` means "no fence".
    ///
    /// # Safety
    /// A non-negative `fd` must be an open descriptor owned by the caller.
    pub unsafe fn from_raw(fd: RawFd) -> Option<Self> {
        if fd < 0 {
            None
        } else {
            Some(Self(unsafe { OwnedFd::from_raw_fd(fd) }))
        }
    }

    /// Give up ownership; `None` becomes `-1`.
    pub fn into_raw(fence: Option<Self>) -> RawFd {
        fence.map_or(-1, |fence| fence.0.into_raw_fd())
    }

    pub fn as_raw(&self) -> RawFd {
        self.0.as_raw_fd()
    }

    pub fn try_clone(&self) -> std::io::Result<Self> {
        self.0.try_clone().map(Self)
    }

    /// Block until the fence signals.
    pub fn wait_forever(&self) -> std::io::Result<()> {
        let mut pfd = libc::pollfd {
            fd: self.as_raw(),
            events: libc::POLLIN,
            revents: 0,
        };
        loop {
            let ret = unsafe { libc::poll(&mut pfd, 1, -1) };
            if ret >= 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

// ── Producer interface ───────────────────────────────────────

/// A buffer handed out by the producer.
///
/// `id` identifies the buffer across dequeues; the remaining fields
/// describe the gralloc allocation the driver binds an image to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBuffer {
    pub id: usize,
    pub handle: *const c_void,
    pub width: i32,
    pub height: i32,
    pub stride: i32,
    pub format: i32,
    pub usage: i32,
}

unsafe impl Send for WindowBuffer {}
unsafe impl Sync for WindowBuffer {}

/// The producer side of a native window buffer queue.
pub trait NativeWindow: Send + Sync {
    fn connect(&self, api: i32) -> Result<(), WindowError>;
    fn disconnect(&self, api: i32) -> Result<(), WindowError>;
    fn query(&self, what: i32) -> Result<i32, WindowError>;
    fn set_buffer_count(&self, count: u32) -> Result<(), WindowError>;
    fn set_buffers_dimensions(&self, width: u32, height: u32) -> Result<(), WindowError>;
    fn set_usage(&self, usage: i32) -> Result<(), WindowError>;
    fn set_scaling_mode(&self, mode: i32) -> Result<(), WindowError>;
    fn dequeue_buffer(&self) -> Result<(WindowBuffer, Option<FenceFd>), WindowError>;
    /// Ownership of `fence` passes to the producer, also on failure.
    fn queue_buffer(&self, buffer: &WindowBuffer, fence: Option<FenceFd>) -> Result<(), WindowError>;
    /// Ownership of `fence` passes to the producer, also on failure.
    fn cancel_buffer(&self, buffer: &WindowBuffer, fence: Option<FenceFd>) -> Result<(), WindowError>;
}

// ── ANativeWindow ────────────────────────────────────────────

#[repr(C)]
#[allow(dead_code)]
struct AndroidNativeBase {
    magic: c_int,
    version: c_int,
    reserved: [*mut c_void; 4],
    inc_ref: Option<unsafe extern "C" fn(base: *mut AndroidNativeBase)>,
    dec_ref: Option<unsafe extern "C" fn(base: *mut AndroidNativeBase)>,
}

/// `ANativeWindowBuffer`
#[repr(C)]
#[allow(dead_code)]
pub struct ANativeWindowBuffer {
    common: AndroidNativeBase,
    pub width: c_int,
    pub height: c_int,
    pub stride: c_int,
    pub format: c_int,
    pub usage_deprecated: c_int,
    pub layer_count: usize,
    reserved: [*mut c_void; 1],
    pub handle: *const c_void,
    pub usage: u64,
    reserved_proc: [*mut c_void; 8 - std::mem::size_of::<u64>() / std::mem::size_of::<*mut c_void>()],
}

type WindowFn<A> = Option<unsafe extern "C" fn(window: *mut ANativeWindow, arg: A) -> c_int>;

/// `ANativeWindow`
#[repr(C)]
#[allow(dead_code)]
pub struct ANativeWindow {
    common: AndroidNativeBase,
    flags: u32,
    min_swap_interval: c_int,
    max_swap_interval: c_int,
    xdpi: f32,
    ydpi: f32,
    oem: [isize; 4],
    set_swap_interval: WindowFn<c_int>,
    dequeue_buffer_deprecated: WindowFn<*mut *mut ANativeWindowBuffer>,
    lock_buffer_deprecated: WindowFn<*mut ANativeWindowBuffer>,
    queue_buffer_deprecated: WindowFn<*mut ANativeWindowBuffer>,
    query: Option<unsafe extern "C" fn(window: *const ANativeWindow, what: c_int, value: *mut c_int) -> c_int>,
    perform: Option<unsafe extern "C" fn(window: *mut ANativeWindow, operation: c_int, ...) -> c_int>,
    cancel_buffer_deprecated: WindowFn<*mut ANativeWindowBuffer>,
    dequeue_buffer: Option<
        unsafe extern "C" fn(window: *mut ANativeWindow, buffer: *mut *mut ANativeWindowBuffer, fence: *mut c_int) -> c_int,
    >,
    queue_buffer:
        Option<unsafe extern "C" fn(window: *mut ANativeWindow, buffer: *mut ANativeWindowBuffer, fence: c_int) -> c_int>,
    cancel_buffer:
        Option<unsafe extern "C" fn(window: *mut ANativeWindow, buffer: *mut ANativeWindowBuffer, fence: c_int) -> c_int>,
}

/// [`NativeWindow`] over a platform `ANativeWindow`. Holds a reference on
/// the window for its lifetime.
pub struct AndroidNativeWindow {
    window: NonNull<ANativeWindow>,
}

unsafe impl Send for AndroidNativeWindow {}
unsafe impl Sync for AndroidNativeWindow {}

fn status(code: c_int) -> Result<(), WindowError> {
    if code == 0 {
        Ok(())
    } else {
        Err(WindowError::new(code))
    }
}

impl AndroidNativeWindow {
    /// Wrap `window`, acquiring a reference.
    ///
    /// # Safety
    /// `window` must be null or a live `ANativeWindow`.
    pub unsafe fn from_raw(window: *mut ANativeWindow) -> Option<Self> {
        let window = NonNull::new(window)?;
        unsafe {
            let base = &mut (*window.as_ptr()).common as *mut AndroidNativeBase;
            if let Some(inc_ref) = (*base).inc_ref {
                inc_ref(base);
            }
        }
        Some(Self { window })
    }

    fn raw(&self) -> *mut ANativeWindow {
        self.window.as_ptr()
    }

    fn perform(&self, operation: c_int, args: &[c_int]) -> Result<(), WindowError> {
        let window = self.raw();
        let Some(perform) = (unsafe { (*window).perform }) else {
            return Err(WindowError::new(-libc::ENOSYS));
        };
        let code = unsafe {
            match *args {
                [] => perform(window, operation),
                [a] => perform(window, operation, a),
                [a, b] => perform(window, operation, a, b),
                _ => return Err(WindowError::new(-libc::EINVAL)),
            }
        };
        status(code)
    }
}

impl Drop for AndroidNativeWindow {
    fn drop(&mut self) {
        unsafe {
            let base = &mut (*self.raw()).common as *mut AndroidNativeBase;
            if let Some(dec_ref) = (*base).dec_ref {
                dec_ref(base);
            }
        }
    }
}

impl NativeWindow for AndroidNativeWindow {
    fn connect(&self, api: i32) -> Result<(), WindowError> {
        self.perform(NATIVE_WINDOW_API_CONNECT, &[api])
    }

    fn disconnect(&self, api: i32) -> Result<(), WindowError> {
        self.perform(NATIVE_WINDOW_API_DISCONNECT, &[api])
    }

    fn query(&self, what: i32) -> Result<i32, WindowError> {
        let window = self.raw();
        let Some(query) = (unsafe { (*window).query }) else {
            return Err(WindowError::new(-libc::ENOSYS));
        };
        let mut value = 0;
        status(unsafe { query(window, what, &mut value) })?;
        Ok(value)
    }

    fn set_buffer_count(&self, count: u32) -> Result<(), WindowError> {
        self.perform(NATIVE_WINDOW_SET_BUFFER_COUNT, &[count as c_int])
    }

    fn set_buffers_dimensions(&self, width: u32, height: u32) -> Result<(), WindowError> {
        self.perform(NATIVE_WINDOW_SET_BUFFERS_DIMENSIONS, &[width as c_int, height as c_int])
    }

    fn set_usage(&self, usage: i32) -> Result<(), WindowError> {
        self.perform(NATIVE_WINDOW_SET_USAGE, &[usage])
    }

    fn set_scaling_mode(&self, mode: i32) -> Result<(), WindowError> {
        self.perform(NATIVE_WINDOW_SET_SCALING_MODE, &[mode])
    }

    fn dequeue_buffer(&self) -> Result<(WindowBuffer, Option<FenceFd>), WindowError> {
        let window = self.raw();
        let Some(dequeue) = (unsafe { (*window).dequeue_buffer }) else {
            return Err(WindowError::new(-libc::ENOSYS));
        };
        let mut buffer: *mut ANativeWindowBuffer = std::ptr::null_mut();
        let mut fence: c_int = -1;
        status(unsafe { dequeue(window, &mut buffer, &mut fence) })?;
        let fence = unsafe { FenceFd::from_raw(fence) };
        if buffer.is_null() {
            return Err(WindowError::new(-libc::ENOMEM));
        }

        let b = unsafe { &*buffer };
        Ok((
            WindowBuffer {
                id: buffer as usize,
                handle: b.handle,
                width: b.width,
                height: b.height,
                stride: b.stride,
                format: b.format,
                usage: b.usage as i32,
            },
            fence,
        ))
    }

    fn queue_buffer(&self, buffer: &WindowBuffer, fence: Option<FenceFd>) -> Result<(), WindowError> {
        let window = self.raw();
        let fence = FenceFd::into_raw(fence);
        let Some(queue) = (unsafe { (*window).queue_buffer }) else {
            drop(unsafe { FenceFd::from_raw(fence) });
            return Err(WindowError::new(-libc::ENOSYS));
        };
        status(unsafe { queue(window, buffer.id as *mut ANativeWindowBuffer, fence) })
    }

    fn cancel_buffer(&self, buffer: &WindowBuffer, fence: Option<FenceFd>) -> Result<(), WindowError> {
        let window = self.raw();
        let fence = FenceFd::into_raw(fence);
        let Some(cancel) = (unsafe { (*window).cancel_buffer }) else {
            drop(unsafe { FenceFd::from_raw(fence) });
            return Err(WindowError::new(-libc::ENOSYS));
        };
        status(unsafe { cancel(window, buffer.id as *mut ANativeWindowBuffer, fence) })
    }
}
