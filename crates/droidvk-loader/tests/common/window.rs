//! An in-process native window producer that records what the swapchain
//! asks of it.

use std::collections::VecDeque;
use std::ffi::c_void;
use std::sync::Arc;

use droidvk_core::WindowError;
use parking_lot::{Mutex, MutexGuard};
use vulkan::window::{
    FenceFd, NativeWindow, WindowBuffer, NATIVE_WINDOW_DEFAULT_HEIGHT, NATIVE_WINDOW_DEFAULT_WIDTH, NATIVE_WINDOW_FORMAT,
    NATIVE_WINDOW_HEIGHT, NATIVE_WINDOW_MIN_UNDEQUEUED_BUFFERS, NATIVE_WINDOW_WIDTH,
};

pub const STRAY_BUFFER_ID: usize = 999;
const RGBA_8888: i32 = 1;

/// A producer call, in the order the swapchain made it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCall {
    Dequeue(usize),
    /// Buffer id and whether a fence came with it.
    Queue(usize, bool),
    Cancel(usize),
}

#[derive(Default)]
pub struct WindowState {
    pub connected: bool,
    pub connect_calls: usize,
    pub disconnect_calls: usize,
    /// Report the window as already connected on the next connect.
    pub already_connected: bool,
    pub default_width: i32,
    pub default_height: i32,
    pub min_undequeued: i32,
    pub buffer_count: u32,
    pub width: u32,
    pub height: u32,
    pub usage: i32,
    pub scaling_mode: i32,
    pub buffers: Vec<WindowBuffer>,
    free: VecDeque<usize>,
    pub dequeued: Vec<usize>,
    pub presented: Vec<usize>,
    pub presented_with_fence: usize,
    pub cancelled: usize,
    /// Hand out a signalled fence with every dequeue.
    pub fences: bool,
    /// Hand out a buffer the swapchain never saw on the next dequeue.
    pub stray_next: bool,
    /// Fail the dequeue with this zero-based call number.
    pub fail_dequeue_at: Option<usize>,
    pub dequeue_calls: usize,
    /// Reject every queued buffer.
    pub fail_queue: bool,
    pub fail_disconnect: bool,
    pub calls: Vec<WindowCall>,
}

pub struct RecordingWindow {
    state: Mutex<WindowState>,
}

impl RecordingWindow {
    pub fn new(width: i32, height: i32, min_undequeued: i32) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(WindowState {
                default_width: width,
                default_height: height,
                min_undequeued,
                ..Default::default()
            }),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock()
    }
}

fn signalled_fence() -> Option<FenceFd> {
    unsafe { FenceFd::from_raw(libc::eventfd(1, libc::EFD_CLOEXEC)) }
}

fn release(st: &mut WindowState, buffer: &WindowBuffer) {
    if let Some(pos) = st.dequeued.iter().position(|&id| id == buffer.id) {
        st.dequeued.remove(pos);
        st.free.push_back(buffer.id);
    }
}

impl NativeWindow for RecordingWindow {
    fn connect(&self, _api: i32) -> Result<(), WindowError> {
        let mut st = self.state.lock();
        st.connect_calls += 1;
        if std::mem::take(&mut st.already_connected) {
            st.connected = true;
            return Err(WindowError::new(WindowError::ALREADY_CONNECTED));
        }
        st.connected = true;
        Ok(())
    }

    fn disconnect(&self, _api: i32) -> Result<(), WindowError> {
        let mut st = self.state.lock();
        st.disconnect_calls += 1;
        st.connected = false;
        if st.fail_disconnect {
            return Err(WindowError::new(-libc::EPIPE));
        }
        Ok(())
    }

    fn query(&self, what: i32) -> Result<i32, WindowError> {
        let st = self.state.lock();
        match what {
            NATIVE_WINDOW_WIDTH => Ok(st.width as i32),
            NATIVE_WINDOW_HEIGHT => Ok(st.height as i32),
            NATIVE_WINDOW_FORMAT => Ok(RGBA_8888),
            NATIVE_WINDOW_MIN_UNDEQUEUED_BUFFERS => Ok(st.min_undequeued),
            NATIVE_WINDOW_DEFAULT_WIDTH => Ok(st.default_width),
            NATIVE_WINDOW_DEFAULT_HEIGHT => Ok(st.default_height),
            _ => Err(WindowError::new(-libc::EINVAL)),
        }
    }

    fn set_buffer_count(&self, count: u32) -> Result<(), WindowError> {
        let mut st = self.state.lock();
        st.buffer_count = count;
        st.buffers.clear();
        st.free.clear();
        st.dequeued.clear();
        Ok(())
    }

    fn set_buffers_dimensions(&self, width: u32, height: u32) -> Result<(), WindowError> {
        let mut st = self.state.lock();
        st.width = width;
        st.height = height;
        Ok(())
    }

    fn set_usage(&self, usage: i32) -> Result<(), WindowError> {
        self.state.lock().usage = usage;
        Ok(())
    }

    fn set_scaling_mode(&self, mode: i32) -> Result<(), WindowError> {
        self.state.lock().scaling_mode = mode;
        Ok(())
    }

    fn dequeue_buffer(&self) -> Result<(WindowBuffer, Option<FenceFd>), WindowError> {
        let mut st = self.state.lock();
        let call = st.dequeue_calls;
        st.dequeue_calls += 1;
        if st.fail_dequeue_at == Some(call) {
            return Err(WindowError::new(-libc::ENOMEM));
        }
        let fence = if st.fences { signalled_fence() } else { None };

        if std::mem::take(&mut st.stray_next) {
            let stray = WindowBuffer {
                id: STRAY_BUFFER_ID,
                handle: STRAY_BUFFER_ID as *const c_void,
                width: st.width as i32,
                height: st.height as i32,
                stride: st.width as i32,
                format: RGBA_8888,
                usage: st.usage,
            };
            return Ok((stray, fence));
        }

        let id = if (st.buffers.len() as u32) < st.buffer_count {
            let id = st.buffers.len() + 1;
            let buffer = WindowBuffer {
                id,
                handle: (0x1000 + id) as *const c_void,
                width: st.width as i32,
                height: st.height as i32,
                stride: st.width as i32,
                format: RGBA_8888,
                usage: st.usage,
            };
            st.buffers.push(buffer);
            id
        } else {
            st.free.pop_front().ok_or(WindowError::new(-libc::EBUSY))?
        };
        st.dequeued.push(id);
        st.calls.push(WindowCall::Dequeue(id));
        let buffer = st.buffers[id - 1];
        Ok((buffer, fence))
    }

    fn queue_buffer(&self, buffer: &WindowBuffer, fence: Option<FenceFd>) -> Result<(), WindowError> {
        let mut st = self.state.lock();
        st.calls.push(WindowCall::Queue(buffer.id, fence.is_some()));
        if st.fail_queue {
            release(&mut st, buffer);
            return Err(WindowError::new(-libc::EIO));
        }
        st.presented.push(buffer.id);
        if fence.is_some() {
            st.presented_with_fence += 1;
        }
        release(&mut st, buffer);
        Ok(())
    }

    fn cancel_buffer(&self, buffer: &WindowBuffer, _fence: Option<FenceFd>) -> Result<(), WindowError> {
        let mut st = self.state.lock();
        st.cancelled += 1;
        st.calls.push(WindowCall::Cancel(buffer.id));
        release(&mut st, buffer);
        Ok(())
    }
}
