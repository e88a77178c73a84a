//! UVC gadget output node streaming USERPTR buffers

use std::ffi::c_void;
use std::fs::{File, OpenOptions};
use std::mem;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::memory::Memory;
use v4l::v4l_sys::{v4l2_buffer, v4l2_requestbuffers};
use v4l::v4l2;
use v4l::v4l2::vidioc::{
    VIDIOC_DQBUF, VIDIOC_QBUF, VIDIOC_REQBUFS, VIDIOC_STREAMOFF, VIDIOC_STREAMON,
};

use crate::multiplexer::wait_fd;
use crate::sink::{DeviceSink, QueueRequest, WaitResult};
use crate::{RelayError, Result};

/// V4L2 output device backed by a UVC gadget function
///
/// Buffers are USERPTR: [`DeviceSink::queue_buffer`] hands the caller's
/// memory to the driver without copying. The caller keeps that memory alive
/// until the device is dropped or the buffer is dequeued again.
///
/// Dropping the device streams off before the descriptor closes, which
/// makes the driver release every queued user pointer.
pub struct UvcDevice {
    file: File,
    path: PathBuf,
    name: String,
    streaming: bool,
}

/// Output buffer descriptor for USERPTR memory, all other fields zero
fn userptr_output_buffer() -> v4l2_buffer {
    // SAFETY: v4l2_buffer is a plain C struct; all-zero is a valid value.
    let mut buf: v4l2_buffer = unsafe { mem::zeroed() };
    buf.type_ = Type::VideoOutput as u32;
    buf.memory = Memory::UserPtr as u32;
    buf
}

impl UvcDevice {
    /// Open `path` read-write and non-blocking.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .map_err(|e| RelayError::device_error(format!("open {}", path.display()), e))?;

        let name = path.display().to_string();
        info!("UVC: Opened {}", name);
        Ok(Self { file, path, name, streaming: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Allocate `count` USERPTR ring slots; returns the count the driver granted.
    pub fn request_buffers(&mut self, count: u32) -> Result<u32> {
        // SAFETY: plain C struct, zero is valid.
        let mut req: v4l2_requestbuffers = unsafe { mem::zeroed() };
        req.count = count;
        req.type_ = Type::VideoOutput as u32;
        req.memory = Memory::UserPtr as u32;

        // SAFETY: the fd is open and REQBUFS takes a v4l2_requestbuffers.
        unsafe {
            v4l2::ioctl(self.fd(), VIDIOC_REQBUFS, &mut req as *mut _ as *mut c_void)
        }
        .map_err(|e| RelayError::device_error("VIDIOC_REQBUFS", e))?;

        debug!(requested = count, granted = req.count, "UVC: {} buffers allocated", req.count);
        Ok(req.count)
    }

    pub fn stream_on(&mut self) -> Result<()> {
        let mut buf_type = Type::VideoOutput as u32;
        // SAFETY: the fd is open and STREAMON takes a pointer to the buffer type.
        unsafe {
            v4l2::ioctl(self.fd(), VIDIOC_STREAMON, &mut buf_type as *mut _ as *mut c_void)
        }
        .map_err(|e| RelayError::device_error("VIDIOC_STREAMON", e))?;
        self.streaming = true;
        info!("UVC: Stream on {}", self.name);
        Ok(())
    }

    pub fn stream_off(&mut self) -> Result<()> {
        let mut buf_type = Type::VideoOutput as u32;
        // SAFETY: the fd is open and STREAMOFF takes a pointer to the buffer type.
        unsafe {
            v4l2::ioctl(self.fd(), VIDIOC_STREAMOFF, &mut buf_type as *mut _ as *mut c_void)
        }
        .map_err(|e| RelayError::device_error("VIDIOC_STREAMOFF", e))?;
        self.streaming = false;
        info!("UVC: Stream off {}", self.name);
        Ok(())
    }

    fn fd(&self) -> std::os::raw::c_int {
        self.file.as_raw_fd()
    }
}

impl AsFd for UvcDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl DeviceSink for UvcDevice {
    fn dequeue_buffer(&mut self) -> Result<u32> {
        let mut buf = userptr_output_buffer();
        // SAFETY: the fd is open and DQBUF takes a v4l2_buffer.
        unsafe { v4l2::ioctl(self.fd(), VIDIOC_DQBUF, &mut buf as *mut _ as *mut c_void) }
            .map_err(RelayError::dequeue_failed)?;
        Ok(buf.index)
    }

    fn queue_buffer(&mut self, request: QueueRequest<'_>) -> Result<()> {
        let length = u32::try_from(request.data.len()).map_err(|_| {
            RelayError::slot_violation(format!(
                "frame region of {} bytes exceeds the V4L2 length field",
                request.data.len()
            ))
        })?;

        let mut buf = userptr_output_buffer();
        buf.index = request.index;
        buf.m.userptr = request.data.as_ptr() as std::os::raw::c_ulong;
        buf.length = length;
        buf.bytesused = request.bytesused;

        // SAFETY: the fd is open and QBUF takes a v4l2_buffer. The user pointer
        // stays valid until the matching dequeue (see the type docs).
        unsafe { v4l2::ioctl(self.fd(), VIDIOC_QBUF, &mut buf as *mut _ as *mut c_void) }
            .map_err(|e| RelayError::queue_failed(request.index, e))
    }

    fn wait_for_readiness(&mut self, timeout: Duration) -> Result<WaitResult> {
        wait_fd(self.file.as_fd(), timeout)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for UvcDevice {
    fn drop(&mut self) {
        if self.streaming {
            if let Err(e) = self.stream_off() {
                warn!("UVC: Failed to stream off {} on close: {}", self.name, e);
            }
        }
    }
}
