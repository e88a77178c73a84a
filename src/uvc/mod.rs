//! Linux UVC gadget output through V4L2

mod device;

pub use device::UvcDevice;
