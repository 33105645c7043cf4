pub mod bounds;
pub mod window;

pub use bounds::Bounds;
pub use window::{
    is_console_class, AttachmentState, ProcessHandle, WindowDescriptor, WindowHandle,
};
