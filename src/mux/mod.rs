//! Reference stream multiplexer.
//!
//! Each logical stream is an in-memory duplex pipe bridged to the shared
//! connection by two small tasks; frames from every stream share one socket
//! writer. Flow control is per-stream buffering only.

pub mod frame;
pub mod session;
pub mod transport;
pub mod types;

pub use frame::{Frame, FrameKind};
pub use session::FrameMuxConn;
pub use transport::FrameMux;
pub use types::FrameMuxConfig;
