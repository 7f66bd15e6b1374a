use serde::{Deserialize, Serialize};

/// Buffering knobs of the reference multiplexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMuxConfig {
    /// Bytes buffered per stream and direction between the application and
    /// the connection.
    pub stream_buffer: usize,
    /// Inbound payloads queued per stream before the connection's read loop
    /// waits for the application.
    pub inbound_queue: usize,
    /// Frames queued for the socket writer.
    pub outbound_queue: usize,
}

impl Default for FrameMuxConfig {
    fn default() -> Self {
        Self {
            stream_buffer: 64 * 1024,
            inbound_queue: 32,
            outbound_queue: 1024,
        }
    }
}
