use std::sync::Arc;

use async_trait::async_trait;

use super::session::FrameMuxConn;
use super::types::FrameMuxConfig;
use crate::transport::{BoxedRawConn, MuxConnPtr, Role, Transport, TransportResult};

/// Reference [`Transport`]: a small framed multiplexer over any raw
/// connection. It exists so the harness has a known-good implementation to
/// run against.
#[derive(Debug, Clone, Default)]
pub struct FrameMux {
    config: FrameMuxConfig,
}

impl FrameMux {
    pub fn new(config: FrameMuxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrameMuxConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for FrameMux {
    async fn new_conn(&self, raw: BoxedRawConn, role: Role) -> TransportResult<MuxConnPtr> {
        tracing::trace!("wrapping raw connection as {:?}", role);
        Ok(Arc::new(FrameMuxConn::new(raw, role, self.config.clone())))
    }
}
