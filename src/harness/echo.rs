//! Echo peer: the accept side of every scenario.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;

use super::error::{HarnessError, SetupStage};
use super::sink::ErrorSink;
use crate::metrics::recorder;
use crate::transport::{
    stream_handler, BoxedStream, RawListener, Role, StreamHandler, Transport,
};

/// Write back everything read from `stream` until the peer finishes, then
/// close it.
pub async fn echo_stream(stream: BoxedStream) {
    tracing::trace!("accepted stream");
    let (mut reader, mut writer) = tokio::io::split(stream);

    match tokio::io::copy(&mut reader, &mut writer).await {
        Ok(n) => {
            recorder::record_echo_stream(n);
            tracing::trace!("echoed {} bytes, closing stream", n);
        }
        // Surfaces on the dialing side as a read or write error.
        Err(e) => tracing::debug!("echo copy ended: {}", e),
    }

    let mut stream = reader.unsplit(writer);
    if let Err(e) = stream.shutdown().await {
        tracing::debug!("echo stream close: {}", e);
    }
}

pub fn echo_handler() -> StreamHandler {
    stream_handler(echo_stream)
}

/// Accept raw connections forever and echo every stream opened on them.
///
/// Accept and wrap failures are reported as fatal and end the loop. Callers
/// stop the loop by aborting the task running it.
pub async fn serve(
    transport: Arc<dyn Transport>,
    mut listener: Box<dyn RawListener>,
    sink: ErrorSink,
) {
    loop {
        let raw = match listener.accept().await {
            Ok(raw) => raw,
            Err(e) => {
                sink.report(HarnessError::setup(SetupStage::Accept, e));
                return;
            }
        };

        let conn = match transport.new_conn(raw, Role::Listener).await {
            Ok(conn) => conn,
            Err(e) => {
                sink.report(HarnessError::setup(SetupStage::WrapListener, e));
                return;
            }
        };

        tokio::spawn(async move {
            if let Err(e) = conn.serve(echo_handler()).await {
                tracing::debug!("listener conn finished: {}", e);
            }
        });
    }
}
