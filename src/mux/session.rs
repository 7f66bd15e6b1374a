//! One multiplexed connection of the reference transport.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadHalf,
    WriteHalf,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::frame::{Frame, FrameKind, MAX_PAYLOAD};
use super::types::FrameMuxConfig;
use crate::transport::{
    BoxedRawConn, BoxedStream, MuxConn, Role, StreamHandler, TransportError, TransportResult,
};

/// Frames coalesced into one socket write.
const WRITE_BATCH_BYTES: usize = 256 * 1024;

struct Shared {
    config: FrameMuxConfig,
    /// Inbound payload queues, keyed by stream id.
    streams: DashMap<u32, mpsc::Sender<Bytes>>,
    outbound: mpsc::Sender<Frame>,
    next_id: AtomicU32,
    closed: AtomicBool,
}

/// Multiplexed connection produced by [`super::FrameMux`].
pub struct FrameMuxConn {
    shared: Arc<Shared>,
    role: Role,
    incoming: Mutex<Option<mpsc::UnboundedReceiver<BoxedStream>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FrameMuxConn {
    pub fn new(raw: BoxedRawConn, role: Role, config: FrameMuxConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(raw);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue);
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        // Dialer streams are odd, listener streams even.
        let first_id = if role.is_dialer() { 1 } else { 2 };

        let shared = Arc::new(Shared {
            config,
            streams: DashMap::new(),
            outbound: outbound_tx,
            next_id: AtomicU32::new(first_id),
            closed: AtomicBool::new(false),
        });

        let writer = tokio::spawn(write_loop(write_half, outbound_rx));
        let reader = tokio::spawn(read_loop(read_half, shared.clone(), incoming_tx));

        Self {
            shared,
            role,
            incoming: Mutex::new(Some(incoming_rx)),
            tasks: Mutex::new(vec![writer, reader]),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Streams currently registered on this connection.
    pub fn open_streams(&self) -> usize {
        self.shared.streams.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::Release);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        // Dropping the inbound queues ends every stream's read side.
        self.shared.streams.clear();
    }
}

impl Drop for FrameMuxConn {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl MuxConn for FrameMuxConn {
    async fn open_stream(&self) -> TransportResult<BoxedStream> {
        if self.is_closed() {
            return Err(TransportError::Closed("connection closed".into()));
        }
        let id = self.shared.next_id.fetch_add(2, Ordering::Relaxed);
        let stream = attach_stream(&self.shared, id);
        self.shared
            .outbound
            .send(Frame::open(id))
            .await
            .map_err(|_| {
                TransportError::OpenFailed(format!("stream {id}: connection closed"))
            })?;
        tracing::trace!("opened stream {}", id);
        Ok(stream)
    }

    async fn serve(&self, handler: StreamHandler) -> TransportResult<()> {
        let mut incoming = self.incoming.lock().take().ok_or_else(|| {
            TransportError::Other("connection is already being served".into())
        })?;

        while let Some(stream) = incoming.recv().await {
            tokio::spawn(handler(stream));
        }
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.shutdown();
        Ok(())
    }
}

/// Register stream `id` and start the tasks bridging it to the connection.
/// Returns the application side of the stream.
fn attach_stream(shared: &Arc<Shared>, id: u32) -> BoxedStream {
    let (app_side, mux_side) = tokio::io::duplex(shared.config.stream_buffer);
    let (mux_read, mux_write) = tokio::io::split(mux_side);
    let (inbound_tx, inbound_rx) = mpsc::channel(shared.config.inbound_queue);

    shared.streams.insert(id, inbound_tx);
    tokio::spawn(pump_outbound(id, mux_read, shared.outbound.clone()));
    tokio::spawn(pump_inbound(id, inbound_rx, mux_write));

    Box::new(app_side)
}

/// Application writes become `Data` frames; application EOF becomes `Close`.
async fn pump_outbound(
    id: u32,
    mut mux_read: ReadHalf<DuplexStream>,
    outbound: mpsc::Sender<Frame>,
) {
    let mut buf = BytesMut::with_capacity(MAX_PAYLOAD);
    loop {
        buf.clear();
        buf.reserve(MAX_PAYLOAD);
        match (&mut mux_read).take(MAX_PAYLOAD as u64).read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let payload = buf.split().freeze();
                if outbound.send(Frame::data(id, payload)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!("stream {} outbound read: {}", id, e);
                break;
            }
        }
    }
    let _ = outbound.send(Frame::close(id)).await;
}

/// Payloads routed to this stream are written to the application side.
async fn pump_inbound(
    id: u32,
    mut inbound: mpsc::Receiver<Bytes>,
    mut mux_write: WriteHalf<DuplexStream>,
) {
    let mut discarding = false;
    while let Some(payload) = inbound.recv().await {
        if discarding {
            continue;
        }
        // The application may have dropped its side; keep draining so the
        // demux loop never stalls on this stream.
        if let Err(e) = mux_write.write_all(&payload).await {
            tracing::trace!("stream {} inbound write: {}", id, e);
            discarding = true;
        }
    }
    let _ = mux_write.shutdown().await;
}

async fn write_loop<W>(mut writer: W, mut outbound: mpsc::Receiver<Frame>)
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(WRITE_BATCH_BYTES);
    while let Some(frame) = outbound.recv().await {
        frame.encode(&mut buf);
        while buf.len() < WRITE_BATCH_BYTES {
            match outbound.try_recv() {
                Ok(frame) => frame.encode(&mut buf),
                Err(_) => break,
            }
        }

        if let Err(e) = writer.write_all(&buf).await {
            tracing::debug!("connection write failed: {}", e);
            return;
        }
        buf.clear();
        if let Err(e) = writer.flush().await {
            tracing::debug!("connection flush failed: {}", e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop<R>(
    reader: R,
    shared: Arc<Shared>,
    incoming: mpsc::UnboundedSender<BoxedStream>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    loop {
        let frame = match Frame::read_from(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!("peer closed connection");
                break;
            }
            Err(e) => {
                tracing::debug!("connection read failed: {}", e);
                break;
            }
        };

        match frame.kind {
            FrameKind::Open => {
                if shared.streams.contains_key(&frame.stream_id) {
                    tracing::warn!("duplicate open for stream {}", frame.stream_id);
                    continue;
                }
                let stream = attach_stream(&shared, frame.stream_id);
                if incoming.send(stream).is_err() {
                    // Nobody is serving; the stream is dropped and its pump
                    // closes it towards the peer.
                    tracing::debug!("no handler for stream {}", frame.stream_id);
                }
            }
            FrameKind::Data => {
                // Clone the sender out so no map guard is held across the await.
                let tx = shared
                    .streams
                    .get(&frame.stream_id)
                    .map(|e| e.value().clone());
                match tx {
                    Some(tx) => {
                        let _ = tx.send(frame.payload).await;
                    }
                    None => tracing::trace!("data for unknown stream {}", frame.stream_id),
                }
            }
            FrameKind::Close => {
                shared.streams.remove(&frame.stream_id);
            }
        }
    }

    shared.closed.store(true, Ordering::Release);
    shared.streams.clear();
}
