//! Transports that break the contract on purpose.

#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use muxstress::mux::FrameMux;
use muxstress::transport::{
    BoxedRawConn, BoxedStream, MuxConn, MuxConnPtr, Role, StreamHandler, Transport,
    TransportError, TransportResult,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// What a `FaultyConn` does to the dialing side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Flip the first byte of every write.
    CorruptWrites,
    /// Refuse every `open_stream`.
    RefuseStreams,
    /// Fail the write after this many successful ones, once per stream.
    FailWriteAfter(usize),
    /// Reads see EOF once the stream has been shut down.
    FullClose,
}

/// Wraps the reference mux and applies `fault` to dialer connections.
#[derive(Debug, Clone)]
pub struct FaultyTransport {
    inner: FrameMux,
    fault: Fault,
    closes: Arc<AtomicUsize>,
}

impl FaultyTransport {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: FrameMux::default(),
            fault,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `close` calls made on dialer connections so far.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FaultyTransport {
    async fn new_conn(&self, raw: BoxedRawConn, role: Role) -> TransportResult<MuxConnPtr> {
        let conn = self.inner.new_conn(raw, role).await?;
        match role {
            Role::Listener => Ok(conn),
            Role::Dialer => Ok(Arc::new(FaultyConn {
                inner: conn,
                fault: self.fault,
                closes: self.closes.clone(),
            })),
        }
    }
}

struct FaultyConn {
    inner: MuxConnPtr,
    fault: Fault,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl MuxConn for FaultyConn {
    async fn open_stream(&self) -> TransportResult<BoxedStream> {
        if self.fault == Fault::RefuseStreams {
            return Err(TransportError::OpenFailed("refused".into()));
        }
        let inner = self.inner.open_stream().await?;
        let stream: BoxedStream = match self.fault {
            Fault::CorruptWrites => Box::new(CorruptingStream { inner }),
            Fault::FailWriteAfter(fail_at) => Box::new(FailingWriteStream {
                inner,
                writes: 0,
                fail_at,
            }),
            Fault::FullClose => Box::new(FullCloseStream {
                inner,
                closed: false,
            }),
            Fault::RefuseStreams => inner,
        };
        Ok(stream)
    }

    async fn serve(&self, handler: StreamHandler) -> TransportResult<()> {
        self.inner.serve(handler).await
    }

    async fn close(&self) -> TransportResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

struct CorruptingStream {
    inner: BoxedStream,
}

impl AsyncRead for CorruptingStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for CorruptingStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut corrupted = buf.to_vec();
        if let Some(first) = corrupted.first_mut() {
            *first ^= 0xff;
        }
        Pin::new(&mut self.inner).poll_write(cx, &corrupted)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

struct FailingWriteStream {
    inner: BoxedStream,
    writes: usize,
    fail_at: usize,
}

impl AsyncRead for FailingWriteStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FailingWriteStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.writes == self.fail_at {
            self.writes += 1;
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        let res = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(_)) = res {
            self.writes += 1;
        }
        res
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

struct FullCloseStream {
    inner: BoxedStream,
    closed: bool,
}

impl AsyncRead for FullCloseStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.closed {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FullCloseStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.closed = true;
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Fails to wrap dialed connections.
#[derive(Debug, Clone, Default)]
pub struct RejectingTransport {
    inner: FrameMux,
}

#[async_trait]
impl Transport for RejectingTransport {
    async fn new_conn(&self, raw: BoxedRawConn, role: Role) -> TransportResult<MuxConnPtr> {
        match role {
            Role::Dialer => Err(TransportError::Protocol("handshake rejected".into())),
            Role::Listener => self.inner.new_conn(raw, role).await,
        }
    }
}

