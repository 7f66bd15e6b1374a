use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use super::error::TransportResult;

/// Which side of the raw connection a multiplexed connection is built for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    /// The side that dialed the raw connection.
    Dialer,
    /// The side that accepted the raw connection from a listener.
    Listener,
}

impl Role {
    pub fn is_dialer(self) -> bool {
        matches!(self, Role::Dialer)
    }
}

/// A reliable, ordered byte stream the transport is layered on top of.
pub trait RawConn: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> RawConn for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedRawConn = Box<dyn RawConn>;

/// One logical stream of a multiplexed connection.
///
/// Reads and writes are ordered; `AsyncWriteExt::shutdown` closes the stream
/// without touching its parent connection.
pub trait MuxStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> MuxStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn MuxStream>;

/// Callback invoked once for every inbound stream.
pub type StreamHandler = Arc<dyn Fn(BoxedStream) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async fn into a [`StreamHandler`].
pub fn stream_handler<F, Fut>(f: F) -> StreamHandler
where
    F: Fn(BoxedStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |stream| Box::pin(f(stream)))
}

/// A raw connection wrapped by the transport under test.
#[async_trait]
pub trait MuxConn: Send + Sync {
    /// Open a new outbound stream.
    async fn open_stream(&self) -> TransportResult<BoxedStream>;

    /// Dispatch `handler` for every inbound stream until the connection
    /// closes. Each handler invocation must run concurrently with the others.
    async fn serve(&self, handler: StreamHandler) -> TransportResult<()>;

    /// Close the connection and every stream still open on it.
    async fn close(&self) -> TransportResult<()>;
}

pub type MuxConnPtr = Arc<dyn MuxConn>;

/// Factory turning raw connections into multiplexed ones.
///
/// This is the only thing a caller hands the harness.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn new_conn(&self, raw: BoxedRawConn, role: Role) -> TransportResult<MuxConnPtr>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn new_conn(&self, raw: BoxedRawConn, role: Role) -> TransportResult<MuxConnPtr> {
        (**self).new_conn(raw, role).await
    }
}
