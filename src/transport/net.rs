//! Raw byte-stream layer the transport under test runs on.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};

use super::types::BoxedRawConn;

/// Listener side of the raw network.
#[async_trait]
pub trait RawListener: Send {
    async fn accept(&mut self) -> io::Result<BoxedRawConn>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Produces listeners and dialed connections.
#[async_trait]
pub trait Network: Send + Sync + 'static {
    /// Bind a fresh listener on an ephemeral address.
    async fn listen(&self) -> io::Result<Box<dyn RawListener>>;

    async fn dial(&self, addr: SocketAddr) -> io::Result<BoxedRawConn>;
}

/// Loopback TCP, the default raw network.
#[derive(Debug, Clone)]
pub struct TcpNetwork {
    bind_addr: SocketAddr,
    backlog: i32,
}

impl TcpNetwork {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            backlog: 1024,
        }
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    fn bind_std(&self) -> io::Result<std::net::TcpListener> {
        let socket = Socket::new(
            Domain::for_address(self.bind_addr),
            Type::STREAM,
            Some(Protocol::TCP),
        )?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&self.bind_addr.into())?;
        socket.listen(self.backlog)?;
        Ok(socket.into())
    }
}

impl Default for TcpNetwork {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 0)))
    }
}

struct TcpRawListener {
    inner: TcpListener,
}

#[async_trait]
impl RawListener for TcpRawListener {
    async fn accept(&mut self) -> io::Result<BoxedRawConn> {
        let (stream, peer) = self.inner.accept().await?;
        stream.set_nodelay(true)?;
        tracing::trace!("accepted raw connection from {}", peer);
        Ok(Box::new(stream))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

#[async_trait]
impl Network for TcpNetwork {
    async fn listen(&self) -> io::Result<Box<dyn RawListener>> {
        let inner = TcpListener::from_std(self.bind_std()?)?;
        Ok(Box::new(TcpRawListener { inner }))
    }

    async fn dial(&self, addr: SocketAddr) -> io::Result<BoxedRawConn> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_listen_binds_ephemeral_port() {
        let network = TcpNetwork::default();
        let listener = network.listen().await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_dial_and_accept() {
        let network = TcpNetwork::default();
        let mut listener = network.listen().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            conn.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut conn = network.dial(addr).await.unwrap();
        conn.write_all(b"hello").await.unwrap();

        assert_eq!(&server.await.unwrap(), b"hello");
    }
}
