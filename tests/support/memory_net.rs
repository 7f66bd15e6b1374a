//! In-process raw network built on `tokio::io::duplex`.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use muxstress::transport::{BoxedRawConn, Network, RawListener};
use tokio::sync::mpsc;

const PIPE_BUFFER: usize = 256 * 1024;

#[derive(Clone, Default)]
pub struct MemoryNetwork {
    listeners: Arc<DashMap<SocketAddr, mpsc::UnboundedSender<BoxedRawConn>>>,
    next_port: Arc<AtomicU16>,
    dials: Arc<AtomicUsize>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections dialed so far.
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::Relaxed)
    }
}

struct MemoryListener {
    addr: SocketAddr,
    incoming: mpsc::UnboundedReceiver<BoxedRawConn>,
    listeners: Arc<DashMap<SocketAddr, mpsc::UnboundedSender<BoxedRawConn>>>,
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.listeners.remove(&self.addr);
    }
}

#[async_trait]
impl RawListener for MemoryListener {
    async fn accept(&mut self) -> io::Result<BoxedRawConn> {
        self.incoming
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "listener closed"))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    async fn listen(&self) -> io::Result<Box<dyn RawListener>> {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed) + 1;
        let addr = SocketAddr::from(([10, 0, 0, 1], port));
        let (tx, incoming) = mpsc::unbounded_channel();
        self.listeners.insert(addr, tx);
        Ok(Box::new(MemoryListener {
            addr,
            incoming,
            listeners: self.listeners.clone(),
        }))
    }

    async fn dial(&self, addr: SocketAddr) -> io::Result<BoxedRawConn> {
        let tx = self
            .listeners
            .get(&addr)
            .map(|e| e.value().clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, addr.to_string()))?;

        let (local, remote) = tokio::io::duplex(PIPE_BUFFER);
        tx.send(Box::new(remote))
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, addr.to_string()))?;
        self.dials.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(local))
    }
}
