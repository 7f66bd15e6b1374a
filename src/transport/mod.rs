//! Capability interface the harness consumes from a transport under test,
//! plus the raw byte-stream network layer underneath it.

pub mod error;
pub mod net;
pub mod types;

pub use error::{TransportError, TransportResult};
pub use net::{Network, RawListener, TcpNetwork};
pub use types::{
    stream_handler, BoxedRawConn, BoxedStream, MuxConn, MuxConnPtr, MuxStream, RawConn, Role,
    StreamHandler, Transport,
};
