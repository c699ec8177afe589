//! rescuenet-transport - directory, router and wire bindings
//!
//! The router resolves each receiver through the directory and hands the
//! encoded message to a `Connector`: TCP for a distributed run, in-process
//! mailboxes for the demo and tests.

pub mod directory;
pub mod local;
pub mod log;
pub mod router;
pub mod tcp;

pub use directory::{AgentAddress, Directory};
pub use local::LocalConnector;
pub use log::{Direction, LogEntry, TransportLog};
pub use router::{Connector, RouteReport, TransportRouter};
pub use tcp::{
    DEFAULT_MAX_PAYLOAD, DEFAULT_READ_TIMEOUT, TcpConnector, TcpTransport, read_frame,
    read_frame_within, serve_agent, serve_router,
};
