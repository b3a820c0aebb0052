//! Peer-to-peer reconciliation of prefix trees.
//!
//! A session walks the local tree and a peer's tree top-down, one request per
//! prefix, pruning every subtree whose digests agree, and ends with the
//! identifiers each side is missing:
//!
//! ```text
//! Initiator                                   Responder
//! │ ── RequestNode(<root>) ───────────────────► │  pins a snapshot
//! │ ◄── NodeDigest(<root>, count, svalues, ..) ─ │
//! │ ── RequestNode(01) ───────────────────────► │  only differing children
//! │ ◄── NodeDigest(01, ..) ───────────────────── │
//! │ ── RequestElements(01) ───────────────────► │  either side is a leaf
//! │ ◄── ElementList(01, [..]) ────────────────── │
//! ```

pub mod codec;
pub mod engine;
pub mod memory;
pub mod messages;
pub mod responder;
pub mod server;
pub mod tcp;
pub mod transport;

pub use engine::{
    ReconDiff, ReconError, ReconciliationEngine, SessionConfig, SessionOutcome, SessionReport,
    SessionState, SessionStats,
};
pub use memory::InProcessTransport;
pub use messages::{ErrorCode, Message, NodeSummary};
pub use responder::Responder;
pub use server::ReconServer;
pub use tcp::TcpTransport;
pub use transport::{GossipTransport, TransportError};
