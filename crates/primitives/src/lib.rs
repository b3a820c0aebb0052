//! Shared value types for the keysync workspace.
//!
//! - [`KeyIdentifier`]: the reconciled element, a SHA-256 digest of a key's fingerprint
//! - [`Fingerprint`]: a validated OpenPGP fingerprint
//! - [`Prefix`]: leading bits of an identifier, the address of a prefix-tree node
//! - [`PeerDescriptor`]: an externally configured reconciliation peer

pub mod fingerprint;
pub mod identifier;
pub mod peer;
pub mod prefix;

pub use fingerprint::Fingerprint;
pub use identifier::KeyIdentifier;
pub use peer::PeerDescriptor;
pub use prefix::Prefix;
