//! The prefix tree: an index of key identifiers by leading bits, carrying at
//! every node an aggregate ("svalues") of the identifiers beneath it.
//!
//! Two trees built with the same [`TreeParams`] over the same identifier set are
//! identical node for node, which is what lets peers compare subtrees by digest
//! and only descend where they differ.

pub mod config;
pub mod errors;
pub mod node;
pub mod store;
pub mod svalue;
pub mod tree;

pub use config::{TreeConfig, TreeParams};
pub use errors::TreeError;
pub use node::{NodeDigest, NodeKind, NodeView, PrefixNode};
pub use store::{PrefixTreeStore, TreeSnapshot};
pub use svalue::SValues;
pub use tree::{PrefixTree, TreeDelta};
