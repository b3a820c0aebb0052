//! The answering side of a reconciliation session.

#[cfg(test)]
#[path = "tests/responder.rs"]
mod tests;

use std::sync::Arc;

use keysync_primitives::Prefix;
use keysync_ptree::{PrefixTreeStore, TreeParams, TreeSnapshot};
use tracing::trace;

use crate::messages::{ErrorCode, Message, NodeSummary, MAX_ELEMENTS_PER_RESPONSE};

/// Answers `request` from `snapshot`.
#[must_use]
pub fn respond(snapshot: &TreeSnapshot, request: &Message) -> Message {
    let error = |prefix: &Prefix, code| Message::Error {
        prefix: *prefix,
        code,
    };

    match request {
        Message::RequestNode { prefix } => {
            if !is_addressable(prefix, snapshot.params()) {
                return error(prefix, ErrorCode::Malformed);
            }

            Message::NodeDigest(NodeSummary::from(snapshot.view(prefix)))
        }
        Message::RequestElements { prefix } => {
            if !is_addressable(prefix, snapshot.params()) {
                return error(prefix, ErrorCode::Malformed);
            }

            let elements = snapshot.elements_under(prefix);

            if elements.len() > MAX_ELEMENTS_PER_RESPONSE {
                return error(prefix, ErrorCode::Busy);
            }

            Message::ElementList {
                prefix: *prefix,
                elements: elements.into_iter().collect(),
            }
        }
        Message::NodeDigest(_) | Message::ElementList { .. } | Message::Error { .. } => {
            error(request.prefix(), ErrorCode::Unsupported)
        }
    }
}

/// Whether `prefix` addresses a node position of a tree with `params`.
fn is_addressable(prefix: &Prefix, params: &TreeParams) -> bool {
    prefix.len() % params.bit_quantum() == 0 && params.depth_of(prefix) <= params.max_depth()
}

/// Per-connection responder state.
///
/// Pins a snapshot on every root request so that all answers within one session
/// describe the same tree, however it changes meanwhile.
#[derive(Debug)]
pub struct Responder {
    store: Arc<PrefixTreeStore>,
    pinned: Option<TreeSnapshot>,
}

impl Responder {
    #[must_use]
    pub const fn new(store: Arc<PrefixTreeStore>) -> Self {
        Self {
            store,
            pinned: None,
        }
    }

    pub fn handle(&mut self, request: &Message) -> Message {
        let restart = matches!(request, Message::RequestNode { prefix } if prefix.is_root());

        let snapshot = match &mut self.pinned {
            Some(snapshot) if !restart => snapshot,
            pinned => pinned.insert(self.store.snapshot_root()),
        };

        let response = respond(snapshot, request);

        trace!(
            request = request.kind(),
            response = response.kind(),
            prefix = %request.prefix(),
            "Answered reconciliation request"
        );

        response
    }
}
