//! Reconciliation message catalogue.

use core::fmt;

use keysync_primitives::{KeyIdentifier, Prefix};
use keysync_ptree::node::NodeDigest;
use keysync_ptree::{NodeView, SValues};

/// Upper bound on identifiers in one [`Message::ElementList`].
///
/// Responders refuse larger requests with [`ErrorCode::Busy`]; initiators treat
/// a larger list as a protocol violation.
pub const MAX_ELEMENTS_PER_RESPONSE: usize = 100_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Ask for the digest of the subtree under `prefix`.
    ///
    /// A request for the root starts a new session on the responder, which pins
    /// a fresh snapshot for the requests that follow.
    RequestNode { prefix: Prefix },
    NodeDigest(NodeSummary),
    /// Ask for every identifier under `prefix`.
    RequestElements { prefix: Prefix },
    ElementList {
        prefix: Prefix,
        elements: Vec<KeyIdentifier>,
    },
    Error { prefix: Prefix, code: ErrorCode },
}

/// The remote half of a node comparison.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSummary {
    pub prefix: Prefix,
    pub num_elements: u64,
    pub svalues: SValues,
    /// One digest per child slot for internal nodes, empty for leaves.
    pub child_hashes: Vec<NodeDigest>,
    pub is_leaf: bool,
}

impl From<NodeView> for NodeSummary {
    fn from(view: NodeView) -> Self {
        Self {
            prefix: view.prefix,
            num_elements: view.num_elements,
            svalues: view.svalues,
            child_hashes: view.child_hashes,
            is_leaf: view.is_leaf,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// The message is not a request this side answers.
    Unsupported = 1,
    /// The request was well-framed but not meaningful, e.g. a misaligned prefix.
    Malformed = 2,
    Internal = 3,
    /// The answer would be too large; descend further instead.
    Busy = 4,
}

impl TryFrom<u8> for ErrorCode {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Unsupported),
            2 => Ok(Self::Malformed),
            3 => Ok(Self::Internal),
            4 => Ok(Self::Busy),
            unknown => Err(unknown),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Unsupported => "unsupported",
            Self::Malformed => "malformed",
            Self::Internal => "internal",
            Self::Busy => "busy",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum MessageType {
    RequestNode = 1,
    NodeDigest = 2,
    RequestElements = 3,
    ElementList = 4,
    Error = 5,
}

impl MessageType {
    pub(crate) const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::RequestNode),
            2 => Some(Self::NodeDigest),
            3 => Some(Self::RequestElements),
            4 => Some(Self::ElementList),
            5 => Some(Self::Error),
            _ => None,
        }
    }
}

impl Message {
    #[must_use]
    pub const fn prefix(&self) -> &Prefix {
        match self {
            Self::RequestNode { prefix }
            | Self::RequestElements { prefix }
            | Self::ElementList { prefix, .. }
            | Self::Error { prefix, .. } => prefix,
            Self::NodeDigest(summary) => &summary.prefix,
        }
    }

    pub(crate) const fn message_type(&self) -> MessageType {
        match self {
            Self::RequestNode { .. } => MessageType::RequestNode,
            Self::NodeDigest(_) => MessageType::NodeDigest,
            Self::RequestElements { .. } => MessageType::RequestElements,
            Self::ElementList { .. } => MessageType::ElementList,
            Self::Error { .. } => MessageType::Error,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RequestNode { .. } => "RequestNode",
            Self::NodeDigest(_) => "NodeDigest",
            Self::RequestElements { .. } => "RequestElements",
            Self::ElementList { .. } => "ElementList",
            Self::Error { .. } => "Error",
        }
    }
}
