//! Framing of reconciliation messages.
//!
//! Every frame is preceded by its length as a big-endian `u32` and laid out as
//!
//! ```text
//! ┌──────┬───────────┬────────────────────────┬─────────────────┐
//! │ type │ prefixLen │ prefixBits             │ payload (borsh) │
//! │ u8   │ u8        │ ceil(prefixLen/8) bytes │                 │
//! └──────┴───────────┴────────────────────────┴─────────────────┘
//! ```

#[cfg(test)]
#[path = "tests/codec.rs"]
mod tests;

use std::io;

use borsh::{BorshDeserialize, BorshSerialize};
use bytes::{BufMut, Bytes, BytesMut};
use keysync_primitives::prefix::PrefixError;
use keysync_primitives::{KeyIdentifier, Prefix};
use keysync_ptree::node::NodeDigest;
use keysync_ptree::SValues;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::messages::{ErrorCode, Message, MessageType, NodeSummary};

/// Largest accepted frame, excluding the length prefix.
pub const MAX_FRAME_SIZE: usize = 8 * 1_024 * 1_024;

const HEADER_LEN: usize = 2;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("frame shorter than its header")]
    Truncated,

    #[error("unknown message type {0}")]
    UnknownType(u8),

    #[error("unknown error code {0}")]
    UnknownErrorCode(u8),

    #[error("invalid prefix")]
    Prefix(#[from] PrefixError),

    #[error("invalid {kind} payload")]
    Payload {
        kind: &'static str,
        #[source]
        source: io::Error,
    },
}

impl CodecError {
    /// Whether the peer sent bytes that do not form a valid message, as opposed
    /// to the connection failing underneath.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        match self {
            Self::Io(err) => err.kind() == io::ErrorKind::InvalidData,
            Self::Truncated
            | Self::UnknownType(_)
            | Self::UnknownErrorCode(_)
            | Self::Prefix(_)
            | Self::Payload { .. } => true,
        }
    }
}

#[derive(BorshSerialize, BorshDeserialize)]
struct DigestPayload {
    num_elements: u64,
    svalues: Vec<u64>,
    child_hashes: Vec<NodeDigest>,
    is_leaf: bool,
}

#[derive(Debug)]
pub struct ReconCodec {
    length_codec: LengthDelimitedCodec,
}

impl Default for ReconCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconCodec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            length_codec: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .big_endian()
                .max_frame_length(MAX_FRAME_SIZE)
                .new_codec(),
        }
    }
}

impl Decoder for ReconCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame) = self.length_codec.decode(src)? else {
            return Ok(None);
        };

        decode_frame(&frame).map(Some)
    }
}

impl Encoder<Message> for ReconCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = encode_frame(&item)?;

        self.length_codec
            .encode(frame, dst)
            .map_err(CodecError::Io)
    }
}

fn encode_frame(message: &Message) -> Result<Bytes, CodecError> {
    let prefix = message.prefix();

    let payload = match message {
        Message::RequestNode { .. } | Message::RequestElements { .. } => vec![],
        Message::NodeDigest(summary) => borsh::to_vec(&DigestPayload {
            num_elements: summary.num_elements,
            svalues: summary.svalues.as_slice().to_vec(),
            child_hashes: summary.child_hashes.clone(),
            is_leaf: summary.is_leaf,
        })?,
        Message::ElementList { elements, .. } => borsh::to_vec(elements)?,
        Message::Error { code, .. } => vec![*code as u8],
    };

    let mut frame = BytesMut::with_capacity(HEADER_LEN + prefix.as_bytes().len() + payload.len());

    frame.put_u8(message.message_type() as u8);
    frame.put_u8(prefix.len());
    frame.put_slice(prefix.as_bytes());
    frame.put_slice(&payload);

    Ok(frame.freeze())
}

fn decode_frame(frame: &[u8]) -> Result<Message, CodecError> {
    let [tag, prefix_len, rest @ ..] = frame else {
        return Err(CodecError::Truncated);
    };

    let message_type = MessageType::from_tag(*tag).ok_or(CodecError::UnknownType(*tag))?;

    let prefix_bytes = usize::from(*prefix_len).div_ceil(8);
    if rest.len() < prefix_bytes {
        return Err(CodecError::Truncated);
    }
    let (bits, payload) = rest.split_at(prefix_bytes);

    let prefix = Prefix::from_parts(*prefix_len, bits)?;

    let message = match message_type {
        MessageType::RequestNode => {
            expect_empty(payload, "RequestNode")?;
            Message::RequestNode { prefix }
        }
        MessageType::RequestElements => {
            expect_empty(payload, "RequestElements")?;
            Message::RequestElements { prefix }
        }
        MessageType::NodeDigest => {
            let digest = borsh::from_slice::<DigestPayload>(payload).map_err(|source| {
                CodecError::Payload {
                    kind: "NodeDigest",
                    source,
                }
            })?;

            Message::NodeDigest(NodeSummary {
                prefix,
                num_elements: digest.num_elements,
                svalues: SValues::from_vec(digest.svalues),
                child_hashes: digest.child_hashes,
                is_leaf: digest.is_leaf,
            })
        }
        MessageType::ElementList => {
            let elements =
                borsh::from_slice::<Vec<KeyIdentifier>>(payload).map_err(|source| {
                    CodecError::Payload {
                        kind: "ElementList",
                        source,
                    }
                })?;

            Message::ElementList { prefix, elements }
        }
        MessageType::Error => {
            let [code] = payload else {
                return Err(CodecError::Payload {
                    kind: "Error",
                    source: io::Error::new(io::ErrorKind::InvalidData, "expected one byte"),
                });
            };

            let code = ErrorCode::try_from(*code).map_err(CodecError::UnknownErrorCode)?;

            Message::Error { prefix, code }
        }
    };

    Ok(message)
}

fn expect_empty(payload: &[u8], kind: &'static str) -> Result<(), CodecError> {
    if payload.is_empty() {
        return Ok(());
    }

    Err(CodecError::Payload {
        kind,
        source: io::Error::new(io::ErrorKind::InvalidData, "unexpected payload"),
    })
}
