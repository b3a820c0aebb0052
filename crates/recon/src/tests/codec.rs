use futures_util::StreamExt;
use keysync_primitives::identifier::IDENTIFIER_LEN;
use tokio_test::io::Builder;
use tokio_util::codec::FramedRead;

use super::*;

fn id(byte: u8) -> KeyIdentifier {
    KeyIdentifier::from_bytes([byte; IDENTIFIER_LEN])
}

fn prefix() -> Prefix {
    Prefix::of(&id(0b1011_0110), 10)
}

fn messages() -> Vec<Message> {
    vec![
        Message::RequestNode {
            prefix: Prefix::ROOT,
        },
        Message::NodeDigest(NodeSummary {
            prefix: prefix(),
            num_elements: 12,
            svalues: SValues::from_vec(vec![1, 2, 3]),
            child_hashes: vec![[7; 32], [9; 32]],
            is_leaf: false,
        }),
        Message::RequestElements { prefix: prefix() },
        Message::ElementList {
            prefix: prefix(),
            elements: vec![id(1), id(2)],
        },
        Message::Error {
            prefix: Prefix::ROOT,
            code: ErrorCode::Busy,
        },
    ]
}

#[test]
fn test_frame_layout() {
    let mut buffer = BytesMut::new();
    let mut codec = ReconCodec::new();

    codec
        .encode(Message::RequestElements { prefix: prefix() }, &mut buffer)
        .unwrap();

    // length, type, prefix length, two prefix bytes
    assert_eq!(&buffer[..], &[0, 0, 0, 4, 3, 10, 0b1011_0110, 0b1000_0000]);
}

#[test]
fn test_every_variant_survives_the_codec() {
    let mut buffer = BytesMut::new();
    let mut codec = ReconCodec::new();

    for message in messages() {
        codec.encode(message, &mut buffer).unwrap();
    }

    for expected in messages() {
        assert_eq!(codec.decode(&mut buffer).unwrap(), Some(expected));
    }

    assert_eq!(codec.decode(&mut buffer).unwrap(), None);
}

#[tokio::test]
async fn test_multiple_messages_stream() {
    let mut buffer = BytesMut::new();
    let mut codec = ReconCodec::new();

    for message in messages() {
        codec.encode(message, &mut buffer).unwrap();
    }

    let bytes = buffer.freeze();
    let (first, second) = bytes.split_at(7);

    let mut stream = Builder::new().read(first).read(second).build();
    let mut framed = FramedRead::new(&mut stream, ReconCodec::new());

    for expected in messages() {
        assert_eq!(framed.next().await.unwrap().unwrap(), expected);
    }

    assert!(framed.next().await.is_none());
}

fn decode_raw(frame: &[u8]) -> Result<Option<Message>, CodecError> {
    let mut buffer = BytesMut::new();
    buffer.put_u32(u32::try_from(frame.len()).unwrap());
    buffer.put_slice(frame);

    ReconCodec::new().decode(&mut buffer)
}

#[test]
fn test_rejects_malformed_frames() {
    assert!(matches!(decode_raw(&[9, 0]), Err(CodecError::UnknownType(9))));
    assert!(matches!(decode_raw(&[1]), Err(CodecError::Truncated)));
    assert!(matches!(decode_raw(&[1, 12, 0xff]), Err(CodecError::Truncated)));
    assert!(matches!(
        decode_raw(&[1, 3, 0xff]),
        Err(CodecError::Prefix(PrefixError::TrailingBits))
    ));
    assert!(matches!(
        decode_raw(&[1, 0, 0]),
        Err(CodecError::Payload {
            kind: "RequestNode",
            ..
        })
    ));
    assert!(matches!(
        decode_raw(&[5, 0, 42]),
        Err(CodecError::UnknownErrorCode(42))
    ));
    assert!(matches!(
        decode_raw(&[4, 0, 1, 0, 0, 0]),
        Err(CodecError::Payload {
            kind: "ElementList",
            ..
        })
    ));

    let err = decode_raw(&[9, 0]).unwrap_err();
    assert!(err.is_malformed());
}

#[test]
fn test_rejects_oversized_frame() {
    let mut buffer = BytesMut::new();
    buffer.put_u32(u32::try_from(MAX_FRAME_SIZE + 1).unwrap());

    let err = ReconCodec::new().decode(&mut buffer).unwrap_err();

    assert!(err.is_malformed());
}
