use super::*;

#[test]
fn test_from_fingerprint_is_stable_across_case() {
    let upper: Fingerprint = "0123456789ABCDEF0123456789ABCDEF01234567".parse().unwrap();
    let lower: Fingerprint = "0123456789abcdef0123456789abcdef01234567".parse().unwrap();

    assert_eq!(
        KeyIdentifier::from_fingerprint(&upper),
        KeyIdentifier::from_fingerprint(&lower)
    );
}

#[test]
fn test_bit_access() {
    let mut bytes = [0; IDENTIFIER_LEN];
    bytes[0] = 0b1010_0000;
    bytes[1] = 0b0000_0001;
    let id = KeyIdentifier::from_bytes(bytes);

    assert!(id.bit(0));
    assert!(!id.bit(1));
    assert!(id.bit(2));
    assert!(id.bit(15));
    assert_eq!(id.bits(0, 2), 0b10);
    assert_eq!(id.bits(0, 3), 0b101);
    assert_eq!(id.bits(14, 2), 0b01);
}

#[test]
fn test_bits_past_end_read_zero() {
    let id = KeyIdentifier::from_bytes([0xff; IDENTIFIER_LEN]);

    assert_eq!(id.bits(IDENTIFIER_BITS - 1, 3), 0b100);
}

#[test]
fn test_hex_round_trip() {
    let id = KeyIdentifier::from_bytes([0xab; IDENTIFIER_LEN]);
    let text = id.to_string();

    assert_eq!(text.len(), IDENTIFIER_LEN * 2);
    assert_eq!(text.parse::<KeyIdentifier>().unwrap(), id);
    assert_eq!(
        "abcd".parse::<KeyIdentifier>(),
        Err(IdentifierError::InvalidLength)
    );
    assert_eq!(
        "zz".repeat(IDENTIFIER_LEN).parse::<KeyIdentifier>(),
        Err(IdentifierError::InvalidHex)
    );
}

#[test]
fn test_try_from_slice() {
    assert!(KeyIdentifier::try_from(&[0_u8; 31][..]).is_err());
    assert!(KeyIdentifier::try_from(&[0_u8; 32][..]).is_ok());
}

#[test]
fn test_serde_uses_hex_text() {
    let id = KeyIdentifier::from_bytes([0x1f; IDENTIFIER_LEN]);

    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{}\"", "1f".repeat(IDENTIFIER_LEN)));

    let decoded: KeyIdentifier = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, id);

    assert!(serde_json::from_str::<KeyIdentifier>("\"abcd\"").is_err());
}
