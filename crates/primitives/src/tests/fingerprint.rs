use super::*;

const V4: &str = "0123456789ABCDEF0123456789abcdef01234567";
const V6: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

#[test]
fn test_parse_v4_lowercases() {
    let fingerprint: Fingerprint = V4.parse().unwrap();

    assert!(!fingerprint.is_v6());
    assert_eq!(fingerprint.as_bytes().len(), V4_FINGERPRINT_LEN);
    assert_eq!(fingerprint.to_string(), V4.to_lowercase());
}

#[test]
fn test_parse_v6() {
    let fingerprint: Fingerprint = V6.parse().unwrap();

    assert!(fingerprint.is_v6());
    assert_eq!(fingerprint.to_string(), V6);
}

#[test]
fn test_reject_bad_lengths_and_chars() {
    for bad in [
        "",
        "abc",
        &V4[..39],
        &V6[..63],
        "0123456789abcdef0123456789abcdef0123456g",
        " 0123456789abcdef0123456789abcdef0123456",
    ] {
        assert!(
            bad.parse::<Fingerprint>().is_err(),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn test_parse_list() {
    let list = Fingerprint::parse_list(&format!("{V4}, {V6}")).unwrap();

    assert_eq!(list.len(), 2);
    assert!(!list[0].is_v6());
    assert!(list[1].is_v6());
}

#[test]
fn test_parse_list_rejects_whole_list_on_bad_entry() {
    let err = Fingerprint::parse_list(&format!("{V4},nope,{V6}")).unwrap_err();

    assert_eq!(err, FingerprintError::InvalidFormat("nope".to_owned()));
}

#[test]
fn test_serde_round_trip() {
    let fingerprint: Fingerprint = V4.parse().unwrap();

    let json = serde_json::to_string(&fingerprint).unwrap();
    assert_eq!(json, format!("\"{}\"", V4.to_lowercase()));

    let decoded: Fingerprint = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, fingerprint);
}
