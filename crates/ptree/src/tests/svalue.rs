use super::*;

fn id(head: u64) -> KeyIdentifier {
    let mut bytes = [0; 32];
    bytes[..8].copy_from_slice(&head.to_be_bytes());
    KeyIdentifier::from_bytes(bytes)
}

#[test]
fn test_field_arithmetic() {
    assert_eq!(mul(MODULUS - 1, MODULUS - 1), 1);
    assert_eq!(mul(2, MODULUS - 1), MODULUS - 2);
    assert_eq!(sub(0, 1), MODULUS - 1);
    assert_eq!(sub(5, 3), 2);

    let a = 0x1234_5678_9abc_def0 % MODULUS;
    let b = 0x0fed_cba9_8765_4321 % MODULUS;
    let expected = (u128::from(a) * u128::from(b) % u128::from(MODULUS)) as u64;
    assert_eq!(mul(a, b), expected);
}

#[test]
fn test_default_sample_points() {
    assert_eq!(
        default_sample_points(3),
        vec![MODULUS - 1, MODULUS - 2, MODULUS - 3]
    );
}

#[test]
fn test_element_value_skips_sample_points() {
    let points = default_sample_points(3);

    assert_eq!(element_value(&id(MODULUS - 3), &points), 0);
    assert_eq!(element_value(&id(MODULUS - 1), &points), 0);
    assert_eq!(element_value(&id(MODULUS + 4), &points), 4);
    assert_eq!(element_value(&id(17), &points), 17);
}

#[test]
fn test_aggregate_is_order_independent() {
    let points = default_sample_points(4);
    let ids = [id(1), id(2), id(99), id(u64::MAX)];

    let forward = SValues::of_elements(&ids, &points);
    let backward = SValues::of_elements(ids.iter().rev(), &points);

    assert_eq!(forward, backward);
    assert!(forward.is_reduced());
}

#[test]
fn test_combine_matches_union() {
    let points = default_sample_points(6);
    let left = [id(10), id(20)];
    let right = [id(30)];

    let mut combined = SValues::of_elements(&left, &points);
    combined.combine(&SValues::of_elements(&right, &points));

    let union = SValues::of_elements(left.iter().chain(&right), &points);

    assert_eq!(combined, union);
    assert_ne!(union, SValues::empty(6));
}

#[test]
fn test_empty_set_is_all_ones() {
    let points = default_sample_points(2);

    assert_eq!(SValues::of_elements([], &points).as_slice(), &[1, 1]);
}
