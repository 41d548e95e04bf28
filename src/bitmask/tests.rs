use std::collections::HashSet;

use rstest::*;

use crate::bitmask::{
    bit_length, bit_length_opt, int_as_bitstring, least_significant_set_bit, num_set_bits,
    set_bit_index_iter, Bitmask, BitstringFormat,
};

#[rstest]
#[case(0, 0)]
#[case(0b1, 1)]
#[case(0b1011, 3)]
#[case(u64::MAX, 64)]
fn counting_set_bits(#[case] value: u64, #[case] expected: usize) {
    assert_eq!(num_set_bits(&Bitmask::from(value)), expected);
}

#[test]
fn counting_set_bits_beyond_64() {
    let mask = Bitmask::from_indices([0, 63, 64, 200]);
    assert_eq!(num_set_bits(&mask), 4);
    assert_eq!(bit_length(&mask), 201);
    assert!(mask.to_u64().is_none());
}

#[rstest]
#[case(0, 0)]
#[case(0b1, 0b1)]
#[case(0b1100, 0b100)]
#[case(0b1010_0000, 0b10_0000)]
fn isolating_lowest_bit(#[case] value: u64, #[case] expected: u64) {
    assert_eq!(
        least_significant_set_bit(&Bitmask::from(value)),
        Bitmask::from(expected)
    );
}

#[rstest]
#[case(0, 0)]
#[case(0b1, 1)]
#[case(0b100, 3)]
#[case(0b1011, 4)]
fn measuring_bit_length(#[case] value: u64, #[case] expected: usize) {
    assert_eq!(bit_length(&Bitmask::from(value)), expected);
}

#[test]
fn bit_length_of_missing_mask() {
    assert_eq!(bit_length_opt(None), 0);
    assert_eq!(bit_length_opt(Some(&Bitmask::from(0b110))), 3);
}

#[test]
fn equality_ignores_capacity() {
    let mut grown = Bitmask::from_bit(300);
    grown.unset(300);
    grown.set(2);
    assert_eq!(grown, Bitmask::from(0b100));

    let set: HashSet<Bitmask> = [grown, Bitmask::from(0b100)].into_iter().collect();
    assert_eq!(set.len(), 1);
}

#[test]
fn ordering_follows_integer_value() {
    let mut masks = vec![
        Bitmask::from(0b1000),
        Bitmask::from(0b0111),
        Bitmask::from(0),
        Bitmask::from_indices([70]),
        Bitmask::from(0b1001),
    ];
    masks.sort();
    assert_eq!(
        masks,
        vec![
            Bitmask::from(0),
            Bitmask::from(0b0111),
            Bitmask::from(0b1000),
            Bitmask::from(0b1001),
            Bitmask::from_indices([70]),
        ]
    );
}

#[test]
fn binary_operators() {
    let a = Bitmask::from(0b1100);
    let b = Bitmask::from_indices([2, 80]);
    assert_eq!(&a | &b, Bitmask::from_indices([2, 3, 80]));
    assert_eq!(&a & &b, Bitmask::from(0b100));
    assert_eq!(&a ^ &b, Bitmask::from_indices([3, 80]));
    let mut c = a.clone();
    c |= &b;
    assert_eq!(c, &a | &b);
    assert_eq!(a.complement_within(&Bitmask::from(0b1111)), Bitmask::from(0b0011));
    assert!(Bitmask::from(0b0100).is_subset_of(&a));
    assert!(Bitmask::from(0b0011).is_disjoint_with(&a));
}

#[rstest]
#[case(0b0011, BitstringFormat::default(), "11")]
#[case(0b0011, BitstringFormat::default().with_length(6), "000011")]
#[case(0b0011, BitstringFormat::default().with_length(6).reversed(), "110000")]
#[case(0b0110, BitstringFormat::default().with_length(4).with_symbols('.', '*'), ".**.")]
#[case(0, BitstringFormat::default().with_length(3), "000")]
#[case(0b1111, BitstringFormat::default().with_length(2), "1111")]
#[case(0b1011, BitstringFormat::default().with_length(2).reversed(), "1101")]
fn rendering_bitstrings(#[case] value: u64, #[case] format: BitstringFormat, #[case] expected: &str) {
    assert_eq!(int_as_bitstring(&Bitmask::from(value), &format), expected);
}

#[test]
fn display_uses_plain_bitstring() {
    assert_eq!(format!("{}", Bitmask::from(0b101)), "101");
    assert_eq!(format!("{:?}", Bitmask::from(0b101)), "Bitmask(0b101)");
}

#[test]
fn set_bit_indices_without_mask() {
    let s = Bitmask::from(0b1001_0110);
    let indices: Vec<_> = set_bit_index_iter(&s, None, false, false).collect();
    assert_eq!(indices, vec![1, 2, 4, 7]);
    let one_based: Vec<_> = set_bit_index_iter(&s, None, true, false).collect();
    assert_eq!(one_based, vec![2, 3, 5, 8]);
}

#[test]
fn set_bit_indices_with_ordination_in_mask() {
    let s = Bitmask::from(0b1111_0000);
    let fill = Bitmask::from(0b1010_1010);
    let global: Vec<_> = set_bit_index_iter(&s, Some(&fill), false, false).collect();
    assert_eq!(global, vec![5, 7]);
    let local: Vec<_> = set_bit_index_iter(&s, Some(&fill), false, true).collect();
    assert_eq!(local, vec![2, 3]);
    let local_one_based: Vec<_> = set_bit_index_iter(&s, Some(&fill), true, true).collect();
    assert_eq!(local_one_based, vec![3, 4]);
}

#[test]
fn set_bit_iterator_is_restartable() {
    let s = Bitmask::from(0b1011);
    let mut iter = set_bit_index_iter(&s, None, false, false);
    assert_eq!(iter.next(), Some(0));
    let restart = iter.clone();
    assert_eq!(iter.collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(restart.collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(set_bit_index_iter(&Bitmask::new(), None, false, false).count(), 0);
}
