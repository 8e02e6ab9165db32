use columnar_ecs::{BitSet, BitSetError, BITSET_BITS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn set_clear_round_trip_for_every_index() {
    let mut set = BitSet::new();
    for i in 0..BITSET_BITS {
        set.set_bit(i);
        assert!(set.has(i));
        assert_eq!(set.count(), 1);
        set.clear_bit(i);
        assert!(!set.has(i));
        assert!(set.is_empty());
    }
}

#[test]
fn try_set_bit_rejects_out_of_range() {
    let mut set = BitSet::new();
    assert_eq!(set.try_set_bit(256), Err(BitSetError::IndexOutOfRange { index: 256 }));
    assert!(set.is_empty());
    assert_eq!(set.try_set_bit(255), Ok(()));
    assert!(set.has(255));
}

fn random_subset(rng: &mut StdRng) -> (BitSet, Vec<bool>) {
    let mut set = BitSet::new();
    let mut members = vec![false; BITSET_BITS];
    let density = rng.gen_range(0.0..0.3);
    for (i, member) in members.iter_mut().enumerate() {
        if rng.gen_bool(density) {
            set.set_bit(i);
            *member = true;
        }
    }
    (set, members)
}

#[test]
fn has_all_and_has_any_agree_with_membership() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    for _ in 0..500 {
        let (a, a_members) = random_subset(&mut rng);
        let (b, b_members) = random_subset(&mut rng);

        let all = (0..BITSET_BITS).all(|i| !b_members[i] || a_members[i]);
        let any = (0..BITSET_BITS).any(|i| a_members[i] && b_members[i]);
        assert_eq!(a.has_all(&b), all);
        assert_eq!(a.has_any(&b), any);

        assert_eq!(a.union(&b).count(), (0..BITSET_BITS).filter(|&i| a_members[i] || b_members[i]).count());
        assert_eq!(a.intersect(&b).count(), (0..BITSET_BITS).filter(|&i| a_members[i] && b_members[i]).count());
        let expected: Vec<usize> = (0..BITSET_BITS).filter(|&i| a_members[i]).collect();
        assert_eq!(a.iter().collect::<Vec<_>>(), expected);
        assert_eq!(a.iter().len(), expected.len());
    }
}

#[test]
fn added_removed_changed() {
    let old = BitSet::from_indices(&[1, 2, 70]);
    let new = BitSet::from_indices(&[2, 70, 200]);
    assert_eq!(BitSet::added(&old, &new), BitSet::from_indices(&[200]));
    assert_eq!(BitSet::removed(&old, &new), BitSet::from_indices(&[1]));
    assert_eq!(BitSet::changed(&old, &new), BitSet::from_indices(&[1, 200]));
}

#[test]
fn hash64_is_deterministic_and_content_based() {
    let a = BitSet::from_indices(&[3, 64, 129]);
    let b: BitSet = [129, 3, 64].into_iter().collect();
    assert_eq!(a, b);
    assert_eq!(a.hash64(), b.hash64());
    assert_ne!(a.hash64(), BitSet::from_indices(&[3, 64]).hash64());
}

#[test]
fn empty_set_has_all_of_nothing() {
    let empty = BitSet::new();
    let some = BitSet::from_indices(&[5]);
    assert!(some.has_all(&empty));
    assert!(empty.has_all(&empty));
    assert!(!empty.has_any(&some));
    assert!(!some.has_any(&empty));
}
