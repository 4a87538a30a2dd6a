use lightning_hotpath::{Arena, Error, ARENA_ALIGN};
use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

#[test]
fn test_reset_reuses_buffer_from_start() {
    let mut arena = Arena::new(1024).unwrap();
    let first = arena.alloc(100).unwrap();
    arena.alloc(200).unwrap();
    assert_eq!(arena.used(), 304);

    arena.reset();
    assert_eq!(arena.used(), 0);
    assert_eq!(arena.remaining(), 1024);
    assert_eq!(arena.generation(), 1);
    assert_eq!(arena.alloc(100).unwrap(), first);
}

#[test]
fn test_generation_counts_resets() {
    let mut arena = Arena::new(64).unwrap();
    for expected in 1..=50 {
        arena.alloc(64).unwrap();
        assert!(arena.alloc(1).is_none());
        arena.reset();
        assert_eq!(arena.generation(), expected);
    }
}

#[test]
fn test_contains_tracks_buffer_bounds() {
    let arena = Arena::new(128).unwrap();
    let ptr = arena.alloc(16).unwrap();
    assert!(arena.contains(ptr.as_ptr()));

    let outside = 0u64;
    assert!(!arena.contains(&outside as *const u64 as *const u8));
}

#[test]
fn test_zero_capacity_arena_is_rejected() {
    assert!(matches!(Arena::new(0), Err(Error::InvalidSize(0))));
}

#[test]
#[should_panic(expected = "power of two")]
fn test_non_power_of_two_alignment_panics() {
    let arena = Arena::new(128).unwrap();
    let _ = arena.alloc_aligned(8, 12);
}

#[test]
fn test_typed_regions_are_independent() {
    let arena = Arena::new(256).unwrap();
    let number = arena.alloc_value(41u64).unwrap();
    let text = arena.alloc_str("hello").unwrap();
    let bytes = arena.alloc_slice_copy(&[1u8, 2, 3]).unwrap();

    *number += 1;
    text.make_ascii_uppercase();
    bytes[0] = 9;

    assert_eq!(*number, 42);
    assert_eq!(text, "HELLO");
    assert_eq!(bytes, &[9, 2, 3]);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_regions_never_overlap(sizes in prop_vec(0usize..300, 1..64)) {
        let arena = Arena::new(4096).unwrap();
        let mut regions: Vec<(usize, usize)> = Vec::new();

        for size in sizes {
            let before = arena.used();
            match arena.alloc(size) {
                Some(ptr) => {
                    let start = ptr.as_ptr() as usize;
                    prop_assert_eq!(start % ARENA_ALIGN, 0);
                    prop_assert!(arena.contains(ptr.as_ptr()));
                    prop_assert!(arena.used() > before);
                    prop_assert!(arena.used() <= arena.capacity());
                    let end = start + size;
                    for &(s, e) in &regions {
                        prop_assert!(end <= s || start >= e);
                    }
                    regions.push((start, end));
                }
                None => {
                    prop_assert_eq!(arena.used(), before);
                }
            }
        }
    }

    #[test]
    fn prop_remaining_plus_used_is_capacity(sizes in prop_vec(1usize..128, 0..32)) {
        let mut arena = Arena::new(1024).unwrap();
        for size in &sizes {
            let _ = arena.alloc(*size);
            prop_assert_eq!(arena.used() + arena.remaining(), arena.capacity());
        }
        arena.reset();
        prop_assert_eq!(arena.remaining(), arena.capacity());
    }
}
