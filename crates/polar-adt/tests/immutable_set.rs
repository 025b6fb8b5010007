//! Integration tests for persistent sets.

use std::collections::HashSet;

use polar_adt::{ImmutableSetRef, SetFactory};
use polar_mem::BumpPtrAllocator;

fn build<'f>(factory: &'f SetFactory<'_, u32>, values: &[u32]) -> polar_adt::ImmutableSet<'f, u32> {
    let mut set = factory.empty_set();
    for &v in values {
        set = factory.add(&set, v);
    }
    set
}

#[test]
fn test_contains_and_order() {
    let factory = SetFactory::new();
    let set = build(&factory, &[40, 10, 30, 20, 50]);

    for v in [10, 20, 30, 40, 50] {
        assert!(set.contains(&v));
    }
    assert!(!set.contains(&25));
    assert_eq!(set.len(), 5);
    assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![10, 20, 30, 40, 50]);
}

#[test]
fn test_adding_existing_element() {
    let factory = SetFactory::new();
    let set = build(&factory, &[1, 2, 3]);
    let same = factory.add(&set, 2);
    assert_eq!(same, set);
    assert_eq!(same.root(), set.root());
    assert_eq!(same.len(), 3);
}

#[test]
fn test_versions_are_independent() {
    let factory = SetFactory::new();
    let mut versions = vec![factory.empty_set()];
    for v in 0..50u32 {
        let next = factory.add(versions.last().unwrap(), v);
        versions.push(next);
    }
    for (n, set) in versions.iter().enumerate() {
        assert_eq!(set.len(), n);
        assert!(set.validate_tree().is_ok());
    }
}

#[test]
fn test_remove_to_empty() {
    let factory = SetFactory::new();
    let mut set = build(&factory, &[3, 1, 4, 5, 9, 2, 6]);
    for v in [9, 1, 3, 6, 2, 5, 4] {
        set = factory.remove(&set, &v);
        assert!(!set.contains(&v));
    }
    assert!(set.is_empty());
    assert_eq!(set, factory.empty_set());
}

#[test]
#[allow(clippy::mutable_key_type)]
fn test_hash_matches_equality() {
    let f1 = SetFactory::new();
    let f2 = SetFactory::new();
    let a = build(&f1, &[1, 2, 3]);
    let b = build(&f2, &[3, 2, 1]);
    let c = build(&f2, &[1, 2]);

    let mut seen = HashSet::new();
    seen.insert(a.clone());
    assert!(seen.contains(&a));
    assert_eq!(a, b);
    assert_eq!(a.digest(), b.digest());
    assert!(!seen.iter().any(|s| *s == c));
}

#[test]
fn test_freed_slots_are_reused() {
    let allocator = BumpPtrAllocator::new();
    let factory = SetFactory::with_allocator(&allocator, false);
    let empty = factory.empty_set();

    let one = factory.add(&empty, 1u32);
    let first = one.root();
    drop(one);

    let again = factory.add(&empty, 2u32);
    assert_eq!(again.root(), first);
    assert_eq!(factory.tree_factory().node_count(), 1);
}

#[test]
fn test_set_ref_and_conversion() {
    let factory = SetFactory::new();
    let set = build(&factory, &[5, 6]);
    let as_ref = ImmutableSetRef::from(set.clone());
    let bigger = as_ref.add(7);

    assert!(bigger.contains(&7));
    assert!(!set.contains(&7));
    assert_eq!(bigger.as_immutable_set(false).len(), 3);
    assert_eq!(format!("{bigger:?}"), "{5, 6, 7}");
}

#[test]
fn test_string_elements() {
    let factory = SetFactory::new();
    let empty = factory.empty_set();
    let set = factory.add(&factory.add(&empty, String::from("pear")), String::from("apple"));
    assert_eq!(
        set.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["apple", "pear"]
    );
    assert!(set.contains(&"pear".to_string()));
}
