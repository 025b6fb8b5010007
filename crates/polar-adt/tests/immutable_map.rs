//! Integration tests for persistent maps.

use polar_adt::{FactoryConfig, ImmutableMapRef, MapFactory};
use polar_mem::{AllocError, BumpPtrAllocator, SlabConfig};

#[test]
fn test_empty_map() {
    let factory = MapFactory::<i32, i32>::new();
    let map = factory.empty_map();

    assert!(map.is_empty());
    assert_eq!(map.height(), 0);
    assert_eq!(map.iter().next(), None);
    assert_eq!(map.max_element(), None);
    assert_eq!(map.lookup(&3), None);
}

#[test]
fn test_ascending_inserts() {
    let factory = MapFactory::new();
    let empty = factory.empty_map();
    let m1 = factory.add(&empty, 3, 10);
    let m2 = factory.add(&m1, 4, 11);
    let m3 = factory.add(&m2, 5, 12);

    // Heights may differ by two, so three ascending keys form a chain.
    assert_eq!(m3.height(), 3);
    assert_eq!(m3.lookup(&3), Some(&10));
    assert_eq!(m3.lookup(&4), Some(&11));
    assert_eq!(m3.lookup(&5), Some(&12));
    assert_eq!(m3.max_element().map(|(key, _)| *key), Some(5));

    // Earlier versions are untouched.
    assert_eq!(m1.len(), 1);
    assert_eq!(m2.lookup(&5), None);
    assert!(m3.validate_tree().is_ok());
}

#[test]
fn test_fourth_insert_rebalances() {
    let factory = MapFactory::new();
    let mut map = factory.empty_map();
    for k in 1..=4 {
        map = factory.add(&map, k, k * 10);
    }
    assert_eq!(map.height(), 3);
    assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
}

#[test]
fn test_remove() {
    let factory = MapFactory::new();
    let mut map = factory.empty_map();
    for k in 0..32u32 {
        map = factory.add(&map, k, format!("v{k}"));
    }
    let without = factory.remove(&map, &17);

    assert_eq!(without.len(), 31);
    assert_eq!(without.lookup(&17), None);
    assert_eq!(map.lookup(&17).map(String::as_str), Some("v17"));
    assert_eq!(without.lookup(&18).map(String::as_str), Some("v18"));
    assert!(without.validate_tree().is_ok());

    let unchanged = factory.remove(&without, &17);
    assert_eq!(unchanged, without);
}

#[test]
fn test_data_takes_part_in_equality() {
    let factory = MapFactory::new();
    let empty = factory.empty_map();
    let a = factory.add(&empty, 1, 'a');
    let b = factory.add(&empty, 1, 'b');
    let a2 = factory.add(&b, 1, 'a');

    assert_ne!(a, b);
    assert_eq!(a, a2);
    assert_eq!(a.root(), a2.root());
}

#[test]
fn test_equality_across_factories() {
    let f1 = MapFactory::new();
    let f2 = MapFactory::new();
    let mut m1 = f1.empty_map();
    let mut m2 = f2.empty_map();
    for k in 0..20 {
        m1 = f1.add(&m1, k, k);
        m2 = f2.add(&m2, 19 - k, 19 - k);
    }
    assert_eq!(m1, m2);
    assert_eq!(m1.digest(), m2.digest());

    let m3 = f2.add(&m2, 5, 0);
    assert_ne!(m1, m3);
}

#[test]
fn test_map_ref() {
    let factory = MapFactory::<u32, u32>::new();
    let base = ImmutableMapRef::empty(factory.tree_factory());
    let map = base.add(7, 70).add(3, 30).add(9, 90);

    assert!(base.is_empty());
    assert_eq!(map.lookup(&3), Some(&30));
    assert_eq!(map.max_element(), Some((&9, &90)));
    assert_eq!(
        map.iter().collect::<Vec<_>>(),
        vec![(&3, &30), (&7, &70), (&9, &90)]
    );

    let plain = map.as_immutable_map();
    let again = factory.add(&factory.empty_map(), 3, 30);
    let again = factory.add(&again, 9, 90);
    let again = factory.add(&again, 7, 70);
    assert_eq!(plain.root(), again.root());
}

#[test]
fn test_factories_share_allocator() {
    let allocator = BumpPtrAllocator::new();
    let ints = MapFactory::<u32, u32>::with_allocator(&allocator, true);
    let names = MapFactory::<u32, &str>::with_allocator(&allocator, false);

    let a = ints.add(&ints.empty_map(), 1, 1);
    let b = names.add(&names.empty_map(), 1, "one");
    assert_eq!(a.lookup(&1), Some(&1));
    assert_eq!(b.lookup(&1), Some(&"one"));
    assert!(ints.tree_factory().shares_allocator());
    assert!(allocator.bytes_allocated() > 0);
}

#[test]
fn test_with_config() {
    let config = FactoryConfig::new()
        .with_canonicalize(false)
        .with_slab(SlabConfig::new().with_slab_size(1024));
    let factory = MapFactory::<u32, u32>::with_config(config).unwrap();
    assert!(!factory.canonicalizes());
    assert_eq!(factory.tree_factory().allocator().config().slab_size, 1024);

    let bad = FactoryConfig::new().with_slab(SlabConfig::new().with_growth_delay(0));
    assert!(matches!(
        MapFactory::<u32, u32>::with_config(bad),
        Err(AllocError::InvalidConfig { .. })
    ));
}

#[test]
fn test_values_are_dropped_with_factory() {
    use std::rc::Rc;

    let marker = Rc::new(());
    {
        let factory = MapFactory::new();
        let mut map = factory.empty_map();
        for k in 0..10u32 {
            map = factory.add(&map, k, Rc::clone(&marker));
        }
        assert!(Rc::strong_count(&marker) > 10);
    }
    assert_eq!(Rc::strong_count(&marker), 1);
}
