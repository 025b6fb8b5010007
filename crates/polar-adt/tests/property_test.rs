//! Property tests checking persistent containers against `std` collections.

use std::collections::{BTreeMap, BTreeSet};

use polar_adt::{MapFactory, SetFactory};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add(u16),
    Remove(u16),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            3 => (0u16..200).prop_map(Op::Add),
            1 => (0u16..200).prop_map(Op::Remove),
        ],
        0..200,
    )
}

proptest! {
    #[test]
    fn set_matches_btree_set(ops in ops(), canonicalize in any::<bool>()) {
        let allocator = polar_mem::BumpPtrAllocator::new();
        let factory = SetFactory::with_allocator(&allocator, canonicalize);
        let mut set = factory.empty_set();
        let mut model = BTreeSet::new();

        for op in &ops {
            match *op {
                Op::Add(v) => {
                    set = factory.add(&set, v);
                    model.insert(v);
                }
                Op::Remove(v) => {
                    set = factory.remove(&set, &v);
                    model.remove(&v);
                }
            }
            prop_assert!(set.validate_tree().is_ok(), "invariants broken after {:?}", op);
        }

        prop_assert_eq!(set.len(), model.len());
        prop_assert!(set.iter().eq(model.iter()));
        for v in 0u16..200 {
            prop_assert_eq!(set.contains(&v), model.contains(&v));
        }
    }

    #[test]
    fn old_versions_survive_updates(values in proptest::collection::vec(0u32..1000, 1..100)) {
        let factory = SetFactory::new();
        let mut versions = vec![factory.empty_set()];
        for &v in &values {
            let next = factory.add(versions.last().unwrap(), v);
            versions.push(next);
        }
        for &v in &values {
            let last = versions.last().unwrap();
            let next = factory.remove(last, &v);
            versions.push(next);
        }

        let mut model = BTreeSet::new();
        for (set, &v) in versions[1..].iter().zip(&values) {
            model.insert(v);
            prop_assert!(set.iter().eq(model.iter()));
        }
        prop_assert!(versions.last().unwrap().is_empty());
    }

    #[test]
    fn insertion_order_does_not_matter(mut values in proptest::collection::vec(any::<i32>(), 0..64)) {
        let f1 = SetFactory::new();
        let f2 = SetFactory::new();
        let mut forward = f1.empty_set();
        for &v in &values {
            forward = f1.add(&forward, v);
        }
        values.reverse();
        let mut backward = f2.empty_set();
        let mut same_factory = f1.empty_set();
        for &v in &values {
            backward = f2.add(&backward, v);
            same_factory = f1.add(&same_factory, v);
        }

        prop_assert!(forward == backward);
        prop_assert_eq!(forward.digest(), backward.digest());
        // One canonicalizing factory hands out one root per content.
        prop_assert_eq!(forward.root(), same_factory.root());
    }

    #[test]
    fn map_lookup_matches_btree_map(
        entries in proptest::collection::vec((0u8..64, any::<u32>()), 0..128),
        removals in proptest::collection::vec(0u8..64, 0..32),
    ) {
        let factory = MapFactory::new();
        let mut map = factory.empty_map();
        let mut model = BTreeMap::new();
        for &(k, v) in &entries {
            map = factory.add(&map, k, v);
            model.insert(k, v);
        }
        for k in &removals {
            map = factory.remove(&map, k);
            model.remove(k);
        }

        prop_assert!(map.validate_tree().is_ok());
        for k in 0u8..64 {
            prop_assert_eq!(map.lookup(&k), model.get(&k));
        }
        prop_assert_eq!(map.max_element(), model.iter().next_back());
        prop_assert!(map.iter().eq(model.iter()));
    }
}
