// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for the slot bitmap and topology parsing.
//!
//! Uses proptest to generate random inputs and verify invariants.

use proptest::prelude::*;

use valkey_slot_admin::client::TopologySnapshot;
use valkey_slot_admin::slots::{SlotSet, TOTAL_SLOTS};

/// Strategy for a valid slot number.
fn any_slot() -> impl Strategy<Value = u16> {
    0..TOTAL_SLOTS
}

/// Strategy for a random set of distinct slots.
fn slot_vec() -> impl Strategy<Value = Vec<u16>> {
    proptest::collection::btree_set(any_slot(), 0..200)
        .prop_map(|set| set.into_iter().collect())
}

fn slot_set_from(slots: &[u16]) -> SlotSet {
    let mut set = SlotSet::new();
    for &slot in slots {
        set.set(slot).unwrap();
    }
    set
}

proptest! {
    /// Rendering a set as ranges and parsing them back is lossless.
    #[test]
    fn test_range_string_round_trip(slots in slot_vec()) {
        let set = slot_set_from(&slots);
        let rendered = set.to_range_string();

        let parsed = if rendered.is_empty() {
            SlotSet::new()
        } else {
            SlotSet::from_range_tokens(&rendered).unwrap()
        };

        prop_assert!(set.diff(&parsed).is_equal());
        prop_assert_eq!(parsed.count(), slots.len());
    }

    /// A set always equals itself under diff.
    #[test]
    fn test_diff_reflexive(slots in slot_vec()) {
        let set = slot_set_from(&slots);
        prop_assert!(set.diff(&set).is_equal());
    }

    /// Diff is symmetric with missing and extra swapped.
    #[test]
    fn test_diff_antisymmetric(a in slot_vec(), b in slot_vec()) {
        let left = slot_set_from(&a);
        let right = slot_set_from(&b);

        let forward = left.diff(&right);
        let backward = right.diff(&left);

        prop_assert!(forward.missing.diff(&backward.extra).is_equal());
        prop_assert!(forward.extra.diff(&backward.missing).is_equal());
    }

    /// Count tracks the number of set slots exactly.
    #[test]
    fn test_count_matches_iter(slots in slot_vec()) {
        let set = slot_set_from(&slots);
        prop_assert_eq!(set.count(), slots.len());
        prop_assert_eq!(set.iter().count(), slots.len());
    }

    /// Setting a slot twice always fails, and leaves the set unchanged.
    #[test]
    fn test_double_set_rejected(slot in any_slot()) {
        let mut set = SlotSet::new();
        set.set(slot).unwrap();
        prop_assert!(set.set(slot).is_err());
        prop_assert!(set.is_set(slot));
        prop_assert_eq!(set.count(), 1);
    }

    /// Unsetting an absent slot always fails.
    #[test]
    fn test_unset_absent_rejected(slot in any_slot()) {
        let mut set = SlotSet::new();
        prop_assert!(set.unset(slot).is_err());
        prop_assert!(set.is_empty());
    }

    /// A topology line with arbitrary owned slots parses back to the same
    /// slot set.
    #[test]
    fn test_topology_line_slot_round_trip(slots in slot_vec()) {
        let set = slot_set_from(&slots);
        let rendered = set.to_range_string();
        let line = format!(
            "aaa 10.0.0.1:6379@16379 master,myself - 0 0 5 connected {rendered}\n"
        );

        let snapshot = TopologySnapshot::parse(&line, "10.0.0.1:6379").unwrap();
        let node = snapshot.get_node("aaa").unwrap();
        prop_assert!(node.slots.diff(&set).is_equal());
    }
}
