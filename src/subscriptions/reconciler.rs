//! Subscription set reconciliation.
//!
//! Pure functions that compute the minimal add/remove delta between the
//! topics currently subscribed and the latest desired list.

use std::collections::HashSet;

use super::Topic;

/// Minimal change that turns the current subscribed set into the desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// Desired topics not yet subscribed, in desired order.
    pub to_add: Vec<Topic>,
    /// Subscribed topics no longer desired, in current order.
    pub to_remove: Vec<Topic>,
}

impl Delta {
    /// Returns true if nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Applies the delta to `current`, keeping the relative order of retained
    /// topics and appending additions in desired order.
    pub fn apply(&self, current: &[Topic]) -> Vec<Topic> {
        let removed: HashSet<&str> = self.to_remove.iter().map(String::as_str).collect();
        let mut next: Vec<Topic> = current
            .iter()
            .filter(|t| !removed.contains(t.as_str()))
            .cloned()
            .collect();
        next.extend(self.to_add.iter().cloned());
        next
    }
}

/// Removes duplicates, keeping the first occurrence of each topic.
pub fn dedup(topics: &[Topic]) -> Vec<Topic> {
    let mut seen = HashSet::with_capacity(topics.len());
    topics
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}

/// Computes the delta between `current` and `desired`.
///
/// `desired` may contain duplicates; it is deduplicated first.
pub fn reconcile(current: &[Topic], desired: &[Topic]) -> Delta {
    let desired = dedup(desired);
    let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
    let desired_set: HashSet<&str> = desired.iter().map(String::as_str).collect();

    let to_add = desired
        .iter()
        .filter(|t| !current_set.contains(t.as_str()))
        .cloned()
        .collect();
    let to_remove = current
        .iter()
        .filter(|t| !desired_set.contains(t.as_str()))
        .cloned()
        .collect();

    Delta { to_add, to_remove }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn topics(ids: &[&str]) -> Vec<Topic> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reconcile_orders_additions_and_removals() {
        let current = topics(&["0x1", "0x2", "0x3"]);
        let desired = topics(&["0x4", "0x2", "0x5", "0x4"]);

        let delta = reconcile(&current, &desired);
        assert_eq!(delta.to_add, topics(&["0x4", "0x5"]));
        assert_eq!(delta.to_remove, topics(&["0x1", "0x3"]));
        assert_eq!(delta.apply(&current), topics(&["0x2", "0x4", "0x5"]));
    }

    #[test]
    fn test_reconcile_is_case_sensitive() {
        let delta = reconcile(&topics(&["0xAB"]), &topics(&["0xab"]));
        assert_eq!(delta.to_add, topics(&["0xab"]));
        assert_eq!(delta.to_remove, topics(&["0xAB"]));
    }

    #[test]
    fn test_reconcile_empty_inputs() {
        assert!(reconcile(&[], &[]).is_empty());
        let delta = reconcile(&topics(&["a"]), &[]);
        assert_eq!(delta.to_remove, topics(&["a"]));
        assert!(delta.to_add.is_empty());
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        assert_eq!(dedup(&topics(&["b", "a", "b", "c", "a"])), topics(&["b", "a", "c"]));
    }

    fn topic_list() -> impl Strategy<Value = Vec<Topic>> {
        prop::collection::vec("0x[0-9a-f]{1,2}", 0..24)
    }

    proptest! {
        #[test]
        fn prop_apply_yields_deduplicated_desired(current in topic_list(), desired in topic_list()) {
            let current = dedup(&current);
            let delta = reconcile(&current, &desired);
            let applied: HashSet<Topic> = delta.apply(&current).into_iter().collect();
            let expected: HashSet<Topic> = dedup(&desired).into_iter().collect();
            prop_assert_eq!(applied, expected);
        }

        #[test]
        fn prop_apply_preserves_retained_order(current in topic_list(), desired in topic_list()) {
            let current = dedup(&current);
            let delta = reconcile(&current, &desired);
            let applied = delta.apply(&current);
            let retained = applied.len() - delta.to_add.len();
            let expected: Vec<Topic> = current
                .iter()
                .filter(|t| !delta.to_remove.contains(t))
                .cloned()
                .collect();
            prop_assert_eq!(&applied[..retained], &expected[..]);
            prop_assert_eq!(&applied[retained..], &delta.to_add[..]);
        }

        #[test]
        fn prop_reconcile_with_self_is_empty(current in topic_list()) {
            let current = dedup(&current);
            prop_assert!(reconcile(&current, &current).is_empty());
        }

        #[test]
        fn prop_reconcile_deduplicated_desired_is_empty(desired in topic_list()) {
            prop_assert!(reconcile(&dedup(&desired), &desired).is_empty());
        }
    }
}
