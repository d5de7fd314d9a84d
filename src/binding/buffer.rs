use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

/// One captured telemetry record: a timestamp plus the values read for each
/// configured path. Paths missing from the payload are simply absent.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,
    pub fields: BTreeMap<String, Value>,
}

impl Snapshot {
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.fields.get(path)
    }
}

/// Fixed-capacity FIFO buffer of snapshots.
///
/// The only backpressure mechanism in the link: however fast a device
/// publishes, a binding never holds more than `capacity` records.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotBuffer {
    capacity: usize,
    items: VecDeque<Snapshot>,
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        // a zero-capacity buffer would silently swallow everything
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends a snapshot, evicting the oldest record once full.
    pub fn push(&mut self, snapshot: Snapshot) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(snapshot);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-first iteration.
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.items.iter()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.items.back()
    }

    pub fn to_vec(&self) -> Vec<Snapshot> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn snap(n: i64) -> Snapshot {
        Snapshot {
            captured_at: Utc::now(),
            fields: BTreeMap::from([("n".to_string(), json!(n))]),
        }
    }

    #[test]
    fn holds_records_in_insertion_order() {
        let mut buffer = SnapshotBuffer::new(3);
        for n in 0..3 {
            buffer.push(snap(n));
        }
        let order: Vec<_> = buffer.iter().map(|s| s.get("n").cloned()).collect();
        assert_eq!(order, vec![Some(json!(0)), Some(json!(1)), Some(json!(2))]);
    }

    proptest! {
        #[test]
        fn eviction_keeps_exactly_the_last_capacity_records(
            capacity in 1usize..16,
            overflow in 1usize..32,
        ) {
            let mut buffer = SnapshotBuffer::new(capacity);
            let total = capacity + overflow;
            for n in 0..total {
                buffer.push(snap(n as i64));
            }
            prop_assert_eq!(buffer.len(), capacity);
            let first_kept = (total - capacity) as i64;
            for (i, s) in buffer.iter().enumerate() {
                prop_assert_eq!(s.get("n"), Some(&json!(first_kept + i as i64)));
            }
        }
    }
}
