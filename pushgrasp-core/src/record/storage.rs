use super::{Record, RecordValue};
use log::warn;
use std::collections::HashSet;
use xxhash_rust::xxh3::Xxh3Builder;

/// Stores records and aggregates them per key.
///
/// Scalars stored more than once are summarized as `<key>` (mean), `<key>_min`,
/// `<key>_max` and `<key>_median`. Any other value keeps its most recent occurrence.
#[derive(Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

fn median(mut vs: Vec<f32>) -> f32 {
    vs.sort_by(|x, y| x.total_cmp(y));
    vs[vs.len() / 2]
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn keys(&self) -> HashSet<String, Xxh3Builder> {
        let mut keys = HashSet::<String, Xxh3Builder>::default();
        for record in self.data.iter() {
            keys.extend(record.keys().cloned());
        }
        keys
    }

    fn latest(&self, key: &str) -> Option<&RecordValue> {
        self.data.iter().rev().find_map(|r| r.get(key))
    }

    fn scalar(&self, key: &str, record: &mut Record) {
        let vs: Vec<f32> = self
            .data
            .iter()
            .filter_map(|r| match r.get(key) {
                Some(RecordValue::Scalar(v)) => Some(*v),
                _ => None,
            })
            .collect();

        match vs.len() {
            0 => {}
            1 => record.insert(key, RecordValue::Scalar(vs[0])),
            n => {
                let mean = vs.iter().sum::<f32>() / n as f32;
                let min = vs.iter().copied().fold(f32::INFINITY, f32::min);
                let max = vs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                record.insert(key, RecordValue::Scalar(mean));
                record.insert(format!("{}_min", key), RecordValue::Scalar(min));
                record.insert(format!("{}_max", key), RecordValue::Scalar(max));
                record.insert(format!("{}_median", key), RecordValue::Scalar(median(vs)));
            }
        }
    }

    /// Aggregates the stored records and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let mut record = Record::empty();

        for key in self.keys().iter() {
            match self.latest(key) {
                Some(RecordValue::Scalar(_)) => self.scalar(key, &mut record),
                Some(value) => record.insert(key.clone(), value.clone()),
                None => warn!("No value for key {} in the record storage", key),
            }
        }

        self.data.clear();
        record
    }
}
