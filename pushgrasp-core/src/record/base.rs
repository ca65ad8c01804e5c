use crate::error::PushGraspError;
use chrono::prelude::{DateTime, Local};
use std::collections::{
    hash_map::{Iter, Keys},
    HashMap,
};

/// A value stored in a [`Record`].
#[derive(Debug, Clone)]
pub enum RecordValue {
    /// A single value, such as a loss.
    Scalar(f32),

    /// A timestamp.
    DateTime(DateTime<Local>),

    /// A row-major 2-dimensional array, such as a depth heightmap.
    Array2(Vec<f32>, [usize; 2]),

    /// A text value.
    String(String),
}

/// Named values produced at a training iteration.
#[derive(Debug, Default)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Creates a record containing a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(HashMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Creates a record from key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Keys in the record.
    pub fn keys(&self) -> Keys<String, RecordValue> {
        self.0.keys()
    }

    /// Inserts a key-value pair, replacing any previous value of the key.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Key-value pairs in the record.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Value of the key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merges two records. Values of `record` win on shared keys.
    pub fn merge(self, record: Record) -> Self {
        Record(self.0.into_iter().chain(record.0).collect())
    }

    /// Merges `record` into this one. Values of `record` win on shared keys.
    pub fn merge_inplace(&mut self, record: Record) {
        self.0.extend(record.0);
    }

    /// Scalar value of the key.
    pub fn get_scalar(&self, k: &str) -> Result<f32, PushGraspError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(PushGraspError::RecordValueType("Scalar".to_string())),
            None => Err(PushGraspError::RecordKey(k.to_string())),
        }
    }

    /// 2-dimensional array of the key with its shape.
    pub fn get_array2(&self, k: &str) -> Result<(Vec<f32>, [usize; 2]), PushGraspError> {
        match self.0.get(k) {
            Some(RecordValue::Array2(v, s)) => Ok((v.clone(), *s)),
            Some(_) => Err(PushGraspError::RecordValueType("Array2".to_string())),
            None => Err(PushGraspError::RecordKey(k.to_string())),
        }
    }

    /// String value of the key.
    pub fn get_string(&self, k: &str) -> Result<String, PushGraspError> {
        match self.0.get(k) {
            Some(RecordValue::String(s)) => Ok(s.clone()),
            Some(_) => Err(PushGraspError::RecordValueType("String".to_string())),
            None => Err(PushGraspError::RecordKey(k.to_string())),
        }
    }

    /// Returns `true` if the record holds no value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Record {
    type Item = (String, RecordValue);
    type IntoIter = std::collections::hash_map::IntoIter<String, RecordValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn merge_prefers_right_hand_values() {
        let a = Record::from_slice(&[
            ("loss", RecordValue::Scalar(1.0)),
            ("primitive", RecordValue::String("push".into())),
        ]);
        let b = Record::from_scalar("loss", 2.0);
        let merged = a.merge(b);
        assert_eq!(merged.get_scalar("loss").unwrap(), 2.0);
        assert_eq!(merged.get_string("primitive").unwrap(), "push");
    }

    #[test]
    fn typed_getters_report_errors() {
        let r = Record::from_scalar("loss", 1.0);
        assert!(matches!(
            r.get_string("loss"),
            Err(PushGraspError::RecordValueType(_))
        ));
        assert!(matches!(
            r.get_scalar("reward"),
            Err(PushGraspError::RecordKey(_))
        ));
    }
}
