//! Event parameters and the rules applied to them before an event is
//! accepted.
//!
//! Callers hand over arbitrary key/value pairs. Only string keys and string
//! values survive, at most [`MAX_PARAMETERS`] distinct keys are kept (the
//! first ones in input order), and keys or values longer than
//! [`MAX_PARAMETER_LENGTH`] characters are cut down to that length. None of
//! this ever fails: bad input shrinks, it is never rejected.

use log::debug;
use serde::ser::{Serialize, Serializer};
use serde::Deserialize;
use smallvec::SmallVec;

pub const MAX_PARAMETERS: usize = 10;
pub const MAX_PARAMETER_LENGTH: usize = 256;

/// A dynamically typed parameter key or value, as accepted from callers.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl ParamValue {
    fn into_string(self) -> Option<String> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

impl From<&String> for ParamValue {
    fn from(s: &String) -> Self {
        ParamValue::String(s.clone())
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Integer(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ParamValue::Null, Into::into)
    }
}

/// Sanitized, ordered string parameters of an event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parameters {
    entries: SmallVec<[(String, String); MAX_PARAMETERS]>,
}

impl Parameters {
    pub fn new() -> Parameters {
        Parameters::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copies the entries of `other` into `self`. Keys already present take
    /// the value from `other`; new keys are appended while room remains.
    pub fn merge(&mut self, other: &Parameters) {
        for (key, value) in other.iter() {
            if !self.insert(key.to_owned(), value.to_owned()) {
                debug!("parameter {:?} dropped while merging: limit reached", key);
            }
        }
    }

    /// Inserts an already length-checked entry. Returns `false` if the entry
    /// was dropped because the parameter limit has been reached.
    fn insert(&mut self, key: String, value: String) -> bool {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
            return true;
        }
        if self.entries.len() == MAX_PARAMETERS {
            return false;
        }
        self.entries.push((key, value));
        true
    }
}

impl Serialize for Parameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<K, V> FromIterator<(K, V)> for Parameters
where
    K: Into<ParamValue>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(raw: I) -> Self {
        sanitize(raw)
    }
}

/// Applies the parameter rules to `raw`.
pub fn sanitize<I, K, V>(raw: I) -> Parameters
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<ParamValue>,
    V: Into<ParamValue>,
{
    let mut parameters = Parameters::new();
    let mut non_string = 0usize;
    let mut overflow = 0usize;
    let mut truncated = 0usize;

    for (key, value) in raw {
        let (key, value) = match (
            ParamValue::into_string(key.into()),
            ParamValue::into_string(value.into()),
        ) {
            (Some(key), Some(value)) => (key, value),
            _ => {
                non_string += 1;
                continue;
            }
        };

        let (key, key_cut) = truncate(key);
        let (value, value_cut) = truncate(value);
        truncated += key_cut as usize + value_cut as usize;

        if !parameters.insert(key, value) {
            overflow += 1;
        }
    }

    if non_string + overflow + truncated > 0 {
        debug!(
            "sanitized parameters: {} non-string entries dropped, {} over the limit of {} dropped, {} strings truncated",
            non_string, overflow, MAX_PARAMETERS, truncated
        );
    }

    parameters
}

fn truncate(mut s: String) -> (String, bool) {
    match s.char_indices().nth(MAX_PARAMETER_LENGTH) {
        Some((byte_index, _)) => {
            s.truncate(byte_index);
            (s, true)
        }
        None => (s, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_ten_entries_in_order() {
        let raw: Vec<(String, String)> = (0..15)
            .map(|i| (format!("key{}", i), format!("value{}", i)))
            .collect();
        let parameters = sanitize(raw);

        assert_eq!(parameters.len(), MAX_PARAMETERS);
        let keys: Vec<&str> = parameters.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            ["key0", "key1", "key2", "key3", "key4", "key5", "key6", "key7", "key8", "key9"]
        );
        assert_eq!(parameters.get("key10"), None);
    }

    #[test]
    fn non_string_entries_do_not_take_a_slot() {
        let mut raw: Vec<(ParamValue, ParamValue)> = vec![
            (ParamValue::from(1i64), ParamValue::from("numeric key")),
            (ParamValue::from("flag"), ParamValue::from(true)),
            (ParamValue::from("nothing"), ParamValue::Null),
            (ParamValue::from("ratio"), ParamValue::from(0.5f64)),
        ];
        raw.extend((0..10).map(|i| (ParamValue::from(format!("k{}", i)), ParamValue::from("v"))));

        let parameters = sanitize(raw);
        assert_eq!(parameters.len(), 10);
        assert_eq!(parameters.get("flag"), None);
        assert_eq!(parameters.get("k9"), Some("v"));
    }

    #[test]
    fn fewer_than_ten_valid_strings_survive() {
        let parameters = sanitize(vec![
            (ParamValue::from("a"), ParamValue::from("1")),
            (ParamValue::from("b"), ParamValue::from(2i64)),
        ]);
        assert_eq!(parameters.len(), 1);
        assert_eq!(parameters.get("a"), Some("1"));
    }

    #[test]
    fn long_keys_and_values_are_truncated() {
        let long_key = "k".repeat(300);
        let long_value = "é".repeat(257);
        let parameters = sanitize([(long_key.as_str(), long_value.as_str())]);

        let (key, value) = parameters.iter().next().unwrap();
        assert_eq!(key, &long_key[..256]);
        assert_eq!(value.chars().count(), 256);
        assert!(long_value.starts_with(value));
    }

    #[test]
    fn exact_length_is_untouched() {
        let s = "x".repeat(MAX_PARAMETER_LENGTH);
        let parameters = sanitize([("k", s.as_str())]);
        assert_eq!(parameters.get("k"), Some(s.as_str()));
    }

    #[test]
    fn repeated_key_overwrites_in_place() {
        let parameters = sanitize([("a", "1"), ("b", "2"), ("a", "3")]);
        let entries: Vec<(&str, &str)> = parameters.iter().collect();
        assert_eq!(entries, [("a", "3"), ("b", "2")]);
    }

    #[test]
    fn keys_colliding_after_truncation_share_a_slot() {
        let first = format!("{}1", "k".repeat(256));
        let second = format!("{}2", "k".repeat(256));
        let parameters = sanitize([(first, "one".to_owned()), (second, "two".to_owned())]);
        assert_eq!(parameters.len(), 1);
        assert_eq!(parameters.get(&"k".repeat(256)), Some("two"));
    }

    #[test]
    fn merge_overrides_and_respects_limit() {
        let mut base: Parameters = (0..9).map(|i| (format!("k{}", i), "base")).collect();
        let update: Parameters = [("k0", "end"), ("extra1", "x"), ("extra2", "y")]
            .into_iter()
            .collect();
        base.merge(&update);

        assert_eq!(base.len(), MAX_PARAMETERS);
        assert_eq!(base.get("k0"), Some("end"));
        assert_eq!(base.get("extra1"), Some("x"));
        assert_eq!(base.get("extra2"), None);
    }

    #[test]
    fn serializes_as_ordered_map() {
        let parameters = sanitize([("z", "1"), ("a", "2")]);
        let json = serde_json::to_string(&parameters).unwrap();
        assert_eq!(json, r#"{"z":"1","a":"2"}"#);
    }

    #[test]
    fn param_values_deserialize_untagged() {
        let values: Vec<ParamValue> = serde_json::from_str(r#"["s", 3, 1.5, true, null]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::from("s"),
                ParamValue::Integer(3),
                ParamValue::Float(1.5),
                ParamValue::Bool(true),
                ParamValue::Null,
            ]
        );
    }
}
