//! Reusable field-mapping strategies shared by several tasks

use crate::types::{Cell, TrialRecord, TrialRow};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Resolve the mapping fields are copied from.
///
/// `None` means the payload itself. A named source must be an object; survey plugins
/// sometimes log it as a JSON-encoded string, which is decoded here.
pub(crate) fn source_map<'a>(
    record: &'a TrialRecord,
    source: Option<&str>,
) -> Option<Cow<'a, Map<String, Value>>> {
    let Some(key) = source else {
        return Some(Cow::Borrowed(record.payload()));
    };
    match record.field(key)? {
        Value::Object(map) => Some(Cow::Borrowed(map)),
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Object(map)) => Some(Cow::Owned(map)),
            _ => None,
        },
        _ => None,
    }
}

/// Output columns map 1:1 by name onto keys of a source mapping
#[derive(Debug, Clone, Copy)]
pub struct DirectCopy {
    pub source: Option<&'static str>,
    pub fields: &'static [&'static str],
}

impl DirectCopy {
    /// Copy every declared field; absent or null fields become `n/a`.
    pub fn apply(&self, record: &TrialRecord, row: &mut TrialRow) {
        let map = source_map(record, self.source);
        for field in self.fields {
            let value = map.as_ref().and_then(|m| m.get(*field));
            row.set(*field, Cell::from_optional(value));
        }
    }
}

/// Output columns map 1:1 onto source keys under different names
#[derive(Debug, Clone, Copy)]
pub struct RenamedCopy {
    pub source: Option<&'static str>,
    /// `(source key, output column)` pairs
    pub pairs: &'static [(&'static str, &'static str)],
}

impl RenamedCopy {
    /// Copy every pair; absent or null source fields become `n/a` so row width stays fixed.
    pub fn apply(&self, record: &TrialRecord, row: &mut TrialRow) {
        let map = source_map(record, self.source);
        for (from, to) in self.pairs {
            let value = map.as_ref().and_then(|m| m.get(*from));
            row.set(*to, Cell::from_optional(value));
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.pairs.iter().map(|(_, to)| *to)
    }
}
