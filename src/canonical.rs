//! Canonical form of free-form spec attributes and the pinned JSON encoding used for hashing
//!
//! Encoding rule: compact, keys in ordinal order, strings escape only `"`, `\` and
//! U+0000..=U+001F (`\b \f \n \r \t` short forms, otherwise `\u00xx` lowercase).
//! Everything else, non-ASCII included, is written as raw UTF-8. The rule is written
//! out here rather than taken from a serializer default so stored hashes never move.
use super::error::ValidationError;
use std::collections::BTreeMap;
use std::fmt::Write;

/// A single `(key, value)` attribute, both opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecEntry {
    pub key: String,
    pub value: String,
}

impl SpecEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Trimmed, non-empty attributes sorted by ordinal key order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CanonicalSpec(BTreeMap<String, String>);

impl CanonicalSpec {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Back to plain entries, in canonical order.
    pub fn entries(&self) -> Vec<SpecEntry> {
        self.iter().map(|(k, v)| SpecEntry::new(k, v)).collect()
    }

    pub fn to_json(&self) -> String {
        let mut out = String::with_capacity(2 + self.0.len() * 16);
        out.push('{');
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_json_string(&mut out, key);
            out.push(':');
            write_json_string(&mut out, value);
        }
        out.push('}');
        out
    }

    /// Parse a stored spec object and bring it back to canonical form.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        let map: BTreeMap<String, String> = serde_json::from_str(json)
            .map_err(|e| ValidationError::InvalidSpecJson(e.to_string()))?;

        Ok(canonicalize_pairs(map))
    }
}

/// Trim, drop empties, last write wins, ordinal sort.
pub fn canonicalize(entries: &[SpecEntry]) -> CanonicalSpec {
    canonicalize_pairs(entries.iter().map(|e| (e.key.as_str(), e.value.as_str())))
}

pub fn canonicalize_pairs<I, K, V>(pairs: I) -> CanonicalSpec
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut cleaned = BTreeMap::new();

    for (key, value) in pairs {
        let key = key.as_ref().trim();
        let value = value.as_ref().trim();

        // an empty value means the attribute does not apply
        if key.is_empty() || value.is_empty() {
            continue;
        }
        cleaned.insert(key.to_string(), value.to_string());
    }

    CanonicalSpec(cleaned)
}

pub(crate) fn write_json_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
