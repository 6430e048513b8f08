//! Content fingerprint over canonicalized line items
use super::canonical::write_json_string;
use super::document::DocumentItem;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

/// Base64 encoded SHA-256 of the serialized content records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ContentHash {
    fn from(value: String) -> Self {
        ContentHash(value)
    }
}

impl<C> minicbor::Encode<C> for ContentHash {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for ContentHash {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(ContentHash(d.str()?.to_string()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashVerification {
    Matches,
    Mismatch {
        stored: ContentHash,
        recomputed: ContentHash,
    },
}

impl HashVerification {
    pub fn is_match(&self) -> bool {
        matches!(self, HashVerification::Matches)
    }
}

// one hashed line, already serialized so ties can break on the bytes themselves
struct ContentRecord<'a> {
    item_name: &'a str,
    option_text: Option<&'a str>,
    encoded: String,
}

impl<'a> ContentRecord<'a> {
    fn from_item(item: &'a DocumentItem) -> Self {
        let mut encoded = String::with_capacity(128 + item.spec_json.len());

        encoded.push_str("{\"item_name\":");
        write_json_string(&mut encoded, &item.item_name);
        encoded.push_str(",\"option_text\":");
        match item.option_text.as_deref() {
            Some(text) => write_json_string(&mut encoded, text),
            None => encoded.push_str("null"),
        }
        encoded.push_str(",\"quantity\":");
        write_json_string(&mut encoded, &item.quantity.to_string());
        encoded.push_str(",\"unit_price\":");
        write_json_string(&mut encoded, &item.unit_price.to_string());
        encoded.push_str(",\"line_amount\":");
        write_json_string(&mut encoded, &item.line_amount.to_string());
        // the stored canonical spec bytes, verbatim
        encoded.push_str(",\"spec\":");
        write_json_string(&mut encoded, &item.spec_json);
        encoded.push('}');

        Self {
            item_name: &item.item_name,
            option_text: item.option_text.as_deref(),
            encoded,
        }
    }

    fn order(&self, other: &Self) -> Ordering {
        self.item_name
            .cmp(other.item_name)
            .then_with(|| self.option_text.cmp(&other.option_text))
            .then_with(|| self.encoded.cmp(&other.encoded))
    }
}

/// The exact bytes that get hashed for a set of items.
pub fn serialize_items(items: &[DocumentItem]) -> String {
    let mut records: Vec<ContentRecord<'_>> = items.iter().map(ContentRecord::from_item).collect();
    records.sort_by(|a, b| a.order(b));

    let mut out = String::from("[");
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&record.encoded);
    }
    out.push(']');
    out
}

pub fn compute(items: &[DocumentItem]) -> ContentHash {
    let digest = Sha256::digest(serialize_items(items).as_bytes());
    ContentHash(STANDARD.encode(digest))
}

/// Recompute from the items as stored and compare. Never corrects anything.
pub fn verify(stored: &ContentHash, items: &[DocumentItem]) -> HashVerification {
    let recomputed = compute(items);

    if &recomputed == stored {
        HashVerification::Matches
    } else {
        HashVerification::Mismatch {
            stored: stored.clone(),
            recomputed,
        }
    }
}
