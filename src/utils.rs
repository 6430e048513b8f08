//! Identifier generation
use super::error::IdentifierError;
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique, time ordered id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, IdentifierError> {
    let parsed = bech32::Hrp::parse(hrp).map_err(|e| IdentifierError::InvalidPrefix {
        prefix: hrp.to_string(),
        detail: e.to_string(),
    })?;
    let encode = bech32::encode::<Bech32m>(parsed, uuid7().as_bytes())
        .map_err(|e| IdentifierError::Encode(e.to_string()))?;
    Ok(encode)
}

/// Item ids hang off their document id with a 1-based, zero padded index.
pub fn item_id(document_id: &str, index: usize) -> String {
    format!("{}-{:03}", document_id, index + 1)
}
