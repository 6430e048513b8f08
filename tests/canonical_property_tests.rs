//! Property-based tests for spec canonicalization and content hashing
//!
//! The content hash is only worth anything if formatting noise never moves it and
//! real edits always do. These properties pin both halves across generated inputs,
//! including non-ASCII keys and control characters in values.

use proptest::prelude::*;
use statement_lifecycle::{
    canonical::{CanonicalSpec, SpecEntry, canonicalize},
    content,
    document::{NewDocument, NewItem},
    types::Fixed2,
};
use std::collections::BTreeMap;

/// Strategy to generate a spec key drawn from ASCII and Hangul
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z가-힣][a-zA-Z0-9가-힣_-]{0,7}"
}

/// Strategy to generate any string of up to 8 chars, control characters included
fn raw_value_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 0..8).prop_map(String::from_iter)
}

/// Strategy to generate surrounding whitespace
fn padding_strategy() -> impl Strategy<Value = String> {
    "[ \t\n]{0,3}"
}

/// Strategy to generate entries with unique keys
fn unique_entries_strategy() -> impl Strategy<Value = Vec<SpecEntry>> {
    prop::collection::btree_map(key_strategy(), raw_value_strategy(), 0..8).prop_map(|map| {
        map.into_iter()
            .map(|(key, value)| SpecEntry::new(key, value))
            .collect()
    })
}

/// Strategy to generate entries where keys may repeat
fn entries_strategy() -> impl Strategy<Value = Vec<SpecEntry>> {
    prop::collection::vec(
        (prop::sample::select(vec!["a", "b", "두께", "재질"]), raw_value_strategy()),
        0..10,
    )
    .prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(key, value)| SpecEntry::new(key, value))
            .collect()
    })
}

fn amount_strategy() -> impl Strategy<Value = Fixed2> {
    (0i64..10_000_000).prop_map(Fixed2::from_hundredths)
}

/// Strategy to generate one line item as plain parts
fn item_strategy() -> impl Strategy<Value = (String, Option<String>, Fixed2, Fixed2, Vec<SpecEntry>)> {
    (
        "[a-z가-힣]{1,8}",
        prop::option::of("[a-z0-9 ]{1,6}"),
        amount_strategy(),
        amount_strategy(),
        unique_entries_strategy(),
    )
}

fn new_item(
    (name, option, quantity, unit_price, specs): &(String, Option<String>, Fixed2, Fixed2, Vec<SpecEntry>),
) -> NewItem {
    let item = NewItem::new(name, *quantity, *unit_price).set_specs(specs.clone());
    match option {
        Some(option) => item.set_option(option),
        None => item,
    }
}

fn hash_of(items: &[NewItem]) -> String {
    let draft = items.iter().cloned().fold(
        NewDocument::new()
            .set_from_company("company_acme")
            .set_to_company("company_globex"),
        NewDocument::add_item,
    );
    draft
        .validate_and_finalise("doc_prop".to_string(), "user_alice")
        .unwrap()
        .0
        .content_hash()
        .to_string()
}

// PROPERTY TESTS
proptest! {
    /// Property: canonicalizing twice is the same as canonicalizing once
    #[test]
    fn prop_canonicalize_is_idempotent(entries in entries_strategy()) {
        let once = canonicalize(&entries);
        let twice = canonicalize(&once.entries());

        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.to_json(), twice.to_json());
    }

    /// Property: with unique keys, input order never matters
    #[test]
    fn prop_order_independent_for_unique_keys(
        shuffled in unique_entries_strategy().prop_flat_map(|entries| {
            (Just(entries.clone()), Just(entries).prop_shuffle())
        })
    ) {
        let (entries, permuted) = shuffled;

        prop_assert_eq!(canonicalize(&entries).to_json(), canonicalize(&permuted).to_json());
    }

    /// Property: no key or value in the canonical form is empty or padded
    #[test]
    fn prop_no_empty_or_padded_entries(entries in entries_strategy()) {
        let spec = canonicalize(&entries);

        for (key, value) in spec.iter() {
            prop_assert!(!key.is_empty());
            prop_assert!(!value.is_empty());
            prop_assert_eq!(key, key.trim());
            prop_assert_eq!(value, value.trim());
        }
    }

    /// Property: for a repeated key the last non-empty value wins
    #[test]
    fn prop_last_non_empty_duplicate_wins(entries in entries_strategy()) {
        let spec = canonicalize(&entries);

        let mut expected = BTreeMap::new();
        for entry in &entries {
            let value = entry.value.trim();
            if !value.is_empty() {
                expected.insert(entry.key.trim().to_string(), value.to_string());
            }
        }

        prop_assert_eq!(spec.len(), expected.len());
        for (key, value) in &expected {
            prop_assert_eq!(spec.get(key), Some(value.as_str()));
        }
    }

    /// Property: the pinned encoding is valid JSON that reads back to the same map
    ///
    /// Any standard JSON parser must agree with the hand-written escaping, control
    /// characters and non-ASCII included.
    #[test]
    fn prop_encoding_is_standard_json(entries in unique_entries_strategy()) {
        let spec = canonicalize(&entries);
        let json = spec.to_json();

        let parsed: BTreeMap<String, String> = serde_json::from_str(&json).unwrap();
        let expected: BTreeMap<String, String> = spec
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        prop_assert_eq!(parsed, expected);
        prop_assert_eq!(CanonicalSpec::from_json(&json).unwrap(), spec);
    }

    /// Property: padding keys and values with whitespace never changes the result
    #[test]
    fn prop_padding_is_invisible(
        entries in unique_entries_strategy(),
        pad_left in padding_strategy(),
        pad_right in padding_strategy(),
    ) {
        let padded: Vec<SpecEntry> = entries
            .iter()
            .map(|e| SpecEntry::new(
                format!("{}{}{}", pad_left, e.key, pad_right),
                format!("{}{}{}", pad_right, e.value, pad_left),
            ))
            .collect();

        prop_assert_eq!(canonicalize(&entries).to_json(), canonicalize(&padded).to_json());
    }
}

#[cfg(test)]
mod content_hash_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        /// Property: the content hash does not depend on item order
        ///
        /// Item ids are assigned by position, so this also checks that ids stay out
        /// of the hashed bytes.
        #[test]
        fn prop_hash_ignores_item_order(
            shuffled in prop::collection::vec(item_strategy(), 1..6).prop_flat_map(|items| {
                (Just(items.clone()), Just(items).prop_shuffle())
            })
        ) {
            let (items, permuted) = shuffled;
            let original: Vec<NewItem> = items.iter().map(new_item).collect();
            let permuted: Vec<NewItem> = permuted.iter().map(new_item).collect();

            prop_assert_eq!(hash_of(&original), hash_of(&permuted));
        }

        /// Property: any content edit to one item changes the hash
        ///
        /// Covers quantity, unit price, item name, option text and adding a spec
        /// attribute. Item order and ids are left alone so only content moves.
        #[test]
        fn prop_content_edit_changes_hash(
            items in prop::collection::vec(item_strategy(), 1..6),
            target in any::<prop::sample::Index>(),
            field in 0u8..5,
            delta in 1i64..1_000,
        ) {
            let original: Vec<NewItem> = items.iter().map(new_item).collect();

            let mut edited_parts = items.clone();
            let index = target.index(edited_parts.len());
            let part = &mut edited_parts[index];
            match field {
                0 => part.2 = Fixed2::from_hundredths(part.2.hundredths() + delta),
                1 => part.3 = Fixed2::from_hundredths(part.3.hundredths() + delta),
                2 => part.0.push('x'),
                3 => part.1 = Some(format!("{}x", part.1.as_deref().unwrap_or(""))),
                // keys from key_strategy never contain spaces
                _ => part.4.push(SpecEntry::new("extra key", "value")),
            }
            let edited: Vec<NewItem> = edited_parts.iter().map(new_item).collect();

            prop_assert_ne!(hash_of(&original), hash_of(&edited));
        }

        /// Property: whitespace-only edits to spec values leave the hash alone
        #[test]
        fn prop_spec_whitespace_keeps_hash(
            items in prop::collection::vec(item_strategy(), 1..6),
            pad in "[ \t]{1,3}",
        ) {
            let original: Vec<NewItem> = items.iter().map(new_item).collect();

            let padded_parts: Vec<_> = items
                .iter()
                .cloned()
                .map(|mut part| {
                    for entry in &mut part.4 {
                        entry.value = format!("{}{}{}", pad, entry.value, pad);
                    }
                    part
                })
                .collect();
            let padded: Vec<NewItem> = padded_parts.iter().map(new_item).collect();

            prop_assert_eq!(hash_of(&original), hash_of(&padded));
        }

        /// Property: the hash equals the one recomputed from finalised items
        #[test]
        fn prop_stored_hash_verifies(items in prop::collection::vec(item_strategy(), 1..6)) {
            let draft = items.iter().map(new_item).fold(
                NewDocument::new()
                    .set_from_company("company_acme")
                    .set_to_company("company_globex"),
                NewDocument::add_item,
            );
            let (document, finalised) = draft
                .validate_and_finalise("doc_prop".to_string(), "user_alice")
                .unwrap();

            prop_assert!(content::verify(document.content_hash(), &finalised).is_match());
        }
    }
}
