//! Document aggregate, its line items and the builders used to create drafts
use super::canonical::{SpecEntry, canonicalize};
use super::content::{self, ContentHash};
use super::error::{LifecycleError, ValidationError};
use super::state::DocumentState;
use super::types::{Fixed2, TimeStamp};
use super::utils;
use chrono::Utc;

// Immutable snapshot. Only the transition engine produces a changed copy.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Document {
    #[n(0)]
    pub(crate) document_id: String,
    #[n(1)]
    pub(crate) parent_document_id: Option<String>, // previous version in the chain
    #[n(2)]
    pub(crate) version_number: u32,
    #[n(3)]
    pub(crate) from_company_id: String,
    #[n(4)]
    pub(crate) to_company_id: String,
    #[n(5)]
    pub(crate) state: DocumentState,
    #[n(6)]
    pub(crate) state_version: u64, // compare-and-swap token
    #[n(7)]
    pub(crate) content_hash: ContentHash,
    #[n(8)]
    pub(crate) total_amount: Fixed2,
    #[n(9)]
    pub(crate) created_by: String,
    #[n(10)]
    pub(crate) created_at: TimeStamp<Utc>,
    #[n(11)]
    pub(crate) sent_at: Option<TimeStamp<Utc>>,
    #[n(12)]
    pub(crate) confirmed_at: Option<TimeStamp<Utc>>,
}

impl Document {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }
    pub fn parent_document_id(&self) -> Option<&str> {
        self.parent_document_id.as_deref()
    }
    pub fn version_number(&self) -> u32 {
        self.version_number
    }
    pub fn from_company_id(&self) -> &str {
        &self.from_company_id
    }
    pub fn to_company_id(&self) -> &str {
        &self.to_company_id
    }
    pub fn state(&self) -> DocumentState {
        self.state
    }
    pub fn state_version(&self) -> u64 {
        self.state_version
    }
    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }
    pub fn total_amount(&self) -> Fixed2 {
        self.total_amount
    }
    pub fn created_by(&self) -> &str {
        &self.created_by
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
    pub fn sent_at(&self) -> Option<&TimeStamp<Utc>> {
        self.sent_at.as_ref()
    }
    pub fn confirmed_at(&self) -> Option<&TimeStamp<Utc>> {
        self.confirmed_at.as_ref()
    }

    /// Names the first field that differs between two snapshots of the same row
    /// among those that must never change after creation.
    pub(crate) fn changed_immutable_field(&self, other: &Document) -> Option<&'static str> {
        if self.document_id != other.document_id {
            return Some("document_id");
        }
        if self.content_hash != other.content_hash {
            return Some("content_hash");
        }
        if self.created_at != other.created_at {
            return Some("created_at");
        }
        if self.created_by != other.created_by {
            return Some("created_by");
        }
        if self.from_company_id != other.from_company_id {
            return Some("from_company_id");
        }
        if self.to_company_id != other.to_company_id {
            return Some("to_company_id");
        }
        if self.parent_document_id != other.parent_document_id {
            return Some("parent_document_id");
        }
        if self.version_number != other.version_number {
            return Some("version_number");
        }
        if self.total_amount != other.total_amount {
            return Some("total_amount");
        }
        None
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct DocumentItem {
    #[n(0)]
    pub item_id: String,
    #[n(1)]
    pub document_id: String,
    #[n(2)]
    pub item_name: String,
    #[n(3)]
    pub option_text: Option<String>,
    #[n(4)]
    pub quantity: Fixed2,
    #[n(5)]
    pub unit_price: Fixed2,
    #[n(6)]
    pub line_amount: Fixed2, // quantity * unit_price
    #[n(7)]
    pub spec_json: String, // canonical spec JSON, stored verbatim
}

impl DocumentItem {
    pub fn spec_entries(&self) -> Result<Vec<SpecEntry>, ValidationError> {
        Ok(super::canonical::CanonicalSpec::from_json(&self.spec_json)?.entries())
    }
}

// Line item as entered, before canonicalization
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    item_name: String,
    option_text: Option<String>,
    quantity: Fixed2,
    unit_price: Fixed2,
    specs: Vec<SpecEntry>,
}

impl NewItem {
    pub fn new(item_name: &str, quantity: Fixed2, unit_price: Fixed2) -> Self {
        Self {
            item_name: item_name.to_string(),
            quantity,
            unit_price,
            ..Self::default()
        }
    }
    pub fn set_option(mut self, option_text: &str) -> Self {
        self.option_text = Some(option_text.to_string());
        self
    }
    pub fn add_spec(mut self, key: &str, value: &str) -> Self {
        self.specs.push(SpecEntry::new(key, value));
        self
    }
    pub fn set_specs(mut self, specs: Vec<SpecEntry>) -> Self {
        self.specs = specs;
        self
    }

    fn finalise(self, document_id: &str, index: usize) -> Result<DocumentItem, ValidationError> {
        let item_name = self.item_name.trim().to_string();
        if item_name.is_empty() {
            return Err(ValidationError::EmptyItemName { index });
        }
        if self.quantity.is_negative() {
            return Err(ValidationError::NegativeQuantity {
                index,
                quantity: self.quantity.to_string(),
            });
        }
        if self.unit_price.is_negative() {
            return Err(ValidationError::NegativeUnitPrice {
                index,
                unit_price: self.unit_price.to_string(),
            });
        }
        let line_amount = self
            .quantity
            .checked_mul(self.unit_price)
            .ok_or(ValidationError::AmountOverflow { index })?;

        let option_text = self
            .option_text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        Ok(DocumentItem {
            item_id: utils::item_id(document_id, index),
            document_id: document_id.to_string(),
            item_name,
            option_text,
            quantity: self.quantity,
            unit_price: self.unit_price,
            line_amount,
            spec_json: canonicalize(&self.specs).to_json(),
        })
    }
}

// Used for constructing drafts, both first versions and successors
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    from_company_id: Option<String>,
    to_company_id: Option<String>,
    items: Vec<NewItem>,
}

impl NewDocument {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_from_company(mut self, company_id: &str) -> Self {
        self.from_company_id = Some(company_id.to_string());
        self
    }
    pub fn set_to_company(mut self, company_id: &str) -> Self {
        self.to_company_id = Some(company_id.to_string());
        self
    }
    pub fn add_item(mut self, item: NewItem) -> Self {
        self.items.push(item);
        self
    }

    /// Validates the draft and produces version 1 of a new chain, content hash included.
    pub fn validate_and_finalise(
        self,
        document_id: String,
        created_by: &str,
    ) -> Result<(Document, Vec<DocumentItem>), LifecycleError> {
        let from = required_company(self.from_company_id.as_deref(), "from")?;
        let to = required_company(self.to_company_id.as_deref(), "to")?;

        self.build(document_id, created_by, from, to, None, 1)
    }

    /// Produces the next version of `prior`. Companies always carry over from the prior.
    pub fn finalise_revision(
        self,
        prior: &Document,
        document_id: String,
        created_by: &str,
    ) -> Result<(Document, Vec<DocumentItem>), LifecycleError> {
        if prior.state != DocumentState::RevisionRequested {
            return Err(ValidationError::NotRevisable {
                document_id: prior.document_id.clone(),
                state: prior.state,
            }
            .into());
        }
        let from = prior.from_company_id.clone();
        let to = prior.to_company_id.clone();
        let parent = Some(prior.document_id.clone());

        self.build(
            document_id,
            created_by,
            from,
            to,
            parent,
            prior.version_number + 1,
        )
    }

    fn build(
        self,
        document_id: String,
        created_by: &str,
        from_company_id: String,
        to_company_id: String,
        parent_document_id: Option<String>,
        version_number: u32,
    ) -> Result<(Document, Vec<DocumentItem>), LifecycleError> {
        let created_by = created_by.trim();
        if created_by.is_empty() {
            return Err(ValidationError::MissingActor.into());
        }
        if self.items.is_empty() {
            return Err(ValidationError::EmptyItems.into());
        }

        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| item.finalise(&document_id, index))
            .collect::<Result<Vec<_>, _>>()?;

        let mut total_amount = Fixed2::ZERO;
        for (index, item) in items.iter().enumerate() {
            total_amount = total_amount
                .checked_add(item.line_amount)
                .ok_or(ValidationError::AmountOverflow { index })?;
        }

        let document = Document {
            document_id,
            parent_document_id,
            version_number,
            from_company_id,
            to_company_id,
            state: DocumentState::Draft,
            state_version: 0,
            content_hash: content::compute(&items),
            total_amount,
            created_by: created_by.to_string(),
            created_at: TimeStamp::new(),
            sent_at: None,
            confirmed_at: None,
        };

        Ok((document, items))
    }
}

fn required_company(company_id: Option<&str>, side: &'static str) -> Result<String, ValidationError> {
    match company_id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(ValidationError::MissingCompany(side)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(s: &str) -> Fixed2 {
        s.parse().unwrap()
    }

    #[test]
    fn document_cbor_roundtrip() {
        let (document, items) = NewDocument::new()
            .set_from_company("acme")
            .set_to_company("globex")
            .add_item(NewItem::new("bolt", amount("2"), amount("1.25")).add_spec("두께", " 1.2T "))
            .validate_and_finalise("doc_test".to_string(), "alice")
            .unwrap();

        let encoded = minicbor::to_vec(&document).unwrap();
        let decoded: Document = minicbor::decode(&encoded).unwrap();
        assert_eq!(document, decoded);

        let encoded = minicbor::to_vec(&items).unwrap();
        let decoded: Vec<DocumentItem> = minicbor::decode(&encoded).unwrap();
        assert_eq!(items, decoded);
    }

    #[test]
    fn finalise_derives_amounts_and_ids() {
        let (document, items) = NewDocument::new()
            .set_from_company("acme")
            .set_to_company("globex")
            .add_item(NewItem::new("  bolt ", amount("2"), amount("1.25")).set_option(" "))
            .add_item(NewItem::new("nut", amount("10"), amount("0.10")).set_option(" M8 "))
            .validate_and_finalise("doc_x".to_string(), "alice")
            .unwrap();

        assert_eq!(items[0].item_id, "doc_x-001");
        assert_eq!(items[1].item_id, "doc_x-002");
        assert_eq!(items[0].item_name, "bolt");
        assert_eq!(items[0].option_text, None);
        assert_eq!(items[1].option_text.as_deref(), Some("M8"));
        assert_eq!(items[0].line_amount.to_string(), "2.50");
        assert_eq!(document.total_amount().to_string(), "3.50");
        assert_eq!(document.state(), DocumentState::Draft);
        assert_eq!(document.state_version(), 0);
        assert_eq!(document.version_number(), 1);
    }
}
