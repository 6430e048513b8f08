//! Error taxonomy for lifecycle operations
use crate::state::{AllowedStates, DocumentState};

#[derive(thiserror::Error, Debug)]
pub enum LifecycleError {
    #[error("Cannot move document from {from} to {to}; allowed from {from}: {allowed}")]
    InvalidTransition {
        from: DocumentState,
        to: DocumentState,
        allowed: AllowedStates,
    },
    #[error(
        "Document {document_id} was modified concurrently (expected state version {expected}, found {actual}); reload and retry"
    )]
    VersionConflict {
        document_id: String,
        expected: u64,
        actual: u64,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(
        "Content hash mismatch on document {document_id}: stored {stored}, recomputed {recomputed}"
    )]
    HashMismatch {
        document_id: String,
        stored: String,
        recomputed: String,
    },
    #[error("Document {0} not found")]
    NotFound(String),
    #[error(
        "Document {document_id} awaits a new version; create a successor draft instead of reopening it"
    )]
    NewVersionRequired { document_id: String },
    #[error("Document {document_id} was already revised as {successor_id}")]
    RevisionExists {
        document_id: String,
        successor_id: String,
    },
    #[error("Audit trail of document {document_id} is inconsistent: {detail}")]
    AuditTrail { document_id: String, detail: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("An acting party is required")]
    MissingActor,
    #[error("A reason is required when moving to {0}")]
    MissingReason(DocumentState),
    #[error("The {0} company is not set")]
    MissingCompany(&'static str),
    #[error("A document needs at least one line item")]
    EmptyItems,
    #[error("Line item {index} has an empty name")]
    EmptyItemName { index: usize },
    #[error("Line item {index} has a negative quantity ({quantity})")]
    NegativeQuantity { index: usize, quantity: String },
    #[error("Line item {index} has a negative unit price ({unit_price})")]
    NegativeUnitPrice { index: usize, unit_price: String },
    #[error("Line item {index} amount overflows")]
    AmountOverflow { index: usize },
    #[error("Amount '{0}' is not a number with at most two decimal places")]
    Precision(String),
    #[error("Spec JSON is not an object of string values: {0}")]
    InvalidSpecJson(String),
    #[error("Document {document_id} is {state}; only RevisionRequested documents can be revised")]
    NotRevisable {
        document_id: String,
        state: DocumentState,
    },
    #[error("Document {successor_id} is not the next version of {prior_id}")]
    NotSuccessor {
        prior_id: String,
        successor_id: String,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("Failed to encode {what}: {detail}")]
    Encode { what: &'static str, detail: String },
    #[error("Failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        source: minicbor::decode::Error,
    },
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("Field '{field}' of document {document_id} is immutable")]
    ImmutableField {
        document_id: String,
        field: &'static str,
    },
    #[error("Ledger row {0} already written")]
    LedgerOverwrite(String),
    #[error("Commit for document {document_id} does not follow the stored row: {detail}")]
    InconsistentCommit { document_id: String, detail: String },
}

#[derive(thiserror::Error, Debug)]
pub enum IdentifierError {
    #[error("Invalid identifier prefix '{prefix}': {detail}")]
    InvalidPrefix { prefix: String, detail: String },
    #[error("Failed to bech32 encode identifier: {0}")]
    Encode(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Flat classification handed to consumers that only need to branch on the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidTransition,
    VersionConflict,
    Validation,
    HashMismatch,
    NotFound,
    Storage,
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::InvalidTransition { .. }
            | LifecycleError::NewVersionRequired { .. }
            | LifecycleError::RevisionExists { .. } => ErrorKind::InvalidTransition,
            LifecycleError::VersionConflict { .. } => ErrorKind::VersionConflict,
            LifecycleError::Validation(_) | LifecycleError::Identifier(_) => ErrorKind::Validation,
            LifecycleError::HashMismatch { .. } => ErrorKind::HashMismatch,
            LifecycleError::NotFound(_) => ErrorKind::NotFound,
            LifecycleError::AuditTrail { .. } | LifecycleError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Only a lost compare-and-swap race is worth retrying after a reload.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LifecycleError::VersionConflict { .. })
    }
}
