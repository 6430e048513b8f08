//! Storage collaborator contract and its sled implementation
use super::audit::{AuditRecord, DocumentStateLog};
use super::config::StorageConfig;
use super::document::{Document, DocumentItem};
use super::error::{LifecycleError, StorageError};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Transactional, Tree};
use std::sync::Arc;

/// What the lifecycle needs from persistence. Implementations must make
/// `commit_transition` atomic: the document update and the ledger row land together
/// or not at all, and only if the stored state version still matches.
///
/// A document has at most one successor. `insert_document` refuses a second child
/// of the same parent with [`LifecycleError::RevisionExists`].
pub trait DocumentStore {
    fn load_document(&self, document_id: &str) -> Result<Document, LifecycleError>;
    fn load_items(&self, document_id: &str) -> Result<Vec<DocumentItem>, LifecycleError>;
    fn insert_document(
        &self,
        document: &Document,
        items: &[DocumentItem],
    ) -> Result<(), LifecycleError>;
    fn commit_transition(
        &self,
        document: &Document,
        expected_state_version: u64,
        log: &DocumentStateLog,
    ) -> Result<AuditRecord, LifecycleError>;
    fn load_audit_trail(&self, document_id: &str) -> Result<Vec<AuditRecord>, LifecycleError>;
    fn load_successor(&self, parent_id: &str) -> Result<Option<Document>, LifecycleError>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    fn load_document(&self, document_id: &str) -> Result<Document, LifecycleError> {
        (**self).load_document(document_id)
    }
    fn load_items(&self, document_id: &str) -> Result<Vec<DocumentItem>, LifecycleError> {
        (**self).load_items(document_id)
    }
    fn insert_document(
        &self,
        document: &Document,
        items: &[DocumentItem],
    ) -> Result<(), LifecycleError> {
        (**self).insert_document(document, items)
    }
    fn commit_transition(
        &self,
        document: &Document,
        expected_state_version: u64,
        log: &DocumentStateLog,
    ) -> Result<AuditRecord, LifecycleError> {
        (**self).commit_transition(document, expected_state_version, log)
    }
    fn load_audit_trail(&self, document_id: &str) -> Result<Vec<AuditRecord>, LifecycleError> {
        (**self).load_audit_trail(document_id)
    }
    fn load_successor(&self, parent_id: &str) -> Result<Option<Document>, LifecycleError> {
        (**self).load_successor(parent_id)
    }
}

const DOCUMENTS: &str = "documents";
const ITEMS: &str = "items";
const STATE_LOG: &str = "state_log";
const SUCCESSORS: &str = "successors";

pub struct SledStore {
    instance: Arc<sled::Db>,
    documents: Tree,
    items: Tree,
    state_log: Tree, // insert only
    successors: Tree, // parent id -> successor id
    flush_on_commit: bool,
}

impl SledStore {
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        let db = sled::open(&config.path)?;
        Self::new(Arc::new(db), config.flush_on_commit)
    }

    pub fn new(instance: Arc<sled::Db>, flush_on_commit: bool) -> Result<Self, StorageError> {
        Ok(Self {
            documents: instance.open_tree(DOCUMENTS)?,
            items: instance.open_tree(ITEMS)?,
            state_log: instance.open_tree(STATE_LOG)?,
            successors: instance.open_tree(SUCCESSORS)?,
            instance,
            flush_on_commit,
        })
    }

    pub fn instance(&self) -> &Arc<sled::Db> {
        &self.instance
    }

    fn flush(&self) -> Result<(), StorageError> {
        if self.flush_on_commit {
            self.instance.flush()?;
        }
        Ok(())
    }
}

// ledger rows sort by document, then by storage sequence
fn ledger_prefix(document_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(document_id.len() + 9);
    key.extend_from_slice(document_id.as_bytes());
    key.push(0);
    key
}

fn ledger_key(document_id: &str, sequence: u64) -> Vec<u8> {
    let mut key = ledger_prefix(document_id);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn encode<T: minicbor::Encode<()>>(value: &T, what: &'static str) -> Result<Vec<u8>, StorageError> {
    minicbor::to_vec(value).map_err(|e| StorageError::Encode {
        what,
        detail: e.to_string(),
    })
}

fn decode<'b, T: minicbor::Decode<'b, ()>>(bytes: &'b [u8], what: &'static str) -> Result<T, StorageError> {
    minicbor::decode(bytes).map_err(|source| StorageError::Decode { what, source })
}

fn unwrap_transaction<T>(result: Result<T, TransactionError<LifecycleError>>) -> Result<T, LifecycleError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(StorageError::Sled(err).into()),
    }
}

fn abort<T>(err: impl Into<LifecycleError>) -> Result<T, ConflictableTransactionError<LifecycleError>> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

/// Checks that `document` and `log` describe exactly one step from `stored`.
fn check_commit(
    stored: &Document,
    document: &Document,
    log: &DocumentStateLog,
) -> Result<(), StorageError> {
    let detail = if log.document_id != document.document_id() {
        format!("ledger row belongs to {}", log.document_id)
    } else if document.state_version() != stored.state_version() + 1 {
        format!(
            "state version {} does not follow {}",
            document.state_version(),
            stored.state_version()
        )
    } else if log.from_state != stored.state() {
        format!("ledger row starts from {} but the row is {}", log.from_state, stored.state())
    } else if log.to_state != document.state() {
        format!("ledger row ends at {} but the update is {}", log.to_state, document.state())
    } else {
        return Ok(());
    };

    Err(StorageError::InconsistentCommit {
        document_id: document.document_id().to_string(),
        detail,
    })
}

impl DocumentStore for SledStore {
    fn load_document(&self, document_id: &str) -> Result<Document, LifecycleError> {
        let raw = self
            .documents
            .get(document_id.as_bytes())
            .map_err(StorageError::from)?
            .ok_or_else(|| LifecycleError::NotFound(document_id.to_string()))?;

        Ok(decode(&raw, "document")?)
    }

    fn load_items(&self, document_id: &str) -> Result<Vec<DocumentItem>, LifecycleError> {
        let raw = self
            .items
            .get(document_id.as_bytes())
            .map_err(StorageError::from)?
            .ok_or_else(|| LifecycleError::NotFound(document_id.to_string()))?;

        Ok(decode(&raw, "document items")?)
    }

    fn insert_document(
        &self,
        document: &Document,
        items: &[DocumentItem],
    ) -> Result<(), LifecycleError> {
        let key = document.document_id().as_bytes();
        let parent = document.parent_document_id();
        let document_cbor = encode(document, "document")?;
        let items_cbor = encode(&items, "document items")?;

        let trees = (&self.documents, &self.items, &self.successors);
        let result = trees.transaction(|(documents, items, successors)| {
            if documents.get(key)?.is_some() {
                return abort(StorageError::AlreadyExists(document.document_id().to_string()));
            }
            if let Some(parent) = parent {
                // the index write and the successor land in one transaction
                if let Some(existing) = successors.get(parent.as_bytes())? {
                    return abort(LifecycleError::RevisionExists {
                        document_id: parent.to_string(),
                        successor_id: String::from_utf8_lossy(&existing).into_owned(),
                    });
                }
                successors.insert(parent.as_bytes(), key)?;
            }
            documents.insert(key, document_cbor.as_slice())?;
            items.insert(key, items_cbor.as_slice())?;
            Ok(())
        });
        unwrap_transaction(result)?;
        self.flush()?;

        tracing::debug!(document_id = %document.document_id(), "document stored");
        Ok(())
    }

    fn commit_transition(
        &self,
        document: &Document,
        expected_state_version: u64,
        log: &DocumentStateLog,
    ) -> Result<AuditRecord, LifecycleError> {
        let document_id = document.document_id();
        let key = document_id.as_bytes();

        // sequence gaps from aborted commits are harmless, only order matters
        let sequence = self.instance.generate_id().map_err(StorageError::from)?;
        let record = AuditRecord::seal(sequence, log.clone())?;
        let record_key = ledger_key(document_id, sequence);
        let record_cbor = encode(&record, "ledger row")?;
        let document_cbor = encode(document, "document")?;

        let result = (&self.documents, &self.state_log).transaction(|(documents, state_log)| {
            let Some(raw) = documents.get(key)? else {
                return abort(LifecycleError::NotFound(document_id.to_string()));
            };
            let stored: Document = match decode(&raw, "document") {
                Ok(stored) => stored,
                Err(err) => return abort(err),
            };

            if stored.state_version() != expected_state_version {
                return abort(LifecycleError::VersionConflict {
                    document_id: document_id.to_string(),
                    expected: expected_state_version,
                    actual: stored.state_version(),
                });
            }
            if let Err(err) = check_commit(&stored, document, log) {
                return abort(err);
            }
            if let Some(field) = stored.changed_immutable_field(document) {
                return abort(StorageError::ImmutableField {
                    document_id: document_id.to_string(),
                    field,
                });
            }
            if state_log.get(record_key.as_slice())?.is_some() {
                return abort(StorageError::LedgerOverwrite(format!(
                    "{}#{}",
                    document_id, sequence
                )));
            }

            state_log.insert(record_key.as_slice(), record_cbor.as_slice())?;
            documents.insert(key, document_cbor.as_slice())?;
            Ok(())
        });
        unwrap_transaction(result)?;
        self.flush()?;

        tracing::debug!(
            document_id = %document_id,
            sequence,
            state_version = document.state_version(),
            "transition committed"
        );
        Ok(record)
    }

    fn load_audit_trail(&self, document_id: &str) -> Result<Vec<AuditRecord>, LifecycleError> {
        let mut records = Vec::new();

        for row in self.state_log.scan_prefix(ledger_prefix(document_id)) {
            let (_, raw) = row.map_err(StorageError::from)?;
            records.push(decode::<AuditRecord>(&raw, "ledger row")?);
        }

        Ok(records)
    }

    fn load_successor(&self, parent_id: &str) -> Result<Option<Document>, LifecycleError> {
        let successor_id = self
            .successors
            .get(parent_id.as_bytes())
            .map_err(StorageError::from)?;

        match successor_id {
            Some(raw) => self
                .load_document(&String::from_utf8_lossy(&raw))
                .map(Some),
            None => Ok(None),
        }
    }
}
