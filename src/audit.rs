//! Append-only ledger of state transitions
use super::document::Document;
use super::error::{LifecycleError, StorageError};
use super::state::{DocumentState, TransitionTable};
use super::types::TimeStamp;
use chrono::Utc;

// One transition, as evidence. Never updated or deleted once written.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct DocumentStateLog {
    #[n(0)]
    pub log_id: String, // opaque, not an ordering key
    #[n(1)]
    pub document_id: String,
    #[n(2)]
    pub from_state: DocumentState,
    #[n(3)]
    pub to_state: DocumentState,
    #[n(4)]
    pub changed_by: String,
    #[n(5)]
    pub changed_at: TimeStamp<Utc>,
    #[n(6)]
    pub reason: Option<String>,
}

impl DocumentStateLog {
    pub fn new(
        log_id: String,
        document_id: String,
        from_state: DocumentState,
        to_state: DocumentState,
        changed_by: String,
        reason: Option<String>,
    ) -> Self {
        Self {
            log_id,
            document_id,
            from_state,
            to_state,
            changed_by,
            changed_at: TimeStamp::new(),
            reason,
        }
    }

    /// Returns the hex SHA-256 seal of the entry alongside its CBOR encoding.
    pub fn build(&self) -> Result<(String, Vec<u8>), StorageError> {
        let cbor = minicbor::to_vec(self).map_err(|e| StorageError::Encode {
            what: "state log",
            detail: e.to_string(),
        })?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

/// A ledger row as persisted: the entry, its storage-assigned sequence and its seal.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct AuditRecord {
    #[n(0)]
    pub sequence: u64,
    #[n(1)]
    pub digest: String,
    #[n(2)]
    pub entry: DocumentStateLog,
}

impl AuditRecord {
    pub fn seal(sequence: u64, entry: DocumentStateLog) -> Result<Self, StorageError> {
        let (digest, _) = entry.build()?;
        Ok(Self {
            sequence,
            digest,
            entry,
        })
    }

    pub fn is_intact(&self) -> Result<bool, StorageError> {
        let (digest, _) = self.entry.build()?;
        Ok(digest == self.digest)
    }
}

/// Every ledger row of one document, in sequence order.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    document_id: String,
    records: Vec<AuditRecord>,
}

impl AuditTrail {
    pub fn new(document_id: &str, mut records: Vec<AuditRecord>) -> Self {
        records.sort_by_key(|record| record.sequence);
        Self {
            document_id: document_id.to_string(),
            records,
        }
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Walks the ledger from `Draft` and returns the state it ends in.
    pub fn replay(&self, table: &TransitionTable) -> Result<DocumentState, LifecycleError> {
        let mut current = DocumentState::Draft;
        let mut last_sequence = None;

        for record in &self.records {
            let entry = &record.entry;

            if entry.document_id != self.document_id {
                return Err(self.inconsistent(format!(
                    "row {} belongs to document {}",
                    record.sequence, entry.document_id
                )));
            }
            if !record.is_intact()? {
                return Err(self.inconsistent(format!("row {} fails its seal", record.sequence)));
            }
            if last_sequence.is_some_and(|last| last >= record.sequence) {
                return Err(self.inconsistent(format!(
                    "row {} is out of sequence",
                    record.sequence
                )));
            }
            if entry.from_state != current {
                return Err(self.inconsistent(format!(
                    "row {} starts from {} but the chain is at {}",
                    record.sequence, entry.from_state, current
                )));
            }
            if !table.permits_ledger_step(entry.from_state, entry.to_state) {
                return Err(self.inconsistent(format!(
                    "row {} records {} -> {}, which the protocol forbids",
                    record.sequence, entry.from_state, entry.to_state
                )));
            }

            current = entry.to_state;
            last_sequence = Some(record.sequence);
        }

        Ok(current)
    }

    /// Replays the ledger and checks it accounts for every transition the document has seen.
    pub fn verify_against(
        &self,
        table: &TransitionTable,
        document: &Document,
    ) -> Result<DocumentState, LifecycleError> {
        let replayed = self.replay(table)?;

        if replayed != document.state() {
            return Err(self.inconsistent(format!(
                "ledger ends at {} but the document is {}",
                replayed,
                document.state()
            )));
        }
        if self.records.len() as u64 != document.state_version() {
            return Err(self.inconsistent(format!(
                "ledger holds {} rows but the document is at state version {}",
                self.records.len(),
                document.state_version()
            )));
        }

        Ok(replayed)
    }

    fn inconsistent(&self, detail: String) -> LifecycleError {
        LifecycleError::AuditTrail {
            document_id: self.document_id.clone(),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DocumentState::*;

    fn row(sequence: u64, from: DocumentState, to: DocumentState) -> AuditRecord {
        let entry = DocumentStateLog::new(
            format!("log_{}", sequence),
            "doc_a".to_string(),
            from,
            to,
            "alice".to_string(),
            None,
        );
        AuditRecord::seal(sequence, entry).unwrap()
    }

    #[test]
    fn replays_a_full_chain() {
        let trail = AuditTrail::new(
            "doc_a",
            vec![row(9, Received, Confirmed), row(3, Draft, Sent), row(5, Sent, Received)],
        );

        assert_eq!(trail.replay(&TransitionTable::standard()).unwrap(), Confirmed);
        assert_eq!(trail.records()[0].sequence, 3);
    }

    #[test]
    fn rejects_a_gap_in_the_chain() {
        let trail = AuditTrail::new("doc_a", vec![row(1, Draft, Sent), row(2, Received, Confirmed)]);

        assert!(matches!(
            trail.replay(&TransitionTable::standard()),
            Err(LifecycleError::AuditTrail { .. })
        ));
    }

    #[test]
    fn rejects_a_tampered_row() {
        let mut tampered = row(1, Draft, Sent);
        tampered.entry.changed_by = "mallory".to_string();
        let trail = AuditTrail::new("doc_a", vec![tampered]);

        assert!(trail.replay(&TransitionTable::standard()).is_err());
    }

    #[test]
    fn state_log_cbor_roundtrip() {
        let original = row(1, Draft, Sent).entry;

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: DocumentStateLog = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }
}
