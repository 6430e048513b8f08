//! Service layer API for the document lifecycle
use super::audit::{AuditRecord, AuditTrail, DocumentStateLog};
use super::config::{IdentifierConfig, LedgerConfig};
use super::content::{self, HashVerification};
use super::document::{Document, NewDocument};
use super::engine::{TransitionEngine, TransitionPolicy};
use super::error::{ErrorKind, LifecycleError};
use super::state::{DocumentState, TransitionTable};
use super::store::DocumentStore;
use super::utils;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A transition that made it to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransition {
    pub document: Document,
    pub record: AuditRecord,
}

/// Consumer facing answer to a transition request. Never an error, always a report.
///
/// A request for `Draft` from `RevisionRequested` is always reported as an
/// `InvalidTransition`; the next version comes from [`LifecycleService::revise`].
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
    pub log_entry: Option<DocumentStateLog>,
    pub document: Option<Document>,
}

impl From<Result<CommittedTransition, LifecycleError>> for TransitionOutcome {
    fn from(result: Result<CommittedTransition, LifecycleError>) -> Self {
        match result {
            Ok(committed) => Self {
                success: true,
                error_kind: None,
                message: None,
                log_entry: Some(committed.record.entry),
                document: Some(committed.document),
            },
            Err(err) => Self {
                success: false,
                error_kind: Some(err.kind()),
                message: Some(err.to_string()),
                log_entry: None,
                document: None,
            },
        }
    }
}

/// Both halves of a revision cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub successor: Document,
    pub superseded: CommittedTransition,
}

pub struct LifecycleService<S> {
    store: S,
    engine: TransitionEngine,
    identifiers: IdentifierConfig,
    verify_hash_before_transition: bool,
}

impl<S: DocumentStore> LifecycleService<S> {
    pub fn new(
        store: S,
        engine: TransitionEngine,
        identifiers: IdentifierConfig,
        verify_hash_before_transition: bool,
    ) -> Self {
        Self {
            store,
            engine,
            identifiers,
            verify_hash_before_transition,
        }
    }

    /// Builds the standard table once and wires everything from `config`.
    pub fn from_config(store: S, config: &LedgerConfig) -> Self {
        let engine = TransitionEngine::new(
            Arc::new(TransitionTable::standard()),
            TransitionPolicy::from(config),
        );
        Self::new(
            store,
            engine,
            config.identifiers.clone(),
            config.policy.verify_hash_before_transition,
        )
    }

    pub fn store(&self) -> &S {
        &self.store
    }
    pub fn engine(&self) -> &TransitionEngine {
        &self.engine
    }

    pub fn load_document(&self, document_id: &str) -> Result<Document, LifecycleError> {
        self.store.load_document(document_id)
    }

    /// Create a new document chain in `Draft`
    pub fn create_document(
        &self,
        draft: NewDocument,
        actor: &str,
    ) -> Result<Document, LifecycleError> {
        let document_id = utils::new_uuid_to_bech32(&self.identifiers.document_prefix)?;
        let (document, items) = draft.validate_and_finalise(document_id, actor)?;

        self.store.insert_document(&document, &items)?;

        tracing::info!(
            document_id = %document.document_id(),
            content_hash = %document.content_hash(),
            items = items.len(),
            "document created"
        );
        Ok(document)
    }

    /// States reachable from `state`. `Draft` offered from `RevisionRequested` is
    /// reached through [`Self::create_revision`] or [`Self::revise`], never through
    /// [`Self::transition`] or [`Self::request_transition`].
    pub fn allowed_transitions(&self, state: DocumentState) -> BTreeSet<DocumentState> {
        self.engine.allowed_transitions(state)
    }

    /// Load, validate, apply and commit one transition
    pub fn transition(
        &self,
        document_id: &str,
        to: DocumentState,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<CommittedTransition, LifecycleError> {
        let document = self.store.load_document(document_id)?;

        if self.verify_hash_before_transition {
            self.ensure_content_intact(&document)?;
        }

        let transition = match self.engine.transition(&document, to, actor, reason) {
            Ok(transition) => transition,
            Err(err) => {
                tracing::warn!(
                    document_id = %document_id,
                    from = %document.state(),
                    to = %to,
                    error = %err,
                    "transition refused"
                );
                return Err(err);
            }
        };

        self.commit(transition.document, transition.expected_state_version, transition.log)
    }

    pub fn request_transition(
        &self,
        document_id: &str,
        to: DocumentState,
        actor: &str,
        reason: Option<&str>,
    ) -> TransitionOutcome {
        self.transition(document_id, to, actor, reason).into()
    }

    pub fn verify_content_hash(&self, document_id: &str) -> Result<HashVerification, LifecycleError> {
        let document = self.store.load_document(document_id)?;
        let items = self.store.load_items(document_id)?;
        let verification = content::verify(document.content_hash(), &items);

        if let HashVerification::Mismatch { stored, recomputed } = &verification {
            tracing::error!(
                document_id = %document_id,
                stored = %stored,
                recomputed = %recomputed,
                "content hash mismatch"
            );
        }
        Ok(verification)
    }

    /// Step one of a revision: store the next version as a new draft.
    ///
    /// Fails with `RevisionExists` once `prior_id` has a successor, so a chain never
    /// forks. The store enforces this too when two callers race.
    pub fn create_revision(
        &self,
        prior_id: &str,
        draft: NewDocument,
        actor: &str,
    ) -> Result<Document, LifecycleError> {
        let prior = self.store.load_document(prior_id)?;
        if let Some(existing) = self.store.load_successor(prior_id)? {
            return Err(LifecycleError::RevisionExists {
                document_id: prior_id.to_string(),
                successor_id: existing.document_id().to_string(),
            });
        }

        let document_id = utils::new_uuid_to_bech32(&self.identifiers.document_prefix)?;
        let (successor, items) = draft.finalise_revision(&prior, document_id, actor)?;

        self.store.insert_document(&successor, &items)?;

        tracing::info!(
            document_id = %successor.document_id(),
            parent_document_id = %prior_id,
            version_number = successor.version_number(),
            "revision created"
        );
        Ok(successor)
    }

    /// Step two of a revision: retire the prior once its successor is durable.
    pub fn supersede(
        &self,
        prior_id: &str,
        successor_id: &str,
        actor: &str,
    ) -> Result<CommittedTransition, LifecycleError> {
        let prior = self.store.load_document(prior_id)?;
        let successor = self.store.load_document(successor_id)?;

        let transition = self.engine.supersede(&prior, &successor, actor)?;
        self.commit(transition.document, transition.expected_state_version, transition.log)
    }

    /// Both steps of a revision. Safe to call again after a failure between the
    /// steps: a stored successor with the same content is reused instead of forking.
    pub fn revise(
        &self,
        prior_id: &str,
        draft: NewDocument,
        actor: &str,
    ) -> Result<Revision, LifecycleError> {
        let successor = match self.store.load_successor(prior_id)? {
            Some(existing) => self.resume_revision(prior_id, existing, draft, actor)?,
            None => self.create_revision(prior_id, draft, actor)?,
        };
        let superseded = self.supersede(prior_id, successor.document_id(), actor)?;

        Ok(Revision {
            successor,
            superseded,
        })
    }

    /// Every version of the chain `document_id` belongs to, oldest first.
    pub fn version_chain(&self, document_id: &str) -> Result<Vec<Document>, LifecycleError> {
        let mut chain = vec![self.store.load_document(document_id)?];

        while let Some(parent_id) = chain
            .last()
            .and_then(|d| d.parent_document_id())
            .map(str::to_string)
        {
            if chain.iter().any(|d| d.document_id() == parent_id) {
                return Err(LifecycleError::AuditTrail {
                    document_id: document_id.to_string(),
                    detail: format!("version chain loops back to {}", parent_id),
                });
            }
            chain.push(self.store.load_document(&parent_id)?);
        }

        chain.reverse();
        Ok(chain)
    }

    pub fn audit_trail(&self, document_id: &str) -> Result<AuditTrail, LifecycleError> {
        let records = self.store.load_audit_trail(document_id)?;
        Ok(AuditTrail::new(document_id, records))
    }

    /// Checks the ledger reconstructs the stored state; returns that state.
    pub fn verify_audit_trail(&self, document_id: &str) -> Result<DocumentState, LifecycleError> {
        let document = self.store.load_document(document_id)?;
        let trail = self.audit_trail(document_id)?;

        trail
            .verify_against(self.engine.table(), &document)
            .inspect_err(|err| {
                tracing::error!(document_id = %document_id, error = %err, "audit trail inconsistent")
            })
    }

    fn resume_revision(
        &self,
        prior_id: &str,
        existing: Document,
        draft: NewDocument,
        actor: &str,
    ) -> Result<Document, LifecycleError> {
        let prior = self.store.load_document(prior_id)?;
        let refused = || LifecycleError::RevisionExists {
            document_id: prior_id.to_string(),
            successor_id: existing.document_id().to_string(),
        };
        if prior.state() != DocumentState::RevisionRequested {
            return Err(refused());
        }

        let (candidate, _) =
            draft.finalise_revision(&prior, existing.document_id().to_string(), actor)?;
        if candidate.content_hash() != existing.content_hash() {
            return Err(refused());
        }

        tracing::info!(
            document_id = %existing.document_id(),
            parent_document_id = %prior_id,
            "resuming interrupted revision"
        );
        Ok(existing)
    }

    fn ensure_content_intact(&self, document: &Document) -> Result<(), LifecycleError> {
        let items = self.store.load_items(document.document_id())?;

        match content::verify(document.content_hash(), &items) {
            HashVerification::Matches => Ok(()),
            HashVerification::Mismatch { stored, recomputed } => {
                tracing::error!(
                    document_id = %document.document_id(),
                    stored = %stored,
                    recomputed = %recomputed,
                    "content hash mismatch, refusing transition"
                );
                Err(LifecycleError::HashMismatch {
                    document_id: document.document_id().to_string(),
                    stored: stored.to_string(),
                    recomputed: recomputed.to_string(),
                })
            }
        }
    }

    fn commit(
        &self,
        document: Document,
        expected_state_version: u64,
        log: DocumentStateLog,
    ) -> Result<CommittedTransition, LifecycleError> {
        match self
            .store
            .commit_transition(&document, expected_state_version, &log)
        {
            Ok(record) => {
                tracing::info!(
                    document_id = %document.document_id(),
                    from = %log.from_state,
                    to = %log.to_state,
                    state_version = document.state_version(),
                    sequence = record.sequence,
                    "transition committed"
                );
                Ok(CommittedTransition { document, record })
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::warn!(document_id = %document.document_id(), error = %err, "version conflict");
                }
                Err(err)
            }
        }
    }
}
