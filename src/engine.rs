//! State transition engine. Pure: validates against the table and returns new snapshots.
use super::audit::DocumentStateLog;
use super::config::LedgerConfig;
use super::document::Document;
use super::error::{LifecycleError, ValidationError};
use super::state::{AllowedStates, DocumentState, TransitionTable};
use super::types::TimeStamp;
use super::utils;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPolicy {
    pub require_revision_reason: bool,
    pub log_prefix: String,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            require_revision_reason: true,
            log_prefix: "log_".to_string(),
        }
    }
}

impl From<&LedgerConfig> for TransitionPolicy {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            require_revision_reason: config.policy.require_revision_reason,
            log_prefix: config.identifiers.log_prefix.clone(),
        }
    }
}

/// Result of one applied transition: the new snapshot, its ledger entry and the
/// state version the store must still hold for the commit to succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub document: Document,
    pub log: DocumentStateLog,
    pub expected_state_version: u64,
}

#[derive(Debug, Clone)]
pub struct TransitionEngine {
    table: Arc<TransitionTable>,
    policy: TransitionPolicy,
}

impl TransitionEngine {
    pub fn new(table: Arc<TransitionTable>, policy: TransitionPolicy) -> Self {
        Self { table, policy }
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn can_transition(&self, from: DocumentState, to: DocumentState) -> bool {
        self.table.can_transition(from, to)
    }

    /// The table row for `state`. `Draft` from `RevisionRequested` is offered but
    /// [`Self::transition`] answers it with `NewVersionRequired`; callers create a
    /// successor document instead.
    pub fn allowed_transitions(&self, state: DocumentState) -> BTreeSet<DocumentState> {
        self.table.allowed_transitions(state)
    }

    /// Applies `to` to a copy of `document`. The input is never touched, so a failed
    /// call leaves nothing to undo.
    pub fn transition(
        &self,
        document: &Document,
        to: DocumentState,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<Transition, LifecycleError> {
        let from = document.state;

        if !self.table.can_transition(from, to) {
            return Err(LifecycleError::InvalidTransition {
                from,
                to,
                allowed: AllowedStates(self.table.allowed_transitions(from)),
            });
        }
        // a new version is a new document, never the same row reopened
        if from == DocumentState::RevisionRequested && to == DocumentState::Draft {
            return Err(LifecycleError::NewVersionRequired {
                document_id: document.document_id.clone(),
            });
        }

        let actor = required_actor(actor)?;
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if to == DocumentState::RevisionRequested
            && self.policy.require_revision_reason
            && reason.is_none()
        {
            return Err(ValidationError::MissingReason(to).into());
        }

        self.apply(document, to, actor, reason.map(str::to_string))
    }

    /// Moves a revised document to `Superseded` once its successor exists.
    pub fn supersede(
        &self,
        prior: &Document,
        successor: &Document,
        actor: &str,
    ) -> Result<Transition, LifecycleError> {
        if prior.state != DocumentState::RevisionRequested {
            return Err(LifecycleError::InvalidTransition {
                from: prior.state,
                to: DocumentState::Superseded,
                allowed: AllowedStates(self.table.allowed_transitions(prior.state)),
            });
        }
        if successor.parent_document_id.as_deref() != Some(prior.document_id.as_str())
            || successor.version_number != prior.version_number + 1
        {
            return Err(ValidationError::NotSuccessor {
                prior_id: prior.document_id.clone(),
                successor_id: successor.document_id.clone(),
            }
            .into());
        }

        let actor = required_actor(actor)?;
        let reason = format!("superseded by {}", successor.document_id);

        self.apply(prior, DocumentState::Superseded, actor, Some(reason))
    }

    fn apply(
        &self,
        document: &Document,
        to: DocumentState,
        actor: &str,
        reason: Option<String>,
    ) -> Result<Transition, LifecycleError> {
        let from = document.state;
        let log_id = utils::new_uuid_to_bech32(&self.policy.log_prefix)?;

        let mut next = document.clone();
        next.state = to;
        next.state_version = document.state_version + 1;
        // stamped once; neither state is reachable twice
        if to == DocumentState::Sent && next.sent_at.is_none() {
            next.sent_at = Some(TimeStamp::new());
        }
        if to == DocumentState::Confirmed && next.confirmed_at.is_none() {
            next.confirmed_at = Some(TimeStamp::new());
        }

        let log = DocumentStateLog::new(
            log_id,
            document.document_id.clone(),
            from,
            to,
            actor.to_string(),
            reason,
        );

        Ok(Transition {
            document: next,
            log,
            expected_state_version: document.state_version,
        })
    }
}

fn required_actor(actor: &str) -> Result<&str, ValidationError> {
    let actor = actor.trim();
    if actor.is_empty() {
        return Err(ValidationError::MissingActor);
    }
    Ok(actor)
}
