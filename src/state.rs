//! Document states and the transition table that governs them
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum DocumentState {
    #[n(0)]
    Draft,
    #[n(1)]
    Sent,
    #[n(2)]
    Received,
    #[n(3)]
    RevisionRequested,
    #[n(4)]
    Confirmed,
    #[n(5)]
    Superseded,
    #[n(6)]
    Cancelled,
}

impl DocumentState {
    pub const ALL: [DocumentState; 7] = [
        DocumentState::Draft,
        DocumentState::Sent,
        DocumentState::Received,
        DocumentState::RevisionRequested,
        DocumentState::Confirmed,
        DocumentState::Superseded,
        DocumentState::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DocumentState::Confirmed | DocumentState::Superseded | DocumentState::Cancelled
        )
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentState::Draft => "Draft",
            DocumentState::Sent => "Sent",
            DocumentState::Received => "Received",
            DocumentState::RevisionRequested => "RevisionRequested",
            DocumentState::Confirmed => "Confirmed",
            DocumentState::Superseded => "Superseded",
            DocumentState::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Target states reachable from one state. Renders as a comma separated list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedStates(pub BTreeSet<DocumentState>);

impl fmt::Display for AllowedStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("none (terminal)");
        }
        let names: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&names.join(", "))
    }
}

/// The legal protocol. Built once at start-up and handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    rows: BTreeMap<DocumentState, BTreeSet<DocumentState>>,
}

impl TransitionTable {
    pub fn standard() -> Self {
        use DocumentState::*;

        let rows = BTreeMap::from([
            (Draft, BTreeSet::from([Sent, Cancelled])),
            (Sent, BTreeSet::from([Received])),
            (Received, BTreeSet::from([Confirmed, RevisionRequested])),
            // Draft here means "start the next version", see TransitionEngine::transition
            (RevisionRequested, BTreeSet::from([Draft])),
            (Confirmed, BTreeSet::new()),
            (Superseded, BTreeSet::new()),
            (Cancelled, BTreeSet::new()),
        ]);

        Self { rows }
    }

    pub fn can_transition(&self, from: DocumentState, to: DocumentState) -> bool {
        self.rows.get(&from).is_some_and(|row| row.contains(&to))
    }

    /// Targets listed for `state`. The `RevisionRequested -> Draft` entry stands for
    /// a new successor document, not a step on the same row.
    pub fn allowed_transitions(&self, state: DocumentState) -> BTreeSet<DocumentState> {
        self.rows.get(&state).cloned().unwrap_or_default()
    }

    /// Whether a ledger may legitimately record `from -> to`.
    ///
    /// Ledgers never contain the reopening `RevisionRequested -> Draft` step, since a new
    /// version is a new document. They do contain the supersession step, which is
    /// applied only once a successor exists.
    pub fn permits_ledger_step(&self, from: DocumentState, to: DocumentState) -> bool {
        if is_supersession(from, to) {
            return true;
        }
        from != DocumentState::RevisionRequested && self.can_transition(from, to)
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

pub(crate) fn is_supersession(from: DocumentState, to: DocumentState) -> bool {
    from == DocumentState::RevisionRequested && to == DocumentState::Superseded
}
