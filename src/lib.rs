//! Lifecycle authority for transaction statements exchanged between two parties.
//!
//! [`engine::TransitionEngine`] applies the fixed state protocol and emits one
//! [`audit::DocumentStateLog`] per transition. [`canonical`] and [`content`] produce the
//! content fingerprint stored at creation. [`service::LifecycleService`] wires both to a
//! [`store::DocumentStore`], which commits each transition with its ledger row atomically.

pub mod audit;
pub mod canonical;
pub mod config;
pub mod content;
pub mod document;
pub mod engine;
pub mod error;
pub mod service;
pub mod state;
pub mod store;
pub mod types;
pub mod utils;

pub use error::{ErrorKind, LifecycleError, ValidationError};
pub use state::DocumentState;
