//! Walks one statement through a revision cycle and prints its ledger.
//!
//! Run with `cargo run --example lifecycle [config.toml]`. Without a config the
//! database lives in a temp dir. Set `RUST_LOG=debug` to see storage commits.
use anyhow::Context;
use statement_lifecycle::{
    DocumentState,
    config::LedgerConfig,
    document::{NewDocument, NewItem},
    service::LifecycleService,
    store::SledStore,
};
use tracing_subscriber::EnvFilter;

fn statement(bolt_price: &str) -> anyhow::Result<NewDocument> {
    Ok(NewDocument::new()
        .set_from_company("company_acme")
        .set_to_company("company_globex")
        .add_item(
            NewItem::new("steel plate", "4".parse()?, "12500".parse()?)
                .set_option("4 x 8")
                .add_spec("두께", " 1.2T ")
                .add_spec("재질", "SS400")
                .add_spec("도장", ""),
        )
        .add_item(NewItem::new("bolt", "100".parse()?, bolt_price.parse()?)))
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let temp_dir = tempfile::tempdir()?;
    let config = match std::env::args().nth(1) {
        Some(path) => LedgerConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => LedgerConfig::default().with_storage_path(temp_dir.path().join("statements.db")),
    };

    let store = SledStore::open(&config.storage).context("opening store")?;
    let service = LifecycleService::from_config(store, &config);

    let draft = service.create_document(statement("0.35")?, "user_alice")?;
    let id = draft.document_id().to_string();
    println!("created {} ({})", id, draft.content_hash());

    service.transition(&id, DocumentState::Sent, "user_alice", None)?;
    service.transition(&id, DocumentState::Received, "user_bob", None)?;

    // an illegal request comes back as a report, not a panic
    let outcome = service.request_transition(&id, DocumentState::Draft, "user_bob", None);
    println!(
        "reopen attempt: success={} kind={:?} message={}",
        outcome.success,
        outcome.error_kind,
        outcome.message.unwrap_or_default()
    );

    service.transition(
        &id,
        DocumentState::RevisionRequested,
        "user_bob",
        Some("bolt price should be 0.30"),
    )?;
    let revision = service.revise(&id, statement("0.30")?, "user_alice")?;
    let next_id = revision.successor.document_id().to_string();

    service.transition(&next_id, DocumentState::Sent, "user_alice", None)?;
    service.transition(&next_id, DocumentState::Received, "user_bob", None)?;
    service.transition(&next_id, DocumentState::Confirmed, "user_bob", None)?;

    for document in service.version_chain(&next_id)? {
        println!(
            "v{} {} {} total={} hash_ok={}",
            document.version_number(),
            document.document_id(),
            document.state(),
            document.total_amount(),
            service.verify_content_hash(document.document_id())?.is_match()
        );
        for record in service.audit_trail(document.document_id())?.records() {
            let entry = &record.entry;
            println!(
                "  #{} {} -> {} by {}{}",
                record.sequence,
                entry.from_state,
                entry.to_state,
                entry.changed_by,
                entry
                    .reason
                    .as_deref()
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default()
            );
        }
        service.verify_audit_trail(document.document_id())?;
    }

    Ok(())
}
