//! Walkthrough of the audited event store.
//!
//! Usage: `revlog_cli [db-path] [log-dir]`
//!
//! Persists two events, lists them, reschedules the first one and prints
//! its state at revision 1 next to its current state. Without `db-path`
//! the run uses an in-memory database.

use revlog_core::{
    default_log_level, init_logging, EventListQuery, EventPatch, NewEvent, RepoError, Store,
    StoreConfig,
};
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

const RESCHEDULE_SUFFIX: &str = " (rescheduled)";
const ONE_DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => StoreConfig::file(path),
        None => StoreConfig::in_memory(),
    };
    if let Some(log_dir) = args.next() {
        if let Err(err) = init_logging(default_log_level(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("revlog_cli failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &StoreConfig) -> Result<(), RepoError> {
    let mut store = Store::open(config)?;
    let now = now_epoch_ms();

    let first_id = store.in_transaction(|tx| {
        let first = tx.create(&NewEvent::new("Our very first event!", now))?;
        tx.create(&NewEvent::new("A follow up event", now))?;
        Ok::<_, RepoError>(first)
    })?;

    let events = store.in_transaction(|tx| tx.list(&EventListQuery::default()))?;
    println!("events:");
    for event in &events {
        println!("  #{} {} @ {}", event.id, event.title, event.date);
    }

    store.in_transaction(|tx| {
        let event = tx.read(first_id)?;
        let patch = EventPatch::title(format!("{}{RESCHEDULE_SUFFIX}", event.title))
            .with_date(event.date + ONE_DAY_MS);
        tx.update(first_id, &patch)
    })?;

    let reader = store.audit_reader();
    let revisions = reader.revisions_of(first_id)?;
    println!("revisions of #{first_id}: {revisions:?}");
    if let Some(&oldest) = revisions.first() {
        let original = reader.find_as_of(first_id, oldest)?;
        println!("  at revision {oldest}: {} @ {}", original.title, original.date);
    }
    if let Some(&newest) = revisions.last() {
        let current = reader.find_as_of(first_id, newest)?;
        println!("  at revision {newest}: {} @ {}", current.title, current.date);
    }

    store.close()
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
