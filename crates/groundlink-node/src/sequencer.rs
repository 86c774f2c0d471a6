//! The single global sequencer.
//!
//! All requests and keeper actions go through one lock around the ledger, so
//! operations are applied one at a time in arrival order. After each
//! operation the newly committed events are appended to the journal.

use tokio::sync::Mutex;

use groundlink_ledger::Ledger;
use groundlink_protocol::{LedgerResult, Timestamp};

use crate::journal::Journal;

struct Inner {
    ledger:    Ledger,
    journal:   Journal,
    /// Highest event sequence number already journaled.
    journaled: u64,
}

pub struct Sequencer {
    inner: Mutex<Inner>,
}

impl Sequencer {
    pub fn new(ledger: Ledger, journal: Journal) -> Self {
        let mut inner = Inner { ledger, journal, journaled: 0 };
        // Genesis events.
        inner.sync_journal();
        Self { inner: Mutex::new(inner) }
    }

    /// Run a mutating operation and journal whatever it committed.
    pub async fn apply<T>(&self, op: impl FnOnce(&mut Ledger) -> LedgerResult<T>) -> LedgerResult<T> {
        let mut inner = self.inner.lock().await;
        let result = op(&mut inner.ledger);
        inner.sync_journal();
        result
    }

    pub async fn read<T>(&self, view: impl FnOnce(&Ledger) -> T) -> T {
        let inner = self.inner.lock().await;
        view(&inner.ledger)
    }

    pub async fn journal<T>(&self, view: impl FnOnce(&Journal) -> T) -> T {
        let inner = self.inner.lock().await;
        view(&inner.journal)
    }
}

impl Inner {
    fn sync_journal(&mut self) {
        let Self { ledger, journal, journaled } = self;
        for record in ledger.events_since(*journaled) {
            if let Err(e) = journal.append(record) {
                tracing::warn!(seq = record.seq, "journal append failed: {e}");
                break;
            }
            *journaled = record.seq;
        }
        if let Err(e) = journal.flush() {
            tracing::warn!("journal flush failed: {e}");
        }
    }
}

/// Host wall clock in seconds; the authoritative ledger clock.
pub fn now_secs() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
