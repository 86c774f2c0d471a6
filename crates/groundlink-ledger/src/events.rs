use groundlink_protocol::{EventRecord, LedgerEvent, Timestamp};

/// Events staged by an operation that has not committed yet.
#[derive(Debug, Default)]
pub struct Outbox {
    events: Vec<LedgerEvent>,
}

impl Outbox {
    pub fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Ordered, append-only log of committed events.
#[derive(Debug, Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every staged event under one commit timestamp.
    pub(crate) fn commit(&mut self, at: Timestamp, outbox: Outbox) {
        for event in outbox.events {
            let seq = self.records.len() as u64 + 1;
            self.records.push(EventRecord { seq, at, event });
        }
    }

    /// Records with `seq > after`, oldest first.
    pub fn since(&self, after: u64) -> &[EventRecord] {
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(self.records.len());
        &self.records[start..]
    }

    pub fn last_seq(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbox(ids: &[u64]) -> Outbox {
        let mut out = Outbox::default();
        for id in ids {
            out.emit(LedgerEvent::PassConfirmed { pass_id: *id });
        }
        out
    }

    #[test]
    fn sequence_numbers_start_at_one_and_increase() {
        let mut log = EventLog::new();
        log.commit(10, outbox(&[1, 2]));
        log.commit(20, outbox(&[3]));

        let seqs: Vec<u64> = log.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(log.since(0).len(), 3);
        assert_eq!(log.since(2)[0].at, 20);
        assert!(log.since(3).is_empty());
        assert!(log.since(99).is_empty());
        assert_eq!(log.last_seq(), 3);
    }
}
