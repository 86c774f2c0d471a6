use anyhow::Result;
use std::io::Write;
use std::path::{Path, PathBuf};

use groundlink_protocol::{
    hash::{hash_leaf, merkle_proof, merkle_root},
    EventRecord,
};

/// Append-only CBOR journal of committed ledger events.
///
/// Each entry is length-prefixed (4-byte LE u32) followed by the CBOR
/// encoding of one [`EventRecord`]. Entries are buffered in memory and
/// appended to `groundlink-journal-{run}.cbor` on [`flush`](Self::flush).
///
/// Leaf hash for each entry = keccak256(0x00 || CBOR bytes); the Merkle root
/// over all leaves of the run is an audit commitment to the event history.
pub struct Journal {
    path:        Option<PathBuf>,
    leaf_hashes: Vec<[u8; 32]>,
    buffer:      Vec<u8>,
}

impl Journal {
    /// In-memory journal: hashes are kept, nothing is written.
    pub fn in_memory() -> Self {
        Self { path: None, leaf_hashes: Vec::new(), buffer: Vec::new() }
    }

    /// Journal persisted under `dir`, one file per process run.
    pub fn open(dir: &Path, run: u64) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path:        Some(run_path(dir, run)),
            leaf_hashes: Vec::new(),
            buffer:      Vec::new(),
        })
    }

    /// Encode a committed record. Returns its leaf hash.
    pub fn append(&mut self, record: &EventRecord) -> Result<[u8; 32]> {
        let mut cbor = Vec::new();
        ciborium::into_writer(record, &mut cbor)?;
        let leaf = hash_leaf(&cbor);

        let len = u32::try_from(cbor.len())?.to_le_bytes();
        self.buffer.extend_from_slice(&len);
        self.buffer.extend_from_slice(&cbor);
        self.leaf_hashes.push(leaf);
        Ok(leaf)
    }

    /// Write buffered entries to disk.
    pub fn flush(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            self.buffer.clear();
            return Ok(());
        };
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.leaf_hashes.len()
    }

    pub fn root(&self) -> [u8; 32] {
        merkle_root(&self.leaf_hashes)
    }

    /// Leaf hash and inclusion proof for the entry with sequence number `seq`.
    pub fn proof(&self, seq: u64) -> Option<([u8; 32], Vec<[u8; 32]>)> {
        let index = usize::try_from(seq.checked_sub(1)?).ok()?;
        let leaf = *self.leaf_hashes.get(index)?;
        Some((leaf, merkle_proof(&self.leaf_hashes, index)?))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Decode every entry of a journal file.
    pub fn read_entries(path: &Path) -> Result<Vec<EventRecord>> {
        let data = std::fs::read(path)?;
        let mut entries = Vec::new();
        let mut pos = 0;
        while pos + 4 <= data.len() {
            let mut len = [0u8; 4];
            len.copy_from_slice(&data[pos..pos + 4]);
            let len = u32::from_le_bytes(len) as usize;
            pos += 4;
            if pos + len > data.len() {
                anyhow::bail!("truncated journal entry at byte {}", pos - 4);
            }
            entries.push(ciborium::from_reader(&data[pos..pos + len])?);
            pos += len;
        }
        Ok(entries)
    }
}

fn run_path(dir: &Path, run: u64) -> PathBuf {
    dir.join(format!("groundlink-journal-{run}.cbor"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundlink_protocol::{hash::verify_merkle_proof, CancelReason, LedgerEvent, TokenId};

    fn record(seq: u64) -> EventRecord {
        EventRecord {
            seq,
            at: 1_800_000_000 + seq,
            event: LedgerEvent::PassCancelled {
                pass_id: seq,
                reason:  CancelReason::AttestationTimeout,
                // Larger than u64 to exercise CBOR bignum handling.
                refund:  u128::from(u64::MAX) * 3,
            },
        }
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("groundlink-journal-test-{}", rand::random::<u64>()))
    }

    #[test]
    fn entries_round_trip_through_the_file() {
        let dir = temp_dir();
        let mut journal = Journal::open(&dir, 7).unwrap();
        journal.append(&record(1)).unwrap();
        journal.flush().unwrap();
        journal
            .append(&EventRecord {
                seq:   2,
                at:    1_800_000_002,
                event: LedgerEvent::Deposited {
                    token:  TokenId::new("usdc"),
                    to:     groundlink_protocol::Address::TREASURY,
                    amount: 5,
                },
            })
            .unwrap();
        journal.flush().unwrap();

        let entries = Journal::read_entries(journal.path().unwrap()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], record(1));
        assert_eq!(entries[1].seq, 2);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn proofs_verify_against_the_root() {
        let mut journal = Journal::in_memory();
        for seq in 1..=5 {
            journal.append(&record(seq)).unwrap();
        }
        let root = journal.root();
        for seq in 1..=5 {
            let (leaf, proof) = journal.proof(seq).unwrap();
            assert!(verify_merkle_proof(leaf, &proof, (seq - 1) as usize, root));
        }
        assert!(journal.proof(0).is_none());
        assert!(journal.proof(6).is_none());
    }

    #[test]
    fn empty_journal_has_zero_root() {
        assert_eq!(Journal::in_memory().root(), [0u8; 32]);
    }
}
