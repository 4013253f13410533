use serde::{Deserialize, Serialize};
use tel_crypto::ChainHasher;
use tel_store::{EntryRange, LedgerStore};
use tel_types::{ChainState, Digest, LedgerEntry, GENESIS};
use tracing::{info, warn};

use crate::error::LedgerResult;

/// Kind of inconsistency found by the verifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Stored `entry_hash` differs from the recomputed hash.
    HashMismatch,
    /// The sequence number is not the one that should come next.
    SequenceGap,
    /// Stored `previous_hash` does not match the predecessor.
    BrokenLink,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::HashMismatch => "hash_mismatch",
            Self::SequenceGap => "sequence_gap",
            Self::BrokenLink => "broken_link",
        })
    }
}

/// One inconsistent position in the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub sequence_number: u64,
    #[serde(rename = "anomaly_kind")]
    pub kind: AnomalyKind,
    pub expected: String,
    pub actual: String,
}

/// Outcome of one verification pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub entries_checked: u64,
    pub is_valid: bool,
    pub anomalies: Vec<Anomaly>,
    /// First sequence number the pass started from.
    pub from_sequence: u64,
    /// Last verified position; feed it to the next incremental pass.
    /// An incremental pass that examined nothing carries its anchor
    /// forward. `None` only for a full pass over an empty ledger.
    pub checkpoint: Option<ChainState>,
}

impl VerificationResult {
    /// Anomalies reported at `sequence`.
    pub fn anomalies_at(&self, sequence: u64) -> impl Iterator<Item = &Anomaly> {
        self.anomalies
            .iter()
            .filter(move |a| a.sequence_number == sequence)
    }
}

/// Replays stored entries through the chain hasher.
///
/// Every check compares against *stored* neighbor values, so a single
/// corrupted entry is reported at its own position and does not cascade.
/// Positions are the store's keys; an entry whose own `sequence_number`
/// disagrees with its key is reported as a sequence gap at that key.
/// The pass is bounded by the tail observed when it starts; entries
/// appended meanwhile are left for the next incremental pass.
pub struct Verifier<'a, S: LedgerStore + ?Sized> {
    store: &'a S,
    page_size: usize,
}

impl<'a, S: LedgerStore + ?Sized> Verifier<'a, S> {
    pub fn new(store: &'a S, page_size: usize) -> Self {
        Self { store, page_size }
    }

    /// Verify the whole chain from sequence 0.
    pub fn full_verify(&self) -> LedgerResult<VerificationResult> {
        self.run(0, GENESIS)
    }

    /// Verify from a checkpoint: `from_sequence` is the first unverified
    /// entry and `known_good_previous_hash` the hash it must link to.
    pub fn incremental_verify(
        &self,
        from_sequence: u64,
        known_good_previous_hash: Digest,
    ) -> LedgerResult<VerificationResult> {
        self.run(from_sequence, known_good_previous_hash)
    }

    fn run(&self, from: u64, anchor: Digest) -> LedgerResult<VerificationResult> {
        let end = match self.store.get_tail()? {
            Some(tail) => tail.next_sequence().max(from),
            None => from,
        };

        let mut walk = ChainWalk::new(from, anchor);
        for item in EntryRange::new(self.store, from, end, self.page_size).keyed() {
            let (position, entry) = item?;
            walk.check(position, &entry)?;
        }

        let result = walk.finish(from);
        for anomaly in &result.anomalies {
            warn!(
                sequence = anomaly.sequence_number,
                kind = %anomaly.kind,
                expected = %anomaly.expected,
                actual = %anomaly.actual,
                "chain anomaly"
            );
        }
        info!(
            from,
            entries_checked = result.entries_checked,
            anomalies = result.anomalies.len(),
            valid = result.is_valid,
            "verification complete"
        );
        Ok(result)
    }
}

/// Per-pass state: the predecessor's stored and recomputed hashes.
struct ChainWalk {
    expected_sequence: u64,
    anchor: Digest,
    predecessor: Option<(Digest, Digest)>,
    checked: u64,
    anomalies: Vec<Anomaly>,
    checkpoint: Option<ChainState>,
}

impl ChainWalk {
    fn new(from: u64, anchor: Digest) -> Self {
        let checkpoint = from.checked_sub(1).map(|last| ChainState {
            latest_sequence_number: last,
            latest_hash: anchor,
        });
        Self {
            expected_sequence: from,
            anchor,
            predecessor: None,
            checked: 0,
            anomalies: Vec::new(),
            checkpoint,
        }
    }

    fn check(&mut self, sequence: u64, entry: &LedgerEntry) -> LedgerResult<()> {
        self.checked += 1;

        if sequence != self.expected_sequence {
            self.flag(
                sequence,
                AnomalyKind::SequenceGap,
                self.expected_sequence.to_string(),
                sequence.to_string(),
            );
        }
        // Moved or renumbered in place: stored at one position, claiming another.
        if entry.sequence_number != sequence {
            self.flag(
                sequence,
                AnomalyKind::SequenceGap,
                sequence.to_string(),
                entry.sequence_number.to_string(),
            );
        }

        // The link holds if it matches what the predecessor stores or what
        // it should store. Otherwise one overwritten `entry_hash` would also
        // flag its honest successor.
        let recomputed = ChainHasher::entry_hash(entry)?;
        let (linked, expected_link) = match self.predecessor {
            None => (entry.previous_hash == self.anchor, self.anchor),
            Some((stored, recomputed_prev)) => (
                entry.previous_hash == stored || entry.previous_hash == recomputed_prev,
                stored,
            ),
        };
        if !linked {
            self.flag(
                sequence,
                AnomalyKind::BrokenLink,
                expected_link.to_hex(),
                entry.previous_hash.to_hex(),
            );
        }

        if recomputed != entry.entry_hash {
            self.flag(
                sequence,
                AnomalyKind::HashMismatch,
                recomputed.to_hex(),
                entry.entry_hash.to_hex(),
            );
        }

        self.predecessor = Some((entry.entry_hash, recomputed));
        // Resync so a hole is reported once, not at every later entry.
        self.expected_sequence = sequence.saturating_add(1);
        self.checkpoint = Some(ChainState {
            latest_sequence_number: sequence,
            latest_hash: entry.entry_hash,
        });
        Ok(())
    }

    fn flag(&mut self, sequence_number: u64, kind: AnomalyKind, expected: String, actual: String) {
        self.anomalies.push(Anomaly {
            sequence_number,
            kind,
            expected,
            actual,
        });
    }

    fn finish(self, from_sequence: u64) -> VerificationResult {
        VerificationResult {
            entries_checked: self.checked,
            is_valid: self.anomalies.is_empty(),
            anomalies: self.anomalies,
            from_sequence,
            checkpoint: self.checkpoint,
        }
    }
}
