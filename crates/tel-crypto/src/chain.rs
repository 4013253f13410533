use tel_types::{Digest, LedgerEntry};

use crate::canonical::{CanonicalBytes, CanonicalError};

/// The chain hash function.
///
/// `digest = BLAKE3(previous_hash || canonical_bytes)`. The previous hash
/// goes first so an entry is bound to its predecessor and cannot be
/// reordered without changing its own digest.
pub struct ChainHasher;

impl ChainHasher {
    /// Compute the digest of canonical entry bytes linked to `previous_hash`.
    pub fn compute_hash(canonical: &CanonicalBytes, previous_hash: &Digest) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(previous_hash.as_bytes());
        hasher.update(canonical.as_bytes());
        Digest::from_bytes(*hasher.finalize().as_bytes())
    }

    /// Hash an entry from its own fields and its *stored* `previous_hash`.
    ///
    /// The stored `entry_hash` is ignored. This is the path used both when
    /// sealing a new entry and when verifying a persisted one.
    pub fn entry_hash(entry: &LedgerEntry) -> Result<Digest, CanonicalError> {
        let canonical = CanonicalBytes::of_entry(entry)?;
        Ok(Self::compute_hash(&canonical, &entry.previous_hash))
    }

    /// Fill in `entry_hash` from the entry's other fields.
    pub fn seal(mut entry: LedgerEntry) -> Result<LedgerEntry, CanonicalError> {
        entry.entry_hash = Self::entry_hash(&entry)?;
        Ok(entry)
    }

    /// Returns `true` if the stored `entry_hash` matches a recomputation.
    pub fn verify(entry: &LedgerEntry) -> Result<bool, CanonicalError> {
        Ok(Self::entry_hash(entry)? == entry.entry_hash)
    }
}
