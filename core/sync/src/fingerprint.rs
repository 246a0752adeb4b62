//! Content fingerprints used to decide whether two copies of a file differ.

use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Size of the read buffer used while hashing.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A 128-bit BLAKE2b digest of a file's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 16]);

impl ContentDigest {
    /// Hash arbitrary bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Blake2b::<U16>::new();
        hasher.update(data);
        Self::from_hasher(hasher)
    }

    /// Hash everything a reader yields, `CHUNK_SIZE` bytes at a time.
    pub fn from_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Blake2b::<U16>::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..read]);
        }

        Ok(Self::from_hasher(hasher))
    }

    fn from_hasher(hasher: Blake2b<U16>) -> Self {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    /// Convert to a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fingerprint of a file as observed at one moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fingerprint {
    /// The file was read completely.
    Digest(ContentDigest),
    /// Nothing exists at the path.
    Absent,
    /// Something exists but could not be read.
    Unreadable,
}

impl Fingerprint {
    /// Fingerprint the file at `path`.
    ///
    /// Never fails: a missing file is [`Fingerprint::Absent`], any other read
    /// error is [`Fingerprint::Unreadable`].
    pub fn of_file(path: &Path) -> Self {
        let result = File::open(path).and_then(ContentDigest::from_reader);
        match result {
            Ok(digest) => Fingerprint::Digest(digest),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Fingerprint::Absent,
            Err(e) => {
                debug!("Cannot fingerprint {}: {}", path.display(), e);
                Fingerprint::Unreadable
            }
        }
    }

    /// Whether both sides are known to hold identical content.
    ///
    /// `Unreadable` never matches, not even itself.
    pub fn matches(&self, other: &Fingerprint) -> bool {
        match (self, other) {
            (Fingerprint::Digest(a), Fingerprint::Digest(b)) => a == b,
            _ => false,
        }
    }
}

/// What a file comparison asks the reconciler to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDecision {
    /// The replica has no copy yet.
    Create,
    /// The replica copy differs, or could not be compared.
    Update,
    /// The replica copy is identical.
    NoChange,
}

impl ChangeDecision {
    /// Decide from the fingerprints of the source file and its replica counterpart.
    pub fn decide(source: &Fingerprint, replica: &Fingerprint) -> Self {
        if *replica == Fingerprint::Absent {
            ChangeDecision::Create
        } else if source.matches(replica) {
            ChangeDecision::NoChange
        } else {
            ChangeDecision::Update
        }
    }
}
