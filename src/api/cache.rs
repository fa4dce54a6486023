//! On-disk response cache
//!
//! Each successful upstream response is stored verbatim as
//! `<fingerprint>.json`, where the fingerprint is a SHA-256 over the endpoint
//! and its sorted parameters. Entry age is the file's modification time.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// File-per-request cache of raw response bodies
#[derive(Debug, Clone)]
pub struct ResponseCache {
    directory: PathBuf,
}

impl ResponseCache {
    /// Opens the cache, creating its directory if needed
    pub fn new(directory: impl Into<PathBuf>) -> io::Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    /// Directory the cache files live in
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Computes the deterministic fingerprint of a request
    ///
    /// Parameters are sorted by name first, so the same query always lands
    /// on the same file regardless of construction order.
    pub fn fingerprint(endpoint: &str, params: &[(&str, String)]) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort();

        let canonical = sorted
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(endpoint.as_bytes());
        hasher.update(b"?");
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn path_for(&self, fingerprint: &str) -> PathBuf {
        self.directory.join(format!("{}.json", fingerprint))
    }

    /// Reads a cached body
    ///
    /// With a `ttl`, an entry older than it is deleted and reported as a
    /// miss. Without one, entries never expire.
    pub fn read(&self, fingerprint: &str, ttl: Option<Duration>) -> io::Result<Option<String>> {
        let path = self.path_for(fingerprint);

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        if let Some(ttl) = ttl {
            let age = SystemTime::now()
                .duration_since(metadata.modified()?)
                .unwrap_or_default();

            if age > ttl {
                tracing::debug!("Cache entry {} expired ({:?} old)", fingerprint, age);
                self.evict(fingerprint)?;
                return Ok(None);
            }
        }

        match fs::read_to_string(&path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Stores a body, replacing any previous entry
    pub fn write(&self, fingerprint: &str, body: &str) -> io::Result<()> {
        let path = self.path_for(fingerprint);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)
    }

    /// Removes an entry; a missing entry is not an error
    pub fn evict(&self, fingerprint: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(fingerprint)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Checks whether an entry exists, regardless of age
    pub fn contains(&self, fingerprint: &str) -> bool {
        self.path_for(fingerprint).is_file()
    }
}
