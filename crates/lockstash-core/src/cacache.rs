//! npm-compatible content-addressable cache (`content-v2` + `index-v5`).
//!
//! Layout:
//! ```text
//! <root>/content-v2/<algo>/<hex[0:2]>/<hex[2:4]>/<hex[4:]>   symlink to the artifact
//! <root>/index-v5/<sha256(key)[0:2]>/<[2:4]>/<[4:]>         "<sha1(json)>\t<json>"
//! ```
//! Artifacts are never copied: content entries are symlinks to the downloaded files.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::integrity::{sha1_hex, sha256_hex, Integrity};

const CONTENT_DIR: &str = "content-v2";
const INDEX_DIR: &str = "index-v5";

/// Cache key npm's fetcher uses for a tarball request.
pub fn request_cache_key(url: &str) -> String {
    format!("make-fetch-happen:request-cache:{}", url)
}

/// Split a hex digest into `<2>/<2>/<rest>`.
fn shard(hex: &str) -> PathBuf {
    [&hex[0..2], &hex[2..4], &hex[4..]].iter().collect()
}

/// Relative content path for a digest: `content-v2/<algo>/<hex[0:2]>/<hex[2:4]>/<hex[4:]>`.
///
/// `hex` must be at least 4 ASCII hex characters.
pub fn content_path(algorithm: &str, hex: &str) -> PathBuf {
    Path::new(CONTENT_DIR).join(algorithm).join(shard(hex))
}

/// Relative index path for a cache key.
pub fn index_path(key: &str) -> PathBuf {
    Path::new(INDEX_DIR).join(shard(&sha256_hex(key.as_bytes())))
}

#[derive(Serialize)]
struct CacheOptions {
    compress: bool,
}

#[derive(Serialize)]
struct CacheMetadata<'a> {
    url: &'a str,
    options: CacheOptions,
}

/// One index record. Field order is the serialized order and must not change.
#[derive(Serialize)]
struct CacheEntry<'a> {
    key: &'a str,
    integrity: &'a str,
    time: u64,
    size: u64,
    metadata: CacheMetadata<'a>,
}

/// Builder for a fresh cache directory.
#[derive(Debug)]
pub struct CacheBuilder {
    root: PathBuf,
}

impl CacheBuilder {
    /// Fail unless `root` is missing or an empty directory. Creates nothing.
    pub fn ensure_empty(root: &Path) -> Result<()> {
        if root.exists() {
            let mut entries = std::fs::read_dir(root).map_err(|e| Error::io("reading", root, e))?;
            if entries.next().is_some() {
                return Err(Error::DirectoryNotEmpty(root.to_path_buf()));
            }
        }
        Ok(())
    }

    /// Create the cache at `root`. The directory must be missing or empty.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        Self::ensure_empty(&root)?;
        for sub in [CONTENT_DIR, INDEX_DIR] {
            let dir = root.join(sub);
            std::fs::create_dir_all(&dir).map_err(|e| Error::io("creating", &dir, e))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register `file` under `key`.
    ///
    /// Without an integrity string the file is streamed through sha512. Writes one
    /// content symlink and one index file; a repeated key replaces its index entry.
    pub fn put(&self, key: &str, url: &str, file: &Path, integrity: Option<&str>) -> Result<()> {
        let (integrity, size) = match integrity {
            Some(sri) => {
                let parsed = Integrity::parse(key, sri)?;
                let size = std::fs::metadata(file)
                    .map_err(|e| Error::io("reading", file, e))?
                    .len();
                (parsed, size)
            }
            None => {
                let f = File::open(file).map_err(|e| Error::io("opening", file, e))?;
                Integrity::sha512_of_reader(f).map_err(|e| Error::io("reading", file, e))?
            }
        };

        let content = self.root.join(content_path(integrity.algorithm.name(), &integrity.hex()));
        make_parent(&content)?;
        symlink_file(file, &content)?;

        let sri = integrity.to_sri();
        let entry = CacheEntry {
            key,
            integrity: &sri,
            time: 0,
            size,
            metadata: CacheMetadata {
                url,
                options: CacheOptions { compress: true },
            },
        };
        let index = self.root.join(index_path(key));
        let json = serde_json::to_string(&entry)
            .map_err(|e| Error::io("serializing", &index, std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let line = format!("{}\t{}", sha1_hex(json.as_bytes()), json);

        make_parent(&index)?;
        std::fs::write(&index, line).map_err(|e| Error::io("writing", &index, e))?;
        debug!(key, integrity = %sri, size, "cached");
        Ok(())
    }
}

fn make_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => std::fs::create_dir_all(parent).map_err(|e| Error::io("creating", parent, e)),
        None => Ok(()),
    }
}

/// Point `link` at `target`, replacing an existing link.
fn symlink_file(target: &Path, link: &Path) -> Result<()> {
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(link).map_err(|e| Error::io("removing", link, e))?;
    }
    #[cfg(unix)]
    let res = std::os::unix::fs::symlink(target, link);
    #[cfg(windows)]
    let res = std::os::windows::fs::symlink_file(target, link);
    res.map_err(|source| Error::Symlink {
        path: link.to_path_buf(),
        source,
    })
}
