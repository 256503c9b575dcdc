//! Read package-lock.json (lockfileVersion 2 and 3) into deduplicated packages,
//! expanding the nested lockfiles shipped by git dependencies.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::integrity::sha256_hex;
use crate::package::{is_git_scheme, LockEntry, Package};

/// Lifecycle scripts that run code at install time.
const INSTALL_SCRIPTS: [&str; 6] = [
    "postinstall",
    "build",
    "preinstall",
    "install",
    "prepack",
    "prepare",
];

const NESTED_LOCKFILE: &str = "package-lock.json";

#[derive(Deserialize)]
struct RawLockfile {
    #[serde(rename = "lockfileVersion")]
    lockfile_version: u64,
    #[serde(default)]
    packages: Map<String, Value>,
}

fn check_version(version: u64) -> Result<()> {
    match version {
        2 | 3 => Ok(()),
        other => Err(Error::UnsupportedLockVersion(other)),
    }
}

/// Usable entries in lockfile order, deduplicated by `resolved` (first wins).
///
/// Entries with an empty key, no `resolved`, or a `resolved` that does not parse
/// as an absolute URL (links, workspace paths) are skipped.
pub fn parse_entries(lockfile: &[u8]) -> Result<Vec<LockEntry>> {
    let raw: RawLockfile =
        serde_json::from_slice(lockfile).map_err(|e| Error::MalformedLockfile(e.to_string()))?;
    check_version(raw.lockfile_version)?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for (key, val) in raw.packages {
        if key.is_empty() {
            continue;
        }
        let Some(resolved) = val.get("resolved").and_then(|r| r.as_str()) else {
            continue;
        };
        let Ok(url) = Url::parse(resolved) else {
            debug!(package = %key, resolved, "skipping entry with unparseable URL");
            continue;
        };
        if !seen.insert(resolved.to_string()) {
            continue;
        }
        entries.push(LockEntry {
            name: key,
            resolved: url,
            integrity: val.get("integrity").and_then(|i| i.as_str()).map(String::from),
        });
    }
    Ok(entries)
}

/// Flags the resolver needs, and nothing else.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResolveOptions {
    /// Accept git dependencies with install scripts but no lockfile
    pub force_git_deps: bool,
    /// Allow a lockfile with zero downloadable packages
    pub force_empty_cache: bool,
    /// Leave extracted git archives on disk after exit
    pub keep_temp: bool,
}

/// Turns lockfile bytes into the full package set, recursing into git dependencies.
pub struct Resolver<'a> {
    fetcher: &'a dyn Fetcher,
    options: ResolveOptions,
}

impl<'a> Resolver<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, options: ResolveOptions) -> Self {
        Self { fetcher, options }
    }

    /// Resolve a lockfile. The result is unique by package URL.
    pub fn resolve(&self, lockfile: &[u8]) -> Result<Vec<Package>> {
        let mut active = Vec::new();
        let packages = self.resolve_nested(lockfile, self.options.force_empty_cache, &mut active)?;
        let total = packages.len();
        let packages = dedup_by_url(packages);
        info!(packages = packages.len(), duplicates = total - packages.len(), "resolved lockfile");
        Ok(packages)
    }

    /// `active` holds fingerprints of the lockfiles on the current recursion path.
    fn resolve_nested(
        &self,
        lockfile: &[u8],
        force_empty_cache: bool,
        active: &mut Vec<String>,
    ) -> Result<Vec<Package>> {
        let mut packages = parse_entries(lockfile)?
            .into_iter()
            .map(|entry| Package::from_lock_entry(entry, self.fetcher, self.options.keep_temp))
            .collect::<Result<Vec<_>>>()?;
        if packages.is_empty() && !force_empty_cache {
            return Err(Error::NoDependencies);
        }

        active.push(sha256_hex(lockfile));
        let mut nested = Vec::new();
        for pkg in packages.iter() {
            let Some(workdir) = pkg.workdir() else {
                continue;
            };
            let lock_path = workdir.join(NESTED_LOCKFILE);
            if !lock_path.is_file() {
                if !self.options.force_git_deps && declares_install_scripts(&workdir.join("package.json"))? {
                    return Err(Error::GitDepsRequireLockfile {
                        package: pkg.name.clone(),
                    });
                }
                continue;
            }

            let bytes = std::fs::read(&lock_path).map_err(|e| Error::io("reading", &lock_path, e))?;
            if active.contains(&sha256_hex(&bytes)) {
                return Err(Error::CyclicGitDependency {
                    package: pkg.name.clone(),
                });
            }
            debug!(package = %pkg.name, "resolving nested lockfile");
            nested.extend(self.resolve_nested(&bytes, true, active)?);
        }
        active.pop();

        packages.extend(nested);
        Ok(packages)
    }
}

/// Keep the first package for each URL; later duplicates are dropped (and their work dirs released).
fn dedup_by_url(packages: Vec<Package>) -> Vec<Package> {
    let mut seen = HashSet::new();
    packages
        .into_iter()
        .filter(|p| seen.insert(p.url.clone()))
        .collect()
}

/// Whether a git dependency's package.json declares any install-time script.
/// A missing package.json declares nothing.
fn declares_install_scripts(package_json: &Path) -> Result<bool> {
    if !package_json.is_file() {
        return Ok(false);
    }
    let s = std::fs::read(package_json).map_err(|e| Error::io("reading", package_json, e))?;
    let v: Value = serde_json::from_slice(&s)
        .map_err(|e| Error::MalformedLockfile(format!("{}: {}", package_json.display(), e)))?;
    let Some(scripts) = v.get("scripts").and_then(|s| s.as_object()) else {
        return Ok(false);
    };
    Ok(INSTALL_SCRIPTS.iter().any(|name| scripts.contains_key(*name)))
}

/// Drop `integrity` from git-sourced entries.
///
/// Returns the rewritten document, or `None` when nothing changed (the caller
/// must then leave the file untouched).
pub fn fixup(lockfile: &[u8]) -> Result<Option<String>> {
    let mut doc: Value =
        serde_json::from_slice(lockfile).map_err(|e| Error::MalformedLockfile(e.to_string()))?;
    let version = doc
        .get("lockfileVersion")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Error::MalformedLockfile("missing lockfileVersion".to_string()))?;
    check_version(version)?;

    let Some(packages) = doc.get_mut("packages").and_then(|p| p.as_object_mut()) else {
        return Ok(None);
    };

    let mut changed = 0usize;
    for (key, entry) in packages.iter_mut() {
        let Some(obj) = entry.as_object_mut() else {
            continue;
        };
        let git_sourced = obj
            .get("resolved")
            .and_then(|r| r.as_str())
            .and_then(|r| Url::parse(r).ok())
            .is_some_and(|u| is_git_scheme(u.scheme()));
        if !git_sourced || !obj.contains_key("integrity") {
            continue;
        }
        // Rebuild rather than remove() so the remaining keys keep their order.
        *obj = std::mem::take(obj)
            .into_iter()
            .filter(|(k, _)| k != "integrity")
            .collect();
        debug!(package = %key, "removed integrity from git dependency");
        changed += 1;
    }

    if changed == 0 {
        return Ok(None);
    }
    info!(entries = changed, "fixed up lockfile");
    let mut out = serde_json::to_string_pretty(&doc).map_err(|e| Error::MalformedLockfile(e.to_string()))?;
    out.push('\n');
    Ok(Some(out))
}
