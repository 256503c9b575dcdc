//! Match the download directory against the resolved package set.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::package::Package;

/// Result of comparing a directory with a package list.
#[derive(Debug)]
pub struct Reconciliation<'a> {
    /// Packages whose artifact file already exists
    pub found: Vec<&'a Package>,
    /// Packages that still need downloading
    pub not_found: Vec<&'a Package>,
    /// Regular files matching no package, sorted by path
    orphans: Vec<PathBuf>,
}

/// Partition `packages` by whether `<dir>/<filename>` exists, and collect orphans.
///
/// A missing directory means nothing is found and nothing is orphaned.
/// Subdirectories are never considered orphans.
pub fn reconcile<'a>(dir: &Path, packages: &'a [Package]) -> Result<Reconciliation<'a>> {
    let (found, not_found): (Vec<&Package>, Vec<&Package>) =
        packages.iter().partition(|p| dir.join(&p.filename).is_file());

    let mut orphans = Vec::new();
    if dir.is_dir() {
        let known: HashSet<&str> = packages.iter().map(|p| p.filename.as_str()).collect();
        let entries = std::fs::read_dir(dir).map_err(|e| Error::io("reading", dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io("reading", dir, e))?;
            let file_type = entry.file_type().map_err(|e| Error::io("reading", entry.path(), e))?;
            if file_type.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if !known.contains(name.to_string_lossy().as_ref()) {
                orphans.push(entry.path());
            }
        }
        orphans.sort();
    }

    debug!(
        found = found.len(),
        missing = not_found.len(),
        orphans = orphans.len(),
        dir = %dir.display(),
        "reconciled download directory"
    );
    Ok(Reconciliation {
        found,
        not_found,
        orphans,
    })
}

impl<'a> Reconciliation<'a> {
    pub fn orphans(&self) -> &[PathBuf] {
        &self.orphans
    }

    /// Delete every orphan, asking `confirm` first unless `unconditional` is set.
    ///
    /// The orphan set is drained exactly once. Declining fails with
    /// `ReconciliationAborted`; any file that cannot be removed is fatal.
    pub fn prune_orphans<F>(&mut self, unconditional: bool, confirm: F) -> Result<usize>
    where
        F: FnOnce(&[PathBuf]) -> Result<bool>,
    {
        if self.orphans.is_empty() {
            return Ok(0);
        }
        if !unconditional && !confirm(&self.orphans)? {
            return Err(Error::ReconciliationAborted(self.orphans.len()));
        }
        let orphans = std::mem::take(&mut self.orphans);
        for path in &orphans {
            std::fs::remove_file(path).map_err(|source| Error::OrphanNotDeleted {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), "removed stale file");
        }
        info!(removed = orphans.len(), "pruned stale files");
        Ok(orphans.len())
    }

    /// Move a found package back to the download set (its file failed verification).
    pub fn requeue(&mut self, pkg: &'a Package) {
        self.found.retain(|p| !std::ptr::eq(*p, pkg));
        self.not_found.push(pkg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageKind;

    fn pkg(filename: &str) -> Package {
        Package {
            name: format!("node_modules/{}", filename),
            url: format!("https://registry.npmjs.org/{}", filename),
            filename: filename.to_string(),
            kind: PackageKind::Registry {
                integrity: "sha512-AAAA".to_string(),
            },
        }
    }

    fn names(list: &[&Package]) -> Vec<String> {
        list.iter().map(|p| p.filename.clone()).collect()
    }

    #[test]
    fn missing_directory_means_everything_is_missing() {
        let td = tempfile::tempdir().unwrap();
        let packages = vec![pkg("a-1.0.0.tgz")];
        let rec = reconcile(&td.path().join("nope"), &packages).unwrap();
        assert!(rec.found.is_empty());
        assert_eq!(rec.not_found.len(), 1);
        assert!(rec.orphans().is_empty());
    }

    #[test]
    fn partitions_and_collects_orphans() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(td.path().join("a-1.0.0.tgz"), b"a").unwrap();
        std::fs::write(td.path().join("old-0.1.0.tgz"), b"old").unwrap();
        std::fs::create_dir(td.path().join("subdir")).unwrap();

        let packages = vec![pkg("a-1.0.0.tgz"), pkg("b-1.0.0.tgz")];
        let rec = reconcile(td.path(), &packages).unwrap();
        assert_eq!(names(&rec.found), ["a-1.0.0.tgz"]);
        assert_eq!(names(&rec.not_found), ["b-1.0.0.tgz"]);
        assert_eq!(rec.orphans(), [td.path().join("old-0.1.0.tgz")]);
    }

    #[test]
    fn declining_the_prompt_aborts_and_keeps_files() {
        let td = tempfile::tempdir().unwrap();
        let stale = td.path().join("stale.tgz");
        std::fs::write(&stale, b"x").unwrap();

        let packages: Vec<Package> = Vec::new();
        let mut rec = reconcile(td.path(), &packages).unwrap();
        let err = rec.prune_orphans(false, |_| Ok(false)).unwrap_err();
        assert!(matches!(err, Error::ReconciliationAborted(1)));
        assert_eq!(err.exit_code(), 50);
        assert!(stale.exists());
    }

    #[test]
    fn accepted_orphans_are_removed_once() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(td.path().join("one.tgz"), b"1").unwrap();
        std::fs::write(td.path().join("two.tgz"), b"2").unwrap();

        let packages: Vec<Package> = Vec::new();
        let mut rec = reconcile(td.path(), &packages).unwrap();
        let mut asked = Vec::new();
        let removed = rec
            .prune_orphans(false, |files| {
                asked.extend(files.iter().cloned());
                Ok(true)
            })
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(asked.len(), 2);
        assert!(std::fs::read_dir(td.path()).unwrap().next().is_none());

        // Drained: a second call neither prompts nor removes anything.
        let again = rec.prune_orphans(false, |_| panic!("prompted twice")).unwrap();
        assert_eq!(again, 0);
    }

    #[test]
    fn unconditional_prune_skips_the_prompt() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(td.path().join("stale.tgz"), b"x").unwrap();
        let packages: Vec<Package> = Vec::new();
        let mut rec = reconcile(td.path(), &packages).unwrap();
        let removed = rec.prune_orphans(true, |_| panic!("should not prompt")).unwrap();
        assert_eq!(removed, 1);
    }

    #[test]
    fn requeue_moves_a_found_package() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(td.path().join("a-1.0.0.tgz"), b"corrupt").unwrap();
        let packages = vec![pkg("a-1.0.0.tgz")];
        let mut rec = reconcile(td.path(), &packages).unwrap();
        let corrupt = rec.found[0];
        rec.requeue(corrupt);
        assert!(rec.found.is_empty());
        assert_eq!(names(&rec.not_found), ["a-1.0.0.tgz"]);
    }
}
