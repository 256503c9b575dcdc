//! The four CLI actions, wired from core components.

use std::path::{Path, PathBuf};

use lockstash_core::{
    fixup, reconcile, request_cache_key, CacheBuilder, Error, Fetcher, Options, Package, Resolver,
    Result,
};
use tracing::{debug, info};

use crate::ui;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Download,
    Verify,
    Cacache,
    Fixup,
}

impl Action {
    pub const ALL: [(Action, &'static str); 4] = [
        (Action::Download, "download"),
        (Action::Verify, "verify"),
        (Action::Cacache, "cacache"),
        (Action::Fixup, "fixup"),
    ];
}

pub struct Runner<'a> {
    opts: &'a Options,
    fetcher: &'a dyn Fetcher,
    quiet: bool,
}

impl<'a> Runner<'a> {
    pub fn new(opts: &'a Options, fetcher: &'a dyn Fetcher, quiet: bool) -> Self {
        Self {
            opts,
            fetcher,
            quiet,
        }
    }

    pub fn run(&self, action: Action) -> Result<()> {
        match action {
            Action::Download => self.download().map(|_| ()),
            Action::Verify => self.verify(),
            Action::Cacache => self.cacache(),
            Action::Fixup => self.fixup(),
        }
    }

    fn say(&self, msg: &str) {
        if !self.quiet {
            ui::info(msg);
        }
    }

    fn resolve(&self) -> Result<Vec<Package>> {
        let lockfile = &self.opts.lockfile;
        let bytes = std::fs::read(lockfile).map_err(|e| Error::io("reading", lockfile, e))?;
        self.say(&format!("Resolving {}", lockfile.display()));
        Resolver::new(self.fetcher, self.opts.resolve_options()).resolve(&bytes)
    }

    fn artifact_path(&self, pkg: &Package) -> PathBuf {
        self.opts.dir.join(&pkg.filename)
    }

    /// Bring the download directory in line with the lockfile.
    ///
    /// Returns the resolved packages so `--cacache` can index them.
    fn download(&self) -> Result<Vec<Package>> {
        let packages = self.resolve()?;
        let dir = &self.opts.dir;
        std::fs::create_dir_all(dir).map_err(|e| Error::io("creating", dir, e))?;

        let mut rec = reconcile(dir, &packages)?;
        let unconditional = self.opts.delete_orphans || self.opts.assume_yes;
        let removed = rec.prune_orphans(unconditional, ui::confirm_orphans)?;
        if removed > 0 {
            self.say(&format!("Removed {} stale file(s)", removed));
        }

        let found = rec.found.clone();
        for pkg in found {
            let path = self.artifact_path(pkg);
            let data = self.fetcher.fetch(&path, None)?;
            match pkg.verify(&data) {
                Ok(()) => debug!(file = %pkg.filename, "artifact verified"),
                Err(e @ Error::IntegrityMismatch { .. }) => {
                    ui::warning(&format!("{}; downloading again", e));
                    rec.requeue(pkg);
                }
                Err(e) => return Err(e),
            }
        }

        let bar = ui::progress(rec.not_found.len(), self.quiet);
        for pkg in &rec.not_found {
            bar.set_message(pkg.filename.clone());
            let data = self.fetcher.fetch(Path::new(&pkg.filename), Some(&pkg.url))?;
            pkg.verify(&data)?;
            let path = self.artifact_path(pkg);
            std::fs::write(&path, &data).map_err(|e| Error::io("writing", &path, e))?;
            info!(file = %pkg.filename, bytes = data.len(), "downloaded");
            bar.inc(1);
        }
        bar.finish_and_clear();

        let fetched = rec.not_found.len();
        if !self.quiet {
            ui::success(&format!(
                "{} package(s) in {} ({} downloaded)",
                packages.len(),
                dir.display(),
                fetched
            ));
        }
        Ok(packages)
    }

    /// Check every artifact without changing anything; report all problems, then fail once.
    fn verify(&self) -> Result<()> {
        let packages = self.resolve()?;
        let rec = reconcile(&self.opts.dir, &packages)?;
        for orphan in rec.orphans() {
            ui::warning(&format!("Stale file: {}", orphan.display()));
        }

        let mut mismatched = 0usize;
        for pkg in &rec.found {
            let data = self.fetcher.fetch(&self.artifact_path(pkg), None)?;
            match pkg.verify(&data) {
                Ok(()) => {
                    if !self.quiet {
                        ui::dim(&format!("ok      {}", pkg.filename));
                    }
                }
                Err(e @ Error::IntegrityMismatch { .. }) => {
                    ui::error(&format!("corrupt {}", e));
                    mismatched += 1;
                }
                Err(e) => return Err(e),
            }
        }
        for pkg in &rec.not_found {
            ui::error(&format!("missing {} ({})", pkg.filename, pkg.url));
        }

        let missing = rec.not_found.len();
        if mismatched > 0 || missing > 0 {
            return Err(Error::VerificationFailed { mismatched, missing });
        }
        if !self.quiet {
            ui::success(&format!("All {} artifact(s) verified", packages.len()));
        }
        Ok(())
    }

    fn cacache(&self) -> Result<()> {
        // Refuse a non-empty cache dir before downloading anything.
        CacheBuilder::ensure_empty(&self.opts.cache_dir)?;
        let packages = self.download()?;
        let dir = &self.opts.dir;
        let dir = std::fs::canonicalize(dir).map_err(|e| Error::io("resolving", dir, e))?;
        let cache = CacheBuilder::create(&self.opts.cache_dir)?;

        let bar = ui::progress(packages.len(), self.quiet);
        for pkg in &packages {
            bar.set_message(pkg.filename.clone());
            cache.put(
                &request_cache_key(&pkg.url),
                &pkg.url,
                &dir.join(&pkg.filename),
                pkg.integrity(),
            )?;
            bar.inc(1);
        }
        bar.finish_and_clear();

        if !self.quiet {
            ui::success(&format!(
                "Cache with {} entr{} written to {}",
                packages.len(),
                if packages.len() == 1 { "y" } else { "ies" },
                cache.root().display()
            ));
            ui::dim(&format!(
                "Install offline with: npm ci --offline --cache {}",
                cache.root().display()
            ));
        }
        Ok(())
    }

    fn fixup(&self) -> Result<()> {
        let lockfile = &self.opts.lockfile;
        let bytes = std::fs::read(lockfile).map_err(|e| Error::io("reading", lockfile, e))?;
        match fixup(&bytes)? {
            Some(rewritten) => {
                std::fs::write(lockfile, rewritten).map_err(|e| Error::io("writing", lockfile, e))?;
                if !self.quiet {
                    ui::success(&format!("Updated {}", lockfile.display()));
                }
            }
            None => self.say(&format!("{} needs no changes", lockfile.display())),
        }
        Ok(())
    }
}
