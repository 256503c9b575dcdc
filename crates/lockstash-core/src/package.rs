//! The resolved package entity: registry tarballs and GitHub-hosted git archives.

use std::path::Path;

use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::integrity::Integrity;
use crate::workdir::WorkDir;

/// URL schemes treated as git sources.
pub const GIT_SCHEMES: [&str; 4] = ["git", "git+ssh", "git+https", "ssh"];

pub fn is_git_scheme(scheme: &str) -> bool {
    GIT_SCHEMES.contains(&scheme)
}

/// One usable `packages` entry from a lockfile.
#[derive(Clone, Debug)]
pub struct LockEntry {
    /// Lockfile key, e.g. `node_modules/left-pad`
    pub name: String,
    pub resolved: Url,
    pub integrity: Option<String>,
}

#[derive(Debug)]
pub enum PackageKind {
    /// Registry tarball pinned by an integrity string
    Registry { integrity: String },
    /// GitHub archive pinned by commit, extracted into a scoped work directory
    Git { workdir: WorkDir },
}

#[derive(Debug)]
pub struct Package {
    pub name: String,
    /// The URL actually downloaded (the codeload archive for git packages)
    pub url: String,
    pub filename: String,
    pub kind: PackageKind,
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        let same_kind = match (&self.kind, &other.kind) {
            (PackageKind::Registry { integrity: a }, PackageKind::Registry { integrity: b }) => {
                a == b
            }
            (PackageKind::Git { workdir: a }, PackageKind::Git { workdir: b }) => {
                a.path() == b.path()
            }
            _ => false,
        };
        same_kind
            && self.name == other.name
            && self.url == other.url
            && self.filename == other.filename
    }
}

/// `github.com/<user>/<project>[/tree/<commit>]` with the commit resolved.
#[derive(Debug, PartialEq, Eq)]
struct HostedGit {
    host: String,
    user: String,
    project: String,
    commit: String,
}

impl HostedGit {
    /// Returns `None` for anything that is not a GitHub tree/commit URL.
    fn parse(url: &Url) -> Option<Self> {
        if !is_git_scheme(url.scheme()) {
            return None;
        }
        let host = url.host_str()?;
        if !host.ends_with("github.com") {
            return None;
        }
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
        let (user, project) = match segments.as_slice() {
            [user, project, ..] => (*user, *project),
            _ => return None,
        };
        if let Some(kind) = segments.get(2) {
            if *kind != "tree" {
                return None;
            }
        }
        let commit = segments
            .get(3)
            .copied()
            .or_else(|| url.fragment())
            .filter(|c| !c.is_empty())?;
        Some(Self {
            host: host.to_string(),
            user: user.to_string(),
            project: project.trim_end_matches(".git").to_string(),
            commit: commit.to_string(),
        })
    }

    fn archive_url(&self) -> String {
        format!(
            "https://codeload.{}/{}/{}/tar.gz/{}",
            self.host, self.user, self.project, self.commit
        )
    }

    fn filename(&self) -> String {
        format!("{}-{}.tar.gz", self.project, self.commit)
    }
}

/// Registry artifact name: last path segment, prefixed with `<scope>_` for scoped packages.
fn registry_filename(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.collect();
    let last = segments.last().filter(|s| !s.is_empty())?;
    match segments.first() {
        Some(first) if first.starts_with('@') && segments.len() > 1 => {
            let lower = first.to_ascii_lowercase();
            let scope = match lower.find("%2f") {
                Some(idx) => &first[..idx],
                None => *first,
            };
            Some(format!("{}_{}", scope, last))
        }
        _ => Some(last.to_string()),
    }
}

impl Package {
    /// Classify a lockfile entry and build the package.
    ///
    /// Git packages are fetched and extracted right away so their `package.json`
    /// and nested lockfile can be inspected by the resolver.
    pub fn from_lock_entry(entry: LockEntry, fetcher: &dyn Fetcher, keep_workdir: bool) -> Result<Self> {
        if let Some(hosted) = HostedGit::parse(&entry.resolved) {
            let url = hosted.archive_url();
            let filename = hosted.filename();
            debug!(package = %entry.name, %url, "git dependency");

            let archive = fetcher.fetch(Path::new(&filename), Some(&url))?;
            let workdir = WorkDir::new(keep_workdir)?;
            workdir.extract(&archive)?;

            return Ok(Self {
                name: entry.name,
                url,
                filename,
                kind: PackageKind::Git { workdir },
            });
        }

        let url = entry.resolved.to_string();
        let filename = registry_filename(&entry.resolved).ok_or_else(|| Error::FilenameDerivation {
            package: entry.name.clone(),
            url: url.clone(),
        })?;
        let integrity = entry.integrity.ok_or_else(|| Error::MissingIntegrity {
            package: entry.name.clone(),
            url: url.clone(),
        })?;
        Ok(Self {
            name: entry.name,
            url,
            filename,
            kind: PackageKind::Registry { integrity },
        })
    }

    pub fn is_git(&self) -> bool {
        matches!(self.kind, PackageKind::Git { .. })
    }

    pub fn integrity(&self) -> Option<&str> {
        match &self.kind {
            PackageKind::Registry { integrity } => Some(integrity),
            PackageKind::Git { .. } => None,
        }
    }

    pub fn workdir(&self) -> Option<&Path> {
        match &self.kind {
            PackageKind::Git { workdir } => Some(workdir.path()),
            PackageKind::Registry { .. } => None,
        }
    }

    /// Check artifact bytes against the package's integrity.
    ///
    /// Git archives always pass: the commit pin is the trust anchor.
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let PackageKind::Registry { integrity } = &self.kind else {
            return Ok(());
        };
        let expected = Integrity::parse(&self.name, integrity)?;
        expected.check(data).map_err(|actual| Error::IntegrityMismatch {
            package: self.name.clone(),
            expected: format!("{}:{}", expected.algorithm.name(), expected.hex()),
            actual: format!("{}:{}", expected.algorithm.name(), actual),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::HashAlgorithm;
    use crate::test_support::{make_archive, MemoryFetcher};

    fn entry(name: &str, resolved: &str, integrity: Option<&str>) -> LockEntry {
        LockEntry {
            name: name.to_string(),
            resolved: Url::parse(resolved).unwrap(),
            integrity: integrity.map(String::from),
        }
    }

    #[test]
    fn registry_package_filename_is_last_segment() {
        let pkg = Package::from_lock_entry(
            entry(
                "node_modules/left-pad",
                "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz",
                Some("sha1-aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
            ),
            &MemoryFetcher::default(),
            false,
        )
        .unwrap();
        assert_eq!(pkg.filename, "left-pad-1.3.0.tgz");
        assert_eq!(pkg.url, "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz");
        assert!(!pkg.is_git());
    }

    #[test]
    fn scoped_registry_package_is_flattened() {
        let pkg = Package::from_lock_entry(
            entry(
                "node_modules/@acme/widget",
                "https://registry.npmjs.org/@acme/widget/-/widget-2.0.0.tgz",
                Some("sha512-AAAA"),
            ),
            &MemoryFetcher::default(),
            false,
        )
        .unwrap();
        assert_eq!(pkg.filename, "@acme_widget-2.0.0.tgz");

        let encoded = Url::parse("https://registry.example.org/@acme%2fwidget/-/widget-2.0.0.tgz").unwrap();
        assert_eq!(registry_filename(&encoded).unwrap(), "@acme_widget-2.0.0.tgz");
    }

    #[test]
    fn registry_package_without_integrity_fails() {
        let err = Package::from_lock_entry(
            entry("node_modules/a", "https://registry.npmjs.org/a/-/a-1.0.0.tgz", None),
            &MemoryFetcher::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingIntegrity { ref package, .. } if package == "node_modules/a"));
    }

    #[test]
    fn url_without_path_cannot_derive_filename() {
        let err = Package::from_lock_entry(
            entry("node_modules/a", "https://registry.npmjs.org/", Some("sha512-AAAA")),
            &MemoryFetcher::default(),
            false,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 13);
    }

    #[test]
    fn github_tree_url_becomes_codeload_archive() {
        let archive = make_archive("widget-deadbeef", &[("package.json", b"{\"name\":\"widget\"}")]);
        let fetcher = MemoryFetcher::default().with(
            "https://codeload.github.com/acme/widget/tar.gz/deadbeef",
            archive,
        );
        let pkg = Package::from_lock_entry(
            entry("node_modules/widget", "git+https://github.com/acme/widget/tree/deadbeef", None),
            &fetcher,
            false,
        )
        .unwrap();
        assert!(pkg.is_git());
        assert_eq!(pkg.url, "https://codeload.github.com/acme/widget/tar.gz/deadbeef");
        assert_eq!(pkg.filename, "widget-deadbeef.tar.gz");
        assert!(pkg.workdir().unwrap().join("package.json").is_file());
        assert!(pkg.integrity().is_none());
    }

    #[test]
    fn git_ssh_url_uses_fragment_commit_and_strips_dot_git() {
        let url = Url::parse("git+ssh://git@github.com/acme/widget.git#0123abc").unwrap();
        let hosted = HostedGit::parse(&url).unwrap();
        assert_eq!(hosted.archive_url(), "https://codeload.github.com/acme/widget/tar.gz/0123abc");
        assert_eq!(hosted.filename(), "widget-0123abc.tar.gz");
    }

    #[test]
    fn non_tree_or_non_github_urls_are_not_hosted() {
        for url in [
            "git+https://github.com/acme/widget/blob/deadbeef",
            "git+https://gitlab.com/acme/widget#deadbeef",
            "git+https://github.com/acme/widget",
            "https://github.com/acme/widget/tree/deadbeef",
        ] {
            assert!(HostedGit::parse(&Url::parse(url).unwrap()).is_none(), "{url}");
        }

        // Falls through to the registry path, which then wants an integrity.
        let err = Package::from_lock_entry(
            entry("node_modules/w", "git+https://gitlab.com/acme/widget#deadbeef", None),
            &MemoryFetcher::default(),
            false,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 12);
    }

    #[test]
    fn verify_detects_a_single_corrupted_byte() {
        let data = b"tarball contents".to_vec();
        let sri = Integrity::compute(HashAlgorithm::Sha512, &data).to_sri();
        let pkg = Package::from_lock_entry(
            entry("node_modules/x", "https://registry.example.org/x-1.0.0.tgz", Some(sri.as_str())),
            &MemoryFetcher::default(),
            false,
        )
        .unwrap();
        assert!(pkg.verify(&data).is_ok());

        let mut corrupt = data.clone();
        corrupt[3] ^= 0xff;
        let err = pkg.verify(&corrupt).unwrap_err();
        assert!(matches!(err, Error::IntegrityMismatch { .. }));
        assert_eq!(err.exit_code(), 40);
    }

    #[test]
    fn git_packages_always_verify() {
        let archive = make_archive("w-1", &[("package.json", b"{}")]);
        let fetcher = MemoryFetcher::default()
            .with("https://codeload.github.com/acme/w/tar.gz/1", archive);
        let pkg = Package::from_lock_entry(
            entry("node_modules/w", "git+ssh://git@github.com/acme/w.git#1", None),
            &fetcher,
            false,
        )
        .unwrap();
        assert!(pkg.verify(b"anything at all").is_ok());
    }
}
