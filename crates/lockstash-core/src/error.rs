//! Error taxonomy for lockstash.
//!
//! Every fallible core operation returns [`Result<T>`]. Each variant maps to an
//! [`ErrorClass`] and a fixed process exit code so automation can branch on it.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for lockstash operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of a failure; decides the exit-code range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Lockfile,
    Filesystem,
    Network,
    Verification,
    Consistency,
}

impl ErrorClass {
    /// First exit code of this class's range; each range is ten codes wide.
    pub fn exit_base(self) -> u8 {
        match self {
            ErrorClass::Configuration => 0,
            ErrorClass::Lockfile => 10,
            ErrorClass::Filesystem => 20,
            ErrorClass::Network => 30,
            ErrorClass::Verification => 40,
            ErrorClass::Consistency => 50,
        }
    }
}

/// All errors that can occur while resolving, downloading, verifying or caching.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("No action selected. Pass one of --download, --verify, --cacache or --fixup")]
    NoAction,

    #[error("Only one action may be selected, got: {}", .0.join(", "))]
    MultipleActions(Vec<String>),

    #[error("Invalid configuration at {}: {reason}", .path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    // Lockfile errors
    #[error("Unsupported lockfileVersion {0}; only versions 2 and 3 are supported")]
    UnsupportedLockVersion(u64),

    #[error("Lockfile contains no downloadable dependencies")]
    NoDependencies,

    #[error("Package {package} has no integrity field ({url})")]
    MissingIntegrity { package: String, url: String },

    #[error("Cannot derive a filename for {package} from {url}")]
    FilenameDerivation { package: String, url: String },

    #[error(
        "Git dependency {package} declares install scripts but ships no package-lock.json; \
         pass --force-git-deps to accept it anyway"
    )]
    GitDepsRequireLockfile { package: String },

    #[error("Malformed lockfile: {0}")]
    MalformedLockfile(String),

    #[error("Git dependency {package} leads back to a lockfile already being resolved")]
    CyclicGitDependency { package: String },

    // Filesystem errors
    #[error("I/O error while {operation} {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory {} exists and is not empty", .0.display())]
    DirectoryNotEmpty(PathBuf),

    #[error("Failed to create symlink {}: {source}", .path.display())]
    Symlink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract archive into {}: {reason}", .path.display())]
    Archive { path: PathBuf, reason: String },

    // Network errors
    #[error("Failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    // Verification errors
    #[error("Integrity mismatch for {package}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        package: String,
        expected: String,
        actual: String,
    },

    #[error("Verification failed: {mismatched} corrupt, {missing} missing")]
    VerificationFailed { mismatched: usize, missing: usize },

    #[error("Malformed integrity string for {package}: {integrity}")]
    MalformedIntegrity { package: String, integrity: String },

    #[error("Unsupported integrity algorithm {algorithm} for {package}")]
    UnsupportedAlgorithm { package: String, algorithm: String },

    // Consistency errors
    #[error("Aborted: {0} stale file(s) left in the download directory")]
    ReconciliationAborted(usize),

    #[error("Failed to remove stale file {}: {source}", .path.display())]
    OrphanNotDeleted {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Wrap an I/O error with the operation and path it happened on.
    pub fn io(operation: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Error::NoAction | Error::MultipleActions(_) | Error::InvalidConfig { .. } => {
                ErrorClass::Configuration
            }
            Error::UnsupportedLockVersion(_)
            | Error::NoDependencies
            | Error::MissingIntegrity { .. }
            | Error::FilenameDerivation { .. }
            | Error::GitDepsRequireLockfile { .. }
            | Error::MalformedLockfile(_)
            | Error::CyclicGitDependency { .. } => ErrorClass::Lockfile,
            Error::Io { .. }
            | Error::DirectoryNotEmpty(_)
            | Error::Symlink { .. }
            | Error::Archive { .. } => ErrorClass::Filesystem,
            Error::Download { .. } => ErrorClass::Network,
            Error::IntegrityMismatch { .. }
            | Error::VerificationFailed { .. }
            | Error::MalformedIntegrity { .. }
            | Error::UnsupportedAlgorithm { .. } => ErrorClass::Verification,
            Error::ReconciliationAborted(_) | Error::OrphanNotDeleted { .. } => {
                ErrorClass::Consistency
            }
        }
    }

    /// Process exit code for this error: the class base plus a per-variant offset.
    /// Stable across releases.
    pub fn exit_code(&self) -> u8 {
        let offset = match self {
            Error::NoAction => 3,
            Error::MultipleActions(_) => 4,
            Error::InvalidConfig { .. } => 5,
            Error::UnsupportedLockVersion(_) => 0,
            Error::NoDependencies => 1,
            Error::MissingIntegrity { .. } => 2,
            Error::FilenameDerivation { .. } => 3,
            Error::GitDepsRequireLockfile { .. } => 4,
            Error::MalformedLockfile(_) => 5,
            Error::CyclicGitDependency { .. } => 6,
            Error::Io { .. } => 0,
            Error::DirectoryNotEmpty(_) => 1,
            Error::Symlink { .. } => 2,
            Error::Archive { .. } => 3,
            Error::Download { .. } => 0,
            Error::IntegrityMismatch { .. } => 0,
            Error::VerificationFailed { .. } => 1,
            Error::MalformedIntegrity { .. } => 2,
            Error::UnsupportedAlgorithm { .. } => 3,
            Error::ReconciliationAborted(_) => 0,
            Error::OrphanNotDeleted { .. } => 1,
        };
        self.class().exit_base() + offset
    }

    /// Short hint shown under the error message, when there is one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::DirectoryNotEmpty(_) => Some("Remove the directory or choose another --cache-dir"),
            Error::ReconciliationAborted(_) => Some("Re-run with --delete-orphans to remove stale files"),
            Error::UnsupportedLockVersion(_) => Some("Regenerate the lockfile with npm 7 or newer"),
            Error::IntegrityMismatch { .. } => Some("Delete the artifact and run --download again"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_class_ranges() {
        let cases = [
            (Error::NoAction, 0..10),
            (Error::UnsupportedLockVersion(1), 10..20),
            (Error::DirectoryNotEmpty(PathBuf::from("x")), 20..30),
            (
                Error::Download {
                    url: "u".into(),
                    reason: "r".into(),
                },
                30..40,
            ),
            (
                Error::VerificationFailed {
                    mismatched: 1,
                    missing: 0,
                },
                40..50,
            ),
            (Error::ReconciliationAborted(2), 50..60),
        ];
        for (err, range) in cases {
            assert!(range.contains(&err.exit_code()), "{err} -> {}", err.exit_code());
            assert_eq!(err.exit_code() / 10 * 10, err.class().exit_base());
        }
    }

    #[test]
    fn documented_exit_codes_are_stable() {
        assert_eq!(Error::NoAction.exit_code(), 3);
        assert_eq!(Error::MultipleActions(vec![]).exit_code(), 4);
        assert_eq!(Error::MalformedLockfile("x".into()).exit_code(), 15);
        assert_eq!(
            Error::CyclicGitDependency {
                package: "a".into()
            }
            .exit_code(),
            16
        );
        assert_eq!(Error::DirectoryNotEmpty(PathBuf::from("c")).exit_code(), 21);
        assert_eq!(
            Error::UnsupportedAlgorithm {
                package: "p".into(),
                algorithm: "sha256".into()
            }
            .exit_code(),
            43
        );
        assert_eq!(Error::ReconciliationAborted(1).exit_code(), 50);
    }

    #[test]
    fn io_error_display_names_operation_and_path() {
        let err = Error::io(
            "reading",
            "/tmp/pkg.tgz",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let display = err.to_string();
        assert!(display.contains("reading"));
        assert!(display.contains("/tmp/pkg.tgz"));
        assert!(display.contains("gone"));
        assert_eq!(err.class(), ErrorClass::Filesystem);
    }

    #[test]
    fn multiple_actions_lists_them() {
        let err = Error::MultipleActions(vec!["download".into(), "fixup".into()]);
        assert_eq!(
            err.to_string(),
            "Only one action may be selected, got: download, fixup"
        );
        assert_eq!(err.class(), ErrorClass::Configuration);
    }
}
