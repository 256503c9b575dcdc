//! Core library for lockstash: resolve an npm lockfile (including git
//! dependencies and their nested lockfiles), download and verify artifacts,
//! and lay them out as an npm-compatible cache for offline installs.

pub mod cacache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod integrity;
pub mod lockfile;
pub mod package;
pub mod reconcile;
pub mod workdir;

#[cfg(test)]
mod test_support;

// Re-export main API for the CLI
pub use cacache::{request_cache_key, CacheBuilder};
pub use config::{load_config, Options, RcConfig};
pub use error::{Error, ErrorClass, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use integrity::{HashAlgorithm, Integrity};
pub use lockfile::{fixup, ResolveOptions, Resolver};
pub use package::{Package, PackageKind};
pub use reconcile::{reconcile, Reconciliation};
