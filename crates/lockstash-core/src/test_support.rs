//! Shared fixtures for unit tests: in-memory archives and fetcher.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};
use crate::fetch::Fetcher;

/// Build a `.tar.gz` whose entries all live under `prefix/`, like a codeload archive.
pub(crate) fn make_archive(prefix: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let enc = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(enc);
    for (name, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", prefix, name), *body)
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Serves canned bodies by URL and records every request.
#[derive(Default)]
pub(crate) struct MemoryFetcher {
    bodies: HashMap<String, Vec<u8>>,
    pub(crate) requests: RefCell<Vec<String>>,
}

impl MemoryFetcher {
    pub(crate) fn with(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, filename: &Path, url: Option<&str>) -> Result<Vec<u8>> {
        let Some(url) = url else {
            return std::fs::read(filename).map_err(|e| Error::io("reading", filename, e));
        };
        self.requests.borrow_mut().push(url.to_string());
        self.bodies.get(url).cloned().ok_or_else(|| Error::Download {
            url: url.to_string(),
            reason: "HTTP 404".to_string(),
        })
    }
}
