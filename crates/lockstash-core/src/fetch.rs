//! Artifact fetching: local file reuse, or a blocking HTTP GET with fixed-delay retries.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

const REQUEST_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_ATTEMPTS: usize = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

/// Source of artifact bytes.
///
/// With `url == None` an existing local file named `filename` is read back;
/// otherwise the URL is downloaded. Retrying is the fetcher's job, never the caller's.
pub trait Fetcher {
    fn fetch(&self, filename: &Path, url: Option<&str>) -> Result<Vec<u8>>;
}

/// HTTP fetcher backed by a single reused `ureq` agent.
pub struct HttpFetcher {
    agent: ureq::Agent,
    attempts: usize,
    retry_delay: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .build();
        Self {
            agent,
            attempts: DEFAULT_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }

    /// Override the retry policy (total attempts, delay between attempts).
    pub fn with_retry(mut self, attempts: usize, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let reason = match self.agent.get(url).call() {
                Ok(resp) => {
                    let mut buf = Vec::new();
                    match resp.into_reader().read_to_end(&mut buf) {
                        Ok(_) => return Ok(buf),
                        Err(e) => format!("reading body: {}", e),
                    }
                }
                Err(ureq::Error::Status(code, _)) => format!("HTTP {}", code),
                Err(e) => e.to_string(),
            };
            if attempt >= self.attempts {
                return Err(Error::Download {
                    url: url.to_string(),
                    reason,
                });
            }
            warn!(url, attempt, %reason, "download failed, retrying");
            std::thread::sleep(self.retry_delay);
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, filename: &Path, url: Option<&str>) -> Result<Vec<u8>> {
        match url {
            None if filename.is_file() => {
                debug!(path = %filename.display(), "reading local artifact");
                std::fs::read(filename).map_err(|e| Error::io("reading", filename, e))
            }
            None => Err(Error::io(
                "reading",
                filename,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such artifact and no URL"),
            )),
            Some(url) => {
                debug!(url, "downloading");
                self.get(url)
            }
        }
    }
}
