//! HTTP downloads for installer scripts.
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};

/// Upstream Homebrew installer script.
pub const HOMEBREW_INSTALLER_URL: &str =
    "https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh";

/// Number of download attempts before giving up.
const RETRY_COUNT: u32 = 3;

/// Seconds to wait between retry attempts.
const RETRY_DELAY: u64 = 2;

/// Connection timeout in seconds.
const CONNECT_TIMEOUT: u64 = 10;

/// Maximum time for the whole transfer, in seconds.
const TRANSFER_TIMEOUT: u64 = 120;

/// Fetches a remote resource into a local file.
pub trait Fetch: Send + Sync + fmt::Debug {
    /// Download `url` into `dest`, overwriting its contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be fetched or written.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// [`Fetch`] implementation over HTTPS with retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
    retry_delay: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_connect(Some(Duration::from_secs(CONNECT_TIMEOUT)))
            .timeout_global(Some(Duration::from_secs(TRANSFER_TIMEOUT)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            retry_delay: Duration::from_secs(RETRY_DELAY),
        }
    }
}

impl HttpFetcher {
    fn fetch_once(&self, url: &str, dest: &Path) -> Result<()> {
        let mut response = self
            .agent
            .get(url)
            .call()
            .with_context(|| format!("requesting {url}"))?;
        let mut file =
            File::create(dest).with_context(|| format!("writing {}", dest.display()))?;
        io::copy(&mut response.body_mut().as_reader(), &mut file)
            .with_context(|| format!("downloading {url}"))?;
        Ok(())
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let mut last_error = None;
        for attempt in 1..=RETRY_COUNT {
            if attempt > 1 {
                tracing::debug!("retry {attempt}/{RETRY_COUNT} for {url}");
                std::thread::sleep(self.retry_delay);
            }
            match self.fetch_once(url, dest) {
                Ok(()) => {
                    tracing::debug!("downloaded {url} to {}", dest.display());
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("download attempt {attempt} failed: {e:#}");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e.context(format!("failed after {RETRY_COUNT} attempts"))),
            None => bail!("no download attempts made for {url}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_host_fails_after_retries() {
        let fetcher = HttpFetcher {
            retry_delay: Duration::ZERO,
            ..HttpFetcher::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher
            .fetch("http://127.0.0.1:9/install.sh", &dir.path().join("out"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed after 3 attempts"));
    }

    #[test]
    fn homebrew_url_is_https() {
        assert!(HOMEBREW_INSTALLER_URL.starts_with("https://"));
    }
}
