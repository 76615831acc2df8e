//! Archive downloads with a cache-by-path contract.
//!
//! The rest of the verifier relies on two properties here: a destination that
//! already exists is returned without any network traffic, and a file only
//! appears on disk once the complete body has been read. Agent archives are
//! bounded in size, so the whole body is buffered in memory before the single
//! write — a partial download must never be mistaken for a cached archive.

use std::io::Read;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = "ACP-Registry-Verifier/1.0";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Http(Box<ureq::Error>),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl From<ureq::Error> for FetchError {
    fn from(err: ureq::Error) -> Self {
        FetchError::Http(Box::new(err))
    }
}

/// Whether the archive came from the network or was already on disk.
#[derive(Debug, PartialEq, Eq)]
pub enum Fetched {
    Cached,
    Downloaded { bytes: u64 },
}

/// Download `url` to `dest`, reusing an existing file without a network call.
pub fn fetch(url: &str, dest: &Path) -> Result<Fetched, FetchError> {
    if dest.exists() {
        return Ok(Fetched::Cached);
    }

    let response = ureq::get(url)
        .set("User-Agent", USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .call()?;

    let mut body = Vec::new();
    response.into_reader().read_to_end(&mut body)?;
    std::fs::write(dest, &body)?;

    Ok(Fetched::Downloaded {
        bytes: body.len() as u64,
    })
}

/// File name an archive URL will be cached under.
pub fn archive_file_name(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_destination_short_circuits_the_network() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("agent.tar.gz");
        std::fs::write(&dest, b"already here").expect("seed cache");

        // The URL is unroutable; reaching the network would fail the test.
        let fetched =
            fetch("https://registry.invalid/agent.tar.gz", &dest).expect("cached fetch");
        assert_eq!(fetched, Fetched::Cached);
        assert_eq!(
            std::fs::read(&dest).expect("read cache"),
            b"already here".to_vec()
        );
    }

    #[test]
    fn unreachable_hosts_report_a_download_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("agent.zip");

        let err = fetch("http://127.0.0.1:9/agent.zip", &dest).expect_err("must fail");
        assert!(matches!(err, FetchError::Http(_)));
        assert!(!dest.exists(), "no partial file may be left behind");
    }

    #[test]
    fn archive_names_come_from_the_last_url_segment() {
        assert_eq!(
            archive_file_name("https://example.com/releases/v1/agent-x.tar.bz2"),
            "agent-x.tar.bz2"
        );
        assert_eq!(archive_file_name("agent.zip"), "agent.zip");
    }
}
