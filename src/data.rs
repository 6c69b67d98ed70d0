//! Dataset download.
//!
//! Example data lives in the public `pcats_api_examples` repository; files
//! are fetched over HTTP(S) and written atomically next to their target so
//! an interrupted download never leaves a truncated CSV behind.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::client::USER_AGENT_VALUE;
use crate::error::{ClientError, ClientResult};

/// Raw-content base URL of the example case data.
pub const CASEDATA_BASE_URL: &str =
    "https://github.com/pcats-api/pcats_api_examples/raw/main/casedata";

/// URL of a named example data file, e.g. `example1.csv`.
pub fn casedata_url(name: &str) -> String {
    format!("{}/{}", CASEDATA_BASE_URL, name.trim_start_matches('/'))
}

/// Resolve a `fetch-data` argument (URL or example file name) to a URL and
/// a local file name.
pub fn resolve_source(source: &str) -> ClientResult<(String, String)> {
    let source = source.trim();
    let url = if source.starts_with("http://") || source.starts_with("https://") {
        source.to_string()
    } else {
        casedata_url(source)
    };

    let file_name = url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            ClientError::validation("source", format!("cannot derive a file name from {}", url))
        })?;

    Ok((url, file_name))
}

/// HTTP client for dataset downloads.
pub fn download_client(timeout: Duration) -> ClientResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT_VALUE)
        .build()
        .map_err(|e| ClientError::Config {
            message: format!("failed to create HTTP client: {}", e),
        })
}

/// Download `url` to `dest`. Returns the number of bytes written.
pub async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> ClientResult<u64> {
    debug!(url = %url, dest = %dest.display(), "downloading dataset");

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Http {
            status: status.as_u16(),
            message: format!("download of {} failed", url),
        });
    }

    let bytes = response.bytes().await?;
    write_atomic(dest, &bytes)?;

    info!(url = %url, dest = %dest.display(), bytes = bytes.len(), "dataset downloaded");
    Ok(bytes.len() as u64)
}

/// Download several files concurrently, failing on the first error.
pub async fn download_all(
    client: &reqwest::Client,
    items: &[(String, PathBuf)],
) -> ClientResult<Vec<u64>> {
    try_join_all(
        items
            .iter()
            .map(|(url, dest)| download(client, url, dest.as_path())),
    )
    .await
}

fn write_atomic(dest: &Path, bytes: &[u8]) -> ClientResult<()> {
    let io_error = |e: std::io::Error| ClientError::Io {
        path: dest.display().to_string(),
        message: e.to_string(),
    };

    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(io_error)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
    tmp.write_all(bytes).map_err(io_error)?;
    tmp.flush().map_err(io_error)?;
    tmp.persist(dest).map_err(|e| io_error(e.error))?;
    Ok(())
}
