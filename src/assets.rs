//! Font provisioning for the PDF renderer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

pub const FONT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(20);

async fn download_font(client: &reqwest::Client, url: &str, path: &Path) -> Result<()> {
    let response = client
        .get(url)
        .timeout(FONT_DOWNLOAD_TIMEOUT)
        .send()
        .await
        .context("Font download request failed")?
        .error_for_status()
        .context("Font server returned an error")?;
    let bytes = response.bytes().await.context("Failed to read font body")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), bytes = bytes.len(), "Font downloaded");
    Ok(())
}

/// Make sure the font at `path` exists, downloading it from `url` if needed.
///
/// Returns `None` when the font is unavailable; rendering then falls back
/// to a built-in font.
pub async fn ensure_font(client: &reqwest::Client, path: &Path, url: Option<&str>) -> Option<PathBuf> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        info!(path = %path.display(), "Font found locally");
        return Some(path.to_path_buf());
    }

    let Some(url) = url else {
        error!(path = %path.display(), "Font file is missing and download is disabled");
        return None;
    };

    match download_font(client, url, path).await {
        Ok(()) => Some(path.to_path_buf()),
        Err(e) => {
            error!(path = %path.display(), error = %format!("{e:#}"), "Font is unavailable");
            None
        }
    }
}

/// Read the font bytes if the font can be provisioned
pub async fn load_font(client: &reqwest::Client, path: &Path, url: Option<&str>) -> Option<Vec<u8>> {
    let path = ensure_font(client, path, url).await?;
    match tokio::fs::read(&path).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read font file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_existing_font_is_used_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DejaVuSans.ttf");
        std::fs::write(&path, b"fake-font").unwrap();

        let client = reqwest::Client::new();
        // An unroutable URL proves no download is attempted
        let found = ensure_font(&client, &path, Some("http://127.0.0.1:9/font.ttf")).await;
        assert_eq!(found, Some(path.clone()));
        assert_eq!(load_font(&client, &path, None).await, Some(b"fake-font".to_vec()));
    }

    #[tokio::test]
    async fn test_missing_font_without_url_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fonts").join("missing.ttf");
        let client = reqwest::Client::new();
        assert_eq!(ensure_font(&client, &path, None).await, None);
    }

    #[tokio::test]
    async fn test_failed_download_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fonts").join("missing.ttf");
        let client = reqwest::Client::new();
        // Port 9 (discard) is closed on test machines; the connection is refused
        assert_eq!(ensure_font(&client, &path, Some("http://127.0.0.1:9/font.ttf")).await, None);
        assert!(!path.exists());
    }
}
