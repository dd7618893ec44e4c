use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::info;

use crate::config::HttpSettings;

/// Where the reference PDF comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local(PathBuf),
    Remote(String),
}

/// A PDF on local disk. Remote downloads keep their temp file alive here and
/// remove it on drop.
pub struct Acquired {
    path: PathBuf,
    _temp: Option<NamedTempFile>,
}

impl Acquired {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Source {
    pub fn parse(arg: &str) -> Self {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            Source::Remote(arg.to_string())
        } else {
            Source::Local(PathBuf::from(arg))
        }
    }

    pub fn acquire(&self, http: &HttpSettings) -> Result<Acquired> {
        match self {
            Source::Local(path) => {
                if !path.is_file() {
                    anyhow::bail!("No such file: {:?}", path);
                }
                Ok(Acquired {
                    path: path.clone(),
                    _temp: None,
                })
            }
            Source::Remote(url) => {
                let temp = download(url, http)?;
                Ok(Acquired {
                    path: temp.path().to_path_buf(),
                    _temp: Some(temp),
                })
            }
        }
    }
}

fn download(url: &str, http: &HttpSettings) -> Result<NamedTempFile> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(http.timeout_secs))
        .user_agent(http.user_agent.as_str())
        .build()?;

    info!("Downloading {}", url);
    let mut response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("Failed to fetch {}", url))?;

    let mut file = tempfile::Builder::new()
        .prefix("isaref-")
        .suffix(".pdf")
        .tempfile()?;
    let bytes = response
        .copy_to(&mut file)
        .with_context(|| format!("Failed to read body of {}", url))?;
    file.flush()?;

    info!(bytes, "Saved to {:?}", file.path());
    Ok(file)
}
