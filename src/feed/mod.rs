//! Document sources: where chapter JSON comes from.

pub mod cache;
pub mod loader;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// A document address: an http(s) URL or a local file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Http(Url),
    File(PathBuf),
}

impl Location {
    pub fn parse(raw: &str) -> Result<Self> {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Location::Http(url)),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Location::File)
                .map_err(|_| anyhow!("bad file url: {}", raw)),
            // Bare paths, including Windows drive letters that parse as a scheme
            _ => Ok(Location::File(PathBuf::from(raw))),
        }
    }

    /// Cache key; equal for equal addresses.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Http(url) => write!(f, "{}", url),
            Location::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, location: &Location) -> Result<Value>;
}

/// One-shot HTTP GET; no retry, a failure is surfaced to the caller.
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentSource for HttpSource {
    async fn fetch(&self, location: &Location) -> Result<Value> {
        let Location::Http(url) = location else {
            return Err(anyhow!("http source cannot fetch {}", location));
        };
        let resp = self.client.get(url.clone()).send().await?.error_for_status()?;
        Ok(resp.json::<Value>().await?)
    }
}

pub struct FileSource;

#[async_trait]
impl DocumentSource for FileSource {
    async fn fetch(&self, location: &Location) -> Result<Value> {
        let Location::File(path) = location else {
            return Err(anyhow!("file source cannot fetch {}", location));
        };
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Dispatches on the location kind.
#[derive(Default)]
pub struct AnySource {
    http: HttpSource,
}

#[async_trait]
impl DocumentSource for AnySource {
    async fn fetch(&self, location: &Location) -> Result<Value> {
        match location {
            Location::Http(_) => self.http.fetch(location).await,
            Location::File(_) => FileSource.fetch(location).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parse() {
        assert!(matches!(
            Location::parse("https://example.org/data/chapter1.json").unwrap(),
            Location::Http(_)
        ));
        assert_eq!(
            Location::parse("data/chapter1.json").unwrap(),
            Location::File(PathBuf::from("data/chapter1.json"))
        );
        assert_eq!(
            Location::parse("file:///tmp/a.json").unwrap(),
            Location::File(PathBuf::from("/tmp/a.json"))
        );
    }

    #[tokio::test]
    async fn test_file_source_rejects_http() {
        let loc = Location::parse("http://localhost/a.json").unwrap();
        assert!(FileSource.fetch(&loc).await.is_err());
    }
}
