// ABOUTME: Remote asset handling for the slidev pipeline
// ABOUTME: Downloads remote media referenced by compiled files and rewrites the references to local copies

use crate::config::RemoteAssetsOptions;
use crate::errors::{Degradation, Result, SlidevError};
use crate::unit::TransformUnit;
use crate::utils;
use log::{debug, info, warn};
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Materializes a remote URL as a local file.
pub trait AssetCache: Send + Sync {
    fn materialize(&self, url: &str) -> Result<PathBuf>;
}

/// Downloads assets over HTTP into a cache directory
pub struct HttpAssetCache {
    cache_dir: PathBuf,
    timeout: Duration,
    retries: u32,
}

impl HttpAssetCache {
    pub fn new(options: &RemoteAssetsOptions) -> Self {
        Self {
            cache_dir: options.cache_dir.clone(),
            timeout: Duration::from_secs(options.timeout_secs),
            retries: options.retries.max(1),
        }
    }

    /// Local file name for a URL: hash of the URL plus the original extension
    pub fn file_name(url: &str) -> String {
        let digest = Sha256::digest(url.as_bytes());
        let hash: String = digest.iter().take(12).map(|b| format!("{:02x}", b)).collect();

        let ext = Url::parse(url).ok().and_then(|parsed| {
            Path::new(parsed.path())
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
        });
        match ext {
            Some(ext) => format!("{}.{}", hash, ext),
            None => hash,
        }
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        info!("Fetching remote asset: {}", url);

        let client = Client::builder().timeout(self.timeout).build()?;

        let mut retry_delay = 1000;
        let mut last_error = None;

        for attempt in 1..=self.retries {
            match client.get(url).send() {
                Ok(response) if response.status().is_success() => {
                    return Ok(response.bytes()?.to_vec());
                }
                Ok(response) => {
                    last_error = Some(SlidevError::ValidationError(format!(
                        "HTTP error: {}",
                        response.status()
                    )));
                }
                Err(e) => last_error = Some(SlidevError::FetchError(e)),
            }

            if attempt < self.retries {
                info!(
                    "Fetch attempt {} failed, retrying in {} ms",
                    attempt, retry_delay
                );
                std::thread::sleep(Duration::from_millis(retry_delay));
                retry_delay *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SlidevError::ValidationError("Unknown error fetching asset".to_string())
        }))
    }
}

impl AssetCache for HttpAssetCache {
    fn materialize(&self, url: &str) -> Result<PathBuf> {
        let target = self.cache_dir.join(Self::file_name(url));
        if target.is_file() {
            debug!("Reusing cached asset {:?}", target);
            return Ok(target);
        }

        let bytes = self.fetch(url)?;
        store(&target, &bytes)?;
        Ok(target)
    }
}

/// Write `bytes` to `target` through a uniquely named sibling, so readers
/// never see a partial file
pub(crate) fn store(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| SlidevError::ValidationError(format!("No cache directory for {:?}", target)))?;
    utils::ensure_directory_exists(dir)?;

    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let partial = dir.join(format!(".{}.{}.part", name, Uuid::new_v4()));
    fs::write(&partial, bytes)?;
    if let Err(e) = fs::rename(&partial, target) {
        let _ = fs::remove_file(&partial);
        return Err(e.into());
    }
    Ok(())
}

/// Rewrites remote URL literals to their local copies.
pub struct RemoteAssetRewriter {
    enabled: bool,
    patterns: Vec<regex::Regex>,
    cache: Arc<dyn AssetCache>,
    deck_root: PathBuf,
}

impl RemoteAssetRewriter {
    pub fn new(
        options: &RemoteAssetsOptions,
        deck_root: &Path,
        cache: Arc<dyn AssetCache>,
    ) -> Result<Self> {
        let patterns = options
            .patterns
            .iter()
            .map(|p| regex::Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            enabled: options.enabled,
            patterns,
            cache,
            deck_root: deck_root.to_path_buf(),
        })
    }

    /// Path the application should use for a materialized file
    fn public_path(&self, local: &Path) -> String {
        match local.strip_prefix(&self.deck_root) {
            Ok(rel) => format!("/{}", utils::slash_path(rel)),
            Err(_) => format!("/@fs{}", utils::slash_path(local)),
        }
    }

    /// Rewrite every matched URL in `code`. Failed fetches keep the URL.
    pub fn rewrite(&self, code: &str) -> (String, Vec<Degradation>) {
        if !self.enabled {
            return (code.to_string(), Vec::new());
        }

        let mut replacements: HashMap<String, Option<String>> = HashMap::new();
        let mut degradations = Vec::new();
        let mut output = code.to_string();

        for pattern in &self.patterns {
            let urls: Vec<String> = pattern
                .find_iter(&output)
                .map(|m| m.as_str().to_string())
                .collect();

            for url in urls {
                if replacements.contains_key(&url) {
                    continue;
                }
                let local = match self.cache.materialize(&url) {
                    Ok(path) => Some(self.public_path(&path)),
                    Err(e) => {
                        warn!("Keeping remote asset {}: {}", url, e);
                        degradations.push(Degradation::AssetFetchFailed {
                            url: url.clone(),
                            reason: e.to_string(),
                        });
                        None
                    }
                };
                replacements.insert(url, local);
            }

            output = pattern
                .replace_all(&output, |caps: &regex::Captures| {
                    let url = &caps[0];
                    match replacements.get(url) {
                        Some(Some(local)) => local.clone(),
                        _ => url.to_string(),
                    }
                })
                .into_owned();
        }

        (output, degradations)
    }

    pub fn apply(&self, unit: &mut TransformUnit) {
        let (code, degradations) = self.rewrite(&unit.code);
        if code != unit.code {
            debug!("Rewrote remote assets in {}", unit.file_id);
        }
        unit.code = code;
        unit.degradations.extend(degradations);
    }
}
