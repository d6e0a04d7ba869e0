//! Catalog over a local mirror directory.
//!
//! Lets discovery run without the THREDDS server: directories stand in for
//! catalog documents and every file is published as a `file://` OPeNDAP
//! access URL, so the mirror path mapping still resolves to the same file.

use super::{CatalogClient, CatalogDataset, CrawlRequest, ServiceDescriptor};
use crate::constants::{CATALOG_DOCUMENT, OPENDAP_SERVICE};
use crate::error::{LrauvError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Catalog backed by the mirrored directory tree
#[derive(Debug, Clone, Copy, Default)]
pub struct MirrorCatalog;

impl MirrorCatalog {
    pub fn new() -> Self {
        Self
    }

    /// Directory a catalog document URL stands for
    fn directory(url: &str) -> PathBuf {
        let path = url.strip_prefix("file://").unwrap_or(url);
        let path = path
            .strip_suffix(CATALOG_DOCUMENT)
            .map(|p| p.trim_end_matches('/'))
            .unwrap_or(path);
        PathBuf::from(path)
    }

    fn dataset(root: &Path, path: &Path) -> CatalogDataset {
        let id = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        CatalogDataset {
            id,
            name,
            services: vec![ServiceDescriptor {
                service_type: OPENDAP_SERVICE.to_uppercase(),
                url: format!("file://{}", path.display()),
            }],
        }
    }

    fn list(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        if recursive {
            let mut files = Vec::new();
            for entry in WalkDir::new(root).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    LrauvError::catalog(root.display().to_string(), e.to_string())
                })?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
            return Ok(files);
        }

        let pattern = root.join("*");
        let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| LrauvError::catalog(root.display().to_string(), e.to_string()))?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        Ok(files)
    }
}

impl CatalogClient for MirrorCatalog {
    async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<CatalogDataset>> {
        let root = Self::directory(&request.url);
        if !root.is_dir() {
            return Err(LrauvError::catalog(
                &request.url,
                format!("{} is not a directory", root.display()),
            ));
        }
        debug!("Listing mirror directory {}", root.display());

        let files = Self::list(&root, request.follow_refs)?;
        Ok(files
            .iter()
            .map(|path| Self::dataset(&root, path))
            .filter(|dataset| {
                let keep = request.accepts(&dataset.id, &dataset.name);
                if !keep {
                    trace!("Skipping {}", dataset.id);
                }
                keep
            })
            .collect())
    }
}
