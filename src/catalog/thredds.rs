//! THREDDS catalog client.
//!
//! Fetches `catalog.xml` documents (over HTTP by default), resolves dataset
//! access URLs against the catalog's service declarations and optionally
//! follows nested `catalogRef` links.

use super::{CatalogClient, CatalogDataset, CrawlRequest, ServiceDescriptor};
use crate::constants::DEFAULT_CATALOG_TIMEOUT_SECS;
use crate::error::{LrauvError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Url;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace};

/// Service declared in a catalog document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub name: String,
    pub service_type: String,
    pub base: String,
    /// Enclosing compound service
    pub parent: Option<String>,
}

/// Dataset with a direct access path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetEntry {
    pub id: String,
    pub name: String,
    pub url_path: String,
    pub service_name: Option<String>,
}

/// Link to a nested catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRef {
    pub href: String,
    pub title: String,
}

/// Parsed content of one catalog document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDocument {
    pub services: Vec<ServiceEntry>,
    pub datasets: Vec<DatasetEntry>,
    pub refs: Vec<CatalogRef>,
}

impl CatalogDocument {
    /// Leaf services a dataset is published through
    fn services_for(&self, service_name: Option<&str>) -> Vec<&ServiceEntry> {
        self.services
            .iter()
            .filter(|s| !s.service_type.eq_ignore_ascii_case("compound"))
            .filter(|s| match service_name {
                Some(name) => s.name == name || s.parent.as_deref() == Some(name),
                None => true,
            })
            .collect()
    }

    /// Resolve a dataset's access URLs relative to the document URL
    pub fn resolve(&self, document_url: &Url, dataset: &DatasetEntry) -> Vec<ServiceDescriptor> {
        self.services_for(dataset.service_name.as_deref())
            .into_iter()
            .filter_map(|service| {
                let base = document_url.join(&service.base).ok()?;
                let url = base.join(dataset.url_path.trim_start_matches('/')).ok()?;
                Some(ServiceDescriptor {
                    service_type: service.service_type.clone(),
                    url: url.to_string(),
                })
            })
            .collect()
    }
}

struct DatasetFrame {
    pending: Option<DatasetEntry>,
    service_name: Option<String>,
}

fn attribute(element: &BytesStart<'_>, local_name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == local_name)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

fn inherited_service(frames: &[DatasetFrame]) -> Option<String> {
    frames.iter().rev().find_map(|f| f.service_name.clone())
}

fn dataset_entry(element: &BytesStart<'_>) -> Option<DatasetEntry> {
    let url_path = attribute(element, b"urlPath")?;
    let name = attribute(element, b"name").unwrap_or_default();
    Some(DatasetEntry {
        id: attribute(element, b"ID").unwrap_or_else(|| url_path.clone()),
        name,
        url_path,
        service_name: attribute(element, b"serviceName"),
    })
}

/// Parse a THREDDS catalog document
pub fn parse_catalog(xml: &str) -> std::result::Result<CatalogDocument, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut document = CatalogDocument::default();
    let mut compound_stack: Vec<String> = Vec::new();
    let mut frames: Vec<DatasetFrame> = Vec::new();
    let mut in_service_name = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"service" => {
                    let name = attribute(&e, b"name").unwrap_or_default();
                    document.services.push(ServiceEntry {
                        name: name.clone(),
                        service_type: attribute(&e, b"serviceType").unwrap_or_default(),
                        base: attribute(&e, b"base").unwrap_or_default(),
                        parent: compound_stack.last().cloned(),
                    });
                    compound_stack.push(name);
                }
                b"dataset" => {
                    let pending = dataset_entry(&e);
                    let service_name = pending.as_ref().and_then(|d| d.service_name.clone());
                    frames.push(DatasetFrame {
                        pending,
                        service_name,
                    });
                }
                b"serviceName" => in_service_name = true,
                b"catalogRef" => push_ref(&mut document, &e),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"service" => document.services.push(ServiceEntry {
                    name: attribute(&e, b"name").unwrap_or_default(),
                    service_type: attribute(&e, b"serviceType").unwrap_or_default(),
                    base: attribute(&e, b"base").unwrap_or_default(),
                    parent: compound_stack.last().cloned(),
                }),
                b"dataset" => {
                    if let Some(mut entry) = dataset_entry(&e) {
                        if entry.service_name.is_none() {
                            entry.service_name = inherited_service(&frames);
                        }
                        document.datasets.push(entry);
                    }
                }
                b"catalogRef" => push_ref(&mut document, &e),
                _ => {}
            },
            Event::Text(t) if in_service_name => {
                let name = t.unescape()?.trim().to_string();
                if let Some(frame) = frames.last_mut() {
                    frame.service_name = Some(name);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"service" => {
                    compound_stack.pop();
                }
                b"serviceName" => in_service_name = false,
                b"dataset" => {
                    let Some(frame) = frames.pop() else {
                        continue;
                    };
                    if let Some(mut entry) = frame.pending {
                        entry.service_name = frame
                            .service_name
                            .or_else(|| inherited_service(&frames));
                        document.datasets.push(entry);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(document)
}

fn push_ref(document: &mut CatalogDocument, element: &BytesStart<'_>) {
    if let Some(href) = attribute(element, b"href") {
        let title = attribute(element, b"title")
            .or_else(|| attribute(element, b"name"))
            .unwrap_or_default();
        document.refs.push(CatalogRef { href, title });
    }
}

/// Where catalog documents come from
pub trait DocumentSource {
    /// Raw XML of the catalog document at `url`
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<String>>;
}

/// Catalog documents served over HTTP
#[derive(Debug, Clone)]
pub struct HttpSource {
    http: reqwest::Client,
}

impl HttpSource {
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LrauvError::configuration(format!("Can't build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

impl DocumentSource for HttpSource {
    async fn fetch(&self, url: &Url) -> Result<String> {
        self.http
            .get(url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| LrauvError::catalog(url.as_str(), e.to_string()))?
            .text()
            .await
            .map_err(|e| LrauvError::catalog(url.as_str(), e.to_string()))
    }
}

/// Client for THREDDS catalogs
#[derive(Debug, Clone)]
pub struct ThreddsClient<S = HttpSource> {
    source: S,
}

impl ThreddsClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_CATALOG_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self::from_source(HttpSource::with_timeout(timeout)?))
    }
}

impl<S: DocumentSource> ThreddsClient<S> {
    pub fn from_source(source: S) -> Self {
        Self { source }
    }

    async fn fetch(&self, url: &Url) -> Result<CatalogDocument> {
        let body = self.source.fetch(url).await?;
        parse_catalog(&body).map_err(|e| LrauvError::catalog(url.as_str(), e.to_string()))
    }
}

impl<S: DocumentSource> CatalogClient for ThreddsClient<S> {
    async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<CatalogDataset>> {
        let root = Url::parse(&request.url)
            .map_err(|e| LrauvError::catalog(&request.url, e.to_string()))?;

        let mut queue = VecDeque::from([root]);
        let mut visited = HashSet::new();
        let mut datasets = Vec::new();

        while let Some(url) = queue.pop_front() {
            if !visited.insert(url.to_string()) {
                continue;
            }
            debug!("Reading catalog {}", url);
            let document = self.fetch(&url).await?;

            for entry in &document.datasets {
                if !request.accepts(&entry.id, &entry.name) {
                    trace!("Skipping dataset {}", entry.id);
                    continue;
                }
                datasets.push(CatalogDataset {
                    id: entry.id.clone(),
                    name: entry.name.clone(),
                    services: document.resolve(&url, entry),
                });
            }

            if request.follow_refs {
                for catalog_ref in &document.refs {
                    if request.is_skipped(&catalog_ref.title)
                        || request.is_skipped(&catalog_ref.href)
                    {
                        trace!("Skipping catalog ref {}", catalog_ref.href);
                        continue;
                    }
                    match url.join(&catalog_ref.href) {
                        Ok(next) => queue.push_back(next),
                        Err(e) => debug!("Bad catalog ref {}: {}", catalog_ref.href, e),
                    }
                }
            }
        }
        Ok(datasets)
    }
}
