//! Catalog discovery for LRAUV mission logs.
//!
//! Mission logs are published in a two-level THREDDS catalog:
//! ```text
//! missionlogs/2012/
//!   catalog.xml
//!   20120908_20120920.dlist          <- mission group manifest
//!   20120908_20120920/
//!     catalog.xml
//!     20120909T010636/
//!       201209090106_201209091529.nc4
//! ```
//! [`CatalogCrawler`] reads the group manifests, prunes groups outside the
//! requested window and only then crawls the surviving groups for logs.

pub mod mirror;
pub mod thredds;

use crate::constants::{
    CATALOG_DOCUMENT, CRAWLER_DEFAULT_SKIPS, GROUP_DATE_FORMAT, GROUP_MANIFEST_PATTERN,
    NOISE_SKIPS, OPENDAP_SERVICE,
};
use crate::error::{LrauvError, Result};
use crate::models::{DatasetRef, MissionGroup, TimeWindow};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

pub use mirror::MirrorCatalog;
pub use thredds::ThreddsClient;

static GROUP_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{8})_(\d{8})$").expect("valid group id regex"));

static DEFAULT_SKIPS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    CRAWLER_DEFAULT_SKIPS
        .iter()
        .chain(NOISE_SKIPS.iter())
        .map(|p| Regex::new(p).expect("valid default skip pattern"))
        .collect()
});

/// Access point of a catalog dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service_type: String,
    pub url: String,
}

/// A dataset listed in a catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogDataset {
    pub id: String,
    pub name: String,
    pub services: Vec<ServiceDescriptor>,
}

impl CatalogDataset {
    /// URL of the first service of the given type, case-insensitively
    pub fn service_url(&self, service_type: &str) -> Option<&str> {
        self.services
            .iter()
            .find(|s| s.service_type.eq_ignore_ascii_case(service_type))
            .map(|s| s.url.as_str())
    }
}

/// One crawl of a catalog document
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    /// Catalog document URL
    pub url: String,
    /// A dataset is kept when its id matches any of these
    pub select: Vec<Regex>,
    /// Datasets and catalog references matching any of these are dropped
    pub skip: Vec<Regex>,
    /// Whether to descend into nested catalog references
    pub follow_refs: bool,
}

impl CrawlRequest {
    /// Whether a dataset passes the select and skip filters
    pub fn accepts(&self, id: &str, name: &str) -> bool {
        self.select.iter().any(|re| re.is_match(id))
            && !self.is_skipped(id)
            && !self.is_skipped(name)
    }

    pub fn is_skipped(&self, text: &str) -> bool {
        self.skip.iter().any(|re| re.is_match(text))
    }
}

/// The catalog crawling primitive
pub trait CatalogClient {
    fn crawl(&self, request: &CrawlRequest) -> impl Future<Output = Result<Vec<CatalogDataset>>>;
}

/// What to do with a mission group manifest whose name isn't two dates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedGroupPolicy {
    /// Fail discovery for the platform
    #[default]
    Abort,
    /// Warn and leave the group out
    SkipWithWarning,
}

/// Compile a list of regular expressions
pub fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p.as_ref()).map_err(|e| {
                LrauvError::configuration(format!("Invalid pattern '{}': {}", p.as_ref(), e))
            })
        })
        .collect()
}

/// Catalog document URL below a catalog base; `.html` catalogs are read as XML
pub fn catalog_document_url(base: &str) -> String {
    let url = if base.ends_with(".xml") || base.ends_with(".html") {
        base.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), CATALOG_DOCUMENT)
    };
    match url.strip_suffix(".html") {
        Some(stem) => format!("{}.xml", stem),
        None => url,
    }
}

/// Parse a mission group from its manifest dataset id
/// (e.g. `LRAUV/tethys/missionlogs/2012/20120908_20120920.dlist`)
pub fn parse_mission_group(manifest_id: &str, catalog_base: &str) -> Result<MissionGroup> {
    let basename = manifest_id.rsplit('/').next().unwrap_or(manifest_id);
    let group_id = basename.split('.').next().unwrap_or(basename);

    let caps = GROUP_ID_RE.captures(group_id).ok_or_else(|| {
        LrauvError::crawl_defect(group_id, "expected <YYYYMMDD>_<YYYYMMDD>")
    })?;
    let parse = |text: &str| {
        NaiveDate::parse_from_str(text, GROUP_DATE_FORMAT)
            .map_err(|e| LrauvError::crawl_defect(group_id, format!("bad date '{}': {}", text, e)))
    };
    let start = parse(&caps[1])?;
    let end = parse(&caps[2])?;

    let catalog_url = catalog_document_url(&format!(
        "{}/{}",
        catalog_base.trim_end_matches('/'),
        group_id
    ));
    MissionGroup::new(group_id, start, end, catalog_url)
}

/// Logs found below the mission groups of one catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub refs: Vec<DatasetRef>,
    /// Catalog URLs of mission groups that couldn't be crawled
    pub unreachable_groups: Vec<String>,
}

/// Walks the two-level mission log catalog
#[derive(Debug)]
pub struct CatalogCrawler<C> {
    client: C,
    skips: Vec<Regex>,
    malformed_policy: MalformedGroupPolicy,
}

impl<C: CatalogClient> CatalogCrawler<C> {
    /// Crawler skipping the default and noise patterns
    pub fn new(client: C) -> Self {
        Self {
            client,
            skips: DEFAULT_SKIPS.clone(),
            malformed_policy: MalformedGroupPolicy::default(),
        }
    }

    /// Add skip patterns to the file crawl
    pub fn with_extra_skips<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        self.skips.extend(compile_patterns(patterns)?);
        Ok(self)
    }

    pub fn with_malformed_policy(mut self, policy: MalformedGroupPolicy) -> Self {
        self.malformed_policy = policy;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Mission groups of a catalog that lie within the window
    pub async fn mission_groups(
        &self,
        catalog_base: &str,
        window: &TimeWindow,
    ) -> Result<Vec<MissionGroup>> {
        let request = CrawlRequest {
            url: catalog_document_url(catalog_base),
            select: compile_patterns(&[GROUP_MANIFEST_PATTERN])?,
            skip: compile_patterns(CRAWLER_DEFAULT_SKIPS)?,
            follow_refs: false,
        };
        debug!("Crawling {} looking for .dlist files", request.url);
        let manifests = self.client.crawl(&request).await?;

        let mut groups = Vec::new();
        for manifest in manifests {
            let group = match parse_mission_group(&manifest.id, catalog_base) {
                Ok(group) => group,
                Err(e) => match self.malformed_policy {
                    MalformedGroupPolicy::Abort => return Err(e),
                    MalformedGroupPolicy::SkipWithWarning => {
                        warn!("Skipping manifest {}: {}", manifest.id, e);
                        continue;
                    }
                },
            };

            debug!("Checking if {} is within {}", group.id, window);
            if window.contains_group(group.start, group.end) {
                groups.push(group);
            } else {
                debug!("Pruned mission group {}", group.id);
            }
        }
        Ok(groups)
    }

    /// Discover the raw logs below every mission group inside the window.
    ///
    /// Returns each OPeNDAP URL once, tagged with its mission group, in
    /// crawl order. A group whose catalog can't be read is reported in
    /// [`Discovery::unreachable_groups`] and the remaining groups are still
    /// crawled.
    pub async fn discover(
        &self,
        catalog_base: &str,
        file_filter: &str,
        window: &TimeWindow,
    ) -> Result<Discovery> {
        let select = compile_patterns(&[file_filter])?;
        let groups = self.mission_groups(catalog_base, window).await?;
        info!(
            "Crawling {} mission groups of {} for {} files",
            groups.len(),
            catalog_base,
            file_filter
        );

        let mut seen = HashSet::new();
        let mut discovery = Discovery::default();
        for group in &groups {
            let request = CrawlRequest {
                url: group.catalog_url.clone(),
                select: select.clone(),
                skip: self.skips.clone(),
                follow_refs: true,
            };
            debug!("Crawling {}", request.url);
            let datasets = match self.client.crawl(&request).await {
                Ok(datasets) => datasets,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Skipping mission group {}: {}", group.id, e);
                    discovery.unreachable_groups.push(group.catalog_url.clone());
                    continue;
                }
            };

            let mut added = 0;
            for dataset in &datasets {
                let Some(url) = dataset.service_url(OPENDAP_SERVICE) else {
                    debug!("Dropping {}: no {} service", dataset.id, OPENDAP_SERVICE);
                    continue;
                };
                if seen.insert(url.to_string()) {
                    debug!("Adding url {}", url);
                    discovery.refs.push(DatasetRef {
                        service_url: url.to_string(),
                        mission_group_id: group.id.clone(),
                    });
                    added += 1;
                }
            }
            info!("Mission group {}: {} logs", group.id, added);
        }
        Ok(discovery)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Canned catalog keyed by document URL
    #[derive(Default)]
    pub(crate) struct FakeCatalog {
        pub documents: HashMap<String, Vec<CatalogDataset>>,
        /// Document URLs answered with a server error
        pub unavailable: HashSet<String>,
        pub requests: Mutex<Vec<String>>,
    }

    impl CatalogClient for FakeCatalog {
        async fn crawl(&self, request: &CrawlRequest) -> Result<Vec<CatalogDataset>> {
            self.requests.lock().unwrap().push(request.url.clone());
            if self.unavailable.contains(&request.url) {
                return Err(LrauvError::catalog(&request.url, "503 Service Unavailable"));
            }
            Ok(self
                .documents
                .get(&request.url)
                .map(|datasets| {
                    datasets
                        .iter()
                        .filter(|d| request.accepts(&d.id, &d.name))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    const BASE: &str = "http://elvis.shore.mbari.org/thredds/catalog/LRAUV/tethys/missionlogs/2012";
    const DAP: &str = "http://elvis.shore.mbari.org/thredds/dodsC/LRAUV/tethys/missionlogs/2012";

    fn manifest(group: &str) -> CatalogDataset {
        CatalogDataset {
            id: format!("LRAUV/tethys/missionlogs/2012/{}.dlist", group),
            name: format!("{}.dlist", group),
            services: vec![],
        }
    }

    fn log(group: &str, mission: &str, file: &str) -> CatalogDataset {
        let path = format!("{}/{}/{}", group, mission, file);
        CatalogDataset {
            id: format!("LRAUV/tethys/missionlogs/2012/{}", path),
            name: file.to_string(),
            services: vec![
                ServiceDescriptor {
                    service_type: "HTTPServer".to_string(),
                    url: format!("{}/fileServer/{}", BASE, path),
                },
                ServiceDescriptor {
                    service_type: "OPENDAP".to_string(),
                    url: format!("{}/{}", DAP, path),
                },
            ],
        }
    }

    fn window() -> TimeWindow {
        TimeWindow::new(
            Some(Utc.with_ymd_and_hms(2012, 9, 5, 0, 0, 0).unwrap()),
            Some(Utc.with_ymd_and_hms(2012, 10, 1, 0, 0, 0).unwrap()),
        )
        .unwrap()
    }

    fn catalog() -> FakeCatalog {
        let mut documents = HashMap::new();
        documents.insert(
            format!("{}/catalog.xml", BASE),
            vec![
                manifest("20120901_20120915"),
                manifest("20120908_20120920"),
                manifest("20120921_20120930"),
            ],
        );
        documents.insert(
            format!("{}/20120901_20120915/catalog.xml", BASE),
            vec![log("20120901_20120915", "20120906T000000", "201209060000_201209061200.nc4")],
        );
        documents.insert(
            format!("{}/20120908_20120920/catalog.xml", BASE),
            vec![
                log("20120908_20120920", "20120909T010636", "201209090106_201209091529.nc4"),
                log("20120908_20120920", "20120909T010636", "201209090106_201209091529.nc4"),
                log("20120908_20120920", "20120909T010636", "Courier.nc4"),
                log("20120908_20120920", "20120909T010636", "lrauv.cfg"),
                log("20120908_20120920", "20120909T010636", "syslog"),
                CatalogDataset {
                    services: vec![],
                    ..log("20120908_20120920", "20120910T000000", "201209100000_201209101200.nc4")
                },
            ],
        );
        documents.insert(
            format!("{}/20120921_20120930/catalog.xml", BASE),
            vec![log("20120921_20120930", "20120922T000000", "201209220000_201209221200.nc4")],
        );
        FakeCatalog {
            documents,
            ..FakeCatalog::default()
        }
    }

    #[test]
    fn test_parse_mission_group() {
        let group =
            parse_mission_group("LRAUV/tethys/missionlogs/2012/20120908_20120920.dlist", BASE)
                .unwrap();
        assert_eq!(group.id, "20120908_20120920");
        assert_eq!(group.start, NaiveDate::from_ymd_opt(2012, 9, 8).unwrap());
        assert_eq!(group.end, NaiveDate::from_ymd_opt(2012, 9, 20).unwrap());
        assert_eq!(group.catalog_url, format!("{}/20120908_20120920/catalog.xml", BASE));
    }

    #[test]
    fn test_malformed_and_reversed_groups_are_defects() {
        for id in [
            "notes.dlist",
            "20120908.dlist",
            "20120908_2012092.dlist",
            "20121340_20121341.dlist",
            "20120920_20120908.dlist",
        ] {
            assert!(
                matches!(parse_mission_group(id, BASE), Err(LrauvError::CrawlDefect { .. })),
                "{id} should be a crawl defect"
            );
        }
    }

    #[test]
    fn test_catalog_document_url() {
        assert_eq!(catalog_document_url("http://h/c/2012"), "http://h/c/2012/catalog.xml");
        assert_eq!(catalog_document_url("http://h/c/2012/"), "http://h/c/2012/catalog.xml");
        assert_eq!(
            catalog_document_url("http://h/c/2012/catalog.html"),
            "http://h/c/2012/catalog.xml"
        );
    }

    #[tokio::test]
    async fn test_discover_prunes_groups_and_filters_files() {
        let crawler = CatalogCrawler::new(catalog());
        let discovery = crawler.discover(BASE, ".*.nc4", &window()).await.unwrap();
        let refs = discovery.refs;
        assert!(discovery.unreachable_groups.is_empty());

        // 20120901_20120915 starts before the window and is never crawled
        let requests = crawler.client().requests.lock().unwrap().clone();
        assert!(!requests.iter().any(|u| u.contains("20120901_20120915")));

        let urls: Vec<&str> = refs.iter().map(|r| r.service_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                format!("{}/20120908_20120920/20120909T010636/201209090106_201209091529.nc4", DAP),
                format!("{}/20120921_20120930/20120922T000000/201209220000_201209221200.nc4", DAP),
            ]
        );
        assert_eq!(refs[0].mission_group_id, "20120908_20120920");
        assert_eq!(refs[1].mission_group_id, "20120921_20120930");
    }

    #[tokio::test]
    async fn test_malformed_group_policy() {
        let mut fake = catalog();
        fake.documents
            .get_mut(&format!("{}/catalog.xml", BASE))
            .unwrap()
            .push(manifest("backup"));

        let aborting = CatalogCrawler::new(fake);
        let result = aborting.discover(BASE, ".*.nc4", &window()).await;
        assert!(matches!(result, Err(LrauvError::CrawlDefect { .. })));

        let mut fake = catalog();
        fake.documents
            .get_mut(&format!("{}/catalog.xml", BASE))
            .unwrap()
            .push(manifest("backup"));
        let skipping =
            CatalogCrawler::new(fake).with_malformed_policy(MalformedGroupPolicy::SkipWithWarning);
        let discovery = skipping.discover(BASE, ".*.nc4", &window()).await.unwrap();
        assert_eq!(discovery.refs.len(), 2);
    }

    #[tokio::test]
    async fn test_extra_skips_apply_to_file_crawl() {
        let crawler = CatalogCrawler::new(catalog())
            .with_extra_skips(&[".*201209220000.*"])
            .unwrap();
        let discovery = crawler.discover(BASE, ".*.nc4", &window()).await.unwrap();
        assert_eq!(discovery.refs.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_group_does_not_hide_other_groups() {
        let mut fake = catalog();
        let broken = format!("{}/20120921_20120930/catalog.xml", BASE);
        fake.unavailable.insert(broken.clone());

        let crawler = CatalogCrawler::new(fake);
        let discovery = crawler.discover(BASE, ".*.nc4", &window()).await.unwrap();

        assert_eq!(discovery.unreachable_groups, vec![broken]);
        assert_eq!(discovery.refs.len(), 1);
        assert_eq!(discovery.refs[0].mission_group_id, "20120908_20120920");
        assert!(discovery.refs[0].service_url.ends_with("201209090106_201209091529.nc4"));
    }

    #[tokio::test]
    async fn test_unavailable_year_catalog_fails_discovery() {
        let mut fake = catalog();
        fake.unavailable.insert(format!("{}/catalog.xml", BASE));

        let crawler = CatalogCrawler::new(fake);
        let result = crawler.discover(BASE, ".*.nc4", &window()).await;
        assert!(matches!(result, Err(LrauvError::Catalog { .. })));
    }

    #[test]
    fn test_default_skips_cover_crawler_and_noise_patterns() {
        let crawler = CatalogCrawler::new(FakeCatalog::default());
        assert_eq!(crawler.skips.len(), CRAWLER_DEFAULT_SKIPS.len() + NOISE_SKIPS.len());

        let request = CrawlRequest {
            url: String::new(),
            select: compile_patterns(&[".*"]).unwrap(),
            skip: crawler.skips.clone(),
            follow_refs: false,
        };
        for name in ["Courier.nc4", "lrauv.cfg", "x.nc4.md5", "Individual Files"] {
            assert!(request.is_skipped(name), "{name} should be skipped");
        }
        assert!(!request.is_skipped("201209090106_201209091529.nc4"));
    }
}
