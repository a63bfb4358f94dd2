//! Launchpad archive API client for ppa-copy.
//!
//! This crate provides a blocking client for the narrow slice of the
//! Launchpad REST API that ppa-copy needs: PPA and series lookup, published
//! source/binary listings, build records, and the asynchronous
//! `syncSources` copy operation.
//!
//! # Example
//!
//! ```no_run
//! use ppa_copy_launchpad::{Instance, LaunchpadClient};
//!
//! # fn main() -> anyhow::Result<()> {
//! let client = LaunchpadClient::new(Instance::Production.api_root());
//! let ppa = client.get_ppa("pov", "ppa")?;
//! let focal = client.get_series(&ppa, "focal")?;
//! let sources = client.published_sources(&ppa, &focal.self_link)?;
//! # Ok(())
//! # }
//! ```

use std::cell::Cell;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// API root of the production Launchpad instance.
pub const PRODUCTION_API: &str = "https://api.launchpad.net/1.0";

/// API root of the staging Launchpad instance.
pub const STAGING_API: &str = "https://api.staging.launchpad.net/1.0";

/// API root of the qastaging Launchpad instance.
pub const QASTAGING_API: &str = "https://api.qastaging.launchpad.net/1.0";

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent for API requests.
pub const USER_AGENT: &str = concat!("ppa-copy/", env!("CARGO_PKG_VERSION"));

/// Environment variable holding pre-issued OAuth credentials as
/// `consumer-key:token:token-secret`.
pub const CREDENTIALS_ENV: &str = "PPA_COPY_CREDENTIALS";

/// Named Launchpad instance, selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instance {
    Production,
    Staging,
    QaStaging,
}

impl Instance {
    /// API root URL for this instance.
    pub fn api_root(self) -> &'static str {
        match self {
            Instance::Production => PRODUCTION_API,
            Instance::Staging => STAGING_API,
            Instance::QaStaging => QASTAGING_API,
        }
    }
}

impl FromStr for Instance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "production" => Ok(Instance::Production),
            "staging" => Ok(Instance::Staging),
            "qastaging" => Ok(Instance::QaStaging),
            other => bail!("unknown Launchpad instance: {other}"),
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Instance::Production => "production",
            Instance::Staging => "staging",
            Instance::QaStaging => "qastaging",
        })
    }
}

/// Publication status of a source or binary package in an archive.
///
/// Statuses beyond the enumerated set are preserved verbatim in `Other` so
/// callers can still log them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum PublicationStatus {
    Published,
    Pending,
    Superseded,
    Deleted,
    Obsolete,
    Other(String),
}

impl From<String> for PublicationStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Published" => PublicationStatus::Published,
            "Pending" => PublicationStatus::Pending,
            "Superseded" => PublicationStatus::Superseded,
            "Deleted" => PublicationStatus::Deleted,
            "Obsolete" => PublicationStatus::Obsolete,
            _ => PublicationStatus::Other(s),
        }
    }
}

impl fmt::Display for PublicationStatus {
    /// Lowercase archive spelling, as used in log lines ("foo 1 is superseded
    /// in focal").
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicationStatus::Published => f.write_str("published"),
            PublicationStatus::Pending => f.write_str("pending"),
            PublicationStatus::Superseded => f.write_str("superseded"),
            PublicationStatus::Deleted => f.write_str("deleted"),
            PublicationStatus::Obsolete => f.write_str("obsolete"),
            PublicationStatus::Other(s) => f.write_str(&s.to_lowercase()),
        }
    }
}

/// Lifecycle state of a build job, distinct from publication status.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum BuildState {
    NeedsBuilding,
    CurrentlyBuilding,
    Uploading,
    SuccessfullyBuilt,
    Other(String),
}

impl From<String> for BuildState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Needs building" => BuildState::NeedsBuilding,
            "Currently building" => BuildState::CurrentlyBuilding,
            "Uploading build" => BuildState::Uploading,
            "Successfully built" => BuildState::SuccessfullyBuilt,
            _ => BuildState::Other(s),
        }
    }
}

impl fmt::Display for BuildState {
    /// The Launchpad spelling, suitable for "state: Needs building" notices.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildState::NeedsBuilding => f.write_str("Needs building"),
            BuildState::CurrentlyBuilding => f.write_str("Currently building"),
            BuildState::Uploading => f.write_str("Uploading build"),
            BuildState::SuccessfullyBuilt => f.write_str("Successfully built"),
            BuildState::Other(s) => f.write_str(s),
        }
    }
}

/// A PPA entry (`~owner/+archive/ubuntu/name`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Archive {
    pub self_link: String,
    pub web_link: String,
    pub distribution_link: String,
}

/// A distribution release series (`ubuntu/focal`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DistroSeries {
    pub self_link: String,
    pub name: String,
}

/// A source package publication record within a series.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourcePublication {
    pub source_package_name: String,
    pub source_package_version: String,
    pub status: PublicationStatus,
    pub self_link: String,
    pub distro_series_link: String,
}

/// A binary package publication record within an arch series.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinaryPublication {
    pub binary_package_name: String,
    pub binary_package_version: String,
    pub status: PublicationStatus,
}

/// A build record attached to a source publication.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Build {
    pub buildstate: BuildState,
    pub web_link: String,
}

/// One page of a Launchpad collection response.
#[derive(Debug, Deserialize)]
struct Page<T> {
    entries: Vec<T>,
    #[serde(default)]
    next_collection_link: Option<String>,
}

/// Pre-issued OAuth credentials (PLAINTEXT signature method).
///
/// Launchpad read operations work anonymously; the `syncSources` write
/// requires a token. Interactive token acquisition is out of scope; the
/// token is supplied via [`CREDENTIALS_ENV`] or configuration.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub consumer_key: String,
    pub token: String,
    pub token_secret: String,
}

impl Credentials {
    /// Parse `consumer-key:token:token-secret`.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(consumer_key), Some(token), Some(token_secret))
                if !consumer_key.is_empty() && !token.is_empty() =>
            {
                Ok(Self {
                    consumer_key: consumer_key.to_string(),
                    token: token.to_string(),
                    token_secret: token_secret.to_string(),
                })
            }
            _ => bail!("malformed credentials; expected consumer-key:token:token-secret"),
        }
    }

    /// Read credentials from [`CREDENTIALS_ENV`], if set.
    pub fn from_env() -> Result<Option<Self>> {
        match env::var(CREDENTIALS_ENV) {
            Ok(raw) => Self::parse(&raw)
                .with_context(|| format!("invalid {CREDENTIALS_ENV}"))
                .map(Some),
            Err(_) => Ok(None),
        }
    }

    fn authorization_header(&self, realm: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let nonce: u64 = rand::random();
        format!(
            "OAuth realm=\"{realm}\", \
             oauth_consumer_key=\"{}\", \
             oauth_token=\"{}\", \
             oauth_signature_method=\"PLAINTEXT\", \
             oauth_signature=\"%26{}\", \
             oauth_timestamp=\"{timestamp}\", \
             oauth_nonce=\"{nonce}\", \
             oauth_version=\"1.0\"",
            self.consumer_key, self.token, self.token_secret,
        )
    }
}

/// Blocking Launchpad API client.
///
/// Every issued HTTP request increments an internal counter, readable via
/// [`LaunchpadClient::request_count`]; the CLI surfaces it under `--debug`.
#[derive(Debug)]
pub struct LaunchpadClient {
    api_base: String,
    http: reqwest::blocking::Client,
    credentials: Option<Credentials>,
    requests: Cell<u64>,
}

impl LaunchpadClient {
    /// Create a client for the given API root.
    pub fn new(api_base: &str) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            http,
            credentials: None,
            requests: Cell::new(0),
        }
    }

    /// Create a client for production Launchpad.
    pub fn production() -> Self {
        Self::new(PRODUCTION_API)
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        self
    }

    /// Attach OAuth credentials to all subsequent requests.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// The API root this client talks to.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Number of HTTP requests issued so far.
    pub fn request_count(&self) -> u64 {
        self.requests.get()
    }

    /// Fetch a PPA entry.
    pub fn get_ppa(&self, owner: &str, name: &str) -> Result<Archive> {
        let url = format!("{}/~{}/+archive/ubuntu/{}", self.api_base, owner, name);
        self.get_entry(&url)
            .with_context(|| format!("failed to look up PPA ~{owner}/{name}"))
    }

    /// Resolve a series name within the PPA's distribution.
    pub fn get_series(&self, archive: &Archive, name: &str) -> Result<DistroSeries> {
        let url = format!(
            "{}/{}",
            archive.distribution_link.trim_end_matches('/'),
            name
        );
        self.get_entry(&url)
            .with_context(|| format!("failed to look up series {name}"))
    }

    /// All source publications in a series of the archive.
    pub fn published_sources(
        &self,
        archive: &Archive,
        series_link: &str,
    ) -> Result<Vec<SourcePublication>> {
        self.collection(
            &archive.self_link,
            &[
                ("ws.op", "getPublishedSources"),
                ("distro_series", series_link),
            ],
        )
        .context("failed to list published sources")
    }

    /// Published binary publications in an arch series of the archive.
    pub fn published_binaries(
        &self,
        archive: &Archive,
        arch_series_link: &str,
    ) -> Result<Vec<BinaryPublication>> {
        self.collection(
            &archive.self_link,
            &[
                ("ws.op", "getPublishedBinaries"),
                ("distro_arch_series", arch_series_link),
                ("status", "Published"),
            ],
        )
        .context("failed to list published binaries")
    }

    /// Build records for a source publication.
    pub fn builds(&self, source: &SourcePublication) -> Result<Vec<Build>> {
        self.collection(&source.self_link, &[("ws.op", "getBuilds")])
            .with_context(|| {
                format!(
                    "failed to list builds for {} {}",
                    source.source_package_name, source.source_package_version
                )
            })
    }

    /// Request an asynchronous copy of the named sources (with binaries) into
    /// `to_series`/`to_pocket` of the same archive.
    ///
    /// Returning `Ok` means the copy was accepted, not that it is complete;
    /// the caller must re-poll `published_sources` to observe the result.
    pub fn sync_sources(
        &self,
        archive: &Archive,
        names: &[String],
        to_series: &str,
        to_pocket: &str,
    ) -> Result<()> {
        let source_names =
            serde_json::to_string(names).context("failed to encode source name list")?;
        self.requests.set(self.requests.get() + 1);

        let mut request = self.http.post(&archive.self_link).form(&[
            ("ws.op", "syncSources"),
            ("from_archive", archive.self_link.as_str()),
            ("to_series", to_series),
            ("to_pocket", to_pocket),
            ("include_binaries", "true"),
            ("source_names", source_names.as_str()),
        ]);
        if let Some(credentials) = &self.credentials {
            request = request.header(
                "Authorization",
                credentials.authorization_header(&self.api_base),
            );
        }

        let response = request.send().context("copy request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!(
                "copy to {to_series} rejected: {status} {}",
                body.lines().next().unwrap_or(""),
            );
        }
        Ok(())
    }

    fn get_entry<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get(url, &[])?;
        match response.status() {
            reqwest::StatusCode::OK => response.json().context("failed to parse API response"),
            reqwest::StatusCode::NOT_FOUND => bail!("not found: {url}"),
            status => bail!("unexpected status {status} for {url}"),
        }
    }

    fn collection<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut entries = Vec::new();
        let mut page: Page<T> = self.fetch_page(url, query)?;
        loop {
            entries.append(&mut page.entries);
            match page.next_collection_link.take() {
                Some(next) => page = self.fetch_page(&next, &[])?,
                None => break,
            }
        }
        Ok(entries)
    }

    fn fetch_page<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self.get(url, query)?;
        match response.status() {
            reqwest::StatusCode::OK => response.json().context("failed to parse collection page"),
            status => bail!("unexpected status {status} for {url}"),
        }
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<reqwest::blocking::Response> {
        self.requests.set(self.requests.get() + 1);
        let mut request = self.http.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(credentials) = &self.credentials {
            request = request.header(
                "Authorization",
                credentials.authorization_header(&self.api_base),
            );
        }
        request
            .send()
            .with_context(|| format!("request to {url} failed"))
    }
}
