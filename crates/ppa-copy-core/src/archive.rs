use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use ppa_copy_launchpad::{
    Archive, BinaryPublication, Build, LaunchpadClient, PublicationStatus, SourcePublication,
};

use crate::report::Reporter;
use crate::types::{PendingEntry, PendingReason, UsableSources};

/// A resolved series: its name plus an implementation-specific link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesHandle {
    pub name: String,
    pub link: String,
}

/// Raw reads/writes against the archive service.
///
/// This is the seam between the cache and the network: the production
/// implementation is [`LaunchpadArchive`], tests provide in-memory fakes.
/// Every call is assumed to cost at least one slow, rate-limited network
/// round-trip; callers go through [`CachedArchive`] instead of calling this
/// directly.
pub trait ArchiveApi {
    /// Resolve a series name to a handle.
    fn series(&self, name: &str) -> Result<SeriesHandle>;

    /// All source publications in a series.
    fn published_sources(&self, series: &SeriesHandle) -> Result<Vec<SourcePublication>>;

    /// Published binary publications in a series for one architecture.
    fn published_binaries(
        &self,
        series: &SeriesHandle,
        architecture: &str,
    ) -> Result<Vec<BinaryPublication>>;

    /// Build records for a source publication.
    fn builds(&self, source: &SourcePublication) -> Result<Vec<Build>>;

    /// Asynchronously copy the named sources (with binaries) into a target
    /// series pocket of the same archive.
    fn copy_sources(&self, names: &[String], target: &SeriesHandle, pocket: &str) -> Result<()>;
}

/// Production [`ArchiveApi`] backed by one PPA on Launchpad.
///
/// The PPA entry itself is fetched lazily on first use and kept for the
/// lifetime of the value.
pub struct LaunchpadArchive {
    client: LaunchpadClient,
    owner: String,
    ppa_name: String,
    archive: RefCell<Option<Archive>>,
}

impl LaunchpadArchive {
    pub fn new(client: LaunchpadClient, owner: &str, ppa_name: &str) -> Self {
        Self {
            client,
            owner: owner.to_string(),
            ppa_name: ppa_name.to_string(),
            archive: RefCell::new(None),
        }
    }

    pub fn client(&self) -> &LaunchpadClient {
        &self.client
    }

    fn archive(&self) -> Result<Archive> {
        if let Some(archive) = self.archive.borrow().as_ref() {
            return Ok(archive.clone());
        }
        let archive = self.client.get_ppa(&self.owner, &self.ppa_name)?;
        *self.archive.borrow_mut() = Some(archive.clone());
        Ok(archive)
    }
}

impl ArchiveApi for LaunchpadArchive {
    fn series(&self, name: &str) -> Result<SeriesHandle> {
        let archive = self.archive()?;
        let series = self.client.get_series(&archive, name)?;
        Ok(SeriesHandle {
            name: series.name,
            link: series.self_link,
        })
    }

    fn published_sources(&self, series: &SeriesHandle) -> Result<Vec<SourcePublication>> {
        let archive = self.archive()?;
        self.client.published_sources(&archive, &series.link)
    }

    fn published_binaries(
        &self,
        series: &SeriesHandle,
        architecture: &str,
    ) -> Result<Vec<BinaryPublication>> {
        let archive = self.archive()?;
        // The arch-series link is derivable, no lookup round-trip needed.
        let arch_series_link = format!("{}/{}", series.link, architecture);
        self.client.published_binaries(&archive, &arch_series_link)
    }

    fn builds(&self, source: &SourcePublication) -> Result<Vec<Build>> {
        self.client.builds(source)
    }

    fn copy_sources(&self, names: &[String], target: &SeriesHandle, pocket: &str) -> Result<()> {
        let archive = self.archive()?;
        self.client
            .sync_sources(&archive, names, &target.name, pocket)
    }
}

/// Key of one copy batch: where from, where to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CopyKey {
    pub source_series: String,
    pub target_series: String,
    pub pocket: String,
}

/// Versions of one package, keyed by version string.
pub type VersionMap = BTreeMap<String, SourcePublication>;
/// Derived per-series index: package name to its published versions.
pub type SourceIndex = BTreeMap<String, VersionMap>;

/// Read-mostly view of archive state with at most one network round-trip per
/// distinct query key, plus the batched copy-request queue.
///
/// Each value owns its caches; [`CachedArchive::clear_caches`] invalidates
/// everything except the series-name-to-handle map (series identities do not
/// change during a run).
pub struct CachedArchive<A> {
    api: A,
    series: BTreeMap<String, SeriesHandle>,
    sources: BTreeMap<String, Vec<SourcePublication>>,
    binaries: BTreeMap<(String, String), Vec<BinaryPublication>>,
    source_index: BTreeMap<String, SourceIndex>,
    usable: BTreeMap<String, UsableSources>,
    queue: BTreeMap<CopyKey, BTreeSet<String>>,
}

impl<A: ArchiveApi> CachedArchive<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            series: BTreeMap::new(),
            sources: BTreeMap::new(),
            binaries: BTreeMap::new(),
            source_index: BTreeMap::new(),
            usable: BTreeMap::new(),
            queue: BTreeMap::new(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Pending copy requests, grouped by (source, target, pocket).
    pub fn queue(&self) -> &BTreeMap<CopyKey, BTreeSet<String>> {
        &self.queue
    }

    /// Resolve a series name; cached for the lifetime of the value.
    pub fn series(&mut self, name: &str, reporter: &mut dyn Reporter) -> Result<SeriesHandle> {
        if let Some(handle) = self.series.get(name) {
            return Ok(handle.clone());
        }
        reporter.debug(&format!("Locating the series: {name}..."));
        let handle = self.api.series(name)?;
        self.series.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// All source publications in a series; cached per series name.
    pub fn published_sources(
        &mut self,
        series_name: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<Vec<SourcePublication>> {
        if let Some(cached) = self.sources.get(series_name) {
            return Ok(cached.clone());
        }
        let handle = self.series(series_name, reporter)?;
        reporter.debug(&format!("Listing source packages for {series_name}..."));
        let sources = self.api.published_sources(&handle)?;
        self.sources.insert(series_name.to_string(), sources.clone());
        Ok(sources)
    }

    /// Published binaries in a series for one architecture; cached per
    /// (series, architecture).
    pub fn published_binaries(
        &mut self,
        series_name: &str,
        architecture: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<Vec<BinaryPublication>> {
        let key = (series_name.to_string(), architecture.to_string());
        if let Some(cached) = self.binaries.get(&key) {
            return Ok(cached.clone());
        }
        let handle = self.series(series_name, reporter)?;
        reporter.debug(&format!(
            "Listing binary packages for {series_name} {architecture}..."
        ));
        let binaries = self.api.published_binaries(&handle, architecture)?;
        self.binaries.insert(key, binaries.clone());
        Ok(binaries)
    }

    /// Derived index over [`CachedArchive::published_sources`]: package name
    /// to version to record; cached per series.
    pub fn source_packages(
        &mut self,
        series_name: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<&SourceIndex> {
        self.ensure_source_index(series_name, reporter)?;
        Ok(self
            .source_index
            .get(series_name)
            .expect("index was just built"))
    }

    /// The source record for an exact (name, version) in a series, if any.
    pub fn source_for(
        &mut self,
        name: &str,
        version: &str,
        series_name: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<Option<SourcePublication>> {
        Ok(self
            .source_packages(series_name, reporter)?
            .get(name)
            .and_then(|versions| versions.get(version))
            .cloned())
    }

    /// Whether a series has no record at all for (name, version).
    pub fn is_missing(
        &mut self,
        name: &str,
        version: &str,
        series_name: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<bool> {
        Ok(self.source_for(name, version, series_name, reporter)?.is_none())
    }

    fn ensure_source_index(
        &mut self,
        series_name: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<()> {
        if self.source_index.contains_key(series_name) {
            return Ok(());
        }
        let mut index: SourceIndex = BTreeMap::new();
        for source in self.published_sources(series_name, reporter)? {
            index
                .entry(source.source_package_name.clone())
                .or_default()
                .insert(source.source_package_version.clone(), source);
        }
        self.source_index.insert(series_name.to_string(), index);
        Ok(())
    }

    /// Whitelisted sources in a series, split into usable and pending.
    ///
    /// Superseded/Deleted/Obsolete records are dropped with a debug line;
    /// Pending ones are surfaced as deferred-but-not-failed; anything else
    /// that is not Published is warned about and excluded.
    ///
    /// The whitelist is constant for a run, so the cache key is just the
    /// series name.
    pub fn usable_sources(
        &mut self,
        whitelist: &[String],
        series_name: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<UsableSources> {
        if let Some(cached) = self.usable.get(series_name) {
            return Ok(cached.clone());
        }
        let mut result = UsableSources::default();
        for source in self.published_sources(series_name, reporter)? {
            let name = &source.source_package_name;
            if !whitelist.iter().any(|w| w == name) {
                continue;
            }
            let version = &source.source_package_version;
            match &source.status {
                PublicationStatus::Published => {
                    result.usable.push((name.clone(), version.clone()));
                }
                PublicationStatus::Superseded
                | PublicationStatus::Deleted
                | PublicationStatus::Obsolete => {
                    reporter.debug(&format!(
                        "{name} {version} is {} in {series_name}",
                        source.status
                    ));
                }
                status => {
                    if *status == PublicationStatus::Pending {
                        result
                            .pending
                            .push(PendingEntry::new(name, version, PendingReason::Pending));
                    }
                    reporter.warn(&format!("{name} {version} is {status} in {series_name}"));
                }
            }
        }
        self.usable.insert(series_name.to_string(), result.clone());
        Ok(result)
    }

    /// Build records for (name, version) in a series; `None` if the source
    /// does not exist there.
    pub fn builds_for(
        &mut self,
        name: &str,
        version: &str,
        series_name: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<Option<Vec<Build>>> {
        let Some(source) = self.source_for(name, version, series_name, reporter)? else {
            return Ok(None);
        };
        reporter.debug(&format!("Listing {series_name} builds for {name} {version}..."));
        self.api.builds(&source).map(Some)
    }

    /// True only if every requested architecture has a published binary of
    /// this exact name and version.
    pub fn has_published_binaries(
        &mut self,
        name: &str,
        version: &str,
        series_name: &str,
        architectures: &[String],
        reporter: &mut dyn Reporter,
    ) -> Result<bool> {
        for architecture in architectures {
            let binaries = self.published_binaries(series_name, architecture, reporter)?;
            let present = binaries
                .iter()
                .any(|b| b.binary_package_name == name && b.binary_package_version == version);
            if !present {
                reporter.debug(&format!(
                    "{name} {version} has no published binary for {series_name} {architecture}"
                ));
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Add a copy request to the write batch; no network effect.
    pub fn queue_copy(
        &mut self,
        name: &str,
        source_series: &str,
        target_series: &str,
        pocket: &str,
    ) {
        self.queue
            .entry(CopyKey {
                source_series: source_series.to_string(),
                target_series: target_series.to_string(),
                pocket: pocket.to_string(),
            })
            .or_default()
            .insert(name.to_string());
    }

    /// Drain the copy queue.
    ///
    /// For each non-empty (source, target, pocket) group, either log what
    /// would be copied (dry run) or issue one copy call per package name,
    /// sorted; copying too many packages in one call makes the remote side
    /// fail with a 503. Each issued copy is reported as a "just copied"
    /// pending marker, since the operation is asynchronous server-side. The
    /// queue is emptied up front regardless of outcome.
    pub fn perform_queued_copies(
        &mut self,
        dry_run: bool,
        reporter: &mut dyn Reporter,
    ) -> Result<BTreeSet<PendingEntry>> {
        let queue = std::mem::take(&mut self.queue);
        let mut just_copied = BTreeSet::new();
        let mut first = true;
        for (key, names) in &queue {
            if names.is_empty() {
                continue;
            }
            if first {
                reporter.info("");
                first = false;
            }
            if dry_run {
                let joined = names.iter().cloned().collect::<Vec<_>>().join(", ");
                reporter.warn(&format!("Would copy {joined} to {}", key.target_series));
                continue;
            }
            let target = self.series(&key.target_series, reporter)?;
            for name in names {
                reporter.warn(&format!("Copying {name} to {}", key.target_series));
                self.api
                    .copy_sources(std::slice::from_ref(name), &target, &key.pocket)?;
                just_copied.insert(PendingEntry::new(name, "", PendingReason::JustCopied));
            }
        }
        Ok(just_copied)
    }

    /// Invalidate all caches except the series-name-to-handle map.
    pub fn clear_caches(&mut self, reporter: &mut dyn Reporter) {
        reporter.debug("Clearing caches...");
        self.sources.clear();
        self.binaries.clear();
        self.source_index.clear();
        self.usable.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{CollectingReporter, FakeArchive};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn published_sources_hit_the_network_once_per_series() {
        let mut fake = FakeArchive::new();
        fake.add_source("focal", "foo", "1", PublicationStatus::Published);
        let mut archive = CachedArchive::new(fake);
        let mut reporter = CollectingReporter::default();

        archive.published_sources("focal", &mut reporter).expect("sources");
        archive.published_sources("focal", &mut reporter).expect("sources");

        assert_eq!(archive.api().calls_matching("sources:focal"), 1);
    }

    #[test]
    fn clear_caches_forces_a_fresh_read_but_keeps_series_handles() {
        let mut fake = FakeArchive::new();
        fake.add_source("focal", "foo", "1", PublicationStatus::Published);
        let mut archive = CachedArchive::new(fake);
        let mut reporter = CollectingReporter::default();

        archive.published_sources("focal", &mut reporter).expect("sources");
        archive.clear_caches(&mut reporter);
        archive.published_sources("focal", &mut reporter).expect("sources");

        assert_eq!(archive.api().calls_matching("sources:focal"), 2);
        // Series lookup still served from cache after invalidation.
        assert_eq!(archive.api().calls_matching("series:focal"), 1);
    }

    #[test]
    fn source_index_serves_exact_version_lookups() {
        let mut fake = FakeArchive::new();
        fake.add_source("focal", "foo", "1", PublicationStatus::Published);
        fake.add_source("focal", "foo", "2", PublicationStatus::Superseded);
        let mut archive = CachedArchive::new(fake);
        let mut reporter = CollectingReporter::default();

        let found = archive
            .source_for("foo", "2", "focal", &mut reporter)
            .expect("lookup");
        assert_eq!(
            found.map(|s| s.status),
            Some(PublicationStatus::Superseded)
        );
        assert!(
            archive
                .source_for("foo", "3", "focal", &mut reporter)
                .expect("lookup")
                .is_none()
        );
        assert!(archive.is_missing("bar", "1", "focal", &mut reporter).expect("lookup"));
        // Both lookups reuse the one listing.
        assert_eq!(archive.api().calls_matching("sources:focal"), 1);
    }

    #[test]
    fn usable_sources_filters_by_status_and_whitelist() {
        let mut fake = FakeArchive::new();
        fake.add_source("focal", "foo", "1", PublicationStatus::Published);
        fake.add_source("focal", "bar", "2", PublicationStatus::Pending);
        fake.add_source("focal", "old", "0", PublicationStatus::Superseded);
        fake.add_source("focal", "odd", "9", PublicationStatus::Other("Frozen".to_string()));
        fake.add_source("focal", "stranger", "7", PublicationStatus::Published);
        let mut archive = CachedArchive::new(fake);
        let mut reporter = CollectingReporter::default();

        let sources = archive
            .usable_sources(&strings(&["foo", "bar", "old", "odd"]), "focal", &mut reporter)
            .expect("usable");

        assert_eq!(sources.usable, vec![("foo".to_string(), "1".to_string())]);
        assert_eq!(
            sources.pending,
            vec![PendingEntry::new("bar", "2", PendingReason::Pending)]
        );
        // Pending and unknown statuses warn; superseded only gets a debug line.
        assert!(reporter.warns.iter().any(|w| w == "bar 2 is pending in focal"));
        assert!(reporter.warns.iter().any(|w| w == "odd 9 is frozen in focal"));
        assert!(reporter.debugs.iter().any(|d| d == "old 0 is superseded in focal"));
        // Not whitelisted: never mentioned anywhere.
        assert!(!reporter.all_output().contains("stranger"));
    }

    #[test]
    fn binary_completeness_short_circuits_on_first_missing_arch() {
        let mut fake = FakeArchive::new();
        fake.add_source("focal", "foo", "1", PublicationStatus::Published);
        fake.add_binary("focal", "amd64", "foo", "1");
        let mut archive = CachedArchive::new(fake);
        let mut reporter = CollectingReporter::default();

        let complete = archive
            .has_published_binaries(
                "foo",
                "1",
                "focal",
                &strings(&["i386", "amd64"]),
                &mut reporter,
            )
            .expect("check");

        assert!(!complete);
        // Short-circuited on i386; amd64 never queried.
        assert_eq!(archive.api().calls_matching("binaries:focal:i386"), 1);
        assert_eq!(archive.api().calls_matching("binaries:focal:amd64"), 0);
    }

    #[test]
    fn builds_for_missing_source_is_none() {
        let fake = FakeArchive::new();
        let mut archive = CachedArchive::new(fake);
        let mut reporter = CollectingReporter::default();

        let builds = archive
            .builds_for("foo", "1", "focal", &mut reporter)
            .expect("builds");
        assert!(builds.is_none());
    }

    #[test]
    fn queued_copies_flush_sorted_one_call_per_name() {
        let mut fake = FakeArchive::new();
        fake.add_source("jammy", "anchor", "1", PublicationStatus::Published);
        let mut archive = CachedArchive::new(fake);
        let mut reporter = CollectingReporter::default();

        archive.queue_copy("zeta", "focal", "jammy", "Release");
        archive.queue_copy("alpha", "focal", "jammy", "Release");
        archive.queue_copy("alpha", "focal", "jammy", "Release");
        archive.queue_copy("beta", "focal", "noble", "Release");

        let pending = archive
            .perform_queued_copies(false, &mut reporter)
            .expect("flush");

        let copies = archive.api().copies.borrow().clone();
        assert_eq!(
            copies,
            vec![
                (vec!["alpha".to_string()], "jammy".to_string(), "Release".to_string()),
                (vec!["zeta".to_string()], "jammy".to_string(), "Release".to_string()),
                (vec!["beta".to_string()], "noble".to_string(), "Release".to_string()),
            ]
        );
        assert!(archive.queue().is_empty());
        assert_eq!(pending.len(), 3);
        assert!(pending.contains(&PendingEntry::new("alpha", "", PendingReason::JustCopied)));
    }

    #[test]
    fn dry_run_flush_reports_without_copying() {
        let mut archive = CachedArchive::new(FakeArchive::new());
        let mut reporter = CollectingReporter::default();

        archive.queue_copy("foo", "focal", "jammy", "Release");
        archive.queue_copy("bar", "focal", "jammy", "Release");
        let pending = archive
            .perform_queued_copies(true, &mut reporter)
            .expect("flush");

        assert!(archive.api().copies.borrow().is_empty());
        assert!(archive.queue().is_empty());
        assert!(pending.is_empty());
        assert!(reporter.warns.iter().any(|w| w == "Would copy bar, foo to jammy"));
    }

    #[test]
    fn flushing_an_empty_queue_is_silent() {
        let mut archive = CachedArchive::new(FakeArchive::new());
        let mut reporter = CollectingReporter::default();

        let pending = archive
            .perform_queued_copies(false, &mut reporter)
            .expect("flush");

        assert!(pending.is_empty());
        assert!(archive.api().copies.borrow().is_empty());
        assert!(reporter.infos.is_empty());
        assert!(reporter.warns.is_empty());
    }
}
