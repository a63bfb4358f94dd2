//! In-memory fakes shared by the unit tests.

use std::cell::RefCell;
use std::collections::BTreeMap;

use anyhow::Result;
use ppa_copy_launchpad::{
    BinaryPublication, Build, BuildState, PublicationStatus, SourcePublication,
};

use crate::archive::{ArchiveApi, SeriesHandle};
use crate::report::Reporter;

/// In-memory [`ArchiveApi`] recording every raw call it serves.
#[derive(Default)]
pub(crate) struct FakeArchive {
    pub sources: BTreeMap<String, Vec<SourcePublication>>,
    pub binaries: BTreeMap<(String, String), Vec<BinaryPublication>>,
    pub builds: BTreeMap<String, Vec<Build>>,
    pub calls: RefCell<Vec<String>>,
    pub copies: RefCell<Vec<(Vec<String>, String, String)>>,
}

impl FakeArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(
        &mut self,
        series: &str,
        name: &str,
        version: &str,
        status: PublicationStatus,
    ) {
        self.sources
            .entry(series.to_string())
            .or_default()
            .push(SourcePublication {
                source_package_name: name.to_string(),
                source_package_version: version.to_string(),
                status,
                self_link: Self::source_link(series, name, version),
                distro_series_link: format!("https://fake/{series}"),
            });
    }

    pub fn add_binary(&mut self, series: &str, architecture: &str, name: &str, version: &str) {
        self.binaries
            .entry((series.to_string(), architecture.to_string()))
            .or_default()
            .push(BinaryPublication {
                binary_package_name: name.to_string(),
                binary_package_version: version.to_string(),
                status: PublicationStatus::Published,
            });
    }

    pub fn add_build(&mut self, series: &str, name: &str, version: &str, state: BuildState) {
        self.builds
            .entry(Self::source_link(series, name, version))
            .or_default()
            .push(Build {
                buildstate: state,
                web_link: format!("https://fake/builds/{series}/{name}/{version}"),
            });
    }

    /// How many raw calls matched this exact label.
    pub fn calls_matching(&self, label: &str) -> usize {
        self.calls.borrow().iter().filter(|c| *c == label).count()
    }

    fn source_link(series: &str, name: &str, version: &str) -> String {
        format!("https://fake/{series}/+sourcepub/{name}/{version}")
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl ArchiveApi for FakeArchive {
    fn series(&self, name: &str) -> Result<SeriesHandle> {
        self.record(format!("series:{name}"));
        Ok(SeriesHandle {
            name: name.to_string(),
            link: format!("https://fake/{name}"),
        })
    }

    fn published_sources(&self, series: &SeriesHandle) -> Result<Vec<SourcePublication>> {
        self.record(format!("sources:{}", series.name));
        Ok(self.sources.get(&series.name).cloned().unwrap_or_default())
    }

    fn published_binaries(
        &self,
        series: &SeriesHandle,
        architecture: &str,
    ) -> Result<Vec<BinaryPublication>> {
        self.record(format!("binaries:{}:{architecture}", series.name));
        Ok(self
            .binaries
            .get(&(series.name.clone(), architecture.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn builds(&self, source: &SourcePublication) -> Result<Vec<Build>> {
        self.record(format!("builds:{}", source.self_link));
        Ok(self.builds.get(&source.self_link).cloned().unwrap_or_default())
    }

    fn copy_sources(&self, names: &[String], target: &SeriesHandle, pocket: &str) -> Result<()> {
        self.record(format!("copy:{}:{}", names.join(","), target.name));
        self.copies.borrow_mut().push((
            names.to_vec(),
            target.name.clone(),
            pocket.to_string(),
        ));
        Ok(())
    }
}

/// Reporter that collects everything for assertions.
#[derive(Default)]
pub(crate) struct CollectingReporter {
    pub debugs: Vec<String>,
    pub infos: Vec<String>,
    pub warns: Vec<String>,
    pub errors: Vec<String>,
}

impl CollectingReporter {
    pub fn all_output(&self) -> String {
        self.debugs
            .iter()
            .chain(&self.infos)
            .chain(&self.warns)
            .chain(&self.errors)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Reporter for CollectingReporter {
    fn debug(&mut self, msg: &str) {
        self.debugs.push(msg.to_string());
    }

    fn info(&mut self, msg: &str) {
        self.infos.push(msg.to_string());
    }

    fn warn(&mut self, msg: &str) {
        self.warns.push(msg.to_string());
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(msg.to_string());
    }
}
