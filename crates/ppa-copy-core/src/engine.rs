use std::collections::{BTreeMap, BTreeSet};
use std::thread;

use anyhow::Result;
use ppa_copy_launchpad::{BuildState, PublicationStatus};

use crate::archive::{ArchiveApi, CachedArchive};
use crate::report::Reporter;
use crate::types::{CopySpec, PendingEntry, PendingReason, RuntimeOptions};

/// One reconciliation pass.
///
/// For every whitelisted, usable (package, version) in the source series and
/// every target series, decide between "already available", "copy now" and
/// "wait: reason". Eligible copies are queued and flushed at the end of the
/// pass; the returned set holds everything that could not be resolved yet.
pub fn reconcile<A: ArchiveApi>(
    archive: &mut CachedArchive<A>,
    spec: &CopySpec,
    dry_run: bool,
    reporter: &mut dyn Reporter,
) -> Result<BTreeSet<PendingEntry>> {
    let sources = archive.usable_sources(&spec.packages, &spec.source_series, reporter)?;
    let mut pending: BTreeSet<PendingEntry> = sources.pending.iter().cloned().collect();

    for (name, version) in &sources.usable {
        let mut mentioned = false;
        let mut notices: Vec<String> = Vec::new();

        for target in &spec.target_series {
            match archive.source_for(name, version, target, reporter)? {
                None => {
                    mentioned = true;
                    reporter.info(&format!("{name} {version} missing from {target}"));
                    if archive.has_published_binaries(
                        name,
                        version,
                        &spec.source_series,
                        &spec.architectures,
                        reporter,
                    )? {
                        archive.queue_copy(name, &spec.source_series, target, &spec.pocket);
                    } else if let Some(builds) =
                        archive.builds_for(name, version, &spec.source_series, reporter)?
                        && let Some(build) = builds.first()
                    {
                        if let Some(reason) = pending_reason_for_build(&build.buildstate) {
                            pending.insert(PendingEntry::new(name, version, reason));
                        }
                        reporter.info(&format!(
                            "  but binaries aren't published yet (state: {}) - {}",
                            build.buildstate, build.web_link
                        ));
                    }
                }
                Some(record) if record.status != PublicationStatus::Published => {
                    pending.insert(PendingEntry::new(
                        name,
                        version,
                        PendingReason::StatusInSeries {
                            status: record.status.to_string(),
                            series: target.clone(),
                        },
                    ));
                    notices.push(format!("  but it is {} in {target}", record.status));
                }
                Some(_) => {
                    if !archive.has_published_binaries(
                        name,
                        version,
                        target,
                        &spec.architectures,
                        reporter,
                    )? && let Some(builds) = archive.builds_for(name, version, target, reporter)?
                        && let Some(build) = builds.first()
                    {
                        if build.buildstate == BuildState::SuccessfullyBuilt {
                            pending.insert(PendingEntry::new(
                                name,
                                version,
                                PendingReason::Publishing,
                            ));
                        }
                        notices.push(format!(
                            "  but binaries aren't published yet for {target} (state: {}) - {}",
                            build.buildstate, build.web_link
                        ));
                    }
                }
            }
        }

        // Fully satisfied packages get the terse one-liner; anything that was
        // missing somewhere is already covered by its own log lines.
        if !mentioned || !notices.is_empty() {
            reporter.info(&format!("{name} {version}"));
            for notice in &notices {
                reporter.info(notice);
            }
        }
    }

    pending.extend(archive.perform_queued_copies(dry_run, reporter)?);
    Ok(pending)
}

/// Repeat [`reconcile`] until nothing is pending.
///
/// The loop is intentionally unbounded: it ends when the pending set drains,
/// when the caller opted out of waiting, or on dry runs. Otherwise it sleeps
/// a fixed interval, invalidates the read caches, and goes again. External
/// interruption is the only other way out.
pub fn run<A: ArchiveApi>(
    archive: &mut CachedArchive<A>,
    spec: &CopySpec,
    opts: &RuntimeOptions,
    reporter: &mut dyn Reporter,
) -> Result<BTreeSet<PendingEntry>> {
    loop {
        let pending = reconcile(archive, spec, opts.dry_run, reporter)?;
        if pending.is_empty() || !opts.wait || opts.dry_run {
            reporter.debug("All done");
            return Ok(pending);
        }

        let mut reasons: BTreeMap<&str, String> = BTreeMap::new();
        for entry in &pending {
            reasons.insert(entry.package.as_str(), entry.reason.to_string());
        }
        let waiting_on = reasons
            .iter()
            .map(|(package, reason)| format!("{package} ({reason})"))
            .collect::<Vec<_>>()
            .join(", ");
        reporter.warn(&format!(
            "\nWaiting for {waiting_on}: sleeping for {} seconds\n",
            opts.wait_interval.as_secs()
        ));
        thread::sleep(opts.wait_interval);
        archive.clear_caches(reporter);
    }
}

fn pending_reason_for_build(state: &BuildState) -> Option<PendingReason> {
    match state {
        BuildState::NeedsBuilding => Some(PendingReason::NeedsBuilding),
        BuildState::CurrentlyBuilding => Some(PendingReason::Building),
        BuildState::Uploading => Some(PendingReason::Uploading),
        BuildState::SuccessfullyBuilt => Some(PendingReason::Publishing),
        // Unknown build states cannot be classified; the package simply
        // stays unresolved this pass.
        BuildState::Other(_) => None,
    }
}
