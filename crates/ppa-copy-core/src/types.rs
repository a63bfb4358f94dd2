use std::fmt;
use std::time::Duration;

/// What to copy, from where, to where.
#[derive(Debug, Clone)]
pub struct CopySpec {
    /// Owner of the PPA (`~owner`).
    pub owner: String,
    /// Name of the PPA within the owner's archives.
    pub ppa_name: String,
    /// Whitelist of source package names; nothing outside it is touched.
    pub packages: Vec<String>,
    /// Series the packages were uploaded and built in.
    pub source_series: String,
    /// Series to copy into, in caller-supplied order.
    pub target_series: Vec<String>,
    /// Architectures that must have published binaries before a copy.
    pub architectures: Vec<String>,
    /// Pocket the copies are targeted at.
    pub pocket: String,
}

/// Runtime knobs orthogonal to the copy spec.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Log what would be copied without issuing any copy.
    pub dry_run: bool,
    /// Keep re-reconciling until nothing is pending.
    pub wait: bool,
    /// Fixed sleep between reconciliation passes.
    pub wait_interval: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            wait: false,
            wait_interval: Duration::from_secs(60),
        }
    }
}

/// Why a package could not be resolved this pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PendingReason {
    /// Source publication exists but is not Published yet.
    Pending,
    /// A copy was just issued; the result is not visible yet.
    JustCopied,
    /// Source-series build has not started.
    NeedsBuilding,
    /// Source-series build is running.
    Building,
    /// Build artifacts are being uploaded.
    Uploading,
    /// Built successfully but binaries are not published yet.
    Publishing,
    /// The target series has a record in some non-Published status.
    StatusInSeries { status: String, series: String },
}

impl fmt::Display for PendingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingReason::Pending => f.write_str("pending"),
            PendingReason::JustCopied => f.write_str("just copied"),
            PendingReason::NeedsBuilding => f.write_str("needs building"),
            PendingReason::Building => f.write_str("building"),
            PendingReason::Uploading => f.write_str("uploading"),
            PendingReason::Publishing => f.write_str("publishing"),
            PendingReason::StatusInSeries { status, series } => {
                write!(f, "{status} in {series}")
            }
        }
    }
}

/// A package that cannot be resolved yet, with the reason.
///
/// The pending set is rebuilt fresh every reconciliation pass and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PendingEntry {
    pub package: String,
    pub version: String,
    pub reason: PendingReason,
}

impl PendingEntry {
    pub fn new(package: &str, version: &str, reason: PendingReason) -> Self {
        Self {
            package: package.to_string(),
            version: version.to_string(),
            reason,
        }
    }
}

/// Result of filtering a series' publications down to the whitelist.
#[derive(Debug, Clone, Default)]
pub struct UsableSources {
    /// (name, version) pairs with a Published source record.
    pub usable: Vec<(String, String)>,
    /// Whitelisted sources that exist but are still Pending.
    pub pending: Vec<PendingEntry>,
}
