//! # ppa-copy-core
//!
//! Core library behind the `ppa-copy` CLI: copy published PPA packages from
//! one release series pocket to others within the same archive.
//!
//! Two layers compose the core:
//!
//! 1. [`archive::CachedArchive`] wraps all read operations against the
//!    archive service behind memoizing accessors, so repeated reconciliation
//!    passes (e.g. while waiting for pending builds) do not re-issue
//!    identical network calls unless explicitly invalidated. It also owns the
//!    copy-request queue, drained as a batch per (source, target, pocket).
//! 2. [`engine::reconcile`] consumes the cached state to decide, per package
//!    and per target series, one of "already available", "copy now", or
//!    "wait: reason", and [`engine::run`] repeats that pass on a fixed
//!    interval until nothing is pending.
//!
//! The archive service itself sits behind the [`archive::ArchiveApi`] seam;
//! the production implementation delegates to
//! [`ppa_copy_launchpad::LaunchpadClient`], and tests substitute in-memory
//! fakes.
//!
//! All I/O is single-threaded and blocking; the only suspension point
//! besides network calls is the fixed sleep between polling passes.

/// Cached archive state, the `ArchiveApi` seam, and the copy queue.
pub mod archive;

/// Configuration file (`.ppa-copy.toml`) loading.
pub mod config;

/// Reconciliation pass and polling loop.
pub mod engine;

/// Reporter trait decoupling the engine from output.
pub mod report;

/// Domain types: copy specs, runtime options, pending entries.
pub mod types;


#[cfg(test)]
pub(crate) mod testutil;
