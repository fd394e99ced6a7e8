//! Client-session and commit-versioning ledger for a metadata server shard.
//!
//! The [`session::ClientMap`] aggregate tracks which remote clients are
//! attached (mounted or held open), deduplicates replayed client requests,
//! and stages ledger versions through a four-counter pipeline
//! (`version` → `projected` → `committing` → `committed`) coordinated with
//! an external journal writer. See the module docs in [`session`] for the
//! invariants each piece upholds.

pub mod session;
