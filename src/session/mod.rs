//! Client-Session Ledger and Version Pipeline.
//!
//! This module owns the per-shard client bookkeeping:
//! - `ClientMap` maps client id → network identity with a reference count
//!   per client (mount and open holds share one count),
//! - a mount set of clients durably attached via this shard,
//! - a completed-request ledger for exactly-once request execution,
//! - a four-stage version pipeline coordinating with the journal writer.
//!
//! # Invariants
//!
//! 1. **Key-set equality**: `client_inst` and `client_ref` always hold the
//!    same set of client ids; `client_mount` is a subset of it.
//! 2. **Positive refcounts**: every entry in `client_ref` is ≥ 1; a client
//!    is evicted the instant its count reaches 0.
//! 3. **Durable versioning**: `version` advances by exactly 1 per mount or
//!    unmount, never for open/close holds.
//! 4. **Waiter delivery order**: commit waiters for one version fire in
//!    registration order; trim waiters fire in ascending tid order.
//!
//! All operations run on the shard's single processing loop; nothing here
//! blocks or locks. Suspension is expressed through [`Completion`] handles
//! that the collaborators fire after durability is confirmed.

pub mod client_map;
pub mod completion;
pub mod types;
pub mod wire;

#[cfg(test)]
mod tests;

pub use client_map::ClientMap;
pub use completion::{fire_completions, Completion};
pub use types::{ClientId, ClientInst, ReqId, Tid, Version};
pub use wire::WireError;
