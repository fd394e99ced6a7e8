//! The `ClientMap` aggregate: session ledger, version pipeline,
//! completed-request ledger, and the positional wire encoding.
//!
//! One logical instance exists per metadata server shard. All mutation
//! runs on the shard's single processing loop; collaborators that break a
//! contract (unknown client, refcount underflow, identity collision) hit
//! a panic rather than a recoverable error, because those states mean the
//! shard's bookkeeping can no longer be trusted.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::completion::{fire_completions, Completion};
use super::types::{ClientId, ClientInst, ReqId, Tid, Version};
use super::wire::{self, WireError};

/// Per-shard client session and versioning ledger.
///
/// Clients stay known for two independent reasons (a durable mount, and a
/// transient open hold taken while processing on the client's behalf)
/// multiplexed over one reference count so neither reason's release can
/// evict an identity the other still needs.
#[derive(Default)]
pub struct ClientMap {
    // -- version pipeline --
    /// Count of durable ledger mutations (mounts/unmounts).
    version: Version,
    /// Caller-managed lookahead ≥ version; reserves future version slots.
    projected: Version,
    /// Version the journal writer is currently flushing.
    committing: Version,
    /// Last version the journal writer confirmed durable.
    committed: Version,
    /// Waiters per version; a present key always has a non-empty list.
    commit_waiters: BTreeMap<Version, Vec<Completion>>,

    // -- session ledger --
    client_inst: HashMap<ClientId, ClientInst>,
    client_mount: BTreeSet<ClientId>,
    client_ref: HashMap<ClientId, u32>,

    // -- completed requests --
    completed_requests: HashMap<ClientId, BTreeSet<Tid>>,
    waiting_for_trim: HashMap<ClientId, BTreeMap<Tid, Completion>>,
}

impl ClientMap {
    pub fn new() -> Self {
        ClientMap::default()
    }

    // =========================================================================
    // VERSION PIPELINE
    // =========================================================================

    pub fn get_version(&self) -> Version {
        self.version
    }

    pub fn get_projected(&self) -> Version {
        self.projected
    }

    pub fn get_committing(&self) -> Version {
        self.committing
    }

    pub fn get_committed(&self) -> Version {
        self.committed
    }

    /// Reserve the next future version slot; returns the reserved value.
    pub fn inc_projected(&mut self) -> Version {
        self.projected += 1;
        self.projected
    }

    /// Abort speculative reservations, rolling `projected` back to `version`.
    pub fn reset_projected(&mut self) {
        self.projected = self.version;
    }

    /// Journal writer: flush of version `v` has begun.
    pub fn set_committing(&mut self, v: Version) {
        self.committing = v;
    }

    /// Journal writer: version `v` is confirmed durable.
    pub fn set_committed(&mut self, v: Version) {
        self.committed = v;
    }

    /// Register a waiter against whatever version is currently committing.
    pub fn add_commit_waiter(&mut self, c: Completion) {
        self.commit_waiters.entry(self.committing).or_default().push(c);
    }

    /// Drain all waiters registered under version `v` into `out`, removing
    /// the key. Appends, so the journal writer can batch several confirmed
    /// versions and fire everything together after `set_committed`.
    pub fn take_commit_waiters(&mut self, v: Version, out: &mut Vec<Completion>) {
        if let Some(mut ls) = self.commit_waiters.remove(&v) {
            out.append(&mut ls);
        }
    }

    // =========================================================================
    // SESSION LEDGER
    // =========================================================================

    fn inc_ref(&mut self, client: ClientId, inst: &ClientInst) {
        match self.client_inst.get(&client) {
            Some(known) => {
                assert_eq!(
                    known, inst,
                    "identity collision for client {}: ledger holds a different inst",
                    client
                );
                assert!(self.client_ref.contains_key(&client));
            }
            None => {
                self.client_inst.insert(client, *inst);
            }
        }
        *self.client_ref.entry(client).or_insert(0) += 1;
    }

    fn dec_ref(&mut self, client: ClientId) {
        let count = self
            .client_ref
            .get_mut(&client)
            .unwrap_or_else(|| panic!("refcount underflow: client {} not referenced", client));
        assert!(*count > 0);
        *count -= 1;
        if *count == 0 {
            self.client_ref.remove(&client);
            self.client_inst.remove(&client);
        }
    }

    /// True iff no client is known, mounted, or referenced.
    pub fn empty(&self) -> bool {
        self.client_inst.is_empty() && self.client_mount.is_empty() && self.client_ref.is_empty()
    }

    /// Identity of a known client. Panics if the client is unknown: the
    /// caller holds no reference and has no business asking.
    pub fn get_inst(&self, client: ClientId) -> &ClientInst {
        self.client_inst
            .get(&client)
            .unwrap_or_else(|| panic!("get_inst on unknown client {}", client))
    }

    /// Clients currently mounted via this shard.
    pub fn get_mount_set(&self) -> &BTreeSet<ClientId> {
        &self.client_mount
    }

    /// Durable attach: take a reference under `inst`'s owner, add it to the
    /// mount set, and bump `version`.
    pub fn add_mount(&mut self, inst: &ClientInst) {
        let client = inst.owner_id();
        self.inc_ref(client, inst);
        self.client_mount.insert(client);
        self.version += 1;
    }

    /// Durable detach: release one reference, leave the mount set, and bump
    /// `version`. Panics on refcount underflow.
    pub fn rem_mount(&mut self, client: ClientId) {
        self.dec_ref(client);
        self.client_mount.remove(&client);
        self.version += 1;
    }

    /// Transient hold while processing on the client's behalf. Does not
    /// touch the mount set and does not bump `version`.
    pub fn add_open(&mut self, client: ClientId, inst: &ClientInst) {
        self.inc_ref(client, inst);
    }

    /// Release a transient hold. Does not bump `version`.
    pub fn dec_open(&mut self, client: ClientId) {
        self.dec_ref(client);
    }

    // =========================================================================
    // COMPLETED REQUESTS
    // =========================================================================

    /// Record that `reqid` has been executed. Idempotent.
    pub fn add_completed_request(&mut self, reqid: ReqId) {
        self.completed_requests
            .entry(reqid.client)
            .or_default()
            .insert(reqid.tid);
    }

    /// Has `reqid` already been executed? Request dispatch must consult
    /// this before re-executing a retried request.
    pub fn have_completed_request(&self, reqid: ReqId) -> bool {
        self.completed_requests
            .get(&reqid.client)
            .is_some_and(|tids| tids.contains(&reqid.tid))
    }

    /// Drop every completed tid below `mintid` for `client`, then deliver
    /// the trim waiters whose tid the trim advanced past. `mintid == 0`
    /// trims everything and releases every waiter. No-op (including no
    /// waiter delivery) when the client has no completed entry.
    pub fn trim_completed_requests(&mut self, client: ClientId, mintid: Tid) {
        let tids = match self.completed_requests.get_mut(&client) {
            Some(tids) => tids,
            None => return,
        };

        // trim
        if mintid == 0 {
            tids.clear();
        } else {
            *tids = tids.split_off(&mintid);
        }
        if tids.is_empty() {
            self.completed_requests.remove(&client);
        }

        // kick waiters, in tid order
        if let Some(waiters) = self.waiting_for_trim.get_mut(&client) {
            let fired = if mintid == 0 {
                std::mem::take(waiters)
            } else {
                let keep = waiters.split_off(&mintid);
                std::mem::replace(waiters, keep)
            };
            if waiters.is_empty() {
                self.waiting_for_trim.remove(&client);
            }
            fire_completions(fired.into_values().collect());
        }
    }

    /// Register `c` to fire once a trim advances past `reqid.tid`. A waiter
    /// already registered for the same key is displaced without firing.
    pub fn add_trim_waiter(&mut self, reqid: ReqId, c: Completion) {
        if let Some(old) = self
            .waiting_for_trim
            .entry(reqid.client)
            .or_default()
            .insert(reqid.tid, c)
        {
            old.cancel();
        }
    }

    // =========================================================================
    // WIRE ENCODING
    // =========================================================================

    /// Append the persistent form to `buf`:
    /// `[version][client_inst][client_mount][client_ref]`, little-endian,
    /// `u32` element counts, entries in ascending client order. Pipeline
    /// counters, completed requests, and waiters are not persisted; the
    /// journal is the source of truth beyond `version`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        wire::put_u64(buf, self.version);

        let mut clients: Vec<ClientId> = self.client_inst.keys().copied().collect();
        clients.sort_unstable();
        wire::put_u32(buf, clients.len() as u32);
        for client in &clients {
            wire::put_u64(buf, *client);
            self.client_inst[client].encode(buf);
        }

        wire::put_u32(buf, self.client_mount.len() as u32);
        for client in &self.client_mount {
            wire::put_u64(buf, *client);
        }

        let mut refs: Vec<(ClientId, u32)> =
            self.client_ref.iter().map(|(c, n)| (*c, *n)).collect();
        refs.sort_unstable();
        wire::put_u32(buf, refs.len() as u32);
        for (client, count) in &refs {
            wire::put_u64(buf, *client);
            wire::put_u32(buf, *count);
        }
    }

    /// Read the persistent form from `buf` at `*off`, advancing the cursor
    /// past the bytes consumed. On success the three pipeline counters are
    /// reset to the loaded `version`: no speculative or pending-commit
    /// state survives a reload.
    pub fn decode(&mut self, buf: &[u8], off: &mut usize) -> Result<(), WireError> {
        let version = wire::get_u64(buf, off)?;

        let mut client_inst = HashMap::new();
        let count = wire::get_u32(buf, off)?;
        for _ in 0..count {
            let client = wire::get_u64(buf, off)?;
            let inst = ClientInst::decode(buf, off)?;
            client_inst.insert(client, inst);
        }

        let mut client_mount = BTreeSet::new();
        let count = wire::get_u32(buf, off)?;
        for _ in 0..count {
            client_mount.insert(wire::get_u64(buf, off)?);
        }

        let mut client_ref = HashMap::new();
        let count = wire::get_u32(buf, off)?;
        for _ in 0..count {
            let client = wire::get_u64(buf, off)?;
            let refs = wire::get_u32(buf, off)?;
            client_ref.insert(client, refs);
        }

        self.version = version;
        self.client_inst = client_inst;
        self.client_mount = client_mount;
        self.client_ref = client_ref;

        self.projected = version;
        self.committing = version;
        self.committed = version;
        Ok(())
    }
}
