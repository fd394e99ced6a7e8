//! Session ledger integration tests: commit/trim waiter protocols,
//! persistence round-trips, and randomized invariant sweeps.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::rc::Rc;

use rand::Rng;

use super::client_map::ClientMap;
use super::completion::{fire_completions, Completion};
use super::types::{ClientId, ClientInst, ReqId};

fn inst(client: ClientId) -> ClientInst {
    ClientInst::new(client, 7, Ipv4Addr::new(10, 1, 0, (client % 250) as u8), 6800)
}

/// Shared hit counter for observing completion delivery.
fn counter() -> (Rc<RefCell<u32>>, impl Fn() -> Completion) {
    let hits = Rc::new(RefCell::new(0u32));
    let h = hits.clone();
    let make = move || {
        let h = h.clone();
        Completion::new(move || *h.borrow_mut() += 1)
    };
    (hits, make)
}

/// Test: commit waiters register against the version currently committing
/// and are drained exactly once after the journal confirms durability.
#[test]
fn test_commit_waiter_pipeline() {
    let mut map = ClientMap::new();
    let (hits, make) = counter();

    // Three durable mutations staged ahead of the flush.
    for c in [1u64, 2, 3] {
        map.add_mount(&inst(c));
    }
    assert_eq!(map.get_version(), 3);

    map.set_committing(3);
    map.add_commit_waiter(make());
    map.add_commit_waiter(make());

    // Flush confirms: journal writer sets committed, then drains and fires.
    map.set_committed(3);
    let mut out = Vec::new();
    map.take_commit_waiters(3, &mut out);
    assert_eq!(out.len(), 2);
    fire_completions(out);
    assert_eq!(*hits.borrow(), 2);

    // Key removed with its waiters: a second take finds nothing.
    let mut again = Vec::new();
    map.take_commit_waiters(3, &mut again);
    assert!(again.is_empty());
}

/// Test: take_commit_waiters appends, so a writer confirming several
/// versions at once can batch every release into one delivery pass.
#[test]
fn test_commit_waiter_batched_delivery() {
    let mut map = ClientMap::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    for v in 1u64..=3 {
        map.set_committing(v);
        let o = order.clone();
        map.add_commit_waiter(Completion::new(move || o.borrow_mut().push(v)));
    }

    map.set_committed(3);
    let mut out = Vec::new();
    for v in 1u64..=3 {
        map.take_commit_waiters(v, &mut out);
    }
    assert_eq!(out.len(), 3);
    fire_completions(out);
    assert_eq!(*order.borrow(), vec![1, 2, 3]);
}

/// Test: a trim waiter fires exactly once, when a trim advances past its
/// tid, and never re-fires on later trims.
#[test]
fn test_trim_waiter_fires_once() {
    let mut map = ClientMap::new();
    let (hits, make) = counter();

    map.add_completed_request(ReqId::new(5, 10));
    map.add_trim_waiter(ReqId::new(5, 10), make());

    // Not past tid 10 yet.
    map.trim_completed_requests(5, 10);
    assert_eq!(*hits.borrow(), 0);

    map.add_completed_request(ReqId::new(5, 12));
    map.trim_completed_requests(5, 15);
    assert_eq!(*hits.borrow(), 1);

    map.add_completed_request(ReqId::new(5, 20));
    map.trim_completed_requests(5, 25);
    assert_eq!(*hits.borrow(), 1);
}

/// Test: trim-all (mintid 0) clears the client's ledger entry and releases
/// every registered trim waiter.
#[test]
fn test_trim_all_releases_waiters() {
    let mut map = ClientMap::new();
    let (hits, make) = counter();

    for tid in [3u64, 9, 40] {
        map.add_completed_request(ReqId::new(8, tid));
        map.add_trim_waiter(ReqId::new(8, tid), make());
    }

    map.trim_completed_requests(8, 0);
    assert_eq!(*hits.borrow(), 3);
    assert!(!map.have_completed_request(ReqId::new(8, 3)));
    assert!(!map.have_completed_request(ReqId::new(8, 40)));
}

/// Test: trim on a client with no completed entry is a full no-op: even
/// its registered waiters stay parked.
#[test]
fn test_trim_unknown_client_is_noop() {
    let mut map = ClientMap::new();
    let (hits, make) = counter();

    map.add_trim_waiter(ReqId::new(5, 10), make());
    map.trim_completed_requests(5, 100);
    assert_eq!(*hits.borrow(), 0);

    // First completion unblocks delivery on the next trim.
    map.add_completed_request(ReqId::new(5, 11));
    map.trim_completed_requests(5, 100);
    assert_eq!(*hits.borrow(), 1);
}

/// Test: re-registering a trim waiter for the same key displaces the old
/// handle without firing it.
#[test]
fn test_trim_waiter_overwrite_drops_old() {
    let mut map = ClientMap::new();
    let (old_hits, make_old) = counter();
    let (new_hits, make_new) = counter();

    map.add_completed_request(ReqId::new(2, 4));
    map.add_trim_waiter(ReqId::new(2, 4), make_old());
    map.add_trim_waiter(ReqId::new(2, 4), make_new());

    map.trim_completed_requests(2, 5);
    assert_eq!(*old_hits.borrow(), 0);
    assert_eq!(*new_hits.borrow(), 1);
}

/// Test: trim waiters for one client fire in ascending tid order.
#[test]
fn test_trim_waiters_fire_in_tid_order() {
    let mut map = ClientMap::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    map.add_completed_request(ReqId::new(6, 1));
    for tid in [30u64, 10, 20] {
        let o = order.clone();
        map.add_trim_waiter(ReqId::new(6, tid), Completion::new(move || {
            o.borrow_mut().push(tid)
        }));
    }

    map.trim_completed_requests(6, 25);
    assert_eq!(*order.borrow(), vec![10, 20]);
}

/// Test: encode/decode round-trip reproduces version and the session
/// ledger exactly, and resets the pipeline counters to the loaded version.
#[test]
fn test_persistence_roundtrip() {
    let mut map = ClientMap::new();
    for c in [11u64, 4, 8] {
        map.add_mount(&inst(c));
    }
    map.add_open(4, &inst(4));
    map.rem_mount(8); // single reference: evicted entirely
    map.add_completed_request(ReqId::new(4, 99));

    // Pipeline state that must NOT survive a reload.
    map.inc_projected();
    map.inc_projected();
    map.set_committing(3);
    map.set_committed(2);

    let mut buf = Vec::new();
    map.encode(&mut buf);

    let mut loaded = ClientMap::new();
    let mut off = 0;
    loaded.decode(&buf, &mut off).unwrap();
    assert_eq!(off, buf.len());

    assert_eq!(loaded.get_version(), map.get_version());
    assert_eq!(loaded.get_mount_set(), map.get_mount_set());
    assert_eq!(*loaded.get_inst(11), inst(11));
    assert_eq!(*loaded.get_inst(4), inst(4));

    // Counters collapse to the loaded version.
    assert_eq!(loaded.get_projected(), loaded.get_version());
    assert_eq!(loaded.get_committing(), loaded.get_version());
    assert_eq!(loaded.get_committed(), loaded.get_version());

    // The completed-request ledger is not part of the format.
    assert!(!loaded.have_completed_request(ReqId::new(4, 99)));
}

/// Test: decode consumes exactly the encoded bytes, so a ClientMap image
/// can sit inside a larger journal entry and the cursor lands on whatever
/// follows it.
#[test]
fn test_decode_advances_cursor_within_larger_buffer() {
    let mut map = ClientMap::new();
    map.add_mount(&inst(1));

    let mut buf = vec![0xAAu8; 5]; // unrelated prefix
    let start = buf.len();
    map.encode(&mut buf);
    let encoded_len = buf.len() - start;
    buf.extend_from_slice(&[0xBB; 3]); // unrelated suffix

    let mut loaded = ClientMap::new();
    let mut off = start;
    loaded.decode(&buf, &mut off).unwrap();
    assert_eq!(off, start + encoded_len);
    assert_eq!(loaded.get_version(), 1);
}

/// Randomized sweep: arbitrary interleavings of mount/unmount/open/close
/// preserve the structural invariants after every single operation.
#[test]
fn test_random_session_churn_invariants() {
    let mut rng = rand::thread_rng();
    let mut map = ClientMap::new();

    // Model state: per-client (mounts, opens) held.
    let mut held: HashMap<ClientId, (u32, u32)> = HashMap::new();
    let mut expected_version = 0u64;

    for _ in 0..5000 {
        let client = rng.gen_range(0..8u64);
        let (mounts, opens) = held.entry(client).or_insert((0, 0));

        match rng.gen_range(0..4u8) {
            0 => {
                map.add_mount(&inst(client));
                *mounts += 1;
                expected_version += 1;
            }
            1 if *mounts > 0 => {
                map.rem_mount(client);
                *mounts -= 1;
                expected_version += 1;
            }
            2 => {
                map.add_open(client, &inst(client));
                *opens += 1;
            }
            3 if *opens > 0 => {
                map.dec_open(client);
                *opens -= 1;
            }
            _ => continue,
        }

        // Invariant: version counts durable mutations only.
        assert_eq!(map.get_version(), expected_version);

        // Invariant: key-set equality and refcount accounting.
        for (c, (m, o)) in &held {
            let refs = m + o;
            if refs > 0 {
                assert_eq!(*map.get_inst(*c), inst(*c));
            } else {
                assert!(!map.get_mount_set().contains(c));
            }
            // A mounted client always holds at least one reference.
            if map.get_mount_set().contains(c) {
                assert!(refs > 0);
            }
        }

        // Invariant: reset_projected re-anchors to version.
        if rng.gen_range(0..10u8) == 0 {
            map.inc_projected();
            map.reset_projected();
            assert_eq!(map.get_projected(), map.get_version());
        }
    }

    // Drain everything; the ledger must read empty again.
    for (c, (m, o)) in held {
        for _ in 0..m {
            map.rem_mount(c);
        }
        for _ in 0..o {
            map.dec_open(c);
        }
    }
    assert!(map.empty());
}
