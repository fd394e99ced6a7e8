//! Demo harness: drives a full shard lifecycle against the session ledger,
//! playing the journal-writer and request-dispatcher collaborators.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::process;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use sessionmap::session::{fire_completions, ClientInst, ClientMap, Completion, ReqId, Version};

/// Session mutation as it would be journaled by the shard.
#[derive(Debug, Serialize, Deserialize)]
enum SessionEvent {
    Mount { inst: ClientInst },
    Unmount { client: u64 },
}

/// In-memory stand-in for the write-ahead journal: staged entries tagged
/// with the projected version they were reserved under.
#[derive(Default)]
struct MockJournal {
    staged: Vec<(Version, Vec<u8>)>,
}

impl MockJournal {
    fn stage(&mut self, version: Version, event: &SessionEvent) {
        let payload = bincode::serialize(event).expect("session event serialization");
        self.staged.push((version, payload));
    }

    /// "Flush" all staged entries, returning the versions written.
    fn flush(&mut self) -> Vec<Version> {
        let mut versions = Vec::new();
        for (version, payload) in self.staged.drain(..) {
            // A real journal writes bytes here; we just prove they parse.
            let event: SessionEvent =
                bincode::deserialize(&payload).expect("session event deserialization");
            println!("  journal: wrote v{} {:?}", version, event);
            versions.push(version);
        }
        versions
    }
}

fn fail(msg: &str) -> ! {
    eprintln!("FATAL: {}", msg);
    process::exit(1);
}

fn inst(client: u64) -> ClientInst {
    ClientInst::new(client, 1, Ipv4Addr::new(10, 0, 0, client as u8), 6800)
}

fn main() {
    println!("=== session ledger demo ===\n");

    let mut map = ClientMap::new();
    let mut journal = MockJournal::default();

    // Phase 1: clients attach. Each mount reserves a projected version,
    // stages the event for the journal, then lands in the ledger.
    println!("Phase 1: mounting clients...");
    for client in [1u64, 2, 3] {
        let v = map.inc_projected();
        journal.stage(v, &SessionEvent::Mount { inst: inst(client) });
        map.add_mount(&inst(client));
        println!("  mounted client {} at v{}", client, v);
    }
    // Client 3 detaches straight away; that is a durable mutation too.
    let v = map.inc_projected();
    journal.stage(v, &SessionEvent::Unmount { client: 3 });
    map.rem_mount(3);
    println!("  unmounted client 3 at v{}", v);

    if map.get_version() != 4 || map.get_projected() != 4 {
        fail("version pipeline out of step after mounts");
    }

    // Phase 2: flush protocol. Waiters registered while committing fire
    // only after the journal confirms durability.
    println!("\nPhase 2: journal flush...");
    let flush_to = map.get_version();
    map.set_committing(flush_to);

    let released = Rc::new(RefCell::new(0u32));
    for _ in 0..2 {
        let r = released.clone();
        map.add_commit_waiter(Completion::new(move || *r.borrow_mut() += 1));
    }

    let written = journal.flush();
    map.set_committed(flush_to);
    let mut waiters = Vec::new();
    for v in written {
        map.take_commit_waiters(v, &mut waiters);
    }
    fire_completions(waiters);
    if *released.borrow() != 2 {
        fail("commit waiters not released after flush");
    }
    println!(
        "  committed v{}, {} waiters released",
        flush_to,
        released.borrow()
    );

    // Phase 3: request dedup. The dispatcher takes an open hold, executes
    // once, and answers the retry from the completed-request ledger.
    println!("\nPhase 3: retried request...");
    let req = ReqId::new(2, 10);
    map.add_open(req.client, &inst(req.client));
    if map.have_completed_request(req) {
        fail("fresh request already marked completed");
    }
    println!("  executing request {:?}", req);
    map.add_completed_request(req);
    map.dec_open(req.client);

    // The retry arrives on a new connection.
    if !map.have_completed_request(req) {
        fail("retry not recognized as completed");
    }
    println!("  retry of {:?} answered from ledger, not re-executed", req);

    // Phase 4: the client acks tid 10; trim reclaims the entry and wakes
    // whoever blocked on that reclamation.
    println!("\nPhase 4: trim...");
    let trimmed = Rc::new(RefCell::new(false));
    let t = trimmed.clone();
    map.add_trim_waiter(req, Completion::new(move || *t.borrow_mut() = true));
    map.trim_completed_requests(req.client, 11);
    if !*trimmed.borrow() || map.have_completed_request(req) {
        fail("trim did not reclaim the completed request");
    }
    println!("  trimmed client {} below tid 11, waiter released", req.client);

    // Phase 5: persistence. Reload collapses the pipeline counters to the
    // stored version; the journal is the source of truth beyond that.
    println!("\nPhase 5: encode/decode reload...");
    map.inc_projected(); // speculative state that must not survive
    let mut buf = Vec::new();
    map.encode(&mut buf);

    let mut reloaded = ClientMap::new();
    let mut off = 0;
    if let Err(e) = reloaded.decode(&buf, &mut off) {
        fail(&format!("decode failed: {}", e));
    }
    if reloaded.get_version() != map.get_version()
        || reloaded.get_mount_set() != map.get_mount_set()
        || reloaded.get_projected() != reloaded.get_version()
        || reloaded.get_committed() != reloaded.get_version()
    {
        fail("reloaded ledger does not match the recovery contract");
    }
    println!(
        "  reloaded v{}, {} mounted clients, pipeline reset ({} bytes)",
        reloaded.get_version(),
        reloaded.get_mount_set().len(),
        buf.len()
    );

    println!("\n=== demo complete ===");
}
