//! Identifier types and client identity records.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::wire::{self, WireError};

/// Integer identity of a connected remote client.
pub type ClientId = u64;

/// Monotonically increasing ledger version number.
pub type Version = u64;

/// Per-client monotonically increasing request sequence number.
pub type Tid = u64;

/// Key identifying one client request: (client, per-client tid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReqId {
    /// Issuing client.
    pub client: ClientId,
    /// Request sequence number within that client's session.
    pub tid: Tid,
}

impl ReqId {
    pub fn new(client: ClientId, tid: Tid) -> Self {
        ReqId { client, tid }
    }
}

/// Network identity record for a client.
///
/// Remembered by the shard while it holds any reference to the client so
/// the client can be contacted (or its requests attributed) without going
/// back to the network layer.
///
/// # Wire layout (22 bytes, little-endian)
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       8     client (owner id)
/// 8       8     nonce (process incarnation)
/// 16      4     addr (IPv4 octets)
/// 20      2     port
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInst {
    /// Owning client id.
    pub client: ClientId,
    /// Incarnation nonce distinguishing restarts of the same client.
    pub nonce: u64,
    /// Address the client is reachable at.
    pub addr: Ipv4Addr,
    /// Port the client is reachable at.
    pub port: u16,
}

/// Encoded size of a `ClientInst`.
pub const INST_SIZE: usize = 22;

impl ClientInst {
    pub fn new(client: ClientId, nonce: u64, addr: Ipv4Addr, port: u16) -> Self {
        ClientInst {
            client,
            nonce,
            addr,
            port,
        }
    }

    /// The client id this identity belongs to.
    pub fn owner_id(&self) -> ClientId {
        self.client
    }

    /// Append the 22-byte wire form to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        wire::put_u64(buf, self.client);
        wire::put_u64(buf, self.nonce);
        buf.extend_from_slice(&self.addr.octets());
        wire::put_u16(buf, self.port);
    }

    /// Read a 22-byte wire form from `buf` at `*off`, advancing the cursor.
    pub fn decode(buf: &[u8], off: &mut usize) -> Result<Self, WireError> {
        let client = wire::get_u64(buf, off)?;
        let nonce = wire::get_u64(buf, off)?;
        let octets = wire::get_bytes::<4>(buf, off)?;
        let port = wire::get_u16(buf, off)?;
        Ok(ClientInst {
            client,
            nonce,
            addr: Ipv4Addr::from(octets),
            port,
        })
    }
}
