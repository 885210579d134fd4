//! UDP audience
//!
//! Peers come from the `[[recipients]]` config table and are managed at
//! runtime through the `/recipients` control routes. Each is reached at a
//! UDP address. Implements both the registry and the sink. Sends are non-blocking; a
//! frame that would block is dropped, since a late voice frame is useless.
//!
//! Datagram layout (big-endian):
//!
//! ```text
//! owner id (u32) | channel (u8) | payload length (u16) | payload
//! ```

use crate::config::RecipientConfig;
use crate::delivery::{DeliverySink, Recipient, RecipientRegistry};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use serde::Serialize;
use std::net::{SocketAddr, UdpSocket};
use std::sync::RwLock;
use tracing::{debug, trace};
use voxstream_common::{BroadcastChannel, OwnerId, RecipientId};

/// Bytes preceding the payload in every datagram
pub const HEADER_LEN: usize = 7;

#[derive(Debug, Clone, Copy)]
struct Peer {
    addr: SocketAddr,
    ready: bool,
}

/// A registered peer, as reported by the control API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeerInfo {
    pub id: RecipientId,
    pub addr: SocketAddr,
    pub ready: bool,
}

/// UDP-backed recipient registry and delivery sink
pub struct UdpAudience {
    socket: UdpSocket,
    peers: RwLock<BTreeMap<RecipientId, Peer>>,
}

impl UdpAudience {
    /// Bind a non-blocking socket and register the configured peers as ready
    pub fn bind(local: SocketAddr, recipients: &[RecipientConfig]) -> Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        debug!("UDP audience bound to {}", socket.local_addr()?);

        let peers = recipients
            .iter()
            .map(|r| {
                (
                    r.id,
                    Peer {
                        addr: r.addr,
                        ready: true,
                    },
                )
            })
            .collect();

        Ok(Self {
            socket,
            peers: RwLock::new(peers),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Register (or re-address) a peer; it starts out ready
    pub fn add_peer(&self, id: RecipientId, addr: SocketAddr) {
        self.peers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Peer { addr, ready: true });
        debug!("Peer {} registered at {}", id, addr);
    }

    pub fn remove_peer(&self, id: RecipientId) -> bool {
        self.peers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some()
    }

    /// Mark a peer (not) ready; returns false if unknown
    pub fn set_ready(&self, id: RecipientId, ready: bool) -> bool {
        match self
            .peers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&id)
        {
            Some(peer) => {
                peer.ready = ready;
                true
            }
            None => false,
        }
    }

    /// Registered peers in id order
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, peer)| PeerInfo {
                id: *id,
                addr: peer.addr,
                ready: peer.ready,
            })
            .collect()
    }
}

/// Build a datagram into `out`
pub fn encode_datagram(owner: OwnerId, channel: BroadcastChannel, payload: &[u8], out: &mut Vec<u8>) {
    out.clear();
    out.extend_from_slice(&owner.0.to_be_bytes());
    out.push(channel.as_u8());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
}

impl RecipientRegistry for UdpAudience {
    fn snapshot(&self, out: &mut Vec<Recipient>) {
        out.clear();
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        out.extend(peers.iter().map(|(id, peer)| Recipient {
            id: *id,
            ready: peer.ready,
        }));
    }
}

impl DeliverySink for UdpAudience {
    fn send(
        &self,
        recipient: RecipientId,
        owner: OwnerId,
        channel: BroadcastChannel,
        payload: &[u8],
    ) -> Result<()> {
        let addr = self
            .peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&recipient)
            .map(|p| p.addr)
            .ok_or_else(|| Error::InvalidInput(format!("unknown recipient {}", recipient)))?;

        let mut datagram = Vec::with_capacity(HEADER_LEN + payload.len());
        encode_datagram(owner, channel, payload, &mut datagram);

        match self.socket.send_to(&datagram, addr) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                trace!("Dropped frame for recipient {}: socket busy", recipient);
                Ok(())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}
