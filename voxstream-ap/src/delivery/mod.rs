//! Frame fan-out seams
//!
//! The pace consumer enumerates candidate recipients from a
//! `RecipientRegistry` once per tick and hands each encoded frame to a
//! `DeliverySink`. Membership and transport live behind these traits.

pub mod udp;

pub use udp::UdpAudience;

use crate::error::Result;
use voxstream_common::{BroadcastChannel, OwnerId, RecipientId};

/// A candidate frame recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipient {
    pub id: RecipientId,
    /// Connected and able to receive voice frames
    pub ready: bool,
}

/// Enumerable audience
pub trait RecipientRegistry: Send + Sync {
    /// Replace `out` with the current recipients
    fn snapshot(&self, out: &mut Vec<Recipient>);
}

/// Delivers one encoded frame to one recipient
pub trait DeliverySink: Send + Sync {
    fn send(
        &self,
        recipient: RecipientId,
        owner: OwnerId,
        channel: BroadcastChannel,
        payload: &[u8],
    ) -> Result<()>;
}

/// Whether a frame goes to `recipient` under an allow-list (empty = everyone)
pub fn is_eligible(recipient: &Recipient, allow_list: &[RecipientId]) -> bool {
    recipient.ready && (allow_list.is_empty() || allow_list.contains(&recipient.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(id: u32, ready: bool) -> Recipient {
        Recipient {
            id: RecipientId(id),
            ready,
        }
    }

    #[test]
    fn test_empty_allow_list_admits_every_ready_recipient() {
        assert!(is_eligible(&r(1, true), &[]));
        assert!(!is_eligible(&r(1, false), &[]));
    }

    #[test]
    fn test_allow_list_filters() {
        let allow = [RecipientId(2)];
        assert!(is_eligible(&r(2, true), &allow));
        assert!(!is_eligible(&r(3, true), &allow));
        assert!(!is_eligible(&r(2, false), &allow));
    }
}
