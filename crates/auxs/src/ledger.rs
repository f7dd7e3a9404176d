use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// A pending speaker invite.
#[derive(Debug, Clone)]
pub struct Invite {
    /// Broker-minted identifier, collision-free for the process lifetime.
    pub id: String,
    /// Room the invite applies to.
    pub room_id: String,
    /// Issuing host client id.
    pub from: String,
    /// Target client id.
    pub to: String,
    /// Opaque payload relayed to the target.
    pub payload: Value,
    /// Deadline after which the invite expires.
    pub expires_at: Instant,
}

#[derive(Debug)]
struct Entry {
    invite: Invite,
    timer: Option<JoinHandle<()>>,
}

/// Pending invites keyed by invite id.
///
/// Each invite carries a deadline task armed by the router; removal aborts
/// the task so a terminal transition (response, cancel, disconnect) never
/// re-fires as expiry. [`InviteLedger::sweep_expired`] is the fallback for
/// lost timers, not the primary mechanism.
#[derive(Debug, Default)]
pub struct InviteLedger {
    invites: DashMap<String, Entry>,
}

impl InviteLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint and store a new invite expiring `ttl` from now.
    ///
    /// The deadline task is attached separately via [`InviteLedger::arm`];
    /// until then only the sweep can expire the record.
    pub fn create(
        &self,
        room_id: &str,
        from: &str,
        to: &str,
        payload: Value,
        ttl: Duration,
    ) -> Invite {
        let invite = Invite {
            id: mint_invite_id(),
            room_id: room_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            payload,
            expires_at: Instant::now() + ttl,
        };
        self.invites.insert(
            invite.id.clone(),
            Entry {
                invite: invite.clone(),
                timer: None,
            },
        );
        invite
    }

    /// Attach the deadline task for an invite. If the invite was already
    /// removed in the meantime, the task is aborted on the spot.
    pub fn arm(&self, id: &str, timer: JoinHandle<()>) {
        match self.invites.get_mut(id) {
            Some(mut entry) => entry.timer = Some(timer),
            None => timer.abort(),
        }
    }

    /// Look up an invite by id.
    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<Invite> {
        self.invites.get(id).map(|entry| entry.invite.clone())
    }

    /// Look up the live invite for a host → target pair within a room.
    #[must_use]
    pub fn by_pair(&self, room_id: &str, from: &str, to: &str) -> Option<Invite> {
        self.invites
            .iter()
            .find(|entry| {
                let i = &entry.invite;
                i.room_id == room_id && i.from == from && i.to == to
            })
            .map(|entry| entry.invite.clone())
    }

    /// Remove an invite, cancelling its deadline task. Returns the record
    /// if it was still live; concurrent terminal transitions race here and
    /// exactly one caller wins.
    pub fn remove(&self, id: &str) -> Option<Invite> {
        let (_, entry) = self.invites.remove(id)?;
        if let Some(timer) = entry.timer {
            timer.abort();
        }
        Some(entry.invite)
    }

    /// Remove every invite in `room_id` where `client_id` is either side.
    /// Used by the disconnect protocol.
    pub fn remove_for_client(&self, room_id: &str, client_id: &str) -> Vec<Invite> {
        let ids: Vec<String> = self
            .invites
            .iter()
            .filter(|entry| {
                let i = &entry.invite;
                i.room_id == room_id && (i.from == client_id || i.to == client_id)
            })
            .map(|entry| entry.invite.id.clone())
            .collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Remove and return every invite past its deadline at `now`.
    pub fn sweep_expired(&self, now: Instant) -> Vec<Invite> {
        let ids: Vec<String> = self
            .invites
            .iter()
            .filter(|entry| entry.invite.expires_at <= now)
            .map(|entry| entry.invite.id.clone())
            .collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Number of pending invites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.invites.len()
    }

    /// Returns `true` if no invites are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invites.is_empty()
    }

    /// Drop every invite and cancel all deadline tasks. Run at shutdown.
    pub fn shutdown(&self) {
        let ids: Vec<String> = self
            .invites
            .iter()
            .map(|entry| entry.invite.id.clone())
            .collect();
        for id in ids {
            self.remove(&id);
        }
    }
}

fn mint_invite_id() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("inv-{token}")
}
