//! Core type definitions and protocol constants for AUX signaling.

use serde::{Deserialize, Serialize};

/// Role a member currently holds within its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Joined the room but holds no media role.
    Idle,
    /// The single member authorized to issue invites and playback commands.
    Host,
    /// Promoted from idle by an accepted invite; receives media from the host.
    Speaker,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Idle => write!(f, "idle"),
            Role::Host => write!(f, "host"),
            Role::Speaker => write!(f, "speaker"),
        }
    }
}

/// Normative protocol constants. Server configuration defaults to these
/// values; overriding them is for tests and tuning, not for interop.
pub mod constants {
    /// Invite lifetime in seconds, from creation to expiry.
    pub const INVITE_TIMEOUT_SECS: u64 = 20;
    /// Length of the fixed rate-limit window in seconds.
    pub const RATE_LIMIT_WINDOW_SECS: u64 = 10;
    /// Maximum inbound frames admitted per window per connection.
    pub const RATE_LIMIT_MAX: u32 = 60;
    /// Interval of the fallback invite-ledger sweep in seconds.
    pub const SWEEP_INTERVAL_SECS: u64 = 60;
    /// Minimum room-id length.
    pub const ROOM_ID_MIN: usize = 4;
    /// Maximum room-id length.
    pub const ROOM_ID_MAX: usize = 12;
}

/// Returns `true` if `id` is a canonical room id: uppercase ASCII letters
/// and digits, 4 to 12 characters.
#[must_use]
pub fn valid_room_id(id: &str) -> bool {
    (constants::ROOM_ID_MIN..=constants::ROOM_ID_MAX).contains(&id.len())
        && id.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Pool drawn from when a registration omits `displayName`. Uniqueness
/// within the room is resolved afterwards by numeric suffixing.
pub const DISPLAY_NAMES: [&str; 29] = [
    "otter", "lynx", "heron", "marmot", "gecko", "puffin", "badger", "fennec",
    "ibis", "stoat", "wombat", "tapir", "quokka", "macaw", "newt", "osprey",
    "pangolin", "civet", "saiga", "kudu", "dingo", "ocelot", "tern", "vole",
    "skink", "jerboa", "margay", "hoopoe", "serval",
];
