//! Wire protocol shared by the AUX signaling broker and its clients.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// JSON message types and the inbound frame codec.
pub mod messages;
/// Roles, room-id rules, and normative protocol constants.
pub mod types;

pub use messages::{decode_client, ClientMessage, DecodeError, Decoded, RosterEntry, ServerMessage};
pub use types::Role;
