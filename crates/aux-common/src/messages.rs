//! JSON signaling messages and the inbound frame codec.
//!
//! Every frame is a single JSON object with a mandatory `type` field.
//! Field validation beyond shape (required non-empty fields, room-id form,
//! authority) is the broker's job; the codec here only maps text to typed
//! messages. Relayed payloads are carried as [`serde_json::Value`] and
//! re-emitted with key order preserved.

use crate::types::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One roster row, as carried by `registered` and `clients-updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    /// Client identifier declared at registration.
    pub client_id: String,
    /// Room-unique human label.
    pub display_name: String,
    /// Current role of the member.
    pub role: Role,
}

/// Inbound client → broker messages.
///
/// Fields are optional at the codec layer; the broker's validator decides
/// which are required for each type and answers violations with an `error`
/// frame instead of failing the decode.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Join a room, creating it on first use.
    #[serde(rename_all = "camelCase")]
    Register {
        /// Target room id.
        room_id: Option<String>,
        /// Caller-declared client id, unique within the room.
        client_id: Option<String>,
        /// Requested human label; broker may rename for uniqueness.
        display_name: Option<String>,
        /// Requested role, `idle` or `host`. Defaults to `idle`.
        role: Option<String>,
    },
    /// Host offers to promote a member to speaker.
    #[serde(rename_all = "camelCase")]
    Invite {
        /// Room the invite applies to.
        room_id: Option<String>,
        /// Host client id.
        from: Option<String>,
        /// Target client id.
        to: Option<String>,
        /// Opaque payload relayed verbatim to the target.
        payload: Option<Value>,
    },
    /// Target answers a pending invite.
    #[serde(rename_all = "camelCase")]
    InviteResponse {
        /// Room the invite applies to.
        room_id: Option<String>,
        /// Responder client id.
        from: Option<String>,
        /// Original inviter (host) client id.
        to: Option<String>,
        /// Whether the invite was accepted.
        accepted: Option<bool>,
        /// Invite id echoed from the `invite` frame.
        invite_id: Option<String>,
    },
    /// Host withdraws a pending invite.
    #[serde(rename_all = "camelCase")]
    InviteCancel {
        /// Id of the invite to withdraw.
        invite_id: Option<String>,
        /// Host client id.
        from: Option<String>,
    },
    /// Opaque peer-to-peer negotiation payload relayed between two members.
    #[serde(rename_all = "camelCase")]
    Signal {
        /// Room both peers belong to.
        room_id: Option<String>,
        /// Sending client id.
        from: Option<String>,
        /// Receiving client id.
        to: Option<String>,
        /// Opaque payload, relayed without interpretation.
        payload: Option<Value>,
    },
    /// Host broadcasts a playback control command to the room.
    #[serde(rename_all = "camelCase")]
    PlayCommand {
        /// Room to broadcast into.
        room_id: Option<String>,
        /// Host client id.
        from: Option<String>,
        /// Object carrying `command` and optionally `timestamp`.
        payload: Option<Value>,
    },
    /// Explicit disconnect intent; the member is removed as on close.
    #[serde(rename_all = "camelCase")]
    Leave {
        /// Room to leave.
        room_id: Option<String>,
        /// Leaving client id.
        from: Option<String>,
    },
    /// Application-level keepalive.
    Ping,
    /// Any unrecognized `type`; ignored for forward compatibility.
    #[serde(other)]
    Unknown,
}

/// Outbound broker → client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Registration acknowledgment, echoing the assigned identity.
    #[serde(rename_all = "camelCase")]
    Registered {
        /// Client id as registered.
        client_id: String,
        /// Display name after uniqueness resolution.
        display_name: String,
        /// Granted role.
        role: Role,
        /// Room joined.
        room_id: String,
        /// Full roster snapshot at registration time.
        clients: Vec<RosterEntry>,
    },
    /// Full roster snapshot; clients compute diffs themselves.
    ClientsUpdated {
        /// Current roster of the room.
        clients: Vec<RosterEntry>,
    },
    /// Invite delivered to its target.
    #[serde(rename_all = "camelCase")]
    Invite {
        /// Broker-minted invite id.
        invite_id: String,
        /// Inviting host client id.
        from: String,
        /// Inviting host display name.
        from_display_name: String,
        /// Opaque payload supplied by the host.
        payload: Value,
    },
    /// Acknowledgment to the host that the invite went out.
    #[serde(rename_all = "camelCase")]
    InviteSent {
        /// Broker-minted invite id.
        invite_id: String,
        /// Target client id.
        to: String,
        /// Target display name.
        to_display_name: String,
    },
    /// Target's answer, forwarded to the host.
    #[serde(rename_all = "camelCase")]
    InviteResponse {
        /// Invite id the answer refers to.
        invite_id: String,
        /// Responder client id.
        from: String,
        /// Responder display name.
        from_display_name: String,
        /// Whether the invite was accepted.
        accepted: bool,
    },
    /// Invite reached its deadline (or its target vanished).
    #[serde(rename_all = "camelCase")]
    InviteExpired {
        /// Invite id that expired.
        invite_id: String,
        /// Target client id; present on the copy sent to the host.
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        /// Host client id; present on the copy sent to the target.
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        /// Optional human-readable cause.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Invite withdrawn by the host (or lost to a host disconnect).
    #[serde(rename_all = "camelCase")]
    InviteCancelled {
        /// Invite id that was withdrawn.
        invite_id: String,
        /// Optional human-readable cause.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Relayed peer-to-peer negotiation payload.
    Signal {
        /// Sending client id.
        from: String,
        /// Opaque payload, relayed verbatim.
        payload: Value,
    },
    /// Playback control command fanned out to the room.
    PlayCommand {
        /// Command value supplied by the host.
        command: Value,
        /// Host-supplied timestamp, or broker receive time in Unix millis.
        timestamp: Value,
    },
    /// The room's host disconnected; speakers have been reset to idle.
    HostDisconnected {
        /// Human-readable notice.
        message: String,
    },
    /// Keepalive response.
    Pong,
    /// Any protocol, validation, authority, state, or admission failure.
    Error {
        /// Human-readable description of the failure.
        message: String,
    },
}

/// Outcome of decoding one inbound text frame.
#[derive(Debug)]
pub enum Decoded {
    /// A recognized protocol message.
    Message(ClientMessage),
    /// A frame to drop without reply: missing or unknown `type`.
    Ignored,
}

/// Why an inbound frame could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame was not a JSON object.
    #[error("Invalid JSON")]
    InvalidJson,
    /// The `type` was recognized but a field had the wrong shape.
    #[error("invalid message shape: {0}")]
    Shape(String),
}

/// Decode one inbound text frame.
///
/// Frames without a string `type`, and frames with an unrecognized `type`,
/// yield [`Decoded::Ignored`] so new client message kinds never disrupt an
/// older broker.
///
/// # Errors
///
/// [`DecodeError::InvalidJson`] if the text is not valid JSON, and
/// [`DecodeError::Shape`] if a recognized message carries a field of the
/// wrong JSON type.
pub fn decode_client(text: &str) -> Result<Decoded, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(|_| DecodeError::InvalidJson)?;
    if value.get("type").and_then(Value::as_str).is_none() {
        return Ok(Decoded::Ignored);
    }
    match serde_json::from_value::<ClientMessage>(value) {
        Ok(ClientMessage::Unknown) => Ok(Decoded::Ignored),
        Ok(msg) => Ok(Decoded::Message(msg)),
        Err(e) => Err(DecodeError::Shape(e.to_string())),
    }
}
