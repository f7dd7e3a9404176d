//! Message dispatch: decode, validate, apply to registry/ledger, fan out.
//!
//! Handlers run to completion on the connection's read path; every outbound
//! frame goes through the recipient's bounded queue, so nothing here blocks
//! on a peer. Authority checks resolve the sender through the session's
//! registration, never through unverified frame fields alone.

use crate::connection::{BoundMember, Session};
use crate::ledger::Invite;
use crate::metrics::{counters, gauges};
use crate::registry::ConnId;
use crate::server::{Delivery, ServerState};
use crate::validator;
use aux_common::messages::{decode_client, ClientMessage, DecodeError, Decoded, ServerMessage};
use aux_common::types::Role;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// A handler outcome that must be reported to the sender as an `error`
/// frame. Carries the exact wire message.
struct Reject {
    message: String,
}

fn reject(message: &str) -> Reject {
    Reject {
        message: message.to_string(),
    }
}

impl From<validator::ValidationError> for Reject {
    fn from(err: validator::ValidationError) -> Self {
        Reject {
            message: err.to_string(),
        }
    }
}

type HandlerResult = Result<(), Reject>;

/// Decode and route one inbound frame, replying with an `error` frame on
/// any violation. State mutation and fan-out happen synchronously.
pub(crate) fn dispatch(state: &Arc<ServerState>, session: &mut Session, raw: &str) {
    let msg = match decode_client(raw) {
        Ok(Decoded::Message(msg)) => msg,
        Ok(Decoded::Ignored) => {
            debug!(conn = session.conn, "ignoring frame with unknown type");
            return;
        }
        Err(DecodeError::InvalidJson) => {
            state.send_error(session.conn, "Invalid JSON");
            return;
        }
        Err(DecodeError::Shape(detail)) => {
            debug!(conn = session.conn, %detail, "malformed frame");
            state.send_error(session.conn, "Invalid message format");
            return;
        }
    };

    // An unbound connection may only register and ping.
    if session.member.is_none()
        && !matches!(msg, ClientMessage::Register { .. } | ClientMessage::Ping)
    {
        state.send_error(session.conn, "Not registered");
        return;
    }

    let result = match msg {
        ClientMessage::Register {
            room_id,
            client_id,
            display_name,
            role,
        } => handle_register(state, session, room_id, client_id, display_name, role),
        ClientMessage::Invite {
            room_id,
            from,
            to,
            payload,
        } => handle_invite(state, session, room_id, from, to, payload),
        ClientMessage::InviteResponse {
            room_id,
            from,
            to,
            accepted,
            invite_id,
        } => handle_invite_response(state, session, room_id, from, to, accepted, invite_id),
        ClientMessage::InviteCancel { invite_id, from } => {
            handle_invite_cancel(state, session, invite_id, from)
        }
        ClientMessage::Signal {
            room_id,
            from,
            to,
            payload,
        } => handle_signal(state, session, room_id, from, to, payload),
        ClientMessage::PlayCommand {
            room_id,
            from,
            payload,
        } => handle_play_command(state, session, room_id, from, payload),
        ClientMessage::Leave { room_id, from } => handle_leave(state, session, room_id, from),
        ClientMessage::Ping => {
            let _ = state.send_to(session.conn, &ServerMessage::Pong);
            Ok(())
        }
        ClientMessage::Unknown => Ok(()),
    };

    if let Err(rejected) = result {
        state.send_error(session.conn, &rejected.message);
    }
}

fn bound(session: &Session) -> Result<&BoundMember, Reject> {
    session
        .member
        .as_ref()
        .ok_or_else(|| reject("Not registered"))
}

/// The sender of every post-registration message is the session's member;
/// a `from` that disagrees is an authority violation, not a new identity.
fn sender_in_room<'a>(session: &'a Session, room: &str, from: &str) -> Result<&'a BoundMember, Reject> {
    let member = bound(session)?;
    if member.room_id != room || member.client_id != from {
        return Err(reject("Sender does not match registration"));
    }
    Ok(member)
}

fn handle_register(
    state: &Arc<ServerState>,
    session: &mut Session,
    room_id: Option<String>,
    client_id: Option<String>,
    display_name: Option<String>,
    role: Option<String>,
) -> HandlerResult {
    let room = validator::room_id(room_id.as_deref())?.to_string();
    let client = validator::require("clientId", client_id.as_deref())?.to_string();
    let role = validator::requested_role(role.as_deref())?;

    // A bound connection switching room or identity gives up its previous
    // membership first, with the full disconnect cascade.
    if let Some(previous) = session.member.clone() {
        if previous.room_id != room || previous.client_id != client {
            handle_disconnect(state, &previous.room_id, &previous.client_id, session.conn);
            session.member = None;
        }
    }

    let outcome = state
        .registry
        .register(&room, &client, display_name.as_deref(), role, session.conn)
        .map_err(|e| reject(&e.to_string()))?;

    if let Some(displaced) = outcome.displaced {
        state.send_error(displaced, "Replaced by a new registration");
        state.close_conn(displaced);
        debug!(conn = displaced, room = %room, client = %client, "displaced by re-registration");
    }

    session.member = Some(BoundMember {
        room_id: room.clone(),
        client_id: client.clone(),
    });

    let roster = state.registry.roster(&room);
    let member = outcome.member;
    let _ = state.send_to(
        session.conn,
        &ServerMessage::Registered {
            client_id: member.client_id,
            display_name: member.display_name,
            role: member.role,
            room_id: room.clone(),
            clients: roster.clone(),
        },
    );
    broadcast(
        state,
        &room,
        Some(&client),
        &ServerMessage::ClientsUpdated { clients: roster },
    );

    counters::registrations_total();
    gauges::set_rooms_active(state.registry.room_count());
    info!(room = %room, client = %client, role = %role, "client registered");
    Ok(())
}

fn handle_invite(
    state: &Arc<ServerState>,
    session: &mut Session,
    room_id: Option<String>,
    from: Option<String>,
    to: Option<String>,
    payload: Option<Value>,
) -> HandlerResult {
    let room = validator::room_id(room_id.as_deref())?;
    let from = validator::require("from", from.as_deref())?;
    let to = validator::require("to", to.as_deref())?;
    sender_in_room(session, room, from)?;

    let host = state
        .registry
        .host(room)
        .filter(|h| h.client_id == from)
        .ok_or_else(|| reject("Only the host can send invites"))?;
    let target = state
        .registry
        .member(room, to)
        .ok_or_else(|| reject("Target client not found"))?;

    let payload =
        payload.unwrap_or_else(|| json!({"role": "speaker", "note": "Become my speaker?"}));

    // At most one live invite per host → target pair; a fresh one
    // supersedes the old record and its timer.
    if let Some(stale) = state.ledger.by_pair(room, from, to) {
        let _ = state.ledger.remove(&stale.id);
    }

    let ttl = Duration::from_secs(state.config.invite_timeout_secs);
    let invite = state.ledger.create(room, from, to, payload.clone(), ttl);

    let delivered = state.send_to(
        target.conn,
        &ServerMessage::Invite {
            invite_id: invite.id.clone(),
            from: from.to_string(),
            from_display_name: host.display_name,
            payload,
        },
    );
    if delivered == Delivery::Unreachable {
        let _ = state.ledger.remove(&invite.id);
        return Err(reject("Target client is not reachable"));
    }

    let timer = tokio::spawn(expire_invite(
        Arc::clone(state),
        invite.id.clone(),
        ttl,
    ));
    state.ledger.arm(&invite.id, timer);

    let _ = state.send_to(
        session.conn,
        &ServerMessage::InviteSent {
            invite_id: invite.id.clone(),
            to: to.to_string(),
            to_display_name: target.display_name,
        },
    );

    counters::invites_total("sent");
    gauges::set_invites_pending(state.ledger.len());
    debug!(room = %room, invite_id = %invite.id, to = %to, "invite issued");
    Ok(())
}

fn handle_invite_response(
    state: &Arc<ServerState>,
    session: &mut Session,
    room_id: Option<String>,
    from: Option<String>,
    to: Option<String>,
    accepted: Option<bool>,
    invite_id: Option<String>,
) -> HandlerResult {
    let room = validator::room_id(room_id.as_deref())?;
    let from = validator::require("from", from.as_deref())?;
    let to = validator::require("to", to.as_deref())?;
    let accepted = validator::require_bool("accepted", accepted)?;
    sender_in_room(session, room, from)?;

    // The live invite runs host → responder; a response for a pair with no
    // live invite (expired, cancelled, already answered) is stale.
    let invite = state
        .ledger
        .by_pair(room, to, from)
        .ok_or_else(|| reject("No matching invite"))?;
    let _ = state.ledger.remove(&invite.id);

    let responder = state
        .registry
        .member(room, from)
        .ok_or_else(|| reject("Not registered"))?;

    if accepted {
        state.registry.set_role(room, from, Role::Speaker);
    }

    if let Some(host) = state.registry.member(room, to) {
        let _ = state.send_to(
            host.conn,
            &ServerMessage::InviteResponse {
                invite_id: invite_id.unwrap_or_else(|| invite.id.clone()),
                from: from.to_string(),
                from_display_name: responder.display_name,
                accepted,
            },
        );
    }

    if accepted {
        let roster = state.registry.roster(room);
        broadcast(state, room, None, &ServerMessage::ClientsUpdated { clients: roster });
        counters::invites_total("accepted");
        info!(room = %room, client = %from, "promoted to speaker");
    } else {
        counters::invites_total("declined");
    }
    gauges::set_invites_pending(state.ledger.len());
    Ok(())
}

fn handle_invite_cancel(
    state: &Arc<ServerState>,
    session: &mut Session,
    invite_id: Option<String>,
    from: Option<String>,
) -> HandlerResult {
    let invite_id = validator::require("inviteId", invite_id.as_deref())?;
    let from = validator::require("from", from.as_deref())?;
    let member = bound(session)?;
    if member.client_id != from {
        return Err(reject("Sender does not match registration"));
    }

    let Some(invite) = state.ledger.by_id(invite_id) else {
        // Already answered, expired, or cancelled; a repeat cancel is a no-op.
        debug!(invite_id, "cancel for unknown invite ignored");
        return Ok(());
    };
    if invite.from != from {
        return Err(reject("Not the invite sender"));
    }
    let Some(invite) = state.ledger.remove(invite_id) else {
        return Ok(());
    };

    if let Some(target) = state.registry.member(&invite.room_id, &invite.to) {
        let _ = state.send_to(
            target.conn,
            &ServerMessage::InviteCancelled {
                invite_id: invite.id,
                reason: None,
            },
        );
    }
    counters::invites_total("cancelled");
    gauges::set_invites_pending(state.ledger.len());
    Ok(())
}

fn handle_signal(
    state: &Arc<ServerState>,
    session: &mut Session,
    room_id: Option<String>,
    from: Option<String>,
    to: Option<String>,
    payload: Option<Value>,
) -> HandlerResult {
    let room = validator::room_id(room_id.as_deref())?;
    let from = validator::require("from", from.as_deref())?;
    let to = validator::require("to", to.as_deref())?;
    let payload = payload.ok_or(validator::ValidationError::Missing("payload"))?;
    sender_in_room(session, room, from)?;

    let target = state
        .registry
        .member(room, to)
        .ok_or_else(|| reject("Target client not found"))?;

    match state.send_to(
        target.conn,
        &ServerMessage::Signal {
            from: from.to_string(),
            payload,
        },
    ) {
        Delivery::Unreachable => Err(reject("Target client is not reachable")),
        _ => {
            counters::signals_relayed_total();
            Ok(())
        }
    }
}

fn handle_play_command(
    state: &Arc<ServerState>,
    session: &mut Session,
    room_id: Option<String>,
    from: Option<String>,
    payload: Option<Value>,
) -> HandlerResult {
    let room = validator::room_id(room_id.as_deref())?;
    let from = validator::require("from", from.as_deref())?;
    let payload = payload.ok_or(validator::ValidationError::Missing("payload"))?;
    let command = match payload.get("command") {
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::Null) | None => None,
        Some(command) => Some(command.clone()),
    }
    .ok_or(validator::ValidationError::Missing("payload.command"))?;
    sender_in_room(session, room, from)?;

    state
        .registry
        .host(room)
        .filter(|h| h.client_id == from)
        .ok_or_else(|| reject("Only the host can send play commands"))?;

    let timestamp = payload
        .get("timestamp")
        .cloned()
        .unwrap_or_else(|| json!(unix_millis()));

    broadcast(
        state,
        room,
        Some(from),
        &ServerMessage::PlayCommand { command, timestamp },
    );
    counters::play_commands_total();
    Ok(())
}

fn handle_leave(
    state: &Arc<ServerState>,
    session: &mut Session,
    room_id: Option<String>,
    from: Option<String>,
) -> HandlerResult {
    let room = validator::room_id(room_id.as_deref())?;
    let from = validator::require("from", from.as_deref())?;
    sender_in_room(session, room, from)?;

    handle_disconnect(state, room, from, session.conn);
    session.member = None;
    Ok(())
}

/// Reconcile room and ledger state after a bound connection goes away,
/// whether by transport close or an explicit `leave`.
pub(crate) fn handle_disconnect(
    state: &Arc<ServerState>,
    room: &str,
    client: &str,
    conn: ConnId,
) {
    // The guard makes a displaced session's late close a no-op.
    let Some(removed) = state.registry.remove(room, client, Some(conn)) else {
        return;
    };
    info!(room = %room, client = %client, "member removed");

    if removed.role == Role::Host {
        broadcast(
            state,
            room,
            None,
            &ServerMessage::HostDisconnected {
                message: "Host has disconnected".to_string(),
            },
        );
        state.registry.demote_speakers(room);
    }

    for invite in state.ledger.remove_for_client(room, client) {
        if invite.from == client {
            if let Some(target) = state.registry.member(room, &invite.to) {
                let _ = state.send_to(
                    target.conn,
                    &ServerMessage::InviteCancelled {
                        invite_id: invite.id,
                        reason: Some("Host disconnected".to_string()),
                    },
                );
            }
        } else if let Some(host) = state.registry.member(room, &invite.from) {
            let _ = state.send_to(
                host.conn,
                &ServerMessage::InviteExpired {
                    invite_id: invite.id,
                    to: Some(invite.to.clone()),
                    from: None,
                    reason: Some("Target disconnected".to_string()),
                },
            );
        }
    }

    let roster = state.registry.roster(room);
    if !roster.is_empty() {
        broadcast(state, room, None, &ServerMessage::ClientsUpdated { clients: roster });
    }

    gauges::set_rooms_active(state.registry.room_count());
    gauges::set_invites_pending(state.ledger.len());
}

/// Deadline task for one invite. Terminal transitions remove the record
/// first and abort this task, so a late wake-up finds nothing to expire.
async fn expire_invite(state: Arc<ServerState>, invite_id: String, ttl: Duration) {
    tokio::time::sleep(ttl).await;
    // Removing our own entry aborts this task's handle; harmless, since the
    // notification path below never awaits.
    if let Some(invite) = state.ledger.remove(&invite_id) {
        notify_invite_expired(&state, &invite);
    }
}

/// Tell both sides an invite timed out. Best-effort: either side may
/// already be gone.
pub(crate) fn notify_invite_expired(state: &Arc<ServerState>, invite: &Invite) {
    debug!(invite_id = %invite.id, "invite expired");
    if let Some(host) = state.registry.member(&invite.room_id, &invite.from) {
        let _ = state.send_to(
            host.conn,
            &ServerMessage::InviteExpired {
                invite_id: invite.id.clone(),
                to: Some(invite.to.clone()),
                from: None,
                reason: None,
            },
        );
    }
    if let Some(target) = state.registry.member(&invite.room_id, &invite.to) {
        let _ = state.send_to(
            target.conn,
            &ServerMessage::InviteExpired {
                invite_id: invite.id.clone(),
                to: None,
                from: Some(invite.from.clone()),
                reason: None,
            },
        );
    }
    counters::invites_total("expired");
    gauges::set_invites_pending(state.ledger.len());
}

fn broadcast(state: &ServerState, room: &str, except: Option<&str>, msg: &ServerMessage) {
    for conn in state.registry.member_conns(room, except) {
        let _ = state.send_to(conn, msg);
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
