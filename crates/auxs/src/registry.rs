use aux_common::messages::RosterEntry;
use aux_common::types::{Role, DISPLAY_NAMES};
use dashmap::DashMap;
use rand::Rng;
use thiserror::Error;

/// Identifier of a live connection; used by members to find their channel.
pub type ConnId = u64;

/// One registered client within a room.
#[derive(Debug, Clone)]
pub struct Member {
    /// Client identifier declared at registration, unique within the room.
    pub client_id: String,
    /// Room-unique human label.
    pub display_name: String,
    /// Current role.
    pub role: Role,
    /// Connection the member is bound to.
    pub conn: ConnId,
}

#[derive(Debug, Default)]
struct Room {
    // Insertion-ordered so roster snapshots are stable across broadcasts.
    members: Vec<Member>,
}

/// Errors surfaced by registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A different client already holds the host role in this room.
    #[error("Room already has a host")]
    DuplicateHost,
}

/// Result of a successful registration.
#[derive(Debug)]
pub struct Registered {
    /// The member as stored, after display-name resolution.
    pub member: Member,
    /// Connection displaced by a re-registration of the same client id.
    pub displaced: Option<ConnId>,
}

/// Concurrent room table. A room exists only while it has members; per-room
/// mutation is serialized by the table entry's lock.
#[derive(Debug, Default)]
pub struct Registry {
    rooms: DashMap<String, Room>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client_id` into `room_id`, creating the room on first use.
    ///
    /// A missing or empty `display_name` is replaced by a random pool name;
    /// either way the name is made room-unique by numeric suffixing.
    /// Re-registering an existing `client_id` replaces the member in place
    /// and reports the previously bound connection.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateHost`] when `role` is `host` and a
    /// different client already holds it.
    pub fn register(
        &self,
        room_id: &str,
        client_id: &str,
        display_name: Option<&str>,
        role: Role,
        conn: ConnId,
    ) -> Result<Registered, RegistryError> {
        let result = {
            let mut room = self.rooms.entry(room_id.to_string()).or_default();

            if role == Role::Host
                && room
                    .members
                    .iter()
                    .any(|m| m.role == Role::Host && m.client_id != client_id)
            {
                Err(RegistryError::DuplicateHost)
            } else {
                let base = match display_name {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => {
                        let pick = rand::thread_rng().gen_range(0..DISPLAY_NAMES.len());
                        DISPLAY_NAMES[pick].to_string()
                    }
                };
                let mut resolved = base.clone();
                let mut suffix = 2;
                while room
                    .members
                    .iter()
                    .any(|m| m.client_id != client_id && m.display_name == resolved)
                {
                    resolved = format!("{base}-{suffix}");
                    suffix += 1;
                }

                let member = Member {
                    client_id: client_id.to_string(),
                    display_name: resolved,
                    role,
                    conn,
                };
                let displaced = match room
                    .members
                    .iter()
                    .position(|m| m.client_id == client_id)
                {
                    Some(pos) => {
                        let previous = room.members[pos].conn;
                        room.members[pos] = member.clone();
                        (previous != conn).then_some(previous)
                    }
                    None => {
                        room.members.push(member.clone());
                        None
                    }
                };
                Ok(Registered { member, displaced })
            }
        };
        if result.is_err() {
            // A failed first registration must not leave an empty room behind.
            self.rooms
                .remove_if(room_id, |_, room| room.members.is_empty());
        }
        result
    }

    /// Look up a member by room and client id.
    #[must_use]
    pub fn member(&self, room_id: &str, client_id: &str) -> Option<Member> {
        self.rooms.get(room_id).and_then(|room| {
            room.members
                .iter()
                .find(|m| m.client_id == client_id)
                .cloned()
        })
    }

    /// The room's current host, if any.
    #[must_use]
    pub fn host(&self, room_id: &str) -> Option<Member> {
        self.rooms.get(room_id).and_then(|room| {
            room.members.iter().find(|m| m.role == Role::Host).cloned()
        })
    }

    /// Ordered roster snapshot used for `registered` and `clients-updated`.
    #[must_use]
    pub fn roster(&self, room_id: &str) -> Vec<RosterEntry> {
        self.rooms.get(room_id).map_or_else(Vec::new, |room| {
            room.members
                .iter()
                .map(|m| RosterEntry {
                    client_id: m.client_id.clone(),
                    display_name: m.display_name.clone(),
                    role: m.role,
                })
                .collect()
        })
    }

    /// Connection ids of a room's members, optionally excluding one client.
    #[must_use]
    pub fn member_conns(&self, room_id: &str, except: Option<&str>) -> Vec<ConnId> {
        self.rooms.get(room_id).map_or_else(Vec::new, |room| {
            room.members
                .iter()
                .filter(|m| except.map_or(true, |e| m.client_id != e))
                .map(|m| m.conn)
                .collect()
        })
    }

    /// Set a member's role, returning the updated member.
    pub fn set_role(&self, room_id: &str, client_id: &str, role: Role) -> Option<Member> {
        self.rooms.get_mut(room_id).and_then(|mut room| {
            room.members
                .iter_mut()
                .find(|m| m.client_id == client_id)
                .map(|m| {
                    m.role = role;
                    m.clone()
                })
        })
    }

    /// Reset every speaker in the room to idle. Run after a host disconnect.
    pub fn demote_speakers(&self, room_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            for m in room.members.iter_mut() {
                if m.role == Role::Speaker {
                    m.role = Role::Idle;
                }
            }
        }
    }

    /// Remove a member, deleting the room when it becomes empty.
    ///
    /// With `conn` given, the member is only removed when still bound to
    /// that connection — a displaced session closing late must not evict
    /// its replacement.
    pub fn remove(
        &self,
        room_id: &str,
        client_id: &str,
        conn: Option<ConnId>,
    ) -> Option<Member> {
        let (removed, now_empty) = {
            let mut room = self.rooms.get_mut(room_id)?;
            let pos = room.members.iter().position(|m| {
                m.client_id == client_id && conn.map_or(true, |c| m.conn == c)
            })?;
            let removed = room.members.remove(pos);
            let now_empty = room.members.is_empty();
            (removed, now_empty)
        };
        if now_empty {
            self.rooms.remove_if(room_id, |_, room| room.members.is_empty());
        }
        Some(removed)
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_register_creates_room() {
        let registry = Registry::new();
        let out = registry
            .register("ROOM1", "c1", Some("pat"), Role::Host, 1)
            .unwrap();
        assert_eq!(out.member.display_name, "pat");
        assert_eq!(out.member.role, Role::Host);
        assert!(out.displaced.is_none());
        assert_eq!(registry.room_count(), 1);
        assert_eq!(registry.roster("ROOM1").len(), 1);
    }

    #[test]
    fn display_name_collisions_get_numeric_suffixes() {
        let registry = Registry::new();
        registry
            .register("ROOM1", "c1", Some("pat"), Role::Idle, 1)
            .unwrap();
        let second = registry
            .register("ROOM1", "c2", Some("pat"), Role::Idle, 2)
            .unwrap();
        let third = registry
            .register("ROOM1", "c3", Some("pat"), Role::Idle, 3)
            .unwrap();
        assert_eq!(second.member.display_name, "pat-2");
        assert_eq!(third.member.display_name, "pat-3");
    }

    #[test]
    fn missing_display_name_comes_from_the_pool() {
        let registry = Registry::new();
        let out = registry
            .register("ROOM1", "c1", None, Role::Idle, 1)
            .unwrap();
        assert!(DISPLAY_NAMES.contains(&out.member.display_name.as_str()));

        let empty = registry
            .register("ROOM1", "c2", Some(""), Role::Idle, 2)
            .unwrap();
        let base = empty
            .member
            .display_name
            .split('-')
            .next()
            .unwrap()
            .to_string();
        assert!(DISPLAY_NAMES.contains(&base.as_str()));
    }

    #[test]
    fn second_host_is_rejected_without_state_change() {
        let registry = Registry::new();
        registry
            .register("ROOM1", "h1", Some("one"), Role::Host, 1)
            .unwrap();
        let err = registry
            .register("ROOM1", "h2", Some("two"), Role::Host, 2)
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateHost);
        assert_eq!(err.to_string(), "Room already has a host");
        assert_eq!(registry.roster("ROOM1").len(), 1);
    }

    #[test]
    fn failed_register_does_not_leave_an_empty_room() {
        let registry = Registry::new();
        registry
            .register("ROOM1", "h1", Some("one"), Role::Host, 1)
            .unwrap();
        // Force the error path, then empty the room through removal.
        registry
            .register("ROOM1", "h2", None, Role::Host, 2)
            .unwrap_err();
        registry.remove("ROOM1", "h1", None);
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn host_may_re_register_as_host() {
        let registry = Registry::new();
        registry
            .register("ROOM1", "h1", Some("one"), Role::Host, 1)
            .unwrap();
        let again = registry
            .register("ROOM1", "h1", Some("one"), Role::Host, 1)
            .unwrap();
        assert_eq!(again.member.role, Role::Host);
        assert!(again.displaced.is_none());
    }

    #[test]
    fn re_register_replaces_in_place_and_reports_old_conn() {
        let registry = Registry::new();
        registry
            .register("ROOM1", "c1", Some("pat"), Role::Idle, 1)
            .unwrap();
        registry
            .register("ROOM1", "c2", Some("kim"), Role::Idle, 2)
            .unwrap();
        let replaced = registry
            .register("ROOM1", "c1", Some("pat"), Role::Idle, 3)
            .unwrap();
        assert_eq!(replaced.displaced, Some(1));
        // Position in the roster is preserved.
        let roster = registry.roster("ROOM1");
        assert_eq!(roster[0].client_id, "c1");
        assert_eq!(roster[1].client_id, "c2");
        assert_eq!(registry.member("ROOM1", "c1").unwrap().conn, 3);
    }

    #[test]
    fn remove_honors_the_connection_guard() {
        let registry = Registry::new();
        registry
            .register("ROOM1", "c1", Some("pat"), Role::Idle, 1)
            .unwrap();
        assert!(registry.remove("ROOM1", "c1", Some(99)).is_none());
        assert!(registry.member("ROOM1", "c1").is_some());
        assert!(registry.remove("ROOM1", "c1", Some(1)).is_some());
    }

    #[test]
    fn removing_the_last_member_deletes_the_room() {
        let registry = Registry::new();
        registry
            .register("ROOM1", "c1", Some("pat"), Role::Idle, 1)
            .unwrap();
        registry.remove("ROOM1", "c1", None);
        assert_eq!(registry.room_count(), 0);
        assert!(registry.roster("ROOM1").is_empty());
    }

    #[test]
    fn demote_speakers_resets_only_speakers() {
        let registry = Registry::new();
        registry
            .register("ROOM1", "h", Some("h"), Role::Host, 1)
            .unwrap();
        registry
            .register("ROOM1", "s", Some("s"), Role::Idle, 2)
            .unwrap();
        registry.set_role("ROOM1", "s", Role::Speaker);
        registry.demote_speakers("ROOM1");
        assert_eq!(registry.member("ROOM1", "s").unwrap().role, Role::Idle);
        assert_eq!(registry.member("ROOM1", "h").unwrap().role, Role::Host);
    }

    #[test]
    fn member_conns_can_exclude_a_client() {
        let registry = Registry::new();
        registry
            .register("ROOM1", "a", Some("a"), Role::Idle, 10)
            .unwrap();
        registry
            .register("ROOM1", "b", Some("b"), Role::Idle, 11)
            .unwrap();
        assert_eq!(registry.member_conns("ROOM1", None), vec![10, 11]);
        assert_eq!(registry.member_conns("ROOM1", Some("a")), vec![11]);
    }
}
