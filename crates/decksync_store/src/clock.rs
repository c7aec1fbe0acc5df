//! Update sequence numbers and sync roles.
//!
//! A client marks every local change with [`PENDING_USN`]; those rows are
//! what it has to send. A server stamps changes with its current usn and
//! sends everything at or above the client's watermark.

use serde::{Deserialize, Serialize};

/// Usn of a row changed locally and not yet uploaded.
pub const PENDING_USN: i32 = -1;

/// Which side of the protocol a store is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// The copy initiating the sync.
    Client,
    /// The authoritative copy.
    Server,
}

/// The negotiated usn range of one sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsnWindow {
    /// Client's usn before the sync: everything the server has at or above
    /// it is new to the client.
    pub min_usn: i32,
    /// Server's usn at negotiation: every row sent gets it.
    pub max_usn: i32,
}

impl UsnWindow {
    /// Usn the collection holds after a successful sync.
    pub fn next_usn(&self) -> i32 {
        self.max_usn + 1
    }
}

/// Version stamping for one role of one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionClock {
    role: Role,
    usn: i32,
}

impl VersionClock {
    /// Creates a clock for `role` over a store currently at `usn`.
    pub fn new(role: Role, usn: i32) -> Self {
        Self { role, usn }
    }

    /// The role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The store's usn.
    pub fn current(&self) -> i32 {
        self.usn
    }

    /// Usn to write on rows this side changes.
    pub fn stamp(&self) -> i32 {
        match self.role {
            Role::Client => PENDING_USN,
            Role::Server => self.usn,
        }
    }

    /// Usn recorded on graves created while applying the peer's deletions.
    ///
    /// Those deletions already exist on the peer, so they are never pending.
    pub fn applied_stamp(&self) -> i32 {
        self.usn
    }

    /// Whether a row with `usn` has to be sent to the peer.
    pub fn selects(&self, usn: i32, min_usn: i32) -> bool {
        match self.role {
            Role::Client => usn == PENDING_USN,
            Role::Server => usn >= min_usn,
        }
    }

    /// SQL condition over a `usn` column equivalent to [`VersionClock::selects`].
    pub fn filter_sql(&self, min_usn: i32) -> String {
        match self.role {
            Role::Client => format!("usn = {PENDING_USN}"),
            Role::Server => format!("usn >= {min_usn}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_selects_pending_only() {
        let clock = VersionClock::new(Role::Client, 10);
        assert_eq!(clock.stamp(), PENDING_USN);
        assert_eq!(clock.applied_stamp(), 10);
        assert!(clock.selects(PENDING_USN, 5));
        assert!(!clock.selects(7, 5));
        assert_eq!(clock.filter_sql(5), "usn = -1");
    }

    #[test]
    fn server_selects_window() {
        let clock = VersionClock::new(Role::Server, 10);
        assert_eq!(clock.stamp(), 10);
        assert!(clock.selects(5, 5));
        assert!(clock.selects(9, 5));
        assert!(!clock.selects(4, 5));
        assert_eq!(clock.filter_sql(5), "usn >= 5");
    }

    #[test]
    fn window_next_usn() {
        let window = UsnWindow { min_usn: 3, max_usn: 8 };
        assert_eq!(window.next_usn(), 9);
    }
}
