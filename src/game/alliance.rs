use std::collections::BTreeSet;

use crate::world::PlayerId;

pub type AllianceId = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct Alliance {
    pub id: AllianceId,
    pub name: String,
    pub leader_id: PlayerId,
    /// Members in join order. The leader is always a member.
    pub members: Vec<PlayerId>,
    pub is_public: bool,
    /// Players allowed to join while the alliance is private.
    pub invites: BTreeSet<PlayerId>,
}

/// What happened to an alliance after a member departed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    Left,
    LeaderChanged(PlayerId),
    Disbanded,
}

impl Alliance {
    pub fn new(id: AllianceId, name: String, leader_id: PlayerId, is_public: bool) -> Self {
        Alliance {
            id,
            name,
            leader_id,
            members: vec![leader_id],
            is_public,
            invites: BTreeSet::new(),
        }
    }

    pub fn is_member(&self, player_id: PlayerId) -> bool {
        self.members.contains(&player_id)
    }

    pub fn can_join(&self, player_id: PlayerId) -> bool {
        self.is_public || self.invites.contains(&player_id)
    }

    pub fn add_member(&mut self, player_id: PlayerId) {
        self.invites.remove(&player_id);
        if !self.is_member(player_id) {
            self.members.push(player_id);
        }
    }

    /// Remove a member. A departing leader hands over to the longest-standing
    /// remaining member; the last member leaving disbands the alliance.
    pub fn remove_member(&mut self, player_id: PlayerId) -> Departure {
        self.members.retain(|&m| m != player_id);
        match self.members.first() {
            None => Departure::Disbanded,
            Some(&next) if self.leader_id == player_id => {
                self.leader_id = next;
                Departure::LeaderChanged(next)
            }
            Some(_) => Departure::Left,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn founder_is_leader_and_member() {
        let a = Alliance::new(1, "North".into(), 7, true);
        assert_eq!(a.leader_id, 7);
        assert_eq!(a.members, vec![7]);
    }

    #[test]
    fn leader_departure_promotes_oldest_member() {
        let mut a = Alliance::new(1, "North".into(), 7, true);
        a.add_member(3);
        a.add_member(9);
        assert_eq!(a.remove_member(7), Departure::LeaderChanged(3));
        assert_eq!(a.leader_id, 3);
        assert_eq!(a.members, vec![3, 9]);
    }

    #[test]
    fn last_member_departure_disbands() {
        let mut a = Alliance::new(1, "North".into(), 7, true);
        a.add_member(3);
        assert_eq!(a.remove_member(3), Departure::Left);
        assert_eq!(a.remove_member(7), Departure::Disbanded);
        assert!(a.members.is_empty());
    }

    #[test]
    fn private_alliance_requires_invite() {
        let mut a = Alliance::new(1, "Closed".into(), 7, false);
        assert!(!a.can_join(4));
        a.invites.insert(4);
        assert!(a.can_join(4));
        a.add_member(4);
        assert!(a.invites.is_empty(), "joining consumes the invite");
    }
}
