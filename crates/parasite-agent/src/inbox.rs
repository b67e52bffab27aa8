//! Per-agent proposal inbox
//!
//! A proposal sits in `pending` until the owning agent resolves it, then moves
//! to `history` and never changes again. Ids are time ordered, so sorting by
//! id is sorting by creation time.

use chrono::{DateTime, Utc};
use parasite_common::{Infection, InfectionState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct Inbox {
    pending: Vec<Infection>,
    history: Vec<Infection>,
    sent: Vec<Uuid>,
}

/// Counters over everything an inbox has seen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboxStats {
    pub sent: usize,
    pub received: usize,
    pub pending: usize,
    pub accepted: usize,
    pub mutated: usize,
    pub rejected: usize,
    pub expired: usize,
    /// Share of resolved proposals that were accepted or mutated
    pub success_rate: f64,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receive(&mut self, infection: Infection) {
        self.pending.push(infection);
    }

    pub fn record_sent(&mut self, id: Uuid) {
        self.sent.push(id);
    }

    pub fn pending(&self) -> &[Infection] {
        &self.pending
    }

    pub fn history(&self) -> &[Infection] {
        &self.history
    }

    pub fn sent(&self) -> &[Uuid] {
        &self.sent
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Hand every pending proposal to the caller for resolution
    pub fn take_pending(&mut self) -> Vec<Infection> {
        std::mem::take(&mut self.pending)
    }

    /// Archive a resolved proposal; pending ones are put back in the queue
    pub fn resolve(&mut self, infection: Infection) {
        if infection.is_pending() {
            self.pending.push(infection);
        } else {
            self.history.push(infection);
        }
    }

    /// Expire and archive pending proposals older than `ttl`
    ///
    /// Returns the expired proposals, oldest first.
    pub fn expire_older_than(&mut self, ttl: chrono::Duration, now: DateTime<Utc>) -> Vec<Infection> {
        let (stale, fresh): (Vec<Infection>, Vec<Infection>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|i| i.is_stale(ttl, now));
        self.pending = fresh;

        let mut expired = Vec::with_capacity(stale.len());
        for mut infection in stale {
            // partition only yields pending proposals, so expire cannot fail
            if infection.expire().is_ok() {
                expired.push(infection.clone());
                self.history.push(infection);
            } else {
                self.pending.push(infection);
            }
        }
        expired
    }

    /// Up to `limit` proposals, pending and resolved, newest first
    pub fn recent(&self, limit: usize) -> Vec<&Infection> {
        let mut all: Vec<&Infection> = self.pending.iter().chain(self.history.iter()).collect();
        all.sort_by(|a, b| b.id().cmp(&a.id()));
        all.truncate(limit);
        all
    }

    pub fn stats(&self) -> InboxStats {
        let count = |state: InfectionState| self.history.iter().filter(|i| i.state() == state).count();
        let accepted = count(InfectionState::Accepted);
        let mutated = count(InfectionState::Mutated);
        let rejected = count(InfectionState::Rejected);
        let expired = count(InfectionState::Expired);
        let resolved = self.history.len();

        InboxStats {
            sent: self.sent.len(),
            received: self.pending.len() + resolved,
            pending: self.pending.len(),
            accepted,
            mutated,
            rejected,
            expired,
            success_rate: if resolved > 0 {
                (accepted + mutated) as f64 / resolved as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parasite_common::{InfectionKind, InfectionPayload};

    fn proposal(message: &str) -> Infection {
        Infection::create("agent_b", "agent_a", InfectionKind::Suggestion, InfectionPayload::new(message))
    }

    #[test]
    fn test_recent_is_newest_first() {
        let mut inbox = Inbox::new();
        let first = proposal("first");
        let second = proposal("second");
        let third = proposal("third");
        let (second_id, third_id) = (second.id(), third.id());

        inbox.receive(second);
        inbox.receive(first);
        inbox.receive(third);

        let recent = inbox.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id(), third_id);
        assert_eq!(recent[1].id(), second_id);
    }

    #[test]
    fn test_resolve_moves_to_history() {
        let mut inbox = Inbox::new();
        inbox.receive(proposal("a"));
        inbox.receive(proposal("b"));

        let mut taken = inbox.take_pending();
        assert!(!inbox.has_pending());

        taken[0].accept("fits").unwrap();
        let still_pending = taken.pop().unwrap();
        inbox.resolve(taken.pop().unwrap());
        inbox.resolve(still_pending);

        assert_eq!(inbox.history().len(), 1);
        assert_eq!(inbox.pending().len(), 1);
    }

    #[test]
    fn test_expire_older_than() {
        let mut inbox = Inbox::new();
        inbox.receive(proposal("old"));

        let now = Utc::now();
        assert!(inbox.expire_older_than(chrono::Duration::hours(1), now).is_empty());

        let later = now + chrono::Duration::hours(2);
        let expired = inbox.expire_older_than(chrono::Duration::hours(1), later);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].state(), InfectionState::Expired);
        assert!(!inbox.has_pending());
        assert_eq!(inbox.stats().expired, 1);
    }

    #[test]
    fn test_stats() {
        let mut inbox = Inbox::new();
        for (i, msg) in ["a", "b", "c", "d"].iter().enumerate() {
            let mut p = proposal(msg);
            match i {
                0 => p.accept("ok").unwrap(),
                1 => p.mutate(serde_json::json!({}), "partly").unwrap(),
                2 => p.reject("no").unwrap(),
                _ => {}
            }
            inbox.resolve(p);
        }
        inbox.record_sent(Uuid::nil());

        let stats = inbox.stats();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.received, 4);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.mutated, 1);
        assert_eq!(stats.rejected, 1);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }
}
