//! Budget & rate ledger
//!
//! Tracks pending and committed usage per (scope, kind, window) against
//! configured limits. Mutations for a given entry are serialized behind
//! that entry's own mutex; distinct entries never contend, and no
//! operation holds more than one entry lock at a time, so cross-key
//! deadlock is impossible by construction.

use super::types::{
    LedgerKey, LedgerKind, LimitRule, LimitScope, Reservation, ReservationState, ScopeClass,
};
use crate::utils::error::{GatewayError, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

/// Prune sweep frequency, in reserve calls.
const PRUNE_EVERY: u64 = 1024;

#[derive(Debug, Default)]
struct WindowEntry {
    pending: u64,
    committed: u64,
}

/// Entry key: ledger key plus the fixed window it covers.
type EntryKey = (LedgerKey, u64);

/// Multi-window, multi-kind budget and rate ledger.
pub struct Ledger {
    rules: Vec<LimitRule>,
    entries: DashMap<EntryKey, Arc<Mutex<WindowEntry>>>,
    reserve_calls: AtomicU64,
}

impl Ledger {
    /// Create a ledger enforcing the given rules.
    pub fn new(rules: Vec<LimitRule>) -> Self {
        Self {
            rules,
            entries: DashMap::new(),
            reserve_calls: AtomicU64::new(0),
        }
    }

    /// The configured limit rules, in configuration order.
    ///
    /// The dispatch engine iterates these to know which reservations one
    /// call needs.
    pub fn rules(&self) -> &[LimitRule] {
        &self.rules
    }

    /// Reserve `amount` against the rule's current window for a concrete
    /// scope instance.
    ///
    /// Fails fast with `LimitExceeded` when pending+committed+amount would
    /// exceed the limit; no partial reservation is made.
    pub fn reserve(&self, rule: &LimitRule, scope: LimitScope, amount: u64) -> Result<Reservation> {
        self.maybe_prune();

        let window_start = window_start(unix_now(), rule.window_secs);
        let key = LedgerKey {
            scope,
            kind: rule.kind,
        };
        let entry = self.entry(&key, window_start);

        let mut guard = entry.lock();
        let usage = guard.pending + guard.committed;
        if usage + amount > rule.limit {
            debug!(
                scope = %key.scope,
                kind = %key.kind,
                usage,
                limit = rule.limit,
                amount,
                "reservation rejected"
            );
            return Err(GatewayError::LimitExceeded {
                scope: key.scope,
                usage,
                limit: rule.limit,
            });
        }
        guard.pending += amount;
        drop(guard);

        Ok(Reservation {
            id: Uuid::new_v4(),
            key,
            window_start,
            window_secs: rule.window_secs,
            amount,
            state: ReservationState::Pending,
        })
    }

    /// Finalize a reservation at the actual measured amount.
    ///
    /// The actual amount may exceed the estimate; the overage is recorded
    /// (the call already happened) and simply makes subsequent reserves
    /// fail until the window rolls over.
    pub fn commit(&self, reservation: &mut Reservation, actual: u64) -> Result<()> {
        self.resolve(reservation, ReservationState::Committed, actual)
    }

    /// Release a reservation with net-zero effect on the ledger.
    pub fn rollback(&self, reservation: &mut Reservation) -> Result<()> {
        self.resolve(reservation, ReservationState::RolledBack, 0)
    }

    fn resolve(
        &self,
        reservation: &mut Reservation,
        target: ReservationState,
        actual: u64,
    ) -> Result<()> {
        if reservation.state != ReservationState::Pending {
            return Err(GatewayError::Internal(format!(
                "reservation {} already resolved as {:?}",
                reservation.id, reservation.state
            )));
        }

        let entry = self.entry(&reservation.key, reservation.window_start);
        let mut guard = entry.lock();
        guard.pending = guard.pending.saturating_sub(reservation.amount);
        if target == ReservationState::Committed {
            guard.committed += actual;
        }
        drop(guard);

        reservation.state = target;
        Ok(())
    }

    /// Committed total for a scope/kind in the window containing `now`.
    pub fn committed_usage(&self, rule: &LimitRule, scope: &LimitScope) -> u64 {
        let key = LedgerKey {
            scope: scope.clone(),
            kind: rule.kind,
        };
        let window = window_start(unix_now(), rule.window_secs);
        self.entries
            .get(&(key, window))
            .map(|entry| entry.lock().committed)
            .unwrap_or(0)
    }

    fn entry(&self, key: &LedgerKey, window_start: u64) -> Arc<Mutex<WindowEntry>> {
        self.entries
            .entry((key.clone(), window_start))
            .or_insert_with(|| Arc::new(Mutex::new(WindowEntry::default())))
            .clone()
    }

    /// Opportunistically drop entries whose window ended more than one
    /// whole window ago. Late commits always target their reservation's
    /// original window, which is at most one window behind.
    fn maybe_prune(&self) {
        let calls = self.reserve_calls.fetch_add(1, Ordering::Relaxed);
        if calls % PRUNE_EVERY != 0 {
            return;
        }
        let now = unix_now();
        // Keep the current and previous window for every rule size we
        // know about; the largest configured window bounds retention.
        let max_window = self
            .rules
            .iter()
            .map(|r| r.window_secs)
            .max()
            .unwrap_or(60);
        self.entries
            .retain(|(_, start), _| *start + 2 * max_window > now);
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Fixed-bucket window start containing `now`.
fn window_start(now: u64, window_secs: u64) -> u64 {
    if window_secs == 0 {
        return now;
    }
    now - now % window_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spend_rule(limit: u64) -> LimitRule {
        LimitRule {
            scope: ScopeClass::PerApiKey,
            kind: LedgerKind::Spend,
            limit,
            window_secs: 3600,
        }
    }

    fn caller() -> LimitScope {
        LimitScope::ApiKey("sk-user".to_string())
    }

    #[test]
    fn reserve_commit_accumulates() {
        let ledger = Ledger::new(vec![spend_rule(100)]);
        let rule = ledger.rules()[0].clone();

        let mut res = ledger.reserve(&rule, caller(), 40).unwrap();
        ledger.commit(&mut res, 35).unwrap();

        assert_eq!(ledger.committed_usage(&rule, &caller()), 35);
    }

    #[test]
    fn reserve_fails_fast_at_limit() {
        let ledger = Ledger::new(vec![spend_rule(100)]);
        let rule = ledger.rules()[0].clone();

        let _held = ledger.reserve(&rule, caller(), 70).unwrap();
        match ledger.reserve(&rule, caller(), 40).unwrap_err() {
            GatewayError::LimitExceeded { usage, limit, .. } => {
                assert_eq!(usage, 70);
                assert_eq!(limit, 100);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rollback_is_net_zero() {
        let ledger = Ledger::new(vec![spend_rule(100)]);
        let rule = ledger.rules()[0].clone();

        let before = ledger.committed_usage(&rule, &caller());
        let mut res = ledger.reserve(&rule, caller(), 60).unwrap();
        ledger.rollback(&mut res).unwrap();

        assert_eq!(ledger.committed_usage(&rule, &caller()), before);
        // The released capacity is usable again.
        assert!(ledger.reserve(&rule, caller(), 100).is_ok());
    }

    #[test]
    fn double_resolution_is_rejected() {
        let ledger = Ledger::new(vec![spend_rule(100)]);
        let rule = ledger.rules()[0].clone();

        let mut res = ledger.reserve(&rule, caller(), 10).unwrap();
        ledger.commit(&mut res, 10).unwrap();

        assert!(matches!(
            ledger.commit(&mut res, 10).unwrap_err(),
            GatewayError::Internal(_)
        ));
        assert!(matches!(
            ledger.rollback(&mut res).unwrap_err(),
            GatewayError::Internal(_)
        ));
        // Nothing was double-counted.
        assert_eq!(ledger.committed_usage(&rule, &caller()), 10);
    }

    #[test]
    fn overage_commit_blocks_further_reserves_only() {
        let ledger = Ledger::new(vec![spend_rule(100)]);
        let rule = ledger.rules()[0].clone();

        let mut res = ledger.reserve(&rule, caller(), 50).unwrap();
        // Actual usage came in far above the estimate.
        ledger.commit(&mut res, 150).unwrap();

        assert_eq!(ledger.committed_usage(&rule, &caller()), 150);
        assert!(matches!(
            ledger.reserve(&rule, caller(), 1).unwrap_err(),
            GatewayError::LimitExceeded { .. }
        ));
    }

    #[test]
    fn distinct_scopes_do_not_contend() {
        let ledger = Ledger::new(vec![spend_rule(10)]);
        let rule = ledger.rules()[0].clone();

        let _a = ledger
            .reserve(&rule, LimitScope::ApiKey("sk-a".to_string()), 10)
            .unwrap();
        // A different key has its own window.
        assert!(ledger
            .reserve(&rule, LimitScope::ApiKey("sk-b".to_string()), 10)
            .is_ok());
    }

    #[test]
    fn concurrent_reserves_admit_exactly_floor_of_capacity() {
        use std::sync::Arc;
        use std::thread;

        let ledger = Arc::new(Ledger::new(vec![spend_rule(100)]));
        let rule = ledger.rules()[0].clone();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let ledger = ledger.clone();
            let rule = rule.clone();
            handles.push(thread::spawn(move || {
                ledger.reserve(&rule, caller(), 30).is_ok()
            }));
        }

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        // floor(100 / 30) = 3, regardless of arrival order.
        assert_eq!(admitted, 3);
    }

    #[test]
    fn prune_drops_windows_older_than_two_spans() {
        let ledger = Ledger::new(vec![spend_rule(100)]);
        let rule = ledger.rules()[0].clone();

        let key = LedgerKey {
            scope: caller(),
            kind: rule.kind,
        };
        let stale_start =
            window_start(unix_now(), rule.window_secs) - 3 * rule.window_secs;
        ledger.entry(&key, stale_start);
        assert!(ledger.entries.contains_key(&(key.clone(), stale_start)));

        // The sweep rides the reserve-call counter; drive it past a
        // full cycle so at least one sweep runs.
        for _ in 0..=PRUNE_EVERY {
            let _ = ledger.reserve(&rule, caller(), 0);
        }

        assert!(!ledger.entries.contains_key(&(key.clone(), stale_start)));
        // The current window survives the sweep.
        let current = window_start(unix_now(), rule.window_secs);
        assert!(ledger.entries.contains_key(&(key, current)));
    }

    #[test]
    fn window_start_buckets_are_fixed() {
        assert_eq!(window_start(3_601, 3_600), 3_600);
        assert_eq!(window_start(7_199, 3_600), 3_600);
        assert_eq!(window_start(7_200, 3_600), 7_200);
        assert_eq!(window_start(123, 0), 123);
    }
}
