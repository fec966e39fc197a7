//! Change gating

use crate::error::Result;
use crate::types::{DashboardState, Snapshot};

/// Lets a state through only when its serialization differs from the last
/// one let through, and stamps what passes with a sequence number and a
/// strictly increasing sync time.
#[derive(Debug, Default)]
pub struct ChangeGate {
    last: Option<Vec<u8>>,
    seq: u64,
    last_synced_at: i64,
    always_emit: bool,
}

impl ChangeGate {
    /// With `always_emit`, every offered state passes (demo mode).
    pub fn new(always_emit: bool) -> Self {
        Self {
            always_emit,
            ..Default::default()
        }
    }

    /// Offer a freshly built state. Returns the snapshot to broadcast, if any.
    pub fn offer(&mut self, state: DashboardState, now_ms: i64) -> Result<Option<Snapshot>> {
        let bytes = serde_json::to_vec(&state)?;
        if !self.always_emit && self.last.as_deref() == Some(bytes.as_slice()) {
            return Ok(None);
        }
        self.last = Some(bytes);
        Ok(Some(self.stamp(state, now_ms)))
    }

    /// Stamp a state unconditionally without changing the comparison baseline.
    pub fn stamp(&mut self, state: DashboardState, now_ms: i64) -> Snapshot {
        self.seq += 1;
        self.last_synced_at = now_ms.max(self.last_synced_at + 1);
        Snapshot {
            seq: self.seq,
            synced_at: self.last_synced_at,
            state,
        }
    }

    /// Number of snapshots stamped so far.
    pub fn emitted(&self) -> u64 {
        self.seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssistantStatus, Stats, StatusState};

    fn state() -> DashboardState {
        DashboardState {
            status: AssistantStatus {
                state: StatusState::Idle,
                last_activity_at: None,
                model: None,
                session: None,
            },
            sub_agents: vec![],
            cron_jobs: vec![],
            activity: vec![],
            stats: Stats::default(),
            demo: false,
        }
    }

    #[test]
    fn test_snapshot_change_gating() {
        let mut gate = ChangeGate::new(false);
        assert!(gate.offer(state(), 1_000).unwrap().is_some());
        assert!(gate.offer(state(), 3_000).unwrap().is_none());

        let mut changed = state();
        changed.stats.avg_response_ms = 1;
        let second = gate.offer(changed, 5_000).unwrap().unwrap();
        assert_eq!(second.seq, 2);
        assert_eq!(gate.emitted(), 2);
    }

    #[test]
    fn test_demo_mode_always_emits() {
        let mut gate = ChangeGate::new(true);
        assert!(gate.offer(state(), 1_000).unwrap().is_some());
        assert!(gate.offer(state(), 2_000).unwrap().is_some());
    }

    #[test]
    fn test_synced_at_strictly_increases() {
        let mut gate = ChangeGate::new(true);
        let a = gate.offer(state(), 5_000).unwrap().unwrap();
        // Clock went backwards
        let b = gate.offer(state(), 4_000).unwrap().unwrap();
        let c = gate.stamp(state(), 4_000);
        assert_eq!(a.synced_at, 5_000);
        assert_eq!(b.synced_at, 5_001);
        assert_eq!(c.synced_at, 5_002);
    }
}
