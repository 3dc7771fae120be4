//! Snapshot assembly for network broadcast

use std::collections::HashMap;
use uuid::Uuid;

use crate::ws::protocol::{GameEvent, PlayerSnapshot, ServerMsg, WorldSnapshot};

/// Builds per-tick world snapshots. The snapshot rate can be decoupled from
/// the simulation rate by setting an interval greater than one tick.
pub struct SnapshotBuilder {
    ticks_since_snapshot: u32,
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force a snapshot on the next check (used after important events)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Assemble the immutable snapshot for broadcast
    pub fn build(
        &self,
        tick: u64,
        players: HashMap<Uuid, PlayerSnapshot>,
        events: Vec<GameEvent>,
    ) -> ServerMsg {
        ServerMsg::Tick(WorldSnapshot {
            tick,
            players,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_of_one_sends_every_tick() {
        let mut builder = SnapshotBuilder::new(1);
        assert!(builder.should_send());
        assert!(builder.should_send());
    }

    #[test]
    fn larger_interval_skips_ticks() {
        let mut builder = SnapshotBuilder::new(3);
        assert!(!builder.should_send());
        assert!(!builder.should_send());
        assert!(builder.should_send());
        assert!(!builder.should_send());
    }

    #[test]
    fn force_next_overrides_the_interval() {
        let mut builder = SnapshotBuilder::new(10);
        builder.force_next();
        assert!(builder.should_send());
    }
}
