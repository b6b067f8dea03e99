//! Live broadcast gateway: one delta per committed event, per match.
//!
//! Delivery is at-least-once. A receiver that lags behind the channel
//! capacity gets `RecvError::Lagged` and should catch up by replaying the
//! ledger from its `DeltaCursor`.

use crate::{
    event::BallEvent,
    figures::PlayerFigures,
    innings::InningsState,
    types::{MatchId, Sequence},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Wire shape: `{sequence, event, inningsState, changedFigures[]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeltaMessage {
    pub sequence: Sequence,
    pub event: BallEvent,
    pub innings_state: InningsState,
    pub changed_figures: Vec<PlayerFigures>,
}

impl DeltaMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub struct BroadcastGateway {
    capacity: usize,
    channels: Mutex<HashMap<MatchId, broadcast::Sender<DeltaMessage>>>,
}

impl BroadcastGateway {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), channels: Mutex::new(HashMap::new()) }
    }

    fn sender(&self, match_id: &str) -> broadcast::Sender<DeltaMessage> {
        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels
            .entry(match_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn subscribe(&self, match_id: &str) -> broadcast::Receiver<DeltaMessage> {
        self.sender(match_id).subscribe()
    }

    /// Returns how many receivers the delta reached. Zero is not an error.
    pub fn publish(&self, delta: DeltaMessage) -> usize {
        let match_id = delta.event.match_id.clone();
        let sequence = delta.sequence;
        match self.sender(&match_id).send(delta) {
            Ok(n) => {
                log::debug!("match={match_id} delta {sequence} sent to {n} subscriber(s)");
                n
            }
            Err(_) => 0,
        }
    }

    pub fn subscriber_count(&self, match_id: &str) -> usize {
        self.sender(match_id).receiver_count()
    }
}

/// Consumer-side filter: drops anything at or below the last sequence seen.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeltaCursor {
    pub last_seen: Sequence,
}

impl DeltaCursor {
    pub fn new(last_seen: Sequence) -> Self {
        Self { last_seen }
    }

    /// True if `delta` is new and should be rendered.
    pub fn accept(&mut self, delta: &DeltaMessage) -> bool {
        if delta.sequence <= self.last_seen {
            return false;
        }
        self.last_seen = delta.sequence;
        true
    }

    /// Sequences missing between the cursor and `delta`, if any.
    pub fn gap_before(&self, delta: &DeltaMessage) -> Option<(Sequence, Sequence)> {
        (delta.sequence > self.last_seen + 1).then(|| (self.last_seen + 1, delta.sequence - 1))
    }
}
