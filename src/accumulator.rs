//! Consumes [`RangingUpdate`]s from a [`RangingSource`] and condenses them
//! into per-target detections: a short history window per (end, anchor)
//! pair, averaged to knock down the measurement jitter, sorted
//! nearest-first.

use crate::label::EndSide;
use crate::source::{RangingSource, RangingUpdate};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

/// How many updates per target feed the moving average.
const WINDOW_SIZE: usize = 5;

/// A target that contributed nothing to this many consecutive drains has
/// left range and gets dropped. At the 10 Hz poll rate this is one second.
const STALE_POLL_LIMIT: u32 = 10;

/// One foreign target as currently seen from one vehicle end.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Detection {
    /// The local end that sees it.
    pub side: EndSide,
    /// The foreign slave's short address.
    pub anchor_id: String,
    /// Which end of the foreign vehicle the slave serves.
    pub target_side: EndSide,
    /// Corrected clearance averaged over the window, when any window entry
    /// had a defined correction.
    pub corrected_mm: Option<i32>,
    /// Most recent raw range.
    pub raw_dist_mm: i32,
    /// Superframe of the most recent update.
    pub superframe: u64,
}

impl Detection {
    /// Sort key: corrected clearance when defined. Detections without a
    /// correction rank behind every corrected one, ordered among
    /// themselves by raw range.
    fn proximity(&self) -> (bool, i64) {
        match self.corrected_mm {
            Some(mm) => (false, mm as i64),
            None => (true, self.raw_dist_mm as i64),
        }
    }
}

/// One target's bounded update history, with a count of consecutive
/// drains that brought nothing new.
struct TargetHistory {
    window: VecDeque<RangingUpdate>,
    stale_polls: u32,
}

/// The `DetectionAccumulator` consumes updates from a [`RangingSource`] and
/// accumulates them. It can be queried for the current per-target picture
/// with [`DetectionAccumulator::detections`]. Targets that stop producing
/// updates age out, so a vehicle that has driven off drops back to no
/// detections instead of alarming on its last window forever.
pub struct DetectionAccumulator<S>
where
    S: RangingSource,
{
    source_handle: Arc<Mutex<S>>,
    history: HashMap<(EndSide, String), TargetHistory>,
}

impl<S> DetectionAccumulator<S>
where
    S: RangingSource,
{
    /// Instantiates a new accumulator attached to a source.
    pub fn new(source_handle: Arc<Mutex<S>>) -> Self {
        Self {
            source_handle,
            history: HashMap::new(),
        }
    }

    /// Drains the source and returns every target's current detection,
    /// nearest first.
    pub fn detections(&mut self) -> Vec<Detection> {
        for entry in self.history.values_mut() {
            entry.stale_polls += 1;
        }
        for update in self.source_handle.lock().unwrap().by_ref() {
            let entry = self
                .history
                .entry((update.side, update.anchor_id.clone()))
                .or_insert_with(|| TargetHistory {
                    window: VecDeque::new(),
                    stale_polls: 0,
                });
            entry.window.push_back(update);
            entry.stale_polls = 0;
        }
        self.history
            .retain(|_, entry| entry.stale_polls <= STALE_POLL_LIMIT);

        let mut detections: Vec<Detection> = self
            .history
            .values()
            .map(|entry| {
                let latest = entry.window.back().expect("windows are never empty");

                let corrected: Vec<i64> = entry
                    .window
                    .iter()
                    .rev()
                    .take(WINDOW_SIZE)
                    .filter_map(|u| u.corrected_mm.map(|mm| mm as i64))
                    .collect();
                let corrected_mm = if corrected.is_empty() {
                    None
                } else {
                    Some((corrected.iter().sum::<i64>() / corrected.len() as i64) as i32)
                };

                Detection {
                    side: latest.side,
                    anchor_id: latest.anchor_id.clone(),
                    target_side: latest.slave.side,
                    corrected_mm,
                    raw_dist_mm: latest.raw_dist_mm,
                    superframe: latest.superframe,
                }
            })
            .collect();

        for entry in self.history.values_mut() {
            while entry.window.len() > WINDOW_SIZE {
                entry.window.pop_front();
            }
        }

        detections.sort_by_key(|d| d.proximity());
        detections
    }

    /// The detections one vehicle end currently sees, nearest first.
    pub fn detections_for(&mut self, side: EndSide) -> Vec<Detection> {
        self.detections()
            .into_iter()
            .filter(|d| d.side == side)
            .collect()
    }
}
