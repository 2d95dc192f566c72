//! Event qualification.
//!
//! Combines per-stream trigger selections into the per-event decision that
//! drives both passes: whether the event gets an output row, and how many
//! hits each stream contributes to it.
//!
//! Both policies share one row space: a retained event occupies exactly one
//! row regardless of which streams qualified, with a failing stream
//! contributing an empty hit span. Streams deliberately do not get separate
//! per-stream row counts.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::event::Stream;
use crate::trigger::TriggerSelection;

/// How per-stream hit counts combine into a retention decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum QualifyPolicy {
    /// Each stream is qualified against `min_hits` on its own. A row is
    /// emitted when at least one stream qualifies; a stream that fails
    /// contributes zero hits to that row.
    Independent,
    /// The event is qualified on the sum of hit counts across streams.
    /// Retained events keep hits from every stream, including streams
    /// individually below the threshold; dropped events are dropped from
    /// every stream.
    Combined,
}

/// Qualification configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QualifyConfig {
    /// Minimum hit count for retention.
    pub min_hits: usize,
    /// Combination rule across streams.
    pub policy: QualifyPolicy,
}

impl Default for QualifyConfig {
    fn default() -> Self {
        Self {
            min_hits: 1,
            policy: QualifyPolicy::Independent,
        }
    }
}

/// Per-event outcome of qualification.
///
/// `per_stream` holds the post-qualification selections: a stream that does
/// not contribute to the output row is already reduced to
/// [`TriggerSelection::NONE`], so downstream sizing and filling never need to
/// re-apply the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSelection {
    /// Whether the event gets an output row at all.
    pub retained: bool,
    /// Effective per-stream selections, indexed by [`Stream::index`].
    pub per_stream: [TriggerSelection; 2],
}

impl EventSelection {
    /// Effective hit count of one stream.
    #[must_use]
    pub fn hit_count(&self, stream: Stream) -> usize {
        self.per_stream[stream.index()].hit_count
    }
}

/// Applies the qualification policy to one event's raw stream selections.
#[must_use]
pub fn qualify_event(config: &QualifyConfig, raw: [TriggerSelection; 2]) -> EventSelection {
    match config.policy {
        QualifyPolicy::Independent => {
            let per_stream = raw.map(|selection| {
                if selection.hit_count >= config.min_hits {
                    selection
                } else {
                    TriggerSelection::NONE
                }
            });
            EventSelection {
                retained: per_stream.iter().any(|s| s.trigger.is_some()),
                per_stream,
            }
        }
        QualifyPolicy::Combined => {
            let total: usize = raw.iter().map(|s| s.hit_count).sum();
            if total >= config.min_hits {
                EventSelection {
                    retained: true,
                    per_stream: raw,
                }
            } else {
                EventSelection {
                    retained: false,
                    per_stream: [TriggerSelection::NONE; 2],
                }
            }
        }
    }
}
