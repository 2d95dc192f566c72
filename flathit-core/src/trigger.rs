//! Per-event trigger selection.
//!
//! Each event may carry several acquisition windows per stream; exactly one
//! of them (the earliest valid one) is authoritative, and only hits tagged
//! with it survive into the output.

use crate::event::{HitBlock, TriggerBlock};

/// Outcome of trigger selection for one event and one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSelection {
    /// Index of the selected trigger, or `None` if no valid trigger exists.
    pub trigger: Option<usize>,
    /// Number of hits tagged with the selected trigger.
    pub hit_count: usize,
}

impl TriggerSelection {
    /// A disqualified stream: no trigger, no hits.
    pub const NONE: TriggerSelection = TriggerSelection {
        trigger: None,
        hit_count: 0,
    };
}

/// Selects the authoritative trigger of one event for one stream.
///
/// Valid triggers are those with type 0. Among them the one with the minimum
/// time wins; ties break to the lowest trigger index (stable argmin). A
/// stream without any valid trigger yields [`TriggerSelection::NONE`], which
/// is a normal disqualifying outcome rather than an error.
#[must_use]
pub fn select_trigger(triggers: &TriggerBlock, hits: &HitBlock) -> TriggerSelection {
    let mut best: Option<(usize, f32)> = None;
    for (index, (&time, &kind)) in triggers.time.iter().zip(&triggers.kind).enumerate() {
        if kind != 0 {
            continue;
        }
        match best {
            Some((_, best_time)) if time >= best_time => {}
            _ => best = Some((index, time)),
        }
    }

    let Some((selected, _)) = best else {
        return TriggerSelection::NONE;
    };

    #[allow(clippy::cast_possible_wrap)]
    let tag = selected as i32;
    let hit_count = hits.trigger.iter().filter(|&&t| t == tag).count();

    TriggerSelection {
        trigger: Some(selected),
        hit_count,
    }
}
