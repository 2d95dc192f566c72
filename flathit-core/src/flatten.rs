//! Sizing phase of the ragged-array flattening.
//!
//! The two-pass discipline is explicit here: [`SizingPlan`] is a pure
//! function of the per-event selections and fixes the output array lengths
//! before anything is allocated or written. The fill phase (in the I/O
//! layer) only ever appends, and checks itself against the plan.

use crate::event::{direction_angles, particle_label, EventRecord, HitBlock, Stream};
use crate::qualify::EventSelection;
use crate::veto::VetoFlags;

/// Exact output sizes derived from pass 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizingPlan {
    /// Number of output rows (qualifying events).
    pub rows: usize,
    /// Total flat-array hit count per stream, indexed by [`Stream::index`].
    pub stream_hits: [usize; 2],
}

impl SizingPlan {
    /// Accumulates the plan over per-event selections, in source order.
    pub fn from_selections<'a, I>(selections: I) -> Self
    where
        I: IntoIterator<Item = &'a EventSelection>,
    {
        let mut plan = SizingPlan::default();
        for selection in selections {
            plan.add(selection);
        }
        plan
    }

    /// Adds one event's selection to the plan.
    pub fn add(&mut self, selection: &EventSelection) {
        if !selection.retained {
            return;
        }
        self.rows += 1;
        for stream in Stream::ALL {
            self.stream_hits[stream.index()] += selection.hit_count(stream);
        }
    }

    /// Merges another plan into this one (e.g. per-file partial plans).
    pub fn extend(&mut self, other: &SizingPlan) {
        self.rows += other.rows;
        for i in 0..2 {
            self.stream_hits[i] += other.stream_hits[i];
        }
    }

    /// Planned hit capacity of one stream.
    #[must_use]
    pub fn hits(&self, stream: Stream) -> usize {
        self.stream_hits[stream.index()]
    }
}

/// Scalar output fields of one qualifying event.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow {
    /// Training label derived from the primary pid.
    pub label: i32,
    /// Path of the originating record.
    pub source_file: String,
    /// Source-local event index.
    pub event_id: i32,
    /// Primary energy.
    pub energy: f32,
    /// Primary vertex position.
    pub position: [f32; 3],
    /// Polar and azimuthal angles of the primary direction.
    pub angles: [f32; 2],
    /// Escape flag from start energies.
    pub veto: bool,
    /// Escape flag from end-of-track energy estimates.
    pub veto2: bool,
}

impl FlatRow {
    /// Derives the scalar row of one event.
    #[must_use]
    pub fn from_event(event: &EventRecord, flags: VetoFlags) -> Self {
        Self {
            label: particle_label(event.primary.pid),
            source_file: event.source_ref.clone(),
            event_id: event.event_id,
            energy: event.primary.energy,
            position: event.primary.position,
            angles: direction_angles(event.primary.direction),
            veto: flags.veto,
            veto2: flags.veto2,
        }
    }
}

/// Hit columns of one event under its selected trigger, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitColumns {
    /// Hit times.
    pub time: Vec<f32>,
    /// Hit charges.
    pub charge: Vec<f32>,
    /// Sensor channel ids.
    pub channel: Vec<i32>,
}

impl HitColumns {
    /// Number of gathered hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Returns true if nothing was gathered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Gathers the hits belonging to the selected trigger, preserving source
/// order. A `None` trigger gathers nothing.
#[must_use]
pub fn selected_hits(hits: &HitBlock, trigger: Option<usize>) -> HitColumns {
    let Some(selected) = trigger else {
        return HitColumns::default();
    };
    #[allow(clippy::cast_possible_wrap)]
    let tag = selected as i32;

    let mut columns = HitColumns::default();
    for i in 0..hits.len() {
        if hits.trigger[i] == tag {
            columns.time.push(hits.time[i]);
            columns.charge.push(hits.charge[i]);
            columns.channel.push(hits.channel[i]);
        }
    }
    columns
}
