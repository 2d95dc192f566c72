//! Event data model.
//!
//! Per-event simulation data is carried in Structure of Arrays (`SoA`) blocks
//! rather than per-hit structs: one event typically holds thousands of hits
//! and the pipeline only ever walks whole columns.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Independently-triggered sensor subsystem.
///
/// The two streams carry unrelated trigger numbering: trigger index `k` in
/// one stream has no relation to index `k` in the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Stream {
    /// Primary sensor class.
    Primary,
    /// Secondary sensor class.
    Secondary,
}

impl Stream {
    /// Both streams, in canonical order.
    pub const ALL: [Stream; 2] = [Stream::Primary, Stream::Secondary];

    /// Dataset-name suffix for this stream.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Stream::Primary => "primary",
            Stream::Secondary => "secondary",
        }
    }

    /// Index into per-stream arrays.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Acquisition windows of one event within one stream (`SoA` layout).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerBlock {
    /// Trigger times.
    pub time: Vec<f32>,
    /// Trigger types; 0 is a valid physics trigger, anything else disqualifies.
    pub kind: Vec<i32>,
}

impl TriggerBlock {
    /// Returns the number of triggers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Returns true if the event has no triggers in this stream.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Digitized hits of one event within one stream (`SoA` layout).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitBlock {
    /// Hit times.
    pub time: Vec<f32>,
    /// Hit charges.
    pub charge: Vec<f32>,
    /// Sensor channel ids.
    pub channel: Vec<i32>,
    /// Index of the trigger each hit belongs to, within this stream.
    pub trigger: Vec<i32>,
}

impl HitBlock {
    /// Creates an empty block with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            time: Vec::with_capacity(capacity),
            charge: Vec::with_capacity(capacity),
            channel: Vec::with_capacity(capacity),
            trigger: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// Returns true if the block holds no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Pushes a single hit.
    pub fn push(&mut self, time: f32, charge: f32, channel: i32, trigger: i32) {
        self.time.push(time);
        self.charge.push(charge);
        self.channel.push(channel);
        self.trigger.push(trigger);
    }
}

/// Simulated particle segments of one event (`SoA` layout).
///
/// Consumed only by the veto evaluation; never persisted to the output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackBlock {
    /// Signed particle-type codes.
    pub pid: Vec<i32>,
    /// Energies at track start.
    pub energy: Vec<f32>,
    /// Track start positions.
    pub start: Vec<[f32; 3]>,
    /// Track stop positions.
    pub stop: Vec<[f32; 3]>,
}

impl TrackBlock {
    /// Returns the number of tracks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pid.len()
    }

    /// Returns true if the event has no tracks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pid.is_empty()
    }

    /// Pushes a single track.
    pub fn push(&mut self, pid: i32, energy: f32, start: [f32; 3], stop: [f32; 3]) {
        self.pid.push(pid);
        self.energy.push(energy);
        self.start.push(start);
        self.stop.push(stop);
    }
}

/// Primary-particle scalars of one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimaryVertex {
    /// Particle-type code of the primary.
    pub pid: i32,
    /// Vertex position.
    pub position: [f32; 3],
    /// Unit direction of the primary.
    pub direction: [f32; 3],
    /// Primary energy.
    pub energy: f32,
}

/// One simulated interaction, as decoded from a dump file.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Source-local event index.
    pub event_id: i32,
    /// Opaque handle back to the originating record (a file path).
    pub source_ref: String,
    /// Primary-particle scalars.
    pub primary: PrimaryVertex,
    /// Per-stream acquisition windows, indexed by [`Stream::index`].
    pub triggers: [TriggerBlock; 2],
    /// Per-stream digitized hits, indexed by [`Stream::index`].
    pub hits: [HitBlock; 2],
    /// Particle tracks.
    pub tracks: TrackBlock,
}

impl EventRecord {
    /// Triggers of one stream.
    #[must_use]
    pub fn triggers(&self, stream: Stream) -> &TriggerBlock {
        &self.triggers[stream.index()]
    }

    /// Hits of one stream.
    #[must_use]
    pub fn hits(&self, stream: Stream) -> &HitBlock {
        &self.hits[stream.index()]
    }
}

/// Maps a primary particle-type code to a training label.
///
/// Unknown species map to −1; the event is still retained.
#[must_use]
pub fn particle_label(pid: i32) -> i32 {
    match pid {
        22 => 0,
        11 => 1,
        13 => 2,
        _ => -1,
    }
}

/// Polar and azimuthal angles of a direction vector.
///
/// The polar axis is the second spatial axis; the azimuth is measured in the
/// plane of the first and third axes.
#[must_use]
pub fn direction_angles(direction: [f32; 3]) -> [f32; 2] {
    [
        direction[1].acos(),
        direction[2].atan2(direction[0]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_particle_label_map() {
        assert_eq!(particle_label(22), 0);
        assert_eq!(particle_label(11), 1);
        assert_eq!(particle_label(13), 2);
        assert_eq!(particle_label(999), -1);
        assert_eq!(particle_label(-13), -1);
    }

    #[test]
    fn test_angles_along_polar_axis() {
        let [polar, _] = direction_angles([0.0, 1.0, 0.0]);
        assert_abs_diff_eq!(polar, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_azimuth_along_first_axis() {
        let [polar, azimuth] = direction_angles([1.0, 0.0, 0.0]);
        assert_abs_diff_eq!(polar, std::f32::consts::FRAC_PI_2, epsilon = 1e-6);
        assert_abs_diff_eq!(azimuth, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_azimuth_along_third_axis() {
        let [_, azimuth] = direction_angles([0.0, 0.0, 1.0]);
        assert_abs_diff_eq!(azimuth, std::f32::consts::FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn test_hit_block_push() {
        let mut block = HitBlock::with_capacity(2);
        assert!(block.is_empty());
        block.push(10.0, 1.5, 42, 0);
        block.push(11.0, 2.5, 43, 1);
        assert_eq!(block.len(), 2);
        assert_eq!(block.channel, vec![42, 43]);
    }
}
