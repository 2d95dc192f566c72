//! Escape-veto evaluation from particle tracks.
//!
//! Flags events in which an energetic particle likely left the sensitive
//! volume: `veto` judges the track by its start energy, `veto2` by a fixed
//! per-unit-length energy-loss estimate of its end-of-track energy.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::event::TrackBlock;

/// Detector-volume boundary and species energy thresholds.
///
/// The volume is a cylinder around the second spatial axis. Thresholds are
/// in the energy units of the input.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VetoConfig {
    /// Cylinder radius in the plane of the first and third axes.
    pub radius: f32,
    /// Half-height along the cylinder axis.
    pub half_height: f32,
    /// Energy threshold for muons (|pid| = 13).
    pub muon_energy: f32,
    /// Energy threshold for electrons (|pid| = 11).
    pub electron_energy: f32,
    /// Energy threshold for photons (|pid| = 22).
    pub gamma_energy: f32,
    /// Energy loss per unit track length, used by the end-of-track estimate.
    pub energy_loss_rate: f32,
}

impl VetoConfig {
    /// Standard thresholds for a detector of the given dimensions.
    #[must_use]
    pub fn with_volume(radius: f32, half_height: f32) -> Self {
        Self {
            radius,
            half_height,
            muon_energy: 166.0,
            electron_energy: 2.0,
            gamma_energy: 2.0,
            energy_loss_rate: 2.0,
        }
    }

    fn threshold(&self, pid: i32) -> Option<f32> {
        match pid.abs() {
            13 => Some(self.muon_energy),
            11 => Some(self.electron_energy),
            22 => Some(self.gamma_energy),
            _ => None,
        }
    }

    fn exits_volume(&self, stop: [f32; 3]) -> bool {
        let radial = stop[0].hypot(stop[2]);
        radial > self.radius || stop[1].abs() > self.half_height
    }
}

/// Escape flags of one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VetoFlags {
    /// Any listed species above its threshold at track start stops outside
    /// the volume.
    pub veto: bool,
    /// Same geometry test, with the energy estimated at track end.
    pub veto2: bool,
}

/// Evaluates both escape flags over an event's track table.
///
/// Tracks of unlisted species never contribute; an event without tracks
/// yields both flags false.
#[must_use]
pub fn evaluate_veto(config: &VetoConfig, tracks: &TrackBlock) -> VetoFlags {
    let mut flags = VetoFlags::default();
    for i in 0..tracks.len() {
        let Some(threshold) = config.threshold(tracks.pid[i]) else {
            continue;
        };
        if !config.exits_volume(tracks.stop[i]) {
            continue;
        }

        let energy = tracks.energy[i];
        if energy > threshold {
            flags.veto = true;
        }

        let length = distance(tracks.start[i], tracks.stop[i]);
        if energy - config.energy_loss_rate * length > threshold {
            flags.veto2 = true;
        }

        if flags.veto && flags.veto2 {
            break;
        }
    }
    flags
}

fn distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let dz = b[2] - a[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VetoConfig {
        VetoConfig::with_volume(3400.0, 7100.0)
    }

    fn single_track(pid: i32, energy: f32, start: [f32; 3], stop: [f32; 3]) -> TrackBlock {
        let mut tracks = TrackBlock::default();
        tracks.push(pid, energy, start, stop);
        tracks
    }

    #[test]
    fn test_no_tracks_no_veto() {
        assert_eq!(
            evaluate_veto(&config(), &TrackBlock::default()),
            VetoFlags::default()
        );
    }

    #[test]
    fn test_muon_escaping_radially() {
        let tracks = single_track(13, 500.0, [0.0; 3], [4000.0, 0.0, 0.0]);
        let flags = evaluate_veto(&config(), &tracks);
        assert!(flags.veto);
        // 500 - 2 * 4000 is far below the muon threshold.
        assert!(!flags.veto2);
    }

    #[test]
    fn test_muon_escaping_axially() {
        let tracks = single_track(-13, 200.0, [0.0; 3], [0.0, -7200.0, 0.0]);
        assert!(evaluate_veto(&config(), &tracks).veto);
    }

    #[test]
    fn test_contained_track_never_flags() {
        let tracks = single_track(13, 1e6, [0.0; 3], [100.0, 100.0, 100.0]);
        assert_eq!(evaluate_veto(&config(), &tracks), VetoFlags::default());
    }

    #[test]
    fn test_below_threshold_species() {
        // Muons need > 166; electrons and photons need > 2.
        let stop = [4000.0, 0.0, 0.0];
        let muon = single_track(13, 100.0, stop, stop);
        assert_eq!(evaluate_veto(&config(), &muon), VetoFlags::default());

        let electron = single_track(11, 3.0, stop, stop);
        let flags = evaluate_veto(&config(), &electron);
        assert!(flags.veto);
        assert!(flags.veto2);
    }

    #[test]
    fn test_unknown_species_ignored() {
        let tracks = single_track(2212, 1e6, [0.0; 3], [9000.0, 0.0, 0.0]);
        assert_eq!(evaluate_veto(&config(), &tracks), VetoFlags::default());
    }

    #[test]
    fn test_zero_length_track_flags_agree() {
        // With start == stop the end-of-track estimate equals the start
        // energy, so both flags must match.
        let stop = [0.0, 7200.0, 0.0];
        let tracks = single_track(22, 5.0, stop, stop);
        let flags = evaluate_veto(&config(), &tracks);
        assert_eq!(flags.veto, flags.veto2);
        assert!(flags.veto);
    }

    #[test]
    fn test_energy_loss_separates_flags() {
        // Escaping photon above threshold at start but not after losing
        // 2 units per unit length over a 10-unit path.
        let tracks = single_track(22, 5.0, [3990.0, 0.0, 0.0], [4000.0, 0.0, 0.0]);
        let flags = evaluate_veto(&config(), &tracks);
        assert!(flags.veto);
        assert!(!flags.veto2);
    }
}
