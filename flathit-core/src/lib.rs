//! flathit-core: Event-trigger selection and ragged-array sizing.
//!
//! This crate holds the pure logic of the flattening pipeline: picking the
//! authoritative trigger per event and sensor stream, qualifying events
//! against a minimum-hit threshold, deriving escape-veto flags from particle
//! tracks, and sizing the flat output arrays before anything is written.
//!

pub mod error;
pub mod event;
pub mod flatten;
pub mod qualify;
pub mod trigger;
pub mod veto;

pub use error::{Error, Result};
pub use event::{
    direction_angles, particle_label, EventRecord, HitBlock, PrimaryVertex, Stream, TrackBlock,
    TriggerBlock,
};
pub use flatten::{selected_hits, FlatRow, HitColumns, SizingPlan};
pub use qualify::{qualify_event, EventSelection, QualifyConfig, QualifyPolicy};
pub use trigger::{select_trigger, TriggerSelection};
pub use veto::{evaluate_veto, VetoConfig, VetoFlags};
