//! Two-pass conversion pipeline.
//!
//! Pass 1 scans every input file, selects triggers and qualifies events,
//! yielding a [`SizingPlan`] that fixes the output sizes exactly. Pass 2
//! re-reads the files in input order and appends qualifying rows through
//! the pre-sized [`FlatWriter`]. Pass 1 may run in parallel across files
//! (counts are independent per file); pass 2 is strictly sequential because
//! it appends.

use crate::dataset::{FlatWriter, ProvenanceAttrs};
use crate::source::{EventSource, Hdf5EventSource};
use crate::{Error, Result};
use flathit_core::{
    evaluate_veto, qualify_event, select_trigger, selected_hits, EventSelection, FlatRow,
    QualifyConfig, SizingPlan, Stream, VetoConfig,
};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Full configuration of one conversion run.
#[derive(Debug, Clone, Copy)]
pub struct ConvertConfig {
    /// Qualification threshold and policy.
    pub qualify: QualifyConfig,
    /// Detector volume and veto thresholds.
    pub veto: VetoConfig,
}

/// Counters reported after a conversion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    /// Number of input files processed.
    pub files: usize,
    /// Number of events scanned.
    pub events: usize,
    /// Number of rows written.
    pub rows: usize,
    /// Hits written per stream, indexed by [`Stream::index`].
    pub stream_hits: [usize; 2],
}

/// Pass 1: selects and qualifies every event of one source.
///
/// Pure with respect to the output: nothing is allocated or written, the
/// selections alone determine the sizing plan.
///
/// # Errors
/// Returns an error if an event cannot be decoded.
pub fn size_events<S: EventSource>(
    source: &S,
    config: &QualifyConfig,
) -> Result<Vec<EventSelection>> {
    let mut selections = Vec::with_capacity(source.len());
    for index in 0..source.len() {
        let event = source.event(index)?;
        let raw = Stream::ALL.map(|stream| select_trigger(event.triggers(stream), event.hits(stream)));
        selections.push(qualify_event(config, raw));
    }
    Ok(selections)
}

/// Pass 2: appends the qualifying events of one source, in source order.
///
/// Veto flags are evaluated here, on the fill pass, so disqualified events
/// never pay for track walks.
///
/// # Errors
/// Returns an error if the selections do not match the source, an event
/// cannot be decoded, or writing fails.
pub fn fill_events<S: EventSource>(
    source: &S,
    selections: &[EventSelection],
    veto: &VetoConfig,
    writer: &mut FlatWriter,
) -> Result<()> {
    if selections.len() != source.len() {
        return Err(Error::InvalidFormat(format!(
            "selection count {} does not match source event count {}",
            selections.len(),
            source.len()
        )));
    }

    for (index, selection) in selections.iter().enumerate() {
        if !selection.retained {
            continue;
        }
        let event = source.event(index)?;
        let flags = evaluate_veto(veto, &event.tracks);
        let row = FlatRow::from_event(&event, flags);
        let gathered = Stream::ALL.map(|stream| {
            selected_hits(
                event.hits(stream),
                selection.per_stream[stream.index()].trigger,
            )
        });
        writer.append_event(&row, [&gathered[0], &gathered[1]])?;
    }
    Ok(())
}

/// Converts dump files into one flat dataset.
///
/// # Errors
/// Returns an error if any input is missing or malformed, or if output
/// writing fails. Input problems surface during pass 1, before the output
/// file is created.
pub fn convert_files(
    inputs: &[PathBuf],
    output: &Path,
    config: &ConvertConfig,
    attrs: &ProvenanceAttrs,
    verbose: bool,
) -> Result<ConvertSummary> {
    if inputs.is_empty() {
        return Err(Error::InvalidFormat("no input files to convert".to_string()));
    }

    let per_file: Vec<(usize, Vec<EventSelection>)> = inputs
        .par_iter()
        .map(|path| {
            let source = Hdf5EventSource::open(path)?;
            let selections = size_events(&source, &config.qualify)?;
            if verbose {
                eprintln!(
                    "counted {}: {} events",
                    path.display(),
                    source.len()
                );
            }
            Ok((source.len(), selections))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut plan = SizingPlan::default();
    let mut events = 0usize;
    for (count, selections) in &per_file {
        events += count;
        plan.extend(&SizingPlan::from_selections(selections));
    }

    let mut writer = FlatWriter::create(output, plan, attrs)?;
    for (path, (_, selections)) in inputs.iter().zip(&per_file) {
        if verbose {
            eprintln!("filling from {}", path.display());
        }
        let source = Hdf5EventSource::open(path)?;
        fill_events(&source, selections, &config.veto, &mut writer)?;
    }
    writer.finish()?;

    Ok(ConvertSummary {
        files: inputs.len(),
        events,
        rows: plan.rows,
        stream_hits: plan.stream_hits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flathit_core::{
        EventRecord, HitBlock, PrimaryVertex, QualifyPolicy, TrackBlock, TriggerBlock,
    };
    use hdf5::File;
    use tempfile::NamedTempFile;

    struct VecSource(Vec<EventRecord>);

    impl EventSource for VecSource {
        fn len(&self) -> usize {
            self.0.len()
        }

        fn event(&self, index: usize) -> Result<EventRecord> {
            Ok(self.0[index].clone())
        }
    }

    fn attrs() -> ProvenanceAttrs {
        ProvenanceAttrs {
            version: "test".to_string(),
            command: "flathit convert".to_string(),
            timestamp: "0".to_string(),
        }
    }

    /// Event with `primary_hits` hits under the earliest valid primary
    /// trigger (plus one stray hit on another trigger) and
    /// `secondary_hits` hits in the secondary stream.
    fn event(event_id: i32, primary_hits: usize, secondary_hits: usize) -> EventRecord {
        let mut primary = HitBlock::with_capacity(primary_hits + 1);
        for i in 0..primary_hits {
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
            primary.push(10.0 + i as f32, 1.0, i as i32, 1);
        }
        primary.push(99.0, 9.9, 999, 0); // belongs to the later trigger

        let mut secondary = HitBlock::with_capacity(secondary_hits);
        for i in 0..secondary_hits {
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
            secondary.push(20.0 + i as f32, 0.5, i as i32, 0);
        }

        EventRecord {
            event_id,
            source_ref: "mem".to_string(),
            primary: PrimaryVertex {
                pid: 22,
                position: [0.0; 3],
                direction: [0.0, 1.0, 0.0],
                energy: 5.0,
            },
            triggers: [
                // Trigger 1 is valid and earliest; trigger 0 is valid but later.
                TriggerBlock {
                    time: vec![50.0, 10.0],
                    kind: vec![0, 0],
                },
                TriggerBlock {
                    time: vec![5.0],
                    kind: vec![0],
                },
            ],
            hits: [primary, secondary],
            tracks: TrackBlock::default(),
        }
    }

    /// Event whose streams have no valid trigger at all.
    fn dead_event(event_id: i32) -> EventRecord {
        let mut record = event(event_id, 2, 1);
        record.triggers[0].kind = vec![4, 4];
        record.triggers[1].kind = vec![1];
        record
    }

    #[test]
    fn test_sizing_matches_filling() {
        let source = VecSource(vec![event(0, 3, 1), dead_event(1), event(2, 2, 0)]);
        let config = QualifyConfig::default();
        let selections = size_events(&source, &config).unwrap();
        let plan = SizingPlan::from_selections(&selections);
        assert_eq!(plan.rows, 2);
        assert_eq!(plan.stream_hits, [5, 1]);

        let file = NamedTempFile::new().unwrap();
        let mut writer = FlatWriter::create(file.path(), plan, &attrs()).unwrap();
        let veto = VetoConfig::with_volume(100.0, 100.0);
        fill_events(&source, &selections, &veto, &mut writer).unwrap();
        writer.finish().unwrap();

        let h5 = File::open(file.path()).unwrap();
        let index: Vec<i64> = h5
            .dataset("event_hit_index_primary")
            .unwrap()
            .read_raw()
            .unwrap();
        assert_eq!(index, vec![0, 3]);
        assert!(index.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(index[0], 0);

        // Implied counts equal the sizing-pass counts.
        let times: Vec<f32> = h5.dataset("hit_time_primary").unwrap().read_raw().unwrap();
        assert_eq!(times.len(), 5);
        assert_eq!(times[0], 10.0);

        let ids: Vec<i32> = h5.dataset("event_ids").unwrap().read_raw().unwrap();
        assert_eq!(ids, vec![0, 2]);
        let labels: Vec<i32> = h5.dataset("labels").unwrap().read_raw().unwrap();
        assert_eq!(labels, vec![0, 0]);
    }

    #[test]
    fn test_combined_policy_keeps_substandard_stream() {
        // Primary 1 hit, secondary 2 hits; threshold 3 passes only combined.
        let source = VecSource(vec![event(0, 1, 2)]);
        let combined = QualifyConfig {
            min_hits: 3,
            policy: QualifyPolicy::Combined,
        };
        let selections = size_events(&source, &combined).unwrap();
        let plan = SizingPlan::from_selections(&selections);
        assert_eq!(plan.rows, 1);
        assert_eq!(plan.stream_hits, [1, 2]);

        let independent = QualifyConfig {
            min_hits: 3,
            policy: QualifyPolicy::Independent,
        };
        let selections = size_events(&source, &independent).unwrap();
        let plan = SizingPlan::from_selections(&selections);
        assert_eq!(plan.rows, 0);
        assert_eq!(plan.stream_hits, [0, 0]);
    }

    #[test]
    fn test_fill_rejects_mismatched_selections() {
        let source = VecSource(vec![event(0, 1, 0)]);
        let file = NamedTempFile::new().unwrap();
        let mut writer =
            FlatWriter::create(file.path(), SizingPlan::default(), &attrs()).unwrap();
        let veto = VetoConfig::with_volume(100.0, 100.0);
        let err = fill_events(&source, &[], &veto, &mut writer).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }
}
