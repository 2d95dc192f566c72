//! End-to-end conversion and merge over real dump files.

use approx::assert_abs_diff_eq;
use flathit_core::{
    EventRecord, HitBlock, PrimaryVertex, QualifyConfig, TrackBlock, TriggerBlock, VetoConfig,
};
use flathit_io::source::write_sim_dump;
use flathit_io::{convert_files, merge_files, ConvertConfig, ProvenanceAttrs};
use hdf5::File;
use tempfile::TempDir;

fn attrs() -> ProvenanceAttrs {
    ProvenanceAttrs {
        version: "test".to_string(),
        command: "flathit convert fixtures".to_string(),
        timestamp: "0".to_string(),
    }
}

fn config() -> ConvertConfig {
    ConvertConfig {
        qualify: QualifyConfig::default(),
        veto: VetoConfig::with_volume(3400.0, 7100.0),
    }
}

/// An electron event: two primary triggers where the later-listed one is
/// earlier in time, three hits under it, one stray hit, one secondary hit,
/// and an escaping muon track.
fn good_event(event_id: i32) -> EventRecord {
    let mut primary = HitBlock::with_capacity(4);
    primary.push(10.0, 1.0, 100, 1);
    primary.push(11.0, 2.0, 101, 1);
    primary.push(12.0, 3.0, 102, 1);
    primary.push(90.0, 9.0, 103, 0);

    let mut secondary = HitBlock::with_capacity(1);
    secondary.push(20.0, 0.5, 7, 0);

    let mut tracks = TrackBlock::default();
    tracks.push(13, 500.0, [0.0; 3], [4000.0, 0.0, 0.0]);

    EventRecord {
        event_id,
        source_ref: String::new(),
        primary: PrimaryVertex {
            pid: 11,
            position: [1.0, 2.0, 3.0],
            direction: [1.0, 0.0, 0.0],
            energy: 600.0,
        },
        triggers: [
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
        tracks,
    }
}

/// An event with no valid trigger anywhere; disqualified in both streams.
fn dead_event(event_id: i32) -> EventRecord {
    let mut record = good_event(event_id);
    record.triggers[0].kind = vec![4, 4];
    record.triggers[1].kind = vec![1];
    record
}

#[test]
fn test_convert_then_merge() {
    let dir = TempDir::new().unwrap();
    let dump_a = dir.path().join("run_a.h5");
    let dump_b = dir.path().join("run_b.h5");
    write_sim_dump(&dump_a, &[good_event(0), dead_event(1)]).unwrap();
    write_sim_dump(&dump_b, &[good_event(0)]).unwrap();

    let flat = dir.path().join("flat.h5");
    let summary = convert_files(
        &[dump_a.clone(), dump_b.clone()],
        &flat,
        &config(),
        &attrs(),
        false,
    )
    .unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(summary.events, 3);
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.stream_hits, [6, 2]);

    let h5 = File::open(&flat).unwrap();

    // Scalars: both retained events are electrons from different files.
    let labels: Vec<i32> = h5.dataset("labels").unwrap().read_raw().unwrap();
    assert_eq!(labels, vec![1, 1]);
    let ids: Vec<i32> = h5.dataset("event_ids").unwrap().read_raw().unwrap();
    assert_eq!(ids, vec![0, 0]);
    let sources: Vec<hdf5::types::VarLenUnicode> =
        h5.dataset("source_files").unwrap().read_raw().unwrap();
    assert!(sources[0].as_str().ends_with("run_a.h5"));
    assert!(sources[1].as_str().ends_with("run_b.h5"));

    // Direction (1,0,0): polar pi/2, azimuth 0.
    let angles: Vec<f32> = h5.dataset("angles").unwrap().read_raw().unwrap();
    assert_abs_diff_eq!(angles[0], std::f32::consts::FRAC_PI_2, epsilon = 1e-6);
    assert_abs_diff_eq!(angles[1], 0.0, epsilon = 1e-6);

    // The 500-unit muon escapes above threshold at start but not after
    // losing 2 units per unit length over 4000 units.
    let veto: Vec<bool> = h5.dataset("veto").unwrap().read_raw().unwrap();
    let veto2: Vec<bool> = h5.dataset("veto2").unwrap().read_raw().unwrap();
    assert_eq!(veto, vec![true, true]);
    assert_eq!(veto2, vec![false, false]);

    // Ragged index: monotonic, starts at 0, implies the per-event counts.
    let index: Vec<i64> = h5
        .dataset("event_hit_index_primary")
        .unwrap()
        .read_raw()
        .unwrap();
    assert_eq!(index, vec![0, 3]);
    let times: Vec<f32> = h5.dataset("hit_time_primary").unwrap().read_raw().unwrap();
    assert_eq!(times, vec![10.0, 11.0, 12.0, 10.0, 11.0, 12.0]);
    let channels: Vec<i32> = h5
        .dataset("hit_channel_secondary")
        .unwrap()
        .read_raw()
        .unwrap();
    assert_eq!(channels, vec![7, 7]);

    // Merging the flat file with itself re-bases the second copy's offsets
    // by the first copy's hit totals.
    let merged = dir.path().join("merged.h5");
    merge_files(&[flat.clone(), flat.clone()], &merged).unwrap();

    let h5 = File::open(&merged).unwrap();
    let index: Vec<i64> = h5
        .dataset("event_hit_index_primary")
        .unwrap()
        .read_raw()
        .unwrap();
    assert_eq!(index, vec![0, 3, 6, 9]);
    let index: Vec<i64> = h5
        .dataset("event_hit_index_secondary")
        .unwrap()
        .read_raw()
        .unwrap();
    assert_eq!(index, vec![0, 1, 2, 3]);
    let times: Vec<f32> = h5.dataset("hit_time_primary").unwrap().read_raw().unwrap();
    assert_eq!(times.len(), 12);
}

#[test]
fn test_convert_missing_input_fails_before_output() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.h5");
    let flat = dir.path().join("flat.h5");
    let err = convert_files(&[missing], &flat, &config(), &attrs(), false).unwrap_err();
    assert!(matches!(err, flathit_io::Error::MissingInput(_)));
    assert!(!flat.exists());
}
