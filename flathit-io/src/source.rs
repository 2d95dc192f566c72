//! Simulation-dump input.
//!
//! A dump file carries the already-decoded per-event arrays of one
//! simulation run in a ragged layout: flat value arrays plus one i64
//! start-offset array per ragged field. [`Hdf5EventSource`] decodes the
//! whole file up front and hands out per-event [`EventRecord`]s.

use crate::{Error, Result};
use flathit_core::{EventRecord, HitBlock, PrimaryVertex, Stream, TrackBlock, TriggerBlock};
use hdf5::types::H5Type;
use hdf5::File;
use ndarray::ArrayView;
use std::ops::Range;
use std::path::Path;

/// Per-event record access, the seam between input decoding and the
/// conversion pipeline.
pub trait EventSource {
    /// Number of events in the source.
    fn len(&self) -> usize;

    /// Returns true if the source holds no events.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes one event.
    ///
    /// # Errors
    /// Returns an error if the record cannot be decoded.
    fn event(&self, index: usize) -> Result<EventRecord>;
}

/// Start-offset index over a flat ragged array.
#[derive(Debug, Clone)]
struct RaggedIndex {
    offsets: Vec<usize>,
    total: usize,
}

impl RaggedIndex {
    fn new(name: &str, offsets: &[i64], events: usize, total: usize) -> Result<Self> {
        if offsets.len() != events {
            return Err(Error::InvalidFormat(format!(
                "{name}: index length {} does not match event count {events}",
                offsets.len()
            )));
        }
        let mut converted = Vec::with_capacity(offsets.len());
        let mut previous = 0usize;
        for (i, &offset) in offsets.iter().enumerate() {
            let offset = usize::try_from(offset).map_err(|_| {
                Error::InvalidFormat(format!("{name}: negative offset at event {i}"))
            })?;
            if offset < previous || offset > total {
                return Err(Error::InvalidFormat(format!(
                    "{name}: offset {offset} at event {i} breaks monotonicity (previous \
                     {previous}, total {total})"
                )));
            }
            if i == 0 && offset != 0 {
                return Err(Error::InvalidFormat(format!(
                    "{name}: first offset must be 0, got {offset}"
                )));
            }
            previous = offset;
            converted.push(offset);
        }
        Ok(Self {
            offsets: converted,
            total,
        })
    }

    fn span(&self, index: usize) -> Range<usize> {
        let start = self.offsets[index];
        let end = self
            .offsets
            .get(index + 1)
            .copied()
            .unwrap_or(self.total);
        start..end
    }
}

/// One stream's decoded arrays.
#[derive(Debug, Clone)]
struct StreamData {
    trigger_time: Vec<f32>,
    trigger_kind: Vec<i32>,
    trigger_index: RaggedIndex,
    hit_time: Vec<f32>,
    hit_charge: Vec<f32>,
    hit_channel: Vec<i32>,
    hit_trigger: Vec<i32>,
    hit_index: RaggedIndex,
}

/// Decoded dump file, randomly indexable by event.
#[derive(Debug, Clone)]
pub struct Hdf5EventSource {
    source_ref: String,
    event_id: Vec<i32>,
    pid: Vec<i32>,
    position: Vec<[f32; 3]>,
    direction: Vec<[f32; 3]>,
    energy: Vec<f32>,
    streams: [StreamData; 2],
    track_pid: Vec<i32>,
    track_energy: Vec<f32>,
    track_start: Vec<[f32; 3]>,
    track_stop: Vec<[f32; 3]>,
    track_index: RaggedIndex,
}

impl Hdf5EventSource {
    /// Opens and fully decodes a dump file.
    ///
    /// # Errors
    /// Returns [`Error::MissingInput`] if the path does not exist,
    /// [`Error::InvalidFormat`] if array lengths or index arrays are
    /// inconsistent, or an HDF5 error if reading fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::MissingInput(path.to_path_buf()));
        }
        let file = File::open(path)?;

        let event_id = read_vec::<i32>(&file, "event_id")?;
        let events = event_id.len();

        let pid = read_vec::<i32>(&file, "pid")?;
        let position = read_triplets(&file, "position")?;
        let direction = read_triplets(&file, "direction")?;
        let energy = read_vec::<f32>(&file, "energy")?;
        for (name, len) in [
            ("pid", pid.len()),
            ("position", position.len()),
            ("direction", direction.len()),
            ("energy", energy.len()),
        ] {
            if len != events {
                return Err(Error::InvalidFormat(format!(
                    "{name}: length {len} does not match event count {events}"
                )));
            }
        }

        let streams = [
            read_stream(&file, Stream::Primary, events)?,
            read_stream(&file, Stream::Secondary, events)?,
        ];

        let track_pid = read_vec::<i32>(&file, "track_pid")?;
        let track_energy = read_vec::<f32>(&file, "track_energy")?;
        let track_start = read_triplets(&file, "track_start")?;
        let track_stop = read_triplets(&file, "track_stop")?;
        if track_energy.len() != track_pid.len()
            || track_start.len() != track_pid.len()
            || track_stop.len() != track_pid.len()
        {
            return Err(Error::InvalidFormat(
                "track arrays have inconsistent lengths".to_string(),
            ));
        }
        let track_offsets = read_vec::<i64>(&file, "track_index")?;
        let track_index = RaggedIndex::new("track_index", &track_offsets, events, track_pid.len())?;

        Ok(Self {
            source_ref: path.display().to_string(),
            event_id,
            pid,
            position,
            direction,
            energy,
            streams,
            track_pid,
            track_energy,
            track_start,
            track_stop,
            track_index,
        })
    }

    /// Path the events were decoded from.
    #[must_use]
    pub fn source_ref(&self) -> &str {
        &self.source_ref
    }
}

impl EventSource for Hdf5EventSource {
    fn len(&self) -> usize {
        self.event_id.len()
    }

    fn event(&self, index: usize) -> Result<EventRecord> {
        if index >= self.len() {
            return Err(Error::InvalidFormat(format!(
                "event index {index} out of range ({} events)",
                self.len()
            )));
        }

        let triggers = self.streams.each_ref().map(|stream| {
            let span = stream.trigger_index.span(index);
            TriggerBlock {
                time: stream.trigger_time[span.clone()].to_vec(),
                kind: stream.trigger_kind[span].to_vec(),
            }
        });

        let hits = self.streams.each_ref().map(|stream| {
            let span = stream.hit_index.span(index);
            HitBlock {
                time: stream.hit_time[span.clone()].to_vec(),
                charge: stream.hit_charge[span.clone()].to_vec(),
                channel: stream.hit_channel[span.clone()].to_vec(),
                trigger: stream.hit_trigger[span].to_vec(),
            }
        });

        let span = self.track_index.span(index);
        let tracks = TrackBlock {
            pid: self.track_pid[span.clone()].to_vec(),
            energy: self.track_energy[span.clone()].to_vec(),
            start: self.track_start[span.clone()].to_vec(),
            stop: self.track_stop[span].to_vec(),
        };

        Ok(EventRecord {
            event_id: self.event_id[index],
            source_ref: self.source_ref.clone(),
            primary: PrimaryVertex {
                pid: self.pid[index],
                position: self.position[index],
                direction: self.direction[index],
                energy: self.energy[index],
            },
            triggers,
            hits,
            tracks,
        })
    }
}

fn read_stream(file: &File, stream: Stream, events: usize) -> Result<StreamData> {
    let suffix = stream.suffix();

    let trigger_time = read_vec::<f32>(file, &format!("trigger_time_{suffix}"))?;
    let trigger_kind = read_vec::<i32>(file, &format!("trigger_type_{suffix}"))?;
    if trigger_kind.len() != trigger_time.len() {
        return Err(Error::InvalidFormat(format!(
            "trigger arrays of {suffix} stream have inconsistent lengths"
        )));
    }
    let name = format!("trigger_index_{suffix}");
    let offsets = read_vec::<i64>(file, &name)?;
    let trigger_index = RaggedIndex::new(&name, &offsets, events, trigger_time.len())?;

    let hit_time = read_vec::<f32>(file, &format!("hit_time_{suffix}"))?;
    let hit_charge = read_vec::<f32>(file, &format!("hit_charge_{suffix}"))?;
    let hit_channel = read_vec::<i32>(file, &format!("hit_channel_{suffix}"))?;
    let hit_trigger = read_vec::<i32>(file, &format!("hit_trigger_{suffix}"))?;
    if hit_charge.len() != hit_time.len()
        || hit_channel.len() != hit_time.len()
        || hit_trigger.len() != hit_time.len()
    {
        return Err(Error::InvalidFormat(format!(
            "hit arrays of {suffix} stream have inconsistent lengths"
        )));
    }
    let name = format!("hit_index_{suffix}");
    let offsets = read_vec::<i64>(file, &name)?;
    let hit_index = RaggedIndex::new(&name, &offsets, events, hit_time.len())?;

    Ok(StreamData {
        trigger_time,
        trigger_kind,
        trigger_index,
        hit_time,
        hit_charge,
        hit_channel,
        hit_trigger,
        hit_index,
    })
}

fn read_vec<T: H5Type>(file: &File, name: &str) -> Result<Vec<T>> {
    let dataset = file
        .dataset(name)
        .map_err(|_| Error::InvalidFormat(format!("missing dataset {name}")))?;
    Ok(dataset.read_raw::<T>()?)
}

fn read_triplets(file: &File, name: &str) -> Result<Vec<[f32; 3]>> {
    let flat = read_vec::<f32>(file, name)?;
    if flat.len() % 3 != 0 {
        return Err(Error::InvalidFormat(format!(
            "{name}: length {} is not a multiple of 3",
            flat.len()
        )));
    }
    Ok(flat
        .chunks_exact(3)
        .map(|chunk| [chunk[0], chunk[1], chunk[2]])
        .collect())
}

/// Writes events back out in the dump layout.
///
/// Mostly useful for producing fixtures and for round-tripping sources; the
/// per-event `source_ref` is not stored (the dump path itself is the
/// reference).
///
/// # Errors
/// Returns an error if HDF5 I/O fails.
pub fn write_sim_dump<P: AsRef<Path>>(path: P, events: &[EventRecord]) -> Result<()> {
    let file = File::create(path)?;

    write_vec(&file, "event_id", &events.iter().map(|e| e.event_id).collect::<Vec<_>>())?;
    write_vec(&file, "pid", &events.iter().map(|e| e.primary.pid).collect::<Vec<_>>())?;
    write_triplets(
        &file,
        "position",
        &events.iter().map(|e| e.primary.position).collect::<Vec<_>>(),
    )?;
    write_triplets(
        &file,
        "direction",
        &events.iter().map(|e| e.primary.direction).collect::<Vec<_>>(),
    )?;
    write_vec(
        &file,
        "energy",
        &events.iter().map(|e| e.primary.energy).collect::<Vec<_>>(),
    )?;

    for stream in Stream::ALL {
        let suffix = stream.suffix();

        let mut time = Vec::new();
        let mut kind = Vec::new();
        let mut offsets = Vec::with_capacity(events.len());
        for event in events {
            offsets.push(as_offset(time.len())?);
            let block = event.triggers(stream);
            time.extend_from_slice(&block.time);
            kind.extend_from_slice(&block.kind);
        }
        write_vec(&file, &format!("trigger_time_{suffix}"), &time)?;
        write_vec(&file, &format!("trigger_type_{suffix}"), &kind)?;
        write_vec(&file, &format!("trigger_index_{suffix}"), &offsets)?;

        let mut time = Vec::new();
        let mut charge = Vec::new();
        let mut channel = Vec::new();
        let mut trigger = Vec::new();
        let mut offsets = Vec::with_capacity(events.len());
        for event in events {
            offsets.push(as_offset(time.len())?);
            let block = event.hits(stream);
            time.extend_from_slice(&block.time);
            charge.extend_from_slice(&block.charge);
            channel.extend_from_slice(&block.channel);
            trigger.extend_from_slice(&block.trigger);
        }
        write_vec(&file, &format!("hit_time_{suffix}"), &time)?;
        write_vec(&file, &format!("hit_charge_{suffix}"), &charge)?;
        write_vec(&file, &format!("hit_channel_{suffix}"), &channel)?;
        write_vec(&file, &format!("hit_trigger_{suffix}"), &trigger)?;
        write_vec(&file, &format!("hit_index_{suffix}"), &offsets)?;
    }

    let mut pid = Vec::new();
    let mut energy = Vec::new();
    let mut start = Vec::new();
    let mut stop = Vec::new();
    let mut offsets = Vec::with_capacity(events.len());
    for event in events {
        offsets.push(as_offset(pid.len())?);
        pid.extend_from_slice(&event.tracks.pid);
        energy.extend_from_slice(&event.tracks.energy);
        start.extend_from_slice(&event.tracks.start);
        stop.extend_from_slice(&event.tracks.stop);
    }
    write_vec(&file, "track_pid", &pid)?;
    write_vec(&file, "track_energy", &energy)?;
    write_triplets(&file, "track_start", &start)?;
    write_triplets(&file, "track_stop", &stop)?;
    write_vec(&file, "track_index", &offsets)?;

    Ok(())
}

fn as_offset(len: usize) -> Result<i64> {
    i64::try_from(len).map_err(|_| Error::InvalidFormat("offset exceeds i64 range".to_string()))
}

fn write_vec<T: H5Type>(file: &File, name: &str, data: &[T]) -> Result<()> {
    let dataset = file.new_dataset::<T>().shape((data.len(),)).create(name)?;
    dataset.write(ArrayView::from(data))?;
    Ok(())
}

fn write_triplets(file: &File, name: &str, data: &[[f32; 3]]) -> Result<()> {
    let flat: Vec<f32> = data.iter().flatten().copied().collect();
    let dataset = file
        .new_dataset::<f32>()
        .shape((data.len(), 3))
        .create(name)?;
    let view = ArrayView::from_shape((data.len(), 3), flat.as_slice())
        .map_err(|e| Error::InvalidFormat(format!("{name} shape mismatch: {e}")))?;
    dataset.write(view)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_event(event_id: i32) -> EventRecord {
        let mut primary_hits = HitBlock::with_capacity(3);
        primary_hits.push(12.5, 1.0, 100, 0);
        primary_hits.push(13.5, 2.0, 101, 1);
        primary_hits.push(14.5, 3.0, 102, 0);

        let mut secondary_hits = HitBlock::with_capacity(1);
        secondary_hits.push(20.0, 0.5, 7, 0);

        let mut tracks = TrackBlock::default();
        tracks.push(13, 500.0, [0.0; 3], [4000.0, 0.0, 0.0]);

        EventRecord {
            event_id,
            source_ref: String::new(),
            primary: PrimaryVertex {
                pid: 13,
                position: [1.0, 2.0, 3.0],
                direction: [0.0, 1.0, 0.0],
                energy: 600.0,
            },
            triggers: [
                TriggerBlock {
                    time: vec![5.0, 1.0],
                    kind: vec![0, 0],
                },
                TriggerBlock {
                    time: vec![9.0],
                    kind: vec![0],
                },
            ],
            hits: [primary_hits, secondary_hits],
            tracks,
        }
    }

    #[test]
    fn test_dump_roundtrip() {
        let file = NamedTempFile::new().unwrap();
        let events = vec![sample_event(0), sample_event(1)];
        write_sim_dump(file.path(), &events).unwrap();

        let source = Hdf5EventSource::open(file.path()).unwrap();
        assert_eq!(source.len(), 2);

        let decoded = source.event(1).unwrap();
        assert_eq!(decoded.event_id, 1);
        assert_eq!(decoded.source_ref, source.source_ref());
        assert_eq!(decoded.primary.pid, 13);
        assert_eq!(decoded.triggers(Stream::Primary).time, vec![5.0, 1.0]);
        assert_eq!(decoded.hits(Stream::Primary).channel, vec![100, 101, 102]);
        assert_eq!(decoded.hits(Stream::Secondary).len(), 1);
        assert_eq!(decoded.tracks.pid, vec![13]);
    }

    #[test]
    fn test_empty_dump_roundtrip() {
        let file = NamedTempFile::new().unwrap();
        write_sim_dump(file.path(), &[]).unwrap();
        let source = Hdf5EventSource::open(file.path()).unwrap();
        assert!(source.is_empty());
    }

    #[test]
    fn test_missing_input() {
        let err = Hdf5EventSource::open("/nonexistent/run.h5").unwrap_err();
        assert!(matches!(err, Error::MissingInput(_)));
    }

    #[test]
    fn test_non_monotonic_index_rejected() {
        let file = NamedTempFile::new().unwrap();
        write_sim_dump(file.path(), &[sample_event(0), sample_event(1)]).unwrap();

        // Corrupt the primary hit index so the second offset goes backwards.
        {
            let h5 = File::open_rw(file.path()).unwrap();
            let dataset = h5.dataset("hit_index_primary").unwrap();
            dataset.write(ArrayView::from(&[0i64, -1][..])).unwrap();
        }

        let err = Hdf5EventSource::open(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }
}
