//! Flat-dataset output.
//!
//! [`FlatWriter`] is the fill phase of the two-pass protocol: datasets are
//! created once at the exact sizes fixed by a [`SizingPlan`], then filled
//! strictly append-only, one event at a time. The writer tracks its own
//! cursors and refuses to drift from the plan.

use crate::{Error, Result};
use flathit_core::{Error as CoreError, FlatRow, HitColumns, SizingPlan, Stream};
use hdf5::types::VarLenUnicode;
use hdf5::{Dataset, File};
use ndarray::{s, ArrayView, ArrayView1};
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Container-level provenance, attached as file attributes.
#[derive(Debug, Clone)]
pub struct ProvenanceAttrs {
    /// Producing-tool version string.
    pub version: String,
    /// Full invocation command.
    pub command: String,
    /// Production timestamp.
    pub timestamp: String,
}

impl ProvenanceAttrs {
    /// Provenance for the current invocation of the given tool version.
    #[must_use]
    pub fn for_invocation(version: &str) -> Self {
        let command: Vec<String> = std::env::args().collect();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs().to_string())
            .unwrap_or_default();
        Self {
            version: version.to_string(),
            command: command.join(" "),
            timestamp,
        }
    }
}

struct StreamDatasets {
    hit_time: Dataset,
    hit_charge: Dataset,
    hit_channel: Dataset,
    event_hit_index: Dataset,
    cursor: usize,
}

/// Append-only writer over exactly-sized flat datasets.
pub struct FlatWriter {
    _file: File,
    labels: Dataset,
    source_files: Dataset,
    event_ids: Dataset,
    energies: Dataset,
    positions: Dataset,
    angles: Dataset,
    veto: Dataset,
    veto2: Dataset,
    streams: [StreamDatasets; 2],
    plan: SizingPlan,
    row: usize,
}

impl FlatWriter {
    /// Creates the output container with all datasets pre-sized to the plan.
    ///
    /// # Errors
    /// Returns an error if the HDF5 file or datasets cannot be created.
    pub fn create<P: AsRef<Path>>(
        path: P,
        plan: SizingPlan,
        attrs: &ProvenanceAttrs,
    ) -> Result<Self> {
        let file = File::create(path)?;
        set_attr_str(&file, "version", &attrs.version)?;
        set_attr_str(&file, "command", &attrs.command)?;
        set_attr_str(&file, "timestamp", &attrs.timestamp)?;

        let rows = plan.rows;
        let labels = file.new_dataset::<i32>().shape((rows,)).create("labels")?;
        let source_files = file
            .new_dataset::<VarLenUnicode>()
            .shape((rows,))
            .create("source_files")?;
        let event_ids = file
            .new_dataset::<i32>()
            .shape((rows,))
            .create("event_ids")?;
        let energies = file
            .new_dataset::<f32>()
            .shape((rows, 1))
            .create("energies")?;
        let positions = file
            .new_dataset::<f32>()
            .shape((rows, 1, 3))
            .create("positions")?;
        let angles = file
            .new_dataset::<f32>()
            .shape((rows, 2))
            .create("angles")?;
        let veto = file.new_dataset::<bool>().shape((rows,)).create("veto")?;
        let veto2 = file.new_dataset::<bool>().shape((rows,)).create("veto2")?;

        let make_stream = |stream: Stream| -> Result<StreamDatasets> {
            let suffix = stream.suffix();
            let hits = plan.hits(stream);
            Ok(StreamDatasets {
                hit_time: file
                    .new_dataset::<f32>()
                    .shape((hits,))
                    .create(format!("hit_time_{suffix}").as_str())?,
                hit_charge: file
                    .new_dataset::<f32>()
                    .shape((hits,))
                    .create(format!("hit_charge_{suffix}").as_str())?,
                hit_channel: file
                    .new_dataset::<i32>()
                    .shape((hits,))
                    .create(format!("hit_channel_{suffix}").as_str())?,
                event_hit_index: file
                    .new_dataset::<i64>()
                    .shape((rows,))
                    .create(format!("event_hit_index_{suffix}").as_str())?,
                cursor: 0,
            })
        };
        let streams = [make_stream(Stream::Primary)?, make_stream(Stream::Secondary)?];

        Ok(Self {
            _file: file,
            labels,
            source_files,
            event_ids,
            energies,
            positions,
            angles,
            veto,
            veto2,
            streams,
            plan,
            row: 0,
        })
    }

    /// Appends one qualifying event: its scalar row and the selected hits of
    /// both streams. Cursors advance strictly monotonically; previously
    /// written ranges are never revisited.
    ///
    /// # Errors
    /// Returns an error if the append would exceed the sizing plan or if
    /// HDF5 I/O fails.
    pub fn append_event(&mut self, row: &FlatRow, hits: [&HitColumns; 2]) -> Result<()> {
        if self.row >= self.plan.rows {
            return Err(CoreError::RowOverrun {
                planned: self.plan.rows,
                attempted: self.row + 1,
            }
            .into());
        }
        for stream in Stream::ALL {
            let planned = self.plan.hits(stream);
            let attempted = self.streams[stream.index()].cursor + hits[stream.index()].len();
            if attempted > planned {
                return Err(CoreError::PlanOverrun {
                    stream,
                    planned,
                    attempted,
                }
                .into());
            }
        }

        let at = self.row;
        self.labels.write_slice(&[row.label], s![at..=at])?;
        let path = to_var_len_unicode(&row.source_file)?;
        self.source_files.write_slice(&[path], s![at..=at])?;
        self.event_ids.write_slice(&[row.event_id], s![at..=at])?;
        self.energies
            .write_slice(one_by(&[row.energy])?, s![at..=at, ..])?;
        let position = ArrayView::from_shape((1, 1, 3), &row.position[..])
            .map_err(|e| Error::InvalidFormat(format!("position shape mismatch: {e}")))?;
        self.positions.write_slice(position, s![at..=at, .., ..])?;
        self.angles
            .write_slice(one_by(&row.angles)?, s![at..=at, ..])?;
        self.veto.write_slice(&[row.veto], s![at..=at])?;
        self.veto2.write_slice(&[row.veto2], s![at..=at])?;

        for stream in Stream::ALL {
            let datasets = &mut self.streams[stream.index()];
            let columns = hits[stream.index()];

            let offset = as_index(datasets.cursor)?;
            datasets.event_hit_index.write_slice(&[offset], s![at..=at])?;

            let start = datasets.cursor;
            let end = start + columns.len();
            if !columns.is_empty() {
                datasets
                    .hit_time
                    .write_slice(ArrayView1::from(columns.time.as_slice()), s![start..end])?;
                datasets
                    .hit_charge
                    .write_slice(ArrayView1::from(columns.charge.as_slice()), s![start..end])?;
                datasets
                    .hit_channel
                    .write_slice(ArrayView1::from(columns.channel.as_slice()), s![start..end])?;
            }
            datasets.cursor = end;
        }

        self.row += 1;
        Ok(())
    }

    /// Finishes the fill phase, verifying it consumed the plan exactly.
    ///
    /// # Errors
    /// Returns an error if fewer rows or hits were written than the plan
    /// sized for.
    pub fn finish(self) -> Result<()> {
        if self.row != self.plan.rows {
            return Err(CoreError::RowUnderrun {
                planned: self.plan.rows,
                written: self.row,
            }
            .into());
        }
        for stream in Stream::ALL {
            let written = self.streams[stream.index()].cursor;
            let planned = self.plan.hits(stream);
            if written != planned {
                return Err(CoreError::PlanUnderrun {
                    stream,
                    planned,
                    written,
                }
                .into());
            }
        }
        Ok(())
    }
}

fn one_by<'a>(values: &'a [f32]) -> Result<ArrayView<'a, f32, ndarray::Ix2>> {
    ArrayView::from_shape((1, values.len()), values)
        .map_err(|e| Error::InvalidFormat(format!("row shape mismatch: {e}")))
}

fn as_index(cursor: usize) -> Result<i64> {
    i64::try_from(cursor)
        .map_err(|_| Error::InvalidFormat("hit offset exceeds i64 range".to_string()))
}

fn set_attr_str(file: &File, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    file.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

pub(crate) fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}

/// Shape and dtype of one dataset in a flat file.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    /// Dataset name.
    pub name: String,
    /// Full shape, leading dimension first.
    pub shape: Vec<usize>,
    /// Human-readable dtype description.
    pub dtype: String,
}

/// Inspection summary of a flat file.
#[derive(Debug, Clone)]
pub struct FileSummary {
    /// String attributes of the container.
    pub attrs: Vec<(String, String)>,
    /// Per-dataset layout, sorted by name.
    pub datasets: Vec<DatasetInfo>,
}

/// Summarizes the datasets and attributes of a flat file.
///
/// # Errors
/// Returns [`Error::MissingInput`] if the path does not exist, or an HDF5
/// error if it cannot be read.
pub fn file_summary<P: AsRef<Path>>(path: P) -> Result<FileSummary> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let file = File::open(path)?;

    let mut attrs = Vec::new();
    for name in file.attr_names()? {
        let value = file
            .attr(&name)
            .and_then(|attr| attr.read_scalar::<VarLenUnicode>())
            .map_or_else(|_| "<non-string>".to_string(), |v| v.to_string());
        attrs.push((name, value));
    }
    attrs.sort();

    let mut datasets = Vec::new();
    for name in file.member_names()? {
        let dataset = file.dataset(&name)?;
        let dtype = dataset.dtype()?.to_descriptor()?;
        datasets.push(DatasetInfo {
            shape: dataset.shape(),
            dtype: format!("{dtype}"),
            name,
        });
    }
    datasets.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(FileSummary { attrs, datasets })
}
