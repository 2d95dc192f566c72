//! Concatenation of already-flattened datasets.
//!
//! All inputs must agree on field names, dtypes and non-row shapes; the
//! merge validates everything before the output file is created, so a
//! schema mismatch never leaves a partial output behind. Values of
//! `event_hit_index_*` datasets are re-based by the cumulative hit-array
//! length of the files merged before them, in input order.

use crate::{Error, Result};
use hdf5::types::{FloatSize, IntSize, TypeDescriptor, VarLenUnicode};
use hdf5::{File, H5Type};
use ndarray::{ArrayView, ArrayView1, IxDyn};
use std::path::Path;

const INDEX_PREFIX: &str = "event_hit_index_";

/// Merges flat datasets into one, re-basing offset indices.
///
/// Files are processed in input order; the order is load-bearing because
/// each file's index values are shifted by the hit totals of all earlier
/// files.
///
/// # Errors
/// Returns [`Error::MissingInput`] for absent inputs and
/// [`Error::SchemaMismatch`] when inputs disagree on keys, attributes,
/// dtypes or non-row shapes. Validation completes before any output is
/// written.
pub fn merge_files<P: AsRef<Path>, Q: AsRef<Path>>(inputs: &[P], output: Q) -> Result<()> {
    if inputs.is_empty() {
        return Err(Error::InvalidFormat("no input files to merge".to_string()));
    }

    let mut files = Vec::with_capacity(inputs.len());
    for input in inputs {
        let path = input.as_ref();
        if !path.is_file() {
            return Err(Error::MissingInput(path.to_path_buf()));
        }
        files.push((path.display().to_string(), File::open(path)?));
    }

    let mut keys = files[0].1.member_names()?;
    keys.sort();
    let mut attr_keys = files[0].1.attr_names()?;
    attr_keys.sort();
    for (name, file) in &files[1..] {
        let mut other = file.member_names()?;
        other.sort();
        if other != keys {
            return Err(Error::SchemaMismatch(format!(
                "{name}: keys {other:?} do not match first file's keys {keys:?}"
            )));
        }
        let mut other = file.attr_names()?;
        other.sort();
        if other != attr_keys {
            return Err(Error::SchemaMismatch(format!(
                "{name}: attributes {other:?} do not match first file's attributes {attr_keys:?}"
            )));
        }
    }

    // Validate dtypes and non-row shapes for every key before creating the
    // output, and fix the merged shapes.
    let mut layouts = Vec::with_capacity(keys.len());
    for key in &keys {
        let dtype = files[0].1.dataset(key)?.dtype()?.to_descriptor()?;
        let mut shape = files[0].1.dataset(key)?.shape();
        if shape.is_empty() {
            return Err(Error::SchemaMismatch(format!(
                "{key}: scalar datasets cannot be concatenated"
            )));
        }
        for (name, file) in &files[1..] {
            let dataset = file.dataset(key)?;
            let other_dtype = dataset.dtype()?.to_descriptor()?;
            if other_dtype != dtype {
                return Err(Error::SchemaMismatch(format!(
                    "{name}: dataset {key} has dtype {other_dtype} but first file has {dtype}"
                )));
            }
            let other = dataset.shape();
            if other.len() != shape.len() || other[1..] != shape[1..] {
                return Err(Error::SchemaMismatch(format!(
                    "{name}: dataset {key} has shape {other:?} which is incompatible with \
                     extending previous files' shape {shape:?}"
                )));
            }
            shape[0] += other[0];
        }
        layouts.push((key.clone(), dtype, shape));
    }

    // Attribute values are read up front as well: an unreadable attribute
    // must surface before the output file exists. Scalar attributes and 1-D
    // string arrays (the shape this merge itself writes) both concatenate,
    // so merged files can be merged again.
    let mut attr_values = Vec::with_capacity(attr_keys.len());
    for attr_key in &attr_keys {
        let mut values: Vec<VarLenUnicode> = Vec::new();
        for (name, file) in &files {
            let attr = file.attr(attr_key)?;
            let read = if attr.ndim() == 0 {
                attr.read_scalar::<VarLenUnicode>().map(|value| vec![value])
            } else {
                attr.read_raw::<VarLenUnicode>()
            };
            values.extend(read.map_err(|_| {
                Error::InvalidFormat(format!("{name}: attribute {attr_key} is not a string"))
            })?);
        }
        attr_values.push(values);
    }

    let out = File::create(output)?;

    for (attr_key, values) in attr_keys.iter().zip(&attr_values) {
        out.new_attr::<VarLenUnicode>()
            .shape((values.len(),))
            .create(attr_key.as_str())?
            .write(ArrayView1::from(values.as_slice()))?;
    }

    for (key, dtype, shape) in layouts {
        if let Some(suffix) = key.strip_prefix(INDEX_PREFIX) {
            concat_index(&out, &key, suffix, &files, &shape)?;
            continue;
        }
        match dtype {
            TypeDescriptor::Integer(IntSize::U4) => concat_plain::<i32>(&out, &key, &files, &shape),
            TypeDescriptor::Integer(IntSize::U8) => concat_plain::<i64>(&out, &key, &files, &shape),
            TypeDescriptor::Float(FloatSize::U4) => concat_plain::<f32>(&out, &key, &files, &shape),
            TypeDescriptor::Float(FloatSize::U8) => concat_plain::<f64>(&out, &key, &files, &shape),
            TypeDescriptor::Boolean => concat_plain::<bool>(&out, &key, &files, &shape),
            TypeDescriptor::VarLenUnicode => concat_plain::<VarLenUnicode>(&out, &key, &files, &shape),
            other => Err(Error::SchemaMismatch(format!(
                "dataset {key} has unsupported dtype {other}"
            ))),
        }?;
    }

    Ok(())
}

fn concat_plain<T: H5Type + Clone>(
    out: &File,
    key: &str,
    files: &[(String, File)],
    shape: &[usize],
) -> Result<()> {
    let mut values: Vec<T> = Vec::new();
    for (_, file) in files {
        values.extend(file.dataset(key)?.read_raw::<T>()?);
    }
    write_shaped(out, key, &values, shape)
}

/// Concatenates one offset-index dataset, shifting each file's values by the
/// cumulative flat-hit length of the files before it in the same stream.
fn concat_index(
    out: &File,
    key: &str,
    suffix: &str,
    files: &[(String, File)],
    shape: &[usize],
) -> Result<()> {
    let hits_key = format!("hit_channel_{suffix}");
    let mut values: Vec<i64> = Vec::new();
    let mut offset: i64 = 0;
    for (name, file) in files {
        let local = file.dataset(key)?.read_raw::<i64>()?;
        values.extend(local.iter().map(|&v| v + offset));
        let hits = file
            .dataset(&hits_key)
            .map_err(|_| {
                Error::SchemaMismatch(format!(
                    "{name}: index dataset {key} has no matching {hits_key}"
                ))
            })?
            .shape()[0];
        offset += i64::try_from(hits)
            .map_err(|_| Error::InvalidFormat("hit count exceeds i64 range".to_string()))?;
    }
    write_shaped(out, key, &values, shape)
}

fn write_shaped<T: H5Type + Clone>(
    out: &File,
    key: &str,
    values: &[T],
    shape: &[usize],
) -> Result<()> {
    let dataset = out.new_dataset::<T>().shape(shape.to_vec()).create(key)?;
    let view = ArrayView::from_shape(IxDyn(shape), values)
        .map_err(|e| Error::InvalidFormat(format!("{key} shape mismatch: {e}")))?;
    dataset.write(view)?;
    Ok(())
}
