//! MetaImage (`.mha` / `.mhd`) volume files.
//!
//! Writing always produces a single `.mha` file with the raw samples after
//! the text header (`ElementDataFile = LOCAL`). Reading also accepts a
//! detached data file named by `ElementDataFile`.

use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, info};
use ndarray::Array3;

use crate::error::{ResliceError, Result};
use crate::volume::{DynVolume, Scalar, Volume};

const NATIVE_MSB: bool = cfg!(target_endian = "big");

fn bool_str(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn join(values: impl IntoIterator<Item = impl ToString>) -> String {
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Write `volume` as a MetaImage file with inline data.
pub fn write_metaimage<T: Scalar>(volume: &Volume<T>, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let origin = volume.origin();
    let spacing = volume.spacing();
    let extent = volume.extent();
    let offset: [f64; 3] = [0, 1, 2].map(|i| origin[i] + f64::from(extent[2 * i]) * spacing[i]);

    let header = [
        "ObjectType = Image".to_string(),
        "NDims = 3".to_string(),
        "BinaryData = True".to_string(),
        format!("BinaryDataByteOrderMSB = {}", bool_str(NATIVE_MSB)),
        "CompressedData = False".to_string(),
        "TransformMatrix = 1 0 0 0 1 0 0 0 1".to_string(),
        format!("Offset = {}", join(offset)),
        "CenterOfRotation = 0 0 0".to_string(),
        format!("ElementSpacing = {}", join(spacing)),
        format!("DimSize = {}", join(volume.dims_xyz())),
        format!("ElementType = {}", T::MET_TYPE),
        "ElementDataFile = LOCAL".to_string(),
    ];

    let samples: Vec<T> = volume.data().iter().copied().collect();
    let file = fs::File::create(path).map_err(|e| ResliceError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let write_all = |writer: &mut BufWriter<fs::File>| -> std::io::Result<()> {
        for line in &header {
            writeln!(writer, "{line}")?;
        }
        writer.write_all(bytemuck::cast_slice(&samples))?;
        writer.flush()
    };
    write_all(&mut writer).map_err(|e| ResliceError::io(path, e))?;

    info!("wrote {} ({:?}, {})", path.display(), volume.dims_xyz(), T::MET_TYPE);
    Ok(())
}

/// Read a MetaImage file into a volume of its stored scalar type.
pub fn read_metaimage(path: impl AsRef<Path>) -> Result<DynVolume> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| ResliceError::io(path, e))?;
    let malformed = |reason: String| ResliceError::MalformedMetaImage {
        path: path.to_path_buf(),
        reason,
    };

    let mut fields = HashMap::new();
    let mut cursor = 0;
    let mut data_file = None;
    while cursor < bytes.len() {
        let end = bytes[cursor..]
            .iter()
            .position(|b| *b == b'\n')
            .map_or(bytes.len(), |p| cursor + p);
        let line = std::str::from_utf8(&bytes[cursor..end])
            .map_err(|_| malformed("header is not valid text".into()))?
            .trim();
        cursor = (end + 1).min(bytes.len());
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| malformed(format!("unexpected header line '{line}'")))?;
        let (key, value) = (key.trim(), value.trim());
        if key == "ElementDataFile" {
            data_file = Some(value.to_string());
            break;
        }
        fields.insert(key.to_string(), value.to_string());
    }
    let data_file = data_file.ok_or_else(|| malformed("missing ElementDataFile".into()))?;

    let field = |key: &str| {
        fields
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| malformed(format!("missing {key}")))
    };
    let numbers = |key: &str| -> Result<Vec<f64>> {
        field(key)?
            .split_whitespace()
            .map(|v| v.parse::<f64>().map_err(|_| malformed(format!("bad {key} value '{v}'"))))
            .collect()
    };

    let ndims: usize = field("NDims")?
        .parse()
        .map_err(|_| malformed("bad NDims".into()))?;
    if !(2..=3).contains(&ndims) {
        return Err(malformed(format!("unsupported NDims {ndims}")));
    }
    if fields
        .get("CompressedData")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return Err(malformed("compressed data is not supported".into()));
    }

    let pad = |mut values: Vec<f64>, fill: f64| -> Result<[f64; 3]> {
        if values.len() != ndims {
            return Err(malformed(format!("expected {ndims} values, got {values:?}")));
        }
        values.resize(3, fill);
        Ok([values[0], values[1], values[2]])
    };
    let dims = pad(numbers("DimSize")?, 1.0)?;
    let spacing = match fields.get("ElementSpacing") {
        Some(_) => pad(numbers("ElementSpacing")?, 1.0)?,
        None => [1.0; 3],
    };
    let offset_key = ["Offset", "Origin", "Position"]
        .into_iter()
        .find(|key| fields.contains_key(*key));
    let origin = match offset_key {
        Some(key) => pad(numbers(key)?, 0.0)?,
        None => [0.0; 3],
    };
    let msb = fields
        .get("BinaryDataByteOrderMSB")
        .or_else(|| fields.get("ElementByteOrderMSB"))
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let payload = if data_file.eq_ignore_ascii_case("LOCAL") {
        bytes[cursor..].to_vec()
    } else {
        let detached = path.parent().unwrap_or(Path::new(".")).join(&data_file);
        fs::read(&detached).map_err(|e| ResliceError::io(detached, e))?
    };

    if dims.iter().any(|d| *d < 1.0 || d.fract() != 0.0) {
        return Err(malformed(format!("bad DimSize {dims:?}")));
    }
    let shape = (dims[2] as usize, dims[1] as usize, dims[0] as usize);
    let element_type = field("ElementType")?;
    debug!("reading {} {element_type} {shape:?}", path.display());

    let volume = match element_type {
        "MET_UCHAR" => DynVolume::U8(decode(path, &payload, shape, origin, spacing, msb)?),
        "MET_SHORT" => DynVolume::I16(decode(path, &payload, shape, origin, spacing, msb)?),
        "MET_USHORT" => DynVolume::U16(decode(path, &payload, shape, origin, spacing, msb)?),
        "MET_FLOAT" => DynVolume::F32(decode(path, &payload, shape, origin, spacing, msb)?),
        other => return Err(ResliceError::UnsupportedScalarType(other.to_string())),
    };
    Ok(volume)
}

fn decode<T: Scalar>(
    path: &Path,
    payload: &[u8],
    shape: (usize, usize, usize),
    origin: [f64; 3],
    spacing: [f64; 3],
    msb: bool,
) -> Result<Volume<T>> {
    let size = std::mem::size_of::<T>();
    let count = shape.0 * shape.1 * shape.2;
    if payload.len() < count * size {
        return Err(ResliceError::MalformedMetaImage {
            path: path.to_path_buf(),
            reason: format!("expected {} data bytes, found {}", count * size, payload.len()),
        });
    }
    let mut raw = payload[..count * size].to_vec();
    if msb != NATIVE_MSB {
        raw.chunks_exact_mut(size).for_each(<[u8]>::reverse);
    }
    let samples: Vec<T> = raw
        .chunks_exact(size)
        .map(bytemuck::pod_read_unaligned)
        .collect();
    let data = Array3::from_shape_vec(shape, samples)
        .map_err(|e| ResliceError::InvalidVolumeGeometry(e.to_string()))?;
    Volume::new(data, origin, spacing)
}
