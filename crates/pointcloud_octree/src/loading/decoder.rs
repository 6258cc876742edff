//! Binary point payload decoding (runs on decode workers).
//!
//! Payloads are interleaved little-endian records laid out by a
//! [`PointSchema`]. Positions are de-quantized with each dimension's scale and
//! offset, then stored as f32 relative to the node origin so georeferenced
//! coordinates keep their precision on the GPU.
//!
//! ```text
//! record i: | X i32 | Y i32 | Z i32 | Intensity u16 | Classification u8 | ...
//!             └─ value * scale + offset - origin ─► position[i] (f32)
//! ```

use byteorder::{ByteOrder, LittleEndian};
use glam::DVec3;

use super::schema::{Dimension, PointSchema, ValueType};
use crate::error::DecodeError;
use crate::geometry::Aabb;

/// Typed per-point columns of one node. Optional columns are present only when
/// the schema carries the dimension.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointAttributes {
  pub num_points: usize,
  /// Relative to the node origin (cell minimum corner).
  pub position: Vec<[f32; 3]>,
  pub color: Option<Vec<[u8; 3]>>,
  pub intensity: Option<Vec<u16>>,
  pub classification: Option<Vec<u8>>,
  pub return_number: Option<Vec<u8>>,
  pub number_of_returns: Option<Vec<u8>>,
  pub source_id: Option<Vec<u16>>,
  pub normal: Option<Vec<[f32; 3]>>,
}

impl PointAttributes {
  /// Position-only attributes.
  pub fn from_positions(position: Vec<[f32; 3]>) -> Self {
    Self {
      num_points: position.len(),
      position,
      ..Default::default()
    }
  }
}

/// Decoder output: attributes plus statistics of the decoded positions.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedNode {
  pub attributes: PointAttributes,
  /// Model-space bounds of the decoded points.
  pub tight_bounds: Aabb,
  /// Model-space mean position.
  pub mean: DVec3,
}

#[inline]
fn read_value(record: &[u8], dimension: &Dimension) -> f64 {
  let bytes = &record[dimension.byte_offset..dimension.byte_offset + dimension.size];
  let raw = match dimension.value_type {
    ValueType::I8 => bytes[0] as i8 as f64,
    ValueType::I16 => LittleEndian::read_i16(bytes) as f64,
    ValueType::I32 => LittleEndian::read_i32(bytes) as f64,
    ValueType::I64 => LittleEndian::read_i64(bytes) as f64,
    ValueType::U8 => bytes[0] as f64,
    ValueType::U16 => LittleEndian::read_u16(bytes) as f64,
    ValueType::U32 => LittleEndian::read_u32(bytes) as f64,
    ValueType::U64 => LittleEndian::read_u64(bytes) as f64,
    ValueType::F32 => LittleEndian::read_f32(bytes) as f64,
    ValueType::F64 => LittleEndian::read_f64(bytes),
  };
  raw * dimension.scale + dimension.offset
}

/// Read one optional dimension for every record.
fn column<T>(records: &[&[u8]], schema: &PointSchema, name: &str, convert: impl Fn(f64) -> T) -> Option<Vec<T>> {
  let dimension = schema.dimension(name)?;
  Some(records.iter().map(|r| convert(read_value(r, dimension))).collect())
}

fn column3<T>(records: &[&[u8]], schema: &PointSchema, names: [&str; 3], convert: impl Fn(f64) -> T) -> Option<Vec<[T; 3]>> {
  let [a, b, c] = names.map(|n| schema.dimension(n));
  let (a, b, c) = (a?, b?, c?);
  Some(
    records
      .iter()
      .map(|r| [convert(read_value(r, a)), convert(read_value(r, b)), convert(read_value(r, c))])
      .collect(),
  )
}

/// Decode an interleaved payload. `origin` is the node's minimum corner.
#[cfg_attr(feature = "tracing-spans", tracing::instrument(skip_all, name = "decoder::decode_points"))]
pub fn decode_points(bytes: &[u8], schema: &PointSchema, origin: DVec3) -> Result<DecodedNode, DecodeError> {
  if bytes.is_empty() {
    return Err(DecodeError::EmptyBuffer);
  }
  let stride = schema.stride();
  if stride == 0 || bytes.len() % stride != 0 {
    return Err(DecodeError::Truncated {
      len: bytes.len(),
      stride,
    });
  }

  let records: Vec<&[u8]> = bytes.chunks_exact(stride).collect();
  let num_points = records.len();

  let x = schema.dimension("X").ok_or(DecodeError::MissingDimension("X"))?;
  let y = schema.dimension("Y").ok_or(DecodeError::MissingDimension("Y"))?;
  let z = schema.dimension("Z").ok_or(DecodeError::MissingDimension("Z"))?;

  let mut tight_bounds = Aabb::empty();
  let mut sum = DVec3::ZERO;
  let mut position = Vec::with_capacity(num_points);
  for record in &records {
    let p = DVec3::new(read_value(record, x), read_value(record, y), read_value(record, z));
    tight_bounds.expand_to_point(p);
    sum += p;
    let local = (p - origin).as_vec3();
    position.push(local.to_array());
  }

  // 16-bit colors are scaled down when any channel exceeds the 8-bit range
  let color = column3(&records, schema, ["Red", "Green", "Blue"], |v| v).map(|rgb| {
    let wide = rgb.iter().any(|c| c.iter().any(|v| *v > 255.0));
    let shift = if wide { 256.0 } else { 1.0 };
    rgb
      .into_iter()
      .map(|c| c.map(|v| (v / shift).clamp(0.0, 255.0) as u8))
      .collect()
  });

  let attributes = PointAttributes {
    num_points,
    position,
    color,
    intensity: column(&records, schema, "Intensity", |v| v as u16),
    classification: column(&records, schema, "Classification", |v| v as u8),
    return_number: column(&records, schema, "ReturnNumber", |v| v as u8),
    number_of_returns: column(&records, schema, "NumberOfReturns", |v| v as u8),
    source_id: column(&records, schema, "PointSourceId", |v| v as u16),
    normal: column3(&records, schema, ["NormalX", "NormalY", "NormalZ"], |v| v as f32),
  };

  Ok(DecodedNode {
    attributes,
    tight_bounds,
    mean: sum / num_points as f64,
  })
}

#[cfg(test)]
#[path = "decoder_test.rs"]
mod decoder_test;
