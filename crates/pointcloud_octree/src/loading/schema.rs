//! EPT model metadata (`ept.json`) and the binary point record layout.

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, MetadataError};
use crate::geometry::Aabb;
use glam::DVec3;

/// Storage type of one schema dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionKind {
  Signed,
  Unsigned,
  Float,
}

impl DimensionKind {
  fn as_str(self) -> &'static str {
    match self {
      DimensionKind::Signed => "signed",
      DimensionKind::Unsigned => "unsigned",
      DimensionKind::Float => "float",
    }
  }
}

/// One entry of the `schema` array in `ept.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
  pub name: String,
  #[serde(rename = "type")]
  pub kind: DimensionKind,
  /// Byte size.
  pub size: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub scale: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub offset: Option<f64>,
}

/// Parsed `ept.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EptMetadata {
  /// Cubic octree bounds: `[min_x, min_y, min_z, max_x, max_y, max_z]`.
  pub bounds: Vec<f64>,
  /// Tight bounds of the data, same layout as `bounds`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bounds_conforming: Option<Vec<f64>>,
  /// Total point count.
  pub points: u64,
  /// Grid cells per axis at every level.
  pub span: u32,
  pub schema: Vec<SchemaField>,
  pub data_type: String,
  #[serde(default)]
  pub hierarchy_type: Option<String>,
}

impl EptMetadata {
  /// Parse and validate `ept.json`.
  pub fn from_json(bytes: &[u8]) -> Result<Self, MetadataError> {
    let metadata: EptMetadata = serde_json::from_slice(bytes)?;
    metadata.validate()?;
    Ok(metadata)
  }

  pub fn validate(&self) -> Result<(), MetadataError> {
    if self.data_type != "binary" {
      return Err(MetadataError::UnsupportedDataType(self.data_type.clone()));
    }
    self.bounding_box()?;
    if self.span == 0 {
      return Err(MetadataError::InvalidBounds);
    }
    Ok(())
  }

  /// Root cell bounds.
  pub fn bounding_box(&self) -> Result<Aabb, MetadataError> {
    bounds_to_aabb(&self.bounds)
  }

  /// Tight data bounds, falling back to the cell bounds.
  pub fn conforming_box(&self) -> Result<Aabb, MetadataError> {
    match &self.bounds_conforming {
      Some(bounds) => bounds_to_aabb(bounds),
      None => self.bounding_box(),
    }
  }

  /// Root point spacing: cell width divided by the grid span.
  pub fn spacing(&self) -> Result<f64, MetadataError> {
    if self.span == 0 {
      return Err(MetadataError::InvalidBounds);
    }
    Ok(self.bounding_box()?.size().x / self.span as f64)
  }
}

fn bounds_to_aabb(bounds: &[f64]) -> Result<Aabb, MetadataError> {
  let [min_x, min_y, min_z, max_x, max_y, max_z] = bounds else {
    return Err(MetadataError::InvalidBounds);
  };
  let min = DVec3::new(*min_x, *min_y, *min_z);
  let max = DVec3::new(*max_x, *max_y, *max_z);
  if !(min.is_finite() && max.is_finite()) || min.cmpgt(max).any() {
    return Err(MetadataError::InvalidBounds);
  }
  Ok(Aabb::new(min, max))
}

// =============================================================================
// PointSchema - resolved record layout
// =============================================================================

/// Value type of a dimension after resolving kind and size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
  I8,
  I16,
  I32,
  I64,
  U8,
  U16,
  U32,
  U64,
  F32,
  F64,
}

impl ValueType {
  fn resolve(name: &str, kind: DimensionKind, size: usize) -> Result<Self, DecodeError> {
    let value_type = match (kind, size) {
      (DimensionKind::Signed, 1) => ValueType::I8,
      (DimensionKind::Signed, 2) => ValueType::I16,
      (DimensionKind::Signed, 4) => ValueType::I32,
      (DimensionKind::Signed, 8) => ValueType::I64,
      (DimensionKind::Unsigned, 1) => ValueType::U8,
      (DimensionKind::Unsigned, 2) => ValueType::U16,
      (DimensionKind::Unsigned, 4) => ValueType::U32,
      (DimensionKind::Unsigned, 8) => ValueType::U64,
      (DimensionKind::Float, 4) => ValueType::F32,
      (DimensionKind::Float, 8) => ValueType::F64,
      _ => {
        return Err(DecodeError::UnsupportedType {
          name: name.to_string(),
          kind: kind.as_str().to_string(),
          size,
        })
      }
    };
    Ok(value_type)
  }
}

/// One dimension with its byte offset inside a record.
#[derive(Clone, Debug, PartialEq)]
pub struct Dimension {
  pub name: String,
  pub value_type: ValueType,
  pub size: usize,
  /// Byte offset inside the interleaved record.
  pub byte_offset: usize,
  pub scale: f64,
  pub offset: f64,
}

/// Interleaved record layout derived from the `schema` array.
#[derive(Clone, Debug, PartialEq)]
pub struct PointSchema {
  dimensions: Vec<Dimension>,
  stride: usize,
}

impl PointSchema {
  pub fn from_fields(fields: &[SchemaField]) -> Result<Self, DecodeError> {
    let mut byte_offset = 0;
    let mut dimensions = Vec::with_capacity(fields.len());
    for field in fields {
      dimensions.push(Dimension {
        name: field.name.clone(),
        value_type: ValueType::resolve(&field.name, field.kind, field.size)?,
        size: field.size,
        byte_offset,
        scale: field.scale.unwrap_or(1.0),
        offset: field.offset.unwrap_or(0.0),
      });
      byte_offset += field.size;
    }
    for required in ["X", "Y", "Z"] {
      if !dimensions.iter().any(|d| d.name == required) {
        return Err(DecodeError::MissingDimension(required));
      }
    }
    Ok(Self {
      dimensions,
      stride: byte_offset,
    })
  }

  /// Bytes per point record.
  #[inline]
  pub fn stride(&self) -> usize {
    self.stride
  }

  pub fn dimensions(&self) -> &[Dimension] {
    &self.dimensions
  }

  pub fn dimension(&self, name: &str) -> Option<&Dimension> {
    self.dimensions.iter().find(|d| d.name == name)
  }
}
