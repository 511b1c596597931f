//! Input data model: geometries, geometry instances, and per-instance
//! attribute values.
//!
//! A `GeometryInstance` pairs one geometry with a transform, an opaque id
//! (used for picking and attribute lookup), and named per-instance
//! attributes. Instances are immutable while a combine is in flight; the
//! combiner receives deep clones.

use std::collections::BTreeMap;
use std::fmt;

use glam::DMat4;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::math::BoundingSphere;

/// Opaque instance identifier. Compared by value; the crate never interprets
/// its contents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Component storage type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentDatatype {
    F32,
    F64,
    U8Normalized,
}

/// Typed attribute payload. F64 is accepted only for `position`; the
/// combiner splits it into high/low f32 pairs before upload.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
}

impl AttributeData {
    pub fn len(&self) -> usize {
        match self {
            AttributeData::F32(v) => v.len(),
            AttributeData::F64(v) => v.len(),
            AttributeData::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn datatype(&self) -> ComponentDatatype {
        match self {
            AttributeData::F32(_) => ComponentDatatype::F32,
            AttributeData::F64(_) => ComponentDatatype::F64,
            AttributeData::U8(_) => ComponentDatatype::U8Normalized,
        }
    }

    /// Raw bytes for static buffer upload. F64 data is never uploaded
    /// directly and has no byte view.
    pub fn as_bytes(&self) -> EngineResult<&[u8]> {
        match self {
            AttributeData::F32(v) => Ok(bytemuck::cast_slice(v)),
            AttributeData::U8(v) => Ok(v.as_slice()),
            AttributeData::F64(_) => Err(EngineError::internal(
                "f64 attribute data must be precision-split before upload",
            )),
        }
    }
}

/// One vertex attribute: `components` values per vertex, tightly packed.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryAttribute {
    pub components: u8,
    pub data: AttributeData,
}

impl GeometryAttribute {
    pub fn new(components: u8, data: AttributeData) -> EngineResult<Self> {
        if !(1..=4).contains(&components) {
            return Err(EngineError::invalid_argument(
                "components",
                format!("must be 1..=4, got {}", components),
            ));
        }
        if data.len() % components as usize != 0 {
            return Err(EngineError::invalid_argument(
                "data",
                "length is not a multiple of the component count",
            ));
        }
        Ok(Self { components, data })
    }

    pub fn vertex_count(&self) -> usize {
        self.data.len() / self.components as usize
    }
}

/// Primitive topology of an index stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveTopology {
    Points,
    Lines,
    Triangles,
}

/// Geometry ready for combining: named attributes, an optional index
/// stream, a topology, and an optional precomputed bounding volume.
///
/// Attribute maps are ordered (`BTreeMap`) so layout signatures and merged
/// output are reproducible.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub attributes: BTreeMap<String, GeometryAttribute>,
    pub indices: Option<Vec<u32>>,
    pub topology: PrimitiveTopology,
    pub bounding_sphere: Option<BoundingSphere>,
}

impl Geometry {
    /// Vertex count shared by all attributes. Fails when attributes
    /// disagree or the geometry has none.
    pub fn vertex_count(&self) -> EngineResult<usize> {
        let mut iter = self.attributes.iter();
        let (first_name, first) = iter.next().ok_or_else(|| {
            EngineError::invalid_argument("geometry", "has no vertex attributes")
        })?;
        let count = first.vertex_count();
        for (name, attribute) in iter {
            if attribute.vertex_count() != count {
                return Err(EngineError::invalid_argument(
                    "geometry",
                    format!(
                        "attribute '{}' has {} vertices but '{}' has {}",
                        name,
                        attribute.vertex_count(),
                        first_name,
                        count
                    ),
                ));
            }
        }
        Ok(count)
    }

    /// Index stream, materialized as sequential indices when absent.
    pub fn indices_or_sequential(&self) -> EngineResult<Vec<u32>> {
        match &self.indices {
            Some(indices) => Ok(indices.clone()),
            None => Ok((0..self.vertex_count()? as u32).collect()),
        }
    }
}

/// Fixed-length numeric vector (1..=4 components) carried per instance.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeValue {
    components: Vec<f32>,
}

impl AttributeValue {
    pub fn new(components: Vec<f32>) -> EngineResult<Self> {
        if components.is_empty() || components.len() > 4 {
            return Err(EngineError::invalid_argument(
                "value",
                format!(
                    "per-instance attribute values must have 1..=4 components, got {}",
                    components.len()
                ),
            ));
        }
        Ok(Self { components })
    }

    pub fn components(&self) -> &[f32] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.components)
    }
}

/// One geometry with its transform, id, and per-instance attributes.
#[derive(Debug, Clone)]
pub struct GeometryInstance {
    pub geometry: Geometry,
    pub model_matrix: DMat4,
    pub id: InstanceId,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl GeometryInstance {
    pub fn new(id: impl Into<InstanceId>, geometry: Geometry) -> Self {
        Self {
            geometry,
            model_matrix: DMat4::IDENTITY,
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_model_matrix(mut self, model_matrix: DMat4) -> Self {
        self.model_matrix = model_matrix;
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

impl From<String> for InstanceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(components: u8, len: usize) -> GeometryAttribute {
        GeometryAttribute::new(components, AttributeData::F32(vec![0.0; len])).unwrap()
    }

    #[test]
    fn test_attribute_value_length_validation() {
        assert!(AttributeValue::new(vec![]).is_err());
        assert!(AttributeValue::new(vec![1.0]).is_ok());
        assert!(AttributeValue::new(vec![1.0; 4]).is_ok());
        assert!(AttributeValue::new(vec![1.0; 5]).is_err());
    }

    #[test]
    fn test_attribute_component_range() {
        assert!(GeometryAttribute::new(0, AttributeData::F32(vec![])).is_err());
        assert!(GeometryAttribute::new(5, AttributeData::F32(vec![0.0; 5])).is_err());
        assert!(GeometryAttribute::new(3, AttributeData::F32(vec![0.0; 7])).is_err());
    }

    #[test]
    fn test_vertex_count_mismatch_rejected() {
        let mut attributes = BTreeMap::new();
        attributes.insert("position".to_string(), attribute(3, 12));
        attributes.insert("normal".to_string(), attribute(3, 9));
        let geometry = Geometry {
            attributes,
            indices: None,
            topology: PrimitiveTopology::Triangles,
            bounding_sphere: None,
        };
        assert!(geometry.vertex_count().is_err());
    }

    #[test]
    fn test_sequential_indices_when_absent() {
        let mut attributes = BTreeMap::new();
        attributes.insert("position".to_string(), attribute(3, 9));
        let geometry = Geometry {
            attributes,
            indices: None,
            topology: PrimitiveTopology::Triangles,
            bounding_sphere: None,
        };
        assert_eq!(geometry.indices_or_sequential().unwrap(), vec![0, 1, 2]);
    }
}
