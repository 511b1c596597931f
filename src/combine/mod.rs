//! Geometry combining: merges N geometry instances into M merged geometries
//! sharing one vertex attribute layout.
//!
//! Runs on a worker thread over an exclusively owned snapshot of the
//! instances (see `crate::task`), so nothing here touches shared state. The
//! output is deterministic for a given input: instances are processed in
//! submission order, attribute maps are ordered, and the cache reorder is a
//! pure function of the index stream.

mod cache;

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{DMat4, DVec3};
use rustc_hash::FxHashMap;

use crate::error::{EngineError, EngineResult};
use crate::geometry::{
    AttributeData, AttributeValue, ComponentDatatype, GeometryAttribute, GeometryInstance,
    InstanceId, PrimitiveTopology,
};
use crate::math::{BoundingSphere, Ellipsoid, EncodedVec3, MapProjection};
use crate::pick::PickId;

/// Name of the synthesized pick color per-instance attribute.
pub const PICK_COLOR_ATTRIBUTE: &str = "pickColor";

const POSITION_ATTRIBUTE: &str = "position";

/// Largest index value plus one that fits the target index type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum IndexPrecision {
    /// Indices must fit in 16 bits; merged geometries are split at 65535
    /// vertices.
    U16Only,
    U32,
}

impl IndexPrecision {
    fn max_vertices(&self) -> usize {
        match self {
            IndexPrecision::U16Only => u16::MAX as usize,
            IndexPrecision::U32 => u32::MAX as usize,
        }
    }
}

/// Everything the combine worker needs, exclusively owned.
pub struct CombineInput {
    pub instances: Vec<GeometryInstance>,
    /// Pre-assigned pick ids, one per instance, in instance order.
    pub pick_ids: Vec<PickId>,
    pub ellipsoid: Ellipsoid,
    pub projection: Arc<dyn MapProjection>,
    /// Owning primitive's model matrix at dispatch time.
    pub model_matrix: DMat4,
    pub allow_3d_only: bool,
    pub vertex_cache_optimize: bool,
    pub index_precision: IndexPrecision,
}

/// A contiguous span of vertices within a merged geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexRange {
    pub start: u32,
    pub count: u32,
}

/// One merged geometry: homogeneous f32/u8 vertex attribute columns, a
/// remapped index stream, and a unified bounding volume.
#[derive(Debug, Clone)]
pub struct CombinedGeometry {
    pub attributes: BTreeMap<String, GeometryAttribute>,
    pub indices: Vec<u32>,
    pub topology: PrimitiveTopology,
    pub bounding_sphere: BoundingSphere,
    pub vertex_count: usize,
}

/// Where one input instance ended up: its merged geometry, its (possibly
/// disjoint) vertex ranges there, and its per-instance attribute values
/// including the synthesized pick color.
#[derive(Debug, Clone)]
pub struct InstanceLayout {
    pub id: InstanceId,
    pub pick_id: PickId,
    pub geometry: usize,
    pub ranges: Vec<VertexRange>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Successful combine result.
#[derive(Debug, Clone)]
pub struct CombineOutput {
    pub geometries: Vec<CombinedGeometry>,
    /// One shared attribute name -> slot map for every merged geometry.
    pub attribute_locations: BTreeMap<String, u32>,
    pub instances: Vec<InstanceLayout>,
    /// Matrix the draw commands should use. Identity when positions were
    /// baked to world coordinates.
    pub model_matrix: DMat4,
    /// True when positions are world-space and later model matrix changes
    /// cannot affect this primitive.
    pub baked_to_world: bool,
}

/// Layout signature used to group compatible instances. Two instances merge
/// only when their geometry attributes, per-instance attributes, and
/// topology all agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LayoutKey {
    topology: PrimitiveTopology,
    geometry_attributes: Vec<(String, ComponentDatatype, u8)>,
    instance_attributes: Vec<(String, usize)>,
}

impl LayoutKey {
    fn of(instance: &GeometryInstance) -> Self {
        Self {
            topology: instance.geometry.topology,
            geometry_attributes: instance
                .geometry
                .attributes
                .iter()
                .map(|(name, a)| (name.clone(), a.data.datatype(), a.components))
                .collect(),
            instance_attributes: instance
                .attributes
                .iter()
                .map(|(name, v)| (name.clone(), v.len()))
                .collect(),
        }
    }
}

/// Per-instance working state after validation and transform baking.
struct PreparedInstance {
    index: usize,
    positions: Vec<DVec3>,
    indices: Vec<u32>,
}

/// Merge the instance set. Any fault yields `CombineFailed`; there is no
/// partial output.
pub fn combine(input: CombineInput) -> EngineResult<CombineOutput> {
    if input.instances.is_empty() {
        return Err(EngineError::combine_failed("no geometry instances"));
    }
    if input.pick_ids.len() != input.instances.len() {
        return Err(EngineError::combine_failed(format!(
            "{} pick ids for {} instances",
            input.pick_ids.len(),
            input.instances.len()
        )));
    }

    let baked_to_world = !input.allow_3d_only;
    let prepared = prepare_instances(&input, baked_to_world)?;

    // Group by layout signature, preserving first-occurrence order.
    let mut group_order: Vec<LayoutKey> = Vec::new();
    let mut groups: FxHashMap<LayoutKey, Vec<usize>> = FxHashMap::default();
    for (i, instance) in input.instances.iter().enumerate() {
        let key = LayoutKey::of(instance);
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                group_order.push(key);
                Vec::new()
            })
            .push(i);
    }

    let max_vertices = input.index_precision.max_vertices();
    let mut geometries = Vec::new();
    let mut layouts: Vec<InstanceLayout> = Vec::new();

    for key in &group_order {
        let members = &groups[key];

        // Greedy packing in submission order under the index-type limit.
        let mut batch: Vec<usize> = Vec::new();
        let mut batch_vertices = 0usize;
        for &member in members {
            let count = prepared[member].positions.len();
            if count > max_vertices {
                return Err(EngineError::combine_failed(format!(
                    "instance '{}' has {} vertices, exceeding the {}-vertex index limit",
                    input.instances[member].id, count, max_vertices
                )));
            }
            if batch_vertices + count > max_vertices && !batch.is_empty() {
                merge_batch(&input, &prepared, &batch, &mut geometries, &mut layouts)?;
                batch.clear();
                batch_vertices = 0;
            }
            batch.push(member);
            batch_vertices += count;
        }
        if !batch.is_empty() {
            merge_batch(&input, &prepared, &batch, &mut geometries, &mut layouts)?;
        }
    }

    // Instance layouts in submission order regardless of grouping.
    layouts.sort_by_key(|layout| {
        input
            .instances
            .iter()
            .position(|i| i.id == layout.id)
            .unwrap_or(usize::MAX)
    });

    let attribute_locations = assign_locations(&geometries, &layouts);

    log::debug!(
        "combined {} instances into {} geometries ({} attributes)",
        input.instances.len(),
        geometries.len(),
        attribute_locations.len()
    );

    Ok(CombineOutput {
        geometries,
        attribute_locations,
        instances: layouts,
        model_matrix: if baked_to_world {
            DMat4::IDENTITY
        } else {
            input.model_matrix
        },
        baked_to_world,
    })
}

/// Validate each instance and bake transforms into positions.
///
/// When not restricted to the 3D frame, both the per-instance matrix and the
/// owning model matrix are baked in (world coordinates are required to
/// project 2D positions). In 3D-only mode only non-identity instance
/// matrices are baked, leaving the owning matrix live for per-frame updates.
fn prepare_instances(
    input: &CombineInput,
    baked_to_world: bool,
) -> EngineResult<Vec<PreparedInstance>> {
    let mut prepared = Vec::with_capacity(input.instances.len());

    for (index, instance) in input.instances.iter().enumerate() {
        let vertex_count = instance
            .geometry
            .vertex_count()
            .map_err(|e| EngineError::combine_failed(e))?;

        let position = instance
            .geometry
            .attributes
            .get(POSITION_ATTRIBUTE)
            .ok_or_else(|| {
                EngineError::combine_failed(format!(
                    "instance '{}' has no position attribute",
                    instance.id
                ))
            })?;
        if position.components != 3 {
            return Err(EngineError::combine_failed(format!(
                "instance '{}' position attribute must have 3 components",
                instance.id
            )));
        }

        let mut positions: Vec<DVec3> = match &position.data {
            AttributeData::F64(v) => v.chunks_exact(3).map(DVec3::from_slice).collect(),
            AttributeData::F32(v) => v
                .chunks_exact(3)
                .map(|c| DVec3::new(c[0] as f64, c[1] as f64, c[2] as f64))
                .collect(),
            AttributeData::U8(_) => {
                return Err(EngineError::combine_failed(format!(
                    "instance '{}' position attribute must be floating point",
                    instance.id
                )));
            }
        };

        let transform = if baked_to_world {
            input.model_matrix * instance.model_matrix
        } else {
            instance.model_matrix
        };
        if transform != DMat4::IDENTITY {
            for p in &mut positions {
                *p = transform.transform_point3(*p);
            }
        }

        let indices = instance
            .geometry
            .indices_or_sequential()
            .map_err(|e| EngineError::combine_failed(e))?;
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(EngineError::combine_failed(format!(
                "instance '{}' index {} out of range for {} vertices",
                instance.id, bad, vertex_count
            )));
        }

        // Non-position f64 attributes have no precision-split path.
        for (name, attribute) in &instance.geometry.attributes {
            if name != POSITION_ATTRIBUTE
                && attribute.data.datatype() == ComponentDatatype::F64
            {
                return Err(EngineError::combine_failed(format!(
                    "instance '{}' attribute '{}' is f64; only position supports double precision",
                    instance.id, name
                )));
            }
        }

        prepared.push(PreparedInstance {
            index,
            positions,
            indices,
        });
    }

    Ok(prepared)
}

/// Merge one batch of layout-compatible instances into a single geometry.
fn merge_batch(
    input: &CombineInput,
    prepared: &[PreparedInstance],
    batch: &[usize],
    geometries: &mut Vec<CombinedGeometry>,
    layouts: &mut Vec<InstanceLayout>,
) -> EngineResult<()> {
    let geometry_index = geometries.len();
    let first = &input.instances[batch[0]];
    let topology = first.geometry.topology;

    let mut positions: Vec<DVec3> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut pre_ranges: Vec<VertexRange> = Vec::with_capacity(batch.len());

    // Concatenate every non-position attribute column; the layout key
    // guarantees matching names, types, and component counts.
    let mut columns: BTreeMap<String, GeometryAttribute> = BTreeMap::new();
    for (name, attribute) in &first.geometry.attributes {
        if name != POSITION_ATTRIBUTE {
            columns.insert(
                name.clone(),
                GeometryAttribute {
                    components: attribute.components,
                    data: match attribute.data {
                        AttributeData::F32(_) => AttributeData::F32(Vec::new()),
                        AttributeData::U8(_) => AttributeData::U8(Vec::new()),
                        AttributeData::F64(_) => {
                            return Err(EngineError::combine_failed(
                                "unexpected f64 attribute survived validation",
                            ))
                        }
                    },
                },
            );
        }
    }

    for &member in batch {
        let inst = &prepared[member];
        let offset = positions.len() as u32;

        pre_ranges.push(VertexRange {
            start: offset,
            count: inst.positions.len() as u32,
        });
        positions.extend_from_slice(&inst.positions);
        indices.extend(inst.indices.iter().map(|&i| i + offset));

        for (name, column) in columns.iter_mut() {
            let source = &input.instances[inst.index].geometry.attributes[name];
            match (&mut column.data, &source.data) {
                (AttributeData::F32(dst), AttributeData::F32(src)) => {
                    dst.extend_from_slice(src)
                }
                (AttributeData::U8(dst), AttributeData::U8(src)) => dst.extend_from_slice(src),
                _ => {
                    return Err(EngineError::combine_failed(format!(
                        "attribute '{}' type mismatch inside a layout group",
                        name
                    )))
                }
            }
        }
    }

    let vertex_count = positions.len();

    // Optional cache reorder: permute every column, remap indices, and
    // rewrite instance ranges (possibly into disjoint runs).
    let instance_ranges: Vec<Vec<VertexRange>> = if input.vertex_cache_optimize {
        let reorder = cache::first_use_order(vertex_count, &indices);
        for index in &mut indices {
            *index = reorder.remap[*index as usize];
        }
        positions = reorder
            .order
            .iter()
            .map(|&old| positions[old as usize])
            .collect();
        for column in columns.values_mut() {
            permute_column(column, &reorder.order);
        }
        pre_ranges
            .iter()
            .map(|range| cache::ranges_after_reorder(range, &reorder.remap))
            .collect()
    } else {
        pre_ranges.iter().map(|range| vec![*range]).collect()
    };

    let bounding_sphere = BoundingSphere::from_points(&positions);

    // Precision-split positions; optionally derive the independently
    // projected 2D/Columbus positions so the scene can morph between
    // projections without recombining.
    let mut attributes = columns;
    insert_split_positions(&mut attributes, "position3DHigh", "position3DLow", &positions)?;
    if !input.allow_3d_only {
        let mut projected = Vec::with_capacity(vertex_count);
        for p in &positions {
            let cartographic = input.ellipsoid.cartesian_to_cartographic(*p).ok_or_else(
                || {
                    EngineError::combine_failed(format!(
                        "position {:?} cannot be projected to 2D",
                        p
                    ))
                },
            )?;
            projected.push(input.projection.project(&cartographic));
        }
        insert_split_positions(&mut attributes, "position2DHigh", "position2DLow", &projected)?;
    }

    for (slot, &member) in batch.iter().enumerate() {
        let instance = &input.instances[member];
        let mut values = instance.attributes.clone();
        values.insert(
            PICK_COLOR_ATTRIBUTE.to_string(),
            AttributeValue::new(input.pick_ids[member].to_color().to_vec())?,
        );
        layouts.push(InstanceLayout {
            id: instance.id.clone(),
            pick_id: input.pick_ids[member],
            geometry: geometry_index,
            ranges: instance_ranges[slot].clone(),
            attributes: values,
        });
    }

    geometries.push(CombinedGeometry {
        attributes,
        indices,
        topology,
        bounding_sphere,
        vertex_count,
    });
    Ok(())
}

fn permute_column(column: &mut GeometryAttribute, order: &[u32]) {
    let c = column.components as usize;
    match &mut column.data {
        AttributeData::F32(values) => {
            let mut out = Vec::with_capacity(values.len());
            for &old in order {
                let base = old as usize * c;
                out.extend_from_slice(&values[base..base + c]);
            }
            *values = out;
        }
        AttributeData::U8(values) => {
            let mut out = Vec::with_capacity(values.len());
            for &old in order {
                let base = old as usize * c;
                out.extend_from_slice(&values[base..base + c]);
            }
            *values = out;
        }
        AttributeData::F64(_) => {}
    }
}

fn insert_split_positions(
    attributes: &mut BTreeMap<String, GeometryAttribute>,
    high_name: &str,
    low_name: &str,
    positions: &[DVec3],
) -> EngineResult<()> {
    let mut high = Vec::with_capacity(positions.len() * 3);
    let mut low = Vec::with_capacity(positions.len() * 3);
    for p in positions {
        let encoded = EncodedVec3::from_dvec3(*p);
        high.extend_from_slice(&encoded.high);
        low.extend_from_slice(&encoded.low);
    }
    attributes.insert(
        high_name.to_string(),
        GeometryAttribute::new(3, AttributeData::F32(high))?,
    );
    attributes.insert(
        low_name.to_string(),
        GeometryAttribute::new(3, AttributeData::F32(low))?,
    );
    Ok(())
}

/// One shared name -> slot map covering both static geometry attributes and
/// per-instance attributes, in lexicographic order.
fn assign_locations(
    geometries: &[CombinedGeometry],
    layouts: &[InstanceLayout],
) -> BTreeMap<String, u32> {
    let mut names: BTreeMap<String, u32> = BTreeMap::new();
    for geometry in geometries {
        for name in geometry.attributes.keys() {
            names.entry(name.clone()).or_default();
        }
    }
    for layout in layouts {
        for name in layout.attributes.keys() {
            names.entry(name.clone()).or_default();
        }
    }
    for (slot, location) in names.values_mut().enumerate() {
        *location = slot as u32;
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Geometry, GeometryInstance};
    use crate::math::GeographicProjection;
    use crate::pick::PickRegistry;

    fn surface_positions(count: usize, offset: f64) -> Vec<f64> {
        // Points near the WGS84 surface so 2D projection succeeds.
        let radius = 6378137.0;
        (0..count)
            .flat_map(|i| {
                let t = offset + i as f64;
                [radius + t, t * 2.0, t * 3.0]
            })
            .collect()
    }

    fn triangle_fan_indices(count: usize) -> Vec<u32> {
        (0..count.saturating_sub(2) as u32)
            .flat_map(|i| [0, i + 1, i + 2])
            .collect()
    }

    fn instance(id: &str, vertices: usize, offset: f64, color: [f32; 4]) -> GeometryInstance {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            "position".to_string(),
            GeometryAttribute::new(3, AttributeData::F64(surface_positions(vertices, offset)))
                .unwrap(),
        );
        attributes.insert(
            "normal".to_string(),
            GeometryAttribute::new(3, AttributeData::F32(vec![0.0; vertices * 3])).unwrap(),
        );
        let geometry = Geometry {
            attributes,
            indices: Some(triangle_fan_indices(vertices)),
            topology: PrimitiveTopology::Triangles,
            bounding_sphere: None,
        };
        GeometryInstance::new(id, geometry)
            .with_attribute("color", AttributeValue::new(color.to_vec()).unwrap())
    }

    fn input_for(instances: Vec<GeometryInstance>) -> CombineInput {
        let pick_ids = PickRegistry::new().allocate_block(instances.len());
        CombineInput {
            instances,
            pick_ids,
            ellipsoid: Ellipsoid::WGS84,
            projection: Arc::new(GeographicProjection::default()),
            model_matrix: DMat4::IDENTITY,
            allow_3d_only: false,
            vertex_cache_optimize: true,
            index_precision: IndexPrecision::U32,
        }
    }

    #[test]
    fn test_empty_instance_set_fails() {
        let result = combine(input_for(vec![]));
        assert!(matches!(result, Err(EngineError::CombineFailed { .. })));
    }

    #[test]
    fn test_vertex_counts_are_preserved() {
        let input = input_for(vec![
            instance("a", 4, 0.0, [1.0, 0.0, 0.0, 1.0]),
            instance("b", 6, 100.0, [0.0, 1.0, 0.0, 1.0]),
        ]);
        let output = combine(input).unwrap();

        let merged: usize = output.geometries.iter().map(|g| g.vertex_count).sum();
        assert_eq!(merged, 10);
    }

    #[test]
    fn test_matching_layouts_merge_into_one_geometry() {
        let input = input_for(vec![
            instance("a", 4, 0.0, [1.0, 0.0, 0.0, 1.0]),
            instance("b", 6, 100.0, [0.0, 1.0, 0.0, 1.0]),
        ]);
        let output = combine(input).unwrap();
        assert_eq!(output.geometries.len(), 1);
        assert_eq!(output.instances.len(), 2);
    }

    #[test]
    fn test_distinct_layouts_stay_separate() {
        let mut b = instance("b", 6, 100.0, [0.0, 1.0, 0.0, 1.0]);
        b.geometry.attributes.insert(
            "st".to_string(),
            GeometryAttribute::new(2, AttributeData::F32(vec![0.0; 12])).unwrap(),
        );
        let input = input_for(vec![instance("a", 4, 0.0, [1.0, 0.0, 0.0, 1.0]), b]);
        let output = combine(input).unwrap();
        assert_eq!(output.geometries.len(), 2);
    }

    #[test]
    fn test_output_is_deterministic() {
        let build = || {
            let mut input = input_for(vec![
                instance("a", 5, 0.0, [1.0, 0.0, 0.0, 1.0]),
                instance("b", 7, 50.0, [0.0, 1.0, 0.0, 1.0]),
                instance("c", 3, 200.0, [0.0, 0.0, 1.0, 1.0]),
            ]);
            input.pick_ids = PickRegistry::new().allocate_block(3);
            input
        };
        let first = combine(build()).unwrap();
        let second = combine(build()).unwrap();

        assert_eq!(first.geometries.len(), second.geometries.len());
        for (g1, g2) in first.geometries.iter().zip(&second.geometries) {
            assert_eq!(g1.indices, g2.indices);
            assert_eq!(g1.attributes, g2.attributes);
        }
        for (i1, i2) in first.instances.iter().zip(&second.instances) {
            assert_eq!(i1.id, i2.id);
            assert_eq!(i1.pick_id, i2.pick_id);
            assert_eq!(i1.ranges, i2.ranges);
        }
    }

    #[test]
    fn test_shared_layout_includes_instance_attributes() {
        let input = input_for(vec![instance("a", 4, 0.0, [1.0, 0.0, 0.0, 1.0])]);
        let output = combine(input).unwrap();

        assert!(output.attribute_locations.contains_key("position3DHigh"));
        assert!(output.attribute_locations.contains_key("position3DLow"));
        assert!(output.attribute_locations.contains_key("position2DHigh"));
        assert!(output.attribute_locations.contains_key("color"));
        assert!(output.attribute_locations.contains_key(PICK_COLOR_ATTRIBUTE));

        let mut slots: Vec<u32> = output.attribute_locations.values().copied().collect();
        slots.sort_unstable();
        let expected: Vec<u32> = (0..slots.len() as u32).collect();
        assert_eq!(slots, expected);
    }

    #[test]
    fn test_3d_only_skips_2d_positions_and_keeps_matrix() {
        let matrix = DMat4::from_translation(DVec3::new(10.0, 0.0, 0.0));
        let mut input = input_for(vec![instance("a", 4, 0.0, [1.0; 4])]);
        input.allow_3d_only = true;
        input.model_matrix = matrix;
        let output = combine(input).unwrap();

        assert!(!output.geometries[0].attributes.contains_key("position2DHigh"));
        assert!(!output.baked_to_world);
        assert_eq!(output.model_matrix, matrix);
    }

    #[test]
    fn test_world_baking_resolves_to_identity() {
        let mut input = input_for(vec![instance("a", 4, 0.0, [1.0; 4])]);
        input.model_matrix = DMat4::from_translation(DVec3::new(5.0, 0.0, 0.0));
        let output = combine(input).unwrap();

        assert!(output.baked_to_world);
        assert_eq!(output.model_matrix, DMat4::IDENTITY);
    }

    #[test]
    fn test_u16_limit_splits_batches() {
        // Two instances of 40000 vertices cannot share a 16-bit index space.
        let a = instance("a", 40000, 0.0, [1.0; 4]);
        let b = instance("b", 40000, 1.0, [1.0; 4]);
        let mut input = input_for(vec![a, b]);
        input.index_precision = IndexPrecision::U16Only;
        input.vertex_cache_optimize = false;
        let output = combine(input).unwrap();

        assert_eq!(output.geometries.len(), 2);
        for geometry in &output.geometries {
            assert!(geometry.vertex_count <= u16::MAX as usize);
        }
    }

    #[test]
    fn test_oversized_instance_fails_under_u16() {
        let a = instance("a", 70000, 0.0, [1.0; 4]);
        let mut input = input_for(vec![a]);
        input.index_precision = IndexPrecision::U16Only;
        assert!(matches!(
            combine(input),
            Err(EngineError::CombineFailed { .. })
        ));
    }

    #[test]
    fn test_pick_colors_are_distinct_per_instance() {
        let input = input_for(vec![
            instance("a", 4, 0.0, [1.0; 4]),
            instance("b", 4, 10.0, [1.0; 4]),
        ]);
        let output = combine(input).unwrap();

        let colors: Vec<&AttributeValue> = output
            .instances
            .iter()
            .map(|layout| &layout.attributes[PICK_COLOR_ATTRIBUTE])
            .collect();
        assert_ne!(colors[0], colors[1]);
    }

    #[test]
    fn test_indices_reference_valid_vertices_after_reorder() {
        let input = input_for(vec![
            instance("a", 8, 0.0, [1.0; 4]),
            instance("b", 5, 30.0, [1.0; 4]),
        ]);
        let output = combine(input).unwrap();
        for geometry in &output.geometries {
            for &index in &geometry.indices {
                assert!((index as usize) < geometry.vertex_count);
            }
        }
    }

    #[test]
    fn test_instance_ranges_cover_all_vertices_exactly_once() {
        let input = input_for(vec![
            instance("a", 8, 0.0, [1.0; 4]),
            instance("b", 5, 30.0, [1.0; 4]),
        ]);
        let output = combine(input).unwrap();

        let mut covered = vec![false; output.geometries[0].vertex_count];
        for layout in &output.instances {
            for range in &layout.ranges {
                for v in range.start..range.start + range.count {
                    assert!(!covered[v as usize], "vertex {} covered twice", v);
                    covered[v as usize] = true;
                }
            }
        }
        assert!(covered.iter().all(|&c| c));
    }
}
