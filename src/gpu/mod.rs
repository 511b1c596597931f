//! GPU resource binding: turns a combine result into vertex arrays and
//! shader programs through a thin device abstraction.
//!
//! The crate never owns a swapchain or render loop; it binds resources
//! through the `RenderDevice` trait and hands the scene draw commands that
//! reference them. `wgpu_backend` provides the production device; tests use
//! a recording mock.

pub mod wgpu_backend;

use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::attributes::{AttrRange, AttributeRecord, RecordEntryInit};
use crate::combine::CombineOutput;
use crate::error::{EngineError, EngineResult};
use crate::geometry::InstanceId;

/// What a buffer holds; backends choose usage flags from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Static vertex data, written once at creation.
    Vertex,
    /// Per-instance vertex data, updated in place between frames.
    VertexDynamic,
    Index,
}

/// Creation parameters for a device buffer.
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    pub label: &'a str,
    pub kind: BufferKind,
    pub contents: &'a [u8],
}

/// Creation parameters for a linked color/pick shader pair member.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor<'a> {
    pub label: &'a str,
    pub vertex_source: &'a str,
    pub fragment_source: &'a str,
    /// name -> attribute slot bindings the program is compiled against.
    pub attribute_locations: &'a BTreeMap<String, u32>,
}

/// Device buffer handle. Identity (`id`) distinguishes handles; contents are
/// opaque to this crate.
pub trait GpuBuffer: Send + Sync {
    fn id(&self) -> u64;
    fn size(&self) -> u64;
    /// Release device memory ahead of the handle being dropped. Backends
    /// without eager release treat this as a no-op.
    fn destroy(&self) {}
    fn as_any(&self) -> &dyn Any;
}

/// Compiled shader program handle.
pub trait ShaderProgram: Send + Sync {
    fn id(&self) -> u64;
    fn as_any(&self) -> &dyn Any;
}

/// The device operations this crate needs. Implemented by `WgpuDevice` for
/// production and by mocks in tests.
pub trait RenderDevice: Send + Sync {
    fn create_buffer(&self, descriptor: &BufferDescriptor<'_>) -> EngineResult<Arc<dyn GpuBuffer>>;

    /// Partial in-place update of a previously created buffer.
    fn write_buffer(
        &self,
        buffer: &Arc<dyn GpuBuffer>,
        offset: u64,
        bytes: &[u8],
    ) -> EngineResult<()>;

    fn create_program(
        &self,
        descriptor: &ProgramDescriptor<'_>,
    ) -> EngineResult<Arc<dyn ShaderProgram>>;
}

/// One vertex attribute bound into a vertex array.
pub struct BoundAttribute {
    pub name: String,
    pub location: u32,
    pub components: u8,
    pub buffer: Arc<dyn GpuBuffer>,
    /// Updatable between frames (per-instance data).
    pub dynamic: bool,
}

/// Buffers for one merged geometry: static attribute columns, expanded
/// per-instance columns, and the index buffer.
pub struct VertexArray {
    pub attributes: Vec<BoundAttribute>,
    pub index_buffer: Arc<dyn GpuBuffer>,
    pub index_count: u32,
}

impl VertexArray {
    /// Find the dynamic buffer bound under an attribute name.
    pub fn dynamic_buffer(&self, name: &str) -> Option<&Arc<dyn GpuBuffer>> {
        self.attributes
            .iter()
            .find(|a| a.dynamic && a.name == name)
            .map(|a| &a.buffer)
    }

    /// Eagerly release every buffer this array owns.
    pub fn destroy(&self) {
        for attribute in &self.attributes {
            attribute.buffer.destroy();
        }
        self.index_buffer.destroy();
    }
}

/// Everything `build_vertex_arrays` produces: device resources plus the
/// attribute records the instance table is constructed from.
pub struct BoundGeometry {
    pub vertex_arrays: Vec<Arc<VertexArray>>,
    pub records: Vec<(InstanceId, AttributeRecord)>,
}

/// Create buffers for every merged geometry and derive the per-instance
/// attribute records (value + byte ranges) in one pass.
///
/// Per-instance values are expanded to one copy per vertex so they bind as
/// ordinary vertex attributes; the byte ranges handed to the table are
/// offsets into those expanded buffers.
pub fn build_vertex_arrays(
    device: &dyn RenderDevice,
    label: &str,
    output: &CombineOutput,
) -> EngineResult<BoundGeometry> {
    let mut vertex_arrays = Vec::with_capacity(output.geometries.len());

    // Instance attribute names are uniform within a merged geometry; collect
    // them per geometry from the layouts.
    let mut instance_names: Vec<Vec<String>> = vec![Vec::new(); output.geometries.len()];
    for layout in &output.instances {
        let names = &mut instance_names[layout.geometry];
        if names.is_empty() {
            names.extend(layout.attributes.keys().cloned());
        }
    }

    let mut records: Vec<(InstanceId, AttributeRecord)> = output
        .instances
        .iter()
        .map(|layout| (layout.id.clone(), AttributeRecord::new()))
        .collect();

    for (geometry_index, geometry) in output.geometries.iter().enumerate() {
        let mut attributes = Vec::new();

        for (name, attribute) in &geometry.attributes {
            let location = location_of(&output.attribute_locations, name)?;
            let contents = attribute.data.as_bytes()?;
            let buffer = device.create_buffer(&BufferDescriptor {
                label: &format!("{} {} g{}", label, name, geometry_index),
                kind: BufferKind::Vertex,
                contents,
            })?;
            attributes.push(BoundAttribute {
                name: name.clone(),
                location,
                components: attribute.components,
                buffer,
                dynamic: false,
            });
        }

        // Expanded per-instance columns. Ranges within one geometry cover
        // every vertex exactly once, so writing by range fills the buffer.
        for name in &instance_names[geometry_index] {
            let (components, bytes, ranges_per_record) =
                expand_instance_column(output, geometry_index, geometry.vertex_count, name)?;
            let buffer = device.create_buffer(&BufferDescriptor {
                label: &format!("{} {} g{}", label, name, geometry_index),
                kind: BufferKind::VertexDynamic,
                contents: &bytes,
            })?;
            attributes.push(BoundAttribute {
                name: name.clone(),
                location: location_of(&output.attribute_locations, name)?,
                components,
                buffer,
                dynamic: true,
            });

            for (record_index, ranges, value) in ranges_per_record {
                records[record_index].1.insert(
                    name.clone(),
                    RecordEntryInit {
                        value,
                        ranges,
                    },
                );
            }
        }

        let index_buffer = device.create_buffer(&BufferDescriptor {
            label: &format!("{} indices g{}", label, geometry_index),
            kind: BufferKind::Index,
            contents: bytemuck::cast_slice(&geometry.indices),
        })?;

        vertex_arrays.push(Arc::new(VertexArray {
            attributes,
            index_buffer,
            index_count: geometry.indices.len() as u32,
        }));
    }

    log::debug!(
        "bound {} vertex arrays for '{}'",
        vertex_arrays.len(),
        label
    );
    Ok(BoundGeometry {
        vertex_arrays,
        records,
    })
}

fn location_of(locations: &BTreeMap<String, u32>, name: &str) -> EngineResult<u32> {
    locations.get(name).copied().ok_or_else(|| {
        EngineError::internal(format!("attribute '{}' has no assigned location", name))
    })
}

type ExpandedColumn = (
    u8,
    Vec<u8>,
    Vec<(usize, Vec<AttrRange>, crate::geometry::AttributeValue)>,
);

/// Expand one per-instance attribute into a vertex-rate byte column for one
/// merged geometry, returning the byte ranges each instance occupies.
fn expand_instance_column(
    output: &CombineOutput,
    geometry_index: usize,
    vertex_count: usize,
    name: &str,
) -> EngineResult<ExpandedColumn> {
    let mut components = 0u8;
    for layout in &output.instances {
        if layout.geometry == geometry_index {
            let value = layout.attributes.get(name).ok_or_else(|| {
                EngineError::internal(format!(
                    "instance '{}' is missing per-instance attribute '{}'",
                    layout.id, name
                ))
            })?;
            components = value.len() as u8;
            break;
        }
    }
    let stride = components as usize * 4;
    let mut bytes = vec![0u8; vertex_count * stride];
    let mut per_record = Vec::new();

    for (record_index, layout) in output.instances.iter().enumerate() {
        if layout.geometry != geometry_index {
            continue;
        }
        let value = layout.attributes.get(name).ok_or_else(|| {
            EngineError::internal(format!(
                "instance '{}' is missing per-instance attribute '{}'",
                layout.id, name
            ))
        })?;
        let value_bytes = value.as_bytes();
        let mut ranges = Vec::with_capacity(layout.ranges.len());
        for range in &layout.ranges {
            let byte_offset = range.start as u64 * stride as u64;
            for v in 0..range.count as usize {
                let at = byte_offset as usize + v * stride;
                bytes[at..at + stride].copy_from_slice(value_bytes);
            }
            ranges.push(AttrRange {
                geometry: geometry_index,
                byte_offset,
                vertex_count: range.count,
            });
        }
        per_record.push((record_index, ranges, value.clone()));
    }

    Ok((components, bytes, per_record))
}

/// Fragment shader used for the pick pass: writes the interpolated pick
/// color verbatim.
pub const PICK_FRAGMENT_SOURCE: &str = "\
@fragment
fn fs_main(@location(0) pick_color: vec4<f32>) -> @location(0) vec4<f32> {
    return pick_color;
}
";

/// Linked color/pick program pair. Built atomically: a failure in either
/// member leaves no resources behind.
pub struct ProgramPair {
    pub color: Arc<dyn ShaderProgram>,
    pub pick: Arc<dyn ShaderProgram>,
    cache_key: u64,
}

impl ProgramPair {
    pub fn cache_key(&self) -> u64 {
        self.cache_key
    }
}

impl fmt::Debug for ProgramPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramPair")
            .field("color", &self.color.id())
            .field("pick", &self.pick.id())
            .field("cache_key", &self.cache_key)
            .finish()
    }
}

/// Inputs that determine a compiled program pair.
pub struct ProgramSpec<'a> {
    pub label: &'a str,
    pub vertex_source: &'a str,
    pub fragment_source: &'a str,
    /// Attribute names the color shader consumes; validated against the
    /// combined layout.
    pub required_attributes: &'a [String],
    pub attribute_locations: &'a BTreeMap<String, u32>,
}

fn spec_key(spec: &ProgramSpec<'_>) -> u64 {
    let mut hasher = DefaultHasher::new();
    spec.vertex_source.hash(&mut hasher);
    spec.fragment_source.hash(&mut hasher);
    for (name, location) in spec.attribute_locations {
        name.hash(&mut hasher);
        location.hash(&mut hasher);
    }
    hasher.finish()
}

/// Check that every attribute the spec requires (plus the mandatory pick
/// color) exists in the combined layout. Runs on every acquisition, cached
/// or not: required attributes are not part of the cache key, so a cache
/// hit must not skip this.
fn validate_attributes(spec: &ProgramSpec<'_>) -> EngineResult<()> {
    for name in spec.required_attributes {
        if !spec.attribute_locations.contains_key(name) {
            return Err(EngineError::MissingVertexAttribute {
                label: spec.label.to_string(),
                name: name.clone(),
            });
        }
    }
    if !spec
        .attribute_locations
        .contains_key(crate::combine::PICK_COLOR_ATTRIBUTE)
    {
        return Err(EngineError::MissingVertexAttribute {
            label: spec.label.to_string(),
            name: crate::combine::PICK_COLOR_ATTRIBUTE.to_string(),
        });
    }
    Ok(())
}

/// Build the color/pick program pair after validating that every attribute
/// the shaders consume exists in the combined layout.
pub fn build_programs(
    device: &dyn RenderDevice,
    spec: &ProgramSpec<'_>,
) -> EngineResult<ProgramPair> {
    validate_attributes(spec)?;

    let color = device.create_program(&ProgramDescriptor {
        label: &format!("{} color", spec.label),
        vertex_source: spec.vertex_source,
        fragment_source: spec.fragment_source,
        attribute_locations: spec.attribute_locations,
    })?;
    let pick = device.create_program(&ProgramDescriptor {
        label: &format!("{} pick", spec.label),
        vertex_source: spec.vertex_source,
        fragment_source: PICK_FRAGMENT_SOURCE,
        attribute_locations: spec.attribute_locations,
    })?;

    Ok(ProgramPair {
        color,
        pick,
        cache_key: spec_key(spec),
    })
}

struct CacheSlot {
    pair: Arc<ProgramPair>,
    refs: usize,
}

/// Reference-counted program cache keyed by shader sources and attribute
/// bindings. Primitives sharing an appearance share compiled programs.
pub struct ProgramCache {
    slots: Mutex<FxHashMap<u64, CacheSlot>>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn global() -> &'static ProgramCache {
        static CACHE: OnceLock<ProgramCache> = OnceLock::new();
        CACHE.get_or_init(ProgramCache::new)
    }

    /// Fetch or build the pair for `spec`, bumping its reference count.
    pub fn acquire(
        &self,
        device: &dyn RenderDevice,
        spec: &ProgramSpec<'_>,
    ) -> EngineResult<Arc<ProgramPair>> {
        validate_attributes(spec)?;
        let key = spec_key(spec);
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&key) {
            slot.refs += 1;
            return Ok(slot.pair.clone());
        }
        let pair = Arc::new(build_programs(device, spec)?);
        slots.insert(
            key,
            CacheSlot {
                pair: pair.clone(),
                refs: 1,
            },
        );
        Ok(pair)
    }

    /// Drop one reference; the pair is evicted when the count reaches zero.
    pub fn release(&self, pair: &Arc<ProgramPair>) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&pair.cache_key) {
            slot.refs -= 1;
            if slot.refs == 0 {
                slots.remove(&pair.cache_key);
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Default for ProgramCache {
    fn default() -> Self {
        Self::new()
    }
}
