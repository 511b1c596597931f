//! Batched renderable primitive: owns the combine lifecycle, the bound GPU
//! resources, per-instance attribute updates, and per-frame draw command
//! emission.
//!
//! All transition logic lives in `update`, driven once per frame. Combining
//! happens off-thread; `update` never blocks on it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::DMat4;
use serde::{Deserialize, Serialize};

use crate::attributes::InstanceTable;
use crate::combine::{CombineInput, CombineOutput, IndexPrecision};
use crate::command::{DrawCommand, Pass};
use crate::error::{EngineError, EngineResult};
use crate::geometry::{AttributeValue, GeometryInstance, InstanceId};
use crate::gpu::{
    build_vertex_arrays, ProgramCache, ProgramPair, ProgramSpec, RenderDevice, VertexArray,
};
use crate::math::BoundingSphere;
use crate::pick::{PickId, PickRegistry};
use crate::scene::{Appearance, FrameState, SceneMode};
use crate::task::{CombineHandle, CombineScheduler};

/// Construction-time configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveOptions {
    /// Reorder merged vertices for rasterization cache locality.
    pub vertex_cache_optimize: bool,
    /// Drop the retained input instances once GPU resources exist.
    pub release_geometry_instances: bool,
    /// Render only in the 3D frame; skips the 2D position attributes and
    /// keeps the model matrix live instead of baking it in.
    pub allow_3d_only: bool,
    pub index_precision: IndexPrecision,
}

impl Default for PrimitiveOptions {
    fn default() -> Self {
        Self {
            vertex_cache_optimize: true,
            release_geometry_instances: true,
            allow_3d_only: false,
            index_precision: IndexPrecision::U32,
        }
    }
}

/// Lifecycle state. Monotonic; `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveState {
    Ready,
    Combining,
    Combined,
    Complete,
    Failed,
}

/// What survives of the combine output after GPU resources are built.
struct Built {
    attribute_locations: BTreeMap<String, u32>,
    baked_to_world: bool,
    bounding_3d: Vec<BoundingSphere>,
    bounding_2d: Vec<Option<BoundingSphere>>,
}

struct BoundPrograms {
    pair: Arc<ProgramPair>,
    appearance_id: u64,
    material_id: Option<u64>,
}

static NEXT_PRIMITIVE_ID: AtomicU64 = AtomicU64::new(1);

/// Mutable accessor for one instance's per-instance attributes.
pub struct AttributeAccessor<'a> {
    table: &'a mut InstanceTable,
    index: usize,
}

impl AttributeAccessor<'_> {
    pub fn names(&self) -> Vec<String> {
        self.table.attribute_names(self.index)
    }

    pub fn get(&self, name: &str) -> EngineResult<AttributeValue> {
        self.table.get(self.index, name)
    }

    /// Store a new value and queue the GPU update for the next frame.
    pub fn set(&mut self, name: &str, value: AttributeValue) -> EngineResult<()> {
        self.table.set(self.index, name, value)
    }
}

impl fmt::Debug for AttributeAccessor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeAccessor")
            .field("index", &self.index)
            .field("names", &self.table.attribute_names(self.index))
            .finish()
    }
}

pub struct Primitive {
    label: String,
    /// Toggles all rendering without touching resources.
    pub show: bool,
    /// Live in 3D-only mode; ignored after world baking.
    pub model_matrix: DMat4,
    options: PrimitiveOptions,
    state: PrimitiveState,
    destroyed: bool,

    instances: Option<Vec<GeometryInstance>>,
    appearance: Option<Appearance>,
    scheduler: Option<Arc<CombineScheduler>>,
    pick_ids: Vec<PickId>,

    handle: Option<CombineHandle>,
    pending_output: Option<CombineOutput>,

    vertex_arrays: Vec<Arc<VertexArray>>,
    table: Option<InstanceTable>,
    programs: Option<BoundPrograms>,
    built: Option<Built>,
}

impl Primitive {
    pub fn new(
        instances: Vec<GeometryInstance>,
        appearance: Appearance,
        model_matrix: DMat4,
        options: PrimitiveOptions,
    ) -> Self {
        let label = format!(
            "primitive-{}",
            NEXT_PRIMITIVE_ID.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            label,
            show: true,
            model_matrix,
            options,
            state: PrimitiveState::Ready,
            destroyed: false,
            instances: Some(instances),
            appearance: Some(appearance),
            scheduler: None,
            pick_ids: Vec::new(),
            handle: None,
            pending_output: None,
            vertex_arrays: Vec::new(),
            table: None,
            programs: None,
            built: None,
        }
    }

    /// Use a private scheduler instead of the process-wide one.
    pub fn with_scheduler(mut self, scheduler: Arc<CombineScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn state(&self) -> PrimitiveState {
        self.state
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Replace the appearance. Programs are rebuilt on the next update when
    /// the identity differs from the bound one.
    pub fn set_appearance(&mut self, appearance: Appearance) -> EngineResult<()> {
        self.check_alive()?;
        self.appearance = Some(appearance);
        Ok(())
    }

    fn check_alive(&self) -> EngineResult<()> {
        if self.destroyed {
            return Err(EngineError::ObjectDestroyed {
                object: self.label.clone(),
            });
        }
        Ok(())
    }

    /// Per-frame tick. Drives the state machine and appends this frame's
    /// draw commands. Combine failure is terminal but silent here; observe
    /// it via `state()`.
    pub fn update(
        &mut self,
        device: &dyn RenderDevice,
        frame_state: &FrameState,
        commands: &mut Vec<DrawCommand>,
    ) -> EngineResult<()> {
        self.check_alive()?;
        if self.state == PrimitiveState::Failed {
            return Ok(());
        }

        // Early-exit guards. None of these consume or alter state.
        if !self.show {
            return Ok(());
        }
        let has_instances = self.instances.as_ref().is_some_and(|i| !i.is_empty());
        if !has_instances && self.vertex_arrays.is_empty() {
            return Ok(());
        }
        if self.appearance.is_none() {
            return Ok(());
        }
        if self.options.allow_3d_only && frame_state.mode != SceneMode::Scene3d {
            return Ok(());
        }
        if !frame_state.passes.render && !frame_state.passes.pick {
            return Ok(());
        }

        if self.state == PrimitiveState::Ready {
            self.dispatch_combine(frame_state);
            return Ok(());
        }

        if self.state == PrimitiveState::Combining {
            let resolved = match self.handle.as_mut().and_then(CombineHandle::try_resolve) {
                None => return Ok(()),
                Some(result) => result,
            };
            self.handle = None;
            match resolved {
                Ok(output) => {
                    log::debug!(
                        "{}: combine resolved with {} merged geometries",
                        self.label,
                        output.geometries.len()
                    );
                    self.pending_output = Some(output);
                    self.state = PrimitiveState::Combined;
                    // Resource build proceeds in this same call.
                }
                Err(error) => {
                    log::warn!("{}: combine failed: {}", self.label, error);
                    PickRegistry::global().release(&self.pick_ids);
                    self.pick_ids.clear();
                    self.state = PrimitiveState::Failed;
                    return Ok(());
                }
            }
        }

        if self.state == PrimitiveState::Combined {
            self.build_resources(device, frame_state)?;
            self.state = PrimitiveState::Complete;
            log::info!("{}: resources built, primitive complete", self.label);
        }

        // Complete steady state.
        self.refresh_programs(device)?;
        self.flush_attribute_writes(device)?;
        self.emit_commands(frame_state, commands);
        Ok(())
    }

    fn dispatch_combine(&mut self, frame_state: &FrameState) {
        // Guards ensure instances exist here.
        let Some(instances) = self.instances.as_ref() else {
            return;
        };
        self.pick_ids = PickRegistry::global().allocate_block(instances.len());

        let input = CombineInput {
            // Deep snapshot; the caller may keep mutating its instances.
            instances: instances.clone(),
            pick_ids: self.pick_ids.clone(),
            ellipsoid: frame_state.ellipsoid,
            projection: frame_state.projection.clone(),
            model_matrix: self.model_matrix,
            allow_3d_only: self.options.allow_3d_only,
            vertex_cache_optimize: self.options.vertex_cache_optimize,
            index_precision: self.options.index_precision,
        };
        let scheduler = self
            .scheduler
            .clone()
            .unwrap_or_else(CombineScheduler::global);
        self.handle = Some(scheduler.dispatch(input));
        self.state = PrimitiveState::Combining;
        log::debug!(
            "{}: dispatched combine of {} instances",
            self.label,
            self.pick_ids.len()
        );
    }

    fn build_resources(
        &mut self,
        device: &dyn RenderDevice,
        frame_state: &FrameState,
    ) -> EngineResult<()> {
        let output = self
            .pending_output
            .take()
            .ok_or_else(|| EngineError::internal("combined state without combine output"))?;

        let bound = build_vertex_arrays(device, &self.label, &output)?;
        self.vertex_arrays = bound.vertex_arrays;
        self.table = Some(InstanceTable::new(bound.records));

        let bounding_3d: Vec<BoundingSphere> = output
            .geometries
            .iter()
            .map(|g| g.bounding_sphere)
            .collect();
        let bounding_2d: Vec<Option<BoundingSphere>> = if self.options.allow_3d_only {
            vec![None; bounding_3d.len()]
        } else {
            bounding_3d
                .iter()
                .map(|sphere| {
                    sphere.project_to_2d(&frame_state.ellipsoid, frame_state.projection.as_ref())
                })
                .collect()
        };

        self.built = Some(Built {
            attribute_locations: output.attribute_locations,
            baked_to_world: output.baked_to_world,
            bounding_3d,
            bounding_2d,
        });

        self.refresh_programs(device)?;

        if self.options.release_geometry_instances {
            self.instances = None;
        }
        Ok(())
    }

    /// Build programs on first use and whenever the appearance or material
    /// identity changed. Replacement is atomic: the cache builds the new
    /// pair before the old one is released.
    fn refresh_programs(&mut self, device: &dyn RenderDevice) -> EngineResult<()> {
        let appearance = self
            .appearance
            .as_ref()
            .ok_or_else(|| EngineError::internal("program build without an appearance"))?;
        let built = self
            .built
            .as_ref()
            .ok_or_else(|| EngineError::internal("program build before combine output"))?;

        let current = (appearance.id(), appearance.material_id());
        if let Some(bound) = &self.programs {
            if (bound.appearance_id, bound.material_id) == current {
                return Ok(());
            }
            log::debug!("{}: appearance changed, rebuilding programs", self.label);
        }

        let pair = ProgramCache::global().acquire(
            device,
            &ProgramSpec {
                label: &self.label,
                vertex_source: &appearance.vertex_shader_source,
                fragment_source: &appearance.fragment_shader_source,
                required_attributes: &appearance.vertex_attributes,
                attribute_locations: &built.attribute_locations,
            },
        )?;
        if let Some(old) = self.programs.take() {
            ProgramCache::global().release(&old.pair);
        }
        self.programs = Some(BoundPrograms {
            pair,
            appearance_id: current.0,
            material_id: current.1,
        });
        Ok(())
    }

    fn flush_attribute_writes(&mut self, device: &dyn RenderDevice) -> EngineResult<()> {
        let Some(table) = self.table.as_mut() else {
            return Ok(());
        };
        for write in table.drain_dirty() {
            let array = self.vertex_arrays.get(write.geometry).ok_or_else(|| {
                EngineError::internal("attribute write targets an unknown geometry")
            })?;
            let buffer = array.dynamic_buffer(&write.name).ok_or_else(|| {
                EngineError::internal(format!(
                    "attribute '{}' has no dynamic buffer",
                    write.name
                ))
            })?;
            device.write_buffer(buffer, write.byte_offset, &write.bytes)?;
        }
        Ok(())
    }

    fn bounding_volume(built: &Built, index: usize, mode: SceneMode) -> BoundingSphere {
        let volume_3d = built.bounding_3d[index];
        match mode {
            SceneMode::Scene3d => volume_3d,
            SceneMode::Scene2d | SceneMode::ColumbusView => {
                built.bounding_2d[index].unwrap_or(volume_3d)
            }
            SceneMode::Morphing => match built.bounding_2d[index] {
                Some(volume_2d) => volume_3d.union(&volume_2d),
                None => volume_3d,
            },
        }
    }

    fn emit_commands(&self, frame_state: &FrameState, commands: &mut Vec<DrawCommand>) {
        let (Some(built), Some(programs), Some(appearance)) =
            (&self.built, &self.programs, &self.appearance)
        else {
            return;
        };

        // Refreshed every frame: live in 3D-only mode, pinned after baking.
        let model_matrix = if built.baked_to_world {
            DMat4::IDENTITY
        } else {
            self.model_matrix
        };
        let uniforms = appearance
            .material
            .as_ref()
            .map(|m| m.uniforms.clone())
            .unwrap_or_default();

        for (index, array) in self.vertex_arrays.iter().enumerate() {
            // Command volumes are world-space for culling. After baking the
            // matrix here is the identity; in 3D-only mode it carries the
            // live model matrix into world coordinates.
            let bounding_volume =
                Self::bounding_volume(built, index, frame_state.mode).transform(&model_matrix);
            if frame_state.passes.render {
                commands.push(DrawCommand {
                    pass: Pass::Color,
                    vertex_array: array.clone(),
                    program: programs.pair.color.clone(),
                    model_matrix,
                    bounding_volume,
                    render_state: appearance.render_state,
                    uniforms: uniforms.clone(),
                    index_count: array.index_count,
                });
            }
            if frame_state.passes.pick {
                commands.push(DrawCommand {
                    pass: Pass::Pick,
                    vertex_array: array.clone(),
                    program: programs.pair.pick.clone(),
                    model_matrix,
                    bounding_volume,
                    render_state: appearance.render_state,
                    uniforms: uniforms.clone(),
                    index_count: array.index_count,
                });
            }
        }
    }

    /// Accessor for one instance's attributes. Requires a successful combine
    /// (`NotReady` before that) and a surviving id (`InstanceNotFound`).
    pub fn get_attributes(&mut self, id: &InstanceId) -> EngineResult<AttributeAccessor<'_>> {
        self.check_alive()?;
        let table = self.table.as_mut().ok_or_else(|| EngineError::NotReady {
            what: "per-instance attributes are unavailable until combining completes".to_string(),
        })?;
        let index = table
            .find(id)
            .ok_or_else(|| EngineError::InstanceNotFound { id: id.to_string() })?;
        Ok(AttributeAccessor { table, index })
    }

    /// Release every owned resource deterministically. A combine still in
    /// flight is abandoned; its result is dropped at the channel.
    pub fn destroy(&mut self) -> EngineResult<()> {
        self.check_alive()?;

        if let Some(bound) = self.programs.take() {
            ProgramCache::global().release(&bound.pair);
        }
        for array in self.vertex_arrays.drain(..) {
            array.destroy();
        }
        PickRegistry::global().release(&self.pick_ids);
        self.pick_ids.clear();

        self.handle = None;
        self.pending_output = None;
        self.instances = None;
        self.table = None;
        self.built = None;
        self.appearance = None;
        self.destroyed = true;
        log::debug!("{}: destroyed", self.label);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::geometry::{
        AttributeData, Geometry, GeometryAttribute, GeometryInstance, PrimitiveTopology,
    };
    use crate::gpu::{BufferDescriptor, GpuBuffer, ProgramDescriptor, ShaderProgram};
    use crate::scene::RenderState;
    use crate::task::SchedulerMode;
    use std::any::Any;
    use std::collections::BTreeMap;

    struct NullBuffer {
        id: u64,
        size: u64,
    }

    impl GpuBuffer for NullBuffer {
        fn id(&self) -> u64 {
            self.id
        }
        fn size(&self) -> u64 {
            self.size
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct NullProgram {
        id: u64,
    }

    impl ShaderProgram for NullProgram {
        fn id(&self) -> u64 {
            self.id
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Default)]
    struct NullDevice {
        next: AtomicU64,
    }

    impl RenderDevice for NullDevice {
        fn create_buffer(
            &self,
            descriptor: &BufferDescriptor<'_>,
        ) -> EngineResult<Arc<dyn GpuBuffer>> {
            Ok(Arc::new(NullBuffer {
                id: self.next.fetch_add(1, Ordering::Relaxed),
                size: descriptor.contents.len() as u64,
            }))
        }

        fn write_buffer(
            &self,
            _buffer: &Arc<dyn GpuBuffer>,
            _offset: u64,
            _bytes: &[u8],
        ) -> EngineResult<()> {
            Ok(())
        }

        fn create_program(
            &self,
            _descriptor: &ProgramDescriptor<'_>,
        ) -> EngineResult<Arc<dyn ShaderProgram>> {
            Ok(Arc::new(NullProgram {
                id: self.next.fetch_add(1, Ordering::Relaxed),
            }))
        }
    }

    fn triangle(id: &str) -> GeometryInstance {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            "position".to_string(),
            GeometryAttribute::new(
                3,
                AttributeData::F64(vec![
                    6378137.0, 0.0, 0.0, 6378137.0, 1.0, 0.0, 6378137.0, 0.0, 1.0,
                ]),
            )
            .unwrap(),
        );
        GeometryInstance::new(
            id,
            Geometry {
                attributes,
                indices: Some(vec![0, 1, 2]),
                topology: PrimitiveTopology::Triangles,
                bounding_sphere: None,
            },
        )
    }

    fn appearance() -> Appearance {
        Appearance::new(RenderState::default(), "vs", "fs", vec![])
    }

    fn inline_primitive(instances: Vec<GeometryInstance>) -> Primitive {
        let scheduler = Arc::new(CombineScheduler::new(SchedulerMode::Inline).unwrap());
        Primitive::new(
            instances,
            appearance(),
            DMat4::IDENTITY,
            PrimitiveOptions::default(),
        )
        .with_scheduler(scheduler)
    }

    #[test]
    fn test_hidden_primitive_never_dispatches() {
        let device = NullDevice::default();
        let mut primitive = inline_primitive(vec![triangle("a")]);
        primitive.show = false;

        let mut commands = Vec::new();
        primitive
            .update(&device, &FrameState::new(SceneMode::Scene3d), &mut commands)
            .unwrap();
        assert_eq!(primitive.state(), PrimitiveState::Ready);
        assert!(commands.is_empty());
    }

    #[test]
    fn test_3d_only_in_2d_mode_is_a_strict_noop() {
        let device = NullDevice::default();
        let scheduler = Arc::new(CombineScheduler::new(SchedulerMode::Inline).unwrap());
        let mut primitive = Primitive::new(
            vec![triangle("a")],
            appearance(),
            DMat4::IDENTITY,
            PrimitiveOptions {
                allow_3d_only: true,
                ..PrimitiveOptions::default()
            },
        )
        .with_scheduler(scheduler);

        let mut commands = Vec::new();
        primitive
            .update(&device, &FrameState::new(SceneMode::Scene2d), &mut commands)
            .unwrap();
        assert_eq!(primitive.state(), PrimitiveState::Ready);
        assert!(commands.is_empty());
    }

    #[test]
    fn test_lifecycle_reaches_complete_and_emits_commands() {
        let device = NullDevice::default();
        let mut primitive = inline_primitive(vec![triangle("a")]);
        let frame = FrameState::new(SceneMode::Scene3d);

        let mut commands = Vec::new();
        // First update dispatches; inline mode resolves immediately but the
        // transition is observed on the next tick.
        primitive.update(&device, &frame, &mut commands).unwrap();
        assert_eq!(primitive.state(), PrimitiveState::Combining);
        assert!(commands.is_empty());

        primitive.update(&device, &frame, &mut commands).unwrap();
        assert_eq!(primitive.state(), PrimitiveState::Complete);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].pass, Pass::Color);
    }

    #[test]
    fn test_appearance_swap_rebuilds_programs() {
        let device = NullDevice::default();
        let scheduler = Arc::new(CombineScheduler::new(SchedulerMode::Inline).unwrap());
        let first = Appearance::new(RenderState::default(), "vs-swap-a", "fs-swap-a", vec![]);
        let mut primitive = Primitive::new(
            vec![triangle("a")],
            first,
            DMat4::IDENTITY,
            PrimitiveOptions::default(),
        )
        .with_scheduler(scheduler);
        let frame = FrameState::new(SceneMode::Scene3d);

        let mut commands = Vec::new();
        primitive.update(&device, &frame, &mut commands).unwrap();
        primitive.update(&device, &frame, &mut commands).unwrap();
        assert_eq!(primitive.state(), PrimitiveState::Complete);
        let before = commands[0].program.id();

        let second = Appearance::new(RenderState::default(), "vs-swap-b", "fs-swap-b", vec![]);
        primitive.set_appearance(second).unwrap();
        commands.clear();
        primitive.update(&device, &frame, &mut commands).unwrap();
        let after = commands[0].program.id();
        assert_ne!(before, after);

        // Unchanged appearance on the next frame keeps the rebuilt pair.
        commands.clear();
        primitive.update(&device, &frame, &mut commands).unwrap();
        assert_eq!(commands[0].program.id(), after);

        // The old pair was released at swap time, so re-acquiring its spec
        // compiles fresh programs instead of returning the stale pair.
        let built = primitive.built.as_ref().unwrap();
        let reacquired = ProgramCache::global()
            .acquire(
                &device,
                &ProgramSpec {
                    label: "swap",
                    vertex_source: "vs-swap-a",
                    fragment_source: "fs-swap-a",
                    required_attributes: &[],
                    attribute_locations: &built.attribute_locations,
                },
            )
            .unwrap();
        assert_ne!(reacquired.color.id(), before);
        ProgramCache::global().release(&reacquired);
    }

    #[test]
    fn test_3d_only_command_volume_is_in_world_coordinates() {
        let device = NullDevice::default();
        let scheduler = Arc::new(CombineScheduler::new(SchedulerMode::Inline).unwrap());
        let translation = glam::DVec3::new(10.0, 20.0, 30.0);
        let mut primitive = Primitive::new(
            vec![triangle("a")],
            appearance(),
            DMat4::from_translation(translation),
            PrimitiveOptions {
                allow_3d_only: true,
                ..PrimitiveOptions::default()
            },
        )
        .with_scheduler(scheduler);
        let frame = FrameState::new(SceneMode::Scene3d);

        let mut commands = Vec::new();
        primitive.update(&device, &frame, &mut commands).unwrap();
        primitive.update(&device, &frame, &mut commands).unwrap();
        assert_eq!(primitive.state(), PrimitiveState::Complete);

        // Positions stay in model space in 3D-only mode, so the command
        // volume must be the model-space sphere moved by the live matrix.
        let local = primitive.built.as_ref().unwrap().bounding_3d[0];
        let volume = commands[0].bounding_volume;
        assert!(volume.center.distance(local.center + translation) < 1e-9);
        assert!((volume.radius - local.radius).abs() < 1e-9);
        assert_eq!(
            commands[0].model_matrix,
            DMat4::from_translation(translation)
        );
    }

    #[test]
    fn test_attributes_unavailable_before_combine() {
        let mut primitive = inline_primitive(vec![triangle("a")]);
        let err = primitive.get_attributes(&InstanceId::from("a")).unwrap_err();
        assert!(matches!(err, EngineError::NotReady { .. }));
    }

    #[test]
    fn test_destroyed_primitive_rejects_calls() {
        let device = NullDevice::default();
        let mut primitive = inline_primitive(vec![triangle("a")]);
        primitive.destroy().unwrap();

        assert!(primitive.is_destroyed());
        let mut commands = Vec::new();
        let err = primitive
            .update(&device, &FrameState::new(SceneMode::Scene3d), &mut commands)
            .unwrap_err();
        assert!(matches!(err, EngineError::ObjectDestroyed { .. }));
        assert!(matches!(
            primitive.destroy().unwrap_err(),
            EngineError::ObjectDestroyed { .. }
        ));
    }

    #[test]
    fn test_combine_failure_is_terminal_and_silent() {
        let device = NullDevice::default();
        // An instance without a position attribute fails the combine.
        let mut attributes = BTreeMap::new();
        attributes.insert(
            "normal".to_string(),
            GeometryAttribute::new(3, AttributeData::F32(vec![0.0; 9])).unwrap(),
        );
        let broken = GeometryInstance::new(
            "broken",
            Geometry {
                attributes,
                indices: Some(vec![0, 1, 2]),
                topology: PrimitiveTopology::Triangles,
                bounding_sphere: None,
            },
        );
        let mut primitive = inline_primitive(vec![broken]);
        let frame = FrameState::new(SceneMode::Scene3d);

        let mut commands = Vec::new();
        primitive.update(&device, &frame, &mut commands).unwrap();
        primitive.update(&device, &frame, &mut commands).unwrap();
        assert_eq!(primitive.state(), PrimitiveState::Failed);

        // Further updates stay silent no-ops.
        primitive.update(&device, &frame, &mut commands).unwrap();
        assert_eq!(primitive.state(), PrimitiveState::Failed);
        assert!(commands.is_empty());
    }
}
