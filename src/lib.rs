//! Batched rendering of geometry instances over a globe.
//!
//! A [`Primitive`] takes a set of geometry instances, combines them on a
//! worker thread into as few merged geometries as possible (with dual
//! high/low precision 3D and 2D position attributes for precision-safe
//! rendering in any projection mode), binds the result to GPU buffers
//! through the [`gpu::RenderDevice`] seam, and emits color and pick pass
//! draw commands every frame. Per-instance attributes (color, pick color,
//! visibility) stay individually addressable after merging and update the
//! GPU with minimal partial buffer writes.
//!
//! ```no_run
//! use globe_batch::{
//!     Appearance, FrameState, Primitive, PrimitiveOptions, RenderState, SceneMode,
//! };
//! use glam::DMat4;
//!
//! # fn demo(instances: Vec<globe_batch::GeometryInstance>,
//! #         device: &dyn globe_batch::gpu::RenderDevice) {
//! let appearance = Appearance::new(RenderState::default(), "vs", "fs", vec![]);
//! let mut primitive = Primitive::new(
//!     instances,
//!     appearance,
//!     DMat4::IDENTITY,
//!     PrimitiveOptions::default(),
//! );
//!
//! let frame = FrameState::new(SceneMode::Scene3d);
//! let mut commands = Vec::new();
//! primitive.update(device, &frame, &mut commands).unwrap();
//! # }
//! ```

pub mod attributes;
pub mod combine;
pub mod command;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod math;
pub mod pick;
pub mod primitive;
pub mod scene;
pub mod task;

pub use combine::{CombineOutput, IndexPrecision, PICK_COLOR_ATTRIBUTE};
pub use command::{DrawCommand, Pass};
pub use error::{EngineError, EngineResult};
pub use geometry::{
    AttributeData, AttributeValue, ComponentDatatype, Geometry, GeometryAttribute,
    GeometryInstance, InstanceId, PrimitiveTopology,
};
pub use math::{BoundingSphere, Cartographic, Ellipsoid, GeographicProjection, MapProjection};
pub use pick::{PickId, PickRegistry};
pub use primitive::{AttributeAccessor, Primitive, PrimitiveOptions, PrimitiveState};
pub use scene::{Appearance, FrameState, Material, PassState, RenderState, SceneMode};
pub use task::{CombineHandle, CombineScheduler, SchedulerMode};
