//! `RenderDevice` backed by a wgpu device/queue pair.
//!
//! The caller owns the device; this wrapper only creates buffers and shader
//! modules and performs partial buffer writes through the queue.

use std::any::Any;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::{
    BufferDescriptor, BufferKind, GpuBuffer, ProgramDescriptor, RenderDevice, ShaderProgram,
};
use crate::error::{EngineError, EngineResult};

pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    next_id: AtomicU64,
}

impl WgpuDevice {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

pub struct WgpuBuffer {
    id: u64,
    pub buffer: wgpu::Buffer,
}

impl GpuBuffer for WgpuBuffer {
    fn id(&self) -> u64 {
        self.id
    }

    fn size(&self) -> u64 {
        self.buffer.size()
    }

    fn destroy(&self) {
        self.buffer.destroy();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Compiled vertex/fragment module pair. Pipeline assembly stays with the
/// scene, which knows the target formats.
pub struct WgpuProgram {
    id: u64,
    pub vertex_module: wgpu::ShaderModule,
    pub fragment_module: wgpu::ShaderModule,
}

impl ShaderProgram for WgpuProgram {
    fn id(&self) -> u64 {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn usage_for(kind: BufferKind) -> wgpu::BufferUsages {
    match kind {
        BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
        BufferKind::VertexDynamic => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        BufferKind::Index => wgpu::BufferUsages::INDEX,
    }
}

impl RenderDevice for WgpuDevice {
    fn create_buffer(&self, descriptor: &BufferDescriptor<'_>) -> EngineResult<Arc<dyn GpuBuffer>> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(descriptor.label),
                contents: descriptor.contents,
                usage: usage_for(descriptor.kind),
            });
        Ok(Arc::new(WgpuBuffer {
            id: self.next_id(),
            buffer,
        }))
    }

    fn write_buffer(
        &self,
        buffer: &Arc<dyn GpuBuffer>,
        offset: u64,
        bytes: &[u8],
    ) -> EngineResult<()> {
        let backing = buffer
            .as_any()
            .downcast_ref::<WgpuBuffer>()
            .ok_or_else(|| EngineError::GpuOperationFailed {
                operation: "write_buffer".to_string(),
                error: "buffer was not created by this device".to_string(),
            })?;
        if offset + bytes.len() as u64 > backing.buffer.size() {
            return Err(EngineError::GpuOperationFailed {
                operation: "write_buffer".to_string(),
                error: format!(
                    "write of {} bytes at offset {} exceeds buffer size {}",
                    bytes.len(),
                    offset,
                    backing.buffer.size()
                ),
            });
        }
        self.queue.write_buffer(&backing.buffer, offset, bytes);
        Ok(())
    }

    fn create_program(
        &self,
        descriptor: &ProgramDescriptor<'_>,
    ) -> EngineResult<Arc<dyn ShaderProgram>> {
        // Module creation does not report errors synchronously; validation
        // surfaces through the device error scope at submission time.
        let vertex_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(descriptor.label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(descriptor.vertex_source)),
            });
        let fragment_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(descriptor.label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(descriptor.fragment_source)),
            });
        Ok(Arc::new(WgpuProgram {
            id: self.next_id(),
            vertex_module,
            fragment_module,
        }))
    }
}
