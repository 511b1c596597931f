//! Recording mock device shared by the integration tests.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use globe_batch::error::EngineResult;
use globe_batch::gpu::{
    BufferDescriptor, BufferKind, GpuBuffer, ProgramDescriptor, RenderDevice, ShaderProgram,
};

#[derive(Debug, Clone)]
pub struct RecordedBuffer {
    pub id: u64,
    pub label: String,
    pub kind: BufferKind,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub buffer_id: u64,
    pub offset: u64,
    pub bytes: Vec<u8>,
}

pub struct MockBuffer {
    id: u64,
    size: u64,
    destroyed: Arc<Mutex<Vec<u64>>>,
}

impl GpuBuffer for MockBuffer {
    fn id(&self) -> u64 {
        self.id
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn destroy(&self) {
        self.destroyed.lock().push(self.id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockProgram {
    id: u64,
    pub label: String,
}

impl ShaderProgram for MockProgram {
    fn id(&self) -> u64 {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Records every device call so tests can assert on resource traffic.
#[derive(Default)]
pub struct MockDevice {
    next_id: AtomicU64,
    pub buffers: Mutex<Vec<RecordedBuffer>>,
    pub writes: Mutex<Vec<RecordedWrite>>,
    pub programs: Mutex<Vec<String>>,
    pub destroyed_buffers: Arc<Mutex<Vec<u64>>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn program_count(&self) -> usize {
        self.programs.lock().len()
    }
}

impl RenderDevice for MockDevice {
    fn create_buffer(&self, descriptor: &BufferDescriptor<'_>) -> EngineResult<Arc<dyn GpuBuffer>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.buffers.lock().push(RecordedBuffer {
            id,
            label: descriptor.label.to_string(),
            kind: descriptor.kind,
            size: descriptor.contents.len() as u64,
        });
        Ok(Arc::new(MockBuffer {
            id,
            size: descriptor.contents.len() as u64,
            destroyed: self.destroyed_buffers.clone(),
        }))
    }

    fn write_buffer(
        &self,
        buffer: &Arc<dyn GpuBuffer>,
        offset: u64,
        bytes: &[u8],
    ) -> EngineResult<()> {
        self.writes.lock().push(RecordedWrite {
            buffer_id: buffer.id(),
            offset,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn create_program(
        &self,
        descriptor: &ProgramDescriptor<'_>,
    ) -> EngineResult<Arc<dyn ShaderProgram>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.programs.lock().push(descriptor.label.to_string());
        Ok(Arc::new(MockProgram {
            id,
            label: descriptor.label.to_string(),
        }))
    }
}
