use thiserror::Error;
use uuid::Uuid;

use crate::InstanceId;

/// Failures reported by an external ray tracing device.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendError {
    #[error("ray tracing device was lost")]
    DeviceLost,

    #[error("ray tracing device ran out of memory")]
    OutOfMemory,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccelError {
    /// Mesh has no triangles to build a BLAS over.
    #[error("mesh has no triangles")]
    EmptyMesh,

    /// Every triangle of the mesh has zero area.
    #[error("mesh has only degenerate triangles")]
    DegenerateMesh,

    #[error("index buffer length {0} is not a multiple of 3")]
    InvalidIndexBuffer(usize),

    #[error("index {index} references a missing vertex (vertex count {vertex_count})")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    #[error("expected {expected} material indices, got {actual}")]
    MaterialCountMismatch { expected: usize, actual: usize },

    #[error("packet of width {expected} built from {actual} rays")]
    PacketSize { expected: usize, actual: usize },

    #[error("unknown mesh {0}")]
    UnknownMesh(Uuid),

    #[error("unknown instance {0:?}")]
    UnknownInstance(InstanceId),

    /// Acceleration structure build failed on the device; requires a full rebuild.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

pub type Result<T> = std::result::Result<T, AccelError>;
