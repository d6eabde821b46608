pub mod obj;

/// One vertex as the pipeline consumes it. Layout must match the vertex
/// input attributes declared at pipeline creation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
}

/// Deduplicated vertices plus a triangle index list, as emitted by the
/// OBJ reader. `indices.len()` is always a multiple of three.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Expands the index list into a flat vertex stream for a non-indexed
    /// draw call.
    pub fn expand(&self) -> Vec<Vertex> {
        self.indices
            .iter()
            .map(|&i| self.vertices[i as usize])
            .collect()
    }
}
