/// Voxel scalar types supported by the processing pipeline.
///
/// The discriminants are the external volume-format datatype codes the
/// UI collaborator passes across the worker boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Uint8 = 2,
    Int16 = 4,
    Float32 = 16,
    Uint16 = 512,
    // TODO: Float64 (code 64) once the native routine grows a double path
}

impl DataType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            2 => Some(DataType::Uint8),
            4 => Some(DataType::Int16),
            16 => Some(DataType::Float32),
            512 => Some(DataType::Uint16),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Bytes per voxel for this scalar type.
    pub fn bytes_per_voxel(&self) -> u32 {
        match self {
            DataType::Uint8 => 1,
            DataType::Int16 | DataType::Uint16 => 2,
            DataType::Float32 => 4,
        }
    }
}
