use crate::enums::DataType;

use ndarray::Array4;
use rayon::prelude::*;
use thiserror::Error;

/// Geometry and identity of a voxel grid crossing the worker boundary.
///
/// `id` correlates a reply with the originating volume and must be unique
/// per in-flight request. Spacing is handed to the native routine unchanged;
/// it plays no part in buffer size calculations.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageMetadata {
    pub id: String,
    pub datatype_code: i32,
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
    pub nt: u32,
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
    pub dt: f32,
    /// Bytes per voxel; must agree with `datatype_code`.
    pub bpv: u32,
}

impl ImageMetadata {
    pub fn voxel_count(&self) -> u64 {
        u64::from(self.nx) * u64::from(self.ny) * u64::from(self.nz) * u64::from(self.nt)
    }

    pub fn buffer_bytes(&self) -> u64 {
        self.voxel_count() * u64::from(self.bpv)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum VolumeError {
    #[error("result id {result} does not match volume id {volume}")]
    IdMismatch { result: String, volume: String },

    #[error("result holds {actual} voxels, volume expects {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("result datatype {actual:?} does not match volume datatype {expected:?}")]
    DatatypeMismatch { expected: DataType, actual: DataType },

    #[error("volume dimensions do not multiply to the voxel count")]
    ShapeMismatch,
}

/// Voxel payload in one of the supported scalar types.
///
/// Reconstruction from raw bytes is a single exhaustive match; a new
/// datatype code cannot be added without extending every arm.
#[derive(Clone, Debug, PartialEq)]
pub enum VoxelData {
    Uint8(Vec<u8>),
    Int16(Vec<i16>),
    Uint16(Vec<u16>),
    Float32(Vec<f32>),
}

impl VoxelData {
    /// Reinterpret raw bytes as `datatype` scalars.
    ///
    /// The byte layout is host-native (little-endian everywhere wasm runs);
    /// no swapping is performed. `bytes.len()` must be a multiple of the
    /// scalar width; the pipeline validates the size invariant before any
    /// bytes reach this point.
    pub fn from_bytes(datatype: DataType, bytes: &[u8]) -> Self {
        match datatype {
            DataType::Uint8 => VoxelData::Uint8(bytes.to_vec()),
            DataType::Int16 => VoxelData::Int16(bytemuck::pod_collect_to_vec(bytes)),
            DataType::Uint16 => VoxelData::Uint16(bytemuck::pod_collect_to_vec(bytes)),
            DataType::Float32 => VoxelData::Float32(bytemuck::pod_collect_to_vec(bytes)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            VoxelData::Uint8(values) => values,
            VoxelData::Int16(values) => bytemuck::cast_slice(values),
            VoxelData::Uint16(values) => bytemuck::cast_slice(values),
            VoxelData::Float32(values) => bytemuck::cast_slice(values),
        }
    }

    pub fn datatype(&self) -> DataType {
        match self {
            VoxelData::Uint8(_) => DataType::Uint8,
            VoxelData::Int16(_) => DataType::Int16,
            VoxelData::Uint16(_) => DataType::Uint16,
            VoxelData::Float32(_) => DataType::Float32,
        }
    }

    /// Number of voxels.
    pub fn len(&self) -> usize {
        match self {
            VoxelData::Uint8(values) => values.len(),
            VoxelData::Int16(values) => values.len(),
            VoxelData::Uint16(values) => values.len(),
            VoxelData::Float32(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Minimum and maximum intensity as f32, or `None` for empty volumes.
    /// NaN values in float volumes are ignored.
    pub fn intensity_range(&self) -> Option<(f32, f32)> {
        match self {
            VoxelData::Uint8(values) => par_min_max(values.par_iter().map(|&v| f32::from(v))),
            VoxelData::Int16(values) => par_min_max(values.par_iter().map(|&v| f32::from(v))),
            VoxelData::Uint16(values) => par_min_max(values.par_iter().map(|&v| f32::from(v))),
            VoxelData::Float32(values) => par_min_max(values.par_iter().copied()),
        }
    }

    fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            VoxelData::Uint8(values) => values.iter().map(|&v| f32::from(v)).collect(),
            VoxelData::Int16(values) => values.iter().map(|&v| f32::from(v)).collect(),
            VoxelData::Uint16(values) => values.iter().map(|&v| f32::from(v)).collect(),
            VoxelData::Float32(values) => values.clone(),
        }
    }
}

fn par_min_max(values: impl ParallelIterator<Item = f32>) -> Option<(f32, f32)> {
    values
        .filter(|value| !value.is_nan())
        .map(|value| (value, value))
        .reduce_with(|a, b| (a.0.min(b.0), a.1.max(b.1)))
}

/// The message sent worker-ward.
///
/// The request owns its buffer: sending it moves the bytes to the worker,
/// which is the transfer contract. The sender keeps no view of them.
#[derive(Clone, Debug)]
pub struct CommandRequest {
    pub metadata: ImageMetadata,
    pub image_bytes: Vec<u8>,
    pub command: String,
    pub is_new_layer: bool,
}

/// The reply for one successfully processed request, with `id` and
/// `is_new_layer` echoed unchanged from the request.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandResult {
    pub id: String,
    pub data: VoxelData,
    pub command: String,
    pub is_new_layer: bool,
}

/// A loaded image volume on the caller's side of the worker boundary.
#[derive(Clone, Debug)]
pub struct Volume {
    pub metadata: ImageMetadata,
    pub data: VoxelData,
}

impl Volume {
    pub fn new(metadata: ImageMetadata, data: VoxelData) -> Self {
        Self { metadata, data }
    }

    /// Clone the voxel buffer into a processing request.
    ///
    /// The volume itself stays untouched until a successful result is
    /// applied, so a failed command never changes what is displayed.
    pub fn to_request(&self, command: &str, is_new_layer: bool) -> CommandRequest {
        CommandRequest {
            metadata: self.metadata.clone(),
            image_bytes: self.data.as_bytes().to_vec(),
            command: command.to_owned(),
            is_new_layer,
        }
    }

    /// Replace the voxel data in place from a processing result.
    ///
    /// # Errors
    ///
    /// Returns an error when the result does not belong to this volume or
    /// does not match its datatype or voxel count.
    pub fn replace_data(&mut self, result: CommandResult) -> Result<(), VolumeError> {
        self.check_result(&result)?;
        self.data = result.data;
        Ok(())
    }

    /// Derive an overlay layer carrying the processed data under a fresh id.
    pub fn new_layer(
        &self,
        result: CommandResult,
        id: impl Into<String>,
    ) -> Result<Volume, VolumeError> {
        self.check_result(&result)?;
        let mut metadata = self.metadata.clone();
        metadata.id = id.into();
        Ok(Volume {
            metadata,
            data: result.data,
        })
    }

    fn check_result(&self, result: &CommandResult) -> Result<(), VolumeError> {
        if result.id != self.metadata.id {
            return Err(VolumeError::IdMismatch {
                result: result.id.clone(),
                volume: self.metadata.id.clone(),
            });
        }
        if result.data.datatype() != self.data.datatype() {
            return Err(VolumeError::DatatypeMismatch {
                expected: self.data.datatype(),
                actual: result.data.datatype(),
            });
        }
        if result.data.len() != self.data.len() {
            return Err(VolumeError::LengthMismatch {
                expected: self.data.len(),
                actual: result.data.len(),
            });
        }
        Ok(())
    }

    pub fn intensity_range(&self) -> Option<(f32, f32)> {
        self.data.intensity_range()
    }

    /// View the volume as a `(nt, nz, ny, nx)` array of f32 intensities.
    pub fn to_f32_array(&self) -> Result<Array4<f32>, VolumeError> {
        let shape = (
            self.metadata.nt as usize,
            self.metadata.nz as usize,
            self.metadata.ny as usize,
            self.metadata.nx as usize,
        );
        Array4::from_shape_vec(shape, self.data.to_f32_vec())
            .map_err(|_| VolumeError::ShapeMismatch)
    }
}
