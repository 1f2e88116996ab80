//! # WASM-volume library
//!
//! This crate serves the worker side of a medical-image viewer: a dedicated
//! background thread that runs image-processing commands against loaded
//! volumes through a WebAssembly module.

//!
//! The viewer hands a volume's raw voxel buffer and an opaque command
//! string (e.g. `-dehaze 5 -dog 2 3.2`) to the worker. The worker marshals
//! both into the processing module's linear memory, invokes the native
//! routine with the volume geometry, and returns the transformed buffer as
//! a typed result the viewer can apply in place or add as an overlay layer.
//! Supported voxel scalar types:
//!  - 8-bit unsigned
//!  - 16-bit signed
//!  - 16-bit unsigned
//!  - 32-bit float
//!
//!  Every request yields exactly one reply, success or typed failure, and
//!  the source volume is never changed unless a successful result is
//!  applied. The module is fetched and instantiated once per worker
//!  lifetime, on the first request.
//!
//!  Contributions are highly welcome!
//!
//! # Roadmap
//!
//!  - Pipelined requests with reply correlation by id
//!  - Float64 voxel support
//!  - Progress callbacks from long-running commands
//!
//! # Examples
//!
//! ## Processing a volume on the worker thread
//!
//! Spawn the worker, send one command for a float32 volume, and replace the
//! volume's data with the processed result.
//!
//! ```no_run
//! # use wasm_volume::enums::DataType;
//! # use wasm_volume::volume::{ImageMetadata, Volume, VoxelData};
//! # use wasm_volume::wasm_processor::ProcessorConfig;
//! # use wasm_volume::worker::ImageWorker;
//! # async fn demo() {
//! let metadata = ImageMetadata {
//!     id: "volume-0".to_owned(),
//!     datatype_code: DataType::Float32.code(),
//!     nx: 4,
//!     ny: 4,
//!     nz: 4,
//!     nt: 1,
//!     dx: 1.0,
//!     dy: 1.0,
//!     dz: 1.0,
//!     dt: 0.0,
//!     bpv: 4,
//! };
//! let mut volume = Volume::new(metadata, VoxelData::Float32(vec![0.0; 64]));
//!
//! let mut worker = ImageWorker::spawn(ProcessorConfig::default());
//! let result = worker
//!     .process(volume.to_request("-dehaze 5 -dog 2 3.2", false))
//!     .await
//!     .expect("should have processed the volume");
//! volume
//!     .replace_data(result)
//!     .expect("result should belong to the volume");
//! # }
//! ```

pub mod enums;
pub mod memory;
pub mod module_loader;
pub mod volume;
pub mod wasm_processor;
pub mod worker;
