use crate::enums::DataType;
use crate::memory::{LinearMemory, MemoryConfig, MemoryError};
use crate::module_loader::{HostState, LoadedModule, ModuleLoadError, ModuleLoader, reserve};
use crate::volume::{CommandRequest, CommandResult, VoxelData};

use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};
use wasmtime::{Engine, Store};

/// Configuration of the processing pipeline.
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    /// Location of the compiled image-processing module.
    pub wasm_path: PathBuf,
    pub memory: MemoryConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            wasm_path: PathBuf::from("assets/process-image.wasm"),
            memory: MemoryConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    ModuleLoad(#[from] ModuleLoadError),

    #[error("unsupported datatype code {0}")]
    UnsupportedDataType(i32),

    #[error("metadata claims {bpv} bytes per voxel, datatype {datatype:?} has {expected}")]
    MetadataMismatch {
        datatype: DataType,
        bpv: u32,
        expected: u32,
    },

    #[error("buffer holds {actual} bytes, metadata describes {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("command {command:?} failed with status {status}")]
    CommandFailed { status: i32, command: String },

    #[error("native routine trapped: {0}")]
    Execution(wasmtime::Error),
}

/// Snapshot of the allocator bookkeeping, for diagnostics only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationStats {
    pub allocations: u64,
    pub frees: u64,
    pub live: usize,
}

/// The worker-side pipeline: one lazily instantiated module plus the shared
/// linear memory, processing one command at a time.
pub struct WasmProcessor {
    engine: Engine,
    store: Store<HostState>,
    loader: ModuleLoader,
    module: Option<LoadedModule>,
}

impl WasmProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        let engine = Engine::default();
        let store = Store::new(
            &engine,
            HostState {
                allocator: LinearMemory::new(&config.memory),
            },
        );
        Self {
            loader: ModuleLoader::new(config.wasm_path, config.memory),
            engine,
            store,
            module: None,
        }
    }

    /// Load and instantiate the module on first use.
    ///
    /// Idempotent: later calls return without touching the filesystem. A
    /// failed load caches nothing, so the next call retries the fetch.
    ///
    /// # Errors
    ///
    /// [`ModuleLoadError`] from the fetch, compilation, instantiation or
    /// export validation.
    pub fn ensure_loaded(&mut self) -> Result<(), ProcessorError> {
        self.loaded().map(|_| ())
    }

    fn loaded(&mut self) -> Result<LoadedModule, ProcessorError> {
        if let Some(module) = &self.module {
            return Ok(module.clone());
        }
        let loaded = self.loader.load(&self.engine, &mut self.store)?;
        self.module = Some(loaded.clone());
        Ok(loaded)
    }

    /// Run one image command: marshal the command string and voxel buffer
    /// into the module's linear memory, invoke the native routine, and copy
    /// the transformed buffer back out.
    ///
    /// # Errors
    ///
    /// Unknown datatype codes, metadata violations and load failures are
    /// rejected before any allocation. A non-zero native status aborts the
    /// command without reading the image region. Whatever the outcome, every
    /// region the invocation reserved is released before this returns.
    pub fn process(&mut self, request: CommandRequest) -> Result<CommandResult, ProcessorError> {
        let datatype = validate(&request)?;
        let module = self.loaded()?;

        let mut regions: Vec<u32> = Vec::with_capacity(2);
        let outcome = self.execute(&module, datatype, &request, &mut regions);

        // Reconcile every region this invocation acquired, on success and on
        // every error path alike.
        for ptr in regions {
            if let Err(err) = self.store.data_mut().allocator.free(ptr) {
                warn!(ptr, error = %err, "region was not reconciled cleanly");
            }
        }

        match &outcome {
            Ok(_) => {
                debug!(id = %request.metadata.id, command = %request.command, "image processed");
            }
            Err(err) => {
                warn!(id = %request.metadata.id, error = %err, "image processing failed");
            }
        }
        outcome
    }

    fn execute(
        &mut self,
        module: &LoadedModule,
        datatype: DataType,
        request: &CommandRequest,
        regions: &mut Vec<u32>,
    ) -> Result<CommandResult, ProcessorError> {
        let metadata = &request.metadata;

        // Command region: UTF-8 bytes plus a NUL terminator.
        let cmd_len = request.command.len();
        let cmd_ptr = reserve(&mut self.store, module.memory, cmd_len as u64 + 1)?;
        regions.push(cmd_ptr);
        {
            let data = module.memory.data_mut(&mut self.store);
            let start = cmd_ptr as usize;
            data[start..start + cmd_len].copy_from_slice(request.command.as_bytes());
            data[start + cmd_len] = 0;
        }

        // Image region: the input buffer verbatim.
        let img_size = metadata.buffer_bytes();
        let img_ptr = reserve(&mut self.store, module.memory, img_size)?;
        regions.push(img_ptr);
        {
            let data = module.memory.data_mut(&mut self.store);
            let start = img_ptr as usize;
            data[start..start + request.image_bytes.len()].copy_from_slice(&request.image_bytes);
        }

        let status = module
            .process
            .call(
                &mut self.store,
                (
                    img_ptr,
                    datatype.code(),
                    metadata.nx as i32,
                    metadata.ny as i32,
                    metadata.nz as i32,
                    metadata.nt as i32,
                    f64::from(metadata.dx),
                    f64::from(metadata.dy),
                    f64::from(metadata.dz),
                    f64::from(metadata.dt),
                    cmd_ptr,
                ),
            )
            .map_err(ProcessorError::Execution)?;
        if status != 0 {
            // The image region's contents are undefined after a failure; it
            // is released without being read.
            return Err(ProcessorError::CommandFailed {
                status,
                command: request.command.clone(),
            });
        }

        // Copy the result out before the region is released; module memory is
        // never exposed by reference.
        let data = module.memory.data(&self.store);
        let start = img_ptr as usize;
        let bytes = &data[start..start + img_size as usize];
        Ok(CommandResult {
            id: metadata.id.clone(),
            data: VoxelData::from_bytes(datatype, bytes),
            command: request.command.clone(),
            is_new_layer: request.is_new_layer,
        })
    }

    pub fn allocation_stats(&self) -> AllocationStats {
        let allocator = &self.store.data().allocator;
        AllocationStats {
            allocations: allocator.alloc_calls(),
            frees: allocator.free_calls(),
            live: allocator.live_allocations().len(),
        }
    }
}

fn validate(request: &CommandRequest) -> Result<DataType, ProcessorError> {
    let metadata = &request.metadata;
    let datatype = DataType::from_code(metadata.datatype_code)
        .ok_or(ProcessorError::UnsupportedDataType(metadata.datatype_code))?;
    if metadata.bpv != datatype.bytes_per_voxel() {
        return Err(ProcessorError::MetadataMismatch {
            datatype,
            bpv: metadata.bpv,
            expected: datatype.bytes_per_voxel(),
        });
    }
    let expected = metadata.buffer_bytes();
    if request.image_bytes.len() as u64 != expected {
        return Err(ProcessorError::SizeMismatch {
            expected,
            actual: request.image_bytes.len() as u64,
        });
    }
    Ok(datatype)
}
