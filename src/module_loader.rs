use crate::memory::{LinearMemory, MemoryConfig, MemoryError};

use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};
use wasmtime::{
    AsContextMut, Caller, Engine, Linker, Memory, MemoryType, Module, Store, TypedFunc,
};

pub(crate) const EXPORT_ALLOC: &str = "walloc";
pub(crate) const EXPORT_FREE: &str = "wfree";
pub(crate) const EXPORT_PROCESS: &str = "process";

/// Host state reachable from the environment imports.
pub(crate) struct HostState {
    pub(crate) allocator: LinearMemory,
}

#[derive(Debug, Error)]
pub enum ModuleLoadError {
    #[error("failed to read module from {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("module did not compile: {0}")]
    Compile(wasmtime::Error),

    #[error("environment setup failed: {0}")]
    Environment(wasmtime::Error),

    #[error("module instantiation failed: {0}")]
    Instantiate(wasmtime::Error),

    #[error("module is missing required export `{0}`")]
    MissingExport(&'static str),
}

/// Signature of the native processing entry point:
/// `process(img, datatype, nx, ny, nz, nt, dx, dy, dz, dt, cmd) -> status`.
pub(crate) type ProcessFn =
    TypedFunc<(u32, i32, i32, i32, i32, i32, f64, f64, f64, f64, u32), i32>;

/// A ready-to-call module handle, cached for the worker's lifetime.
#[derive(Clone)]
pub(crate) struct LoadedModule {
    pub(crate) memory: Memory,
    pub(crate) process: ProcessFn,
}

/// Fetches and instantiates the compiled image-processing module.
pub(crate) struct ModuleLoader {
    path: PathBuf,
    memory_config: MemoryConfig,
}

impl ModuleLoader {
    pub(crate) fn new(path: PathBuf, memory_config: MemoryConfig) -> Self {
        Self {
            path,
            memory_config,
        }
    }

    /// Read, compile and instantiate the module against the shared
    /// environment, then type-check the required exports.
    ///
    /// # Errors
    ///
    /// Any failure leaves no cached state behind; the next call starts the
    /// load from scratch.
    pub(crate) fn load(
        &self,
        engine: &Engine,
        store: &mut Store<HostState>,
    ) -> Result<LoadedModule, ModuleLoadError> {
        let bytes = fs::read(&self.path).map_err(|source| ModuleLoadError::Io {
            path: self.path.clone(),
            source,
        })?;
        let module = Module::new(engine, &bytes).map_err(ModuleLoadError::Compile)?;

        let memory_type = MemoryType::new(
            self.memory_config.initial_pages,
            Some(self.memory_config.maximum_pages),
        );
        let memory =
            Memory::new(&mut *store, memory_type).map_err(ModuleLoadError::Environment)?;

        let mut linker: Linker<HostState> = Linker::new(engine);
        linker
            .define(&mut *store, "env", "memory", memory)
            .map_err(ModuleLoadError::Environment)?;
        linker
            .func_wrap(
                "env",
                EXPORT_ALLOC,
                move |mut caller: Caller<'_, HostState>, size: u32| -> u32 {
                    match reserve(&mut caller, memory, u64::from(size)) {
                        Ok(ptr) => ptr,
                        Err(err) => {
                            warn!(size, error = %err, "module allocation request failed");
                            0
                        }
                    }
                },
            )
            .map_err(ModuleLoadError::Environment)?;
        linker
            .func_wrap(
                "env",
                EXPORT_FREE,
                |mut caller: Caller<'_, HostState>, ptr: u32| {
                    if let Err(err) = caller.data_mut().allocator.free(ptr) {
                        warn!(ptr, error = %err, "module released an unknown region");
                    }
                },
            )
            .map_err(ModuleLoadError::Environment)?;
        linker
            .func_wrap(
                "env",
                "wlog",
                move |caller: Caller<'_, HostState>, ptr: u32| {
                    let message = read_c_string(memory.data(&caller), ptr);
                    debug!(target: "wasm_volume::module", "{message}");
                },
            )
            .map_err(ModuleLoadError::Environment)?;

        let instance = linker
            .instantiate(&mut *store, &module)
            .map_err(ModuleLoadError::Instantiate)?;

        instance
            .get_typed_func::<u32, u32>(&mut *store, EXPORT_ALLOC)
            .map_err(|_| ModuleLoadError::MissingExport(EXPORT_ALLOC))?;
        instance
            .get_typed_func::<u32, ()>(&mut *store, EXPORT_FREE)
            .map_err(|_| ModuleLoadError::MissingExport(EXPORT_FREE))?;
        let process: ProcessFn = instance
            .get_typed_func(&mut *store, EXPORT_PROCESS)
            .map_err(|_| ModuleLoadError::MissingExport(EXPORT_PROCESS))?;

        debug!(path = %self.path.display(), "image-processing module instantiated");
        Ok(LoadedModule { memory, process })
    }
}

/// Reserve bytes in the shared linear memory, growing the wasm memory when
/// the allocator asks for it.
pub(crate) fn reserve(
    mut ctx: impl AsContextMut<Data = HostState>,
    memory: Memory,
    size: u64,
) -> Result<u32, MemoryError> {
    let reservation = ctx.as_context_mut().data_mut().allocator.allocate(size)?;
    if reservation.grow_pages > 0 && memory.grow(&mut ctx, reservation.grow_pages).is_err() {
        // The engine refused the growth; roll the reservation back so the
        // bookkeeping stays balanced.
        let mut store_ctx = ctx.as_context_mut();
        let allocator = &mut store_ctx.data_mut().allocator;
        let maximum = allocator.maximum_bytes();
        let _ = allocator.free(reservation.ptr);
        return Err(MemoryError::OutOfMemory {
            requested: size,
            maximum,
        });
    }
    Ok(reservation.ptr)
}

fn read_c_string(data: &[u8], ptr: u32) -> String {
    let tail = &data[(ptr as usize).min(data.len())..];
    let end = tail.iter().position(|&byte| byte == 0).unwrap_or(tail.len());
    String::from_utf8_lossy(&tail[..end]).into_owned()
}
