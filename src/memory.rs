use thiserror::Error;

/// Size of one WebAssembly linear-memory page.
pub const PAGE_SIZE: u64 = 65536;

/// All regions are aligned to the widest supported voxel scalar.
const ALIGN: u64 = 8;

/// The first page is reserved for the module's data segments and the null
/// address; no region is ever issued below it.
const HEAP_BASE: u64 = PAGE_SIZE;

/// Page limits of the linear memory backing the processing module.
#[derive(Clone, Copy, Debug)]
pub struct MemoryConfig {
    pub initial_pages: u32,
    pub maximum_pages: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            initial_pages: 256,
            maximum_pages: 2048,
        }
    }
}

impl MemoryConfig {
    pub fn initial_bytes(&self) -> u64 {
        u64::from(self.initial_pages) * PAGE_SIZE
    }

    pub fn maximum_bytes(&self) -> u64 {
        u64::from(self.maximum_pages) * PAGE_SIZE
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("allocation size must be non-zero")]
    ZeroSize,

    #[error("out of memory: {requested} bytes requested, {maximum} bytes maximum capacity")]
    OutOfMemory { requested: u64, maximum: u64 },

    #[error("pointer {0:#x} does not match a live allocation")]
    InvalidFree(u32),
}

/// One reserved region, identified by its byte offset into the linear memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationRecord {
    pub ptr: u32,
    pub size: u64,
}

/// A successful reservation. `grow_pages` is the number of pages the caller
/// must grow the backing wasm memory by before touching the region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reservation {
    pub ptr: u32,
    pub grow_pages: u64,
}

/// First-fit free-list allocator over a growable page-based region.
///
/// The allocator hands out byte offsets and tracks capacity; it never owns
/// the wasm memory itself. Callers apply the returned `grow_pages` to the
/// real `wasmtime::Memory`, which keeps this type unit-testable without a
/// module instance. The live-allocation log is bookkeeping for diagnostics
/// and free validation, not a safety mechanism.
#[derive(Debug)]
pub struct LinearMemory {
    capacity_bytes: u64,
    maximum_bytes: u64,
    head: u64,
    free_list: Vec<AllocationRecord>,
    live: Vec<AllocationRecord>,
    alloc_calls: u64,
    free_calls: u64,
}

impl LinearMemory {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            capacity_bytes: config.initial_bytes(),
            maximum_bytes: config.maximum_bytes(),
            head: HEAP_BASE,
            free_list: Vec::new(),
            live: Vec::new(),
            alloc_calls: 0,
            free_calls: 0,
        }
    }

    /// Reserve `size` bytes and return their offset.
    ///
    /// Released regions are recycled first-fit; otherwise the region is bump
    /// allocated past the current watermark, requesting page growth when the
    /// watermark passes the current capacity.
    ///
    /// # Errors
    ///
    /// `ZeroSize` for empty requests, `OutOfMemory` when the configured
    /// maximum capacity would be exceeded.
    pub fn allocate(&mut self, size: u64) -> Result<Reservation, MemoryError> {
        if size == 0 {
            return Err(MemoryError::ZeroSize);
        }
        let size = size
            .checked_next_multiple_of(ALIGN)
            .ok_or(MemoryError::OutOfMemory {
                requested: size,
                maximum: self.maximum_bytes,
            })?;

        if let Some(index) = self.free_list.iter().position(|region| region.size >= size) {
            let region = self.free_list.swap_remove(index);
            if region.size > size {
                // Recycled regions are split; the remainder stays reusable.
                self.free_list.push(AllocationRecord {
                    ptr: region.ptr + size as u32,
                    size: region.size - size,
                });
            }
            self.live.push(AllocationRecord {
                ptr: region.ptr,
                size,
            });
            self.alloc_calls += 1;
            return Ok(Reservation {
                ptr: region.ptr,
                grow_pages: 0,
            });
        }

        let ptr = self.head;
        let end = ptr
            .checked_add(size)
            .filter(|end| *end <= self.maximum_bytes)
            .ok_or(MemoryError::OutOfMemory {
                requested: size,
                maximum: self.maximum_bytes,
            })?;
        let grow_pages = if end > self.capacity_bytes {
            (end - self.capacity_bytes).div_ceil(PAGE_SIZE)
        } else {
            0
        };

        self.capacity_bytes += grow_pages * PAGE_SIZE;
        self.head = end;
        self.live.push(AllocationRecord {
            ptr: ptr as u32,
            size,
        });
        self.alloc_calls += 1;
        Ok(Reservation {
            ptr: ptr as u32,
            grow_pages,
        })
    }

    /// Release a region previously returned by [`allocate`](Self::allocate)
    /// and return its size.
    ///
    /// # Errors
    ///
    /// `InvalidFree` when `ptr` does not identify a live region (unknown
    /// pointer or double free).
    pub fn free(&mut self, ptr: u32) -> Result<u64, MemoryError> {
        let index = self
            .live
            .iter()
            .position(|record| record.ptr == ptr)
            .ok_or(MemoryError::InvalidFree(ptr))?;
        let record = self.live.remove(index);
        // Regions are recycled whole; adjacent free regions are not merged.
        self.free_list.push(record);
        self.free_calls += 1;
        Ok(record.size)
    }

    /// Live regions in allocation order.
    pub fn live_allocations(&self) -> &[AllocationRecord] {
        &self.live
    }

    /// Cumulative successful allocations.
    pub fn alloc_calls(&self) -> u64 {
        self.alloc_calls
    }

    /// Cumulative successful frees.
    pub fn free_calls(&self) -> u64 {
        self.free_calls
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    pub fn maximum_bytes(&self) -> u64 {
        self.maximum_bytes
    }
}
