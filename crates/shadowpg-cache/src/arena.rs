//! Page table arena.
//!
//! All paging structures of the shadow hierarchy live in a single block of
//! host memory that is bound to the guest at a fixed guest physical base.
//! Tables are handed out by index with a bump cursor and are never freed
//! individually; the cursor is rewound before each rebuild instead.

use memmap2::MmapMut;
use shadowpg_arch_amd64::{Amd64, PageTable};
use shadowpg_core::{GuestMemoryBridge, Hva, Pa, ShadowError};
use zerocopy::FromBytes;

/// Arena index of the root (PML4) table.
pub const ROOT_TABLE: usize = 0;

/// Number of tables needed for a cache of `capacity` resident pages.
///
/// In the worst case every resident page needs its own PDPT, PD and PT.
pub fn tables_for_capacity(capacity: usize) -> Option<usize> {
    capacity.checked_mul(3)?.checked_add(1)
}

/// Checks whether `pages` pages starting at `base` can be referenced by
/// page table entries.
///
/// The last page must end at or below the top of the 52-bit frame field.
pub fn is_addressable(base: Pa, pages: usize) -> bool {
    u64::try_from(pages)
        .ok()
        .and_then(|pages| pages.checked_mul(Amd64::PAGE_SIZE))
        .and_then(|size| base.0.checked_add(size))
        .is_some_and(|end| end <= Amd64::PFN_MASK + Amd64::PAGE_SIZE)
}

/// Bump allocator of page-table pages.
pub struct TableArena {
    memory: Option<MmapMut>,
    base: Pa,
    total_capacity: u32,
    next_free_index: u32,
}

impl TableArena {
    /// Reserves `total_tables` zeroed page-table pages and binds them to the
    /// guest at `base`.
    ///
    /// # Errors
    ///
    /// - [`ShadowError::AllocationFailure`] if the host memory cannot be
    ///   reserved.
    /// - [`ShadowError::HostMappingFailure`] if the bridge refuses the
    ///   binding. The reservation is released in that case.
    /// - [`ShadowError::Other`] if `base` is not page aligned, or if the
    ///   arena would extend past the addresses a page table entry can hold.
    pub fn create(
        bridge: &mut impl GuestMemoryBridge,
        base: Pa,
        total_tables: usize,
    ) -> Result<Self, ShadowError> {
        if Amd64::pa_offset(base) != 0 {
            return Err(ShadowError::Other("page table base is not page aligned"));
        }

        if total_tables == 0 {
            return Err(ShadowError::Other("page table arena needs a root table"));
        }

        if !is_addressable(base, total_tables) {
            return Err(ShadowError::Other("page table arena is out of physical range"));
        }

        let total_capacity = u32::try_from(total_tables).map_err(|_| oversized())?;
        let size = total_tables
            .checked_mul(Amd64::PAGE_SIZE as usize)
            .ok_or_else(oversized)?;

        let memory = MmapMut::map_anon(size).map_err(ShadowError::AllocationFailure)?;
        let host = Hva::from_ptr(memory.as_ptr());

        // Dropping `memory` on the error path releases the reservation.
        bridge
            .map_guest_memory(host, base, size as u64)
            .map_err(|err| ShadowError::host_mapping(base, err))?;

        tracing::debug!(%host, %base, tables = total_tables, "page table arena created");

        Ok(Self {
            memory: Some(memory),
            base,
            total_capacity,
            next_free_index: 1,
        })
    }

    /// Unbinds the arena from the guest and releases the host memory.
    ///
    /// Calling this on an already destroyed arena does nothing.
    pub fn destroy(&mut self, bridge: &mut impl GuestMemoryBridge) {
        let Some(memory) = self.memory.take() else {
            return;
        };

        if let Err(err) = bridge.unmap_guest_memory(self.base, memory.len() as u64) {
            tracing::warn!(base = %self.base, %err, "failed to unbind page table arena");
        }

        self.next_free_index = 1;
        tracing::debug!(base = %self.base, "page table arena destroyed");
    }

    /// Checks whether the arena still owns its host memory.
    pub fn is_allocated(&self) -> bool {
        self.memory.is_some()
    }

    /// Returns the guest physical address of the root table.
    pub fn base(&self) -> Pa {
        self.base
    }

    /// Returns the first guest physical address past the arena.
    pub fn end(&self) -> Pa {
        self.table_pa(self.total_capacity as usize)
    }

    /// Returns the number of tables the arena can hold.
    pub fn total_capacity(&self) -> usize {
        self.total_capacity as usize
    }

    /// Returns the number of tables handed out since the last reset,
    /// including the root.
    pub fn tables_in_use(&self) -> usize {
        self.next_free_index as usize
    }

    /// Clears the root table and rewinds the cursor so that the next
    /// allocation returns the first table after the root.
    pub fn reset(&mut self) -> Result<(), ShadowError> {
        self.table_mut(ROOT_TABLE)?.reset();
        self.next_free_index = 1;
        Ok(())
    }

    /// Hands out the next unused table, zero-filled.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::AllocationExhausted`] once every table of the
    /// arena is in use.
    pub fn allocate(&mut self) -> Result<usize, ShadowError> {
        if self.next_free_index >= self.total_capacity {
            return Err(ShadowError::AllocationExhausted);
        }

        let index = self.next_free_index as usize;
        self.next_free_index += 1;
        self.table_mut(index)?.reset();
        Ok(index)
    }

    /// Returns the table at `index`.
    pub fn table(&self, index: usize) -> Result<&PageTable, ShadowError> {
        self.tables()?
            .get(index)
            .ok_or(ShadowError::Other("page table index out of range"))
    }

    /// Returns the table at `index` for modification.
    pub fn table_mut(&mut self, index: usize) -> Result<&mut PageTable, ShadowError> {
        self.tables_mut()?
            .get_mut(index)
            .ok_or(ShadowError::Other("page table index out of range"))
    }

    /// Returns the guest physical address of the table at `index`.
    pub fn table_pa(&self, index: usize) -> Pa {
        self.base + index as u64 * Amd64::PAGE_SIZE
    }

    /// Returns the index of the table handed out at guest physical address
    /// `pa`, or `None` if `pa` is not the base of an allocated table.
    pub fn table_index(&self, pa: Pa) -> Option<usize> {
        let offset = pa.0.checked_sub(self.base.0)?;
        if offset % Amd64::PAGE_SIZE != 0 {
            return None;
        }

        let index = usize::try_from(offset / Amd64::PAGE_SIZE).ok()?;
        (index < self.tables_in_use()).then_some(index)
    }

    /// Returns the host address of the table at `index`.
    pub fn host_address(&self, index: usize) -> Option<Hva> {
        let memory = self.memory.as_ref()?;
        let offset = index.checked_mul(Amd64::PAGE_SIZE as usize)?;
        (offset < memory.len()).then(|| Hva::from_ptr(memory.as_ptr()) + offset as u64)
    }

    fn tables(&self) -> Result<&[PageTable], ShadowError> {
        let memory = self.memory.as_ref().ok_or(ShadowError::NotInitialized)?;
        <[PageTable]>::ref_from_bytes(&memory[..]).map_err(|_| misaligned())
    }

    fn tables_mut(&mut self) -> Result<&mut [PageTable], ShadowError> {
        let memory = self.memory.as_mut().ok_or(ShadowError::NotInitialized)?;
        <[PageTable]>::mut_from_bytes(&mut memory[..]).map_err(|_| misaligned())
    }
}

fn oversized() -> ShadowError {
    ShadowError::AllocationFailure(std::io::Error::new(
        std::io::ErrorKind::OutOfMemory,
        "page table arena size overflows",
    ))
}

fn misaligned() -> ShadowError {
    ShadowError::Other("page table arena is misaligned")
}

#[cfg(test)]
#[path = "arena_tests.rs"]
mod tests;
