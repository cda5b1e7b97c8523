use shadowpg_arch_amd64::{
    Amd64, PageTableEntry, PageTableFlags, PageTableLevel, VaIndexes, VaTranslation,
};
use shadowpg_core::{GuestMemoryBridge, Hva, Pa, PagingConfig, ShadowError, Va};

use crate::{
    ResidentEntry,
    arena::{self, TableArena},
    cache::EvictionCache,
    walker,
};

/// Shadow pager.
///
/// Keeps at most [`capacity`] guest virtual pages resident and maintains the
/// four-level page table hierarchy that resolves them to their backing slots.
///
/// # Layout
///
/// ```text
/// page_table_base                      pool base
/// |                                    |
/// v                                    v
/// +------+------+-----+----------------+--------+--------+-----+
/// | PML4 | tbl1 | ... | tbl(3N)        | slot 0 | slot 1 | ... |
/// +------+------+-----+----------------+--------+--------+-----+
/// ```
///
/// The arena is bound to the guest as one block when the pager is
/// initialized. Each slot is bound individually while it holds a page. The
/// host memory bound to a slot is the page itself: the guest and the host
/// share the same virtual layout, so the host address of a resident page is
/// numerically equal to its guest virtual address.
///
/// # Concurrency
///
/// All operations take `&mut self` and run to completion. The caller must
/// serialize faults; re-entering the pager from within a bridge call is not
/// supported.
///
/// [`capacity`]: Self::capacity
pub struct ShadowPager<Bridge>
where
    Bridge: GuestMemoryBridge,
{
    bridge: Bridge,
    config: PagingConfig,
    arena: TableArena,
    cache: EvictionCache,
}

impl<Bridge> ShadowPager<Bridge>
where
    Bridge: GuestMemoryBridge,
{
    /// Creates the page table arena, binds it to the guest and prepares an
    /// empty resident set.
    ///
    /// The root table is valid on return, so the guest can be pointed at
    /// [`root`] right away.
    ///
    /// # Errors
    ///
    /// - [`ShadowError::AllocationFailure`] if the host memory cannot be
    ///   reserved.
    /// - [`ShadowError::HostMappingFailure`] if the arena cannot be bound,
    ///   for example because another pager already occupies the same guest
    ///   physical range.
    /// - [`ShadowError::Other`] if the arena and the slot pool would extend
    ///   past the addresses a page table entry can hold.
    ///
    /// [`root`]: Self::root
    pub fn initialize(bridge: Bridge, config: PagingConfig) -> Result<Self, ShadowError> {
        let tables = arena::tables_for_capacity(config.capacity).ok_or_else(|| {
            ShadowError::AllocationFailure(std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                "capacity too large",
            ))
        })?;

        Self::initialize_with_tables(bridge, config, tables)
    }

    pub(crate) fn initialize_with_tables(
        mut bridge: Bridge,
        config: PagingConfig,
        tables: usize,
    ) -> Result<Self, ShadowError> {
        // The slot pool follows the arena and must stay reachable as well.
        let pages = tables.checked_add(config.capacity);
        if !pages.is_some_and(|pages| arena::is_addressable(config.page_table_base, pages)) {
            return Err(ShadowError::Other("slot pool is out of physical range"));
        }

        let arena = TableArena::create(&mut bridge, config.page_table_base, tables)?;
        let cache = EvictionCache::new(arena.end(), config.capacity);

        let mut pager = Self {
            bridge,
            config,
            arena,
            cache,
        };

        pager.rebuild_all()?;

        tracing::debug!(
            capacity = config.capacity,
            root = %pager.root(),
            pool = %pager.arena.end(),
            "shadow pager initialized"
        );

        Ok(pager)
    }

    /// Unbinds every resident page and the page table arena, and releases
    /// the host memory.
    ///
    /// Calling this more than once does nothing. Subsequent calls to
    /// [`add_paged_virtual_address`] fail with
    /// [`ShadowError::NotInitialized`].
    ///
    /// [`add_paged_virtual_address`]: Self::add_paged_virtual_address
    pub fn shutdown(&mut self) {
        if !self.arena.is_allocated() {
            return;
        }

        let resident = self.cache.iter().map(|(slot, _)| slot).collect::<Vec<_>>();
        for slot in resident {
            let entry = self.cache.release(slot);

            if let Err(err) = self.bridge.unmap_guest_memory(entry.pa, Amd64::PAGE_SIZE) {
                tracing::warn!(va = %entry.va, pa = %entry.pa, %err, "failed to unbind page");
            }
        }

        self.arena.destroy(&mut self.bridge);
        self.bridge.flush_translation_cache();

        tracing::debug!("shadow pager shut down");
    }

    /// Makes the page containing `va` resident.
    ///
    /// If every slot is occupied, the page that was added first among the
    /// resident pages is evicted to make room.
    ///
    /// # Errors
    ///
    /// - [`ShadowError::InvalidVirtualAddress`] if `va` is not canonical.
    /// - [`ShadowError::AlreadyMapped`] if the page is already resident.
    ///   Nothing is modified in that case.
    /// - [`ShadowError::EvictionImpossible`] if the pager has no slots.
    /// - [`ShadowError::HostMappingFailure`] if binding the new page or
    ///   unbinding the evicted page fails.
    /// - Any error of the hierarchy rebuild. The add is rolled back in that
    ///   case: the new page is unbound and its slot is freed.
    /// - [`ShadowError::NotInitialized`] after [`shutdown`].
    ///
    /// [`shutdown`]: Self::shutdown
    pub fn add_paged_virtual_address(&mut self, va: impl Into<Va>) -> Result<(), ShadowError> {
        let va = va.into();
        if !Amd64::is_canonical(va) {
            return Err(ShadowError::InvalidVirtualAddress(va));
        }

        if !self.arena.is_allocated() {
            return Err(ShadowError::NotInitialized);
        }

        let page = Amd64::va_align_down(va);
        if self.cache.find(page).is_some() {
            return Err(ShadowError::AlreadyMapped(page));
        }

        let (slot, evicted) = match self.cache.free_slot() {
            Some(slot) => (slot, false),
            None => (self.evict_oldest()?, true),
        };

        let pa = self.slot_pa(slot)?;
        if let Err(err) = self
            .bridge
            .map_guest_memory(Hva(page.0), pa, Amd64::PAGE_SIZE)
        {
            tracing::error!(%page, %pa, slot, %err, "failed to bind page");

            // The evicted page is still linked in the hierarchy.
            if evicted && let Err(err) = self.rebuild_all() {
                tracing::error!(%err, "failed to rebuild page tables after eviction");
            }

            return Err(ShadowError::host_mapping(pa, err));
        }

        let creation_index = self.cache.occupy(slot, page);
        tracing::debug!(%page, %pa, slot, creation_index, "page resident");

        if let Err(err) = self.rebuild_all() {
            return Err(self.roll_back(slot, err));
        }

        Ok(())
    }

    /// Regenerates the whole hierarchy from the resident set and flushes
    /// the guest's translation cache.
    ///
    /// A failure leaves the hierarchy partially rebuilt.
    pub fn rebuild_all(&mut self) -> Result<(), ShadowError> {
        self.arena.reset()?;

        for (slot, entry) in self.cache.iter() {
            let indexes = VaIndexes::new(entry.va)?;
            let pt = walker::descend_to_leaf(&mut self.arena, &indexes)?;

            self.arena.table_mut(pt)?.entries[indexes.index(PageTableLevel::Pt)] =
                PageTableEntry::new(entry.pa, PageTableFlags::SHADOW);

            tracing::trace!(slot, va = %entry.va, pa = %entry.pa, pt, "mapped page");
        }

        self.bridge.flush_translation_cache();

        tracing::trace!(
            resident = self.cache.len(),
            tables = self.arena.tables_in_use(),
            "page tables rebuilt"
        );

        Ok(())
    }

    /// Returns the guest physical address of the root (PML4) table.
    ///
    /// This is the value the guest's `CR3` must point to.
    pub fn root(&self) -> Pa {
        self.arena.base()
    }

    /// Returns the configuration the pager was initialized with.
    pub fn config(&self) -> &PagingConfig {
        &self.config
    }

    /// Returns the maximum number of resident pages.
    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    /// Returns the number of resident pages.
    pub fn resident_count(&self) -> usize {
        self.cache.len()
    }

    /// Checks whether the page containing `va` is resident.
    pub fn is_resident(&self, va: impl Into<Va>) -> bool {
        self.cache
            .find(Amd64::va_align_down(va.into()))
            .is_some()
    }

    /// Iterates over the resident pages, in slot order.
    pub fn resident(&self) -> impl Iterator<Item = (usize, &ResidentEntry)> {
        self.cache.iter()
    }

    /// Returns the slot at `slot`, whether in use or not.
    pub fn slot(&self, slot: usize) -> Option<&ResidentEntry> {
        self.cache.entry(slot)
    }

    /// Returns the creation index the next resident page will receive.
    pub fn next_creation_index(&self) -> u64 {
        self.cache.next_creation_index()
    }

    /// Returns the number of arena tables used by the current hierarchy,
    /// including the root.
    pub fn tables_in_use(&self) -> usize {
        self.arena.tables_in_use()
    }

    /// Walks the shadow hierarchy for `va`.
    pub fn translation(&self, va: impl Into<Va>) -> VaTranslation {
        walker::translation(&self.arena, va.into())
    }

    /// Translates `va` through the shadow hierarchy.
    pub fn translate(&self, va: impl Into<Va>) -> Option<Pa> {
        walker::translate(&self.arena, va.into())
    }

    /// Returns the guest memory bridge.
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Returns the guest memory bridge.
    pub fn bridge_mut(&mut self) -> &mut Bridge {
        &mut self.bridge
    }

    /// Dumps the resident set.
    pub fn dump(&self) {
        tracing::info!(
            root = %self.root(),
            resident = self.cache.len(),
            capacity = self.cache.capacity(),
            tables = self.arena.tables_in_use(),
            next_creation_index = self.cache.next_creation_index(),
            "shadow pager"
        );

        for (slot, entry) in self.cache.iter() {
            tracing::info!(
                slot,
                va = %entry.va,
                pa = %entry.pa,
                creation_index = entry.creation_index,
                "  resident"
            );
        }
    }

    fn slot_pa(&self, slot: usize) -> Result<Pa, ShadowError> {
        self.cache
            .entry(slot)
            .map(|entry| entry.pa)
            .ok_or(ShadowError::Other("slot out of range"))
    }

    /// Unbinds the oldest resident page and returns its slot, now free.
    fn evict_oldest(&mut self) -> Result<usize, ShadowError> {
        let slot = self.cache.oldest().ok_or(ShadowError::EvictionImpossible)?;
        let pa = self.slot_pa(slot)?;

        self.bridge
            .unmap_guest_memory(pa, Amd64::PAGE_SIZE)
            .map_err(|err| ShadowError::host_mapping(pa, err))?;

        let evicted = self.cache.release(slot);
        tracing::debug!(
            va = %evicted.va,
            %pa,
            slot,
            creation_index = evicted.creation_index,
            "page evicted"
        );

        Ok(slot)
    }

    /// Undoes a successful bind after the rebuild failed, and regenerates
    /// the hierarchy for the remaining pages.
    fn roll_back(&mut self, slot: usize, err: ShadowError) -> ShadowError {
        let entry = self.cache.release(slot);
        tracing::error!(va = %entry.va, pa = %entry.pa, slot, %err, "rebuild failed, rolling back");

        if let Err(err) = self.bridge.unmap_guest_memory(entry.pa, Amd64::PAGE_SIZE) {
            tracing::error!(va = %entry.va, pa = %entry.pa, %err, "failed to unbind page");
        }

        if let Err(err) = self.rebuild_all() {
            tracing::error!(%err, "failed to rebuild page tables after rollback");
        }

        err
    }
}

impl<Bridge> Drop for ShadowPager<Bridge>
where
    Bridge: GuestMemoryBridge,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "pager_tests.rs"]
mod tests;
