//! Simulated virtualization platform.
//!
//! [`SimulatedPlatform`] implements [`GuestMemoryBridge`] entirely in
//! process. It records every binding of host memory into the guest physical
//! address space, rejects overlapping or misaligned bindings the way a real
//! platform would, counts translation cache flushes, and can inject failures
//! into the next bind or unbind call.
//!
//! Guest physical reads are resolved through the recorded bindings, which
//! allows walking a page table hierarchy the way the guest MMU would see it.

mod error;

use std::collections::BTreeMap;

use shadowpg_arch_amd64::{Amd64, PageTableEntry, PageTableLevel, VaIndexes};
use shadowpg_core::{GuestMemoryBridge, Hva, Pa, ShadowError, Va};

pub use self::error::Error;

/// A range of host memory bound into the guest physical address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// Start of the host memory.
    pub host: Hva,

    /// Start of the guest physical range.
    pub pa: Pa,

    /// Size of the range in bytes.
    pub size: u64,
}

impl Binding {
    /// Checks whether the binding covers `pa`.
    pub fn contains(&self, pa: Pa) -> bool {
        self.pa <= pa && pa.0 - self.pa.0 < self.size
    }

    fn overlaps(&self, pa: Pa, size: u64) -> bool {
        self.pa.0 < pa.0.saturating_add(size) && pa.0 < self.pa.0.saturating_add(self.size)
    }
}

/// In-process virtualization platform.
#[derive(Debug, Default)]
pub struct SimulatedPlatform {
    bindings: BTreeMap<Pa, Binding>,
    maps: usize,
    unmaps: usize,
    flushes: usize,
    fail_next_map: bool,
    fail_next_unmap: bool,
}

impl SimulatedPlatform {
    /// Creates a platform with an empty guest physical address space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current bindings, ordered by guest physical address.
    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    /// Returns the binding covering `pa`.
    pub fn binding(&self, pa: Pa) -> Option<&Binding> {
        self.bindings
            .range(..=pa)
            .next_back()
            .map(|(_, binding)| binding)
            .filter(|binding| binding.contains(pa))
    }

    /// Checks whether `pa` is backed by host memory.
    pub fn is_bound(&self, pa: Pa) -> bool {
        self.binding(pa).is_some()
    }

    /// Resolves `pa` to the host address backing it.
    pub fn host_address(&self, pa: Pa) -> Option<Hva> {
        self.binding(pa)
            .map(|binding| binding.host + (pa.0 - binding.pa.0))
    }

    /// Returns the number of successful bind calls.
    pub fn map_count(&self) -> usize {
        self.maps
    }

    /// Returns the number of successful unbind calls.
    pub fn unmap_count(&self) -> usize {
        self.unmaps
    }

    /// Returns the number of translation cache flushes.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Makes the next bind call fail.
    pub fn fail_next_map(&mut self) {
        self.fail_next_map = true;
    }

    /// Makes the next unbind call fail.
    pub fn fail_next_unmap(&mut self) {
        self.fail_next_unmap = true;
    }

    /// Reads a 64-bit value from guest physical memory.
    ///
    /// # Safety
    ///
    /// The host memory bound at `pa` must be live and readable. Bindings
    /// record plain addresses and do not keep the memory alive.
    pub unsafe fn read_u64(&self, pa: Pa) -> Result<u64, Error> {
        let host = self.host_address(pa).ok_or(Error::NotMapped(pa))?;

        // SAFETY: Guaranteed by the caller.
        Ok(unsafe { std::ptr::read_unaligned(host.0 as *const u64) })
    }

    /// Translates `va` the way the guest MMU would, starting at the root
    /// table `root` and reading every table through the bindings.
    ///
    /// # Safety
    ///
    /// The host memory bound behind every table on the walk must be live and
    /// readable. See [`read_u64`].
    ///
    /// [`read_u64`]: Self::read_u64
    pub unsafe fn translate(&self, root: Pa, va: Va) -> Result<Pa, Error> {
        let indexes = VaIndexes::new(va).map_err(|_| Error::PageFault(va))?;
        let mut table = root;

        for level in PageTableLevel::WALK_ORDER {
            let entry_pa = table + (indexes.index(level) * size_of::<PageTableEntry>()) as u64;

            // SAFETY: Guaranteed by the caller.
            let entry = PageTableEntry(unsafe { self.read_u64(entry_pa)? });

            if !entry.present() || !entry.write() || !entry.user() {
                return Err(Error::PageFault(va));
            }

            if level == PageTableLevel::Pt {
                return Ok(entry.pa() + Amd64::va_offset(va));
            }

            table = entry.pa();
        }

        Err(Error::PageFault(va))
    }

    fn check_aligned(pa: Pa, size: u64) -> Result<(), Error> {
        if Amd64::pa_offset(pa) != 0 || size == 0 || size % Amd64::PAGE_SIZE != 0 {
            return Err(Error::Unaligned { pa, size });
        }

        Ok(())
    }
}

impl GuestMemoryBridge for SimulatedPlatform {
    fn map_guest_memory(&mut self, host: Hva, pa: Pa, size: u64) -> Result<(), ShadowError> {
        if std::mem::take(&mut self.fail_next_map) {
            return Err(Error::Injected(pa).into());
        }

        Self::check_aligned(pa, size)?;

        if let Some(existing) = self.bindings().find(|binding| binding.overlaps(pa, size)) {
            return Err(Error::Overlap {
                pa,
                size,
                existing: existing.pa,
            }
            .into());
        }

        self.bindings.insert(pa, Binding { host, pa, size });
        self.maps += 1;

        tracing::trace!(%host, %pa, size, "bound");
        Ok(())
    }

    fn unmap_guest_memory(&mut self, pa: Pa, size: u64) -> Result<(), ShadowError> {
        if std::mem::take(&mut self.fail_next_unmap) {
            return Err(Error::Injected(pa).into());
        }

        match self.bindings.get(&pa) {
            Some(binding) if binding.size == size => {}
            _ => return Err(Error::NotMapped(pa).into()),
        }

        self.bindings.remove(&pa);
        self.unmaps += 1;

        tracing::trace!(%pa, size, "unbound");
        Ok(())
    }

    fn flush_translation_cache(&mut self) {
        self.flushes += 1;
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
