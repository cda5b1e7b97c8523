use crate::{Amd64, PageTableLevel, ShadowError, Va};

/// The table indexes and page offset of a canonical virtual address.
///
/// ```text
///  63        48 47    39 38    30 29    21 20    12 11         0
/// +------------+--------+--------+--------+--------+------------+
/// | sign ext.  |  PML4  |  PDPT  |   PD   |   PT   |   offset   |
/// +------------+--------+--------+--------+--------+------------+
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VaIndexes {
    /// Byte offset within the page.
    pub offset: u16,

    /// Index into the page table.
    pub pt: u16,

    /// Index into the page directory.
    pub pd: u16,

    /// Index into the page directory pointer table.
    pub pdpt: u16,

    /// Index into the PML4.
    pub pml4: u16,
}

impl VaIndexes {
    /// Decomposes a virtual address.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::InvalidVirtualAddress`] if the address is not
    /// canonical.
    pub fn new(va: Va) -> Result<Self, ShadowError> {
        if !Amd64::is_canonical(va) {
            return Err(ShadowError::InvalidVirtualAddress(va));
        }

        Ok(Self {
            offset: Amd64::va_offset(va) as u16,
            pt: Amd64::va_index_for(va, PageTableLevel::Pt) as u16,
            pd: Amd64::va_index_for(va, PageTableLevel::Pd) as u16,
            pdpt: Amd64::va_index_for(va, PageTableLevel::Pdpt) as u16,
            pml4: Amd64::va_index_for(va, PageTableLevel::Pml4) as u16,
        })
    }

    /// Returns the table index for the given level.
    pub fn index(&self, level: PageTableLevel) -> usize {
        let index = match level {
            PageTableLevel::Pt => self.pt,
            PageTableLevel::Pd => self.pd,
            PageTableLevel::Pdpt => self.pdpt,
            PageTableLevel::Pml4 => self.pml4,
        };

        usize::from(index)
    }

    /// Recomposes the canonical base address of the page.
    pub fn page_base(&self) -> Va {
        let va = PageTableLevel::WALK_ORDER
            .iter()
            .fold(0u64, |va, &level| va | ((self.index(level) as u64) << level.shift()));

        Amd64::va_sign_extend(Va(va))
    }

    /// Recomposes the full canonical virtual address, including the offset.
    pub fn va(&self) -> Va {
        self.page_base() + u64::from(self.offset)
    }
}

impl TryFrom<Va> for VaIndexes {
    type Error = ShadowError;

    fn try_from(va: Va) -> Result<Self, Self::Error> {
        Self::new(va)
    }
}

#[cfg(test)]
#[path = "indexes_tests.rs"]
mod tests;
