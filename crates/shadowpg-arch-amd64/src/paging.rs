use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::{Amd64, Gfn, Pa};

bitflags::bitflags! {
    /// Page table entry flags understood by the shadow hierarchy.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageTableFlags: u64 {
        /// The entry is present.
        const PRESENT = 1 << 0;

        /// The mapped region is writable.
        const WRITABLE = 1 << 1;

        /// The mapped region is accessible from user mode.
        const USER = 1 << 2;

        /// Flags used for every entry of the shadow hierarchy.
        const SHADOW = Self::PRESENT.bits() | Self::WRITABLE.bits() | Self::USER.bits();
    }
}

/// The levels in the page table hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PageTableLevel {
    /// Page Table (PT) - the lowest level, pointing directly to 4KB pages.
    Pt,

    /// Page Directory (PD).
    Pd,

    /// Page Directory Pointer Table (PDPT).
    Pdpt,

    /// Page Map Level 4 (PML4) - the highest level in 4-level paging.
    Pml4,
}

impl PageTableLevel {
    /// All levels, from the root to the leaf.
    pub const WALK_ORDER: [Self; 4] = [Self::Pml4, Self::Pdpt, Self::Pd, Self::Pt];

    /// Returns the next lower level in the page table hierarchy.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pt => None,
            Self::Pd => Some(Self::Pt),
            Self::Pdpt => Some(Self::Pd),
            Self::Pml4 => Some(Self::Pdpt),
        }
    }

    /// Returns the bit position of the index of this level within a virtual
    /// address.
    pub fn shift(self) -> u64 {
        match self {
            Self::Pt => 12,
            Self::Pd => 21,
            Self::Pdpt => 30,
            Self::Pml4 => 39,
        }
    }
}

/// A page table entry in the paging structures.
#[repr(transparent)]
#[derive(Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct PageTableEntry(pub u64);

impl PageTableEntry {
    /// Creates an entry pointing to `pa` with the given flags.
    ///
    /// The page offset bits of `pa` are discarded.
    pub fn new(pa: Pa, flags: PageTableFlags) -> Self {
        Self((pa.0 & Amd64::PFN_MASK) | flags.bits())
    }

    /// Checks if the entry is empty (not present).
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Checks if the page is present in physical memory.
    pub fn present(self) -> bool {
        self.flags().contains(PageTableFlags::PRESENT)
    }

    /// Checks if the page is writable.
    pub fn write(self) -> bool {
        self.flags().contains(PageTableFlags::WRITABLE)
    }

    /// Checks if the page is accessible in user mode.
    pub fn user(self) -> bool {
        self.flags().contains(PageTableFlags::USER)
    }

    /// Returns the flags of the entry.
    pub fn flags(self) -> PageTableFlags {
        PageTableFlags::from_bits_truncate(self.0)
    }

    /// Extracts the page frame number from the entry.
    pub fn pfn(self) -> Gfn {
        Gfn((self.0 & Amd64::PFN_MASK) >> Amd64::PAGE_SHIFT)
    }

    /// Returns the physical address the entry points to.
    pub fn pa(self) -> Pa {
        Amd64::pa_from_gfn(self.pfn())
    }
}

impl std::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PageTableEntry")
            .field("present", &self.present())
            .field("write", &self.write())
            .field("user", &self.user())
            .field("pfn", &self.pfn())
            .finish()
    }
}

/// A single page-table page: 512 entries, 4KB aligned.
#[repr(C, align(4096))]
#[derive(Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct PageTable {
    /// The entries of the table.
    pub entries: [PageTableEntry; Amd64::ENTRIES_PER_TABLE],
}

impl PageTable {
    /// Clears all entries of the table.
    pub fn reset(&mut self) {
        self.entries.fill(PageTableEntry::default());
    }

    /// Returns the number of non-empty entries.
    pub fn present_entries(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.is_empty()).count()
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

impl std::fmt::Debug for PageTable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| !entry.is_empty()),
            )
            .finish()
    }
}
