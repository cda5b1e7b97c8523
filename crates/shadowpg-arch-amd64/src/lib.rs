//! AMD64 paging definitions.

mod indexes;
mod paging;
mod translation;

use shadowpg_core::{Gfn, Pa, ShadowError, Va};

pub use self::{
    indexes::VaIndexes,
    paging::{PageTable, PageTableEntry, PageTableFlags, PageTableLevel},
    translation::{TranslationEntries, TranslationEntry, VaTranslation},
};

/// AMD64 architecture.
#[derive(Debug)]
pub struct Amd64;

impl Amd64 {
    /// The size of a page in bytes.
    pub const PAGE_SIZE: u64 = 0x1000;

    /// The shift value to convert a page number to a page address.
    pub const PAGE_SHIFT: u64 = 12;

    /// Mask selecting the page base of an address.
    pub const PAGE_MASK: u64 = 0xFFFFFFFFFFFFF000;

    /// Number of entries in a page-table page.
    pub const ENTRIES_PER_TABLE: usize = 512;

    /// Mask selecting the page frame bits (12..52) of a page table entry.
    pub const PFN_MASK: u64 = 0x000F_FFFF_FFFF_F000;

    /// Number of implemented linear address bits.
    const VA_BITS: u64 = 48;

    /// Converts a physical address to its frame number.
    pub fn gfn_from_pa(pa: Pa) -> Gfn {
        Gfn(pa.0 >> Self::PAGE_SHIFT)
    }

    /// Converts a frame number to its physical address.
    pub fn pa_from_gfn(gfn: Gfn) -> Pa {
        Pa(gfn.0 << Self::PAGE_SHIFT)
    }

    /// Returns the offset of a physical address within its page.
    pub fn pa_offset(pa: Pa) -> u64 {
        pa.0 & !Self::PAGE_MASK
    }

    /// Aligns a virtual address down to the base of its page.
    pub fn va_align_down(va: Va) -> Va {
        va & Self::PAGE_MASK
    }

    /// Returns the offset of a virtual address within its 4KB page.
    pub fn va_offset(va: Va) -> u64 {
        va.0 & !Self::PAGE_MASK
    }

    /// Returns the table index of a virtual address at the given level.
    pub fn va_index_for(va: Va, level: PageTableLevel) -> u64 {
        (va.0 >> level.shift()) & 0x1ff
    }

    /// Checks whether bits 63..48 of the address equal bit 47.
    pub fn is_canonical(va: Va) -> bool {
        let upper = va.0 >> (Self::VA_BITS - 1);
        upper == 0 || upper == (1 << (64 - Self::VA_BITS + 1)) - 1
    }

    /// Propagates bit 47 of the address into bits 63..48.
    pub fn va_sign_extend(va: Va) -> Va {
        const SHIFT: u64 = 64 - Amd64::VA_BITS;

        Va((((va.0 << SHIFT) as i64) >> SHIFT) as u64)
    }
}
