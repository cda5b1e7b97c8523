//! Table walker.

use shadowpg_arch_amd64::{
    Amd64, PageTableEntry, PageTableFlags, PageTableLevel, TranslationEntries, TranslationEntry,
    VaIndexes, VaTranslation,
};
use shadowpg_core::{Pa, ShadowError, Va};

use crate::arena::{ROOT_TABLE, TableArena};

/// Returns the child table referenced by `parent[index]`, creating and
/// linking a fresh one if the entry is empty.
///
/// New children are linked with present, writable and user flags.
///
/// # Errors
///
/// - [`ShadowError::AllocationExhausted`] if a new table is needed but the
///   arena is full.
/// - [`ShadowError::CorruptHierarchy`] if the existing entry does not point
///   to a table of the arena.
/// - [`ShadowError::Other`] if `index` is not a valid entry index.
pub fn descend(arena: &mut TableArena, parent: usize, index: usize) -> Result<usize, ShadowError> {
    let entry = *arena
        .table(parent)?
        .entries
        .get(index)
        .ok_or(ShadowError::Other("page table entry index out of range"))?;

    if !entry.is_empty() {
        return arena
            .table_index(entry.pa())
            .ok_or(ShadowError::CorruptHierarchy(entry.pa()));
    }

    let child = arena.allocate()?;
    let child_pa = arena.table_pa(child);
    arena.table_mut(parent)?.entries[index] = PageTableEntry::new(child_pa, PageTableFlags::SHADOW);

    tracing::trace!(parent, index, child, %child_pa, "linked page table");
    Ok(child)
}

/// Walks from the root down to the page table covering `indexes`, creating
/// the missing levels on the way.
///
/// Returns the arena index of the leaf page table.
pub fn descend_to_leaf(arena: &mut TableArena, indexes: &VaIndexes) -> Result<usize, ShadowError> {
    let mut table = ROOT_TABLE;

    for level in [PageTableLevel::Pml4, PageTableLevel::Pdpt, PageTableLevel::Pd] {
        table = descend(arena, table, indexes.index(level))?;
    }

    Ok(table)
}

/// Walks the shadow hierarchy without modifying it.
///
/// The walk stops at the first entry that is not present or that does not
/// point back into the arena; such walks produce no physical address.
pub fn translation(arena: &TableArena, va: Va) -> VaTranslation {
    let mut entries = TranslationEntries::new();

    let Ok(indexes) = VaIndexes::new(va) else {
        return VaTranslation::new(entries, None);
    };

    let mut table = ROOT_TABLE;

    for level in PageTableLevel::WALK_ORDER {
        let Ok(page_table) = arena.table(table) else {
            return VaTranslation::new(entries, None);
        };

        let index = indexes.index(level);
        let entry = page_table.entries[index];

        entries.push(TranslationEntry {
            level,
            entry,
            entry_address: arena.table_pa(table) + (index * size_of::<PageTableEntry>()) as u64,
        });

        if !entry.present() {
            return VaTranslation::new(entries, None);
        }

        if level == PageTableLevel::Pt {
            let pa = entry.pa() + Amd64::va_offset(va);
            return VaTranslation::new(entries, Some(pa));
        }

        match arena.table_index(entry.pa()) {
            Some(next) => table = next,
            None => return VaTranslation::new(entries, None),
        }
    }

    VaTranslation::new(entries, None)
}

/// Translates `va` through the shadow hierarchy.
pub fn translate(arena: &TableArena, va: Va) -> Option<Pa> {
    translation(arena, va).pa()
}

#[cfg(test)]
#[path = "walker_tests.rs"]
mod tests;
