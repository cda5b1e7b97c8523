use smallvec::SmallVec;

use crate::{PageTableEntry, PageTableLevel, Pa};

/// A single entry in the page table hierarchy during virtual address
/// translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationEntry {
    /// The level of the page table hierarchy this entry belongs to.
    pub level: PageTableLevel,

    /// The page table entry itself.
    pub entry: PageTableEntry,

    /// The guest physical address where this entry is located.
    pub entry_address: Pa,
}

/// Collection of translation entries, typically used in page table walks.
pub type TranslationEntries = SmallVec<[TranslationEntry; 4]>;

/// The result of a walk through the shadow hierarchy.
#[derive(Debug, Default)]
pub struct VaTranslation {
    entries: TranslationEntries,
    pa: Option<Pa>,
}

impl VaTranslation {
    /// Creates a translation from the visited entries and the resolved
    /// physical address.
    pub fn new(entries: TranslationEntries, pa: Option<Pa>) -> Self {
        Self { entries, pa }
    }

    /// Returns the page table entries traversed during the walk.
    pub fn entries(&self) -> &[TranslationEntry] {
        &self.entries
    }

    /// Returns the physical address resulting from the translation, if
    /// successful.
    pub fn pa(&self) -> Option<Pa> {
        self.pa
    }

    /// Checks if all entries in the translation path are present.
    pub fn present(&self) -> bool {
        self.entries.iter().all(|entry| entry.entry.present())
    }

    /// Checks if all entries in the translation path are writable.
    pub fn write(&self) -> bool {
        self.entries.iter().all(|entry| entry.entry.write())
    }

    /// Checks if all entries in the translation path are user accessible.
    pub fn user(&self) -> bool {
        self.entries.iter().all(|entry| entry.entry.user())
    }
}

impl IntoIterator for VaTranslation {
    type Item = TranslationEntry;
    type IntoIter = <TranslationEntries as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
