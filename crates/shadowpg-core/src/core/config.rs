use serde::{Deserialize, Serialize};

use crate::Pa;

/// Configuration of a shadow pager.
///
/// The configuration is fixed when the pager is initialized and cannot be
/// changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// The maximum number of resident guest pages.
    pub capacity: usize,

    /// The guest physical address at which the page table arena is mapped.
    ///
    /// The backing slots of the resident pages follow immediately after the
    /// arena.
    pub page_table_base: Pa,
}

impl PagingConfig {
    /// Default number of resident pages.
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Default guest physical base of the page table arena.
    pub const DEFAULT_PAGE_TABLE_BASE: Pa = Pa(0x1000_0000);

    /// Creates a new configuration with the given capacity and the default
    /// page table base.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Sets the guest physical base of the page table arena.
    pub fn with_page_table_base(self, page_table_base: impl Into<Pa>) -> Self {
        Self {
            page_table_base: page_table_base.into(),
            ..self
        }
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            page_table_base: Self::DEFAULT_PAGE_TABLE_BASE,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
