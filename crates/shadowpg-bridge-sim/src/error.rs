use shadowpg_core::{Pa, Va};

/// Error type for the simulated platform.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The range is not page aligned.
    #[error("Unaligned range {pa} (size: {size:#x})")]
    Unaligned {
        /// Start of the range.
        pa: Pa,

        /// Size of the range in bytes.
        size: u64,
    },

    /// The range overlaps an existing binding.
    #[error("Range {pa} (size: {size:#x}) overlaps binding at {existing}")]
    Overlap {
        /// Start of the range.
        pa: Pa,

        /// Size of the range in bytes.
        size: u64,

        /// Start of the existing binding.
        existing: Pa,
    },

    /// No binding starts at the address, or its size differs.
    #[error("No binding at {0}")]
    NotMapped(Pa),

    /// The guest walk hit a non-present entry.
    #[error("Page not present ({0})")]
    PageFault(Va),

    /// A failure requested by the test harness.
    #[error("Injected failure at {0}")]
    Injected(Pa),
}

impl From<Error> for shadowpg_core::ShadowError {
    fn from(value: Error) -> Self {
        Self::bridge(value)
    }
}
