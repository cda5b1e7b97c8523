use crate::{Pa, Va};

/// An error that can occur when working with the shadow paging cache.
#[derive(thiserror::Error, Debug)]
pub enum ShadowError {
    /// The virtual address is not in canonical form.
    #[error("Invalid virtual address {0}")]
    InvalidVirtualAddress(Va),

    /// The page is already resident.
    #[error("Page {0} is already mapped")]
    AlreadyMapped(Va),

    /// Host memory for the page table arena could not be reserved.
    #[error("Failed to reserve host memory")]
    AllocationFailure(#[source] std::io::Error),

    /// The page table arena ran out of tables.
    #[error("Page table arena exhausted")]
    AllocationExhausted,

    /// Binding or unbinding guest memory failed.
    #[error("Host mapping failed at {pa}")]
    HostMappingFailure {
        /// The guest physical address of the failed binding.
        pa: Pa,

        /// The underlying platform error.
        #[source]
        source: Box<dyn std::error::Error>,
    },

    /// No resident page could be selected for eviction.
    #[error("No page can be evicted")]
    EvictionImpossible,

    /// The pager has been shut down.
    #[error("Shadow pager is not initialized")]
    NotInitialized,

    /// A page table entry points outside of the page table arena.
    #[error("Page table entry points outside of the arena ({0})")]
    CorruptHierarchy(Pa),

    /// An error reported by the guest memory bridge.
    #[error(transparent)]
    Bridge(Box<dyn std::error::Error>),

    /// Other error.
    #[error("{0}")]
    Other(&'static str),
}

impl ShadowError {
    /// Creates a new bridge error.
    pub fn bridge(err: impl std::error::Error + 'static) -> Self {
        Self::Bridge(Box::new(err))
    }

    /// Wraps an error returned by the guest memory bridge into a
    /// [`HostMappingFailure`].
    ///
    /// Errors that already are host mapping failures are returned unchanged.
    ///
    /// [`HostMappingFailure`]: Self::HostMappingFailure
    pub fn host_mapping(pa: Pa, err: Self) -> Self {
        match err {
            Self::HostMappingFailure { .. } => err,
            Self::Bridge(source) => Self::HostMappingFailure { pa, source },
            other => Self::HostMappingFailure {
                pa,
                source: Box::new(other),
            },
        }
    }
}
