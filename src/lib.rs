//! Shadow paging for hypervisor guests.
//!
//! A shadow pager keeps a bounded set of guest virtual pages resident and
//! synthesizes the x86-64 four-level page tables that make exactly those
//! pages visible to the guest. When the set is full, the page that was added
//! first is evicted.
//!
//! The crate is split into several smaller crates that are re-exported here:
//!
//! - [`shadowpg_core`]: address types, errors, configuration and the
//!   [`GuestMemoryBridge`] trait through which the pager talks to the
//!   hypervisor.
//! - [`arch::amd64`]: address decomposition and page table layout.
//! - [`cache`]: the page table arena, the table walker and the
//!   [`ShadowPager`](cache::ShadowPager) itself.
//! - [`bridge::sim`]: an in-process bridge for tests and demos.
//!
//! # Example
//!
//! ```no_run
//! use shadowpg::{
//!     PagingConfig, bridge::sim::SimulatedPlatform, cache::ShadowPager,
//! };
//!
//! # fn main() -> Result<(), shadowpg::ShadowError> {
//! let mut platform = SimulatedPlatform::new();
//! let mut pager = ShadowPager::initialize(&mut platform, PagingConfig::new(16))?;
//!
//! // Point the guest's CR3 at `pager.root()`, then on every fault:
//! pager.add_paged_virtual_address(0x7ff6_1234_5678)?;
//! # Ok(())
//! # }
//! ```

pub use shadowpg_core::*;

/// Architecture-specific definitions.
pub mod arch {
    /// x86-64.
    #[cfg(feature = "arch-amd64")]
    pub mod amd64 {
        pub use shadowpg_arch_amd64::*;
    }
}

/// Guest memory bridges.
pub mod bridge {
    /// In-process simulated platform.
    #[cfg(feature = "bridge-sim")]
    pub mod sim {
        pub use shadowpg_bridge_sim::*;
    }
}

/// Shadow page table cache.
#[cfg(feature = "cache")]
pub mod cache {
    pub use shadowpg_cache::*;
}
