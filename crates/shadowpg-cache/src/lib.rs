//! Shadow paging cache.
//!
//! A bounded set of resident guest virtual pages, each backed by a fixed
//! guest physical slot, together with the x86-64 four-level page table
//! hierarchy that resolves them. The hierarchy is synthesized by the host,
//! not by the guest operating system, and is regenerated from scratch every
//! time the resident set changes.
//!
//! The entry point is [`ShadowPager`]. The fault dispatcher calls
//! [`ShadowPager::add_paged_virtual_address`] with the faulting address; the
//! pager picks a slot (evicting the oldest resident page if necessary),
//! binds the page through the [`GuestMemoryBridge`], rebuilds the hierarchy
//! and flushes the guest's translation cache.
//!
//! [`GuestMemoryBridge`]: shadowpg_core::GuestMemoryBridge

pub mod arena;
mod cache;
mod pager;
pub mod walker;

pub use self::{
    cache::{EvictionCache, ResidentEntry},
    pager::ShadowPager,
};
