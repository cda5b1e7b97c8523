//! Core shadow paging types.
//!
//! This crate holds the vocabulary shared by the rest of the workspace: the
//! guest and host address types, the [`ShadowError`] type, the
//! [`GuestMemoryBridge`] trait through which the virtualization platform is
//! driven, and the [`PagingConfig`].

mod bridge;
mod core;
mod error;

pub use self::{
    bridge::GuestMemoryBridge,
    core::{Gfn, Hva, Pa, PagingConfig, Va},
    error::ShadowError,
};
