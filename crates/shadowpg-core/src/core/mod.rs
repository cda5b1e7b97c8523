mod address;
mod config;
pub(crate) mod macros;

pub use self::{
    address::{Gfn, Hva, Pa, Va},
    config::PagingConfig,
};
