use crate::{Hva, Pa, ShadowError};

/// Boundary to the virtualization platform.
///
/// The bridge binds host-owned memory into the guest physical address space
/// and invalidates the guest's cached address translations. Every call is
/// blocking and either completes or returns a definitive failure.
///
/// Implementations are not required to be reentrant. The shadow pager calls
/// the bridge from a single thread of control and never while another call
/// is in flight.
pub trait GuestMemoryBridge {
    /// Binds `size` bytes of host memory starting at `host` to the guest
    /// physical address `pa`.
    fn map_guest_memory(&mut self, host: Hva, pa: Pa, size: u64) -> Result<(), ShadowError>;

    /// Removes the binding of `size` bytes at the guest physical address `pa`.
    fn unmap_guest_memory(&mut self, pa: Pa, size: u64) -> Result<(), ShadowError>;

    /// Invalidates all cached guest virtual-to-physical translations.
    fn flush_translation_cache(&mut self);
}

impl<T> GuestMemoryBridge for &mut T
where
    T: GuestMemoryBridge + ?Sized,
{
    fn map_guest_memory(&mut self, host: Hva, pa: Pa, size: u64) -> Result<(), ShadowError> {
        (**self).map_guest_memory(host, pa, size)
    }

    fn unmap_guest_memory(&mut self, pa: Pa, size: u64) -> Result<(), ShadowError> {
        (**self).unmap_guest_memory(pa, size)
    }

    fn flush_translation_cache(&mut self) {
        (**self).flush_translation_cache()
    }
}
