use super::macros::impl_address;

impl_address!(Gfn, u64, "Guest Frame Number");
impl_address!(Pa, u64, "Guest Physical Address");
impl_address!(Va, u64, "Guest Virtual Address");
impl_address!(Hva, u64, "Host Virtual Address");

impl Hva {
    /// Returns the host address of a pointer.
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as u64)
    }
}
