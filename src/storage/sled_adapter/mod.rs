mod sled_shadow_store;

pub use sled_shadow_store::*;
