mod mem_shadow_store;

pub use mem_shadow_store::*;
