mod builder;
mod engine;

pub use builder::*;
pub use engine::*;

#[cfg(test)]
mod builder_test;
