#[allow(dead_code)]
pub mod file_io;

#[allow(dead_code)]
pub mod time;
