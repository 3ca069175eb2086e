use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;

/// Opens a file in append mode, creating parent directories when missing.
pub fn open_file_for_append(path: impl AsRef<Path>) -> io::Result<File> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    OpenOptions::new().create(true).append(true).open(path)
}
