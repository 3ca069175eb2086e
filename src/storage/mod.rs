mod shadow_store;

pub mod adaptors;
mod sled_adapter;


use std::path::Path;

#[doc(hidden)]
pub use adaptors::*;
#[doc(hidden)]
pub use shadow_store::*;
#[doc(hidden)]
pub use sled_adapter::*;
use tracing::debug;
use tracing::warn;

use crate::constants::SHADOW_DB_DIR;

/// Opens the embedded shadow database under the given root path.
pub fn init_sled_shadow_db(
    db_root_path: impl AsRef<Path> + std::fmt::Debug
) -> std::result::Result<sled::Db, std::io::Error> {
    debug!("init_sled_shadow_db from path: {:?}", &db_root_path);

    let path = db_root_path.as_ref();
    let shadow_db_path = path.join(SHADOW_DB_DIR);

    sled::Config::default()
        .path(&shadow_db_path)
        .cache_capacity(64 * 1024 * 1024) //64MB
        .flush_every_ms(Some(3))
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!(
                "Try to open DB at this location: {:?} and failed: {:?}",
                shadow_db_path, e
            );
            std::io::Error::other(e)
        })
}
