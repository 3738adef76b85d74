//! Store backends and the HTTP probe.

pub mod http_probe;
pub mod in_memory;
pub mod json_file;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

mod query;
