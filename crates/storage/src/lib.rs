//! Loading, editing and saving OCR review records, plus the per-user data
//! directory.

mod app_data;
mod error;
pub mod persist;
mod source;
mod store;

pub use app_data::Storage;
pub use error::{InvalidRecords, LoadError, NotFound, StorageError, WriteError};
pub use store::RecordStore;
