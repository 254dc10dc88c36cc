//! Persistent storage of finalized recordings

pub mod export;
pub mod file_store;
pub mod key;
pub mod memory;
pub mod record;
pub mod store;


pub use export::{export_all, export_file_name, export_one};
pub use file_store::FileArchive;
pub use key::KeyGenerator;
pub use memory::MemoryArchive;
pub use record::{ArchiveKey, ArchiveRecord};
pub use store::Archive;
