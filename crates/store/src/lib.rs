#![forbid(unsafe_code)]

mod collection;
mod journal;
mod memory;
mod record;

pub use collection::{DocumentCollection, Filter, InsertOutcome, Patch};
pub use journal::{FsyncPolicy, JournaledCollection};
pub use memory::MemoryCollection;
pub use record::Record;
