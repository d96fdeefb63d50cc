pub mod disk_object_store;
pub mod flat_store;
pub mod object_store;

pub use disk_object_store::DiskObjectStore;
pub use flat_store::{DiskFlatStore, FlatStore, MemoryFlatStore};
pub use object_store::{MemoryObjectStore, ObjectStoreBackend, RecordCursor};
