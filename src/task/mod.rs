#![forbid(unsafe_code)]

pub mod model;
pub mod storage;
pub mod store;

pub use model::{Counts, Filter, Task};
pub use storage::{FileStorage, MemoryStorage, Persistence};
pub use store::TaskStore;
