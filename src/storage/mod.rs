pub mod engine;
pub mod object;
pub mod keys;
pub mod memory;
pub mod local;
pub mod chunked;
pub mod direct;

pub use engine::*;
pub use object::*;
pub use memory::MemoryKv;
pub use local::LocalKv;
pub use chunked::{ChunkedStore, ObjectLayout};
pub use direct::DirectStore;
