pub mod elasticsearch;
pub mod memory;

pub use elasticsearch::{ElasticsearchConfig, ElasticsearchStore};
pub use memory::MemoryStore;
