pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use models::*;
pub use pool::DbPool;
pub use repository::PgVectorStore;
pub use store::VectorStore;

#[cfg(test)]
pub use store::MockVectorStore;
