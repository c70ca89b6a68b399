pub mod memory;
pub mod schema;
pub mod store;
pub mod surreal;

pub use memory::InMemoryVectorStore;
pub use schema::{Filter, Point, PointPayload, Range, ScoredPoint};
pub use store::VectorStore;
pub use surreal::{new_point_id, SurrealVectorStore};
