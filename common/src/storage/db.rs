use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};

/// Thin wrapper around a SurrealDB connection. `vector-store` builds its
/// `SurrealVectorStore` directly on `client`.
#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;
        db.signin(Root { username, password }).await?;
        db.use_ns(namespace).use_db(database).await?;
        Ok(SurrealDbClient { client: db })
    }

    /// Defines an HNSW vector index on `field` of `table` with the given
    /// embedding dimension. Idempotent: SurrealDB accepts repeated
    /// `DEFINE INDEX` with `IF NOT EXISTS` semantics via `OVERWRITE`.
    pub async fn define_hnsw_index(
        &self,
        index_name: &str,
        table: &str,
        field: &str,
        dimension: usize,
    ) -> Result<(), Error> {
        let stmt = format!(
            "DEFINE INDEX OVERWRITE {index_name} ON {table} FIELDS {field} HNSW DIMENSION {dimension}"
        );
        self.client.query(stmt).await?;
        Ok(())
    }

    pub async fn rebuild_index(&self, index_name: &str, table: &str) -> Result<(), Error> {
        let stmt = format!("REBUILD INDEX IF EXISTS {index_name} ON {table}");
        self.client.query(stmt).await?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;
        db.use_ns(namespace).use_db(database).await?;
        Ok(SurrealDbClient { client: db })
    }
}
