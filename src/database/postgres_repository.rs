use sqlx::PgPool;

/// Thin handle over the connection pool. Domain queries are grouped into
/// `impl` blocks in the sibling modules.
#[derive(Clone)]
pub struct PostgresRepository {
    pub pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
