#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("email already registered: {0}")]
    DuplicateEmail(String),

    #[error("invalid stored value: {0}")]
    InvalidData(String),
}
