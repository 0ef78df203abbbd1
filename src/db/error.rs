use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Pool error: {0}")]
    PoolError(#[from] deadpool_postgres::PoolError),

    #[error("{}", format_pg_error(.0))]
    PostgresError(#[from] tokio_postgres::Error),

    #[error("Build error: {0}")]
    BuildError(#[from] deadpool_postgres::BuildError),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Row for {table} has {actual} values, expected {expected}")]
    RowWidth {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("Value {0} does not fit in BIGINT")]
    BigIntOverflow(u64),

    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),
}

fn format_pg_error(e: &tokio_postgres::Error) -> String {
    let Some(db_err) = e.as_db_error() else {
        return format!("PostgreSQL error: {}", e);
    };

    let mut msg = format!(
        "PostgreSQL error [{}]: {}",
        db_err.code().code(),
        db_err.message()
    );
    let context = [
        ("Detail", db_err.detail()),
        ("Hint", db_err.hint()),
        ("Table", db_err.table()),
        ("Column", db_err.column()),
        ("Constraint", db_err.constraint()),
    ];
    for (label, value) in context {
        if let Some(value) = value {
            msg.push_str(&format!("\n  {}: {}", label, value));
        }
    }
    msg
}
