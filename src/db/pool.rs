use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use serde_json::Value as JsonValue;
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;

use super::error::DbError;
use super::schema::quote_ident;
use super::types::{DbOperation, DbValue};

pub struct DbPool {
    pool: Pool,
}

impl DbPool {
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        let config = database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| DbError::InvalidConnectionString(e.to_string()))?;

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let manager = Manager::from_config(config, NoTls, manager_config);

        let pool = Pool::builder(manager)
            .max_size(8)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(DbError::BuildError)?;

        let _conn = pool.get().await?;
        tracing::info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Runs all operations in one transaction; nothing is committed on error.
    pub async fn execute_transaction(&self, operations: Vec<DbOperation>) -> Result<(), DbError> {
        if operations.is_empty() {
            return Ok(());
        }

        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;

        for op in operations {
            let (sql, params) = build_operation_sql(&op)?;

            let params_refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

            if let Err(e) = transaction.execute(&sql, &params_refs[..]).await {
                let db_err: DbError = e.into();
                tracing::error!("SQL execution failed\n  SQL: {}\n  Error: {}", sql, db_err);
                return Err(db_err);
            }
        }

        transaction.commit().await?;
        Ok(())
    }

    /// Executes parameterless statements, e.g. DDL.
    pub async fn batch_execute(&self, sql: &str) -> Result<(), DbError> {
        let client = self.pool.get().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    /// Runs `sql` and returns each result row as a JSON object.
    pub async fn query_json(&self, sql: &str) -> Result<Vec<JsonValue>, DbError> {
        let client = self.pool.get().await?;
        let rows = client.query(&wrap_row_to_json(sql), &[]).await?;
        rows.iter()
            .map(|row| row.try_get::<_, JsonValue>(0).map_err(DbError::from))
            .collect()
    }
}

fn wrap_row_to_json(sql: &str) -> String {
    format!(
        "SELECT row_to_json(q) FROM ({}) AS q",
        sql.trim().trim_end_matches(';')
    )
}

#[derive(Debug)]
enum SqlParam {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Text(String),
}

impl ToSql for SqlParam {
    fn to_sql(
        &self,
        ty: &tokio_postgres::types::Type,
        out: &mut BytesMut,
    ) -> Result<tokio_postgres::types::IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlParam::Null => Ok(tokio_postgres::types::IsNull::Yes),
            SqlParam::Bool(v) => v.to_sql(ty, out),
            SqlParam::Int64(v) => v.to_sql(ty, out),
            SqlParam::Float64(v) => v.to_sql(ty, out),
            SqlParam::Text(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(ty: &tokio_postgres::types::Type) -> bool {
        <bool as ToSql>::accepts(ty)
            || <i64 as ToSql>::accepts(ty)
            || <f64 as ToSql>::accepts(ty)
            || <String as ToSql>::accepts(ty)
    }

    tokio_postgres::types::to_sql_checked!();
}

fn convert_db_value(value: &DbValue) -> Result<SqlParam, DbError> {
    Ok(match value {
        DbValue::Null => SqlParam::Null,
        DbValue::Bool(v) => SqlParam::Bool(*v),
        DbValue::Uint64(v) => SqlParam::Int64(
            i64::try_from(*v).map_err(|_| DbError::BigIntOverflow(*v))?,
        ),
        DbValue::Text(v) | DbValue::Numeric(v) => SqlParam::Text(v.clone()),
        DbValue::Timestamp(v) => {
            SqlParam::Float64(v.timestamp() as f64 + f64::from(v.timestamp_subsec_micros()) / 1e6)
        }
    })
}

/// SQL placeholder for a value at the given parameter index.
/// - Timestamp → `to_timestamp($N)`
/// - Numeric → `$N::text::numeric` (sent as text, cast by PostgreSQL)
fn placeholder_for(value: &DbValue, param_idx: usize) -> String {
    match value {
        DbValue::Timestamp(_) => format!("to_timestamp(${})", param_idx),
        DbValue::Numeric(_) => format!("${}::text::numeric", param_idx),
        _ => format!("${}", param_idx),
    }
}

fn quote_cols(columns: &[String]) -> String {
    columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

fn build_operation_sql(op: &DbOperation) -> Result<(String, Vec<SqlParam>), DbError> {
    match op {
        DbOperation::Insert {
            table,
            columns,
            values,
        } => build_insert_sql(table, columns, values),
        DbOperation::Upsert {
            table,
            columns,
            values,
            conflict_columns,
            update_columns,
        } => build_upsert_sql(table, columns, values, conflict_columns, update_columns),
    }
}

fn values_clause(values: &[DbValue]) -> String {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| placeholder_for(v, i + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_insert_sql(
    table: &str,
    columns: &[String],
    values: &[DbValue],
) -> Result<(String, Vec<SqlParam>), DbError> {
    let params = values
        .iter()
        .map(convert_db_value)
        .collect::<Result<Vec<_>, _>>()?;
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        quote_cols(columns),
        values_clause(values)
    );
    Ok((sql, params))
}

fn build_upsert_sql(
    table: &str,
    columns: &[String],
    values: &[DbValue],
    conflict_columns: &[String],
    update_columns: &[String],
) -> Result<(String, Vec<SqlParam>), DbError> {
    let (insert, params) = build_insert_sql(table, columns, values)?;
    let conflict_cols = quote_cols(conflict_columns);

    let sql = if update_columns.is_empty() {
        format!("{} ON CONFLICT ({}) DO NOTHING", insert, conflict_cols)
    } else {
        let updates: Vec<String> = update_columns
            .iter()
            .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
            .collect();
        format!(
            "{} ON CONFLICT ({}) DO UPDATE SET {}",
            insert,
            conflict_cols,
            updates.join(", ")
        )
    };

    Ok((sql, params))
}
