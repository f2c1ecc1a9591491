use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};

use crate::{
    Condition, Mutation, Record, RecordKey, RecordStoreError, Result, Update, Version, WriteOp,
    store::RecordStore,
};

/// PostgreSQL-backed record store implementation.
///
/// All records live in one table keyed by `(pk, sk)` with the attributes in a
/// `jsonb` column. Conditional updates compile to a single
/// `UPDATE ... WHERE <conditions> RETURNING`, so the check and the write are
/// one statement. A [`WriteOp`] batch runs those statements inside one
/// database transaction.
///
/// Unlike the in-memory store, an update that cannot be applied (a `Set` whose
/// parent object is missing) is reported as `PreconditionFailed`, and repeated
/// updates to the same path within one mutation all read the stored value.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
    table: String,
}

impl PostgresRecordStore {
    /// Creates a new PostgreSQL record store over the given table.
    ///
    /// The table name must be a plain SQL identifier.
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self { pool, table })
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Returns the table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the table and its prefix index if they don't exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                pk TEXT NOT NULL,
                sk TEXT NOT NULL,
                version BIGINT NOT NULL,
                attributes JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (pk, sk)
            );
            CREATE INDEX IF NOT EXISTS {table}_pk_prefix_idx ON {table} (pk text_pattern_ops);
            "#,
            table = self.table
        );
        sqlx::raw_sql(&ddl).execute(&self.pool).await?;
        tracing::debug!(table = %self.table, "record table ready");
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<Record> {
        Ok(Record {
            key: RecordKey::new(
                row.try_get::<String, _>("pk")?,
                row.try_get::<String, _>("sk")?,
            ),
            version: Version::new(row.try_get("version")?),
            attributes: row.try_get("attributes")?,
        })
    }

    fn insert_if_absent_sql(&self) -> String {
        format!(
            r#"
            INSERT INTO {} (pk, sk, version, attributes, updated_at)
            VALUES ($1, $2, 1, $3, NOW())
            ON CONFLICT (pk, sk) DO NOTHING
            RETURNING pk, sk, version, attributes
            "#,
            self.table
        )
    }

    fn update_query(&self, key: &RecordKey, mutation: &Mutation) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "UPDATE {} SET version = version + 1, updated_at = NOW(), attributes = ",
            self.table
        ));
        Self::push_update_expression(&mut builder, &mutation.updates);
        builder.push(" WHERE pk = ");
        builder.push_bind(key.partition_key.clone());
        builder.push(" AND sk = ");
        builder.push_bind(key.sort_key.clone());
        Self::push_conditions(&mut builder, mutation);
        builder.push(" RETURNING pk, sk, version, attributes");
        builder
    }

    fn push_update_expression(builder: &mut QueryBuilder<'_, Postgres>, updates: &[Update]) {
        // Nest one jsonb_set per update around the stored attributes
        for _ in updates {
            builder.push("jsonb_set(");
        }
        builder.push("attributes");
        for update in updates {
            let path = update.path().segments().to_vec();
            builder.push(", ");
            builder.push_bind(path.clone());
            builder.push("::text[], ");
            match update {
                Update::Set(_, value) => {
                    builder.push_bind(value.clone());
                    builder.push("::jsonb");
                }
                Update::Add(_, delta) => {
                    builder.push("to_jsonb(COALESCE((attributes #>> ");
                    builder.push_bind(path);
                    builder.push("::text[])::bigint, 0) + ");
                    builder.push_bind(*delta);
                    builder.push("::bigint)");
                }
            }
            builder.push(", true)");
        }
    }

    fn push_conditions(builder: &mut QueryBuilder<'_, Postgres>, mutation: &Mutation) {
        for condition in &mutation.conditions {
            builder.push(" AND ");
            match condition {
                Condition::Equals(path, value) => {
                    builder.push("attributes #> ");
                    builder.push_bind(path.segments().to_vec());
                    builder.push("::text[] = ");
                    builder.push_bind(value.clone());
                    builder.push("::jsonb");
                }
                Condition::AtLeast(path, bound) => {
                    let segments = path.segments().to_vec();
                    builder.push("CASE WHEN jsonb_typeof(attributes #> ");
                    builder.push_bind(segments.clone());
                    builder.push("::text[]) = 'number' THEN (attributes #>> ");
                    builder.push_bind(segments);
                    builder.push("::text[])::numeric >= ");
                    builder.push_bind(*bound);
                    builder.push("::bigint ELSE false END");
                }
                Condition::AtMost(path, bound) => {
                    let segments = path.segments().to_vec();
                    builder.push("CASE WHEN jsonb_typeof(attributes #> ");
                    builder.push_bind(segments.clone());
                    builder.push("::text[]) = 'number' THEN (attributes #>> ");
                    builder.push_bind(segments);
                    builder.push("::text[])::numeric <= ");
                    builder.push_bind(*bound);
                    builder.push("::bigint ELSE false END");
                }
                Condition::VersionIs(version) => {
                    builder.push("version = ");
                    builder.push_bind(version.as_i64());
                }
            }
        }

        // jsonb_set silently ignores a missing parent; make it fail the write instead
        for update in &mutation.updates {
            if let Update::Set(path, _) = update
                && let Some((_, parent)) = path.segments().split_last()
                && !parent.is_empty()
            {
                builder.push(" AND jsonb_typeof(attributes #> ");
                builder.push_bind(parent.to_vec());
                builder.push("::text[]) = 'object'");
            }
        }
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>> {
        let row = sqlx::query(&format!(
            "SELECT pk, sk, version, attributes FROM {} WHERE pk = $1 AND sk = $2",
            self.table
        ))
        .bind(&key.partition_key)
        .bind(&key.sort_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn put(&self, key: RecordKey, attributes: serde_json::Value) -> Result<Record> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO {table} (pk, sk, version, attributes, updated_at)
            VALUES ($1, $2, 1, $3, NOW())
            ON CONFLICT (pk, sk) DO UPDATE
            SET attributes = EXCLUDED.attributes,
                version = {table}.version + 1,
                updated_at = NOW()
            RETURNING pk, sk, version, attributes
            "#,
            table = self.table
        ))
        .bind(&key.partition_key)
        .bind(&key.sort_key)
        .bind(&attributes)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_record(row)
    }

    async fn put_if_absent(&self, key: RecordKey, attributes: serde_json::Value) -> Result<Record> {
        let row = sqlx::query(&self.insert_if_absent_sql())
            .bind(&key.partition_key)
            .bind(&key.sort_key)
            .bind(&attributes)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_record(row),
            None => Err(RecordStoreError::PreconditionFailed { key }),
        }
    }

    async fn conditional_update(&self, key: &RecordKey, mutation: Mutation) -> Result<Record> {
        let row = self
            .update_query(key, &mutation)
            .build()
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_record(row),
            None => {
                tracing::debug!(key = %key, "conditional update rejected");
                Err(RecordStoreError::PreconditionFailed { key: key.clone() })
            }
        }
    }

    async fn transact(&self, ops: Vec<WriteOp>) -> Result<Vec<Record>> {
        // Dropping the transaction on an early return rolls it back
        let mut tx = self.pool.begin().await?;
        let mut written = Vec::with_capacity(ops.len());

        for op in &ops {
            let row = match op {
                WriteOp::Insert { key, attributes } => {
                    sqlx::query(&self.insert_if_absent_sql())
                        .bind(&key.partition_key)
                        .bind(&key.sort_key)
                        .bind(attributes)
                        .fetch_optional(&mut *tx)
                        .await?
                }
                WriteOp::Update { key, mutation } => {
                    self.update_query(key, mutation)
                        .build()
                        .fetch_optional(&mut *tx)
                        .await?
                }
            };
            match row {
                Some(row) => written.push(Self::row_to_record(row)?),
                None => {
                    tracing::debug!(key = %op.key(), "transaction rejected");
                    return Err(RecordStoreError::PreconditionFailed {
                        key: op.key().clone(),
                    });
                }
            }
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn delete(&self, key: &RecordKey) -> Result<Option<Record>> {
        let row = sqlx::query(&format!(
            "DELETE FROM {} WHERE pk = $1 AND sk = $2 RETURNING pk, sk, version, attributes",
            self.table
        ))
        .bind(&key.partition_key)
        .bind(&key.sort_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn query_by_prefix(&self, prefix: &str) -> Result<Vec<Record>> {
        let pattern = format!("{}%", escape_like(prefix));
        let rows = sqlx::query(&format!(
            r#"
            SELECT pk, sk, version, attributes FROM {}
            WHERE pk LIKE $1 ESCAPE '\'
            ORDER BY pk COLLATE "C", sk COLLATE "C"
            "#,
            self.table
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn query_partition(&self, partition_key: &str) -> Result<Vec<Record>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT pk, sk, version, attributes FROM {}
            WHERE pk = $1
            ORDER BY sk COLLATE "C"
            "#,
            self.table
        ))
        .bind(partition_key)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }
}

/// Rejects anything but a plain identifier: it is interpolated into SQL.
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_start && valid_rest && table.len() <= 63 {
        Ok(())
    } else {
        Err(RecordStoreError::InvalidTableName(table.to_string()))
    }
}

fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
