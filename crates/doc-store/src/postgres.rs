use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, postgres::PgRow, query::Query};
use uuid::Uuid;

use crate::{
    Document, DocumentQuery, DocumentStore, FilterOp, Result, StoreError, Version, Versioned,
};

/// PostgreSQL-backed document store.
///
/// All collections share the `documents` table; bodies are stored as JSONB
/// and the `version` column is the optimistic concurrency token.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Creates a new PostgreSQL document store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_document<D: Document>(row: PgRow) -> Result<Versioned<D>> {
        let body: serde_json::Value = row.try_get("body")?;
        Ok(Versioned {
            document: serde_json::from_value(body)?,
            version: Version::new(row.try_get("version")?),
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn current_version(&self, collection: &'static str, id: Uuid) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(version.map(Version::new))
    }

    /// Turns a write that matched no rows into the precise error.
    async fn missed_write(
        &self,
        collection: &'static str,
        id: Uuid,
        expected: Version,
    ) -> StoreError {
        match self.current_version(collection, id).await {
            Ok(Some(actual)) => {
                tracing::debug!(collection, %id, %expected, %actual, "stale document write");
                StoreError::ConcurrencyConflict {
                    collection,
                    id,
                    expected,
                    actual,
                }
            }
            Ok(None) => StoreError::NotFound { collection, id },
            Err(e) => e,
        }
    }

    /// Appends the WHERE clause for `query`, numbering parameters from `$2`
    /// (`$1` is always the collection).
    fn where_clause(query: &DocumentQuery) -> (String, usize) {
        let mut sql = String::from(" WHERE collection = $1");
        let mut param_count = 1;

        for filter in &query.filters {
            let path_param = param_count + 1;
            let value_param = param_count + 2;
            param_count += 2;
            match filter.op {
                FilterOp::Eq(_) => sql.push_str(&format!(
                    " AND body #> ${path_param}::text[] = ${value_param}::jsonb"
                )),
                FilterOp::StartsWith(_) => sql.push_str(&format!(
                    " AND body #>> ${path_param}::text[] LIKE ${value_param}"
                )),
            }
        }

        (sql, param_count)
    }

    fn bind_filters<'q>(
        mut sqlx_query: Query<'q, Postgres, sqlx::postgres::PgArguments>,
        query: &DocumentQuery,
    ) -> Query<'q, Postgres, sqlx::postgres::PgArguments> {
        for filter in &query.filters {
            let path: Vec<String> = filter.segments().into_iter().map(String::from).collect();
            sqlx_query = sqlx_query.bind(path);
            sqlx_query = match &filter.op {
                FilterOp::Eq(value) => sqlx_query.bind(value.clone()),
                FilterOp::StartsWith(prefix) => sqlx_query.bind(format!("{}%", escape_like(prefix))),
            };
        }
        sqlx_query
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn insert<D: Document>(&self, document: &D) -> Result<Version> {
        let id: Uuid = document.id().into();
        let body = serde_json::to_value(document)?;

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, version, body, updated_at)
            VALUES ($1, $2, $3, $4, now())
            "#,
        )
        .bind(D::COLLECTION)
        .bind(id)
        .bind(Version::first().as_i64())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("documents_pkey")
            {
                return StoreError::AlreadyExists {
                    collection: D::COLLECTION,
                    id,
                };
            }
            StoreError::Database(e)
        })?;

        Ok(Version::first())
    }

    async fn get<D: Document>(&self, id: D::Id) -> Result<Option<Versioned<D>>> {
        let id: Uuid = id.into();
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT version, body, updated_at
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(D::COLLECTION)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_document::<D>).transpose()
    }

    async fn update<D: Document>(&self, document: &D, expected: Version) -> Result<Version> {
        let id: Uuid = document.id().into();
        let body = serde_json::to_value(document)?;

        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE documents
            SET body = $1, version = version + 1, updated_at = now()
            WHERE collection = $2 AND id = $3 AND version = $4
            RETURNING version
            "#,
        )
        .bind(body)
        .bind(D::COLLECTION)
        .bind(id)
        .bind(expected.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match version {
            Some(version) => Ok(Version::new(version)),
            None => Err(self.missed_write(D::COLLECTION, id, expected).await),
        }
    }

    async fn delete<D: Document>(&self, id: D::Id, expected: Option<Version>) -> Result<()> {
        let id: Uuid = id.into();

        let result = match expected {
            Some(expected) => {
                sqlx::query(
                    "DELETE FROM documents WHERE collection = $1 AND id = $2 AND version = $3",
                )
                .bind(D::COLLECTION)
                .bind(id)
                .bind(expected.as_i64())
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                    .bind(D::COLLECTION)
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(match expected {
                Some(expected) => self.missed_write(D::COLLECTION, id, expected).await,
                None => StoreError::NotFound {
                    collection: D::COLLECTION,
                    id,
                },
            });
        }

        Ok(())
    }

    async fn find<D: Document>(&self, query: DocumentQuery) -> Result<Vec<Versioned<D>>> {
        let (where_sql, mut param_count) = Self::where_clause(&query);
        let mut sql = format!("SELECT version, body, updated_at FROM documents{where_sql}");
        sql.push_str(" ORDER BY seq ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = Self::bind_filters(sqlx::query(&sql).bind(D::COLLECTION), &query);
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_document::<D>).collect()
    }

    async fn count<D: Document>(&self, query: DocumentQuery) -> Result<usize> {
        let (where_sql, _) = Self::where_clause(&query);
        let sql = format!("SELECT COUNT(*) AS total FROM documents{where_sql}");

        let row = Self::bind_filters(sqlx::query(&sql).bind(D::COLLECTION), &query)
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_clause_numbers_parameters() {
        let query = DocumentQuery::new()
            .eq("material_id", "m-1")
            .starts_with("lot_number", "LOT-2024");
        let (sql, count) = PostgresDocumentStore::where_clause(&query);
        assert_eq!(
            sql,
            " WHERE collection = $1 AND body #> $2::text[] = $3::jsonb AND body #>> $4::text[] LIKE $5"
        );
        assert_eq!(count, 5);
    }

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("LOT_1%"), "LOT\\_1\\%");
    }
}
