use chrono::{DateTime, Utc};
use sqlx::Row;

use pestline_core::domain::deal::OrgId;
use pestline_core::domain::quote::{Quote, QuoteId, QuoteNumber};

use super::{QuoteQuery, QuoteRepository, RepositoryError};
use crate::DbPool;

pub struct SqlQuoteRepository {
    pool: DbPool,
}

impl SqlQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode(payload: &str) -> Result<Quote, RepositoryError> {
    serde_json::from_str(payload).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn encode(quote: &Quote) -> Result<String, RepositoryError> {
    serde_json::to_string(quote).map_err(|e| RepositoryError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl QuoteRepository for SqlQuoteRepository {
    async fn find_by_id(
        &self,
        id: &QuoteId,
        include_deleted: bool,
    ) -> Result<Option<Quote>, RepositoryError> {
        let sql = if include_deleted {
            "SELECT payload FROM quote WHERE id = ?"
        } else {
            "SELECT payload FROM quote WHERE id = ? AND deleted_at IS NULL"
        };
        let row = sqlx::query(sql).bind(id.0.to_string()).fetch_optional(&self.pool).await?;
        row.map(|r| decode(&r.get::<String, _>("payload"))).transpose()
    }

    async fn save(&self, quote: &Quote) -> Result<(), RepositoryError> {
        let payload = encode(quote)?;
        sqlx::query(
            "INSERT INTO quote (id, org_id, quote_number, version, status, valid_until, created_at, deleted_at, payload)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               org_id = excluded.org_id,
               quote_number = excluded.quote_number,
               version = excluded.version,
               status = excluded.status,
               valid_until = excluded.valid_until,
               deleted_at = excluded.deleted_at,
               payload = excluded.payload",
        )
        .bind(quote.id.0.to_string())
        .bind(quote.org_id.0.to_string())
        .bind(quote.quote_number.0.as_str())
        .bind(i64::from(quote.version))
        .bind(quote.status.as_str())
        .bind(quote.valid_until.map(|t| t.to_rfc3339()))
        .bind(quote.created_at.to_rfc3339())
        .bind(quote.deleted_at.map(|t| t.to_rfc3339()))
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn soft_delete(
        &self,
        id: &QuoteId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let Some(mut quote) = self.find_by_id(id, false).await? else {
            return Ok(false);
        };
        quote.deleted_at = Some(now);
        quote.updated_at = now;
        self.save(&quote).await?;
        Ok(true)
    }

    async fn list(&self, org_id: OrgId, query: &QuoteQuery) -> Result<Vec<Quote>, RepositoryError> {
        let mut sql = String::from("SELECT payload FROM quote WHERE org_id = ?");
        let mut binds: Vec<String> = vec![org_id.0.to_string()];

        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            binds.push(status.as_str().to_string());
        }
        if !query.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query(&sql);
        for bind in binds {
            q = q.bind(bind);
        }
        q = q.bind(query.limit.map(i64::from).unwrap_or(-1)).bind(i64::from(query.offset));

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(|r| decode(&r.get::<String, _>("payload"))).collect()
    }

    async fn find_by_number(
        &self,
        org_id: OrgId,
        number: &QuoteNumber,
    ) -> Result<Vec<Quote>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT payload FROM quote
             WHERE org_id = ? AND quote_number = ? AND deleted_at IS NULL
             ORDER BY version DESC",
        )
        .bind(org_id.0.to_string())
        .bind(number.0.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|r| decode(&r.get::<String, _>("payload"))).collect()
    }

    async fn list_expirable(
        &self,
        org_id: OrgId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Quote>, RepositoryError> {
        // RFC 3339 UTC timestamps compare correctly as text.
        let rows = sqlx::query(
            "SELECT payload FROM quote
             WHERE org_id = ?
               AND status IN ('draft', 'sent', 'viewed')
               AND valid_until IS NOT NULL
               AND valid_until < ?
               AND deleted_at IS NULL",
        )
        .bind(org_id.0.to_string())
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|r| decode(&r.get::<String, _>("payload"))).collect()
    }
}
