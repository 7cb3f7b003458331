use chrono::{DateTime, Utc};
use sqlx::Row;

use pestline_core::domain::deal::{Deal, DealId, OrgId};

use super::{DealQuery, DealRepository, DealSort, RepositoryError};
use crate::DbPool;

pub struct SqlDealRepository {
    pool: DbPool,
}

impl SqlDealRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode(payload: &str) -> Result<Deal, RepositoryError> {
    serde_json::from_str(payload).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn encode(deal: &Deal) -> Result<String, RepositoryError> {
    serde_json::to_string(deal).map_err(|e| RepositoryError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl DealRepository for SqlDealRepository {
    async fn find_by_id(
        &self,
        id: &DealId,
        include_deleted: bool,
    ) -> Result<Option<Deal>, RepositoryError> {
        let sql = if include_deleted {
            "SELECT payload FROM deal WHERE id = ?"
        } else {
            "SELECT payload FROM deal WHERE id = ? AND deleted_at IS NULL"
        };
        let row = sqlx::query(sql).bind(id.0.to_string()).fetch_optional(&self.pool).await?;
        row.map(|r| decode(&r.get::<String, _>("payload"))).transpose()
    }

    async fn save(&self, deal: &Deal) -> Result<(), RepositoryError> {
        let payload = encode(deal)?;
        sqlx::query(
            "INSERT INTO deal (id, org_id, contact_id, owner_id, status, stage, deal_value_cents, created_at, deleted_at, payload)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               org_id = excluded.org_id,
               contact_id = excluded.contact_id,
               owner_id = excluded.owner_id,
               status = excluded.status,
               stage = excluded.stage,
               deal_value_cents = excluded.deal_value_cents,
               deleted_at = excluded.deleted_at,
               payload = excluded.payload",
        )
        .bind(deal.id.0.to_string())
        .bind(deal.org_id.0.to_string())
        .bind(deal.contact_id.0.to_string())
        .bind(deal.owner_id.map(|id| id.to_string()))
        .bind(deal.status.as_str())
        .bind(deal.stage.as_str())
        .bind(deal.deal_value_cents)
        .bind(deal.created_at.to_rfc3339())
        .bind(deal.deleted_at.map(|t| t.to_rfc3339()))
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn soft_delete(&self, id: &DealId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let Some(mut deal) = self.find_by_id(id, false).await? else {
            return Ok(false);
        };
        deal.deleted_at = Some(now);
        deal.updated_at = now;
        self.save(&deal).await?;
        Ok(true)
    }

    async fn list(&self, org_id: OrgId, query: &DealQuery) -> Result<Vec<Deal>, RepositoryError> {
        let mut sql = String::from("SELECT payload FROM deal WHERE org_id = ?");
        let mut binds: Vec<String> = vec![org_id.0.to_string()];

        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            binds.push(status.as_str().to_string());
        }
        if let Some(stage) = query.stage {
            sql.push_str(" AND stage = ?");
            binds.push(stage.as_str().to_string());
        }
        if !query.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        sql.push_str(match query.sort {
            DealSort::CreatedAtDesc => " ORDER BY created_at DESC",
            DealSort::CreatedAtAsc => " ORDER BY created_at ASC",
            DealSort::ValueDesc => " ORDER BY deal_value_cents DESC",
        });
        sql.push_str(" LIMIT ? OFFSET ?");

        let mut q = sqlx::query(&sql);
        for bind in binds {
            q = q.bind(bind);
        }
        // SQLite treats a negative limit as "no limit".
        q = q.bind(query.limit.map(i64::from).unwrap_or(-1)).bind(i64::from(query.offset));

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(|r| decode(&r.get::<String, _>("payload"))).collect()
    }
}
