use sqlx::Row;

use pestline_core::domain::contact::{Contact, ContactId};
use pestline_core::domain::deal::OrgId;

use super::{ContactRepository, RepositoryError};
use crate::DbPool;

pub struct SqlContactRepository {
    pool: DbPool,
}

impl SqlContactRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ContactRepository for SqlContactRepository {
    async fn find_by_id(
        &self,
        id: &ContactId,
        org_id: OrgId,
    ) -> Result<Option<Contact>, RepositoryError> {
        let row = sqlx::query("SELECT payload FROM contact WHERE id = ? AND org_id = ?")
            .bind(id.0.to_string())
            .bind(org_id.0.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            serde_json::from_str(&r.get::<String, _>("payload"))
                .map_err(|e| RepositoryError::Decode(e.to_string()))
        })
        .transpose()
    }

    async fn save(&self, contact: &Contact) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(contact)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        sqlx::query(
            "INSERT INTO contact (id, org_id, payload) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET org_id = excluded.org_id, payload = excluded.payload",
        )
        .bind(contact.id.0.to_string())
        .bind(contact.org_id.0.to_string())
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
