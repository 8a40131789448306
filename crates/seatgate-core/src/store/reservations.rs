//! Item and reservation operations on the SQLite store.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::db::SqliteStore;
use super::ReservationStore;
use crate::config::DuplicatePolicy;
use crate::error::StoreError;
use crate::types::{unix_timestamp, ItemId, ItemSummary, RequesterId, Reservation, ReservationId};

fn reservation_from_row(row: &SqliteRow) -> Reservation {
    Reservation {
        id: row.get("id"),
        item_id: row.get("item_id"),
        requester_id: row.get("requester_id"),
        created_at: row.get("created_at"),
    }
}

/// SQLite counts are i64; clamp into the u32 domain used for limits.
fn to_count(n: i64) -> u32 {
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}

impl SqliteStore {
    async fn item_exists(&self, item: ItemId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM items WHERE id = ?1")
            .bind(item)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl ReservationStore for SqliteStore {
    async fn define_item(&self, item: ItemId, limit: u32) -> Result<(), StoreError> {
        if limit == 0 {
            return Err(StoreError::Constraint("limit must be positive".into()));
        }
        sqlx::query(
            r#"
            INSERT INTO items (id, booking_limit, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(item)
        .bind(i64::from(limit))
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;

        let existing = self.get_item_limit(item).await?;
        if existing != limit {
            return Err(StoreError::LimitMismatch {
                item_id: item,
                existing,
            });
        }
        Ok(())
    }

    async fn get_item_limit(&self, item: ItemId) -> Result<u32, StoreError> {
        let row = sqlx::query("SELECT booking_limit FROM items WHERE id = ?1")
            .bind(item)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(to_count(row.get("booking_limit"))),
            None => Err(StoreError::ItemNotFound(item)),
        }
    }

    async fn count_reservations(&self, item: ItemId) -> Result<u32, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM reservations WHERE item_id = ?1")
            .bind(item)
            .fetch_one(&self.pool)
            .await?;
        Ok(to_count(row.get("n")))
    }

    async fn insert_reservation(
        &self,
        item: ItemId,
        requester: RequesterId,
        duplicates: DuplicatePolicy,
    ) -> Result<Reservation, StoreError> {
        let now = unix_timestamp();
        let allow_duplicates = duplicates == DuplicatePolicy::Allow;

        // The count and uniqueness checks run in the same statement as the
        // insert, so a stale cache upstream can never push the item past its limit.
        let result = sqlx::query(
            r#"
            INSERT INTO reservations (item_id, requester_id, created_at)
            SELECT ?1, ?2, ?3
            WHERE (SELECT COUNT(*) FROM reservations WHERE item_id = ?1)
                  < (SELECT booking_limit FROM items WHERE id = ?1)
              AND (?4 OR NOT EXISTS (
                    SELECT 1 FROM reservations
                    WHERE item_id = ?1 AND requester_id = ?2))
            "#,
        )
        .bind(item)
        .bind(requester)
        .bind(now)
        .bind(allow_duplicates)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            if !self.item_exists(item).await? {
                return Err(StoreError::ItemNotFound(item));
            }
            return Err(StoreError::Constraint(format!(
                "insert for item {item} requester {requester} rejected by capacity/uniqueness guard"
            )));
        }

        Ok(Reservation {
            id: result.last_insert_rowid(),
            item_id: item,
            requester_id: requester,
            created_at: now,
        })
    }

    async fn delete_reservation(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM reservations
            WHERE id = (
                SELECT id FROM reservations
                WHERE item_id = ?1 AND requester_id = ?2
                ORDER BY id ASC
                LIMIT 1
            )
            "#,
        )
        .bind(item)
        .bind(requester)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_reservation_by_id(&self, id: ReservationId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, item_id, requester_id, created_at
            FROM reservations
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(reservation_from_row))
    }

    async fn find_reservation(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, item_id, requester_id, created_at
            FROM reservations
            WHERE item_id = ?1 AND requester_id = ?2
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(item)
        .bind(requester)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(reservation_from_row))
    }

    async fn list_items(&self) -> Result<Vec<ItemSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT i.id AS id,
                   i.booking_limit AS booking_limit,
                   (SELECT COUNT(*) FROM reservations r WHERE r.item_id = i.id) AS confirmed
            FROM items i
            ORDER BY i.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ItemSummary {
                id: row.get("id"),
                limit: to_count(row.get("booking_limit")),
                confirmed_count: to_count(row.get("confirmed")),
            })
            .collect())
    }
}
