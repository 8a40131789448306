//! Durable waitlist table, used when no shared cache is configured so that
//! separate CLI invocations see the same queue.

use async_trait::async_trait;
use sqlx::Row;

use super::db::SqliteStore;
use crate::error::CacheError;
use crate::types::{ItemId, RequesterId, WaitlistEntry};
use crate::waitlist::Waitlist;

fn backend(e: sqlx::Error) -> CacheError {
    CacheError::Backend(format!("sqlite waitlist: {e}"))
}

fn to_position(n: i64) -> Option<usize> {
    usize::try_from(n).ok().filter(|&p| p > 0)
}

#[async_trait]
impl Waitlist for SqliteStore {
    async fn push(&self, item: ItemId, entry: WaitlistEntry) -> Result<usize, CacheError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let id = sqlx::query(
            r#"
            INSERT INTO waitlist (item_id, requester_id, enqueued_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(item)
        .bind(entry.requester_id)
        .bind(entry.enqueued_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?
        .last_insert_rowid();

        let row = sqlx::query("SELECT COUNT(*) AS n FROM waitlist WHERE item_id = ?1 AND id <= ?2")
            .bind(item)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(to_position(row.get("n")).unwrap_or(1))
    }

    async fn pop(&self, item: ItemId) -> Result<Option<WaitlistEntry>, CacheError> {
        let row = sqlx::query(
            r#"
            DELETE FROM waitlist
            WHERE id = (SELECT MIN(id) FROM waitlist WHERE item_id = ?1)
            RETURNING requester_id, enqueued_at
            "#,
        )
        .bind(item)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(|row| WaitlistEntry {
            item_id: item,
            requester_id: row.get("requester_id"),
            enqueued_at: row.get("enqueued_at"),
        }))
    }

    async fn requeue_front(&self, item: ItemId, entry: WaitlistEntry) -> Result<(), CacheError> {
        // Ids order the queue, so the head slot is one below the current minimum.
        sqlx::query(
            r#"
            INSERT INTO waitlist (id, item_id, requester_id, enqueued_at)
            VALUES ((SELECT COALESCE(MIN(id), 1) - 1 FROM waitlist), ?1, ?2, ?3)
            "#,
        )
        .bind(item)
        .bind(entry.requester_id)
        .bind(entry.enqueued_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn len(&self, item: ItemId) -> Result<usize, CacheError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM waitlist WHERE item_id = ?1")
            .bind(item)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(to_position(row.get("n")).unwrap_or(0))
    }

    async fn position(
        &self,
        item: ItemId,
        requester: RequesterId,
    ) -> Result<Option<usize>, CacheError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM waitlist
            WHERE item_id = ?1
              AND id <= (SELECT MIN(id) FROM waitlist WHERE item_id = ?1 AND requester_id = ?2)
            "#,
        )
        .bind(item)
        .bind(requester)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(to_position(row.get("n")))
    }

    async fn remove(&self, item: ItemId, requester: RequesterId) -> Result<bool, CacheError> {
        let result = sqlx::query(
            r#"
            DELETE FROM waitlist
            WHERE id = (
                SELECT MIN(id) FROM waitlist
                WHERE item_id = ?1 AND requester_id = ?2
            )
            "#,
        )
        .bind(item)
        .bind(requester)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn entries(&self, item: ItemId) -> Result<Vec<WaitlistEntry>, CacheError> {
        let rows = sqlx::query(
            r#"
            SELECT requester_id, enqueued_at FROM waitlist
            WHERE item_id = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(item)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows
            .iter()
            .map(|row| WaitlistEntry {
                item_id: item,
                requester_id: row.get("requester_id"),
                enqueued_at: row.get("enqueued_at"),
            })
            .collect())
    }
}
