//! Transaction-scoped advisory locks serializing check-then-write sections

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use tokio::sync::Mutex;

use super::{Repository, SchedulingStore, StoreLock};
use crate::error::AppResult;

/// Transaction owning the `pg_advisory_xact_lock`s of a locked section
pub(crate) type HeldTransaction = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

/// Ending the transaction (commit, rollback or drop) releases every lock at once.
struct AdvisoryLock {
    /// Repository view running on the lock's transaction
    session: Repository,
    /// False for locks taken inside an already locked section; the outer lock ends the transaction
    owner: bool,
}

impl AdvisoryLock {
    async fn take(&self) -> Option<Transaction<'static, Postgres>> {
        if !self.owner {
            return None;
        }
        match &self.session.held {
            Some(held) => held.lock().await.take(),
            None => None,
        }
    }
}

#[async_trait]
impl StoreLock for AdvisoryLock {
    fn store(&self) -> &dyn SchedulingStore {
        &self.session
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        if let Some(tx) = self.take().await {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        if let Some(tx) = self.take().await {
            tx.rollback().await?;
        }
        Ok(())
    }
}

impl Repository {
    /// Acquire advisory locks for `keys` in the given order.
    /// Gives up with SQLSTATE 55P03 (a concurrency conflict) after the configured lock timeout.
    /// Called on a view that already holds a transaction, the locks join that transaction.
    pub(crate) async fn advisory_lock(&self, keys: &[String]) -> AppResult<Box<dyn StoreLock>> {
        let (session, owner) = match &self.held {
            Some(_) => (self.clone(), false),
            None => {
                let mut tx = self.pool.begin().await?;

                // SET LOCAL does not accept bind parameters
                sqlx::query(&format!(
                    "SET LOCAL lock_timeout = '{}ms'",
                    self.lock_timeout.as_millis()
                ))
                .execute(&mut *tx)
                .await?;

                let session = Repository {
                    pool: self.pool.clone(),
                    lock_timeout: self.lock_timeout,
                    held: Some(Arc::new(Mutex::new(Some(tx)))),
                };
                (session, true)
            }
        };

        {
            let mut conn = session.conn().await?;
            for key in keys {
                sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                    .bind(key)
                    .execute(conn.get()?)
                    .await?;
            }
        }

        tracing::debug!("Acquired {} advisory lock(s)", keys.len());
        Ok(Box::new(AdvisoryLock { session, owner }))
    }
}
