//! Expense synchronization layer.
//!
//! [`ExpenseSync`] keeps the current user's expenses cached under
//! [`QueryKey::Expenses`] and exposes the four operations the presentation
//! uses. Reads are served from the cache while fresh; every successful
//! mutation invalidates the key. `edit` is optimistic: the cached row changes
//! before the store answers and is restored if the store refuses.

use std::time::Duration;

use api_types::{
    auth::UserId,
    expense::{Expense, ExpenseChanges, ExpenseId},
};

use crate::{
    cache::{QueryCache, QueryKey},
    error::{StoreError, SyncError},
    form::ExpenseFields,
    optimistic::optimistic,
    session::{Session, SessionContext},
    store::RemoteStore,
};

pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(30);

type ResultSync<T> = Result<T, SyncError>;

pub struct ExpenseSync<S> {
    store: S,
    session: SessionContext,
    cache: QueryCache<QueryKey, Vec<Expense>>,
    stale_time: Duration,
}

impl<S: RemoteStore> ExpenseSync<S> {
    pub fn new(store: S, session: SessionContext) -> Self {
        Self {
            store,
            session,
            cache: QueryCache::new(),
            stale_time: DEFAULT_STALE_TIME,
        }
    }

    /// How long a fetched list is served without asking the store again.
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &QueryCache<QueryKey, Vec<Expense>> {
        &self.cache
    }

    /// Session, its user, and the cache key scoped to that user.
    fn scope(&self) -> ResultSync<(Session, UserId, QueryKey)> {
        let session = self.session.current();
        let user = session
            .user_id()
            .cloned()
            .ok_or(SyncError::Unauthenticated)?;
        let key = QueryKey::expenses(&user);
        Ok((session, user, key))
    }

    /// Asks the store who the session belongs to. A session whose user does
    /// not match the one the cache is keyed by counts as no session.
    async fn resolve_user(
        &self,
        session: &Session,
        expected: &UserId,
        fold: fn(StoreError) -> SyncError,
    ) -> ResultSync<UserId> {
        match self.store.current_user(session).await {
            Ok(Some(user)) if &user.id == expected => Ok(user.id),
            Ok(Some(user)) => {
                tracing::warn!(
                    session_user = %expected,
                    remote_user = %user.id,
                    "session user mismatch"
                );
                Err(SyncError::Unauthenticated)
            }
            Ok(None) => Err(SyncError::Unauthenticated),
            Err(err) => Err(fold(err)),
        }
    }

    /// The current user's expenses, most recent first.
    pub async fn list(&self) -> ResultSync<Vec<Expense>> {
        let (session, user, key) = self.scope()?;
        if self.cache.is_fresh(&key, self.stale_time)
            && let Some(rows) = self.cache.get(&key)
        {
            tracing::debug!(key = %key, rows = rows.len(), "cache hit");
            return Ok(rows);
        }
        self.fetch(&session, &user, &key).await
    }

    /// Like [`ExpenseSync::list`] but always asks the store.
    pub async fn refresh(&self) -> ResultSync<Vec<Expense>> {
        let (session, user, key) = self.scope()?;
        self.fetch(&session, &user, &key).await
    }

    async fn fetch(
        &self,
        session: &Session,
        user: &UserId,
        key: &QueryKey,
    ) -> ResultSync<Vec<Expense>> {
        tracing::debug!(key = %key, "fetching");
        let guard = self.cache.begin_fetch(key);
        let user_id = self.resolve_user(session, user, SyncError::read).await?;
        let rows = self
            .store
            .select_expenses(session, &user_id)
            .await
            .map_err(|err| {
                tracing::warn!(key = %key, "fetch failed: {err}");
                SyncError::read(err)
            })?;
        Ok(guard.resolve(rows).into_visible())
    }

    /// Inserts a new row. Not optimistic: the list shows it after the next
    /// read, with the id the store assigned.
    pub async fn add(&self, fields: &ExpenseFields) -> ResultSync<()> {
        let (session, user, key) = self.scope()?;
        let user_id = self.resolve_user(&session, &user, SyncError::write).await?;
        self.store
            .insert_expense(&session, &fields.for_user(&user_id))
            .await
            .map_err(|err| {
                tracing::warn!("insert failed: {err}");
                SyncError::write(err)
            })?;
        self.cache.invalidate(&key);
        tracing::info!(user = %user_id, "expense added");
        Ok(())
    }

    /// Replaces description, amount and date of `id`.
    ///
    /// The cached row is updated right away; on failure the cache goes back
    /// to exactly what it was before the call.
    pub async fn edit(&self, id: &ExpenseId, fields: &ExpenseFields) -> ResultSync<()> {
        let (session, user, key) = self.scope()?;
        let changes = fields.changes();

        let remote = async {
            let user_id = self.resolve_user(&session, &user, SyncError::write).await?;
            self.store
                .update_expense(&session, id, &user_id, &changes)
                .await
                .map_err(SyncError::write)
        };

        let apply = |rows: &Vec<Expense>| apply_changes(rows, id, &changes);
        match optimistic(&self.cache, &key, apply, remote).await {
            Ok(()) => {
                tracing::info!(expense = %id, "expense updated");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(expense = %id, "update failed: {err}");
                Err(err)
            }
        }
    }

    /// Deletes `id`. Not optimistic: the row stays listed until the store
    /// confirms.
    pub async fn delete(&self, id: &ExpenseId) -> ResultSync<()> {
        let (session, user, key) = self.scope()?;
        let user_id = self.resolve_user(&session, &user, SyncError::write).await?;
        self.store
            .delete_expense(&session, id, &user_id)
            .await
            .map_err(|err| {
                tracing::warn!(expense = %id, "delete failed: {err}");
                SyncError::write(err)
            })?;
        self.cache.invalidate(&key);
        tracing::info!(expense = %id, "expense deleted");
        Ok(())
    }

    /// First load in progress for the current user.
    pub fn is_loading(&self) -> bool {
        match self.scope() {
            Ok((_, _, key)) => self.cache.is_loading(&key),
            Err(_) => false,
        }
    }

    /// What the presentation should show right now, stale or not.
    pub fn cached(&self) -> Vec<Expense> {
        match self.scope() {
            Ok((_, _, key)) => self.cache.get(&key).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Drops everything cached, e.g. after sign out.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn apply_changes(rows: &[Expense], id: &ExpenseId, changes: &ExpenseChanges) -> Vec<Expense> {
    rows.iter()
        .cloned()
        .map(|mut row| {
            if &row.id == id {
                row.apply(changes);
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use api_types::Amount;

    use super::*;

    fn row(id: &str, cents: i64) -> Expense {
        Expense {
            id: id.into(),
            description: format!("row {id}"),
            amount: Amount::from_cents(cents),
            date: api_types::date::parse("2024-01-01").unwrap(),
            user_id: "alice".into(),
            category_id: Some("food".to_string()),
            category: None,
        }
    }

    #[test]
    fn apply_changes_touches_only_the_matching_row() {
        let rows = vec![row("1", 1000), row("2", 500)];
        let changes = ExpenseChanges {
            description: "Mercado".to_string(),
            amount: Amount::from_cents(2000),
            date: api_types::date::parse("2024-03-05").unwrap(),
        };
        let out = apply_changes(&rows, &"1".into(), &changes);

        assert_eq!(out[0].description, "Mercado");
        assert_eq!(out[0].amount, Amount::from_cents(2000));
        assert_eq!(out[0].date, changes.date);
        assert_eq!(out[0].category_id.as_deref(), Some("food"));
        assert_eq!(out[0].user_id, rows[0].user_id);
        assert_eq!(out[1], rows[1]);
    }

    #[test]
    fn apply_changes_with_unknown_id_is_identity() {
        let rows = vec![row("1", 1000)];
        let changes = ExpenseChanges {
            description: "x".repeat(3),
            amount: Amount::from_cents(1),
            date: rows[0].date,
        };
        assert_eq!(apply_changes(&rows, &"9".into(), &changes), rows);
    }
}
