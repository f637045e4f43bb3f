use std::sync::Arc;

use api_types::{
    auth::{User, UserId},
    expense::{Expense, ExpenseChanges, ExpenseId, NewExpense},
};
use async_trait::async_trait;

use crate::{error::StoreError, session::Session};

/// The hosted backend as seen by the sync layer.
///
/// Every call carries the session so the implementation can authenticate the
/// request. Row operations are filtered by `user_id` (and `id` where it
/// applies) on top of whatever the backend enforces.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Resolves the user behind the session, `None` when there is no valid
    /// session.
    async fn current_user(&self, session: &Session) -> Result<Option<User>, StoreError>;

    /// All rows of `user_id`, most recent `date` first.
    async fn select_expenses(
        &self,
        session: &Session,
        user_id: &UserId,
    ) -> Result<Vec<Expense>, StoreError>;

    async fn insert_expense(&self, session: &Session, row: &NewExpense) -> Result<(), StoreError>;

    async fn update_expense(
        &self,
        session: &Session,
        id: &ExpenseId,
        user_id: &UserId,
        changes: &ExpenseChanges,
    ) -> Result<(), StoreError>;

    async fn delete_expense(
        &self,
        session: &Session,
        id: &ExpenseId,
        user_id: &UserId,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn current_user(&self, session: &Session) -> Result<Option<User>, StoreError> {
        (**self).current_user(session).await
    }

    async fn select_expenses(
        &self,
        session: &Session,
        user_id: &UserId,
    ) -> Result<Vec<Expense>, StoreError> {
        (**self).select_expenses(session, user_id).await
    }

    async fn insert_expense(&self, session: &Session, row: &NewExpense) -> Result<(), StoreError> {
        (**self).insert_expense(session, row).await
    }

    async fn update_expense(
        &self,
        session: &Session,
        id: &ExpenseId,
        user_id: &UserId,
        changes: &ExpenseChanges,
    ) -> Result<(), StoreError> {
        (**self).update_expense(session, id, user_id, changes).await
    }

    async fn delete_expense(
        &self,
        session: &Session,
        id: &ExpenseId,
        user_id: &UserId,
    ) -> Result<(), StoreError> {
        (**self).delete_expense(session, id, user_id).await
    }
}
