//! In-memory [`RemoteStore`] with failure injection and gates.
//!
//! Used by the tests and by `gastos --offline`. Gates let a test stop a read
//! or write half way, look at the cache, then let the call finish.

use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use api_types::{
    auth::{AuthSession, User, UserId},
    expense::{Expense, ExpenseChanges, ExpenseId, NewExpense},
};
use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{error::StoreError, session::Session, store::RemoteStore};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<String, User>,
    rows: Vec<Expense>,
    read_failure: Option<StoreError>,
    write_failure: Option<StoreError>,
}

#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    reads_held: watch::Sender<bool>,
    writes_held: watch::Sender<bool>,
    select_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            reads_held: watch::channel(false).0,
            writes_held: watch::channel(false).0,
            select_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a user and returns a session for it.
    pub fn register(&self, user_id: &str) -> AuthSession {
        let user = User {
            id: UserId::from(user_id),
            email: Some(format!("{user_id}@example.com")),
        };
        let access_token = format!("memory-{}", Uuid::new_v4());
        self.lock().users.insert(access_token.clone(), user.clone());
        AuthSession {
            access_token,
            refresh_token: None,
            expires_at: None,
            user,
        }
    }

    /// Makes the token unknown, as a server-side sign out would.
    pub fn revoke(&self, access_token: &str) {
        self.lock().users.remove(access_token);
    }

    /// Inserts a row as is, id included.
    pub fn seed(&self, row: Expense) {
        self.lock().rows.push(row);
    }

    /// Every stored row, most recent first.
    pub fn rows(&self) -> Vec<Expense> {
        let mut rows = self.lock().rows.clone();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        rows
    }

    pub fn fail_reads(&self, err: StoreError) {
        self.lock().read_failure = Some(err);
    }

    pub fn fail_writes(&self, err: StoreError) {
        self.lock().write_failure = Some(err);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.read_failure = None;
        state.write_failure = None;
    }

    /// Blocks `select_expenses` until [`MemoryStore::release_reads`].
    pub fn hold_reads(&self) {
        self.reads_held.send_replace(true);
    }

    pub fn release_reads(&self) {
        self.reads_held.send_replace(false);
    }

    /// Blocks insert/update/delete until [`MemoryStore::release_writes`].
    pub fn hold_writes(&self) {
        self.writes_held.send_replace(true);
    }

    pub fn release_writes(&self) {
        self.writes_held.send_replace(false);
    }

    pub fn select_calls(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn user_for(&self, session: &Session) -> Option<User> {
        let token = session.access_token()?;
        self.lock().users.get(token).cloned()
    }

    fn authorize(&self, session: &Session, user_id: &UserId) -> Result<(), StoreError> {
        match self.user_for(session) {
            Some(user) if &user.id == user_id => Ok(()),
            _ => Err(StoreError::Unauthorized),
        }
    }

    async fn before_write(&self, session: &Session, user_id: &UserId) -> Result<(), StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        wait_open(&self.writes_held).await;
        self.authorize(session, user_id)?;
        match self.lock().write_failure.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn wait_open(gate: &watch::Sender<bool>) {
    let mut rx = gate.subscribe();
    // The sender lives in the store, so the channel cannot close here.
    let _ = rx.wait_for(|held| !*held).await;
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn current_user(&self, session: &Session) -> Result<Option<User>, StoreError> {
        Ok(self.user_for(session))
    }

    async fn select_expenses(
        &self,
        session: &Session,
        user_id: &UserId,
    ) -> Result<Vec<Expense>, StoreError> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        wait_open(&self.reads_held).await;
        self.authorize(session, user_id)?;

        let state = self.lock();
        if let Some(err) = state.read_failure.clone() {
            return Err(err);
        }
        let mut rows: Vec<Expense> = state
            .rows
            .iter()
            .filter(|row| &row.user_id == user_id)
            .cloned()
            .collect();
        drop(state);
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }

    async fn insert_expense(&self, session: &Session, row: &NewExpense) -> Result<(), StoreError> {
        self.before_write(session, &row.user_id).await?;
        self.lock().rows.push(Expense {
            id: ExpenseId::new(Uuid::new_v4().to_string()),
            description: row.description.clone(),
            amount: row.amount,
            date: row.date,
            user_id: row.user_id.clone(),
            category_id: None,
            category: None,
        });
        Ok(())
    }

    async fn update_expense(
        &self,
        session: &Session,
        id: &ExpenseId,
        user_id: &UserId,
        changes: &ExpenseChanges,
    ) -> Result<(), StoreError> {
        self.before_write(session, user_id).await?;
        // Like a filtered PATCH, matching nothing is not an error.
        self.lock()
            .rows
            .iter_mut()
            .filter(|row| &row.id == id && &row.user_id == user_id)
            .for_each(|row| row.apply(changes));
        Ok(())
    }

    async fn delete_expense(
        &self,
        session: &Session,
        id: &ExpenseId,
        user_id: &UserId,
    ) -> Result<(), StoreError> {
        self.before_write(session, user_id).await?;
        self.lock()
            .rows
            .retain(|row| !(&row.id == id && &row.user_id == user_id));
        Ok(())
    }
}
