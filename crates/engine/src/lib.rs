//! Client-side synchronization of a user's expenses with the hosted backend.
//!
//! The backend owns the data; this crate owns a cache of it. [`ExpenseSync`]
//! reads through the cache and mutates through a [`RemoteStore`], invalidating
//! (and for edits, optimistically rewriting) the cached list.

pub use api_types::{
    Amount,
    auth::{AuthSession, User, UserId},
    expense::{Expense, ExpenseChanges, ExpenseId, NewExpense},
};
pub use cache::{QueryCache, QueryKey};
pub use error::{ReportError, StoreError, SyncError};
pub use form::{ExpenseFields, ExpenseForm};
pub use memory::MemoryStore;
pub use optimistic::{MutationState, OptimisticUpdate, optimistic};
pub use session::{Session, SessionContext};
pub use store::RemoteStore;
pub use sync::{DEFAULT_STALE_TIME, ExpenseSync};

pub mod cache;
mod error;
pub mod form;
pub mod memory;
pub mod optimistic;
pub mod report;
mod session;
mod store;
mod sync;
