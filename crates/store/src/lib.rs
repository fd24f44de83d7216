//! Persistence backends for polibrief.
//!
//! Both backends implement [`ReportStore`](polibrief_core::ReportStore),
//! [`ChatStore`](polibrief_core::ChatStore) and
//! [`UserStore`](polibrief_core::UserStore).

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
