//! SQLite backend.
//!
//! One database file holds five tables:
//! - `users`: registered accounts
//! - `reports`: completed research reports, unique per normalized key
//! - `research_runs`: assembler state for in-progress or failed runs
//! - `chats` / `qanda`: chat sessions and their history
//!
//! Timestamps are stored as RFC 3339 text in UTC with a fixed precision, so
//! lexical order matches chronological order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use polibrief_core::error::StoreError;
use polibrief_core::{
    Chat, ChatStore, NewChat, NewUser, PoliticianProfile, PoliticianReport, QuestionAnswer, ReportKey, ReportStore,
    ResearchRun, User, UserStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, info};

type StoreResult<T> = Result<T, StoreError>;

/// Profile columns on `reports`, added to older databases on open.
const PROFILE_COLUMNS: [&str; 3] = ["party", "bio", "image_url"];

/// The production SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and run migrations.
    ///
    /// `sqlite::memory:` gives an ephemeral database held by a single
    /// connection for the lifetime of the store.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let in_memory = url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {url}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        let statements: [(&str, &str); 7] = [
            (
                "users table",
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id            INTEGER PRIMARY KEY AUTOINCREMENT,
                    username      TEXT UNIQUE NOT NULL,
                    first_name    TEXT NOT NULL DEFAULT '',
                    last_name     TEXT NOT NULL DEFAULT '',
                    password_hash TEXT NOT NULL,
                    created_at    TEXT NOT NULL
                )
                "#,
            ),
            (
                "reports table",
                r#"
                CREATE TABLE IF NOT EXISTS reports (
                    id              INTEGER PRIMARY KEY AUTOINCREMENT,
                    name            TEXT NOT NULL,
                    position        TEXT NOT NULL DEFAULT '',
                    name_key        TEXT NOT NULL,
                    position_key    TEXT NOT NULL,
                    background      TEXT NOT NULL,
                    accomplishments TEXT NOT NULL,
                    criticisms      TEXT NOT NULL,
                    summary         TEXT NOT NULL,
                    policy_stances  TEXT NOT NULL DEFAULT '[]',
                    sources         TEXT NOT NULL DEFAULT '[]',
                    party           TEXT NOT NULL DEFAULT '',
                    bio             TEXT NOT NULL DEFAULT '',
                    image_url       TEXT NOT NULL DEFAULT '',
                    created_at      TEXT NOT NULL,
                    updated_at      TEXT NOT NULL,
                    UNIQUE (name_key, position_key)
                )
                "#,
            ),
            (
                "research_runs table",
                r#"
                CREATE TABLE IF NOT EXISTS research_runs (
                    name_key     TEXT NOT NULL,
                    position_key TEXT NOT NULL,
                    run          TEXT NOT NULL,
                    state        TEXT NOT NULL,
                    updated_at   TEXT NOT NULL,
                    PRIMARY KEY (name_key, position_key)
                )
                "#,
            ),
            (
                "chats table",
                r#"
                CREATE TABLE IF NOT EXISTS chats (
                    id              INTEGER PRIMARY KEY AUTOINCREMENT,
                    politician      TEXT NOT NULL,
                    position        TEXT NOT NULL DEFAULT '',
                    user_id         INTEGER REFERENCES users(id) ON DELETE CASCADE,
                    research_report INTEGER REFERENCES reports(id) ON DELETE SET NULL,
                    created_at      TEXT NOT NULL,
                    updated_at      TEXT NOT NULL
                )
                "#,
            ),
            (
                "qanda table",
                r#"
                CREATE TABLE IF NOT EXISTS qanda (
                    id         INTEGER PRIMARY KEY AUTOINCREMENT,
                    chat_id    INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                    question   TEXT NOT NULL,
                    answer     TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "chats index",
                "CREATE INDEX IF NOT EXISTS idx_chats_user ON chats(user_id, updated_at DESC)",
            ),
            (
                "qanda index",
                "CREATE INDEX IF NOT EXISTS idx_qanda_chat ON qanda(chat_id, created_at)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }
        self.add_profile_columns().await?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn add_profile_columns(&self) -> StoreResult<()> {
        let existing: HashSet<String> = sqlx::query("PRAGMA table_info(reports)")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("reports columns: {e}")))?
            .iter()
            .filter_map(|row| row.try_get::<String, _>("name").ok())
            .collect();

        for column in PROFILE_COLUMNS.into_iter().filter(|c| !existing.contains(*c)) {
            let sql = format!("ALTER TABLE reports ADD COLUMN {column} TEXT NOT NULL DEFAULT ''");
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("reports.{column}: {e}")))?;
            info!(column, "Added reports column");
        }
        Ok(())
    }

    fn row_to_report(row: &sqlx::sqlite::SqliteRow) -> StoreResult<PoliticianReport> {
        let stances: String = get(row, "policy_stances")?;
        let sources: String = get(row, "sources")?;
        Ok(PoliticianReport {
            id: get(row, "id")?,
            name: get(row, "name")?,
            position: get(row, "position")?,
            background: get(row, "background")?,
            accomplishments: get(row, "accomplishments")?,
            criticisms: get(row, "criticisms")?,
            summary: get(row, "summary")?,
            policy_stances: serde_json::from_str(&stances).unwrap_or_default(),
            sources: serde_json::from_str(&sources).unwrap_or_default(),
            profile: PoliticianProfile {
                party: get(row, "party")?,
                bio: get(row, "bio")?,
                image_url: get(row, "image_url")?,
            },
            created_at: parse_ts(&get::<String>(row, "created_at")?)?,
            updated_at: parse_ts(&get::<String>(row, "updated_at")?)?,
        })
    }

    fn row_to_chat(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Chat> {
        Ok(Chat {
            id: get(row, "id")?,
            politician: get(row, "politician")?,
            position: get(row, "position")?,
            user_id: get(row, "user_id")?,
            research_report: get(row, "research_report")?,
            created_at: parse_ts(&get::<String>(row, "created_at")?)?,
            updated_at: parse_ts(&get::<String>(row, "updated_at")?)?,
        })
    }

    fn row_to_qanda(row: &sqlx::sqlite::SqliteRow) -> StoreResult<QuestionAnswer> {
        Ok(QuestionAnswer {
            id: get(row, "id")?,
            chat: get(row, "chat_id")?,
            question: get(row, "question")?,
            answer: get(row, "answer")?,
            created_at: parse_ts(&get::<String>(row, "created_at")?)?,
        })
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> StoreResult<User> {
        Ok(User {
            id: get(row, "id")?,
            username: get(row, "username")?,
            first_name: get(row, "first_name")?,
            last_name: get(row, "last_name")?,
            password_hash: get(row, "password_hash")?,
            created_at: parse_ts(&get::<String>(row, "created_at")?)?,
        })
    }
}

fn get<'r, T>(row: &'r sqlx::sqlite::SqliteRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StoreError::QueryFailed(format!("{column} column: {e}")))
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("bad timestamp '{s}': {e}")))
}

fn query_failed(e: sqlx::Error) -> StoreError {
    StoreError::QueryFailed(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl ReportStore for SqliteStore {
    async fn get_report(&self, key: &ReportKey) -> StoreResult<Option<PoliticianReport>> {
        let row = sqlx::query("SELECT * FROM reports WHERE name_key = ? AND position_key = ?")
            .bind(key.name_key())
            .bind(key.position_key())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_report).transpose()
    }

    async fn get_report_by_id(&self, id: i64) -> StoreResult<Option<PoliticianReport>> {
        let row = sqlx::query("SELECT * FROM reports WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_report).transpose()
    }

    async fn upsert_report(&self, report: PoliticianReport) -> StoreResult<PoliticianReport> {
        let key = report.key();
        let stances = serde_json::to_string(&report.policy_stances)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let sources = serde_json::to_string(&report.sources)
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO reports (name, position, name_key, position_key, background,
                accomplishments, criticisms, summary, policy_stances, sources,
                party, bio, image_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (name_key, position_key) DO UPDATE SET
                background      = excluded.background,
                accomplishments = excluded.accomplishments,
                criticisms      = excluded.criticisms,
                summary         = excluded.summary,
                policy_stances  = excluded.policy_stances,
                sources         = excluded.sources,
                party           = excluded.party,
                bio             = excluded.bio,
                image_url       = excluded.image_url,
                updated_at      = excluded.updated_at
            "#,
        )
        .bind(&key.name)
        .bind(&key.position)
        .bind(key.name_key())
        .bind(key.position_key())
        .bind(&report.background)
        .bind(&report.accomplishments)
        .bind(&report.criticisms)
        .bind(&report.summary)
        .bind(stances)
        .bind(sources)
        .bind(&report.profile.party)
        .bind(&report.profile.bio)
        .bind(&report.profile.image_url)
        .bind(ts(&report.created_at))
        .bind(ts(&report.updated_at))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        self.get_report(&key)
            .await?
            .ok_or_else(|| StoreError::QueryFailed(format!("report for {key} vanished after upsert")))
    }

    async fn get_run(&self, key: &ReportKey) -> StoreResult<Option<ResearchRun>> {
        let row = sqlx::query("SELECT run FROM research_runs WHERE name_key = ? AND position_key = ?")
            .bind(key.name_key())
            .bind(key.position_key())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;

        match row {
            Some(row) => {
                let json: String = get(&row, "run")?;
                serde_json::from_str(&json)
                    .map(Some)
                    .map_err(|e| StoreError::QueryFailed(format!("research run: {e}")))
            }
            None => Ok(None),
        }
    }

    async fn save_run(&self, run: &ResearchRun) -> StoreResult<()> {
        let json = serde_json::to_string(run).map_err(|e| StoreError::Storage(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO research_runs (name_key, position_key, run, state, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (name_key, position_key) DO UPDATE SET
                run = excluded.run,
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(run.key.name_key())
        .bind(run.key.position_key())
        .bind(json)
        .bind(run.state.as_str())
        .bind(ts(&run.updated_at))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn clear_run(&self, key: &ReportKey) -> StoreResult<()> {
        sqlx::query("DELETE FROM research_runs WHERE name_key = ? AND position_key = ?")
            .bind(key.name_key())
            .bind(key.position_key())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn count_reports(&self) -> StoreResult<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM reports")
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;
        let n: i64 = get(&row, "n")?;
        Ok(n as usize)
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn create_chat(&self, chat: NewChat) -> StoreResult<Chat> {
        let now = ts(&Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO chats (politician, position, user_id, research_report, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chat.politician)
        .bind(&chat.position)
        .bind(chat.user_id)
        .bind(chat.research_report)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        let id = result.last_insert_rowid();
        self.get_chat(id)
            .await?
            .ok_or_else(|| StoreError::QueryFailed(format!("chat {id} vanished after insert")))
    }

    async fn get_chat(&self, id: i64) -> StoreResult<Option<Chat>> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_chat).transpose()
    }

    async fn list_chats_for_user(&self, user_id: i64) -> StoreResult<Vec<Chat>> {
        let rows = sqlx::query(
            "SELECT * FROM chats WHERE user_id = ? ORDER BY updated_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        rows.iter().map(Self::row_to_chat).collect()
    }

    async fn delete_chat(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_qanda(
        &self,
        chat_id: i64,
        question: &str,
        answer: &str,
    ) -> StoreResult<QuestionAnswer> {
        let now = ts(&Utc::now());
        let mut tx = self.pool.begin().await.map_err(query_failed)?;

        let result = sqlx::query(
            "INSERT INTO qanda (chat_id, question, answer, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(chat_id)
        .bind(question)
        .bind(answer)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(query_failed)?;
        let id = result.last_insert_rowid();

        sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(chat_id)
            .execute(&mut *tx)
            .await
            .map_err(query_failed)?;

        tx.commit().await.map_err(query_failed)?;

        let row = sqlx::query("SELECT * FROM qanda WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;
        Self::row_to_qanda(&row)
    }

    async fn list_qanda(&self, chat_id: i64) -> StoreResult<Vec<QuestionAnswer>> {
        let rows = sqlx::query("SELECT * FROM qanda WHERE chat_id = ? ORDER BY created_at, id")
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(Self::row_to_qanda).collect()
    }

    async fn purge_temporary_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let result = sqlx::query("DELETE FROM chats WHERE user_id IS NULL AND created_at < ?")
            .bind(ts(&cutoff))
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, first_name, last_name, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(ts(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("username '{}' is taken", user.username))
            } else {
                query_failed(e)
            }
        })?;

        let id = result.last_insert_rowid();
        self.get_user(id)
            .await?
            .ok_or_else(|| StoreError::QueryFailed(format!("user {id} vanished after insert")))
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_user).transpose()
    }
}
