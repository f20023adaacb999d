pub mod queries;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use std::fs;
use std::path::Path;

const STREAK_COLUMNS: &str = "id, user_id, type, current_streak, goal, start_date, last_check_in, is_active, created_at, updated_at";
const ATTEMPT_COLUMNS: &str =
    "id, streak_id, start_date, end_date, duration, is_completed, created_at";
const QUOTE_COLUMNS: &str = "id, text, author, image_url, category, created_at";
const USER_COLUMNS: &str =
    "id, email, name, vices, password_hash, created_at, updated_at";

/// Streak row exactly as stored. Validated into `streak::Streak` by the service layer.
#[derive(Debug, Clone, Serialize)]
pub struct StreakRow {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub current_streak: i64,
    pub goal: i64,
    pub start_date: DateTime<Utc>,
    pub last_check_in: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptRow {
    pub id: i64,
    pub streak_id: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub duration: i64,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteRow {
    pub id: i64,
    pub text: String,
    pub author: String,
    pub image_url: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub vices: String,
    /// PHC-formatted argon2 hash.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub token: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStreak<'a> {
    pub user_id: i64,
    pub kind: &'a str,
    pub goal: i64,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub streak_id: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration: i64,
    pub is_completed: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub password_hash: &'a str,
    pub now: DateTime<Utc>,
}

/// Table operations the streak service depends on.
pub trait StreakStore {
    /// Active streaks of one owner, newest first.
    fn active_streaks_for_user(&self, user_id: i64) -> Result<Vec<StreakRow>>;
    /// Every streak row the owner ever had, deactivated ones included.
    fn streak_count_for_user(&self, user_id: i64) -> Result<i64>;
    fn streak(&self, streak_id: i64) -> Result<Option<StreakRow>>;
    fn insert_streak(&self, streak: &NewStreak<'_>) -> Result<StreakRow>;
    fn update_streak_progress(
        &self,
        streak_id: i64,
        current_streak: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<StreakRow>>;
    fn reset_streak_row(&self, streak_id: i64, at: DateTime<Utc>) -> Result<()>;
    fn deactivate_streak(&self, streak_id: i64, at: DateTime<Utc>) -> Result<()>;
    fn insert_attempt(&self, attempt: &NewAttempt) -> Result<AttemptRow>;
    /// Attempts of one streak, most recent start first.
    fn attempts_for_streak(&self, streak_id: i64) -> Result<Vec<AttemptRow>>;
    fn random_quotes(&self, limit: usize) -> Result<Vec<QuoteRow>>;
    fn quotes_by_category(&self, category: &str) -> Result<Vec<QuoteRow>>;
    fn user(&self, user_id: i64) -> Result<Option<UserRow>>;
    fn update_user(
        &self,
        user_id: i64,
        name: Option<&str>,
        vices: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<UserRow>>;
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite DB: {}", path.display()))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;

        let database = Self { conn };
        database.init_schema()?;

        Ok(database)
    }

    pub fn init_schema(&self) -> Result<()> {
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| {
                self.conn
                    .execute_batch(statement)
                    .context("Failed to initialize schema")
            })
    }

    pub fn insert_user(&self, user: &NewUser<'_>) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO users (email, name, vices, password_hash, created_at, updated_at)
                 VALUES (?1, ?2, '', ?3, ?4, ?4)",
                params![user.email, user.name, user.password_hash, user.now],
            )
            .context("Failed to insert user")?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                user_row,
            )
            .optional()
            .context("Failed to query user by email")
    }

    pub fn insert_session(&self, token: &str, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![token, user_id, at],
            )
            .context("Failed to insert session")?;

        Ok(())
    }

    pub fn session(&self, token: &str) -> Result<Option<SessionRow>> {
        self.conn
            .query_row(
                "SELECT token, user_id, created_at FROM sessions WHERE token = ?1",
                params![token],
                |row| {
                    Ok(SessionRow {
                        token: row.get(0)?,
                        user_id: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to query session")
    }

    pub fn delete_session(&self, token: &str) -> Result<usize> {
        self.conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .context("Failed to delete session")
    }

    pub fn count_users(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .context("Failed to count users")
    }
}

impl StreakStore for Database {
    fn active_streaks_for_user(&self, user_id: i64) -> Result<Vec<StreakRow>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {STREAK_COLUMNS}
             FROM streaks
             WHERE user_id = ?1 AND is_active = 1
             ORDER BY created_at DESC, id DESC"
        ))?;

        let rows = statement
            .query_map(params![user_id], streak_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query streaks")?;

        Ok(rows)
    }

    fn streak_count_for_user(&self, user_id: i64) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM streaks WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .context("Failed to count streaks")
    }

    fn streak(&self, streak_id: i64) -> Result<Option<StreakRow>> {
        self.conn
            .query_row(
                &format!("SELECT {STREAK_COLUMNS} FROM streaks WHERE id = ?1"),
                params![streak_id],
                streak_row,
            )
            .optional()
            .context("Failed to query streak")
    }

    fn insert_streak(&self, streak: &NewStreak<'_>) -> Result<StreakRow> {
        self.conn
            .execute(
                "INSERT INTO streaks (user_id, type, current_streak, goal, start_date, last_check_in, is_active, created_at, updated_at)
                 VALUES (?1, ?2, 0, ?3, ?4, ?4, 1, ?4, ?4)",
                params![streak.user_id, streak.kind, streak.goal, streak.now],
            )
            .context("Failed to insert streak")?;

        let id = self.conn.last_insert_rowid();
        self.streak(id)?
            .with_context(|| format!("Inserted streak {id} could not be read back"))
    }

    fn update_streak_progress(
        &self,
        streak_id: i64,
        current_streak: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<StreakRow>> {
        let updated = self
            .conn
            .execute(
                "UPDATE streaks SET current_streak = ?2, last_check_in = ?3, updated_at = ?3 WHERE id = ?1",
                params![streak_id, current_streak, at],
            )
            .context("Failed to update streak")?;

        if updated == 0 {
            return Ok(None);
        }

        self.streak(streak_id)
    }

    fn reset_streak_row(&self, streak_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE streaks SET current_streak = 0, start_date = ?2, last_check_in = ?2, updated_at = ?2 WHERE id = ?1",
                params![streak_id, at],
            )
            .context("Failed to reset streak")?;

        Ok(())
    }

    fn deactivate_streak(&self, streak_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE streaks SET is_active = 0, updated_at = ?2 WHERE id = ?1",
                params![streak_id, at],
            )
            .context("Failed to deactivate streak")?;

        Ok(())
    }

    fn insert_attempt(&self, attempt: &NewAttempt) -> Result<AttemptRow> {
        self.conn
            .execute(
                "INSERT INTO streak_attempts (streak_id, start_date, end_date, duration, is_completed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?3)",
                params![
                    attempt.streak_id,
                    attempt.start_date,
                    attempt.end_date,
                    attempt.duration,
                    attempt.is_completed
                ],
            )
            .context("Failed to insert streak attempt")?;

        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                &format!("SELECT {ATTEMPT_COLUMNS} FROM streak_attempts WHERE id = ?1"),
                params![id],
                attempt_row,
            )
            .context("Failed to read back streak attempt")
    }

    fn attempts_for_streak(&self, streak_id: i64) -> Result<Vec<AttemptRow>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {ATTEMPT_COLUMNS}
             FROM streak_attempts
             WHERE streak_id = ?1
             ORDER BY start_date DESC, id DESC"
        ))?;

        let rows = statement
            .query_map(params![streak_id], attempt_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query streak attempts")?;

        Ok(rows)
    }

    fn random_quotes(&self, limit: usize) -> Result<Vec<QuoteRow>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {QUOTE_COLUMNS} FROM motivational_quotes ORDER BY RANDOM() LIMIT ?1"
        ))?;

        let rows = statement
            .query_map(params![limit as i64], quote_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query motivational quotes")?;

        Ok(rows)
    }

    fn quotes_by_category(&self, category: &str) -> Result<Vec<QuoteRow>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {QUOTE_COLUMNS}
             FROM motivational_quotes
             WHERE category = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;

        let rows = statement
            .query_map(params![category], quote_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query motivational quotes by category")?;

        Ok(rows)
    }

    fn user(&self, user_id: i64) -> Result<Option<UserRow>> {
        self.conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![user_id],
                user_row,
            )
            .optional()
            .context("Failed to query user")
    }

    fn update_user(
        &self,
        user_id: i64,
        name: Option<&str>,
        vices: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<UserRow>> {
        self.conn
            .execute(
                "UPDATE users SET name = COALESCE(?2, name), vices = COALESCE(?3, vices), updated_at = ?4 WHERE id = ?1",
                params![user_id, name, vices, at],
            )
            .context("Failed to update user profile")?;

        self.user(user_id)
    }
}

fn streak_row(row: &Row<'_>) -> rusqlite::Result<StreakRow> {
    Ok(StreakRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        current_streak: row.get(3)?,
        goal: row.get(4)?,
        start_date: row.get(5)?,
        last_check_in: row.get(6)?,
        is_active: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn attempt_row(row: &Row<'_>) -> rusqlite::Result<AttemptRow> {
    Ok(AttemptRow {
        id: row.get(0)?,
        streak_id: row.get(1)?,
        start_date: row.get(2)?,
        end_date: row.get(3)?,
        duration: row.get(4)?,
        is_completed: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn quote_row(row: &Row<'_>) -> rusqlite::Result<QuoteRow> {
    Ok(QuoteRow {
        id: row.get(0)?,
        text: row.get(1)?,
        author: row.get(2)?,
        image_url: row.get(3)?,
        category: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        vices: row.get(3)?,
        password_hash: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
