use crate::auth::Session;
use crate::db::{AttemptRow, NewAttempt, NewStreak, QuoteRow, StreakRow, StreakStore, UserRow};
use crate::error::VicesError;
use crate::streak::{Attempt, Goal, HabitKind, Streak, generate_milestones, update_progress};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub vices: Vec<HabitKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub id: i64,
    pub text: String,
    pub author: String,
    pub image_url: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

pub fn user_streaks<S: StreakStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
    user_id: i64,
) -> Result<Vec<Streak>, VicesError> {
    let session = require_session(session)?;
    if session.user_id != user_id {
        return Err(VicesError::AuthorizationMismatch(
            "Cannot access other user's streaks".to_string(),
        ));
    }

    let now = Utc::now();
    let rows = store
        .active_streaks_for_user(user_id)
        .map_err(VicesError::external)?;
    debug!(user_id, count = rows.len(), "loaded streak rows");

    rows.into_iter()
        .map(|row| streak_from_row(row, now))
        .collect()
}

/// True once the owner has had any streak, including deactivated ones.
pub fn has_streak_history<S: StreakStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
    user_id: i64,
) -> Result<bool, VicesError> {
    let session = require_session(session)?;
    if session.user_id != user_id {
        return Err(VicesError::AuthorizationMismatch(
            "Cannot access other user's streaks".to_string(),
        ));
    }

    let count = store
        .streak_count_for_user(user_id)
        .map_err(VicesError::external)?;
    Ok(count > 0)
}

pub fn get_streak<S: StreakStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
    streak_id: i64,
) -> Result<Streak, VicesError> {
    let session = require_session(session)?;
    let row = owned_streak_row(store, session, streak_id, "access")?;
    streak_from_row(row, Utc::now())
}

pub fn create_streak<S: StreakStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
    user_id: i64,
    kind: HabitKind,
    goal: Goal,
) -> Result<Streak, VicesError> {
    let session = require_session(session)?;
    if session.user_id != user_id {
        return Err(VicesError::AuthorizationMismatch(
            "Cannot create streak for other user".to_string(),
        ));
    }

    let now = Utc::now();
    let row = store
        .insert_streak(&NewStreak {
            user_id,
            kind: kind.as_str(),
            goal: i64::from(goal.days()),
            now,
        })
        .map_err(VicesError::external)?;
    info!(user_id, streak_id = row.id, kind = %kind, goal = goal.days(), "streak created");

    streak_from_row(row, now)
}

/// Stores `current_streak` as the new elapsed-day count and stamps the check-in.
pub fn update_streak<S: StreakStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
    streak_id: i64,
    current_streak: u32,
) -> Result<Streak, VicesError> {
    let session = require_session(session)?;
    owned_streak_row(store, session, streak_id, "update")?;
    write_progress(store, streak_id, current_streak)
}

/// Adds exactly one day to the persisted count. Repeated confirmations on
/// the same calendar day are not deduplicated.
pub fn confirm_today<S: StreakStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
    streak_id: i64,
) -> Result<Streak, VicesError> {
    let session = require_session(session)?;
    let row = owned_streak_row(store, session, streak_id, "update")?;
    let current = elapsed_days(&row)?;

    if current > 0 && row.last_check_in.date_naive() == Utc::now().date_naive() {
        warn!(streak_id, current, "streak already confirmed today");
    }

    write_progress(store, streak_id, current.saturating_add(1))
}

/// Closes the current run as an attempt (when it has any days) and zeroes the
/// streak. The two writes are not atomic: a failure between them leaves the
/// attempt recorded while the streak keeps its count.
pub fn reset_streak<S: StreakStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
    streak_id: i64,
) -> Result<Option<Attempt>, VicesError> {
    let session = require_session(session)?;
    let row = owned_streak_row(store, session, streak_id, "reset")?;
    let current = elapsed_days(&row)?;
    let goal = row_goal(&row)?;
    let now = Utc::now();

    let attempt = if current > 0 {
        let attempt = store
            .insert_attempt(&NewAttempt {
                streak_id,
                start_date: row.start_date,
                end_date: now,
                duration: i64::from(current),
                is_completed: current >= goal.days(),
            })
            .map_err(VicesError::external)?;
        Some(attempt_from_row(attempt)?)
    } else {
        None
    };

    store
        .reset_streak_row(streak_id, now)
        .map_err(VicesError::external)?;
    info!(streak_id, duration = current, "streak reset");

    Ok(attempt)
}

pub fn deactivate_streak<S: StreakStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
    streak_id: i64,
) -> Result<(), VicesError> {
    let session = require_session(session)?;
    owned_streak_row(store, session, streak_id, "deactivate")?;

    store
        .deactivate_streak(streak_id, Utc::now())
        .map_err(VicesError::external)?;
    info!(streak_id, "streak deactivated");

    Ok(())
}

/// Attempt history of one streak, most recent first.
pub fn streak_attempts<S: StreakStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
    streak_id: i64,
) -> Result<Vec<Attempt>, VicesError> {
    let session = require_session(session)?;
    owned_streak_row(store, session, streak_id, "access")?;

    store
        .attempts_for_streak(streak_id)
        .map_err(VicesError::external)?
        .into_iter()
        .map(attempt_from_row)
        .collect()
}

pub fn random_quotes<S: StreakStore + ?Sized>(
    store: &S,
    limit: usize,
) -> Result<Vec<Quote>, VicesError> {
    Ok(store
        .random_quotes(limit)
        .map_err(VicesError::external)?
        .into_iter()
        .map(quote_from_row)
        .collect())
}

pub fn quotes_by_category<S: StreakStore + ?Sized>(
    store: &S,
    category: &str,
) -> Result<Vec<Quote>, VicesError> {
    Ok(store
        .quotes_by_category(category)
        .map_err(VicesError::external)?
        .into_iter()
        .map(quote_from_row)
        .collect())
}

pub fn user_profile<S: StreakStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
    user_id: i64,
) -> Result<User, VicesError> {
    let session = require_session(session)?;
    if session.user_id != user_id {
        return Err(VicesError::AuthorizationMismatch(
            "Cannot access other user's profile".to_string(),
        ));
    }

    store
        .user(user_id)
        .map_err(VicesError::external)?
        .map(user_from_row)
        .ok_or_else(|| VicesError::NotFound(format!("User {user_id}")))
}

pub fn update_user_profile<S: StreakStore + ?Sized>(
    store: &S,
    session: Option<&Session>,
    user_id: i64,
    name: Option<&str>,
    vices: Option<&[HabitKind]>,
) -> Result<User, VicesError> {
    let session = require_session(session)?;
    if session.user_id != user_id {
        return Err(VicesError::AuthorizationMismatch(
            "Cannot update other user's profile".to_string(),
        ));
    }

    let vices = vices.map(|kinds| {
        kinds
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(",")
    });

    store
        .update_user(user_id, name.map(str::trim), vices.as_deref(), Utc::now())
        .map_err(VicesError::external)?
        .map(user_from_row)
        .ok_or_else(|| VicesError::NotFound(format!("User {user_id}")))
}

fn require_session(session: Option<&Session>) -> Result<&Session, VicesError> {
    session.ok_or(VicesError::AuthenticationMissing)
}

fn owned_streak_row<S: StreakStore + ?Sized>(
    store: &S,
    session: &Session,
    streak_id: i64,
    action: &str,
) -> Result<StreakRow, VicesError> {
    let row = store
        .streak(streak_id)
        .map_err(VicesError::external)?
        .ok_or_else(|| VicesError::NotFound(format!("Streak {streak_id}")))?;

    if row.user_id != session.user_id {
        warn!(streak_id, user_id = session.user_id, action, "refused access to foreign streak");
        return Err(VicesError::AuthorizationMismatch(format!(
            "Cannot {action} other user's streak"
        )));
    }

    Ok(row)
}

fn write_progress<S: StreakStore + ?Sized>(
    store: &S,
    streak_id: i64,
    current_streak: u32,
) -> Result<Streak, VicesError> {
    let now = Utc::now();
    let row = store
        .update_streak_progress(streak_id, i64::from(current_streak), now)
        .map_err(VicesError::external)?
        .ok_or_else(|| VicesError::NotFound(format!("Streak {streak_id}")))?;
    debug!(streak_id, current_streak, "streak progress stored");

    streak_from_row(row, now)
}

pub(crate) fn streak_from_row(row: StreakRow, now: DateTime<Utc>) -> Result<Streak, VicesError> {
    let kind = row.kind.parse::<HabitKind>().map_err(|reason| VicesError::InvalidRow {
        table: "streaks",
        id: row.id,
        reason,
    })?;
    let current_streak = elapsed_days(&row)?;
    let goal = row_goal(&row)?;
    let milestones = update_progress(&generate_milestones(row.id, goal), current_streak, now);

    Ok(Streak {
        id: row.id,
        user_id: row.user_id,
        kind,
        current_streak,
        goal,
        start_date: row.start_date,
        last_check_in: row.last_check_in,
        is_active: row.is_active,
        created_at: row.created_at,
        updated_at: row.updated_at,
        milestones,
    })
}

fn elapsed_days(row: &StreakRow) -> Result<u32, VicesError> {
    u32::try_from(row.current_streak).map_err(|_| VicesError::InvalidRow {
        table: "streaks",
        id: row.id,
        reason: format!("current_streak out of range: {}", row.current_streak),
    })
}

fn row_goal(row: &StreakRow) -> Result<Goal, VicesError> {
    Goal::new(row.goal).map_err(|error| VicesError::InvalidRow {
        table: "streaks",
        id: row.id,
        reason: error.to_string(),
    })
}

fn attempt_from_row(row: AttemptRow) -> Result<Attempt, VicesError> {
    let duration = u32::try_from(row.duration).map_err(|_| VicesError::InvalidRow {
        table: "streak_attempts",
        id: row.id,
        reason: format!("duration out of range: {}", row.duration),
    })?;

    Ok(Attempt {
        id: row.id,
        streak_id: row.streak_id,
        start_date: row.start_date,
        end_date: row.end_date,
        duration,
        is_completed: row.is_completed,
        created_at: row.created_at,
    })
}

fn quote_from_row(row: QuoteRow) -> Quote {
    Quote {
        id: row.id,
        text: row.text,
        author: row.author,
        image_url: row.image_url,
        category: row.category,
        created_at: row.created_at,
    }
}

fn user_from_row(row: UserRow) -> User {
    let vices = row
        .vices
        .split(',')
        .filter_map(|raw| raw.parse::<HabitKind>().ok())
        .collect();

    User {
        id: row.id,
        email: row.email,
        name: row.name,
        vices,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}
