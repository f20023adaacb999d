use crate::auth::Session;
use crate::db::StreakStore;
use crate::error::VicesError;
use crate::service::{self, Quote, User};
use crate::streak::{Attempt, Goal, HabitKind, ProgressData, Streak, update_progress};
use chrono::Utc;
use tracing::{debug, info, warn};

pub const DEFAULT_QUOTE_COUNT: usize = 3;

/// Per-session application state. Built when a session starts and consumed
/// by [`AppState::sign_out`] when it ends.
pub struct AppState<S: StreakStore> {
    store: S,
    session: Option<Session>,
    user: Option<User>,
    streaks: Vec<Streak>,
    quotes: Vec<Quote>,
    loading: bool,
    error: Option<String>,
}

impl<S: StreakStore> AppState<S> {
    pub fn new(store: S, session: Option<Session>) -> Self {
        Self {
            store,
            session,
            user: None,
            streaks: Vec::new(),
            quotes: Vec::new(),
            loading: false,
            error: None,
        }
    }

    /// Loads the profile, streaks and quotes. Profile and quote failures are
    /// recorded and logged but do not stop the start.
    pub fn start(&mut self) -> Result<(), VicesError> {
        self.load_profile();
        self.load_user_streaks()?;

        if let Err(error) = self.load_quotes(DEFAULT_QUOTE_COUNT) {
            warn!(error = %error, "failed to load quotes");
        }

        Ok(())
    }

    /// Creates one streak per habit kind with the default goal when the owner
    /// has never had a streak. Run after sign-in, not on every start, so
    /// deactivated streaks stay gone. Returns how many were created.
    pub fn ensure_default_streaks(&mut self) -> Result<usize, VicesError> {
        self.begin();
        let result = self.create_defaults();
        self.record("create default streaks", result)
    }

    pub fn create_streak(&mut self, kind: HabitKind, goal: Goal) -> Result<Streak, VicesError> {
        self.begin();
        let result = self.require_owner().and_then(|user_id| {
            service::create_streak(&self.store, self.session.as_ref(), user_id, kind, goal)
        });
        let streak = self.record("create streak", result)?;
        self.streaks.insert(0, streak.clone());
        Ok(streak)
    }

    pub fn confirm_today(&mut self, streak_id: i64) -> Result<Streak, VicesError> {
        self.begin();
        let result = service::confirm_today(&self.store, self.session.as_ref(), streak_id);
        let streak = self.record("confirm streak", result)?;
        Ok(self.apply(streak))
    }

    pub fn update_streak_progress(
        &mut self,
        streak_id: i64,
        current_streak: u32,
    ) -> Result<Streak, VicesError> {
        self.begin();
        let result =
            service::update_streak(&self.store, self.session.as_ref(), streak_id, current_streak);
        let streak = self.record("update streak", result)?;
        Ok(self.apply(streak))
    }

    pub fn reset_streak(&mut self, streak_id: i64) -> Result<Option<Attempt>, VicesError> {
        self.begin();
        let result = service::reset_streak(&self.store, self.session.as_ref(), streak_id);
        let attempt = self.record("reset streak", result)?;
        self.load_user_streaks()?;
        Ok(attempt)
    }

    pub fn deactivate_streak(&mut self, streak_id: i64) -> Result<(), VicesError> {
        self.begin();
        let result = service::deactivate_streak(&self.store, self.session.as_ref(), streak_id);
        self.record("deactivate streak", result)?;
        self.streaks.retain(|streak| streak.id != streak_id);
        Ok(())
    }

    pub fn load_user_streaks(&mut self) -> Result<&[Streak], VicesError> {
        self.begin();
        let result = self.require_owner().and_then(|user_id| {
            service::user_streaks(&self.store, self.session.as_ref(), user_id)
        });
        let fresh = self.record("load streaks", result)?;

        let merged = fresh
            .into_iter()
            .map(|streak| carry_milestones(&self.streaks, streak))
            .collect();
        self.streaks = merged;
        debug!(count = self.streaks.len(), "streaks loaded");

        Ok(&self.streaks)
    }

    pub fn load_quotes(&mut self, limit: usize) -> Result<&[Quote], VicesError> {
        let result = service::random_quotes(&self.store, limit);
        self.quotes = self.record("load quotes", result)?;
        Ok(&self.quotes)
    }

    pub fn attempts(&mut self, streak_id: i64) -> Result<Vec<Attempt>, VicesError> {
        self.begin();
        let result = service::streak_attempts(&self.store, self.session.as_ref(), streak_id);
        self.record("load attempts", result)
    }

    pub fn progress_data(&mut self, streak_id: i64) -> Result<ProgressData, VicesError> {
        let attempts = self.attempts(streak_id)?;
        let result = self
            .streaks
            .iter()
            .find(|streak| streak.id == streak_id)
            .map(|streak| ProgressData::new(streak, &attempts))
            .ok_or_else(|| VicesError::NotFound(format!("Streak {streak_id}")));
        self.record("build progress", result)
    }

    pub fn update_profile(
        &mut self,
        name: Option<&str>,
        vices: Option<&[HabitKind]>,
    ) -> Result<&User, VicesError> {
        self.begin();
        let result = self.require_owner().and_then(|user_id| {
            service::update_user_profile(&self.store, self.session.as_ref(), user_id, name, vices)
        });
        let user = self.record("update profile", result)?;
        Ok(&*self.user.insert(user))
    }

    pub fn streak_by_kind(&self, kind: HabitKind) -> Option<&Streak> {
        self.streaks.iter().find(|streak| streak.kind == kind)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn streaks(&self) -> &[Streak] {
        &self.streaks
    }

    pub fn quotes(&self) -> &[Quote] {
        &self.quotes
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Message of the most recent failed operation.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Drops the session-scoped state and hands the store back. Revoking the
    /// token is left to [`crate::auth::Authenticator::sign_out`].
    pub fn sign_out(self) -> S {
        info!(
            user_id = self.owner_id().unwrap_or_default(),
            "application state torn down"
        );
        self.store
    }

    fn load_profile(&mut self) {
        let Some(user_id) = self.owner_id() else {
            return;
        };

        self.begin();
        let result = service::user_profile(&self.store, self.session.as_ref(), user_id);
        if let Ok(user) = self.record("load profile", result) {
            self.user = Some(user);
        }
    }

    fn create_defaults(&self) -> Result<usize, VicesError> {
        let user_id = self.require_owner()?;
        if service::has_streak_history(&self.store, self.session.as_ref(), user_id)? {
            return Ok(0);
        }

        HabitKind::ALL.iter().try_for_each(|kind| {
            service::create_streak(
                &self.store,
                self.session.as_ref(),
                user_id,
                *kind,
                Goal::DEFAULT,
            )
            .map(|_| ())
        })?;
        info!(user_id, "default streaks created");

        Ok(HabitKind::ALL.len())
    }

    fn apply(&mut self, streak: Streak) -> Streak {
        let streak = carry_milestones(&self.streaks, streak);
        match self.streaks.iter_mut().find(|existing| existing.id == streak.id) {
            Some(existing) => *existing = streak.clone(),
            None => self.streaks.insert(0, streak.clone()),
        }
        streak
    }

    fn owner_id(&self) -> Option<i64> {
        self.session.as_ref().map(|session| session.user_id)
    }

    fn require_owner(&self) -> Result<i64, VicesError> {
        self.owner_id().ok_or(VicesError::AuthenticationMissing)
    }

    fn begin(&mut self) {
        self.loading = true;
    }

    fn record<T>(&mut self, operation: &str, result: Result<T, VicesError>) -> Result<T, VicesError> {
        self.loading = false;
        result.inspect_err(|error| {
            warn!(operation, error = %error, "operation failed");
            self.error = Some(error.to_string());
        })
    }
}

/// Re-derives a fresh streak's milestones from the previously held list so
/// first-reached timestamps survive reloads.
fn carry_milestones(previous: &[Streak], mut streak: Streak) -> Streak {
    if let Some(old) = previous
        .iter()
        .find(|old| old.id == streak.id && old.goal == streak.goal)
    {
        streak.milestones = update_progress(&old.milestones, streak.current_streak, Utc::now());
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        AttemptRow, Database, NewAttempt, NewStreak, NewUser, QuoteRow, StreakRow, UserRow,
    };
    use anyhow::{Result, bail};
    use chrono::DateTime;
    use tempfile::{TempDir, tempdir};

    fn signed_in_state() -> (TempDir, AppState<Database>) {
        let dir = tempdir().expect("tempdir");
        let database = Database::open(&dir.path().join("vices.db")).expect("open db");
        let now = Utc::now();
        let user_id = database
            .insert_user(&NewUser {
                email: "demo@example.com",
                name: "Demo",
                password_hash: "h",
                now,
            })
            .expect("insert user");
        let session = Session {
            access_token: "token".to_string(),
            user_id,
            email: "demo@example.com".to_string(),
            created_at: now,
        };

        (dir, AppState::new(database, Some(session)))
    }

    fn started_state() -> (TempDir, AppState<Database>) {
        let (dir, mut state) = signed_in_state();
        assert_eq!(state.ensure_default_streaks().expect("defaults"), 3);
        state.start().expect("start");
        (dir, state)
    }

    #[test]
    fn defaults_are_created_once_after_sign_in() {
        let (_dir, mut state) = signed_in_state();
        state.start().expect("start");
        assert!(state.streaks().is_empty());

        assert_eq!(state.ensure_default_streaks().expect("ensure"), 3);
        state.start().expect("restart");
        assert_eq!(state.streaks().len(), 3);
        assert!(state.streaks().iter().all(|s| s.goal == Goal::DEFAULT));
        assert_eq!(state.user().map(|user| user.name.as_str()), Some("Demo"));
        assert_eq!(state.quotes().len(), DEFAULT_QUOTE_COUNT);

        assert_eq!(state.ensure_default_streaks().expect("ensure"), 0);
        state.load_user_streaks().expect("reload");
        assert_eq!(state.streaks().len(), 3);
        for kind in HabitKind::ALL {
            assert!(state.streak_by_kind(kind).is_some());
        }
    }

    #[test]
    fn deactivating_every_streak_does_not_bring_defaults_back() {
        let (_dir, mut state) = started_state();
        let ids = state.streaks().iter().map(|s| s.id).collect::<Vec<_>>();
        for id in &ids {
            state.deactivate_streak(*id).expect("deactivate");
        }
        assert!(state.streaks().is_empty());
        let session = state.session().cloned();
        let database = state.sign_out();

        let mut restarted = AppState::new(database, session);
        restarted.start().expect("start");
        assert_eq!(restarted.ensure_default_streaks().expect("ensure"), 0);
        restarted.load_user_streaks().expect("reload");

        assert!(restarted.streaks().is_empty());
        let user_id = restarted.session().map(|s| s.user_id).expect("session");
        assert_eq!(
            restarted.store().streak_count_for_user(user_id).expect("count"),
            ids.len() as i64
        );
    }

    #[test]
    fn missing_profile_is_recorded_without_stopping_start() {
        let dir = tempdir().expect("tempdir");
        let database = Database::open(&dir.path().join("vices.db")).expect("open db");
        let session = Session {
            access_token: "token".to_string(),
            user_id: 999,
            email: "ghost@example.com".to_string(),
            created_at: Utc::now(),
        };
        let mut state = AppState::new(database, Some(session));

        state.start().expect("start");

        assert!(state.user().is_none());
        assert_eq!(state.error(), Some("User 999 not found"));
        assert_eq!(state.quotes().len(), DEFAULT_QUOTE_COUNT);
        assert!(!state.is_loading());
    }

    #[test]
    fn reached_timestamps_survive_reload() {
        let (_dir, mut state) = started_state();
        let streak_id = state
            .streak_by_kind(HabitKind::Drinking)
            .map(|streak| streak.id)
            .expect("drinking streak");

        let updated = state.update_streak_progress(streak_id, 6).expect("progress");
        assert!(!updated.milestones[0].is_reached);
        let confirmed = state.confirm_today(streak_id).expect("confirm");
        let first_reached = confirmed.milestones[0].reached_at;
        assert_eq!(confirmed.current_streak, 7);
        assert!(first_reached.is_some());

        state.load_user_streaks().expect("reload");
        let reloaded = state.streak_by_kind(HabitKind::Drinking).expect("drinking streak");
        assert_eq!(reloaded.milestones[0].reached_at, first_reached);
    }

    #[test]
    fn reset_reloads_zeroed_streak() {
        let (_dir, mut state) = started_state();
        let streak_id = state
            .streak_by_kind(HabitKind::Smoking)
            .map(|streak| streak.id)
            .expect("smoking streak");
        state.update_streak_progress(streak_id, 18).expect("progress");

        let attempt = state
            .reset_streak(streak_id)
            .expect("reset")
            .expect("attempt");

        assert_eq!(attempt.duration, 18);
        assert!(!attempt.is_completed);
        assert_eq!(
            state.streak_by_kind(HabitKind::Smoking).map(|s| s.current_streak),
            Some(0)
        );
        let progress = state.progress_data(streak_id).expect("progress data");
        assert_eq!(progress.attempt_history, vec![18]);
        assert_eq!(progress.progress, 0);
    }

    #[test]
    fn deactivated_streak_leaves_state() {
        let (_dir, mut state) = started_state();
        let streak_id = state.streaks()[0].id;

        state.deactivate_streak(streak_id).expect("deactivate");

        assert_eq!(state.streaks().len(), 2);
        state.load_user_streaks().expect("reload");
        assert_eq!(state.streaks().len(), 2);
        assert_eq!(state.ensure_default_streaks().expect("ensure"), 0);
    }

    #[test]
    fn missing_session_is_recorded_as_error() {
        let dir = tempdir().expect("tempdir");
        let database = Database::open(&dir.path().join("vices.db")).expect("open db");
        let mut state = AppState::new(database, None);

        assert!(matches!(
            state.confirm_today(1),
            Err(VicesError::AuthenticationMissing)
        ));
        assert_eq!(state.error(), Some("No authenticated user session found"));
        assert!(!state.is_loading());

        state.clear_error();
        assert_eq!(state.load_quotes(2).expect("quotes").len(), 2);
        assert!(state.error().is_none());
    }

    struct OfflineStore;

    impl StreakStore for OfflineStore {
        fn active_streaks_for_user(&self, _user_id: i64) -> Result<Vec<StreakRow>> {
            bail!("network unreachable")
        }
        fn streak_count_for_user(&self, _user_id: i64) -> Result<i64> {
            bail!("network unreachable")
        }
        fn streak(&self, _streak_id: i64) -> Result<Option<StreakRow>> {
            bail!("network unreachable")
        }
        fn insert_streak(&self, _streak: &NewStreak<'_>) -> Result<StreakRow> {
            bail!("network unreachable")
        }
        fn update_streak_progress(
            &self,
            _streak_id: i64,
            _current_streak: i64,
            _at: DateTime<Utc>,
        ) -> Result<Option<StreakRow>> {
            bail!("network unreachable")
        }
        fn reset_streak_row(&self, _streak_id: i64, _at: DateTime<Utc>) -> Result<()> {
            bail!("network unreachable")
        }
        fn deactivate_streak(&self, _streak_id: i64, _at: DateTime<Utc>) -> Result<()> {
            bail!("network unreachable")
        }
        fn insert_attempt(&self, _attempt: &NewAttempt) -> Result<AttemptRow> {
            bail!("network unreachable")
        }
        fn attempts_for_streak(&self, _streak_id: i64) -> Result<Vec<AttemptRow>> {
            bail!("network unreachable")
        }
        fn random_quotes(&self, _limit: usize) -> Result<Vec<QuoteRow>> {
            bail!("network unreachable")
        }
        fn quotes_by_category(&self, _category: &str) -> Result<Vec<QuoteRow>> {
            bail!("network unreachable")
        }
        fn user(&self, _user_id: i64) -> Result<Option<UserRow>> {
            bail!("network unreachable")
        }
        fn update_user(
            &self,
            _user_id: i64,
            _name: Option<&str>,
            _vices: Option<&str>,
            _at: DateTime<Utc>,
        ) -> Result<Option<UserRow>> {
            bail!("network unreachable")
        }
    }

    #[test]
    fn collaborator_failures_pass_through_verbatim() {
        let session = Session {
            access_token: "token".to_string(),
            user_id: 1,
            email: "demo@example.com".to_string(),
            created_at: Utc::now(),
        };
        let mut state = AppState::new(OfflineStore, Some(session));

        let error = state.start().expect_err("offline start fails");

        assert!(matches!(error, VicesError::External(_)));
        assert_eq!(state.error(), Some("network unreachable"));
        assert!(state.streaks().is_empty());
        assert!(state.user().is_none());
    }
}
