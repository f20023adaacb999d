use crate::config::set_mode_600;
use crate::db::{Database, NewUser, StreakStore};
use crate::error::VicesError;
use anyhow::{Context, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn { user_id: i64 },
    SignedOut { user_id: i64 },
}

/// Email/password authentication over the local `users` and `sessions`
/// tables. When a session path is set, the active token is persisted there
/// so separate CLI invocations share one session.
pub struct Authenticator {
    session_path: Option<PathBuf>,
    current: Option<Session>,
    events: broadcast::Sender<AuthEvent>,
}

impl Authenticator {
    pub fn new(session_path: Option<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            session_path,
            current: None,
            events,
        }
    }

    /// Loads the persisted session, dropping it if the token is no longer known.
    pub fn restore(database: &Database, session_path: PathBuf) -> Result<Self> {
        let mut auth = Self::new(Some(session_path.clone()));
        if !session_path.exists() {
            return Ok(auth);
        }

        let content = fs::read_to_string(&session_path)
            .with_context(|| format!("Failed to read session file: {}", session_path.display()))?;
        let stored: Session = match serde_json::from_str(&content) {
            Ok(session) => session,
            Err(error) => {
                warn!(error = %error, "discarding unreadable session file");
                auth.clear_session_file();
                return Ok(auth);
            }
        };

        match session_from_token(database, &stored.access_token) {
            Ok(session) => auth.current = Some(session),
            Err(VicesError::AuthenticationMissing) => {
                debug!(user_id = stored.user_id, "persisted session expired");
                auth.clear_session_file();
            }
            Err(error) => return Err(error.into()),
        }

        Ok(auth)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn sign_up(
        &self,
        database: &Database,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<i64, VicesError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(VicesError::WeakPassword(MIN_PASSWORD_LEN));
        }

        if database
            .user_by_email(&email)
            .map_err(VicesError::external)?
            .is_some()
        {
            return Err(VicesError::EmailTaken(email));
        }

        let hash = hash_password(password)?;
        let user_id = database
            .insert_user(&NewUser {
                email: &email,
                name: name.trim(),
                password_hash: &hash,
                now: Utc::now(),
            })
            .map_err(VicesError::external)?;

        info!(user_id, "user registered");
        Ok(user_id)
    }

    pub fn sign_in(
        &mut self,
        database: &Database,
        email: &str,
        password: &str,
    ) -> Result<Session, VicesError> {
        let email = normalize_email(email);
        let user = database
            .user_by_email(&email)
            .map_err(VicesError::external)?
            .ok_or(VicesError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            warn!(user_id = user.id, "rejected sign-in with wrong password");
            return Err(VicesError::InvalidCredentials);
        }

        let session = Session {
            access_token: hex::encode(rand::random::<[u8; 32]>()),
            user_id: user.id,
            email: user.email,
            created_at: Utc::now(),
        };
        database
            .insert_session(&session.access_token, session.user_id, session.created_at)
            .map_err(VicesError::external)?;
        self.persist(&session).map_err(VicesError::external)?;

        self.current = Some(session.clone());
        let _ = self.events.send(AuthEvent::SignedIn {
            user_id: session.user_id,
        });
        info!(user_id = session.user_id, "signed in");

        Ok(session)
    }

    pub fn sign_out(&mut self, database: &Database) -> Result<(), VicesError> {
        let Some(session) = self.current.take() else {
            return Err(VicesError::AuthenticationMissing);
        };

        database
            .delete_session(&session.access_token)
            .map_err(VicesError::external)?;
        self.clear_session_file();

        let _ = self.events.send(AuthEvent::SignedOut {
            user_id: session.user_id,
        });
        info!(user_id = session.user_id, "signed out");

        Ok(())
    }

    fn persist(&self, session: &Session) -> Result<()> {
        let Some(path) = &self.session_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create session directory: {}", parent.display())
            })?;
        }
        let content = serde_json::to_string_pretty(session).context("Failed to serialize session")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write session file: {}", path.display()))?;
        set_mode_600(path)
    }

    fn clear_session_file(&self) {
        if let Some(path) = &self.session_path {
            if path.exists() {
                if let Err(error) = fs::remove_file(path) {
                    warn!(error = %error, path = %path.display(), "failed to remove session file");
                }
            }
        }
    }
}

/// Resolves a bearer token to its session.
pub fn session_from_token(database: &Database, token: &str) -> Result<Session, VicesError> {
    let row = database
        .session(token.trim())
        .map_err(VicesError::external)?
        .ok_or(VicesError::AuthenticationMissing)?;
    let user = database
        .user(row.user_id)
        .map_err(VicesError::external)?
        .ok_or(VicesError::AuthenticationMissing)?;

    Ok(Session {
        access_token: row.token,
        user_id: row.user_id,
        email: user.email,
        created_at: row.created_at,
    })
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), VicesError> {
    let pattern = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map_err(|error| VicesError::External(error.to_string()))?;

    if pattern.is_match(email) {
        Ok(())
    } else {
        Err(VicesError::InvalidEmail(email.to_string()))
    }
}

/// Hashes with argon2id and a fresh salt. The PHC string carries salt and parameters.
fn hash_password(password: &str) -> Result<String, VicesError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| VicesError::External(format!("Failed to hash password: {error}")))
}

fn verify_password(password: &str, stored: &str) -> Result<bool, VicesError> {
    let parsed = PasswordHash::new(stored)
        .map_err(|error| VicesError::External(format!("Invalid password hash format: {error}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
