pub const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
  id            INTEGER PRIMARY KEY AUTOINCREMENT,
  email         TEXT NOT NULL UNIQUE,
  name          TEXT NOT NULL,
  vices         TEXT NOT NULL DEFAULT '',
  password_hash TEXT NOT NULL,
  created_at    TEXT NOT NULL,
  updated_at    TEXT NOT NULL
);
"#;

pub const CREATE_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
  token       TEXT PRIMARY KEY,
  user_id     INTEGER NOT NULL REFERENCES users(id),
  created_at  TEXT NOT NULL
);
"#;

pub const CREATE_STREAKS: &str = r#"
CREATE TABLE IF NOT EXISTS streaks (
  id             INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id        INTEGER NOT NULL REFERENCES users(id),
  type           TEXT NOT NULL,
  current_streak INTEGER NOT NULL DEFAULT 0,
  goal           INTEGER NOT NULL DEFAULT 66,
  start_date     TEXT NOT NULL,
  last_check_in  TEXT NOT NULL,
  is_active      INTEGER NOT NULL DEFAULT 1,
  created_at     TEXT NOT NULL,
  updated_at     TEXT NOT NULL
);
"#;

pub const CREATE_STREAK_ATTEMPTS: &str = r#"
CREATE TABLE IF NOT EXISTS streak_attempts (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  streak_id    INTEGER NOT NULL REFERENCES streaks(id),
  start_date   TEXT NOT NULL,
  end_date     TEXT,
  duration     INTEGER NOT NULL DEFAULT 0,
  is_completed INTEGER NOT NULL DEFAULT 0,
  created_at   TEXT NOT NULL
);
"#;

pub const CREATE_MOTIVATIONAL_QUOTES: &str = r#"
CREATE TABLE IF NOT EXISTS motivational_quotes (
  id         INTEGER PRIMARY KEY AUTOINCREMENT,
  text       TEXT NOT NULL,
  author     TEXT NOT NULL,
  image_url  TEXT NOT NULL DEFAULT '',
  category   TEXT NOT NULL DEFAULT 'motivation',
  created_at TEXT NOT NULL
);
"#;

pub const INDEX_STREAKS_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_streaks_user_id ON streaks(user_id, is_active);";

pub const INDEX_ATTEMPTS_STREAK: &str =
    "CREATE INDEX IF NOT EXISTS idx_streak_attempts_streak_id ON streak_attempts(streak_id);";

pub const INDEX_SESSIONS_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);";

pub const SEED_QUOTES: &str = r#"
INSERT OR IGNORE INTO motivational_quotes (id, text, author, image_url, category, created_at) VALUES
  (1, 'The only way to do great work is to love what you do.', 'Steve Jobs',
   'https://lh3.googleusercontent.com/aida-public/AB6AXuBlqF2Byb-ei3zgNu45F_3USYf8G3qm2Pt9sqhsC8HeA-nEA9E0S4-6tE2q855wXKkp9aRrbp59_a11ZHUGK2A0o6d6FegHZZU5OKM6ozYNhv1Rlc4gtkIC9-HWgnpMkB3m0-OyUCgAkwVevOjg1TL8gvJeqqz-5ulC--MObvTHyGBA455XwYxJNnbM9LrZO23wzHoWlFRqwEgr3Pv4iqkpaK7EXpZCeK7YHPc46fl3y-BOQUtm1VZkMLdai-DD9wyl264e5LhZWB8',
   'motivation', '2025-01-01 00:00:00+00:00'),
  (2, 'The mind is everything. What you think you become.', 'Buddha',
   'https://lh3.googleusercontent.com/aida-public/AB6AXuBX3ZwCLie7AhSA42On8_lC3aRsGAZRCNes74qC7EqxtweSsYX5KWftqnFUMPtaP733iao2n498g6I8PYH2_L1OcBaJSu1f8svq9NGLuXNbMwCm6sY47x1OKc-kTtzK3In-tMKSzuLp-Ku6144cwOepqN2YVQPGfqrRyydF23FIiw2e6koGl4-tVPtVw6dCjQ5kQTwkP8ZLer_UlFHvE_BdXM0wQ42udLNGdJjY3MFlCQqTCxsek8I97ig06dAnGNQQJ78NqK4P300',
   'mindset', '2025-01-01 00:00:00+00:00'),
  (3, 'Believe you can and you''re halfway there.', 'Theodore Roosevelt',
   'https://lh3.googleusercontent.com/aida-public/AB6AXuBBzzaurXYcD9ZS40TVKeXz1af8puQuOCu6LjzX7fNskXUEZ12oqN0jPMA3-6yReG9vTdtZOk2YWLOTp0kZ3hnuINNVmlD3Rde2MPdoAripTitQO1fa7HPR6n8z2YD9WE-X7xz-WpyQY2JLWRqaHtKGR7phd7KH-2RLeQKLlrfreU71244B2ZRknfDX3H7dKmCQiW43AyTj-eiIlWP3MpBqOUXfaX212NPJe94LNpY3UqO1E5QFmBQVOSp9nc5g0kQagaDVnQIXMTo',
   'motivation', '2025-01-01 00:00:00+00:00');
"#;

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_USERS,
        CREATE_SESSIONS,
        CREATE_STREAKS,
        CREATE_STREAK_ATTEMPTS,
        CREATE_MOTIVATIONAL_QUOTES,
        INDEX_STREAKS_USER,
        INDEX_ATTEMPTS_STREAK,
        INDEX_SESSIONS_USER,
        SEED_QUOTES,
    ]
}
