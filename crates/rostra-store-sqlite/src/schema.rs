//! SQL schema for the Rostra SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id                 TEXT PRIMARY KEY,
    slug                    TEXT NOT NULL UNIQUE,
    email                   TEXT NOT NULL UNIQUE,   -- lower-cased
    password_hash           TEXT NOT NULL,          -- argon2 PHC string
    display_name            TEXT NOT NULL,
    headline                TEXT,
    bio                     TEXT,
    location                TEXT,
    role                    TEXT NOT NULL DEFAULT 'member',
    subscription            TEXT NOT NULL DEFAULT 'free',
    subscription_expires_at TEXT,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS education (
    education_id   TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    institution    TEXT NOT NULL,
    degree         TEXT NOT NULL,
    field_of_study TEXT,
    start_date     TEXT NOT NULL,   -- YYYY-MM-DD
    end_date       TEXT,
    description    TEXT
);

CREATE TABLE IF NOT EXISTS experience (
    experience_id TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    company       TEXT NOT NULL,
    title         TEXT NOT NULL,
    location      TEXT,
    start_date    TEXT NOT NULL,
    end_date      TEXT,
    description   TEXT
);

CREATE TABLE IF NOT EXISTS skills (
    skill_id    TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    proficiency TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS transactions (
    order_id               TEXT PRIMARY KEY,
    user_id                TEXT NOT NULL REFERENCES users(user_id),
    plan                   TEXT NOT NULL,
    gross_amount           INTEGER NOT NULL,
    status                 TEXT NOT NULL,
    gateway_transaction_id TEXT,
    redirect_url           TEXT,
    snap_token             TEXT,
    version                INTEGER NOT NULL DEFAULT 0,   -- compare-and-swap guard
    created_at             TEXT NOT NULL,
    updated_at             TEXT NOT NULL
);

-- Status changes are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS transaction_events (
    event_id       TEXT PRIMARY KEY,
    order_id       TEXT NOT NULL REFERENCES transactions(order_id),
    from_status    TEXT,
    to_status      TEXT NOT NULL,
    gateway_status TEXT,
    recorded_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS education_user_idx      ON education(user_id);
CREATE INDEX IF NOT EXISTS experience_user_idx     ON experience(user_id);
CREATE INDEX IF NOT EXISTS skills_user_idx         ON skills(user_id);
CREATE INDEX IF NOT EXISTS users_created_idx       ON users(created_at);
CREATE INDEX IF NOT EXISTS transactions_user_idx   ON transactions(user_id);
CREATE INDEX IF NOT EXISTS transactions_status_idx ON transactions(status, created_at);
CREATE INDEX IF NOT EXISTS events_order_idx        ON transaction_events(order_id);

PRAGMA user_version = 1;
";
