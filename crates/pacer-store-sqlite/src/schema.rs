//! SQL schema for the Pacer SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.
//!
//! Timestamps are fixed-width RFC 3339 UTC strings (microsecond precision,
//! `Z` suffix), so lexicographic comparison in SQL matches chronological
//! order.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS profiles (
    user_id            TEXT PRIMARY KEY,
    current_streak     INTEGER NOT NULL DEFAULT 0 CHECK (current_streak >= 0),
    longest_streak     INTEGER NOT NULL DEFAULT 0 CHECK (longest_streak >= 0),
    last_activity_date TEXT,           -- YYYY-MM-DD (UTC) or NULL
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS challenges (
    challenge_id    TEXT PRIMARY KEY,
    title           TEXT NOT NULL,
    created_by      TEXT NOT NULL REFERENCES profiles(user_id),
    start_date      TEXT NOT NULL,
    end_date        TEXT NOT NULL,
    status_override TEXT,              -- 'cancelled' | 'archived' | NULL
    created_at      TEXT NOT NULL,
    CHECK (start_date < end_date)
);

-- current_progress is written only by the activity ingestion transaction.
CREATE TABLE IF NOT EXISTS challenge_participants (
    challenge_id     TEXT NOT NULL REFERENCES challenges(challenge_id),
    user_id          TEXT NOT NULL REFERENCES profiles(user_id),
    invite_status    TEXT NOT NULL,    -- 'pending' | 'accepted' | 'declined'
    current_progress INTEGER NOT NULL DEFAULT 0,
    updated_at       TEXT NOT NULL,
    PRIMARY KEY (challenge_id, user_id)
);

-- Activity entries are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS activity_logs (
    entry_id           TEXT PRIMARY KEY,
    challenge_id       TEXT NOT NULL REFERENCES challenges(challenge_id),
    user_id            TEXT NOT NULL REFERENCES profiles(user_id),
    activity_type      TEXT NOT NULL,
    value              INTEGER NOT NULL CHECK (value > 0),
    unit               TEXT NOT NULL,
    recorded_at        TEXT NOT NULL,
    source             TEXT NOT NULL,  -- 'manual' | 'healthkit' | 'googlefit'
    client_event_id    TEXT,
    source_external_id TEXT,
    created_at         TEXT NOT NULL
);

-- The two idempotency keys.
CREATE UNIQUE INDEX IF NOT EXISTS activity_client_event_uq
    ON activity_logs(challenge_id, user_id, client_event_id)
    WHERE client_event_id IS NOT NULL;

CREATE UNIQUE INDEX IF NOT EXISTS activity_source_external_uq
    ON activity_logs(source, source_external_id)
    WHERE source_external_id IS NOT NULL;

CREATE INDEX IF NOT EXISTS activity_participant_idx
    ON activity_logs(challenge_id, user_id, recorded_at);

CREATE TABLE IF NOT EXISTS friend_requests (
    request_id TEXT PRIMARY KEY,
    from_user  TEXT NOT NULL REFERENCES profiles(user_id),
    to_user    TEXT NOT NULL REFERENCES profiles(user_id),
    created_at TEXT NOT NULL,
    UNIQUE (from_user, to_user),
    CHECK  (from_user != to_user)
);

PRAGMA user_version = 1;
";
