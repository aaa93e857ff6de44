//! v001 -- Initial schema creation.
//!
//! All timestamps are epoch milliseconds (INTEGER).  Membership, invitation
//! and ban rows key on the (group, user) pair; pinned prayers key on the
//! group so at most one prayer is pinned per group.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    username      TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    bio           TEXT,
    profile_image TEXT,                       -- blob-store path
    banner_image  TEXT,                       -- blob-store path
    created_at    INTEGER NOT NULL            -- epoch millis
);

-- ----------------------------------------------------------------
-- Reminders (shared by groups and corporate campaigns)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reminders (
    id         TEXT PRIMARY KEY NOT NULL,
    time       TEXT NOT NULL,                 -- HH:MM wall clock
    days       TEXT NOT NULL,                 -- comma-separated weekdays
    created_at INTEGER NOT NULL
);

-- ----------------------------------------------------------------
-- Groups
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS groups (
    id              TEXT PRIMARY KEY NOT NULL,
    name            TEXT NOT NULL,
    description     TEXT NOT NULL,
    membership_type TEXT NOT NULL CHECK (membership_type IN ('open', 'restricted', 'private')),
    admin_id        TEXT NOT NULL,            -- FK -> users(id), immutable
    banner_image    TEXT,
    reminder_id     TEXT,                     -- nullable FK -> reminders(id)
    created_at      INTEGER NOT NULL,

    FOREIGN KEY (admin_id) REFERENCES users(id),
    FOREIGN KEY (reminder_id) REFERENCES reminders(id)
);

CREATE INDEX IF NOT EXISTS idx_groups_created ON groups(created_at DESC, id);

-- ----------------------------------------------------------------
-- Memberships
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS memberships (
    group_id        TEXT NOT NULL,
    user_id         TEXT NOT NULL,
    requested_at    INTEGER NOT NULL,
    accepted_at     INTEGER,                  -- NULL = pending
    moderator_since INTEGER,                  -- NULL = not a moderator

    PRIMARY KEY (group_id, user_id),
    FOREIGN KEY (group_id) REFERENCES groups(id),
    FOREIGN KEY (user_id)  REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_memberships_user ON memberships(user_id);
CREATE INDEX IF NOT EXISTS idx_memberships_accepted
    ON memberships(group_id, accepted_at, user_id);

-- ----------------------------------------------------------------
-- Invitations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS invitations (
    group_id   TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    created_at INTEGER NOT NULL,

    PRIMARY KEY (group_id, user_id),
    FOREIGN KEY (group_id) REFERENCES groups(id),
    FOREIGN KEY (user_id)  REFERENCES users(id)
);

-- ----------------------------------------------------------------
-- Bans
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS member_bans (
    group_id   TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    created_at INTEGER NOT NULL,

    PRIMARY KEY (group_id, user_id)
);

CREATE TABLE IF NOT EXISTS group_bans (
    group_id   TEXT PRIMARY KEY NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_bans (
    user_id    TEXT PRIMARY KEY NOT NULL,
    created_at INTEGER NOT NULL
);

-- ----------------------------------------------------------------
-- Social graph
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS user_follows (
    follower_id  TEXT NOT NULL,
    following_id TEXT NOT NULL,
    created_at   INTEGER NOT NULL,

    PRIMARY KEY (follower_id, following_id)
);

CREATE TABLE IF NOT EXISTS user_blocks (
    user_id    TEXT NOT NULL,
    target_id  TEXT NOT NULL,
    created_at INTEGER NOT NULL,

    PRIMARY KEY (user_id, target_id)
);

-- ----------------------------------------------------------------
-- Corporate prayer campaigns
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS corporate_prayers (
    id          TEXT PRIMARY KEY NOT NULL,
    group_id    TEXT NOT NULL,
    author_id   TEXT NOT NULL,
    title       TEXT NOT NULL,
    description TEXT,
    started_at  INTEGER,
    ended_at    INTEGER,
    reminder_id TEXT,
    created_at  INTEGER NOT NULL,

    FOREIGN KEY (group_id)    REFERENCES groups(id),
    FOREIGN KEY (author_id)   REFERENCES users(id),
    FOREIGN KEY (reminder_id) REFERENCES reminders(id)
);

CREATE INDEX IF NOT EXISTS idx_corporate_group ON corporate_prayers(group_id);

-- ----------------------------------------------------------------
-- Prayers
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS prayers (
    id           TEXT PRIMARY KEY NOT NULL,
    author_id    TEXT NOT NULL,
    group_id     TEXT,                        -- nullable FK -> groups(id)
    corporate_id TEXT,                        -- nullable FK -> corporate_prayers(id)
    anon         INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    value        TEXT NOT NULL,
    created_at   INTEGER NOT NULL,

    FOREIGN KEY (author_id)    REFERENCES users(id),
    FOREIGN KEY (group_id)     REFERENCES groups(id),
    FOREIGN KEY (corporate_id) REFERENCES corporate_prayers(id)
);

CREATE INDEX IF NOT EXISTS idx_prayers_feed   ON prayers(created_at DESC, id);
CREATE INDEX IF NOT EXISTS idx_prayers_group  ON prayers(group_id, created_at DESC, id);
CREATE INDEX IF NOT EXISTS idx_prayers_author ON prayers(author_id, created_at DESC, id);

CREATE TABLE IF NOT EXISTS prayer_media (
    prayer_id TEXT NOT NULL,
    position  INTEGER NOT NULL,
    path      TEXT NOT NULL,                  -- blob-store path

    PRIMARY KEY (prayer_id, position),
    FOREIGN KEY (prayer_id) REFERENCES prayers(id)
);

CREATE TABLE IF NOT EXISTS prayer_verses (
    prayer_id TEXT NOT NULL,
    verse_id  INTEGER NOT NULL,

    PRIMARY KEY (prayer_id, verse_id),
    FOREIGN KEY (prayer_id) REFERENCES prayers(id)
);

-- ----------------------------------------------------------------
-- Prays ("amen" records)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS prayer_prays (
    id         TEXT PRIMARY KEY NOT NULL,
    prayer_id  TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    value      TEXT,
    created_at INTEGER NOT NULL,

    FOREIGN KEY (prayer_id) REFERENCES prayers(id),
    FOREIGN KEY (user_id)   REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_prays_prayer ON prayer_prays(prayer_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_prays_user   ON prayer_prays(user_id, prayer_id, created_at DESC);

-- ----------------------------------------------------------------
-- Pinned prayers (at most one per group)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS pinned_prayers (
    group_id   TEXT PRIMARY KEY NOT NULL,
    prayer_id  TEXT NOT NULL,
    created_at INTEGER NOT NULL,

    FOREIGN KEY (group_id)  REFERENCES groups(id),
    FOREIGN KEY (prayer_id) REFERENCES prayers(id)
);

-- ----------------------------------------------------------------
-- In-app notifications
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notifications (
    id         TEXT PRIMARY KEY NOT NULL,
    user_id    TEXT NOT NULL,
    title      TEXT NOT NULL,
    body       TEXT NOT NULL,
    data       TEXT NOT NULL DEFAULT '{}',    -- JSON payload
    created_at INTEGER NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_notifications_user
    ON notifications(user_id, created_at DESC, id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
