use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                nickname            TEXT NOT NULL,
                gender              TEXT NOT NULL CHECK (gender IN ('male', 'female')),
                birth_year          INTEGER NOT NULL,
                location            TEXT NOT NULL,
                is_profile_complete INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL
            );

            CREATE INDEX idx_users_candidates
                ON users(gender, is_profile_complete);

            CREATE TABLE scenario_options (
                id                  INTEGER PRIMARY KEY,
                scenario_id         INTEGER NOT NULL,
                option_code         TEXT NOT NULL,
                personality_vector  TEXT
            );

            CREATE TABLE user_scenario_responses (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL REFERENCES users(id),
                scenario_id         INTEGER NOT NULL,
                selected_option_id  INTEGER NOT NULL REFERENCES scenario_options(id),
                created_at          TEXT NOT NULL,
                UNIQUE(user_id, scenario_id)
            );

            CREATE TABLE matches (
                id                  TEXT PRIMARY KEY,
                user_a_id           TEXT NOT NULL REFERENCES users(id),
                user_b_id           TEXT NOT NULL REFERENCES users(id),
                compatibility_score INTEGER NOT NULL CHECK (compatibility_score BETWEEN 0 AND 100),
                match_reason        TEXT NOT NULL DEFAULT '',
                user_a_status       TEXT NOT NULL DEFAULT 'pending',
                user_b_status       TEXT NOT NULL DEFAULT 'pending',
                is_matched          INTEGER NOT NULL DEFAULT 0,
                matched_at          TEXT,
                created_at          TEXT NOT NULL,
                CHECK (user_a_id < user_b_id),
                UNIQUE(user_a_id, user_b_id)
            );

            CREATE INDEX idx_matches_user_b ON matches(user_b_id);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                match_id    TEXT NOT NULL REFERENCES matches(id),
                sender_id   TEXT NOT NULL REFERENCES users(id),
                content     TEXT NOT NULL CHECK (length(content) > 0),
                is_read     INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_match
                ON messages(match_id, created_at);

            CREATE TABLE push_tokens (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                token       TEXT NOT NULL,
                device_type TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                UNIQUE(user_id, token)
            );

            CREATE TABLE notification_logs (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                kind        TEXT NOT NULL,
                title       TEXT NOT NULL,
                body        TEXT NOT NULL,
                data        TEXT NOT NULL DEFAULT '{}',
                is_read     INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_notification_logs_user
                ON notification_logs(user_id, is_read);

            CREATE TABLE notification_preferences (
                user_id                         TEXT PRIMARY KEY,
                push_enabled                    INTEGER NOT NULL DEFAULT 1,
                match_notifications             INTEGER NOT NULL DEFAULT 1,
                match_accepted_notifications    INTEGER NOT NULL DEFAULT 1,
                message_notifications           INTEGER NOT NULL DEFAULT 1
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
