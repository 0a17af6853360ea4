use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use tracing::warn;
use uuid::Uuid;

use kindred_types::models::{Gender, PersonalityVector, ScenarioAnswer, User};

use super::OptionalExt;
use crate::Database;
use crate::models::{UserRow, format_ts};

const USER_COLUMNS: &str =
    "id, nickname, gender, birth_year, location, is_profile_complete, created_at";

impl Database {
    // -- Users --

    /// Profiles are owned by the account service; this mirrors them in.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, nickname, gender, birth_year, location, is_profile_complete, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    nickname = excluded.nickname,
                    birth_year = excluded.birth_year,
                    location = excluded.location,
                    is_profile_complete = excluded.is_profile_complete",
                rusqlite::params![
                    user.id.to_string(),
                    user.nickname,
                    user.gender.as_str(),
                    user.birth_year,
                    user.location,
                    user.is_profile_complete,
                    format_ts(user.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    /// Profile-complete users of `gender`, excluding `exclude`.
    pub fn candidate_users(&self, gender: Gender, exclude: Uuid) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE gender = ?1 AND is_profile_complete = 1 AND id != ?2
                 ORDER BY id"
            ))?;

            let rows = stmt
                .query_map(rusqlite::params![gender.as_str(), exclude.to_string()], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(User::try_from).collect()
        })
    }

    // -- Questionnaire --

    /// Registers (or replaces) a questionnaire option and its vector.
    pub fn upsert_scenario_option(
        &self,
        option_id: i64,
        scenario_id: i64,
        option_code: &str,
        vector: Option<&PersonalityVector>,
    ) -> Result<()> {
        let vector_json = vector.map(serde_json::to_string).transpose()?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO scenario_options (id, scenario_id, option_code, personality_vector)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    scenario_id = excluded.scenario_id,
                    option_code = excluded.option_code,
                    personality_vector = excluded.personality_vector",
                rusqlite::params![option_id, scenario_id, option_code, vector_json],
            )?;
            Ok(())
        })
    }

    /// Stores raw vector JSON as-is. Lets callers load content that may not
    /// parse; the scorer skips such scenarios.
    pub fn set_option_vector_raw(&self, option_id: i64, raw: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE scenario_options SET personality_vector = ?2 WHERE id = ?1",
                rusqlite::params![option_id, raw],
            )?;
            Ok(n > 0)
        })
    }

    /// Records a user's choice, overwriting an earlier answer to the same
    /// scenario. Returns false when the option does not belong to the scenario.
    pub fn upsert_response(&self, user_id: Uuid, scenario_id: i64, option_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "INSERT INTO user_scenario_responses (id, user_id, scenario_id, selected_option_id, created_at)
                 SELECT ?1, ?2, ?3, o.id, ?5 FROM scenario_options o
                 WHERE o.id = ?4 AND o.scenario_id = ?3
                 ON CONFLICT(user_id, scenario_id) DO UPDATE SET
                    selected_option_id = excluded.selected_option_id,
                    created_at = excluded.created_at",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    user_id.to_string(),
                    scenario_id,
                    option_id,
                    format_ts(Utc::now()),
                ],
            )?;
            Ok(n > 0)
        })
    }

    /// Re-take: drops every answer the user gave.
    pub fn clear_responses(&self, user_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM user_scenario_responses WHERE user_id = ?1",
                [user_id.to_string()],
            )?;
            Ok(n)
        })
    }

    /// Answers with their option vectors, ordered by scenario.
    /// Unparseable vectors come back as `None`.
    pub fn answers_for(&self, user_id: Uuid) -> Result<Vec<ScenarioAnswer>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.scenario_id, r.selected_option_id, o.personality_vector
                 FROM user_scenario_responses r
                 JOIN scenario_options o ON o.id = r.selected_option_id
                 WHERE r.user_id = ?1
                 ORDER BY r.scenario_id",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let answers = rows
                .into_iter()
                .map(|(scenario_id, option_id, raw)| {
                    let vector = raw.as_deref().and_then(|raw| {
                        let parsed = PersonalityVector::from_json(raw);
                        if parsed.is_none() {
                            warn!("Malformed personality vector on option {}", option_id);
                        }
                        parsed
                    });
                    ScenarioAnswer {
                        scenario_id,
                        option_id,
                        vector,
                    }
                })
                .collect();

            Ok(answers)
        })
    }
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        nickname: row.get(1)?,
        gender: row.get(2)?,
        birth_year: row.get(3)?,
        location: row.get(4)?,
        is_profile_complete: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn query_user(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;

    let row = stmt.query_row([id.to_string()], map_user).optional()?;

    row.map(User::try_from).transpose()
}
