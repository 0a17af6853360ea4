use std::collections::HashSet;

use anyhow::{Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use kindred_types::lifecycle::{Decision, Transition, TransitionError};
use kindred_types::models::{Match, canonical_pair};

use super::{OptionalExt, is_unique_violation};
use crate::Database;
use crate::models::{MatchRow, format_ts, now_ts};

const MATCH_COLUMNS: &str = "id, user_a_id, user_b_id, compatibility_score, match_reason, \
     user_a_status, user_b_status, is_matched, matched_at, created_at";

/// A proposal produced by the selector.
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub user_id: Uuid,
    pub other_id: Uuid,
    pub score: u8,
    pub reason: String,
}

#[derive(Debug)]
pub enum InsertOutcome {
    Created(Match),
    /// The unordered pair already has a row.
    Conflict,
}

#[derive(Debug)]
pub enum DecisionOutcome {
    Applied { record: Match, transition: Transition },
    MatchNotFound,
    NotParticipant,
    Refused(TransitionError),
}

impl Database {
    // -- Matches --

    pub fn insert_match(&self, proposal: &NewMatch) -> Result<InsertOutcome> {
        let (a, b) = canonical_pair(proposal.user_id, proposal.other_id)
            .ok_or_else(|| anyhow!("cannot pair user {} with itself", proposal.user_id))?;
        let id = Uuid::new_v4();

        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO matches (id, user_a_id, user_b_id, compatibility_score, match_reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    a.to_string(),
                    b.to_string(),
                    proposal.score,
                    proposal.reason,
                    format_ts(Utc::now()),
                ],
            );

            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(InsertOutcome::Conflict),
                Err(e) => return Err(e.into()),
            }

            let record = query_match(conn, id)?
                .ok_or_else(|| anyhow!("match {} vanished after insert", id))?;
            Ok(InsertOutcome::Created(record))
        })
    }

    pub fn get_match(&self, id: Uuid) -> Result<Option<Match>> {
        self.with_conn(|conn| query_match(conn, id))
    }

    pub fn matches_for_user(&self, user_id: Uuid) -> Result<Vec<Match>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches
                 WHERE user_a_id = ?1 OR user_b_id = ?1
                 ORDER BY created_at DESC, compatibility_score DESC"
            ))?;

            let rows = stmt
                .query_map([user_id.to_string()], map_match)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(Match::try_from).collect()
        })
    }

    /// Everyone the user already has a match row with, whichever side they
    /// were stored on.
    pub fn paired_user_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_b_id FROM matches WHERE user_a_id = ?1
                 UNION
                 SELECT user_a_id FROM matches WHERE user_b_id = ?1",
            )?;

            let ids = stmt
                .query_map([user_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            ids.iter()
                .map(|raw| raw.parse::<Uuid>().map_err(|e| anyhow!("corrupt user id '{}': {}", raw, e)))
                .collect()
        })
    }

    /// Reads the match, applies the decision and writes the result back
    /// inside one immediate transaction.
    pub fn apply_decision(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        decision: Decision,
    ) -> Result<DecisionOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let Some(current) = query_match(&tx, match_id)? else {
                return Ok(DecisionOutcome::MatchNotFound);
            };
            let Some(side) = current.side_of(user_id) else {
                return Ok(DecisionOutcome::NotParticipant);
            };

            let transition = match current.sides().apply(side, decision) {
                Ok(t) => t,
                Err(e) => return Ok(DecisionOutcome::Refused(e)),
            };

            if !transition.changed {
                return Ok(DecisionOutcome::Applied {
                    record: current,
                    transition,
                });
            }

            let matched_at = match current.matched_at {
                Some(ts) => Some(ts),
                None if transition.became_confirmed => Some(now_ts()),
                None => None,
            };

            tx.execute(
                "UPDATE matches
                 SET user_a_status = ?2, user_b_status = ?3, is_matched = ?4, matched_at = ?5
                 WHERE id = ?1",
                rusqlite::params![
                    match_id.to_string(),
                    transition.sides.a.as_str(),
                    transition.sides.b.as_str(),
                    transition.sides.is_confirmed(),
                    matched_at.map(format_ts),
                ],
            )?;

            let record = query_match(&tx, match_id)?
                .ok_or_else(|| anyhow!("match {} vanished during update", match_id))?;
            tx.commit()?;

            Ok(DecisionOutcome::Applied { record, transition })
        })
    }
}

fn map_match(row: &rusqlite::Row<'_>) -> rusqlite::Result<MatchRow> {
    Ok(MatchRow {
        id: row.get(0)?,
        user_a_id: row.get(1)?,
        user_b_id: row.get(2)?,
        compatibility_score: row.get(3)?,
        match_reason: row.get(4)?,
        user_a_status: row.get(5)?,
        user_b_status: row.get(6)?,
        is_matched: row.get(7)?,
        matched_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

pub(super) fn query_match(conn: &Connection, id: Uuid) -> Result<Option<Match>> {
    let mut stmt = conn.prepare(&format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"))?;

    let row = stmt.query_row([id.to_string()], map_match).optional()?;

    row.map(Match::try_from).transpose()
}
