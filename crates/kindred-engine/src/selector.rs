//! Candidate ranking and match proposal.
//!
//! Already-paired users are excluded before scoring and the store's pair
//! uniqueness catches whatever a concurrent run slips in, so re-running for
//! the same seed never yields a second row for a pair.

use tracing::{debug, info};
use uuid::Uuid;

use kindred_db::{Database, InsertOutcome, NewMatch};
use kindred_push::NotificationRequest;
use kindred_types::events::ChangeEvent;
use kindred_types::models::{Match, ScenarioAnswer, ScenarioVector};

use crate::reason::{ChoiceMap, match_reason};
use crate::scorer::score;
use crate::{Engine, EngineConfig, EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq)]
pub struct MatchingOutcome {
    pub created_count: usize,
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub candidate_id: Uuid,
    pub score: u8,
    pub reason: String,
}

impl Engine {
    pub async fn run_matching(&self, seed: Uuid) -> EngineResult<MatchingOutcome> {
        let config = self.config;
        let created = self.blocking(move |db| propose(db, seed, &config)).await?;

        for record in &created {
            self.hub.publish(ChangeEvent::MatchCreated(record.clone()));
            if let Some(counterpart) = record.counterpart_of(seed) {
                self.notify(NotificationRequest::new_match(counterpart, record.id));
            }
        }

        info!("Matching for {} created {} proposal(s)", seed, created.len());
        Ok(MatchingOutcome {
            created_count: created.len(),
            matches: created,
        })
    }
}

fn vectors(answers: &[ScenarioAnswer]) -> Vec<ScenarioVector> {
    answers
        .iter()
        .filter_map(|a| {
            a.vector.as_ref().map(|vector| ScenarioVector {
                scenario_id: a.scenario_id,
                vector: vector.clone(),
            })
        })
        .collect()
}

fn choices(answers: &[ScenarioAnswer]) -> ChoiceMap {
    answers.iter().map(|a| (a.scenario_id, a.option_id)).collect()
}

/// Scores every eligible, not yet paired candidate and returns the best
/// `max_proposals` that clear `min_score`, highest first.
pub fn rank(db: &Database, seed: Uuid, config: &EngineConfig) -> EngineResult<Vec<Proposal>> {
    let user = db.get_user(seed)?.ok_or(EngineError::NotFound("user"))?;

    let seed_answers = db.answers_for(seed)?;
    if seed_answers.is_empty() {
        return Err(EngineError::NoResponses);
    }
    let seed_vectors = vectors(&seed_answers);
    let seed_choices = choices(&seed_answers);

    let paired = db.paired_user_ids(seed)?;

    let mut ranked = Vec::new();
    for candidate in db.candidate_users(user.gender.opposite(), seed)? {
        if paired.contains(&candidate.id) {
            continue;
        }
        let answers = db.answers_for(candidate.id)?;
        if answers.is_empty() {
            continue;
        }

        let compat = score(&seed_vectors, &vectors(&answers));
        ranked.push(Proposal {
            candidate_id: candidate.id,
            score: compat,
            reason: match_reason(&seed_choices, &choices(&answers), compat),
        });
    }

    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
    ranked.truncate(config.max_proposals);
    ranked.retain(|p| p.score >= config.min_score);
    Ok(ranked)
}

fn create(db: &Database, seed: Uuid, proposal: &Proposal) -> EngineResult<Match> {
    let outcome = db.insert_match(&NewMatch {
        user_id: seed,
        other_id: proposal.candidate_id,
        score: proposal.score,
        reason: proposal.reason.clone(),
    })?;
    match outcome {
        InsertOutcome::Created(record) => Ok(record),
        InsertOutcome::Conflict => Err(EngineError::Conflict),
    }
}

fn propose(db: &Database, seed: Uuid, config: &EngineConfig) -> EngineResult<Vec<Match>> {
    let mut created = Vec::new();
    for proposal in rank(db, seed, config)? {
        match create(db, seed, &proposal) {
            Ok(record) => created.push(record),
            Err(EngineError::Conflict) => {
                debug!("Pair {}/{} already exists, skipping", seed, proposal.candidate_id);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kindred_types::models::{Gender, PersonalityVector, User};

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn user(db: &Database, gender: Gender, id: u128) -> Uuid {
        let user = User {
            id: Uuid::from_u128(id),
            nickname: format!("u{}", id),
            gender,
            birth_year: 1995,
            location: "Incheon".into(),
            is_profile_complete: true,
            created_at: Utc::now(),
        };
        db.upsert_user(&user).unwrap();
        user.id
    }

    /// Scenario 1 with option 1 = (1, 0) and option 2 = (-1, 0).
    fn options(db: &Database) {
        db.upsert_scenario_option(1, 1, "1a", Some(&PersonalityVector::new([("x", 1.0), ("y", 0.0)])))
            .unwrap();
        db.upsert_scenario_option(2, 1, "1b", Some(&PersonalityVector::new([("x", -1.0), ("y", 0.0)])))
            .unwrap();
    }

    #[test]
    fn unknown_seed_is_not_found() {
        let db = db();
        let err = rank(&db, Uuid::new_v4(), &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn seed_without_answers_is_refused() {
        let db = db();
        let seed = user(&db, Gender::Female, 1);
        let err = rank(&db, seed, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::NoResponses));
    }

    #[test]
    fn low_scores_and_same_gender_are_left_out() {
        let db = db();
        options(&db);
        let seed = user(&db, Gender::Female, 1);
        let good = user(&db, Gender::Male, 2);
        let bad = user(&db, Gender::Male, 3);
        let same = user(&db, Gender::Female, 4);
        let silent = user(&db, Gender::Male, 5);

        db.upsert_response(seed, 1, 1).unwrap();
        db.upsert_response(good, 1, 1).unwrap();
        db.upsert_response(bad, 1, 2).unwrap();
        db.upsert_response(same, 1, 1).unwrap();

        let ranked = rank(&db, seed, &EngineConfig::default()).unwrap();
        let ids: Vec<Uuid> = ranked.iter().map(|p| p.candidate_id).collect();
        assert_eq!(ids, vec![good]);
        assert_eq!(ranked[0].score, 100);
        assert!(!ids.contains(&silent));
    }

    #[test]
    fn ties_are_broken_by_id_and_capped() {
        let db = db();
        options(&db);
        let seed = user(&db, Gender::Male, 100);
        for id in (1..=7).rev() {
            let candidate = user(&db, Gender::Female, id);
            db.upsert_response(candidate, 1, 1).unwrap();
        }
        db.upsert_response(seed, 1, 1).unwrap();

        let ranked = rank(&db, seed, &EngineConfig::default()).unwrap();
        let ids: Vec<u128> = ranked.iter().map(|p| p.candidate_id.as_u128()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn existing_pairs_are_excluded() {
        let db = db();
        options(&db);
        let seed = user(&db, Gender::Female, 1);
        let other = user(&db, Gender::Male, 2);
        db.upsert_response(seed, 1, 1).unwrap();
        db.upsert_response(other, 1, 1).unwrap();

        assert_eq!(propose(&db, seed, &EngineConfig::default()).unwrap().len(), 1);
        assert!(propose(&db, seed, &EngineConfig::default()).unwrap().is_empty());
        // the other side sees the same pair as taken
        assert!(propose(&db, other, &EngineConfig::default()).unwrap().is_empty());
    }
}
