#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use kindred_db::Database;
use kindred_engine::{Engine, EngineConfig};
use kindred_gateway::Hub;
use kindred_types::models::{Gender, PersonalityVector, User};

pub const SCENARIOS: i64 = 5;

pub fn engine() -> Engine {
    let db = Arc::new(Database::open_in_memory().unwrap());
    seed_questionnaire(&db);
    Engine::new(db, Hub::new(), EngineConfig::default())
}

/// Scenarios 1..=5, each with option `s*10+1` = (1, 0) and `s*10+2` = (0, 1).
pub fn seed_questionnaire(db: &Database) {
    for s in 1..=SCENARIOS {
        db.upsert_scenario_option(
            s * 10 + 1,
            s,
            &format!("{}a", s),
            Some(&PersonalityVector::new([("warmth", 1.0), ("drive", 0.0)])),
        )
        .unwrap();
        db.upsert_scenario_option(
            s * 10 + 2,
            s,
            &format!("{}b", s),
            Some(&PersonalityVector::new([("warmth", 0.0), ("drive", 1.0)])),
        )
        .unwrap();
    }
}

pub fn user(engine: &Engine, gender: Gender) -> Uuid {
    let user = User {
        id: Uuid::new_v4(),
        nickname: format!("user-{}", &Uuid::new_v4().to_string()[..6]),
        gender,
        birth_year: 1996,
        location: "Seoul".into(),
        is_profile_complete: true,
        created_at: Utc::now(),
    };
    engine.db().upsert_user(&user).unwrap();
    user.id
}

/// Answers scenario `s` with option `s*10 + picks[s-1]`.
pub async fn answer(engine: &Engine, user_id: Uuid, picks: &[i64]) {
    for (i, pick) in picks.iter().enumerate() {
        let scenario = i as i64 + 1;
        engine
            .record_response(user_id, scenario, scenario * 10 + pick)
            .await
            .unwrap();
    }
}

/// A female/male pair that both accepted each other.
pub async fn confirmed_pair(engine: &Engine) -> (Uuid, Uuid, Uuid) {
    let a = user(engine, Gender::Female);
    let b = user(engine, Gender::Male);
    answer(engine, a, &[1, 1, 1]).await;
    answer(engine, b, &[1, 1, 1]).await;
    let outcome = engine.run_matching(a).await.unwrap();
    let match_id = outcome.matches[0].id;
    engine.decide(match_id, a, true).await.unwrap();
    engine.decide(match_id, b, true).await.unwrap();
    (match_id, a, b)
}
