mod common;

use std::collections::HashSet;

use kindred_engine::reason::{HIGHLY_COMPATIBLE, MANY_SHARED};
use kindred_engine::scorer::NEUTRAL_SCORE;
use kindred_engine::EngineError;
use kindred_types::lifecycle::SideStatus;
use kindred_types::models::Gender;

use common::{answer, engine, user};

#[tokio::test]
async fn running_twice_never_duplicates_a_pair() {
    let engine = engine();
    let seed = user(&engine, Gender::Female);
    answer(&engine, seed, &[1, 1, 1, 1, 1]).await;
    for _ in 0..3 {
        let candidate = user(&engine, Gender::Male);
        answer(&engine, candidate, &[1, 1, 1, 1, 1]).await;
    }

    let first = engine.run_matching(seed).await.unwrap();
    assert_eq!(first.created_count, 3);
    let second = engine.run_matching(seed).await.unwrap();
    assert_eq!(second.created_count, 0);

    let rows = engine.matches_for(seed).await.unwrap();
    assert_eq!(rows.len(), 3);
    let pairs: HashSet<_> = rows.iter().map(|m| (m.user_a_id, m.user_b_id)).collect();
    assert_eq!(pairs.len(), 3);
}

#[tokio::test]
async fn concurrent_runs_for_one_seed_create_each_pair_once() {
    let engine = engine();
    let seed = user(&engine, Gender::Male);
    answer(&engine, seed, &[2, 2]).await;
    for _ in 0..4 {
        let candidate = user(&engine, Gender::Female);
        answer(&engine, candidate, &[2, 2]).await;
    }

    let (a, b) = tokio::join!(engine.run_matching(seed), engine.run_matching(seed));
    let total = a.unwrap().created_count + b.unwrap().created_count;
    assert_eq!(total, 4);
    assert_eq!(engine.matches_for(seed).await.unwrap().len(), 4);
}

#[tokio::test]
async fn proposals_are_canonical_and_pending() {
    let engine = engine();
    let seed = user(&engine, Gender::Female);
    let other = user(&engine, Gender::Male);
    answer(&engine, seed, &[1]).await;
    answer(&engine, other, &[1]).await;

    let outcome = engine.run_matching(seed).await.unwrap();
    let m = &outcome.matches[0];
    assert!(m.user_a_id < m.user_b_id);
    assert_eq!(m.user_a_status, SideStatus::Pending);
    assert_eq!(m.user_b_status, SideStatus::Pending);
    assert!(!m.is_matched);
    assert_eq!(m.compatibility_score, 100);
}

#[tokio::test]
async fn three_shared_answers_out_of_five() {
    let engine = engine();
    let a = user(&engine, Gender::Female);
    let b = user(&engine, Gender::Male);
    answer(&engine, a, &[1, 1, 1, 1, 1]).await;
    answer(&engine, b, &[1, 1, 1, 2, 2]).await;

    let outcome = engine.run_matching(a).await.unwrap();
    let m = &outcome.matches[0];

    // three identical (1.0) and two orthogonal (0.0) -> 0.6 -> 80
    assert_eq!(m.compatibility_score, 80);
    assert!(m.match_reason.contains("shared values"));
    assert_eq!(m.match_reason, format!("{}. {}", MANY_SHARED, HIGHLY_COMPATIBLE));
}

#[tokio::test]
async fn disjoint_answers_score_neutral() {
    let engine = engine();
    let a = user(&engine, Gender::Female);
    let b = user(&engine, Gender::Male);
    engine.record_response(a, 1, 11).await.unwrap();
    engine.record_response(b, 2, 21).await.unwrap();

    let outcome = engine.run_matching(a).await.unwrap();
    assert_eq!(outcome.matches[0].compatibility_score, NEUTRAL_SCORE);
}

#[tokio::test]
async fn malformed_vectors_are_skipped_not_fatal() {
    let engine = engine();
    let a = user(&engine, Gender::Female);
    let b = user(&engine, Gender::Male);
    answer(&engine, a, &[1, 1]).await;
    answer(&engine, b, &[1, 1]).await;
    engine.db().set_option_vector_raw(21, Some("{not json")).unwrap();

    let outcome = engine.run_matching(a).await.unwrap();
    // scenario 2 drops out; scenario 1 alone is identical
    assert_eq!(outcome.matches[0].compatibility_score, 100);
}

#[tokio::test]
async fn seed_errors() {
    let engine = engine();
    let quiet = user(&engine, Gender::Female);
    assert!(matches!(
        engine.run_matching(quiet).await,
        Err(EngineError::NoResponses)
    ));
    assert!(matches!(
        engine.run_matching(uuid::Uuid::new_v4()).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn retake_clears_answers() {
    let engine = engine();
    let a = user(&engine, Gender::Female);
    answer(&engine, a, &[1, 2]).await;
    assert_eq!(engine.clear_responses(a).await.unwrap(), 2);
    assert!(matches!(
        engine.run_matching(a).await,
        Err(EngineError::NoResponses)
    ));
}

#[tokio::test]
async fn options_must_belong_to_their_scenario() {
    let engine = engine();
    let a = user(&engine, Gender::Female);
    assert!(matches!(
        engine.record_response(a, 1, 21).await,
        Err(EngineError::Validation(_))
    ));
}
