use std::collections::BTreeMap;

/// scenario id -> chosen option id
pub type ChoiceMap = BTreeMap<i64, i64>;

pub const MANY_SHARED: &str = "You have many shared values";
pub const SOME_SHARED: &str = "You have some shared values";
pub const HIGHLY_COMPATIBLE: &str = "You are highly compatible";
pub const GOOD_CONVERSATION: &str = "You could be a good conversational match";
pub const FALLBACK: &str = "Start a new connection";

const MAX_CLAUSES: usize = 2;

fn category_clause(scenario_id: i64) -> Option<&'static str> {
    match scenario_id {
        1 => Some("You resolve conflict in similar ways"),
        2 => Some("You see career and relationships alike"),
        3 => Some("Your lifestyles fit well"),
        4 => Some("You share a vision for the future"),
        5 => Some("You think alike about trust"),
        _ => None,
    }
}

/// Short human-readable rationale for a proposed match.
pub fn match_reason(a: &ChoiceMap, b: &ChoiceMap, score: u8) -> String {
    let shared: Vec<i64> = a
        .iter()
        .filter(|(scenario, option)| b.get(scenario) == Some(option))
        .map(|(scenario, _)| *scenario)
        .collect();

    let mut clauses: Vec<&str> = Vec::with_capacity(3);

    if shared.len() >= 3 {
        clauses.push(MANY_SHARED);
    } else if shared.len() >= 2 {
        clauses.push(SOME_SHARED);
    }

    if score >= 80 {
        clauses.push(HIGHLY_COMPATIBLE);
    } else if score >= 65 {
        clauses.push(GOOD_CONVERSATION);
    }

    // BTreeMap iteration keeps this in ascending scenario order
    if let Some(clause) = shared.iter().find_map(|id| category_clause(*id)) {
        clauses.push(clause);
    }

    if clauses.is_empty() {
        return FALLBACK.to_string();
    }
    clauses.truncate(MAX_CLAUSES);
    clauses.join(". ")
}
