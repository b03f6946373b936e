use super::*;
use crate::catalog::{ColumnEntry, Fingerprint};
use std::path::PathBuf;
use std::time::SystemTime;

fn hit(table_name: &str, distance: f32) -> Neighbour {
    Neighbour {
        table_name: table_name.to_string(),
        distance,
    }
}

fn entry(name: &str, description: &str) -> CatalogEntry {
    CatalogEntry {
        name: name.to_string(),
        description: description.to_string(),
        columns: vec![ColumnEntry {
            name: "id".to_string(),
            description: "identifier".to_string(),
            data_type: "BIGINT".to_string(),
            is_primary_key: true,
        }],
    }
}

fn snapshot(entries: Vec<CatalogEntry>) -> CatalogSnapshot {
    CatalogSnapshot::new(
        PathBuf::from("/data/meta.json"),
        Fingerprint::from_system_time(SystemTime::UNIX_EPOCH),
        entries,
    )
}

fn names(matches: &[ScoredMatch]) -> Vec<&str> {
    matches.iter().map(|m| m.table_name.as_str()).collect()
}

#[test]
fn no_neighbours_means_no_matches() {
    assert!(select_matches("users", &[]).is_empty());
}

#[test]
fn exact_match_is_promoted_regardless_of_distance() {
    let neighbours = [hit("ORDERS", 0.1), hit("USERS", 0.8), hit("PAYMENTS", 0.2)];
    let matches = select_matches("users", &neighbours);

    assert_eq!(names(&matches), ["USERS", "ORDERS", "PAYMENTS"]);
    assert_eq!(matches[0].distance, 0.0);
}

#[test]
fn exact_match_keeps_other_confident_tables() {
    let neighbours = [hit("USERS", 0.05), hit("USER_ROLES", 0.25), hit("AUDIT", 0.4)];
    let matches = select_matches("Users", &neighbours);

    assert_eq!(names(&matches), ["USERS", "USER_ROLES"]);
    assert_eq!(matches[1].distance, 0.25);
}

#[test]
fn threshold_is_exclusive() {
    let neighbours = [hit("A", 0.3), hit("B", 0.299_99), hit("C", 0.31)];
    let matches = select_matches("anything", &neighbours);

    assert_eq!(names(&matches), ["B"]);
}

#[test]
fn nothing_confident_yields_empty() {
    let neighbours = [hit("USERS", 0.45), hit("ORDERS", 0.6)];
    assert!(select_matches("완전히 관련 없는 질의", &neighbours).is_empty());
}

#[test]
fn duplicate_tables_keep_minimum_distance() {
    let neighbours = [hit("ORDERS", 0.2), hit("USERS", 0.15), hit("ORDERS", 0.1)];
    let matches = select_matches("orders placed", &neighbours);

    assert_eq!(names(&matches), ["ORDERS", "USERS"]);
    assert_eq!(matches[0].distance, 0.1);
}

#[test]
fn equal_distances_keep_first_seen_order() {
    let neighbours = [hit("B", 0.1), hit("A", 0.1), hit("C", 0.05)];
    let matches = select_matches("query", &neighbours);

    assert_eq!(names(&matches), ["C", "B", "A"]);
}

#[test]
fn nan_distances_are_discarded() {
    let neighbours = [hit("A", f32::NAN), hit("B", 0.1)];
    assert_eq!(names(&select_matches("query", &neighbours)), ["B"]);
}

#[test]
fn exact_match_stays_ahead_of_zero_and_negative_distances() {
    for distance in [-0.0_f32, -1.2e-7] {
        let neighbours = [hit("ORDERS", distance), hit("USERS", 0.5)];
        let matches = select_matches("users", &neighbours);

        assert_eq!(names(&matches), ["USERS", "ORDERS"], "distance {distance}");
        assert!(matches[1].distance.is_sign_positive());
        assert_eq!(matches[1].distance, 0.0);
    }
}

#[test]
fn scores_are_rounded_to_four_places() {
    assert_eq!(similarity_score(0.0), 0.0);
    assert_eq!(similarity_score(0.123_456), 0.1235);
    assert_eq!(similarity_score(0.25), 0.25);
}

#[test]
fn negative_distances_never_score_below_zero() {
    let score = similarity_score(-0.000_01);
    assert_eq!(score, 0.0);
    assert!(score.is_sign_positive());
    assert_eq!(serde_json::to_string(&score).expect("serializes"), "0.0");
}

#[test]
fn resolve_drops_tables_missing_from_snapshot() {
    let matches = vec![
        ScoredMatch {
            table_name: "USERS".to_string(),
            distance: 0.0,
        },
        ScoredMatch {
            table_name: "DROPPED".to_string(),
            distance: 0.1,
        },
    ];
    let snapshot = snapshot(vec![entry("USERS", "user accounts")]);
    let links = CatalogLinks::new("http://catalog:8585/".to_string());

    let results = resolve_matches(&matches, &snapshot, &links);

    assert_eq!(results.len(), 1);
    let users = &results[0];
    assert_eq!(users.table_name, "USERS");
    assert_eq!(users.similarity_score, 0.0);
    assert_eq!(users.table_description, "user accounts");
    assert_eq!(
        users.openmetadata_url,
        "http://catalog:8585/explore/?search=USERS&sort=_score&page=1&size=15"
    );
    assert_eq!(
        users.column_descriptions,
        vec![RankedColumn {
            column_name: "id".to_string(),
            description: "identifier".to_string(),
            data_type: "BIGINT".to_string(),
            is_primary_key: true,
        }]
    );
}

#[test]
fn ranked_table_wire_names() {
    let snapshot = snapshot(vec![entry("USERS", "user accounts")]);
    let links = CatalogLinks::new("http://localhost:8585/".to_string());
    let results = resolve_matches(
        &[ScoredMatch {
            table_name: "USERS".to_string(),
            distance: 0.12,
        }],
        &snapshot,
        &links,
    );

    let value = serde_json::to_value(&results[0]).expect("should serialize");
    let object = value.as_object().expect("should be an object");
    for key in [
        "similarity_score",
        "table_name",
        "table_description",
        "openmetadata_url",
        "column_descriptions",
    ] {
        assert!(object.contains_key(key), "missing {key}");
    }
    assert_eq!(value["column_descriptions"][0]["is_primary_key"], true);
    assert_eq!(value["column_descriptions"][0]["data_type"], "BIGINT");
}
