//! Score engine over customers driven through the real lifecycle.

mod common;

use common::*;
use crm_core::{
    engine::CrmEngine,
    error::CrmError,
    score::{Period, RankingEntry, RankingScope},
};
use std::collections::BTreeMap;

fn totals(entries: &[RankingEntry]) -> BTreeMap<String, i64> {
    entries
        .iter()
        .map(|e| (e.key.clone(), e.total_score))
        .collect()
}

/// m1: one prepaid execution in April (70) and one prepaid contract in
/// February (10). m2: one postpaid execution in August (45).
/// An unassigned executed customer scores for nobody.
fn populated() -> CrmEngine {
    let (engine, clock) = engine();

    register(&engine, "a", Some("m1"));
    prepaid_to_execution(
        &engine,
        "a",
        (date(2024, 1, 15), 5_000, 3.0),
        &["신보"],
        (date(2024, 4, 20), 12_000),
    );

    clock.set_date(date(2024, 2, 10));
    register(&engine, "b", Some("m1"));
    step(&engine, "b", "대기", "계약완료(선불)", contract_info(date(2024, 2, 9), 800, 2.0));

    register(&engine, "c", Some("m2"));
    step(&engine, "c", "대기", "계약완료(후불)", contract_info(date(2024, 2, 9), 6_000, 2.0));
    step(&engine, "c", "계약완료(후불)", "신청완료(후불)", org("소진공"));
    step(
        &engine,
        "c",
        "신청완료(후불)",
        "집행완료(후불)",
        execution_info(date(2024, 8, 5), 6_000),
    );

    register(&engine, "d", None);
    step(&engine, "d", "대기", "계약완료(외주)", contract_info(date(2024, 2, 9), 100, 1.0));
    step(&engine, "d", "계약완료(외주)", "신청완료(외주)", org("기보"));
    step(
        &engine,
        "d",
        "신청완료(외주)",
        "집행완료(외주)",
        execution_info(date(2024, 3, 1), 100),
    );
    engine
}

#[test]
fn prepaid_execution_scores_seventy() {
    let engine = populated();
    let score = engine.score("a").unwrap().expect("executed customer scores");
    assert_eq!(score.score_date, date(2024, 4, 20));
    assert_eq!(score.breakdown.base, 10);
    assert_eq!(score.breakdown.category_bonus, 30);
    assert_eq!(score.breakdown.amount_bonus, 30);
    assert_eq!(score.breakdown.total(), 70);

    let april = engine
        .rank(&Period::Month { year: 2024, month: 4 }, RankingScope::Manager)
        .unwrap();
    assert_eq!(april.len(), 1);
    assert_eq!(april[0].key, "m1");
    assert_eq!(april[0].name.as_deref(), Some("김영업"));
    assert_eq!(april[0].total_score, 70);
    assert_eq!(april[0].customer_count, 1);
}

#[test]
fn postpaid_contract_alone_scores_nothing() {
    let (engine, _) = engine();
    register(&engine, "p", Some("m2"));
    step(&engine, "p", "대기", "계약완료(후불)", contract_info(date(2024, 1, 2), 5_000, 2.0));

    assert!(engine.score("p").unwrap().is_none());
    let year = engine
        .rank(&Period::Year { year: 2024 }, RankingScope::Manager)
        .unwrap();
    assert!(year.iter().all(|e| e.key != "m2"));
}

#[test]
fn prepaid_contract_scores_on_its_completion_date() {
    let engine = populated();
    let score = engine.score("b").unwrap().unwrap();
    assert_eq!(score.score_date, date(2024, 2, 10));
    assert_eq!(score.breakdown.total(), 10);
}

#[test]
fn year_equals_sum_of_months() {
    let engine = populated();
    let year = totals(
        &engine
            .rank(&Period::Year { year: 2024 }, RankingScope::Manager)
            .unwrap(),
    );
    assert_eq!(year.get("m1"), Some(&80));
    assert_eq!(year.get("m2"), Some(&45));
    assert_eq!(year.len(), 2, "unassigned customer belongs to nobody");

    let mut by_month: BTreeMap<String, i64> = BTreeMap::new();
    let months = Period::Year { year: 2024 }.months();
    for month in months {
        let period = Period::Month {
            year: month.year,
            month: month.month,
        };
        for entry in engine.rank(&period, RankingScope::Manager).unwrap() {
            *by_month.entry(entry.key).or_default() += entry.total_score;
        }
    }
    assert_eq!(by_month, year);

    let h1 = totals(
        &engine
            .rank(&Period::HalfYear { year: 2024, half: 1 }, RankingScope::Manager)
            .unwrap(),
    );
    let h2 = totals(
        &engine
            .rank(&Period::HalfYear { year: 2024, half: 2 }, RankingScope::Manager)
            .unwrap(),
    );
    assert_eq!(h1.get("m1"), Some(&80));
    assert_eq!(h2.get("m2"), Some(&45));
    assert!(!h1.contains_key("m2"));
}

#[test]
fn team_ranking_is_sorted_by_score() {
    let engine = populated();
    let teams = engine
        .rank(&Period::Year { year: 2024 }, RankingScope::Team)
        .unwrap();
    let keys: Vec<_> = teams.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["team-a", "team-b"]);
    assert_eq!(teams[0].customer_count, 2);
    assert_eq!(teams[0].breakdown.base, 20);
    assert_eq!(teams[1].name.as_deref(), Some("영업2팀"));
}

#[test]
fn reassigned_customers_score_for_their_new_manager() {
    let engine = populated();
    engine.reassign_manager("a", "m2", "team-b", "tester").unwrap();
    let year = totals(
        &engine
            .rank(&Period::Year { year: 2024 }, RankingScope::Manager)
            .unwrap(),
    );
    assert_eq!(year.get("m1"), Some(&10));
    assert_eq!(year.get("m2"), Some(&115));
}

#[test]
fn rejected_customers_stop_scoring() {
    let engine = populated();
    step(&engine, "a", "집행완료(선불)", "최종부결", clawback_on(date(2024, 10, 1)));
    assert!(engine.score("a").unwrap().is_none());
    let april = engine
        .rank(&Period::Month { year: 2024, month: 4 }, RankingScope::Manager)
        .unwrap();
    assert!(april.is_empty());
}

#[test]
fn out_of_range_period_is_rejected() {
    let (engine, _) = engine();
    let err = engine
        .rank(&Period::Month { year: 2024, month: 13 }, RankingScope::Manager)
        .unwrap_err();
    assert!(matches!(err, CrmError::InvalidPeriod { .. }));
    let err = engine
        .rank(&Period::HalfYear { year: 2024, half: 0 }, RankingScope::Team)
        .unwrap_err();
    assert!(matches!(err, CrmError::InvalidPeriod { .. }));
}
