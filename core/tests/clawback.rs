//! Clawback processor: reversal rows, repeat policy, ledger integrity.

mod common;

use common::*;
use crm_core::{
    config::{ClawbackPolicy, EngineConfig},
    error::CrmError,
    settlement::SettlementKind,
    status::{Status, Supplement},
    types::SettlementMonth,
};

fn contracted(engine: &crm_core::engine::CrmEngine, id: &str) -> String {
    register(engine, id, Some("m1"));
    let out = step(
        engine,
        id,
        "대기",
        "계약완료(선불)",
        contract_info(date(2024, 1, 10), 1, 30.0),
    );
    let rows = out.settlement.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].amount, 3_000);
    rows[0].item_id.clone()
}

#[test]
fn final_rejection_reverses_the_single_recognized_row() {
    let (engine, _) = engine();
    let original_id = contracted(&engine, "c-1");

    let out = step(
        &engine,
        "c-1",
        "계약완료(선불)",
        "최종부결",
        clawback_on(date(2024, 5, 3)),
    );
    assert_eq!(out.customer.status, Status::FinalRejection);
    assert!(out.customer.clawed_back_at.is_some());
    assert!(out.settlement.is_none());

    let result = out.clawback.expect("final rejection runs a clawback");
    assert!(result.clawback_created);
    assert_eq!(result.total_amount, 3_000);
    assert_eq!(result.items.len(), 1);
    let reversal = &result.items[0];
    assert_eq!(reversal.amount, -3_000);
    assert_eq!(reversal.kind, SettlementKind::Clawback);
    assert!(reversal.is_clawback);
    assert_eq!(reversal.reverses_item_id.as_deref(), Some(original_id.as_str()));
    assert_eq!(reversal.settlement_month.to_string(), "2024-05");
    assert_eq!(reversal.manager_id.as_deref(), Some("m1"));

    let ledger = engine.settlement_items("c-1").unwrap();
    assert_eq!(ledger.len(), 2, "original stays on the ledger");
    assert_eq!(ledger[0].item_id, original_id);
    assert_eq!(ledger[0].amount, 3_000);
    assert_eq!(engine.ledger_total("c-1").unwrap(), 0);

    let may = engine
        .settlement_items_in_month(SettlementMonth::new(2024, 5).unwrap())
        .unwrap();
    assert_eq!(may.len(), 1);
    assert!(may[0].is_clawback);
    let january = engine
        .settlement_items_in_month(SettlementMonth::new(2024, 1).unwrap())
        .unwrap();
    assert_eq!(january.len(), 1);
    assert_eq!(january[0].item_id, original_id);
}

#[test]
fn final_rejection_needs_a_clawback_date() {
    let (engine, _) = engine();
    contracted(&engine, "c-1");
    let err = try_step(&engine, "c-1", "계약완료(선불)", "최종부결", Supplement::default())
        .unwrap_err();
    assert!(matches!(err, CrmError::MissingSupplement { .. }));
    assert_eq!(engine.ledger_total("c-1").unwrap(), 3_000);
}

#[test]
fn nothing_recognized_means_nothing_clawed_back() {
    let (engine, _) = engine();
    register(&engine, "c-1", Some("m1"));
    let out = step(&engine, "c-1", "대기", "최종부결", clawback_on(date(2024, 2, 1)));

    let result = out.clawback.unwrap();
    assert!(!result.clawback_created);
    assert!(result.items.is_empty());
    assert_eq!(result.total_amount, 0);
    assert!(out.customer.clawed_back_at.is_none());
    assert!(engine.settlement_items("c-1").unwrap().is_empty());
}

#[test]
fn guarded_policy_does_not_reverse_twice() {
    let (engine, _) = engine();
    contracted(&engine, "c-1");
    step(&engine, "c-1", "계약완료(선불)", "최종부결", clawback_on(date(2024, 5, 3)));

    let again = engine
        .process_clawback("c-1", SettlementMonth::new(2024, 6).unwrap())
        .unwrap();
    assert!(!again.clawback_created);
    assert_eq!(again.total_amount, 0);
    assert_eq!(engine.settlement_items("c-1").unwrap().len(), 2);
    assert_eq!(engine.ledger_total("c-1").unwrap(), 0);
}

#[test]
fn repeatable_policy_double_counts() {
    let (engine, _) = engine_on(
        date(2024, 1, 2),
        EngineConfig {
            clawback_policy: ClawbackPolicy::Repeatable,
            ..Default::default()
        },
    );
    contracted(&engine, "c-1");
    step(&engine, "c-1", "계약완료(선불)", "최종부결", clawback_on(date(2024, 5, 3)));

    let again = engine
        .process_clawback("c-1", SettlementMonth::new(2024, 6).unwrap())
        .unwrap();
    assert!(again.clawback_created);
    assert_eq!(again.total_amount, 3_000);
    assert_eq!(engine.settlement_items("c-1").unwrap().len(), 3);
    assert_eq!(engine.ledger_total("c-1").unwrap(), -3_000);
}

#[test]
fn reversed_rows_survive_later_reconciliation() {
    let (engine, _) = engine();
    let original_id = contracted(&engine, "c-1");
    step(&engine, "c-1", "계약완료(선불)", "최종부결", clawback_on(date(2024, 5, 3)));

    // Still rejected: nothing to recompute.
    assert_eq!(engine.sync_settlement("c-1").unwrap().len(), 2);

    // Revived deal: a fresh recognition row, the reversed pair untouched.
    let out = step(
        &engine,
        "c-1",
        "최종부결",
        "계약완료(선불)",
        contract_info(date(2024, 7, 1), 1, 30.0),
    );
    let rows = out.settlement.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].item_id, original_id);
    assert_eq!(rows[0].settlement_month.to_string(), "2024-01");
    assert_eq!(rows[2].settlement_month.to_string(), "2024-07");
    assert_eq!(engine.ledger_total("c-1").unwrap(), 3_000);
}

#[test]
fn every_reversal_negates_exactly_one_original() {
    let (engine, _) = engine();
    register(&engine, "c-1", Some("m1"));
    prepaid_to_execution(
        &engine,
        "c-1",
        (date(2024, 1, 15), 5_000, 3.0),
        &["신보", "기보"],
        (date(2024, 4, 20), 12_000),
    );
    let out = step(
        &engine,
        "c-1",
        "집행완료(선불)",
        "최종부결",
        clawback_on(date(2024, 9, 30)),
    );
    let result = out.clawback.unwrap();
    assert_eq!(result.items.len(), 4);
    assert_eq!(result.total_amount, 1_500_000 + 3_600_000);

    let ledger = engine.settlement_items("c-1").unwrap();
    for reversal in ledger.iter().filter(|r| r.is_clawback) {
        let original = ledger
            .iter()
            .find(|r| Some(r.item_id.as_str()) == reversal.reverses_item_id.as_deref())
            .expect("reversal points at a ledger row");
        assert_eq!(reversal.amount, -original.amount);
        assert_eq!(reversal.processing_org, original.processing_org);
    }
    assert_eq!(engine.ledger_total("c-1").unwrap(), 0);
}
