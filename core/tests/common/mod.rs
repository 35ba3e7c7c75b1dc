#![allow(dead_code)]

use chrono::NaiveDate;
use crm_core::{
    clock::FixedClock,
    config::{CrmConfig, EngineConfig},
    customer::{Manager, NewCustomer},
    engine::{CrmEngine, TransitionOutcome},
    error::CrmResult,
    lifecycle::TransitionRequest,
    status::Supplement,
};
use std::sync::Arc;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Engine on a clock the test can move, with two managers on two teams.
pub fn engine_on(day: NaiveDate, engine_cfg: EngineConfig) -> (CrmEngine, Arc<FixedClock>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(FixedClock::on(day));
    let config = CrmConfig::default_test().with_engine(engine_cfg);
    let engine = CrmEngine::build_test_with(config, clock.clone()).unwrap();
    for (m, mn, t, tn) in [
        ("m1", "김영업", "team-a", "영업1팀"),
        ("m2", "이영업", "team-b", "영업2팀"),
    ] {
        engine
            .upsert_manager(&Manager {
                manager_id: m.into(),
                manager_name: mn.into(),
                team_id: t.into(),
                team_name: tn.into(),
            })
            .unwrap();
    }
    (engine, clock)
}

pub fn engine() -> (CrmEngine, Arc<FixedClock>) {
    engine_on(date(2024, 1, 2), EngineConfig::default())
}

pub fn register(engine: &CrmEngine, id: &str, manager: Option<&str>) {
    engine
        .register_customer(
            &NewCustomer {
                customer_id: id.into(),
                name: format!("고객-{id}"),
                manager_id: manager.map(Into::into),
            },
            "tester",
        )
        .unwrap();
}

pub fn try_step(
    engine: &CrmEngine,
    id: &str,
    from: &str,
    to: &str,
    supplement: Supplement,
) -> CrmResult<TransitionOutcome> {
    engine.transition(&TransitionRequest {
        customer_id: id.into(),
        previous_status: from.into(),
        new_status: to.into(),
        expected_version: None,
        supplement,
        actor: "tester".into(),
    })
}

pub fn step(
    engine: &CrmEngine,
    id: &str,
    from: &str,
    to: &str,
    supplement: Supplement,
) -> TransitionOutcome {
    try_step(engine, id, from, to, supplement)
        .unwrap_or_else(|e| panic!("{id}: {from} -> {to} failed: {e}"))
}

pub fn contract_info(on: NaiveDate, amount: i64, rate: f64) -> Supplement {
    Supplement {
        contract_date: Some(on),
        contract_amount: Some(amount),
        commission_rate: Some(rate),
        ..Default::default()
    }
}

pub fn org(name: &str) -> Supplement {
    Supplement {
        processing_org: Some(name.into()),
        ..Default::default()
    }
}

pub fn execution_info(on: NaiveDate, amount: i64) -> Supplement {
    Supplement {
        execution_date: Some(on),
        execution_amount: Some(amount),
        ..Default::default()
    }
}

pub fn clawback_on(on: NaiveDate) -> Supplement {
    Supplement {
        clawback_date: Some(on),
        ..Default::default()
    }
}

/// Walk a customer down the prepaid funnel to execution.
pub fn prepaid_to_execution(
    engine: &CrmEngine,
    id: &str,
    contract: (NaiveDate, i64, f64),
    orgs: &[&str],
    execution: (NaiveDate, i64),
) -> TransitionOutcome {
    step(engine, id, "대기", "계약완료(선불)", contract_info(contract.0, contract.1, contract.2));
    step(engine, id, "계약완료(선불)", "서류취합완료(선불)", Supplement::default());
    step(engine, id, "서류취합완료(선불)", "신청완료(선불)", org(orgs[0]));
    for extra in &orgs[1..] {
        engine
            .update_financial_fields(
                id,
                &crm_core::customer::FinancialPatch {
                    processing_org: Some((*extra).into()),
                    ..Default::default()
                },
                "tester",
            )
            .unwrap();
    }
    step(engine, id, "신청완료(선불)", "집행완료(선불)", execution_info(execution.0, execution.1))
}
