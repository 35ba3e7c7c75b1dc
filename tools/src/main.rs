//! crm-runner: headless driver for the CRM lifecycle & settlement engine.
//!
//! Usage:
//!   crm-runner --db crm.db --data-dir ./data
//!   crm-runner --db crm.db --data-dir ./data --ipc-mode
//!
//! IPC mode reads one JSON command per stdin line, e.g.
//!   {"cmd":"transition","customer_id":"c-1","previous_status":"대기",
//!    "new_status":"단기부재","actor":"kim"}
//! and writes one JSON reply per line: `{"ok": ...}` or `{"error": "..."}`.

use anyhow::Result;
use crm_core::{
    command::CrmCommand,
    engine::CrmEngine,
    score::{Period, RankingScope},
    store::CrmStore,
};
use chrono::Datelike;
use std::env;
use std::io::{self, BufRead, Write};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = arg_value(&args, "--data-dir").unwrap_or("./data");

    if !ipc_mode {
        println!("crm-runner");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let store = if db == ":memory:" {
        CrmStore::in_memory()?
    } else {
        CrmStore::open(db)?
    };
    let engine = CrmEngine::build(store, data_dir)?;

    if ipc_mode {
        run_ipc_loop(&engine)?;
    } else {
        print_summary(&engine)?;
    }
    Ok(())
}

fn run_ipc_loop(engine: &CrmEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: CrmCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{err_json}")?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, CrmCommand::Quit) {
            break;
        }

        let reply = match engine.execute(cmd) {
            Ok(value) => serde_json::json!({ "ok": value }),
            Err(e) => {
                log::warn!("command failed: {e}");
                serde_json::json!({ "error": e.to_string() })
            }
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn print_summary(engine: &CrmEngine) -> Result<()> {
    let customers = engine.store.customer_count()?;
    let managers = engine.store.all_managers()?.len();

    println!("=== CRM SUMMARY ===");
    println!("  bonus tables:   v{}", engine.config.bonus.version);
    println!("  audit mode:     {:?}", engine.config.engine.audit_mode);
    println!("  clawback:       {:?}", engine.config.engine.clawback_policy);
    println!("  customers:      {customers}");
    println!("  managers:       {managers}");

    println!();
    println!("=== FUNNEL ===");
    let counts = engine.funnel_counts()?;
    if counts.is_empty() {
        println!("  (no customers yet)");
    }
    for (bucket, n) in &counts {
        println!("  {bucket:<16} {n}");
    }

    println!();
    let year = engine.clock().today().year();
    println!("=== MANAGER RANKING {year} ===");
    let ranking = engine.rank(&Period::Year { year }, RankingScope::Manager)?;
    if ranking.is_empty() {
        println!("  (no scoring customers)");
    }
    for (pos, entry) in ranking.iter().enumerate() {
        println!(
            "  {:>2}. {:<12} {:>4} pts  ({} customers)",
            pos + 1,
            entry.name.as_deref().unwrap_or(&entry.key),
            entry.total_score,
            entry.customer_count
        );
    }
    Ok(())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
