use crate::types::ManWon;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Bonus tables ───────────────────────────────────────────────────

/// One step of the execution-amount ladder: amounts at or above
/// `min_amount` earn `points`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountTier {
    pub min_amount: ManWon,
    pub points: i64,
}

/// Category and amount bonus tables. The settlement ledger and the
/// ranking both read from this one struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BonusConfig {
    pub version: String,
    pub category_bonus: HashMap<String, i64>,
    /// Sorted by `min_amount` descending once loaded.
    pub amount_tiers: Vec<AmountTier>,
}

impl BonusConfig {
    /// Points for a processing organization. Unlisted organizations earn 0.
    pub fn category_bonus(&self, org: &str) -> i64 {
        self.category_bonus.get(org.trim()).copied().unwrap_or(0)
    }

    /// Points for an execution amount (units of 10,000 won).
    pub fn amount_bonus(&self, execution_amount: ManWon) -> i64 {
        if execution_amount <= 0 {
            return 0;
        }
        self.amount_tiers
            .iter()
            .find(|tier| execution_amount >= tier.min_amount)
            .map(|tier| tier.points)
            .unwrap_or(0)
    }

    /// Sort tiers and reject a ladder that would pay less for more.
    fn normalize(mut self) -> anyhow::Result<Self> {
        self.amount_tiers
            .sort_by(|a, b| b.min_amount.cmp(&a.min_amount));
        for pair in self.amount_tiers.windows(2) {
            if pair[0].points < pair[1].points {
                anyhow::bail!(
                    "amount tier {} pays {} but lower tier {} pays {}",
                    pair[0].min_amount,
                    pair[0].points,
                    pair[1].min_amount,
                    pair[1].points
                );
            }
        }
        if self.amount_tiers.iter().any(|t| t.min_amount <= 0) {
            anyhow::bail!("amount tiers must start above zero");
        }
        Ok(self)
    }

    fn builtin() -> Self {
        let category_bonus = [
            ("신보", 30),
            ("기보", 30),
            ("중진공", 30),
            ("소진공", 20),
            ("농신보", 20),
            ("무역보험", 20),
            ("시중은행", 10),
            ("지방은행", 10),
            ("2금융", 10),
            ("미등록", 0),
            ("신용취약", 0),
            ("지역재단", 0),
        ]
        .into_iter()
        .map(|(org, pts)| (org.to_string(), pts))
        .collect();

        Self {
            version: "builtin".into(),
            category_bonus,
            amount_tiers: vec![
                AmountTier { min_amount: 15_000, points: 40 },
                AmountTier { min_amount: 10_000, points: 30 },
                AmountTier { min_amount: 5_000, points: 20 },
                AmountTier { min_amount: 1, points: 10 },
            ],
        }
    }
}

// ── Engine guarantees ─────────────────────────────────────────────

/// Whether history rows share the primary transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditMode {
    /// History is written after commit; failures are logged and dropped.
    #[default]
    BestEffort,
    /// History is written inside the primary transaction; a failure
    /// rolls the whole mutation back.
    Atomic,
}

/// What a second clawback for the same customer does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClawbackPolicy {
    /// Only rows without a reversal are reversed.
    #[default]
    Guarded,
    /// Every recognized row is reversed again on each call.
    Repeatable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audit_mode: AuditMode,
    pub clawback_policy: ClawbackPolicy,
}

#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub bonus: BonusConfig,
    pub engine: EngineConfig,
}

impl CrmConfig {
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let bonus_path = format!("{data_dir}/bonus/bonus_tables.json");
        let bonus_content = std::fs::read_to_string(&bonus_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {bonus_path}: {e}"))?;
        let bonus: BonusConfig = serde_json::from_str(&bonus_content)?;
        let bonus = bonus.normalize()?;

        let engine_path = format!("{data_dir}/engine/engine_config.json");
        let engine = match std::fs::read_to_string(&engine_path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("{engine_path} not found, using default engine config");
                EngineConfig::default()
            }
            Err(e) => anyhow::bail!("Cannot read {engine_path}: {e}"),
        };

        log::debug!(
            "Loaded bonus tables v{} ({} organizations, {} amount tiers)",
            bonus.version,
            bonus.category_bonus.len(),
            bonus.amount_tiers.len()
        );
        Ok(Self { bonus, engine })
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        Self {
            bonus: BonusConfig::builtin(),
            engine: EngineConfig::default(),
        }
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}
