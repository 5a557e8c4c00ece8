//! Engine configuration
//!
//! Loaded in layers, later ones winning:
//!
//! 1. built-in defaults
//! 2. an optional TOML file (`ledger.toml` unless another path is given)
//! 3. environment variables prefixed `LEDGER__`, sections separated by `__`
//!
//! ```bash
//! LEDGER__DATABASE__URL=postgres://ledger@localhost/ledger
//! LEDGER__FEES__DAILY_SERVICE_FEE_CENTS=300
//! LEDGER__SETTLEMENT__ATRONACH_BPS=5000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

use core_kernel::{Money, Timezone};
use domain_reconciliation::MatchTolerance;
use domain_settlement::FeeShareSchedule;

use crate::error::EngineError;

pub const DEFAULT_CONFIG_FILE: &str = "ledger.toml";
pub const ENV_PREFIX: &str = "LEDGER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError::Fatal(e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseSettings {
    #[validate(length(min = 1))]
    pub url: String,
    #[validate(range(min = 1, max = 500))]
    pub max_connections: u32,
    pub min_connections: u32,
    #[validate(range(min = 1))]
    pub connect_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub idle_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub max_lifetime_secs: u64,
}

impl DatabaseSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/ledger".to_string(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TelemetrySettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[validate(length(min = 1))]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CalendarSettings {
    /// IANA name of the business timezone
    #[validate(length(min = 1))]
    pub timezone: String,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            timezone: core_kernel::temporal::DEFAULT_TIMEZONE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FeeSettings {
    #[validate(range(min = 0))]
    pub deposit_service_fee_cents: i64,
    #[validate(range(min = 0))]
    pub daily_service_fee_cents: i64,
}

impl Default for FeeSettings {
    fn default() -> Self {
        Self {
            deposit_service_fee_cents: 3_000,
            daily_service_fee_cents: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SettlementSettings {
    #[validate(range(max = 10_000))]
    pub kba_bps: u32,
    #[validate(range(max = 10_000))]
    pub robs_insurance_bps: u32,
    #[validate(range(max = 10_000))]
    pub definite_assurance_bps: u32,
    #[validate(range(max = 10_000))]
    pub atronach_bps: u32,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        let schedule = FeeShareSchedule::default();
        Self {
            kba_bps: schedule.bps_for(core_kernel::PartnerType::Kba),
            robs_insurance_bps: schedule.bps_for(core_kernel::PartnerType::RobsInsurance),
            definite_assurance_bps: schedule.bps_for(core_kernel::PartnerType::DefiniteAssurance),
            atronach_bps: schedule.bps_for(core_kernel::PartnerType::Atronach),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReconciliationSettings {
    #[validate(range(max = 31))]
    pub date_grace_days: u32,
    #[validate(range(min = 0))]
    pub amount_tolerance_cents: i64,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        let tolerance = MatchTolerance::default();
        Self {
            date_grace_days: tolerance.date_grace_days,
            amount_tolerance_cents: tolerance.amount_tolerance.cents(),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EngineConfig {
    #[validate(nested)]
    pub database: DatabaseSettings,
    #[validate(nested)]
    pub telemetry: TelemetrySettings,
    #[validate(nested)]
    pub calendar: CalendarSettings,
    #[validate(nested)]
    pub fees: FeeSettings,
    #[validate(nested)]
    pub settlement: SettlementSettings,
    #[validate(nested)]
    pub reconciliation: ReconciliationSettings,
}

impl EngineConfig {
    /// Loads `.env`, then defaults, `ledger.toml` and the environment
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Same as `load` with an explicit file; a missing file is not an error
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config: EngineConfig = config::Config::builder()
            .add_source(config::Config::try_from(&EngineConfig::default())?)
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate_all()?;
        Ok(config)
    }

    /// Field ranges plus the cross-field rules
    pub fn validate_all(&self) -> Result<(), ConfigError> {
        self.validate().map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(format!(
                "database.min_connections {} exceeds max_connections {}",
                self.database.min_connections, self.database.max_connections
            )));
        }
        self.timezone()?;
        self.fee_shares()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Timezone, ConfigError> {
        Timezone::from_name(&self.calendar.timezone).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn fee_shares(&self) -> Result<FeeShareSchedule, ConfigError> {
        let s = &self.settlement;
        FeeShareSchedule::new(s.kba_bps, s.robs_insurance_bps, s.definite_assurance_bps, s.atronach_bps)
            .map_err(|e| ConfigError::Invalid(format!("settlement: {}", e)))
    }

    pub fn match_tolerance(&self) -> MatchTolerance {
        MatchTolerance {
            date_grace_days: self.reconciliation.date_grace_days,
            amount_tolerance: Money::from_cents(self.reconciliation.amount_tolerance_cents),
        }
    }

    pub fn deposit_fee(&self) -> Money {
        Money::from_cents(self.fees.deposit_service_fee_cents)
    }

    pub fn daily_fee(&self) -> Money {
        Money::from_cents(self.fees.daily_service_fee_cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate_all().unwrap();
        assert_eq!(config.deposit_fee(), Money::from_cents(3_000));
        assert_eq!(config.daily_fee(), Money::from_cents(300));
        assert_eq!(config.match_tolerance(), MatchTolerance::default());
        assert_eq!(config.timezone().unwrap(), Timezone::default());
    }

    #[test]
    fn test_shares_must_cover_the_fee() {
        let mut config = EngineConfig::default();
        config.settlement.atronach_bps -= 1;
        assert!(matches!(config.validate_all(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let mut config = EngineConfig::default();
        config.calendar.timezone = "Africa/Atlantis".to_string();
        assert!(config.validate_all().is_err());
    }

    #[test]
    fn test_pool_bounds() {
        let mut config = EngineConfig::default();
        config.database.min_connections = 20;
        assert!(config.validate_all().is_err());
        config.database.min_connections = 2;
        config.database.max_connections = 0;
        assert!(config.validate_all().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load_from(Path::new("/nonexistent/ledger.toml")).unwrap();
        assert_eq!(config.calendar.timezone, "Africa/Nairobi");
    }
}
