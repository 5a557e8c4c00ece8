//! Partner organizations and the directory port that resolves them
//!
//! The organizational hierarchy itself lives outside this system; the core
//! only needs to turn a `PartnerType` into the organization a settlement is
//! addressed to.
//!
//! ```rust,ignore
//! let directory: Arc<dyn OrganizationDirectory> = Arc::new(StaticDirectory::standard());
//! let org = directory.resolve(PartnerType::Kba).await?;
//! ```

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use core_kernel::{
    AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, OrganizationId, PartnerType, PortError,
};

/// The organization behind a partner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Organization {
    pub id: OrganizationId,
    pub partner: PartnerType,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Account settlements are paid into
    #[validate(length(min = 1, max = 64))]
    pub payout_account: String,
    pub is_active: bool,
}

/// Port resolving partners to organizations
#[async_trait]
pub trait OrganizationDirectory: DomainPort {
    /// Returns the active organization for a partner, or `PortError::NotFound`
    async fn resolve(&self, partner: PartnerType) -> Result<Organization, PortError>;
}

/// In-process directory for deployments with a fixed partner set, and tests
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    organizations: HashMap<PartnerType, Organization>,
}

impl StaticDirectory {
    pub fn new(organizations: Vec<Organization>) -> Result<Self, PortError> {
        let mut map = HashMap::new();
        for org in organizations {
            org.validate()
                .map_err(|e| PortError::validation(format!("organization {}: {}", org.partner, e)))?;
            if map.insert(org.partner, org.clone()).is_some() {
                return Err(PortError::conflict(format!("partner {} listed twice", org.partner)));
            }
        }
        Ok(Self { organizations: map })
    }

    /// The four partners of the collection scheme
    pub fn standard() -> Self {
        let organizations = PartnerType::ALL
            .into_iter()
            .map(|partner| {
                let name = match partner {
                    PartnerType::Kba => "Kenya Bodaboda Association",
                    PartnerType::RobsInsurance => "Robs Insurance Agency",
                    PartnerType::DefiniteAssurance => "Definite Assurance Company",
                    PartnerType::Atronach => "Atronach",
                };
                let org = Organization {
                    id: OrganizationId::new(),
                    partner,
                    name: name.to_string(),
                    payout_account: format!("{}-PAYOUT", partner.code()),
                    is_active: true,
                };
                (partner, org)
            })
            .collect();
        Self { organizations }
    }
}

impl DomainPort for StaticDirectory {}

#[async_trait]
impl OrganizationDirectory for StaticDirectory {
    async fn resolve(&self, partner: PartnerType) -> Result<Organization, PortError> {
        match self.organizations.get(&partner) {
            Some(org) if org.is_active => Ok(org.clone()),
            _ => Err(PortError::not_found("Organization", partner)),
        }
    }
}

#[async_trait]
impl HealthCheckable for StaticDirectory {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "static-organization-directory".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: Some(format!("{} organizations", self.organizations.len())),
            checked_at: Utc::now(),
        }
    }
}
