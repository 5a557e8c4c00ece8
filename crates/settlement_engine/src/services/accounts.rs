//! Chart of accounts registry

use chrono::{DateTime, Utc};
use tracing::instrument;

use core_kernel::AuditAction;
use domain_ledger::{standard_chart, AccountTree, GlAccount, LedgerError, NewAccount};

use super::{account_ref, AuditTrail, EngineContext};
use crate::error::EngineError;
use crate::store::UnitOfWork;

/// Outcome of seeding the standard chart
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Codes opened by this run
    pub created: Vec<String>,
    /// Codes that were already present
    pub existing: Vec<String>,
}

#[derive(Clone)]
pub struct AccountService {
    ctx: EngineContext,
}

impl AccountService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Opens every standard account that does not exist yet
    ///
    /// Safe to run on every start-up; existing accounts are left untouched,
    /// including soft-deleted ones.
    #[instrument(skip(self))]
    pub async fn seed_standard_chart(&self, actor: &str) -> Result<SeedReport, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);
        let mut report = SeedReport::default();

        for request in standard_chart() {
            if uow.account_by_code(&request.code).await?.is_some() {
                report.existing.push(request.code);
                continue;
            }
            let code = request.code.clone();
            open_account(uow.as_mut(), request, now, &mut trail).await?;
            report.created.push(code);
        }

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(created = report.created.len(), existing = report.existing.len(), "Standard chart seeded");
        Ok(report)
    }

    /// Opens one account; Conflict if the code is taken, NotFound for an unknown parent
    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create(&self, request: NewAccount, actor: &str) -> Result<GlAccount, EngineError> {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        if uow.account_by_code(&request.code).await?.is_some() {
            return Err(LedgerError::AccountAlreadyExists(request.code).into());
        }
        let account = open_account(uow.as_mut(), request, now, &mut trail).await?;

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        Ok(account)
    }

    /// NotFound if absent or soft-deleted
    pub async fn lookup(&self, code: &str) -> Result<GlAccount, EngineError> {
        let mut uow = self.ctx.begin().await?;
        live_account(uow.as_mut(), code).await
    }

    /// Live accounts ordered by code
    pub async fn list(&self) -> Result<Vec<GlAccount>, EngineError> {
        let mut uow = self.ctx.begin().await?;
        Ok(uow.accounts().await?.into_iter().filter(|a| !a.is_deleted()).collect())
    }

    /// Direct children of an account, ordered by code
    pub async fn children(&self, parent_code: &str) -> Result<Vec<GlAccount>, EngineError> {
        let mut uow = self.ctx.begin().await?;
        let parent = live_account(uow.as_mut(), parent_code).await?;
        let accounts: Vec<GlAccount> = uow.accounts().await?.into_iter().filter(|a| !a.is_deleted()).collect();

        let tree = AccountTree::build(&accounts);
        let child_ids = tree.children(&parent.id);
        Ok(accounts.into_iter().filter(|a| child_ids.contains(&a.id)).collect())
    }

    pub async fn deactivate(&self, code: &str, actor: &str) -> Result<GlAccount, EngineError> {
        self.change_status(code, actor, |account, at| account.deactivate(at)).await
    }

    pub async fn reactivate(&self, code: &str, actor: &str) -> Result<GlAccount, EngineError> {
        self.change_status(code, actor, |account, at| account.reactivate(at)).await
    }

    /// Only at a zero balance
    pub async fn close(&self, code: &str, actor: &str) -> Result<GlAccount, EngineError> {
        self.change_status(code, actor, |account, at| account.close(at)).await
    }

    /// Rejected for system accounts and non-zero balances
    pub async fn soft_delete(&self, code: &str, actor: &str) -> Result<GlAccount, EngineError> {
        self.change_status(code, actor, |account, at| account.soft_delete(at)).await
    }

    #[instrument(skip(self, transition))]
    async fn change_status<F>(&self, code: &str, actor: &str, transition: F) -> Result<GlAccount, EngineError>
    where
        F: FnOnce(&mut GlAccount, DateTime<Utc>) -> Result<(), LedgerError> + Send,
    {
        let now = Utc::now();
        let mut uow = self.ctx.begin().await?;
        let mut trail = AuditTrail::new(actor);

        let mut account = uow
            .lock_accounts(&[code.to_string()])
            .await?
            .into_iter()
            .find(|a| !a.is_deleted())
            .ok_or_else(|| EngineError::from(LedgerError::AccountNotFound(code.to_string())))?;

        if let Err(e) = transition(&mut account, now) {
            let err = EngineError::from(e);
            drop(uow);
            self.ctx
                .reject(actor, account_ref(&account), AuditAction::AccountStatusChanged, &err)
                .await;
            return Err(err);
        }
        uow.update_account(&account).await?;
        trail.push(account_ref(&account), AuditAction::AccountStatusChanged, now);

        uow.commit().await?;
        self.ctx.publish(trail.into_events()).await;
        tracing::info!(code = %account.code, status = %account.status, "Account status changed");
        Ok(account)
    }
}

pub(crate) async fn live_account(uow: &mut dyn UnitOfWork, code: &str) -> Result<GlAccount, EngineError> {
    match uow.account_by_code(code).await? {
        Some(account) if !account.is_deleted() => Ok(account),
        _ => Err(LedgerError::AccountNotFound(code.to_string()).into()),
    }
}

async fn open_account(
    uow: &mut dyn UnitOfWork,
    request: NewAccount,
    at: DateTime<Utc>,
    trail: &mut AuditTrail,
) -> Result<GlAccount, EngineError> {
    let parent_id = match &request.parent_code {
        Some(parent_code) => Some(live_account(uow, parent_code).await?.id),
        None => None,
    };
    let account = GlAccount::open(request, parent_id, at)?;
    uow.insert_account(&account).await?;
    trail.push(account_ref(&account), AuditAction::AccountCreated, at);
    Ok(account)
}
