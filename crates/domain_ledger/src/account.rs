//! General-ledger accounts
//!
//! An account's balance is never set directly. It changes only through
//! `posting::post_entry`, which holds the crate-private `apply_line`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{AccountId, Money};
use crate::error::LedgerError;

/// Types of accounts in the chart of accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// Asset accounts (debit normal balance)
    Asset,
    /// Liability accounts (credit normal balance)
    Liability,
    /// Equity accounts (credit normal balance)
    Equity,
    /// Income accounts (credit normal balance)
    Income,
    /// Expense accounts (debit normal balance)
    Expense,
}

impl AccountType {
    pub const ALL: [AccountType; 5] = [
        AccountType::Asset,
        AccountType::Liability,
        AccountType::Equity,
        AccountType::Income,
        AccountType::Expense,
    ];

    /// The side on which this account type grows
    pub fn normal_balance(&self) -> NormalBalance {
        match self {
            AccountType::Asset | AccountType::Expense => NormalBalance::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Income => NormalBalance::Credit,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AccountType::Asset => "ASSET",
            AccountType::Liability => "LIABILITY",
            AccountType::Equity => "EQUITY",
            AccountType::Income => "INCOME",
            AccountType::Expense => "EXPENSE",
        }
    }
}

impl FromStr for AccountType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountType::ALL
            .into_iter()
            .find(|t| t.code() == s)
            .ok_or_else(|| LedgerError::Validation(format!("unknown account type '{}'", s)))
    }
}

/// Normal balance side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalBalance {
    Debit,
    Credit,
}

/// Account lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Inactive,
    Closed,
}

impl AccountStatus {
    pub fn code(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Inactive => "INACTIVE",
            AccountStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for AccountStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(AccountStatus::Active),
            "INACTIVE" => Ok(AccountStatus::Inactive),
            "CLOSED" => Ok(AccountStatus::Closed),
            other => Err(LedgerError::Validation(format!("unknown account status '{}'", other))),
        }
    }
}

/// Request to open a new account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    /// Code of the parent account, if this is a sub-account
    pub parent_code: Option<String>,
    pub is_system_account: bool,
}

impl NewAccount {
    pub fn new(code: impl Into<String>, name: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            account_type,
            parent_code: None,
            is_system_account: false,
        }
    }

    /// Sets the parent account
    pub fn under(mut self, parent_code: impl Into<String>) -> Self {
        self.parent_code = Some(parent_code.into());
        self
    }

    /// Marks the account as a protected system account
    pub fn system(mut self) -> Self {
        self.is_system_account = true;
        self
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        let code = self.code.trim();
        if code.is_empty() || code.len() > 20 {
            return Err(LedgerError::Validation("account code must be 1-20 characters".to_string()));
        }
        if code != self.code {
            return Err(LedgerError::Validation("account code must not have surrounding whitespace".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(LedgerError::Validation("account name is required".to_string()));
        }
        Ok(())
    }
}

/// Persisted form of an account, as read back by a storage adapter
#[cfg(any(test, feature = "storage"))]
#[derive(Debug, Clone)]
pub struct StoredAccount {
    pub id: AccountId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Money,
    pub parent_id: Option<AccountId>,
    pub status: AccountStatus,
    pub is_system_account: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An account in the chart of accounts
///
/// Not `Deserialize`: an account with a balance only comes from `open`
/// plus postings, or from a storage adapter via `restore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlAccount {
    pub id: AccountId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    balance: Money,
    pub parent_id: Option<AccountId>,
    pub status: AccountStatus,
    pub is_system_account: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GlAccount {
    /// Opens a new account with a zero balance
    pub fn open(request: NewAccount, parent_id: Option<AccountId>, at: DateTime<Utc>) -> Result<Self, LedgerError> {
        request.validate()?;
        Ok(Self {
            id: AccountId::new_v7(),
            code: request.code,
            name: request.name,
            account_type: request.account_type,
            balance: Money::ZERO,
            parent_id,
            status: AccountStatus::Active,
            is_system_account: request.is_system_account,
            deleted_at: None,
            created_at: at,
            updated_at: at,
        })
    }

    /// Rebuilds an account from persisted state
    ///
    /// Only compiled for storage adapters (the `storage` feature); the
    /// balance must be the one the store itself wrote after a posting.
    #[cfg(any(test, feature = "storage"))]
    pub fn restore(stored: StoredAccount) -> Self {
        Self {
            id: stored.id,
            code: stored.code,
            name: stored.name,
            account_type: stored.account_type,
            balance: stored.balance,
            parent_id: stored.parent_id,
            status: stored.status,
            is_system_account: stored.is_system_account,
            deleted_at: stored.deleted_at,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn normal_balance(&self) -> NormalBalance {
        self.account_type.normal_balance()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the account can take new journal lines
    pub fn accepts_postings(&self) -> bool {
        self.status == AccountStatus::Active && !self.is_deleted()
    }

    pub fn ensure_accepts_postings(&self) -> Result<(), LedgerError> {
        if self.is_deleted() {
            return Err(LedgerError::AccountNotFound(self.code.clone()));
        }
        if self.status != AccountStatus::Active {
            return Err(LedgerError::AccountNotActive {
                code: self.code.clone(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Signed effect of one line on this account's balance
    pub fn balance_effect(&self, debit: Money, credit: Money) -> Result<Money, LedgerError> {
        let net = match self.normal_balance() {
            NormalBalance::Debit => debit.checked_sub(credit)?,
            NormalBalance::Credit => credit.checked_sub(debit)?,
        };
        Ok(net)
    }

    pub(crate) fn apply_line(&mut self, debit: Money, credit: Money, at: DateTime<Utc>) -> Result<(), LedgerError> {
        let effect = self.balance_effect(debit, credit)?;
        self.balance = self.balance.checked_add(effect)?;
        self.updated_at = at;
        Ok(())
    }

    pub fn deactivate(&mut self, at: DateTime<Utc>) -> Result<(), LedgerError> {
        match self.status {
            AccountStatus::Active => {
                self.status = AccountStatus::Inactive;
                self.updated_at = at;
                Ok(())
            }
            AccountStatus::Inactive | AccountStatus::Closed => Err(self.locked("only active accounts can be deactivated")),
        }
    }

    pub fn reactivate(&mut self, at: DateTime<Utc>) -> Result<(), LedgerError> {
        match self.status {
            AccountStatus::Inactive => {
                self.status = AccountStatus::Active;
                self.updated_at = at;
                Ok(())
            }
            AccountStatus::Active | AccountStatus::Closed => Err(self.locked("only inactive accounts can be reactivated")),
        }
    }

    /// Closes the account; only a zero balance can be closed
    pub fn close(&mut self, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.status == AccountStatus::Closed {
            return Err(self.locked("account is already closed"));
        }
        if !self.balance.is_zero() {
            return Err(self.locked("cannot close an account with a non-zero balance"));
        }
        self.status = AccountStatus::Closed;
        self.updated_at = at;
        Ok(())
    }

    /// Marks the account deleted; lookups treat it as absent afterwards
    pub fn soft_delete(&mut self, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.is_system_account {
            return Err(self.locked("system accounts cannot be deleted"));
        }
        if !self.balance.is_zero() {
            return Err(self.locked("cannot delete an account with a non-zero balance"));
        }
        if self.is_deleted() {
            return Err(LedgerError::AccountNotFound(self.code.clone()));
        }
        self.deleted_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    fn locked(&self, reason: &str) -> LedgerError {
        LedgerError::AccountLocked {
            code: self.code.clone(),
            reason: reason.to_string(),
        }
    }
}
