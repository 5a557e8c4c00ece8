//! Standard chart of accounts and the account tree index

use std::collections::{BTreeMap, HashMap};

use core_kernel::{AccountId, PartnerType};
use crate::account::{AccountType, GlAccount, NewAccount};

/// Codes of the system accounts every deployment carries
pub mod codes {
    /// Paybill / bank account receiving rider payments and holding escrow
    pub const ESCROW_BANK: &str = "1100";
    pub const OPERATING_BANK: &str = "1200";
    pub const COMMISSION_RECEIVABLE: &str = "1300";

    /// Parent of every payable
    pub const PAYABLES: &str = "2000";
    /// Premium owed to the underwriter
    pub const PREMIUM_PAYABLE: &str = "2100";
    /// Service fees collected but not yet distributed
    pub const SERVICE_FEE_PAYABLE: &str = "2200";
    pub const KBA_PAYABLE: &str = "2310";
    pub const ROBS_PAYABLE: &str = "2320";
    pub const DEFINITE_PAYABLE: &str = "2330";

    pub const RETAINED_EARNINGS: &str = "3000";

    pub const SERVICE_FEE_INCOME: &str = "4100";
    pub const COMMISSION_INCOME: &str = "4200";

    pub const BANK_CHARGES: &str = "5100";
    pub const COMMISSION_EXPENSE: &str = "5200";
}

/// Account credited with a partner's share of distributed fees or commission
///
/// The platform operator keeps its share as income; everyone else is owed it.
pub fn partner_account(partner: PartnerType) -> &'static str {
    match partner {
        PartnerType::Kba => codes::KBA_PAYABLE,
        PartnerType::RobsInsurance => codes::ROBS_PAYABLE,
        PartnerType::DefiniteAssurance => codes::DEFINITE_PAYABLE,
        PartnerType::Atronach => codes::SERVICE_FEE_INCOME,
    }
}

/// Standard premium-collection chart, parents before children
pub fn standard_chart() -> Vec<NewAccount> {
    vec![
        // Assets
        NewAccount::new(codes::ESCROW_BANK, "Escrow Bank (Paybill)", AccountType::Asset).system(),
        NewAccount::new(codes::OPERATING_BANK, "Operating Bank", AccountType::Asset).system(),
        NewAccount::new(codes::COMMISSION_RECEIVABLE, "Commission Receivable", AccountType::Asset).system(),

        // Liabilities
        NewAccount::new(codes::PAYABLES, "Payables", AccountType::Liability).system(),
        NewAccount::new(codes::PREMIUM_PAYABLE, "Premium Payable - Underwriter", AccountType::Liability)
            .under(codes::PAYABLES)
            .system(),
        NewAccount::new(codes::SERVICE_FEE_PAYABLE, "Service Fee Payable", AccountType::Liability)
            .under(codes::PAYABLES)
            .system(),
        NewAccount::new(codes::KBA_PAYABLE, "Partner Payable - KBA", AccountType::Liability)
            .under(codes::PAYABLES)
            .system(),
        NewAccount::new(codes::ROBS_PAYABLE, "Partner Payable - Robs Insurance", AccountType::Liability)
            .under(codes::PAYABLES)
            .system(),
        NewAccount::new(codes::DEFINITE_PAYABLE, "Partner Payable - Definite Assurance", AccountType::Liability)
            .under(codes::PAYABLES)
            .system(),

        // Equity
        NewAccount::new(codes::RETAINED_EARNINGS, "Retained Earnings", AccountType::Equity).system(),

        // Income
        NewAccount::new(codes::SERVICE_FEE_INCOME, "Service Fee Income", AccountType::Income).system(),
        NewAccount::new(codes::COMMISSION_INCOME, "Commission Income", AccountType::Income).system(),

        // Expenses
        NewAccount::new(codes::BANK_CHARGES, "Bank Charges", AccountType::Expense).system(),
        NewAccount::new(codes::COMMISSION_EXPENSE, "Commission Expense", AccountType::Expense).system(),
    ]
}

/// Parent-to-children index over a set of accounts
///
/// Accounts only carry their parent id; this index is built on demand so
/// the tree never holds back-references.
#[derive(Debug, Default, Clone)]
pub struct AccountTree {
    children: HashMap<AccountId, Vec<AccountId>>,
    roots: Vec<AccountId>,
}

impl AccountTree {
    /// Builds the index from live (not soft-deleted) accounts, ordered by code
    pub fn build(accounts: &[GlAccount]) -> Self {
        let mut ordered: BTreeMap<&str, &GlAccount> = BTreeMap::new();
        for account in accounts.iter().filter(|a| !a.is_deleted()) {
            ordered.insert(account.code.as_str(), account);
        }

        let mut tree = AccountTree::default();
        for account in ordered.values() {
            match account.parent_id {
                Some(parent) => tree.children.entry(parent).or_default().push(account.id),
                None => tree.roots.push(account.id),
            }
        }
        tree
    }

    pub fn children(&self, parent: &AccountId) -> &[AccountId] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roots(&self) -> &[AccountId] {
        &self.roots
    }

    /// Every account below `parent`, depth first
    pub fn descendants(&self, parent: &AccountId) -> Vec<AccountId> {
        let mut out = Vec::new();
        let mut stack: Vec<AccountId> = self.children(parent).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(&id).iter().rev().copied());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashSet;

    #[test]
    fn test_standard_chart_codes_unique() {
        let chart = standard_chart();
        let codes: HashSet<_> = chart.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes.len(), chart.len());
        assert!(chart.iter().all(|a| a.is_system_account));
    }

    #[test]
    fn test_standard_chart_parents_precede_children() {
        let chart = standard_chart();
        for (i, account) in chart.iter().enumerate() {
            if let Some(parent) = &account.parent_code {
                let parent_pos = chart.iter().position(|a| &a.code == parent).unwrap();
                assert!(parent_pos < i, "{} listed before its parent", account.code);
            }
        }
    }

    #[test]
    fn test_tree_children_and_descendants() {
        let now = Utc::now();
        let payables = GlAccount::open(NewAccount::new("2000", "Payables", AccountType::Liability), None, now).unwrap();
        let premium = GlAccount::open(NewAccount::new("2100", "Premium", AccountType::Liability), Some(payables.id), now).unwrap();
        let sub = GlAccount::open(NewAccount::new("2110", "Premium sub", AccountType::Liability), Some(premium.id), now).unwrap();
        let bank = GlAccount::open(NewAccount::new("1100", "Bank", AccountType::Asset), None, now).unwrap();

        let tree = AccountTree::build(&[sub.clone(), bank.clone(), premium.clone(), payables.clone()]);

        assert_eq!(tree.roots(), &[bank.id, payables.id]);
        assert_eq!(tree.children(&payables.id), &[premium.id]);
        assert_eq!(tree.descendants(&payables.id), vec![premium.id, sub.id]);
        assert!(tree.children(&bank.id).is_empty());
    }

    #[test]
    fn test_platform_share_lands_in_income() {
        assert_eq!(partner_account(PartnerType::Atronach), codes::SERVICE_FEE_INCOME);
        assert_eq!(partner_account(PartnerType::Kba), codes::KBA_PAYABLE);
    }
}
