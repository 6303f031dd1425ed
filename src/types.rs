use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Configuration loaded from ~/.contractfeed/config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend database file.
    pub database_path: String,
    #[serde(default = "default_portfolios")]
    pub portfolios: Vec<Portfolio>,
    /// Agreements created before this date are ignored by the agreement query.
    #[serde(default = "default_agreement_cutoff")]
    pub agreement_cutoff: NaiveDate,
    /// Pins the operator selection to a single user when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_operator: Option<String>,
}

impl Config {
    /// Catalog codes, in catalog order.
    pub fn portfolio_codes(&self) -> Vec<i64> {
        self.portfolios.iter().map(|p| p.code).collect()
    }

    /// Catalog labels for the given codes, in catalog order.
    pub fn portfolio_labels(&self, codes: &[i64]) -> Vec<String> {
        self.portfolios
            .iter()
            .filter(|p| codes.contains(&p.code))
            .map(|p| p.label.clone())
            .collect()
    }
}

/// A named class of contracts grouped by a numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub label: String,
    pub code: i64,
}

pub fn default_portfolios() -> Vec<Portfolio> {
    vec![
        Portfolio {
            label: "Autos - 517".to_string(),
            code: 517,
        },
        Portfolio {
            label: "DivZero - 518".to_string(),
            code: 518,
        },
        Portfolio {
            label: "Cedidas - 519".to_string(),
            code: 519,
        },
    ]
}

fn default_agreement_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 1).unwrap_or_default()
}

// =============================================================================
// Raw rows returned by the query service
// =============================================================================

/// One row of the main contract query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainRow {
    pub id: String,
    pub contract_code: String,
    pub tax_id: String,
    pub holder_name: String,
    pub operator_name: String,
    pub last_contact_date: Option<NaiveDate>,
}

/// An agreement created on/after the cutoff, any status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementRow {
    pub contract_code: String,
    pub agreement_id: i64,
    pub agreement_date: Option<NaiveDate>,
    pub amount: Option<f64>,
    pub installment_count: Option<i64>,
    pub status: String,
}

/// Latest confirmed-contact date for a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactEventRow {
    pub contract_code: String,
    pub last_cpc_date: Option<NaiveDate>,
}

/// Profile data for a registration. Cells are kept as raw text; the
/// synthesizer owns their normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRow {
    pub contract_code: String,
    pub additional_info: Option<String>,
    pub credit_commitment: Option<String>,
    pub retired: Option<String>,
    pub welfare_beneficiary: Option<String>,
    pub vehicle_owner: Option<String>,
    pub employed_with_formal_ties: Option<String>,
    pub deceased: Option<String>,
    pub registration_key: i64,
}

// =============================================================================
// Canonical record
// =============================================================================

/// Normalized yes/no style profile flags. `None` means no profile row matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFlags {
    pub retired: Option<String>,
    pub welfare_beneficiary: Option<String>,
    pub vehicle_owner: Option<String>,
    pub employed_with_formal_ties: Option<String>,
    pub deceased: Option<String>,
}

/// One merged contract. Never mutated after the collection is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRecord {
    pub id: String,
    pub contract_code: String,
    pub holder_name: String,
    pub tax_id: String,
    pub operator_name: String,
    pub last_contact_date: Option<NaiveDate>,
    pub agreement_date: Option<NaiveDate>,
    pub agreement_amount: Option<f64>,
    pub agreement_installment_count: Option<i64>,
    pub formalized_agreement_count: Option<i64>,
    pub last_cpc_date: Option<NaiveDate>,
    pub additional_info: String,
    /// Display percentage such as `"35%"`.
    pub credit_commitment_percent: Option<String>,
    pub flags: ProfileFlags,
}

impl ContractRecord {
    /// A record carrying only the main-query fields.
    pub fn from_main(row: &MainRow) -> Self {
        Self {
            id: row.id.clone(),
            contract_code: row.contract_code.clone(),
            holder_name: row.holder_name.clone(),
            tax_id: row.tax_id.clone(),
            operator_name: row.operator_name.clone(),
            last_contact_date: row.last_contact_date,
            agreement_date: None,
            agreement_amount: None,
            agreement_installment_count: None,
            formalized_agreement_count: None,
            last_cpc_date: None,
            additional_info: String::new(),
            credit_commitment_percent: None,
            flags: ProfileFlags::default(),
        }
    }
}

/// Immutable snapshot of merged records for one load.
pub type CanonicalCollection = Vec<ContractRecord>;

// =============================================================================
// Membership sets
// =============================================================================

/// Auxiliary business conditions a user can filter by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MembershipKind {
    /// Settled or rejected agreement ("Q/R").
    Qr,
    /// Confirmed contact.
    Cpc,
    NotContacted,
}

impl MembershipKind {
    pub fn label(&self) -> &'static str {
        match self {
            MembershipKind::Qr => "Q/R",
            MembershipKind::Cpc => "CPC",
            MembershipKind::NotContacted => "Not contacted",
        }
    }
}

/// Contract-code sets, one per membership kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipSets {
    pub qr: HashSet<String>,
    pub cpc: HashSet<String>,
    pub not_contacted: HashSet<String>,
}

impl MembershipSets {
    pub fn get(&self, kind: MembershipKind) -> &HashSet<String> {
        match kind {
            MembershipKind::Qr => &self.qr,
            MembershipKind::Cpc => &self.cpc,
            MembershipKind::NotContacted => &self.not_contacted,
        }
    }
}

/// Merged collection plus the membership sets queried alongside it.
#[derive(Debug, Clone, Default)]
pub struct LoadedFeed {
    pub collection: CanonicalCollection,
    pub sets: MembershipSets,
}

/// Which contracts to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub portfolios: Vec<i64>,
    /// Exact match on the trimmed operator name.
    pub operator: Option<String>,
}

impl LoadRequest {
    pub fn new(portfolios: Vec<i64>, operator: Option<String>) -> Self {
        let operator = operator
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty());
        Self {
            portfolios,
            operator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: Config = serde_json::from_str(r#"{ "databasePath": "/tmp/backend.db" }"#)
            .expect("parse config");
        assert_eq!(config.portfolio_codes(), vec![517, 518, 519]);
        assert_eq!(
            config.agreement_cutoff,
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
        );
        assert!(config.locked_operator.is_none());
    }

    #[test]
    fn test_portfolio_labels_follow_catalog_order() {
        let config: Config = serde_json::from_str(r#"{ "databasePath": "x" }"#).unwrap();
        assert_eq!(
            config.portfolio_labels(&[519, 517]),
            vec!["Autos - 517".to_string(), "Cedidas - 519".to_string()]
        );
    }

    #[test]
    fn test_load_request_blank_operator_is_none() {
        assert_eq!(LoadRequest::new(vec![517], Some("   ".to_string())).operator, None);
        assert_eq!(
            LoadRequest::new(vec![517], Some(" Ana ".to_string())).operator,
            Some("Ana".to_string())
        );
    }
}
