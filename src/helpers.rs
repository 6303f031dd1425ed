use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::filter::{classify_recency, RecencyBucket};
use crate::synthesis::MISSING_PLACEHOLDER;
use crate::types::ContractRecord;

/// Strip everything but ASCII digits.
pub fn only_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Group a tax id by its length: 11 digits as an individual id
/// (`000.000.000-00`), 14 as an entity id (`00.000.000/0000-00`). Any other
/// length is returned as bare digits.
pub fn format_tax_id(value: &str) -> String {
    let d = only_digits(value);
    match d.len() {
        11 => format!("{}.{}.{}-{}", &d[..3], &d[3..6], &d[6..9], &d[9..]),
        14 => format!(
            "{}.{}.{}/{}-{}",
            &d[..2],
            &d[2..5],
            &d[5..8],
            &d[8..12],
            &d[12..]
        ),
        _ => d,
    }
}

/// Format an amount as Brazilian currency: `R$ 1.234,56`.
pub fn format_brl(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("R$ {}{},{:02}", sign, grouped, cents % 100)
}

/// `dd/mm/yyyy`, blank when missing.
pub fn format_date_br(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_default()
}

/// `yyyy-mm-dd`, blank when missing.
pub fn format_date_iso(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn or_placeholder(value: String) -> String {
    if value.trim().is_empty() {
        MISSING_PLACEHOLDER.to_string()
    } else {
        value
    }
}

/// Labelled fields for the detail pane of the current record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailView {
    pub contract_code: String,
    pub operator_name: String,
    pub holder_name: String,
    pub tax_id: String,
    pub last_contact: String,
    pub agreement_date: String,
    pub agreement_amount: String,
    pub agreement_installments: String,
    pub formalized_agreements: String,
    pub last_cpc: String,
    pub additional_info: String,
    pub credit_commitment: String,
    pub retired: String,
    pub welfare_beneficiary: String,
    pub vehicle_owner: String,
    pub employed_with_formal_ties: String,
    pub deceased: String,
    /// Background tint for the pane.
    pub recency: Option<RecencyBucket>,
}

impl DetailView {
    pub fn from_record(record: &ContractRecord, today: NaiveDate) -> Self {
        let flag = |f: &Option<String>| or_placeholder(f.clone().unwrap_or_default());
        Self {
            contract_code: record.contract_code.clone(),
            operator_name: record.operator_name.clone(),
            holder_name: record.holder_name.clone(),
            tax_id: format_tax_id(&record.tax_id),
            last_contact: format_date_br(record.last_contact_date),
            agreement_date: format_date_br(record.agreement_date),
            agreement_amount: record.agreement_amount.map(format_brl).unwrap_or_default(),
            agreement_installments: record
                .agreement_installment_count
                .map(|n| n.to_string())
                .unwrap_or_default(),
            formalized_agreements: or_placeholder(
                record
                    .formalized_agreement_count
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
            ),
            last_cpc: format_date_br(record.last_cpc_date),
            additional_info: or_placeholder(record.additional_info.trim().to_string()),
            credit_commitment: or_placeholder(
                record.credit_commitment_percent.clone().unwrap_or_default(),
            ),
            retired: flag(&record.flags.retired),
            welfare_beneficiary: flag(&record.flags.welfare_beneficiary),
            vehicle_owner: flag(&record.flags.vehicle_owner),
            employed_with_formal_ties: flag(&record.flags.employed_with_formal_ties),
            deceased: flag(&record.flags.deceased),
            recency: record
                .last_contact_date
                .and_then(|d| classify_recency(d, today)),
        }
    }

    /// `(label, value)` pairs in display order.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("Contract", self.contract_code.as_str()),
            ("Operator", self.operator_name.as_str()),
            ("Holder", self.holder_name.as_str()),
            ("Tax id", self.tax_id.as_str()),
            ("Last contact", self.last_contact.as_str()),
            ("Agreement date", self.agreement_date.as_str()),
            ("Agreement amount", self.agreement_amount.as_str()),
            ("Installments", self.agreement_installments.as_str()),
            ("Formalized proposals", self.formalized_agreements.as_str()),
            ("Last CPC", self.last_cpc.as_str()),
            ("Additional info", self.additional_info.as_str()),
            ("Credit commitment", self.credit_commitment.as_str()),
            ("Retired", self.retired.as_str()),
            ("Welfare beneficiary", self.welfare_beneficiary.as_str()),
            ("Vehicle", self.vehicle_owner.as_str()),
            ("Formal employment", self.employed_with_formal_ties.as_str()),
            ("Deceased", self.deceased.as_str()),
        ]
    }
}

/// One row of the list tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRow {
    pub contract_code: String,
    pub holder_name: String,
    pub tax_id: String,
    pub operator_name: String,
    pub last_contact: String,
    pub agreement_date: String,
    pub agreement_amount: String,
    pub agreement_installments: String,
    pub recency: Option<RecencyBucket>,
}

impl ListRow {
    pub fn from_record(record: &ContractRecord, today: NaiveDate) -> Self {
        Self {
            contract_code: record.contract_code.clone(),
            holder_name: record.holder_name.clone(),
            tax_id: format_tax_id(&record.tax_id),
            operator_name: record.operator_name.clone(),
            last_contact: format_date_iso(record.last_contact_date),
            agreement_date: format_date_iso(record.agreement_date),
            agreement_amount: record.agreement_amount.map(format_brl).unwrap_or_default(),
            agreement_installments: record
                .agreement_installment_count
                .map(|n| n.to_string())
                .unwrap_or_default(),
            recency: record
                .last_contact_date
                .and_then(|d| classify_recency(d, today)),
        }
    }
}

/// Suggested file name for exporting the whole view.
pub fn export_all_filename(now: NaiveDateTime) -> String {
    format!("lista_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

/// Suggested file name for exporting a selection.
pub fn export_selection_filename(now: NaiveDateTime) -> String {
    format!("selecao_{}.csv", now.format("%Y%m%d_%H%M%S"))
}
