//! Merges the main contract rows with agreement, contact and profile rows.
//!
//! `contract_code` is the join key for every auxiliary source. The main rows
//! decide the output cardinality: auxiliary sources only attach fields, they
//! never add or drop records.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::types::{
    AgreementRow, CanonicalCollection, ContactEventRow, ContractRecord, MainRow, ProfileFlags,
    ProfileRow,
};

/// Agreement statuses that count as settled (`Q`) or rejected (`E`).
const QUALIFYING_STATUSES: &[&str] = &["Q", "E"];

/// Above this value a commitment figure is already on the 0-100 scale.
const PERCENT_SCALE_THRESHOLD: f64 = 1.5;

/// Placeholder for a flag whose value is missing.
pub const MISSING_PLACEHOLDER: &str = "—";

/// The top-ranked agreement for one contract.
#[derive(Debug, Clone, PartialEq)]
pub struct AgreementSummary {
    pub agreement_date: Option<NaiveDate>,
    pub amount: Option<f64>,
    pub installment_count: Option<i64>,
    /// Number of ranked agreements (any status) for the contract.
    pub formalized_count: i64,
}

/// Rank agreements per contract by id descending and keep the top one when
/// its status qualifies.
pub fn qualifying_agreements(agreements: &[AgreementRow]) -> HashMap<String, AgreementSummary> {
    let mut top: HashMap<&str, &AgreementRow> = HashMap::new();
    let mut counts: HashMap<&str, i64> = HashMap::new();

    for row in agreements {
        let code = row.contract_code.as_str();
        *counts.entry(code).or_insert(0) += 1;
        let outranks = top
            .get(code)
            .map_or(true, |current| row.agreement_id > current.agreement_id);
        if outranks {
            top.insert(code, row);
        }
    }

    top.into_iter()
        .filter(|(_, row)| is_qualifying_status(&row.status))
        .map(|(code, row)| {
            (
                code.to_string(),
                AgreementSummary {
                    agreement_date: row.agreement_date,
                    amount: row.amount,
                    installment_count: row.installment_count,
                    formalized_count: counts.get(code).copied().unwrap_or(1),
                },
            )
        })
        .collect()
}

fn is_qualifying_status(status: &str) -> bool {
    let status = status.trim().to_uppercase();
    QUALIFYING_STATUSES.contains(&status.as_str())
}

/// Latest confirmed-contact date per contract. Contracts whose rows carry no
/// date still get an entry so membership can be derived from it.
pub fn latest_contact_events(events: &[ContactEventRow]) -> HashMap<String, Option<NaiveDate>> {
    let mut latest: HashMap<String, Option<NaiveDate>> = HashMap::new();
    for event in events {
        let entry = latest.entry(event.contract_code.clone()).or_insert(None);
        if event.last_cpc_date > *entry {
            *entry = event.last_cpc_date;
        }
    }
    latest
}

/// Most recently registered profile per contract (highest registration key,
/// first seen wins a tie).
fn latest_profiles(profiles: &[ProfileRow]) -> HashMap<&str, &ProfileRow> {
    let mut latest: HashMap<&str, &ProfileRow> = HashMap::new();
    for row in profiles {
        let newer = latest
            .get(row.contract_code.as_str())
            .map_or(true, |current| row.registration_key > current.registration_key);
        if newer {
            latest.insert(row.contract_code.as_str(), row);
        }
    }
    latest
}

/// Merge raw result sets into the canonical collection.
///
/// Pure: the same inputs always produce the same output, in `main` order.
pub fn synthesize(
    main: &[MainRow],
    agreements: &[AgreementRow],
    contact_events: &[ContactEventRow],
    profiles: &[ProfileRow],
) -> CanonicalCollection {
    if main.is_empty() {
        return Vec::new();
    }

    let agreements = qualifying_agreements(agreements);
    let contacts = latest_contact_events(contact_events);
    let profiles = latest_profiles(profiles);

    main.iter()
        .map(|row| {
            let mut record = ContractRecord::from_main(row);
            let code = row.contract_code.as_str();

            if let Some(agreement) = agreements.get(code) {
                record.agreement_date = agreement.agreement_date;
                record.agreement_amount = agreement.amount;
                record.agreement_installment_count = agreement.installment_count;
                record.formalized_agreement_count = Some(agreement.formalized_count);
            }

            record.last_cpc_date = contacts.get(code).copied().flatten();

            if let Some(profile) = profiles.get(code) {
                record.additional_info = profile
                    .additional_info
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string();
                record.credit_commitment_percent =
                    format_commitment_percent(profile.credit_commitment.as_deref());
                record.flags = ProfileFlags {
                    retired: Some(normalize_flag(profile.retired.as_deref())),
                    welfare_beneficiary: Some(normalize_flag(profile.welfare_beneficiary.as_deref())),
                    vehicle_owner: Some(normalize_flag(profile.vehicle_owner.as_deref())),
                    employed_with_formal_ties: Some(normalize_flag(
                        profile.employed_with_formal_ties.as_deref(),
                    )),
                    deceased: Some(normalize_flag(profile.deceased.as_deref())),
                };
            }

            record
        })
        .collect()
}

/// Normalize a credit-commitment figure to a display percentage.
///
/// Values above 1.5 are taken as already being percentages; anything else is
/// a 0-1 fraction. Non-numeric or missing input yields `None`.
pub fn format_commitment_percent(raw: Option<&str>) -> Option<String> {
    let value: f64 = raw?.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    if value > PERCENT_SCALE_THRESHOLD {
        Some(format!("{:.0}%", value))
    } else {
        Some(format!("{:.0}%", value * 100.0))
    }
}

/// Canonicalize a yes/no style flag token.
///
/// Unknown tokens pass through unchanged; missing values become the dash
/// placeholder.
pub fn normalize_flag(raw: Option<&str>) -> String {
    let Some(value) = raw.map(str::trim) else {
        return MISSING_PLACEHOLDER.to_string();
    };
    match value {
        "" | "NaN" | "nan" => MISSING_PLACEHOLDER.to_string(),
        "1" | "S" | "SIM" | "True" | "true" => "Yes".to_string(),
        "0" | "N" | "NAO" | "NÃO" | "False" | "false" => "No".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn main_row(id: &str, code: &str) -> MainRow {
        MainRow {
            id: id.to_string(),
            contract_code: code.to_string(),
            tax_id: "12345678901".to_string(),
            holder_name: format!("Holder {}", code),
            operator_name: "Ana".to_string(),
            last_contact_date: date(2026, 10, 1),
        }
    }

    fn agreement(code: &str, id: i64, status: &str, amount: f64) -> AgreementRow {
        AgreementRow {
            contract_code: code.to_string(),
            agreement_id: id,
            agreement_date: date(2025, 8, id as u32 % 28 + 1),
            amount: Some(amount),
            installment_count: Some(id),
            status: status.to_string(),
        }
    }

    fn profile(code: &str, key: i64, info: &str) -> ProfileRow {
        ProfileRow {
            contract_code: code.to_string(),
            additional_info: Some(info.to_string()),
            credit_commitment: Some("0.35".to_string()),
            retired: Some("S".to_string()),
            welfare_beneficiary: Some("0".to_string()),
            vehicle_owner: None,
            employed_with_formal_ties: Some("maybe".to_string()),
            deceased: Some("NÃO".to_string()),
            registration_key: key,
        }
    }

    #[test]
    fn test_cardinality_follows_main() {
        let main = vec![main_row("1", "K1"), main_row("2", "K2"), main_row("3", "K1")];
        let agreements = vec![
            agreement("K1", 10, "Q", 100.0),
            agreement("K9", 11, "Q", 50.0),
        ];
        let contacts = vec![ContactEventRow {
            contract_code: "K7".to_string(),
            last_cpc_date: date(2026, 1, 1),
        }];
        let profiles = vec![profile("K2", 1, "a"), profile("K2", 2, "b")];

        let out = synthesize(&main, &agreements, &contacts, &profiles);
        assert_eq!(out.len(), main.len());
        assert_eq!(
            out.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["1", "2", "3"]
        );
    }

    #[test]
    fn test_empty_main_yields_empty_collection() {
        let out = synthesize(&[], &[agreement("K1", 1, "Q", 1.0)], &[], &[]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_empty_auxiliaries_null_fill() {
        let out = synthesize(&[main_row("1", "K1")], &[], &[], &[]);
        let record = &out[0];
        assert_eq!(record.agreement_date, None);
        assert_eq!(record.agreement_amount, None);
        assert_eq!(record.agreement_installment_count, None);
        assert_eq!(record.formalized_agreement_count, None);
        assert_eq!(record.last_cpc_date, None);
        assert_eq!(record.additional_info, "");
        assert_eq!(record.credit_commitment_percent, None);
        assert_eq!(record.flags, ProfileFlags::default());
    }

    #[test]
    fn test_synthesize_is_deterministic() {
        let main = vec![main_row("1", "K1"), main_row("2", "K2")];
        let agreements = vec![agreement("K1", 3, "E", 10.0), agreement("K1", 2, "Q", 20.0)];
        let profiles = vec![profile("K1", 5, "x")];
        let a = synthesize(&main, &agreements, &[], &profiles);
        let b = synthesize(&main, &agreements, &[], &profiles);
        assert_eq!(a, b);
    }

    #[test]
    fn test_highest_agreement_id_wins_and_counts_all() {
        let main = vec![main_row("1", "K1")];
        let agreements = vec![
            agreement("K1", 4, "Q", 40.0),
            agreement("K1", 9, "E", 90.0),
            agreement("K1", 7, "A", 70.0),
        ];
        let out = synthesize(&main, &agreements, &[], &[]);
        assert_eq!(out[0].agreement_amount, Some(90.0));
        assert_eq!(out[0].agreement_installment_count, Some(9));
        assert_eq!(out[0].formalized_agreement_count, Some(3));
    }

    #[test]
    fn test_non_qualifying_top_agreement_attaches_nothing() {
        let main = vec![main_row("1", "K1")];
        let agreements = vec![agreement("K1", 4, "Q", 40.0), agreement("K1", 9, "A", 90.0)];
        let out = synthesize(&main, &agreements, &[], &[]);
        assert_eq!(out[0].agreement_amount, None);
        assert_eq!(out[0].formalized_agreement_count, None);
        assert!(qualifying_agreements(&agreements).is_empty());
    }

    #[test]
    fn test_latest_cpc_date_is_max() {
        let main = vec![main_row("1", "K1")];
        let contacts = vec![
            ContactEventRow {
                contract_code: "K1".to_string(),
                last_cpc_date: date(2026, 3, 1),
            },
            ContactEventRow {
                contract_code: "K1".to_string(),
                last_cpc_date: None,
            },
            ContactEventRow {
                contract_code: "K1".to_string(),
                last_cpc_date: date(2026, 5, 2),
            },
        ];
        let out = synthesize(&main, &[], &contacts, &[]);
        assert_eq!(out[0].last_cpc_date, date(2026, 5, 2));
    }

    #[test]
    fn test_latest_profile_by_registration_key() {
        let main = vec![main_row("1", "K1")];
        let profiles = vec![
            profile("K1", 3, "middle"),
            profile("K1", 8, "  newest "),
            profile("K1", 1, "oldest"),
        ];
        let out = synthesize(&main, &[], &[], &profiles);
        let record = &out[0];
        assert_eq!(record.additional_info, "newest");
        assert_eq!(record.credit_commitment_percent.as_deref(), Some("35%"));
        assert_eq!(record.flags.retired.as_deref(), Some("Yes"));
        assert_eq!(record.flags.welfare_beneficiary.as_deref(), Some("No"));
        assert_eq!(record.flags.vehicle_owner.as_deref(), Some("—"));
        assert_eq!(record.flags.employed_with_formal_ties.as_deref(), Some("maybe"));
        assert_eq!(record.flags.deceased.as_deref(), Some("No"));
    }

    #[test]
    fn test_format_commitment_percent() {
        assert_eq!(format_commitment_percent(Some("35")), Some("35%".to_string()));
        assert_eq!(format_commitment_percent(Some("0.42")), Some("42%".to_string()));
        assert_eq!(format_commitment_percent(Some("1.5")), Some("150%".to_string()));
        assert_eq!(format_commitment_percent(Some("1.6")), Some("2%".to_string()));
        assert_eq!(format_commitment_percent(Some("abc")), None);
        assert_eq!(format_commitment_percent(Some("NaN")), None);
        assert_eq!(format_commitment_percent(None), None);
    }

    #[test]
    fn test_normalize_flag_tokens() {
        for token in ["1", "S", "SIM", "true", "True"] {
            assert_eq!(normalize_flag(Some(token)), "Yes");
        }
        for token in ["0", "N", "NAO", "NÃO", "false", "False"] {
            assert_eq!(normalize_flag(Some(token)), "No");
        }
        assert_eq!(normalize_flag(Some("X")), "X");
        assert_eq!(normalize_flag(None), "—");
    }
}
