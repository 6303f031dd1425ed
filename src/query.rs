//! Query service seam and full feed loading.
//!
//! The main query is the only one allowed to fail a load. Auxiliary queries
//! that fail are logged and treated as empty, so the feed still comes up with
//! null-filled enrichment columns.

use std::collections::HashSet;

use crate::error::FeedError;
use crate::synthesis::{latest_contact_events, qualifying_agreements, synthesize};
use crate::types::{
    AgreementRow, ContactEventRow, LoadRequest, LoadedFeed, MainRow, MembershipSets, ProfileRow,
};

/// Read queries against the backend. Implementations must be shareable
/// across worker threads.
pub trait QueryService: Send + Sync {
    fn fetch_main(&self, portfolios: &[i64], operator: Option<&str>) -> Result<Vec<MainRow>, FeedError>;

    /// Agreements created on/after the configured cutoff, any status.
    fn fetch_agreements(&self, portfolios: &[i64]) -> Result<Vec<AgreementRow>, FeedError>;

    fn fetch_contact_events(
        &self,
        portfolios: &[i64],
        operator: Option<&str>,
    ) -> Result<Vec<ContactEventRow>, FeedError>;

    fn fetch_not_contacted(&self, portfolios: &[i64], operator: Option<&str>) -> Result<Vec<String>, FeedError>;

    fn fetch_profiles(&self, portfolios: &[i64], operator: Option<&str>) -> Result<Vec<ProfileRow>, FeedError>;

    /// Up to two raw candidates: the primary address and the mailing-address
    /// derived one. Blank candidates may be returned as `None`.
    fn fetch_emails(&self, id: &str) -> Result<Vec<Option<String>>, FeedError>;

    /// Distinct trimmed operator names serving the portfolios, sorted.
    fn fetch_operators(&self, portfolios: &[i64]) -> Result<Vec<String>, FeedError>;
}

fn or_empty<T>(label: &str, result: Result<Vec<T>, FeedError>) -> Vec<T> {
    match result {
        Ok(rows) => rows,
        Err(e) => {
            log::warn!("load_feed: {} query failed, continuing without it: {}", label, e);
            Vec::new()
        }
    }
}

/// Run every query for `request` and merge the results.
pub fn load_feed(service: &dyn QueryService, request: &LoadRequest) -> Result<LoadedFeed, FeedError> {
    let portfolios = request.portfolios.as_slice();
    let operator = request.operator.as_deref();

    let main = service.fetch_main(portfolios, operator)?;
    let agreements = or_empty("agreements", service.fetch_agreements(portfolios));
    let contact_events = or_empty(
        "contact events",
        service.fetch_contact_events(portfolios, operator),
    );
    let not_contacted = or_empty(
        "not contacted",
        service.fetch_not_contacted(portfolios, operator),
    );
    let profiles = or_empty("profiles", service.fetch_profiles(portfolios, operator));

    let sets = MembershipSets {
        qr: qualifying_agreements(&agreements).into_keys().collect(),
        cpc: latest_contact_events(&contact_events).into_keys().collect(),
        not_contacted: not_contacted.into_iter().collect::<HashSet<_>>(),
    };

    let collection = synthesize(&main, &agreements, &contact_events, &profiles);

    log::info!(
        "load_feed: {} records (Q/R {}, CPC {}, not contacted {}) for portfolios {:?}",
        collection.len(),
        sets.qr.len(),
        sets.cpc.len(),
        sets.not_contacted.len(),
        portfolios
    );

    Ok(LoadedFeed { collection, sets })
}

/// Operator choices for the selection screen. A locked operator restricts the
/// list to that single name (case-insensitive match).
pub fn list_operators(
    service: &dyn QueryService,
    portfolios: &[i64],
    locked_operator: Option<&str>,
) -> Result<Vec<String>, FeedError> {
    if portfolios.is_empty() {
        return Ok(Vec::new());
    }
    let operators = service.fetch_operators(portfolios)?;
    let operators = operators
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty());

    Ok(match locked_operator.map(|l| l.trim().to_lowercase()) {
        Some(locked) => operators.filter(|o| o.to_lowercase() == locked).collect(),
        None => operators.collect(),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory query service for tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    pub struct FakeQueryService {
        pub main: Vec<MainRow>,
        pub agreements: Vec<AgreementRow>,
        pub contact_events: Vec<ContactEventRow>,
        pub not_contacted: Vec<String>,
        pub profiles: Vec<ProfileRow>,
        pub emails: HashMap<String, Vec<Option<String>>>,
        pub operators: Vec<String>,
        pub fail_main: bool,
        pub fail_auxiliary: bool,
        pub fail_emails: bool,
        pub email_calls: AtomicUsize,
    }

    impl FakeQueryService {
        fn aux<T: Clone>(&self, rows: &[T]) -> Result<Vec<T>, FeedError> {
            if self.fail_auxiliary {
                Err(FeedError::Query("auxiliary unavailable".to_string()))
            } else {
                Ok(rows.to_vec())
            }
        }
    }

    impl QueryService for FakeQueryService {
        fn fetch_main(&self, _: &[i64], operator: Option<&str>) -> Result<Vec<MainRow>, FeedError> {
            if self.fail_main {
                return Err(FeedError::Query("backend unreachable".to_string()));
            }
            Ok(self
                .main
                .iter()
                .filter(|r| operator.map_or(true, |op| r.operator_name == op))
                .cloned()
                .collect())
        }

        fn fetch_agreements(&self, _: &[i64]) -> Result<Vec<AgreementRow>, FeedError> {
            self.aux(&self.agreements)
        }

        fn fetch_contact_events(&self, _: &[i64], _: Option<&str>) -> Result<Vec<ContactEventRow>, FeedError> {
            self.aux(&self.contact_events)
        }

        fn fetch_not_contacted(&self, _: &[i64], _: Option<&str>) -> Result<Vec<String>, FeedError> {
            self.aux(&self.not_contacted)
        }

        fn fetch_profiles(&self, _: &[i64], _: Option<&str>) -> Result<Vec<ProfileRow>, FeedError> {
            self.aux(&self.profiles)
        }

        fn fetch_emails(&self, id: &str) -> Result<Vec<Option<String>>, FeedError> {
            self.email_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_emails {
                return Err(FeedError::Query("email lookup failed".to_string()));
            }
            Ok(self.emails.get(id).cloned().unwrap_or_default())
        }

        fn fetch_operators(&self, _: &[i64]) -> Result<Vec<String>, FeedError> {
            Ok(self.operators.clone())
        }
    }

    pub fn main_row(id: &str, code: &str) -> MainRow {
        MainRow {
            id: id.to_string(),
            contract_code: code.to_string(),
            tax_id: "12345678901".to_string(),
            holder_name: format!("Holder {}", code),
            operator_name: "Ana".to_string(),
            last_contact_date: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{main_row, FakeQueryService};
    use super::*;

    fn agreement(code: &str, id: i64, status: &str) -> AgreementRow {
        AgreementRow {
            contract_code: code.to_string(),
            agreement_id: id,
            agreement_date: None,
            amount: Some(10.0),
            installment_count: Some(2),
            status: status.to_string(),
        }
    }

    #[test]
    fn test_load_feed_builds_sets() {
        let service = FakeQueryService {
            main: vec![main_row("1", "A"), main_row("2", "B")],
            agreements: vec![agreement("A", 1, "Q"), agreement("B", 2, "X")],
            contact_events: vec![ContactEventRow {
                contract_code: "B".to_string(),
                last_cpc_date: None,
            }],
            not_contacted: vec!["A".to_string()],
            ..Default::default()
        };
        let feed = load_feed(&service, &LoadRequest::new(vec![517], None)).expect("load");
        assert_eq!(feed.collection.len(), 2);
        assert!(feed.sets.qr.contains("A"));
        assert!(!feed.sets.qr.contains("B"));
        assert!(feed.sets.cpc.contains("B"));
        assert!(feed.sets.not_contacted.contains("A"));
    }

    #[test]
    fn test_main_failure_is_query_error() {
        let service = FakeQueryService {
            fail_main: true,
            ..Default::default()
        };
        let err = load_feed(&service, &LoadRequest::new(vec![517], None)).unwrap_err();
        assert!(matches!(err, FeedError::Query(_)));
    }

    #[test]
    fn test_auxiliary_failures_degrade_to_empty() {
        let service = FakeQueryService {
            main: vec![main_row("1", "A")],
            agreements: vec![agreement("A", 1, "Q")],
            fail_auxiliary: true,
            ..Default::default()
        };
        let feed = load_feed(&service, &LoadRequest::new(vec![517], None)).expect("load");
        assert_eq!(feed.collection.len(), 1);
        assert_eq!(feed.collection[0].agreement_amount, None);
        assert!(feed.sets.qr.is_empty());
    }

    #[test]
    fn test_list_operators_locked() {
        let service = FakeQueryService {
            operators: vec![" Ana ".to_string(), "Bruno".to_string(), "".to_string()],
            ..Default::default()
        };
        assert_eq!(
            list_operators(&service, &[517], None).unwrap(),
            vec!["Ana".to_string(), "Bruno".to_string()]
        );
        assert_eq!(
            list_operators(&service, &[517], Some("bruno")).unwrap(),
            vec!["Bruno".to_string()]
        );
        assert!(list_operators(&service, &[], None).unwrap().is_empty());
    }
}
