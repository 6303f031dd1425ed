//! Configuration loading and the session coordinator.
//!
//! `FeedSession` owns every piece of mutable session state: the published
//! snapshot, the membership sets, the active filter, the filtered view and
//! the navigation cursor. It runs on a single coordination thread; workers
//! only hand results back through `complete_load`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate};

use crate::cursor::NavigationCursor;
use crate::error::{FeedError, UserNotice};
use crate::export::{self, ExportRow};
use crate::filter::{self, FilterSpec, FilteredView};
use crate::helpers::{only_digits, DetailView, ListRow};
use crate::types::{
    CanonicalCollection, Config, ContractRecord, LoadRequest, LoadedFeed, MembershipKind,
    MembershipSets, Portfolio,
};

// =============================================================================
// Configuration
// =============================================================================

/// `~/.contractfeed`
pub fn config_dir() -> Result<PathBuf, FeedError> {
    let home = dirs::home_dir()
        .ok_or_else(|| FeedError::Configuration("Could not find home directory".to_string()))?;
    Ok(home.join(".contractfeed"))
}

/// Load configuration from ~/.contractfeed/config.json
pub fn load_config() -> Result<Config, FeedError> {
    load_config_from(&config_dir()?.join("config.json"))
}

/// Load and validate a config file. The backend database must exist.
pub fn load_config_from(config_path: &Path) -> Result<Config, FeedError> {
    if !config_path.exists() {
        return Err(FeedError::Configuration(format!(
            "Config file not found at {}. Create it with: {{ \"databasePath\": \"/path/to/backend.db\" }}",
            config_path.display()
        )));
    }

    let content = fs::read_to_string(config_path)
        .map_err(|e| FeedError::Configuration(format!("Failed to read config: {}", e)))?;

    let config: Config = serde_json::from_str(&content)
        .map_err(|e| FeedError::Configuration(format!("Failed to parse config: {}", e)))?;

    if config.database_path.trim().is_empty() {
        return Err(FeedError::Configuration(
            "databasePath must not be empty".to_string(),
        ));
    }
    if config.portfolios.is_empty() {
        return Err(FeedError::Configuration(
            "portfolios must list at least one portfolio".to_string(),
        ));
    }

    let database_path = Path::new(&config.database_path);
    if !database_path.exists() {
        return Err(FeedError::DatabaseNotFound(database_path.to_path_buf()));
    }

    Ok(config)
}

// =============================================================================
// Session coordinator
// =============================================================================

/// Handle for an issued load. Only the ticket with the latest generation can
/// be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub generation: u64,
    pub request: LoadRequest,
}

/// What `complete_load` did with a worker result.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// The snapshot was replaced. `notice` is set when the load came back
    /// with no records.
    Applied {
        records: usize,
        notice: Option<String>,
    },
    /// A newer load was issued after this one; the result was discarded.
    Stale,
    /// The load failed; prior state is untouched.
    Failed(UserNotice),
}

pub struct FeedSession {
    catalog: Vec<Portfolio>,
    generation: u64,
    /// Request belonging to the latest generation while it is in flight.
    pending: Option<LoadRequest>,
    /// Most recently issued request, whatever its outcome.
    last_issued: Option<LoadRequest>,
    loaded: Option<LoadRequest>,
    snapshot: Arc<CanonicalCollection>,
    sets: MembershipSets,
    spec: FilterSpec,
    view: FilteredView,
    cursor: NavigationCursor,
    status: String,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl FeedSession {
    pub fn new(catalog: Vec<Portfolio>) -> Self {
        Self {
            catalog,
            generation: 0,
            pending: None,
            last_issued: None,
            loaded: None,
            snapshot: Arc::new(Vec::new()),
            sets: MembershipSets::default(),
            spec: FilterSpec::default(),
            view: FilteredView::default(),
            cursor: NavigationCursor::default(),
            status: "Ready".to_string(),
        }
    }

    // ---- loading ----

    /// Issue a new load. Any earlier in-flight load becomes stale.
    pub fn begin_load(&mut self, request: LoadRequest) -> LoadTicket {
        self.generation += 1;
        self.pending = Some(request.clone());
        self.last_issued = Some(request.clone());
        self.status = "Loading...".to_string();
        log::info!(
            "FeedSession: load #{} issued for portfolios {:?}, operator {:?}",
            self.generation,
            request.portfolios,
            request.operator
        );
        LoadTicket {
            generation: self.generation,
            request,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn complete_load(&mut self, generation: u64, result: Result<LoadedFeed, FeedError>) -> LoadOutcome {
        self.complete_load_at(generation, result, today())
    }

    /// Apply a worker result if it belongs to the latest issued load.
    pub fn complete_load_at(
        &mut self,
        generation: u64,
        result: Result<LoadedFeed, FeedError>,
        today: NaiveDate,
    ) -> LoadOutcome {
        if generation != self.generation || self.pending.is_none() {
            log::debug!(
                "FeedSession: discarding stale load #{} (latest #{})",
                generation,
                self.generation
            );
            return LoadOutcome::Stale;
        }
        let request = self.pending.take().unwrap_or_else(|| LoadRequest::new(Vec::new(), None));

        let feed = match result {
            Ok(feed) => feed,
            Err(e) => {
                log::warn!("FeedSession: load #{} failed: {}", generation, e);
                self.status = "Load failed".to_string();
                return LoadOutcome::Failed(UserNotice::from(&e));
            }
        };

        let records = feed.collection.len();
        self.snapshot = Arc::new(feed.collection);
        self.sets = feed.sets;
        self.loaded = Some(request);
        self.refilter(today);

        if records == 0 {
            self.status = "No records".to_string();
            let notice = self.no_records_message();
            log::info!("FeedSession: {}", notice);
            return LoadOutcome::Applied {
                records,
                notice: Some(notice),
            };
        }

        self.status = format!("{} records loaded.", self.view.len());
        log::info!("FeedSession: load #{} applied, {} records", generation, records);
        LoadOutcome::Applied {
            records,
            notice: None,
        }
    }

    fn no_records_message(&self) -> String {
        let (labels, operator) = match &self.loaded {
            Some(request) => (self.labels_for(&request.portfolios), request.operator.is_some()),
            None => (Vec::new(), false),
        };
        let target = if operator { " (selected operator)" } else { "" };
        format!("No records found for {}{}.", labels.join(", "), target)
    }

    fn labels_for(&self, codes: &[i64]) -> Vec<String> {
        self.catalog
            .iter()
            .filter(|p| codes.contains(&p.code))
            .map(|p| p.label.clone())
            .collect()
    }

    /// The request behind the current snapshot.
    pub fn loaded_request(&self) -> Option<&LoadRequest> {
        self.loaded.as_ref()
    }

    /// The request a manual reload re-issues: the last one issued, so a
    /// failed load (including the very first) can be retried.
    pub fn reload_request(&self) -> Option<&LoadRequest> {
        self.last_issued.as_ref()
    }

    /// `Portfolios: A, B  |  Operator: All`
    pub fn context_text(&self) -> String {
        match &self.loaded {
            Some(request) => format!(
                "Portfolios: {}  |  Operator: {}",
                self.labels_for(&request.portfolios).join(", "),
                request.operator.as_deref().unwrap_or("All")
            ),
            None => "Nothing loaded".to_string(),
        }
    }

    // ---- filtering ----

    fn refilter(&mut self, today: NaiveDate) {
        self.view = filter::apply_filters(&self.snapshot, &self.sets, &self.spec, today);
        self.cursor.replace_view(self.view.len());
    }

    pub fn apply_filters(&mut self, spec: FilterSpec) -> usize {
        self.apply_filters_at(spec, today())
    }

    /// Replace the active filter and rebuild the view. The cursor returns to
    /// the first row. Returns the view length.
    pub fn apply_filters_at(&mut self, spec: FilterSpec, today: NaiveDate) -> usize {
        self.spec = spec;
        self.refilter(today);
        self.status = format!(
            "Filters applied • {} records • color: {}",
            self.view.len(),
            self.spec.color.status_label()
        );
        log::debug!("FeedSession: {}", self.status);
        self.view.len()
    }

    pub fn clear_filters(&mut self) -> usize {
        self.apply_filters(FilterSpec::default());
        self.status = format!("Filters cleared • {} records", self.view.len());
        self.view.len()
    }

    pub fn filter_spec(&self) -> &FilterSpec {
        &self.spec
    }

    pub fn view(&self) -> &FilteredView {
        &self.view
    }

    /// Number of records in the published snapshot, before filtering.
    pub fn total_records(&self) -> usize {
        self.snapshot.len()
    }

    pub fn membership_counts(&self) -> Vec<(MembershipKind, usize)> {
        [
            MembershipKind::Qr,
            MembershipKind::Cpc,
            MembershipKind::NotContacted,
        ]
        .into_iter()
        .map(|kind| (kind, self.sets.get(kind).len()))
        .collect()
    }

    /// `(Q/R: 1 | CPC: 2 | Not contacted: 3)`
    pub fn counts_text(&self) -> String {
        let parts: Vec<String> = self
            .membership_counts()
            .into_iter()
            .map(|(kind, n)| format!("{}: {}", kind.label(), n))
            .collect();
        format!("({})", parts.join(" | "))
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    // ---- navigation ----

    pub fn cursor(&self) -> &NavigationCursor {
        &self.cursor
    }

    pub fn next(&mut self) {
        self.cursor.next();
    }

    pub fn previous(&mut self) {
        self.cursor.previous();
    }

    /// Zero-based jump. Out-of-range targets are ignored.
    pub fn goto(&mut self, n: i64) {
        self.cursor.goto(n);
    }

    /// Jump to the first view row with this contract code.
    pub fn locate(&mut self, contract_code: &str) -> bool {
        match self.view.position_of(contract_code.trim()) {
            Some(pos) => {
                self.cursor.goto(pos as i64);
                true
            }
            None => false,
        }
    }

    pub fn current(&self) -> Option<&ContractRecord> {
        self.cursor.index().and_then(|i| self.view.get(i))
    }

    /// `3 / 10`, or `0 / 0` on an empty view.
    pub fn position_text(&self) -> String {
        match self.cursor.index() {
            Some(i) => format!("{} / {}", i + 1, self.view.len()),
            None => "0 / 0".to_string(),
        }
    }

    // ---- presentation ----

    pub fn current_detail(&self, today: NaiveDate) -> Option<DetailView> {
        self.current().map(|r| DetailView::from_record(r, today))
    }

    pub fn list_rows(&self, today: NaiveDate) -> Vec<ListRow> {
        self.view
            .iter()
            .map(|r| ListRow::from_record(r, today))
            .collect()
    }

    // ---- export / copy ----

    pub fn export_all(&self) -> Vec<ExportRow> {
        export::export_rows(self.view.iter())
    }

    /// Rows for the given codes, in view order.
    pub fn export_selection(&self, codes: &HashSet<String>) -> Vec<ExportRow> {
        export::export_selection(self.view.iter(), codes)
    }

    pub fn current_detail_line(&self) -> Option<String> {
        self.current().map(export::export_detail_line)
    }

    pub fn copy_holder_name(&self) -> Option<String> {
        self.current().map(|r| r.holder_name.clone())
    }

    pub fn copy_tax_id_digits(&self) -> Option<String> {
        self.current().map(|r| only_digits(&r.tax_id))
    }

    pub fn copy_contract_code(&self) -> Option<String> {
        self.current().map(|r| r.contract_code.clone())
    }
}
