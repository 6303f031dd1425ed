//! Contract feed terminal binary.
//!
//! Loads the selected portfolios in the background, then runs an interactive
//! command loop over the session.

use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use contractfeed_lib::cli::{
    filter_spec, goto_index, render_detail, render_list, Cli, CopyField, ReplCommand, Selection,
};
use contractfeed_lib::db::SqliteQueryService;
use contractfeed_lib::emails::{EmailCache, EmailResolver};
use contractfeed_lib::error::{FeedError, UserNotice};
use contractfeed_lib::export::write_export;
use contractfeed_lib::helpers::{export_all_filename, export_selection_filename};
use contractfeed_lib::prefs::Preferences;
use contractfeed_lib::query::{list_operators, QueryService};
use contractfeed_lib::state::{load_config, load_config_from, FeedSession, LoadOutcome};
use contractfeed_lib::types::{Config, LoadRequest};
use contractfeed_lib::worker::{Completion, FeedWorker};

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("contractfeed: {}", e);
            let notice = UserNotice::from(&e);
            eprintln!("{}\n{}", notice.message, notice.recovery_suggestion);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FeedError> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let service: Arc<dyn QueryService> = Arc::new(SqliteQueryService::open(&config)?);

    let prefs_path = Preferences::default_path();
    let prefs = prefs_path
        .as_deref()
        .map(Preferences::load_from)
        .unwrap_or_default();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let (tx, rx) = unbounded_channel();
    let resolver = EmailResolver::new(Arc::clone(&service), Arc::new(EmailCache::new()));
    let worker = FeedWorker::new(runtime.handle().clone(), Arc::clone(&service), resolver, tx);

    let mut repl = Repl {
        session: FeedSession::new(config.portfolios.clone()),
        worker,
        rx,
        config,
        service,
        prefs,
        prefs_path,
    };
    let fallback = repl.prefs.initial_portfolios(&repl.config.portfolios);
    let request = repl.resolve(&cli.selection, fallback)?;
    repl.select(request);
    repl.run()
}

struct Repl {
    session: FeedSession,
    worker: FeedWorker,
    rx: UnboundedReceiver<Completion>,
    config: Config,
    service: Arc<dyn QueryService>,
    prefs: Preferences,
    prefs_path: Option<PathBuf>,
}

impl Repl {
    fn run(&mut self) -> Result<(), FeedError> {
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("[{}] > ", self.session.position_text());
            io::stdout().flush()?;

            let line = match lines.next() {
                Some(line) => line?,
                None => return Ok(()),
            };
            let command = match ReplCommand::parse_line(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            };
            if command == ReplCommand::Quit {
                return Ok(());
            }
            self.execute(command);
        }
    }

    fn execute(&mut self, command: ReplCommand) {
        match command {
            ReplCommand::Show => self.show(),
            ReplCommand::Next => {
                self.session.next();
                self.show();
            }
            ReplCommand::Prev => {
                self.session.previous();
                self.show();
            }
            ReplCommand::Goto { row } => {
                self.session.goto(goto_index(row));
                self.show();
            }
            ReplCommand::Find { code } => {
                if self.session.locate(&code) {
                    self.show();
                } else {
                    println!("Contract {} is not in the current view.", code);
                }
            }
            ReplCommand::Filter {
                qr,
                cpc,
                not_contacted,
                color,
            } => {
                self.session
                    .apply_filters(filter_spec(qr, cpc, not_contacted, color));
                println!("{}", self.session.status());
                self.show();
            }
            ReplCommand::Clear => {
                self.session.clear_filters();
                println!("{}", self.session.status());
                self.show();
            }
            ReplCommand::List => {
                let rows = self.session.list_rows(Local::now().date_naive());
                println!("{}", render_list(&rows, self.session.cursor().index()));
            }
            ReplCommand::Emails => self.emails(),
            ReplCommand::Copy { field } => self.copy(field),
            ReplCommand::Export { path } => {
                let name = export_all_filename(Local::now().naive_local());
                let path = export_target(path, name);
                let rows = self.session.export_all();
                if rows.is_empty() {
                    println!("There are no records to export.");
                    return;
                }
                report_export(write_export(&path, &rows), &path);
            }
            ReplCommand::ExportSelection { path, codes } => {
                let codes: HashSet<String> = codes.into_iter().collect();
                let rows = self.session.export_selection(&codes);
                if rows.is_empty() {
                    println!("Empty selection.");
                    return;
                }
                let name = export_selection_filename(Local::now().naive_local());
                let path = export_target(Some(path), name);
                report_export(write_export(&path, &rows), &path);
            }
            ReplCommand::Reload => match self.session.reload_request().cloned() {
                Some(request) => self.load(request),
                None => println!("Nothing to reload."),
            },
            ReplCommand::Select(selection) => {
                let fallback = self.current_portfolios();
                match self.resolve(&selection, fallback) {
                    Ok(request) => self.select(request),
                    Err(e) => {
                        let notice = UserNotice::from(&e);
                        println!("{}", notice.message);
                    }
                }
            }
            ReplCommand::Operators { portfolios } => {
                let portfolios = if portfolios.is_empty() {
                    self.current_portfolios()
                } else {
                    portfolios
                };
                match self.operators(&portfolios) {
                    Ok(ops) if ops.is_empty() => println!("No operators found."),
                    Ok(ops) => println!("{}", ops.join("\n")),
                    Err(e) => {
                        let notice = UserNotice::from(&e);
                        eprintln!("{}\n{}", notice.message, notice.recovery_suggestion);
                    }
                }
            }
            ReplCommand::Quit => {}
        }
    }

    /// Portfolios of the last issued load, else the remembered ones.
    fn current_portfolios(&self) -> Vec<i64> {
        match self.session.reload_request() {
            Some(request) => request.portfolios.clone(),
            None => self.prefs.initial_portfolios(&self.config.portfolios),
        }
    }

    fn operators(&self, portfolios: &[i64]) -> Result<Vec<String>, FeedError> {
        list_operators(
            self.service.as_ref(),
            portfolios,
            self.config.locked_operator.as_deref(),
        )
    }

    /// Turn a portfolio/operator choice into a load request.
    fn resolve(&self, selection: &Selection, fallback: Vec<i64>) -> Result<LoadRequest, FeedError> {
        let portfolios = selection.portfolios(&self.config.portfolios, fallback);
        if portfolios.is_empty() {
            return Err(FeedError::Configuration(
                "Select at least one portfolio".to_string(),
            ));
        }

        let offered = match self.operators(&portfolios) {
            Ok(ops) => ops,
            Err(e) => {
                log::warn!("contractfeed: could not load operators: {}", e);
                Vec::new()
            }
        };
        let operator = selection.operator(
            self.config.locked_operator.as_deref(),
            &offered,
            self.prefs.preferred_operator(&offered),
        )?;
        Ok(LoadRequest::new(portfolios, operator))
    }

    /// Remember a confirmed selection, then load it.
    fn select(&mut self, request: LoadRequest) {
        self.prefs
            .remember_selection(&request.portfolios, request.operator.as_deref());
        if let Some(path) = &self.prefs_path {
            self.prefs.save_to(path);
        }
        self.load(request);
    }

    /// Issue a load and block the prompt until the latest one finishes.
    fn load(&mut self, request: LoadRequest) {
        let ticket = self.session.begin_load(request);
        println!("{}", self.session.status());
        self.worker.dispatch_load(ticket);

        while let Some(completion) = self.rx.blocking_recv() {
            let (generation, result) = match completion {
                Completion::Loaded { generation, result } => (generation, result),
                // Email results are already cached by the resolver.
                Completion::Emails { .. } => continue,
            };
            match self.session.complete_load(generation, result) {
                LoadOutcome::Stale => continue,
                outcome => {
                    self.report_load(outcome);
                    return;
                }
            }
        }
    }

    fn report_load(&self, outcome: LoadOutcome) {
        match outcome {
            LoadOutcome::Stale => {}
            LoadOutcome::Applied { notice, .. } => {
                println!("{}", self.session.context_text());
                println!("{}", self.session.counts_text());
                match notice {
                    Some(notice) => println!("{}", notice),
                    None => {
                        println!("{}", self.session.status());
                        self.show();
                    }
                }
            }
            LoadOutcome::Failed(notice) => {
                eprintln!("{}\n{}", notice.message, notice.recovery_suggestion);
            }
        }
    }

    fn show(&self) {
        let today = Local::now().date_naive();
        match self.session.current_detail(today) {
            Some(view) => {
                let id = self.session.current().map(|r| r.id.clone()).unwrap_or_default();
                let emails = self.worker.resolver().cache().get(&id);
                print!("{}", render_detail(&view, emails.as_deref()));
            }
            None => println!("No records."),
        }
    }

    fn emails(&mut self) {
        let Some(id) = self.session.current().map(|r| r.id.clone()) else {
            println!("No record selected.");
            return;
        };
        let emails = match self.worker.resolver().cache().get(&id) {
            Some(cached) => cached,
            None => {
                self.worker.dispatch_emails(id.clone());
                self.wait_for_emails(&id)
            }
        };
        if emails.is_empty() {
            println!("No email addresses found.");
        } else {
            println!("{}", emails.join("\n"));
        }
    }

    fn wait_for_emails(&mut self, wanted: &str) -> Vec<String> {
        while let Some(completion) = self.rx.blocking_recv() {
            match completion {
                Completion::Emails { id, emails } if id == wanted => return emails,
                Completion::Emails { .. } => continue,
                Completion::Loaded { generation, result } => {
                    match self.session.complete_load(generation, result) {
                        LoadOutcome::Stale => {
                            log::debug!("contractfeed: discarded stale load {}", generation);
                        }
                        outcome => self.report_load(outcome),
                    }
                }
            }
        }
        Vec::new()
    }

    fn copy(&self, field: CopyField) {
        let value = match field {
            CopyField::Line => self.session.current_detail_line(),
            CopyField::Name => self.session.copy_holder_name(),
            CopyField::TaxId => self.session.copy_tax_id_digits(),
            CopyField::Code => self.session.copy_contract_code(),
        };
        match value {
            Some(value) => println!("{}", value),
            None => println!("No record selected."),
        }
    }
}

/// A directory (or nothing) gets the suggested timestamped file name.
fn export_target(path: Option<PathBuf>, suggested: String) -> PathBuf {
    match path {
        Some(dir) if dir.is_dir() => dir.join(suggested),
        Some(file) => file,
        None => PathBuf::from(suggested),
    }
}

fn report_export(result: Result<usize, FeedError>, path: &std::path::Path) {
    match result {
        Ok(n) => println!("Saved {} records to {}", n, path.display()),
        Err(e) => {
            let notice = UserNotice::from(&e);
            eprintln!("{}\n{}", notice.message, notice.recovery_suggestion);
        }
    }
}
