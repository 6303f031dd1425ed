//! Terminal front end: clap types for the startup flags and the interactive
//! command line, plus table/detail rendering.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use owo_colors::OwoColorize;

use crate::error::FeedError;
use crate::filter::{ColorBucket, FilterSpec, RecencyBucket};
use crate::helpers::{DetailView, ListRow};
use crate::types::{MembershipKind, Portfolio};

/// Contract feed - browse, filter and export collection contracts
#[derive(Parser, Debug)]
#[command(name = "contractfeed")]
#[command(about = "Browse, filter and export collection contracts")]
pub struct Cli {
    #[command(flatten)]
    pub selection: Selection,

    /// Configuration file path (overrides ~/.contractfeed/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Portfolio and operator choice, at startup or from the `select` command.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Portfolio code to load (repeatable). Defaults to the current or remembered selection.
    #[arg(long = "portfolio", value_name = "CODE")]
    pub portfolios: Vec<i64>,

    /// Only load contracts served by this operator
    #[arg(long, conflicts_with = "all_operators")]
    pub operator: Option<String>,

    /// Ignore the remembered operator and load every operator's contracts
    #[arg(long)]
    pub all_operators: bool,
}

impl Selection {
    /// Requested codes present in the catalog, in catalog order. With no
    /// codes requested, `fallback` is used as is.
    pub fn portfolios(&self, catalog: &[Portfolio], fallback: Vec<i64>) -> Vec<i64> {
        if self.portfolios.is_empty() {
            return fallback;
        }
        for unknown in self
            .portfolios
            .iter()
            .filter(|c| !catalog.iter().any(|p| p.code == **c))
        {
            log::warn!("Selection: ignoring unknown portfolio {}", unknown);
        }
        catalog
            .iter()
            .map(|p| p.code)
            .filter(|c| self.portfolios.contains(c))
            .collect()
    }

    /// Operator to load for, given the names serving the chosen portfolios.
    ///
    /// A locked operator always wins. An explicit name must be one of
    /// `offered` (case-insensitive) when the list is known; otherwise the
    /// remembered operator is used if it is still offered.
    pub fn operator(
        &self,
        locked: Option<&str>,
        offered: &[String],
        remembered: Option<String>,
    ) -> Result<Option<String>, FeedError> {
        if let Some(locked) = locked {
            return Ok(Some(
                offered.first().cloned().unwrap_or_else(|| locked.trim().to_string()),
            ));
        }
        if self.all_operators {
            return Ok(None);
        }
        let Some(wanted) = self.operator.as_deref().map(str::trim) else {
            return Ok(remembered.filter(|r| offered.contains(r)));
        };
        if offered.is_empty() {
            return Ok(Some(wanted.to_string()));
        }
        offered
            .iter()
            .find(|o| o.to_lowercase() == wanted.to_lowercase())
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                FeedError::Configuration(format!(
                    "Operator {} does not serve the selected portfolios",
                    wanted
                ))
            })
    }
}

/// Session cursor index for a 1-based prompt row.
pub fn goto_index(row: i64) -> i64 {
    row.saturating_sub(1)
}

/// One line typed at the prompt.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, name = "command")]
pub struct ReplLine {
    #[command(subcommand)]
    pub command: ReplCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Show the current record
    Show,
    /// Move to the next record
    #[command(alias = "n")]
    Next,
    /// Move to the previous record
    #[command(alias = "p", alias = "previous")]
    Prev,
    /// Jump to a 1-based row of the view
    Goto {
        #[arg(allow_negative_numbers = true)]
        row: i64,
    },
    /// Jump to the first row with this contract code
    Find { code: String },
    /// Filter by membership (OR'd) and recency bucket
    Filter {
        #[arg(long)]
        qr: bool,
        #[arg(long)]
        cpc: bool,
        #[arg(long)]
        not_contacted: bool,
        /// all, green, yellow or red
        #[arg(long, default_value = "all")]
        color: ColorBucket,
    },
    /// Remove every filter
    Clear,
    /// Print the filtered view as a table
    List,
    /// Look up email addresses for the current record
    Emails,
    /// Print a field of the current record for copying
    #[command(alias = "copy-line")]
    Copy {
        #[arg(value_enum, default_value_t = CopyField::Line)]
        field: CopyField,
    },
    /// Export the whole view (default file name is timestamped)
    Export { path: Option<PathBuf> },
    /// Export only the given contract codes, in view order
    ExportSelection {
        path: PathBuf,
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Re-run the last load
    Reload,
    /// Choose other portfolios or another operator and load again
    Select(Selection),
    /// List the operators serving the given (or current) portfolios
    Operators {
        #[arg(long = "portfolio", value_name = "CODE")]
        portfolios: Vec<i64>,
    },
    /// Leave
    #[command(alias = "exit", alias = "q")]
    Quit,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyField {
    /// `;`-joined export line
    Line,
    Name,
    TaxId,
    Code,
}

impl ReplCommand {
    /// Parse a prompt line. Blank lines yield `Ok(None)`.
    pub fn parse_line(line: &str) -> Result<Option<Self>, clap::Error> {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return Ok(None);
        }
        ReplLine::try_parse_from(words).map(|l| Some(l.command))
    }
}

/// Build a filter spec from the `filter` flags.
pub fn filter_spec(qr: bool, cpc: bool, not_contacted: bool, color: ColorBucket) -> FilterSpec {
    let membership = [
        (qr, MembershipKind::Qr),
        (cpc, MembershipKind::Cpc),
        (not_contacted, MembershipKind::NotContacted),
    ]
    .into_iter()
    .filter(|(on, _)| *on)
    .map(|(_, kind)| kind)
    .collect();
    FilterSpec { membership, color }
}

pub fn recency_tag(recency: Option<RecencyBucket>) -> String {
    match recency {
        Some(RecencyBucket::Green) => "●".green().to_string(),
        Some(RecencyBucket::Yellow) => "●".yellow().to_string(),
        Some(RecencyBucket::Red) => "●".red().to_string(),
        None => " ".to_string(),
    }
}

/// List tab as a table. `current` marks the cursor row.
pub fn render_list(rows: &[ListRow], current: Option<usize>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "", "#", "Contract", "Holder", "Tax id", "Operator", "Last contact", "Agreement", "Amount",
        "Inst.",
    ]);
    for (i, row) in rows.iter().enumerate() {
        let marker = if Some(i) == current { ">" } else { "" };
        table.add_row(vec![
            format!("{}{}", marker, recency_tag(row.recency)),
            (i + 1).to_string(),
            row.contract_code.clone(),
            row.holder_name.clone(),
            row.tax_id.clone(),
            row.operator_name.clone(),
            row.last_contact.clone(),
            row.agreement_date.clone(),
            row.agreement_amount.clone(),
            row.agreement_installments.clone(),
        ]);
    }
    table
}

/// Labelled detail pane, with emails when they have been resolved.
pub fn render_detail(view: &DetailView, emails: Option<&[String]>) -> String {
    let mut out = String::new();
    let width = view
        .fields()
        .iter()
        .map(|(label, _)| label.len())
        .max()
        .unwrap_or(0);
    for (label, value) in view.fields() {
        out.push_str(&format!("{:>width$}: {}\n", label, value, width = width));
    }
    if let Some(emails) = emails {
        let joined = if emails.is_empty() {
            "(none)".to_string()
        } else {
            emails.join(", ")
        };
        out.push_str(&format!("{:>width$}: {}\n", "Emails", joined, width = width));
    }
    let tag = match view.recency {
        Some(bucket) => format!("{} {}", recency_tag(Some(bucket)), bucket.label()),
        None => "no recent contact".dimmed().to_string(),
    };
    out.push_str(&format!("{:>width$}: {}\n", "Recency", tag, width = width));
    out
}
