//! Flat export rows and the `;`-delimited export file.

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::FeedError;
use crate::helpers::{format_date_iso, format_tax_id, only_digits};
use crate::types::ContractRecord;

/// Header of the export file, in column order.
pub const EXPORT_HEADER: [&str; 6] = [
    "contractCode",
    "holderName",
    "taxIdDigitsOnly",
    "taxIdFormatted",
    "operatorName",
    "lastContactDate",
];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One exported contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub contract_code: String,
    pub holder_name: String,
    pub tax_id_digits_only: String,
    pub tax_id_formatted: String,
    pub operator_name: String,
    /// `yyyy-mm-dd`, blank when the record was never contacted.
    pub last_contact_date: String,
}

impl ExportRow {
    pub fn from_record(record: &ContractRecord) -> Self {
        Self {
            contract_code: record.contract_code.clone(),
            holder_name: record.holder_name.clone(),
            tax_id_digits_only: only_digits(&record.tax_id),
            tax_id_formatted: format_tax_id(&record.tax_id),
            operator_name: record.operator_name.clone(),
            last_contact_date: format_date_iso(record.last_contact_date),
        }
    }

    fn fields(&self) -> [&str; 6] {
        [
            &self.contract_code,
            &self.holder_name,
            &self.tax_id_digits_only,
            &self.tax_id_formatted,
            &self.operator_name,
            &self.last_contact_date,
        ]
    }
}

/// Shape records into export rows, preserving order.
pub fn export_rows<'a, I>(records: I) -> Vec<ExportRow>
where
    I: IntoIterator<Item = &'a ContractRecord>,
{
    records.into_iter().map(ExportRow::from_record).collect()
}

/// Export rows restricted to `codes`, in the order `records` yields them.
pub fn export_selection<'a, I>(records: I, codes: &HashSet<String>) -> Vec<ExportRow>
where
    I: IntoIterator<Item = &'a ContractRecord>,
{
    export_rows(
        records
            .into_iter()
            .filter(|r| codes.contains(&r.contract_code)),
    )
}

/// Single `;`-joined line for the clipboard. Semicolons inside free-text
/// fields become commas.
pub fn export_detail_line(record: &ContractRecord) -> String {
    let row = ExportRow::from_record(record);
    [
        row.contract_code,
        row.holder_name.replace(';', ","),
        row.tax_id_digits_only,
        row.tax_id_formatted,
        row.operator_name.replace(';', ","),
        row.last_contact_date,
    ]
    .join(";")
}

/// Write rows to `path` as UTF-8 with BOM, `;` separated, with a header row.
///
/// No partial-file guarantee: a failure mid-write can leave a truncated file.
pub fn write_export(path: &Path, rows: &[ExportRow]) -> Result<usize, FeedError> {
    let mut file = File::create(path)
        .map_err(|e| FeedError::Export(format!("{}: {}", path.display(), e)))?;
    file.write_all(UTF8_BOM)
        .map_err(|e| FeedError::Export(e.to_string()))?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(file);

    writer
        .write_record(EXPORT_HEADER)
        .map_err(|e| FeedError::Export(e.to_string()))?;
    for row in rows {
        writer
            .write_record(row.fields())
            .map_err(|e| FeedError::Export(e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| FeedError::Export(e.to_string()))?;

    log::info!("Exported {} rows to {}", rows.len(), path.display());
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MainRow;
    use chrono::NaiveDate;

    fn record(code: &str, name: &str, tax_id: &str, date: Option<NaiveDate>) -> ContractRecord {
        ContractRecord::from_main(&MainRow {
            id: code.to_string(),
            contract_code: code.to_string(),
            tax_id: tax_id.to_string(),
            holder_name: name.to_string(),
            operator_name: "Ana; Lima".to_string(),
            last_contact_date: date,
        })
    }

    #[test]
    fn test_export_row_shapes_fields() {
        let r = record("A1", "Maria", "123.456.789-01", NaiveDate::from_ymd_opt(2026, 9, 2));
        let row = ExportRow::from_record(&r);
        assert_eq!(row.tax_id_digits_only, "12345678901");
        assert_eq!(row.tax_id_formatted, "123.456.789-01");
        assert_eq!(row.last_contact_date, "2026-09-02");

        let r = record("A2", "Acme", "12345", None);
        let row = ExportRow::from_record(&r);
        assert_eq!(row.tax_id_formatted, "12345");
        assert_eq!(row.last_contact_date, "");
    }

    #[test]
    fn test_detail_line_replaces_semicolons() {
        let r = record("A1", "Maria; Souza", "12345678000199", NaiveDate::from_ymd_opt(2026, 1, 5));
        assert_eq!(
            export_detail_line(&r),
            "A1;Maria, Souza;12345678000199;12.345.678/0001-99;Ana, Lima;2026-01-05"
        );
    }

    #[test]
    fn test_selection_preserves_view_order() {
        let records = vec![
            record("C", "c", "", None),
            record("A", "a", "", None),
            record("B", "b", "", None),
        ];
        let codes: HashSet<String> = ["B", "C"].iter().map(|s| s.to_string()).collect();
        let rows = export_selection(&records, &codes);
        assert_eq!(
            rows.iter().map(|r| r.contract_code.as_str()).collect::<Vec<_>>(),
            vec!["C", "B"]
        );
    }

    #[test]
    fn test_write_export_bom_header_and_delimiter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        let rows = export_rows(&[record("A1", "Maria", "12345678901", None)]);

        let written = write_export(&path, &rows).expect("write");
        assert_eq!(written, 1);

        let bytes = std::fs::read(&path).expect("read");
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("contractCode;holderName;taxIdDigitsOnly;taxIdFormatted;operatorName;lastContactDate")
        );
        assert_eq!(
            lines.next(),
            Some("A1;Maria;12345678901;123.456.789-01;\"Ana; Lima\";")
        );
    }

    #[test]
    fn test_write_export_to_missing_dir_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("out.csv");
        let err = write_export(&path, &[]).unwrap_err();
        assert!(matches!(err, FeedError::Export(_)));
    }
}
