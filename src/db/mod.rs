//! SQLite-backed query service over the collections backend schema.
//!
//! The backend is read-only from our side. Tables used: `cadastros_tb`
//! (registrations), `usu_tb` (operators), `hist_tb` (contact history),
//! `stcob_tb` (outcome codes), `acordos_tb` (agreements), `neg_comp_tb`
//! (complementary profile flags) and `enderecos_tb` (addresses).
//!
//! Every query is parameterized; portfolio codes and the operator name are
//! bound, never interpolated.

use std::path::Path;

use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags, Row};

use crate::error::FeedError;
use crate::query::QueryService;
use crate::types::{AgreementRow, Config, ContactEventRow, MainRow, ProfileRow};

pub mod types;
pub use types::*;

/// Outcome-code tag for a confirmed contact.
const CPC_TAG: &str = "%CPC%";
/// Outcome-code tag for a contact attempt.
const ATTEMPT_TAG: &str = "%AL%";
/// History rows written by this user are automated and never count.
const SYSTEM_USER: i64 = 999;

const SQL_MAIN: &str = "
WITH acion AS (
    SELECT cad.cod_cad AS cod_cad1, MAX(his.data_at) AS ultima_data
    FROM hist_tb his
    JOIN cadastros_tb cad ON cad.cod_cad = his.cod_cli
    JOIN stcob_tb st ON st.st = his.ocorr
    WHERE cad.cod_cli IN ({portfolios})
      AND his.data_at >= date('now', 'localtime', 'start of month', '-2 months')
      AND his.data_at < date('now', 'localtime', 'start of month', '+1 month')
      AND NULLIF(TRIM(st.bsc), '') IS NOT NULL
      AND cad.stcli <> 'INA'
      AND his.cod_usu <> ?
    GROUP BY cad.cod_cad
)
SELECT cad.cod_cad, cad.nmcont, cad.cpfcnpj, cad.nomecli, usu.nomeusu, aci.ultima_data
FROM cadastros_tb cad
JOIN usu_tb usu ON usu.cod_usu = cad.cod_usu
LEFT JOIN acion aci ON aci.cod_cad1 = cad.cod_cad
WHERE cad.cod_cli IN ({portfolios})
  AND cad.stcli <> 'INA'
  {operator}
ORDER BY aci.ultima_data ASC, cad.nomecli ASC";

const SQL_AGREEMENTS: &str = "
SELECT a.nmcont, a.cod_aco, a.data_aco, a.vlr_aco, a.qtd_p_aco, a.staco
FROM acordos_tb a
WHERE a.cod_cli IN ({portfolios})
  AND a.data_cad >= ?";

const SQL_CONTACT_EVENTS: &str = "
SELECT cad.nmcont, MAX(his.data_at) AS dt_ultimo_cpc
FROM cadastros_tb cad
JOIN usu_tb usu ON usu.cod_usu = cad.cod_usu
JOIN hist_tb his ON his.cod_cli = cad.cod_cad
JOIN stcob_tb st ON st.st = his.ocorr
WHERE cad.cod_cli IN ({portfolios})
  AND cad.stcli <> 'INA'
  AND st.bsc LIKE ?
  {operator}
GROUP BY cad.nmcont";

const SQL_NOT_CONTACTED: &str = "
SELECT DISTINCT cad.nmcont
FROM cadastros_tb cad
JOIN usu_tb usu ON usu.cod_usu = cad.cod_usu
WHERE cad.cod_cli IN ({portfolios})
  AND cad.stcli <> 'INA'
  AND cad.cod_cad NOT IN (
    SELECT ht.cod_cli
    FROM hist_tb ht
    JOIN stcob_tb st ON st.st = ht.ocorr
    WHERE st.bsc LIKE ?
      AND ht.cod_cli IS NOT NULL
      AND ht.cod_usu <> ?
      AND ht.data_at >= date('now', 'localtime', 'start of month', '-3 months')
      AND ht.data_at < date('now', 'localtime', 'start of month', '+1 month')
  )
  {operator}";

const SQL_PROFILES: &str = "
SELECT cad.nmcont, cad.infoad, cad.infoad10,
       neg.int_3, neg.int_4, neg.int_7, neg.int_9, neg.int_8,
       cad.cod_cad
FROM cadastros_tb cad
LEFT JOIN usu_tb usu ON usu.cod_usu = cad.cod_usu
LEFT JOIN neg_comp_tb neg ON neg.nmcont = cad.nmcont
WHERE cad.cod_cli IN ({portfolios})
  AND cad.stcli <> 'INA'
  {operator}";

const SQL_EMAILS: &str = "
SELECT NULLIF(TRIM(cad.email), '')
FROM cadastros_tb cad
WHERE cad.cod_cad = ?
  AND cad.stcli <> 'INA'
  AND cad.cod_cli IN ({portfolios})
UNION ALL
SELECT * FROM (
    SELECT NULLIF(TRIM(en.endereco), '')
    FROM cadastros_tb cad
    JOIN enderecos_tb en ON en.cpfcnpj = cad.cpfcnpj
    WHERE cad.cod_cad = ?
      AND cad.stcli <> 'INA'
      AND cad.cod_cli IN ({portfolios})
      AND en.tipo_domicilio = 'M'
    LIMIT 1
)";

const SQL_OPERATORS: &str = "
SELECT DISTINCT TRIM(usu.nomeusu)
FROM cadastros_tb cad
JOIN usu_tb usu ON usu.cod_usu = cad.cod_usu
WHERE cad.cod_cli IN ({portfolios})
  AND cad.stcli <> 'INA'
ORDER BY 1";

/// Fill the `{portfolios}` and `{operator}` slots of a query template.
fn render(template: &str, portfolio_count: usize, with_operator: bool) -> String {
    let placeholders = vec!["?"; portfolio_count].join(", ");
    let operator = if with_operator {
        "AND TRIM(usu.nomeusu) = ?"
    } else {
        ""
    };
    template
        .replace("{portfolios}", &placeholders)
        .replace("{operator}", operator)
}

fn portfolio_values(portfolios: &[i64]) -> impl Iterator<Item = Value> + '_ {
    portfolios.iter().map(|&p| Value::Integer(p))
}

fn cell(row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    row.get::<_, Value>(idx)
}

fn text_cell(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(value_to_string(cell(row, idx)?).unwrap_or_default())
}

pub struct SqliteQueryService {
    conn: Mutex<Connection>,
    agreement_cutoff: NaiveDate,
    /// Portfolios an email lookup may touch.
    email_portfolios: Vec<i64>,
}

impl SqliteQueryService {
    /// Open the backend named by the config in read-only mode.
    pub fn open(config: &Config) -> Result<Self, DbError> {
        let conn = Self::open_readonly_at(Path::new(&config.database_path))?;
        Ok(Self::from_connection(
            conn,
            config.agreement_cutoff,
            config.portfolio_codes(),
        ))
    }

    /// Open a database at an explicit path in read-only mode.
    pub fn open_readonly_at(path: &Path) -> Result<Connection, DbError> {
        if !path.exists() {
            return Err(DbError::NotFound(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    pub fn from_connection(conn: Connection, agreement_cutoff: NaiveDate, email_portfolios: Vec<i64>) -> Self {
        Self {
            conn: Mutex::new(conn),
            agreement_cutoff,
            email_portfolios,
        }
    }

    fn query_rows<T, F>(&self, sql: &str, params: Vec<Value>, map: F) -> Result<Vec<T>, DbError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(params), map)?;
        let collected = rows.collect::<Result<Vec<T>, _>>()?;
        Ok(collected)
    }

    /// Bind values for a template using `{portfolios}` then the operator.
    fn scoped_params(portfolios: &[i64], operator: Option<&str>) -> Vec<Value> {
        portfolio_values(portfolios)
            .chain(operator.map(|o| Value::Text(o.trim().to_string())))
            .collect()
    }
}

impl QueryService for SqliteQueryService {
    fn fetch_main(&self, portfolios: &[i64], operator: Option<&str>) -> Result<Vec<MainRow>, FeedError> {
        if portfolios.is_empty() {
            return Ok(Vec::new());
        }
        let sql = render(SQL_MAIN, portfolios.len(), operator.is_some());
        let params: Vec<Value> = portfolio_values(portfolios)
            .chain(std::iter::once(Value::Integer(SYSTEM_USER)))
            .chain(Self::scoped_params(portfolios, operator))
            .collect();

        let rows = self.query_rows(&sql, params, |row| {
            Ok(MainRow {
                id: text_cell(row, 0)?,
                contract_code: text_cell(row, 1)?,
                tax_id: text_cell(row, 2)?,
                holder_name: text_cell(row, 3)?,
                operator_name: text_cell(row, 4)?.trim().to_string(),
                last_contact_date: value_to_date(cell(row, 5)?),
            })
        })?;
        log::debug!("SqliteQueryService: main query returned {} rows", rows.len());
        Ok(rows)
    }

    fn fetch_agreements(&self, portfolios: &[i64]) -> Result<Vec<AgreementRow>, FeedError> {
        if portfolios.is_empty() {
            return Ok(Vec::new());
        }
        let sql = render(SQL_AGREEMENTS, portfolios.len(), false);
        let params: Vec<Value> = portfolio_values(portfolios)
            .chain(std::iter::once(Value::Text(
                self.agreement_cutoff.format("%Y-%m-%d").to_string(),
            )))
            .collect();

        let rows = self.query_rows(&sql, params, |row| {
            Ok(AgreementRow {
                contract_code: text_cell(row, 0)?,
                agreement_id: value_to_i64(cell(row, 1)?).unwrap_or_default(),
                agreement_date: value_to_date(cell(row, 2)?),
                amount: value_to_f64(cell(row, 3)?),
                installment_count: value_to_i64(cell(row, 4)?),
                status: text_cell(row, 5)?,
            })
        })?;
        Ok(rows)
    }

    fn fetch_contact_events(
        &self,
        portfolios: &[i64],
        operator: Option<&str>,
    ) -> Result<Vec<ContactEventRow>, FeedError> {
        if portfolios.is_empty() {
            return Ok(Vec::new());
        }
        let sql = render(SQL_CONTACT_EVENTS, portfolios.len(), operator.is_some());
        let params: Vec<Value> = portfolio_values(portfolios)
            .chain(std::iter::once(Value::Text(CPC_TAG.to_string())))
            .chain(operator.map(|o| Value::Text(o.trim().to_string())))
            .collect();

        let rows = self.query_rows(&sql, params, |row| {
            Ok(ContactEventRow {
                contract_code: text_cell(row, 0)?,
                last_cpc_date: value_to_date(cell(row, 1)?),
            })
        })?;
        Ok(rows)
    }

    fn fetch_not_contacted(&self, portfolios: &[i64], operator: Option<&str>) -> Result<Vec<String>, FeedError> {
        if portfolios.is_empty() {
            return Ok(Vec::new());
        }
        let sql = render(SQL_NOT_CONTACTED, portfolios.len(), operator.is_some());
        let params: Vec<Value> = portfolio_values(portfolios)
            .chain([
                Value::Text(ATTEMPT_TAG.to_string()),
                Value::Integer(SYSTEM_USER),
            ])
            .chain(operator.map(|o| Value::Text(o.trim().to_string())))
            .collect();

        let rows = self.query_rows(&sql, params, |row| text_cell(row, 0))?;
        Ok(rows)
    }

    fn fetch_profiles(&self, portfolios: &[i64], operator: Option<&str>) -> Result<Vec<ProfileRow>, FeedError> {
        if portfolios.is_empty() {
            return Ok(Vec::new());
        }
        let sql = render(SQL_PROFILES, portfolios.len(), operator.is_some());
        let params = Self::scoped_params(portfolios, operator);

        let rows = self.query_rows(&sql, params, |row| {
            Ok(ProfileRow {
                contract_code: text_cell(row, 0)?,
                additional_info: value_to_string(cell(row, 1)?),
                credit_commitment: value_to_string(cell(row, 2)?),
                retired: value_to_string(cell(row, 3)?),
                welfare_beneficiary: value_to_string(cell(row, 4)?),
                vehicle_owner: value_to_string(cell(row, 5)?),
                employed_with_formal_ties: value_to_string(cell(row, 6)?),
                deceased: value_to_string(cell(row, 7)?),
                registration_key: value_to_i64(cell(row, 8)?).unwrap_or_default(),
            })
        })?;
        Ok(rows)
    }

    fn fetch_emails(&self, id: &str) -> Result<Vec<Option<String>>, FeedError> {
        if self.email_portfolios.is_empty() {
            return Ok(Vec::new());
        }
        let sql = render(SQL_EMAILS, self.email_portfolios.len(), false);
        let id = Value::Text(id.trim().to_string());
        let params: Vec<Value> = std::iter::once(id.clone())
            .chain(portfolio_values(&self.email_portfolios))
            .chain(std::iter::once(id))
            .chain(portfolio_values(&self.email_portfolios))
            .collect();

        let rows = self.query_rows(&sql, params, |row| Ok(value_to_string(cell(row, 0)?)))?;
        Ok(rows)
    }

    fn fetch_operators(&self, portfolios: &[i64]) -> Result<Vec<String>, FeedError> {
        if portfolios.is_empty() {
            return Ok(Vec::new());
        }
        let sql = render(SQL_OPERATORS, portfolios.len(), false);
        let params: Vec<Value> = portfolio_values(portfolios).collect();
        let rows = self.query_rows(&sql, params, |row| text_cell(row, 0))?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Local};

    const SCHEMA: &str = "
        CREATE TABLE usu_tb (cod_usu INTEGER PRIMARY KEY, nomeusu TEXT);
        CREATE TABLE cadastros_tb (
            cod_cad INTEGER PRIMARY KEY, cod_cli INTEGER, nmcont TEXT, cpfcnpj TEXT,
            nomecli TEXT, cod_usu INTEGER, stcli TEXT, infoad TEXT, infoad10 REAL, email TEXT
        );
        CREATE TABLE stcob_tb (st TEXT PRIMARY KEY, bsc TEXT);
        CREATE TABLE hist_tb (cod_cli INTEGER, data_at TEXT, ocorr TEXT, cod_usu INTEGER);
        CREATE TABLE acordos_tb (
            cod_aco INTEGER PRIMARY KEY, cod_cli INTEGER, nmcont TEXT, data_aco TEXT,
            data_cad TEXT, vlr_aco REAL, qtd_p_aco INTEGER, staco TEXT
        );
        CREATE TABLE neg_comp_tb (nmcont TEXT, int_3 INTEGER, int_4 INTEGER, int_7 TEXT, int_8 TEXT, int_9 INTEGER);
        CREATE TABLE enderecos_tb (cpfcnpj TEXT, endereco TEXT, tipo_domicilio TEXT);

        INSERT INTO usu_tb VALUES (1, ' Ana '), (2, 'Bruno'), (999, 'SISTEMA');
        INSERT INTO stcob_tb VALUES ('01', 'CPC'), ('02', 'AL'), ('03', '  '), ('04', 'PROMESSA');

        INSERT INTO cadastros_tb VALUES
            (10, 517, 'C-10', '12345678901', 'Carla', 1, 'ATV', ' vip ', 0.35, ' Carla@Mail.COM. '),
            (11, 517, 'C-11', '12345678000199', 'Beto', 2, 'ATV', NULL, 40, NULL),
            (12, 518, 'C-12', '98765432100', 'Alice', 1, 'ATV', NULL, NULL, ''),
            (13, 517, 'C-13', '11122233344', 'Dora', 1, 'INA', NULL, NULL, NULL),
            (14, 519, 'C-14', '55566677788', 'Eva', 2, 'ATV', NULL, NULL, NULL);

        INSERT INTO neg_comp_tb VALUES ('C-10', 1, 0, 'S', 'NAO', NULL);

        INSERT INTO enderecos_tb VALUES
            ('12345678901', 'carla@work.c', 'M'),
            ('12345678901', 'ignored@home.com', 'R');
    ";

    fn day(offset: i64) -> String {
        (Local::now().date_naive() - Duration::days(offset))
            .format("%Y-%m-%d 10:00:00")
            .to_string()
    }

    fn service() -> SqliteQueryService {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(SCHEMA).expect("schema");
        let history = [
            (10, day(3), "01", 1),
            (10, day(5), "02", 1),
            (11, day(1), "04", 2),
            (11, day(0), "01", 999),
            (12, day(2), "03", 1),
        ];
        for (cod, date, ocorr, usu) in history {
            conn.execute(
                "INSERT INTO hist_tb VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![cod, date, ocorr, usu],
            )
            .expect("history");
        }
        conn.execute_batch(
            "INSERT INTO acordos_tb VALUES
                (1, 517, 'C-10', '2025-08-01', '2025-08-01', 100.0, 2, 'A'),
                (2, 517, 'C-10', '2025-09-10', '2025-09-10', 1500.5, 10, 'Q'),
                (3, 517, 'C-11', '2025-01-10', '2025-01-10', 50.0, 1, 'Q'),
                (4, 518, 'C-12', '2025-10-01', '2025-10-01', 75.0, 3, 'E');",
        )
        .expect("agreements");
        SqliteQueryService::from_connection(
            conn,
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            vec![517, 518, 519],
        )
    }

    #[test]
    fn test_render_placeholders() {
        let sql = render("IN ({portfolios}) {operator}", 3, true);
        assert_eq!(sql, "IN (?, ?, ?) AND TRIM(usu.nomeusu) = ?");
        assert_eq!(render("IN ({portfolios}) {operator}", 1, false), "IN (?) ");
    }

    #[test]
    fn test_fetch_main_excludes_inactive_and_orders_by_contact() {
        let svc = service();
        let rows = svc.fetch_main(&[517, 518], None).expect("main");
        let codes: Vec<&str> = rows.iter().map(|r| r.contract_code.as_str()).collect();
        // C-12 only has a blank outcome code, so it sorts first with no date.
        assert_eq!(codes, vec!["C-12", "C-10", "C-11"]);
        assert_eq!(rows[0].last_contact_date, None);
        assert_eq!(rows[1].id, "10");
        assert_eq!(rows[1].operator_name, "Ana");
        assert_eq!(
            rows[1].last_contact_date,
            Some(Local::now().date_naive() - Duration::days(3))
        );
        // the system user's CPC on C-11 does not count
        assert_eq!(
            rows[2].last_contact_date,
            Some(Local::now().date_naive() - Duration::days(1))
        );
    }

    #[test]
    fn test_fetch_main_operator_filter() {
        let svc = service();
        let rows = svc.fetch_main(&[517, 518, 519], Some("Bruno")).expect("main");
        let codes: Vec<&str> = rows.iter().map(|r| r.contract_code.as_str()).collect();
        assert_eq!(codes, vec!["C-14", "C-11"]);

        let rows = svc.fetch_main(&[517], Some("Ana")).expect("main");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].contract_code, "C-10");
    }

    #[test]
    fn test_fetch_agreements_respects_cutoff() {
        let svc = service();
        let rows = svc.fetch_agreements(&[517]).expect("agreements");
        let mut ids: Vec<i64> = rows.iter().map(|r| r.agreement_id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        let top = rows.iter().find(|r| r.agreement_id == 2).unwrap();
        assert_eq!(top.amount, Some(1500.5));
        assert_eq!(top.installment_count, Some(10));
        assert_eq!(top.agreement_date, NaiveDate::from_ymd_opt(2025, 9, 10));
    }

    #[test]
    fn test_fetch_contact_events_and_not_contacted() {
        let svc = service();
        let cpc = svc.fetch_contact_events(&[517, 518], None).expect("cpc");
        let codes: Vec<&str> = cpc.iter().map(|r| r.contract_code.as_str()).collect();
        assert!(codes.contains(&"C-10"));
        assert!(codes.contains(&"C-11"));

        let mut not_contacted = svc.fetch_not_contacted(&[517, 518, 519], None).expect("nao");
        not_contacted.sort();
        assert_eq!(not_contacted, vec!["C-11", "C-12", "C-14"]);
    }

    #[test]
    fn test_fetch_profiles() {
        let svc = service();
        let rows = svc.fetch_profiles(&[517], None).expect("profiles");
        let carla = rows.iter().find(|r| r.contract_code == "C-10").unwrap();
        assert_eq!(carla.additional_info.as_deref(), Some(" vip "));
        assert_eq!(carla.credit_commitment.as_deref(), Some("0.35"));
        assert_eq!(carla.retired.as_deref(), Some("1"));
        assert_eq!(carla.vehicle_owner.as_deref(), Some("S"));
        assert_eq!(carla.employed_with_formal_ties, None);
        assert_eq!(carla.registration_key, 10);
        let beto = rows.iter().find(|r| r.contract_code == "C-11").unwrap();
        assert_eq!(beto.credit_commitment.as_deref(), Some("40"));
    }

    #[test]
    fn test_fetch_emails_primary_and_mailing() {
        let svc = service();
        let emails = svc.fetch_emails("10").expect("emails");
        assert_eq!(
            emails,
            vec![
                Some("Carla@Mail.COM.".to_string()),
                Some("carla@work.c".to_string())
            ]
        );
        assert_eq!(svc.fetch_emails("12").expect("emails"), vec![None]);
        assert!(svc.fetch_emails("13").expect("emails").is_empty());
    }

    #[test]
    fn test_fetch_operators() {
        let svc = service();
        assert_eq!(
            svc.fetch_operators(&[517, 518, 519]).expect("operators"),
            vec!["Ana".to_string(), "Bruno".to_string()]
        );
        assert!(svc.fetch_operators(&[]).expect("operators").is_empty());
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.db");
        let err = SqliteQueryService::open_readonly_at(&missing).unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }
}
