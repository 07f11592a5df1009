//! Загрузка CSV с целевыми и объясняющими кейсами рейсов.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use itertools::Itertools;
use tracing::{debug, warn};

use crate::constants::{
    BUCKET_COLUMNS, BUCKET_COUNT, CASE_TYPE_EXPL, CASE_TYPE_TARGET, COLUMN_CASE_TYPE,
    COLUMN_FLIGHT_DATE, COLUMN_ID, COLUMN_PREDICTION_DATE, COLUMN_TARGET_DATE,
};

const DATE_TIME_FORMAT_SPACE: &str = "%Y-%m-%d %H:%M:%S";
const DATE_TIME_FORMAT_T: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_TIME_FORMAT_MINUTES: &str = "%Y-%m-%d %H:%M";
const DATE_FORMAT_ISO: &str = "%Y-%m-%d";
// Даты через слэш читаются в порядке месяц/день/год.
const DATE_TIME_FORMAT_MONTH_FIRST: &str = "%m/%d/%Y %H:%M";
const DATE_FORMAT_MONTH_FIRST: &str = "%m/%d/%Y";

const ERROR_UNRECOGNIZED_DATE: &str = "unrecognized date format";

/// Значения пассажиропотока по всем бакетам.
pub type BucketProfile = [f64; BUCKET_COUNT];

/// Сырые ячейки бакетов; пустая ячейка в CSV даёт `None`.
pub type BucketCells = [Option<f64>; BUCKET_COUNT];

/// Идентификатор кейса. Числовые id сортируются как числа и идут раньше строковых.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CaseId {
    raw: String,
    numeric: Option<i64>,
}

impl CaseId {
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let numeric = raw.parse::<i64>().ok();
        Self { raw, numeric }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for CaseId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric, other.numeric) {
            (Some(left), Some(right)) => left.cmp(&right).then_with(|| self.raw.cmp(&other.raw)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.raw.cmp(&other.raw),
        }
    }
}

impl PartialOrd for CaseId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseType {
    Target,
    Expl,
}

impl CaseType {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            CASE_TYPE_TARGET => Some(Self::Target),
            CASE_TYPE_EXPL => Some(Self::Expl),
            _ => None,
        }
    }
}

/// Одна строка входного CSV.
#[derive(Clone, Debug)]
pub struct Case {
    pub id: CaseId,
    pub case_type: CaseType,
    pub prediction_date: Option<NaiveDateTime>,
    pub target_date: Option<NaiveDateTime>,
    pub flight_date: Option<NaiveDateTime>,
    pub buckets: BucketCells,
}

impl Case {
    /// Полный профиль, если заполнены все бакеты.
    pub fn complete_profile(&self) -> Option<BucketProfile> {
        let mut profile = [0.0; BUCKET_COUNT];
        for (slot, cell) in profile.iter_mut().zip(self.buckets) {
            *slot = cell?;
        }
        Some(profile)
    }
}

/// Кейсы, разложенные по id: один целевой и произвольное число объясняющих.
#[derive(Debug, Default)]
pub struct CaseTable {
    pub targets: BTreeMap<CaseId, Case>,
    pub explanatory: BTreeMap<CaseId, Vec<Case>>,
    pub skipped_rows: usize,
}

impl CaseTable {
    fn ingest(&mut self, case: Case) -> Result<(), Box<dyn Error>> {
        match case.case_type {
            CaseType::Target => {
                if self.targets.contains_key(&case.id) {
                    return Err(format!("duplicate target case for id {}", case.id).into());
                }
                self.targets.insert(case.id.clone(), case);
            }
            CaseType::Expl => {
                self.explanatory
                    .entry(case.id.clone())
                    .or_default()
                    .push(case);
            }
        }
        Ok(())
    }

    pub fn explanatory_len(&self) -> usize {
        self.explanatory.values().map(Vec::len).sum()
    }

    /// Диапазон дат целевых рейсов (для отчёта).
    pub fn target_date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        self.targets
            .values()
            .filter_map(|case| case.target_date)
            .minmax()
            .into_option()
    }
}

#[derive(Clone, Copy, Debug)]
enum DateFormatHint {
    DateTimeSpace,
    DateTimeT,
    DateTimeMinutes,
    Date,
    MonthFirstMinutes,
    MonthFirst,
}

impl DateFormatHint {
    const ALL: [Self; 6] = [
        Self::DateTimeSpace,
        Self::DateTimeT,
        Self::DateTimeMinutes,
        Self::Date,
        Self::MonthFirstMinutes,
        Self::MonthFirst,
    ];

    fn parse(self, raw: &str) -> Option<NaiveDateTime> {
        match self {
            Self::DateTimeSpace => NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT_SPACE).ok(),
            Self::DateTimeT => NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT_T).ok(),
            Self::DateTimeMinutes => {
                NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT_MINUTES).ok()
            }
            Self::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT_ISO)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0)),
            Self::MonthFirstMinutes => {
                NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT_MONTH_FIRST).ok()
            }
            Self::MonthFirst => NaiveDate::parse_from_str(raw, DATE_FORMAT_MONTH_FIRST)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0)),
        }
    }
}

/// Парсит дату, запоминая сработавший формат; пустая строка означает отсутствие даты.
fn parse_date_with_hint(
    raw: &str,
    hint: &mut Option<DateFormatHint>,
) -> Result<Option<NaiveDateTime>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if let Some(known) = *hint
        && let Some(parsed) = known.parse(trimmed)
    {
        return Ok(Some(parsed));
    }

    for candidate in DateFormatHint::ALL {
        if let Some(parsed) = candidate.parse(trimmed) {
            *hint = Some(candidate);
            return Ok(Some(parsed));
        }
    }

    Err(ERROR_UNRECOGNIZED_DATE.into())
}

/// Позиции нужных колонок в заголовке CSV.
struct ColumnIndex {
    id: usize,
    case_type: usize,
    prediction_date: usize,
    target_date: usize,
    flight_date: usize,
    buckets: [usize; BUCKET_COUNT],
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Result<Self, Box<dyn Error>> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|header| header.trim() == name)
                .ok_or_else(|| format!("missing column '{name}'"))
        };
        let mut buckets = [0; BUCKET_COUNT];
        for (slot, name) in buckets.iter_mut().zip(BUCKET_COLUMNS) {
            *slot = find(name)?;
        }
        Ok(Self {
            id: find(COLUMN_ID)?,
            case_type: find(COLUMN_CASE_TYPE)?,
            prediction_date: find(COLUMN_PREDICTION_DATE)?,
            target_date: find(COLUMN_TARGET_DATE)?,
            flight_date: find(COLUMN_FLIGHT_DATE)?,
            buckets,
        })
    }
}

/// Состояние разбора строк: подсказки форматов дат для каждой колонки.
#[derive(Default)]
struct RowParser {
    prediction_hint: Option<DateFormatHint>,
    target_hint: Option<DateFormatHint>,
    flight_hint: Option<DateFormatHint>,
}

impl RowParser {
    fn parse(
        &mut self,
        record: &StringRecord,
        columns: &ColumnIndex,
        line: u64,
    ) -> Result<Option<Case>, Box<dyn Error>> {
        let field = |idx: usize| record.get(idx).unwrap_or_default();

        let raw_type = field(columns.case_type);
        let Some(case_type) = CaseType::parse(raw_type) else {
            warn!(line, case_type = raw_type, "Skipping row with unknown case type");
            return Ok(None);
        };
        let id = CaseId::new(field(columns.id));
        if id.as_str().is_empty() {
            return Err(format!("empty id at line {line}").into());
        }

        let date = |raw: &str, hint: &mut Option<DateFormatHint>, column: &str| {
            parse_date_with_hint(raw, hint).map_err(|err| {
                format!("failed to parse {column} '{raw}' for id {id} at line {line}: {err}")
            })
        };
        let prediction_date = date(
            field(columns.prediction_date),
            &mut self.prediction_hint,
            COLUMN_PREDICTION_DATE,
        )?;
        let target_date = date(
            field(columns.target_date),
            &mut self.target_hint,
            COLUMN_TARGET_DATE,
        )?;
        let flight_date = date(
            field(columns.flight_date),
            &mut self.flight_hint,
            COLUMN_FLIGHT_DATE,
        )?;

        let mut buckets = [None; BUCKET_COUNT];
        for ((cell, &idx), column) in buckets.iter_mut().zip(&columns.buckets).zip(BUCKET_COLUMNS) {
            let raw = field(idx).trim();
            if raw.is_empty() {
                continue;
            }
            let value = raw.parse::<f64>().map_err(|err| {
                format!("failed to parse {column} '{raw}' for id {id} at line {line}: {err}")
            })?;
            *cell = Some(value);
        }

        Ok(Some(Case {
            id,
            case_type,
            prediction_date,
            target_date,
            flight_date,
            buckets,
        }))
    }
}

/// Читает кейсы из произвольного источника CSV.
pub fn read_cases<R: Read>(source: R) -> Result<CaseTable, Box<dyn Error>> {
    let mut reader = csv::Reader::from_reader(source);
    let columns = ColumnIndex::from_headers(reader.headers()?)?;
    let mut parser = RowParser::default();

    let table = reader
        .records()
        .try_fold(CaseTable::default(), |mut acc, record| {
            let record = record?;
            let line = record.position().map_or(0, csv::Position::line);
            match parser.parse(&record, &columns, line)? {
                Some(case) => acc.ingest(case)?,
                None => acc.skipped_rows += 1,
            }
            Ok::<_, Box<dyn Error>>(acc)
        })?;

    debug!(
        targets = table.targets.len(),
        explanatory = table.explanatory_len(),
        skipped = table.skipped_rows,
        "Parsed cases"
    );
    Ok(table)
}

/// Загружает кейсы из CSV-файла.
pub fn load_cases(csv_path: &Path) -> Result<CaseTable, Box<dyn Error>> {
    let file = std::fs::File::open(csv_path)
        .map_err(|err| format!("Failed to open CSV {}: {err}", csv_path.display()))?;
    let table = read_cases(std::io::BufReader::new(file))
        .map_err(|err| format!("Failed to read cases from {}: {err}", csv_path.display()))?;
    Ok(table)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Собирает CSV с полным набором колонок; `rows` — (id, тип, дата рейса, значения бакетов).
    pub(crate) fn build_csv(rows: &[(&str, &str, &str, &str)]) -> String {
        let mut out = format!(
            "{COLUMN_ID},{COLUMN_CASE_TYPE},{COLUMN_PREDICTION_DATE},{COLUMN_TARGET_DATE},{COLUMN_FLIGHT_DATE},{}\n",
            BUCKET_COLUMNS.join(",")
        );
        for (id, case_type, flight_date, values) in rows {
            out.push_str(&format!(
                "{id},{case_type},2019-06-01,2019-06-08,{flight_date},{values}\n"
            ));
        }
        out
    }

    pub(crate) fn uniform_values(value: f64) -> String {
        vec![value.to_string(); BUCKET_COUNT].join(",")
    }

    #[test]
    fn reads_targets_and_explanatory_cases() {
        let (three, two, four, one) = (
            uniform_values(3.0),
            uniform_values(2.0),
            uniform_values(4.0),
            uniform_values(1.0),
        );
        let csv = build_csv(&[
            ("1", "Target", "2019-06-08", three.as_str()),
            ("1", "Expl", "2019-06-01", two.as_str()),
            ("1", "Expl", "2019-05-25", four.as_str()),
            ("2", "Target", "2019-06-08", one.as_str()),
        ]);
        let table = read_cases(csv.as_bytes()).unwrap();

        assert_eq!(table.targets.len(), 2);
        assert_eq!(table.explanatory_len(), 2);
        let target = &table.targets[&CaseId::new("1")];
        assert_eq!(target.complete_profile(), Some([3.0; BUCKET_COUNT]));
        assert_eq!(
            target.flight_date,
            NaiveDate::from_ymd_opt(2019, 6, 8).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
    }

    #[test]
    fn empty_bucket_cells_are_missing() {
        let empty = vec![""; BUCKET_COUNT].join(",");
        let csv = build_csv(&[("7", "Target", "2019-06-08", empty.as_str())]);
        let table = read_cases(csv.as_bytes()).unwrap();
        let target = &table.targets[&CaseId::new("7")];
        assert!(target.buckets.iter().all(Option::is_none));
        assert!(target.complete_profile().is_none());
    }

    #[test]
    fn missing_column_is_reported() {
        let csv = "id,cat_case_type,dt_flight_date\n1,Target,2019-06-08\n";
        let err = read_cases(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("missing column"));
    }

    #[test]
    fn duplicate_target_is_rejected() {
        let ones = uniform_values(1.0);
        let csv = build_csv(&[
            ("1", "Target", "2019-06-08", ones.as_str()),
            ("1", "Target", "2019-06-08", ones.as_str()),
        ]);
        let err = read_cases(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("duplicate target"));
    }

    #[test]
    fn unknown_case_type_is_skipped() {
        let ones = uniform_values(1.0);
        let csv = build_csv(&[
            ("1", "Target", "2019-06-08", ones.as_str()),
            ("1", "Other", "2019-06-01", ones.as_str()),
        ]);
        let table = read_cases(csv.as_bytes()).unwrap();
        assert_eq!(table.skipped_rows, 1);
        assert_eq!(table.explanatory_len(), 0);
    }

    #[test]
    fn bad_number_names_column_and_id() {
        let mut values = vec!["1"; BUCKET_COUNT];
        values[3] = "abc";
        let values = values.join(",");
        let csv = build_csv(&[("42", "Expl", "2019-06-01", values.as_str())]);
        let err = read_cases(csv.as_bytes()).unwrap_err().to_string();
        assert!(err.contains(BUCKET_COLUMNS[3]));
        assert!(err.contains("id 42"));
    }

    #[test]
    fn parses_supported_date_formats() {
        let mut hint = None;
        let expected = NaiveDate::from_ymd_opt(2019, 3, 4)
            .and_then(|d| d.and_hms_opt(10, 30, 0))
            .unwrap();
        for raw in [
            "2019-03-04 10:30:00",
            "2019-03-04T10:30:00",
            "2019-03-04 10:30",
            "03/04/2019 10:30",
        ] {
            assert_eq!(parse_date_with_hint(raw, &mut hint), Ok(Some(expected)));
        }
        assert_eq!(parse_date_with_hint("  ", &mut hint), Ok(None));
        assert!(parse_date_with_hint("yesterday", &mut hint).is_err());
    }

    #[test]
    fn slash_dates_are_month_first() {
        let mut hint = None;
        let april_third = NaiveDate::from_ymd_opt(2019, 4, 3)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        assert_eq!(
            parse_date_with_hint("04/03/2019", &mut hint),
            Ok(Some(april_third))
        );
        assert!(parse_date_with_hint("25/03/2019", &mut hint).is_err());
    }

    #[test]
    fn slash_flight_dates_drive_recency() {
        let values = uniform_values(1.0);
        let csv = build_csv(&[
            ("7", "Expl", "04/03/2019", values.as_str()),
            ("7", "Expl", "03/04/2019", values.as_str()),
        ]);
        let table = read_cases(csv.as_bytes()).unwrap();
        let flights: Vec<_> = table.explanatory[&CaseId::new("7")]
            .iter()
            .filter_map(|case| case.flight_date)
            .map(|date| date.date())
            .collect();
        assert_eq!(
            flights,
            [
                NaiveDate::from_ymd_opt(2019, 4, 3).unwrap(),
                NaiveDate::from_ymd_opt(2019, 3, 4).unwrap(),
            ]
        );
    }

    #[test]
    fn numeric_ids_sort_numerically() {
        let mut ids = vec![
            CaseId::new("10"),
            CaseId::new("b"),
            CaseId::new("2"),
            CaseId::new("a"),
        ];
        ids.sort();
        let sorted: Vec<_> = ids.iter().map(CaseId::as_str).collect();
        assert_eq!(sorted, ["2", "10", "a", "b"]);
    }
}
