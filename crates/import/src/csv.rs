use chrono::NaiveDate;
use ledgerfold_core::{Field, Money, Origin, Record, TextField, DATE_FORMAT};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::config::OrderedMap;

/// How one provider's export files are laid out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSchema {
    #[serde(alias = "sep", default = "default_separator")]
    pub separator: String,
    /// Raw columns that hold dates. Every one present in a file must parse.
    #[serde(alias = "date_cols", default)]
    pub date_columns: Vec<String>,
    /// Raw column name → canonical field. Columns not listed here are dropped.
    #[serde(alias = "cols")]
    pub column_mapping: OrderedMap<Field>,
    #[serde(default = "default_day_first")]
    pub day_first: bool,
    #[serde(default)]
    pub date_format: Option<String>,
}

fn default_separator() -> String {
    ",".to_string()
}

fn default_day_first() -> bool {
    true
}

impl Default for ProviderSchema {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            date_columns: Vec::new(),
            column_mapping: OrderedMap::new(),
            day_first: default_day_first(),
            date_format: None,
        }
    }
}

impl ProviderSchema {
    fn delimiter(&self) -> u8 {
        self.separator.as_bytes().first().copied().unwrap_or(b',')
    }

    fn is_date_column(&self, raw: &str) -> bool {
        self.date_columns.iter().any(|c| c.trim() == raw)
    }
}

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("{path}: IO error: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: CSV error: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("{path}: missing required column for '{field}'")]
    MissingColumn { path: String, field: Field },
    #[error("{path}: line {line}: invalid date {value:?} in column '{column}'")]
    InvalidDate {
        path: String,
        line: u64,
        column: String,
        value: String,
    },
    #[error("{path}: line {line}: invalid amount {value:?} in column '{column}'")]
    InvalidAmount {
        path: String,
        line: u64,
        column: String,
        value: String,
    },
}

/// Header positions resolved once per file.
struct ColumnPlan {
    date: (usize, String),
    amount: Option<(usize, String)>,
    text: Vec<(usize, String, TextField, bool)>,
}

impl ColumnPlan {
    fn build(headers: &[String], schema: &ProviderSchema, path: &str) -> Result<Self, CsvError> {
        let position = |raw: &str| headers.iter().position(|h| h == raw.trim());

        let mut date = None;
        let mut amount = None;
        let mut text = Vec::new();

        for (raw, field) in schema.column_mapping.iter() {
            let Some(idx) = position(raw) else {
                tracing::debug!(path, column = raw, %field, "Column absent, defaulting to empty");
                continue;
            };
            let raw = raw.trim().to_string();
            match field {
                Field::Date => date = Some((idx, raw)),
                Field::Amount => amount = Some((idx, raw)),
                Field::Text(text_field) => {
                    let is_date = schema.is_date_column(&raw);
                    text.push((idx, raw, *text_field, is_date));
                }
                Field::Provider | Field::Account | Field::SourceFile => {}
            }
        }

        let date = date.ok_or_else(|| CsvError::MissingColumn {
            path: path.to_string(),
            field: Field::Date,
        })?;
        Ok(ColumnPlan { date, amount, text })
    }
}

pub struct CsvImporter;

impl CsvImporter {
    pub fn parse_schema<R: Read>(
        reader: &mut csv::Reader<R>,
        schema: &ProviderSchema,
        origin: &Origin,
    ) -> Result<Vec<Record>, CsvError> {
        let path = origin.source_file.as_str();
        let csv_err = |source| CsvError::Csv {
            path: path.to_string(),
            source,
        };

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        let plan = ColumnPlan::build(&headers, schema, path)?;

        let mut records = Vec::new();
        for result in reader.records() {
            let row = result.map_err(csv_err)?;

            if row.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            let line = row.position().map(|p| p.line()).unwrap_or_default();

            let (date_idx, date_col) = &plan.date;
            let raw_date = row.get(*date_idx).unwrap_or_default();
            let date = parse_date(raw_date, schema).ok_or_else(|| CsvError::InvalidDate {
                path: path.to_string(),
                line,
                column: date_col.clone(),
                value: raw_date.to_string(),
            })?;

            let amount = match &plan.amount {
                Some((amount_idx, amount_col)) => {
                    let raw_amount = row.get(*amount_idx).unwrap_or_default();
                    let amount = parse_amount(raw_amount).ok_or_else(|| CsvError::InvalidAmount {
                        path: path.to_string(),
                        line,
                        column: amount_col.clone(),
                        value: raw_amount.to_string(),
                    })?;
                    Some(amount)
                }
                None => None,
            };

            let mut record = Record::new(date, amount, origin);
            for (idx, column, field, is_date) in &plan.text {
                let value = row.get(*idx).unwrap_or_default();
                let value = if *is_date {
                    parse_date(value, schema)
                        .ok_or_else(|| CsvError::InvalidDate {
                            path: path.to_string(),
                            line,
                            column: column.clone(),
                            value: value.to_string(),
                        })?
                        .format(DATE_FORMAT)
                        .to_string()
                } else {
                    value.to_string()
                };
                record.set_text(*field, value);
            }
            records.push(record);
        }

        Ok(records)
    }
}

/// Parses a date cell using the schema's explicit format, then the usual bank
/// layouts in day-first or month-first order. A trailing time part is ignored.
fn parse_date(s: &str, schema: &ProviderSchema) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(format) = &schema.date_format {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }

    let s = s.split([' ', 'T']).next().unwrap_or(s);
    let formats: &[&str] = if schema.day_first {
        &["%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d"]
    } else {
        &["%m/%d/%Y", "%m-%d-%Y", "%m.%d.%Y", "%Y-%m-%d", "%Y/%m/%d"]
    };
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parses an amount cell. A lone comma is a decimal separator (`12,50`); when
/// both `,` and `.` occur, whichever comes last is the decimal separator.
fn parse_amount(s: &str) -> Option<Money> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };
    let s: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '€' | '$' | '£' | '\''))
        .collect();
    let s = s.strip_prefix('+').unwrap_or(&s);

    let normalized = match (s.rfind(','), s.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) if s.matches(',').count() > 1 => s.replace(',', ""),
        (Some(_), None) => s.replace(',', "."),
        (None, Some(_)) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s.to_string(),
    };

    let dec = Decimal::from_str(&normalized).ok()?;
    Some(Money::from_decimal(if negative { -dec } else { dec }))
}

pub fn parse<R: Read>(
    reader: &mut csv::Reader<R>,
    schema: &ProviderSchema,
    origin: &Origin,
) -> Result<Vec<Record>, CsvError> {
    CsvImporter::parse_schema(reader, schema, origin)
}

pub fn import_csv<R: Read>(
    data: R,
    schema: &ProviderSchema,
    origin: &Origin,
) -> Result<Vec<Record>, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(schema.delimiter())
        .from_reader(data);

    parse(&mut reader, schema, origin)
}

pub fn import_file(
    path: &Path,
    schema: &ProviderSchema,
    origin: &Origin,
) -> Result<Vec<Record>, CsvError> {
    let file = std::fs::File::open(path).map_err(|source| CsvError::Io {
        path: origin.source_file.clone(),
        source,
    })?;
    let records = import_csv(std::io::BufReader::new(file), schema, origin)?;
    tracing::info!(
        provider = %origin.provider,
        account = %origin.account,
        file = %origin.source_file,
        rows = records.len(),
        "Loaded file"
    );
    Ok(records)
}
