use ledgerfold_core::{Money, Record, DATE_FORMAT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::derive::{self, Deriver};
use crate::util::contains_lowered;

/// Accounts whose identifier starts with any of these prefixes get no export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountFilter {
    excluded_prefixes: Vec<String>,
}

impl AccountFilter {
    pub fn new(excluded_prefixes: Vec<String>) -> Self {
        AccountFilter {
            excluded_prefixes: excluded_prefixes
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn is_excluded(&self, account: &str) -> bool {
        self.excluded_prefixes.iter().any(|p| account.starts_with(p.as_str()))
    }
}

/// One line of the four-column budget import format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Payee")]
    pub payee: String,
    #[serde(rename = "Memo")]
    pub memo: String,
    #[serde(rename = "Amount")]
    pub amount: String,
}

impl ExportRow {
    /// Projects a record, deriving any display field that has not been filled yet.
    pub fn from_record(record: &Record, deriver: &Deriver) -> Self {
        let derived;
        let record = if record.memo.is_none() || record.payee.is_none() || record.amount_display.is_none() {
            derived = deriver.finish(record.clone());
            &derived
        } else {
            record
        };
        ExportRow {
            date: record.date.format(DATE_FORMAT).to_string(),
            payee: record.payee.clone().unwrap_or_else(|| derive::UNKNOWN_PAYEE.to_string()),
            memo: record.memo.clone().unwrap_or_default(),
            amount: record.amount_display.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountExport {
    pub account: String,
    pub rows: Vec<ExportRow>,
}

impl AccountExport {
    pub fn file_name(&self) -> String {
        export_file_name(&self.account)
    }
}

pub fn export_file_name(account: &str) -> String {
    format!("ynab_{account}.csv")
}

/// Partitions records by account, skipping excluded accounts. Output is
/// ordered by account; rows keep the order of `records`.
pub fn project(records: &[Record], filter: &AccountFilter, deriver: &Deriver) -> Vec<AccountExport> {
    let mut by_account: BTreeMap<&str, Vec<ExportRow>> = BTreeMap::new();
    for record in records {
        if filter.is_excluded(&record.account) {
            continue;
        }
        by_account
            .entry(record.account.as_str())
            .or_default()
            .push(ExportRow::from_record(record, deriver));
    }
    by_account
        .into_iter()
        .map(|(account, rows)| AccountExport {
            account: account.to_string(),
            rows,
        })
        .collect()
}

pub fn write_export<W: Write>(rows: &[ExportRow], writer: W) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(["Date", "Payee", "Memo", "Amount"])?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_export<R: Read>(reader: R) -> Result<Vec<ExportRow>, csv::Error> {
    csv::Reader::from_reader(reader).deserialize().collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTotal {
    pub tag: String,
    pub total: Money,
}

/// Sum of amounts per known tag, sorted by tag name.
///
/// A record counts towards a tag when its comma-joined tag list contains the
/// tag name case-insensitively, so `food` also picks up records tagged
/// `seafood`. Records without an amount add nothing.
pub fn tag_totals<'a, I>(records: &[Record], tag_names: I) -> Vec<TagTotal>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut tags: Vec<&str> = tag_names.into_iter().collect();
    tags.sort_unstable();
    tags.dedup();

    let joined: Vec<String> = records.iter().map(Record::tags_joined).collect();
    tags.into_iter()
        .map(|tag| {
            let needle = tag.to_lowercase();
            let total = records
                .iter()
                .zip(&joined)
                .filter(|(_, tags)| contains_lowered(tags, &needle))
                .filter_map(|(r, _)| r.amount)
                .sum();
            TagTotal {
                tag: tag.to_string(),
                total,
            }
        })
        .collect()
}
