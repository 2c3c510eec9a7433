use ledgerfold_core::Record;
use std::path::Path;
use thiserror::Error;

use crate::config::RunConfig;
use crate::csv::{self, CsvError};
use crate::derive::Deriver;
use crate::discover::{self, DiscoverError, InputFile};
use crate::export::{self, AccountExport, TagTotal};
use crate::merge::merge;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Discover(#[from] DiscoverError),
    #[error(transparent)]
    Csv(#[from] CsvError),
}

/// All records of one run, merged and date-ordered, plus the run's identity.
#[derive(Debug, Clone)]
pub struct Batch {
    pub fingerprint: String,
    pub files: Vec<InputFile>,
    pub records: Vec<Record>,
}

/// Discovers, normalizes and merges every input file. The first file that
/// fails to parse aborts the run.
pub fn ingest(input_root: &Path, config: &RunConfig) -> Result<Batch, IngestError> {
    let files = discover::discover(input_root, &config.providers)?;
    let fingerprint = discover::fingerprint(&files);
    tracing::info!(files = files.len(), %fingerprint, "Discovered input files");

    let batches = files
        .iter()
        .map(|file| csv::import_file(&file.path, &file.schema, &file.origin()))
        .collect::<Result<Vec<_>, CsvError>>()?;

    let records = merge(batches);
    Ok(Batch {
        fingerprint,
        files,
        records,
    })
}

/// Runs the rule and derivation stages over a single record: description
/// fallback, tags, details cleanup, replacements, display fields.
pub fn process_record(record: Record, config: &RunConfig, deriver: &Deriver) -> Record {
    let record = deriver.with_description(record);
    let record = config.tags.apply(record);
    let record = deriver.with_clean_details(record);
    let record = config.replacements.apply(record);
    deriver.finish(record)
}

pub fn process(records: Vec<Record>, config: &RunConfig) -> Vec<Record> {
    let deriver = deriver(config);
    records
        .into_iter()
        .map(|record| process_record(record, config, &deriver))
        .collect()
}

pub fn deriver(config: &RunConfig) -> Deriver {
    Deriver::new(&config.export.currency_symbol)
}

pub fn exports(records: &[Record], config: &RunConfig) -> Vec<AccountExport> {
    export::project(records, &config.export.filter, &deriver(config))
}

pub fn tag_totals(records: &[Record], config: &RunConfig) -> Vec<TagTotal> {
    export::tag_totals(records, config.tags.tag_names())
}
