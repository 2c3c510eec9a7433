pub mod config;
pub mod csv;
pub mod derive;
pub mod discover;
pub mod export;
pub mod merge;
pub mod pipeline;
pub mod rules;
pub(crate) mod util;

pub use config::{ConfigError, ExportSettings, OrderedMap, Providers, RulesConfig, RunConfig};
pub use self::csv::{CsvError, ProviderSchema};
pub use derive::Deriver;
pub use discover::{DiscoverError, InputFile};
pub use export::{AccountExport, AccountFilter, ExportRow, TagTotal};
pub use pipeline::{Batch, IngestError};
pub use rules::{ReplacementRule, ReplacementRules, TagRule, TagRules};

pub mod import {
    use crate::*;
    use ledgerfold_core::Record;
    use std::path::Path;

    pub fn load_config(rules_path: &Path, providers_path: &Path) -> Result<RunConfig, ConfigError> {
        RunConfig::load(rules_path, providers_path)
    }

    pub fn ingest(input_root: &Path, config: &RunConfig) -> Result<Batch, IngestError> {
        crate::pipeline::ingest(input_root, config)
    }

    pub fn process(records: Vec<Record>, config: &RunConfig) -> Vec<Record> {
        crate::pipeline::process(records, config)
    }

    pub fn exports(records: &[Record], config: &RunConfig) -> Vec<AccountExport> {
        crate::pipeline::exports(records, config)
    }

    pub fn write_export<W: std::io::Write>(export: &AccountExport, writer: W) -> Result<(), ::csv::Error> {
        crate::export::write_export(&export.rows, writer)
    }
}
