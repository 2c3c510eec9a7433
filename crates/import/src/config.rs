use ledgerfold_core::Field;
use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::csv::ProviderSchema;
use crate::export::AccountFilter;
use crate::rules::{ReplacementRules, TagRules};

pub const DEFAULT_CURRENCY_SYMBOL: &str = "€";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid TOML in {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("No providers configured")]
    NoProviders,
    #[error("Provider '{provider}': {reason}")]
    InvalidSchema { provider: String, reason: String },
}

/// String-keyed map that keeps entries in document order.
///
/// Rule sets are order-sensitive, so config sections are read into this
/// instead of a `HashMap`. A repeated key keeps its first position and takes
/// the last value.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        OrderedMap(Vec::new())
    }

    pub fn insert(&mut self, key: String, value: V) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_entries(self) -> Vec<(String, V)> {
        self.0
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        OrderedMap::new()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = OrderedMap::new();
        for (k, v) in iter {
            map.insert(k.into(), v);
        }
        map
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = OrderedMap::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// On-disk document format, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Format::Toml,
            _ => Format::Json,
        }
    }

    pub fn parse<T: DeserializeOwned>(self, text: &str, path: &Path) -> Result<T, ConfigError> {
        match self {
            Format::Json => serde_json::from_str(text).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            }),
            Format::Toml => toml::from_str(text).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Format::from_path(path).parse(&text, path)
}

/// Provider identifier → schema, in declaration order.
pub type Providers = OrderedMap<ProviderSchema>;

/// Rule file contents. Sections that are absent fall back to empty rule sets.
#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    #[serde(default, alias = "tagsmap")]
    pub tags: Option<TagRules>,
    #[serde(default, alias = "replacepatterns")]
    pub replacements: Option<ReplacementRules>,
    #[serde(default)]
    pub excluded_account_prefixes: Vec<String>,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
}

fn default_currency_symbol() -> String {
    DEFAULT_CURRENCY_SYMBOL.to_string()
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub filter: AccountFilter,
    pub currency_symbol: String,
}

/// Everything a run needs, read once and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub providers: Providers,
    pub tags: TagRules,
    pub replacements: ReplacementRules,
    pub export: ExportSettings,
}

impl RunConfig {
    pub fn load(rules_path: &Path, providers_path: &Path) -> Result<Self, ConfigError> {
        let rules: RulesConfig = read_document(rules_path)?;
        let providers: Providers = read_document(providers_path)?;
        tracing::info!(
            rules = %rules_path.display(),
            providers = %providers_path.display(),
            "Loaded configuration"
        );
        Self::from_parts(rules, providers)
    }

    pub fn from_json(rules: &str, providers: &str) -> Result<Self, ConfigError> {
        let path = Path::new("<inline>");
        Self::from_parts(
            Format::Json.parse(rules, path)?,
            Format::Json.parse(providers, path)?,
        )
    }

    pub fn from_toml(rules: &str, providers: &str) -> Result<Self, ConfigError> {
        let path = Path::new("<inline>");
        Self::from_parts(
            Format::Toml.parse(rules, path)?,
            Format::Toml.parse(providers, path)?,
        )
    }

    pub fn from_parts(rules: RulesConfig, providers: Providers) -> Result<Self, ConfigError> {
        if providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        for (name, schema) in providers.iter() {
            validate_schema(name, schema)?;
        }

        let tags = rules.tags.unwrap_or_else(|| {
            tracing::warn!("No tag rules in config");
            TagRules::default()
        });
        let replacements = rules.replacements.unwrap_or_else(|| {
            tracing::warn!("No replacement rules in config");
            ReplacementRules::default()
        });

        Ok(RunConfig {
            providers,
            tags,
            replacements,
            export: ExportSettings {
                filter: AccountFilter::new(rules.excluded_account_prefixes),
                currency_symbol: rules.currency_symbol,
            },
        })
    }
}

fn validate_schema(provider: &str, schema: &ProviderSchema) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidSchema {
        provider: provider.to_string(),
        reason,
    };

    if provider.trim().is_empty() {
        return Err(invalid("provider identifier is empty".to_string()));
    }
    if schema.separator.len() != 1 {
        return Err(invalid(format!(
            "separator must be a single ASCII character, got {:?}",
            schema.separator
        )));
    }
    if !schema.column_mapping.iter().any(|(_, f)| *f == Field::Date) {
        return Err(invalid(format!("no column mapped to '{}'", Field::Date)));
    }
    if let Some((raw, field)) = schema
        .column_mapping
        .iter()
        .find(|(_, f)| matches!(f, Field::Provider | Field::Account | Field::SourceFile))
    {
        return Err(invalid(format!(
            "column '{raw}' maps to '{field}', which is stamped from the input location"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerfold_core::TextField;

    const PROVIDERS_JSON: &str = r#"{
        "bankA": {
            "sep": ";",
            "date_cols": ["Datum"],
            "cols": {
                "Datum": "date",
                "Bedrag": "amount",
                "Omschrijving": "description",
                "Naam": "counterparty_name"
            }
        }
    }"#;

    #[test]
    fn json_config_with_legacy_keys() {
        let rules = r#"{
            "tagsmap": {"groceries": {"find": ["grocery"], "field": ["description"]}},
            "replacepatterns": {"Shop": {"pattern": ["grocery"], "field": ["description"]}}
        }"#;
        let config = RunConfig::from_json(rules, PROVIDERS_JSON).unwrap();
        let schema = config.providers.get("bankA").unwrap();
        assert_eq!(schema.separator, ";");
        assert_eq!(schema.date_columns, vec!["Datum".to_string()]);
        assert_eq!(
            schema.column_mapping.get("Naam"),
            Some(&Field::Text(TextField::CounterpartyName))
        );
        assert!(schema.day_first);
        assert_eq!(config.tags.tag_names().collect::<Vec<_>>(), vec!["groceries"]);
        assert_eq!(config.replacements.len(), 1);
        assert_eq!(config.export.currency_symbol, "€");
    }

    #[test]
    fn rule_order_follows_document_order() {
        let rules = r#"{
            "replacements": {
                "Zeta": {"pattern": ["z"], "field": ["details"]},
                "Alpha": {"pattern": ["a"], "field": ["details"]},
                "Mid": {"pattern": ["m"], "field": ["details"]}
            }
        }"#;
        let config = RunConfig::from_json(rules, PROVIDERS_JSON).unwrap();
        let keys: Vec<_> = config.replacements.replacement_values().collect();
        assert_eq!(keys, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn toml_config_preserves_order() {
        let rules = r#"
            excluded_account_prefixes = ["paypal"]
            currency_symbol = "$"

            [replacements.Zeta]
            pattern = ["z"]
            field = ["details"]

            [replacements.Alpha]
            pattern = ["a"]
            field = ["counterparty"]
        "#;
        let providers = r#"
            [bankB]
            separator = ","
            date_columns = ["Date"]
            day_first = false

            [bankB.column_mapping]
            Date = "date"
            Amount = "amount"
            "Payee Name" = "counterparty_name"
        "#;
        let config = RunConfig::from_toml(rules, providers).unwrap();
        let keys: Vec<_> = config.replacements.replacement_values().collect();
        assert_eq!(keys, vec!["Zeta", "Alpha"]);
        assert!(config.tags.is_empty());
        assert!(!config.providers.get("bankB").unwrap().day_first);
        assert!(config.export.filter.is_excluded("paypal_main"));
        assert_eq!(config.export.currency_symbol, "$");
    }

    #[test]
    fn missing_rule_sections_default_to_empty() {
        let config = RunConfig::from_json("{}", PROVIDERS_JSON).unwrap();
        assert!(config.tags.is_empty());
        assert!(config.replacements.is_empty());
        assert!(!config.export.filter.is_excluded("paypal"));
    }

    #[test]
    fn unknown_rule_field_is_a_config_error() {
        let rules = r#"{"tags": {"x": {"find": ["a"], "field": ["iban"]}}}"#;
        assert!(matches!(
            RunConfig::from_json(rules, PROVIDERS_JSON),
            Err(ConfigError::Json { .. })
        ));
    }

    #[test]
    fn replacement_into_amount_is_rejected() {
        let rules = r#"{"replacements": {"0": {"pattern": ["a"], "field": ["amount"]}}}"#;
        assert!(RunConfig::from_json(rules, PROVIDERS_JSON).is_err());
    }

    #[test]
    fn schema_without_date_mapping_is_rejected() {
        let providers = r#"{"bankA": {"sep": ",", "cols": {"Bedrag": "amount"}}}"#;
        assert!(matches!(
            RunConfig::from_json("{}", providers),
            Err(ConfigError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn schema_without_amount_mapping_is_accepted() {
        let providers = r#"{"bankA": {"sep": ",", "cols": {"Datum": "date", "Naam": "counterparty"}}}"#;
        let config = RunConfig::from_json("{}", providers).unwrap();
        assert_eq!(config.providers.len(), 1);
    }

    #[test]
    fn schema_mapping_onto_stamped_field_is_rejected() {
        let providers = r#"{"bankA": {"sep": ",", "cols": {"D": "date", "A": "amount", "Bank": "provider"}}}"#;
        assert!(matches!(
            RunConfig::from_json("{}", providers),
            Err(ConfigError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn multi_char_separator_is_rejected() {
        let providers = r#"{"bankA": {"sep": ";;", "cols": {"D": "date", "A": "amount"}}}"#;
        assert!(RunConfig::from_json("{}", providers).is_err());
    }

    #[test]
    fn empty_providers_is_rejected() {
        assert!(matches!(
            RunConfig::from_json("{}", "{}"),
            Err(ConfigError::NoProviders)
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunConfig::load(&dir.path().join("config.json"), &dir.path().join("providers.json"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn load_reads_files_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let rules_path = dir.path().join("config.toml");
        let providers_path = dir.path().join("providers.json");
        std::fs::write(&rules_path, "[tags.fuel]\nfind = [\"shell\"]\nfield = [\"counterparty\"]\n").unwrap();
        std::fs::write(&providers_path, PROVIDERS_JSON).unwrap();

        let config = RunConfig::load(&rules_path, &providers_path).unwrap();
        assert_eq!(config.tags.tag_names().collect::<Vec<_>>(), vec!["fuel"]);
    }

    #[test]
    fn ordered_map_repeated_key_keeps_position() {
        let map: OrderedMap<u8> = serde_json::from_str(r#"{"b": 1, "a": 2, "b": 3}"#).unwrap();
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![("b", &3), ("a", &2)]);
    }
}
