use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::money::Money;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One transaction in the shape every provider maps onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub date: NaiveDate,
    /// `None` when the file has no column for the mapped amount.
    pub amount: Option<Money>,
    pub description: String,
    pub description_structured: String,
    pub details: String,
    pub counterparty_name: String,
    pub counterparty_account: String,
    pub provider: String,
    pub account: String,
    pub source_file: String,
    pub tags: BTreeSet<String>,
    pub memo: Option<String>,
    pub amount_display: Option<String>,
    pub payee: Option<String>,
}

impl Record {
    /// A record with the given origin and every text field empty.
    pub fn new(date: NaiveDate, amount: impl Into<Option<Money>>, origin: &Origin) -> Self {
        Record {
            date,
            amount: amount.into(),
            description: String::new(),
            description_structured: String::new(),
            details: String::new(),
            counterparty_name: String::new(),
            counterparty_account: String::new(),
            provider: origin.provider.clone(),
            account: origin.account.clone(),
            source_file: origin.source_file.clone(),
            tags: BTreeSet::new(),
            memo: None,
            amount_display: None,
            payee: None,
        }
    }

    /// String view of any canonical field, as rules see it.
    pub fn field(&self, field: Field) -> Cow<'_, str> {
        match field {
            Field::Date => Cow::Owned(self.date.format(DATE_FORMAT).to_string()),
            Field::Amount => Cow::Owned(self.amount.map(|a| a.to_string()).unwrap_or_default()),
            Field::Text(text) => Cow::Borrowed(self.text(text)),
            Field::Provider => Cow::Borrowed(&self.provider),
            Field::Account => Cow::Borrowed(&self.account),
            Field::SourceFile => Cow::Borrowed(&self.source_file),
        }
    }

    pub fn text(&self, field: TextField) -> &str {
        match field {
            TextField::Description => &self.description,
            TextField::DescriptionStructured => &self.description_structured,
            TextField::Details => &self.details,
            TextField::CounterpartyName => &self.counterparty_name,
            TextField::CounterpartyAccount => &self.counterparty_account,
        }
    }

    pub fn set_text(&mut self, field: TextField, value: String) {
        let slot = match field {
            TextField::Description => &mut self.description,
            TextField::DescriptionStructured => &mut self.description_structured,
            TextField::Details => &mut self.details,
            TextField::CounterpartyName => &mut self.counterparty_name,
            TextField::CounterpartyAccount => &mut self.counterparty_account,
        };
        *slot = value;
    }

    /// Tags joined with `,` in sorted order.
    pub fn tags_joined(&self) -> String {
        self.tags.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    }
}

/// Where a record was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub provider: String,
    pub account: String,
    pub source_file: String,
}

/// Free-text canonical fields. These are the only fields a replacement rule may overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TextField {
    Description,
    DescriptionStructured,
    Details,
    CounterpartyName,
    CounterpartyAccount,
}

impl TextField {
    pub const ALL: [TextField; 5] = [
        TextField::Description,
        TextField::DescriptionStructured,
        TextField::Details,
        TextField::CounterpartyName,
        TextField::CounterpartyAccount,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TextField::Description => "description",
            TextField::DescriptionStructured => "description_structured",
            TextField::Details => "details",
            TextField::CounterpartyName => "counterparty_name",
            TextField::CounterpartyAccount => "counterparty_account",
        }
    }
}

/// Any canonical field, as referenced by column mappings and tag rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Field {
    Date,
    Amount,
    Text(TextField),
    Provider,
    Account,
    SourceFile,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Date => "date",
            Field::Amount => "amount",
            Field::Text(text) => text.name(),
            Field::Provider => "provider",
            Field::Account => "account",
            Field::SourceFile => "source_file",
        }
    }
}

impl From<TextField> for Field {
    fn from(field: TextField) -> Self {
        Field::Text(field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("Unknown canonical field: '{0}'")]
    Unknown(String),
    #[error("Field '{0}' is not a text field")]
    NotText(String),
}

impl FromStr for Field {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "date" => Ok(Field::Date),
            "amount" => Ok(Field::Amount),
            "description" | "description_raw" => Ok(Field::Text(TextField::Description)),
            "description_structured" => Ok(Field::Text(TextField::DescriptionStructured)),
            "details" => Ok(Field::Text(TextField::Details)),
            "counterparty_name" | "counterparty" => Ok(Field::Text(TextField::CounterpartyName)),
            "counterparty_account" => Ok(Field::Text(TextField::CounterpartyAccount)),
            "provider" => Ok(Field::Provider),
            "account" => Ok(Field::Account),
            "source_file" => Ok(Field::SourceFile),
            _ => Err(FieldError::Unknown(s.to_string())),
        }
    }
}

impl FromStr for TextField {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Field>()? {
            Field::Text(text) => Ok(text),
            _ => Err(FieldError::NotText(s.to_string())),
        }
    }
}

impl TryFrom<String> for Field {
    type Error = FieldError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<String> for TextField {
    type Error = FieldError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Field> for String {
    fn from(field: Field) -> Self {
        field.name().to_string()
    }
}

impl From<TextField> for String {
    fn from(field: TextField) -> Self {
        field.name().to_string()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for TextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
