//! Presentation fields computed from canonical ones.

use ledgerfold_core::{Money, Record};
use regex::Regex;
use std::sync::OnceLock;

use crate::config::DEFAULT_CURRENCY_SYMBOL;

pub const UNKNOWN_PAYEE: &str = "unknown";

fn space_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(" {2,}").expect("static regex"))
}

/// The raw narrative if it has content, else the structured one, else empty.
pub fn resolve_description(raw: &str, structured: &str) -> String {
    if !raw.trim().is_empty() {
        raw.to_string()
    } else if !structured.trim().is_empty() {
        structured.to_string()
    } else {
        String::new()
    }
}

/// Collapses runs of three or more spaces to two, turns each double space
/// into `" - "`, then trims. Any run of two or more spaces therefore ends up
/// as a single separator.
pub fn clean_spaces(s: &str) -> String {
    space_runs().replace_all(s, " - ").trim().to_string()
}

pub fn memo(provider: &str, details: &str) -> String {
    format!("{provider} - {details}")
}

/// Empty when the record carries no amount.
pub fn amount_display(amount: Option<Money>, currency_symbol: &str) -> String {
    amount
        .map(|amount| amount.with_symbol(currency_symbol))
        .unwrap_or_default()
}

/// Trimmed counterparty name, else the counterparty account as written, else
/// [`UNKNOWN_PAYEE`].
pub fn payee(counterparty_name: &str, counterparty_account: &str) -> String {
    let name = counterparty_name.trim();
    if !name.is_empty() {
        return name.to_string();
    }
    if !counterparty_account.trim().is_empty() {
        return counterparty_account.to_string();
    }
    UNKNOWN_PAYEE.to_string()
}

/// Runs the derivation steps over records. The narrative steps run before
/// rule application; [`Deriver::finish`] runs last.
#[derive(Debug, Clone)]
pub struct Deriver {
    currency_symbol: String,
}

impl Default for Deriver {
    fn default() -> Self {
        Deriver::new(DEFAULT_CURRENCY_SYMBOL)
    }
}

impl Deriver {
    pub fn new(currency_symbol: &str) -> Self {
        Deriver {
            currency_symbol: currency_symbol.to_string(),
        }
    }

    pub fn with_description(&self, mut record: Record) -> Record {
        record.description = resolve_description(&record.description, &record.description_structured);
        record
    }

    pub fn with_clean_details(&self, mut record: Record) -> Record {
        record.details = clean_spaces(&record.details);
        record
    }

    /// Fills memo, display amount and payee. The memo falls back to the
    /// description when the record has no details.
    pub fn finish(&self, mut record: Record) -> Record {
        let details = if record.details.trim().is_empty() {
            clean_spaces(&record.description)
        } else {
            record.details.clone()
        };
        record.memo = Some(memo(&record.provider, &details));
        record.amount_display = Some(amount_display(record.amount, &self.currency_symbol));
        record.payee = Some(payee(&record.counterparty_name, &record.counterparty_account));
        record
    }
}
