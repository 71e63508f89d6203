//! Vendor registry types and document header extraction.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use supplyledger_core::{Entity, LedgerError, LedgerResult, VendorId};

/// Formatted tax id as printed on documents, e.g. `12.345.678/0001-90`.
static TAX_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2}").expect("tax id pattern is valid")
});

/// Document number after a `Nº` / `N°` label, optionally followed by a dot.
static DOCUMENT_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)N[º°]\.?\s*([\d.\-]+)").expect("document number pattern is valid")
});

/// Vendor tax id reduced to its digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxId(String);

impl TaxId {
    /// Strips `.`, `/`, `-` and surrounding whitespace.
    pub fn new(raw: impl AsRef<str>) -> LedgerResult<Self> {
        let digits: String = raw
            .as_ref()
            .trim()
            .chars()
            .filter(|c| !matches!(c, '.' | '/' | '-'))
            .collect();
        if digits.is_empty() {
            return Err(LedgerError::incomplete("tax id cannot be empty"));
        }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TaxId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: VendorId,
    pub legal_name: String,
    pub trade_name: Option<String>,
    pub tax_id: TaxId,
    pub active: bool,
}

impl Vendor {
    pub fn from_new(id: VendorId, new: NewVendor) -> Self {
        Self {
            id,
            legal_name: new.legal_name,
            trade_name: new.trade_name,
            tax_id: new.tax_id,
            active: true,
        }
    }

    /// Case-insensitive match on legal name, trade name or tax id.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.legal_name.to_lowercase().contains(&term)
            || self
                .trade_name
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(&term))
            || self.tax_id.as_str().contains(&term)
    }
}

impl Entity for Vendor {
    type Id = VendorId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVendor {
    pub legal_name: String,
    pub trade_name: Option<String>,
    pub tax_id: TaxId,
}

impl NewVendor {
    pub fn new(legal_name: &str, tax_id: &str) -> LedgerResult<Self> {
        let legal_name = legal_name.trim();
        if legal_name.is_empty() {
            return Err(LedgerError::incomplete("vendor legal name is required"));
        }
        Ok(Self {
            legal_name: legal_name.to_string(),
            trade_name: None,
            tax_id: TaxId::new(tax_id)?,
        })
    }

    pub fn with_trade_name(mut self, trade_name: &str) -> Self {
        let trade_name = trade_name.trim();
        self.trade_name = (!trade_name.is_empty()).then(|| trade_name.to_string());
        self
    }
}

/// Every formatted tax id in `text`, normalized, in order of appearance.
pub fn find_tax_ids(text: &str) -> Vec<TaxId> {
    TAX_ID_RE
        .find_iter(text)
        .filter_map(|m| TaxId::new(m.as_str()).ok())
        .collect()
}

/// First labelled document number in `text`, with `.` and `-` removed.
pub fn extract_document_number(text: &str) -> Option<String> {
    let caps = DOCUMENT_NUMBER_RE.captures(text)?;
    let number: String = caps
        .get(1)?
        .as_str()
        .chars()
        .filter(|c| !matches!(c, '.' | '-'))
        .collect();
    (!number.is_empty()).then_some(number)
}
