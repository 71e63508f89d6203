//! Ordered match cascade mapping a document line to a catalog lookup.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::table::RawLine;

/// Standalone 8-digit catalog code inside free text.
static SKU_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-9]{8})\b").expect("sku token pattern is valid"));

/// Catalog query produced by one matcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookupKey {
    /// Exact sku.
    Sku(String),
    /// Case-insensitive exact description.
    Description(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStrategy {
    ExplicitCode,
    EmbeddedToken,
    Description,
}

impl MatchStrategy {
    pub fn key_for(self, line: &RawLine) -> Option<LookupKey> {
        match self {
            MatchStrategy::ExplicitCode => explicit_code(line),
            MatchStrategy::EmbeddedToken => embedded_token(line),
            MatchStrategy::Description => description(line),
        }
    }
}

/// Strategies in the order they are tried; the first catalog hit wins.
pub const MATCH_CASCADE: [MatchStrategy; 3] = [
    MatchStrategy::ExplicitCode,
    MatchStrategy::EmbeddedToken,
    MatchStrategy::Description,
];

fn explicit_code(line: &RawLine) -> Option<LookupKey> {
    line.code.clone().map(LookupKey::Sku)
}

fn embedded_token(line: &RawLine) -> Option<LookupKey> {
    embedded_sku_token(&line.description).map(|t| LookupKey::Sku(t.to_string()))
}

fn description(line: &RawLine) -> Option<LookupKey> {
    Some(LookupKey::Description(line.description.clone()))
}

/// First standalone 8-digit token in `text`.
pub fn embedded_sku_token(text: &str) -> Option<&str> {
    SKU_TOKEN_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}
