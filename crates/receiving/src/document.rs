//! Boundary with the external text/table extraction service.

use serde::{Deserialize, Serialize};

/// One table as a grid of cells; the first row is the header.
pub type Table = Vec<Vec<String>>;

/// Text and tables pulled out of a supplier document, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub text: String,
    pub tables: Vec<Table>,
}

impl ExtractedDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tables: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }
}

/// Turns raw document bytes into text plus table grids.
///
/// Failures are opaque to the ledger; callers turn them into an advisory
/// message instead of an error.
#[async_trait::async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8]) -> anyhow::Result<ExtractedDocument>;
}

/// Extractor that always returns the same document. Useful when the caller
/// already holds extracted content.
#[derive(Debug, Clone, Default)]
pub struct PreExtracted(pub ExtractedDocument);

#[async_trait::async_trait]
impl DocumentExtractor for PreExtracted {
    async fn extract(&self, _bytes: &[u8]) -> anyhow::Result<ExtractedDocument> {
        Ok(self.0.clone())
    }
}
