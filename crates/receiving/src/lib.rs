//! Supplier document receiving.
//!
//! Reads extracted supplier documents (invoices, delivery notes), finds the
//! vendor and document number, and resolves line items against the catalog.

pub mod document;
pub mod matcher;
pub mod resolver;
pub mod table;
pub mod vendor;

pub use document::{DocumentExtractor, ExtractedDocument, PreExtracted, Table};
pub use matcher::{LookupKey, MATCH_CASCADE, MatchStrategy, embedded_sku_token};
pub use resolver::{
    CatalogAccess, DocumentResolver, DocumentSuggestion, MSG_EXTRACTED, MSG_NO_LINES,
    ResolvedLine, VendorSuggestion,
};
pub use table::{ColumnLayout, RawLine, line_items, parse_decimal};
pub use vendor::{NewVendor, TaxId, Vendor, extract_document_number, find_tax_ids};
