//! Document entity resolution.
//!
//! Every raw line of a supplier document is mapped to a catalog item by trying
//! [`MATCH_CASCADE`] in order. Lines nothing matches get a new catalog entry;
//! all new entries of one document are created together in a single call to
//! [`CatalogAccess::provision_items`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use supplyledger_core::{ItemId, LedgerError, LedgerResult, VendorId};
use supplyledger_inventory::{Item, NewItem, Sku, description_key, title_case};

use crate::document::ExtractedDocument;
use crate::matcher::{LookupKey, MATCH_CASCADE, embedded_sku_token};
use crate::table::{RawLine, line_items};
use crate::vendor::{TaxId, Vendor, extract_document_number, find_tax_ids};

/// Catalog operations the resolver needs from a store.
#[async_trait::async_trait]
pub trait CatalogAccess: Send + Sync {
    async fn lookup(&self, key: &LookupKey) -> LedgerResult<Option<Item>>;

    /// Next free synthetic sku according to the store's policy.
    async fn next_synthetic_sku(&self) -> LedgerResult<Sku>;

    /// Create all `items` atomically, in order.
    ///
    /// A sku taken since it was planned is replaced by a fresh synthetic one;
    /// the returned items carry the skus actually stored.
    async fn provision_items(&self, items: Vec<NewItem>) -> LedgerResult<Vec<Item>>;

    async fn find_vendor_by_tax_id(&self, tax_id: &TaxId) -> LedgerResult<Option<Vendor>>;
}

/// A document line mapped to a catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLine {
    pub item_id: ItemId,
    pub sku: Sku,
    /// Description as stored in the catalog, not as printed on the document.
    pub description: String,
    pub unit: String,
    pub document_quantity: f64,
    pub unit_value: f64,
    /// True only on the line that caused the item to be created.
    pub newly_created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorSuggestion {
    pub id: VendorId,
    pub name: String,
}

/// Everything the resolver could infer from one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSuggestion {
    pub vendor: Option<VendorSuggestion>,
    /// Empty when no labelled number was found.
    pub document_number: String,
    pub lines: Vec<ResolvedLine>,
    pub message: String,
}

impl DocumentSuggestion {
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            vendor: None,
            document_number: String::new(),
            lines: Vec::new(),
            message: message.into(),
        }
    }

    pub fn created_count(&self) -> usize {
        self.lines.iter().filter(|l| l.newly_created).count()
    }
}

pub const MSG_EXTRACTED: &str = "data extracted successfully";
pub const MSG_NO_LINES: &str = "document read, but no matching line items were found";

fn created_message(count: usize) -> String {
    format!("{count} new item(s) registered automatically")
}

/// Where a line's item comes from during one resolution pass.
enum Slot {
    Existing(Item),
    Pending { index: usize, creator: bool },
}

#[derive(Default)]
struct Pass {
    pending: Vec<NewItem>,
    next_synthetic: Option<u64>,
}

impl Pass {
    fn find_pending(&self, key: &LookupKey) -> Option<usize> {
        self.pending.iter().position(|p| match key {
            LookupKey::Sku(sku) => p.sku.as_str() == sku,
            LookupKey::Description(text) => description_key(&p.description) == description_key(text),
        })
    }

    fn has_sku(&self, sku: &str) -> bool {
        self.pending.iter().any(|p| p.sku.as_str() == sku)
    }
}

pub struct DocumentResolver<C: ?Sized> {
    catalog: Arc<C>,
}

impl<C: CatalogAccess + ?Sized> DocumentResolver<C> {
    pub fn new(catalog: Arc<C>) -> Self {
        Self { catalog }
    }

    /// Vendor, document number and line items of an extracted document.
    ///
    /// Only the first table that yields line items is used. A missing vendor
    /// or number leaves the corresponding field empty.
    #[tracing::instrument(skip(self, document), fields(tables = document.tables.len()), err)]
    pub async fn resolve_document(
        &self,
        document: &ExtractedDocument,
    ) -> LedgerResult<DocumentSuggestion> {
        let vendor = self.suggest_vendor(&document.text).await?;
        let document_number = extract_document_number(&document.text).unwrap_or_default();

        let raw = document
            .tables
            .iter()
            .filter_map(line_items)
            .find(|lines| !lines.is_empty())
            .unwrap_or_default();

        let lines = self.resolve_lines(raw).await?;
        let created = lines.iter().filter(|l| l.newly_created).count();
        let message = if created > 0 {
            created_message(created)
        } else if lines.is_empty() {
            MSG_NO_LINES.to_string()
        } else {
            MSG_EXTRACTED.to_string()
        };

        tracing::info!(
            lines = lines.len(),
            created,
            vendor_found = vendor.is_some(),
            "document resolved"
        );

        Ok(DocumentSuggestion {
            vendor,
            document_number,
            lines,
            message,
        })
    }

    /// First registered vendor whose tax id appears in `text`.
    pub async fn suggest_vendor(&self, text: &str) -> LedgerResult<Option<VendorSuggestion>> {
        for tax_id in find_tax_ids(text) {
            if let Some(vendor) = self.catalog.find_vendor_by_tax_id(&tax_id).await? {
                return Ok(Some(VendorSuggestion {
                    id: vendor.id,
                    name: vendor.legal_name,
                }));
            }
        }
        Ok(None)
    }

    /// Map raw lines to catalog items, creating the missing ones.
    pub async fn resolve_lines(&self, raw: Vec<RawLine>) -> LedgerResult<Vec<ResolvedLine>> {
        let mut pass = Pass::default();
        let mut slots = Vec::with_capacity(raw.len());
        for line in &raw {
            slots.push(self.resolve_one(line, &mut pass).await?);
        }

        let provisioned = if pass.pending.is_empty() {
            Vec::new()
        } else {
            self.catalog.provision_items(pass.pending).await?
        };

        let mut resolved = Vec::with_capacity(raw.len());
        for (line, slot) in raw.into_iter().zip(slots) {
            let (item, newly_created) = match slot {
                Slot::Existing(item) => (item, false),
                Slot::Pending { index, creator } => match provisioned.get(index) {
                    Some(item) => (item.clone(), creator),
                    None => {
                        return Err(LedgerError::persistence(
                            "catalog returned fewer items than were provisioned",
                        ));
                    }
                },
            };
            resolved.push(ResolvedLine {
                item_id: item.id,
                sku: item.sku,
                description: item.description,
                unit: item.unit,
                document_quantity: line.quantity,
                unit_value: line.unit_value,
                newly_created,
            });
        }
        Ok(resolved)
    }

    async fn resolve_one(&self, line: &RawLine, pass: &mut Pass) -> LedgerResult<Slot> {
        for strategy in MATCH_CASCADE {
            let Some(key) = strategy.key_for(line) else {
                continue;
            };
            if let Some(index) = pass.find_pending(&key) {
                return Ok(Slot::Pending {
                    index,
                    creator: false,
                });
            }
            if let Some(item) = self.catalog.lookup(&key).await? {
                tracing::debug!(?strategy, sku = %item.sku, "line matched");
                return Ok(Slot::Existing(item));
            }
        }

        let sku = self.sku_for_new_item(line, pass).await?;
        tracing::info!(%sku, description = %line.description, "provisioning catalog item");
        let new = NewItem::new(sku, title_case(&line.description)).with_unit_value(line.unit_value);
        pass.pending.push(new);
        Ok(Slot::Pending {
            index: pass.pending.len() - 1,
            creator: true,
        })
    }

    /// The embedded token when it is still free, otherwise a synthetic sku.
    async fn sku_for_new_item(&self, line: &RawLine, pass: &mut Pass) -> LedgerResult<Sku> {
        if let Some(token) = embedded_sku_token(&line.description) {
            let taken = pass.has_sku(token)
                || self
                    .catalog
                    .lookup(&LookupKey::Sku(token.to_string()))
                    .await?
                    .is_some();
            if !taken {
                return Sku::new(token);
            }
        }
        self.allocate_synthetic(pass).await
    }

    async fn allocate_synthetic(&self, pass: &mut Pass) -> LedgerResult<Sku> {
        let mut candidate = match pass.next_synthetic {
            Some(next) => next,
            None => {
                let sku = self.catalog.next_synthetic_sku().await?;
                match sku.numeric() {
                    Some(n) => n,
                    None => return Ok(sku),
                }
            }
        };
        while pass.has_sku(&candidate.to_string()) {
            candidate = candidate.checked_add(1).ok_or_else(|| {
                LedgerError::invalid_id(format!("no numeric sku follows {candidate}"))
            })?;
        }
        // None at the end of the range: the next allocation asks the catalog again.
        pass.next_synthetic = candidate.checked_add(1);
        Ok(Sku::from(candidate))
    }
}
