use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use supplyledger_core::{LedgerResult, ReceiptId};
use supplyledger_inventory::{Receipt, ReceiptDraft};
use supplyledger_receiving::{
    DocumentExtractor, DocumentResolver, DocumentSuggestion, ExtractedDocument,
};

use crate::store::LedgerStore;

/// Turns supplier documents into verified receipts.
///
/// `extract` and `resolve` only suggest; nothing reaches stock until
/// `finalize` commits a draft the operator has checked.
pub struct ReceivingWorkflow<S, X> {
    store: Arc<S>,
    extractor: X,
}

impl<S, X> ReceivingWorkflow<S, X>
where
    S: LedgerStore + 'static,
    X: DocumentExtractor,
{
    pub fn new(store: Arc<S>, extractor: X) -> Self {
        Self { store, extractor }
    }

    /// Read a document and suggest vendor, number and lines.
    ///
    /// A document the extractor cannot read yields an empty suggestion whose
    /// message carries the reason.
    #[instrument(skip(self, bytes), fields(size = bytes.len()), err)]
    pub async fn extract(&self, bytes: &[u8]) -> LedgerResult<DocumentSuggestion> {
        let document = match self.extractor.extract(bytes).await {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!(error = %err, "document extraction failed");
                return Ok(DocumentSuggestion::empty(format!(
                    "could not read document: {err}"
                )));
            }
        };
        self.resolve(&document).await
    }

    pub async fn resolve(&self, document: &ExtractedDocument) -> LedgerResult<DocumentSuggestion> {
        DocumentResolver::new(self.store.clone())
            .resolve_document(document)
            .await
    }

    /// Validate the draft and commit receipt, stock credits and unit values
    /// as one unit.
    #[instrument(
        skip(self, draft),
        fields(document_number = %draft.document_number, lines = draft.lines.len()),
        err
    )]
    pub async fn finalize(&self, draft: ReceiptDraft) -> LedgerResult<Receipt> {
        let plan = draft.plan(ReceiptId::new(), Utc::now())?;
        let receipt = self.store.execute_receipt(plan).await?;
        tracing::info!(
            receipt_id = %receipt.id,
            total_value = receipt.total_value,
            "receipt finalized"
        );
        Ok(receipt)
    }

    pub async fn find_by_document(&self, number: &str) -> LedgerResult<Option<Receipt>> {
        self.store.find_receipt_by_document(number).await
    }
}
