use std::sync::Arc;

use tracing::instrument;

use supplyledger_core::{LedgerResult, PositionId};
use supplyledger_inventory::{Adjustment, AdjustmentRequest};

use crate::config::LedgerConfig;
use crate::store::LedgerStore;

/// Manual count corrections and their audit trail.
pub struct AdjustmentTrail<S> {
    store: Arc<S>,
    history_limit: usize,
}

impl<S: LedgerStore> AdjustmentTrail<S> {
    pub fn new(store: Arc<S>, config: &LedgerConfig) -> Self {
        Self {
            store,
            history_limit: config.history_limit,
        }
    }

    /// Overwrite the position's quantity with a physical count.
    #[instrument(skip(self, note), err)]
    pub async fn adjust(
        &self,
        position_id: PositionId,
        new_quantity: f64,
        user: &str,
        note: Option<&str>,
    ) -> LedgerResult<Adjustment> {
        let request = AdjustmentRequest::new(position_id, new_quantity, user, note)?;
        let adjustment = self.store.execute_adjustment(&request).await?;
        tracing::info!(
            adjustment_id = %adjustment.id,
            difference = adjustment.difference,
            "count adjusted"
        );
        Ok(adjustment)
    }

    /// Most recent adjustments first, up to the configured history limit.
    pub async fn history(&self) -> LedgerResult<Vec<Adjustment>> {
        self.store.adjustments(self.history_limit).await
    }
}
