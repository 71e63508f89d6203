use std::sync::Arc;

use tracing::instrument;

use supplyledger_core::LedgerResult;
use supplyledger_inventory::{Movement, NewMovement};

use crate::config::LedgerConfig;
use crate::store::LedgerStore;

/// Append-only log of stock movements.
pub struct MovementLedger<S> {
    store: Arc<S>,
    history_limit: usize,
}

impl<S: LedgerStore> MovementLedger<S> {
    pub fn new(store: Arc<S>, config: &LedgerConfig) -> Self {
        Self {
            store,
            history_limit: config.history_limit,
        }
    }

    #[instrument(skip(self, new), fields(item_id = %new.item_id, kind = new.kind.as_str()), err)]
    pub async fn record(&self, new: NewMovement) -> LedgerResult<Movement> {
        new.validate()?;
        self.store.record_movement(new).await
    }

    /// Most recent movements first, up to the configured history limit.
    pub async fn history(&self) -> LedgerResult<Vec<Movement>> {
        self.store.movements(self.history_limit).await
    }
}
