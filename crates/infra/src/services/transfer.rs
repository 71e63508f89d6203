use std::sync::Arc;

use tracing::instrument;

use supplyledger_core::LedgerResult;
use supplyledger_inventory::{TransferOutcome, TransferRequest, TransferTarget};

use crate::config::LedgerConfig;
use crate::store::LedgerStore;

/// Moves quantity out of a position, either into another position or out to
/// a department.
pub struct TransferEngine<S> {
    store: Arc<S>,
    department_prefix: String,
}

impl<S: LedgerStore> TransferEngine<S> {
    pub fn new(store: Arc<S>, config: &LedgerConfig) -> Self {
        Self {
            store,
            department_prefix: config.department_prefix.clone(),
        }
    }

    /// `destination` starting with the department prefix (any case) sends the
    /// quantity out to that department; anything else names a position.
    #[instrument(skip(self), err)]
    pub async fn transfer(
        &self,
        sku: &str,
        origin: &str,
        quantity: f64,
        destination: &str,
        user: &str,
    ) -> LedgerResult<TransferOutcome> {
        let request = TransferRequest::new(
            sku,
            origin,
            quantity,
            destination,
            user,
            &self.department_prefix,
        )?;
        let outcome = self.store.execute_transfer(&request).await?;

        if let TransferTarget::Department {
            department,
            created: true,
        } = &outcome.target
        {
            tracing::info!(department = %department.name, "department registered by transfer");
        }
        tracing::info!(
            movement_id = %outcome.movement.id,
            kind = outcome.movement.kind.as_str(),
            origin_drained = outcome.origin.is_none(),
            "transfer committed"
        );
        Ok(outcome)
    }
}
