//! End-to-end ledger scenarios.
//!
//! Tests: Service → LedgerStore → persisted state
//!
//! Every scenario runs against both the in-memory and the SQLite store so the
//! two stay behaviorally identical.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use supplyledger_core::{Actor, DepartmentId, ItemId, LedgerError, PositionId};
    use supplyledger_inventory::{
        ConferenceStatus, DescriptionMatch, Item, MovementKind, NewItem, NewMovement,
        DEFAULT_CATEGORY, QuantityChange, ReceiptDraft, ReceiptLineDraft, Sku, SkuPolicy,
        StockFilter, StockStatus, TransferTarget,
    };
    use supplyledger_receiving::{
        CatalogAccess, DocumentExtractor, ExtractedDocument, MSG_EXTRACTED, NewVendor,
        PreExtracted, Vendor,
    };

    use crate::config::LedgerConfig;
    use crate::services::{
        AdjustmentTrail, CatalogService, MovementLedger, ReceivingWorkflow, TransferEngine,
    };
    use crate::store::{InMemoryLedgerStore, LedgerStore, SqliteLedgerStore};

    const VENDOR_TAX_ID: &str = "12.345.678/0001-90";

    fn memory_store() -> Arc<InMemoryLedgerStore> {
        supplyledger_observability::init_for_tests();
        Arc::new(InMemoryLedgerStore::new(SkuPolicy::default()))
    }

    async fn sqlite_store() -> Arc<SqliteLedgerStore> {
        supplyledger_observability::init_for_tests();
        Arc::new(
            SqliteLedgerStore::in_memory(SkuPolicy::default())
                .await
                .expect("in-memory sqlite store"),
        )
    }

    struct Ledger<S> {
        store: Arc<S>,
        catalog: CatalogService<S>,
        transfers: TransferEngine<S>,
        movements: MovementLedger<S>,
        adjustments: AdjustmentTrail<S>,
    }

    impl<S: LedgerStore + 'static> Ledger<S> {
        fn new(store: Arc<S>) -> Self {
            let config = LedgerConfig::default();
            Self {
                catalog: CatalogService::new(store.clone(), &config),
                transfers: TransferEngine::new(store.clone(), &config),
                movements: MovementLedger::new(store.clone(), &config),
                adjustments: AdjustmentTrail::new(store.clone(), &config),
                store,
            }
        }

        fn receiving(&self, document: ExtractedDocument) -> ReceivingWorkflow<S, PreExtracted> {
            ReceivingWorkflow::new(self.store.clone(), PreExtracted(document))
        }

        async fn item(&self, sku: &str, description: &str) -> Item {
            self.catalog
                .create_item(NewItem::new(Sku::new(sku).unwrap(), description))
                .await
                .unwrap()
        }

        async fn stock_at(&self, sku: &str, label: &str, quantity: f64) -> PositionId {
            self.catalog
                .upsert_position(sku, label, QuantityChange::Absolute(quantity))
                .await
                .unwrap()
                .unwrap()
                .id
        }

        async fn quantities(&self, sku: &str) -> Vec<(String, f64)> {
            self.catalog
                .positions_for_sku(sku)
                .await
                .unwrap()
                .into_iter()
                .map(|p| (p.label.into_string(), p.quantity))
                .collect()
        }

        async fn vendor(&self) -> Vendor {
            self.catalog
                .register_vendor(NewVendor::new("Distribuidora Sul Ltda", VENDOR_TAX_ID).unwrap())
                .await
                .unwrap()
        }
    }

    fn delivery_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn receipt_line(item_id: ItemId, verified: f64, unit_value: f64, destination: &str) -> ReceiptLineDraft {
        ReceiptLineDraft {
            item_id,
            document_quantity: verified,
            verified_quantity: verified,
            unit_value,
            destination: destination.to_string(),
        }
    }

    fn invoice_table(rows: &[[&str; 3]]) -> Vec<Vec<String>> {
        let mut table = vec![vec![
            "DESCRIÇÃO DO PRODUTO".to_string(),
            "QTD".to_string(),
            "VALOR UNIT.".to_string(),
        ]];
        table.extend(rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()));
        table
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    async fn partial_transfer_then_department_out<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        ledger.item("30000001", "Luva Nitrilica M").await;
        ledger.stock_at("30000001", "A01", 10.0).await;

        let first = ledger
            .transfers
            .transfer("30000001", "A01", 4.0, "A02", "maria")
            .await
            .unwrap();
        assert_eq!(first.origin.as_ref().map(|p| p.quantity), Some(6.0));
        match &first.target {
            TransferTarget::Position(p) => {
                assert_eq!(p.label.as_str(), "A02");
                assert_eq!(p.quantity, 4.0);
            }
            other => panic!("expected a position target, got {other:?}"),
        }

        let second = ledger
            .transfers
            .transfer("30000001", "A01", 6.0, "setor-Picking", "maria")
            .await
            .unwrap();
        assert!(second.origin.is_none());
        match &second.target {
            TransferTarget::Department {
                department,
                created,
            } => {
                assert_eq!(department.name, "Picking");
                assert!(*created);
            }
            other => panic!("expected a department target, got {other:?}"),
        }

        assert_eq!(ledger.quantities("30000001").await, vec![("A02".to_string(), 4.0)]);

        let history = ledger.movements.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, MovementKind::Out);
        assert_eq!(history[0].destination_label, "SETOR-Picking");
        assert!(history[0].department_id.is_some());
        assert_eq!(history[1].kind, MovementKind::Transfer);
        assert_eq!(history[1].origin_label, "A01");
        assert_eq!(history[1].destination_label, "A02");
        assert_eq!(history[1].quantity, 4.0);
        assert_eq!(history[1].user.as_str(), "maria");

        let departments = ledger.catalog.departments().await.unwrap();
        assert_eq!(departments.len(), 1);

        // A second out to the same department, typed differently, reuses it.
        ledger.stock_at("30000001", "A03", 2.0).await;
        let third = ledger
            .transfers
            .transfer("30000001", "A03", 1.0, "SETOR-picking", "maria")
            .await
            .unwrap();
        assert!(matches!(third.target, TransferTarget::Department { created: false, .. }));
        assert_eq!(ledger.catalog.departments().await.unwrap().len(), 1);
    }

    async fn rejected_transfers_change_nothing<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        ledger.item("30000001", "Luva Nitrilica M").await;
        ledger.stock_at("30000001", "A01", 10.0).await;

        let err = ledger
            .transfers
            .transfer("30000001", "A01", 11.0, "A02", "maria")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientQuantity { requested, available }
                if requested == 11.0 && available == 10.0
        ));

        let err = ledger
            .transfers
            .transfer("99999999", "A01", 1.0, "A02", "maria")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        let err = ledger
            .transfers
            .transfer("30000001", "B07", 1.0, "A02", "maria")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        let err = ledger
            .transfers
            .transfer("30000001", "A01", 0.0, "A02", "maria")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity(_)));

        let err = ledger
            .transfers
            .transfer("30000001", "A01", 1.0, "A02", "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::IncompleteInput(_)));

        let err = ledger
            .transfers
            .transfer("30000001", "A01", 1.0, "SETOR-", "maria")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::IncompleteInput(_)));

        assert_eq!(ledger.quantities("30000001").await, vec![("A01".to_string(), 10.0)]);
        assert!(ledger.movements.history().await.unwrap().is_empty());
        assert!(ledger.catalog.departments().await.unwrap().is_empty());
    }

    async fn movement_ledger_validates_references<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        let item = ledger.item("30000008", "Cola Branca 1kg").await;
        let movement = |item_id: ItemId,
                        kind: MovementKind,
                        quantity: f64,
                        department_id: Option<DepartmentId>| NewMovement {
            item_id,
            department_id,
            kind,
            quantity,
            origin_label: "E01".to_string(),
            destination_label: "E02".to_string(),
            user: Actor::new("rita").unwrap(),
        };

        let recorded = ledger
            .movements
            .record(movement(item.id, MovementKind::Transfer, 2.0, None))
            .await
            .unwrap();
        assert_eq!(recorded.item_id, item.id);

        let err = ledger
            .movements
            .record(movement(item.id, MovementKind::Transfer, 0.0, None))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity(_)));
        let err = ledger
            .movements
            .record(movement(ItemId::new(), MovementKind::Transfer, 1.0, None))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        let err = ledger
            .movements
            .record(movement(item.id, MovementKind::Out, 1.0, Some(DepartmentId::new())))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        let history = ledger.movements.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, recorded.id);
    }

    async fn adjustment_overwrites_and_logs<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        ledger.item("30000002", "Fita Crepe 48mm").await;
        let position_id = ledger.stock_at("30000002", "B01", 50.0).await;

        let adjustment = ledger
            .adjustments
            .adjust(position_id, 47.0, "joao", None)
            .await
            .unwrap();
        assert_eq!(adjustment.quantity_before, 50.0);
        assert_eq!(adjustment.quantity_after, 47.0);
        assert_eq!(adjustment.difference, -3.0);
        assert_eq!(adjustment.note, "manual count adjustment by joao");
        assert_eq!(ledger.quantities("30000002").await, vec![("B01".to_string(), 47.0)]);

        // Counting zero keeps the position row.
        let zero = ledger
            .adjustments
            .adjust(position_id, 0.0, "joao", Some("shelf empty"))
            .await
            .unwrap();
        assert_eq!(zero.difference, -47.0);
        assert_eq!(zero.note, "shelf empty");
        assert_eq!(ledger.quantities("30000002").await, vec![("B01".to_string(), 0.0)]);

        let err = ledger
            .adjustments
            .adjust(position_id, -1.0, "joao", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity(_)));
        let err = ledger
            .adjustments
            .adjust(PositionId::new(), 1.0, "joao", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        let history = ledger.adjustments.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].note, "shelf empty");
        assert_eq!(history[1].difference, -3.0);
        // Adjustments are not movements.
        assert!(ledger.movements.history().await.unwrap().is_empty());
    }

    async fn position_labels_are_normalized<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        ledger.item("30000003", "Caixa Papelao 40x30").await;

        let first = ledger
            .catalog
            .upsert_position("30000003", " A 01 ", QuantityChange::Delta(5.0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.label.as_str(), "A01");
        let second = ledger
            .catalog
            .upsert_position("30000003", "A01", QuantityChange::Delta(3.0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.quantity, 8.0);

        // Draining through a delta removes the row.
        let drained = ledger
            .catalog
            .upsert_position("30000003", "A01", QuantityChange::Delta(-8.0))
            .await
            .unwrap();
        assert!(drained.is_none());
        assert!(ledger.quantities("30000003").await.is_empty());

        let err = ledger
            .catalog
            .upsert_position("30000003", "   ", QuantityChange::Delta(1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::IncompleteInput(_)));
    }

    async fn stock_view_reports_status<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        ledger.item("30000004", "Abracadeira Nylon").await;
        ledger.item("30000005", "Bobina Plastico Bolha").await;
        ledger.catalog.set_minimum_stock("30000004", 10).await.unwrap();
        ledger.catalog.set_minimum_stock("30000005", 10).await.unwrap();
        ledger.stock_at("30000004", "C01", 4.0).await;
        let bolha = ledger.stock_at("30000005", "C02", 12.0).await;
        ledger.adjustments.adjust(bolha, 0.0, "ana", None).await.unwrap();
        ledger.stock_at("30000005", "C03", 25.0).await;

        let lines = ledger.catalog.stock(&StockFilter::default()).await.unwrap();
        let summary: Vec<(&str, &str, StockStatus)> = lines
            .iter()
            .map(|l| (l.sku.as_str(), l.label.as_str(), l.status))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("30000004", "C01", StockStatus::Low),
                ("30000005", "C02", StockStatus::Out),
                ("30000005", "C03", StockStatus::Ok),
            ]
        );

        let filtered = ledger
            .catalog
            .stock(&StockFilter::default().item("bolha").position("c03"))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].quantity, 25.0);

        let err = ledger.catalog.set_minimum_stock("30000004", -1).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity(_)));
        let err = ledger.catalog.set_minimum_stock("77777777", 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    async fn position_detail_shows_last_movement<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        ledger.item("30000006", "Etiqueta Termica").await;
        let untouched = ledger.stock_at("30000006", "D01", 20.0).await;

        let detail = ledger.catalog.position_detail(untouched).await.unwrap();
        assert!(detail.last_movement.is_none());
        assert_eq!(detail.line.description, "Etiqueta Termica");

        let outcome = ledger
            .transfers
            .transfer("30000006", "D01", 5.0, "D02", "carla")
            .await
            .unwrap();
        let TransferTarget::Position(target) = outcome.target else {
            panic!("expected a position target");
        };
        let detail = ledger.catalog.position_detail(target.id).await.unwrap();
        let last = detail.last_movement.unwrap();
        assert_eq!(last.user, "carla");

        let err = ledger
            .catalog
            .position_detail(PositionId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    async fn catalog_rejects_duplicates<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        ledger.item("30000007", "Grampo Trilho").await;
        let err = ledger
            .catalog
            .create_item(NewItem::new(Sku::new("30000007").unwrap(), "Outro"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateSku(_)));

        ledger.vendor().await;
        let err = ledger
            .catalog
            .register_vendor(NewVendor::new("Outra Razao", "12345678000190").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateTaxId(_)));

        let found = ledger
            .catalog
            .find_vendor_by_tax_id(VENDOR_TAX_ID)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.legal_name, "Distribuidora Sul Ltda");
        assert_eq!(ledger.catalog.search_vendors("sul").await.unwrap().len(), 1);

        let by_description = ledger
            .catalog
            .find_by_description("grampo trilho", DescriptionMatch::Exact)
            .await
            .unwrap();
        assert!(by_description.is_some());
        assert_eq!(ledger.catalog.search_items("GRAMPO").await.unwrap().len(), 1);
        assert!(ledger.catalog.search_items("  ").await.unwrap().is_empty());

        let seeded = ledger
            .catalog
            .seed_departments(&["manutencao", "Expedicao", "MANUTENCAO"])
            .await
            .unwrap();
        assert_eq!(seeded.len(), 2);
        let names: Vec<String> = ledger
            .catalog
            .departments()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Expedicao".to_string(), "Manutencao".to_string()]);
    }

    async fn resolution_matches_embedded_token<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        let vendor = ledger.vendor().await;
        let parafuso = ledger.item("10000045", "Parafuso Sextavado M8").await;

        let document = ExtractedDocument::new(format!(
            "DISTRIBUIDORA SUL LTDA CNPJ: {VENDOR_TAX_ID}\nNF-e Nº 000.123.456"
        ))
        .with_table(invoice_table(&[["PARAFUSO 10000045 M8", "100", "0,35"]]));

        let suggestion = ledger.receiving(document.clone()).extract(b"%PDF").await.unwrap();
        assert_eq!(suggestion.vendor.as_ref().map(|v| v.id), Some(vendor.id));
        assert_eq!(suggestion.document_number, "000123456");
        assert_eq!(suggestion.message, MSG_EXTRACTED);
        assert_eq!(suggestion.lines.len(), 1);
        let line = &suggestion.lines[0];
        assert_eq!(line.item_id, parafuso.id);
        assert!(!line.newly_created);
        assert_eq!(line.document_quantity, 100.0);
        assert_eq!(line.unit_value, 0.35);
    }

    async fn resolution_is_idempotent<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        let document = ExtractedDocument::new("sem cabecalho").with_table(invoice_table(&[
            ["FITA ISOLANTE", "10", "4,50"],
            ["PARAFUSO 10000045 M8", "1.000", "0,35"],
            ["fita isolante", "2", "4,50"],
        ]));
        let workflow = ledger.receiving(document.clone());

        let first = workflow.resolve(&document).await.unwrap();
        assert_eq!(first.created_count(), 2);
        assert_eq!(first.message, "2 new item(s) registered automatically");
        assert!(first.vendor.is_none());
        assert_eq!(first.lines[0].sku.as_str(), "30000000");
        assert_eq!(first.lines[0].description, "Fita Isolante");
        assert_eq!(first.lines[1].sku.as_str(), "10000045");
        assert_eq!(first.lines[1].document_quantity, 1000.0);
        assert_eq!(first.lines[2].item_id, first.lines[0].item_id);
        assert!(!first.lines[2].newly_created);

        let second = workflow.resolve(&document).await.unwrap();
        assert_eq!(second.created_count(), 0);
        assert_eq!(second.message, MSG_EXTRACTED);
        let ids = |s: &supplyledger_receiving::DocumentSuggestion| {
            s.lines.iter().map(|l| l.item_id).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));

        assert_eq!(
            ledger.catalog.next_synthetic_sku().await.unwrap().as_str(),
            "30000001"
        );
    }

    async fn unreadable_document_is_advisory<S: LedgerStore + 'static>(store: Arc<S>) {
        struct Broken;

        #[async_trait::async_trait]
        impl DocumentExtractor for Broken {
            async fn extract(&self, _bytes: &[u8]) -> anyhow::Result<ExtractedDocument> {
                anyhow::bail!("not a pdf")
            }
        }

        let workflow = ReceivingWorkflow::new(store, Broken);
        let suggestion = workflow.extract(b"garbage").await.unwrap();
        assert!(suggestion.lines.is_empty());
        assert_eq!(suggestion.message, "could not read document: not a pdf");
    }

    async fn receipt_credits_stock_and_unit_values<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        let vendor = ledger.vendor().await;
        let luva = ledger.item("30000001", "Luva Nitrilica M").await;
        let fita = ledger.item("30000002", "Fita Crepe 48mm").await;
        ledger.stock_at("30000001", "R01", 5.0).await;

        let draft = ReceiptDraft::new(Some(vendor.id), "000123456", delivery_date(), "ana")
            .line(receipt_line(luva.id, 10.0, 2.5, "R01"))
            .line(receipt_line(fita.id, 4.0, 7.0, " R 02 "))
            .line(ReceiptLineDraft {
                verified_quantity: 0.0,
                ..receipt_line(fita.id, 3.0, 7.25, "R03")
            });
        let workflow = ledger.receiving(ExtractedDocument::default());
        let receipt = workflow.finalize(draft).await.unwrap();

        assert_eq!(receipt.document_kind, "INVOICE");
        assert_eq!(receipt.total_value, 10.0 * 2.5 + 4.0 * 7.0);
        assert!(receipt.lines.iter().all(|l| l.status == ConferenceStatus::Verified));

        assert_eq!(ledger.quantities("30000001").await, vec![("R01".to_string(), 15.0)]);
        // Nothing verified at R03, so no position there.
        assert_eq!(ledger.quantities("30000002").await, vec![("R02".to_string(), 4.0)]);

        let luva = ledger.catalog.find_by_sku("30000001").await.unwrap().unwrap();
        assert_eq!(luva.unit_value, 2.5);
        // Last line wins.
        let fita = ledger.catalog.find_by_sku("30000002").await.unwrap().unwrap();
        assert_eq!(fita.unit_value, 7.25);

        let stored = workflow.find_by_document("000123456").await.unwrap().unwrap();
        assert_eq!(stored.id, receipt.id);
        assert_eq!(stored.lines.len(), 3);
        assert_eq!(stored.lines[1].destination.as_str(), "R02");
        assert_eq!(stored.delivery_date, delivery_date());
        assert_eq!(stored.user.as_str(), "ana");
    }

    async fn failed_receipt_changes_nothing<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        let vendor = ledger.vendor().await;
        let luva = ledger.item("30000001", "Luva Nitrilica M").await;
        let fita = ledger.item("30000002", "Fita Crepe 48mm").await;

        let draft = ReceiptDraft::new(Some(vendor.id), "NF-77", delivery_date(), "ana")
            .line(receipt_line(luva.id, 10.0, 2.5, "R01"))
            .line(receipt_line(fita.id, 4.0, 7.0, "R02"))
            .line(receipt_line(ItemId::new(), 1.0, 1.0, "R03"));
        let workflow = ledger.receiving(ExtractedDocument::default());
        let err = workflow.finalize(draft).await.unwrap_err();
        match err {
            LedgerError::NotFound(msg) => assert!(msg.starts_with("line 3"), "{msg}"),
            other => panic!("expected NotFound, got {other:?}"),
        }

        assert!(ledger.quantities("30000001").await.is_empty());
        assert!(ledger.quantities("30000002").await.is_empty());
        let luva = ledger.catalog.find_by_sku("30000001").await.unwrap().unwrap();
        assert_eq!(luva.unit_value, 0.0);
        assert!(workflow.find_by_document("NF-77").await.unwrap().is_none());

        let incomplete = ReceiptDraft::new(None, "NF-78", delivery_date(), "ana")
            .line(receipt_line(luva.id, 1.0, 1.0, "R01"));
        let err = workflow.finalize(incomplete).await.unwrap_err();
        assert!(matches!(err, LedgerError::IncompleteInput(_)));
    }

    async fn provisioning_walks_past_taken_skus<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        let top = ledger.item("39999999", "Caixa Papelao P").await;
        let rolled_over = ledger.item("40000000", "Caixa Papelao M").await;

        let created = ledger
            .store
            .provision_items(vec![NewItem::new(Sku::new("39999999").unwrap(), "Caixa Papelao G")])
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].sku.as_str(), "40000001");
        assert_eq!(created[0].category, DEFAULT_CATEGORY);

        let catalog = &ledger.catalog;
        assert_eq!(catalog.find_by_sku("39999999").await.unwrap().unwrap().id, top.id);
        assert_eq!(
            catalog.find_by_sku("40000000").await.unwrap().unwrap().id,
            rolled_over.id
        );
        let stored = catalog.find_by_sku("40000001").await.unwrap().unwrap();
        assert_eq!(stored.id, created[0].id);
        assert_eq!(stored.category, "Geral");

        assert_eq!(ledger.catalog.next_synthetic_sku().await.unwrap().as_str(), "40000002");
    }

    async fn vendor_search_honors_limit<S: LedgerStore + 'static>(store: Arc<S>) {
        let ledger = Ledger::new(store);
        ledger.vendor().await;
        ledger
            .catalog
            .register_vendor(NewVendor::new("Distribuidora Norte Ltda", "98.765.432/0001-10").unwrap())
            .await
            .unwrap();

        assert!(ledger.store.search_vendors("distribuidora", 0).await.unwrap().is_empty());
        let first = ledger.store.search_vendors("distribuidora", 1).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].legal_name, "Distribuidora Norte Ltda");
        assert_eq!(ledger.store.search_vendors("distribuidora", 10).await.unwrap().len(), 2);
    }

    macro_rules! on_both_stores {
        ($($scenario:ident),* $(,)?) => {
            mod in_memory {
                $(
                    #[tokio::test]
                    async fn $scenario() {
                        super::$scenario(super::memory_store()).await;
                    }
                )*
            }

            mod sqlite {
                $(
                    #[tokio::test]
                    async fn $scenario() {
                        super::$scenario(super::sqlite_store().await).await;
                    }
                )*
            }
        };
    }

    on_both_stores!(
        partial_transfer_then_department_out,
        rejected_transfers_change_nothing,
        movement_ledger_validates_references,
        adjustment_overwrites_and_logs,
        position_labels_are_normalized,
        stock_view_reports_status,
        position_detail_shows_last_movement,
        catalog_rejects_duplicates,
        resolution_matches_embedded_token,
        resolution_is_idempotent,
        unreadable_document_is_advisory,
        receipt_credits_stock_and_unit_values,
        failed_receipt_changes_nothing,
        provisioning_walks_past_taken_skus,
        vendor_search_honors_limit,
    );

    fn temp_database() -> (std::path::PathBuf, String) {
        let path = std::env::temp_dir().join(format!("supplyledger-{}.db", ItemId::new()));
        let url = format!("sqlite://{}", path.display());
        (path, url)
    }

    #[tokio::test]
    async fn sqlite_store_survives_reconnect() {
        supplyledger_observability::init_for_tests();
        let (path, url) = temp_database();
        {
            let store = Arc::new(
                SqliteLedgerStore::connect(&url, SkuPolicy::default())
                    .await
                    .unwrap(),
            );
            let ledger = Ledger::new(store.clone());
            ledger.item("30000001", "Luva Nitrilica M").await;
            ledger.stock_at("30000001", "A01", 3.0).await;
            store.pool().close().await;
        }
        let store = Arc::new(
            SqliteLedgerStore::connect(&url, SkuPolicy::default())
                .await
                .unwrap(),
        );
        let ledger = Ledger::new(store.clone());
        assert_eq!(ledger.quantities("30000001").await, vec![("A01".to_string(), 3.0)]);
        store.pool().close().await;
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transfers_queue_on_file_database() {
        supplyledger_observability::init_for_tests();
        let (path, url) = temp_database();
        let store = Arc::new(
            SqliteLedgerStore::connect(&url, SkuPolicy::default())
                .await
                .unwrap(),
        );
        let ledger = Arc::new(Ledger::new(store.clone()));
        ledger.item("30000001", "Luva Nitrilica M").await;
        ledger.stock_at("30000001", "A01", 10.0).await;

        let tasks: Vec<_> = (0..8)
            .map(|n| {
                let ledger = ledger.clone();
                let destination = if n % 2 == 0 { "A02" } else { "SETOR-Picking" };
                tokio::spawn(async move {
                    ledger
                        .transfers
                        .transfer("30000001", "A01", 3.0, destination, "maria")
                        .await
                })
            })
            .collect();

        let mut succeeded = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(LedgerError::InsufficientQuantity { requested, .. }) => {
                    assert_eq!(requested, 3.0)
                }
                // Once A01 drains, later transfers find no origin.
                Err(LedgerError::NotFound(_)) => {}
                Err(other) => panic!("transfer should queue, got {other:?}"),
            }
        }
        assert_eq!(succeeded, 3);

        let history = ledger.movements.history().await.unwrap();
        assert_eq!(history.len(), 3);
        let sent_out: f64 = history
            .iter()
            .filter(|m| m.kind == MovementKind::Out)
            .map(|m| m.quantity)
            .sum();
        let on_hand: f64 = ledger.quantities("30000001").await.iter().map(|(_, q)| q).sum();
        assert_eq!(on_hand + sent_out, 10.0);
        assert_eq!(
            ledger
                .quantities("30000001")
                .await
                .iter()
                .find(|(label, _)| label == "A01")
                .map(|(_, q)| *q),
            Some(1.0)
        );

        store.pool().close().await;
        let _ = std::fs::remove_file(path);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        const LABELS: [&str; 3] = ["A01", "A02", "A03"];

        fn total(ledger_quantities: &[(String, f64)]) -> f64 {
            ledger_quantities.iter().map(|(_, q)| q).sum()
        }

        type Steps = Vec<(usize, usize, u32)>;

        async fn run_transfers<S: LedgerStore + 'static>(
            store: Arc<S>,
            steps: Steps,
        ) -> Result<(), TestCaseError> {
            let ledger = Ledger::new(store);
            ledger.item("30000001", "Luva Nitrilica M").await;
            ledger.stock_at("30000001", "A01", 30.0).await;
            ledger.stock_at("30000001", "A02", 20.0).await;

            let mut sent_out = 0.0;
            for (from, to, quantity) in steps {
                let destination = LABELS.get(to).copied().unwrap_or("SETOR-Picking");
                let before = ledger.quantities("30000001").await;
                let result = ledger
                    .transfers
                    .transfer("30000001", LABELS[from], f64::from(quantity), destination, "prop")
                    .await;
                match result {
                    Ok(outcome) => {
                        if outcome.movement.kind == MovementKind::Out {
                            sent_out += outcome.movement.quantity;
                        }
                    }
                    Err(_) => {
                        prop_assert_eq!(ledger.quantities("30000001").await, before);
                    }
                }
                let on_hand = ledger.quantities("30000001").await;
                prop_assert!(on_hand.iter().all(|(_, q)| *q > 0.0));
                prop_assert_eq!(total(&on_hand) + sent_out, 50.0);
            }
            Ok(())
        }

        fn runtime() -> tokio::runtime::Runtime {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
        }

        fn steps() -> impl Strategy<Value = Steps> {
            proptest::collection::vec((0usize..3, 0usize..4, 1u32..15), 1..25)
        }

        proptest! {
            #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

            /// Stock on hand plus everything sent out always equals what was put in.
            #[test]
            fn transfers_conserve_quantity(steps in steps()) {
                runtime().block_on(run_transfers(memory_store(), steps))?;
            }

            #[test]
            fn sqlite_transfers_conserve_quantity(steps in steps()) {
                let runtime = runtime();
                let store = runtime.block_on(sqlite_store());
                runtime.block_on(run_transfers(store, steps))?;
            }
        }
    }
}
