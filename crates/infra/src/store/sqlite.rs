//! SQLite-backed ledger store.
//!
//! Ids and timestamps are stored as TEXT (UUID strings, RFC 3339). Logs are
//! ordered by `rowid`, which follows insertion order.
//!
//! Inside a transaction every query goes through the transaction's connection,
//! never the pool: the in-memory database runs on a single connection.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::instrument;

use supplyledger_core::{
    Actor, AdjustmentId, ItemId, LedgerError, LedgerResult, MovementId, PositionId, VendorId,
};
use supplyledger_inventory::{
    Adjustment, AdjustmentRequest, ConferenceStatus, Department, DescriptionMatch, Destination,
    Item, LastMovement, Movement, MovementKind, NewItem, NewMovement, Position, PositionDetail,
    PositionLabel, QuantityChange, Receipt, ReceiptLine, ReceiptPlan, Sku, SkuPolicy,
    StockFilter, StockLine, TransferOutcome, TransferPlan, TransferRequest, TransferTarget,
    description_key, department_key,
};
use supplyledger_receiving::{CatalogAccess, LookupKey, NewVendor, TaxId, Vendor};

use super::LedgerStore;
use crate::config::LedgerConfig;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id              TEXT PRIMARY KEY,
        sku             TEXT NOT NULL UNIQUE,
        description     TEXT NOT NULL,
        description_key TEXT NOT NULL,
        category        TEXT NOT NULL DEFAULT 'Geral',
        unit            TEXT NOT NULL,
        unit_value      REAL NOT NULL DEFAULT 0,
        minimum_stock   INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_items_description_key ON items (description_key)",
    r#"
    CREATE TABLE IF NOT EXISTS positions (
        id       TEXT PRIMARY KEY,
        item_id  TEXT NOT NULL REFERENCES items (id),
        label    TEXT NOT NULL,
        quantity REAL NOT NULL CHECK (quantity >= 0),
        UNIQUE (item_id, label)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS departments (
        id       TEXT PRIMARY KEY,
        name     TEXT NOT NULL,
        name_key TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vendors (
        id         TEXT PRIMARY KEY,
        legal_name TEXT NOT NULL,
        trade_name TEXT NULL,
        tax_id     TEXT NOT NULL UNIQUE,
        active     INTEGER NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS movements (
        id                TEXT PRIMARY KEY,
        item_id           TEXT NOT NULL REFERENCES items (id),
        department_id     TEXT NULL REFERENCES departments (id),
        kind              TEXT NOT NULL,
        quantity          REAL NOT NULL CHECK (quantity > 0),
        origin_label      TEXT NOT NULL,
        destination_label TEXT NOT NULL,
        occurred_at       TEXT NOT NULL,
        user_name         TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS receipts (
        id              TEXT PRIMARY KEY,
        vendor_id       TEXT NOT NULL REFERENCES vendors (id),
        document_kind   TEXT NOT NULL,
        document_number TEXT NOT NULL,
        delivery_date   TEXT NOT NULL,
        total_value     REAL NOT NULL,
        user_name       TEXT NOT NULL,
        created_at      TEXT NOT NULL,
        note            TEXT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_receipts_document_number ON receipts (document_number)",
    r#"
    CREATE TABLE IF NOT EXISTS receipt_lines (
        id                TEXT PRIMARY KEY,
        receipt_id        TEXT NOT NULL REFERENCES receipts (id),
        line_no           INTEGER NOT NULL,
        item_id           TEXT NOT NULL REFERENCES items (id),
        document_quantity REAL NOT NULL,
        verified_quantity REAL NOT NULL,
        unit_value        REAL NOT NULL,
        destination       TEXT NOT NULL,
        status            TEXT NOT NULL
    )
    "#,
    // No foreign key on position_id: the trail outlives deleted positions.
    r#"
    CREATE TABLE IF NOT EXISTS adjustments (
        id              TEXT PRIMARY KEY,
        position_id     TEXT NOT NULL,
        item_id         TEXT NOT NULL REFERENCES items (id),
        label           TEXT NOT NULL,
        quantity_before REAL NOT NULL,
        quantity_after  REAL NOT NULL,
        difference      REAL NOT NULL,
        occurred_at     TEXT NOT NULL,
        user_name       TEXT NOT NULL,
        note            TEXT NOT NULL
    )
    "#,
];

const ITEM_COLUMNS: &str = "id, sku, description, category, unit, unit_value, minimum_stock";

/// How long a writer waits for the write lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const POSITION_COLUMNS: &str = "id, item_id, label, quantity";
const MOVEMENT_COLUMNS: &str = "id, item_id, department_id, kind, quantity, origin_label, destination_label, occurred_at, user_name";
const VENDOR_COLUMNS: &str = "id, legal_name, trade_name, tax_id, active";

/// SQLite ledger store.
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
    policy: SkuPolicy,
}

impl SqliteLedgerStore {
    /// Open (creating if missing) the database at `database_url` and migrate it.
    pub async fn connect(database_url: &str, policy: SkuPolicy) -> LedgerResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| map_sqlx_error("parse_database_url", e))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Self::with_pool(pool, policy).await
    }

    pub async fn from_config(config: &LedgerConfig) -> LedgerResult<Self> {
        Self::connect(&config.database_url, config.sku_policy()).await
    }

    /// Private in-memory database on a single long-lived connection.
    pub async fn in_memory(policy: SkuPolicy) -> LedgerResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| map_sqlx_error("parse_database_url", e))?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Self::with_pool(pool, policy).await
    }

    pub async fn with_pool(pool: SqlitePool, policy: SkuPolicy) -> LedgerResult<Self> {
        let store = Self { pool, policy };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> LedgerResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    async fn conn(&self) -> LedgerResult<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))
    }

    /// Write transaction holding the database write lock from its first read.
    /// Concurrent writers queue on the busy timeout.
    async fn begin(&self) -> LedgerResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

async fn commit(tx: Transaction<'static, Sqlite>) -> LedgerResult<()> {
    tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn col<'r, T>(row: &'r SqliteRow, name: &str) -> LedgerResult<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| map_sqlx_error("decode_row", e))
}

fn parse_id<T>(raw: &str) -> LedgerResult<T>
where
    T: FromStr<Err = LedgerError>,
{
    raw.parse()
        .map_err(|e: LedgerError| LedgerError::persistence(format!("stored {e}")))
}

fn parse_time(raw: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LedgerError::persistence(format!("stored timestamp {raw:?}: {e}")))
}

fn parse_date(raw: &str) -> LedgerResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| LedgerError::persistence(format!("stored date {raw:?}: {e}")))
}

fn item_from_row(row: &SqliteRow) -> LedgerResult<Item> {
    Ok(Item {
        id: parse_id(&col::<String>(row, "id")?)?,
        sku: Sku::new(col::<String>(row, "sku")?)?,
        description: col(row, "description")?,
        category: col(row, "category")?,
        unit: col(row, "unit")?,
        unit_value: col(row, "unit_value")?,
        minimum_stock: col(row, "minimum_stock")?,
    })
}

fn position_from_row(row: &SqliteRow) -> LedgerResult<Position> {
    Ok(Position {
        id: parse_id(&col::<String>(row, "id")?)?,
        item_id: parse_id(&col::<String>(row, "item_id")?)?,
        label: PositionLabel::new(col::<String>(row, "label")?)?,
        quantity: col(row, "quantity")?,
    })
}

fn department_from_row(row: &SqliteRow) -> LedgerResult<Department> {
    Ok(Department {
        id: parse_id(&col::<String>(row, "id")?)?,
        name: col(row, "name")?,
    })
}

fn vendor_from_row(row: &SqliteRow) -> LedgerResult<Vendor> {
    Ok(Vendor {
        id: parse_id(&col::<String>(row, "id")?)?,
        legal_name: col(row, "legal_name")?,
        trade_name: col(row, "trade_name")?,
        tax_id: TaxId::new(col::<String>(row, "tax_id")?)?,
        active: col(row, "active")?,
    })
}

fn movement_from_row(row: &SqliteRow) -> LedgerResult<Movement> {
    let department_id = col::<Option<String>>(row, "department_id")?
        .map(|raw| parse_id(&raw))
        .transpose()?;
    Ok(Movement {
        id: parse_id(&col::<String>(row, "id")?)?,
        item_id: parse_id(&col::<String>(row, "item_id")?)?,
        department_id,
        kind: col::<String>(row, "kind")?.parse::<MovementKind>()?,
        quantity: col(row, "quantity")?,
        origin_label: col(row, "origin_label")?,
        destination_label: col(row, "destination_label")?,
        occurred_at: parse_time(&col::<String>(row, "occurred_at")?)?,
        user: Actor::new(col::<String>(row, "user_name")?)?,
    })
}

fn adjustment_from_row(row: &SqliteRow) -> LedgerResult<Adjustment> {
    Ok(Adjustment {
        id: parse_id(&col::<String>(row, "id")?)?,
        position_id: parse_id(&col::<String>(row, "position_id")?)?,
        item_id: parse_id(&col::<String>(row, "item_id")?)?,
        label: col(row, "label")?,
        quantity_before: col(row, "quantity_before")?,
        quantity_after: col(row, "quantity_after")?,
        difference: col(row, "difference")?,
        occurred_at: parse_time(&col::<String>(row, "occurred_at")?)?,
        user: Actor::new(col::<String>(row, "user_name")?)?,
        note: col(row, "note")?,
    })
}

fn receipt_line_from_row(row: &SqliteRow) -> LedgerResult<ReceiptLine> {
    Ok(ReceiptLine {
        id: parse_id(&col::<String>(row, "id")?)?,
        item_id: parse_id(&col::<String>(row, "item_id")?)?,
        document_quantity: col(row, "document_quantity")?,
        verified_quantity: col(row, "verified_quantity")?,
        unit_value: col(row, "unit_value")?,
        destination: PositionLabel::new(col::<String>(row, "destination")?)?,
        status: col::<String>(row, "status")?.parse::<ConferenceStatus>()?,
    })
}

// ---------------------------------------------------------------------------
// Queries shared by pooled reads and transactions
// ---------------------------------------------------------------------------

async fn fetch_item(conn: &mut SqliteConnection, id: ItemId) -> LedgerResult<Option<Item>> {
    let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_item", e))?;
    row.as_ref().map(item_from_row).transpose()
}

async fn fetch_item_by_sku(conn: &mut SqliteConnection, sku: &str) -> LedgerResult<Option<Item>> {
    let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE sku = ?1"))
        .bind(sku.trim())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_item_by_sku", e))?;
    row.as_ref().map(item_from_row).transpose()
}

async fn fetch_item_by_description(
    conn: &mut SqliteConnection,
    text: &str,
    mode: DescriptionMatch,
) -> LedgerResult<Option<Item>> {
    let filter = match mode {
        DescriptionMatch::Exact => "description_key = ?1",
        DescriptionMatch::Contains => "instr(description_key, ?1) > 0",
    };
    let row = sqlx::query(&format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE {filter} ORDER BY sku LIMIT 1"
    ))
    .bind(description_key(text))
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_item_by_description", e))?;
    row.as_ref().map(item_from_row).transpose()
}

async fn require_item(conn: &mut SqliteConnection, id: ItemId) -> LedgerResult<Item> {
    fetch_item(conn, id)
        .await?
        .ok_or_else(|| LedgerError::not_found(format!("item {id}")))
}

async fn next_synthetic(conn: &mut SqliteConnection, policy: SkuPolicy) -> LedgerResult<Sku> {
    let rows = sqlx::query("SELECT sku FROM items WHERE substr(sku, 1, 1) = ?1")
        .bind(policy.prefix.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("next_synthetic_sku", e))?;
    let skus = rows
        .iter()
        .map(|row| col::<String>(row, "sku"))
        .collect::<LedgerResult<Vec<_>>>()?;
    let mut sku = policy.next_synthetic(skus.iter().map(String::as_str))?;
    while fetch_item_by_sku(conn, sku.as_str()).await?.is_some() {
        sku = sku.successor()?;
    }
    Ok(sku)
}

async fn insert_item(conn: &mut SqliteConnection, item: &Item) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO items (id, sku, description, description_key, category, unit, unit_value,
                           minimum_stock)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(item.id.to_string())
    .bind(item.sku.as_str())
    .bind(&item.description)
    .bind(item.description_key())
    .bind(&item.category)
    .bind(&item.unit)
    .bind(item.unit_value)
    .bind(item.minimum_stock)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_position(conn: &mut SqliteConnection, id: PositionId) -> LedgerResult<Option<Position>> {
    let row = sqlx::query(&format!("SELECT {POSITION_COLUMNS} FROM positions WHERE id = ?1"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_position", e))?;
    row.as_ref().map(position_from_row).transpose()
}

async fn fetch_position_at(
    conn: &mut SqliteConnection,
    item_id: ItemId,
    label: &PositionLabel,
) -> LedgerResult<Option<Position>> {
    let row = sqlx::query(&format!(
        "SELECT {POSITION_COLUMNS} FROM positions WHERE item_id = ?1 AND label = ?2"
    ))
    .bind(item_id.to_string())
    .bind(label.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_position_at", e))?;
    row.as_ref().map(position_from_row).transpose()
}

/// Apply `change` to the (item, label) position of an existing item.
async fn apply_change(
    conn: &mut SqliteConnection,
    item_id: ItemId,
    label: &PositionLabel,
    change: QuantityChange,
) -> LedgerResult<Option<Position>> {
    if let QuantityChange::Delta(delta) = change {
        if delta > 0.0 {
            // Credit in one statement: create at `delta` or add to the row.
            sqlx::query(
                r#"
                INSERT INTO positions (id, item_id, label, quantity)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT (item_id, label)
                DO UPDATE SET quantity = positions.quantity + excluded.quantity
                "#,
            )
            .bind(PositionId::new().to_string())
            .bind(item_id.to_string())
            .bind(label.as_str())
            .bind(delta)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("credit_position", e))?;
            return fetch_position_at(conn, item_id, label).await;
        }
    }

    let current = fetch_position_at(conn, item_id, label).await?;
    let next = change.apply(current.as_ref().map_or(0.0, |p| p.quantity));
    match current {
        Some(position) if next <= 0.0 => {
            sqlx::query("DELETE FROM positions WHERE id = ?1")
                .bind(position.id.to_string())
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("delete_position", e))?;
            Ok(None)
        }
        None if next <= 0.0 => Ok(None),
        Some(mut position) => {
            sqlx::query("UPDATE positions SET quantity = ?1 WHERE id = ?2")
                .bind(next)
                .bind(position.id.to_string())
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("update_position", e))?;
            position.quantity = next;
            Ok(Some(position))
        }
        None => {
            let position = Position::new(item_id, label.clone(), next);
            sqlx::query("INSERT INTO positions (id, item_id, label, quantity) VALUES (?1, ?2, ?3, ?4)")
                .bind(position.id.to_string())
                .bind(item_id.to_string())
                .bind(label.as_str())
                .bind(next)
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("insert_position", e))?;
            Ok(Some(position))
        }
    }
}

async fn fetch_department_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> LedgerResult<Option<Department>> {
    let row = sqlx::query("SELECT id, name FROM departments WHERE name_key = ?1")
        .bind(department_key(name))
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_department", e))?;
    row.as_ref().map(department_from_row).transpose()
}

async fn ensure_department_in(
    conn: &mut SqliteConnection,
    name: &str,
) -> LedgerResult<(Department, bool)> {
    if let Some(existing) = fetch_department_by_name(conn, name).await? {
        return Ok((existing, false));
    }
    let department = Department::named(name)?;
    sqlx::query("INSERT INTO departments (id, name, name_key) VALUES (?1, ?2, ?3)")
        .bind(department.id.to_string())
        .bind(&department.name)
        .bind(department.name_key())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_department", e))?;
    Ok((department, true))
}

async fn insert_movement(conn: &mut SqliteConnection, movement: &Movement) -> LedgerResult<()> {
    sqlx::query(&format!(
        "INSERT INTO movements ({MOVEMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
    ))
    .bind(movement.id.to_string())
    .bind(movement.item_id.to_string())
    .bind(movement.department_id.map(|d| d.to_string()))
    .bind(movement.kind.as_str())
    .bind(movement.quantity)
    .bind(&movement.origin_label)
    .bind(&movement.destination_label)
    .bind(movement.occurred_at.to_rfc3339())
    .bind(movement.user.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;
    Ok(())
}

async fn fetch_vendor(conn: &mut SqliteConnection, id: VendorId) -> LedgerResult<Option<Vendor>> {
    let row = sqlx::query(&format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = ?1"))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_vendor", e))?;
    row.as_ref().map(vendor_from_row).transpose()
}

#[async_trait::async_trait]
impl CatalogAccess for SqliteLedgerStore {
    async fn lookup(&self, key: &LookupKey) -> LedgerResult<Option<Item>> {
        let mut conn = self.conn().await?;
        match key {
            LookupKey::Sku(sku) => fetch_item_by_sku(&mut conn, sku).await,
            LookupKey::Description(text) => {
                fetch_item_by_description(&mut conn, text, DescriptionMatch::Exact).await
            }
        }
    }

    async fn next_synthetic_sku(&self) -> LedgerResult<Sku> {
        let mut conn = self.conn().await?;
        next_synthetic(&mut conn, self.policy).await
    }

    #[instrument(skip(self, items), fields(count = items.len()), err)]
    async fn provision_items(&self, items: Vec<NewItem>) -> LedgerResult<Vec<Item>> {
        for new in &items {
            new.validate()?;
        }
        let mut tx = self.begin().await?;
        let mut created = Vec::with_capacity(items.len());
        for new in items {
            let new = if fetch_item_by_sku(&mut tx, new.sku.as_str()).await?.is_some() {
                let replacement = next_synthetic(&mut tx, self.policy).await?;
                tracing::warn!(taken = %new.sku, %replacement, "planned sku taken; using synthetic");
                new.with_sku(replacement)
            } else {
                new
            };
            let item = Item::from_new(ItemId::new(), new);
            insert_item(&mut tx, &item)
                .await
                .map_err(|e| map_sqlx_error("provision_item", e))?;
            created.push(item);
        }
        commit(tx).await?;
        Ok(created)
    }

    async fn find_vendor_by_tax_id(&self, tax_id: &TaxId) -> LedgerResult<Option<Vendor>> {
        let mut conn = self.conn().await?;
        let row = sqlx::query(&format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE tax_id = ?1"))
            .bind(tax_id.as_str())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("find_vendor_by_tax_id", e))?;
        row.as_ref().map(vendor_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl LedgerStore for SqliteLedgerStore {
    fn sku_policy(&self) -> SkuPolicy {
        self.policy
    }

    async fn find_item(&self, id: ItemId) -> LedgerResult<Option<Item>> {
        let mut conn = self.conn().await?;
        fetch_item(&mut conn, id).await
    }

    async fn find_item_by_sku(&self, sku: &Sku) -> LedgerResult<Option<Item>> {
        let mut conn = self.conn().await?;
        fetch_item_by_sku(&mut conn, sku.as_str()).await
    }

    async fn find_item_by_description(
        &self,
        text: &str,
        mode: DescriptionMatch,
    ) -> LedgerResult<Option<Item>> {
        let mut conn = self.conn().await?;
        fetch_item_by_description(&mut conn, text, mode).await
    }

    async fn search_items(&self, term: &str, limit: usize) -> LedgerResult<Vec<Item>> {
        let term = term.trim().to_lowercase();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM items
            WHERE instr(description_key, ?1) > 0 OR instr(lower(sku), ?1) > 0
            ORDER BY description, sku
            LIMIT ?2
            "#
        ))
        .bind(&term)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("search_items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self, new), fields(sku = %new.sku), err)]
    async fn create_item(&self, new: NewItem) -> LedgerResult<Item> {
        new.validate()?;
        let item = Item::from_new(ItemId::new(), new);
        let mut conn = self.conn().await?;
        insert_item(&mut conn, &item).await.map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::duplicate_sku(item.sku.as_str())
            } else {
                map_sqlx_error("create_item", e)
            }
        })?;
        Ok(item)
    }

    #[instrument(skip(self), fields(sku = %sku), err)]
    async fn set_minimum_stock(&self, sku: &Sku, minimum: i64) -> LedgerResult<Item> {
        if minimum < 0 {
            return Err(LedgerError::invalid_quantity("minimum stock cannot be negative"));
        }
        let mut conn = self.conn().await?;
        let result = sqlx::query("UPDATE items SET minimum_stock = ?1 WHERE sku = ?2")
            .bind(minimum)
            .bind(sku.as_str())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("set_minimum_stock", e))?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found(format!("item with sku {sku}")));
        }
        fetch_item_by_sku(&mut conn, sku.as_str())
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("item with sku {sku}")))
    }

    #[instrument(skip(self), fields(item_id = %item_id, label = %label), err)]
    async fn upsert_position(
        &self,
        item_id: ItemId,
        label: &PositionLabel,
        change: QuantityChange,
    ) -> LedgerResult<Option<Position>> {
        change.validate()?;
        let mut tx = self.begin().await?;
        require_item(&mut tx, item_id).await?;
        let position = apply_change(&mut tx, item_id, label, change).await?;
        commit(tx).await?;
        Ok(position)
    }

    async fn find_position(&self, id: PositionId) -> LedgerResult<Option<Position>> {
        let mut conn = self.conn().await?;
        fetch_position(&mut conn, id).await
    }

    async fn positions_for_item(&self, item_id: ItemId) -> LedgerResult<Vec<Position>> {
        let rows = sqlx::query(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions WHERE item_id = ?1 ORDER BY label"
        ))
        .bind(item_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("positions_for_item", e))?;
        rows.iter().map(position_from_row).collect()
    }

    async fn stock(&self, filter: &StockFilter) -> LedgerResult<Vec<StockLine>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.item_id, p.label, p.quantity,
                   i.sku, i.description, i.category, i.unit, i.unit_value, i.minimum_stock
            FROM positions p
            JOIN items i ON i.id = p.item_id
            ORDER BY i.description, p.label
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock", e))?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in &rows {
            let position = position_from_row(row)?;
            let item = Item {
                id: position.item_id,
                sku: Sku::new(col::<String>(row, "sku")?)?,
                description: col(row, "description")?,
                category: col(row, "category")?,
                unit: col(row, "unit")?,
                unit_value: col(row, "unit_value")?,
                minimum_stock: col(row, "minimum_stock")?,
            };
            let line = StockLine::join(&position, &item);
            if filter.matches(&line) {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    async fn position_detail(&self, id: PositionId) -> LedgerResult<Option<PositionDetail>> {
        let mut conn = self.conn().await?;
        let Some(position) = fetch_position(&mut conn, id).await? else {
            return Ok(None);
        };
        let item = require_item(&mut conn, position.item_id).await?;
        let row = sqlx::query(
            r#"
            SELECT occurred_at, user_name FROM movements
            WHERE item_id = ?1 AND (origin_label = ?2 OR destination_label = ?2)
            ORDER BY rowid DESC
            LIMIT 1
            "#,
        )
        .bind(position.item_id.to_string())
        .bind(position.label.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("last_movement", e))?;
        let last_movement = match row {
            Some(row) => Some(LastMovement {
                occurred_at: parse_time(&col::<String>(&row, "occurred_at")?)?,
                user: col(&row, "user_name")?,
            }),
            None => None,
        };
        Ok(Some(PositionDetail {
            line: StockLine::join(&position, &item),
            last_movement,
        }))
    }

    async fn departments(&self) -> LedgerResult<Vec<Department>> {
        let rows = sqlx::query("SELECT id, name FROM departments ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("departments", e))?;
        rows.iter().map(department_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn ensure_department(&self, name: &str) -> LedgerResult<(Department, bool)> {
        let mut tx = self.begin().await?;
        let resolved = ensure_department_in(&mut tx, name).await?;
        commit(tx).await?;
        Ok(resolved)
    }

    #[instrument(skip(self, new), fields(tax_id = %new.tax_id), err)]
    async fn register_vendor(&self, new: NewVendor) -> LedgerResult<Vendor> {
        let vendor = Vendor::from_new(VendorId::new(), new);
        sqlx::query(&format!(
            "INSERT INTO vendors ({VENDOR_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"
        ))
        .bind(vendor.id.to_string())
        .bind(&vendor.legal_name)
        .bind(vendor.trade_name.as_deref())
        .bind(vendor.tax_id.as_str())
        .bind(vendor.active)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::duplicate_tax_id(vendor.tax_id.as_str())
            } else {
                map_sqlx_error("register_vendor", e)
            }
        })?;
        Ok(vendor)
    }

    async fn search_vendors(&self, term: &str, limit: usize) -> LedgerResult<Vec<Vendor>> {
        let rows = sqlx::query(&format!(
            "SELECT {VENDOR_COLUMNS} FROM vendors WHERE active = 1 ORDER BY legal_name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("search_vendors", e))?;
        let mut vendors = Vec::new();
        for row in &rows {
            let vendor = vendor_from_row(row)?;
            if vendors.len() == limit {
                break;
            }
            if vendor.matches(term) {
                vendors.push(vendor);
            }
        }
        Ok(vendors)
    }

    #[instrument(skip(self, new), fields(item_id = %new.item_id, kind = new.kind.as_str()), err)]
    async fn record_movement(&self, new: NewMovement) -> LedgerResult<Movement> {
        new.validate()?;
        let mut tx = self.begin().await?;
        require_item(&mut tx, new.item_id).await?;
        if let Some(department_id) = new.department_id {
            let exists = sqlx::query("SELECT 1 FROM departments WHERE id = ?1")
                .bind(department_id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("fetch_department", e))?
                .is_some();
            if !exists {
                return Err(LedgerError::not_found(format!("department {department_id}")));
            }
        }
        let movement = new.into_movement(MovementId::new(), Utc::now());
        insert_movement(&mut tx, &movement).await?;
        commit(tx).await?;
        Ok(movement)
    }

    async fn movements(&self, limit: usize) -> LedgerResult<Vec<Movement>> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements ORDER BY rowid DESC LIMIT ?1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("movements", e))?;
        rows.iter().map(movement_from_row).collect()
    }

    async fn adjustments(&self, limit: usize) -> LedgerResult<Vec<Adjustment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, position_id, item_id, label, quantity_before, quantity_after,
                   difference, occurred_at, user_name, note
            FROM adjustments
            ORDER BY rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("adjustments", e))?;
        rows.iter().map(adjustment_from_row).collect()
    }

    async fn find_receipt_by_document(&self, number: &str) -> LedgerResult<Option<Receipt>> {
        let mut conn = self.conn().await?;
        let Some(row) = sqlx::query(
            r#"
            SELECT id, vendor_id, document_kind, document_number, delivery_date,
                   total_value, user_name, created_at, note
            FROM receipts
            WHERE document_number = ?1
            ORDER BY rowid DESC
            LIMIT 1
            "#,
        )
        .bind(number.trim())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("find_receipt", e))?
        else {
            return Ok(None);
        };

        let id: String = col(&row, "id")?;
        let line_rows = sqlx::query(
            r#"
            SELECT id, item_id, document_quantity, verified_quantity, unit_value,
                   destination, status
            FROM receipt_lines
            WHERE receipt_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(&id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("find_receipt_lines", e))?;
        let lines = line_rows
            .iter()
            .map(receipt_line_from_row)
            .collect::<LedgerResult<Vec<_>>>()?;

        Ok(Some(Receipt {
            id: parse_id(&id)?,
            vendor_id: parse_id(&col::<String>(&row, "vendor_id")?)?,
            document_kind: col(&row, "document_kind")?,
            document_number: col(&row, "document_number")?,
            delivery_date: parse_date(&col::<String>(&row, "delivery_date")?)?,
            total_value: col(&row, "total_value")?,
            user: Actor::new(col::<String>(&row, "user_name")?)?,
            created_at: parse_time(&col::<String>(&row, "created_at")?)?,
            note: col(&row, "note")?,
            lines,
        }))
    }

    #[instrument(
        skip(self, request),
        fields(
            sku = %request.sku,
            origin = %request.origin,
            destination = %request.destination_label,
            quantity = request.quantity
        ),
        err
    )]
    async fn execute_transfer(&self, request: &TransferRequest) -> LedgerResult<TransferOutcome> {
        let mut tx = self.begin().await?;

        let item = fetch_item_by_sku(&mut tx, request.sku.as_str())
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("item with sku {}", request.sku)))?;
        let origin = fetch_position_at(&mut tx, item.id, &request.origin)
            .await?
            .ok_or_else(|| {
                LedgerError::not_found(format!(
                    "position {} for sku {}",
                    request.origin, request.sku
                ))
            })?;
        let plan = TransferPlan::decide(&origin, request)?;

        // Check and debit in one statement.
        let debited = sqlx::query(
            "UPDATE positions SET quantity = quantity - ?1 WHERE id = ?2 AND quantity >= ?1",
        )
        .bind(plan.quantity)
        .bind(origin.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("debit_origin", e))?;
        if debited.rows_affected() == 0 {
            return Err(LedgerError::insufficient(plan.quantity, origin.quantity));
        }
        sqlx::query("DELETE FROM positions WHERE id = ?1 AND quantity <= 0")
            .bind(origin.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("drain_origin", e))?;
        let origin_after = fetch_position(&mut tx, origin.id).await?;

        let (target, department_id) = match &request.destination {
            Destination::ToDepartment(name) => {
                let (department, created) = ensure_department_in(&mut tx, name).await?;
                let id = department.id;
                (TransferTarget::Department { department, created }, Some(id))
            }
            Destination::ToPosition(label) => {
                let credited =
                    apply_change(&mut tx, item.id, label, QuantityChange::Delta(plan.quantity))
                        .await?
                        .ok_or_else(|| {
                            LedgerError::persistence("destination position not credited")
                        })?;
                (TransferTarget::Position(credited), None)
            }
        };

        let movement = NewMovement {
            item_id: item.id,
            department_id,
            kind: request.destination.kind(),
            quantity: plan.quantity,
            origin_label: request.origin.as_str().to_string(),
            destination_label: request.destination_label.clone(),
            user: request.user.clone(),
        }
        .into_movement(MovementId::new(), Utc::now());
        insert_movement(&mut tx, &movement).await?;

        commit(tx).await?;
        Ok(TransferOutcome {
            movement,
            origin: origin_after,
            target,
        })
    }

    #[instrument(
        skip(self, plan),
        fields(
            document_number = %plan.receipt.document_number,
            lines = plan.receipt.lines.len()
        ),
        err
    )]
    async fn execute_receipt(&self, plan: ReceiptPlan) -> LedgerResult<Receipt> {
        let receipt = &plan.receipt;
        let mut tx = self.begin().await?;

        if fetch_vendor(&mut tx, receipt.vendor_id).await?.is_none() {
            return Err(LedgerError::not_found(format!("vendor {}", receipt.vendor_id)));
        }

        sqlx::query(
            r#"
            INSERT INTO receipts (id, vendor_id, document_kind, document_number, delivery_date,
                                  total_value, user_name, created_at, note)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(receipt.id.to_string())
        .bind(receipt.vendor_id.to_string())
        .bind(&receipt.document_kind)
        .bind(&receipt.document_number)
        .bind(receipt.delivery_date.format("%Y-%m-%d").to_string())
        .bind(receipt.total_value)
        .bind(receipt.user.as_str())
        .bind(receipt.created_at.to_rfc3339())
        .bind(receipt.note.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_receipt", e))?;

        for (index, line) in receipt.lines.iter().enumerate() {
            if fetch_item(&mut tx, line.item_id).await?.is_none() {
                return Err(LedgerError::not_found(format!(
                    "line {}: item {}",
                    index + 1,
                    line.item_id
                )));
            }
            sqlx::query(
                r#"
                INSERT INTO receipt_lines (id, receipt_id, line_no, item_id, document_quantity,
                                           verified_quantity, unit_value, destination, status)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(line.id.to_string())
            .bind(receipt.id.to_string())
            .bind(index as i64 + 1)
            .bind(line.item_id.to_string())
            .bind(line.document_quantity)
            .bind(line.verified_quantity)
            .bind(line.unit_value)
            .bind(line.destination.as_str())
            .bind(line.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_receipt_line", e))?;
        }

        for (item_id, label, quantity) in plan.credits() {
            apply_change(&mut tx, item_id, label, QuantityChange::Delta(quantity)).await?;
        }
        for (item_id, unit_value) in plan.unit_values() {
            sqlx::query("UPDATE items SET unit_value = ?1 WHERE id = ?2")
                .bind(unit_value)
                .bind(item_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("update_unit_value", e))?;
        }

        commit(tx).await?;
        Ok(plan.receipt)
    }

    #[instrument(
        skip(self, request),
        fields(position_id = %request.position_id, new_quantity = request.new_quantity),
        err
    )]
    async fn execute_adjustment(&self, request: &AdjustmentRequest) -> LedgerResult<Adjustment> {
        let mut tx = self.begin().await?;
        let position = fetch_position(&mut tx, request.position_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("position {}", request.position_id)))?;
        let adjustment = request.decide(&position, AdjustmentId::new(), Utc::now());

        sqlx::query("UPDATE positions SET quantity = ?1 WHERE id = ?2")
            .bind(adjustment.quantity_after)
            .bind(position.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("overwrite_quantity", e))?;
        sqlx::query(
            r#"
            INSERT INTO adjustments (id, position_id, item_id, label, quantity_before,
                                     quantity_after, difference, occurred_at, user_name, note)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(adjustment.id.to_string())
        .bind(adjustment.position_id.to_string())
        .bind(adjustment.item_id.to_string())
        .bind(&adjustment.label)
        .bind(adjustment.quantity_before)
        .bind(adjustment.quantity_after)
        .bind(adjustment.difference)
        .bind(adjustment.occurred_at.to_rfc3339())
        .bind(adjustment.user.as_str())
        .bind(&adjustment.note)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_adjustment", e))?;

        commit(tx).await?;
        Ok(adjustment)
    }
}

/// Map SQLx errors to `LedgerError::PersistenceError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => LedgerError::persistence(format!(
            "database error in {operation}: {}",
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            LedgerError::persistence(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            LedgerError::persistence(format!("timed out waiting for a connection in {operation}"))
        }
        _ => LedgerError::persistence(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
