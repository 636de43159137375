//! # Order Repository
//!
//! The only writer of orders.
//!
//! ## Order Placement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    place_order (one transaction)                        │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │   ├── INSERT addresses (shipping, billing)    immutable snapshots      │
//! │   ├── INSERT orders     (PENDING / PENDING)   server totals only       │
//! │   ├── INSERT order_items                      frozen product fields    │
//! │   └── for each tracked product (id order):                             │
//! │         UPDATE products SET stock_quantity = stock_quantity - :qty     │
//! │         WHERE id = :id AND stock_quantity >= :qty                      │
//! │         0 rows? ──► ROLLBACK, StockConflict                            │
//! │  COMMIT                                                                │
//! │                                                                         │
//! │  UNIQUE(order_number) violated? new number, whole tx again (≤ 5)       │
//! │  SQLITE_BUSY / pool timeout?    backoff, whole tx again (policy)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## State Writes
//! Every later write is a compare-and-swap on the state the caller planned
//! from (`WHERE status = ? AND payment_status = ?`). A lost race returns
//! `Ok(false)` / `StaleState` and the caller re-reads and re-plans; nothing
//! is ever written from a stale read.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::{json, Value};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::retry::{with_retry, RetryPolicy};
use checkstand_core::{
    Address, AddressInput, Order, OrderDetails, OrderItem, OrderStatus, PaymentProvider,
    PaymentStatus, ValidatedCheckout,
};

/// Attempts at finding an unused order number.
const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 5;

const ORDER_NUMBER_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const ORDER_COLUMNS: &str = r#"
    id, order_number, owner_id, status, payment_status,
    subtotal_cents, tax_cents, shipping_cents, total_cents, notes,
    shipping_address_id, billing_address_id,
    payment_provider, payment_intent_id, provider_order_id, payment_metadata,
    created_at, updated_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, order_id, product_id, variant_id, product_name, product_slug, image_url,
    variant_description, sku, quantity, unit_price_cents, line_total_cents,
    stock_reserved, created_at
"#;

// =============================================================================
// Rows
// =============================================================================

/// `orders` row; payment_metadata is stored as JSON text.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    order_number: String,
    owner_id: String,
    status: OrderStatus,
    payment_status: PaymentStatus,
    subtotal_cents: i64,
    tax_cents: i64,
    shipping_cents: i64,
    total_cents: i64,
    notes: Option<String>,
    shipping_address_id: String,
    billing_address_id: String,
    payment_provider: Option<PaymentProvider>,
    payment_intent_id: Option<String>,
    provider_order_id: Option<String>,
    payment_metadata: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DbError;

    fn try_from(row: OrderRow) -> DbResult<Self> {
        Ok(Order {
            payment_metadata: serde_json::from_str(&row.payment_metadata)?,
            id: row.id,
            order_number: row.order_number,
            owner_id: row.owner_id,
            status: row.status,
            payment_status: row.payment_status,
            subtotal_cents: row.subtotal_cents,
            tax_cents: row.tax_cents,
            shipping_cents: row.shipping_cents,
            total_cents: row.total_cents,
            notes: row.notes,
            shipping_address_id: row.shipping_address_id,
            billing_address_id: row.billing_address_id,
            payment_provider: row.payment_provider,
            payment_intent_id: row.payment_intent_id,
            provider_order_id: row.provider_order_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A guarded payment state write.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentWrite {
    /// State the transition was planned from.
    pub from_status: OrderStatus,
    pub from_payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Appended to `payment_metadata.events`.
    pub event: Value,
    /// Appended to `payment_metadata.anomalies` in the same write.
    pub anomaly: Option<Value>,
}

/// SQL expression appending `json(?{param})` to the array at
/// `payment_metadata.{key}`, creating the array if missing.
fn append_metadata(key: &str, param: usize) -> String {
    append_metadata_to("payment_metadata", key, param)
}

/// Same as [`append_metadata`], over an arbitrary JSON expression.
fn append_metadata_to(base: &str, key: &str, param: usize) -> String {
    format!(
        "json_insert(\
            CASE WHEN json_type({base}, '$.{key}') = 'array' \
                THEN {base} \
                ELSE json_set({base}, '$.{key}', json('[]')) END, \
            '$.{key}[#]', json(?{param}))",
        base = base,
        key = key,
        param = param
    )
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        OrderRepository { pool, retry }
    }

    // -------------------------------------------------------------------------
    // Placement
    // -------------------------------------------------------------------------

    /// Persists a validated checkout as a PENDING/PENDING order and
    /// reserves its stock, atomically.
    ///
    /// ## Returns
    /// * `Ok(Order)` - committed order with its generated number
    /// * `Err(StockConflict)` - a concurrent checkout took the stock; nothing was written
    /// * `Err(e)` where `e.is_transient()` - retries exhausted
    pub async fn place_order(&self, checkout: &ValidatedCheckout) -> DbResult<Order> {
        self.place_order_with(checkout, generate_order_number).await
    }

    /// [`Self::place_order`] with a caller-supplied order number source.
    pub async fn place_order_with<F>(&self, checkout: &ValidatedCheckout, mut next_number: F) -> DbResult<Order>
    where
        F: FnMut() -> String,
    {
        let mut attempt = 1;

        loop {
            let order_number = next_number();
            let number = order_number.as_str();
            let result = with_retry(&self.retry, "place_order", || self.place_once(checkout, number)).await;

            match result {
                Err(err)
                    if err.is_unique_violation_on("orders.order_number")
                        && attempt < MAX_ORDER_NUMBER_ATTEMPTS =>
                {
                    warn!(order_number = %order_number, attempt, "Order number collision, regenerating");
                    attempt += 1;
                }
                Ok(order) => {
                    info!(
                        order_number = %order.order_number,
                        owner_id = %order.owner_id,
                        total_cents = order.total_cents,
                        "Order placed"
                    );
                    return Ok(order);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn place_once(&self, checkout: &ValidatedCheckout, order_number: &str) -> DbResult<Order> {
        let now = Utc::now();
        let order_id = Uuid::new_v4().to_string();
        let totals = checkout.totals();

        debug!(order_number = %order_number, lines = checkout.lines().len(), "Placing order");

        let mut tx = self.pool.begin().await?;

        let shipping_address_id = insert_address(&mut tx, checkout.shipping_address(), now).await?;
        let billing_address_id = insert_address(&mut tx, checkout.billing_address(), now).await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, owner_id, status, payment_status,
                subtotal_cents, tax_cents, shipping_cents, total_cents, notes,
                shipping_address_id, billing_address_id, payment_metadata,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, '{}', ?13, ?13)
            "#,
        )
        .bind(&order_id)
        .bind(order_number)
        .bind(checkout.owner_id())
        .bind(OrderStatus::Pending)
        .bind(PaymentStatus::Pending)
        .bind(totals.subtotal.cents())
        .bind(totals.tax.cents())
        .bind(totals.shipping.cents())
        .bind(totals.total.cents())
        .bind(checkout.notes())
        .bind(&shipping_address_id)
        .bind(&billing_address_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (position, line) in checkout.lines().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, product_id, variant_id, product_name, product_slug,
                    image_url, variant_description, sku, quantity, unit_price_cents,
                    line_total_cents, stock_reserved, position, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&order_id)
            .bind(&line.product_id)
            .bind(&line.variant_id)
            .bind(&line.product_name)
            .bind(&line.product_slug)
            .bind(&line.image_url)
            .bind(&line.variant_description)
            .bind(&line.sku)
            .bind(line.quantity)
            .bind(line.unit_price.cents())
            .bind(line.line_total.cents())
            .bind(line.tracks_stock)
            .bind(position as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        // Conditional decrement: never a read followed by a blind write
        for (product_id, quantity) in checkout.stock_reservations() {
            let result = sqlx::query(
                r#"
                UPDATE products
                SET stock_quantity = stock_quantity - ?2, updated_at = ?3
                WHERE id = ?1 AND stock_quantity IS NOT NULL AND stock_quantity >= ?2
                "#,
            )
            .bind(&product_id)
            .bind(quantity)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                debug!(product_id = %product_id, quantity, "Conditional decrement lost, rolling back");
                // Dropping tx rolls back every insert above
                return Err(DbError::StockConflict {
                    product_id,
                    requested: quantity,
                });
            }
        }

        tx.commit().await?;

        Ok(Order {
            id: order_id,
            order_number: order_number.to_string(),
            owner_id: checkout.owner_id().to_string(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            shipping_cents: totals.shipping.cents(),
            total_cents: totals.total.cents(),
            notes: checkout.notes().map(str::to_string),
            shipping_address_id,
            billing_address_id,
            payment_provider: None,
            payment_intent_id: None,
            provider_order_id: None,
            payment_metadata: json!({}),
            created_at: now,
            updated_at: now,
        })
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Gets an order by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    /// Gets an order by its human-readable number (the correlation id sent
    /// to providers as custom/reference id).
    pub async fn find_by_order_number(&self, order_number: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE order_number = ?1", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    /// Gets an order by the provider's correlation id (Stripe PaymentIntent
    /// id or PayPal order id).
    pub async fn find_by_correlation(
        &self,
        provider: PaymentProvider,
        external_id: &str,
    ) -> DbResult<Option<Order>> {
        let column = match provider {
            PaymentProvider::Stripe => "payment_intent_id",
            PaymentProvider::Paypal => "provider_order_id",
        };
        let sql = format!(
            "SELECT {} FROM orders WHERE {} = ?1 ORDER BY created_at DESC LIMIT 1",
            ORDER_COLUMNS, column
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    /// Gets an order with items and addresses, only if `owner_id` owns it.
    pub async fn get_for_owner(&self, owner_id: &str, id: &str) -> DbResult<Option<OrderDetails>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE id = ?1 AND owner_id = ?2",
            ORDER_COLUMNS
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.load_details(Order::try_from(row)?).await?)),
            None => Ok(None),
        }
    }

    /// The owner's orders, newest first.
    pub async fn list_for_owner(&self, owner_id: &str) -> DbResult<Vec<OrderDetails>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE owner_id = ?1 ORDER BY created_at DESC, order_number DESC",
            ORDER_COLUMNS
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(self.load_details(Order::try_from(row)?).await?);
        }

        Ok(orders)
    }

    /// Gets all items for an order, in cart order.
    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let sql = format!(
            "SELECT {} FROM order_items WHERE order_id = ?1 ORDER BY position",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    async fn load_details(&self, order: Order) -> DbResult<OrderDetails> {
        let items = self.items(&order.id).await?;
        let shipping_address = self.address(&order.shipping_address_id).await?;
        let billing_address = self.address(&order.billing_address_id).await?;

        Ok(OrderDetails {
            order,
            items,
            shipping_address,
            billing_address,
        })
    }

    async fn address(&self, id: &str) -> DbResult<Address> {
        sqlx::query_as::<_, Address>(
            r#"
            SELECT id, full_name, line1, line2, city, region, postal_code, country, phone, created_at
            FROM addresses WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Address", id))
    }

    // -------------------------------------------------------------------------
    // Payment writes
    // -------------------------------------------------------------------------

    /// Records which provider and external id an order is being paid
    /// through. Safe to repeat.
    ///
    /// Guarded on `status = pending AND payment_status != paid`; a paid or
    /// progressed order yields `StaleState`. The provider response is
    /// merged into `payment_metadata` under `"<provider>_create"`.
    pub async fn attach_correlation(
        &self,
        order_id: &str,
        provider: PaymentProvider,
        external_id: &str,
        snapshot: &Value,
    ) -> DbResult<Order> {
        let (column, key) = match provider {
            PaymentProvider::Stripe => ("payment_intent_id", "$.stripe_create"),
            PaymentProvider::Paypal => ("provider_order_id", "$.paypal_create"),
        };
        let sql = format!(
            r#"
            UPDATE orders
            SET payment_provider = ?2,
                {column} = ?3,
                payment_metadata = json_set(payment_metadata, '{key}', json(?4)),
                updated_at = ?5
            WHERE id = ?1 AND status = 'pending' AND payment_status != 'paid'
            "#,
            column = column,
            key = key
        );
        let snapshot = snapshot.to_string();
        let (sql, snapshot) = (sql.as_str(), snapshot.as_str());

        let affected = with_retry(&self.retry, "attach_correlation", || async move {
            let result = sqlx::query(sql)
                .bind(order_id)
                .bind(provider)
                .bind(external_id)
                .bind(snapshot)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
            Ok::<_, DbError>(result.rows_affected())
        })
        .await?;

        let order = self
            .get(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        if affected == 0 {
            return Err(DbError::stale("Order", order_id));
        }

        debug!(order_number = %order.order_number, provider = %provider, external_id, "Correlation attached");
        Ok(order)
    }

    /// Applies a planned payment transition if the order is still in the
    /// state it was planned from.
    ///
    /// ## Returns
    /// * `Ok(true)` - written
    /// * `Ok(false)` - the order changed underneath; re-read and re-plan
    pub async fn apply_payment_transition(&self, order_id: &str, write: &PaymentWrite) -> DbResult<bool> {
        let events = append_metadata("events", 4);
        let metadata = match write.anomaly {
            Some(_) => append_metadata_to(&events, "anomalies", 8),
            None => events,
        };
        let sql = format!(
            r#"
            UPDATE orders
            SET status = ?2,
                payment_status = ?3,
                payment_metadata = {metadata},
                updated_at = ?5
            WHERE id = ?1 AND status = ?6 AND payment_status = ?7
            "#,
            metadata = metadata
        );
        let event = write.event.to_string();
        let anomaly = write.anomaly.as_ref().map(Value::to_string);
        let (sql, event, anomaly) = (sql.as_str(), event.as_str(), anomaly.as_deref());

        let affected = with_retry(&self.retry, "apply_payment_transition", || async move {
            let mut query = sqlx::query(sql)
                .bind(order_id)
                .bind(write.status)
                .bind(write.payment_status)
                .bind(event)
                .bind(Utc::now())
                .bind(write.from_status)
                .bind(write.from_payment_status);
            if let Some(anomaly) = anomaly {
                query = query.bind(anomaly);
            }
            let result = query.execute(&self.pool).await?;
            Ok::<_, DbError>(result.rows_affected())
        })
        .await?;

        if affected > 0 {
            info!(
                order_id,
                status = %write.status,
                payment_status = %write.payment_status,
                "Payment transition applied"
            );
        }

        Ok(affected > 0)
    }

    /// Appends an audit note to `payment_metadata.anomalies` without
    /// touching order state.
    pub async fn record_anomaly(&self, order_id: &str, anomaly: &Value) -> DbResult<()> {
        self.append_note(order_id, "anomalies", anomaly, "record_anomaly").await
    }

    /// Appends to `payment_metadata.partial_refunds`; the order stays paid.
    pub async fn record_partial_refund(&self, order_id: &str, refund: &Value) -> DbResult<()> {
        self.append_note(order_id, "partial_refunds", refund, "record_partial_refund").await
    }

    async fn append_note(&self, order_id: &str, key: &str, note: &Value, operation: &str) -> DbResult<()> {
        let sql = format!(
            "UPDATE orders SET payment_metadata = {}, updated_at = ?3 WHERE id = ?1",
            append_metadata(key, 2)
        );
        let note = note.to_string();
        let (sql, note) = (sql.as_str(), note.as_str());

        let affected = with_retry(&self.retry, operation, || async move {
            let result = sqlx::query(sql)
                .bind(order_id)
                .bind(note)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
            Ok::<_, DbError>(result.rows_affected())
        })
        .await?;

        if affected == 0 {
            return Err(DbError::not_found("Order", order_id));
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Status writes
    // -------------------------------------------------------------------------

    /// Cancels an order and restores the stock it reserved, atomically.
    ///
    /// Guarded on the (status, payment_status) pair the caller checked;
    /// `StaleState` if it changed. An order with a provider payment still
    /// open (pending with a correlation id) is never cancelled here: its
    /// stock stays reserved until the provider settles.
    pub async fn cancel(
        &self,
        order_id: &str,
        from_status: OrderStatus,
        from_payment_status: PaymentStatus,
    ) -> DbResult<Order> {
        with_retry(&self.retry, "cancel_order", || {
            self.cancel_once(order_id, from_status, from_payment_status)
        })
        .await?;

        let order = self
            .get(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        info!(order_number = %order.order_number, "Order cancelled, stock restored");
        Ok(order)
    }

    async fn cancel_once(
        &self,
        order_id: &str,
        from_status: OrderStatus,
        from_payment_status: PaymentStatus,
    ) -> DbResult<()> {
        let now = Utc::now();
        let event = json!({ "type": "cancelled", "at": now }).to_string();
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE orders
            SET status = ?2, payment_metadata = {events}, updated_at = ?4
            WHERE id = ?1 AND status = ?5 AND payment_status = ?6
              AND NOT (
                  payment_status = 'pending'
                  AND (payment_intent_id IS NOT NULL OR provider_order_id IS NOT NULL)
              )
            "#,
            events = append_metadata("events", 3)
        );
        let result = sqlx::query(&sql)
            .bind(order_id)
            .bind(OrderStatus::Cancelled)
            .bind(&event)
            .bind(now)
            .bind(from_status)
            .bind(from_payment_status)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::stale("Order", order_id));
        }

        let reserved: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT product_id, SUM(quantity)
            FROM order_items
            WHERE order_id = ?1 AND stock_reserved = 1
            GROUP BY product_id
            ORDER BY product_id
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

        for (product_id, quantity) in reserved {
            sqlx::query(
                r#"
                UPDATE products
                SET stock_quantity = stock_quantity + ?2, updated_at = ?3
                WHERE id = ?1 AND stock_quantity IS NOT NULL
                "#,
            )
            .bind(&product_id)
            .bind(quantity)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE order_items SET stock_reserved = 0 WHERE order_id = ?1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Moves a fulfillment status forward, guarded on the current status.
    pub async fn advance_status(&self, order_id: &str, from: OrderStatus, to: OrderStatus) -> DbResult<Order> {
        let affected = with_retry(&self.retry, "advance_status", || async move {
            let result = sqlx::query(
                "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = ?4",
            )
            .bind(order_id)
            .bind(to)
            .bind(Utc::now())
            .bind(from)
            .execute(&self.pool)
            .await?;
            Ok::<_, DbError>(result.rows_affected())
        })
        .await?;

        if affected == 0 {
            return Err(DbError::stale("Order", order_id));
        }

        let order = self
            .get(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        info!(order_number = %order.order_number, from = %from, to = %to, "Order status advanced");
        Ok(order)
    }
}

async fn insert_address(
    tx: &mut Transaction<'_, Sqlite>,
    address: &AddressInput,
    now: DateTime<Utc>,
) -> DbResult<String> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO addresses (
            id, full_name, line1, line2, city, region, postal_code, country, phone, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&id)
    .bind(address.full_name.trim())
    .bind(address.line1.trim())
    .bind(address.line2.as_deref().map(str::trim))
    .bind(address.city.trim())
    .bind(address.region.as_deref().map(str::trim))
    .bind(address.postal_code.trim())
    .bind(address.country.trim().to_uppercase())
    .bind(address.phone.as_deref().map(str::trim))
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(id)
}

/// Generates an order number in format: ORD-YYYYMMDD-XXXXXX
///
/// ## Format
/// - YYYYMMDD: UTC date
/// - XXXXXX: six random uppercase alphanumerics (36^6 ≈ 2.2 billion per day)
///
/// ## Example
/// `ORD-20260131-K7Q2ZP`
pub fn generate_order_number() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| ORDER_NUMBER_ALPHABET[rng.gen_range(0..ORDER_NUMBER_ALPHABET.len())] as char)
        .collect();

    format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

// =============================================================================
// Unit Tests
// =============================================================================
