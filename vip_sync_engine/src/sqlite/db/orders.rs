use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderId, PaymentStatus},
    sqlite::db::is_unique_violation,
    traits::VipGatewayError,
};

/// Inserts the order into the ledger, returning `false` in the second parameter if an order with
/// the same idempotency key is already stored. A concurrent insert race on the key resolves the
/// same way; the first stored order wins.
pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<(Order, bool), VipGatewayError> {
    if let Some(key) = order.idempotency_key.as_deref() {
        if let Some(existing) = fetch_order_by_idempotency_key(key, &mut *conn).await? {
            debug!("📝️ Idempotency key already stored, reusing order [{}]", existing.order_id);
            return Ok((existing, false));
        }
    }
    match insert_order(order.clone(), &mut *conn).await {
        Ok(inserted) => {
            debug!("📝️ Order [{}] inserted with id {}", inserted.order_id, inserted.id);
            Ok((inserted, true))
        },
        Err(e) if is_unique_violation(&e) => {
            if let Some(key) = order.idempotency_key.as_deref() {
                if let Some(existing) = fetch_order_by_idempotency_key(key, conn).await? {
                    debug!("📝️ Lost the insert race for key, reusing order [{}]", existing.order_id);
                    return Ok((existing, false));
                }
            }
            Err(VipGatewayError::OrderAlreadyExists(order.order_id))
        },
        Err(e) => Err(e.into()),
    }
}

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                discord_id,
                server_id,
                vip_tier,
                amount,
                status,
                checkout_url,
                idempotency_key,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.discord_id)
    .bind(order.server_id)
    .bind(order.vip_tier)
    .bind(order.amount)
    .bind(PaymentStatus::Pending)
    .bind(order.checkout_url)
    .bind(order.idempotency_key)
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Returns the ledger entry for the corresponding `order_id`
pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_idempotency_key(
    key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE idempotency_key = $1").bind(key).fetch_optional(conn).await?;
    Ok(order)
}

/// True when the given transaction has already credited VIP time to the order. The recorded
/// status on the order is irrelevant here; a later non-success delivery may have overwritten it.
pub async fn transaction_already_credited(
    order_ref: i64,
    transaction_id: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM credited_transactions WHERE order_ref = $1 AND transaction_id = $2")
            .bind(order_ref)
            .bind(transaction_id)
            .fetch_optional(conn)
            .await?;
    Ok(row.is_some())
}

/// Marks the transaction as credited against the order. The unique constraint settles the race
/// between two concurrent deliveries of the same confirmation; the loser surfaces as a duplicate.
pub(crate) async fn record_credited_transaction(
    order: &Order,
    transaction_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), VipGatewayError> {
    sqlx::query("INSERT INTO credited_transactions (order_ref, transaction_id, created_at) VALUES ($1, $2, $3)")
        .bind(order.id)
        .bind(transaction_id)
        .bind(now)
        .execute(conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                VipGatewayError::DuplicateTransaction {
                    order_id: order.order_id.clone(),
                    transaction_id: transaction_id.to_string(),
                }
            } else {
                e.into()
            }
        })?;
    Ok(())
}

/// Records the provider's verdict on the order: the normalised status, the transaction NSU and a
/// fresh `updated_at`. Every webhook delivery lands here, success-class or not.
pub(crate) async fn record_payment_update(
    id: i64,
    transaction_id: &str,
    status: PaymentStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, VipGatewayError> {
    let result: Option<Order> =
        sqlx::query_as("UPDATE orders SET status = $2, transaction_id = $3, updated_at = $4 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(status)
            .bind(transaction_id)
            .bind(now)
            .fetch_optional(conn)
            .await?;
    result.ok_or(VipGatewayError::OrderIdNotFound(id))
}
