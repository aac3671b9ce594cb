use chrono::Utc;

use crate::db_types::OrderId;

/// Generates a fresh order NSU of the form `ORD-<unix millis>-<8 hex chars>`.
///
/// The timestamp keeps NSUs roughly sortable and the random suffix keeps concurrent checkouts
/// from colliding. The unique constraint on the ledger is the real guarantee.
pub fn new_order_nsu() -> OrderId {
    let millis = Utc::now().timestamp_millis();
    let suffix = rand::random::<u32>();
    OrderId::from(format!("ORD-{millis}-{suffix:08x}"))
}
