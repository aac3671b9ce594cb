//----------------------------------------------   Checkout  ----------------------------------------------------

use std::str::FromStr;

use actix_web::{web, HttpRequest, HttpResponse};
use infinitepay_tools::{CheckoutLinkRequest, PaymentLinkProvider};
use log::*;
use vip_sync_engine::{
    db_types::{DiscordId, NewOrder, Order, OrderId, PaymentStatus, ServerId, VipTier},
    helpers::new_order_nsu,
    traits::{VipGatewayDatabase, VipGatewayError},
    OrderFlowApi,
};

use crate::{
    config::ServerOptions,
    data_objects::{CheckoutRequest, CheckoutResponse, JsonResponse, PaymentWebhook},
    errors::ServerError,
    route,
    routes::require_field,
};

route!(checkout => Post "/checkout" impl VipGatewayDatabase, PaymentLinkProvider);
/// Route handler for checkout requests from the Discord bot.
///
/// Asks the payment provider for a checkout link and records the order in the ledger. The order
/// is only inserted after the provider call succeeds, so a provider failure leaves no trace. A
/// request that repeats an idempotency key returns the stored order without contacting the
/// provider again.
pub async fn checkout<BPay, P>(
    body: web::Json<CheckoutRequest>,
    api: web::Data<OrderFlowApi<BPay>>,
    provider: web::Data<P>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    BPay: VipGatewayDatabase,
    P: PaymentLinkProvider,
{
    let response = handle_checkout(body.into_inner(), &api, provider.get_ref(), &options).await?;
    Ok(HttpResponse::Ok().json(response))
}

route!(checkout_form => Get "/checkout" impl VipGatewayDatabase, PaymentLinkProvider);
/// GET variant of [`checkout`], with the request carried in the query string. Kept for clients
/// that cannot POST, such as plain links in chat messages.
pub async fn checkout_form<BPay, P>(
    query: web::Query<CheckoutRequest>,
    api: web::Data<OrderFlowApi<BPay>>,
    provider: web::Data<P>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    BPay: VipGatewayDatabase,
    P: PaymentLinkProvider,
{
    let response = handle_checkout(query.into_inner(), &api, provider.get_ref(), &options).await?;
    Ok(HttpResponse::Ok().json(response))
}

async fn handle_checkout<BPay, P>(
    request: CheckoutRequest,
    api: &OrderFlowApi<BPay>,
    provider: &P,
    options: &ServerOptions,
) -> Result<CheckoutResponse, ServerError>
where
    BPay: VipGatewayDatabase,
    P: PaymentLinkProvider,
{
    let server_id = ServerId::new(&request.server_id);
    api.ensure_known_server(&server_id)?;
    let discord_id = DiscordId::from(require_field(&request.discord_id, "discordId")?);
    let tier = VipTier::from_str(&request.vip_type).map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
    debug!("🛒️ Checkout request: {tier} for {discord_id} on {server_id}");
    if let Some(key) = request.idempotency_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        if let Some(order) = api.order_by_idempotency_key(key).await? {
            info!("🛒️ Checkout retry with key '{key}' answered from the ledger as order [{}]", order.order_id);
            return Ok(checkout_response(order));
        }
    }
    let order_nsu = new_order_nsu();
    let amount = options.prices.price_for(tier);
    let redirect_url = request
        .redirect_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(String::from)
        .unwrap_or_else(|| options.default_redirect_url());
    let link_request = CheckoutLinkRequest::new(
        amount,
        order_nsu.as_str().to_string(),
        server_id.as_str(),
        &tier.to_string(),
        discord_id.as_str(),
        redirect_url,
        options.webhook_url(),
    );
    let checkout_url = provider.create_checkout_link(&link_request).await.map_err(|e| {
        warn!("🛒️ The payment provider could not supply a checkout link for order [{order_nsu}]. {e}");
        ServerError::from(e)
    })?;
    let mut new_order = NewOrder::new(order_nsu, discord_id, server_id, tier, amount, checkout_url);
    if let Some(key) = request.idempotency_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        new_order = new_order.with_idempotency_key(key);
    }
    let (order, _inserted) = api.process_new_order(new_order).await?;
    info!("🛒️ Order [{}] created for {} on {}", order.order_id, order.discord_id, order.server_id);
    Ok(checkout_response(order))
}

fn checkout_response(order: Order) -> CheckoutResponse {
    CheckoutResponse { checkout_url: order.checkout_url, order_nsu: order.order_id.as_str().to_string() }
}

//----------------------------------------------   Webhook  ----------------------------------------------------

route!(infinitepay_webhook => Post "/infinitepay" impl VipGatewayDatabase);
/// Route handler for payment status webhooks from InfinitePay.
///
/// A success-class status extends the buyer's entitlement and queues a notification, all in one
/// transaction. Any other status is recorded on the order. A webhook that repeats an
/// already-processed transaction answers 200 with `success: false` so the provider stops
/// retrying; a webhook naming an unknown order is a 404.
pub async fn infinitepay_webhook<B: VipGatewayDatabase>(
    req: HttpRequest,
    body: web::Json<PaymentWebhook>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("🛒️ Received payment webhook: {}", req.uri());
    let payload = body.into_inner();
    let order_nsu = payload
        .order_nsu()
        .ok_or_else(|| ServerError::InvalidRequest("The webhook does not carry an order NSU.".into()))?;
    let transaction_nsu = payload
        .transaction_nsu()
        .ok_or_else(|| ServerError::InvalidRequest("The webhook does not carry a transaction NSU.".into()))?;
    let order_id = OrderId::from(order_nsu.to_string());
    let status = PaymentStatus::normalize(payload.status_text());
    match api.process_payment_update(&order_id, transaction_nsu, status).await {
        Ok(outcome) if outcome.confirmed() => {
            info!("🛒️ Payment for order [{order_id}] confirmed. VIP extended and notification queued.");
            Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Order {order_id} confirmed."))))
        },
        Ok(_) => {
            debug!("🛒️ Status '{status}' recorded for order [{order_id}]. No entitlement change.");
            Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Status recorded for order {order_id}."))))
        },
        Err(VipGatewayError::DuplicateTransaction { order_id, transaction_id }) => {
            info!("🛒️ Transaction {transaction_id} was already applied to order [{order_id}]. Nothing to do.");
            Ok(HttpResponse::Ok().json(JsonResponse::failure("Transaction already processed.")))
        },
        Err(e) => Err(e.into()),
    }
}
