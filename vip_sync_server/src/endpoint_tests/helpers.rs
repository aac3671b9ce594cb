use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web::ServiceConfig, App};
use log::debug;
use vip_sync_engine::db_types::ServerRegistry;

use crate::config::{PriceTable, ServerOptions};

// The registry every endpoint test runs against. Anything outside these two names is unknown.
pub fn test_registry() -> ServerRegistry {
    ServerRegistry::from_csv("server1,server2")
}

pub fn test_options() -> ServerOptions {
    ServerOptions { base_url: "http://localhost:8360".to_string(), prices: PriceTable::default() }
}

pub async fn get_request(
    headers: &[(&str, &str)],
    path: &str,
    configure: fn(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    let mut req = TestRequest::get().uri(path);
    for (name, value) in headers {
        req = req.insert_header((*name, *value));
    }
    send_request(req, configure).await
}

pub async fn post_request(
    headers: &[(&str, &str)],
    path: &str,
    body: serde_json::Value,
    configure: fn(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    let mut req = TestRequest::post().uri(path).set_json(body);
    for (name, value) in headers {
        req = req.insert_header((*name, *value));
    }
    send_request(req, configure).await
}

// Both middleware rejections and handler errors surface as `Err` here, carrying the error's
// display string. Error-path tests assert on that string; success tests get the status and body.
async fn send_request(req: TestRequest, configure: fn(&mut ServiceConfig)) -> Result<(StatusCode, String), String> {
    let req = req.to_request();
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let res = test::try_call_service(&service, req).await.map_err(|e| e.to_string())?;
    if let Some(err) = res.response().error() {
        return Err(err.to_string());
    }
    let (_, res) = res.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    Ok((status, body))
}
