mod api_key;

pub use api_key::{ApiKeyMiddlewareFactory, ApiKeyMiddlewareService, MissingKeyPolicy};
