//! HTTP layer — payload decoding and routes.

pub mod payload;
pub mod routes;

pub use payload::WebhookPayload;
pub use routes::intake_routes;
