pub mod params;
pub mod provider;
pub mod router;
pub mod services;
pub mod simulated;
pub mod webhook;

pub use provider::{Adapters, ProviderAdapter};
pub use router::{IntegrationRouter, IntegrationRouterBuilder};
pub use services::api::{HttpTransport, ReqwestTransport};
pub use simulated::Simulator;
pub use webhook::{EchoHandler, WebhookAuth, WebhookHandler, WebhookRegistry};
