use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use switchyard_core::config::AppConfig;
use switchyard_core::error::Result;
use switchyard_core::types::{IntegrationRequest, IntegrationResult, ServiceKind};

use crate::provider::{Adapters, ProviderAdapter};
use crate::services::api::{ApiService, HttpTransport, ReqwestTransport};
use crate::services::database::DatabaseService;
use crate::services::email::EmailService;
use crate::services::storage::StorageService;
use crate::simulated::Simulator;
use crate::webhook::WebhookRegistry;

/// Routes `(service, operation, params)` to the owning service.
pub struct IntegrationRouter {
    api: ApiService,
    email: EmailService,
    database: DatabaseService,
    storage: StorageService,
    webhooks: Arc<WebhookRegistry>,
}

impl IntegrationRouter {
    /// Router with default providers: reqwest for HTTP, simulated vendors,
    /// and a fresh webhook registry.
    pub fn new(config: &AppConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: &AppConfig) -> IntegrationRouterBuilder {
        IntegrationRouterBuilder {
            config: config.clone(),
            simulator: Simulator::new(&config.simulation),
            transport: None,
            webhooks: None,
            adapters: Adapters::default(),
        }
    }

    /// Execute an operation by name.
    pub async fn execute(
        &self,
        service: &str,
        operation: &str,
        params: &Value,
    ) -> Result<IntegrationResult> {
        let kind: ServiceKind = service.parse()?;
        self.route(kind, operation, params).await
    }

    /// Execute a typed request.
    pub async fn dispatch(&self, request: IntegrationRequest) -> Result<IntegrationResult> {
        self.route(request.service, &request.operation, &request.params)
            .await
    }

    pub fn webhooks(&self) -> &Arc<WebhookRegistry> {
        &self.webhooks
    }

    async fn route(
        &self,
        service: ServiceKind,
        operation: &str,
        params: &Value,
    ) -> Result<IntegrationResult> {
        debug!(service = %service, operation, "Routing integration request");
        let result = match service {
            ServiceKind::Api => self.api.execute(operation.parse()?, params).await,
            ServiceKind::Email => self.email.execute(operation.parse()?, params).await,
            ServiceKind::Database => self.database.execute(operation.parse()?, params).await,
            ServiceKind::Storage => self.storage.execute(operation.parse()?, params).await,
            ServiceKind::Webhook => self.webhooks.execute(operation.parse()?, params).await,
        };
        if let Err(ref e) = result {
            warn!(service = %service, operation, error = %e, "Integration request failed");
        }
        result
    }
}

pub struct IntegrationRouterBuilder {
    config: AppConfig,
    simulator: Simulator,
    transport: Option<Arc<dyn HttpTransport>>,
    webhooks: Option<Arc<WebhookRegistry>>,
    adapters: Adapters,
}

impl IntegrationRouterBuilder {
    pub fn simulator(mut self, simulator: Simulator) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share an existing registry instead of creating one.
    pub fn webhooks(mut self, registry: Arc<WebhookRegistry>) -> Self {
        self.webhooks = Some(registry);
        self
    }

    /// Install a real client for a vendor provider.
    pub fn with_adapter(mut self, service: ServiceKind, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(service, adapter);
        self
    }

    pub fn build(self) -> Result<IntegrationRouter> {
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new(&self.config.http)?),
        };
        let webhooks = self
            .webhooks
            .unwrap_or_else(|| Arc::new(WebhookRegistry::new(self.config.webhooks.history_limit)));
        let timeout = self.config.http.timeout();

        Ok(IntegrationRouter {
            api: ApiService::new(transport, timeout),
            email: EmailService::new(self.simulator, self.adapters.clone()),
            database: DatabaseService::new(self.simulator, self.adapters.clone()),
            storage: StorageService::new(self.simulator, self.adapters),
            webhooks,
        })
    }
}
