use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::warn;

use switchyard_core::error::Result;
use switchyard_core::types::{IntegrationResult, ServiceKind};

/// A real client for a vendor provider (SendGrid, Postgres, S3, ...).
///
/// None ship with Switchyard; embedders install them on the router. Vendors
/// without an adapter fall back to the simulated provider.
pub trait ProviderAdapter: Send + Sync + 'static {
    /// Vendor name as it appears in the `provider` (or `type`) field.
    fn vendor(&self) -> &str;

    fn call(&self, operation: &str, params: Value) -> BoxFuture<'_, Result<IntegrationResult>>;
}

/// Installed adapters, keyed by service and vendor.
#[derive(Clone, Default)]
pub struct Adapters {
    inner: HashMap<(ServiceKind, String), Arc<dyn ProviderAdapter>>,
}

impl Adapters {
    pub fn insert(&mut self, service: ServiceKind, adapter: Arc<dyn ProviderAdapter>) {
        let vendor = adapter.vendor().to_ascii_lowercase();
        self.inner.insert((service, vendor), adapter);
    }

    pub fn get(&self, service: ServiceKind, vendor: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.inner.get(&(service, vendor.to_string())).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Run the vendor's adapter if one is installed.
    pub async fn call(
        &self,
        service: ServiceKind,
        vendor: &str,
        operation: &str,
        params: &Value,
    ) -> VendorCall {
        match self.get(service, vendor) {
            Some(adapter) => VendorCall::Done(adapter.call(operation, params.clone()).await),
            None => {
                warn!(
                    service = %service,
                    vendor,
                    operation,
                    "No adapter installed for provider, using simulated provider"
                );
                VendorCall::Simulate
            }
        }
    }
}

/// Outcome of looking up a vendor adapter.
pub enum VendorCall {
    /// The adapter ran; its result is final.
    Done(Result<IntegrationResult>),
    /// No adapter; the caller simulates and tags the envelope.
    Simulate,
}

/// Tag a simulated envelope with the vendor that was asked for.
pub fn requested(result: IntegrationResult, vendor: &str) -> IntegrationResult {
    result.with("requestedProvider", vendor)
}
