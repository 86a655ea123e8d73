use std::str::FromStr;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::types::{IntegrationResult, ServiceKind};

use crate::params::{parse_provider, Params};
use crate::provider::{requested, Adapters, VendorCall};
use crate::simulated::Simulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailOperation {
    SendEmail,
    SendBulkEmail,
}

impl EmailOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendEmail => "sendEmail",
            Self::SendBulkEmail => "sendBulkEmail",
        }
    }
}

impl FromStr for EmailOperation {
    type Err = SwitchyardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sendEmail" => Ok(Self::SendEmail),
            "sendBulkEmail" => Ok(Self::SendBulkEmail),
            _ => Err(SwitchyardError::OperationNotFound {
                service: ServiceKind::Email.to_string(),
                operation: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmailProvider {
    Mock,
    Sendgrid,
    Mailchimp,
    Smtp,
}

const PROVIDERS: [(&str, EmailProvider); 3] = [
    ("sendgrid", EmailProvider::Sendgrid),
    ("mailchimp", EmailProvider::Mailchimp),
    ("smtp", EmailProvider::Smtp),
];

impl EmailProvider {
    fn name(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Sendgrid => "sendgrid",
            Self::Mailchimp => "mailchimp",
            Self::Smtp => "smtp",
        }
    }

    fn check_credentials(&self, p: &Params<'_>) -> Result<()> {
        match self {
            Self::Sendgrid | Self::Mailchimp => p.require_str("apiKey").map(|_| ()),
            Self::Smtp => {
                p.require_str("host")?;
                p.require_str("port")?;
                Ok(())
            }
            Self::Mock => Ok(()),
        }
    }
}

/// Email delivery: SendGrid, Mailchimp, SMTP, or simulated.
pub struct EmailService {
    simulator: Simulator,
    adapters: Adapters,
}

impl EmailService {
    pub fn new(simulator: Simulator, adapters: Adapters) -> Self {
        Self {
            simulator,
            adapters,
        }
    }

    pub async fn execute(&self, operation: EmailOperation, params: &Value) -> Result<IntegrationResult> {
        let p = Params::new(operation.as_str(), params);
        match operation {
            EmailOperation::SendEmail => {
                p.require("to")?;
                p.require_str("subject")?;
            }
            EmailOperation::SendBulkEmail => {
                p.require("recipients")?;
                p.require_str("subject")?;
            }
        }

        let provider = parse_provider(
            "email",
            p.str("provider").as_deref(),
            &PROVIDERS,
            EmailProvider::Mock,
        )?;
        provider.check_credentials(&p)?;

        if provider != EmailProvider::Mock {
            let vendor = provider.name();
            return match self
                .adapters
                .call(ServiceKind::Email, vendor, operation.as_str(), params)
                .await
            {
                VendorCall::Done(result) => result,
                VendorCall::Simulate => Ok(requested(self.simulate(operation, &p).await, vendor)),
            };
        }
        Ok(self.simulate(operation, &p).await)
    }

    async fn simulate(&self, operation: EmailOperation, p: &Params<'_>) -> IntegrationResult {
        self.simulator.pause().await;
        let subject = p.str("subject").unwrap_or_default();
        let sent_at = Utc::now().to_rfc3339();

        match operation {
            EmailOperation::SendEmail => {
                let to = p.get("to").cloned().unwrap_or(Value::Null);
                let message_id = Uuid::new_v4().to_string();
                debug!(message_id = %message_id, "Simulated email sent");
                IntegrationResult::mock()
                    .with("messageId", message_id)
                    .with("to", to)
                    .with("subject", subject)
                    .with("sentAt", sent_at)
            }
            EmailOperation::SendBulkEmail => {
                let recipients = recipient_list(p.get("recipients"));
                let results: Vec<Value> = recipients
                    .iter()
                    .map(|to| json!({"to": to, "messageId": Uuid::new_v4().to_string()}))
                    .collect();
                debug!(count = results.len(), "Simulated bulk email sent");
                IntegrationResult::mock()
                    .with("batchId", Uuid::new_v4().to_string())
                    .with("accepted", results.len())
                    .with("results", results)
                    .with("subject", subject)
                    .with("sentAt", sent_at)
            }
        }
    }
}

/// Recipients as an array, or a comma-separated string.
fn recipient_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("email").and_then(Value::as_str).map(String::from),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}
