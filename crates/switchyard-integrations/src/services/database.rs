use std::str::FromStr;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use tracing::debug;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::types::{IntegrationResult, ServiceKind};

use crate::params::{parse_provider, Params};
use crate::provider::{requested, Adapters, VendorCall};
use crate::simulated::{random_between, Simulator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseOperation {
    ExecuteQuery,
    TestConnection,
}

impl DatabaseOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecuteQuery => "executeQuery",
            Self::TestConnection => "testConnection",
        }
    }
}

impl FromStr for DatabaseOperation {
    type Err = SwitchyardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "executeQuery" => Ok(Self::ExecuteQuery),
            "testConnection" => Ok(Self::TestConnection),
            _ => Err(SwitchyardError::OperationNotFound {
                service: ServiceKind::Database.to_string(),
                operation: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatabaseKind {
    Mock,
    Mysql,
    Postgres,
    Mongodb,
    Sqlite,
}

const KINDS: [(&str, DatabaseKind); 5] = [
    ("mysql", DatabaseKind::Mysql),
    ("postgres", DatabaseKind::Postgres),
    ("postgresql", DatabaseKind::Postgres),
    ("mongodb", DatabaseKind::Mongodb),
    ("sqlite", DatabaseKind::Sqlite),
];

impl DatabaseKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
            Self::Mongodb => "mongodb",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Leading SQL verb, upper-cased (`SELECT`, `INSERT`, ...).
pub fn query_type(query: &str) -> String {
    query
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

/// Query execution against MySQL, Postgres, MongoDB, SQLite, or a simulated store.
pub struct DatabaseService {
    simulator: Simulator,
    adapters: Adapters,
}

impl DatabaseService {
    pub fn new(simulator: Simulator, adapters: Adapters) -> Self {
        Self {
            simulator,
            adapters,
        }
    }

    pub async fn execute(
        &self,
        operation: DatabaseOperation,
        params: &Value,
    ) -> Result<IntegrationResult> {
        let p = Params::new(operation.as_str(), params);
        let kind_name = p.require_str("type")?;
        p.require("connection")?;
        if operation == DatabaseOperation::ExecuteQuery {
            p.require_str("query")?;
        }

        let kind = parse_provider("database", Some(&kind_name), &KINDS, DatabaseKind::Mock)?;
        if kind != DatabaseKind::Mock {
            let vendor = kind.name();
            return match self
                .adapters
                .call(ServiceKind::Database, vendor, operation.as_str(), params)
                .await
            {
                VendorCall::Done(result) => result,
                VendorCall::Simulate => Ok(requested(self.simulate(operation, &p).await, vendor)),
            };
        }
        Ok(self.simulate(operation, &p).await)
    }

    async fn simulate(&self, operation: DatabaseOperation, p: &Params<'_>) -> IntegrationResult {
        let latency = self.simulator.pause().await;
        match operation {
            DatabaseOperation::TestConnection => IntegrationResult::mock()
                .with("connected", true)
                .with("latencyMs", latency),
            DatabaseOperation::ExecuteQuery => {
                let query = p.str("query").unwrap_or_default();
                let verb = query_type(&query);
                debug!(query_type = %verb, "Simulated query executed");
                let result = IntegrationResult::mock().with("queryType", verb.clone());
                match verb.as_str() {
                    "SELECT" => {
                        let rows = fabricate_rows(random_between(1, 5) as usize);
                        result.with("rowCount", rows.len()).with("rows", rows)
                    }
                    "INSERT" | "UPDATE" | "DELETE" => {
                        result.with("affectedRows", random_between(1, 10))
                    }
                    _ => result.with("affectedRows", 0),
                }
            }
        }
    }
}

fn fabricate_rows(count: usize) -> Vec<Value> {
    let now = Utc::now();
    (1..=count)
        .map(|i| {
            json!({
                "id": i,
                "name": format!("Record {}", i),
                "status": if i % 2 == 1 { "active" } else { "inactive" },
                "createdAt": (now - ChronoDuration::days(i as i64)).to_rfc3339(),
            })
        })
        .collect()
}
