//! Terraform Provider Implementation
//!
//! Implements the Terraform Plugin Protocol for kops.

use crate::client::{ClientError, KopsClient, StateStore};
use crate::resources::{get_all_data_sources, get_all_resources, DataSource, Resource, ResourceState};
use crate::schema::{
    Diagnostic, ProviderSchema, RpcRequest, RpcResponse, SchemaAttribute, SchemaBlock,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tokio::runtime::Runtime;

/// Environment variable consulted when `state_store` is not configured
pub const STATE_STORE_ENV: &str = "KOPS_STATE_STORE";

const INVALID_STATE_ERROR: &str = "Unable to read state store s3 bucket.
Please use a valid s3 bucket uri on state_store attribute or KOPS_STATE_STORE env var.
A valid value follows the format s3://<bucket>.
Trailing slash will be trimmed.";

/// Provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub state_store: Option<String>,
}

/// Provider configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("state_store is required")]
    MissingStateStore,
    #[error("error building path for {uri:?}: {source}")]
    InvalidStateStore { uri: String, source: ClientError },
    #[error("State Store: Invalid value: {uri:?}: {source}")]
    Unreadable { uri: String, source: ClientError },
}

impl ConfigError {
    fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic =
            Diagnostic::error(&self.to_string()).with_attribute(vec!["state_store".to_string()]);
        match self {
            ConfigError::MissingStateStore | ConfigError::Unreadable { .. } => {
                diagnostic.with_detail(INVALID_STATE_ERROR)
            }
            ConfigError::InvalidStateStore { .. } => diagnostic,
        }
    }
}

/// Pick the state store location: explicit configuration wins over the
/// environment fallback
pub fn resolve_state_store(
    config: &ProviderConfig,
    env_value: Option<String>,
) -> Result<String, ConfigError> {
    config
        .state_store
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| env_value.filter(|s| !s.trim().is_empty()))
        .ok_or(ConfigError::MissingStateStore)
}

/// kops Terraform Provider
pub struct KopsProvider {
    client: Option<KopsClient>,
    resources: HashMap<String, Box<dyn Resource>>,
    data_sources: HashMap<String, Box<dyn DataSource>>,
    runtime: Runtime,
}

fn diagnostics_response(id: i64, diagnostics: Vec<Diagnostic>) -> RpcResponse {
    RpcResponse::success(id, serde_json::json!({ "diagnostics": diagnostics }))
}

fn state_param(params: &Value, key: &str) -> Option<ResourceState> {
    params.get(key).and_then(ResourceState::from_value)
}

impl KopsProvider {
    /// Create a new provider
    pub fn new() -> std::io::Result<Self> {
        let resources: HashMap<String, Box<dyn Resource>> = get_all_resources()
            .into_iter()
            .map(|r| (r.type_name().to_string(), r))
            .collect();

        let data_sources: HashMap<String, Box<dyn DataSource>> = get_all_data_sources()
            .into_iter()
            .map(|d| (d.type_name().to_string(), d))
            .collect();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            client: None,
            resources,
            data_sources,
            runtime,
        })
    }

    fn provider_block() -> SchemaBlock {
        SchemaBlock::new()
            .with_attribute(
                "state_store",
                SchemaAttribute::string()
                    .with_description(
                        "Location of state storage (e.g., s3://my-bucket). Defaults to KOPS_STATE_STORE.",
                    )
                    .optional(),
            )
            .with_description("kops cluster state store provider")
    }

    /// Get provider schema
    fn get_schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::new(Self::provider_block());

        for (name, resource) in &self.resources {
            schema = schema.with_resource(name, resource.schema());
        }
        for (name, data_source) in &self.data_sources {
            schema = schema.with_data_source(name, data_source.schema());
        }

        schema
    }

    /// Configure the provider
    fn configure(&mut self, config: ProviderConfig) -> Vec<Diagnostic> {
        match self.build_client(&config) {
            Ok(client) => {
                tracing::info!(state_store = %client.store(), "Provider configured");
                self.client = Some(client);
                Vec::new()
            }
            Err(e) => {
                tracing::error!("Provider configuration failed: {}", e);
                vec![e.to_diagnostic()]
            }
        }
    }

    fn build_client(&self, config: &ProviderConfig) -> Result<KopsClient, ConfigError> {
        let uri = resolve_state_store(config, std::env::var(STATE_STORE_ENV).ok())?;

        let store = StateStore::parse(&uri).map_err(|source| ConfigError::InvalidStateStore {
            uri: uri.clone(),
            source,
        })?;

        self.runtime.block_on(async {
            let client = KopsClient::from_env(store).await.map_err(|source| {
                ConfigError::InvalidStateStore {
                    uri: uri.clone(),
                    source,
                }
            })?;

            client
                .check_readable()
                .await
                .map_err(|source| ConfigError::Unreadable {
                    uri: uri.clone(),
                    source,
                })?;

            Ok::<_, ConfigError>(client)
        })
    }

    /// Get the configured client
    fn get_client(&self) -> Result<&KopsClient, Diagnostic> {
        self.client
            .as_ref()
            .ok_or_else(|| Diagnostic::error("Provider not configured"))
    }

    /// Handle an RPC request
    pub fn handle_request(&mut self, input: &str) -> String {
        let request: RpcRequest = match serde_json::from_str(input) {
            Ok(r) => r,
            Err(e) => {
                return serde_json::to_string(&RpcResponse::error(
                    0,
                    -32700,
                    &format!("Parse error: {}", e),
                ))
                .unwrap_or_default();
            }
        };

        tracing::debug!(method = %request.method, id = request.id, "Handling request");

        let response = match request.method.as_str() {
            "GetProviderSchema" => self.handle_get_schema(request.id),
            "ValidateProviderConfig" => self.handle_validate_provider(request.id, &request.params),
            "ConfigureProvider" => self.handle_configure(request.id, &request.params),
            "ValidateResourceConfig" => {
                self.handle_validate_resource(request.id, &request.params)
            }
            "ValidateDataSourceConfig" => {
                self.handle_validate_data_source(request.id, &request.params)
            }
            "PlanResourceChange" => self.handle_plan_resource(request.id, &request.params),
            "ApplyResourceChange" => self.handle_apply_resource(request.id, &request.params),
            "ReadResource" => self.handle_read_resource(request.id, &request.params),
            "ImportResourceState" => self.handle_import_resource(request.id, &request.params),
            "ReadDataSource" => self.handle_read_data_source(request.id, &request.params),
            "StopProvider" => RpcResponse::success(request.id, serde_json::json!({})),
            _ => RpcResponse::error(
                request.id,
                -32601,
                &format!("Method not found: {}", request.method),
            ),
        };

        serde_json::to_string(&response).unwrap_or_else(|e| {
            serde_json::to_string(&RpcResponse::error(
                request.id,
                -32603,
                &format!("Serialization error: {}", e),
            ))
            .unwrap_or_default()
        })
    }

    fn resource(&self, params: &Value) -> Result<&dyn Resource, Diagnostic> {
        let type_name = params
            .get("type_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        self.resources
            .get(type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| Diagnostic::error(&format!("Unknown resource type: {}", type_name)))
    }

    fn data_source(&self, params: &Value) -> Result<&dyn DataSource, Diagnostic> {
        let type_name = params
            .get("type_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        self.data_sources
            .get(type_name)
            .map(|d| d.as_ref())
            .ok_or_else(|| Diagnostic::error(&format!("Unknown data source type: {}", type_name)))
    }

    /// Handle GetProviderSchema
    fn handle_get_schema(&self, id: i64) -> RpcResponse {
        let schema = self.get_schema();
        RpcResponse::success(id, serde_json::to_value(schema).unwrap_or_default())
    }

    /// Handle ValidateProviderConfig
    fn handle_validate_provider(&self, id: i64, params: &Value) -> RpcResponse {
        let config = params.get("config").cloned().unwrap_or(Value::Null);
        let diagnostics = crate::validation::validate_config(&Self::provider_block(), &config);
        diagnostics_response(id, diagnostics)
    }

    /// Handle ConfigureProvider
    fn handle_configure(&mut self, id: i64, params: &Value) -> RpcResponse {
        let config: ProviderConfig = params
            .get("config")
            .and_then(|c| serde_json::from_value(c.clone()).ok())
            .unwrap_or_default();

        let diagnostics = self.configure(config);
        diagnostics_response(id, diagnostics)
    }

    /// Handle ValidateResourceConfig
    fn handle_validate_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let config = params.get("config").cloned().unwrap_or(Value::Null);
        diagnostics_response(id, resource.validate(&config))
    }

    /// Handle ValidateDataSourceConfig
    fn handle_validate_data_source(&self, id: i64, params: &Value) -> RpcResponse {
        let data_source = match self.data_source(params) {
            Ok(d) => d,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let config = params.get("config").cloned().unwrap_or(Value::Null);
        diagnostics_response(id, data_source.validate(&config))
    }

    /// Handle PlanResourceChange
    fn handle_plan_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        // Destroy plans carry no proposed state
        let proposed_state = match state_param(params, "proposed_new_state") {
            Some(state) => state,
            None => {
                return RpcResponse::success(
                    id,
                    serde_json::json!({
                        "planned_state": null,
                        "diagnostics": []
                    }),
                )
            }
        };
        let prior_state = state_param(params, "prior_state");

        match resource.plan_change(prior_state.as_ref(), &proposed_state) {
            Ok(planned) => RpcResponse::success(
                id,
                serde_json::json!({
                    "planned_state": planned.values,
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => diagnostics_response(id, diagnostics),
        }
    }

    /// Handle ApplyResourceChange
    fn handle_apply_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let planned_state = state_param(params, "planned_state");
        let prior_state = state_param(params, "prior_state");

        let result = self.runtime.block_on(async {
            match (prior_state, planned_state) {
                // Delete
                (Some(prior), None) => resource.delete(client, &prior).await.map(|_| None),
                // Create
                (None, Some(planned)) => resource.create(client, &planned).await.map(Some),
                // Update
                (Some(prior), Some(planned)) => {
                    resource.update(client, &prior, &planned).await.map(Some)
                }
                (None, None) => Ok(None),
            }
        });

        match result {
            Ok(new_state) => RpcResponse::success(
                id,
                serde_json::json!({
                    "new_state": new_state.map(|s| s.values),
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => diagnostics_response(id, diagnostics),
        }
    }

    /// Handle ReadResource
    fn handle_read_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let current_state = state_param(params, "current_state").unwrap_or_default();

        let result = self.runtime.block_on(async {
            match resource.exists(client, &current_state).await {
                Ok(true) => resource.read(client, &current_state).await,
                Ok(false) => Ok(None),
                Err(diagnostics) => Err(diagnostics),
            }
        });

        match result {
            Ok(Some(state)) => RpcResponse::success(
                id,
                serde_json::json!({
                    "new_state": state.values,
                    "diagnostics": []
                }),
            ),
            // Resource no longer exists
            Ok(None) => RpcResponse::success(
                id,
                serde_json::json!({
                    "new_state": null,
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => diagnostics_response(id, diagnostics),
        }
    }

    /// Handle ImportResourceState
    fn handle_import_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = params
            .get("type_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let resource_id = params.get("id").and_then(|v| v.as_str()).unwrap_or("");

        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        // Create a minimal state with just the ID for reading
        let mut import_state = ResourceState::new();
        import_state.set("id", serde_json::json!(resource_id));

        let result = self
            .runtime
            .block_on(async { resource.read(client, &import_state).await });

        match result {
            Ok(Some(state)) => RpcResponse::success(
                id,
                serde_json::json!({
                    "imported_resources": [{
                        "type_name": type_name,
                        "state": state.values
                    }],
                    "diagnostics": []
                }),
            ),
            Ok(None) => diagnostics_response(
                id,
                vec![Diagnostic::error(&format!("Cluster {} not found", resource_id))],
            ),
            Err(diagnostics) => diagnostics_response(id, diagnostics),
        }
    }

    /// Handle ReadDataSource
    fn handle_read_data_source(&self, id: i64, params: &Value) -> RpcResponse {
        let data_source = match self.data_source(params) {
            Ok(d) => d,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let config = state_param(params, "config").unwrap_or_default();

        match self.runtime.block_on(data_source.read(client, &config)) {
            Ok(state) => RpcResponse::success(
                id,
                serde_json::json!({
                    "state": state.values,
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => diagnostics_response(id, diagnostics),
        }
    }
}
