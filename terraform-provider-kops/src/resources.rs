//! Terraform Resources for kops
//!
//! Declares the `kops_cluster` resource and data source. Both share one
//! attribute schema; the resource is read/import oriented and its write
//! operations leave the state store untouched.

use crate::attributes::{AttributeError, AttributeTree};
use crate::client::KopsClient;
use crate::expand::expand_cluster;
use crate::flatten::{cluster_exists, read_cluster};
use crate::schema::{
    AttributeType, Diagnostic, NestedBlock, ResourceSchema, SchemaAttribute, SchemaBlock,
    Validator,
};
use crate::validation::validate_config;
use async_trait::async_trait;
use kops_common::{DnsType, SubnetType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const CLUSTER_TYPE_NAME: &str = "kops_cluster";

/// Result type for resource operations
pub type ResourceResult<T> = Result<T, Vec<Diagnostic>>;

/// Resource state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub values: HashMap<String, Value>,
}

impl ResourceState {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Build state from a JSON object; anything else yields `None`
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().map(|obj| ResourceState {
            values: obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(|v| v.as_str()).map(String::from)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// `metadata[0].name`
    pub fn metadata_name(&self) -> Option<String> {
        self.get("metadata")
            .and_then(|v| v.as_array())
            .and_then(|items| items.first())
            .and_then(|m| m.get("name"))
            .and_then(|n| n.as_str())
            .filter(|n| !n.is_empty())
            .map(String::from)
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::new()
    }
}

impl From<AttributeTree> for ResourceState {
    fn from(tree: AttributeTree) -> Self {
        Self {
            values: tree.to_json_map().into_iter().collect(),
        }
    }
}

/// Resource trait
#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource type name
    fn type_name(&self) -> &str;

    /// Get the schema for this resource
    fn schema(&self) -> ResourceSchema;

    /// Check configuration against the schema before any I/O
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validate_config(&self.schema().block, config)
    }

    /// Create a new resource
    async fn create(
        &self,
        client: &KopsClient,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Read an existing resource; `None` when it no longer exists
    async fn read(
        &self,
        client: &KopsClient,
        current: &ResourceState,
    ) -> ResourceResult<Option<ResourceState>>;

    /// Check whether the resource still exists
    async fn exists(&self, client: &KopsClient, current: &ResourceState) -> ResourceResult<bool>;

    /// Update an existing resource
    async fn update(
        &self,
        client: &KopsClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Delete a resource
    async fn delete(&self, client: &KopsClient, current: &ResourceState) -> ResourceResult<()>;

    /// Plan changes
    fn plan_change(
        &self,
        current: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        // Default implementation: return proposed state
        let _ = current;
        Ok(proposed.clone())
    }
}

/// Data source trait
#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &str;

    fn schema(&self) -> ResourceSchema;

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validate_config(&self.schema().block, config)
    }

    async fn read(&self, client: &KopsClient, config: &ResourceState) -> ResourceResult<ResourceState>;
}

// ============================================================================
// Cluster schema
// ============================================================================

const CIDR: Validator = Validator::Cidr {
    min_prefix: 1,
    max_prefix: 32,
};

fn string_optional(desc: &str) -> SchemaAttribute {
    SchemaAttribute::string().with_description(desc).optional()
}

fn string_required(desc: &str) -> SchemaAttribute {
    SchemaAttribute::string().with_description(desc).required()
}

fn cidr_optional(desc: &str) -> SchemaAttribute {
    string_optional(desc).with_validator(CIDR)
}

fn int_optional(desc: &str) -> SchemaAttribute {
    SchemaAttribute::number().with_description(desc).optional()
}

fn bool_optional(desc: &str) -> SchemaAttribute {
    SchemaAttribute::bool().with_description(desc).optional()
}

fn metadata_block() -> SchemaBlock {
    SchemaBlock::new()
        .with_attribute("name", string_required("Cluster name, e.g. prod.k8s.local"))
        .with_attribute(
            "creation_timestamp",
            SchemaAttribute::string()
                .with_description("Time the cluster was created")
                .computed(),
        )
}

fn subnet_block() -> SchemaBlock {
    SchemaBlock::new()
        .with_attribute("cidr", string_required("Subnet CIDR").with_validator(CIDR))
        .with_attribute("name", string_required("Subnet name"))
        .with_attribute(
            "type",
            string_required("Subnet type (Public, Private, Utility)")
                .with_validator(Validator::OneOf(&SubnetType::ALL)),
        )
        .with_attribute("zone", string_required("Availability zone"))
}

fn topology_block() -> SchemaBlock {
    let bastion = SchemaBlock::new()
        .with_attribute("bastion_public_name", string_optional("Public DNS name of the bastion"))
        .with_attribute(
            "idle_timeout_seconds",
            int_optional("Idle timeout of the bastion load balancer"),
        );

    let dns = SchemaBlock::new().with_attribute(
        "type",
        string_optional("DNS zone visibility (Public, Private)")
            .with_validator(Validator::OneOf(&DnsType::ALL)),
    );

    SchemaBlock::new()
        .with_attribute("masters", string_optional("Master topology (public, private)"))
        .with_attribute("nodes", string_optional("Node topology (public, private)"))
        .with_block("bastion", NestedBlock::single(bastion))
        .with_block("dns", NestedBlock::single(dns))
}

fn etcd_cluster_block() -> SchemaBlock {
    let member = SchemaBlock::new()
        .with_attribute("name", string_required("Member name"))
        .with_attribute("instance_group", string_required("Instance group hosting the member"))
        .with_attribute("volume_type", string_optional("Volume type, e.g. gp3"))
        .with_attribute("volume_iops", int_optional("Provisioned volume IOPS"))
        .with_attribute("volume_size", int_optional("Volume size in GB"))
        .with_attribute("kms_key_id", string_optional("KMS key used to encrypt the volume"))
        .with_attribute("encrypted_volume", bool_optional("Encrypt the volume"));

    SchemaBlock::new()
        .with_attribute("name", string_required("etcd cluster name, e.g. main or events"))
        .with_block("etcd_member", NestedBlock::list(member).min_items(1))
        .with_attribute("enable_etcd_tls", bool_optional("Use TLS between etcd peers"))
        .with_attribute("enable_tls_auth", bool_optional("Require TLS client authentication"))
        .with_attribute("version", string_optional("etcd version"))
        .with_attribute(
            "leader_election_timeout",
            int_optional("Leader election timeout in milliseconds"),
        )
        .with_attribute("heartbeat_interval", int_optional("Heartbeat interval in milliseconds"))
        .with_attribute("image", string_optional("etcd container image"))
}

fn cluster_spec_block() -> SchemaBlock {
    let mut block = SchemaBlock::new();
    for (name, desc) in [
        ("channel", "Update channel"),
        ("cloud_provider", "Cloud provider, e.g. aws"),
        ("cluster_dnsdomain", "In-cluster DNS domain"),
        ("config_base", "Path of the cluster configuration in the state store"),
        ("config_store", "Location of cluster configuration"),
        ("dnszone", "DNS hosted zone"),
        ("key_store", "Location of the key store"),
        ("kubernetes_version", "Kubernetes version"),
        ("master_internal_name", "Internal API server name"),
        ("master_public_name", "Public API server name"),
        ("network_id", "Identifier of an existing VPC"),
        ("project", "Cloud project"),
        ("secret_store", "Location of the secret store"),
        ("service_cluster_iprange", "Service IP range"),
        ("sshkey_name", "Name of an existing SSH key"),
    ] {
        block = block.with_attribute(name, string_optional(desc));
    }

    block
        .with_attribute("network_cidr", cidr_optional("VPC CIDR"))
        .with_attribute("non_masquerade_cidr", cidr_optional("CIDR that is not masqueraded"))
        .with_attribute(
            "ssh_access",
            SchemaAttribute::list(AttributeType::String)
                .with_description("CIDRs allowed to SSH to the cluster")
                .optional(),
        )
        .with_attribute(
            "kubernetes_api_access",
            SchemaAttribute::list(AttributeType::String)
                .with_description("CIDRs allowed to reach the API server")
                .optional(),
        )
        .with_attribute(
            "additional_policies",
            SchemaAttribute::map(AttributeType::String)
                .with_description("Additional IAM policies by role")
                .optional(),
        )
        .with_block("subnet", NestedBlock::list(subnet_block()).computed())
        .with_block("topology", NestedBlock::single(topology_block()))
        .with_block(
            "etcd_cluster",
            NestedBlock::list(etcd_cluster_block()).min_items(1),
        )
}

/// The cluster attribute tree shared by the resource and the data source
pub fn cluster_schema_block() -> SchemaBlock {
    SchemaBlock::new()
        .with_block(
            "metadata",
            NestedBlock::single(metadata_block()).min_items(1),
        )
        .with_block("spec", NestedBlock::single(cluster_spec_block()))
}

/// Make every attribute of a block provider-set
fn into_computed(mut block: SchemaBlock) -> SchemaBlock {
    for attr in block.attributes.values_mut() {
        attr.required = false;
        attr.optional = false;
        attr.computed = true;
        attr.validator = None;
    }
    block.blocks = block
        .blocks
        .into_iter()
        .map(|(name, mut nested)| {
            nested.block = into_computed(nested.block);
            nested.min_items = None;
            nested.computed = true;
            (name, nested)
        })
        .collect();
    block
}

fn id_attribute() -> SchemaAttribute {
    SchemaAttribute::string()
        .with_description("Cluster name")
        .computed()
}

fn read_failed(e: impl std::fmt::Display) -> Vec<Diagnostic> {
    vec![Diagnostic::error(&format!("Failed to read cluster: {}", e))]
}

fn state_from_tree(tree: AttributeTree, id: &str) -> ResourceState {
    let mut state = ResourceState::from(tree);
    state.set("id", serde_json::json!(id));
    state
}

// ============================================================================
// Cluster Resource
// ============================================================================

pub struct ClusterResource;

impl ClusterResource {
    pub fn new() -> Self {
        Self
    }

    fn cluster_id(state: &ResourceState) -> ResourceResult<String> {
        state
            .get_string("id")
            .filter(|id| !id.is_empty())
            .or_else(|| state.metadata_name())
            .ok_or_else(|| vec![Diagnostic::error("Cluster ID is required")])
    }
}

impl Default for ClusterResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resource for ClusterResource {
    fn type_name(&self) -> &str {
        CLUSTER_TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        let block = cluster_schema_block()
            .with_attribute("id", id_attribute())
            .with_description("A kops cluster read from the kops state store");

        ResourceSchema::new(1, block)
    }

    async fn create(
        &self,
        _client: &KopsClient,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let name = planned.metadata_name().ok_or_else(|| {
            vec![Diagnostic::error("metadata.name is required")
                .with_attribute(vec!["metadata".into(), "0".into(), "name".into()])]
        })?;

        tracing::warn!(cluster = %name, "kops_cluster create does not modify the state store");

        let mut state = planned.clone();
        state.set("id", serde_json::json!(name));
        Ok(state)
    }

    async fn read(
        &self,
        client: &KopsClient,
        current: &ResourceState,
    ) -> ResourceResult<Option<ResourceState>> {
        let id = Self::cluster_id(current)?;

        match read_cluster(client, &id).await {
            Ok(tree) => Ok(Some(state_from_tree(tree, &id))),
            Err(e) if e.is_not_found() => {
                // Resource no longer exists
                tracing::info!(cluster = %id, "Cluster not found in state store");
                Ok(None)
            }
            Err(e) => Err(read_failed(e)),
        }
    }

    async fn exists(&self, client: &KopsClient, current: &ResourceState) -> ResourceResult<bool> {
        let id = Self::cluster_id(current)?;
        cluster_exists(client, &id).await.map_err(read_failed)
    }

    async fn update(
        &self,
        _client: &KopsClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let id = Self::cluster_id(current)?;
        tracing::warn!(cluster = %id, "kops_cluster update does not modify the state store");

        let mut state = planned.clone();
        state.set("id", serde_json::json!(id));
        Ok(state)
    }

    async fn delete(&self, _client: &KopsClient, current: &ResourceState) -> ResourceResult<()> {
        let id = Self::cluster_id(current)?;
        tracing::warn!(cluster = %id, "kops_cluster delete does not modify the state store");
        Ok(())
    }

    fn plan_change(
        &self,
        current: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let block = self.schema().block;
        match AttributeTree::from_json(&block, &proposed.to_value()) {
            Ok(tree) => {
                expand_cluster(&tree).map_err(|e| {
                    vec![Diagnostic::error("Invalid cluster configuration").with_detail(&e.to_string())]
                })?;
            }
            // Values known only after apply cannot be checked yet
            Err(AttributeError::Unknown { .. }) => {}
            Err(e) => {
                return Err(vec![
                    Diagnostic::error("Invalid cluster configuration").with_detail(&e.to_string())
                ])
            }
        }

        let mut planned = proposed.clone();
        if let Some(name) = proposed.metadata_name() {
            planned.set("id", serde_json::json!(name));
        }

        // Keep the computed creation timestamp from prior state
        if let Some(prior_timestamp) = current
            .and_then(|c| c.get("metadata"))
            .and_then(|m| m.get(0))
            .and_then(|m| m.get("creation_timestamp"))
            .filter(|t| !t.is_null())
        {
            if let Some(metadata) = planned
                .values
                .get_mut("metadata")
                .and_then(|m| m.get_mut(0))
                .and_then(|m| m.as_object_mut())
            {
                metadata
                    .entry("creation_timestamp")
                    .and_modify(|t| {
                        if t.is_null() {
                            *t = prior_timestamp.clone();
                        }
                    })
                    .or_insert_with(|| prior_timestamp.clone());
            }
        }

        Ok(planned)
    }
}

// ============================================================================
// Cluster Data Source
// ============================================================================

pub struct ClusterDataSource;

impl ClusterDataSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClusterDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for ClusterDataSource {
    fn type_name(&self) -> &str {
        CLUSTER_TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        let mut block = cluster_schema_block();
        if let Some(mut spec) = block.blocks.remove("spec") {
            spec.block = into_computed(spec.block);
            spec.computed = true;
            block.blocks.insert("spec".to_string(), spec);
        }

        let block = block
            .with_attribute("id", id_attribute())
            .with_description("Look up a kops cluster in the kops state store");

        ResourceSchema::new(1, block)
    }

    async fn read(&self, client: &KopsClient, config: &ResourceState) -> ResourceResult<ResourceState> {
        let name = config.metadata_name().ok_or_else(|| {
            vec![Diagnostic::error("metadata.name is required")
                .with_attribute(vec!["metadata".into(), "0".into(), "name".into()])]
        })?;

        match read_cluster(client, &name).await {
            Ok(tree) => Ok(state_from_tree(tree, &name)),
            Err(e) if e.is_not_found() => {
                Err(vec![Diagnostic::error(&format!("Cluster {} not found", name))])
            }
            Err(e) => Err(read_failed(e)),
        }
    }
}

/// Get all available resources
pub fn get_all_resources() -> Vec<Box<dyn Resource>> {
    vec![Box::new(ClusterResource::new())]
}

/// Get all available data sources
pub fn get_all_data_sources() -> Vec<Box<dyn DataSource>> {
    vec![Box::new(ClusterDataSource::new())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StateStore;
    use crate::schema::UNKNOWN_VALUE;
    use serde_json::json;

    const MANIFEST: &str = r#"
kind: Cluster
metadata:
  name: prod.k8s.local
  creationTimestamp: "2024-03-01T10:00:00Z"
spec:
  cloudProvider: aws
  subnets:
  - name: us-east-1a
    cidr: 172.20.32.0/19
    zone: us-east-1a
    type: Private
"#;

    fn local_client(dir: &tempfile::TempDir) -> KopsClient {
        KopsClient::new(StateStore::Local(dir.path().to_path_buf())).unwrap()
    }

    fn write_cluster(dir: &tempfile::TempDir, name: &str, manifest: &str) {
        std::fs::create_dir_all(dir.path().join(name)).unwrap();
        std::fs::write(dir.path().join(name).join("config"), manifest).unwrap();
    }

    fn config(value: Value) -> ResourceState {
        ResourceState::from_value(&value).unwrap()
    }

    #[test]
    fn test_resource_state() {
        let mut state = ResourceState::new();
        state.set("id", json!("prod.k8s.local"));
        state.set("metadata", json!([{"name": "prod.k8s.local"}]));

        assert_eq!(state.get_string("id"), Some("prod.k8s.local".to_string()));
        assert_eq!(state.metadata_name(), Some("prod.k8s.local".to_string()));
        assert_eq!(ResourceState::from_value(&state.to_value()), Some(state));
        assert!(ResourceState::from_value(&Value::Null).is_none());
    }

    #[test]
    fn test_cluster_resource_schema() {
        let schema = ClusterResource::new().schema();
        let spec = &schema.block.blocks["spec"].block;

        assert!(schema.block.attributes.contains_key("id"));
        assert_eq!(schema.block.blocks["metadata"].max_items, Some(1));
        assert!(schema.block.blocks["metadata"].block.attributes["creation_timestamp"].computed);
        assert!(spec.attributes["network_cidr"].validator.is_some());
        assert!(spec.blocks["subnet"].computed);
        assert!(spec.blocks["etcd_cluster"].is_required());
        assert!(spec.blocks["topology"].block.blocks.contains_key("bastion"));
        assert!(spec.blocks["etcd_cluster"].block.blocks["etcd_member"]
            .block
            .attributes
            .contains_key("kms_key_id"));
    }

    #[test]
    fn test_data_source_schema_is_computed() {
        let schema = ClusterDataSource::new().schema();
        let spec = &schema.block.blocks["spec"];

        assert!(schema.block.blocks["metadata"].block.attributes["name"].required);
        assert!(spec.computed);
        assert!(spec.block.attributes.values().all(|a| a.computed && !a.optional));
        assert!(!spec.block.blocks["etcd_cluster"].is_required());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let diagnostics = ClusterResource::new().validate(&json!({
            "metadata": [{"name": "prod.k8s.local"}],
            "spec": [{
                "network_cidr": "172.20.0.0/99",
                "subnet": [{"name": "a", "cidr": "10.0.0.0/24", "zone": "a", "type": "Dmz"}],
                "topology": [{"dns": [{"type": "Internal"}]}],
                "etcd_cluster": [{"name": "main", "etcd_member": [{"name": "a", "instance_group": "master"}]}]
            }]
        }));

        let paths: Vec<String> = diagnostics
            .iter()
            .map(|d| d.attribute.clone().unwrap_or_default().join("."))
            .collect();
        assert_eq!(diagnostics.len(), 3, "{:?}", paths);
        assert!(paths.contains(&"spec.0.network_cidr".to_string()));
        assert!(paths.contains(&"spec.0.subnet.0.type".to_string()));
        assert!(paths.contains(&"spec.0.topology.0.dns.0.type".to_string()));
    }

    #[test]
    fn test_plan_sets_id_and_keeps_timestamp() {
        let resource = ClusterResource::new();
        let proposed = config(json!({
            "metadata": [{"name": "prod.k8s.local", "creation_timestamp": null}],
            "spec": null
        }));
        let prior = config(json!({
            "metadata": [{"name": "prod.k8s.local", "creation_timestamp": "2024-03-01T10:00:00Z"}]
        }));

        let planned = resource.plan_change(Some(&prior), &proposed).unwrap();
        assert_eq!(planned.get_string("id"), Some("prod.k8s.local".to_string()));
        assert_eq!(
            planned.get("metadata").unwrap()[0]["creation_timestamp"],
            json!("2024-03-01T10:00:00Z")
        );
    }

    #[test]
    fn test_plan_rejects_malformed_configuration() {
        let resource = ClusterResource::new();
        let proposed = config(json!({"metadata": [{"name": ""}]}));
        assert!(resource.plan_change(None, &proposed).is_err());

        let proposed = config(json!({"metadata": [{"name": UNKNOWN_VALUE}]}));
        assert!(resource.plan_change(None, &proposed).is_ok());
    }

    #[tokio::test]
    async fn test_read_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        write_cluster(&dir, "prod.k8s.local", MANIFEST);
        let client = local_client(&dir);
        let resource = ClusterResource::new();

        let current = config(json!({"id": "prod.k8s.local"}));
        assert!(resource.exists(&client, &current).await.unwrap());

        let state = resource.read(&client, &current).await.unwrap().unwrap();
        assert_eq!(state.get_string("id"), Some("prod.k8s.local".to_string()));
        assert_eq!(state.metadata_name(), Some("prod.k8s.local".to_string()));
        assert_eq!(state.get("spec").unwrap()[0]["subnet"][0]["type"], json!("Private"));
    }

    #[tokio::test]
    async fn test_missing_cluster_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let client = local_client(&dir);
        let resource = ClusterResource::new();
        let current = config(json!({"id": "ghost.k8s.local"}));

        assert!(!resource.exists(&client, &current).await.unwrap());
        assert!(resource.read(&client, &current).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let dir = tempfile::tempdir().unwrap();
        write_cluster(&dir, "broken.k8s.local", "kind: [");
        let client = local_client(&dir);
        let resource = ClusterResource::new();
        let current = config(json!({"id": "broken.k8s.local"}));

        let diagnostics = resource.exists(&client, &current).await.unwrap_err();
        assert!(diagnostics[0].summary.starts_with("Failed to read cluster"));
        assert!(resource.read(&client, &current).await.is_err());
    }

    #[tokio::test]
    async fn test_write_operations_do_not_touch_store() {
        let dir = tempfile::tempdir().unwrap();
        let client = local_client(&dir);
        let resource = ClusterResource::new();
        let planned = config(json!({"metadata": [{"name": "new.k8s.local"}]}));

        let created = resource.create(&client, &planned).await.unwrap();
        assert_eq!(created.get_string("id"), Some("new.k8s.local".to_string()));

        let updated = resource.update(&client, &created, &planned).await.unwrap();
        assert_eq!(updated.get_string("id"), Some("new.k8s.local".to_string()));

        resource.delete(&client, &created).await.unwrap();
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_data_source_read() {
        let dir = tempfile::tempdir().unwrap();
        write_cluster(&dir, "prod.k8s.local", MANIFEST);
        let client = local_client(&dir);
        let data_source = ClusterDataSource::new();

        let state = data_source
            .read(&client, &config(json!({"metadata": [{"name": "prod.k8s.local"}]})))
            .await
            .unwrap();
        assert_eq!(state.get_string("id"), Some("prod.k8s.local".to_string()));

        let err = data_source
            .read(&client, &config(json!({"metadata": [{"name": "ghost.k8s.local"}]})))
            .await
            .unwrap_err();
        assert_eq!(err[0].summary, "Cluster ghost.k8s.local not found");
    }
}
