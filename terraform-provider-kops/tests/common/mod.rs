//! Common test utilities and helpers

use serde_json::{json, Value};
use std::path::Path;
use terraform_provider_kops::KopsProvider;
use tempfile::TempDir;

pub const PROD_CLUSTER: &str = r#"
apiVersion: kops.k8s.io/v1alpha2
kind: Cluster
metadata:
  name: prod.k8s.local
  creationTimestamp: "2024-03-01T10:00:00Z"
spec:
  channel: stable
  cloudProvider: aws
  configBase: s3://my-bucket/prod.k8s.local
  kubernetesVersion: 1.28.5
  networkCIDR: 172.20.0.0/16
  nonMasqueradeCIDR: 100.64.0.0/10
  sshAccess:
  - 0.0.0.0/0
  subnets:
  - name: us-east-1a
    cidr: 172.20.32.0/19
    zone: us-east-1a
    type: Private
  - name: us-east-1b
    cidr: 172.20.64.0/19
    zone: us-east-1b
    type: Public
  topology:
    masters: private
    nodes: private
    dns:
      type: Public
  etcdClusters:
  - name: main
    enableEtcdTLS: true
    leaderElectionTimeout: 2500ms
    etcdMembers:
    - name: a
      instanceGroup: master-us-east-1a
      encryptedVolume: true
"#;

/// A provider wired to a temporary local state store
pub struct TestEnv {
    pub dir: TempDir,
    pub provider: KopsProvider,
    next_id: i64,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create state store dir"),
            provider: KopsProvider::new().expect("Failed to create provider"),
            next_id: 0,
        }
    }

    /// Create an environment whose provider is already configured
    pub fn configured() -> Self {
        let mut env = Self::new();
        env.write_cluster("prod.k8s.local", PROD_CLUSTER);
        let response = env.call(
            "ConfigureProvider",
            json!({"config": {"state_store": env.store_uri()}}),
        );
        assert_eq!(diagnostics(&response), &Vec::<Value>::new());
        env
    }

    pub fn store_uri(&self) -> String {
        format!("file://{}/", self.dir.path().display())
    }

    pub fn store_path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_cluster(&self, name: &str, manifest: &str) {
        let cluster_dir = self.dir.path().join(name);
        std::fs::create_dir_all(&cluster_dir).expect("Failed to create cluster dir");
        std::fs::write(cluster_dir.join("config"), manifest).expect("Failed to write manifest");
    }

    /// Send one JSON-RPC request and decode the response
    pub fn call(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.next_id,
            "method": method,
            "params": params
        });
        let response: Value = serde_json::from_str(&self.provider.handle_request(&request.to_string()))
            .expect("Response is not JSON");
        assert_eq!(response["id"], self.next_id);
        response
    }
}

/// Diagnostics of a response, empty when none were reported
pub fn diagnostics(response: &Value) -> &Vec<Value> {
    static EMPTY: Vec<Value> = Vec::new();
    response["result"]["diagnostics"].as_array().unwrap_or(&EMPTY)
}
