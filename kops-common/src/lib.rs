//! Common types shared by the kops Terraform provider
//!
//! Holds the typed kops cluster model as it is stored in a state store
//! (`<state_store>/<cluster>/config`) and the errors raised while decoding it.

pub mod cluster;
pub mod duration;

pub use cluster::{
    BastionSpec, Cluster, ClusterSpec, DnsSpec, DnsType, EtcdClusterSpec, EtcdMemberSpec,
    ObjectMeta, Subnet, SubnetType, Topology,
};

/// API group/version written by kops for cluster manifests
pub const API_VERSION: &str = "kops.k8s.io/v1alpha2";

/// Object kind of a cluster manifest
pub const CLUSTER_KIND: &str = "Cluster";

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid cluster manifest: {0}")]
    InvalidManifest(#[from] serde_yaml::Error),

    #[error("Unexpected object kind: expected {expected}, got {actual}")]
    UnexpectedKind { expected: String, actual: String },

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid {field} value: {value}")]
    InvalidEnum { field: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;
