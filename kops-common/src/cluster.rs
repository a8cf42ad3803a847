//! kops cluster model
//!
//! Mirrors the subset of the `kops.k8s.io/v1alpha2` Cluster object that the
//! provider exposes. Manifest keys use the kops spelling (`networkCIDR`,
//! `clusterDNSDomain`, ...); keys not modelled here are ignored on read.

use crate::{Error, Result, API_VERSION, CLUSTER_KIND};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    CLUSTER_KIND.to_string()
}

/// A kops cluster as stored in the state store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ClusterSpec,
}

impl Cluster {
    /// Create a cluster with the given name and an empty spec
    pub fn new(name: &str) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: name.to_string(),
                creation_timestamp: None,
            },
            spec: ClusterSpec::default(),
        }
    }

    /// Decode a cluster manifest, rejecting objects of any other kind
    pub fn from_yaml(manifest: &str) -> Result<Self> {
        let cluster: Cluster = serde_yaml::from_str(manifest)?;
        if cluster.kind != CLUSTER_KIND {
            return Err(Error::UnexpectedKind {
                expected: CLUSTER_KIND.to_string(),
                actual: cluster.kind,
            });
        }
        Ok(cluster)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// Object metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

/// Cluster specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterSpec {
    pub channel: String,
    pub cloud_provider: String,
    #[serde(rename = "clusterDNSDomain")]
    pub cluster_dns_domain: String,
    pub config_base: String,
    pub config_store: String,
    pub dns_zone: String,
    pub key_store: String,
    pub kubernetes_version: String,
    pub master_internal_name: String,
    pub master_public_name: String,
    #[serde(rename = "networkCIDR")]
    pub network_cidr: String,
    #[serde(rename = "networkID")]
    pub network_id: String,
    #[serde(rename = "nonMasqueradeCIDR")]
    pub non_masquerade_cidr: String,
    pub project: String,
    pub secret_store: String,
    #[serde(rename = "serviceClusterIPRange")]
    pub service_cluster_ip_range: String,
    pub ssh_key_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_access: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kubernetes_api_access: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_policies: BTreeMap<String, String>,
    pub subnets: Vec<Subnet>,
    pub topology: Topology,
    pub etcd_clusters: Vec<EtcdClusterSpec>,
}

/// Subnet role within the cluster network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubnetType {
    Public,
    Private,
    Utility,
}

impl SubnetType {
    pub const ALL: [&'static str; 3] = ["Public", "Private", "Utility"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Private => "Private",
            Self::Utility => "Utility",
        }
    }
}

impl fmt::Display for SubnetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubnetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Public" => Ok(Self::Public),
            "Private" => Ok(Self::Private),
            "Utility" => Ok(Self::Utility),
            other => Err(Error::InvalidEnum {
                field: "subnet type",
                value: other.to_string(),
            }),
        }
    }
}

/// Cluster subnet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub name: String,
    #[serde(default)]
    pub cidr: String,
    #[serde(default)]
    pub zone: String,
    #[serde(rename = "type")]
    pub subnet_type: SubnetType,
}

/// Placement of masters and nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Topology {
    pub masters: String,
    pub nodes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bastion: Option<BastionSpec>,
    pub dns: DnsSpec,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            masters: "public".to_string(),
            nodes: "public".to_string(),
            bastion: None,
            dns: DnsSpec::default(),
        }
    }
}

/// Bastion host settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BastionSpec {
    pub bastion_public_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_seconds: Option<i64>,
}

/// Visibility of the cluster DNS zone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsType {
    #[default]
    Public,
    Private,
}

impl DnsType {
    pub const ALL: [&'static str; 2] = ["Public", "Private"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Private => "Private",
        }
    }
}

impl fmt::Display for DnsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DnsType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Public" => Ok(Self::Public),
            "Private" => Ok(Self::Private),
            other => Err(Error::InvalidEnum {
                field: "dns type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsSpec {
    #[serde(rename = "type")]
    pub dns_type: DnsType,
}

/// An etcd cluster backing the control plane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EtcdClusterSpec {
    pub name: String,
    pub etcd_members: Vec<EtcdMemberSpec>,
    #[serde(rename = "enableEtcdTLS")]
    pub enable_etcd_tls: bool,
    #[serde(rename = "enableTLSAuth")]
    pub enable_tls_auth: bool,
    pub version: String,
    #[serde(
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub leader_election_timeout: Option<Duration>,
    #[serde(
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub heartbeat_interval: Option<Duration>,
    pub image: String,
}

/// A single etcd member and its volume
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdMemberSpec {
    pub name: String,
    #[serde(default)]
    pub instance_group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_iops: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_volume: Option<bool>,
}
