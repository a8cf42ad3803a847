//! Attribute tree to cluster expansion
//!
//! The inverse of [`crate::flatten`]. The provider never writes clusters back
//! to the state store; expansion is used to check that planned configuration
//! describes a well-formed cluster.

use crate::attributes::{AttrValue, AttributeTree};
use chrono::{DateTime, Utc};
use kops_common::{
    BastionSpec, Cluster, ClusterSpec, DnsSpec, DnsType, EtcdClusterSpec, EtcdMemberSpec,
    ObjectMeta, Subnet, SubnetType, Topology,
};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    #[error("{0} is required")]
    Missing(String),
    #[error("{path}: {message}")]
    Invalid { path: String, message: String },
}

type Result<T> = std::result::Result<T, ExpandError>;

fn string(tree: &AttributeTree, key: &str) -> String {
    tree.get_str(key).unwrap_or_default().to_string()
}

fn strings(tree: &AttributeTree, key: &str) -> Vec<String> {
    tree.get_list(key)
        .iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect()
}

fn invalid(path: String, message: impl ToString) -> ExpandError {
    ExpandError::Invalid {
        path,
        message: message.to_string(),
    }
}

/// Rebuild a cluster from its attribute tree
pub fn expand_cluster(tree: &AttributeTree) -> Result<Cluster> {
    let metadata = tree
        .block("metadata")
        .ok_or_else(|| ExpandError::Missing("metadata".to_string()))?;

    let name = metadata
        .get_str("name")
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ExpandError::Missing("metadata.0.name".to_string()))?;

    let creation_timestamp = match metadata.get_str("creation_timestamp") {
        None | Some("") => None,
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|e| invalid("metadata.0.creation_timestamp".to_string(), e))?
                .with_timezone(&Utc),
        ),
    };

    let spec = match tree.block("spec") {
        Some(spec) => expand_cluster_spec(spec)?,
        None => ClusterSpec::default(),
    };

    let mut cluster = Cluster::new(name);
    cluster.metadata = ObjectMeta {
        name: name.to_string(),
        creation_timestamp,
    };
    cluster.spec = spec;
    Ok(cluster)
}

fn expand_cluster_spec(tree: &AttributeTree) -> Result<ClusterSpec> {
    let additional_policies = match tree.get("additional_policies") {
        Some(value) => match value {
            AttrValue::Map(entries) => entries.clone(),
            _ => {
                return Err(invalid(
                    "spec.0.additional_policies".to_string(),
                    "expected a map of strings",
                ))
            }
        },
        None => BTreeMap::new(),
    };

    let subnets = tree
        .blocks("subnet")
        .enumerate()
        .map(|(i, subnet)| expand_subnet(subnet, i))
        .collect::<Result<Vec<_>>>()?;

    let topology = match tree.block("topology") {
        Some(topology) => expand_topology(topology)?,
        None => Topology::default(),
    };

    let etcd_clusters = tree
        .blocks("etcd_cluster")
        .enumerate()
        .map(|(i, etcd)| expand_etcd_cluster(etcd, i))
        .collect::<Result<Vec<_>>>()?;

    Ok(ClusterSpec {
        channel: string(tree, "channel"),
        cloud_provider: string(tree, "cloud_provider"),
        cluster_dns_domain: string(tree, "cluster_dnsdomain"),
        config_base: string(tree, "config_base"),
        config_store: string(tree, "config_store"),
        dns_zone: string(tree, "dnszone"),
        key_store: string(tree, "key_store"),
        kubernetes_version: string(tree, "kubernetes_version"),
        master_internal_name: string(tree, "master_internal_name"),
        master_public_name: string(tree, "master_public_name"),
        network_cidr: string(tree, "network_cidr"),
        network_id: string(tree, "network_id"),
        non_masquerade_cidr: string(tree, "non_masquerade_cidr"),
        project: string(tree, "project"),
        secret_store: string(tree, "secret_store"),
        service_cluster_ip_range: string(tree, "service_cluster_iprange"),
        ssh_key_name: string(tree, "sshkey_name"),
        ssh_access: strings(tree, "ssh_access"),
        kubernetes_api_access: strings(tree, "kubernetes_api_access"),
        additional_policies,
        subnets,
        topology,
        etcd_clusters,
    })
}

fn expand_subnet(tree: &AttributeTree, index: usize) -> Result<Subnet> {
    let raw_type = tree.get_str("type").unwrap_or_default();
    let subnet_type: SubnetType = raw_type
        .parse()
        .map_err(|e| invalid(format!("spec.0.subnet.{}.type", index), e))?;

    Ok(Subnet {
        name: string(tree, "name"),
        cidr: string(tree, "cidr"),
        zone: string(tree, "zone"),
        subnet_type,
    })
}

fn expand_topology(tree: &AttributeTree) -> Result<Topology> {
    let defaults = Topology::default();

    let bastion = tree.block("bastion").map(|bastion| BastionSpec {
        bastion_public_name: string(bastion, "bastion_public_name"),
        idle_timeout_seconds: bastion.get_int("idle_timeout_seconds"),
    });

    let dns_type = match tree.block("dns").and_then(|dns| dns.get_str("type")) {
        Some(raw) => raw
            .parse::<DnsType>()
            .map_err(|e| invalid("spec.0.topology.0.dns.0.type".to_string(), e))?,
        None => DnsType::default(),
    };

    Ok(Topology {
        masters: tree.get_str("masters").map(String::from).unwrap_or(defaults.masters),
        nodes: tree.get_str("nodes").map(String::from).unwrap_or(defaults.nodes),
        bastion,
        dns: DnsSpec { dns_type },
    })
}

fn millis(tree: &AttributeTree, key: &str, path: String) -> Result<Option<Duration>> {
    tree.get_int(key)
        .map(|ms| {
            u64::try_from(ms)
                .map(Duration::from_millis)
                .map_err(|_| invalid(path, "must not be negative"))
        })
        .transpose()
}

fn small_int(tree: &AttributeTree, key: &str, path: String) -> Result<Option<i32>> {
    tree.get_int(key)
        .map(|v| i32::try_from(v).map_err(|_| invalid(path, "value out of range")))
        .transpose()
}

fn expand_etcd_cluster(tree: &AttributeTree, index: usize) -> Result<EtcdClusterSpec> {
    let path = format!("spec.0.etcd_cluster.{}", index);

    let etcd_members = tree
        .blocks("etcd_member")
        .enumerate()
        .map(|(i, member)| {
            let member_path = format!("{}.etcd_member.{}", path, i);
            Ok(EtcdMemberSpec {
                name: string(member, "name"),
                instance_group: string(member, "instance_group"),
                volume_type: member.get_str("volume_type").map(String::from),
                volume_iops: small_int(member, "volume_iops", format!("{}.volume_iops", member_path))?,
                volume_size: small_int(member, "volume_size", format!("{}.volume_size", member_path))?,
                kms_key_id: member.get_str("kms_key_id").map(String::from),
                encrypted_volume: member.get_bool("encrypted_volume"),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(EtcdClusterSpec {
        name: string(tree, "name"),
        etcd_members,
        enable_etcd_tls: tree.get_bool("enable_etcd_tls").unwrap_or(false),
        enable_tls_auth: tree.get_bool("enable_tls_auth").unwrap_or(false),
        version: string(tree, "version"),
        leader_election_timeout: millis(
            tree,
            "leader_election_timeout",
            format!("{}.leader_election_timeout", path),
        )?,
        heartbeat_interval: millis(tree, "heartbeat_interval", format!("{}.heartbeat_interval", path))?,
        image: string(tree, "image"),
    })
}
