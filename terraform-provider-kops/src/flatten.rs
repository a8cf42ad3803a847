//! Cluster to attribute tree flattening
//!
//! Every read rebuilds the tree from the stored cluster. Optional upstream
//! values that are unset are left out of the tree instead of being written as
//! zero values, so they never show up as diffs against configuration.

use crate::attributes::{AttrValue, AttributeTree};
use crate::client::{KopsClient, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use kops_common::{
    BastionSpec, Cluster, ClusterSpec, EtcdClusterSpec, EtcdMemberSpec, ObjectMeta, Subnet,
    Topology,
};
use std::time::Duration;

/// Fetch a cluster from the state store and flatten it
pub async fn read_cluster(client: &KopsClient, name: &str) -> Result<AttributeTree> {
    let cluster = client.get_cluster(name).await?;
    Ok(flatten_cluster(&cluster))
}

/// Report whether a cluster exists; only lookup failures other than
/// "not found" are errors
pub async fn cluster_exists(client: &KopsClient, name: &str) -> Result<bool> {
    match client.get_cluster(name).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => {
            tracing::debug!(cluster = name, "Cluster does not exist");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Render a creation timestamp for display (`2024-03-01T10:00:00Z`)
pub fn format_timestamp(timestamp: Option<&DateTime<Utc>>) -> String {
    timestamp
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Whole milliseconds, rounded to nearest. Sub-millisecond precision does not
/// survive the attribute tree.
pub(crate) fn duration_millis(duration: &Duration) -> i64 {
    let nanos = duration.as_nanos();
    if nanos % 1_000_000 != 0 {
        tracing::warn!(
            duration = ?duration,
            "Duration has sub-millisecond precision, rounding to whole milliseconds"
        );
    }
    i64::try_from((nanos + 500_000) / 1_000_000).unwrap_or(i64::MAX)
}

pub fn flatten_cluster(cluster: &Cluster) -> AttributeTree {
    let mut tree = AttributeTree::new();
    tree.insert_block("metadata", flatten_metadata(&cluster.metadata));
    tree.insert_block("spec", flatten_cluster_spec(&cluster.spec));
    tree
}

fn flatten_metadata(metadata: &ObjectMeta) -> AttributeTree {
    let mut tree = AttributeTree::new();
    tree.insert("name", metadata.name.as_str());
    tree.insert(
        "creation_timestamp",
        format_timestamp(metadata.creation_timestamp.as_ref()),
    );
    tree
}

fn flatten_cluster_spec(spec: &ClusterSpec) -> AttributeTree {
    let mut tree = AttributeTree::new();

    tree.insert("channel", spec.channel.as_str());
    tree.insert("cloud_provider", spec.cloud_provider.as_str());
    tree.insert("cluster_dnsdomain", spec.cluster_dns_domain.as_str());
    tree.insert("config_base", spec.config_base.as_str());
    tree.insert("config_store", spec.config_store.as_str());
    tree.insert("dnszone", spec.dns_zone.as_str());
    tree.insert("key_store", spec.key_store.as_str());
    tree.insert("kubernetes_version", spec.kubernetes_version.as_str());
    tree.insert("master_internal_name", spec.master_internal_name.as_str());
    tree.insert("master_public_name", spec.master_public_name.as_str());
    tree.insert("network_cidr", spec.network_cidr.as_str());
    tree.insert("network_id", spec.network_id.as_str());
    tree.insert("non_masquerade_cidr", spec.non_masquerade_cidr.as_str());
    tree.insert("project", spec.project.as_str());
    tree.insert("secret_store", spec.secret_store.as_str());
    tree.insert("service_cluster_iprange", spec.service_cluster_ip_range.as_str());
    tree.insert("sshkey_name", spec.ssh_key_name.as_str());

    if !spec.ssh_access.is_empty() {
        tree.insert("ssh_access", string_list(&spec.ssh_access));
    }
    if !spec.kubernetes_api_access.is_empty() {
        tree.insert("kubernetes_api_access", string_list(&spec.kubernetes_api_access));
    }
    if !spec.additional_policies.is_empty() {
        tree.insert("additional_policies", AttrValue::Map(spec.additional_policies.clone()));
    }

    tree.insert("subnet", flatten_subnets(&spec.subnets));
    tree.insert_block("topology", flatten_topology(&spec.topology));
    tree.insert(
        "etcd_cluster",
        AttrValue::List(
            spec.etcd_clusters
                .iter()
                .map(|etcd| AttrValue::Block(flatten_etcd_cluster(etcd)))
                .collect(),
        ),
    );

    tree
}

fn string_list(values: &[String]) -> AttrValue {
    AttrValue::List(values.iter().map(|v| AttrValue::from(v.as_str())).collect())
}

fn flatten_subnets(subnets: &[Subnet]) -> AttrValue {
    AttrValue::List(
        subnets
            .iter()
            .map(|subnet| {
                let mut tree = AttributeTree::new();
                tree.insert("name", subnet.name.as_str());
                tree.insert("cidr", subnet.cidr.as_str());
                tree.insert("zone", subnet.zone.as_str());
                tree.insert("type", subnet.subnet_type.as_str());
                AttrValue::Block(tree)
            })
            .collect(),
    )
}

fn flatten_topology(topology: &Topology) -> AttributeTree {
    let mut tree = AttributeTree::new();
    tree.insert("masters", topology.masters.as_str());
    tree.insert("nodes", topology.nodes.as_str());

    if let Some(bastion) = &topology.bastion {
        tree.insert_block("bastion", flatten_bastion(bastion));
    }

    let mut dns = AttributeTree::new();
    dns.insert("type", topology.dns.dns_type.as_str());
    tree.insert_block("dns", dns);

    tree
}

fn flatten_bastion(bastion: &BastionSpec) -> AttributeTree {
    let mut tree = AttributeTree::new();
    tree.insert("bastion_public_name", bastion.bastion_public_name.as_str());
    if let Some(timeout) = bastion.idle_timeout_seconds {
        tree.insert("idle_timeout_seconds", timeout);
    }
    tree
}

fn flatten_etcd_cluster(etcd: &EtcdClusterSpec) -> AttributeTree {
    let mut tree = AttributeTree::new();
    tree.insert("name", etcd.name.as_str());
    tree.insert(
        "etcd_member",
        AttrValue::List(
            etcd.etcd_members
                .iter()
                .map(|member| AttrValue::Block(flatten_etcd_member(member)))
                .collect(),
        ),
    );
    tree.insert("enable_etcd_tls", etcd.enable_etcd_tls);
    tree.insert("enable_tls_auth", etcd.enable_tls_auth);
    tree.insert("version", etcd.version.as_str());
    if let Some(timeout) = &etcd.leader_election_timeout {
        tree.insert("leader_election_timeout", duration_millis(timeout));
    }
    if let Some(interval) = &etcd.heartbeat_interval {
        tree.insert("heartbeat_interval", duration_millis(interval));
    }
    tree.insert("image", etcd.image.as_str());
    tree
}

fn flatten_etcd_member(member: &EtcdMemberSpec) -> AttributeTree {
    let mut tree = AttributeTree::new();
    tree.insert("name", member.name.as_str());
    tree.insert("instance_group", member.instance_group.as_str());
    if let Some(volume_type) = &member.volume_type {
        tree.insert("volume_type", volume_type.as_str());
    }
    if let Some(iops) = member.volume_iops {
        tree.insert("volume_iops", iops);
    }
    if let Some(size) = member.volume_size {
        tree.insert("volume_size", size);
    }
    if let Some(key) = &member.kms_key_id {
        tree.insert("kms_key_id", key.as_str());
    }
    if let Some(encrypted) = member.encrypted_volume {
        tree.insert("encrypted_volume", encrypted);
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kops_common::{DnsType, SubnetType};

    fn subnet(name: &str, cidr: &str, subnet_type: SubnetType) -> Subnet {
        Subnet {
            name: name.to_string(),
            cidr: cidr.to_string(),
            zone: name.to_string(),
            subnet_type,
        }
    }

    fn sample_cluster() -> Cluster {
        let mut cluster = Cluster::new("prod.k8s.local");
        cluster.metadata.creation_timestamp = Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        cluster.spec.cloud_provider = "aws".to_string();
        cluster.spec.network_cidr = "172.20.0.0/16".to_string();
        cluster.spec.subnets = vec![
            subnet("us-east-1a", "172.20.32.0/19", SubnetType::Private),
            subnet("us-east-1b", "172.20.64.0/19", SubnetType::Public),
        ];
        cluster.spec.etcd_clusters = vec![EtcdClusterSpec {
            name: "main".to_string(),
            etcd_members: vec![EtcdMemberSpec {
                name: "a".to_string(),
                instance_group: "master-us-east-1a".to_string(),
                volume_size: Some(20),
                ..Default::default()
            }],
            heartbeat_interval: Some(Duration::from_millis(250)),
            ..Default::default()
        }];
        cluster
    }

    #[test]
    fn test_metadata_block() {
        let tree = flatten_cluster(&sample_cluster());
        let metadata = tree.block("metadata").unwrap();

        assert_eq!(tree.get_list("metadata").len(), 1);
        assert_eq!(metadata.get_str("name"), Some("prod.k8s.local"));
        assert_eq!(metadata.get_str("creation_timestamp"), Some("2024-03-01T10:00:00Z"));
    }

    #[test]
    fn test_scalars_copied_verbatim() {
        let tree = flatten_cluster(&sample_cluster());
        let spec = tree.block("spec").unwrap();

        assert_eq!(spec.get_str("cloud_provider"), Some("aws"));
        assert_eq!(spec.get_str("network_cidr"), Some("172.20.0.0/16"));
        assert_eq!(spec.get_str("channel"), Some(""));
        assert!(!spec.contains_key("ssh_access"));
        assert!(!spec.contains_key("additional_policies"));
    }

    #[test]
    fn test_subnets_preserve_order() {
        let tree = flatten_cluster(&sample_cluster());
        let spec = tree.block("spec").unwrap();
        let subnets: Vec<_> = spec.blocks("subnet").collect();

        assert_eq!(subnets.len(), 2);
        assert_eq!(subnets[0].get_str("name"), Some("us-east-1a"));
        assert_eq!(subnets[0].get_str("type"), Some("Private"));
        assert_eq!(subnets[1].get_str("name"), Some("us-east-1b"));
        assert_eq!(subnets[1].get_str("type"), Some("Public"));
    }

    #[test]
    fn test_topology_without_bastion() {
        let tree = flatten_cluster(&sample_cluster());
        let topology = tree.block("spec").unwrap().block("topology").unwrap();

        assert!(!topology.contains_key("bastion"));
        assert_eq!(topology.block("dns").unwrap().get_str("type"), Some("Public"));
        assert_eq!(topology.get_str("masters"), Some("public"));
    }

    #[test]
    fn test_topology_with_bastion() {
        let mut cluster = sample_cluster();
        cluster.spec.topology.dns.dns_type = DnsType::Private;
        cluster.spec.topology.bastion = Some(BastionSpec {
            bastion_public_name: "bastion.prod.k8s.local".to_string(),
            idle_timeout_seconds: None,
        });

        let tree = flatten_cluster(&cluster);
        let topology = tree.block("spec").unwrap().block("topology").unwrap();
        let bastion = topology.block("bastion").unwrap();

        assert_eq!(bastion.get_str("bastion_public_name"), Some("bastion.prod.k8s.local"));
        assert!(!bastion.contains_key("idle_timeout_seconds"));
        assert_eq!(topology.block("dns").unwrap().get_str("type"), Some("Private"));
    }

    #[test]
    fn test_etcd_member_optional_fields_omitted() {
        let tree = flatten_cluster(&sample_cluster());
        let etcd = tree.block("spec").unwrap().block("etcd_cluster").unwrap();
        let member = etcd.block("etcd_member").unwrap();

        assert_eq!(member.get_int("volume_size"), Some(20));
        for key in ["volume_type", "volume_iops", "kms_key_id", "encrypted_volume"] {
            assert!(!member.contains_key(key), "{} should be omitted", key);
        }
        assert_eq!(etcd.get_int("heartbeat_interval"), Some(250));
        assert!(!etcd.contains_key("leader_election_timeout"));
    }

    #[test]
    fn test_etcd_member_optional_fields_present() {
        let mut cluster = sample_cluster();
        cluster.spec.etcd_clusters[0].etcd_members[0] = EtcdMemberSpec {
            name: "a".to_string(),
            instance_group: "master-us-east-1a".to_string(),
            volume_type: Some("gp3".to_string()),
            volume_iops: Some(3000),
            volume_size: Some(20),
            kms_key_id: Some("arn:aws:kms:us-east-1:123456789012:key/abc".to_string()),
            encrypted_volume: Some(false),
        };

        let tree = flatten_cluster(&cluster);
        let etcd = tree.block("spec").unwrap().block("etcd_cluster").unwrap();
        let member = etcd.block("etcd_member").unwrap();

        assert_eq!(member.get_str("volume_type"), Some("gp3"));
        assert_eq!(member.get_int("volume_iops"), Some(3000));
        assert_eq!(member.get_bool("encrypted_volume"), Some(false));
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let cluster = sample_cluster();
        assert_eq!(flatten_cluster(&cluster), flatten_cluster(&cluster));
        assert_eq!(
            flatten_cluster(&cluster).to_json().to_string(),
            flatten_cluster(&cluster).to_json().to_string()
        );
    }

    #[test]
    fn test_duration_millis_rounds_to_nearest() {
        assert_eq!(duration_millis(&Duration::from_millis(250)), 250);
        assert_eq!(duration_millis(&Duration::from_micros(1500)), 2);
        assert_eq!(duration_millis(&Duration::from_micros(1400)), 1);
        assert_eq!(duration_millis(&Duration::from_micros(400)), 0);
        assert_eq!(duration_millis(&Duration::ZERO), 0);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(None), "");
    }
}
