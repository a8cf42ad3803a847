//! kops state store client for the Terraform provider
//!
//! Read-only: fetches cluster manifests from `<state_store>/<cluster>/config`
//! on the local filesystem or in an S3 bucket.

use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use kops_common::Cluster;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const DEFAULT_REGION: &str = "us-east-1";
const S3_ENDPOINT_ENV: &str = "S3_ENDPOINT";
const CLUSTER_CONFIG_OBJECT: &str = "config";

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Cluster not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Manifest(#[from] kops_common::Error),
    #[error("Invalid state store path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("Invalid cluster name {0:?}")]
    InvalidName(String),
    #[error("S3 error: {0}")]
    S3(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Location of a kops state store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateStore {
    /// Directory on the local filesystem
    Local(PathBuf),
    /// S3 bucket, optionally below a key prefix
    S3 { bucket: String, prefix: String },
}

impl StateStore {
    /// Parse `s3://bucket[/prefix]`, `file:///path` or an absolute path.
    /// Trailing slashes are trimmed.
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = |reason: &str| ClientError::InvalidPath {
            path: uri.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = uri.trim();
        if trimmed.is_empty() {
            return Err(invalid("state store must not be empty"));
        }

        if trimmed.starts_with('/') {
            return Ok(StateStore::Local(trim_path(Path::new(trimmed))));
        }

        let url = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
        match url.scheme() {
            "s3" => {
                let bucket = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| invalid("missing bucket name"))?;
                Ok(StateStore::S3 {
                    bucket: bucket.to_string(),
                    prefix: url.path().trim_matches('/').to_string(),
                })
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| invalid("not an absolute local path"))?;
                Ok(StateStore::Local(trim_path(&path)))
            }
            other => Err(invalid(&format!("unsupported scheme {:?}", other))),
        }
    }
}

fn trim_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() {
        PathBuf::from("/")
    } else {
        PathBuf::from(trimmed)
    }
}

impl fmt::Display for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateStore::Local(path) => write!(f, "file://{}", path.display()),
            StateStore::S3 { bucket, prefix } if prefix.is_empty() => write!(f, "s3://{}", bucket),
            StateStore::S3 { bucket, prefix } => write!(f, "s3://{}/{}", bucket, prefix),
        }
    }
}

/// How S3 state stores are reached
#[derive(Clone, Debug)]
enum S3Access {
    /// Path-style S3-compatible gateway; requests are unsigned
    Gateway(String),
    /// AWS S3 with SigV4-signed requests
    Aws(aws_sdk_s3::Client),
}

/// kops state store client
#[derive(Clone)]
pub struct KopsClient {
    client: reqwest::Client,
    store: StateStore,
    s3: Option<S3Access>,
}

impl KopsClient {
    /// Create a new client. S3 stores additionally need
    /// [`with_s3_client`](Self::with_s3_client) or
    /// [`with_s3_endpoint`](Self::with_s3_endpoint).
    pub fn new(store: StateStore) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            store,
            s3: None,
        })
    }

    /// Create a client for `store` from the process environment.
    ///
    /// S3 stores go through `S3_ENDPOINT` when it is set. Otherwise requests
    /// are signed with credentials from the AWS default provider chain
    /// (environment, shared config and credentials files, SSO, web identity,
    /// container and instance metadata). The region falls back to `us-east-1`.
    pub async fn from_env(store: StateStore) -> Result<Self> {
        let client = Self::new(store)?;
        if !matches!(client.store, StateStore::S3 { .. }) {
            return Ok(client);
        }

        if let Some(endpoint) = std::env::var(S3_ENDPOINT_ENV)
            .ok()
            .filter(|endpoint| !endpoint.is_empty())
        {
            tracing::debug!(endpoint = %endpoint, "Using unsigned S3-compatible endpoint");
            return Ok(client.with_s3_endpoint(&endpoint));
        }

        let region = RegionProviderChain::default_provider().or_else(Region::new(DEFAULT_REGION));
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        tracing::debug!(region = ?config.region(), "Loaded AWS configuration");

        Ok(client.with_s3_client(aws_sdk_s3::Client::new(&config)))
    }

    /// Use a path-style S3-compatible endpoint instead of AWS
    pub fn with_s3_endpoint(mut self, endpoint: &str) -> Self {
        self.s3 = Some(S3Access::Gateway(endpoint.trim_end_matches('/').to_string()));
        self
    }

    /// Reach AWS S3 through a configured SDK client
    pub fn with_s3_client(mut self, s3: aws_sdk_s3::Client) -> Self {
        self.s3 = Some(S3Access::Aws(s3));
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    fn s3_access(&self, bucket: &str) -> Result<&S3Access> {
        self.s3.as_ref().ok_or_else(|| {
            ClientError::S3(format!(
                "no AWS credentials or S3 endpoint configured for bucket {}",
                bucket
            ))
        })
    }

    /// Check that the state store can be listed
    pub async fn check_readable(&self) -> Result<()> {
        match &self.store {
            StateStore::Local(path) => {
                let mut entries = tokio::fs::read_dir(path).await?;
                entries.next_entry().await?;
                Ok(())
            }
            StateStore::S3 { bucket, prefix } => match self.s3_access(bucket)? {
                S3Access::Gateway(endpoint) => {
                    let mut url = format!(
                        "{}?list-type=2&max-keys=1",
                        gateway_bucket_url(endpoint, bucket)
                    );
                    if !prefix.is_empty() {
                        url.push_str(&format!("&prefix={}", urlencoding::encode(prefix)));
                    }
                    let response = self.client.get(&url).send().await?;
                    if response.status().is_success() {
                        Ok(())
                    } else {
                        let status = response.status().as_u16();
                        let message = response.text().await.unwrap_or_default();
                        Err(ClientError::Api { status, message })
                    }
                }
                S3Access::Aws(s3) => {
                    let mut request = s3.list_objects_v2().bucket(bucket).max_keys(1);
                    if !prefix.is_empty() {
                        request = request.prefix(prefix);
                    }
                    request.send().await.map_err(sdk_error)?;
                    Ok(())
                }
            },
        }
    }

    /// Fetch a cluster by name
    pub async fn get_cluster(&self, name: &str) -> Result<Cluster> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(ClientError::InvalidName(name.to_string()));
        }

        tracing::debug!(cluster = name, store = %self.store, "Fetching cluster");

        let manifest = match &self.store {
            StateStore::Local(base) => {
                let path = base.join(name).join(CLUSTER_CONFIG_OBJECT);
                match tokio::fs::read_to_string(&path).await {
                    Ok(contents) => contents,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        return Err(ClientError::NotFound(name.to_string()));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            StateStore::S3 { bucket, prefix } => {
                let key = object_key(prefix, name);
                match self.s3_access(bucket)? {
                    S3Access::Gateway(endpoint) => {
                        let url = gateway_object_url(endpoint, bucket, &key);
                        self.get_gateway_object(&url, name).await?
                    }
                    S3Access::Aws(s3) => get_aws_object(s3, bucket, &key, name).await?,
                }
            }
        };

        Ok(Cluster::from_yaml(&manifest)?)
    }

    async fn get_gateway_object(&self, url: &str, name: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(response.text().await?)
        } else if status.as_u16() == 404 {
            Err(ClientError::NotFound(name.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// `<prefix>/<cluster>/config`, without empty segments
fn object_key(prefix: &str, name: &str) -> String {
    prefix
        .split('/')
        .filter(|segment| !segment.is_empty())
        .chain([name, CLUSTER_CONFIG_OBJECT])
        .collect::<Vec<_>>()
        .join("/")
}

fn gateway_bucket_url(endpoint: &str, bucket: &str) -> String {
    format!("{}/{}", endpoint, urlencoding::encode(bucket))
}

fn gateway_object_url(endpoint: &str, bucket: &str, key: &str) -> String {
    let key = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", gateway_bucket_url(endpoint, bucket), key)
}

async fn get_aws_object(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    name: &str,
) -> Result<String> {
    let output = s3
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| match sdk_error(e) {
            ClientError::Api { status: 404, .. } => ClientError::NotFound(name.to_string()),
            other => other,
        })?;

    let body = output
        .body
        .collect()
        .await
        .map_err(|e| ClientError::S3(e.to_string()))?;
    String::from_utf8(body.into_bytes().to_vec()).map_err(|e| ClientError::S3(e.to_string()))
}

/// HTTP failures keep their status; transport and signing failures do not
/// have one
fn sdk_error<E>(err: SdkError<E, HttpResponse>) -> ClientError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|response| response.status().as_u16());
    let message = DisplayErrorContext(&err).to_string();
    match status {
        Some(status) => ClientError::Api { status, message },
        None => ClientError::S3(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::Credentials;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const MANIFEST: &str = "apiVersion: kops.k8s.io/v1alpha2\nkind: Cluster\nmetadata:\n  name: dev.k8s.local\nspec:\n  cloudProvider: aws\n";

    const NO_SUCH_KEY: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>";
    const ACCESS_DENIED: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>";

    /// Minimal HTTP server answering every request with one canned response.
    /// Returns its base URL and the request heads it received.
    async fn s3_stub(status: u16, body: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&chunk[..n]),
                    }
                }
                seen.lock().unwrap().push(String::from_utf8_lossy(&head).into_owned());

                let response = format!(
                    "HTTP/1.1 {} Stub\r\ncontent-type: application/xml\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), requests)
    }

    fn request_line(requests: &Arc<Mutex<Vec<String>>>, index: usize) -> String {
        requests.lock().unwrap()[index]
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    fn gateway_client(endpoint: &str, uri: &str) -> KopsClient {
        KopsClient::new(StateStore::parse(uri).unwrap())
            .unwrap()
            .with_s3_endpoint(endpoint)
    }

    fn signed_client(endpoint: &str, uri: &str) -> KopsClient {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKIDEXAMPLE", "secret", None, None, "static"))
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();
        KopsClient::new(StateStore::parse(uri).unwrap())
            .unwrap()
            .with_s3_client(aws_sdk_s3::Client::from_conf(config))
    }

    #[test]
    fn test_parse_s3_store() {
        assert_eq!(
            StateStore::parse("s3://my-bucket/").unwrap(),
            StateStore::S3 {
                bucket: "my-bucket".to_string(),
                prefix: String::new()
            }
        );
        assert_eq!(
            StateStore::parse("s3://my-bucket/kops/state//").unwrap(),
            StateStore::S3 {
                bucket: "my-bucket".to_string(),
                prefix: "kops/state".to_string()
            }
        );
    }

    #[test]
    fn test_parse_local_store() {
        assert_eq!(
            StateStore::parse("/var/lib/kops/").unwrap(),
            StateStore::Local(PathBuf::from("/var/lib/kops"))
        );
        assert_eq!(
            StateStore::parse("file:///var/lib/kops").unwrap(),
            StateStore::Local(PathBuf::from("/var/lib/kops"))
        );
    }

    #[test]
    fn test_parse_rejects_bad_uris() {
        assert!(StateStore::parse("").is_err());
        assert!(StateStore::parse("my-bucket").is_err());
        assert!(StateStore::parse("gs://my-bucket").is_err());
        assert!(StateStore::parse("s3://").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for uri in ["s3://my-bucket", "s3://my-bucket/kops", "file:///tmp/state"] {
            let store = StateStore::parse(uri).unwrap();
            assert_eq!(store.to_string(), uri);
        }
    }

    #[test]
    fn test_object_keys_and_gateway_urls() {
        assert_eq!(object_key("", "prod.k8s.local"), "prod.k8s.local/config");
        assert_eq!(object_key("kops//state/", "prod.k8s.local"), "kops/state/prod.k8s.local/config");
        assert_eq!(
            gateway_object_url("http://minio:9000", "my-bucket", "prod.k8s.local/config"),
            "http://minio:9000/my-bucket/prod.k8s.local/config"
        );
    }

    #[tokio::test]
    async fn test_get_cluster_from_local_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("dev.k8s.local")).unwrap();
        std::fs::write(dir.path().join("dev.k8s.local").join("config"), MANIFEST).unwrap();

        let client = KopsClient::new(StateStore::Local(dir.path().to_path_buf())).unwrap();
        client.check_readable().await.unwrap();

        let cluster = client.get_cluster("dev.k8s.local").await.unwrap();
        assert_eq!(cluster.name(), "dev.k8s.local");
        assert_eq!(cluster.spec.cloud_provider, "aws");
    }

    #[tokio::test]
    async fn test_missing_cluster_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let client = KopsClient::new(StateStore::Local(dir.path().to_path_buf())).unwrap();

        let err = client.get_cluster("ghost.k8s.local").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_corrupt_manifest_is_not_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("bad.k8s.local")).unwrap();
        std::fs::write(dir.path().join("bad.k8s.local").join("config"), "kind: [").unwrap();

        let client = KopsClient::new(StateStore::Local(dir.path().to_path_buf())).unwrap();
        let err = client.get_cluster("bad.k8s.local").await.unwrap_err();
        assert!(matches!(err, ClientError::Manifest(_)));
    }

    #[tokio::test]
    async fn test_invalid_names_rejected_without_io() {
        let client = KopsClient::new(StateStore::Local(PathBuf::from("/nonexistent"))).unwrap();
        assert!(matches!(
            client.get_cluster("").await,
            Err(ClientError::InvalidName(_))
        ));
        assert!(matches!(
            client.get_cluster("../etc").await,
            Err(ClientError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_unreadable_local_store() {
        let client = KopsClient::new(StateStore::Local(PathBuf::from("/nonexistent/kops"))).unwrap();
        assert!(client.check_readable().await.is_err());
    }

    // ============== S3-compatible gateway ==============

    #[tokio::test]
    async fn test_gateway_missing_object_is_not_found() {
        let (endpoint, requests) = s3_stub(404, NO_SUCH_KEY).await;
        let client = gateway_client(&endpoint, "s3://my-bucket/kops");

        let err = client.get_cluster("ghost.k8s.local").await.unwrap_err();
        assert!(err.is_not_found(), "{}", err);
        assert_eq!(
            request_line(&requests, 0),
            "GET /my-bucket/kops/ghost.k8s.local/config HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_gateway_access_denied_is_store_error() {
        let (endpoint, _) = s3_stub(403, ACCESS_DENIED).await;
        let client = gateway_client(&endpoint, "s3://my-bucket");

        let err = client.get_cluster("prod.k8s.local").await.unwrap_err();
        assert!(!err.is_not_found());
        assert!(matches!(err, ClientError::Api { status: 403, .. }), "{}", err);
    }

    #[tokio::test]
    async fn test_gateway_decodes_manifest() {
        let (endpoint, requests) = s3_stub(200, MANIFEST).await;
        let client = gateway_client(&endpoint, "s3://my-bucket");

        let cluster = client.get_cluster("dev.k8s.local").await.unwrap();
        assert_eq!(cluster.name(), "dev.k8s.local");
        assert_eq!(
            request_line(&requests, 0),
            "GET /my-bucket/dev.k8s.local/config HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_gateway_check_readable() {
        let (endpoint, requests) = s3_stub(403, ACCESS_DENIED).await;
        let client = gateway_client(&endpoint, "s3://my-bucket/kops");

        let err = client.check_readable().await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 403, .. }), "{}", err);
        assert_eq!(
            request_line(&requests, 0),
            "GET /my-bucket?list-type=2&max-keys=1&prefix=kops HTTP/1.1"
        );

        let (endpoint, _) = s3_stub(200, "<ListBucketResult/>").await;
        gateway_client(&endpoint, "s3://my-bucket").check_readable().await.unwrap();
    }

    // ============== AWS S3 (signed) ==============

    #[tokio::test]
    async fn test_signed_requests_carry_sigv4_authorization() {
        let (endpoint, requests) = s3_stub(200, MANIFEST).await;
        let client = signed_client(&endpoint, "s3://my-bucket/kops");

        let cluster = client.get_cluster("dev.k8s.local").await.unwrap();
        assert_eq!(cluster.spec.cloud_provider, "aws");

        let head = requests.lock().unwrap()[0].to_ascii_lowercase();
        assert!(head.starts_with("get /my-bucket/kops/dev.k8s.local/config"), "{}", head);
        assert!(
            head.contains("authorization: aws4-hmac-sha256 credential=akidexample/"),
            "{}",
            head
        );
    }

    #[tokio::test]
    async fn test_signed_missing_object_is_not_found() {
        let (endpoint, _) = s3_stub(404, NO_SUCH_KEY).await;
        let client = signed_client(&endpoint, "s3://my-bucket");

        let err = client.get_cluster("ghost.k8s.local").await.unwrap_err();
        assert!(matches!(&err, ClientError::NotFound(name) if name == "ghost.k8s.local"), "{}", err);
    }

    #[tokio::test]
    async fn test_signed_access_denied_is_store_error() {
        let (endpoint, _) = s3_stub(403, ACCESS_DENIED).await;
        let client = signed_client(&endpoint, "s3://my-bucket");

        let err = client.get_cluster("prod.k8s.local").await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 403, .. }), "{}", err);

        let err = client.check_readable().await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 403, .. }), "{}", err);
    }

    #[tokio::test]
    async fn test_s3_store_without_access_is_rejected() {
        let client = KopsClient::new(StateStore::parse("s3://my-bucket").unwrap()).unwrap();
        assert!(matches!(
            client.get_cluster("prod.k8s.local").await,
            Err(ClientError::S3(_))
        ));
    }
}
