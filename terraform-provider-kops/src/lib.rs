//! Terraform Provider for kops
//!
//! Exposes kops clusters stored in a kops state store as the `kops_cluster`
//! resource and data source, speaking a JSON-RPC rendition of the Terraform
//! plugin protocol over stdin/stdout.

pub mod attributes;
pub mod client;
pub mod expand;
pub mod flatten;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod validation;

pub use provider::KopsProvider;
