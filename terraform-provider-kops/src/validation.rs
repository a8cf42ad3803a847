//! Configuration validation
//!
//! Checks submitted configuration against a resource schema before any state
//! store access: required arguments, value types, block counts and the
//! per-attribute validators (CIDR ranges, enum allow-lists).

use crate::schema::{AttributeType, Diagnostic, SchemaAttribute, SchemaBlock, Validator, UNKNOWN_VALUE};
use serde_json::Value;
use std::net::IpAddr;
use thiserror::Error;

/// Validator failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expected {key} to contain a valid network Value, got: {value} with err: {reason}")]
    InvalidCidr {
        key: String,
        value: String,
        reason: String,
    },
    #[error("expected {key} to contain a network Value with between {min} and {max} significant bits, got: {bits}")]
    PrefixOutOfRange {
        key: String,
        min: u8,
        max: u8,
        bits: u8,
    },
    #[error("expected {key} to be one of {allowed:?}, got {value}")]
    NotOneOf {
        key: String,
        allowed: Vec<String>,
        value: String,
    },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// CIDR notation validation
pub fn validate_cidr(key: &str, value: &str, min_prefix: u8, max_prefix: u8) -> ValidationResult<()> {
    let invalid = |reason: &str| ValidationError::InvalidCidr {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let (address, prefix) = value
        .split_once('/')
        .ok_or_else(|| invalid("missing prefix length"))?;

    let address: IpAddr = address
        .parse()
        .map_err(|_| invalid("invalid IP address"))?;

    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("invalid prefix length"));
    }
    let bits: u8 = prefix
        .parse()
        .map_err(|_| invalid("invalid prefix length"))?;

    let max_bits = if address.is_ipv4() { 32 } else { 128 };
    if bits > max_bits {
        return Err(invalid("prefix length exceeds address size"));
    }

    if bits < min_prefix || bits > max_prefix {
        return Err(ValidationError::PrefixOutOfRange {
            key: key.to_string(),
            min: min_prefix,
            max: max_prefix,
            bits,
        });
    }

    Ok(())
}

/// Allow-list validation (case-sensitive)
pub fn validate_one_of(key: &str, value: &str, allowed: &[&str]) -> ValidationResult<()> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(ValidationError::NotOneOf {
        key: key.to_string(),
        allowed: allowed.iter().map(|s| s.to_string()).collect(),
        value: value.to_string(),
    })
}

/// Run a schema validator against a string value
pub fn run_validator(validator: &Validator, key: &str, value: &str) -> ValidationResult<()> {
    match validator {
        Validator::Cidr {
            min_prefix,
            max_prefix,
        } => validate_cidr(key, value, *min_prefix, *max_prefix),
        Validator::OneOf(allowed) => validate_one_of(key, value, allowed),
    }
}

fn is_unknown(value: &Value) -> bool {
    value.as_str() == Some(UNKNOWN_VALUE)
}

/// Validate a configuration object against a schema block
///
/// Returns one diagnostic per offending field, each carrying the attribute
/// path (`["spec", "0", "subnet", "1", "cidr"]`). Unknown values are skipped.
pub fn validate_config(block: &SchemaBlock, config: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut path = Vec::new();
    validate_block(block, config, &mut path, &mut diagnostics);
    diagnostics
}

fn validate_block(
    block: &SchemaBlock,
    value: &Value,
    path: &mut Vec<String>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let object = match value {
        Value::Object(object) => object,
        Value::Null => return,
        _ => {
            diagnostics.push(
                Diagnostic::error("Incorrect attribute value type")
                    .with_detail("Expected an object")
                    .with_attribute(path.clone()),
            );
            return;
        }
    };

    let mut names: Vec<&String> = block.attributes.keys().collect();
    names.sort();
    for name in names {
        let attr = &block.attributes[name];
        path.push(name.clone());
        match object.get(name.as_str()) {
            None | Some(Value::Null) => {
                if attr.required {
                    diagnostics.push(
                        Diagnostic::error("Missing required argument")
                            .with_detail(&format!(
                                "The argument \"{}\" is required, but no definition was found.",
                                name
                            ))
                            .with_attribute(path.clone()),
                    );
                }
            }
            Some(v) if !attr.required && !attr.optional => {
                if !is_unknown(v) {
                    diagnostics.push(
                        Diagnostic::error("Value for unconfigurable attribute")
                            .with_detail(&format!(
                                "Can't configure a value for \"{}\": its value will be decided automatically.",
                                name
                            ))
                            .with_attribute(path.clone()),
                    );
                }
            }
            Some(v) => validate_value(attr, &attr.attr_type, v, path, diagnostics),
        }
        path.pop();
    }

    let mut block_names: Vec<&String> = block.blocks.keys().collect();
    block_names.sort();
    for name in block_names {
        let nested = &block.blocks[name];
        path.push(name.clone());

        let items: &[Value] = match object.get(name.as_str()) {
            None | Some(Value::Null) => &[],
            Some(Value::Array(items)) => items,
            Some(v) if is_unknown(v) => {
                path.pop();
                continue;
            }
            Some(_) => {
                diagnostics.push(
                    Diagnostic::error("Incorrect attribute value type")
                        .with_detail(&format!("Expected a list of \"{}\" blocks", name))
                        .with_attribute(path.clone()),
                );
                path.pop();
                continue;
            }
        };

        let count = items.len() as i64;
        if let Some(min) = nested.min_items {
            if count < min {
                diagnostics.push(
                    Diagnostic::error(&format!("Insufficient {} blocks", name))
                        .with_detail(&format!(
                            "At least {} \"{}\" blocks are required.",
                            min, name
                        ))
                        .with_attribute(path.clone()),
                );
            }
        }
        if let Some(max) = nested.max_items {
            if count > max {
                diagnostics.push(
                    Diagnostic::error(&format!("Too many {} blocks", name))
                        .with_detail(&format!(
                            "No more than {} \"{}\" blocks are allowed.",
                            max, name
                        ))
                        .with_attribute(path.clone()),
                );
            }
        }

        for (index, item) in items.iter().enumerate() {
            path.push(index.to_string());
            validate_block(&nested.block, item, path, diagnostics);
            path.pop();
        }
        path.pop();
    }
}

fn type_mismatch(path: &[String], expected: &str) -> Diagnostic {
    Diagnostic::error("Incorrect attribute value type")
        .with_detail(&format!("Inappropriate value for attribute: {} required.", expected))
        .with_attribute(path.to_vec())
}

fn validate_value(
    attr: &SchemaAttribute,
    attr_type: &AttributeType,
    value: &Value,
    path: &mut Vec<String>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if is_unknown(value) {
        return;
    }

    match attr_type {
        AttributeType::String => match value.as_str() {
            Some(s) => {
                if let Some(validator) = &attr.validator {
                    if let Err(e) = run_validator(validator, &path.join("."), s) {
                        diagnostics.push(
                            Diagnostic::error("Invalid attribute value")
                                .with_detail(&e.to_string())
                                .with_attribute(path.clone()),
                        );
                    }
                }
            }
            None => diagnostics.push(type_mismatch(path, "string")),
        },
        AttributeType::Number => {
            if !value.is_number() {
                diagnostics.push(type_mismatch(path, "number"));
            }
        }
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_mismatch(path, "bool"));
            }
        }
        AttributeType::List(element_type) => match value.as_array() {
            Some(items) => {
                for (index, item) in items.iter().enumerate() {
                    path.push(index.to_string());
                    validate_value(attr, element_type, item, path, diagnostics);
                    path.pop();
                }
            }
            None => diagnostics.push(type_mismatch(path, "list")),
        },
        AttributeType::Map(element_type) => match value.as_object() {
            Some(entries) => {
                for (key, item) in entries {
                    path.push(key.clone());
                    validate_value(attr, element_type, item, path, diagnostics);
                    path.pop();
                }
            }
            None => diagnostics.push(type_mismatch(path, "map")),
        },
    }
}
