//! KDL parser
//!
//! Parses a rendered stack file into a [`Stack`]. Each unit block has its
//! own module.

mod cache;
mod frontend;

use cache::parse_cache;
use frontend::parse_frontend;

use crate::error::{Result, StackError};
use crate::model::Stack;
use kdl::{KdlDocument, KdlNode};

/// Parse a rendered KDL string into a stack
pub fn parse_stack_str(content: &str) -> Result<Stack> {
    let doc: KdlDocument = content.parse()?;
    let mut stack = Stack::default();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => stack.project = required_string(node)?,
            "region" => stack.region = required_string(node)?,
            "environment" => stack.environment = required_string(node)?,
            "name" => stack.name = required_string(node)?,
            "labels" => {
                if let Some(children) = node.children() {
                    for label in children.nodes() {
                        stack
                            .labels
                            .insert(label.name().value().to_string(), required_string(label)?);
                    }
                }
            }
            "cache" => {
                if stack.cache.is_some() {
                    return Err(StackError::InvalidConfig(
                        "cache block declared more than once".to_string(),
                    ));
                }
                stack.cache = Some(parse_cache(node)?);
            }
            "frontend" => {
                if stack.frontend.is_some() {
                    return Err(StackError::InvalidConfig(
                        "frontend block declared more than once".to_string(),
                    ));
                }
                stack.frontend = Some(parse_frontend(node)?);
            }
            // consumed by template expansion
            "variables" => {}
            other => {
                tracing::warn!(node = other, "Ignoring unknown top-level node");
            }
        }
    }

    Ok(stack)
}

/// First argument as a string
fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn required_string(node: &KdlNode) -> Result<String> {
    first_string(node).ok_or_else(|| {
        StackError::InvalidConfig(format!("{} requires a string value", node.name().value()))
    })
}

/// First argument as a non-negative integer
fn required_u32(node: &KdlNode) -> Result<u32> {
    let name = node.name().value();
    let value = node
        .entries()
        .first()
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| StackError::InvalidConfig(format!("{} requires an integer value", name)))?;
    u32::try_from(value).map_err(|_| {
        StackError::InvalidConfig(format!("{} must be a non-negative integer, got {}", name, value))
    })
}

/// Every argument as a string
fn all_strings(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter_map(|e| e.value().as_string().map(|s| s.to_string()))
        .collect()
}

/// `"enabled"` / `"disabled"` switch
fn required_switch(node: &KdlNode) -> Result<bool> {
    let value = required_string(node)?;
    match value.as_str() {
        "enabled" | "on" | "yes" => Ok(true),
        "disabled" | "off" | "no" => Ok(false),
        other => Err(StackError::InvalidConfig(format!(
            "{} must be \"enabled\" or \"disabled\", got \"{}\"",
            node.name().value(),
            other
        ))),
    }
}
