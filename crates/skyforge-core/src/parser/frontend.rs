//! frontend block

use super::{all_strings, required_string};
use crate::error::{Result, StackError};
use crate::model::FrontendConfig;
use kdl::KdlNode;

pub fn parse_frontend(node: &KdlNode) -> Result<FrontendConfig> {
    let mut frontend = FrontendConfig::default();

    let Some(children) = node.children() else {
        return Ok(frontend);
    };

    for child in children.nodes() {
        match child.name().value() {
            // explicit list replaces the default domain
            "domains" | "domain" => frontend.domains = all_strings(child),
            "location" => frontend.location = required_string(child)?,
            "entry-document" | "entry_document" | "index" => {
                frontend.entry_document = required_string(child)?;
            }
            other => {
                return Err(StackError::InvalidConfig(format!(
                    "unknown frontend setting '{}'",
                    other
                )));
            }
        }
    }

    Ok(frontend)
}
