//! Stack loader
//!
//! Combines template expansion, KDL parsing and validation.

use crate::error::{Result, StackError};
use crate::model::Stack;
use crate::parser::parse_stack_str;
use crate::template::{TemplateProcessor, extract_builtins, extract_variables};
use crate::validate::validate_stack;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Load, render, parse and validate a stack file
///
/// `environment` overrides the `environment` node of the file, both in the
/// template context and in the resulting stack.
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_stack(path: &Path, environment: Option<&str>) -> Result<Stack> {
    let content = std::fs::read_to_string(path).map_err(|e| StackError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    load_stack_str(&content, environment).map_err(|e| match e {
        StackError::TemplateRenderError(message) => StackError::TemplateError {
            file: path.to_path_buf(),
            message,
        },
        other => other,
    })
}

/// Same as [`load_stack`] for in-memory content
pub fn load_stack_str(content: &str, environment: Option<&str>) -> Result<Stack> {
    let stack = parse_unvalidated(content, environment)?;
    validate_stack(&stack)?;
    info!(
        project = %stack.project,
        environment = %stack.environment,
        cache = stack.cache.is_some(),
        frontend = stack.frontend.is_some(),
        "Stack loaded"
    );
    Ok(stack)
}

/// Render and parse without validating
pub fn parse_unvalidated(content: &str, environment: Option<&str>) -> Result<Stack> {
    debug!("Preparing template context");
    let mut processor = prepare_template_processor(content, environment)?;

    debug!("Expanding template");
    let rendered = processor.render_str(content)?;

    debug!(content_size = rendered.len(), "Parsing KDL");
    let mut stack = parse_stack_str(&rendered)?;
    if let Some(env) = environment {
        stack.environment = env.to_string();
    }
    Ok(stack)
}

fn prepare_template_processor(
    content: &str,
    environment: Option<&str>,
) -> Result<TemplateProcessor> {
    let mut processor = TemplateProcessor::new();

    processor.add_env_variables();

    let variables = extract_variables(content)?;
    debug!(vars = ?variables, "Adding variables block");
    processor.add_variables(variables);

    // Built-ins go last so templates see the same values the parsed stack holds
    let defaults = Stack::default();
    processor.add_variable("region", serde_json::json!(defaults.region));
    processor.add_variable("environment", serde_json::json!(defaults.environment));
    processor.add_variable("name", serde_json::json!(defaults.name));
    processor.add_variables(extract_builtins(content)?);

    if let Some(env) = environment {
        processor.add_variable("environment", serde_json::json!(env));
    }

    Ok(processor)
}
