//! Template expansion
//!
//! Stack files are rendered with Tera before they are parsed as KDL.

use crate::error::{Result, StackError};
use regex::Regex;
use std::collections::HashMap;
use tera::{Context, Tera};
use tracing::{debug, info};

/// Only environment variables with this prefix reach the template context
pub const ENV_PREFIX: &str = "SKYFORGE_";

/// Top-level settings exposed to templates under their own names
const BUILTIN_KEYS: &[&str] = &["project", "region", "environment", "name"];

/// Variable context
pub type Variables = HashMap<String, serde_json::Value>;

/// Template processor
pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    pub fn add_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), &value);
    }

    pub fn add_variables(&mut self, variables: Variables) {
        for (key, value) in variables {
            self.context.insert(key, &value);
        }
    }

    /// Add `SKYFORGE_*` environment variables
    ///
    /// Variables are available both under their full name and without the
    /// prefix, lowercased (`SKYFORGE_DOMAIN` is also `domain`).
    #[tracing::instrument(skip(self))]
    pub fn add_env_variables(&mut self) {
        let mut count = 0;

        for (key, value) in std::env::vars() {
            let Some(short) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if short.is_empty() {
                continue;
            }
            debug!(key = %key, "Adding environment variable");
            let value = serde_json::Value::String(value);
            self.context.insert(short.to_lowercase(), &value);
            self.context.insert(key, &value);
            count += 1;
        }

        info!(env_var_count = count, "Added environment variables");
    }

    /// Render a string
    pub fn render_str(&mut self, template: &str) -> Result<String> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| StackError::TemplateRenderError(extract_tera_error_detail(&e)))
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the `variables { ... }` block
///
/// The block is located with a regex and parsed on its own, so template
/// placeholders elsewhere in the file do not break parsing.
pub fn extract_variables(kdl_content: &str) -> Result<Variables> {
    let re = Regex::new(r"(?s)variables\s*\{(?P<content>.*?)\}")
        .map_err(|e| StackError::InvalidConfig(format!("regex compile error: {}", e)))?;

    let mut vars = HashMap::new();

    for cap in re.captures_iter(kdl_content) {
        let Some(block) = cap.name("content") else {
            continue;
        };
        let doc: kdl::KdlDocument = block.as_str().parse().map_err(|e| {
            StackError::InvalidConfig(format!("KDL parse error in variables block: {}", e))
        })?;

        for node in doc.nodes() {
            if let Some(entry) = node.entries().first() {
                vars.insert(node.name().value().to_string(), kdl_value_to_json(entry.value()));
            }
        }
    }

    Ok(vars)
}

/// Extract the literal top-level `project`, `region`, `environment` and
/// `name` values
///
/// Values that are themselves templates are skipped.
pub fn extract_builtins(kdl_content: &str) -> Result<Variables> {
    let re = Regex::new(r#"^\s*(?P<key>[a-z]+)\s+"(?P<value>[^"]*)"\s*$"#)
        .map_err(|e| StackError::InvalidConfig(format!("regex compile error: {}", e)))?;

    let mut vars = Variables::new();
    for line in top_level_lines(kdl_content) {
        let Some(cap) = re.captures(line) else {
            continue;
        };
        let (Some(key), Some(value)) = (cap.name("key"), cap.name("value")) else {
            continue;
        };
        let key = key.as_str();
        let value = value.as_str();
        if !BUILTIN_KEYS.contains(&key) || value.contains("{{") || vars.contains_key(key) {
            continue;
        }
        vars.insert(key.to_string(), serde_json::Value::String(value.to_string()));
    }

    Ok(vars)
}

/// Lines that start at document level, outside any `{ }` child block,
/// with trailing `//` comments cut off
///
/// Template braces (`{{`, `}}`) and quoted strings do not change the depth.
fn top_level_lines(content: &str) -> Vec<&str> {
    let mut depth = 0usize;
    let mut lines = Vec::new();

    for line in content.lines() {
        let top_level = depth == 0;
        let mut end = line.len();
        let mut in_string = false;
        let mut chars = line.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            let next = chars.peek().map(|&(_, n)| n);
            match c {
                '\\' if in_string => {
                    chars.next();
                }
                '"' => in_string = !in_string,
                _ if in_string => {}
                '/' if next == Some('/') => {
                    end = i;
                    break;
                }
                '{' | '}' if next == Some(c) => {
                    chars.next();
                }
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }

        if top_level {
            lines.push(&line[..end]);
        }
    }

    lines
}

/// Turn a Tera error chain into a readable message
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    let full_error = details.join(" | ");

    if let Some(start) = full_error.find("Variable `") {
        if let Some(end) = full_error[start..].find("` not found") {
            let var_name = &full_error[start + 10..start + end];
            return format!(
                "undefined variable: `{}`\nhint: define it in the variables block or export {}{}",
                var_name,
                ENV_PREFIX,
                var_name.to_uppercase()
            );
        }
    }

    full_error
}

fn kdl_value_to_json(value: &kdl::KdlValue) -> serde_json::Value {
    if let Some(s) = value.as_string() {
        serde_json::Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(|i| serde_json::Value::Number(i.into()))
            .unwrap_or(serde_json::Value::Null)
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    } else if let Some(b) = value.as_bool() {
        serde_json::Value::Bool(b)
    } else {
        serde_json::Value::Null
    }
}
