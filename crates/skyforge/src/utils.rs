use colored::Colorize;
use skyforge_cloud::{ActionType, ApplyResult, CloudProvider, Plan};
use skyforge_cloud_gcp::{GcpProvider, RestApi};
use skyforge_core::Stack;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the stack comes from, as given on the command line
pub struct Target {
    pub config: Option<PathBuf>,
    pub environment: Option<String>,
}

/// A loaded and validated stack
pub struct Loaded {
    pub stack: Stack,
    pub stack_file: PathBuf,
    /// Directory holding `.skyforge/` state
    pub project_root: PathBuf,
}

/// Discover, render and validate the stack file
pub fn load(target: &Target) -> anyhow::Result<Loaded> {
    let stack_file = skyforge_config::find_stack_file(target.config.as_deref())?;
    let stack = skyforge_core::load_stack(&stack_file, target.environment.as_deref())?;
    let project_root = skyforge_config::project_root_for(&stack_file);

    Ok(Loaded {
        stack,
        stack_file,
        project_root,
    })
}

/// Print which stack file was loaded and for which environment
pub fn print_loaded_stack(loaded: &Loaded) {
    println!(
        "📄 Stack file: {}",
        display_path(&loaded.stack_file).cyan()
    );
    println!(
        "   project {} · region {} · environment {}",
        loaded.stack.project.cyan(),
        loaded.stack.region.cyan(),
        loaded.stack.environment.cyan()
    );
}

/// Connect to Google Cloud and make sure the credentials work
pub async fn connect(stack: &Stack) -> anyhow::Result<GcpProvider> {
    let api = RestApi::connect(stack.project.clone(), stack.region.clone()).await?;
    let provider = GcpProvider::new(Arc::new(api));

    let auth = provider.check_auth().await?;
    if !auth.authenticated {
        return Err(anyhow::anyhow!(
            "not authenticated with Google Cloud: {}\nRun `gcloud auth login` or set GOOGLE_OAUTH_ACCESS_TOKEN",
            auth.error.unwrap_or_default()
        ));
    }
    tracing::debug!(account = ?auth.account_info, "Authenticated");
    Ok(provider)
}

fn colored_symbol(action_type: ActionType) -> colored::ColoredString {
    let symbol = action_type.symbol();
    match action_type {
        ActionType::Create => symbol.green(),
        ActionType::Update => symbol.yellow(),
        ActionType::Replace => symbol.magenta(),
        ActionType::Delete => symbol.red(),
        ActionType::NoOp => symbol.normal(),
    }
}

/// Print a plan wave by wave, changes first-class and no-ops dimmed
pub fn print_plan(plan: &Plan) {
    println!();
    for (index, wave) in plan.waves().iter().enumerate() {
        println!("{}", format!("Wave {}", index + 1).bold());
        for action in wave {
            let line = format!(
                "  {} {} {}",
                colored_symbol(action.action_type),
                action.resource_type,
                action.resource_id.cyan()
            );
            if action.action_type == ActionType::NoOp {
                println!("{}", line.dimmed());
                continue;
            }
            println!("{}", line);
            if let Some(changed) = action.details.get("changed").and_then(|v| v.as_array()) {
                let fields: Vec<&str> = changed.iter().filter_map(|f| f.as_str()).collect();
                println!("      changed: {}", fields.join(", ").dimmed());
            }
            if let Some(by) = action.details.get("replaced_by").and_then(|v| v.as_str()) {
                println!("      superseded by {}", by.dimmed());
            }
        }
    }

    print_warnings(&plan.warnings);

    println!();
    println!("{} {}", "Plan:".bold(), plan.summary());
}

pub fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!();
    for warning in warnings {
        println!("{} {}", "⚠".yellow(), warning.yellow());
    }
}

/// Print the outcome of an apply or destroy run
pub fn print_apply_result(result: &ApplyResult) {
    println!();
    for success in &result.succeeded {
        if success.action_type == ActionType::NoOp {
            continue;
        }
        println!("  {} {}", "✓".green(), success.message);
    }
    for failure in &result.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failure.resource_key,
            failure.error.as_deref().unwrap_or("unknown error").red()
        );
    }
    if !result.skipped.is_empty() {
        println!(
            "  {} {} action(s) skipped after the failure",
            "-".yellow(),
            result.skipped.len()
        );
    }
    println!();
    println!(
        "{}",
        format!("Finished in {:.1}s", result.duration_ms as f64 / 1000.0).dimmed()
    );
}

/// Relative display path for messages
pub fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}
