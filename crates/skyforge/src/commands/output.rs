use crate::utils::{self, Target};
use colored::Colorize;
use skyforge_cloud::StateManager;
use skyforge_cloud_gcp::{PROVIDER_NAME, compute_outputs};

pub async fn handle(target: &Target, show_sensitive: bool, json: bool) -> anyhow::Result<()> {
    let loaded = utils::load(target)?;
    let state = StateManager::new(&loaded.project_root).load().await?;
    let outputs = compute_outputs(&loaded.stack, &state);

    if json {
        let map: serde_json::Map<String, serde_json::Value> = outputs
            .iter()
            .map(|o| {
                let value = o
                    .display_value(show_sensitive)
                    .map(serde_json::Value::String)
                    .unwrap_or(serde_json::Value::Null);
                (o.name.to_string(), value)
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    if state.get_provider_resources(PROVIDER_NAME).is_empty() {
        println!(
            "{}",
            "No outputs yet. Run `skyforge apply --yes` first.".yellow()
        );
        return Ok(());
    }

    for output in &outputs {
        let value = match output.display_value(show_sensitive) {
            Some(value) if output.sensitive && !show_sensitive => value.dimmed().to_string(),
            Some(value) => value,
            None => "(not available)".dimmed().to_string(),
        };
        println!("{} = {}", output.name.cyan(), value);
    }

    Ok(())
}
