use crate::utils::{self, Target};
use colored::Colorize;
use skyforge_cloud::DependencyGraph;
use skyforge_cloud_gcp::{Unit, desired_resources};

pub fn handle(target: &Target, unit: Option<Unit>) -> anyhow::Result<()> {
    let loaded = utils::load(target)?;
    let desired = desired_resources(&loaded.stack, unit)?;
    let graph = DependencyGraph::from_resources(&desired)?;

    for (index, wave) in graph.waves()?.iter().enumerate() {
        println!("{}", format!("Wave {}", index + 1).bold());
        for key in wave {
            let deps = graph.dependencies_of(key);
            if deps.is_empty() {
                println!("  {}", key.cyan());
            } else {
                println!("  {} {} {}", key.cyan(), "←".dimmed(), deps.join(", ").dimmed());
            }
        }
    }

    Ok(())
}
