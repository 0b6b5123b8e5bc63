use crate::utils::{self, Target};
use colored::Colorize;
use skyforge_cloud::CloudProvider;
use skyforge_cloud_gcp::{Unit, desired_resources};

pub async fn handle(target: &Target, unit: Option<Unit>) -> anyhow::Result<()> {
    let loaded = utils::load(target)?;
    utils::print_loaded_stack(&loaded);

    let desired = desired_resources(&loaded.stack, unit)?;
    let provider = utils::connect(&loaded.stack).await?;

    println!("{}", "Comparing with live resources...".blue());
    let plan = provider.plan(&desired).await?;
    utils::print_plan(&plan);

    if plan.has_changes {
        println!();
        println!("Run {} to apply these changes", "skyforge apply --yes".cyan());
    } else {
        println!();
        println!("{}", "✓ Infrastructure is up to date".green());
    }

    Ok(())
}
