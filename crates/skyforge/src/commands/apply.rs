use crate::utils::{self, Target};
use colored::Colorize;
use skyforge_cloud::{CloudProvider, StateManager};
use skyforge_cloud_gcp::{PROVIDER_NAME, Unit, desired_resources};

pub async fn handle(target: &Target, unit: Option<Unit>, yes: bool) -> anyhow::Result<()> {
    let loaded = utils::load(target)?;
    utils::print_loaded_stack(&loaded);

    let desired = desired_resources(&loaded.stack, unit)?;
    let provider = utils::connect(&loaded.stack).await?;

    let state_manager = StateManager::new(&loaded.project_root);
    let lock = state_manager.acquire_lock().await?;

    let plan = provider.plan(&desired).await?;
    utils::print_plan(&plan);

    if !yes {
        println!();
        if plan.has_changes {
            println!("To apply these changes, pass {}", "--yes".cyan());
        }
        lock.release().await?;
        return Ok(());
    }

    println!();
    println!("{}", "Applying...".blue().bold());
    let result = provider.apply(&plan).await?;

    // no-ops are recorded too, so outputs reflect what the secrets hold
    let mut state = state_manager.load().await?;
    state.record_apply(PROVIDER_NAME, &result);
    state_manager.save(&state).await?;
    lock.release().await?;

    utils::print_apply_result(&result);

    if !result.is_success() {
        return Err(anyhow::anyhow!(
            "apply stopped: {} action(s) failed, {} not attempted",
            result.failed.len(),
            result.skipped.len()
        ));
    }

    println!("{}", "✓ Apply complete".green().bold());
    println!("Run {} to see the published values", "skyforge output".cyan());
    Ok(())
}
