use crate::utils::{self, Target};
use colored::Colorize;

pub fn handle(target: &Target) -> anyhow::Result<()> {
    println!("{}", "Validating stack...".blue());

    let loaded = match utils::load(target) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Invalid stack".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    let stack = &loaded.stack;
    let ctx = stack.context();

    utils::print_loaded_stack(&loaded);
    println!("{}", "✓ Stack is valid".green().bold());
    println!();
    println!("Summary:");
    println!("  prefix: {}", ctx.prefix().cyan());

    match &stack.cache {
        Some(cache) => {
            println!(
                "  cache: {} tier, {} GB, {} replica(s), {}",
                cache.tier.to_string().cyan(),
                cache.memory_size_gb,
                cache.replica_count,
                cache.redis_version
            );
            println!(
                "    auth {}, clients connect with {}://",
                if cache.auth_enabled { "enabled" } else { "disabled" },
                cache.transit_encryption.uri_scheme()
            );
        }
        None => println!("  cache: {}", "(not declared)".dimmed()),
    }

    match &stack.frontend {
        Some(frontend) => {
            println!("  frontend: {}", frontend.domains.join(", ").cyan());
            println!(
                "    bucket {} in {}",
                ctx.frontend_bucket_name(),
                frontend.location
            );
        }
        None => println!("  frontend: {}", "(not declared)".dimmed()),
    }

    Ok(())
}
