//! `stepwise tools` — start every configured provider and list its tools.

use std::path::PathBuf;
use stepwise_tools::ConnectionPool;

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    let mut pools = vec![ConnectionPool::from_config(
        config.agent.name.clone(),
        &config.providers,
    )?];
    for worker in &config.workers {
        pools.push(ConnectionPool::from_config(worker.name.clone(), &worker.providers)?);
    }

    for pool in &mut pools {
        println!("{}", pool.name());
        if pool.aliases().is_empty() {
            println!("  (no providers configured)");
            println!();
            continue;
        }

        let report = pool.start().await?;
        let hints = pool.hints().await;
        for line in hints.lines() {
            println!("  {line}");
        }
        for (alias, reason) in &report.degraded {
            println!("  ⚠️  {alias} unavailable: {reason}");
        }
        for error in pool.stop().await {
            eprintln!("  stop failed: {error}");
        }
        println!();
    }

    Ok(())
}
