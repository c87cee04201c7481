use std::env;

use domain::RefreshJob;
use pnl_api::{
    bootstrap::{self, build_state},
    config::AppConfig,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing("admin_tools")?;

    let config = AppConfig::from_env()?;
    let state = build_state(&config).await?;

    let mut args = env::args().skip(1);
    let cmd = args.next().unwrap_or_default();

    match cmd.as_str() {
        "assets" => {
            let assets = state.store.discover_tracked_assets().await?;
            for asset_id in &assets {
                println!("{asset_id}");
            }
            println!("done. {} tracked assets", assets.len());
        }
        "enqueue-all" => {
            let enqueued = bootstrap::scheduler(&state).fire().await;
            println!("enqueued {enqueued} refresh jobs on {}", state.queue.name());
        }
        "refresh" => {
            let asset_id = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing asset id"))?;
            let job = RefreshJob::parse(&asset_id)
                .map_err(|err| anyhow::anyhow!("invalid asset id {asset_id}: {err}"))?;
            let outcome = bootstrap::worker(&state).process(&job).await?;
            println!(
                "refreshed {} updated={} conflicts={} failed={}",
                job.asset_id, outcome.updated, outcome.conflicts, outcome.failed
            );
        }
        "queue-len" => {
            let len = state.queue.len().await?;
            println!("{} {len}", state.queue.name());
        }
        "flush-holdings-cache" => {
            let removed = state.store.flush_owner_caches().await?;
            println!("removed {removed} cached holdings listings");
        }
        _ => {
            eprintln!(
                "Usage: cargo run -p pnl_api --bin admin_tools -- <command>\n\
                 Commands:\n  assets\n  enqueue-all\n  refresh <asset_id>\n  queue-len\n  flush-holdings-cache"
            );
        }
    }

    Ok(())
}
