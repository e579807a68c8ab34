//! # Query Watcher
//!
//! Runs the dapp data layer headless: subscribes to the OGV stats and APY
//! queries, optionally tracks a wallet balance, and logs every update until
//! Ctrl+C.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin query_watcher -- --interval-secs 30
//! cargo run --bin query_watcher -- --account 0x... --token 0x2A8e1E676Ec238d8A992307B495b45B3fEAa5e86 --symbol OUSD
//! cargo run --bin query_watcher -- --route /api/ogv-stats
//! ```

use anyhow::Result;
use clap::Parser;
use ethers::types::Address;
use log::{info, warn};
use origin_dapp_sdk::{
    api_routes::{ApiRouter, CirculatingSupplyRoute, OgvStatsRoute},
    context::DappContext,
    metrics,
    services::OgvStatsService,
    settings::Settings,
};
use reqwest::Method;
use std::time::Duration;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "query_watcher", about = "Watch dapp queries and log updates")]
struct Args {
    /// Refetch interval for the stats queries
    #[arg(long, default_value_t = 60)]
    interval_secs: u64,

    /// Connected wallet to track balances for
    #[arg(long)]
    account: Option<String>,

    /// ERC-20 token whose balance to track (requires --account)
    #[arg(long)]
    token: Option<String>,

    #[arg(long, default_value = "OUSD")]
    symbol: String,

    #[arg(long, default_value_t = 1)]
    chain_id: u64,

    /// Answer one GET for this API route, print it and exit
    #[arg(long)]
    route: Option<String>,

    /// Simulate a window focus event this often
    #[arg(long)]
    focus_every_secs: Option<u64>,
}

fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| anyhow::anyhow!("invalid address {}: {:?}", raw, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();
    metrics::describe_metrics();

    let args = Args::parse();
    let account = args.account.as_deref().map(parse_address).transpose()?;
    let token = args.token.as_deref().map(parse_address).transpose()?;

    let settings = Settings::new()?;
    println!("✅ Settings loaded");

    if let Some(path) = args.route.as_deref() {
        let fetch = origin_dapp_sdk::fetch_service::FetchService::new(&settings.http)?;
        let ogv = OgvStatsService::new(fetch, settings.endpoints.clone());
        let router = ApiRouter::new()
            .with_route(OgvStatsRoute::new(ogv.clone()))
            .with_route(CirculatingSupplyRoute::new(ogv));
        let response = router.handle(&Method::GET, path).await;
        println!("{} {}", response.status, serde_json::to_string_pretty(&response.body)?);
        return Ok(());
    }

    let ctx = DappContext::from_settings(settings)?;
    println!("✅ Context ready (rpc: {})", ctx.settings().endpoints.rpc_url);

    let interval = Duration::from_secs(args.interval_secs.max(1));
    let mut stats = ctx.ogv_stats_query(ctx.default_options().refetch_interval(interval))?;
    let mut apy = ctx.trailing_apy_query(
        30,
        ctx.default_options()
            .refetch_interval(interval)
            .keep_previous_data(true),
    )?;

    if let Some(account) = account {
        ctx.connect_wallet(account, args.chain_id);
    }
    let mut balance = match (account, token) {
        (Some(_), Some(token)) => Some(ctx.balance_query(
            token,
            &args.symbol,
            ctx.default_options()
                .refetch_interval(interval)
                .keep_previous_data(true),
        )?),
        (None, Some(_)) => {
            warn!("--token given without --account, balance tracking disabled");
            None
        }
        _ => None,
    };

    let focus_period = args.focus_every_secs.map(Duration::from_secs);
    let mut focus_ticker = tokio::time::interval(focus_period.unwrap_or(Duration::from_secs(3600)));
    focus_ticker.tick().await;

    println!("👀 Watching queries, Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("\n🛑 Shutting down");
                break;
            }
            alive = stats.changed() => {
                if !alive { break; }
                let state = stats.state();
                match (&state.data, &state.error) {
                    (Some(s), _) if !state.is_fetching => info!(
                        "OGV ${:.5} ({:+.2}% 24h), circulating {:.0}, total {:.0}",
                        s.price,
                        s.change_24h,
                        s.latest_circulating_supply(),
                        s.latest_total_supply()
                    ),
                    (_, Some(e)) => warn!("OGV stats error: {}", e),
                    _ => {}
                }
            }
            alive = apy.changed() => {
                if !alive { break; }
                let state = apy.state();
                if let Some(e) = &state.error {
                    warn!("APY error (showing last value): {}", e);
                } else if let Some(value) = state.data.filter(|_| !state.is_fetching) {
                    info!("Trailing 30d APY {:.2}%", value);
                }
            }
            alive = async {
                match balance.as_mut() {
                    Some(observer) => observer.changed().await,
                    None => std::future::pending().await,
                }
            } => {
                if !alive { break; }
                if let Some(observer) = balance.as_mut() {
                    let state = observer.state();
                    if let Some(value) = state.data {
                        info!("{} balance {:.4}", args.symbol, value);
                    }
                }
            }
            _ = focus_ticker.tick(), if focus_period.is_some() => {
                let refetched = ctx.window_focused();
                info!("Focus event refetched {} queries", refetched);
            }
        }
    }

    ctx.logout();
    Ok(())
}
