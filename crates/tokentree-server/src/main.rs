//! TokenTree: hierarchical token-budget balancer and dispatch server.

use std::sync::Arc;

use tokentree_core::RuntimeConfig;
use tokentree_runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod routes;
mod state;

use state::AppState;

fn print_help() {
    println!("TokenTree: hierarchical token-budget balancer");
    println!();
    println!("Usage: tokentree [command]");
    println!();
    println!("Commands:");
    println!("  (none) | serve                Start the HTTP server");
    println!("  report                        Print leaf allocations and utilization");
    println!("  status                        Print runtime status as JSON");
    println!("  dispatch <action> [params]    Dispatch one action; params is a JSON object");
    println!("  workflow <name> [params]      Run tenant_report, data_sync or full_pipeline");
    println!("  help                          Show this help message");
    println!();
    println!("Environment:");
    println!("  TOKENTREE_BUDGET, TOKENTREE_MAX_RETRIES, TOKENTREE_HISTORY_LIMIT,");
    println!("  TOKENTREE_MANIFEST, PORT, RUST_LOG");
}

fn print_report(runtime: &Runtime) {
    println!("Total budget: {}", runtime.allocator().total_budget());
    for (unit, report) in runtime.report() {
        println!("  {:<8} {}", unit, report);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = RuntimeConfig::from_env()?;

    if args.len() > 1 {
        match args[1].as_str() {
            "serve" => {}
            "report" => {
                let runtime = Runtime::from_config(config)?;
                print_report(&runtime);
                return Ok(());
            }
            "status" => {
                let runtime = Runtime::from_config(config)?;
                println!("{}", serde_json::to_string_pretty(&runtime.status())?);
                return Ok(());
            }
            "dispatch" => {
                let Some(action) = args.get(2) else {
                    eprintln!("Usage: tokentree dispatch <action> [params-json]");
                    std::process::exit(1);
                };
                let params = match args.get(3) {
                    Some(raw) => serde_json::from_str(raw)?,
                    None => serde_json::Value::Null,
                };
                let mut runtime = Runtime::from_config(config)?;
                let result = runtime.dispatch_raw(action, params);
                println!("{}", serde_json::to_string_pretty(&result)?);
                std::process::exit(if result.success { 0 } else { 1 });
            }
            "workflow" => {
                let Some(name) = args.get(2) else {
                    eprintln!("Usage: tokentree workflow <name> [params-json]");
                    std::process::exit(1);
                };
                let params = match args.get(3) {
                    Some(raw) => serde_json::from_str(raw)?,
                    None => serde_json::Value::Null,
                };
                let mut runtime = Runtime::from_config(config)?;
                let result = runtime.run_workflow_raw(name, params)?;
                println!("{}", serde_json::to_string_pretty(&result)?);
                std::process::exit(if result.success { 0 } else { 1 });
            }
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'tokentree help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let port = config.port;
    let runtime = Runtime::from_config(config.clone())?;
    let state = Arc::new(AppState::new(config, runtime));

    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("TokenTree server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
