//! Arqonz: job runner for the marketplace's AI image tools.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod routes;
mod state;

use arqonz_tools::ToolKind;
use state::AppState;

fn resolve_data_dir() -> PathBuf {
    std::env::var("ARQONZ_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn print_tools() {
    println!("{:<18} {:<18} {:<6} {:<6} ROUTE", "SLUG", "NAME", "IMAGE", "MASK");
    let yes_no = |flag: bool| if flag { "yes" } else { "no" };
    for tool in ToolKind::ALL {
        println!(
            "{:<18} {:<18} {:<6} {:<6} {}",
            tool.slug(),
            tool.display_name(),
            yes_no(tool.requires_image()),
            yes_no(tool.requires_mask()),
            tool.route().path(tool)
        );
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

    if args.len() > 1 {
        match args[1].as_str() {
            "tools" => {
                print_tools();
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("Arqonz: AI image tool job runner");
                println!();
                println!("Usage: arqonz [command]");
                println!();
                println!("Commands:");
                println!("  (none)     Start the server");
                println!("  tools      List the available AI tools");
                println!("  help       Show this help message");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'arqonz help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = arqonz_core::ArqonzConfig::from_env(&data_dir)?;
    let port = config.port;
    info!(
        "Backend {} (poll every {}ms, give up after {}ms)",
        config.gateway.api_base_url, config.polling.poll_interval_ms, config.polling.timeout_ms
    );
    if config.gateway.api_key.is_none() {
        info!("ARQONZ_API_KEY not set, credits will not be debited");
    }

    let state = Arc::new(AppState::new(config));
    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Arqonz server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
