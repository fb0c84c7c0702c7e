//! GenArena: run one prompt against several image providers side by side.

use std::sync::Arc;

use genarena_core::GenArenaConfig;
use genarena_providers::{create_registry, ProviderSettings};
use genarena_runtime::RunController;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod routes;
mod state;

use state::AppState;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GenArenaConfig::from_env()?;
    let settings = ProviderSettings::load(&config.providers_file);

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "providers" => {
                let registry = create_registry(&settings)?;
                for p in registry.list() {
                    println!("{:<12} {:<10} {:<10} {}", p.id, p.label, p.backend, p.models.join(", "));
                }
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("GenArena: side-by-side image generation server");
                println!();
                println!("Usage: genarena [command]");
                println!();
                println!("Commands:");
                println!("  (none)       Start the server");
                println!("  providers    List configured provider slots");
                println!("  help         Show this help message");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'genarena help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let registry = Arc::new(create_registry(&settings)?);
    let controller = RunController::new(registry, config.runtime.clone())?;
    let port = config.port;

    let state = Arc::new(AppState::new(config, controller));
    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("GenArena server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
