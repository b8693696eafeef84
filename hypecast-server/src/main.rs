use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hypecast_core::angles::{content_priority, identify_angles, primary_angle};
use hypecast_core::{HypecastConfig, Platform, PromptBuilder, WarehouseSource};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use hypecast_server::batch::resolve_platforms;
use hypecast_server::state::{build_loader, warehouse_from_config, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "hypecast.toml")]
    config: String,

    /// Check warehouse connectivity and view access, then exit
    #[arg(long)]
    health: bool,

    /// Print angles and prompts for the loaded events without calling the model
    #[arg(long)]
    dry_run: bool,

    /// Generate and export one batch, then exit
    #[arg(long)]
    run_once: bool,

    #[arg(long, default_value_t = 10)]
    max_events: usize,

    /// Export directory for --run-once (defaults to export.output_dir)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Target platform; repeat for several (defaults to service.default_platform)
    #[arg(long = "platform")]
    platforms: Vec<Platform>,
}

fn warehouse_or_exit(config: &HypecastConfig) -> Arc<dyn WarehouseSource> {
    match warehouse_from_config(config) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to configure warehouse: {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match HypecastConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over service.log_level
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    if args.health {
        let loader = build_loader(&config, warehouse_or_exit(&config));
        match loader.health_check().await {
            Ok(v) => println!("✅ Warehouse connected: {}", v),
            Err(e) => {
                println!("❌ Warehouse connection failed: {}", e);
                std::process::exit(1);
            }
        }

        let mut all_ok = true;
        for (kind, ok) in loader.validate_views().await {
            let view = config.warehouse.views.name_for(kind);
            if ok {
                println!("✅ {} ({})", kind, view);
            } else {
                println!("❌ {} ({}) not readable", kind, view);
                all_ok = false;
            }
        }

        if !all_ok {
            std::process::exit(1);
        }
        println!("✅ Hypecast health check passed");
        return Ok(());
    }

    let platforms = resolve_platforms(&args.platforms, config.service.default_platform);

    if args.dry_run {
        let loader = build_loader(&config, warehouse_or_exit(&config));
        let loaded = loader.load_events().await?;
        for warning in &loaded.warnings {
            println!("⚠️  {}", warning);
        }

        let prompts = PromptBuilder::new();
        for event in loaded.events.iter().take(args.max_events) {
            let angle = primary_angle(event);
            let angles = identify_angles(event, config.generation.max_angles_per_event);
            println!(
                "#{} {} | {} | angles: {:?} | priority {}/10",
                event.rank,
                event.display_artist(),
                event.location(),
                angles,
                content_priority(event, angle)
            );
            for &platform in &platforms {
                match prompts.build(event, platform, angle) {
                    Ok(request) => println!("--- {} / {} ---\n{}\n", platform, angle, request.user_prompt),
                    Err(e) => println!("❌ Prompt error for {}: {}", event.event_id, e),
                }
            }
        }
        return Ok(());
    }

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.export.output_dir));
    let state = match AppState::from_config(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    if args.run_once {
        let (report, paths) =
            hypecast_server::batch::run_once(&state, args.max_events, &platforms, &output_dir).await?;
        println!(
            "✅ Generated {} posts ({} failed)",
            report.succeeded, report.failed
        );
        for failure in report.failures() {
            println!(
                "❌ {} / {}: {}",
                failure.artist_name,
                failure.platform,
                failure.failure_reason().unwrap_or("unknown error")
            );
        }
        println!("📁 {}", paths.json.display());
        println!("📁 {}", paths.text.display());
        println!("📁 {}", paths.csv.display());
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    hypecast_server::http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
