use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use lmssync::api::router;
use lmssync::canvas::CanvasHttpClient;
use lmssync::config::{self, Settings};
use lmssync::db::MappingStore;
use lmssync::error::AppError;
use lmssync::outlook::OutlookHttpClient;
use lmssync::services::{SyncOptions, SyncService};
use lmssync::state::AppState;

#[derive(Parser)]
#[command(name = "lmssync", version, about = "Sync Canvas assignments into Microsoft To Do")]
struct Cli {
    /// Environment file to load instead of `.env`
    #[arg(long, global = true)]
    env: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one reconciliation pass (default)
    Sync {
        /// Compute and log changes without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show mapping store counts
    Status,
    /// Check connectivity to Canvas and Microsoft Graph
    Health,
    /// List active Canvas courses
    Courses,
    /// Delete every stored mapping
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Serve the operator API
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let env_loaded = config::load_env(cli.env.as_deref());
    init_tracing(cli.verbose, cli.json_logs);
    if let Err(e) = env_loaded {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    let command = cli.command.unwrap_or(Command::Sync { dry_run: false });
    match execute(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, json_logs: bool) {
    let filter = if verbose {
        EnvFilter::new("lmssync=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lmssync=info"))
    };
    let registry = tracing_subscriber::registry().with(filter);

    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn execute(command: Command) -> Result<(), AppError> {
    match command {
        Command::Sync { dry_run } => {
            let settings = Settings::from_env()?;
            let store = MappingStore::connect(&settings.database_path).await?;
            let service = build_service(&settings, store, dry_run)?;

            let summary = service.run().await?;
            println!("{}", summary);
            for failure in &summary.failures {
                println!("  {} [{}] {}", failure.key, failure.kind, failure.message);
            }
            Ok(())
        }
        Command::Status => {
            let store = MappingStore::connect(&config::database_path_from_env()).await?;
            let status = store.status().await?;
            println!("Total mappings:     {}", status.total);
            println!("Active (synced):    {}", status.active);
            println!("Archived:           {}", status.archived);
            println!("Completed:          {}", status.completed);
            println!("Pending:            {}", status.pending);
            Ok(())
        }
        Command::Health => {
            let settings = Settings::from_env()?;
            let canvas = canvas_client(&settings)?;
            let outlook = OutlookHttpClient::new(settings.outlook.clone(), settings.http_timeout)?;

            let courses = canvas.fetch_active_courses().await?;
            println!("Canvas: OK ({} active courses)", courses.len());
            let lists = outlook.list_task_lists().await?;
            println!("Microsoft To Do: OK ({} task lists)", lists.len());
            Ok(())
        }
        Command::Courses => {
            let settings = Settings::from_env()?;
            let canvas = canvas_client(&settings)?;
            for course in canvas.fetch_active_courses().await? {
                println!(
                    "{:>10}  {:<12}  {}",
                    course.id,
                    course.course_code.as_deref().unwrap_or("-"),
                    course.display_name()
                );
            }
            Ok(())
        }
        Command::Reset { yes } => {
            if !yes {
                return Err(AppError::Config(
                    "reset deletes every mapping; pass --yes to confirm".to_string(),
                ));
            }
            let store = MappingStore::connect(&config::database_path_from_env()).await?;
            store.clear().await?;
            println!("Mapping store cleared");
            Ok(())
        }
        Command::Serve { addr } => {
            let settings = Settings::from_env()?;
            let store = MappingStore::connect(&settings.database_path).await?;
            let service = build_service(&settings, store.clone(), false)?;
            let app = router(AppState::new(store, Arc::new(service)));

            info!("listening on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|e| AppError::Config(format!("Failed to bind {}: {}", addr, e)))?;
            axum::serve(listener, app)
                .await
                .map_err(|e| AppError::Config(format!("Server error: {}", e)))?;
            Ok(())
        }
    }
}

fn canvas_client(settings: &Settings) -> Result<CanvasHttpClient, AppError> {
    CanvasHttpClient::new(
        settings.canvas.clone(),
        settings.http_timeout,
        settings.sync.retry_policy(),
    )
}

fn build_service(
    settings: &Settings,
    store: MappingStore,
    dry_run: bool,
) -> Result<SyncService, AppError> {
    let canvas = Arc::new(canvas_client(settings)?);
    let outlook = Arc::new(OutlookHttpClient::new(
        settings.outlook.clone(),
        settings.http_timeout,
    )?);

    let options = SyncOptions {
        container_name: settings.sync.task_list_name.clone(),
        dry_run: dry_run || settings.sync.dry_run,
        retry: settings.sync.retry_policy(),
    };

    Ok(SyncService::new(store, canvas, outlook.clone(), outlook, options))
}
