use clap::Parser;
use job_board::{
    AppState,
    cli::{Cli, Command, CommandContext},
    config::{AppConfig, Env},
    create_router,
    events::{self, EventPublisherState},
    password::{Argon2PasswordHasher, HasherState},
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// The asynchronous entry point: Configuration, Logging, Database, then either the HTTP
/// server or a one-shot bootstrap command.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise sensible defaults for local development.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "job_board=debug,tower_http=info,axum=info".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            // LOCAL: Pretty print output for human readability.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // PROD: JSON output for centralized log aggregators.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    // 4. Database Initialization (Postgres)
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let repo = Arc::new(PostgresRepository::new(pool.clone())) as RepositoryState;
    let hasher = Arc::new(Argon2PasswordHasher::new()) as HasherState;

    match cli.command() {
        Command::Migrate => {
            run_migrations(&pool).await;
        }
        Command::Serve => {
            run_migrations(&pool).await;
            serve(config, repo, hasher).await;
        }
        command => {
            let context = CommandContext::new(repo, hasher);
            match context.execute(command).await {
                Ok(message) => println!("{message}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Applies the embedded migrations under `./migrations`.
async fn run_migrations(pool: &PgPool) {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .expect("FATAL: Failed to run database migrations.");
    tracing::info!("Database migrations applied.");
}

async fn serve(config: AppConfig, repo: RepositoryState, hasher: HasherState) {
    tracing::info!("Application starting in {:?} mode", config.env);

    // 5. Event Channel: bounded hand-off drained by a background listener.
    let (publisher, receiver) = events::event_channel(config.event_buffer);
    let _listener_task = events::spawn_event_listener(receiver);
    let events = Arc::new(publisher) as EventPublisherState;

    // 6. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        events,
        hasher,
        config,
    };

    // 7. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check APP_BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
