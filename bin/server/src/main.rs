use flowrun_scheduler::{CronTriggerLoop, EventRouter, TimeTriggerLoop, TriggerDispatcher};
use flowrun_server::{
    config::ServerConfig,
    db::{ExecutionRepository, TriggerRepository, WorkflowRepository},
    notify,
    routes::{self, AppState},
};
use flowrun_workflow::{Engine, steps::builtin_registry};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let workflows = Arc::new(WorkflowRepository::new(db_pool.clone()));
    let executions = Arc::new(ExecutionRepository::new(db_pool.clone()));
    let triggers = Arc::new(TriggerRepository::new(db_pool));

    let registry = builtin_registry(triggers.clone());
    tracing::info!(steps = registry.len(), "Registered step functions");
    let engine = Engine::new(
        workflows.clone(),
        executions,
        triggers.clone(),
        Arc::new(registry),
        notify::from_config(&config.notifier),
    );
    let dispatcher = Arc::new(TriggerDispatcher::with_engine(engine.clone()));

    // Spawn the trigger loops
    let tick = config.scheduler.tick();
    tokio::spawn(
        TimeTriggerLoop::new(triggers.clone(), dispatcher.clone())
            .with_tick(tick)
            .run(),
    );
    tokio::spawn(
        CronTriggerLoop::new(triggers.clone(), dispatcher.clone())
            .with_tick(tick)
            .run(),
    );

    let app = routes::router(AppState {
        engine,
        workflows,
        triggers: triggers.clone(),
        events: EventRouter::new(triggers, dispatcher),
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app.into_make_service())
        .await
        .expect("server error");
}
