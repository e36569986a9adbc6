//! Billing Bridge binary.
//!
//! - `serve` (default) - run the HTTP API
//! - `migrate` / `rollback` / `validate` - payment-data migration passes
//! - `check-config` - validate configuration and report provider credentials

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use billing_bridge::adapters::http::{app_router, BillingAppState};
use billing_bridge::adapters::{build_registry, postgres, InMemoryAccountStore, PostgresAccountStore};
use billing_bridge::application::{
    MigrationError, MigrationOutcome, PaymentDataMigrator, SubscriptionApplier, WebhookReconciler,
};
use billing_bridge::config::{AppConfig, ConfigError, ServerConfig, ValidationError};
use billing_bridge::domain::billing::{MigrationOperation, ProviderKind};
use billing_bridge::domain::foundation::DomainError;
use billing_bridge::ports::{AccountStore, SubscriptionSink};

#[derive(Parser, Debug)]
#[command(name = "billing-bridge")]
#[command(about = "Multi-provider subscription billing core", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Copy legacy card identifiers into the generic payment fields
    Migrate,
    /// Copy generic card identifiers back into the legacy fields
    Rollback,
    /// Compare legacy and generic card fields; exits 1 on mismatch
    Validate,
    /// Validate configuration and list configured providers
    CheckConfig,
}

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] DomainError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.server);

    match run(cli.command.unwrap_or(Command::Serve), config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_new(&server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if server.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

async fn run(command: Command, config: AppConfig) -> Result<ExitCode, StartupError> {
    match command {
        Command::Serve => serve(config).await,
        Command::Migrate => migration(MigrationOperation::Migrate, &config).await,
        Command::Rollback => migration(MigrationOperation::Rollback, &config).await,
        Command::Validate => migration(MigrationOperation::Validate, &config).await,
        Command::CheckConfig => check_config(&config),
    }
}

async fn serve(config: AppConfig) -> Result<ExitCode, StartupError> {
    config.validate()?;
    let addr = config.server.socket_addr()?;

    let store = account_store(&config).await?;
    let sink: Arc<dyn SubscriptionSink> = Arc::new(SubscriptionApplier::new(store.clone()));
    let registry = Arc::new(build_registry(&config.payment, sink.clone()));

    let mut reconciler = WebhookReconciler::new(registry.clone());
    for kind in ProviderKind::ALL {
        if let Some(secret) = config.payment.webhook_secret(kind) {
            reconciler = reconciler.with_secret(kind, secret);
        }
    }

    let state = BillingAppState {
        registry,
        store,
        sink,
        reconciler: Arc::new(reconciler),
        base_url: config.payment.base_url.clone(),
    };
    let app = app_router(state, config.server.request_timeout());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        environment = ?config.server.environment,
        default_provider = %config.payment.default_provider,
        "Billing bridge listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(ExitCode::SUCCESS)
}

async fn migration(
    operation: MigrationOperation,
    config: &AppConfig,
) -> Result<ExitCode, StartupError> {
    if !config.database.is_configured() {
        return Err(ValidationError::MissingRequired("POSTGRES_URL").into());
    }
    config.database.validate()?;
    let store = account_store(config).await?;

    let outcome = PaymentDataMigrator::new(store).run(operation).await?;
    match &outcome {
        MigrationOutcome::Completed(report) => {
            tracing::info!(operation = %report.operation, processed = report.processed, "Done");
        }
        MigrationOutcome::Validated(report) => {
            tracing::info!(
                checked = report.checked,
                inconsistent = report.inconsistent.len(),
                "Validation finished"
            );
        }
    }

    Ok(if outcome.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn check_config(config: &AppConfig) -> Result<ExitCode, StartupError> {
    for kind in ProviderKind::ALL {
        println!(
            "{:<8} {}",
            kind.as_str(),
            if config.payment.is_configured(kind) {
                "configured"
            } else {
                "missing credentials"
            }
        );
    }
    println!("database {}", config.database.backend());

    config.validate()?;
    println!("configuration ok");
    Ok(ExitCode::SUCCESS)
}

async fn account_store(config: &AppConfig) -> Result<Arc<dyn AccountStore>, StartupError> {
    if !config.database.is_configured() {
        tracing::warn!("No database configured; accounts are kept in memory");
        return Ok(Arc::new(InMemoryAccountStore::new()));
    }

    let pool = postgres::connect(&config.database).await?;
    if config.database.run_migrations {
        postgres::run_migrations(&pool).await?;
    }
    Ok(Arc::new(PostgresAccountStore::new(pool)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
