//! Billing reconciler service entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use billing_reconciler::adapters::gateways::{ApsGateway, HyperPayGateway, PayPalGateway, ReqwestTransport};
use billing_reconciler::adapters::http::{create_app, BillingAppState};
use billing_reconciler::adapters::memory::{FixedRateSource, StaticUserRoleReader};
use billing_reconciler::adapters::postgres::{
    self, PostgresEntitlementStore, PostgresPurchaseRepository, PostgresSubscriptionRepository,
    PostgresWebhookEventRepository,
};
use billing_reconciler::adapters::redis::RedisWebhookEventRepository;
use billing_reconciler::adapters::TracingSecuritySignalSink;
use billing_reconciler::application::handlers::billing::{
    ExpireSubscriptionsCommand, PurgeWebhookEventsCommand,
};
use billing_reconciler::application::services::GatewayRegistry;
use billing_reconciler::application::{BillingCollaborators, BillingStack, BillingStores};
use billing_reconciler::config::{AppConfig, ConfigError, PaymentConfig, ValidationError};
use billing_reconciler::domain::billing::GatewayKind;
use billing_reconciler::domain::foundation::Timestamp;
use billing_reconciler::ports::{HttpTransport, TransportError};

#[derive(Debug, Error)]
enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationError),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("http client: {0}")]
    Transport(#[from] TransportError),

    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        persistent = config.database.is_some(),
        redis_dedupe = config.redis.is_some(),
        "Starting billing reconciler"
    );

    // 1. Stores
    let mut stores = match &config.database {
        Some(database) => {
            let pool = postgres::connect(database).await?;
            if database.run_migrations {
                postgres::run_migrations(&pool, &database.migrations_dir).await?;
            }
            BillingStores {
                purchases: Arc::new(PostgresPurchaseRepository::new(pool.clone())),
                subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
                entitlements: Arc::new(PostgresEntitlementStore::new(pool.clone())),
                webhook_events: Arc::new(PostgresWebhookEventRepository::new(pool)),
            }
        }
        None => {
            tracing::warn!("No database configured; state is kept in memory");
            BillingStores::in_memory()
        }
    };

    if let Some(redis_config) = &config.redis {
        let client = redis::Client::open(redis_config.url.as_str())?;
        let conn = tokio::time::timeout(redis_config.timeout(), client.get_multiplexed_async_connection())
            .await
            .map_err(|_| {
                redis::RedisError::from((redis::ErrorKind::IoError, "connection timed out"))
            })??;
        stores.webhook_events = Arc::new(RedisWebhookEventRepository::new(
            conn,
            config.webhook.retention(),
        ));
    }

    // 2. Gateways and collaborators
    let gateways = gateway_registry(&config.payment)?;
    let rates = config.currency.parsed_rates()?;
    let stack = BillingStack::build(
        stores,
        BillingCollaborators {
            gateways,
            rates: Arc::new(FixedRateSource::new(rates)),
            roles: Arc::new(StaticUserRoleReader::new(config.server.admin_user_ids_list())),
            signals: Arc::new(TracingSecuritySignalSink::new()),
            period_arithmetic: config.payment.period_arithmetic,
        },
    );

    // 3. Background sweeps
    spawn_expiry_sweep(stack.clone(), config.payment.expiry_sweep_interval());
    spawn_webhook_purge(
        stack.clone(),
        config.webhook.retention_days,
        config.webhook.purge_interval(),
    );

    // 4. Serve
    let app = create_app(BillingAppState::from(&stack), &config.server);
    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down");
    Ok(())
}

/// JSON lines in production, human-readable otherwise. `RUST_LOG` overrides
/// `server.log_level`.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.as_str()));

    if config.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn gateway_registry(payment: &PaymentConfig) -> Result<GatewayRegistry, StartupError> {
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(
        payment.connect_timeout(),
        payment.request_timeout(),
    )?);

    let mut registry = GatewayRegistry::new();
    if let Some(paypal) = &payment.paypal {
        registry.register(Arc::new(PayPalGateway::new(paypal.adapter_config(), transport.clone())));
    }
    if let Some(hyperpay) = &payment.hyperpay {
        registry.register(Arc::new(HyperPayGateway::new(hyperpay.adapter_config(), transport.clone())));
    }
    if let Some(aps) = &payment.aps {
        registry.register(Arc::new(ApsGateway::new(aps.adapter_config(), transport)));
    }

    for kind in GatewayKind::ALL {
        if registry.is_configured(kind) {
            tracing::info!(gateway = %kind, "Gateway enabled");
        } else {
            tracing::warn!(gateway = %kind, "Gateway not configured; its requests will be refused");
        }
    }
    Ok(registry)
}

fn spawn_expiry_sweep(stack: BillingStack, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match stack
                .expire_subscriptions
                .handle(ExpireSubscriptionsCommand::at(Timestamp::now()))
                .await
            {
                Ok(result) if !result.expired.is_empty() => {
                    tracing::info!(expired = result.expired.len(), "Expiry sweep finished");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
            }
        }
    });
}

fn spawn_webhook_purge(stack: BillingStack, retention_days: u32, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let cmd = PurgeWebhookEventsCommand {
                retention_days,
                now: Timestamp::now(),
            };
            match stack.purge_webhook_events.handle(cmd).await {
                Ok(result) => tracing::debug!(deleted = result.deleted, "Webhook purge finished"),
                Err(e) => tracing::error!(error = %e, "Webhook purge failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
