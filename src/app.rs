use crate::cli::ServiceName;
use crate::config::Config;
use crate::data::kv::PgKv;
use crate::data::prices::{PgCatalog, PriceCatalog};
use crate::refresh::extract::{AnthropicExtractor, PriceExtractor};
use crate::refresh::pacer::Pacer;
use crate::refresh::search::{BraveSearch, SearchProvider};
use crate::refresh::status::StatusStore;
use crate::refresh::{HEARTBEAT_INTERVAL, RefreshBackends, RefreshService, RefreshSettings};
use crate::services::manager::ServiceManager;
use crate::services::price_refresh::PriceRefreshService;
use crate::services::web::WebService;
use crate::state::{AppState, ServiceStatusRegistry};
use crate::utils::fmt_duration;
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    app_state: AppState,
    service_manager: ServiceManager,
}

impl App {
    /// Connect to the database, run migrations and wire up the refresh job.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let slow_threshold = Duration::from_millis(500);

        // sqlx logs statements at debug and anything over 1s at warn.
        let connect_options = sqlx::postgres::PgConnectOptions::from_str(&config.database_url)
            .context("Failed to parse database URL")?;

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(4)
            .acquire_slow_threshold(slow_threshold)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            min_connections = 0,
            max_connections = 4,
            acquire_timeout = "4s",
            idle_timeout = "2m",
            max_lifetime = "30m",
            acquire_slow_threshold = fmt_duration(slow_threshold),
            "database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        let catalog: Arc<dyn PriceCatalog> = Arc::new(PgCatalog::new(db_pool.clone()));
        let status = StatusStore::new(Arc::new(PgKv::new(db_pool.clone())));
        let backends = Self::build_backends(&config)?;
        let settings = RefreshSettings {
            cooldown: config.refresh_cooldown,
            stale_after: config.refresh_stale_after,
            heartbeat_every: HEARTBEAT_INTERVAL,
        };

        if settings.stale_after <= settings.heartbeat_every {
            warn!(
                stale_after = fmt_duration(settings.stale_after),
                heartbeat = fmt_duration(settings.heartbeat_every),
                "REFRESH_STALE_AFTER is not longer than the heartbeat; live runs may be reclaimed"
            );
        }

        let pacer = Pacer::new(config.refresh_pace);
        info!(
            cooldown = fmt_duration(settings.cooldown),
            pace = fmt_duration(pacer.interval()),
            stale_after = fmt_duration(settings.stale_after),
            model = %config.anthropic_model,
            "price refresh configured"
        );

        let refresh = RefreshService::new(
            status,
            catalog.clone(),
            backends,
            Arc::new(pacer),
            settings,
        );

        let statuses = ServiceStatusRegistry::new();
        let app_state = AppState::new(db_pool, catalog, refresh, statuses.clone());

        Ok(App {
            config,
            app_state,
            service_manager: ServiceManager::new(statuses),
        })
    }

    /// Construct the external clients whose credentials are present.
    /// Blank keys count as absent.
    fn build_backends(config: &Config) -> Result<RefreshBackends, anyhow::Error> {
        let present = |key: &Option<String>| {
            key.as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_owned)
        };

        let search = present(&config.brave_search_api_key)
            .map(|key| BraveSearch::new(config.brave_search_base_url.clone(), key))
            .transpose()
            .context("Failed to create search client")?
            .map(|client| Arc::new(client) as Arc<dyn SearchProvider>);

        let extractor = present(&config.anthropic_api_key)
            .map(|key| {
                AnthropicExtractor::new(
                    config.anthropic_base_url.clone(),
                    key,
                    config.anthropic_model.clone(),
                )
            })
            .transpose()
            .context("Failed to create extraction client")?
            .map(|client| Arc::new(client) as Arc<dyn PriceExtractor>);

        Ok(RefreshBackends { search, extractor })
    }

    /// Register the enabled services with the manager.
    pub fn setup_services(&mut self, services: &[ServiceName]) -> Result<(), anyhow::Error> {
        if services.contains(&ServiceName::Web) {
            self.service_manager.register_service(Box::new(WebService::new(
                self.config.port,
                self.app_state.clone(),
            )));
        }

        if services.contains(&ServiceName::PriceRefresh) {
            // Leave the manager headroom to collect the other services.
            let refresh_timeout = self.config.shutdown_timeout.mul_f64(0.75);
            self.service_manager
                .register_service(Box::new(PriceRefreshService::new(
                    self.app_state.refresh.clone(),
                    self.app_state.service_statuses.clone(),
                    refresh_timeout,
                )));
        }

        if !self.service_manager.has_services() {
            error!("No services enabled. Cannot start application.");
            return Err(anyhow::anyhow!("No services enabled"));
        }

        Ok(())
    }

    /// Start all registered services
    pub fn start_services(&mut self) {
        self.service_manager.spawn_all();
    }

    /// Run the application and handle shutdown signals
    pub async fn run(self) -> ExitCode {
        use crate::services::signals::handle_shutdown_signals;
        handle_shutdown_signals(self.service_manager, self.config.shutdown_timeout).await
    }
}
