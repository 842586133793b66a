//! Application boot sequence.
//!
//! Order matters: configuration, then logging, then the database and
//! stores, then the engine family, then the outbox, and finally the HTTP
//! surface. Everything is constructed here and passed down by handle.

use std::sync::Arc;

use argon2::Argon2;
use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use strmforge_api::{AppState, serve};
use strmforge_config::{AppConfig, QUEUE_SETTINGS_KEY, QueueSettings, SeedUser};
use strmforge_data::{
    Database, HistoryStore, NotificationStore, SettingsStore, SystemLogStore, TaskLogStore,
    TaskStore, UserStore, ValidationStore,
};
use strmforge_engine::{EngineDeps, EngineOptions, Scheduler, TaskEngine, WebhookDispatcher};
use strmforge_events::EventBus;
use strmforge_notify::{EventBridge, OutboxWorker, SettingsChannelProvider};
use strmforge_telemetry::{LogFormat, LoggingConfig, Metrics, build_sha, init_logging};
use strmforge_validate::ValidationEngine;

use crate::error::{AppError, AppResult};

/// Entry point for the application boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, persistence, or server startup fails.
pub async fn run_app() -> AppResult<()> {
    let config = AppConfig::from_env()?;
    run_app_with(config).await
}

/// Boot sequence over an injected configuration to simplify testing.
///
/// # Errors
///
/// Returns an error if persistence or server startup fails.
pub async fn run_app_with(config: AppConfig) -> AppResult<()> {
    let logging = LoggingConfig {
        level: &config.logging.level,
        format: LogFormat::from_label(config.logging.format.as_deref()),
        build_sha: build_sha(),
    };
    init_logging(&logging).map_err(AppError::Telemetry)?;
    info!(backend = config.database.backend().as_str(), "strmforge bootstrap starting");

    let database = Database::connect(&config.database).await?;
    let pool = database.pool().clone();
    let tasks = TaskStore::new(pool.clone());
    let logs = TaskLogStore::new(pool.clone());
    let history = HistoryStore::new(pool.clone());
    let settings = SettingsStore::new(pool.clone());
    let system = SystemLogStore::new(pool.clone());
    let notifications = NotificationStore::new(pool.clone());
    let validations = ValidationStore::new(pool.clone());
    let users = UserStore::new(pool);

    if let Some(seed) = &config.seed_user {
        seed_admin(&users, seed).await?;
    }

    let metrics = Metrics::new().map_err(AppError::Telemetry)?;
    let events = EventBus::new();

    let queue = settings
        .get::<QueueSettings>(QUEUE_SETTINGS_KEY)
        .await?
        .unwrap_or_default();

    let engine = TaskEngine::start(
        EngineDeps {
            tasks: tasks.clone(),
            logs: logs.clone(),
            history: history.clone(),
            settings: settings.clone(),
            system: system.clone(),
            events: events.clone(),
        },
        EngineOptions {
            workers: queue.workers,
            metrics: Some(metrics.clone()),
            origin_override: None,
        },
    );
    engine.reconcile().await?;

    let scheduler = Arc::new(Scheduler::new(engine.clone(), tasks.clone()));
    scheduler.start().await?;
    let dispatcher = Arc::new(WebhookDispatcher::new(engine.clone(), tasks.clone()));

    let validation = ValidationEngine::new(
        validations,
        history.clone(),
        settings.clone(),
        events.clone(),
    )
    .with_metrics(metrics.clone());

    let shutdown = CancellationToken::new();
    let http = reqwest::Client::new();
    let outbox = OutboxWorker::new(
        notifications.clone(),
        settings.clone(),
        Arc::new(SettingsChannelProvider::new(settings.clone(), http.clone())),
    )
    .with_metrics(metrics.clone());
    let outbox_handle = outbox.spawn(shutdown.child_token());
    let bridge = EventBridge::new(
        events.clone(),
        notifications.clone(),
        SettingsChannelProvider::new(settings.clone(), http),
    );
    let bridge_handle = bridge.spawn(shutdown.child_token());

    let state = AppState {
        tasks,
        logs,
        notifications,
        system,
        engine: engine.clone(),
        scheduler: scheduler.clone(),
        dispatcher,
        validation,
        metrics,
        database,
    };

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    let served = serve(state, config.http.port, shutdown.clone()).await;

    shutdown.cancel();
    engine.shutdown();
    scheduler.stop().await;
    if let Err(err) = outbox_handle.await {
        warn!(error = %err, "outbox worker did not exit cleanly");
    }
    if let Err(err) = bridge_handle.await {
        warn!(error = %err, "notification bridge did not exit cleanly");
    }
    info!("strmforge stopped");

    served.map_err(AppError::Serve)
}

async fn seed_admin(users: &UserStore, seed: &SeedUser) -> AppResult<()> {
    let hash = hash_password(&seed.password)?;
    let inserted = users.ensure_seed(&seed.name, &hash).await?;
    if inserted {
        info!(user = %seed.name, "seed administrator created");
    }
    Ok(())
}

fn hash_password(input: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon = Argon2::default();
    let hash = argon
        .hash_password(input.as_bytes(), &salt)
        .map_err(|err| AppError::Seed(format!("failed to hash password: {err}")))?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHash, PasswordVerifier};

    #[test]
    fn seed_hashes_verify_against_their_password() {
        let hash = hash_password("hunter2").expect("hashing succeeds");
        let parsed = PasswordHash::new(&hash).expect("PHC string parses");
        assert!(
            Argon2::default()
                .verify_password(b"hunter2", &parsed)
                .is_ok()
        );
        assert!(
            Argon2::default()
                .verify_password(b"wrong", &parsed)
                .is_err()
        );
    }

    #[tokio::test]
    async fn seeding_is_idempotent_per_username() {
        let db = strmforge_test_support::temp_database().await;
        let users = UserStore::new(db.database.pool().clone());
        let seed = SeedUser {
            name: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        seed_admin(&users, &seed).await.expect("first seed");
        seed_admin(&users, &seed).await.expect("second seed is a no-op");
        assert!(
            users
                .password_hash("admin")
                .await
                .expect("lookup")
                .is_some()
        );
    }
}
