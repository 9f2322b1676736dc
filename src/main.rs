use std::{process, sync::Arc};

use homefeed::{
    application::{
        error::AppError,
        feed::{FeedService, FeedServiceConfig},
        repos::{FriendGraph, PostStore, UserDirectory},
    },
    cache::{FeedCache, MemoryFeedCache},
    config,
    infra::{
        cache_warmer::{CacheWarmer, WarmerConfig},
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        memory::{MemoryFriendGraph, MemoryPostStore},
        notifier::{BroadcastNotifier, NotifierConfig},
        telemetry::{self, MetricsObserver},
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

struct Stores {
    posts: Arc<dyn PostStore>,
    friends: Arc<dyn FriendGraph>,
    users: Arc<dyn UserDirectory>,
    db: Option<Arc<PostgresRepositories>>,
}

async fn init_stores(settings: &config::Settings) -> Result<Stores, AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        warn!(
            target = "homefeed::serve",
            "no database url configured, posts and friendships are kept in memory"
        );
        let posts = Arc::new(MemoryPostStore::new());
        let graph = Arc::new(MemoryFriendGraph::new());
        return Ok(Stores {
            posts,
            friends: graph.clone(),
            users: graph,
            db: None,
        });
    };

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let repositories = Arc::new(PostgresRepositories::new(pool));
    Ok(Stores {
        posts: repositories.clone(),
        friends: repositories.clone(),
        users: repositories.clone(),
        db: Some(repositories),
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let stores = init_stores(&settings).await?;

    let cache: Arc<dyn FeedCache> = Arc::new(MemoryFeedCache::new());
    let notifier = Arc::new(BroadcastNotifier::new(&NotifierConfig::from(
        &settings.notifier,
    )));

    let feed = Arc::new(
        FeedService::new(
            stores.posts.clone(),
            stores.friends.clone(),
            cache.clone(),
            notifier.clone(),
            FeedServiceConfig::from(&settings.feed),
        )
        .with_observer(Arc::new(MetricsObserver)),
    );

    let warmer = Arc::new(CacheWarmer::new(
        stores.users.clone(),
        stores.friends.clone(),
        stores.posts.clone(),
        cache,
        WarmerConfig {
            capacity: settings.feed.cache_capacity.get(),
            concurrency: settings.warmer.concurrency.get(),
        },
    ));

    if settings.warmer.on_startup {
        match warmer.warm_all_users().await {
            Ok(report) if !report.is_clean() => warn!(
                target = "homefeed::serve",
                failed = report.failures.len(),
                "startup cache warm finished with failures"
            ),
            Ok(_) => {}
            Err(err) => warn!(
                target = "homefeed::serve",
                error = %err,
                "startup cache warm failed"
            ),
        }
    }

    let warm_handle = settings
        .warmer
        .interval
        .map(|interval| warmer.clone().spawn_periodic(interval));

    let state = HttpState {
        feed,
        notifier: notifier.clone(),
        warmer,
        db: stores.db,
    };

    let result = serve_http(&settings, state, notifier).await;

    if let Some(handle) = warm_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn serve_http(
    settings: &config::Settings,
    state: HttpState,
    notifier: Arc<BroadcastNotifier>,
) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "homefeed::serve",
        addr = %settings.server.addr,
        "listening"
    );

    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.notified().await }
    });
    let server = server.into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(target = "homefeed::serve", error = %err, "failed to listen for shutdown signal");
            }
        }
    }

    info!(target = "homefeed::serve", "shutting down");
    // Live streams only end once their topic is gone.
    notifier.close();
    shutdown.notify_one();

    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(_) => {
            warn!(
                target = "homefeed::serve",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out"
            );
            Ok(())
        }
    }
}
