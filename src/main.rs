use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use assessor::application::ports::{FileLoader, ProgressTracker, TaskBroker, TaskKind, TextPreparer};
use assessor::application::services::{
    ExecutorSettings, PipelineExecutor, Reconciler, ReconcilerSettings, SubmissionService,
    SubmissionSettings, spawn_worker_pool,
};
use assessor::infrastructure::analyzers::RegistryFactory;
use assessor::infrastructure::broker::ChannelBroker;
use assessor::infrastructure::observability::{TracingConfig, init_tracing};
use assessor::infrastructure::persistence::JobStoreFactory;
use assessor::infrastructure::progress::InMemoryProgressTracker;
use assessor::infrastructure::text_processing::{CompositeFileLoader, SentenceTokenizer};
use assessor::presentation::{ApiKeys, AppState, Environment, RouterConfig, Settings, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let environment = Environment::from_env().map_err(anyhow::Error::msg)?;
    let settings = Settings::load(environment).context("Failed to load configuration")?;

    init_tracing(&TracingConfig::new(
        environment.as_str(),
        settings.logging.enable_json || environment.prefers_json_logs(),
        settings.logging.level.clone(),
    ));

    let job_store = JobStoreFactory::create(&settings.database)
        .await
        .context("Failed to initialize job store")?;

    let registry = Arc::new(
        RegistryFactory::create(&settings.analyzers, settings.pipeline.filter_stage.as_ref())
            .context("Invalid analyzer configuration")?,
    );
    let default_filter_policy = settings
        .pipeline
        .default_filter_policy()
        .map_err(anyhow::Error::msg)?;

    let broker = Arc::new(ChannelBroker::new(settings.worker.queue_capacity));
    let tracker: Arc<dyn ProgressTracker> = Arc::new(InMemoryProgressTracker::new());
    let text_preparer: Arc<dyn TextPreparer> = Arc::new(SentenceTokenizer::new());
    let file_loader: Arc<dyn FileLoader> = Arc::new(CompositeFileLoader::standard());

    let mut executor = PipelineExecutor::new(
        Arc::clone(&job_store),
        Arc::clone(&registry),
        Arc::clone(&tracker),
        text_preparer,
        file_loader,
        ExecutorSettings {
            visibility_timeout: settings.worker.visibility_timeout(),
            default_filter_policy: default_filter_policy.clone(),
        },
    );
    if let Some(synthesis) = &settings.synthesis {
        executor = executor.with_synthesis(
            RegistryFactory::create_synthesis(synthesis, &registry)
                .context("Invalid synthesis configuration")?,
        );
    }
    let executor = Arc::new(executor);

    let mut workers = Vec::new();
    for kind in TaskKind::ALL {
        let subscription = broker.subscribe(kind)?;
        workers.extend(spawn_worker_pool(
            "worker",
            settings.worker.pool_size,
            subscription,
            Arc::clone(&executor),
        ));
    }
    tracing::info!(workers = workers.len(), "Worker pools started");

    let reconciler = Reconciler::new(
        Arc::clone(&job_store),
        broker.clone() as Arc<dyn TaskBroker>,
        Arc::clone(&tracker),
        ReconcilerSettings {
            orphan_grace: settings.worker.orphan_grace(),
            redispatch_after: settings.worker.redispatch_after(),
            sweep_interval: settings.worker.sweep_interval(),
            progress_ttl: settings.worker.progress_ttl(),
            archive_retention: settings.worker.archive_retention(),
        },
    );
    if let Err(e) = reconciler.recover().await {
        tracing::error!(error = %e, "Startup recovery failed, leaving orphans to the periodic sweep");
    }
    tokio::spawn(reconciler.run());

    let submission_service = Arc::new(SubmissionService::new(
        Arc::clone(&job_store),
        broker.clone() as Arc<dyn TaskBroker>,
        Arc::clone(&registry),
        Arc::clone(&tracker),
        SubmissionSettings {
            default_filter_policy,
            file_stages: settings.pipeline.file_stages.clone(),
            archive_dont_delete: settings.pipeline.archive_dont_delete,
            max_documents: settings.pipeline.max_documents,
        },
    ));

    let api_keys = ApiKeys::new(settings.auth.api_keys.clone());
    if !api_keys.is_enabled() {
        tracing::warn!("No API keys configured, authentication disabled");
    }

    let router = create_router(
        AppState {
            submission_service,
            registry,
        },
        RouterConfig {
            api_keys,
            body_limit_bytes: settings.server.max_body_mb * 1024 * 1024,
        },
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    broker.close();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
