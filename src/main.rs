use std::process::ExitCode;
use std::sync::Arc;

use arbor::{
    application::{
        error::AppError,
        notifications::Notifications,
        publishing::{ContentService, PublishResult},
        scheduled::ScheduledPublisher,
    },
    cache::{CacheConfig, CacheConsumer, PublishedNode, SourceArbitrator, TreeChangeQueue},
    config::{self, Command, Settings},
    infra::{
        memory::MemoryRepository,
        seed::{SeededContent, load_seed},
        telemetry,
    },
};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_application_error(&error);
            ExitCode::from(error.exit_code())
        }
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.chain();
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?chain, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Resolve(args) => {
            let runtime = Runtime::load(&settings, &args.seed.seed).await?;
            run_resolve(&runtime, args.id).await
        }
        Command::PublishBranch(args) => {
            let runtime = Runtime::load(&settings, &args.node.seed.seed).await?;
            run_publish_branch(&runtime, args.node.id, args.force).await
        }
        Command::PathCheck(args) => {
            let runtime = Runtime::load(&settings, &args.seed.seed).await?;
            run_path_check(&runtime, args.id).await
        }
        Command::Sweep(args) => {
            let runtime = Runtime::load(&settings, &args.seed).await?;
            run_sweep(runtime, &settings).await
        }
    }
}

/// Services wired over one seed file.
struct Runtime {
    repository: Arc<MemoryRepository>,
    arbitrator: SourceArbitrator,
    consumer: CacheConsumer,
    content: ContentService,
}

impl Runtime {
    async fn load(settings: &Settings, seed: &std::path::Path) -> Result<Self, AppError> {
        let SeededContent { repository, index } = load_seed(seed).await?;
        let cache_config = CacheConfig::from(&settings.cache);
        let queue = Arc::new(TreeChangeQueue::new());

        let arbitrator = SourceArbitrator::new(
            &cache_config,
            repository.clone(),
            repository.clone(),
            Some(index),
        );
        let consumer = CacheConsumer::new(cache_config, queue.clone(), arbitrator.clone());
        let content = ContentService::new(
            repository.clone(),
            repository.clone(),
            repository.clone(),
            queue,
            Notifications::new(),
        );

        Ok(Self {
            repository,
            arbitrator,
            consumer,
            content,
        })
    }
}

async fn run_resolve(runtime: &Runtime, id: i32) -> Result<(), AppError> {
    let node = runtime
        .arbitrator
        .resolve(id)
        .await?
        .ok_or(AppError::NotFound)?;

    let children = node.children().await?;
    let mut rendered = node_json(&node);
    rendered["children"] = children.iter().map(|child| node_json(child)).collect();
    print_json(&rendered);
    Ok(())
}

async fn run_publish_branch(runtime: &Runtime, id: i32, force: bool) -> Result<(), AppError> {
    let results = runtime.content.publish_branch(id, force, 0).await?;
    let batches = runtime.consumer.consume_all();
    info!(root_id = id, batches, "Branch publish applied to cache");

    print_json(&Value::Array(results.iter().map(result_json).collect()));
    Ok(())
}

async fn run_path_check(runtime: &Runtime, id: i32) -> Result<(), AppError> {
    let publishable = runtime.content.is_path_publishable(id).await?;
    let entity = runtime.repository.entity(id).await.ok_or(AppError::NotFound)?;
    let published = runtime.content.is_path_published(&entity).await?;

    print_json(&json!({
        "id": id,
        "path": entity.path.to_string(),
        "publishable": publishable,
        "published": published,
    }));
    Ok(())
}

async fn run_sweep(runtime: Runtime, settings: &Settings) -> Result<(), AppError> {
    let publisher = ScheduledPublisher::new(runtime.content, settings.scheduler.cadence)
        .with_consumer(runtime.consumer);
    let results = publisher.tick(OffsetDateTime::now_utc()).await;

    print_json(&Value::Array(results.iter().map(result_json).collect()));
    Ok(())
}

fn node_json(node: &PublishedNode) -> Value {
    let properties: serde_json::Map<String, Value> = node
        .properties()
        .iter()
        .map(|property| {
            let value = property
                .value()
                .map(|value| Value::String(value.to_string()))
                .unwrap_or(Value::Null);
            (property.alias().to_string(), value)
        })
        .collect();

    json!({
        "id": node.id(),
        "key": node.key(),
        "name": node.name(),
        "urlName": node.url_name(),
        "path": node.path().to_string(),
        "level": node.level(),
        "sortOrder": node.sort_order(),
        "contentType": node.content_type_alias(),
        "provenance": node.provenance().as_str(),
        "properties": properties,
    })
}

fn result_json(result: &PublishResult) -> Value {
    json!({
        "id": result.content.id,
        "name": result.content.name,
        "outcome": result.outcome.as_str(),
        "state": result.content.publish_state.as_str(),
    })
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => error!(error = %err, "failed to encode output"),
    }
}
