// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use sensor_pipeline::config::{load_config_with_env, PipelineConfig, ZenohConfig};
use sensor_pipeline::telemetry::init_logging;
use sensor_pipeline::{
    ExportNotifier, ExportPipeline, ExportRequestInterface, HttpScenarioValidator, IngestGateway,
    KafkaPublisher, KafkaSubscriber, PipelineMetrics, PostgresSampleStore, SampleStore,
    StorageFactory, StreamTransformer,
};

/// Sensor pipeline - ingest, transform and export multi-channel sensor data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/default.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Forward raw device frames into the durable log
    Gateway,
    /// Persist durable log envelopes as long-format samples
    Transformer,
    /// Serve export requests and notifications
    Exporter,
    /// Publish one export notification and exit
    Notify {
        #[arg(long)]
        scenario_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config_with_env(&args.config)?;
    init_logging(&config.logging)?;

    info!("Loaded configuration from: {:?}", args.config);

    match args.command {
        Command::Gateway => run_until_ctrl_c("gateway", run_gateway(&config)).await,
        Command::Transformer => run_until_ctrl_c("transformer", run_transformer(&config)).await,
        Command::Exporter => run_until_ctrl_c("exporter", run_exporter(&config)).await,
        Command::Notify { scenario_id } => {
            let publisher = Arc::new(KafkaPublisher::new(&config.kafka)?);
            ExportNotifier::new(publisher, config.kafka.notification_topic.clone())
                .notify(scenario_id)
                .await?;
            Ok(())
        }
    }
}

async fn run_until_ctrl_c(stage: &str, stage_future: impl std::future::Future<Output = Result<()>>) -> Result<()> {
    info!("Starting {}", stage);

    tokio::select! {
        result = stage_future => {
            if let Err(e) = &result {
                error!("{} stopped with error: {:#}", stage, e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down {}", stage);
            Ok(())
        }
    }
}

async fn open_zenoh(config: &ZenohConfig) -> Result<zenoh::Session> {
    let mut zenoh_config = zenoh::Config::default();

    let mode = match config.mode.as_str() {
        "client" | "router" => config.mode.as_str(),
        _ => "peer",
    };
    zenoh_config
        .insert_json5("mode", &serde_json::to_string(mode)?)
        .map_err(|e| anyhow!("Invalid zenoh mode: {}", e))?;

    if let Some(connect) = &config.connect {
        zenoh_config
            .insert_json5("connect/endpoints", &serde_json::to_string(&connect.endpoints)?)
            .map_err(|e| anyhow!("Invalid zenoh connect endpoints: {}", e))?;
    }

    if let Some(listen) = &config.listen {
        zenoh_config
            .insert_json5("listen/endpoints", &serde_json::to_string(&listen.endpoints)?)
            .map_err(|e| anyhow!("Invalid zenoh listen endpoints: {}", e))?;
    }

    let session = zenoh::open(zenoh_config)
        .await
        .map_err(|e| anyhow!("Failed to open Zenoh session: {}", e))?;
    info!("Zenoh session opened ({} mode)", mode);
    Ok(session)
}

async fn run_gateway(config: &PipelineConfig) -> Result<()> {
    let metrics = Arc::new(PipelineMetrics::new()?);
    let validator = Arc::new(HttpScenarioValidator::new(&config.validation)?);
    let publisher = Arc::new(KafkaPublisher::new(&config.kafka)?);

    let gateway = IngestGateway::new(validator, publisher, metrics, config.kafka.raw_topic.clone());

    let session = open_zenoh(&config.zenoh).await?;
    gateway.run(&session, &config.gateway.raw_key_expr).await
}

async fn run_transformer(config: &PipelineConfig) -> Result<()> {
    let metrics = Arc::new(PipelineMetrics::new()?);
    let store = Arc::new(PostgresSampleStore::new(&config.database)?);
    store.initialize().await?;

    let mut subscriber = KafkaSubscriber::new(
        &config.kafka,
        &config.kafka.raw_topic,
        &config.kafka.transformer_group,
    )?;

    info!(
        "Transformer reading '{}' as group '{}' into {} store",
        subscriber.topic(),
        subscriber.group_id(),
        store.store_type()
    );

    let transformer = StreamTransformer::new(store, metrics, config.transformer.sample_interval_ms);
    transformer.run(&mut subscriber).await?;
    Ok(())
}

async fn run_exporter(config: &PipelineConfig) -> Result<()> {
    let metrics = Arc::new(PipelineMetrics::new()?);
    let store = Arc::new(PostgresSampleStore::new(&config.database)?);
    store.initialize().await?;

    let storage = StorageFactory::create(&config.storage)?;
    storage.initialize().await?;
    if !storage.health_check().await? {
        warn!("Object storage health check failed, uploads may fail");
    }
    info!(
        "Object storage ready: {} (bucket '{}')",
        storage.backend_type(),
        storage.bucket()
    );

    let store_type = store.store_type().to_string();
    let pipeline = Arc::new(ExportPipeline::new(store, storage, metrics, &config.exporter)?);

    let mut subscriber = KafkaSubscriber::new(
        &config.kafka,
        &config.kafka.notification_topic,
        &config.kafka.exporter_group,
    )?;

    info!(
        "Exporter reading '{}' as group '{}' from {} store",
        subscriber.topic(),
        subscriber.group_id(),
        store_type
    );

    let session = open_zenoh(&config.zenoh).await?;
    let requests = ExportRequestInterface::new(
        session,
        pipeline.clone(),
        config.exporter.request_key_prefix.clone(),
    );

    tokio::select! {
        result = pipeline.run_notifications(&mut subscriber) => {
            result?;
            info!("Notification consumer stopped");
        }
        result = requests.run() => {
            result?;
            info!("Export request interface stopped");
        }
    }
    Ok(())
}
