// ABOUTME: Pipeline supervisor binary: boots the pipeline and runs until signalled
// ABOUTME: Selects the Kafka or in-memory broker and the real or mock model from settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use signalstream::broker::kafka::KafkaBroker;
use signalstream::broker::memory::MemoryBroker;
use signalstream::broker::Broker;
use signalstream::config::Settings;
use signalstream::logging;
use signalstream::model::{GeminiProvider, MockModelProvider, ModelClient, ModelProvider};
use signalstream::pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_from_env();

    let settings = Settings::from_env().context("loading configuration")?;

    let broker: Arc<dyn Broker> = if settings.mock_mode {
        info!("Mock mode: using the in-memory broker");
        Arc::new(MemoryBroker::new())
    } else {
        Arc::new(KafkaBroker::new(&settings).context("connecting to the broker")?)
    };

    let provider: Arc<dyn ModelProvider> = if settings.mock_mode {
        Arc::new(MockModelProvider::new())
    } else {
        let api_key = settings
            .gemini_api_key
            .clone()
            .context("GEMINI_API_KEY is required outside mock mode")?;
        Arc::new(GeminiProvider::new(api_key, settings.gemini_model.clone()))
    };
    let model = Arc::new(ModelClient::new(provider, &settings));

    let pipeline = Pipeline::start(settings, broker, model)
        .await
        .context("starting the pipeline")?;
    info!("Pipeline running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    pipeline.shutdown().await.context("draining the pipeline")?;
    Ok(())
}
