// ABOUTME: Boots the pipeline, supervises component tasks, and drains on shutdown
// ABOUTME: A crashed component restarts with backoff; the others keep running
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Pipeline Supervisor
//!
//! Boot order: ensure topics, then start the processor, the four analyzer
//! workers, and the aggregator, each as one supervised task around the
//! shared consumer loop. Shutdown broadcasts a cancel signal, waits up to
//! the grace period for loops to drain, flushes pending produces, and
//! closes every subscriber with a terminal envelope.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::broadcast::Broadcaster;
use crate::broker::{Broker, Producer, TopicSpec};
use crate::config::{Settings, TopicNames};
use crate::constants::provisioning;
use crate::errors::AppResult;
use crate::model::ModelClient;
use crate::pipeline::aggregator::Aggregator;
use crate::pipeline::analyzers::{AnalyzerKind, AnalyzerWorker};
use crate::pipeline::consumer::{run_consumer, ConsumerLoopConfig, RecordHandler};
use crate::pipeline::ingest::Ingestor;
use crate::pipeline::processor::ConversationProcessor;

const RESTART_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// The topic topology the pipeline provisions on boot
#[must_use]
pub fn pipeline_topics(topics: &TopicNames) -> Vec<TopicSpec> {
    use provisioning::{
        DEFAULT_PARTITIONS, DLQ_PARTITIONS, RETENTION_14D_MS, RETENTION_30D_MS, RETENTION_7D_MS,
    };
    vec![
        TopicSpec::new(&topics.messages_raw, DEFAULT_PARTITIONS, RETENTION_7D_MS),
        TopicSpec::new(
            &topics.conversations_state,
            DEFAULT_PARTITIONS,
            RETENTION_30D_MS,
        ),
        TopicSpec::new(&topics.ai_sentiment, DEFAULT_PARTITIONS, RETENTION_7D_MS),
        TopicSpec::new(&topics.ai_pii, DEFAULT_PARTITIONS, RETENTION_30D_MS),
        TopicSpec::new(&topics.ai_insights, DEFAULT_PARTITIONS, RETENTION_7D_MS),
        TopicSpec::new(&topics.ai_summary, DEFAULT_PARTITIONS, RETENTION_7D_MS),
        TopicSpec::new(&topics.ai_aggregated, DEFAULT_PARTITIONS, RETENTION_7D_MS),
        TopicSpec::new(&topics.dlq, DLQ_PARTITIONS, RETENTION_14D_MS),
    ]
}

/// Running pipeline handle
pub struct Pipeline {
    settings: Settings,
    producer: Arc<dyn Producer>,
    broadcaster: Broadcaster,
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Pipeline {
    /// Ensure topics exist and start every component
    ///
    /// # Errors
    ///
    /// Returns a `BrokerError` when topic provisioning fails.
    pub async fn start(
        settings: Settings,
        broker: Arc<dyn Broker>,
        model: Arc<ModelClient>,
    ) -> AppResult<Self> {
        broker
            .ensure_topics(&pipeline_topics(&settings.topics))
            .await?;

        let producer = broker.producer();
        let broadcaster = Broadcaster::new(settings.subscriber_queue_depth);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let processor = Arc::new(Mutex::new(ConversationProcessor::new(
            Arc::clone(&producer),
            &settings,
        )));
        tasks.push(spawn_component(
            "conversation-processor",
            Arc::clone(&broker),
            Arc::clone(&producer),
            ConsumerLoopConfig::for_component(
                &settings,
                "conversation-processor",
                vec![
                    settings.topics.messages_raw.clone(),
                    settings.topics.ai_summary.clone(),
                ],
            ),
            processor,
            shutdown_rx.clone(),
        ));

        for kind in AnalyzerKind::ALL {
            let worker = Arc::new(Mutex::new(AnalyzerWorker::new(
                kind,
                Arc::clone(&model),
                Arc::clone(&producer),
                &settings,
            )));
            tasks.push(spawn_component(
                kind.component(),
                Arc::clone(&broker),
                Arc::clone(&producer),
                ConsumerLoopConfig::for_component(
                    &settings,
                    kind.component(),
                    vec![settings.topics.conversations_state.clone()],
                ),
                worker,
                shutdown_rx.clone(),
            ));
        }

        let aggregator = Arc::new(Mutex::new(Aggregator::new(
            Arc::clone(&producer),
            broadcaster.clone(),
            &settings,
        )));
        tasks.push(spawn_component(
            "aggregation",
            Arc::clone(&broker),
            Arc::clone(&producer),
            ConsumerLoopConfig::for_component(
                &settings,
                "aggregation",
                settings.topics.result_topics(),
            ),
            aggregator,
            shutdown_rx.clone(),
        ));

        info!(
            components = tasks.len(),
            model = model.provider_name(),
            "Pipeline started"
        );

        Ok(Self {
            settings,
            producer,
            broadcaster,
            shutdown: shutdown_tx,
            tasks,
        })
    }

    /// Ingestion boundary bound to this pipeline's producer
    #[must_use]
    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(Arc::clone(&self.producer), &self.settings)
    }

    /// Subscriber registry for the streaming collaborator
    #[must_use]
    pub fn broadcaster(&self) -> Broadcaster {
        self.broadcaster.clone()
    }

    /// Current merged view for a conversation, for the read collaborator
    pub async fn intelligence(
        &self,
        key: &crate::models::ConversationKey,
    ) -> Option<crate::models::AggregatedIntelligence> {
        self.broadcaster.snapshot(key).await
    }

    /// Drain and stop every component
    ///
    /// Signals cancellation, waits up to the configured grace period for
    /// consumer loops to finish their in-flight record and commit, then
    /// flushes pending produces and closes all subscribers.
    ///
    /// # Errors
    ///
    /// Returns a `BrokerError` when the final flush fails.
    pub async fn shutdown(mut self) -> AppResult<()> {
        info!("Pipeline shutdown requested");
        let _ = self.shutdown.send(true);

        let grace = self.settings.shutdown_grace;
        let drains = join_all(self.tasks.drain(..).map(|(name, handle)| async move {
            if handle.await.is_err() {
                warn!(component = name, "Component task panicked during drain");
            }
        }));
        if timeout(grace, drains).await.is_err() {
            warn!(
                grace_secs = grace.as_secs(),
                "Grace period expired with components still draining"
            );
        }

        self.producer.flush(Duration::from_secs(5)).await?;
        self.broadcaster.close_all().await;
        info!("Pipeline stopped");
        Ok(())
    }
}

/// Spawn one supervised component: the consumer loop restarts with
/// exponential backoff after a crash, and the handler (with its state map)
/// survives across restarts.
fn spawn_component<H>(
    name: &'static str,
    broker: Arc<dyn Broker>,
    producer: Arc<dyn Producer>,
    config: ConsumerLoopConfig,
    handler: Arc<Mutex<H>>,
    shutdown: watch::Receiver<bool>,
) -> (&'static str, JoinHandle<()>)
where
    H: RecordHandler + 'static,
{
    let handle = tokio::spawn(async move {
        let mut backoff = config.retry_base.max(Duration::from_millis(50));
        loop {
            if *shutdown.borrow() {
                break;
            }
            match run_consumer(
                Arc::clone(&broker),
                Arc::clone(&producer),
                config.clone(),
                Arc::clone(&handler),
                shutdown.clone(),
            )
            .await
            {
                Ok(()) => break,
                Err(err) => {
                    if *shutdown.borrow() {
                        break;
                    }
                    warn!(
                        component = name,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "Component crashed, restarting after backoff"
                    );
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(RESTART_BACKOFF_CAP);
                }
            }
        }
        info!(component = name, "Component stopped");
    });
    (name, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_covers_all_eight_topics() {
        let topics = TopicNames::default();
        let specs = pipeline_topics(&topics);
        assert_eq!(specs.len(), 8);

        let dlq = specs.iter().find(|spec| spec.name == topics.dlq).unwrap();
        assert_eq!(dlq.partitions, 1);
        assert_eq!(dlq.retention_ms, provisioning::RETENTION_14D_MS);

        let pii = specs.iter().find(|spec| spec.name == topics.ai_pii).unwrap();
        assert_eq!(pii.partitions, 3);
        assert_eq!(pii.retention_ms, provisioning::RETENTION_30D_MS);
    }
}
