// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Prometheus metrics exporter.
use anyhow::Result;
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{
        HeaderValue, StatusCode,
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE},
    },
    response::Response,
    routing::get,
};
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::{net::SocketAddr, sync::Arc};
use tokio::task::JoinHandle;

/// Configuration for the Prometheus metrics server.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    pub allow_origin: Option<String>,
}

#[derive(Clone, Default)]
pub struct MetricsHandle {
    inner: Option<Arc<MetricsInner>>,
}

#[derive(Clone)]
struct MetricsInner {
    registry: Registry,
    synced_block: IntGaugeVec,
    chain_head_block: IntGaugeVec,
    events_applied: IntCounterVec,
    notifications_published: IntCounterVec,
    allow_origin: Option<String>,
}

impl MetricsHandle {
    pub fn new(config: &MetricsConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self { inner: None });
        }

        let registry = Registry::new_custom(Some("rocinante".to_string()), None)?;

        let synced_block = IntGaugeVec::new(
            Opts::new(
                "synced_block",
                "Highest fully-processed block for a contract.",
            ),
            &["contract"],
        )?;
        registry.register(Box::new(synced_block.clone()))?;

        let chain_head_block = IntGaugeVec::new(
            Opts::new(
                "chain_head_block",
                "Latest block reported by the RPC node. Reported per contract.",
            ),
            &["contract"],
        )?;
        registry.register(Box::new(chain_head_block.clone()))?;

        let events_applied = IntCounterVec::new(
            Opts::new(
                "events_applied_total",
                "Decoded events applied to the materialized view.",
            ),
            &["contract", "event"],
        )?;
        registry.register(Box::new(events_applied.clone()))?;

        let notifications_published = IntCounterVec::new(
            Opts::new(
                "notifications_published_total",
                "Notifications published on the fan-out channel.",
            ),
            &["event"],
        )?;
        registry.register(Box::new(notifications_published.clone()))?;

        // Standard build info style metric: value is always 1.
        let build_info = IntGaugeVec::new(
            Opts::new("build_info", "Build information about the running binary."),
            &["version"],
        )?;
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1);
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            inner: Some(Arc::new(MetricsInner {
                registry,
                synced_block,
                chain_head_block,
                events_applied,
                notifications_published,
                allow_origin: config.allow_origin.clone(),
            })),
        })
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    #[inline]
    pub fn record_synced_block(&self, contract: &str, block: u64) {
        if let Some(inner) = &self.inner {
            inner
                .synced_block
                .with_label_values(&[contract])
                .set(block as i64);
        }
    }

    #[inline]
    pub fn record_chain_head_block(&self, contract: &str, block: u64) {
        if let Some(inner) = &self.inner {
            inner
                .chain_head_block
                .with_label_values(&[contract])
                .set(block as i64);
        }
    }

    #[inline]
    pub fn record_event_applied(&self, contract: &str, event: &str) {
        if let Some(inner) = &self.inner {
            inner
                .events_applied
                .with_label_values(&[contract, event])
                .inc();
        }
    }

    #[inline]
    pub fn record_notification_published(&self, event: &str) {
        if let Some(inner) = &self.inner {
            inner
                .notifications_published
                .with_label_values(&[event])
                .inc();
        }
    }

    pub async fn serve(&self, config: MetricsConfig) -> Result<Option<JoinHandle<()>>> {
        let Some(inner) = self.inner.clone() else {
            return Ok(None);
        };

        let addr: SocketAddr = format!("{}:{}", config.address, config.port).parse()?;
        let state = MetricsState {
            registry: inner.registry.clone(),
            allow_origin: inner.allow_origin.clone(),
        };

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(state);

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .unwrap_or_else(|_| panic!("Failed to bind metrics server to {addr}"));
            tracing::info!(
                "Metrics server listening on {}",
                listener.local_addr().unwrap()
            );

            axum::serve(listener, app)
                .await
                .unwrap_or_else(|e| panic!("Metrics server error: {e}"));
        });

        Ok(Some(handle))
    }
}

#[derive(Clone)]
struct MetricsState {
    registry: Registry,
    allow_origin: Option<String>,
}

async fn metrics_handler(State(state): State<MetricsState>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::from("failed to encode metrics"))
            .expect("response building should not fail");
    }

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, encoder.format_type())
        .body(Body::from(buffer))
        .expect("response building should not fail");

    if let Some(origin) = state.allow_origin.as_ref() {
        let header_value =
            HeaderValue::from_str(origin).unwrap_or_else(|_| HeaderValue::from_static("*"));
        response
            .headers_mut()
            .insert(ACCESS_CONTROL_ALLOW_ORIGIN, header_value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn enabled_handle() -> MetricsHandle {
        MetricsHandle::new(&MetricsConfig {
            enabled: true,
            address: "127.0.0.1".to_string(),
            port: 0,
            allow_origin: None,
        })
        .unwrap()
    }

    #[rstest]
    fn disabled_metrics_are_a_no_op() {
        let handle = MetricsHandle::new(&MetricsConfig {
            enabled: false,
            address: "127.0.0.1".to_string(),
            port: 0,
            allow_origin: None,
        })
        .unwrap();

        assert!(!handle.is_enabled());
        // Recording on a disabled handle must not panic.
        handle.record_synced_block("FreelanceEscrow", 100);
        handle.record_event_applied("FreelanceEscrow", "JobCreated");
    }

    #[rstest]
    fn recorded_values_show_up_in_the_registry(#[values(1u64, 250, 1_000_000)] block: u64) {
        let handle = enabled_handle();
        handle.record_synced_block("FreelanceEscrow", block);
        handle.record_event_applied("FreelanceEscrow", "JobCreated");
        handle.record_notification_published("JobCreated");

        let inner = handle.inner.as_ref().unwrap();
        assert_eq!(
            inner
                .synced_block
                .with_label_values(&["FreelanceEscrow"])
                .get(),
            block as i64
        );
        assert_eq!(
            inner
                .events_applied
                .with_label_values(&["FreelanceEscrow", "JobCreated"])
                .get(),
            1
        );
    }
}
