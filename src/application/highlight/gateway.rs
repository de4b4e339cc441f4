//! Batched calls to the remote highlighting service.
//!
//! Every block collected for a document goes out in one request. Results come
//! back keyed by request id and are written onto the matching block or clone.
//! Nothing that happens on the wire can fail the render: errors and timeouts
//! are logged and leave blocks unhighlighted.

use std::{
    collections::BTreeMap,
    num::NonZeroUsize,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use lru::LruCache;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    domain::{
        blocks::{Block, Highlight},
        identity::Identity,
    },
    util::lock::mutex_lock,
};

use super::registry::BlockRegistry;

const SOURCE: &str = "application::highlight::gateway";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const METRIC_REQUESTS: &str = "fenceline_highlight_requests_total";
const METRIC_FAILURES: &str = "fenceline_highlight_failures_total";
const METRIC_BLOCKS: &str = "fenceline_highlight_blocks_total";
const METRIC_CACHE_HIT: &str = "fenceline_highlight_cache_hit_total";
const METRIC_REQUEST_MS: &str = "fenceline_highlight_request_ms";

/// Outbound batch sent to the highlighting service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightRequest {
    pub blocks: Vec<RequestBlock>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// One block variant inside a [`HighlightRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestBlock {
    pub id: String,
    pub language: Option<String>,
    pub theme: Option<String>,
    pub code: String,
}

impl RequestBlock {
    fn from_block(block: &Block, default_theme: Option<&str>) -> Self {
        Self {
            id: block.request_id().to_owned(),
            language: block.language().map(str::to_owned),
            theme: block.theme().or(default_theme).map(str::to_owned),
            code: block.code().to_owned(),
        }
    }
}

/// Inbound result batch; order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HighlightResponse {
    #[serde(default)]
    pub blocks: Vec<ResponseBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseBlock {
    pub id: String,
    #[serde(default)]
    pub highlighted: Option<String>,
    #[serde(default)]
    pub classes: Option<String>,
    #[serde(default)]
    pub styles: Option<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub wrapped: Option<String>,
}

impl ResponseBlock {
    fn into_result(self) -> (String, Highlight) {
        let Self {
            id,
            highlighted,
            classes,
            styles,
            attrs,
            wrapped,
        } = self;
        (
            id,
            Highlight {
                highlighted,
                classes,
                styles,
                attrs,
                wrapped,
            },
        )
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("highlight transport failed: {message}")]
    Transport { message: String },
    #[error("highlight service responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("highlight response could not be decoded: {message}")]
    Decode { message: String },
    #[error("highlight request timed out after {0:?}")]
    Timeout(Duration),
}

impl GatewayError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

/// Sends one batch to the highlighting service.
#[async_trait]
pub trait HighlightTransport: Send + Sync {
    async fn send(&self, request: &HighlightRequest) -> Result<HighlightResponse, GatewayError>;
}

/// Why a document produced no outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The document has no code blocks.
    Empty,
    /// No transport is configured, usually because no token is set.
    Disabled,
}

/// Summary of one [`HighlightGateway::highlight`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighlightOutcome {
    Skipped(SkipReason),
    Completed {
        requested: usize,
        matched: usize,
        cached: usize,
    },
    Failed {
        requested: usize,
        cached: usize,
        error: String,
    },
}

impl HighlightOutcome {
    /// Whether an outbound call was attempted.
    pub fn sent_request(&self) -> bool {
        match self {
            Self::Skipped(_) => false,
            Self::Completed { requested, .. } | Self::Failed { requested, .. } => *requested > 0,
        }
    }
}

/// Batches a document's blocks into a single highlight call.
pub struct HighlightGateway {
    transport: Option<Arc<dyn HighlightTransport>>,
    default_theme: Option<String>,
    options: BTreeMap<String, serde_json::Value>,
    timeout: Duration,
    results: Option<Mutex<LruCache<Identity, Highlight>>>,
}

impl HighlightGateway {
    pub fn new(transport: Arc<dyn HighlightTransport>) -> Self {
        Self {
            transport: Some(transport),
            default_theme: None,
            options: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
            results: None,
        }
    }

    /// A gateway that never calls out; every block falls back to the host.
    pub fn disabled() -> Self {
        Self {
            transport: None,
            default_theme: None,
            options: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
            results: None,
        }
    }

    /// Theme sent for blocks that do not name one. Not part of block identity.
    pub fn with_default_theme(mut self, theme: Option<String>) -> Self {
        self.default_theme = theme.filter(|theme| !theme.trim().is_empty());
        self
    }

    pub fn with_options(mut self, options: BTreeMap<String, serde_json::Value>) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keep up to `capacity` results across documents so repeated content is
    /// not requested again.
    pub fn with_result_cache(mut self, capacity: Option<NonZeroUsize>) -> Self {
        self.results = capacity.map(|capacity| Mutex::new(LruCache::new(capacity)));
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Highlight every block in `registry`, writing results in place.
    pub async fn highlight(&self, registry: &mut BlockRegistry) -> HighlightOutcome {
        if registry.is_empty() {
            return HighlightOutcome::Skipped(SkipReason::Empty);
        }

        let Some(transport) = self.transport.as_ref() else {
            debug!(
                target = "application::highlight::gateway",
                blocks = registry.len(),
                "Highlighting disabled; blocks will use the fallback renderer"
            );
            return HighlightOutcome::Skipped(SkipReason::Disabled);
        };

        let cached = self.apply_cached(registry);
        let pending: Vec<RequestBlock> = registry
            .pending()
            .into_iter()
            .map(|block| RequestBlock::from_block(block, self.default_theme.as_deref()))
            .collect();

        if pending.is_empty() {
            debug!(
                target = "application::highlight::gateway",
                cached, "All blocks served from the result cache"
            );
            return HighlightOutcome::Completed {
                requested: 0,
                matched: 0,
                cached,
            };
        }

        let request = HighlightRequest {
            blocks: pending,
            options: self.options.clone(),
        };
        let requested = request.blocks.len();

        counter!(METRIC_REQUESTS).increment(1);
        counter!(METRIC_BLOCKS).increment(requested as u64);
        let started_at = Instant::now();

        let result = match tokio::time::timeout(self.timeout, transport.send(&request)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.timeout)),
        };
        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_REQUEST_MS).record(elapsed_ms);

        match result {
            Ok(response) => {
                let matched = registry.apply_results(
                    response
                        .blocks
                        .into_iter()
                        .map(ResponseBlock::into_result),
                );
                self.store_results(registry);
                info!(
                    target = "application::highlight::gateway",
                    op = "highlight",
                    result = "ok",
                    requested,
                    matched,
                    cached,
                    elapsed_ms = elapsed_ms as u64,
                    "Highlight batch completed"
                );
                HighlightOutcome::Completed {
                    requested,
                    matched,
                    cached,
                }
            }
            Err(err) => {
                counter!(METRIC_FAILURES).increment(1);
                warn!(
                    target = "application::highlight::gateway",
                    op = "highlight",
                    result = "error",
                    requested,
                    elapsed_ms = elapsed_ms as u64,
                    error = %err,
                    "Highlight batch failed; rendering without highlighting"
                );
                HighlightOutcome::Failed {
                    requested,
                    cached,
                    error: err.to_string(),
                }
            }
        }
    }

    fn apply_cached(&self, registry: &mut BlockRegistry) -> usize {
        let Some(results) = self.results.as_ref() else {
            return 0;
        };

        let hits: Vec<(String, Highlight)> = {
            let mut cache = mutex_lock(results, SOURCE, "apply_cached");
            registry
                .variants()
                .filter_map(|block| {
                    cache
                        .get(block.identity())
                        .map(|highlight| (block.request_id().to_owned(), highlight.clone()))
                })
                .collect()
        };

        let applied = registry.apply_results(hits);
        if applied > 0 {
            counter!(METRIC_CACHE_HIT).increment(applied as u64);
        }
        applied
    }

    fn store_results(&self, registry: &BlockRegistry) {
        let Some(results) = self.results.as_ref() else {
            return;
        };

        let mut cache = mutex_lock(results, SOURCE, "store_results");
        for block in registry.variants() {
            if let Some(highlight) = block.highlight().filter(|_| block.is_highlighted()) {
                cache.put(block.identity().clone(), highlight.clone());
            }
        }
    }
}

impl std::fmt::Debug for HighlightGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HighlightGateway")
            .field("enabled", &self.is_enabled())
            .field("default_theme", &self.default_theme)
            .field("timeout", &self.timeout)
            .field("result_cache", &self.results.is_some())
            .finish()
    }
}
