use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use fenceline::application::highlight::{
    GatewayError, HighlightGateway, HighlightRequest, HighlightResponse, HighlightTransport,
    ResponseBlock,
};
use fenceline::application::render::{HighlightRenderService, RenderRequest, RenderService};
use fenceline::application::snippets::SnippetLoader;
use metrics_util::debugging::DebuggingRecorder;

struct Unreachable;

#[async_trait]
impl HighlightTransport for Unreachable {
    async fn send(&self, _: &HighlightRequest) -> Result<HighlightResponse, GatewayError> {
        Err(GatewayError::transport("service unreachable"))
    }
}

struct Echo;

#[async_trait]
impl HighlightTransport for Echo {
    async fn send(&self, request: &HighlightRequest) -> Result<HighlightResponse, GatewayError> {
        Ok(HighlightResponse {
            blocks: request
                .blocks
                .iter()
                .map(|block| ResponseBlock {
                    id: block.id.clone(),
                    highlighted: Some(block.code.clone()),
                    ..ResponseBlock::default()
                })
                .collect(),
        })
    }
}

#[tokio::test]
async fn highlight_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let markdown = "```php\necho 1;\n```\n\n```php\n<<< missing/file.ext\n```\n";

    // Successful batch, then a repeat served from the result cache.
    let cached = HighlightRenderService::new(
        Arc::new(HighlightGateway::new(Arc::new(Echo)).with_result_cache(NonZeroUsize::new(4))),
        Arc::new(SnippetLoader::disabled()),
    );
    for _ in 0..2 {
        cached
            .render(&RenderRequest::new(markdown))
            .await
            .expect("render succeeds");
    }

    // Failing batch.
    let failing = HighlightRenderService::new(
        Arc::new(HighlightGateway::new(Arc::new(Unreachable))),
        Arc::new(SnippetLoader::disabled()),
    );
    let output = failing
        .render(&RenderRequest::new(markdown))
        .await
        .expect("failures never escape the render");
    assert_eq!(output.fallback_blocks, 2);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "fenceline_highlight_requests_total",
        "fenceline_highlight_failures_total",
        "fenceline_highlight_blocks_total",
        "fenceline_highlight_cache_hit_total",
        "fenceline_highlight_request_ms",
        "fenceline_snippet_miss_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
