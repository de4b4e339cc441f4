//! Block bookkeeping and the batched highlight call.

mod gateway;
mod registry;

pub use gateway::{
    DEFAULT_TIMEOUT, GatewayError, HighlightGateway, HighlightOutcome, HighlightRequest,
    HighlightResponse, HighlightTransport, RequestBlock, ResponseBlock, SkipReason,
};
pub use registry::{BlockRegistry, DocumentContext};
