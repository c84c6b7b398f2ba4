//! The render side of the framework (§4.10, §4.11): `RenderCache` and
//! `RenderPipeline`, plus the `RenderEvent` observability feed. Entirely
//! orthogonal to the duplex/Hub/StateMap path — an HTTP page request
//! reaches here, never the Hub.

mod cache;
mod events;
mod pipeline;

pub use cache::{CacheEntry, RenderCache};
pub use events::RenderEvent;
pub use pipeline::{PageRenderFn, RenderContext, RenderPipeline, RenderResponse, SlotRenderFn};
