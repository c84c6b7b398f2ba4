//! `RenderEvent` (§4.11 `[SUPPLEMENT]`): a broadcast feed of cache activity,
//! for a dashboard or log tail watching render behavior. Grounded on the
//! teacher's `DashboardEvent`/`http/sse.rs` broadcast-to-SSE bridge, reused
//! here purely as an observability channel — it carries no protocol weight
//! for the duplex path.

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Rendered { path: String, strategy: &'static str },
    Revalidated { path: String },
    Evicted { path: String },
}
