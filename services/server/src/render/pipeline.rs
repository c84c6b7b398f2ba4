//! `RenderPipeline` (§4.10): picks SSR/SSG/ISR/PPR per route and fills PPR's
//! dynamic slots. The page render function and slot renderers are opaque
//! collaborators (template rendering internals are out of scope, per §1) —
//! the pipeline only knows how to call them and cache the result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use super::cache::{InFlightSet, RenderCache};
use super::events::RenderEvent;
use crate::config::RenderMode;
use crate::error::RenderError;

/// Distinguishes PPR's shell-building pass (dynamic slots render as
/// placeholders) from a normal full render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderContext {
    Normal,
    ShellBuilding,
}

pub type PageRenderFn =
    Arc<dyn Fn(&str, &Value, RenderContext) -> Result<Vec<u8>, RenderError> + Send + Sync>;
pub type SlotRenderFn = Arc<dyn Fn(&str, &Value) -> Result<Vec<u8>, RenderError> + Send + Sync>;

pub struct RenderResponse {
    pub body: Vec<u8>,
    pub cache_control: String,
}

#[derive(Clone)]
struct RouteRegistration {
    strategy: RenderMode,
    render_fn: PageRenderFn,
    isr_ttl: Duration,
    slot_renderers: HashMap<String, SlotRenderFn>,
}

pub struct RenderPipeline {
    cache: Arc<RenderCache>,
    in_flight: Arc<InFlightSet>,
    routes: Arc<RwLock<HashMap<String, RouteRegistration>>>,
    template_caching_enabled: bool,
    events_tx: broadcast::Sender<RenderEvent>,
}

impl RenderPipeline {
    pub fn new(max_cache_entries: i64, template_caching_enabled: bool) -> Self {
        let (events_tx, _rx) = broadcast::channel(256);
        Self {
            cache: Arc::new(RenderCache::new(max_cache_entries)),
            in_flight: Arc::new(InFlightSet::new()),
            routes: Arc::new(RwLock::new(HashMap::new())),
            template_caching_enabled,
            events_tx,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RenderEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: RenderEvent) {
        let _ = self.events_tx.send(event);
    }

    pub async fn register_route(
        &self,
        path: impl Into<String>,
        strategy: RenderMode,
        render_fn: PageRenderFn,
        isr_ttl: Duration,
    ) {
        self.routes.write().await.insert(
            path.into(),
            RouteRegistration {
                strategy,
                render_fn,
                isr_ttl,
                slot_renderers: HashMap::new(),
            },
        );
    }

    pub async fn register_slot(&self, path: &str, name: impl Into<String>, slot_fn: SlotRenderFn) {
        if let Some(route) = self.routes.write().await.get_mut(path) {
            route.slot_renderers.insert(name.into(), slot_fn);
        }
    }

    async fn route(&self, path: &str) -> Result<RouteRegistration, RenderError> {
        self.routes
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| RenderError::RouteNotRegistered(path.to_owned()))
    }

    pub async fn render(&self, path: &str, params: &Value) -> Result<RenderResponse, RenderError> {
        let registration = self.route(path).await?;
        // Template caching gates ISR/SSG/PPR entirely; with it disabled
        // every strategy degrades to SSR (§4.10).
        let strategy = if self.template_caching_enabled {
            registration.strategy
        } else {
            RenderMode::Ssr
        };
        match strategy {
            RenderMode::Ssr => self.render_ssr(&registration, path, params),
            RenderMode::Ssg => self.render_ssg(&registration, path, params),
            RenderMode::Isr => self.render_isr(&registration, path, params).await,
            RenderMode::Ppr => self.render_ppr(&registration, path, params),
        }
    }

    fn render_ssr(
        &self,
        registration: &RouteRegistration,
        path: &str,
        params: &Value,
    ) -> Result<RenderResponse, RenderError> {
        let body = (registration.render_fn)(path, params, RenderContext::Normal)?;
        self.emit(RenderEvent::Rendered {
            path: path.to_owned(),
            strategy: "ssr",
        });
        Ok(RenderResponse {
            body,
            cache_control: "no-store".to_owned(),
        })
    }

    fn render_ssg(
        &self,
        registration: &RouteRegistration,
        path: &str,
        params: &Value,
    ) -> Result<RenderResponse, RenderError> {
        const HEADER: &str = "public, max-age=31536000, immutable";
        if let Some(entry) = self.cache.get(path) {
            return Ok(RenderResponse {
                body: entry.bytes.as_ref().clone(),
                cache_control: HEADER.to_owned(),
            });
        }
        let body = (registration.render_fn)(path, params, RenderContext::Normal)?;
        self.insert_and_report(path, body.clone());
        self.emit(RenderEvent::Rendered {
            path: path.to_owned(),
            strategy: "ssg",
        });
        Ok(RenderResponse {
            body,
            cache_control: HEADER.to_owned(),
        })
    }

    async fn render_isr(
        &self,
        registration: &RouteRegistration,
        path: &str,
        params: &Value,
    ) -> Result<RenderResponse, RenderError> {
        let ttl = registration.isr_ttl;
        let header = format!(
            "public, s-maxage={}, stale-while-revalidate={}",
            ttl.as_secs(),
            ttl.as_secs()
        );

        // Open-question resolution (§9/DESIGN.md): TTL of zero degrades to a
        // synchronous re-render on every request rather than ever serving a
        // stale copy.
        if ttl.is_zero() {
            let body = (registration.render_fn)(path, params, RenderContext::Normal)?;
            self.insert_and_report(path, body.clone());
            self.emit(RenderEvent::Rendered {
                path: path.to_owned(),
                strategy: "isr",
            });
            return Ok(RenderResponse {
                body,
                cache_control: header,
            });
        }

        match self.cache.get(path) {
            None => {
                let body = (registration.render_fn)(path, params, RenderContext::Normal)?;
                self.insert_and_report(path, body.clone());
                self.emit(RenderEvent::Rendered {
                    path: path.to_owned(),
                    strategy: "isr",
                });
                Ok(RenderResponse {
                    body,
                    cache_control: header,
                })
            }
            Some(entry) if entry.age() < ttl => Ok(RenderResponse {
                body: entry.bytes.as_ref().clone(),
                cache_control: header,
            }),
            Some(entry) => {
                if self.in_flight.try_begin(path) {
                    self.spawn_revalidation(registration.clone(), path.to_owned(), params.clone());
                }
                Ok(RenderResponse {
                    body: entry.bytes.as_ref().clone(),
                    cache_control: header,
                })
            }
        }
    }

    fn spawn_revalidation(&self, registration: RouteRegistration, path: String, params: Value) {
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            match (registration.render_fn)(&path, &params, RenderContext::Normal) {
                Ok(body) => {
                    cache.insert(path.clone(), body);
                    info!(path = %path, "isr revalidation completed");
                    let _ = events_tx.send(RenderEvent::Revalidated { path: path.clone() });
                }
                Err(err) => {
                    warn!(path = %path, %err, "isr revalidation failed, keeping stale entry");
                }
            }
            in_flight.finish(&path);
        });
    }

    fn render_ppr(
        &self,
        registration: &RouteRegistration,
        path: &str,
        params: &Value,
    ) -> Result<RenderResponse, RenderError> {
        let shell = match self.cache.get(path) {
            Some(entry) => entry.bytes.as_ref().clone(),
            None => {
                let shell = (registration.render_fn)(path, params, RenderContext::ShellBuilding)?;
                self.insert_and_report(path, shell.clone());
                self.emit(RenderEvent::Rendered {
                    path: path.to_owned(),
                    strategy: "ppr-shell",
                });
                shell
            }
        };
        let body = splice_slots(&shell, registration, params, path)?;
        Ok(RenderResponse {
            body,
            cache_control: "no-store".to_owned(),
        })
    }

    fn insert_and_report(&self, path: &str, body: Vec<u8>) {
        for evicted in self.cache.insert(path.to_owned(), body) {
            self.emit(RenderEvent::Evicted { path: evicted });
        }
    }
}

const SLOT_OPEN: &str = "<!--slot:";
const SLOT_CLOSE: &str = "-->";

fn splice_slots(
    shell: &[u8],
    registration: &RouteRegistration,
    params: &Value,
    path: &str,
) -> Result<Vec<u8>, RenderError> {
    let shell = String::from_utf8_lossy(shell);
    let mut out = Vec::with_capacity(shell.len());
    let mut rest: &str = &shell;

    loop {
        match rest.find(SLOT_OPEN) {
            None => {
                out.extend_from_slice(rest.as_bytes());
                break;
            }
            Some(start) => {
                out.extend_from_slice(rest[..start].as_bytes());
                let after_marker = &rest[start + SLOT_OPEN.len()..];
                let end = after_marker.find(SLOT_CLOSE).ok_or_else(|| {
                    RenderError::TemplateFailed {
                        path: path.to_owned(),
                        source: Box::new(SlotMarkerError(
                            "unterminated slot marker in cached shell".to_owned(),
                        )),
                    }
                })?;
                let name = &after_marker[..end];
                let slot_fn = registration.slot_renderers.get(name).ok_or_else(|| {
                    RenderError::TemplateFailed {
                        path: path.to_owned(),
                        source: Box::new(SlotMarkerError(format!("no slot renderer for {name:?}"))),
                    }
                })?;
                let slot_bytes = slot_fn(name, params)?;
                out.extend_from_slice(format!("<div data-slot=\"{name}\">").as_bytes());
                out.extend_from_slice(&slot_bytes);
                out.extend_from_slice(b"</div>");
                rest = &after_marker[end + SLOT_CLOSE.len()..];
            }
        }
    }
    Ok(out)
}

#[derive(Debug)]
struct SlotMarkerError(String);

impl std::fmt::Display for SlotMarkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SlotMarkerError {}
