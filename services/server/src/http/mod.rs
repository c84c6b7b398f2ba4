//! The HTTP surface (§4.10, §4.11 `[SUPPLEMENT]`): the page-render fallback
//! route and the render-events SSE feed. Request routing to individual
//! pages (which path maps to which file, middleware, layouts) is an
//! external collaborator per §1 — this module only dispatches whatever path
//! arrives to the `RenderPipeline` and turns the result into an HTTP
//! response with the right caching headers.

pub mod events;
pub mod render_route;
pub mod response;
