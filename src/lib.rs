//! tileflow
//!
//! Streams tiled 3D model content and turns each tile's model document into
//! a renderable scene graph fragment. Work is split across a worker thread,
//! which fetches, parses and builds, and the render thread, which only
//! commits finished fragments. Nothing in the render thread ever waits on
//! network or disk.
//!
//! High-level modules
//! - `context`: configuration, logging and the shared state handed to every stage
//! - `executor`: inline or single-worker task execution with discard-on-shutdown
//! - `dispatch`: the main-thread continuation queue and its pumping drain helper
//! - `resources`: URL classification and the asset fetcher (HTTP and local files)
//! - `parser`: the model document parser interface with glTF, GLB and b3dm parsers
//! - `data_structures`: model documents, scene graph nodes, transforms, bounds and materials
//! - `builder`: model document to scene graph conversion
//! - `pipeline`: the two-step resource handoff and the per-tile lifecycle
//! - `loader`: loading a single model outside of a tile host
//!

pub mod builder;
pub mod context;
pub mod data_structures;
pub mod dispatch;
pub mod executor;
pub mod loader;
pub mod parser;
pub mod pipeline;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use context::{Config, Context};
pub use executor::{ExecutionMode, TaskExecutor};
pub use pipeline::{LoadThreadResource, MainThreadResource, ResourcePipeline, TileRenderState};
