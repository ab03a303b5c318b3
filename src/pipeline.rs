//! Render resource preparation.
//!
//! A tile's renderable content crosses the worker/main thread boundary in two
//! steps. [`ResourcePipeline::prepare_off_main_thread`] builds a scene graph
//! fragment on the executor and hands back a [`LoadThreadResource`];
//! [`ResourcePipeline::prepare_on_main_thread`] turns it into a
//! [`MainThreadResource`] on the render thread. [`ResourcePipeline::free`]
//! releases whichever of the two exists when the tile goes away.
//!
//! [`TileRenderState`] tracks the per-tile lifecycle
//! `Preparing -> Committed -> Freed`.

use std::{
    future::Future,
    sync::{Arc, Weak},
};

use cgmath::Matrix4;

use crate::{
    builder::{BuildStats, build_scene},
    data_structures::{bounds::BoundingSphere, document::{ImageAsset, ModelDocument}, scene_graph::SceneNode},
    executor::TaskExecutor,
};

/// Outcome of fetching and parsing one tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileLoadState {
    Success,
    Failed,
    /// The transport failed before a status was received; the host may ask again.
    RetryLater,
}

#[derive(Clone, Debug)]
pub enum TileContentKind {
    /// Nothing to render, which is normal for inner tiles of a tileset.
    Empty,
    Model(Arc<ModelDocument>),
}

#[derive(Clone, Debug)]
pub struct TileLoadResult {
    pub state: TileLoadState,
    pub content: TileContentKind,
    pub url: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl TileLoadResult {
    pub fn model(url: impl Into<String>, document: ModelDocument) -> Self {
        Self {
            state: TileLoadState::Success,
            content: TileContentKind::Model(Arc::new(document)),
            url: url.into(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn failed(state: TileLoadState, url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            state,
            content: TileContentKind::Empty,
            url: url.into(),
            errors: vec![error.into()],
            warnings: Vec::new(),
        }
    }

    /// The document, when the load succeeded and produced one.
    pub fn document(&self) -> Option<&Arc<ModelDocument>> {
        match (&self.state, &self.content) {
            (TileLoadState::Success, TileContentKind::Model(document)) => Some(document),
            _ => None,
        }
    }
}

/**
 * A freshly built fragment owned by the worker side.
 *
 * It must end up either committed or freed. Dropping one that still owns its
 * tree is reported, since it means a tile was lost between the two steps.
 */
#[derive(Debug)]
pub struct LoadThreadResource {
    root: Option<Arc<SceneNode>>,
    pub bound: BoundingSphere,
    pub stats: BuildStats,
}

impl LoadThreadResource {
    pub fn new(root: SceneNode, bound: BoundingSphere, stats: BuildStats) -> Self {
        Self {
            root: Some(Arc::new(root)),
            bound,
            stats,
        }
    }

    pub fn root(&self) -> Option<&SceneNode> {
        self.root.as_deref()
    }

    /// Observes the tree without keeping it alive.
    pub fn downgrade(&self) -> Weak<SceneNode> {
        self.root.as_ref().map(Arc::downgrade).unwrap_or_default()
    }

    fn take_root(&mut self) -> Option<Arc<SceneNode>> {
        self.root.take()
    }

    /// Drops the owned tree. Returns whether there was one to drop.
    pub fn release(&mut self) -> bool {
        let released = self.take_root().is_some();
        if released {
            log::trace!("Released load-thread scene fragment");
        }
        released
    }
}

impl Drop for LoadThreadResource {
    fn drop(&mut self) {
        if self.root.is_some() {
            log::warn!("Load-thread resource dropped without being committed or freed");
        }
    }
}

/// The committed fragment, owned by the render thread until the tile is evicted.
#[derive(Debug)]
pub struct MainThreadResource {
    root: Arc<SceneNode>,
    pub bound: BoundingSphere,
    pub stats: BuildStats,
}

impl MainThreadResource {
    pub fn root(&self) -> &SceneNode {
        &self.root
    }

    pub fn downgrade(&self) -> Weak<SceneNode> {
        Arc::downgrade(&self.root)
    }
}

/**
 * The two-step contract a tile host drives for every tile.
 *
 * `prepare_in_load_thread` runs on a worker and must not touch render-thread
 * state. `prepare_in_main_thread` runs on the render thread and consumes the
 * load-thread value. `free` receives whichever values still exist.
 *
 * The raster overlay hooks share the same shape and default to doing nothing.
 */
pub trait PrepareRendererResources: Send + Sync + 'static {
    type LoadThread: Send + 'static;
    type MainThread;

    fn prepare_in_load_thread(&self, content: &TileLoadResult, transform: &Matrix4<f64>) -> Option<Self::LoadThread>;

    fn prepare_in_main_thread(&self, load: Self::LoadThread) -> Self::MainThread;

    fn free(&self, load: Option<Self::LoadThread>, main: Option<Self::MainThread>);

    fn prepare_raster_in_load_thread(&self, _image: &ImageAsset) {}

    fn prepare_raster_in_main_thread(&self) {}

    fn attach_raster_in_main_thread(
        &self,
        _tile: &mut Self::MainThread,
        _overlay_texture_coordinate_id: u32,
        _translation: [f64; 2],
        _scale: [f64; 2],
    ) {
    }

    fn detach_raster_in_main_thread(&self, _tile: &mut Self::MainThread, _overlay_texture_coordinate_id: u32) {}

    fn free_raster(&self) {}
}

/// Builds [`SceneNode`] fragments with the scene graph builder.
#[derive(Clone, Copy, Debug, Default)]
pub struct SceneResourcePreparer;

impl PrepareRendererResources for SceneResourcePreparer {
    type LoadThread = LoadThreadResource;
    type MainThread = MainThreadResource;

    fn prepare_in_load_thread(&self, content: &TileLoadResult, transform: &Matrix4<f64>) -> Option<LoadThreadResource> {
        let document = content.document()?;
        if document.is_empty() {
            log::debug!("{}: document has no nodes or meshes", content.url);
            return None;
        }
        let built = build_scene(document, transform);
        log::debug!(
            "{}: prepared {} primitive(s) off the main thread",
            content.url,
            built.stats.primitives
        );
        Some(LoadThreadResource::new(built.root, built.bound, built.stats))
    }

    fn prepare_in_main_thread(&self, mut load: LoadThreadResource) -> MainThreadResource {
        let root = load
            .take_root()
            .unwrap_or_else(|| Arc::new(SceneNode::group(Some("tile".to_string()))));
        MainThreadResource {
            root,
            bound: load.bound,
            stats: load.stats,
        }
    }

    fn free(&self, load: Option<LoadThreadResource>, main: Option<MainThreadResource>) {
        if let Some(mut load) = load {
            load.release();
        }
        if let Some(main) = main {
            log::trace!("Freed main-thread resource with {} node(s)", main.root.node_count());
        }
    }
}

/// Drives a [`PrepareRendererResources`] implementation across the thread boundary.
pub struct ResourcePipeline<P: PrepareRendererResources> {
    preparer: Arc<P>,
    executor: Arc<TaskExecutor>,
}

impl<P: PrepareRendererResources> Clone for ResourcePipeline<P> {
    fn clone(&self) -> Self {
        Self {
            preparer: Arc::clone(&self.preparer),
            executor: Arc::clone(&self.executor),
        }
    }
}

impl<P: PrepareRendererResources> ResourcePipeline<P> {
    pub fn new(preparer: P, executor: Arc<TaskExecutor>) -> Self {
        Self {
            preparer: Arc::new(preparer),
            executor,
        }
    }

    pub fn preparer(&self) -> &P {
        &self.preparer
    }

    /**
     * Runs the load-thread step on the executor.
     *
     * Content that did not load successfully, or holds no model, resolves to
     * `None` right away without touching the executor. An unrenderable tile
     * is not an error.
     */
    pub fn prepare_off_main_thread(
        &self,
        content: TileLoadResult,
        transform: Matrix4<f64>,
    ) -> impl Future<Output = Option<P::LoadThread>> + Send + use<P> {
        let pending = if content.document().is_some() {
            let preparer = Arc::clone(&self.preparer);
            Some(
                self.executor
                    .run_in_worker(move || preparer.prepare_in_load_thread(&content, &transform)),
            )
        } else {
            log::debug!(
                "{}: nothing to prepare (state {:?})",
                content.url,
                content.state
            );
            None
        };
        async move {
            match pending {
                Some(pending) => pending.await.flatten(),
                None => None,
            }
        }
    }

    /// Render thread only.
    pub fn prepare_on_main_thread(&self, load: P::LoadThread) -> P::MainThread {
        self.preparer.prepare_in_main_thread(load)
    }

    pub fn free(&self, load: Option<P::LoadThread>, main: Option<P::MainThread>) {
        self.preparer.free(load, main);
    }
}

/// Per-tile lifecycle. Transitions only move forward.
pub enum TileRenderState<P: PrepareRendererResources> {
    Preparing(Option<P::LoadThread>),
    Committed(P::MainThread),
    Freed,
}

impl<P: PrepareRendererResources> TileRenderState<P> {
    pub fn new(load: Option<P::LoadThread>) -> Self {
        Self::Preparing(load)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Preparing(_) => "Preparing",
            Self::Committed(_) => "Committed",
            Self::Freed => "Freed",
        }
    }

    pub fn main_resource(&self) -> Option<&P::MainThread> {
        match self {
            Self::Committed(main) => Some(main),
            _ => None,
        }
    }

    /// `Preparing` with a load-thread value becomes `Committed`. Anything else
    /// is left as it is and `false` is returned.
    pub fn commit(&mut self, pipeline: &ResourcePipeline<P>) -> bool {
        match std::mem::replace(self, Self::Freed) {
            Self::Preparing(Some(load)) => {
                *self = Self::Committed(pipeline.prepare_on_main_thread(load));
                true
            }
            other => {
                *self = other;
                false
            }
        }
    }

    /// Releases whatever the tile still owns. Freeing twice is a no-op.
    pub fn free(&mut self, pipeline: &ResourcePipeline<P>) {
        match std::mem::replace(self, Self::Freed) {
            Self::Preparing(load) => pipeline.free(load, None),
            Self::Committed(main) => pipeline.free(None, Some(main)),
            Self::Freed => log::trace!("Tile resources already freed"),
        }
    }
}

impl<P: PrepareRendererResources> std::fmt::Debug for TileRenderState<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionMode;
    use cgmath::SquareMatrix;

    fn pipeline() -> ResourcePipeline<SceneResourcePreparer> {
        ResourcePipeline::new(SceneResourcePreparer, Arc::new(TaskExecutor::new(ExecutionMode::Synchronous)))
    }

    #[test]
    fn failed_content_prepares_nothing() {
        let content = TileLoadResult::failed(TileLoadState::Failed, "tile.b3dm", "404");
        let prepared = futures::executor::block_on(pipeline().prepare_off_main_thread(content, Matrix4::identity()));
        assert!(prepared.is_none());
    }

    #[test]
    fn released_load_resource_is_quiet_on_drop() {
        let mut load = LoadThreadResource::new(SceneNode::group(None), BoundingSphere::invalid(), BuildStats::default());
        let weak = load.downgrade();
        assert!(load.release());
        assert!(!load.release());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn empty_state_commits_nothing() {
        let pipeline = pipeline();
        let mut state = TileRenderState::<SceneResourcePreparer>::new(None);
        assert!(!state.commit(&pipeline));
        assert_eq!(state.name(), "Preparing");
        state.free(&pipeline);
        assert_eq!(state.name(), "Freed");
    }
}
