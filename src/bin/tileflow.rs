use cgmath::{Matrix4, SquareMatrix};
use tileflow::{
    Config, Context, ExecutionMode, TileRenderState,
    data_structures::{
        material::RenderMaterial,
        scene_graph::{Geometry, SceneGraphBackend, realize},
        texture::Texture2D,
    },
};

/// Printable stand-in for a renderer's scene graph.
struct Summary {
    label: String,
    children: Vec<Summary>,
}

impl Summary {
    fn new(label: String) -> Self {
        Self {
            label,
            children: Vec::new(),
        }
    }

    fn print(&self, depth: usize) {
        println!("{:indent$}{}", "", self.label, indent = depth * 2);
        for child in &self.children {
            child.print(depth + 1);
        }
    }
}

#[derive(Default)]
struct SummaryBackend {
    drawables: usize,
    indices: usize,
}

impl SceneGraphBackend for SummaryBackend {
    type Node = Summary;

    fn create_group(&mut self, name: Option<&str>) -> Summary {
        Summary::new(format!("Group {}", name.unwrap_or("-")))
    }

    fn create_transform(&mut self, name: Option<&str>, matrix: &Matrix4<f64>) -> Summary {
        Summary::new(format!(
            "Transform {} t=({:.3}, {:.3}, {:.3})",
            name.unwrap_or("-"),
            matrix.w.x,
            matrix.w.y,
            matrix.w.z
        ))
    }

    fn create_drawable(
        &mut self,
        geometry: &[Geometry],
        material: Option<&RenderMaterial>,
        texture: Option<&Texture2D>,
    ) -> Summary {
        let vertices: usize = geometry.iter().map(|g| g.vertices.len()).sum();
        let indices: usize = geometry.iter().map(|g| g.indices.len()).sum();
        self.drawables += 1;
        self.indices += indices;
        let diffuse = material.map_or([0.0; 4], |m| m.diffuse);
        let texture = texture.map_or(String::new(), |t| {
            let (w, h) = t.dimensions();
            format!(", texture {}x{}", w, h)
        });
        Summary::new(format!(
            "Drawable {} vertices, {} indices, diffuse ({:.2}, {:.2}, {:.2}){}",
            vertices, indices, diffuse[0], diffuse[1], diffuse[2], texture
        ))
    }

    fn add_child(&mut self, parent: &mut Summary, child: Summary) {
        parent.children.push(child);
    }
}

fn main() -> anyhow::Result<()> {
    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        anyhow::bail!("usage: tileflow <url-or-path>...");
    }

    let context = Context::new(Config {
        mode: ExecutionMode::Queued,
        ..Default::default()
    })?;
    context.init_logging();

    let runtime = tokio::runtime::Runtime::new()?;
    let pipeline = context.resource_pipeline();

    let loads = urls.iter().map(|url| {
        let content = context.load_tile_content(url);
        let pipeline = pipeline.clone();
        async move {
            let content = content.await;
            let url = content.url.clone();
            let errors = content.errors.clone();
            let load = pipeline.prepare_off_main_thread(content, Matrix4::identity()).await;
            (url, errors, load)
        }
    });
    let prepared = runtime.block_on(futures::future::join_all(loads));

    // Everything below runs on this thread, which plays the render thread.
    let mut tiles = Vec::new();
    for (url, errors, load) in prepared {
        let mut state = TileRenderState::new(load);
        state.commit(&pipeline);
        tiles.push((url, errors, state));
    }

    let mut backend = SummaryBackend::default();
    for (url, errors, state) in &tiles {
        match state.main_resource() {
            Some(resource) => {
                let summary = realize(resource.root(), &mut backend);
                println!(
                    "{}: {} node(s), {} primitive(s), {} skipped, bound radius {:.3}",
                    url,
                    resource.stats.nodes,
                    resource.stats.primitives,
                    resource.stats.skipped_primitives,
                    resource.bound.radius
                );
                summary.print(1);
            }
            None => {
                println!("{}: nothing to render", url);
                for error in errors {
                    println!("  error: {}", error);
                }
            }
        }
    }
    println!(
        "{} tile(s), {} drawable(s), {} index(es)",
        tiles.len(),
        backend.drawables,
        backend.indices
    );

    for (_, _, state) in &mut tiles {
        state.free(&pipeline);
    }
    context.shutdown();
    Ok(())
}
