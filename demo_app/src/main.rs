//! Scene demo application
//!
//! Builds an animated scene with a tinted group, a masked renderable and
//! pickable spheres, runs it through a post-effects chain for a fixed number
//! of frames on the headless backend and logs per-frame statistics.
//!
//! Usage: `scene_demo [config.toml|config.ron] [frames]`

use boxes::prelude::*;
use boxes::render::{CallLog, GpuCall};
use rand::Rng;
use thiserror::Error;

const TINT_FRAGMENT: &str = "\
precision mediump float;
uniform vec3 u_vTint;
varying vec2 v_vUv;
void main() {
    gl_FragColor = vec4(u_vTint * vec3(v_vUv, 1), 1);
}
";

const VIGNETTE_FRAGMENT: &str = "\
precision mediump float;
uniform sampler2D u_tDiffuse0;
uniform float u_fTime;
varying vec2 v_vUv;
void main() {
    vec4 color = texture2D(u_tDiffuse0, v_vUv);
    float falloff = 1.0 - length(v_vUv - 0.5) * (1.2 + 0.1 * sin(u_fTime * 0.001));
    gl_FragColor = vec4(color.rgb * falloff, color.a);
}
";

const DEFAULT_FRAMES: usize = 120;

#[derive(Debug, Error)]
enum DemoError {
    #[error("renderer setup failed: {0}")]
    Render(#[from] RenderError),
    #[error("invalid frame count '{0}'")]
    FrameCount(String),
}

fn quad(size: f32) -> BufferGeometry {
    let h = size / 2.0;
    BufferGeometry::new(vec![
        -h, -h, 0.0, h, -h, 0.0, h, h, 0.0, //
        -h, -h, 0.0, h, h, 0.0, -h, h, 0.0,
    ])
    .with_attribute("a_vUv", vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0])
}

struct SceneDemo {
    renderer: Renderer,
    log: CallLog,
    scene: Scene,
    pipeline: PostFxPipeline,
    vignette: boxes::render::SharedMaterial,
    spheres: Vec<NodeId>,
}

impl SceneDemo {
    fn new(config: RendererConfig) -> Result<Self, DemoError> {
        let (mut renderer, log) = Renderer::headless(config)?;
        let mut rng = rand::thread_rng();

        let mut scene = Scene::new();
        let root = scene.root();

        let aspect = renderer.width() as f32 / renderer.height() as f32;
        let camera = scene.add(
            root,
            Node::camera(Camera::perspective(60.0, aspect, 0.1, 100.0))
                .with_name("camera")
                .with_translation(Vec3::new(0.0, 0.0, 8.0)),
        );
        scene.set_active_camera(Some(camera));

        let tint = scene.add(
            root,
            Node::uniform_provider(UniformProvider::new([("u_vTint", Vec3::new(1.0, 0.6, 0.2))]))
                .with_name("warm tint"),
        );

        let material = Material::with_fragment_shader(TINT_FRAGMENT).into_shared();
        let geometry = quad(1.0).into_shared();

        let mut spheres = Vec::new();
        for i in 0..6 {
            let speed: f32 = rng.gen_range(20.0..90.0);
            let x = (i as f32 - 2.5) * 1.5;
            let spinner = scene.add(
                tint,
                Node::renderable(Renderable::new(geometry.clone(), material.clone()))
                    .with_name(format!("spinner {i}"))
                    .with_translation(Vec3::new(x, 0.0, 0.0))
                    .with_on_before_transform(move |node| node.transform.rotation.z += speed / 60.0),
            );
            spheres.push(scene.add(spinner, Node::hit_region(HitRegion::sphere(0.5))));
        }

        let window = scene.add(
            root,
            Node::renderable(
                Renderable::new(quad(4.0).into_shared(), Material::default().into_shared())
                    .with_blending(BlendMode::Additive),
            )
            .with_name("masked window")
            .with_translation(Vec3::new(0.0, 2.0, -1.0)),
        );
        scene.set_render_order(window, 1.0);

        let mask = scene.insert(Node::group().with_name("mask"));
        scene.add(
            mask,
            Node::renderable(Renderable::new(quad(2.0).into_shared(), Material::default().into_shared()))
                .with_rotation(Vec3::new(0.0, 0.0, 45.0))
                .with_on_before_transform(|node| node.transform.rotation.z -= 1.0)
                .mask_only(),
        );
        scene.set_mask(window, Some(mask));

        let pipeline = PostFxPipeline::new(&mut renderer, &PostFxConfig::default());
        let vignette = shader_pass(VIGNETTE_FRAGMENT).into_shared();

        Ok(Self {
            renderer,
            log,
            scene,
            pipeline,
            vignette,
            spheres,
        })
    }

    fn frame(&mut self, index: usize) {
        self.log.clear();

        self.pipeline.render(
            &mut self.renderer,
            &mut [
                PostFxStep::Scene(&mut self.scene),
                PostFxStep::Material(self.vignette.clone()),
            ],
        );

        let pointer = Vec2::new(
            rand::thread_rng().gen_range(-1.0..1.0),
            rand::thread_rng().gen_range(-1.0..1.0),
        );
        if let Some((hit, score)) = self.scene.pick(pointer) {
            let sphere = self.spheres.iter().position(|&id| id == hit);
            log::debug!("Pointer {:?} over sphere {:?} (score {:.2})", pointer, sphere, score);
        }

        let draws = self.log.draw_count();
        let state_changes = self
            .log
            .count(|call| matches!(call, GpuCall::Enable(_) | GpuCall::Disable(_) | GpuCall::UseProgram(_)));
        log::info!(
            "Frame {}: {} draws, {} state changes, queue generation {}",
            index,
            draws,
            state_changes,
            self.scene.queue_generation()
        );
    }

    fn run(&mut self, frames: usize) {
        for index in 0..frames {
            if index == frames / 2 {
                // drop the first spinner half way through to force one queue rebuild
                if let Some(&first) = self.spheres.first() {
                    if let Some(spinner) = self.scene.parent(first) {
                        self.scene.hide(spinner);
                    }
                }
            }
            self.frame(index);
        }
    }

    fn shutdown(mut self) {
        let ctx = self.renderer.ctx_mut();
        self.vignette.borrow_mut().delete(ctx);
        for (_, node) in self.scene.iter() {
            if let Some(renderable) = node.as_renderable() {
                renderable.material.borrow_mut().delete(ctx);
                renderable.geometry.borrow_mut().delete(ctx);
            }
        }
        self.pipeline.delete(&mut self.renderer);
        log::info!("Live programs after shutdown: {}", self.log.live_programs());
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    boxes::foundation::logging::init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => RendererConfig::load_or_default(&path),
        None => RendererConfig::default(),
    };
    let frames = match args.next() {
        Some(value) => value.parse().map_err(|_| DemoError::FrameCount(value))?,
        None => DEFAULT_FRAMES,
    };

    log::info!("Starting scene demo: {}x{}, {} frames", config.width, config.height, frames);

    let mut demo = SceneDemo::new(config)?;
    demo.run(frames);
    demo.shutdown();

    log::info!("Scene demo finished");
    Ok(())
}
