//! Scene scenarios against the recording backend

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use approx::assert_relative_eq;

use crate::foundation::math::{Mat4, Vec2, Vec3};
use crate::render::backend::{Capability, ClearFlags, StencilFunc};
use crate::render::{BufferGeometry, CallLog, GpuCall, Material, RecordingBackend, RenderContext, UniformValue};

use super::*;

const ALPHA_FRAGMENT: &str = "precision mediump float;
uniform float u_fAlpha;
void main() { gl_FragColor = vec4(1, 1, 1, u_fAlpha); }
";

type DrawLog = Rc<RefCell<Vec<String>>>;

fn setup() -> (Scene, RenderContext, CallLog) {
    let gpu = RecordingBackend::new();
    let log = gpu.log();
    let ctx = RenderContext::new(Box::new(gpu), 64, 64);

    let mut scene = Scene::new();
    let root = scene.root();
    let camera = scene.add(
        root,
        Node::camera(Camera::default()).with_translation(Vec3::new(0.0, 0.0, 5.0)),
    );
    scene.set_active_camera(Some(camera));

    (scene, ctx, log)
}

fn renderable(name: &str) -> Node {
    let geometry = BufferGeometry::new(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]).into_shared();
    let material = Material::with_fragment_shader(ALPHA_FRAGMENT).into_shared();
    Node::renderable(Renderable::new(geometry, material)).with_name(name)
}

/// Renderable that records its name each time it is about to draw
fn tracked(name: &str, draws: &DrawLog) -> Node {
    let draws = Rc::clone(draws);
    renderable(name).with_on_before_render(move |node| {
        draws.borrow_mut().push(node.name.clone().unwrap_or_default());
    })
}

fn alpha_of(scene: &Scene, id: NodeId) -> Option<f32> {
    let renderable = scene.node(id)?.as_renderable()?;
    let material = renderable.material.borrow();
    match material.get_uniform("u_fAlpha") {
        Some(UniformValue::Float(v)) => Some(*v),
        _ => None,
    }
}

#[test]
fn test_append_is_idempotent() {
    let mut scene = Scene::new();
    let root = scene.root();
    let parent = scene.add(root, Node::transform_node());
    let child = scene.insert(Node::group());

    scene.append(parent, child);
    scene.append(parent, child);

    assert_eq!(scene.children(parent), &[child]);
    assert_eq!(scene.parent(child), Some(parent));
}

#[test]
fn test_remove_non_child_is_noop() {
    let mut scene = Scene::new();
    let root = scene.root();
    let a = scene.add(root, Node::group());
    let b = scene.add(root, Node::group());
    let child = scene.add(a, Node::group());

    scene.remove(b, child);

    assert_eq!(scene.children(a), &[child]);
    assert!(scene.children(b).is_empty());
    assert_eq!(scene.parent(child), Some(a));
}

#[test]
fn test_reparenting_moves_child() {
    let mut scene = Scene::new();
    let root = scene.root();
    let first = scene.add(root, Node::group());
    let second = scene.add(root, Node::group());
    let child = scene.add(first, Node::group());

    scene.append(second, child);

    assert!(scene.children(first).is_empty());
    assert_eq!(scene.children(second), &[child]);
    assert_eq!(scene.parent(child), Some(second));
}

#[test]
fn test_append_refuses_cycles() {
    let mut scene = Scene::new();
    let root = scene.root();
    let parent = scene.add(root, Node::group());
    let child = scene.add(parent, Node::group());

    scene.append(child, parent);
    scene.append(child, root);

    assert_eq!(scene.parent(parent), Some(root));
    assert!(scene.children(child).is_empty());
}

#[test]
fn test_hidden_subtree_is_skipped() {
    let (mut scene, mut ctx, log) = setup();
    let root = scene.root();
    let transformed = Rc::new(Cell::new(0));

    let parent = scene.add(root, Node::transform_node());
    let seen = Rc::clone(&transformed);
    let child = scene.add(
        parent,
        renderable("child")
            .with_translation(Vec3::new(3.0, 0.0, 0.0))
            .with_on_before_transform(move |_| seen.set(seen.get() + 1)),
    );

    scene.hide(parent);
    scene.render(&mut ctx);

    assert_eq!(transformed.get(), 0);
    assert_eq!(*scene.node(child).unwrap().transform.world_matrix(), Mat4::identity());
    assert!(scene.render_queue().is_empty());
    assert_eq!(log.draw_count(), 0);

    scene.unhide(parent);
    scene.render(&mut ctx);

    assert_eq!(transformed.get(), 1);
    assert_eq!(scene.render_queue().len(), 1);
    assert_eq!(log.draw_count(), 1);
}

#[test]
fn test_queue_is_cached_between_frames() {
    let (mut scene, mut ctx, log) = setup();
    let root = scene.root();
    let transformed = Rc::new(Cell::new(0));
    let seen = Rc::clone(&transformed);
    scene.add(
        root,
        renderable("spinner").with_on_before_transform(move |node| {
            seen.set(seen.get() + 1);
            node.transform.rotation.z += 10.0;
        }),
    );

    scene.render(&mut ctx);
    let first = scene.render_queue();
    scene.render(&mut ctx);
    let second = scene.render_queue();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(scene.queue_generation(), 1);
    assert_eq!(transformed.get(), 2);
    assert_eq!(log.draw_count(), 2);
}

#[test]
fn test_structural_changes_rebuild_queue() {
    let (mut scene, mut ctx, _log) = setup();
    let root = scene.root();
    let group = scene.add(root, Node::transform_node());
    scene.add(group, renderable("a"));
    scene.render(&mut ctx);
    let before = scene.render_queue();
    assert_eq!(before.len(), 1);

    let added = scene.add(group, renderable("b"));
    assert!(scene.needs_rebuild());
    scene.render(&mut ctx);
    assert_eq!(scene.render_queue().len(), 2);
    assert!(!Rc::ptr_eq(&before, &scene.render_queue()));

    scene.remove(group, added);
    scene.render(&mut ctx);
    assert_eq!(scene.render_queue().len(), 1);

    scene.hide(group);
    assert!(scene.needs_rebuild());
    scene.render(&mut ctx);
    assert!(scene.render_queue().is_empty());
    assert_eq!(scene.queue_generation(), 4);
}

#[test]
fn test_changes_to_detached_nodes_do_not_invalidate() {
    let (mut scene, mut ctx, _log) = setup();
    scene.render(&mut ctx);

    let loose = scene.insert(Node::group());
    scene.add(loose, renderable("floating"));
    scene.hide(loose);

    assert!(!scene.needs_rebuild());
}

#[test]
fn test_masked_renderable_composite() {
    let (mut scene, mut ctx, log) = setup();
    let root = scene.root();
    let draws = DrawLog::default();

    scene.add(root, tracked("plain", &draws));
    let masked = scene.add(root, tracked("masked", &draws));
    scene.set_render_order(masked, 1.0);

    let mask = scene.insert(Node::group());
    let mask_child = scene.add(mask, tracked("mask", &draws));
    scene.set_mask(masked, Some(mask));

    scene.render(&mut ctx);

    let queue = scene.render_queue();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0].order, 0.0);
    assert_eq!(queue[1].order, 1.0);
    assert_eq!(queue[1].subtasks.len(), 3);
    assert_eq!(queue[1].subtasks[0].order, f32::NEG_INFINITY);
    assert_eq!(queue[1].subtasks[2].order, f32::INFINITY);

    let flat = queue[1].flatten();
    assert_eq!(flat.len(), 3);
    assert_eq!(flat[0], &TaskAction::MaskWrite);
    assert!(matches!(flat[1], TaskAction::Draw { node, .. } if *node == mask_child));
    assert!(matches!(flat[2], TaskAction::MaskTest { node, .. } if *node == masked));

    assert_eq!(*draws.borrow(), vec!["plain", "mask", "masked"]);

    let calls = log.snapshot();
    let position = |call: &GpuCall| calls.iter().position(|c| c == call).unwrap();
    let draw_positions: Vec<_> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_draw())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(draw_positions.len(), 3);

    let stencil_clear = position(&GpuCall::Clear(ClearFlags::STENCIL));
    let stencil_test = position(&GpuCall::StencilFunc(StencilFunc::Equal, 1, 0xff));
    let stencil_off = position(&GpuCall::Disable(Capability::StencilTest));

    assert!(draw_positions[0] < stencil_clear);
    assert!(stencil_clear < draw_positions[1]);
    assert!(calls[stencil_clear..draw_positions[1]].contains(&GpuCall::ColorMask(false, false, false, false)));
    assert!(draw_positions[1] < stencil_test);
    assert!(stencil_test < draw_positions[2]);
    assert!(draw_positions[2] < stencil_off);
}

#[test]
fn test_mask_with_several_drawables_keeps_writes_off() {
    let (mut scene, mut ctx, log) = setup();
    let root = scene.root();
    let draws = DrawLog::default();

    let masked = scene.add(root, tracked("masked", &draws));
    let mask = scene.insert(Node::group());
    scene.add(mask, tracked("first", &draws));
    let shadow = Rc::clone(&draws);
    let geometry = BufferGeometry::new(vec![0.0; 9]).into_shared();
    scene.add(
        mask,
        Node::renderable(Renderable::new(geometry, Material::default().into_shared()).with_depth_write(false))
            .with_name("second")
            .with_on_before_render(move |node| shadow.borrow_mut().push(node.name.clone().unwrap_or_default())),
    );
    scene.add(mask, tracked("third", &draws));
    scene.set_mask(masked, Some(mask));

    scene.render(&mut ctx);

    assert_eq!(*draws.borrow(), vec!["first", "second", "third", "masked"]);
    assert_eq!(scene.render_queue()[0].flatten().len(), 3 + 2);

    // Color and depth write state in effect at each draw
    let calls = log.snapshot();
    let mut writes = (true, true);
    let mut states = Vec::new();
    for call in &calls {
        match call {
            GpuCall::ColorMask(r, ..) => writes.0 = *r,
            GpuCall::DepthMask(depth) => writes.1 = *depth,
            call if call.is_draw() => states.push(writes),
            _ => {}
        }
    }
    assert_eq!(states, vec![(false, false), (false, false), (false, false), (true, true)]);

    let stencil_clear = calls.iter().position(|c| *c == GpuCall::Clear(ClearFlags::STENCIL)).unwrap();
    let stencil_test = calls
        .iter()
        .position(|c| *c == GpuCall::StencilFunc(StencilFunc::Equal, 1, 0xff))
        .unwrap();
    assert!(!calls[stencil_clear..stencil_test]
        .iter()
        .any(|c| matches!(c, GpuCall::DepthMask(true) | GpuCall::ColorMask(true, ..))));
}

#[test]
fn test_mask_only_nodes_draw_only_inside_masks() {
    let (mut scene, mut ctx, _log) = setup();
    let root = scene.root();
    let draws = DrawLog::default();

    scene.add(root, tracked("stray", &draws).mask_only());
    let masked = scene.add(root, tracked("masked", &draws));
    let mask = scene.insert(tracked("silhouette", &draws).mask_only());
    scene.set_mask(masked, Some(mask));

    scene.render(&mut ctx);

    assert_eq!(*draws.borrow(), vec!["silhouette", "masked"]);
}

#[test]
fn test_nested_mask_is_drawn_unmasked() {
    let (mut scene, mut ctx, _log) = setup();
    let root = scene.root();
    let draws = DrawLog::default();

    let outer = scene.add(root, tracked("outer", &draws));
    let outer_mask = scene.insert(tracked("inner", &draws));
    let inner_mask = scene.insert(tracked("ignored", &draws));
    scene.set_mask(outer_mask, Some(inner_mask));
    scene.set_mask(outer, Some(outer_mask));

    scene.render(&mut ctx);

    let queue = scene.render_queue();
    let flat = queue[0].flatten();
    assert_eq!(flat.len(), 3);
    assert!(matches!(flat[1], TaskAction::Draw { node, .. } if *node == outer_mask));
    assert_eq!(*draws.borrow(), vec!["inner", "outer"]);
}

#[test]
fn test_mask_follows_owner_transform() {
    let (mut scene, mut ctx, _log) = setup();
    let root = scene.root();
    let masked = scene.add(root, renderable("masked").with_translation(Vec3::new(2.0, 0.0, 0.0)));
    let mask = scene.insert(renderable("mask").with_translation(Vec3::new(0.0, 1.0, 0.0)));
    scene.set_mask(masked, Some(mask));

    scene.render(&mut ctx);

    let world = scene.node(mask).unwrap().transform.world_matrix();
    let origin = world.transform_point(&nalgebra::Point3::origin());
    assert_relative_eq!(origin.coords, Vec3::new(2.0, 1.0, 0.0), epsilon = 1e-6);
}

#[test]
fn test_editing_mask_subtree_invalidates() {
    let (mut scene, mut ctx, _log) = setup();
    let root = scene.root();
    let masked = scene.add(root, renderable("masked"));
    let mask = scene.insert(Node::group());
    scene.set_mask(masked, Some(mask));
    scene.render(&mut ctx);
    assert!(!scene.needs_rebuild());

    scene.add(mask, renderable("late"));

    assert!(scene.needs_rebuild());
}

#[test]
fn test_uniform_providers_are_scoped_and_nested() {
    let (mut scene, mut ctx, _log) = setup();
    let root = scene.root();

    let outer = scene.add(root, Node::uniform_provider(UniformProvider::new([("u_fAlpha", 0.25)])));
    let outer_child = scene.add(outer, renderable("outer child"));
    let inner = scene.add(outer, Node::uniform_provider(UniformProvider::new([("u_fAlpha", 0.75)])));
    let inner_child = scene.add(inner, renderable("inner child"));
    let sibling = scene.add(root, renderable("sibling"));

    scene.render(&mut ctx);

    assert_eq!(alpha_of(&scene, outer_child), Some(0.25));
    assert_eq!(alpha_of(&scene, inner_child), Some(0.75));
    assert_eq!(alpha_of(&scene, sibling), None);
}

#[test]
fn test_provider_values_are_read_at_draw_time() {
    let (mut scene, mut ctx, _log) = setup();
    let root = scene.root();
    let provider = scene.add(root, Node::uniform_provider(UniformProvider::new([("u_fAlpha", 0.25)])));
    let child = scene.add(provider, renderable("child"));
    scene.render(&mut ctx);

    scene
        .node_mut(provider)
        .and_then(Node::as_uniform_provider_mut)
        .unwrap()
        .set_uniform("u_fAlpha", 0.5);
    scene.render(&mut ctx);

    assert!(!scene.needs_rebuild());
    assert_eq!(alpha_of(&scene, child), Some(0.5));
}

#[test]
fn test_layer_filter_uses_inherited_layers() {
    let (mut scene, mut ctx, _log) = setup();
    let root = scene.root();
    let draws = DrawLog::default();

    let background = scene.add(root, Node::transform_node().with_layer(1));
    scene.add(background, tracked("sky", &draws));
    scene.add(root, tracked("hud", &draws).with_layer(2));
    scene.add(root, tracked("untagged", &draws));

    scene.set_active_layer(Some(1));
    scene.render(&mut ctx);
    assert_eq!(*draws.borrow(), vec!["sky"]);

    draws.borrow_mut().clear();
    scene.set_active_layer(None);
    scene.render(&mut ctx);
    assert_eq!(*draws.borrow(), vec!["sky", "hud", "untagged"]);
}

#[test]
fn test_equal_orders_keep_traversal_order() {
    let (mut scene, mut ctx, _log) = setup();
    let root = scene.root();
    let draws = DrawLog::default();

    let late = scene.add(root, tracked("late", &draws));
    scene.set_render_order(late, 5.0);
    scene.add(root, tracked("first", &draws));
    let early = scene.add(root, tracked("early", &draws));
    scene.set_render_order(early, -1.0);
    scene.add(root, tracked("second", &draws));

    scene.render(&mut ctx);

    assert_eq!(*draws.borrow(), vec!["early", "first", "second", "late"]);
}

#[test]
fn test_transform_node_hook_gets_its_own_task() {
    let (mut scene, mut ctx, _log) = setup();
    let root = scene.root();
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    let pivot = scene.add(
        root,
        Node::transform_node().with_on_before_render(move |_| seen.set(seen.get() + 1)),
    );

    scene.render(&mut ctx);

    let queue = scene.render_queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].action, Some(TaskAction::BeforeRender { node: pivot }));
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_no_camera_renders_nothing() {
    let (mut scene, mut ctx, log) = setup();
    let root = scene.root();
    scene.add(root, renderable("orphan"));
    scene.set_active_camera(None);

    scene.render(&mut ctx);
    scene.render(&mut ctx);

    assert_eq!(log.draw_count(), 0);
}

#[test]
fn test_hidden_camera_tracks_its_transform() {
    let (mut scene, mut ctx, _log) = setup();
    let root = scene.root();
    let rig = scene.add(root, Node::transform_node().with_translation(Vec3::new(2.0, 0.0, 0.0)));
    let camera = scene.add(
        rig,
        Node::camera(Camera::default()).with_translation(Vec3::new(0.0, 0.0, 5.0)),
    );
    scene.set_active_camera(Some(camera));
    scene.hide(rig);

    scene.render(&mut ctx);
    let view = *scene.camera().unwrap().view_matrix();
    assert_relative_eq!(view[(0, 3)], -2.0, epsilon = 1e-5);
    assert_relative_eq!(view[(2, 3)], -5.0, epsilon = 1e-5);

    scene.node_mut(camera).unwrap().transform.translation = Vec3::new(0.0, 1.0, 3.0);
    scene.render(&mut ctx);
    let view = *scene.camera().unwrap().view_matrix();
    assert_relative_eq!(view[(1, 3)], -1.0, epsilon = 1e-5);
    assert_relative_eq!(view[(2, 3)], -3.0, epsilon = 1e-5);
}

#[test]
fn test_hit_regions_resolve_through_scene() {
    let (mut scene, mut ctx, _log) = setup();
    let root = scene.root();
    let target = scene.add(root, Node::transform_node().with_translation(Vec3::new(0.0, 0.0, 4.0)));
    let square = scene.add(target, Node::hit_region(HitRegion::default()));
    let ball = scene.add(root, Node::hit_region(HitRegion::sphere(1.0)));

    assert_eq!(scene.pick(Vec2::zeros()), None);

    scene.render(&mut ctx);

    // the square sits one unit in front of the camera and fills [-0.5, 0.5]
    assert_eq!(scene.hit_test(square, Vec2::new(0.4, 0.4)), 1.0);
    assert_eq!(scene.hit_test(square, Vec2::new(0.6, 0.0)), 0.0);
    assert_relative_eq!(scene.hit_test(ball, Vec2::zeros()), 1.0, epsilon = 1e-5);

    let (picked, score) = scene.pick(Vec2::zeros()).unwrap();
    assert!(picked == square || picked == ball);
    assert_relative_eq!(score, 1.0, epsilon = 1e-5);

    scene.hide(target);
    scene.render(&mut ctx);
    assert_eq!(scene.hit_test(square, Vec2::zeros()), 0.0);
}

#[test]
fn test_destroy_subtree_returns_nodes_and_clears_masks() {
    let (mut scene, mut ctx, _log) = setup();
    let root = scene.root();
    let group = scene.add(root, Node::group());
    let masked = scene.add(group, renderable("masked"));
    let mask = scene.insert(renderable("mask"));
    scene.set_mask(masked, Some(mask));
    let survivor = scene.add(root, renderable("survivor"));
    let shared_mask_user = scene.add(root, renderable("shared"));
    scene.set_mask(shared_mask_user, Some(mask));
    scene.render(&mut ctx);

    let removed = scene.destroy_subtree(group);

    assert_eq!(removed.len(), 3);
    assert!(scene.node(mask).is_none());
    assert_eq!(scene.node(shared_mask_user).and_then(|n| n.as_renderable()).and_then(Renderable::mask), None);
    scene.render(&mut ctx);
    assert_eq!(scene.render_queue().len(), 2);
    assert!(scene.node(survivor).is_some());
}
