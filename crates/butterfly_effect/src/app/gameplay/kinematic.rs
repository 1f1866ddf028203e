use std::collections::BTreeSet;
use std::f32::consts::SQRT_2;

use engine::{
    Body, Entity, EntityId, InputSnapshot, RenderableDesc, RenderableKind, Scene, SceneCommand,
    SceneWorld, Shape, System, Transform, Vec2,
};
use tracing::debug;

const KINEMATIC_BACKGROUND: [u8; 3] = [56, 143, 61];
const BALL_COLOR: [u8; 3] = [230, 20, 20];
const SPLITTER_COLOR: [u8; 3] = [20, 230, 20];
const WALL_COLOR: [u8; 3] = [170, 53, 232];
const BALL_SIZE: f32 = 0.5;
const BALL_MASS: f32 = 1.0;
const WALL_SIZE: f32 = 1.0;
const SPLIT_ANGLE_DEGREES: f32 = 10.0;
const SPLIT_MOMENTUM_THRESHOLD: f32 = 1.0;

/// Velocity changes `(dv1, dv2)` for an elastic collision between body 1,
/// taken to be at rest at the origin, and body 2 moving with velocity `v`.
///
/// `x_hat` is the unit normal of the line body 2 reflects off. Either mass
/// may be infinite; two infinite masses never interact. Unless `internal`
/// is set, a body 2 already moving away from body 1 (`x_hat · v >= 0`)
/// produces no change.
pub(crate) fn elastic_collision(
    x_hat: Vec2,
    v: Vec2,
    m1: f32,
    m2: f32,
    internal: bool,
) -> (Vec2, Vec2) {
    if m1.is_infinite() && m2.is_infinite() {
        return (Vec2::ZERO, Vec2::ZERO);
    }

    let v_normal = x_hat.dot(v);
    if v_normal >= 0.0 && !internal {
        return (Vec2::ZERO, Vec2::ZERO);
    }

    if m1.is_infinite() {
        return (Vec2::ZERO, -2.0 * v_normal * x_hat);
    }
    if m2.is_infinite() {
        return (2.0 * v_normal * x_hat, Vec2::ZERO);
    }

    let total_mass = m1 + m2;
    let dv1_normal = 2.0 * m2 / total_mass * v_normal;
    let dv2_normal = (m2 - m1) / total_mass * v_normal;
    (dv1_normal * x_hat, (dv2_normal - v_normal) * x_hat)
}

/// Geometry of a body as seen by collision tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Collider {
    pub(crate) position: Vec2,
    pub(crate) rotation_degrees: f32,
    pub(crate) size: f32,
    pub(crate) shape: Shape,
}

impl Collider {
    fn of(entity: &Entity) -> Option<Self> {
        entity.body.map(|body| Self {
            position: entity.transform.position,
            rotation_degrees: entity.transform.rotation_degrees,
            size: entity.size,
            shape: body.shape,
        })
    }

    /// `None` when this shape has no rule for `other`; the zero vector when
    /// the rule says they are not touching.
    fn directed_vector(&self, other: &Collider) -> Option<Vec2> {
        match (self.shape, other.shape) {
            (Shape::Circle, Shape::Circle) => Some(ball_ball_vector(self, other)),
            (Shape::Square, Shape::Circle) => Some(wall_ball_vector(self, other)),
            _ => None,
        }
    }
}

/// Collision normal from `a` towards `b`, or zero when they do not touch.
pub(crate) fn collision_vector(a: &Collider, b: &Collider) -> Vec2 {
    a.directed_vector(b)
        .or_else(|| b.directed_vector(a).map(|reverse| -reverse))
        .unwrap_or(Vec2::ZERO)
}

fn ball_ball_vector(ball: &Collider, other: &Collider) -> Vec2 {
    let offset = other.position - ball.position;
    if offset.length() > (ball.size + other.size) / 2.0 {
        return Vec2::ZERO;
    }
    // Coincident centres stay zero.
    offset.normalize()
}

fn wall_ball_vector(wall: &Collider, ball: &Collider) -> Vec2 {
    let half = wall.size / 2.0;
    let radius = ball.size / 2.0;
    let local = (ball.position - wall.position).rotate_degrees(-wall.rotation_degrees);

    let left_bottom = Vec2::new(-half, -half);
    let left_top = Vec2::new(-half, half);
    let right_bottom = Vec2::new(half, -half);
    let right_top = Vec2::new(half, half);

    let sides = [
        (left_bottom, left_top),
        (left_bottom, right_bottom),
        (right_bottom, right_top),
        (left_top, right_top),
    ];
    for (start, end) in sides {
        let edge = end - start;
        let edge_hat = edge.normalize();
        let relative = local - start;
        let along = relative.dot(edge_hat);
        let normal = relative - along * edge_hat;
        if (0.0..=edge.length()).contains(&along) && normal.length() <= radius {
            return normal.normalize().rotate_degrees(wall.rotation_degrees);
        }
    }

    for corner in [left_top, right_top, left_bottom, right_bottom] {
        let normal = local - corner;
        if normal.length() <= radius {
            return normal.normalize().rotate_degrees(wall.rotation_degrees);
        }
    }

    Vec2::ZERO
}

/// Resolves elastic collisions between every unordered pair of bodies in
/// the active world.
pub(crate) struct CollisionSystem;

impl System for CollisionSystem {
    fn name(&self) -> &'static str {
        "collision"
    }

    fn update(&mut self, _fixed_dt_seconds: f32, world: &mut SceneWorld) {
        let entities = world.entities_mut();
        for first in 0..entities.len() {
            for second in first + 1..entities.len() {
                let (head, tail) = entities.split_at_mut(second);
                resolve_pair(&mut head[first], &mut tail[0]);
            }
        }
    }
}

fn resolve_pair(a: &mut Entity, b: &mut Entity) {
    let (Some(collider_a), Some(collider_b)) = (Collider::of(a), Collider::of(b)) else {
        return;
    };
    let x_hat = collision_vector(&collider_a, &collider_b);
    if x_hat.is_zero() {
        return;
    }
    let (Some(body_a), Some(body_b)) = (a.body.as_mut(), b.body.as_mut()) else {
        return;
    };

    let (dv1, dv2) = elastic_collision(
        x_hat,
        body_b.velocity - body_a.velocity,
        body_a.mass,
        body_b.mass,
        false,
    );
    body_a.velocity += dv1;
    body_b.velocity += dv2;
}

struct BallSpec {
    position: Vec2,
    velocity: Vec2,
    size: f32,
    mass: f32,
}

impl BallSpec {
    const fn at(x: f32, y: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            velocity: Vec2::ZERO,
            size: BALL_SIZE,
            mass: BALL_MASS,
        }
    }

    const fn moving(self, vx: f32, vy: f32) -> Self {
        Self {
            velocity: Vec2::new(vx, vy),
            ..self
        }
    }

    const fn heavy(self, size: f32, mass: f32) -> Self {
        Self { size, mass, ..self }
    }
}

const BALLS: [BallSpec; 10] = [
    BallSpec::at(-2.0, 0.0).moving(8.0, 0.0),
    BallSpec::at(0.0, 0.0).heavy(1.0, 4.0),
    BallSpec::at(4.0, -0.5),
    BallSpec::at(5.0, -1.0),
    BallSpec::at(-5.0, -3.0).moving(1.0, 0.0),
    BallSpec::at(-2.0, -2.6).moving(1.0, 0.0),
    BallSpec::at(-1.0, -2.7).moving(1.0, 0.0),
    BallSpec::at(0.0, -2.8).moving(1.0, 0.0),
    BallSpec::at(1.0, -2.95).moving(2.0, 0.0),
    BallSpec::at(2.0, -2.94).moving(3.0, 0.0),
];

/// (position, rotation in degrees, size)
const WALLS: [(Vec2, f32, f32); 3] = [
    (Vec2::new(-3.0, 0.0), 20.0, WALL_SIZE),
    (Vec2::new(0.0, 2.85), 45.0, WALL_SIZE),
    (Vec2::new(6.0, -3.0), 45.0, 2.0),
];

const SPLITTER_POSITION: Vec2 = Vec2::new(3.0, 0.1);

/// Sandbox of balls bouncing off each other, off fixed walls and into a
/// splitter that breaks apart when hit hard enough.
pub(crate) struct KinematicScene {
    splitters: BTreeSet<EntityId>,
}

impl KinematicScene {
    pub(crate) fn new() -> Self {
        Self {
            splitters: BTreeSet::new(),
        }
    }

    fn spawn_splitter(&mut self, world: &mut SceneWorld, position: Vec2, size: f32, body: Body) {
        let id = world.spawn_body(
            Transform::at(position),
            size,
            RenderableDesc {
                kind: RenderableKind::Circle(SPLITTER_COLOR),
                debug_name: "splitter",
            },
            body,
        );
        self.splitters.insert(id);
    }

    fn split_fast_splitters(&mut self, world: &mut SceneWorld) {
        let ready: Vec<(EntityId, Vec2, f32, Body)> = world
            .entities()
            .iter()
            .filter(|entity| self.splitters.contains(&entity.id))
            .filter_map(|entity| {
                entity
                    .body
                    .filter(should_split)
                    .map(|body| (entity.id, entity.transform.position, entity.size, body))
            })
            .collect();

        for (id, position, size, body) in ready {
            world.despawn(id);
            self.splitters.remove(&id);
            for angle in [SPLIT_ANGLE_DEGREES, -SPLIT_ANGLE_DEGREES] {
                let child = Body {
                    velocity: body.velocity.rotate_degrees(angle),
                    mass: body.mass / 2.0,
                    shape: Shape::Circle,
                };
                self.spawn_splitter(world, position, size / SQRT_2, child);
            }
            debug!(splitter = id.0, mass = body.mass, "splitter_split");
        }
    }
}

fn should_split(body: &Body) -> bool {
    body.mass * body.velocity.length() >= SPLIT_MOMENTUM_THRESHOLD
}

impl Scene for KinematicScene {
    fn load(&mut self, world: &mut SceneWorld) {
        for ball in &BALLS {
            world.spawn_body(
                Transform::at(ball.position),
                ball.size,
                RenderableDesc {
                    kind: RenderableKind::Circle(BALL_COLOR),
                    debug_name: "ball",
                },
                Body {
                    velocity: ball.velocity,
                    mass: ball.mass,
                    shape: Shape::Circle,
                },
            );
        }

        for (position, rotation_degrees, size) in WALLS {
            world.spawn_body(
                Transform {
                    position,
                    rotation_degrees,
                },
                size,
                RenderableDesc {
                    kind: RenderableKind::Square(WALL_COLOR),
                    debug_name: "wall",
                },
                Body {
                    velocity: Vec2::ZERO,
                    mass: f32::INFINITY,
                    shape: Shape::Square,
                },
            );
        }

        self.spawn_splitter(
            world,
            SPLITTER_POSITION,
            BALL_SIZE,
            Body {
                velocity: Vec2::ZERO,
                mass: BALL_MASS,
                shape: Shape::Circle,
            },
        );
    }

    fn update(
        &mut self,
        fixed_dt_seconds: f32,
        _input: &InputSnapshot,
        world: &mut SceneWorld,
    ) -> SceneCommand {
        for entity in world.entities_mut() {
            if let Some(body) = entity.body.filter(|body| body.shape == Shape::Circle) {
                entity.transform.position += body.velocity * fixed_dt_seconds;
            }
        }
        self.split_fast_splitters(world);
        SceneCommand::None
    }

    fn render(&mut self, _world: &SceneWorld) {}

    fn unload(&mut self, _world: &mut SceneWorld) {
        self.splitters.clear();
    }

    fn background_color(&self) -> [u8; 3] {
        KINEMATIC_BACKGROUND
    }

    fn debug_title(&self, world: &SceneWorld) -> Option<String> {
        Some(format!(
            "Butterfly Effect | kinematic | {} bodies",
            world.entity_count()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    fn assert_vec_close(actual: Vec2, expected: Vec2) {
        assert!(
            (actual.x - expected.x).abs() < EPSILON && (actual.y - expected.y).abs() < EPSILON,
            "expected {expected:?}, got {actual:?}"
        );
    }

    fn ball(x: f32, y: f32) -> Collider {
        Collider {
            position: Vec2::new(x, y),
            rotation_degrees: 0.0,
            size: BALL_SIZE,
            shape: Shape::Circle,
        }
    }

    fn wall(x: f32, y: f32, rotation_degrees: f32) -> Collider {
        Collider {
            position: Vec2::new(x, y),
            rotation_degrees,
            size: WALL_SIZE,
            shape: Shape::Square,
        }
    }

    fn spawn_ball(world: &mut SceneWorld, position: Vec2, velocity: Vec2) -> EntityId {
        world.spawn_body(
            Transform::at(position),
            BALL_SIZE,
            RenderableDesc {
                kind: RenderableKind::Circle(BALL_COLOR),
                debug_name: "ball",
            },
            Body {
                velocity,
                mass: BALL_MASS,
                shape: Shape::Circle,
            },
        )
    }

    fn velocity_of(world: &SceneWorld, id: EntityId) -> Vec2 {
        world
            .find_entity(id)
            .and_then(|entity| entity.body)
            .expect("body")
            .velocity
    }

    #[test]
    fn equal_masses_exchange_normal_velocity() {
        let (dv1, dv2) = elastic_collision(
            Vec2::new(1.0, 0.0),
            Vec2::new(-1.0, 0.0),
            1.0,
            1.0,
            false,
        );
        assert_vec_close(dv1, Vec2::new(-1.0, 0.0));
        assert_vec_close(dv2, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn unequal_masses_conserve_momentum() {
        let x_hat = Vec2::new(3.0, 4.0).normalize();
        let v = Vec2::new(-2.0, -1.0);
        let (m1, m2) = (4.0, 1.0);
        let (dv1, dv2) = elastic_collision(x_hat, v, m1, m2, false);

        let momentum_change = m1 * dv1 + m2 * dv2;
        assert_vec_close(momentum_change, Vec2::ZERO);
        let energy_before = 0.5 * m2 * v.dot(v);
        let v1 = dv1;
        let v2 = v + dv2;
        let energy_after = 0.5 * m1 * v1.dot(v1) + 0.5 * m2 * v2.dot(v2);
        assert!((energy_before - energy_after).abs() < EPSILON);
    }

    #[test]
    fn separating_bodies_do_not_interact_unless_internal() {
        let x_hat = Vec2::new(1.0, 0.0);
        let away = Vec2::new(1.0, 0.0);

        assert_eq!(
            elastic_collision(x_hat, away, 1.0, 1.0, false),
            (Vec2::ZERO, Vec2::ZERO)
        );
        let (dv1, _) = elastic_collision(x_hat, away, 1.0, 1.0, true);
        assert_vec_close(dv1, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn two_infinite_masses_never_interact() {
        let result = elastic_collision(
            Vec2::new(0.0, 1.0),
            Vec2::new(0.0, -5.0),
            f32::INFINITY,
            f32::INFINITY,
            true,
        );
        assert_eq!(result, (Vec2::ZERO, Vec2::ZERO));
    }

    #[test]
    fn infinite_masses_reflect_the_finite_body() {
        let x_hat = Vec2::new(1.0, 0.0);
        let v = Vec2::new(-3.0, 2.0);

        let (dv1, dv2) = elastic_collision(x_hat, v, f32::INFINITY, 1.0, false);
        assert_eq!(dv1, Vec2::ZERO);
        assert_vec_close(dv2, Vec2::new(6.0, 0.0));

        let (dv1, dv2) = elastic_collision(x_hat, v, 1.0, f32::INFINITY, false);
        assert_vec_close(dv1, Vec2::new(-6.0, 0.0));
        assert_eq!(dv2, Vec2::ZERO);
    }

    #[test]
    fn balls_touch_within_mean_size() {
        assert_vec_close(
            collision_vector(&ball(0.0, 0.0), &ball(0.0, 0.4)),
            Vec2::new(0.0, 1.0),
        );
        assert_eq!(
            collision_vector(&ball(0.0, 0.0), &ball(0.0, 0.6)),
            Vec2::ZERO
        );
        assert_eq!(
            collision_vector(&ball(1.0, 1.0), &ball(1.0, 1.0)),
            Vec2::ZERO
        );
    }

    #[test]
    fn wall_side_pushes_ball_outward() {
        assert_vec_close(
            collision_vector(&wall(0.0, 0.0, 0.0), &ball(0.7, 0.0)),
            Vec2::new(1.0, 0.0),
        );
        assert_vec_close(
            collision_vector(&wall(0.0, 0.0, 0.0), &ball(0.0, -0.7)),
            Vec2::new(0.0, -1.0),
        );
        assert_eq!(
            collision_vector(&wall(0.0, 0.0, 0.0), &ball(0.8, 0.0)),
            Vec2::ZERO
        );
    }

    #[test]
    fn wall_corner_pushes_ball_diagonally() {
        let diagonal = Vec2::new(1.0, 1.0).normalize();
        assert_vec_close(
            collision_vector(&wall(0.0, 0.0, 0.0), &ball(0.6, 0.6)),
            diagonal,
        );
    }

    #[test]
    fn rotated_wall_rotates_the_normal_back() {
        // A diamond's top corner sits at (0, 0.707).
        assert_vec_close(
            collision_vector(&wall(0.0, 0.0, 45.0), &ball(0.0, 0.85)),
            Vec2::new(0.0, 1.0),
        );
    }

    #[test]
    fn ball_to_wall_is_the_negated_wall_to_ball_vector() {
        let forward = collision_vector(&wall(1.0, 2.0, 20.0), &ball(1.7, 2.1));
        let reverse = collision_vector(&ball(1.7, 2.1), &wall(1.0, 2.0, 20.0));

        assert!(!forward.is_zero());
        assert_vec_close(reverse, -forward);
    }

    #[test]
    fn walls_have_no_rule_for_each_other() {
        assert_eq!(
            collision_vector(&wall(0.0, 0.0, 0.0), &wall(0.2, 0.0, 0.0)),
            Vec2::ZERO
        );
    }

    #[test]
    fn collision_system_swaps_velocities_of_approaching_balls() {
        let mut world = SceneWorld::default();
        let left = spawn_ball(&mut world, Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0));
        let right = spawn_ball(&mut world, Vec2::new(0.4, 0.0), Vec2::ZERO);
        world.apply_pending();

        CollisionSystem.update(1.0 / 60.0, &mut world);

        assert_vec_close(velocity_of(&world, left), Vec2::ZERO);
        assert_vec_close(velocity_of(&world, right), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn collision_system_leaves_separating_balls_alone() {
        let mut world = SceneWorld::default();
        let left = spawn_ball(&mut world, Vec2::new(0.0, 0.0), Vec2::new(-1.0, 0.0));
        let right = spawn_ball(&mut world, Vec2::new(0.4, 0.0), Vec2::new(1.0, 0.0));
        world.apply_pending();

        CollisionSystem.update(1.0 / 60.0, &mut world);

        assert_eq!(velocity_of(&world, left), Vec2::new(-1.0, 0.0));
        assert_eq!(velocity_of(&world, right), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn load_spawns_balls_walls_and_one_splitter() {
        let mut scene = KinematicScene::new();
        let mut world = SceneWorld::default();
        scene.load(&mut world);
        world.apply_pending();

        let count_named =
            |name: &str| world.entities().iter().filter(|e| e.renderable.debug_name == name).count();
        assert_eq!(count_named("ball"), 10);
        assert_eq!(count_named("wall"), 3);
        assert_eq!(count_named("splitter"), 1);
        assert_eq!(scene.splitters.len(), 1);

        let walls: Vec<&Entity> = world
            .entities()
            .iter()
            .filter(|e| e.renderable.debug_name == "wall")
            .collect();
        assert!(walls
            .iter()
            .all(|wall| wall.body.is_some_and(|body| body.mass.is_infinite())));
        assert_eq!(walls[2].size, 2.0);
        assert_eq!(walls[0].transform.rotation_degrees, 20.0);
    }

    #[test]
    fn balls_move_by_velocity_each_tick() {
        let mut scene = KinematicScene::new();
        let mut world = SceneWorld::default();
        let id = spawn_ball(&mut world, Vec2::new(1.0, 1.0), Vec2::new(2.0, -4.0));
        world.apply_pending();

        scene.update(0.5, &InputSnapshot::empty(), &mut world);

        let position = world.find_entity(id).expect("ball").transform.position;
        assert_vec_close(position, Vec2::new(2.0, -1.0));
    }

    #[test]
    fn resting_splitter_stays_whole() {
        let mut scene = KinematicScene::new();
        let mut world = SceneWorld::default();
        scene.spawn_splitter(
            &mut world,
            Vec2::ZERO,
            BALL_SIZE,
            Body {
                velocity: Vec2::new(0.5, 0.0),
                mass: BALL_MASS,
                shape: Shape::Circle,
            },
        );
        world.apply_pending();

        scene.update(1.0 / 60.0, &InputSnapshot::empty(), &mut world);
        world.apply_pending();

        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn fast_splitter_breaks_into_two_halves() {
        let mut scene = KinematicScene::new();
        let mut world = SceneWorld::default();
        scene.spawn_splitter(
            &mut world,
            Vec2::ZERO,
            BALL_SIZE,
            Body {
                velocity: Vec2::new(2.0, 0.0),
                mass: BALL_MASS,
                shape: Shape::Circle,
            },
        );
        world.apply_pending();
        let original = world.entities()[0].id;

        scene.update(0.1, &InputSnapshot::empty(), &mut world);
        world.apply_pending();

        assert!(world.find_entity(original).is_none());
        assert_eq!(world.entity_count(), 2);
        assert_eq!(scene.splitters.len(), 2);

        let expected_velocities = [
            Vec2::new(2.0, 0.0).rotate_degrees(10.0),
            Vec2::new(2.0, 0.0).rotate_degrees(-10.0),
        ];
        for (child, expected_velocity) in world.entities().iter().zip(expected_velocities) {
            let body = child.body.expect("body");
            assert_vec_close(child.transform.position, Vec2::new(0.2, 0.0));
            assert!((child.size - BALL_SIZE / SQRT_2).abs() < EPSILON);
            assert_eq!(body.mass, 0.5);
            assert_vec_close(body.velocity, expected_velocity);
            assert!(scene.splitters.contains(&child.id));
        }
    }

    #[test]
    fn simulation_keeps_walls_fixed_and_state_finite() {
        let mut scene = KinematicScene::new();
        let mut collisions = CollisionSystem;
        let mut world = SceneWorld::default();
        scene.load(&mut world);
        world.apply_pending();
        let walls_before: Vec<Transform> = world
            .entities()
            .iter()
            .filter(|e| e.renderable.debug_name == "wall")
            .map(|e| e.transform)
            .collect();

        let dt = 1.0 / 60.0;
        for _ in 0..600 {
            collisions.update(dt, &mut world);
            scene.update(dt, &InputSnapshot::empty(), &mut world);
            world.apply_pending();
        }

        let walls_after: Vec<Transform> = world
            .entities()
            .iter()
            .filter(|e| e.renderable.debug_name == "wall")
            .map(|e| e.transform)
            .collect();
        assert_eq!(walls_before, walls_after);
        assert!(world.entities().iter().all(|entity| {
            let body = entity.body.expect("body");
            entity.transform.position.x.is_finite()
                && entity.transform.position.y.is_finite()
                && body.velocity.x.is_finite()
                && body.velocity.y.is_finite()
        }));
    }

    #[test]
    fn title_bar_reports_body_count() {
        let mut scene = KinematicScene::new();
        let mut world = SceneWorld::default();
        scene.load(&mut world);
        world.apply_pending();

        assert_eq!(
            scene.debug_title(&world).as_deref(),
            Some("Butterfly Effect | kinematic | 14 bodies")
        );
    }
}
