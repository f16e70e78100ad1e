mod body;
mod euler;

pub use body::{build_body_shape, BodyError, BodyShape, BodyShapeKind};
pub use euler::{quat_to_euler, EulerAngles};

use super::GameplaySet;
use crate::assets::{MeshGeometry, MeshLibrary};
use crate::config::GameConfig;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

const DEFAULT_BODY_FRICTION: f32 = 0.8;
const DEFAULT_BODY_LINEAR_DAMPING: f32 = 0.05;
const DEFAULT_BODY_ANGULAR_DAMPING: f32 = 0.2;
const STATIC_BODY_FRICTION: f32 = 1.0;

pub struct PhysicsBindingPlugin;

impl Plugin for PhysicsBindingPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            sync_world_gravity_from_config.run_if(resource_exists::<GameConfig>),
        )
        .add_systems(
            Update,
            materialize_pending_bodies
                .run_if(resource_exists::<MeshLibrary>)
                .in_set(GameplaySet::Bodies),
        )
        .add_systems(PostUpdate, publish_body_poses.after(PhysicsSet::Writeback));
    }
}

/// Deserialized description of one simulated body. The collider is built from it once.
#[derive(Component, Debug, Clone)]
pub struct PhysicsBodySpec {
    pub mesh: String,
    /// Zero means a static body.
    pub mass: f32,
    pub spawn_translation: Vec3,
    pub spawn_rotation: Quat,
    pub scale: Vec3,
    pub added_to_world: bool,
}

impl PhysicsBodySpec {
    pub fn new(mesh: impl Into<String>, mass: f32, spawn: Transform) -> Self {
        Self {
            mesh: mesh.into(),
            mass,
            spawn_translation: spawn.translation,
            spawn_rotation: spawn.rotation,
            scale: spawn.scale,
            added_to_world: false,
        }
    }

    pub fn is_static(&self) -> bool {
        self.mass == 0.0
    }

    /// Scale lives in the collider and render mesh, so the entity transform stays unscaled.
    pub fn spawn_transform(&self) -> Transform {
        Transform::from_translation(self.spawn_translation).with_rotation(self.spawn_rotation)
    }
}

#[derive(Component, Debug, Clone, Copy)]
pub struct BodyAppearance {
    pub color: Color,
}

#[derive(Component, Debug, Clone, Copy)]
pub struct MaterializationFailed;

#[derive(Component, Debug, Clone, Copy)]
pub struct ChassisExtents {
    pub half_extents: Vec3,
}

/// Plain-data world pose of a body, refreshed after every physics step.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct BodyPose {
    pub position: Vec3,
    pub rotation: Quat,
    pub euler: EulerAngles,
    pub scale: Vec3,
}

impl Default for BodyPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            euler: EulerAngles::default(),
            scale: Vec3::ONE,
        }
    }
}

impl BodyPose {
    pub fn from_body(transform: &Transform, spec: &PhysicsBodySpec) -> Self {
        Self {
            position: transform.translation,
            rotation: transform.rotation,
            euler: quat_to_euler(transform.rotation),
            scale: spec.scale,
        }
    }
}

pub fn materialize_body(
    library: &mut MeshLibrary,
    spec: &PhysicsBodySpec,
) -> Result<(BodyShape, MeshGeometry), BodyError> {
    let geometry = library.get_or_load(&spec.mesh)?.scaled(spec.scale);
    let shape = build_body_shape(&spec.mesh, &geometry, spec.mass)?;
    Ok((shape, geometry))
}

/// Puts the body back at its spawn pose with no motion and no pending force.
pub fn reset_body_to_spawn(
    spec: &PhysicsBodySpec,
    transform: &mut Transform,
    velocity: &mut Velocity,
    external_force: &mut ExternalForce,
) {
    *transform = spec.spawn_transform();
    *velocity = Velocity::zero();
    *external_force = ExternalForce::default();
}

fn sync_world_gravity_from_config(
    config: Res<GameConfig>,
    mut rapier_config_query: Query<&mut RapierConfiguration, With<DefaultRapierContext>>,
) {
    let Ok(mut rapier_config) = rapier_config_query.single_mut() else {
        return;
    };

    let gravity = Vec3::new(0.0, -config.game.physics.gravity, 0.0);
    if rapier_config.gravity != gravity {
        rapier_config.gravity = gravity;
        info!("World gravity set to {:.2} m/s^2.", config.game.physics.gravity);
    }
}

fn materialize_pending_bodies(
    mut commands: Commands,
    mut library: ResMut<MeshLibrary>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut body_query: Query<
        (
            Entity,
            Option<&Name>,
            &mut PhysicsBodySpec,
            Option<&BodyAppearance>,
        ),
        Without<MaterializationFailed>,
    >,
) {
    for (entity, name, mut spec, appearance) in &mut body_query {
        if spec.added_to_world {
            continue;
        }
        let label = name
            .map(|name| name.as_str().to_string())
            .unwrap_or_else(|| spec.mesh.clone());

        let (shape, geometry) = match materialize_body(&mut library, &spec) {
            Ok(materialized) => materialized,
            Err(error) => {
                error!("Body `{label}` was not added to the physics world: {error}");
                commands.entity(entity).insert(MaterializationFailed);
                continue;
            }
        };

        let color = appearance
            .map(|appearance| appearance.color)
            .unwrap_or(Color::srgb(0.7, 0.7, 0.72));
        let mesh = meshes.add(geometry.to_render_mesh());
        let material = materials.add(StandardMaterial {
            base_color: color,
            perceptual_roughness: 0.85,
            ..default()
        });
        let shape_kind = shape.kind;

        let mut entity_commands = commands.entity(entity);
        entity_commands.insert((
            Mesh3d(mesh),
            MeshMaterial3d(material),
            shape.collider,
            ChassisExtents {
                half_extents: shape.half_extents,
            },
            BodyPose::from_body(&spec.spawn_transform(), &spec),
        ));

        if spec.is_static() {
            entity_commands.insert((
                RigidBody::Fixed,
                Friction::coefficient(STATIC_BODY_FRICTION),
            ));
        } else {
            entity_commands.insert((
                RigidBody::Dynamic,
                ColliderMassProperties::Mass(spec.mass),
                Friction::coefficient(DEFAULT_BODY_FRICTION),
                Restitution::coefficient(0.0),
                GravityScale(1.0),
                Velocity::zero(),
                ExternalForce::default(),
                Damping {
                    linear_damping: DEFAULT_BODY_LINEAR_DAMPING,
                    angular_damping: DEFAULT_BODY_ANGULAR_DAMPING,
                },
                Ccd::enabled(),
            ));
        }

        spec.added_to_world = true;
        info!(
            "Added body `{label}` to the physics world ({shape_kind:?}, mass {:.1}).",
            spec.mass
        );
    }
}

fn publish_body_poses(mut body_query: Query<(&Transform, &PhysicsBodySpec, &mut BodyPose)>) {
    for (transform, spec, mut pose) in &mut body_query {
        if spec.is_static() {
            continue;
        }
        *pose = BodyPose::from_body(transform, spec);
    }
}
