use crate::assets::{MeshGeometry, MeshLoadError};
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use std::error::Error;
use std::fmt::{Display, Formatter};

const FALLBACK_BOX_HALF_EXTENT_M: f32 = 0.5;

#[derive(Debug)]
pub enum BodyError {
    Mesh(MeshLoadError),
    Shape { mesh: String, message: String },
}

impl Display for BodyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mesh(source) => write!(f, "mesh load failed: {source}"),
            Self::Shape { mesh, message } => {
                write!(f, "could not build collision shape for `{mesh}`: {message}")
            }
        }
    }
}

impl Error for BodyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Mesh(source) => Some(source),
            Self::Shape { .. } => None,
        }
    }
}

impl From<MeshLoadError> for BodyError {
    fn from(source: MeshLoadError) -> Self {
        Self::Mesh(source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyShapeKind {
    ConcaveMesh,
    ConvexHull,
    FallbackBox,
}

#[derive(Debug, Clone)]
pub struct BodyShape {
    pub collider: Collider,
    pub kind: BodyShapeKind,
    /// Half extents of the scaled geometry's bounding box around the body origin.
    pub half_extents: Vec3,
}

/// Static bodies (mass 0) get a concave triangle mesh, dynamic ones a convex hull.
///
/// `geometry` must already carry the body scale.
pub fn build_body_shape(
    mesh_name: &str,
    geometry: &MeshGeometry,
    mass: f32,
) -> Result<BodyShape, BodyError> {
    if geometry.triangle_count() == 0 {
        warn!("Mesh `{mesh_name}` has no triangles; using a unit box collision shape.");
        return Ok(BodyShape {
            collider: Collider::cuboid(
                FALLBACK_BOX_HALF_EXTENT_M,
                FALLBACK_BOX_HALF_EXTENT_M,
                FALLBACK_BOX_HALF_EXTENT_M,
            ),
            kind: BodyShapeKind::FallbackBox,
            half_extents: Vec3::splat(FALLBACK_BOX_HALF_EXTENT_M),
        });
    }

    let half_extents = geometry
        .bounds()
        .map(|(min, max)| min.abs().max(max.abs()))
        .unwrap_or(Vec3::splat(FALLBACK_BOX_HALF_EXTENT_M));

    if mass == 0.0 {
        let collider = Collider::trimesh(geometry.vertices.clone(), geometry.triangles.clone())
            .map_err(|error| BodyError::Shape {
                mesh: mesh_name.to_string(),
                message: format!("{error:?}"),
            })?;
        return Ok(BodyShape {
            collider,
            kind: BodyShapeKind::ConcaveMesh,
            half_extents,
        });
    }

    let collider =
        Collider::convex_hull(&geometry.vertices).ok_or_else(|| BodyError::Shape {
            mesh: mesh_name.to_string(),
            message: "vertices do not span a convex hull".to_string(),
        })?;
    Ok(BodyShape {
        collider,
        kind: BodyShapeKind::ConvexHull,
        half_extents,
    })
}
