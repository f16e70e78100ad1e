use crate::config::GameConfig;
use bevy::asset::RenderAssetUsages;
use bevy::mesh::PrimitiveTopology;
use bevy::prelude::*;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const MODEL_DIR: &str = "models";
const MODEL_EXTENSION: &str = "obj";

pub struct MeshLibraryPlugin;

impl Plugin for MeshLibraryPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            sync_mesh_library.run_if(resource_exists::<GameConfig>),
        );
    }
}

fn sync_mesh_library(
    mut commands: Commands,
    config: Res<GameConfig>,
    library: Option<ResMut<MeshLibrary>>,
) {
    if library.is_some() && !config.is_changed() {
        return;
    }

    let new_library = MeshLibrary::new(PathBuf::from(&config.game.app.asset_root));
    match library {
        Some(mut existing_library) => {
            info!(
                "Mesh library reset after config change ({} cached meshes dropped).",
                existing_library.cached.len()
            );
            *existing_library = new_library;
        }
        None => {
            info!(
                "Initialized mesh library at `{}`.",
                new_library.asset_root.display()
            );
            commands.insert_resource(new_library);
        }
    }
}

/// Caches parsed mesh geometry by resolved path so bodies sharing a mesh parse it once.
#[derive(Resource, Debug, Clone)]
pub struct MeshLibrary {
    pub asset_root: PathBuf,
    cached: HashMap<PathBuf, MeshGeometry>,
}

impl MeshLibrary {
    pub fn new(asset_root: PathBuf) -> Self {
        Self {
            asset_root,
            cached: HashMap::new(),
        }
    }

    pub fn resolve(&self, mesh_name: &str) -> PathBuf {
        resolve_mesh_path(&self.asset_root, mesh_name)
    }

    pub fn get_or_load(&mut self, mesh_name: &str) -> Result<MeshGeometry, MeshLoadError> {
        let path = self.resolve(mesh_name);
        if let Some(geometry) = self.cached.get(&path) {
            return Ok(geometry.clone());
        }

        let geometry = load_mesh(&path)?;
        self.cached.insert(path, geometry.clone());
        Ok(geometry)
    }
}

/// Bare names resolve to `<root>/models/<name>.obj`; names with an extension are taken relative to the root.
pub fn resolve_mesh_path(asset_root: &Path, mesh_name: &str) -> PathBuf {
    let relative = Path::new(mesh_name);
    if relative.extension().is_some() {
        asset_root.join(relative)
    } else {
        asset_root
            .join(MODEL_DIR)
            .join(format!("{mesh_name}.{MODEL_EXTENSION}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshGeometry {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl MeshGeometry {
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn scaled(&self, scale: Vec3) -> Self {
        Self {
            vertices: self.vertices.iter().map(|vertex| *vertex * scale).collect(),
            triangles: self.triangles.clone(),
        }
    }

    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.vertices.first()?;
        let bounds = self
            .vertices
            .iter()
            .fold((first, first), |(min, max), vertex| {
                (min.min(*vertex), max.max(*vertex))
            });
        Some(bounds)
    }

    /// Flat-shaded render mesh; every triangle gets its own three vertices.
    pub fn to_render_mesh(&self) -> Mesh {
        let mut positions: Vec<[f32; 3]> = Vec::with_capacity(self.triangles.len() * 3);
        let mut normals: Vec<[f32; 3]> = Vec::with_capacity(self.triangles.len() * 3);
        let mut uvs: Vec<[f32; 2]> = Vec::with_capacity(self.triangles.len() * 3);

        for triangle in &self.triangles {
            let [a, b, c] = triangle.map(|index| self.vertices[index as usize]);
            let normal = (b - a).cross(c - a).normalize_or(Vec3::Y);
            for corner in [a, b, c] {
                positions.push(corner.to_array());
                normals.push(normal.to_array());
                uvs.push([corner.x, corner.z]);
            }
        }

        Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
            .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, normals)
            .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, uvs)
    }
}

#[derive(Debug)]
pub enum MeshLoadError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: tobj::LoadError,
    },
    NonTriangularFace {
        path: PathBuf,
        model: String,
        face_index: usize,
        vertex_count: usize,
    },
}

impl Display for MeshLoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read mesh `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse mesh `{}`: {source}", path.display())
            }
            Self::NonTriangularFace {
                path,
                model,
                face_index,
                vertex_count,
            } => write!(
                f,
                "{} (`{model}` face {face_index}): face has {vertex_count} vertices; only triangles are supported",
                path.display()
            ),
        }
    }
}

impl Error for MeshLoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::NonTriangularFace { .. } => None,
        }
    }
}

fn obj_load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        single_index: false,
        triangulate: false,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

pub fn load_mesh(path: &Path) -> Result<MeshGeometry, MeshLoadError> {
    let file = File::open(path).map_err(|source| MeshLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_obj(&mut BufReader::new(file), path)
}

/// Parses OBJ text held in memory; `path` is only used for error messages.
pub fn parse_obj(source: &str, path: &Path) -> Result<MeshGeometry, MeshLoadError> {
    read_obj(&mut source.as_bytes(), path)
}

fn read_obj(reader: &mut impl BufRead, path: &Path) -> Result<MeshGeometry, MeshLoadError> {
    // Materials are never used for collision or the flat-shaded render mesh.
    let (models, _materials) =
        tobj::load_obj_buf(reader, &obj_load_options(), |_| {
            Err(tobj::LoadError::OpenFileFailed)
        })
        .map_err(|source| MeshLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut geometry = MeshGeometry::default();
    for model in &models {
        append_model(&mut geometry, model, path)?;
    }
    Ok(geometry)
}

fn append_model(
    geometry: &mut MeshGeometry,
    model: &tobj::Model,
    path: &Path,
) -> Result<(), MeshLoadError> {
    let mesh = &model.mesh;

    // An empty arity list means every face is already a triangle.
    if let Some((face_index, arity)) = mesh
        .face_arities
        .iter()
        .enumerate()
        .find(|(_, arity)| **arity != 3)
    {
        return Err(MeshLoadError::NonTriangularFace {
            path: path.to_path_buf(),
            model: model.name.clone(),
            face_index,
            vertex_count: *arity as usize,
        });
    }

    let base = geometry.vertices.len() as u32;
    let model_vertex_count = (mesh.positions.len() / 3) as u32;
    if mesh.indices.iter().any(|index| *index >= model_vertex_count) {
        return Err(MeshLoadError::Parse {
            path: path.to_path_buf(),
            source: tobj::LoadError::FaceVertexOutOfBounds,
        });
    }

    geometry.vertices.extend(
        mesh.positions
            .chunks_exact(3)
            .map(|xyz| Vec3::new(xyz[0], xyz[1], xyz[2])),
    );
    geometry.triangles.extend(
        mesh.indices
            .chunks_exact(3)
            .map(|corners| [base + corners[0], base + corners[1], base + corners[2]]),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD_AS_TRIANGLES: &str = "\
# two triangles
v 0 0 0
v 1 0 0
v 1 0 1
v 0 0 1
vt 0 0
vn 0 1 0
f 1/1/1 3/1/1 2/1/1
f 1//1 -1//1 -2//1
";

    fn triangle_corners(geometry: &MeshGeometry) -> Vec<[Vec3; 3]> {
        geometry
            .triangles
            .iter()
            .map(|triangle| triangle.map(|index| geometry.vertices[index as usize]))
            .collect()
    }

    #[test]
    fn parses_vertices_and_triangles_with_slash_and_negative_indices() {
        let geometry = parse_obj(QUAD_AS_TRIANGLES, Path::new("quad.obj")).expect("valid obj");

        assert_eq!(geometry.vertices.len(), 4);
        assert_eq!(
            triangle_corners(&geometry),
            vec![
                [Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0), Vec3::X],
                [Vec3::ZERO, Vec3::Z, Vec3::new(1.0, 0.0, 1.0)],
            ]
        );
        assert_eq!(
            geometry.bounds(),
            Some((Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0)))
        );
    }

    #[test]
    fn rejects_quad_faces() {
        let source = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3\nf 1 2 3 4\n";
        let error = parse_obj(source, Path::new("quad.obj")).expect_err("quad should fail");

        match error {
            MeshLoadError::NonTriangularFace {
                face_index,
                vertex_count,
                ..
            } => {
                assert_eq!(face_index, 1);
                assert_eq!(vertex_count, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_out_of_range_indices() {
        let source = "v 0 0 0\nf 1 2 3\n";
        assert!(matches!(
            parse_obj(source, Path::new("bad.obj")),
            Err(MeshLoadError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_reports_io_error() {
        let error = load_mesh(Path::new("definitely/not/here.obj")).expect_err("missing file");
        assert!(matches!(error, MeshLoadError::Io { .. }));
        assert!(error.to_string().contains("definitely/not/here.obj"));
    }

    #[test]
    fn empty_source_yields_zero_triangles() {
        let geometry = parse_obj("", Path::new("empty.obj")).expect("empty is valid");
        assert_eq!(geometry.triangle_count(), 0);
        assert!(geometry.bounds().is_none());
    }

    #[test]
    fn separate_objects_are_merged_with_offset_indices() {
        let source = "\
o first
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
o second
v 5 0 0
v 6 0 0
v 5 1 0
f 4 5 6
";
        let geometry = parse_obj(source, Path::new("pair.obj")).expect("valid obj");

        assert_eq!(geometry.triangle_count(), 2);
        assert_eq!(
            triangle_corners(&geometry)[1],
            [Vec3::new(5.0, 0.0, 0.0), Vec3::new(6.0, 0.0, 0.0), Vec3::new(5.0, 1.0, 0.0)]
        );
    }

    #[test]
    fn bare_mesh_names_resolve_into_model_dir() {
        assert_eq!(
            resolve_mesh_path(Path::new("assets"), "car"),
            PathBuf::from("assets/models/car.obj")
        );
        assert_eq!(
            resolve_mesh_path(Path::new("assets"), "props/ramp.obj"),
            PathBuf::from("assets/props/ramp.obj")
        );
    }

    #[test]
    fn scaling_multiplies_each_axis() {
        let geometry = parse_obj(QUAD_AS_TRIANGLES, Path::new("quad.obj")).expect("valid obj");
        let scaled = geometry.scaled(Vec3::new(2.0, 1.0, 3.0));

        assert!(scaled.vertices.contains(&Vec3::new(2.0, 0.0, 3.0)));
        assert_eq!(scaled.triangles, geometry.triangles);
    }

    #[test]
    fn shipped_models_load_as_triangle_meshes() {
        let mut library = MeshLibrary::new(PathBuf::from("assets"));

        let car = library.get_or_load("car").expect("car model loads");
        let track = library.get_or_load("track").expect("track model loads");

        assert_eq!(car.triangle_count(), 12);
        let (min, max) = car.bounds().expect("car has vertices");
        assert!((max - min).distance(Vec3::new(2.0, 0.8, 4.0)) < 1e-4);
        assert!(track.triangle_count() > 100);
    }
}
