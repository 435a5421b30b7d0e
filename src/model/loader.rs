use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::mem::size_of;
use std::path::Path;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use glam::Vec4;

use crate::gpu::Primitive;
use crate::renderer::Renderer;

use super::{Aabb, BasicMaterial, IndexData, Material, Mesh, MeshVertex};

/// Indices of one draw group and the material it is drawn with.
type IndexGroup = (Vec<u32>, Option<Rc<dyn Material>>);

#[derive(Debug, Default)]
struct ObjData {
    positions: Vec<[f32; 3]>,
    tex_coords: Vec<[f32; 2]>,
    normals: Vec<[f32; 3]>,
    vertices: Vec<MeshVertex>,
    vertex_lookup: HashMap<(usize, Option<usize>, Option<usize>), u32>,
    // (material name, triangle indices), in file order.
    groups: Vec<(Option<String>, Vec<u32>)>,
}

fn resolve_index(token: &str, len: usize) -> Option<usize> {
    let index = token.parse::<i64>().ok()?;
    // OBJ indices are 1-based; negative ones count back from the end.
    let resolved = if index < 0 { len as i64 + index } else { index - 1 };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

impl ObjData {
    fn use_material(&mut self, name: &str) {
        self.groups.push((Some(name.to_string()), Vec::new()));
    }

    fn process_face(&mut self, face_tokens: &[&str]) -> Result<()> {
        let mut vertex_indices = Vec::with_capacity(face_tokens.len());

        for vertex_str in face_tokens {
            let mut parts = vertex_str.split('/');
            let position = parts
                .next()
                .and_then(|s| resolve_index(s, self.positions.len()))
                .ok_or_else(|| anyhow!("Invalid position index in face vertex '{}'", vertex_str))?;
            let tex_coord = parts
                .next()
                .filter(|s| !s.is_empty())
                .and_then(|s| resolve_index(s, self.tex_coords.len()));
            let normal = parts
                .next()
                .filter(|s| !s.is_empty())
                .and_then(|s| resolve_index(s, self.normals.len()));

            let key = (position, tex_coord, normal);
            let index = match self.vertex_lookup.get(&key) {
                Some(&index) => index,
                None => {
                    let vertex = MeshVertex {
                        position: self.positions[position],
                        normal: normal.map_or([0.0, 1.0, 0.0], |i| self.normals[i]),
                        tex_coords: tex_coord.map_or([0.0, 0.0], |i| self.tex_coords[i]),
                    };
                    let index = self.vertices.len() as u32;
                    self.vertices.push(vertex);
                    self.vertex_lookup.insert(key, index);
                    index
                }
            };
            vertex_indices.push(index);
        }

        if self.groups.is_empty() {
            self.groups.push((None, Vec::new()));
        }
        let last = self.groups.len() - 1;
        let indices = &mut self.groups[last].1;
        // Fan triangulation, faces are assumed convex.
        for i in 1..vertex_indices.len() - 1 {
            indices.extend_from_slice(&[vertex_indices[0], vertex_indices[i], vertex_indices[i + 1]]);
        }
        Ok(())
    }
}

fn parse_floats<const N: usize>(tokens: &[&str]) -> Result<[f32; N]> {
    let mut values = [0.0; N];
    for (value, token) in values.iter_mut().zip(tokens) {
        *value = token.parse::<f32>()?;
    }
    Ok(values)
}

/// Materials of a library, colored by diffuse color and dissolve.
fn load_mtl(path: &Path) -> Result<Vec<BasicMaterial>> {
    let (materials, _) =
        tobj::load_mtl(path).with_context(|| format!("Can't read {}", path.display()))?;
    Ok(materials
        .into_iter()
        .map(|material| {
            let [r, g, b] = material.diffuse.unwrap_or([1.0; 3]);
            let alpha = material.dissolve.unwrap_or(1.0);
            BasicMaterial::new(material.name, Vec4::new(r, g, b, alpha))
        })
        .collect())
}

/// Meshes and materials read from a glTF or OBJ file.
pub struct Model {
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Rc<BasicMaterial>>,
    pub bounds: Aabb,
}

impl Model {
    pub fn load<P: AsRef<Path>>(renderer: &Renderer, path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("");

        let model = match extension.to_lowercase().as_str() {
            "glb" | "gltf" => Self::load_gltf(renderer, path),
            "obj" => Self::load_obj(renderer, path),
            _ => Err(anyhow!("Unsupported model format: {}", extension)),
        }?;
        log::info!(
            "Loaded {}: {} meshes, {} materials",
            path.display(),
            model.meshes.len(),
            model.materials.len()
        );
        Ok(model)
    }

    fn new(meshes: Vec<Mesh>, materials: Vec<Rc<BasicMaterial>>) -> Self {
        let bounds = meshes
            .iter()
            .map(Mesh::bounds)
            .reduce(Aabb::union)
            .unwrap_or_default();
        Self {
            meshes,
            materials,
            bounds,
        }
    }

    fn load_gltf(renderer: &Renderer, path: &Path) -> Result<Self> {
        let (document, buffers, _images) = gltf::import(path)?;

        // Base colors of every material
        let materials: Vec<Rc<BasicMaterial>> = document
            .materials()
            .enumerate()
            .map(|(index, material)| {
                let name = material
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("material_{}", index));
                let color = material.pbr_metallic_roughness().base_color_factor();
                Rc::new(BasicMaterial::new(name, Vec4::from_array(color)))
            })
            .collect();

        let mut meshes = Vec::new();
        for mesh in document.meshes() {
            let mut vertices: Vec<MeshVertex> = Vec::new();
            let mut groups: Vec<IndexGroup> = Vec::new();

            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    log::warn!(
                        "Skipping {:?} primitive in mesh {:?}",
                        primitive.mode(),
                        mesh.name()
                    );
                    continue;
                }
                let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

                // Get vertex attributes

                let positions: Vec<[f32; 3]> = reader
                    .read_positions()
                    .ok_or_else(|| anyhow!("No position data"))?
                    .collect();
                let normals: Vec<[f32; 3]> = reader
                    .read_normals()
                    .map(|iter| iter.collect())
                    .unwrap_or_else(|| vec![[0.0, 1.0, 0.0]; positions.len()]);
                let tex_coords: Vec<[f32; 2]> = reader
                    .read_tex_coords(0)
                    .map(|iter| iter.into_f32().collect())
                    .unwrap_or_else(|| vec![[0.0, 0.0]; positions.len()]);

                // Primitives share one vertex buffer, so indices are rebased
                let base = vertices.len() as u32;
                let indices: Vec<u32> = match reader.read_indices() {
                    Some(iter) => iter.into_u32().map(|i| base + i).collect(),
                    None => (base..base + positions.len() as u32).collect(),
                };

                vertices.extend(
                    positions
                        .iter()
                        .zip(normals.iter())
                        .zip(tex_coords.iter())
                        .map(|((position, normal), tex_coords)| MeshVertex {
                            position: *position,
                            normal: *normal,
                            tex_coords: *tex_coords,
                        }),
                );

                let material = primitive
                    .material()
                    .index()
                    .and_then(|index| materials.get(index))
                    .map(|material| Rc::clone(material) as Rc<dyn Material>);
                groups.push((indices, material));
            }

            if vertices.is_empty() {
                continue;
            }
            let name = mesh
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("mesh_{}", mesh.index()));
            meshes.push(upload_mesh(renderer, name, &vertices, groups)?);
        }

        if meshes.is_empty() {
            return Err(anyhow!("No meshes found in GLTF file"));
        }
        Ok(Self::new(meshes, materials))
    }

    fn load_obj(renderer: &Renderer, path: &Path) -> Result<Self> {
        let mut obj_data = ObjData::default();
        let mut materials: Vec<Rc<BasicMaterial>> = Vec::new();
        let file = File::open(path).with_context(|| format!("Can't open {}", path.display()))?;

        for line in BufReader::new(file).lines() {
            let line = line?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                ["v", rest @ ..] if rest.len() >= 3 => {
                    obj_data.positions.push(parse_floats::<3>(rest)?);
                }
                ["vt", rest @ ..] if rest.len() >= 2 => {
                    obj_data.tex_coords.push(parse_floats::<2>(rest)?);
                }
                ["vn", rest @ ..] if rest.len() >= 3 => {
                    obj_data.normals.push(parse_floats::<3>(rest)?);
                }
                ["f", rest @ ..] if rest.len() >= 3 => obj_data.process_face(rest)?,
                ["usemtl", name, ..] => obj_data.use_material(name),
                ["mtllib", library, ..] => {
                    let library = path.parent().unwrap_or_else(|| Path::new("")).join(library);
                    match load_mtl(&library) {
                        Ok(loaded) => materials.extend(loaded.into_iter().map(Rc::new)),
                        Err(err) => log::warn!("Ignoring material library: {:#}", err),
                    }
                }
                _ => {}
            }
        }

        // One index range per material group
        let groups: Vec<IndexGroup> = obj_data
            .groups
            .into_iter()
            .filter(|(_, indices)| !indices.is_empty())
            .map(|(name, indices)| {
                let material = name.and_then(|name| {
                    let found = materials.iter().find(|m| m.name == name);
                    if found.is_none() {
                        log::warn!("Material '{}' not found", name);
                    }
                    found.map(|material| Rc::clone(material) as Rc<dyn Material>)
                });
                (indices, material)
            })
            .collect();

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();
        let mesh = upload_mesh(renderer, name, &obj_data.vertices, groups)?;
        Ok(Self::new(vec![mesh], materials))
    }

    /// Draws every mesh once.
    pub fn render(&self, renderer: &mut Renderer, ignore_material: bool) {
        for mesh in &self.meshes {
            mesh.render(renderer, ignore_material, 1);
        }
    }
}

fn upload_mesh(
    renderer: &Renderer,
    name: String,
    vertices: &[MeshVertex],
    groups: Vec<IndexGroup>,
) -> Result<Mesh> {
    let mut mesh = Mesh::new(name, Primitive::Triangles);
    mesh.load_from_memory(
        renderer,
        bytemuck::cast_slice(vertices),
        size_of::<MeshVertex>(),
        &MeshVertex::format(),
        None,
    )?;

    // Create index buffers
    let fits_u16 = vertices.len() <= u16::MAX as usize + 1;
    for (indices, material) in groups {
        if fits_u16 {
            let short: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
            mesh.add_indices(renderer, IndexData::U16(&short), material)?;
        } else {
            mesh.add_indices(renderer, IndexData::U32(&indices), material)?;
        }
    }
    Ok(mesh)
}
