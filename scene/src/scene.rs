//! Scene

use crate::error::SceneError;
use crate::material::Material;
use crate::object::*;
use crate::octfile::*;
use crate::octree::*;
use crate::parser::SceneParser;
use crate::primitive::Shape;
use rcore::binio::{open_file, BinaryError};
use rcore::geometry::*;
use rcore::math::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::sync::Arc;

/// Shared, immutable scene.
pub type SceneHandle = Arc<Scene>;

/// A ray/scene hit.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Intersection {
    /// Distance along the ray; infinite for distant sources.
    pub t: Float,

    /// Hit point. The ray origin for distant sources.
    pub p: Point3f,

    /// Unit surface normal facing the ray origin.
    pub n: Vector3f,

    /// True when the ray hit the side the geometric normal points to.
    pub front: bool,

    /// Surface that was hit.
    pub object: ObjId,

    /// Material of the surface.
    pub material: ObjId,
}

/// Scene geometry and materials with an octree index. Immutable once built,
/// so any number of threads may query it without locking.
#[derive(Debug)]
pub struct Scene {
    /// File the scene was loaded from.
    path: Option<String>,

    /// Object records in id order.
    objects: Vec<ObjectRecord>,

    /// Geometry for surface records.
    shapes: Vec<Option<Shape>>,

    /// Parameters for material records.
    materials: Vec<Option<Material>>,

    /// Index over bounded surfaces.
    octree: Octree,

    /// Distant sources, tested when a ray escapes.
    sources: Vec<ObjId>,

    /// Surfaces and sources sampled by shadow rays.
    lights: Vec<ObjId>,
}

impl Scene {
    /// Build a scene and its octree from object records.
    ///
    /// * `objects` - Object records in id order.
    /// * `options` - Octree build options.
    pub fn build(objects: Vec<ObjectRecord>, options: &BuildOptions) -> Result<Self, SceneError> {
        let mut bounded = vec![];
        for rec in objects.iter() {
            if !rec.kind.is_surface() || rec.kind == ObjectKind::Source {
                continue;
            }
            match (rec.modifier, Shape::from_record(rec)?) {
                (Some(_), Some(shape)) => bounded.push((rec.id, shape.bounds())),
                (None, _) => warn!("Skipping void surface '{}'", rec.name),
                _ => (),
            }
        }
        let octree = Octree::build(&bounded, options);
        Self::from_parts(None, objects, octree)
    }

    /// Parse scene description files and build the scene.
    ///
    /// * `paths`   - Scene description files, parsed in order.
    /// * `options` - Octree build options.
    pub fn compile(paths: &[&str], options: &BuildOptions) -> Result<Self, SceneError> {
        let mut parser = SceneParser::new();
        for path in paths {
            parser.parse_file(path)?;
        }
        Self::build(parser.into_objects(), options)
    }

    /// Parse scene description text and build the scene.
    ///
    /// * `text`    - The scene description.
    /// * `options` - Octree build options.
    pub fn from_text(text: &str, options: &BuildOptions) -> Result<Self, SceneError> {
        let mut parser = SceneParser::new();
        parser.parse_str(text)?;
        Self::build(parser.into_objects(), options)
    }

    /// Load a scene from an octree file.
    ///
    /// * `path` - The file path.
    pub fn load(path: &str) -> Result<Self, SceneError> {
        let mut reader = BufReader::new(open_file(path)?);
        let (objects, octree) = read_octree(&mut reader)?;
        let scene = Self::from_parts(Some(path.to_string()), objects, octree)?;
        info!(
            "Loaded '{}': {} objects, {} octree nodes, {} lights",
            path,
            scene.objects.len(),
            scene.octree.node_count(),
            scene.lights.len()
        );
        Ok(scene)
    }

    /// Save the scene to an octree file.
    ///
    /// * `path` - The file path.
    pub fn save(&self, path: &str) -> Result<(), SceneError> {
        let file = File::create(path).map_err(BinaryError::from)?;
        let mut writer = BufWriter::new(file);
        write_octree(&mut writer, &self.objects, &self.octree)?;
        writer.flush().map_err(BinaryError::from)?;
        info!("Saved '{}'", path);
        Ok(())
    }

    /// Validate records against an octree and derive shapes and materials.
    fn from_parts(path: Option<String>, objects: Vec<ObjectRecord>, octree: Octree) -> Result<Self, SceneError> {
        let mut shapes = Vec::with_capacity(objects.len());
        let mut materials = Vec::with_capacity(objects.len());
        let mut sources = vec![];
        let mut lights = vec![];

        for (i, rec) in objects.iter().enumerate() {
            if rec.id as usize != i {
                return Err(SceneError::MalformedOctree(format!("object '{}' has id {} at index {}", rec.name, rec.id, i)));
            }

            let modifier = match rec.modifier {
                None => None,
                Some(m) if (m as usize) < i => Some(&objects[m as usize]),
                Some(m) => {
                    return Err(SceneError::UnresolvedModifier {
                        name: format!("#{}", m),
                        line: 0,
                    })
                }
            };
            match modifier {
                Some(m) if !m.kind.is_material() || rec.kind.is_material() => {
                    return Err(SceneError::BadModifier {
                        id: rec.name.clone(),
                        modifier: m.name.clone(),
                    })
                }
                _ => (),
            }

            let shape = Shape::from_record(rec)?;
            let material = Material::from_record(rec)?;

            if let (Some(m), Some(shape)) = (modifier, &shape) {
                let emits_for_shadows = matches!(m.kind, ObjectKind::Light | ObjectKind::Illum);
                if shape.is_distant() {
                    sources.push(rec.id);
                    lights.push(rec.id);
                } else if emits_for_shadows {
                    lights.push(rec.id);
                }
            }

            shapes.push(shape);
            materials.push(material);
        }

        let mut bad_leaf = None;
        octree.for_each_id(|id| {
            let ok = matches!(&shapes[id as usize], Some(s) if !s.is_distant())
                && objects[id as usize].modifier.is_some();
            if !ok && bad_leaf.is_none() {
                bad_leaf = Some(id);
            }
        });
        if let Some(id) = bad_leaf {
            return Err(SceneError::MalformedOctree(format!(
                "leaf references '{}' which is not a bounded surface with a material",
                objects[id as usize].name
            )));
        }

        Ok(Self {
            path,
            objects,
            shapes,
            materials,
            octree,
            sources,
            lights,
        })
    }

    /// Returns the closest hit along the ray. Rays that escape all geometry
    /// are tested against distant sources, the first matching source wins.
    ///
    /// * `ray` - The ray. Its direction must be normalized.
    pub fn intersect(&self, ray: &Ray) -> Option<Intersection> {
        let hit = self.octree.closest_hit(ray, |id, r| {
            self.shapes[id as usize]
                .as_ref()
                .and_then(|s| s.intersect(r))
                .map(|h| (h.t, (id, h.n)))
        });

        if let Some((t, (object, n))) = hit {
            let material = self.objects[object as usize].modifier?;
            let front = n.dot(&ray.d) < 0.0;
            return Some(Intersection {
                t,
                p: ray.at(t),
                n: if front { n } else { -n },
                front,
                object,
                material,
            });
        }

        if ray.t_max < INFINITY {
            return None;
        }
        self.sources.iter().find_map(|&id| {
            let shape = self.shapes[id as usize].as_ref()?;
            if !shape.in_source_cone(&ray.d) {
                return None;
            }
            Some(Intersection {
                t: INFINITY,
                p: ray.o,
                n: -ray.d,
                front: true,
                object: id,
                material: self.objects[id as usize].modifier?,
            })
        })
    }

    /// Returns the file the scene was loaded from.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Returns all object records.
    pub fn objects(&self) -> &[ObjectRecord] {
        &self.objects
    }

    /// Returns an object record.
    ///
    /// * `id` - Object id.
    pub fn object(&self, id: ObjId) -> Option<&ObjectRecord> {
        self.objects.get(id as usize)
    }

    /// Returns the newest object with the given name.
    ///
    /// * `name` - Object name.
    pub fn find(&self, name: &str) -> Option<&ObjectRecord> {
        self.objects.iter().rev().find(|o| o.name == name)
    }

    /// Returns the geometry of a surface.
    ///
    /// * `id` - Object id.
    pub fn shape(&self, id: ObjId) -> Option<&Shape> {
        self.shapes.get(id as usize).and_then(|s| s.as_ref())
    }

    /// Returns the parameters of a material.
    ///
    /// * `id` - Object id of the material.
    pub fn material(&self, id: ObjId) -> Option<&Material> {
        self.materials.get(id as usize).and_then(|m| m.as_ref())
    }

    /// Returns the surfaces and sources sampled by shadow rays.
    pub fn lights(&self) -> &[ObjId] {
        &self.lights
    }

    /// Returns the distant sources.
    pub fn sources(&self) -> &[ObjId] {
        &self.sources
    }

    /// Returns the octree.
    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    /// Returns the bounding cube of the octree.
    pub fn bounds(&self) -> Bounds3f {
        self.octree.bounds()
    }

    /// Returns the number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the scene has no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    const BOX_AND_SKY: &str = "
        void plastic grey 0 0 5 .5 .5 .5 0 0
        void light bright 0 0 3 100 100 100
        void glow sky_glow 0 0 4 1 1 1 0
        grey sphere ball 0 0 4 0 0 0 1
        grey polygon floor 0 0 12 -10 -10 -2  10 -10 -2  10 10 -2  -10 10 -2
        bright ring lamp 0 0 8 0 0 5 0 0 -1 0 .5
        sky_glow source sky 0 0 4 0 0 1 180
        void sphere ghost 0 0 4 5 5 5 1
    ";

    fn scene() -> Scene {
        Scene::from_text(BOX_AND_SKY, &BuildOptions::default()).unwrap()
    }

    #[test]
    fn closest_surface_is_hit() {
        let s = scene();
        let hit = s
            .intersect(&Ray::unbounded(Point3f::new(0.0, 0.0, -1.5), Vector3f::new(0.0, 0.0, 1.0)))
            .unwrap();
        assert_eq!(s.object(hit.object).unwrap().name, "ball");
        assert_eq!(s.object(hit.material).unwrap().name, "grey");
        assert!(approx_eq!(Float, hit.t, 0.5));
        assert!(hit.front);
    }

    #[test]
    fn normal_faces_ray_from_behind() {
        let s = scene();
        let hit = s
            .intersect(&Ray::unbounded(Point3f::new(3.0, 3.0, -3.0), Vector3f::new(0.0, 0.0, 1.0)))
            .unwrap();
        assert_eq!(s.object(hit.object).unwrap().name, "floor");
        assert!(!hit.front);
        assert_eq!(hit.n, Vector3f::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn escaping_rays_find_sources() {
        let s = scene();
        let hit = s
            .intersect(&Ray::unbounded(Point3f::new(3.0, 3.0, 0.0), Vector3f::new(0.0, 0.0, 1.0)))
            .unwrap();
        assert_eq!(s.object(hit.object).unwrap().name, "sky");
        assert_eq!(hit.t, INFINITY);

        let bounded = Ray::new(Point3f::new(3.0, 3.0, 0.0), Vector3f::new(0.0, 0.0, 1.0), 100.0);
        assert!(s.intersect(&bounded).is_none());
    }

    #[test]
    fn void_surfaces_are_invisible() {
        let s = scene();
        let r = Ray::unbounded(Point3f::new(5.0, 5.0, 0.0), Vector3f::new(0.0, 0.0, 1.0));
        let hit = s.intersect(&r).unwrap();
        assert_ne!(s.object(hit.object).unwrap().name, "ghost");
    }

    #[test]
    fn lights_include_light_surfaces_and_sources() {
        let s = scene();
        let names: Vec<&str> = s.lights().iter().map(|&id| s.object(id).unwrap().name.as_str()).collect();
        assert_eq!(names, vec!["lamp", "sky"]);
        assert_eq!(s.sources().len(), 1);
    }

    #[test]
    fn surfaces_cannot_modify_surfaces() {
        let err = Scene::from_text(
            "void light l 0 0 3 1 1 1\nl sphere a 0 0 4 0 0 0 1\na sphere b 0 0 4 3 0 0 1",
            &BuildOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SceneError::BadModifier { .. }));
    }

    #[test]
    fn saved_scene_loads_with_same_hits() {
        let s = scene();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.oct");
        let path = path.to_str().unwrap();
        s.save(path).unwrap();

        let loaded = Scene::load(path).unwrap();
        assert_eq!(loaded.path(), Some(path));
        assert_eq!(loaded.objects(), s.objects());
        for (x, y) in [(0.0, 0.0), (3.0, 3.0), (0.2, 0.1), (9.0, -9.0)] {
            let r = Ray::unbounded(Point3f::new(x, y, 10.0), Vector3f::new(0.0, 0.0, -1.0));
            assert_eq!(loaded.intersect(&r), s.intersect(&r));
        }
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        assert!(matches!(Scene::load("/no/such/scene.oct"), Err(SceneError::Binary(_))));
    }

    #[test]
    fn garbage_file_is_a_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.oct");
        std::fs::write(&path, b"this is not an octree").unwrap();
        assert!(Scene::load(path.to_str().unwrap()).is_err());
    }
}
