//! Ray Tracer
//!
//! Evaluates one primary ray against a scene. Shading is reduced to the
//! data flow of a Whitted style tracer: emitters return their colour,
//! specular and data driven materials spawn reflected and transmitted
//! children, and diffuse surfaces gather direct light through shadow rays.

use crate::callback::Callbacks;
use crate::config::*;
use crate::contrib::*;
use crate::error::SimulError;
use crate::ray::*;
use bsdf::{BsdfCache, SampleFlags};
use rcore::fileutil::{parent_path, resolve_path};
use rcore::geometry::*;
use rcore::math::*;
use rcore::spectrum::Spectrum;
use scene::{Intersection, Material, ObjId, SceneHandle};
use std::collections::HashMap;
use std::sync::Arc;

/// A traced primary ray and the contributions it makes.
#[derive(Clone, Debug)]
pub struct Traced {
    /// The primary ray.
    pub result: RayResult,

    /// Contributions to modifier bins in trace order.
    pub contributions: Vec<Contribution>,
}

/// Everything a worker needs to trace rays for one manager. Shared by the
/// manager's workers only.
pub struct TraceContext {
    scene: SceneHandle,
    bsdfs: Arc<BsdfCache>,
    params: RayParams,
    flags: RtFlags,
    callbacks: Callbacks,

    /// Modifier index for each material id with a registered modifier.
    by_material: HashMap<ObjId, usize>,

    /// Registered modifiers in registration order.
    modifiers: Vec<Arc<Modifier>>,

    /// Directory relative BSDF paths are resolved against.
    base_dir: Option<String>,
}

impl TraceContext {
    /// Create a trace context.
    ///
    /// * `scene`     - The scene.
    /// * `bsdfs`     - BSDF cache for data driven materials.
    /// * `config`    - Manager configuration.
    /// * `callbacks` - User callbacks.
    /// * `modifiers` - Registered modifiers; empty in trace mode.
    pub fn new(
        scene: SceneHandle,
        bsdfs: Arc<BsdfCache>,
        config: &SimulConfig,
        callbacks: Callbacks,
        modifiers: Vec<Arc<Modifier>>,
    ) -> Self {
        let mut by_material = HashMap::new();
        for (i, m) in modifiers.iter().enumerate() {
            match scene.find(&m.name) {
                Some(rec) if rec.kind.is_material() => {
                    by_material.insert(rec.id, i);
                }
                Some(rec) => warn!("Modifier '{}' is a {}, not a material", m.name, rec.kind),
                None => warn!("Modifier '{}' is not in the scene", m.name),
            }
        }

        let base_dir = scene.path().and_then(parent_path);
        Self {
            scene,
            bsdfs,
            base_dir,
            params: config.params,
            flags: config.flags,
            callbacks,
            by_material,
            modifiers,
        }
    }

    /// Returns the scene.
    pub fn scene(&self) -> &SceneHandle {
        &self.scene
    }

    /// Returns the ray flags.
    pub fn flags(&self) -> RtFlags {
        self.flags
    }

    /// Returns the registered modifiers.
    pub fn modifiers(&self) -> &[Arc<Modifier>] {
        &self.modifiers
    }

    /// Trace a primary ray. Every segment is passed to the trace callback
    /// once its value is known.
    ///
    /// * `item` - The work item.
    pub fn trace(&self, item: &RayWorkItem) -> Traced {
        let dir = match item.dir.try_normalize() {
            Some(d) if d.is_finite() => d,
            _ => return self.fail(item, "invalid direction"),
        };
        if !item.origin.is_finite() {
            return self.fail(item, "invalid origin");
        }
        let t_max = match item.max_dist {
            Some(t) if t > 0.0 => t,
            Some(_) => return self.fail(item, "maximum distance must be positive"),
            None => INFINITY,
        };

        let mut walk = Walk {
            ctx: self,
            seq: item.seq,
            bundle: item.bundle,
            contributions: vec![],
            abort: 0,
            failure: None,
        };
        let mut result = walk.segment(item.origin, dir, t_max, RayType::Primary, 0, Spectrum::ONE);
        result.callback_status = walk.abort;

        if let Some(reason) = walk.failure {
            warn!("Ray #{} failed. {}", item.seq, reason);
            result.status = RayStatus::Failed(reason);
            walk.contributions.clear();
        } else if walk.abort != 0 {
            walk.contributions.clear();
        }

        Traced {
            result,
            contributions: walk.contributions,
        }
    }

    /// Call the cooked callback for a traced ray unless it failed or was
    /// abandoned. A non-zero status drops the ray's contributions.
    ///
    /// * `traced` - The traced ray.
    pub fn cook(&self, traced: &mut Traced) {
        if !traced.result.is_ok() || traced.result.callback_status != 0 {
            return;
        }
        let status = self.callbacks.cooked(&traced.result);
        if status != 0 {
            trace!("Cooked callback returned {} for ray #{}", status, traced.result.seq);
            traced.result.callback_status = status;
            traced.contributions.clear();
        }
    }

    fn fail(&self, item: &RayWorkItem, reason: &str) -> Traced {
        warn!("Ray #{} failed. {}", item.seq, reason);
        Traced {
            result: RayResult::failed(item, reason.to_string()),
            contributions: vec![],
        }
    }
}

/// State of one primary ray while its tree of segments is traced.
struct Walk<'a> {
    ctx: &'a TraceContext,
    seq: u64,
    bundle: u64,
    contributions: Vec<Contribution>,

    /// First non-zero trace callback status.
    abort: i32,

    /// Why the ray could not be evaluated.
    failure: Option<String>,
}

impl<'a> Walk<'a> {
    fn stopped(&self) -> bool {
        self.abort != 0 || self.failure.is_some()
    }

    /// Trace one segment and its children.
    ///
    /// * `o`        - Origin.
    /// * `d`        - Unit direction.
    /// * `t_max`    - Maximum distance.
    /// * `ray_type` - Classification.
    /// * `depth`    - Reflections and transmissions so far.
    /// * `coef`     - Product of the coefficients leading to this segment.
    fn segment(
        &mut self,
        o: Point3f,
        d: Vector3f,
        t_max: Float,
        ray_type: RayType,
        depth: usize,
        coef: Spectrum,
    ) -> RayResult {
        let hit = self.ctx.scene.intersect(&Ray::new(o, d, t_max));
        let value = match &hit {
            Some(h) => self.shade(h, &d, ray_type, depth, coef),
            None => Spectrum::ZERO,
        };

        let weight = coef.max_component_value();
        if let Some(h) = &hit {
            self.contribute(h, &o, &d, weight, coef * value);
        }

        let mut result = RayResult {
            origin: o,
            dir: d,
            value,
            ray_type,
            seq: self.seq,
            bundle: self.bundle,
            depth,
            weight,
            distance: hit.map_or(INFINITY, |h| h.t),
            hit: hit.as_ref().map(HitInfo::from),
            status: RayStatus::Ok,
            callback_status: 0,
        };
        self.traced(&mut result);
        result
    }

    fn traced(&mut self, result: &mut RayResult) {
        if self.stopped() {
            return;
        }
        let status = self.ctx.callbacks.traced(result);
        if status != 0 {
            trace!("Trace callback returned {} for ray #{}", status, self.seq);
            result.callback_status = status;
            self.abort = status;
        }
    }

    fn contribute(&mut self, h: &Intersection, o: &Point3f, d: &Vector3f, weight: Float, value: Spectrum) {
        if self.stopped() {
            return;
        }
        if let Some(&id) = self.ctx.by_material.get(&h.material) {
            let vars = RayVars {
                dir: *d,
                origin: *o,
                point: h.p,
                normal: h.n,
                distance: h.t,
                weight,
            };
            if let Some(bin) = self.ctx.modifiers[id].bin(&vars) {
                self.contributions.push(Contribution {
                    modifier: id,
                    bin,
                    value,
                });
            }
        }
    }

    fn shade(&mut self, h: &Intersection, d: &Vector3f, ray_type: RayType, depth: usize, coef: Spectrum) -> Spectrum {
        let material = match self.ctx.scene.material(h.material) {
            Some(m) => m.clone(),
            None => return Spectrum::ZERO,
        };

        let irradiance = self.ctx.flags.contains(RtFlags::IMM_IRRAD);
        if irradiance && ray_type == RayType::Primary && h.t < INFINITY {
            return Spectrum::new(self.ctx.params.ambient * PI) + self.direct(h, depth, coef);
        }

        let ambient = Spectrum::new(self.ctx.params.ambient);
        let reflected = d.reflect(&h.n);
        match material {
            Material::Light { color } | Material::Illum { color } => color,
            Material::Glow { color, max_radius } => {
                if ray_type != RayType::Primary && max_radius > 0.0 && h.t > max_radius {
                    Spectrum::ZERO
                } else {
                    color
                }
            }
            Material::Plastic { color, specularity, .. } => {
                let diffuse = color * (1.0 - specularity);
                let mut v = diffuse * (ambient + self.diffuse_direct(h, depth, coef));
                if specularity > 0.0 {
                    let spec = Spectrum::new(specularity);
                    v += self.child(h, &reflected, RayType::Reflected, depth, coef, spec);
                }
                v
            }
            Material::Metal { color, specularity, .. } => {
                let diffuse = color * (1.0 - specularity);
                let mut v = diffuse * (ambient + self.diffuse_direct(h, depth, coef));
                if specularity > 0.0 {
                    v += self.child(h, &reflected, RayType::Reflected, depth, coef, color * specularity);
                }
                v
            }
            Material::Trans {
                color,
                specularity,
                transmissivity,
                trans_specular,
                ..
            } => {
                let diffuse = color * ((1.0 - specularity) * (1.0 - transmissivity));
                let mut v = diffuse * (ambient + self.diffuse_direct(h, depth, coef));
                let through = color * ((1.0 - specularity) * transmissivity * trans_specular);
                if !through.is_black() {
                    v += self.child(h, d, RayType::Transmitted, depth, coef, through);
                }
                if specularity > 0.0 {
                    let spec = Spectrum::new(specularity);
                    v += self.child(h, &reflected, RayType::Reflected, depth, coef, spec);
                }
                v
            }
            Material::Glass { transmission, index } => {
                let r0 = ((index - 1.0) / (index + 1.0)).powi(2);
                let through = transmission * (1.0 - r0);
                let mut v = self.child(h, d, RayType::Transmitted, depth, coef, through);
                v += self.child(h, &reflected, RayType::Reflected, depth, coef, Spectrum::new(r0));
                v
            }
            Material::Mirror { color } => self.child(h, &reflected, RayType::Reflected, depth, coef, color),
            Material::ABsdf { path, up, diffuse } => {
                let path = resolve_path(&path, self.ctx.base_dir.as_deref());
                let data = match self.ctx.bsdfs.load(&path) {
                    Ok(data) => data,
                    Err(e) => {
                        self.failure = Some(SimulError::from(e).to_string());
                        return Spectrum::ZERO;
                    }
                };
                let gn = if h.front { h.n } else { -h.n };
                let frame = Frame::from_normal_up(&gn, &up);
                let vin = frame.to_local(d);
                let both = SampleFlags::DIFFUSE | SampleFlags::SPECULAR;
                let refl = data.direct_hemi(&vin, SampleFlags::REFLECT | both);
                let trans = data.direct_hemi(&vin, SampleFlags::TRANSMIT | both);

                let mut v = diffuse * ambient;
                if !refl.is_black() {
                    v += self.child(h, &reflected, RayType::Reflected, depth, coef, refl);
                }
                if !trans.is_black() {
                    v += self.child(h, d, RayType::Transmitted, depth, coef, trans);
                }
                v
            }
        }
    }

    /// Trace a reflected or transmitted child and return its value scaled
    /// by the coefficient. Children past the maximum depth or below the
    /// minimum weight are not traced.
    fn child(
        &mut self,
        h: &Intersection,
        dir: &Vector3f,
        ray_type: RayType,
        depth: usize,
        coef: Spectrum,
        scale: Spectrum,
    ) -> Spectrum {
        if self.stopped() || depth >= self.ctx.params.max_depth {
            return Spectrum::ZERO;
        }
        let child_coef = coef * scale;
        if child_coef.max_component_value() < self.ctx.params.min_weight {
            return Spectrum::ZERO;
        }
        let child = self.segment(h.p, *dir, INFINITY, ray_type, depth + 1, child_coef);
        scale * child.value
    }

    /// Returns `irradiance / PI` when shadow rays are enabled.
    fn diffuse_direct(&mut self, h: &Intersection, depth: usize, coef: Spectrum) -> Spectrum {
        if self.ctx.flags.contains(RtFlags::TRACE_SOURCES) {
            self.direct(h, depth, coef) * INV_PI
        } else {
            Spectrum::ZERO
        }
    }

    /// Returns the irradiance from every light source at a hit, using one
    /// shadow ray per source aimed at its centre.
    fn direct(&mut self, h: &Intersection, depth: usize, coef: Spectrum) -> Spectrum {
        let scene = Arc::clone(&self.ctx.scene);
        let mut e = Spectrum::ZERO;

        for &id in scene.lights() {
            if self.stopped() {
                break;
            }
            let (shape, emission) = match (
                scene.shape(id),
                scene
                    .object(id)
                    .and_then(|o| o.modifier)
                    .and_then(|m| scene.material(m))
                    .and_then(|m| m.emission()),
            ) {
                (Some(s), Some(c)) => (s, c),
                _ => continue,
            };

            let (dir, t_max, dist) = if shape.is_distant() {
                (shape.center(), INFINITY, INFINITY)
            } else {
                let to = shape.center() - h.p;
                let dist = to.length();
                match to.try_normalize() {
                    Some(dir) => (dir, dist * 1.001 + RAY_EPSILON, dist),
                    None => continue,
                }
            };
            let cos_n = dir.dot(&h.n);
            if cos_n <= 0.0 {
                continue;
            }

            let reached = self.shadow(h.p, dir, t_max, id, emission, depth, coef);
            if let Some(hit) = reached {
                let omega = if shape.is_distant() {
                    shape.area()
                } else {
                    let cos_l = abs(hit.n.dot(&dir));
                    min(shape.area() * cos_l / (dist * dist), TWO_PI)
                };
                e += emission * (cos_n * omega);
            }
        }
        e
    }

    /// Trace a shadow ray and return the hit if it reached the target.
    #[allow(clippy::too_many_arguments)]
    fn shadow(
        &mut self,
        o: Point3f,
        d: Vector3f,
        t_max: Float,
        target: ObjId,
        emission: Spectrum,
        depth: usize,
        coef: Spectrum,
    ) -> Option<Intersection> {
        let hit = self.ctx.scene.intersect(&Ray::new(o, d, t_max));
        let reached = hit.filter(|h| h.object == target);
        let mut result = RayResult {
            origin: o,
            dir: d,
            value: if reached.is_some() { emission } else { Spectrum::ZERO },
            ray_type: RayType::Shadow,
            seq: self.seq,
            bundle: self.bundle,
            depth,
            weight: coef.max_component_value(),
            distance: hit.map_or(INFINITY, |h| h.t),
            hit: hit.as_ref().map(HitInfo::from),
            status: RayStatus::Ok,
            callback_status: 0,
        };
        self.traced(&mut result);
        reached
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::ArcCallback;
    use bsdf::{BsdfData, BsdfError};
    use float_cmp::*;
    use parking_lot::Mutex;
    use scene::{BuildOptions, Scene};

    const ROOM: &str = "
        void plastic grey 0 0 5 .5 .5 .5 0 0
        void plastic shiny 0 0 5 .5 .5 .5 .5 0
        void mirror silver 0 0 3 1 1 1
        void light lamp_mat 0 0 3 10 10 10
        void glow sky_mat 0 0 4 1 1 1 0
        void aBSDF panel 1 missing.bsdf 0 0
        grey polygon floor 0 0 12 -10 -10 0  10 -10 0  10 10 0  -10 10 0
        silver polygon wall 0 0 12 20 -10 -1  20 10 -1  20 10 10  20 -10 10
        shiny sphere ball 0 0 4 -5 0 1 1
        panel sphere pane 0 0 4 5 5 1 1
        lamp_mat sphere lamp 0 0 4 0 0 5 .5
        sky_mat source sky 0 0 4 0 0 1 180
    ";

    fn context(config: &SimulConfig, callbacks: Callbacks) -> TraceContext {
        let scene = Arc::new(Scene::from_text(ROOM, &BuildOptions::default()).unwrap());
        TraceContext::new(scene, Arc::new(BsdfCache::new()), config, callbacks, vec![])
    }

    fn item(o: [Float; 3], d: [Float; 3]) -> RayWorkItem {
        RayWorkItem::new(&RayInput::new(Point3f::from(o), Vector3f::from(d)), 3, 9)
    }

    fn recorder() -> (Arc<Mutex<Vec<RayResult>>>, ArcCallback) {
        let seen = Arc::new(Mutex::new(vec![]));
        let s = Arc::clone(&seen);
        let cb: ArcCallback = Arc::new(move |r: &RayResult| {
            s.lock().push(r.clone());
            0
        });
        (seen, cb)
    }

    #[test]
    fn emitters_return_their_colour() {
        let ctx = context(&SimulConfig::new(1), Callbacks::default());
        let t = ctx.trace(&item([0.0, 0.0, 2.0], [0.0, 0.0, 1.0]));
        assert!(t.result.is_ok());
        assert_eq!(t.result.value, Spectrum::new(10.0));
        assert_eq!(t.result.seq, 3);
        assert_eq!(t.result.bundle, 9);
        assert_eq!(t.result.ray_type, RayType::Primary);

        let sky = ctx.trace(&item([3.0, -3.0, 2.0], [0.0, 0.0, 1.0]));
        assert_eq!(sky.result.value, Spectrum::ONE);
        assert_eq!(sky.result.distance, INFINITY);
    }

    #[test]
    fn degenerate_rays_fail_without_tracing() {
        let (seen, cb) = recorder();
        let ctx = context(&SimulConfig::new(1), Callbacks::new(Some(cb), None));
        let t = ctx.trace(&item([0.0, 0.0, 2.0], [0.0, 0.0, 0.0]));
        assert!(matches!(t.result.status, RayStatus::Failed(_)));
        assert!(seen.lock().is_empty());

        let nan = ctx.trace(&item([Float::NAN, 0.0, 2.0], [0.0, 0.0, 1.0]));
        assert!(!nan.result.is_ok());

        let mut bounded = item([0.0, 0.0, 2.0], [0.0, 0.0, 1.0]);
        bounded.max_dist = Some(0.0);
        assert!(!ctx.trace(&bounded).result.is_ok());
    }

    #[test]
    fn mirror_reflects_into_children() {
        let (seen, cb) = recorder();
        let ctx = context(&SimulConfig::new(1), Callbacks::new(Some(cb), None));
        let t = ctx.trace(&item([10.0, 0.0, 5.0], [1.0, 0.0, 0.0]));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].ray_type, RayType::Reflected);
        assert_eq!(seen[0].depth, 1);
        assert_eq!(seen[1].ray_type, RayType::Primary);
        assert_eq!(seen[1], t.result);
        assert!(approx_eq!(Float, seen[0].dir.x, -1.0));
    }

    #[test]
    fn depth_limit_stops_children() {
        let (seen, cb) = recorder();
        let params = RayParams {
            max_depth: 0,
            ..RayParams::default()
        };
        let config = SimulConfig::new(1).params(params);
        let ctx = context(&config, Callbacks::new(Some(cb), None));
        ctx.trace(&item([10.0, 0.0, 5.0], [1.0, 0.0, 0.0]));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn shadow_rays_light_diffuse_surfaces() {
        let (seen, cb) = recorder();
        let config = SimulConfig::new(1).flags(RtFlags::TRACE_SOURCES);
        let ctx = context(&config, Callbacks::new(Some(cb), None));
        let t = ctx.trace(&item([2.0, 0.0, 3.0], [0.0, 0.0, -1.0]));
        assert!(!t.result.value.is_black());
        assert!(seen.lock().iter().any(|r| r.ray_type == RayType::Shadow));

        let dark = context(&SimulConfig::new(1), Callbacks::default());
        assert!(dark.trace(&item([2.0, 0.0, 3.0], [0.0, 0.0, -1.0])).result.value.is_black());
    }

    #[test]
    fn irradiance_replaces_radiance_at_first_hit() {
        let params = RayParams {
            ambient: 1.0,
            ..RayParams::default()
        };
        let config = SimulConfig::new(1).params(params).flags(RtFlags::IMM_IRRAD);
        let ctx = context(&config, Callbacks::default());
        let t = ctx.trace(&item([-8.0, -8.0, 3.0], [0.0, 0.0, -1.0]));
        assert!(t.result.value[0] > PI);
    }

    #[test]
    fn non_zero_trace_status_abandons_the_ray() {
        let calls = Arc::new(Mutex::new(0));
        let c = Arc::clone(&calls);
        let cb: ArcCallback = Arc::new(move |_: &RayResult| {
            *c.lock() += 1;
            7
        });
        let ctx = context(&SimulConfig::new(1), Callbacks::new(Some(cb), None));
        let t = ctx.trace(&item([-5.0, 0.0, 5.0], [0.0, 0.0, -1.0]));
        assert_eq!(*calls.lock(), 1);
        assert_eq!(t.result.callback_status, 7);
        assert!(t.result.is_ok());
    }

    #[test]
    fn cooked_status_drops_contributions() {
        let cooked: ArcCallback = Arc::new(|_: &RayResult| 1);
        let ctx = context(&SimulConfig::new(1), Callbacks::new(None, Some(cooked)));
        let mut t = ctx.trace(&item([0.0, 0.0, 2.0], [0.0, 0.0, 1.0]));
        t.contributions.push(Contribution {
            modifier: 0,
            bin: 0,
            value: Spectrum::ONE,
        });
        ctx.cook(&mut t);
        assert_eq!(t.result.callback_status, 1);
        assert!(t.contributions.is_empty());
    }

    #[test]
    fn missing_bsdf_fails_only_that_ray() {
        let ctx = context(&SimulConfig::new(1), Callbacks::default());
        let t = ctx.trace(&item([5.0, 5.0, 5.0], [0.0, 0.0, -1.0]));
        assert!(matches!(t.result.status, RayStatus::Failed(_)));
        assert!(ctx.trace(&item([0.0, 0.0, 2.0], [0.0, 0.0, 1.0])).result.is_ok());
    }

    #[test]
    fn bsdf_materials_use_the_cache() {
        let scene = Arc::new(Scene::from_text(ROOM, &BuildOptions::default()).unwrap());
        let cache = Arc::new(BsdfCache::with_loader(|key: &str| -> Result<BsdfData, BsdfError> {
            Err(BsdfError::Unsupported(format!("no data for {}", key)))
        }));
        let ctx = TraceContext::new(scene, Arc::clone(&cache), &SimulConfig::new(1), Callbacks::default(), vec![]);
        ctx.trace(&item([5.0, 5.0, 5.0], [0.0, 0.0, -1.0]));
        ctx.trace(&item([5.0, 5.0, 5.0], [0.0, 0.0, -1.0]));
        assert_eq!(cache.load_count(), 2);
    }

    #[test]
    fn contributions_follow_modifier_hits() {
        let scene = Arc::new(Scene::from_text(ROOM, &BuildOptions::default()).unwrap());
        let acc = Accumulator::new(&SimulConfig::new(1));
        acc.register("sky_mat", BinSelector::expr("if(Dx, 1, 0)", "").unwrap(), 2, OutputTarget::None)
            .unwrap();
        let ctx = TraceContext::new(
            scene,
            Arc::new(BsdfCache::new()),
            &SimulConfig::new(1),
            Callbacks::default(),
            acc.modifiers(),
        );

        let t = ctx.trace(&item([3.0, -3.0, 2.0], [0.1, 0.0, 1.0]));
        assert_eq!(t.contributions.len(), 1);
        assert_eq!(t.contributions[0].bin, 1);
        assert_eq!(t.contributions[0].value, Spectrum::ONE);

        let floor = ctx.trace(&item([3.0, -3.0, 2.0], [0.0, 0.0, -1.0]));
        assert!(floor.contributions.is_empty());
    }
}
