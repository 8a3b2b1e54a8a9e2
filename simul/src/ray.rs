//! Rays

use crate::error::SimulError;
use rcore::geometry::*;
use rcore::math::*;
use rcore::spectrum::Spectrum;
use scene::{Intersection, ObjId};
use std::fmt;

/// A ray submitted by the caller.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayInput {
    /// Origin.
    pub origin: Point3f,

    /// Direction; normalized before tracing.
    pub dir: Vector3f,

    /// Optional maximum distance.
    pub max_dist: Option<Float>,
}

impl RayInput {
    /// Create an unbounded ray.
    ///
    /// * `origin` - Origin.
    /// * `dir`    - Direction.
    pub fn new(origin: Point3f, dir: Vector3f) -> Self {
        Self {
            origin,
            dir,
            max_dist: None,
        }
    }

    /// Create a ray limited to a distance.
    ///
    /// * `origin`   - Origin.
    /// * `dir`      - Direction.
    /// * `max_dist` - Maximum distance.
    pub fn bounded(origin: Point3f, dir: Vector3f, max_dist: Float) -> Self {
        Self {
            origin,
            dir,
            max_dist: Some(max_dist),
        }
    }
}

impl From<[Float; 6]> for RayInput {
    fn from(v: [Float; 6]) -> Self {
        Self::new(Point3f::new(v[0], v[1], v[2]), Vector3f::new(v[3], v[4], v[5]))
    }
}

/// A queued ray. Consumed exactly once by one worker.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayWorkItem {
    /// Origin.
    pub origin: Point3f,

    /// Direction.
    pub dir: Vector3f,

    /// Optional maximum distance.
    pub max_dist: Option<Float>,

    /// Sequence number assigned at admission.
    pub seq: u64,

    /// Correlation id of the bundle the ray was submitted in.
    pub bundle: u64,
}

impl RayWorkItem {
    /// Create a work item.
    ///
    /// * `input`  - The submitted ray.
    /// * `seq`    - Sequence number.
    /// * `bundle` - Bundle correlation id.
    pub fn new(input: &RayInput, seq: u64, bundle: u64) -> Self {
        Self {
            origin: input.origin,
            dir: input.dir,
            max_dist: input.max_dist,
            seq,
            bundle,
        }
    }
}

/// Ray classification.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RayType {
    Primary,
    Reflected,
    Transmitted,
    Shadow,
}

/// Where a ray segment hit.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HitInfo {
    /// Surface or source that was hit.
    pub object: ObjId,

    /// Its material.
    pub material: ObjId,

    /// Hit point; the ray origin for distant sources.
    pub point: Point3f,

    /// Unit normal facing the ray origin.
    pub normal: Vector3f,

    /// True when the side the geometric normal points to was hit.
    pub front: bool,
}

impl From<&Intersection> for HitInfo {
    fn from(h: &Intersection) -> Self {
        Self {
            object: h.object,
            material: h.material,
            point: h.p,
            normal: h.n,
            front: h.front,
        }
    }
}

/// Outcome of tracing a ray.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RayStatus {
    Ok,
    Failed(String),
}

/// A traced ray segment.
#[derive(Clone, Debug, PartialEq)]
pub struct RayResult {
    /// Origin.
    pub origin: Point3f,

    /// Unit direction.
    pub dir: Vector3f,

    /// Radiance, or irradiance with `IMM_IRRAD`.
    pub value: Spectrum,

    /// Ray classification.
    pub ray_type: RayType,

    /// Sequence number of the primary ray.
    pub seq: u64,

    /// Correlation id of the primary ray's bundle.
    pub bundle: u64,

    /// Number of reflections and transmissions before this segment.
    pub depth: usize,

    /// Contribution of this segment to the primary ray's value.
    pub weight: Float,

    /// Distance to the hit; infinite for misses and distant sources.
    pub distance: Float,

    /// The hit, if any.
    pub hit: Option<HitInfo>,

    /// Whether the ray was evaluated.
    pub status: RayStatus,

    /// Non-zero status returned by a callback for this ray.
    pub callback_status: i32,
}

impl RayResult {
    /// Returns a failed primary result for a work item.
    ///
    /// * `item`   - The work item.
    /// * `reason` - Why it failed.
    pub fn failed(item: &RayWorkItem, reason: String) -> Self {
        Self {
            origin: item.origin,
            dir: item.dir,
            value: Spectrum::ZERO,
            ray_type: RayType::Primary,
            seq: item.seq,
            bundle: item.bundle,
            depth: 0,
            weight: 1.0,
            distance: INFINITY,
            hit: None,
            status: RayStatus::Failed(reason),
            callback_status: 0,
        }
    }

    /// Returns true if the ray was evaluated.
    pub fn is_ok(&self) -> bool {
        self.status == RayStatus::Ok
    }

    /// Returns the failure of a ray that could not be evaluated.
    pub fn error(&self) -> Option<SimulError> {
        match &self.status {
            RayStatus::Ok => None,
            RayStatus::Failed(reason) => Some(SimulError::TraceFailure(reason.clone())),
        }
    }
}

impl fmt::Display for RayResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {:?} o={} d={} value=[{}]", self.seq, self.ray_type, self.origin, self.dir, self.value)?;
        if let RayStatus::Failed(reason) = &self.status {
            write!(f, " failed: {}", reason)?;
        }
        Ok(())
    }
}

/// Counts of processed rays.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Rays evaluated.
    pub succeeded: u64,

    /// Rays that could not be evaluated.
    pub failed: u64,

    /// Rays discarded by a hard cleanup.
    pub discarded: u64,
}

impl RunSummary {
    /// Returns the number of results produced.
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} discarded",
            self.succeeded, self.failed, self.discarded
        )
    }
}
