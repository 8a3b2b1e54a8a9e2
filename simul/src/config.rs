//! Configuration

use bitflags::bitflags;
use rcore::math::Float;

bitflags! {
    /// Ray tracing flags. There is no distance limit flag; a ray carries its
    /// own limit in `RayInput::max_dist`.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RtFlags: u8 {
        /// Issue cooked callbacks in submission order.
        const DO_FIFO = 0b001;

        /// Trace shadow rays to light sources.
        const TRACE_SOURCES = 0b010;

        /// Return irradiance at the first hit instead of radiance.
        const IMM_IRRAD = 0b100;
    }
}

/// Per-manager ray parameters shared by its workers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayParams {
    /// Maximum number of reflections and transmissions after the primary ray.
    pub max_depth: usize,

    /// Child rays with a lower weight are not traced.
    pub min_weight: Float,

    /// Constant ambient radiance.
    pub ambient: Float,
}

impl Default for RayParams {
    fn default() -> Self {
        Self {
            max_depth: 8,
            min_weight: 2e-3,
            ambient: 0.0,
        }
    }
}

/// What the manager does with traced rays.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SimulMode {
    /// Results are returned in submission order.
    Trace,

    /// Results are also accumulated into modifier bins.
    Contrib,
}

/// What `load_octree` does when a scene is already loaded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScenePolicy {
    /// Fail.
    Reject,

    /// Replace the scene, unless rays are being traced.
    Replace,
}

/// When contribution records are written.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Finished rows are written on `flush`.
    Buffered,

    /// Each row is written and flushed as soon as it is finished.
    WriteThrough,
}

/// How contribution output files are opened.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputOp {
    /// Fail if the file exists.
    New,

    /// Truncate an existing file.
    Force,

    /// Append to an existing file without repeating the header.
    Recover,
}

/// Contribution record format.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataFormat {
    /// Text lines `bin<TAB>r g b<TAB>count`.
    Ascii,

    /// Little endian `u32` bin, three `f32` values and a `u64` count.
    Float,

    /// Little endian `u32` bin, three `f64` values and a `u64` count.
    Double,
}

impl DataFormat {
    /// Returns the name written to output headers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Float => "float",
            Self::Double => "double",
        }
    }
}

/// Simulation manager configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulConfig {
    /// Bound of the ray queue.
    pub queue_capacity: usize,

    /// Initial number of worker threads; 0 traces on the calling thread.
    pub threads: usize,

    /// Trace or contribution mode.
    pub mode: SimulMode,

    /// Ray tracing flags.
    pub flags: RtFlags,

    /// Ray parameters.
    pub params: RayParams,

    /// Behaviour of a second `load_octree`.
    pub scene_policy: ScenePolicy,

    /// When contribution records are written.
    pub output_policy: OutputPolicy,

    /// How contribution output files are opened.
    pub output_op: OutputOp,

    /// Contribution record format.
    pub data_format: DataFormat,

    /// Committed rays per output row; 0 closes a row on every flush.
    pub accum: usize,

    /// Write a header block to new contribution outputs.
    pub header: bool,

    /// Additional header lines.
    pub header_lines: Vec<String>,

    /// Retain results for `take_results()`.
    pub keep_results: bool,
}

impl SimulConfig {
    /// Returns a trace mode configuration with the given queue bound.
    ///
    /// * `queue_capacity` - Bound of the ray queue.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            threads: 0,
            mode: SimulMode::Trace,
            flags: RtFlags::empty(),
            params: RayParams::default(),
            scene_policy: ScenePolicy::Reject,
            output_policy: OutputPolicy::Buffered,
            output_op: OutputOp::New,
            data_format: DataFormat::Ascii,
            accum: 1,
            header: false,
            header_lines: vec![],
            keep_results: true,
        }
    }

    /// Set the initial number of worker threads.
    ///
    /// * `threads` - Number of threads.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the mode.
    ///
    /// * `mode` - The mode.
    pub fn mode(mut self, mode: SimulMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the ray tracing flags.
    ///
    /// * `flags` - The flags.
    pub fn flags(mut self, flags: RtFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the ray parameters.
    ///
    /// * `params` - The parameters.
    pub fn params(mut self, params: RayParams) -> Self {
        self.params = params;
        self
    }

    /// Set the behaviour of a second `load_octree`.
    ///
    /// * `policy` - The policy.
    pub fn scene_policy(mut self, policy: ScenePolicy) -> Self {
        self.scene_policy = policy;
        self
    }

    /// Set when contribution records are written.
    ///
    /// * `policy` - The policy.
    pub fn output_policy(mut self, policy: OutputPolicy) -> Self {
        self.output_policy = policy;
        self
    }

    /// Set how contribution output files are opened.
    ///
    /// * `op` - The operation.
    pub fn output_op(mut self, op: OutputOp) -> Self {
        self.output_op = op;
        self
    }

    /// Set the contribution record format.
    ///
    /// * `format` - The format.
    pub fn data_format(mut self, format: DataFormat) -> Self {
        self.data_format = format;
        self
    }

    /// Set the number of committed rays per output row.
    ///
    /// * `accum` - Rays per row; 0 closes a row on every flush.
    pub fn accum(mut self, accum: usize) -> Self {
        self.accum = accum;
        self
    }

    /// Enable the header block with additional lines.
    ///
    /// * `lines` - Additional header lines.
    pub fn header(mut self, lines: &[&str]) -> Self {
        self.header = true;
        self.header_lines = lines.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set whether results are retained for `take_results()`.
    ///
    /// * `keep` - Retain results.
    pub fn keep_results(mut self, keep: bool) -> Self {
        self.keep_results = keep;
        self
    }
}
