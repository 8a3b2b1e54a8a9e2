//! Command Line Options

use clap::{Args, Parser, Subcommand};
use rcore::math::Float;
use scene::{BuildOptions, DEFAULT_MAX_DEPTH, DEFAULT_MAX_LEAF};
use simul::*;

/// Ray tracing simulation front-end.
#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Options {
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Clone)]
pub enum Command {
    /// Compile scene descriptions into an octree file.
    Compile {
        /// Scene description files.
        #[arg(required = true, value_name = "FILE")]
        paths: Vec<String>,

        /// Output octree file.
        #[arg(long = "output", short = 'o', value_name = "FILE")]
        output: String,

        /// Maximum octree depth.
        #[arg(long = "max-depth", value_name = "NUM", default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,

        /// Maximum number of objects in a leaf before it is split.
        #[arg(long = "leaf-size", value_name = "NUM", default_value_t = DEFAULT_MAX_LEAF)]
        leaf_size: usize,
    },

    /// Trace rays read from standard input and print their values.
    Trace {
        #[command(flatten)]
        run: RunOptions,
    },

    /// Accumulate contributions of rays read from standard input.
    Contrib {
        #[command(flatten)]
        run: RunOptions,

        /// Modifier as `name[:bins[:expression]]`.
        #[arg(
            long = "modifier",
            short = 'm',
            value_name = "SPEC",
            required_unless_present = "modifier_files"
        )]
        modifiers: Vec<String>,

        /// File of modifier names as `path[:bins[:expression]]`; every name
        /// shares the bins and expression.
        #[arg(long = "modifier-file", short = 'M', value_name = "SPEC")]
        modifier_files: Vec<String>,

        /// Rays per output row; 0 writes one row per flush.
        #[arg(long = "accum", short = 'c', value_name = "NUM", default_value_t = 1)]
        accum: usize,

        /// Parameter assignments for bin expressions, e.g. `MF=1,rNx=0`.
        #[arg(long = "params", short = 'p', value_name = "LIST", default_value = "")]
        params: String,

        /// Output path; `%s` is replaced by the modifier name.
        #[arg(long = "output", short = 'o', value_name = "FILE", default_value = "%s.dat")]
        output: String,

        /// Record format: a (ascii), f (float) or d (double).
        #[arg(long = "format", short = 'f', value_name = "FMT", default_value = "a")]
        format: String,

        /// Write a header block to new outputs.
        #[arg(long)]
        header: bool,

        /// Truncate existing outputs.
        #[arg(long, conflicts_with = "recover")]
        force: bool,

        /// Append to existing outputs.
        #[arg(long)]
        recover: bool,

        /// Write records after every ray instead of on flush.
        #[arg(long = "write-through")]
        write_through: bool,
    },
}

/// Options shared by the tracing subcommands.
#[derive(Args, Clone)]
pub struct RunOptions {
    /// Octree file.
    #[arg(value_name = "OCTREE")]
    pub octree: String,

    /// Number of threads; 0 traces on the main thread.
    #[arg(long = "nthreads", short = 't', value_name = "NUM")]
    pub n_threads: Option<usize>,

    /// Ray queue bound.
    #[arg(long = "queue", short = 'q', value_name = "NUM", default_value_t = 1024)]
    pub queue: usize,

    /// Report values in input order from the callbacks.
    #[arg(long)]
    pub fifo: bool,

    /// Trace shadow rays to light sources.
    #[arg(long)]
    pub sources: bool,

    /// Compute irradiance at the first hit.
    #[arg(long)]
    pub irradiance: bool,

    /// Maximum number of reflections.
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,

    /// Minimum ray weight.
    #[arg(long, value_name = "FLOAT")]
    pub weight: Option<Float>,

    /// Ambient value.
    #[arg(long, value_name = "FLOAT")]
    pub ambient: Option<Float>,
}

impl RunOptions {
    /// Returns the number of threads to use.
    pub fn threads(&self) -> usize {
        let max_threads = num_cpus::get();
        match self.n_threads {
            None => max_threads,
            Some(n) if n > max_threads => {
                warn!("Num threads > max logical CPUs {}", max_threads);
                max_threads
            }
            Some(n) => n,
        }
    }

    /// Returns the manager configuration.
    ///
    /// * `mode` - Trace or contribution mode.
    pub fn config(&self, mode: SimulMode) -> SimulConfig {
        let mut flags = RtFlags::empty();
        flags.set(RtFlags::DO_FIFO, self.fifo);
        flags.set(RtFlags::TRACE_SOURCES, self.sources);
        flags.set(RtFlags::IMM_IRRAD, self.irradiance);

        let defaults = RayParams::default();
        let params = RayParams {
            max_depth: self.depth.unwrap_or(defaults.max_depth),
            min_weight: self.weight.unwrap_or(defaults.min_weight),
            ambient: self.ambient.unwrap_or(defaults.ambient),
        };

        SimulConfig::new(self.queue)
            .threads(self.threads())
            .mode(mode)
            .flags(flags)
            .params(params)
    }
}

/// Returns octree build options.
///
/// * `max_depth` - Maximum depth.
/// * `leaf_size` - Maximum objects per leaf.
pub fn build_options(max_depth: usize, leaf_size: usize) -> BuildOptions {
    BuildOptions {
        max_depth,
        max_leaf: leaf_size,
    }
}

/// A parsed `name[:bins[:expression]]` modifier. For modifier files the
/// name is the file path.
#[derive(Clone, Debug, PartialEq)]
pub struct ModifierSpec {
    pub name: String,
    pub bins: usize,
    pub expr: String,
}

impl ModifierSpec {
    /// Parse a modifier argument. A missing bin count is 1 and a missing
    /// expression selects bin 0.
    ///
    /// * `s` - The argument.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut parts = s.splitn(3, ':');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(format!("missing modifier name in '{}'", s));
        }
        let bins = match parts.next() {
            Some(b) => b
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid bin count in '{}'", s))?,
            None => 1,
        };
        let expr = parts.next().map_or("0", str::trim);
        Ok(Self {
            name: name.to_string(),
            bins,
            expr: expr.to_string(),
        })
    }
}

/// Returns the record format for a format letter.
///
/// * `s` - `a`, `f` or `d`.
pub fn data_format(s: &str) -> Result<DataFormat, String> {
    match s {
        "a" => Ok(DataFormat::Ascii),
        "f" => Ok(DataFormat::Float),
        "d" => Ok(DataFormat::Double),
        _ => Err(format!("unknown format '{}'", s)),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_specs() {
        assert_eq!(
            ModifierSpec::parse("sky:4:if(Dz, 1, 0)").unwrap(),
            ModifierSpec {
                name: String::from("sky"),
                bins: 4,
                expr: String::from("if(Dz, 1, 0)"),
            }
        );
        let ground = ModifierSpec::parse("ground").unwrap();
        assert_eq!((ground.bins, ground.expr.as_str()), (1, "0"));
        assert!(ModifierSpec::parse(":4").is_err());
        assert!(ModifierSpec::parse("sky:many").is_err());
    }

    #[test]
    fn contrib_command_line() {
        let o = Options::try_parse_from([
            "radsim", "contrib", "a.oct", "-m", "sky:4", "-m", "ground", "-t", "0", "-f", "d", "--force",
        ])
        .unwrap();
        match o.command {
            Command::Contrib {
                run,
                modifiers,
                format,
                force,
                accum,
                ..
            } => {
                assert_eq!(run.octree, "a.oct");
                assert_eq!(run.threads(), 0);
                assert_eq!(modifiers, vec!["sky:4", "ground"]);
                assert_eq!(data_format(&format).unwrap(), DataFormat::Double);
                assert!(force);
                assert_eq!(accum, 1);
            }
            _ => panic!("expected contrib"),
        }
    }

    #[test]
    fn modifier_files_stand_in_for_modifiers() {
        let o = Options::try_parse_from(["radsim", "contrib", "a.oct", "-M", "mods.txt:4:Dz", "-c", "10"]).unwrap();
        match o.command {
            Command::Contrib {
                modifiers,
                modifier_files,
                accum,
                ..
            } => {
                assert!(modifiers.is_empty());
                assert_eq!(modifier_files, vec!["mods.txt:4:Dz"]);
                assert_eq!(ModifierSpec::parse(&modifier_files[0]).unwrap().bins, 4);
                assert_eq!(accum, 10);
            }
            _ => panic!("expected contrib"),
        }
        assert!(Options::try_parse_from(["radsim", "contrib", "a.oct"]).is_err());
    }

    #[test]
    fn trace_flags_map_to_config() {
        let o = Options::try_parse_from(["radsim", "trace", "a.oct", "--sources", "--depth", "2", "-q", "16"]).unwrap();
        match o.command {
            Command::Trace { run } => {
                let config = run.config(SimulMode::Trace);
                assert_eq!(config.queue_capacity, 16);
                assert_eq!(config.params.max_depth, 2);
                assert!(config.flags.contains(RtFlags::TRACE_SOURCES));
                assert!(!config.flags.contains(RtFlags::DO_FIFO));
            }
            _ => panic!("expected trace"),
        }
    }
}
