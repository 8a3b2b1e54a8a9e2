//! Contribution Output

use crate::config::*;
use crate::contrib::accumulator::Bin;
use crate::error::SimulError;
use rcore::binio::{BinaryError, BinaryWriter};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::Path;

/// First line of a header block.
pub const HEADER_MAGIC: &str = "#?RADSIM";

/// Where a modifier's records go.
pub enum OutputTarget {
    /// Records are not written; bins are still accumulated.
    None,

    /// A file path. `%s` is replaced by the modifier name.
    File(String),

    /// Any writer.
    Writer(Box<dyn Write + Send>),
}

impl fmt::Debug for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::File(path) => write!(f, "File({:?})", path),
            Self::Writer(_) => write!(f, "Writer"),
        }
    }
}

/// Returns the path for a modifier from a file template.
///
/// * `template` - Path template; `%s` is replaced by the modifier name.
/// * `modifier` - Modifier name.
pub fn expand_template(template: &str, modifier: &str) -> String {
    template.replace("%s", modifier)
}

/// An open record stream for one modifier.
pub struct ContribOutput {
    /// Description used in messages.
    label: String,

    out: Box<dyn Write + Send>,
    format: DataFormat,
}

impl ContribOutput {
    /// Open the stream for a modifier and write the header block if one is
    /// configured. Returns `None` for `OutputTarget::None`.
    ///
    /// * `target`   - Where records go.
    /// * `modifier` - Modifier name.
    /// * `bins`     - Number of bins.
    /// * `config`   - Output settings.
    pub fn open(
        target: OutputTarget,
        modifier: &str,
        bins: usize,
        config: &SimulConfig,
    ) -> Result<Option<Self>, SimulError> {
        let (label, out, header): (String, Box<dyn Write + Send>, bool) = match target {
            OutputTarget::None => return Ok(None),
            OutputTarget::Writer(w) => (format!("<{}>", modifier), w, config.header),
            OutputTarget::File(template) => {
                let path = expand_template(&template, modifier);
                let (file, fresh) = open_output_file(&path, config.output_op)?;
                debug!("Opened '{}' for modifier '{}'", path, modifier);
                (path, Box::new(BufWriter::new(file)), config.header && fresh)
            }
        };

        let mut output = Self {
            label,
            out,
            format: config.data_format,
        };
        if header {
            output.write_header(modifier, bins, &config.header_lines)?;
        }
        Ok(Some(output))
    }

    /// Returns the path or a description of the stream.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn write_header(&mut self, modifier: &str, bins: usize, lines: &[String]) -> Result<(), SimulError> {
        writeln!(self.out, "{}", HEADER_MAGIC)?;
        writeln!(self.out, "MODIFIER={}", modifier)?;
        writeln!(self.out, "BINS={}", bins)?;
        writeln!(self.out, "FORMAT={}", self.format.name())?;
        for line in lines {
            writeln!(self.out, "{}", line)?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    /// Write one record.
    ///
    /// * `index` - Bin index.
    /// * `bin`   - Accumulated value and count.
    pub fn write_record(&mut self, index: usize, bin: &Bin) -> Result<(), SimulError> {
        let v = &bin.sum;
        match self.format {
            DataFormat::Ascii => {
                writeln!(self.out, "{}\t{:e} {:e} {:e}\t{}", index, v[0], v[1], v[2], bin.count)?;
            }
            DataFormat::Float => {
                self.out.write_u32_le(index as u32).map_err(binary_io)?;
                for c in 0..3 {
                    self.out.write_f32_le(v[c]).map_err(binary_io)?;
                }
                self.out.write_u64_le(bin.count).map_err(binary_io)?;
            }
            DataFormat::Double => {
                self.out.write_u32_le(index as u32).map_err(binary_io)?;
                for c in 0..3 {
                    self.out.write_f64_le(v[c]).map_err(binary_io)?;
                }
                self.out.write_u64_le(bin.count).map_err(binary_io)?;
            }
        }
        Ok(())
    }

    /// Flush buffered records.
    pub fn flush(&mut self) -> Result<(), SimulError> {
        Ok(self.out.flush()?)
    }
}

/// Opens an output file. Returns the file and whether it is empty.
fn open_output_file(path: &str, op: OutputOp) -> Result<(File, bool), SimulError> {
    let mut options = OpenOptions::new();
    match op {
        OutputOp::New => options.write(true).create_new(true),
        OutputOp::Force => options.write(true).create(true).truncate(true),
        OutputOp::Recover => options.append(true).create(true),
    };
    let file = options.open(path).map_err(|e| {
        let reason = match e.kind() {
            ErrorKind::AlreadyExists => String::from("exists; use force or recover"),
            _ => e.to_string(),
        };
        io::Error::new(e.kind(), format!("cannot open '{}'. {}", path, reason))
    })?;
    let fresh = file.metadata().map(|m| m.len() == 0).unwrap_or(true);
    Ok((file, fresh))
}

/// Returns the canonical form of an output path for comparing targets.
///
/// * `path` - The path.
pub fn normalized_path(path: &str) -> String {
    let p = Path::new(path);
    let parent = match p.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), p.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name).to_string_lossy().into_owned(),
        _ => path.to_string(),
    }
}

fn binary_io(e: BinaryError) -> io::Error {
    match e {
        BinaryError::Io(e) => e,
        other => io::Error::new(ErrorKind::Other, other.to_string()),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
