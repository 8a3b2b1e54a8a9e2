//! Contribution Accumulator

use crate::config::*;
use crate::contrib::expr::*;
use crate::contrib::output::*;
use crate::error::SimulError;
use rcore::math::Float;
use rcore::spectrum::Spectrum;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Accumulated value and sample count of one bin.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Bin {
    /// Sum of contributions.
    pub sum: Spectrum,

    /// Number of contributions.
    pub count: u64,
}

impl Bin {
    /// Add one contribution.
    ///
    /// * `v` - The value.
    pub fn add(&mut self, v: Spectrum) {
        self.sum += v;
        self.count += 1;
    }

    /// Merge another bin.
    ///
    /// * `other` - The bin.
    pub fn merge(&mut self, other: &Bin) {
        self.sum += other.sum;
        self.count += other.count;
    }

    /// Take back a merged bin.
    ///
    /// * `other` - The bin.
    pub fn remove(&mut self, other: &Bin) {
        self.sum = self.sum - other.sum;
        self.count -= other.count.min(self.count);
    }
}

/// Selector closure.
pub type SelectorFn = dyn Fn(&RayVars) -> Float + Send + Sync;

/// Computes a bin value from the variables of a ray segment. The bin is
/// `floor(value + 0.5)`.
#[derive(Clone)]
pub enum BinSelector {
    Expr(Expr),
    Func(Arc<SelectorFn>),
}

impl BinSelector {
    /// Compile a selector expression.
    ///
    /// * `text`   - The expression.
    /// * `params` - Parameter assignments such as `MF=1,rNx=0`.
    pub fn expr(text: &str, params: &str) -> Result<Self, SimulError> {
        let params = parse_params(params)?;
        Ok(Self::Expr(Expr::compile(text, &params)?))
    }

    /// Returns a selector that always picks bin 0.
    pub fn single() -> Self {
        Self::Expr(Expr::Num(0.0))
    }

    /// Wrap a closure.
    ///
    /// * `f` - The closure.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&RayVars) -> Float + Send + Sync + 'static,
    {
        Self::Func(Arc::new(f))
    }

    /// Returns the selector value.
    ///
    /// * `vars` - Ray variables.
    pub fn value(&self, vars: &RayVars) -> Float {
        match self {
            Self::Expr(e) => e.eval(vars),
            Self::Func(f) => f(vars),
        }
    }

    /// Returns the bin for a segment, or `None` if it falls outside
    /// `0..bin_count`.
    ///
    /// * `vars`      - Ray variables.
    /// * `bin_count` - Number of bins.
    pub fn bin(&self, vars: &RayVars, bin_count: usize) -> Option<usize> {
        let b = (self.value(vars) + 0.5).floor();
        if b.is_finite() && b >= 0.0 && b < bin_count as Float {
            Some(b as usize)
        } else {
            None
        }
    }
}

impl fmt::Debug for BinSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(e) => f.debug_tuple("Expr").field(e).finish(),
            Self::Func(_) => write!(f, "Func"),
        }
    }
}

/// A contribution of one ray segment to one bin.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Contribution {
    /// Index of the modifier in registration order.
    pub modifier: usize,

    /// Bin index.
    pub bin: usize,

    /// Weighted value.
    pub value: Spectrum,
}

/// Bins and output of one modifier.
struct ModifierState {
    /// Totals since the last reset.
    totals: Vec<Bin>,

    /// Bins of the open row.
    row: Vec<Bin>,

    /// Finished rows not yet written, for buffered output.
    pending: Vec<Vec<Bin>>,

    output: Option<ContribOutput>,
}

/// A registered modifier.
pub struct Modifier {
    /// Name of the material whose hits contribute.
    pub name: String,

    /// Number of bins.
    pub bin_count: usize,

    /// Bin selector.
    pub selector: BinSelector,

    /// Normalized output path for file targets.
    path: Option<String>,

    state: Mutex<ModifierState>,
}

impl Modifier {
    /// Returns the bin for a segment.
    ///
    /// * `vars` - Ray variables.
    pub fn bin(&self, vars: &RayVars) -> Option<usize> {
        self.selector.bin(vars, self.bin_count)
    }
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modifier")
            .field("name", &self.name)
            .field("bin_count", &self.bin_count)
            .field("selector", &self.selector)
            .finish()
    }
}

/// Registered modifiers in registration order.
#[derive(Default)]
struct Registry {
    modifiers: Vec<Arc<Modifier>>,
    index: HashMap<String, usize>,
}

/// Committed rays grouped into output rows.
#[derive(Default)]
struct Rows {
    /// Rays committed to the open row.
    rays: usize,

    /// Rows closed so far.
    finished: u64,
}

/// Accumulates contributions per modifier and bin. Each modifier's bins are
/// guarded by their own lock so rays contributing to different modifiers do
/// not contend.
///
/// Committed rays are grouped into rows of `accum` rays. Each finished row
/// writes one record per bin of every modifier. With `accum` 0 a row spans
/// every ray committed between two flushes.
pub struct Accumulator {
    registry: RwLock<Registry>,
    config: SimulConfig,

    /// Locked before any modifier state.
    rows: Mutex<Rows>,

    /// First output failure since the last flush.
    output_error: Mutex<Option<std::io::Error>>,
}

impl Accumulator {
    /// Create an accumulator.
    ///
    /// * `config` - Output settings.
    pub fn new(config: &SimulConfig) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            config: config.clone(),
            rows: Mutex::new(Rows::default()),
            output_error: Mutex::new(None),
        }
    }

    /// Register a modifier and open its output.
    ///
    /// * `name`      - Material name.
    /// * `selector`  - Bin selector.
    /// * `bin_count` - Number of bins.
    /// * `target`    - Where records go.
    pub fn register(
        &self,
        name: &str,
        selector: BinSelector,
        bin_count: usize,
        target: OutputTarget,
    ) -> Result<usize, SimulError> {
        let invalid = |reason: &str| SimulError::InvalidModifier {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if name.is_empty() {
            return Err(invalid("empty name"));
        }
        if bin_count == 0 {
            return Err(invalid("bin count must be positive"));
        }

        let mut registry = self.registry.write();
        if registry.index.contains_key(name) {
            return Err(invalid("already registered"));
        }
        let path = match &target {
            OutputTarget::File(template) => {
                let path = normalized_path(&expand_template(template, name));
                let taken: HashSet<&str> = registry.modifiers.iter().filter_map(|m| m.path.as_deref()).collect();
                if taken.contains(path.as_str()) {
                    return Err(invalid(&format!("output '{}' is used by another modifier", path)));
                }
                Some(path)
            }
            _ => None,
        };

        let output = ContribOutput::open(target, name, bin_count, &self.config)?;
        let id = registry.modifiers.len();
        registry.modifiers.push(Arc::new(Modifier {
            name: name.to_string(),
            bin_count,
            selector,
            path,
            state: Mutex::new(ModifierState {
                totals: vec![Bin::default(); bin_count],
                row: vec![Bin::default(); bin_count],
                pending: vec![],
                output,
            }),
        }));
        registry.index.insert(name.to_string(), id);
        info!("Registered modifier '{}' with {} bins", name, bin_count);
        Ok(id)
    }

    /// Register every modifier named in a file. Names are separated by
    /// white space and share the selector, bin count and output template.
    /// Returns the modifier indices in file order.
    ///
    /// * `path`      - The modifier file.
    /// * `selector`  - Bin selector.
    /// * `bin_count` - Number of bins.
    /// * `template`  - Output path template; `%s` is replaced by each name.
    pub fn register_from_file(
        &self,
        path: &str,
        selector: &BinSelector,
        bin_count: usize,
        template: Option<&str>,
    ) -> Result<Vec<usize>, SimulError> {
        let invalid = |reason: String| SimulError::InvalidModifier {
            name: path.to_string(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| invalid(format!("unable to read modifier file. {}", e)))?;
        let names: Vec<&str> = text.split_whitespace().collect();
        if names.is_empty() {
            return Err(invalid(String::from("no modifier names in file")));
        }

        let ids = names
            .iter()
            .map(|name| {
                let target = template.map_or(OutputTarget::None, |t| OutputTarget::File(t.to_string()));
                self.register(name, selector.clone(), bin_count, target)
            })
            .collect::<Result<Vec<usize>, SimulError>>()?;
        debug!("Registered {} modifiers from '{}'", ids.len(), path);
        Ok(ids)
    }

    /// Returns the registered modifiers in registration order.
    pub fn modifiers(&self) -> Vec<Arc<Modifier>> {
        self.registry.read().modifiers.clone()
    }

    /// Returns the index of a modifier.
    ///
    /// * `name` - Modifier name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.registry.read().index.get(name).copied()
    }

    /// Returns the number of modifiers.
    pub fn len(&self) -> usize {
        self.registry.read().modifiers.len()
    }

    /// Returns true if no modifier is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a segment's value to the bin its selector picks. Returns the bin,
    /// or `None` if the selector picked no bin.
    ///
    /// * `name`  - Modifier name.
    /// * `vars`  - Ray variables.
    /// * `value` - Weighted value.
    pub fn accumulate(&self, name: &str, vars: &RayVars, value: Spectrum) -> Result<Option<usize>, SimulError> {
        let (id, modifier) = {
            let registry = self.registry.read();
            let id = registry.index.get(name).copied().ok_or_else(|| SimulError::InvalidModifier {
                name: name.to_string(),
                reason: String::from("not registered"),
            })?;
            (id, Arc::clone(&registry.modifiers[id]))
        };
        let bin = modifier.bin(vars);
        if let Some(bin) = bin {
            self.commit(&[Contribution {
                modifier: id,
                bin,
                value,
            }]);
        }
        Ok(bin)
    }

    /// Add the contributions of one ray and count it towards the open row.
    /// A ray without contributions still counts.
    ///
    /// * `contributions` - The contributions.
    pub fn commit(&self, contributions: &[Contribution]) {
        let mut rows = self.rows.lock();
        let modifiers = self.modifiers();

        let mut per_modifier: BTreeMap<usize, Vec<&Contribution>> = BTreeMap::new();
        for c in contributions {
            per_modifier.entry(c.modifier).or_default().push(c);
        }
        for (id, group) in per_modifier {
            let modifier = match modifiers.get(id) {
                Some(m) => m,
                None => continue,
            };
            let mut state = modifier.state.lock();
            for c in group {
                if c.bin < modifier.bin_count {
                    state.totals[c.bin].add(c.value);
                    state.row[c.bin].add(c.value);
                }
            }
        }

        rows.rays += 1;
        if self.config.accum > 0 && rows.rays >= self.config.accum {
            self.end_row(&mut rows, &modifiers);
        }
    }

    /// Close the open row. Write-through outputs get its records at once;
    /// buffered outputs keep them until the next flush.
    fn end_row(&self, rows: &mut Rows, modifiers: &[Arc<Modifier>]) {
        for modifier in modifiers {
            let mut guard = modifier.state.lock();
            let state = &mut *guard;
            let row = std::mem::replace(&mut state.row, vec![Bin::default(); modifier.bin_count]);
            if let Some(out) = state.output.as_mut() {
                match self.config.output_policy {
                    OutputPolicy::WriteThrough => {
                        if let Err(e) = write_row(out, &row).and_then(|_| out.flush()) {
                            self.record_error(&modifier.name, e);
                        }
                    }
                    OutputPolicy::Buffered => state.pending.push(row),
                }
            }
        }
        rows.rays = 0;
        rows.finished += 1;
        trace!("Finished row {}", rows.finished);
    }

    /// Returns the number of rows that received a committed ray, including
    /// the open row.
    pub fn row_count(&self) -> u64 {
        let rows = self.rows.lock();
        rows.finished + u64::from(rows.rays > 0)
    }

    /// Returns the number of finished rows.
    pub fn rows_finished(&self) -> u64 {
        self.rows.lock().finished
    }

    /// Returns the number of rays committed to the open row.
    pub fn rays_in_row(&self) -> usize {
        self.rows.lock().rays
    }

    /// Drop the open row. Its rays are taken back out of the totals so the
    /// row can be traced again.
    pub fn reset_row(&self) {
        let mut rows = self.rows.lock();
        for modifier in self.modifiers() {
            let mut guard = modifier.state.lock();
            let state = &mut *guard;
            for (total, partial) in state.totals.iter_mut().zip(state.row.iter_mut()) {
                total.remove(partial);
                *partial = Bin::default();
            }
        }
        if rows.rays > 0 {
            debug!("Dropped open row with {} rays", rows.rays);
        }
        rows.rays = 0;
    }

    /// Returns the totals of every bin of a modifier.
    ///
    /// * `name` - Modifier name.
    pub fn snapshot(&self, name: &str) -> Option<Vec<Bin>> {
        let registry = self.registry.read();
        let id = *registry.index.get(name)?;
        let totals = registry.modifiers[id].state.lock().totals.clone();
        Some(totals)
    }

    /// Returns the path or description of a modifier's output stream.
    ///
    /// * `name` - Modifier name.
    pub fn output_label(&self, name: &str) -> Option<String> {
        let registry = self.registry.read();
        let id = *registry.index.get(name)?;
        let state = registry.modifiers[id].state.lock();
        state.output.as_ref().map(|o| o.label().to_string())
    }

    /// Write finished rows and flush every output. With `accum` 0 the open
    /// row is closed first. Reports the first output failure since the
    /// previous flush.
    pub fn flush(&self) -> Result<(), SimulError> {
        self.write_rows(self.config.accum == 0)
    }

    /// Close a partly filled row and flush. Called when no more rays will
    /// be committed.
    pub fn finish(&self) -> Result<(), SimulError> {
        self.write_rows(true)
    }

    fn write_rows(&self, close_open_row: bool) -> Result<(), SimulError> {
        let mut rows = self.rows.lock();
        let modifiers = self.modifiers();
        if close_open_row && rows.rays > 0 {
            self.end_row(&mut rows, &modifiers);
        }

        for modifier in modifiers.iter() {
            let mut guard = modifier.state.lock();
            let state = &mut *guard;
            let pending = std::mem::take(&mut state.pending);
            if let Some(out) = state.output.as_mut() {
                let written = pending
                    .iter()
                    .try_for_each(|row| write_row(out, row))
                    .and_then(|_| out.flush());
                match written {
                    Ok(()) => debug!("Flushed {} rows to {}", pending.len(), out.label()),
                    Err(e) => self.record_error(&modifier.name, e),
                }
            }
        }
        match self.output_error.lock().take() {
            Some(e) => Err(SimulError::Output(e)),
            None => Ok(()),
        }
    }

    /// Zero every bin. The open row and unwritten rows are dropped.
    pub fn reset(&self) {
        let mut rows = self.rows.lock();
        for modifier in self.modifiers() {
            let mut state = modifier.state.lock();
            state.totals.iter_mut().for_each(|b| *b = Bin::default());
            state.row.iter_mut().for_each(|b| *b = Bin::default());
            state.pending.clear();
        }
        rows.rays = 0;
    }

    /// Remove every modifier, closing their outputs.
    pub fn clear(&self) {
        let mut rows = self.rows.lock();
        let mut registry = self.registry.write();
        registry.modifiers.clear();
        registry.index.clear();
        rows.rays = 0;
    }

    fn record_error(&self, name: &str, e: SimulError) {
        error!("Writing output for '{}' failed. {}", name, e);
        let mut slot = self.output_error.lock();
        if slot.is_none() {
            let io = match e {
                SimulError::Output(io) => io,
                other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
            };
            *slot = Some(io);
        }
    }
}

/// Write one record per bin of a row.
fn write_row(out: &mut ContribOutput, row: &[Bin]) -> Result<(), SimulError> {
    row.iter().enumerate().try_for_each(|(bin, b)| out.write_record(bin, b))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rcore::geometry::Vector3f;

    fn up(z: Float) -> RayVars {
        RayVars {
            dir: Vector3f::new(0.0, 0.0, z),
            ..RayVars::default()
        }
    }

    #[test]
    fn selector_rounds_and_discards_out_of_range() {
        let s = BinSelector::expr("Dz * 3", "").unwrap();
        assert_eq!(s.bin(&up(0.0), 4), Some(0));
        assert_eq!(s.bin(&up(0.6), 4), Some(2));
        assert_eq!(s.bin(&up(1.0), 4), Some(3));
        assert_eq!(s.bin(&up(1.2), 4), None);
        assert_eq!(s.bin(&up(-0.5), 4), None);

        let nan = BinSelector::func(|_| Float::NAN);
        assert_eq!(nan.bin(&up(0.0), 4), None);
    }

    #[test]
    fn registration_rejects_duplicates() {
        let acc = Accumulator::new(&SimulConfig::new(1));
        acc.register("sky", BinSelector::single(), 1, OutputTarget::None).unwrap();
        assert!(matches!(
            acc.register("sky", BinSelector::single(), 1, OutputTarget::None),
            Err(SimulError::InvalidModifier { .. })
        ));
        assert!(acc.register("zero", BinSelector::single(), 0, OutputTarget::None).is_err());

        let dir = tempfile::tempdir().unwrap();
        let same = dir.path().join("out.txt").to_str().unwrap().to_string();
        acc.register("a", BinSelector::single(), 1, OutputTarget::File(same.clone())).unwrap();
        assert!(acc.register("b", BinSelector::single(), 1, OutputTarget::File(same)).is_err());
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn accumulate_and_snapshot() {
        let acc = Accumulator::new(&SimulConfig::new(1));
        acc.register("sky", BinSelector::expr("if(Dz, 1, 0)", "").unwrap(), 2, OutputTarget::None)
            .unwrap();
        assert_eq!(acc.accumulate("sky", &up(1.0), Spectrum::new(2.0)).unwrap(), Some(1));
        assert_eq!(acc.accumulate("sky", &up(1.0), Spectrum::new(1.0)).unwrap(), Some(1));
        assert_eq!(acc.accumulate("sky", &up(-1.0), Spectrum::new(5.0)).unwrap(), Some(0));
        assert!(acc.accumulate("nope", &up(1.0), Spectrum::ONE).is_err());

        let bins = acc.snapshot("sky").unwrap();
        assert_eq!(bins[1].sum, Spectrum::new(3.0));
        assert_eq!(bins[1].count, 2);
        assert_eq!(bins[0].count, 1);

        acc.reset();
        assert!(acc.snapshot("sky").unwrap().iter().all(|b| b.count == 0));
        acc.clear();
        assert!(acc.snapshot("sky").is_none());
    }

    #[test]
    fn buffered_rows_are_written_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("%s.txt").to_str().unwrap().to_string();
        let acc = Accumulator::new(&SimulConfig::new(1));
        acc.register("m", BinSelector::single(), 1, OutputTarget::File(template.clone()))
            .unwrap();
        let path = expand_template(&template, "m");

        acc.accumulate("m", &up(1.0), Spectrum::new(1.0)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        acc.flush().unwrap();
        acc.accumulate("m", &up(1.0), Spectrum::new(2.0)).unwrap();
        acc.flush().unwrap();
        acc.flush().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("\t1") && lines[1].ends_with("\t1"));
        assert_eq!(acc.snapshot("m").unwrap()[0].count, 2);
    }

    #[test]
    fn write_through_output_writes_per_commit() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("%s.txt").to_str().unwrap().to_string();
        let config = SimulConfig::new(1).output_policy(OutputPolicy::WriteThrough);
        let acc = Accumulator::new(&config);
        acc.register("m", BinSelector::single(), 1, OutputTarget::File(template.clone()))
            .unwrap();

        acc.commit(&[
            Contribution {
                modifier: 0,
                bin: 0,
                value: Spectrum::new(1.0),
            },
            Contribution {
                modifier: 0,
                bin: 0,
                value: Spectrum::new(1.0),
            },
        ]);
        let text = std::fs::read_to_string(expand_template(&template, "m")).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.trim_end().ends_with("\t2"));
    }

    #[test]
    fn rows_span_accum_rays() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("%s.txt").to_str().unwrap().to_string();
        let acc = Accumulator::new(&SimulConfig::new(1).accum(3));
        acc.register("m", BinSelector::expr("if(Dz, 1, 0)", "").unwrap(), 2, OutputTarget::File(template.clone()))
            .unwrap();

        for z in [1.0, -1.0, 1.0, 1.0] {
            acc.accumulate("m", &up(z), Spectrum::new(1.0)).unwrap();
        }
        acc.commit(&[]);
        assert_eq!(acc.rows_finished(), 1);
        assert_eq!(acc.row_count(), 2);
        assert_eq!(acc.rays_in_row(), 2);

        acc.flush().unwrap();
        let path = expand_template(&template, "m");
        let text = std::fs::read_to_string(&path).unwrap();
        let counts: Vec<&str> = text.lines().map(|l| l.rsplit('\t').next().unwrap()).collect();
        assert_eq!(counts, vec!["1", "2"]);

        acc.finish().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let counts: Vec<&str> = text.lines().map(|l| l.rsplit('\t').next().unwrap()).collect();
        assert_eq!(counts, vec!["1", "2", "0", "1"]);
        assert_eq!(acc.rows_finished(), 2);
        assert_eq!(acc.snapshot("m").unwrap()[1].count, 3);
    }

    #[test]
    fn zero_accum_closes_rows_on_flush() {
        let acc = Accumulator::new(&SimulConfig::new(1).accum(0));
        let (writer, bytes) = shared_writer();
        acc.register("m", BinSelector::single(), 1, OutputTarget::Writer(writer)).unwrap();
        for _ in 0..5 {
            acc.accumulate("m", &up(1.0), Spectrum::new(0.5)).unwrap();
        }
        assert_eq!(acc.rows_finished(), 0);
        acc.flush().unwrap();
        acc.flush().unwrap();
        assert_eq!(acc.rows_finished(), 1);

        let text = String::from_utf8(bytes.lock().clone()).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.trim_end().ends_with("\t5"));
    }

    #[test]
    fn reset_row_takes_back_the_open_row() {
        let acc = Accumulator::new(&SimulConfig::new(1).accum(2));
        acc.register("m", BinSelector::single(), 1, OutputTarget::None).unwrap();
        acc.accumulate("m", &up(1.0), Spectrum::new(1.0)).unwrap();
        acc.accumulate("m", &up(1.0), Spectrum::new(1.0)).unwrap();
        acc.accumulate("m", &up(1.0), Spectrum::new(4.0)).unwrap();
        assert_eq!(acc.row_count(), 2);

        acc.reset_row();
        assert_eq!(acc.row_count(), 1);
        assert_eq!(acc.rays_in_row(), 0);
        let bins = acc.snapshot("m").unwrap();
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[0].sum, Spectrum::new(2.0));
    }

    #[test]
    fn modifier_files_register_every_name() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("mods.txt");
        std::fs::write(&list, "sky ground\nwall\n\n").unwrap();
        let template = dir.path().join("%s.dat").to_str().unwrap().to_string();

        let acc = Accumulator::new(&SimulConfig::new(1));
        let ids = acc
            .register_from_file(list.to_str().unwrap(), &BinSelector::single(), 2, Some(&template))
            .unwrap();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(acc.find("wall"), Some(2));
        assert_eq!(acc.output_label("ground"), Some(expand_template(&template, "ground")));
        assert!(acc.modifiers().iter().all(|m| m.bin_count == 2));

        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, " \n").unwrap();
        assert!(acc.register_from_file(empty.to_str().unwrap(), &BinSelector::single(), 1, None).is_err());
        assert!(acc.register_from_file("/no/such/file", &BinSelector::single(), 1, None).is_err());

        let single = dir.path().join("one.dat").to_str().unwrap().to_string();
        let acc = Accumulator::new(&SimulConfig::new(1));
        assert!(acc
            .register_from_file(list.to_str().unwrap(), &BinSelector::single(), 1, Some(&single))
            .is_err());
    }

    /// A writer whose bytes stay readable after the accumulator drops it.
    fn shared_writer() -> (Box<dyn std::io::Write + Send>, Arc<Mutex<Vec<u8>>>) {
        struct Shared(Arc<Mutex<Vec<u8>>>);
        impl std::io::Write for Shared {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let bytes = Arc::new(Mutex::new(vec![]));
        (Box::new(Shared(Arc::clone(&bytes))), bytes)
    }
}
