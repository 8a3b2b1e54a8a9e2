#[macro_use]
extern crate log;

mod options;

use clap::Parser;
use rcore::fileutil::*;
use rcore::geometry::*;
use rcore::math::Float;
use options::*;
use scene::Scene;
use simul::*;
use std::io::{self, BufRead, BufWriter, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    // Initialize `env_logger`.
    env_logger::init();

    let result = match Options::parse().command {
        Command::Compile {
            paths,
            output,
            max_depth,
            leaf_size,
        } => compile(&paths, &output, max_depth, leaf_size),
        Command::Trace { run } => trace(&run),
        Command::Contrib {
            run,
            modifiers,
            modifier_files,
            accum,
            params,
            output,
            format,
            header,
            force,
            recover,
            write_through,
        } => {
            let op = if force {
                OutputOp::Force
            } else if recover {
                OutputOp::Recover
            } else {
                OutputOp::New
            };
            let policy = if write_through {
                OutputPolicy::WriteThrough
            } else {
                OutputPolicy::Buffered
            };
            data_format(&format).and_then(|format| {
                let mut config = run
                    .config(SimulMode::Contrib)
                    .output_op(op)
                    .output_policy(policy)
                    .data_format(format)
                    .accum(accum)
                    .keep_results(false);
                if header {
                    config = config.header(&[&format!("OCTREE={}", run.octree)]);
                }
                contrib(&run, config, &modifiers, &modifier_files, &params, &output)
            })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn compile(paths: &[String], output: &str, max_depth: usize, leaf_size: usize) -> Result<(), String> {
    let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
    let scene = Scene::compile(&paths, &build_options(max_depth, leaf_size)).map_err(|e| e.to_string())?;
    scene.save(output).map_err(|e| e.to_string())?;
    info!("Wrote '{}'", output);
    Ok(())
}

fn trace(run: &RunOptions) -> Result<(), String> {
    let manager = start(run, run.config(SimulMode::Trace))?;
    let mut out = BufWriter::new(io::stdout().lock());
    let failed = run_rays(&manager, run.queue, |manager| print_results(manager, &mut out));
    drop(out);
    finish(&manager, failed)
}

fn contrib(
    run: &RunOptions,
    config: SimulConfig,
    modifiers: &[String],
    modifier_files: &[String],
    params: &str,
    output: &str,
) -> Result<(), String> {
    let manager = start(run, config)?;
    for arg in modifiers {
        let spec = ModifierSpec::parse(arg)?;
        let selector = BinSelector::expr(&spec.expr, params).map_err(|e| e.to_string())?;
        manager
            .register_modifier(&spec.name, selector, spec.bins, OutputTarget::File(output.to_string()))
            .map_err(|e| e.to_string())?;
    }
    for arg in modifier_files {
        let spec = ModifierSpec::parse(arg)?;
        let selector = BinSelector::expr(&spec.expr, params).map_err(|e| e.to_string())?;
        let ids = manager
            .register_modifier_file(&spec.name, selector, spec.bins, Some(output))
            .map_err(|e| e.to_string())?;
        debug!("'{}' named {} modifiers", spec.name, ids.len());
    }

    let names = manager.modifier_names().map_err(|e| e.to_string())?;
    let failed = run_rays(&manager, run.queue, |_| Ok(()));
    for name in names.iter() {
        if let Ok(Some(label)) = manager.output(name) {
            info!("Modifier '{}' written to {}", name, label);
        }
    }
    finish(&manager, failed)
}

/// Create a manager with the octree loaded.
fn start(run: &RunOptions, config: SimulConfig) -> Result<SimulManager, String> {
    let path = absolute_path(&run.octree)?;
    let manager = SimulManager::new(config).map_err(|e| e.to_string())?;
    manager.load_octree(&path).map_err(|e| e.to_string())?;
    Ok(manager)
}

/// Trace rays from standard input in batches of `batch` rays, calling
/// `report` after each batch. Returns true if a line or a batch failed.
fn run_rays<F>(manager: &SimulManager, batch: usize, mut report: F) -> bool
where
    F: FnMut(&SimulManager) -> Result<(), String>,
{
    let mut failed = false;
    let mut rays = Vec::with_capacity(batch);
    let mut bundle = 0_u64;

    let mut submit = |rays: &mut Vec<RayInput>, bundle: &mut u64| -> bool {
        let ok = manager
            .enqueue(rays, *bundle)
            .map_err(|e| e.to_string())
            .and_then(|_| report(manager));
        rays.clear();
        *bundle += 1;
        match ok {
            Ok(()) => true,
            Err(e) => {
                error!("{e}");
                false
            }
        }
    };

    for (n, line) in io::stdin().lock().lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Unable to read input. {e}");
                failed = true;
                break;
            }
        };
        match parse_ray(&line) {
            Ok(Some(ray)) => rays.push(ray),
            Ok(None) => {}
            Err(e) => {
                error!("Line {}: {e}", n + 1);
                failed = true;
            }
        }
        if rays.len() >= batch.max(1) && !submit(&mut rays, &mut bundle) {
            return true;
        }
    }
    if !rays.is_empty() && !submit(&mut rays, &mut bundle) {
        return true;
    }
    failed
}

/// Flush, report and release the manager.
fn finish(manager: &SimulManager, failed: bool) -> Result<(), String> {
    let flushed = manager.flush().map_err(|e| e.to_string());
    let mut out = BufWriter::new(io::stdout().lock());
    print_results(manager, &mut out)?;
    let summary = manager.cleanup(false).map_err(|e| e.to_string())?;
    let summary = flushed.map(|_| summary)?;

    info!("Rays: {}", summary);
    if failed || summary.failed > 0 || summary.discarded > 0 {
        Err(format!("Not every ray was traced: {}", summary))
    } else {
        Ok(())
    }
}

fn print_results<W: Write>(manager: &SimulManager, out: &mut W) -> Result<(), String> {
    for r in manager.take_results().map_err(|e| e.to_string())? {
        if let Some(e) = r.error() {
            warn!("Ray #{}: {}", r.seq, e);
        }
        writeln!(out, "{:e}\t{:e}\t{:e}", r.value[0], r.value[1], r.value[2]).map_err(|e| e.to_string())?;
    }
    out.flush().map_err(|e| e.to_string())
}

/// Parse `ox oy oz dx dy dz [dmax]`. Blank lines and `#` comments yield
/// `None`.
fn parse_ray(line: &str) -> Result<Option<RayInput>, String> {
    let line = line.split('#').next().unwrap_or_default().trim();
    if line.is_empty() {
        return Ok(None);
    }
    let v = line
        .split_whitespace()
        .map(|s| s.parse::<Float>().map_err(|_| format!("invalid number '{}'", s)))
        .collect::<Result<Vec<Float>, String>>()?;
    match v[..] {
        [ox, oy, oz, dx, dy, dz] => Ok(Some(RayInput::new(Point3f::new(ox, oy, oz), Vector3f::new(dx, dy, dz)))),
        [ox, oy, oz, dx, dy, dz, dmax] => Ok(Some(RayInput::bounded(
            Point3f::new(ox, oy, oz),
            Vector3f::new(dx, dy, dz),
            dmax,
        ))),
        _ => Err(format!("expected 6 or 7 values, found {}", v.len())),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_lines() {
        let r = parse_ray("0 0 1  0 0 -1").unwrap().unwrap();
        assert_eq!(r.origin, Point3f::new(0.0, 0.0, 1.0));
        assert_eq!(r.dir, Vector3f::new(0.0, 0.0, -1.0));

        let r = parse_ray("1 2 3 1 0 0 5.5 # bounded").unwrap().unwrap();
        assert_eq!(r.max_dist, Some(5.5));

        assert!(parse_ray("   ").unwrap().is_none());
        assert!(parse_ray("# comment").unwrap().is_none());
        assert!(parse_ray("1 2 3").is_err());
        assert!(parse_ray("1").is_err());
        assert!(parse_ray("1 2 3 x 0 0").is_err());
    }
}
