#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use std::{
    path::PathBuf,
    sync::atomic::{ AtomicUsize, Ordering },
};
use clap::Parser;
use ndarray as nd;
use rayon::iter::{ IntoParallelIterator, ParallelIterator };
use tracing::warn;
use dressed_qed::{
    mkdir,
    write_npz,
    SolverConfig,
    solve,
};
use lib::systems::cavity_chain::*;

/// Scan the coupling constant α and record dressed frequencies and energies.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Solver settings (TOML); defaults are used for anything not set.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 0.0)]
    alpha_min: f64,

    #[arg(long, default_value_t = 0.2)]
    alpha_max: f64,

    #[arg(long, default_value_t = 41)]
    num: usize,

    /// Fixed scalar polarizability; λ follows the matter state if omitted.
    #[arg(long)]
    lambda: Option<f64>,

    /// Worker threads; rayon's default if omitted.
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, default_value = "output/coupling_scan")]
    outdir: PathBuf,
}

#[derive(Clone, Debug)]
struct Point {
    frequencies: Vec<f64>,
    energies: Vec<f64>,
    iterations: usize,
    converged: bool,
}

impl Point {
    fn failed() -> Self {
        Self {
            frequencies: vec![f64::NAN; N_MODES],
            energies: vec![f64::NAN; N_SITES],
            iterations: 0,
            converged: false,
        }
    }
}

fn main() -> anyhow::Result<()> {
    lib::init_logging();
    let args = Args::parse();
    if let Some(n) = args.threads {
        rayon::ThreadPoolBuilder::new().num_threads(n).build_global()?;
    }

    let config
        = match &args.config {
            Some(path) => SolverConfig::load(path)?,
            None => SolverConfig::default(),
        };
    let matter = matter()?;
    let photon = photon()?;
    let bare = matter.bare()?;
    let r0 = emitter(&photon);
    let alpha: nd::Array1<f64>
        = nd::Array1::linspace(args.alpha_min, args.alpha_max, args.num);

    let len = alpha.len();
    let progress = AtomicUsize::new(0);
    eprint!("  {} / {} ", 0, len);
    let points: Vec<Point>
        = alpha.to_vec().into_par_iter()
        .map(|a| {
            let coupling = coupling(a, args.lambda);
            let point
                = match solve(&matter, &photon, r0, &coupling, config) {
                    Ok(result) => Point {
                        frequencies: result.frequencies().to_vec(),
                        energies: result.energies().to_vec(),
                        iterations: result.passes.iter()
                            .map(|pass| pass.matter.iterations)
                            .sum(),
                        converged: result.converged(),
                    },
                    Err(err) => {
                        warn!(alpha = a, "solve failed: {err}");
                        Point::failed()
                    },
                };
            let k = progress.fetch_add(1, Ordering::SeqCst) + 1;
            eprint!("\r  {} / {} ", k, len);
            point
        })
        .collect();
    eprintln!();

    let frequencies: nd::Array2<f64>
        = nd::Array2::from_shape_fn((len, N_MODES), |(i, n)| points[i].frequencies[n]);
    let energies: nd::Array2<f64>
        = nd::Array2::from_shape_fn((len, N_SITES), |(i, b)| points[i].energies[b]);
    let iterations: nd::Array1<u32>
        = points.iter().map(|p| p.iterations as u32).collect();
    let converged: nd::Array1<u8>
        = points.iter().map(|p| u8::from(p.converged)).collect();

    mkdir!(args.outdir);
    write_npz!(
        args.outdir.join("coupling_scan.npz"),
        arrays: {
            "alpha" => &alpha,
            "vacuum_frequencies" => photon.frequencies(),
            "bare_energies" => &bare.energies,
            "frequencies" => &frequencies,
            "energies" => &energies,
            "iterations" => &iterations,
            "converged" => &converged,
        }
    )?;
    Ok(())
}
