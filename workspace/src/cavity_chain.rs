#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use std::path::PathBuf;
use clap::Parser;
use ndarray::{ self as nd, s };
use num_complex::Complex64 as C64;
use dressed_qed::{
    mkdir,
    write_npz,
    PhotonSystem,
    SolverConfig,
    solve,
};
use lib::systems::cavity_chain::*;

/// Solve the dressed chain + cavity problem once and write the results.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Solver settings (TOML); defaults are used for anything not set.
    #[arg(long)]
    config: Option<PathBuf>,

    /// External vacuum mode data (`.npz` with `frequencies`, `grid`,
    /// `profiles`) to use in place of the standing-wave cavity.
    #[arg(long)]
    modes: Option<PathBuf>,

    /// Emitter position.
    #[arg(long, default_value_t = EMITTER_X)]
    emitter_x: f64,

    #[arg(long, default_value_t = ALPHA)]
    alpha: f64,

    /// Fixed scalar polarizability.
    #[arg(long, default_value_t = LAMBDA)]
    lambda: f64,

    /// Compute λ from the matter state instead of using `--lambda`.
    #[arg(long)]
    from_matter: bool,

    #[arg(long, default_value = "output/cavity_chain")]
    outdir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    lib::init_logging();
    let args = Args::parse();

    let config
        = match &args.config {
            Some(path) => SolverConfig::load(path)?,
            None => SolverConfig::default(),
        };
    let matter = matter()?;
    let photon
        = match &args.modes {
            Some(path) => PhotonSystem::from_npz(path)?,
            None => photon()?,
        };
    let r0 = photon.nearest_point(args.emitter_x);
    let coupling = coupling(args.alpha, (!args.from_matter).then_some(args.lambda));

    let result = solve(&matter, &photon, r0, &coupling, config)?;
    let bare = matter.bare()?;

    println!("emitter at x = {:.4} (grid index {r0})", photon.grid()[r0]);
    println!("photon frequencies (vacuum → dressed):");
    for (w0, w) in photon.frequencies().iter().zip(result.frequencies().iter()) {
        println!("  {w0:10.6} → {w:10.6}  ({:+.3e})", w - w0);
    }
    println!("matter energies (bare → dressed):");
    for (e0, e) in bare.energies.iter().zip(result.energies()) {
        println!("  {e0:+10.6} → {e:+10.6}  ({:+.3e})", e - e0);
    }
    for (k, pass) in result.passes.iter().enumerate() {
        println!(
            "pass {}: λ = {:.4e}, sum rule {:.2e}, {} matter iterations (residual {:.2e})",
            k + 1,
            pass.lambda[[0, 0]].re,
            pass.sum_rule,
            pass.matter.iterations,
            pass.matter.residual,
        );
    }

    let (n_p, n_r, d) = photon.profiles().dim();
    let mut profiles: nd::Array3<C64> = nd::Array3::zeros((n_p, n_r, d));
    for (k, mode) in result.photon_modes.iter().enumerate() {
        profiles.slice_mut(s![k, .., ..]).assign(&mode.profile);
    }
    let last = result.passes.last()
        .ok_or_else(|| anyhow::anyhow!("solve returned no passes"))?;
    let residual_history: nd::Array1<f64>
        = last.matter.residual_history.iter().copied().collect();

    mkdir!(args.outdir);
    write_npz!(
        args.outdir.join("cavity_chain.npz"),
        arrays: {
            "vacuum_frequencies" => photon.frequencies(),
            "frequencies" => &result.frequencies(),
            "grid" => photon.grid(),
            "profiles" => &profiles,
            "emitter_amplitudes" => &result.emitter_amplitudes(),
            "bare_energies" => &bare.energies,
            "energies" => result.energies(),
            "states" => &result.matter.states,
            "sigma" => &result.self_energy.sigma,
            "residual_history" => &residual_history,
            "sum_rule" => &nd::array![last.sum_rule],
            "emitter" => &nd::array![r0 as u32],
            "alpha" => &nd::array![args.alpha],
        }
    )?;
    Ok(())
}
