use std::f64::consts::PI;
use dressed_qed::{
    CouplingParameters,
    MatterSystem,
    PhotonSystem,
    Polarizability,
    SolverConfig,
    config::ResidualKind,
    fixed_point::MatterFixedPointSolver,
    solve,
};

const N_E: usize = 4;
const TUNNELING: f64 = 0.25;
const N_P: usize = 5;
const LENGTH: f64 = PI;
const N_POINTS: usize = 101;
// x = 0.3 L, away from every mode node
const EMITTER: usize = 30;

fn systems() -> (MatterSystem, PhotonSystem) {
    let matter = MatterSystem::tight_binding(&[0.0; N_E], TUNNELING, 1).unwrap();
    let photon = PhotonSystem::standing_wave(N_P, LENGTH, N_POINTS).unwrap();
    (matter, photon)
}

#[test]
fn chain_in_standing_wave_cavity() {
    let (matter, photon) = systems();
    let coupling = CouplingParameters::new(0.01, Polarizability::Scalar(0.05));
    let result
        = solve(&matter, &photon, EMITTER, &coupling, SolverConfig::default()).unwrap();

    let w0 = photon.frequencies();
    let w = result.frequencies();
    assert_eq!(w.len(), N_P);
    for k in 0..N_P - 1 {
        assert!(w[k] > w0[k] && w[k] < w0[k + 1], "root {k}: {}", w[k]);
    }
    assert!(w[N_P - 1] > w0[N_P - 1] && w[N_P - 1] < 2.0 * w0[N_P - 1] - w0[N_P - 2]);

    let bare = matter.bare().unwrap();
    let e = result.energies();
    assert_eq!(e.len(), N_E);
    for (ei, e0) in e.iter().zip(&bare.energies) {
        assert!(ei.is_finite());
        assert!((ei - e0).abs() < 2e-2, "{ei} vs {e0}");
    }
    assert!(e.iter().zip(&bare.energies).any(|(ei, e0)| ei != e0));

    assert!(result.converged());
    let pass = &result.passes[0];
    assert!(pass.matter.iterations <= SolverConfig::default().fixedpoint_max_iter);
    assert!(pass.sum_rule < 1e-8);
    assert!(pass.roots.iter().all(|r| r.residual < 1e-8));
}

#[test]
fn negative_coupling_uses_lower_edge() {
    let (matter, photon) = systems();
    let coupling = CouplingParameters::new(0.01, Polarizability::Scalar(-0.05));
    let config = SolverConfig { residual: ResidualKind::Energies, ..Default::default() };
    let result = solve(&matter, &photon, EMITTER, &coupling, config).unwrap();
    assert!(result.converged());
    let w0 = photon.frequencies();
    let w = result.frequencies();
    assert!(w[0] > 0.0 && w[0] < w0[0]);
    for k in 1..N_P {
        assert!(w[k] > w0[k - 1] && w[k] < w0[k]);
    }
}

#[test]
fn polarizability_from_matter_with_mixing() {
    let (matter, photon) = systems();
    let coupling = CouplingParameters::new(0.02, Polarizability::FromMatter);
    let config = SolverConfig {
        passes: 2,
        adaptive_damping: true,
        ..SolverConfig::default().with_mixing(2, 0.7)
    };
    let result = solve(&matter, &photon, EMITTER, &coupling, config).unwrap();
    assert_eq!(result.passes.len(), 2);
    assert!(result.converged());
    assert!(result.passes.iter().all(|pass| pass.lambda[[0, 0]].re > 0.0));

    // one more unmixed update leaves the converged energies in place
    let photons: Vec<(f64, f64)>
        = result.photon_modes.iter().map(|m| (m.frequency, m.weight())).collect();
    let solver = MatterFixedPointSolver::new(&matter, coupling.alpha, &config);
    let (again, _) = solver.step(&photons, &result.matter).unwrap();
    assert!(solver.residual(&result.matter, &again) < config.fixedpoint_tolerance);
}

#[test]
fn repeated_solves_are_identical() {
    let (matter, photon) = systems();
    let coupling = CouplingParameters::new(0.01, Polarizability::Scalar(0.05));
    let a = solve(&matter, &photon, EMITTER, &coupling, SolverConfig::default()).unwrap();
    let b = solve(&matter, &photon, EMITTER, &coupling, SolverConfig::default()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn emitter_on_a_node_still_solves() {
    let (matter, photon) = systems();
    let coupling = CouplingParameters::new(0.01, Polarizability::Scalar(0.05));
    // x = L/2 sits on the nodes of the second and fourth modes
    let result = solve(&matter, &photon, 50, &coupling, SolverConfig::default()).unwrap();
    assert!(result.converged());
    let w0 = photon.frequencies();
    let w = result.frequencies();
    assert_eq!(w.len(), N_P);
    assert_eq!(w[1], w0[1]);
    assert_eq!(w[3], w0[3]);
    for k in [0, 2, 4] {
        assert!(w[k] > w0[k]);
    }
    assert!(result.passes[0].sum_rule < 1e-8);
}

#[test]
fn vanishing_coupling_approaches_the_bare_problem() {
    let (matter, photon) = systems();
    let bare = matter.bare().unwrap();
    for alpha in [1e-9, 1e-12] {
        let coupling = CouplingParameters::new(alpha, Polarizability::FromMatter);
        let result
            = solve(&matter, &photon, EMITTER, &coupling, SolverConfig::default()).unwrap();
        assert!(result.converged());
        assert!(result.passes[0].sum_rule < 1e-8);
        for (w, w0) in result.frequencies().iter().zip(photon.frequencies()) {
            assert!((w - w0).abs() < 1e-6, "{w} vs {w0}");
        }
        for (e, e0) in result.energies().iter().zip(&bare.energies) {
            assert!((e - e0).abs() < 1e-6);
        }
    }
}
