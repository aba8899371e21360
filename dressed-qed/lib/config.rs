//! Solver settings and the policies behind each numerically delicate choice.
//!
//! All fields have defaults, so a TOML file only needs to name the ones it
//! changes:
//! ```toml
//! fixedpoint_tolerance = 1e-9
//! mixing_depth = 3
//! damping = 0.5
//! resonance_policy = "skip"
//!
//! [bracket]
//! edge = "above"
//! edge_span = 2.0
//! scan_points = 32
//! ```

use std::path::Path;
use serde::Deserialize;
use crate::error::{ Error, Result };

/// What to do with a self-energy term whose denominator `E_1 - E_b - ω_n`
/// falls below [`SolverConfig::resonance_threshold`] in magnitude.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResonancePolicy {
    /// Drop the term and record a warning.
    Skip,
    /// Replace the denominator by the threshold, keeping its sign, and record
    /// a warning.
    Clamp,
    /// Abort the matter solve with [`Error::ResonanceFailure`].
    Fail,
}

/// Which matter level plays the role of `E_1` in the self-energy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceLevel {
    /// The lowest current eigenvalue.
    Lowest,
    /// A fixed level index into the current eigenpairs.
    Index(usize),
}

/// Quantity whose change between iterates decides fixed-point convergence.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualKind {
    /// Frobenius norm of `ψ' - ψ` after phase alignment.
    States,
    /// Euclidean norm of `E' - E`.
    Energies,
}

/// Side of the spectrum on which the single edge bracket is placed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeRule {
    /// Above the highest vacuum frequency when `Re tr λ ≥ 0`, otherwise below
    /// the lowest.
    Auto,
    Above,
    Below,
}

/// Search-interval policy for the photon root solver.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct BracketPolicy {
    pub edge: EdgeRule,
    /// Width of the edge bracket in units of the adjacent vacuum spacing.
    pub edge_span: f64,
    /// Number of times an edge bracket without a sign change is doubled away
    /// from its pole before giving up. For `d > 1` each doubling also doubles
    /// the scan density.
    pub max_expansions: usize,
    /// Interior sample points per bracket when scanning for sign changes of
    /// `det(I + λ G)` with `d > 1`.
    pub scan_points: usize,
}

impl Default for BracketPolicy {
    fn default() -> Self {
        Self { edge: EdgeRule::Auto, edge_span: 1.0, max_expansions: 8, scan_points: 16 }
    }
}

/// Numerical settings for a full photon + matter solve.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub root_tolerance: f64,
    pub root_max_iter: usize,
    /// Exclusion radius around each vacuum pole.
    pub pole_epsilon: f64,
    /// A vacuum mode with `|λ F_k(r0)|²` at or below this fraction of
    /// `|λ|² max_j |F_j(r0)|²` is treated as decoupled from the emitter.
    pub decoupling_threshold: f64,
    pub fixedpoint_tolerance: f64,
    pub fixedpoint_max_iter: usize,
    /// Anderson mixing depth `m`; zero means plain substitution.
    pub mixing_depth: usize,
    /// Anderson damping `β`, in `(0, 1]`.
    pub damping: f64,
    /// Shrink `β` whenever the residual grows between iterations.
    pub adaptive_damping: bool,
    pub residual: ResidualKind,
    pub resonance_policy: ResonancePolicy,
    pub resonance_threshold: f64,
    pub reference: ReferenceLevel,
    /// Number of photon → matter passes run by the orchestrator.
    pub passes: usize,
    pub bracket: BracketPolicy,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            root_tolerance: 1e-12,
            root_max_iter: 300,
            pole_epsilon: 1e-10,
            decoupling_threshold: 1e-24,
            fixedpoint_tolerance: 1e-10,
            fixedpoint_max_iter: 200,
            mixing_depth: 0,
            damping: 1.0,
            adaptive_damping: false,
            residual: ResidualKind::States,
            resonance_policy: ResonancePolicy::Clamp,
            resonance_threshold: 1e-8,
            reference: ReferenceLevel::Lowest,
            passes: 1,
            bracket: BracketPolicy::default(),
        }
    }
}

impl SolverConfig {
    /// Parse a (possibly partial) configuration from TOML source.
    pub fn from_toml_str(src: &str) -> Result<Self> {
        let config: Self
            = toml::from_str(src)
            .map_err(|err| Error::invalid(format!("bad solver config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn load<P>(path: P) -> Result<Self>
    where P: AsRef<Path>
    {
        let src = std::fs::read_to_string(path)?;
        Self::from_toml_str(&src)
    }

    /// Set the Anderson mixing depth and damping.
    pub fn with_mixing(mut self, depth: usize, damping: f64) -> Self {
        self.mixing_depth = depth;
        self.damping = damping;
        self
    }

    /// Set the resonance policy.
    pub fn with_resonance(mut self, policy: ResonancePolicy) -> Self {
        self.resonance_policy = policy;
        self
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("root_tolerance", self.root_tolerance),
            ("pole_epsilon", self.pole_epsilon),
            ("fixedpoint_tolerance", self.fixedpoint_tolerance),
            ("resonance_threshold", self.resonance_threshold),
            ("bracket.edge_span", self.bracket.edge_span),
        ];
        if let Some((name, val))
            = positive.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0))
        {
            return Err(Error::invalid(
                format!("{name} must be positive and finite, got {val}")));
        }
        if !(self.decoupling_threshold.is_finite() && self.decoupling_threshold >= 0.0) {
            return Err(Error::invalid(format!(
                "decoupling_threshold must be non-negative, got {}",
                self.decoupling_threshold,
            )));
        }
        if self.root_max_iter == 0 || self.fixedpoint_max_iter == 0 {
            return Err(Error::invalid("iteration caps must be non-zero"));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(Error::invalid(
                format!("damping must lie in (0, 1], got {}", self.damping)));
        }
        if self.passes == 0 {
            return Err(Error::invalid("at least one solve pass is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let src = r#"
            mixing_depth = 3
            damping = 0.5
            resonance_policy = "skip"
            reference = { index = 2 }

            [bracket]
            edge = "below"
        "#;
        let config = SolverConfig::from_toml_str(src).unwrap();
        assert_eq!(config.mixing_depth, 3);
        assert_eq!(config.damping, 0.5);
        assert_eq!(config.resonance_policy, ResonancePolicy::Skip);
        assert_eq!(config.reference, ReferenceLevel::Index(2));
        assert_eq!(config.bracket.edge, EdgeRule::Below);
        assert_eq!(config.bracket.edge_span, 1.0);
        assert_eq!(config.bracket.scan_points, 16);
        assert_eq!(config.decoupling_threshold, 1e-24);
        assert_eq!(config.fixedpoint_max_iter, 200);
        assert_eq!(config.residual, ResidualKind::States);
    }

    #[test]
    fn rejects_bad_damping() {
        assert!(matches!(
            SolverConfig::from_toml_str("damping = 1.5"),
            Err(Error::InvalidInput(_)),
        ));
        assert!(SolverConfig::default().with_mixing(2, 0.0).validate().is_err());
        assert!(SolverConfig::default().with_mixing(2, 0.3).validate().is_ok());
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(SolverConfig::from_toml_str("resonance_policy = \"ignore\"").is_err());
    }
}
