//! Coordinate Functions: Vectorising Persistence Diagrams
//!
//! A persistence diagram is a multiset of points x = (birth, death). A
//! coordinate function ψ: ℝ² → ℝᵏ maps each point to a feature vector;
//! summing or averaging ψ over the diagram gives a fixed-width,
//! permutation-invariant embedding that is differentiable both in the
//! parameters of ψ and in the pair coordinates.
//!
//! ## Families
//!
//! | Kind        | ψ_j(b, d)                                   | Parameters        |
//! |-------------|---------------------------------------------|-------------------|
//! | Triangle    | max(0, d - \|t_j - b\|)                      | t [k]             |
//! | Gaussian    | exp(-‖x - t_j‖² / 2σ²)                      | t [k, 2], σ [1]   |
//! | Line        | w_j · x + b_j                               | W [k, 2], b [k]   |
//! | RationalHat | 1/(1 + n_j) - 1/(1 + \| \|r_j\| - n_j \|)   | c [k, 2], r [1, k]|
//!
//! with n_j = ‖x - c_j‖₁. Several families are active at once; their
//! outputs are concatenated in the canonical order of the table.
//!
//! ## References
//!
//! - Carrière et al., "PersLay: A Neural Network Layer for Persistence
//!   Diagrams", AISTATS 2020
//! - Hofer et al., "Learning Representations of Persistence Barcodes",
//!   JMLR 2019

mod gaussian;
mod line;
mod rational_hat;
mod triangle;

use std::collections::BTreeMap;
use std::fmt;

use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::error::{Result, TopoError};

pub use gaussian::Gaussian;
pub use line::Line;
pub use rational_hat::RationalHat;
pub use triangle::Triangle;

/// Names of the coordinate-function families
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoordFunKind {
    Triangle,
    Gaussian,
    Line,
    RationalHat,
}

impl CoordFunKind {
    /// Canonical order used when concatenating family outputs
    pub const ALL: [CoordFunKind; 4] = [
        CoordFunKind::Triangle,
        CoordFunKind::Gaussian,
        CoordFunKind::Line,
        CoordFunKind::RationalHat,
    ];

    /// Parse a family name.
    ///
    /// Case-insensitive, underscores ignored, optional `transform` suffix:
    /// `triangle`, `Triangle_transform`, `rational_hat` and `RationalHat`
    /// are all accepted.
    pub fn from_name(name: &str) -> Result<Self> {
        let key: String = name
            .chars()
            .filter(|c| *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        let key = key.strip_suffix("transform").unwrap_or(&key);

        match key {
            "triangle" => Ok(CoordFunKind::Triangle),
            "gaussian" => Ok(CoordFunKind::Gaussian),
            "line" => Ok(CoordFunKind::Line),
            "rationalhat" => Ok(CoordFunKind::RationalHat),
            _ => Err(TopoError::config(format!(
                "unknown coordinate function '{}' (expected triangle, gaussian, line or rational_hat)",
                name
            ))),
        }
    }

    /// snake_case name, also used as the parameter prefix
    pub fn name(&self) -> &'static str {
        match self {
            CoordFunKind::Triangle => "triangle",
            CoordFunKind::Gaussian => "gaussian",
            CoordFunKind::Line => "line",
            CoordFunKind::RationalHat => "rational_hat",
        }
    }
}

impl fmt::Display for CoordFunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check a `name -> width` map and return it in canonical kind order.
///
/// Empty maps, unknown names, zero widths and names that resolve to the
/// same family are configuration errors.
pub fn resolve_widths(widths: &BTreeMap<String, usize>) -> Result<Vec<(CoordFunKind, usize)>> {
    if widths.is_empty() {
        return Err(TopoError::config("no coordinate functions configured"));
    }

    let mut resolved: BTreeMap<CoordFunKind, (usize, &str)> = BTreeMap::new();
    for (name, &width) in widths {
        let kind = CoordFunKind::from_name(name)?;
        if width == 0 {
            return Err(TopoError::config(format!("coordinate function '{}' has width 0", name)));
        }
        if let Some((_, first)) = resolved.insert(kind, (width, name.as_str())) {
            return Err(TopoError::config(format!(
                "'{}' and '{}' both name the {} family",
                first, name, kind
            )));
        }
    }

    Ok(resolved.into_iter().map(|(kind, (width, _))| (kind, width)).collect())
}

/// One coordinate-function family with its learnable parameters
#[derive(Debug, Clone)]
pub enum CoordinateFunction {
    Triangle(Triangle),
    Gaussian(Gaussian),
    Line(Line),
    RationalHat(RationalHat),
}

impl CoordinateFunction {
    pub fn new(kind: CoordFunKind, width: usize, vb: VarBuilder) -> Result<Self> {
        Ok(match kind {
            CoordFunKind::Triangle => CoordinateFunction::Triangle(Triangle::new(width, vb)?),
            CoordFunKind::Gaussian => CoordinateFunction::Gaussian(Gaussian::new(width, vb)?),
            CoordFunKind::Line => CoordinateFunction::Line(Line::new(width, vb)?),
            CoordFunKind::RationalHat => CoordinateFunction::RationalHat(RationalHat::new(width, vb)?),
        })
    }

    pub fn kind(&self) -> CoordFunKind {
        match self {
            CoordinateFunction::Triangle(_) => CoordFunKind::Triangle,
            CoordinateFunction::Gaussian(_) => CoordFunKind::Gaussian,
            CoordinateFunction::Line(_) => CoordFunKind::Line,
            CoordinateFunction::RationalHat(_) => CoordFunKind::RationalHat,
        }
    }

    pub fn output_dim(&self) -> usize {
        match self {
            CoordinateFunction::Triangle(f) => f.output_dim(),
            CoordinateFunction::Gaussian(f) => f.output_dim(),
            CoordinateFunction::Line(f) => f.output_dim(),
            CoordinateFunction::RationalHat(f) => f.output_dim(),
        }
    }

    /// Evaluate on pairs [P, 2] -> [P, k]
    pub fn forward(&self, pairs: &Tensor) -> Result<Tensor> {
        match self {
            CoordinateFunction::Triangle(f) => f.forward(pairs),
            CoordinateFunction::Gaussian(f) => f.forward(pairs),
            CoordinateFunction::Line(f) => f.forward(pairs),
            CoordinateFunction::RationalHat(f) => f.forward(pairs),
        }
    }
}

/// The active coordinate functions of one homology dimension
#[derive(Debug, Clone)]
pub struct CoordinateFamily {
    members: Vec<CoordinateFunction>,
    output_dim: usize,
}

impl CoordinateFamily {
    /// Build the active subset from a `name -> width` map.
    pub fn from_widths(widths: &BTreeMap<String, usize>, vb: VarBuilder) -> Result<Self> {
        let members = resolve_widths(widths)?
            .into_iter()
            .map(|(kind, width)| CoordinateFunction::new(kind, width, vb.pp(kind.name())))
            .collect::<Result<Vec<_>>>()?;
        let output_dim = members.iter().map(CoordinateFunction::output_dim).sum();
        Ok(Self { members, output_dim })
    }

    /// Total width k = Σ k_family
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn kinds(&self) -> Vec<CoordFunKind> {
        self.members.iter().map(CoordinateFunction::kind).collect()
    }

    /// Evaluate every family and concatenate: [P, 2] -> [P, k]
    pub fn forward(&self, pairs: &Tensor) -> Result<Tensor> {
        let (_, two) = pairs.dims2()?;
        if two != 2 {
            return Err(TopoError::shape("coordinate function input", "[P, 2]", format!("{:?}", pairs.dims())));
        }
        let outputs = self
            .members
            .iter()
            .map(|f| f.forward(pairs))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::cat(&outputs, 1)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, Var};
    use candle_nn::VarMap;

    fn widths(entries: &[(&str, usize)]) -> BTreeMap<String, usize> {
        entries.iter().map(|&(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_from_name_variants() {
        for name in ["triangle", "Triangle_transform", "TRIANGLE"] {
            assert_eq!(CoordFunKind::from_name(name).unwrap(), CoordFunKind::Triangle);
        }
        for name in ["rational_hat", "RationalHat", "RationalHat_transform"] {
            assert_eq!(CoordFunKind::from_name(name).unwrap(), CoordFunKind::RationalHat);
        }
        assert!(matches!(CoordFunKind::from_name("square"), Err(TopoError::Config(_))));
    }

    #[test]
    fn test_resolve_rejects_bad_maps() {
        assert!(resolve_widths(&BTreeMap::new()).is_err());
        assert!(resolve_widths(&widths(&[("line", 0)])).is_err());
        assert!(resolve_widths(&widths(&[("line", 2), ("Line_transform", 3)])).is_err());
        assert!(resolve_widths(&widths(&[("hexagon", 2)])).is_err());
    }

    #[test]
    fn test_family_order_and_width() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let family = CoordinateFamily::from_widths(
            &widths(&[("rational_hat", 2), ("line", 1), ("Triangle_transform", 3)]),
            vb,
        )
        .unwrap();

        assert_eq!(
            family.kinds(),
            vec![CoordFunKind::Triangle, CoordFunKind::Line, CoordFunKind::RationalHat]
        );
        assert_eq!(family.output_dim(), 6);

        let x = Tensor::new(&[[0.1f32, 0.4], [0.2, 0.9], [0.0, 0.3]], &Device::Cpu).unwrap();
        assert_eq!(family.forward(&x).unwrap().dims(), &[3, 6]);
        assert!(family.forward(&x.t().unwrap()).is_err());
    }

    #[test]
    fn test_gradient_reaches_pairs() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let family = CoordinateFamily::from_widths(
            &widths(&[("triangle", 3), ("gaussian", 3), ("line", 3), ("rational_hat", 3)]),
            vb,
        )
        .unwrap();

        let x = Var::new(&[[0.1f32, 0.7], [0.3, 0.5]], &Device::Cpu).unwrap();
        let loss = family.forward(x.as_tensor()).unwrap().sum_all().unwrap();
        let grads = loss.backward().unwrap();
        assert!(grads.get(x.as_tensor()).is_some());
    }
}
