use ampsym_core::{
    AmpsymError, AmpsymResult, Binding, Coefficient, CoefficientFamily, Expr, Index, IndexRange,
    Sign, Symbol,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Which part of $`Z_\ell^m`$ a partial-wave sum is built from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Part {
    Real,
    Imag,
}

/// The symbolic polarized intensity
///
/// ```math
/// I(\theta, \phi, \Phi) = 2\kappa \sum_k \Big[ (1 - P)\Big|\sum_{\ell,m} A^{(-)}_{m,k} \Re Z_\ell^m\Big|^2
///   + (1 - P)\Big|\sum_{\ell,m} A^{(+)}_{m,k} \Im Z_\ell^m\Big|^2
///   + (1 + P)\Big|\sum_{\ell,m} A^{(+)}_{m,k} \Re Z_\ell^m\Big|^2
///   + (1 + P)\Big|\sum_{\ell,m} A^{(-)}_{m,k} \Im Z_\ell^m\Big|^2 \Big]
/// ```
///
/// together with the symbols and coefficient families it was built from. Every sum is a pool
/// sum, so the tree stays compact until [`IntensityModel::expanded`] is requested.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntensityModel {
    max_order: usize,
    flip_indices: Vec<i64>,
    m_range: Vec<i64>,
    theta: Symbol,
    phi: Symbol,
    big_phi: Symbol,
    polarization: Symbol,
    kappa: Symbol,
    positive: CoefficientFamily,
    negative: CoefficientFamily,
    expression: Expr,
}

fn check_indices(name: &str, values: &[i64]) -> AmpsymResult<()> {
    if values.is_empty() {
        return Err(AmpsymError::Construction {
            reason: format!("the set of {name} values is empty"),
        });
    }
    for (i, value) in values.iter().enumerate() {
        if values[..i].contains(value) {
            return Err(AmpsymError::Construction {
                reason: format!("{name} value {value} appears more than once"),
            });
        }
    }
    Ok(())
}

/// Build the polarized intensity for partial waves up to `max_order`, flip indices
/// `flip_indices`, and azimuthal indices `m_range`.
///
/// Azimuthal indices with $`|m| > \ell`$ do not contribute: their harmonics vanish and drop out
/// when the tree is expanded. An `m` above `max_order` is therefore accepted and silently
/// filtered.
///
/// # Errors
///
/// Returns [`AmpsymError::Construction`] if either index set is empty or has duplicates, or if
/// `m_range` is not symmetric (some `m` is present without `-m`).
pub fn assemble(
    max_order: usize,
    flip_indices: &[i64],
    m_range: &[i64],
) -> AmpsymResult<IntensityModel> {
    check_indices("flip index", flip_indices)?;
    check_indices("m", m_range)?;
    if let Some(m) = m_range.iter().find(|m| !m_range.contains(&-**m)) {
        return Err(AmpsymError::Construction {
            reason: format!("m range is not symmetric: {m} is present but {} is not", -m),
        });
    }
    let theta = Symbol::coordinate("theta");
    let phi = Symbol::coordinate("phi");
    let big_phi = Symbol::parameter("Phi");
    let polarization = Symbol::parameter("P");
    let kappa = Symbol::parameter("kappa");
    let positive = CoefficientFamily::new("A", Sign::Positive);
    let negative = CoefficientFamily::new("A", Sign::Negative);

    let zlm = Expr::zlm(
        Index::var("l"),
        Index::var("m"),
        Expr::from(&theta),
        Expr::from(&phi),
        Expr::from(&big_phi),
    );
    let waves = |family: &CoefficientFamily, part: Part| -> Expr {
        let coefficient = Expr::coefficient(family, vec![Index::var("m"), Index::var("k")]);
        let basis = match part {
            Part::Real => zlm.re(),
            Part::Imag => zlm.im(),
        };
        Expr::pool_sum(
            coefficient * basis,
            vec![
                IndexRange::inclusive("l", 0, max_order as i64),
                IndexRange::new("m", m_range),
            ],
        )
        .norm_sqr()
    };
    let p = Expr::from(&polarization);
    let unpolarized = Expr::one() - &p;
    let polarized = Expr::one() + &p;
    let flips = Expr::sum(vec![
        &unpolarized * waves(&negative, Part::Real),
        &unpolarized * waves(&positive, Part::Imag),
        &polarized * waves(&positive, Part::Real),
        &polarized * waves(&negative, Part::Imag),
    ]);
    let expression = 2.0
        * Expr::from(&kappa)
        * Expr::pool_sum(flips, vec![IndexRange::new("k", flip_indices)]);
    info!(
        max_order,
        n_flip = flip_indices.len(),
        n_m = m_range.len(),
        "assembled polarized intensity"
    );
    Ok(IntensityModel {
        max_order,
        flip_indices: flip_indices.to_vec(),
        m_range: m_range.to_vec(),
        theta,
        phi,
        big_phi,
        polarization,
        kappa,
        positive,
        negative,
        expression,
    })
}

impl IntensityModel {
    /// The compact tree, with pool sums and $`Z_\ell^m`$ still folded.
    pub fn expression(&self) -> &Expr {
        &self.expression
    }
    /// The fully expanded tree.
    pub fn expanded(&self) -> Expr {
        self.expression.expand()
    }
    /// The highest partial-wave order $`\ell`$.
    pub fn max_order(&self) -> usize {
        self.max_order
    }
    /// The flip indices $`k`$.
    pub fn flip_indices(&self) -> &[i64] {
        &self.flip_indices
    }
    /// The azimuthal indices $`m`$.
    pub fn m_range(&self) -> &[i64] {
        &self.m_range
    }
    /// The polar angle coordinate $`\theta`$.
    pub fn theta(&self) -> &Symbol {
        &self.theta
    }
    /// The azimuthal angle coordinate $`\phi`$.
    pub fn phi(&self) -> &Symbol {
        &self.phi
    }
    /// The production-plane angle $`\Phi`$.
    pub fn big_phi(&self) -> &Symbol {
        &self.big_phi
    }
    /// The polarization fraction $`P`$.
    pub fn polarization(&self) -> &Symbol {
        &self.polarization
    }
    /// The overall scale $`\kappa`$.
    pub fn kappa(&self) -> &Symbol {
        &self.kappa
    }
    /// The coefficient family of the given branch.
    pub fn family(&self, sign: Sign) -> &CoefficientFamily {
        match sign {
            Sign::Positive => &self.positive,
            Sign::Negative => &self.negative,
        }
    }
    /// Both coefficient families, positive branch first.
    pub fn families(&self) -> [CoefficientFamily; 2] {
        [self.positive.clone(), self.negative.clone()]
    }
    /// Every coefficient $`A^{(\pm)}_{m,k}`$ the formula ranges over, positive branch first, then
    /// by `m`, then by `k`. Coefficients whose `m` exceeds the maximum order are listed too,
    /// although they vanish from the expanded tree.
    pub fn coefficients(&self) -> Vec<Coefficient> {
        [&self.positive, &self.negative]
            .into_iter()
            .flat_map(|family| {
                self.m_range.iter().flat_map(move |m| {
                    self.flip_indices
                        .iter()
                        .map(move |k| family.at(&[*m, *k]))
                })
            })
            .collect()
    }
    /// A fresh [`Binding`] with both coefficient families declared.
    pub fn binding(&self) -> Binding {
        Binding::new(&self.families())
    }
}
