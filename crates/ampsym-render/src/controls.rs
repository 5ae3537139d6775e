use ampsym_core::{AmpsymError, AmpsymResult, NumericFunction, Role, Sign, Variable, PI};
use indexmap::IndexMap;
use num::complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::config::ControlsConfig;

/// A bounded, stepped numeric control.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Slider {
    label: String,
    min: f64,
    max: f64,
    step: f64,
    value: f64,
}

impl Slider {
    /// Create a slider over `[min, max]` divided into `steps` steps, starting at `value`.
    pub fn new(label: &str, min: f64, max: f64, steps: usize, value: f64) -> Self {
        let mut slider = Self {
            label: label.to_string(),
            min,
            max,
            step: (max - min) / steps.max(1) as f64,
            value: min,
        };
        slider.set(value);
        slider
    }

    /// Move the slider, clamping into its bounds and snapping to the nearest step. Returns the
    /// value actually taken.
    pub fn set(&mut self, value: f64) -> f64 {
        let clamped = if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        };
        let snapped = if self.step > 0.0 {
            self.min + ((clamped - self.min) / self.step).round() * self.step
        } else {
            clamped
        };
        self.value = snapped.clamp(self.min, self.max);
        self.value
    }

    /// The label the slider is looked up by.
    pub fn label(&self) -> &str {
        &self.label
    }
    /// The lower bound.
    pub fn min(&self) -> f64 {
        self.min
    }
    /// The upper bound.
    pub fn max(&self) -> f64 {
        self.max
    }
    /// The width of one step.
    pub fn step(&self) -> f64 {
        self.step
    }
    /// The current value.
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// The label of the magnitude slider of a coefficient.
pub fn magnitude_label(variable: &Variable) -> String {
    format!("{} mag", variable.name())
}

/// The label of the phase slider of a coefficient.
pub fn phase_label(variable: &Variable) -> String {
    format!("{} phase", variable.name())
}

/// The sliders of a session, keyed by label in the order of the function's arguments.
///
/// Coordinates get no slider. A real parameter gets one slider: `P` over $`[0, 1]`$, `Phi` over
/// $`[-\pi, \pi]`$, anything else over $`[0, m_{\max}]`$. A coefficient gets a `mag` slider over
/// $`[0, m_{\max}]`$ and a `phase` slider over $`[-\pi, \pi]`$, and takes the value
/// $`|A| e^{\imath\varphi}`$.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlSet {
    sliders: IndexMap<String, Slider>,
}

impl ControlSet {
    /// Build the sliders for every non-coordinate argument of `function`.
    pub fn for_function(function: &NumericFunction, config: &ControlsConfig) -> Self {
        let steps = config.steps;
        let mut sliders = IndexMap::new();
        let mut add = |slider: Slider| {
            sliders.insert(slider.label().to_string(), slider);
        };
        for argument in function.arguments() {
            match argument {
                Variable::Symbol(s) if s.role() == Role::Coordinate => {}
                Variable::Symbol(s) => match s.name() {
                    "P" => add(Slider::new("P", 0.0, 1.0, steps, config.polarization)),
                    "Phi" => add(Slider::new("Phi", -PI, PI, steps, config.big_phi)),
                    name => add(Slider::new(
                        name,
                        0.0,
                        config.magnitude_max,
                        steps,
                        config.default_magnitude,
                    )),
                },
                Variable::Coefficient(c) => {
                    let magnitude = match c.family().sign() {
                        Sign::Positive => config.default_magnitude,
                        Sign::Negative => config.negative_magnitude,
                    };
                    add(Slider::new(
                        &magnitude_label(argument),
                        0.0,
                        config.magnitude_max,
                        steps,
                        magnitude,
                    ));
                    add(Slider::new(&phase_label(argument), -PI, PI, steps, 0.0));
                }
            }
        }
        Self { sliders }
    }

    /// Move the slider called `name`. Returns the value it actually took.
    ///
    /// # Errors
    ///
    /// Returns [`AmpsymError::UnknownControl`] if there is no such slider.
    pub fn set(&mut self, name: &str, value: f64) -> AmpsymResult<f64> {
        self.sliders
            .get_mut(name)
            .map(|slider| slider.set(value))
            .ok_or_else(|| AmpsymError::UnknownControl {
                name: name.to_string(),
            })
    }

    /// The current value of the slider called `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.sliders.get(name).map(Slider::value)
    }

    /// The slider called `name`.
    pub fn slider(&self, name: &str) -> Option<&Slider> {
        self.sliders.get(name)
    }

    /// The argument value the sliders currently assign to `variable`.
    ///
    /// # Errors
    ///
    /// Returns [`AmpsymError::UnknownControl`] if a slider the variable needs is missing.
    pub fn value_for(&self, variable: &Variable) -> AmpsymResult<Complex64> {
        let lookup = |name: String| {
            self.get(&name).ok_or(AmpsymError::UnknownControl { name })
        };
        match variable {
            Variable::Symbol(s) => Ok(Complex64::new(lookup(s.name().to_string())?, 0.0)),
            Variable::Coefficient(_) => Ok(Complex64::from_polar(
                lookup(magnitude_label(variable))?,
                lookup(phase_label(variable))?,
            )),
        }
    }

    /// Iterate over the sliders in order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Slider)> {
        self.sliders.iter()
    }

    /// The current value of every slider, by label.
    pub fn values(&self) -> IndexMap<String, f64> {
        self.sliders
            .iter()
            .map(|(name, slider)| (name.clone(), slider.value()))
            .collect()
    }

    /// The number of sliders.
    pub fn len(&self) -> usize {
        self.sliders.len()
    }

    /// Whether there are no sliders.
    pub fn is_empty(&self) -> bool {
        self.sliders.is_empty()
    }
}

/// A collapsible group holding the coefficient sliders of one branch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    title: String,
    sign: Sign,
    collapsed: bool,
    controls: Vec<String>,
}

impl Panel {
    /// Group the coefficient sliders of `function` into a `+` panel followed by a `-` panel.
    pub fn group(function: &NumericFunction) -> Vec<Panel> {
        [Sign::Positive, Sign::Negative]
            .into_iter()
            .map(|sign| {
                let controls = function
                    .arguments()
                    .iter()
                    .filter(|v| v.as_coefficient().is_some_and(|c| c.family().sign() == sign))
                    .flat_map(|v| [magnitude_label(v), phase_label(v)])
                    .collect();
                Panel {
                    title: format!("Reflectivity {sign}"),
                    sign,
                    collapsed: false,
                    controls,
                }
            })
            .collect()
    }

    /// Flip between collapsed and expanded. Returns the new collapsed state.
    pub fn toggle(&mut self) -> bool {
        self.collapsed = !self.collapsed;
        self.collapsed
    }

    /// The header shown above the panel.
    pub fn title(&self) -> &str {
        &self.title
    }
    /// The branch whose coefficients the panel holds.
    pub fn sign(&self) -> Sign {
        self.sign
    }
    /// Whether the panel is collapsed.
    pub fn collapsed(&self) -> bool {
        self.collapsed
    }
    /// The labels of the sliders in this panel.
    pub fn controls(&self) -> &[String] {
        &self.controls
    }
}
