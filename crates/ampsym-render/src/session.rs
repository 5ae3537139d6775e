use std::time::Instant;

use ampsym_amplitudes::assemble;
use ampsym_core::{compile, AmpsymError, AmpsymResult, NumericFunction, Sign, Value, Variable};
use ndarray::{Array2, Ix2};
use tracing::{debug, info};

use crate::{
    canvas::Canvas,
    config::{ControlsConfig, SessionConfig},
    controls::{ControlSet, Panel},
    grid::GridSample,
};

/// Whether a session is between events or in the middle of a redraw.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RenderState {
    /// Waiting for the next event.
    Idle,
    /// Evaluating the grid and drawing it.
    Redrawing,
}

/// What a redraw did.
#[derive(Clone, Debug, PartialEq)]
pub enum RedrawOutcome {
    /// The canvas shows the new grid.
    Drawn {
        /// The largest intensity on the grid
        max: f64,
        /// Whether the color limits were moved
        rescaled: bool,
    },
    /// Evaluation or drawing failed; the message was shown on the canvas instead.
    Failed {
        /// The error shown on the canvas
        message: String,
    },
}

/// An interactive heatmap session: a compiled intensity, the grid it is drawn on, the sliders
/// feeding its arguments, and the canvas showing it.
///
/// Events are handled one at a time. Every slider change performs exactly one vectorized call
/// over the whole grid before the session goes back to [`RenderState::Idle`].
pub struct Session<C: Canvas> {
    grid: GridSample,
    controls: ControlSet,
    panels: Vec<Panel>,
    function: NumericFunction,
    canvas: C,
    state: RenderState,
    rescale_threshold: f64,
    draws: usize,
}

impl<C: Canvas> Session<C> {
    /// Create an idle session which has not drawn anything yet.
    pub fn new(
        function: NumericFunction,
        grid: GridSample,
        controls: &ControlsConfig,
        canvas: C,
        rescale_threshold: f64,
    ) -> Self {
        Self {
            controls: ControlSet::for_function(&function, controls),
            panels: Panel::group(&function),
            grid,
            function,
            canvas,
            state: RenderState::Idle,
            rescale_threshold,
            draws: 0,
        }
    }

    /// Assemble, bind, and compile the model described by `config`, then draw it once.
    ///
    /// The overall scale $`\kappa`$ is bound into the formula before compilation; every other
    /// parameter and coefficient becomes an argument driven by a slider.
    pub fn from_config(config: &SessionConfig, canvas: C) -> AmpsymResult<Self> {
        let model = assemble(
            config.model.max_order,
            &config.model.flip_indices,
            &config.model.m_range,
        )?;
        let mut binding = model.binding();
        binding.bind_symbol(model.kappa(), config.model.kappa);
        let expression = model.expression().substitute(&binding).expand();
        let arguments = expression.sorted_free_variables();
        let function = compile(&expression, &arguments)?;
        let grid = GridSample::new(config.grid.n_phi, config.grid.n_costheta)?;
        let mut session = Self::new(
            function,
            grid,
            &config.controls,
            canvas,
            config.canvas.rescale_threshold,
        );
        info!(
            arguments = arguments.len(),
            controls = session.controls.len(),
            points = session.grid.len(),
            "started session"
        );
        session.redraw();
        Ok(session)
    }

    /// Move a slider and redraw.
    ///
    /// # Errors
    ///
    /// Returns [`AmpsymError::UnknownControl`] if there is no slider called `name`. Failures of
    /// the redraw itself are not errors; they are reported in the [`RedrawOutcome`].
    pub fn set_control(&mut self, name: &str, value: f64) -> AmpsymResult<RedrawOutcome> {
        let taken = self.controls.set(name, value)?;
        debug!(name, requested = value, taken, "control changed");
        Ok(self.redraw())
    }

    /// Collapse or expand the coefficient panel of branch `sign`. Returns the new collapsed
    /// state. Nothing is redrawn.
    pub fn toggle_panel(&mut self, sign: Sign) -> bool {
        self.panels
            .iter_mut()
            .find(|p| p.sign() == sign)
            .map(Panel::toggle)
            .unwrap_or(false)
    }

    /// The argument values for the current slider positions, in argument order.
    fn arguments(&self) -> AmpsymResult<Vec<Value>> {
        self.function
            .arguments()
            .iter()
            .map(|variable| match variable {
                Variable::Symbol(s) if variable.is_coordinate() => self
                    .grid
                    .coordinate(s.name())
                    .ok_or_else(|| AmpsymError::UnboundSymbol {
                        name: s.name().to_string(),
                    }),
                _ => self.controls.value_for(variable).map(Value::from),
            })
            .collect()
    }

    /// Evaluate the intensity over the whole grid for the current slider positions.
    pub fn evaluate(&self) -> AmpsymResult<Array2<f64>> {
        let shape = self.grid.shape();
        match self.function.call(&self.arguments()?)? {
            Value::Scalar(v) => Ok(Array2::from_elem(shape, v.re)),
            value @ Value::Array(_) => {
                let data = value.real();
                if data.shape() != [shape.0, shape.1].as_slice() {
                    return Err(AmpsymError::ShapeMismatch {
                        left: data.shape().to_vec(),
                        right: vec![shape.0, shape.1],
                    });
                }
                data.into_dimensionality::<Ix2>()
                    .map_err(|e| AmpsymError::Custom(e.to_string()))
            }
        }
    }

    /// Evaluate the grid and hand it to the canvas.
    ///
    /// The first successful draw sets the color limits to $`[\min(0, I_{\min}), I_{\max}]`$. Later
    /// draws move the upper limit to the new maximum only if that maximum exceeds the rescale
    /// threshold. Errors are shown on the canvas and the session stays usable.
    pub fn redraw(&mut self) -> RedrawOutcome {
        self.state = RenderState::Redrawing;
        let start = Instant::now();
        let outcome = match self.draw_grid() {
            Ok((max, rescaled)) => {
                self.draws += 1;
                RedrawOutcome::Drawn { max, rescaled }
            }
            Err(e) => {
                let message = e.to_string();
                self.canvas.show_message(&message);
                RedrawOutcome::Failed { message }
            }
        };
        info!(
            elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
            outcome = ?outcome,
            "redraw"
        );
        self.state = RenderState::Idle;
        outcome
    }

    fn draw_grid(&mut self) -> AmpsymResult<(f64, bool)> {
        let data = self.evaluate()?;
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = data.iter().copied().fold(f64::INFINITY, f64::min);
        if !max.is_finite() || !min.is_finite() {
            return Err(AmpsymError::Custom(
                "the intensity is not finite on the grid".to_string(),
            ));
        }
        self.canvas.set_data(&data);
        let rescaled = match self.canvas.color_limits() {
            None => {
                let lo = min.min(0.0);
                let hi = if max > lo { max } else { lo + 1.0 };
                self.canvas.set_color_limits(lo, hi);
                true
            }
            Some((lo, hi)) if max > self.rescale_threshold && max > lo && max != hi => {
                self.canvas.set_color_limits(lo, max);
                true
            }
            Some(_) => false,
        };
        self.canvas.draw()?;
        Ok((max, rescaled))
    }

    /// The grid the intensity is drawn on.
    pub fn grid(&self) -> &GridSample {
        &self.grid
    }
    /// The sliders, in argument order.
    pub fn controls(&self) -> &ControlSet {
        &self.controls
    }
    /// The `+` and `-` coefficient panels.
    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }
    /// The compiled intensity.
    pub fn function(&self) -> &NumericFunction {
        &self.function
    }
    /// The canvas showing the heatmap.
    pub fn canvas(&self) -> &C {
        &self.canvas
    }
    /// Mutable access to the canvas, for front ends which pick up what it drew.
    pub fn canvas_mut(&mut self) -> &mut C {
        &mut self.canvas
    }
    /// Whether a redraw is in progress.
    pub fn state(&self) -> RenderState {
        self.state
    }
    /// The number of successful draws.
    pub fn draws(&self) -> usize {
        self.draws
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{canvas::MemoryCanvas, config::GridConfig};
    use approx::assert_relative_eq;

    fn small_config() -> SessionConfig {
        SessionConfig {
            grid: GridConfig {
                n_phi: 16,
                n_costheta: 8,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_from_config_draws_once() {
        let session = Session::from_config(&small_config(), MemoryCanvas::new()).unwrap();
        assert_eq!(session.state(), RenderState::Idle);
        assert_eq!(session.draws(), 1);
        assert_eq!(session.canvas().draws(), 1);
        assert_eq!(session.canvas().data().unwrap().dim(), (16, 8));
        let (lo, hi) = session.canvas().color_limits().unwrap();
        assert_relative_eq!(lo, 0.0);
        assert!(hi > 0.0);
        // 2 branches x 5 m values x 1 flip index, plus P and Phi; kappa is bound
        assert_eq!(session.controls().len(), 2 * 10 + 2);
        assert!(session.controls().get("kappa").is_none());
    }

    #[test]
    fn test_set_control_redraws_once() {
        let mut session = Session::from_config(&small_config(), MemoryCanvas::new()).unwrap();
        let outcome = session.set_control("A+[0,0] mag", 1.5).unwrap();
        assert!(matches!(outcome, RedrawOutcome::Drawn { .. }));
        assert_eq!(session.canvas().draws(), 2);
        assert_eq!(session.state(), RenderState::Idle);
        assert!(matches!(
            session.set_control("nope", 1.0),
            Err(AmpsymError::UnknownControl { .. })
        ));
        assert_eq!(session.canvas().draws(), 2);
    }

    #[test]
    fn test_color_limits_follow_large_maxima_only() {
        let mut config = small_config();
        config.canvas.rescale_threshold = 1e6;
        let mut session = Session::from_config(&config, MemoryCanvas::new()).unwrap();
        let first = session.canvas().color_limits().unwrap();
        session.set_control("A-[0,0] mag", 2.0).unwrap();
        assert_eq!(session.canvas().color_limits().unwrap(), first);

        config.canvas.rescale_threshold = 0.0;
        let mut session = Session::from_config(&config, MemoryCanvas::new()).unwrap();
        let outcome = session.set_control("A-[0,0] mag", 2.0).unwrap();
        let RedrawOutcome::Drawn { max, rescaled } = outcome else {
            panic!("redraw failed");
        };
        assert!(rescaled);
        assert_relative_eq!(session.canvas().color_limits().unwrap().1, max);
    }

    #[test]
    fn test_default_controls_respond_to_polarization() {
        let mut session = Session::from_config(&small_config(), MemoryCanvas::new()).unwrap();
        let unpolarized = session.evaluate().unwrap();
        session.set_control("P", 1.0).unwrap();
        let polarized = session.evaluate().unwrap();
        let deviation = unpolarized
            .iter()
            .zip(polarized.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(deviation > 1e-9);
    }

    #[test]
    fn test_all_zero_intensity_draws() {
        let mut session = Session::from_config(&small_config(), MemoryCanvas::new()).unwrap();
        let names: Vec<String> = session
            .controls()
            .iter()
            .filter(|(k, _)| k.ends_with(" mag"))
            .map(|(k, _)| k.clone())
            .collect();
        for name in names {
            session.set_control(&name, 0.0).unwrap();
        }
        let data = session.evaluate().unwrap();
        assert!(data.iter().all(|v| v.abs() < 1e-12));
        assert!(session.canvas().messages().is_empty());
    }

    #[test]
    fn test_toggle_panel() {
        let mut session = Session::from_config(&small_config(), MemoryCanvas::new()).unwrap();
        assert!(session.toggle_panel(Sign::Negative));
        assert!(session.panels()[1].collapsed());
        assert!(!session.toggle_panel(Sign::Negative));
        assert_eq!(session.canvas().draws(), 1);
    }
}
