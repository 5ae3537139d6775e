use std::fs::File;
use std::io::{BufReader, BufWriter};

use ampsym_core::{
    utils::paths::{expand_input_path, expand_output_path},
    AmpsymError, AmpsymResult,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{canvas::Canvas, session::Session};

/// An evaluated intensity grid together with the slider values it was computed for, in a form
/// that other programs can read and evaluate at the same points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridExport {
    /// `[n_phi, n_costheta]`.
    pub shape: [usize; 2],
    /// The $`\phi`$ axis.
    pub phi: Vec<f64>,
    /// The $`\cos\theta`$ axis.
    pub costheta: Vec<f64>,
    /// The intensity in row-major order: `intensity[i * n_costheta + j]` is the value at
    /// `phi[i]`, `costheta[j]`.
    pub intensity: Vec<f64>,
    /// Slider values by label.
    pub controls: IndexMap<String, f64>,
}

impl GridExport {
    /// Evaluate the session's grid at its current slider positions.
    pub fn from_session<C: Canvas>(session: &Session<C>) -> AmpsymResult<Self> {
        let data = session.evaluate()?;
        let grid = session.grid();
        let (n_phi, n_costheta) = grid.shape();
        Ok(Self {
            shape: [n_phi, n_costheta],
            phi: grid.phi_axis().to_vec(),
            costheta: grid.costheta_axis().to_vec(),
            intensity: data.iter().copied().collect(),
            controls: session.controls().values(),
        })
    }

    /// Write the export as JSON.
    pub fn write(&self, path: &str) -> AmpsymResult<()> {
        let path = expand_output_path(path)?;
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, self)?;
        info!(path = %path.display(), points = self.intensity.len(), "wrote grid export");
        Ok(())
    }

    /// Read an export written by [`GridExport::write`] or by another program using the same
    /// layout.
    pub fn read(path: &str) -> AmpsymResult<Self> {
        let path = expand_input_path(path)?;
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Evaluate `session` and write the result to `path`.
pub fn export_grid<C: Canvas>(session: &Session<C>, path: &str) -> AmpsymResult<GridExport> {
    let export = GridExport::from_session(session)?;
    export.write(path)?;
    Ok(export)
}

/// The agreement of two grid exports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// The largest `|a - b|`.
    pub max_abs_deviation: f64,
    /// The largest `|a - b| / max(|a|, |b|)`, skipping points where both values are zero.
    pub max_rel_deviation: f64,
    /// The tolerance `max_rel_deviation` was checked against.
    pub rel_tolerance: f64,
    /// Whether `max_rel_deviation` is within the tolerance.
    pub passed: bool,
    /// The number of points compared.
    pub n_points: usize,
}

/// Compare the intensities of two exports point by point.
///
/// # Errors
///
/// Returns [`AmpsymError::ShapeMismatch`] if the grids differ in shape.
pub fn compare_exports(
    reference: &GridExport,
    candidate: &GridExport,
    rel_tolerance: f64,
) -> AmpsymResult<Comparison> {
    if reference.shape != candidate.shape
        || reference.intensity.len() != candidate.intensity.len()
    {
        return Err(AmpsymError::ShapeMismatch {
            left: reference.shape.to_vec(),
            right: candidate.shape.to_vec(),
        });
    }
    let mut max_abs_deviation: f64 = 0.0;
    let mut max_rel_deviation: f64 = 0.0;
    for (a, b) in reference.intensity.iter().zip(&candidate.intensity) {
        let deviation = (a - b).abs();
        let scale = a.abs().max(b.abs());
        max_abs_deviation = max_abs_deviation.max(deviation);
        if scale > 0.0 {
            max_rel_deviation = max_rel_deviation.max(deviation / scale);
        }
        if deviation.is_nan() {
            max_abs_deviation = f64::NAN;
            max_rel_deviation = f64::NAN;
            break;
        }
    }
    let passed = max_rel_deviation <= rel_tolerance;
    Ok(Comparison {
        max_abs_deviation,
        max_rel_deviation,
        rel_tolerance,
        passed,
        n_points: reference.intensity.len(),
    })
}
