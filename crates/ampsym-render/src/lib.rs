//! Interactive heatmap sessions for `ampsym` intensity models.
//!
//! A [`Session`] evaluates a compiled intensity over a fixed [`GridSample`] of
//! $`(\phi, \cos\theta)`$, feeds its arguments from a [`ControlSet`] of sliders, and hands the
//! result to a [`Canvas`]. Sessions are usually built from a [`SessionConfig`]:
//!
//! ```ignore
//! use ampsym_render::{HeatmapCanvas, Session, SessionConfig};
//!
//! let config = SessionConfig::from_file("session.toml")?;
//! let canvas = HeatmapCanvas::new(&config.canvas.output, config.canvas.scale)?;
//! let mut session = Session::from_config(&config, canvas)?;
//! session.set_control("A+[0,0] mag", 1.5)?;
//! ```
#![warn(clippy::perf, clippy::style, missing_docs)]

/// The [`Canvas`] trait and its heatmap and in-memory implementations.
pub mod canvas;
/// Session settings read from TOML.
pub mod config;
/// Sliders and panels.
pub mod controls;
/// Grid exports for cross-checking against other programs.
pub mod export;
/// The $`(\phi, \cos\theta)`$ grid.
pub mod grid;
/// A desktop window with sliders and collapsible panels, built on `eframe`.
#[cfg(feature = "gui")]
pub mod gui;
/// Sessions tying a compiled intensity to its sliders and canvas.
pub mod session;

pub use canvas::{render_heatmap, Canvas, HeatmapCanvas, MemoryCanvas};
pub use config::{CanvasConfig, ControlsConfig, GridConfig, ModelConfig, SessionConfig};
pub use controls::{ControlSet, Panel, Slider};
pub use export::{compare_exports, export_grid, Comparison, GridExport};
pub use grid::GridSample;
pub use session::{RedrawOutcome, RenderState, Session};
