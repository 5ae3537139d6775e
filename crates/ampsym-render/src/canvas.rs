use std::path::{Path, PathBuf};

use ampsym_core::{utils::paths::expand_output_path, AmpsymError, AmpsymResult};
use image::{ImageFormat, RgbImage};
use ndarray::Array2;
use plotters::prelude::*;
use tracing::{debug, warn};

/// A surface which shows a heatmap of an intensity grid.
///
/// The first axis of the data runs along $`\phi`$ and the second along $`\cos\theta`$.
pub trait Canvas {
    /// Replace the data shown by the canvas.
    fn set_data(&mut self, data: &Array2<f64>);
    /// Set the values mapped to the bottom and top of the color scale.
    fn set_color_limits(&mut self, lo: f64, hi: f64);
    /// The current color limits, or [`None`] before they were first set.
    fn color_limits(&self) -> Option<(f64, f64)>;
    /// Show a message in place of (or on top of) the heatmap.
    fn show_message(&mut self, message: &str);
    /// Present the current data.
    fn draw(&mut self) -> AmpsymResult<()>;
}

/// A [`Canvas`] which only keeps what it is given.
#[derive(Clone, Debug, Default)]
pub struct MemoryCanvas {
    data: Option<Array2<f64>>,
    limits: Option<(f64, f64)>,
    messages: Vec<String>,
    draws: usize,
}

impl MemoryCanvas {
    /// An empty canvas.
    pub fn new() -> Self {
        Self::default()
    }
    /// The last data handed to [`Canvas::set_data`].
    pub fn data(&self) -> Option<&Array2<f64>> {
        self.data.as_ref()
    }
    /// Every message shown so far.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }
    /// How many times [`Canvas::draw`] was called.
    pub fn draws(&self) -> usize {
        self.draws
    }
}

impl Canvas for MemoryCanvas {
    fn set_data(&mut self, data: &Array2<f64>) {
        self.data = Some(data.clone());
    }
    fn set_color_limits(&mut self, lo: f64, hi: f64) {
        self.limits = Some((lo, hi));
    }
    fn color_limits(&self) -> Option<(f64, f64)> {
        self.limits
    }
    fn show_message(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
    fn draw(&mut self) -> AmpsymResult<()> {
        self.draws += 1;
        Ok(())
    }
}

const COLORBAR_GAP: usize = 8;
const COLORBAR_WIDTH: usize = 16;

fn render_error<E: std::fmt::Display>(e: E) -> AmpsymError {
    AmpsymError::Render(e.to_string())
}

/// The viridis color at `t` in $`[0, 1]`$. Values outside are clamped.
pub fn palette(t: f64) -> RGBColor {
    ViridisRGB {}.get_color(t.clamp(0.0, 1.0) as f32)
}

/// The color of `value` on a scale from `lo` to `hi`. Non-finite values are black.
pub fn heat_color(value: f64, lo: f64, hi: f64) -> RGBColor {
    if !value.is_finite() {
        return BLACK;
    }
    let span = if hi > lo { hi - lo } else { 1.0 };
    palette((value - lo) / span)
}

/// Draw `data` as a heatmap with a colorbar on its right, each grid point a `scale` by `scale`
/// block, colored between the limits `lo` and `hi`. $`\phi`$ runs left to right and
/// $`\cos\theta = +1`$ is at the top.
///
/// # Errors
///
/// Returns [`AmpsymError::Render`] for an empty grid or if drawing fails.
pub fn render_heatmap(
    data: &Array2<f64>,
    (lo, hi): (f64, f64),
    scale: usize,
) -> AmpsymResult<RgbImage> {
    if data.is_empty() {
        return Err(AmpsymError::Render("the grid is empty".to_string()));
    }
    let scale = scale.max(1);
    let (n_phi, n_costheta) = data.dim();
    let (map_width, height) = (n_phi * scale, n_costheta * scale);
    let width = map_width + COLORBAR_GAP + COLORBAR_WIDTH;
    let mut raster = vec![0u8; width * height * 3];
    {
        let root = BitMapBackend::with_buffer(&mut raster, (width as u32, height as u32))
            .into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;
        let (map, colorbar) = root.split_horizontally(map_width as i32);

        let mut chart = ChartBuilder::on(&map)
            .build_cartesian_2d(0..n_phi as i32, 0..n_costheta as i32)
            .map_err(render_error)?;
        chart
            .draw_series(data.indexed_iter().map(|((i, j), &value)| {
                let (i, j) = (i as i32, j as i32);
                Rectangle::new([(i, j + 1), (i + 1, j)], heat_color(value, lo, hi).filled())
            }))
            .map_err(render_error)?;

        let (x0, x1) = (COLORBAR_GAP as i32, (COLORBAR_GAP + COLORBAR_WIDTH) as i32 - 1);
        let top = (height as i32 - 1).max(1);
        for y in 0..height as i32 {
            let t = 1.0 - f64::from(y) / f64::from(top);
            colorbar
                .draw(&Rectangle::new([(x0, y), (x1, y)], palette(t).filled()))
                .map_err(render_error)?;
        }
        root.present().map_err(render_error)?;
    }
    RgbImage::from_raw(width as u32, height as u32, raster)
        .ok_or_else(|| AmpsymError::Render("the raster does not match the image size".to_string()))
}

/// A [`Canvas`] which renders with [`render_heatmap`] and saves a PNG image on every draw.
#[derive(Clone, Debug)]
pub struct HeatmapCanvas {
    path: PathBuf,
    scale: usize,
    data: Option<Array2<f64>>,
    limits: Option<(f64, f64)>,
    image: Option<RgbImage>,
    message: Option<String>,
}

impl HeatmapCanvas {
    /// A canvas writing to `path`, drawing each grid point as a `scale` by `scale` block.
    pub fn new(path: &str, scale: usize) -> AmpsymResult<Self> {
        Ok(Self {
            path: expand_output_path(path)?,
            scale,
            data: None,
            limits: None,
            image: None,
            message: None,
        })
    }

    /// The image file written by [`Canvas::draw`].
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last drawn image, colorbar included.
    pub fn image(&self) -> Option<&RgbImage> {
        self.image.as_ref()
    }

    /// The last message shown, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl Canvas for HeatmapCanvas {
    fn set_data(&mut self, data: &Array2<f64>) {
        self.data = Some(data.clone());
        self.message = None;
    }
    fn set_color_limits(&mut self, lo: f64, hi: f64) {
        self.limits = Some((lo, hi));
    }
    fn color_limits(&self) -> Option<(f64, f64)> {
        self.limits
    }
    fn show_message(&mut self, message: &str) {
        warn!("{message}");
        self.message = Some(message.to_string());
    }
    fn draw(&mut self) -> AmpsymResult<()> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| AmpsymError::Render("the canvas has no data to draw".to_string()))?;
        let image = render_heatmap(data, self.limits.unwrap_or((0.0, 1.0)), self.scale)?;
        image
            .save_with_format(&self.path, ImageFormat::Png)
            .map_err(render_error)?;
        debug!(
            path = %self.path.display(),
            width = image.width(),
            height = image.height(),
            "wrote heatmap"
        );
        self.image = Some(image);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(color: RGBColor) -> [u8; 3] {
        [color.0, color.1, color.2]
    }

    #[test]
    fn test_heat_color_clamps_and_blackens() {
        assert_eq!(rgb(heat_color(-3.0, 0.0, 1.0)), rgb(palette(0.0)));
        assert_eq!(rgb(heat_color(5.0, 0.0, 1.0)), rgb(palette(1.0)));
        assert_eq!(rgb(heat_color(f64::NAN, 0.0, 1.0)), [0, 0, 0]);
        assert_eq!(rgb(heat_color(f64::INFINITY, 0.0, 1.0)), [0, 0, 0]);
        assert_ne!(rgb(palette(0.0)), rgb(palette(1.0)));
    }

    #[test]
    fn test_memory_canvas_records() {
        let mut canvas = MemoryCanvas::new();
        assert!(canvas.color_limits().is_none());
        canvas.set_data(&Array2::zeros((2, 3)));
        canvas.set_color_limits(0.0, 2.0);
        canvas.show_message("hello");
        canvas.draw().unwrap();
        assert_eq!(canvas.data().unwrap().dim(), (2, 3));
        assert_eq!(canvas.color_limits(), Some((0.0, 2.0)));
        assert_eq!(canvas.messages(), &["hello"]);
        assert_eq!(canvas.draws(), 1);
    }

    #[test]
    fn test_render_layout() {
        // phi along rows, cos(theta) along columns: the top of the image is cos(theta) = +1
        let data = Array2::from_shape_vec((2, 2), vec![0.0, 1.0, 0.0, 0.0]).unwrap();
        let image = render_heatmap(&data, (0.0, 1.0), 4).unwrap();
        let (width, height) = (image.width(), image.height());
        assert_eq!(width as usize, 8 + COLORBAR_GAP + COLORBAR_WIDTH);
        assert_eq!(height, 8);
        let pixel = |x: u32, y: u32| image.get_pixel(x, y).0;
        assert_eq!(pixel(1, 1), rgb(palette(1.0)));
        assert_eq!(pixel(1, height - 2), rgb(palette(0.0)));
        assert_eq!(pixel(6, 1), rgb(palette(0.0)));
        let bar = (8 + COLORBAR_GAP + COLORBAR_WIDTH / 2) as u32;
        assert_eq!(pixel(bar, 0), rgb(palette(1.0)));
        assert_eq!(pixel(bar, height - 1), rgb(palette(0.0)));
        assert!(matches!(
            render_heatmap(&Array2::zeros((0, 3)), (0.0, 1.0), 2),
            Err(AmpsymError::Render(_))
        ));
    }

    #[test]
    fn test_heatmap_writes_png() {
        let path = std::env::temp_dir().join(format!("ampsym-canvas-{}.png", std::process::id()));
        let mut canvas = HeatmapCanvas::new(path.to_str().unwrap(), 2).unwrap();
        assert!(matches!(canvas.draw(), Err(AmpsymError::Render(_))));
        canvas.set_data(&Array2::from_elem((3, 2), 0.5));
        canvas.draw().unwrap();
        let image = canvas.image().unwrap();
        assert_eq!(image.dimensions(), ((6 + COLORBAR_GAP + COLORBAR_WIDTH) as u32, 4));
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        std::fs::remove_file(path).unwrap();
    }
}
