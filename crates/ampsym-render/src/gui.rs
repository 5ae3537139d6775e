use ampsym_core::{AmpsymError, AmpsymResult, Sign};
use eframe::egui;
use ndarray::Array2;
use tracing::warn;

use crate::{
    canvas::{render_heatmap, Canvas},
    session::{RedrawOutcome, Session},
};

/// A [`Canvas`] which keeps the rendered heatmap as an image for an `egui` texture.
#[derive(Clone, Debug, Default)]
pub struct TextureCanvas {
    scale: usize,
    data: Option<Array2<f64>>,
    limits: Option<(f64, f64)>,
    image: Option<egui::ColorImage>,
    message: Option<String>,
}

impl TextureCanvas {
    /// A canvas drawing each grid point as a `scale` by `scale` block.
    pub fn new(scale: usize) -> Self {
        Self {
            scale,
            ..Default::default()
        }
    }

    /// The image drawn since the last call, if any.
    pub fn take_image(&mut self) -> Option<egui::ColorImage> {
        self.image.take()
    }

    /// The last message shown, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl Canvas for TextureCanvas {
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
        let size = [image.width() as usize, image.height() as usize];
        self.image = Some(egui::ColorImage::from_rgb(size, image.as_raw()));
        Ok(())
    }
}

/// A desktop window around a [`Session`]: sliders on the left, one collapsible panel per
/// reflectivity, and the heatmap in the middle.
pub struct SessionApp {
    session: Session<TextureCanvas>,
    texture: Option<egui::TextureHandle>,
    status: String,
}

impl SessionApp {
    /// Wrap a session which has already drawn once.
    pub fn new(session: Session<TextureCanvas>) -> Self {
        Self {
            session,
            texture: None,
            status: String::new(),
        }
    }

    /// The wrapped session.
    pub fn session(&self) -> &Session<TextureCanvas> {
        &self.session
    }

    fn slider(&self, ui: &mut egui::Ui, name: &str, changes: &mut Vec<(String, f64)>) {
        let Some(slider) = self.session.controls().slider(name) else {
            return;
        };
        let mut value = slider.value();
        let response = ui.add(
            egui::Slider::new(&mut value, slider.min()..=slider.max())
                .step_by(slider.step())
                .text(name),
        );
        if response.changed() {
            changes.push((name.to_string(), value));
        }
    }

    fn apply(&mut self, changes: Vec<(String, f64)>, toggles: Vec<Sign>) {
        for sign in toggles {
            self.session.toggle_panel(sign);
        }
        for (name, value) in changes {
            self.status = match self.session.set_control(&name, value) {
                Ok(RedrawOutcome::Drawn { max, .. }) => format!("max intensity {max:.4}"),
                Ok(RedrawOutcome::Failed { message }) => message,
                Err(e) => e.to_string(),
            };
        }
    }
}

impl eframe::App for SessionApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let mut changes = Vec::new();
        let mut toggles = Vec::new();

        egui::SidePanel::left("controls")
            .min_width(260.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    let grouped: Vec<&String> = self
                        .session
                        .panels()
                        .iter()
                        .flat_map(|p| p.controls())
                        .collect();
                    let names: Vec<&String> = self
                        .session
                        .controls()
                        .iter()
                        .map(|(name, _)| name)
                        .filter(|name| !grouped.contains(name))
                        .collect();
                    for name in names {
                        self.slider(ui, name, &mut changes);
                    }
                    for panel in self.session.panels() {
                        let response = egui::CollapsingHeader::new(panel.title())
                            .id_salt(panel.sign().to_string())
                            .open(Some(!panel.collapsed()))
                            .show(ui, |ui| {
                                for name in panel.controls() {
                                    self.slider(ui, name, &mut changes);
                                }
                            });
                        if response.header_response.clicked() {
                            toggles.push(panel.sign());
                        }
                    }
                });
            });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            let message = self.session.canvas().message().unwrap_or(self.status.as_str());
            ui.label(message);
        });

        self.apply(changes, toggles);
        if let Some(image) = self.session.canvas_mut().take_image() {
            let options = egui::TextureOptions::NEAREST;
            self.texture = Some(match self.texture.take() {
                Some(mut texture) => {
                    texture.set(image, options);
                    texture
                }
                None => ctx.load_texture("heatmap", image, options),
            });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(texture) = &self.texture {
                ui.add(egui::Image::new(texture).fit_to_exact_size(ui.available_size()));
            }
        });
    }
}

/// Open a window for `session` and block until it is closed.
///
/// # Errors
///
/// Returns [`AmpsymError::Render`] if the window cannot be created.
pub fn run(session: Session<TextureCanvas>) -> AmpsymResult<()> {
    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "ampsym",
        options,
        Box::new(|_cc| Ok(Box::new(SessionApp::new(session)))),
    )
    .map_err(|e| AmpsymError::Render(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GridConfig, SessionConfig};

    #[test]
    fn test_texture_canvas_hands_out_each_image_once() {
        let config = SessionConfig {
            grid: GridConfig {
                n_phi: 10,
                n_costheta: 6,
            },
            ..Default::default()
        };
        let session = Session::from_config(&config, TextureCanvas::new(2)).unwrap();
        let mut app = SessionApp::new(session);
        let image = app.session.canvas_mut().take_image().unwrap();
        assert_eq!(image.size[1], 12);
        assert!(image.size[0] > 20);
        assert!(app.session.canvas_mut().take_image().is_none());

        app.apply(vec![("P".to_string(), 1.0)], vec![Sign::Negative]);
        assert!(app.session().panels()[1].collapsed());
        assert!(app.status.starts_with("max intensity"));
        assert!(app.session.canvas_mut().take_image().is_some());

        app.apply(vec![("nope".to_string(), 1.0)], Vec::new());
        assert_eq!(app.status, "No control named \"nope\"");
    }
}
