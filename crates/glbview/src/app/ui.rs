//! egui overlays: loading progress, model stats and load errors.

use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPlugin};

use crate::app::systems::diagnostics::ViewerStats;
use crate::backend::BackendConfig;
use crate::ingest::{LoadProgress, ModelIngestSession};

pub struct ViewerUiPlugin;

impl Plugin for ViewerUiPlugin {
    fn build(&self, app: &mut App) {
        if !app.is_plugin_added::<EguiPlugin>() {
            app.add_plugins(EguiPlugin {
                enable_multipass_for_primary_context: false,
            });
        }
        app.add_systems(Update, (loading_overlay, stats_panel));
    }
}

/// Centered progress bar while a load is in flight, or the error
/// dialog when the last one failed.
fn loading_overlay(mut contexts: EguiContexts, mut progress: ResMut<LoadProgress>) {
    let Ok(ctx) = contexts.ctx_mut() else {
        return;
    };

    if progress.active {
        egui::Window::new("Loading")
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .collapsible(false)
            .resizable(false)
            .title_bar(false)
            .show(ctx, |ui| {
                ui.label(progress.phase_label);
                ui.add(
                    egui::ProgressBar::new(progress.fraction)
                        .desired_width(260.0)
                        .show_percentage(),
                );
            });
        return;
    }

    let mut dismissed = false;
    if let Some(error) = progress.error.as_ref() {
        egui::Window::new("Load failed")
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.label(error);
                if progress.out_of_memory {
                    ui.separator();
                    ui.label(
                        "The model did not fit in memory. Try a Draco-compressed \
                         or smaller file, or run glb-compress on it first.",
                    );
                }
                if ui.button("Dismiss").clicked() {
                    dismissed = true;
                }
            });
    }
    if dismissed {
        progress.error = None;
        progress.out_of_memory = false;
    }
}

/// Top-left panel with backend, model and frame statistics.
fn stats_panel(
    mut contexts: EguiContexts,
    session: Res<ModelIngestSession>,
    stats: Res<ViewerStats>,
    config: Res<BackendConfig>,
) {
    let Ok(ctx) = contexts.ctx_mut() else {
        return;
    };

    egui::Window::new("Stats")
        .anchor(egui::Align2::LEFT_TOP, egui::vec2(10.0, 10.0))
        .collapsible(true)
        .resizable(false)
        .show(ctx, |ui| {
            ui.label(format!("Renderer: {}", config.backend.label()));
            ui.label(format!("FPS: {:.0}", stats.fps));

            match session.current() {
                Some(model) => {
                    let size = model.summary.bounding_size();
                    ui.separator();
                    ui.label(format!("Model: {}", model.origin));
                    ui.label(format!("File size: {:.2} MB", model.file_size_mb));
                    ui.label(format!(
                        "Triangles: {}",
                        format_count(model.summary.triangle_count)
                    ));
                    ui.label(format!(
                        "Bounds: {:.2} x {:.2} x {:.2}",
                        size[0], size[1], size[2]
                    ));
                }
                None => {
                    ui.separator();
                    ui.label("No model loaded");
                }
            }
        });
}

/// Thousands-separated count for display.
fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_formatting() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1234567), "1,234,567");
    }
}
