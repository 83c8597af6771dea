//! Frame statistics for the stats overlay.

use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;

/// Smoothed frame statistics, updated once per frame.
#[derive(Resource, Default, Debug)]
pub struct ViewerStats {
    pub fps: f64,
    pub frame_time_ms: f64,
}

pub struct ViewerDiagnosticsPlugin;

impl Plugin for ViewerDiagnosticsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ViewerStats>()
            .add_systems(Update, update_stats);
    }
}

fn update_stats(diagnostics: Res<DiagnosticsStore>, mut stats: ResMut<ViewerStats>) {
    if let Some(fps) = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|diagnostic| diagnostic.smoothed())
    {
        stats.fps = fps;
    }
    if let Some(frame_time) = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FRAME_TIME)
        .and_then(|diagnostic| diagnostic.smoothed())
    {
        stats.frame_time_ms = frame_time;
    }
}
