use std::path::Path;

use bevy::diagnostic::FrameTimeDiagnosticsPlugin;
use bevy::prelude::*;
use bevy::window::{Window, WindowPlugin};

use glbview::app::cli::Args;
use glbview::app::settings::Settings;
use glbview::app::systems::camera::{frame_loaded_model, orbit_camera_controller, OrbitCamera};
use glbview::app::systems::diagnostics::ViewerDiagnosticsPlugin;
use glbview::ingest::{IngestPlugin, LoadModelRequest, ModelOrigin};
use glbview::{backend, BackendConfig, RenderBackend, ViewerUiPlugin};

fn main() {
    let args = Args::parse_args();

    if args.verbose {
        info!("Starting glbview...");
        if let Some(ref path) = args.path {
            info!("Path provided: {:?}", path);
        }
    }

    // Per-directory settings fill gaps the command line leaves open.
    let settings = args
        .path
        .as_deref()
        .and_then(Path::parent)
        .and_then(|dir| Settings::load_from_dir(dir).ok().flatten())
        .unwrap_or_default();

    let backend_arg = if args.backend != "auto" {
        args.backend.clone()
    } else {
        settings.backend.clone().unwrap_or_else(|| "auto".to_string())
    };

    let backend = match RenderBackend::from_arg(&backend_arg) {
        Ok(Some(backend)) => backend,
        Ok(None) => backend::probe(),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let chunk_size = args
        .chunk_size_mb
        .or(settings.chunk_size_mb)
        .map(|mib| mib * 1024 * 1024)
        .unwrap_or_else(|| backend.chunk_size());

    info!(
        "Render backend: {} ({} MiB chunks)",
        backend.label(),
        chunk_size / (1024 * 1024)
    );

    App::new()
        .add_plugins(
            DefaultPlugins
                .set(backend.render_plugin())
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "glbview".to_string(),
                        ..default()
                    }),
                    ..default()
                }),
        )
        .add_plugins(FrameTimeDiagnosticsPlugin::default())
        .add_plugins(ViewerDiagnosticsPlugin)
        .add_plugins(IngestPlugin)
        .add_plugins(ViewerUiPlugin)
        .insert_resource(BackendConfig {
            backend,
            chunk_size,
        })
        .insert_resource(args)
        .add_systems(Startup, (setup, request_initial_load))
        .add_systems(
            Update,
            (orbit_camera_controller, frame_loaded_model, draw_grid),
        )
        .run();
}

fn setup(mut commands: Commands) {
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(10.0, 7.5, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
        OrbitCamera::default(),
    ));

    // Key light with shadows.
    commands.spawn((
        DirectionalLight {
            illuminance: 10000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(5.0, 10.0, 5.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    // Fill light from the opposite side.
    commands.spawn((
        PointLight {
            intensity: 50000.0,
            shadows_enabled: false,
            range: 200.0,
            ..default()
        },
        Transform::from_xyz(-15.0, 20.0, -15.0),
    ));

    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 300.0,
        ..default()
    });
}

/// Reference grid under the model.
fn draw_grid(mut gizmos: Gizmos) {
    gizmos.grid(
        Isometry3d::from_rotation(Quat::from_rotation_x(std::f32::consts::FRAC_PI_2)),
        UVec2::splat(20),
        Vec2::splat(1.0),
        Color::srgb(0.25, 0.25, 0.25),
    );
}

/// Queue the initial load from the command line, if any.
fn request_initial_load(args: Res<Args>, mut requests: EventWriter<LoadModelRequest>) {
    if let Some(url) = &args.url {
        info!("Loading model from URL: {}", url);
        requests.write(LoadModelRequest {
            origin: ModelOrigin::Url(url.clone()),
        });
    } else if let Some(path) = &args.path {
        if path.is_file() {
            info!("Loading model file: {:?}", path);
            requests.write(LoadModelRequest {
                origin: ModelOrigin::File(path.clone()),
            });
        } else {
            error!("Path does not exist: {:?}", path);
        }
    }
}
