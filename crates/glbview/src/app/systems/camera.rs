//! Orbit camera controller.
//!
//! Controls:
//! - Left drag: orbit around the focus point
//! - Right drag: pan the focus point
//! - Scroll wheel: zoom
//!
//! When a model finishes loading the camera reframes itself around the
//! normalized scene at the origin.

use bevy::input::mouse::{MouseMotion, MouseScrollUnit, MouseWheel};
use bevy::prelude::*;
use bevy_egui::EguiContexts;

use glbview_ingest::REFERENCE_SIZE;

use crate::ingest::ModelLoadedEvent;

#[derive(Component)]
pub struct OrbitCamera {
    pub focus: Vec3,
    pub radius: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub sensitivity: f32,
    pub min_radius: f32,
    pub max_radius: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            focus: Vec3::ZERO,
            radius: REFERENCE_SIZE * 1.5,
            yaw: std::f32::consts::FRAC_PI_4,
            pitch: 0.4,
            sensitivity: 0.005,
            min_radius: 0.1,
            max_radius: 1000.0,
        }
    }
}

impl OrbitCamera {
    fn transform(&self) -> Transform {
        let rotation = Quat::from_euler(EulerRot::YXZ, self.yaw, -self.pitch, 0.0);
        let translation = self.focus + rotation * Vec3::new(0.0, 0.0, self.radius);
        Transform::from_translation(translation).looking_at(self.focus, Vec3::Y)
    }
}

pub fn orbit_camera_controller(
    mut contexts: EguiContexts,
    buttons: Res<ButtonInput<MouseButton>>,
    mut motion: EventReader<MouseMotion>,
    mut wheel: EventReader<MouseWheel>,
    mut query: Query<(&mut OrbitCamera, &mut Transform), With<Camera3d>>,
) {
    let Ok((mut orbit, mut transform)) = query.single_mut() else {
        return;
    };

    // Don't fight the UI for pointer input.
    if let Ok(ctx) = contexts.ctx_mut() {
        if ctx.wants_pointer_input() {
            motion.clear();
            wheel.clear();
            return;
        }
    }

    let mut delta = Vec2::ZERO;
    for event in motion.read() {
        delta += event.delta;
    }

    if buttons.pressed(MouseButton::Left) && delta != Vec2::ZERO {
        orbit.yaw -= delta.x * orbit.sensitivity;
        orbit.pitch = (orbit.pitch + delta.y * orbit.sensitivity)
            .clamp(-std::f32::consts::FRAC_PI_2 + 0.01, std::f32::consts::FRAC_PI_2 - 0.01);
    }

    if buttons.pressed(MouseButton::Right) && delta != Vec2::ZERO {
        let pan_speed = orbit.radius * 0.002;
        let right = transform.right();
        let up = transform.up();
        let pan = right * -delta.x * pan_speed + up * delta.y * pan_speed;
        orbit.focus += pan;
    }

    for event in wheel.read() {
        let scroll = match event.unit {
            MouseScrollUnit::Line => event.y * 0.1,
            MouseScrollUnit::Pixel => event.y * 0.002,
        };
        orbit.radius =
            (orbit.radius * (1.0 - scroll)).clamp(orbit.min_radius, orbit.max_radius);
    }

    *transform = orbit.transform();
}

/// Reframe on the freshly normalized model: it is centered at the
/// origin with its largest dimension at the reference size.
pub fn frame_loaded_model(
    mut events: EventReader<ModelLoadedEvent>,
    mut query: Query<(&mut OrbitCamera, &mut Transform), With<Camera3d>>,
) {
    for _event in events.read() {
        let Ok((mut orbit, mut transform)) = query.single_mut() else {
            continue;
        };
        orbit.focus = Vec3::ZERO;
        orbit.radius = REFERENCE_SIZE * 1.5;
        orbit.pitch = 0.3;
        *transform = orbit.transform();
        info!("Camera reframed on loaded model");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orbit_transform_keeps_distance_and_looks_at_focus() {
        let orbit = OrbitCamera {
            focus: Vec3::new(1.0, 2.0, 3.0),
            radius: 7.5,
            ..Default::default()
        };
        let transform = orbit.transform();
        let distance = transform.translation.distance(orbit.focus);
        assert!((distance - 7.5).abs() < 1e-4);

        let forward = transform.forward();
        let to_focus = (orbit.focus - transform.translation).normalize();
        assert!(forward.dot(to_focus) > 0.999);
    }
}
