//! Canonical viewpoints for reproducible evaluation
//!
//! The standard 5-view protocol gives every scene the same relative camera
//! placements; a per-scene distance multiplier adapts them to scene scale.
//! Presets are immutable values: scaling and view capture always produce
//! new instances.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Default distance multiplier for scenes without a catalog entry.
pub const DEFAULT_DISTANCE_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Scene-independent viewpoint definition. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewpointPreset {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Position relative to scene center, scaled by the scene multiplier
    /// before use.
    pub position: Vec3,
    /// Look-at target, usually the scene center.
    pub target: Vec3,
    /// Field of view in degrees; hosts fall back to their default when absent.
    pub fov: Option<f64>,
}

fn preset(
    id: &str,
    name: &str,
    description: &str,
    position: Vec3,
    target: Vec3,
) -> ViewpointPreset {
    ViewpointPreset {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        position,
        target,
        fov: None,
    }
}

/// The standard 5-viewpoint evaluation protocol.
pub fn standard_viewpoints() -> Vec<ViewpointPreset> {
    let origin = Vec3::new(0.0, 0.0, 0.0);
    vec![
        preset(
            "front",
            "Front Center",
            "Default head-on view at medium distance",
            Vec3::new(0.0, 0.0, 3.5),
            origin,
        ),
        preset(
            "close",
            "Close-Up Detail",
            "Zoomed in for texture detail inspection",
            Vec3::new(0.0, 0.0, 1.5),
            origin,
        ),
        preset(
            "wide",
            "Wide Angle",
            "Full scene overview from elevated position",
            Vec3::new(0.0, 2.0, 6.0),
            origin,
        ),
        preset(
            "left45",
            "Left 45",
            "45-degree rotation to the left",
            Vec3::new(-2.5, 0.0, 2.5),
            origin,
        ),
        preset(
            "right45",
            "Right 45",
            "45-degree rotation to the right",
            Vec3::new(2.5, 0.0, 2.5),
            origin,
        ),
    ]
}

/// Camera scale parameters for one catalog scene.
#[derive(Debug, Clone, Copy)]
pub struct SceneCameraConfig {
    pub scene_id: &'static str,
    /// Multiplier for camera distance from center; higher moves the
    /// camera further back.
    pub distance_multiplier: f64,
    /// Estimated bounding-sphere radius of the scene.
    pub estimated_radius: f64,
}

/// Scale catalog for the canonical evaluation scenes.
pub const SCENE_CAMERA_CONFIGS: &[SceneCameraConfig] = &[
    SceneCameraConfig {
        scene_id: "bonsai",
        distance_multiplier: 1.2,
        estimated_radius: 1.5,
    },
    SceneCameraConfig {
        scene_id: "garden",
        distance_multiplier: 2.0,
        estimated_radius: 3.0,
    },
    SceneCameraConfig {
        scene_id: "playroom",
        distance_multiplier: 2.5,
        estimated_radius: 4.0,
    },
    SceneCameraConfig {
        scene_id: "truck",
        distance_multiplier: 1.8,
        estimated_radius: 2.5,
    },
    SceneCameraConfig {
        scene_id: "train",
        distance_multiplier: 1.6,
        estimated_radius: 2.2,
    },
    SceneCameraConfig {
        scene_id: "flower",
        distance_multiplier: 0.8,
        estimated_radius: 0.8,
    },
];

/// Look up the camera configuration for a scene, case-insensitively.
pub fn scene_camera_config(scene_name: &str) -> Option<&'static SceneCameraConfig> {
    SCENE_CAMERA_CONFIGS
        .iter()
        .find(|config| config.scene_id.eq_ignore_ascii_case(scene_name))
}

/// Distance multiplier for a scene, `DEFAULT_DISTANCE_MULTIPLIER` when unknown.
pub fn distance_multiplier_for(scene_name: &str) -> f64 {
    scene_camera_config(scene_name)
        .map(|config| config.distance_multiplier)
        .unwrap_or(DEFAULT_DISTANCE_MULTIPLIER)
}

/// A copy of `viewpoint` with its position scaled for `scene_name`.
/// The target and all other fields are untouched.
pub fn scaled_for_scene(viewpoint: &ViewpointPreset, scene_name: &str) -> ViewpointPreset {
    let multiplier = distance_multiplier_for(scene_name);
    ViewpointPreset {
        position: viewpoint.position.scaled(multiplier),
        ..viewpoint.clone()
    }
}

/// All standard viewpoints scaled for one scene.
pub fn scene_presets(scene_name: &str) -> Vec<ViewpointPreset> {
    standard_viewpoints()
        .iter()
        .map(|vp| scaled_for_scene(vp, scene_name))
        .collect()
}

/// Bounding-sphere radius of a splat cloud from its xyz position triples.
pub fn estimate_scene_radius(splat_positions: &[f32]) -> f64 {
    let mut max_distance = 0.0f64;
    for xyz in splat_positions.chunks_exact(3) {
        let distance = Vec3::new(xyz[0] as f64, xyz[1] as f64, xyz[2] as f64).length();
        max_distance = max_distance.max(distance);
    }
    max_distance
}

/// Auto-generate presets for an uncataloged scene from its estimated
/// radius, keeping the front view at 3.5x radius like the catalog scenes.
pub fn presets_for_radius(estimated_radius: f64) -> Vec<ViewpointPreset> {
    let multiplier = if estimated_radius > 0.0 {
        3.5 / estimated_radius
    } else {
        DEFAULT_DISTANCE_MULTIPLIER
    };
    standard_viewpoints()
        .into_iter()
        .map(|vp| ViewpointPreset {
            position: vp.position.scaled(multiplier),
            ..vp
        })
        .collect()
}

/// Camera/controls handle on one viewer slot, owned by the host renderer.
pub trait ViewerContext {
    fn set_camera_position(&mut self, position: Vec3);
    fn set_look_at(&mut self, target: Vec3);
    fn set_fov(&mut self, fov_degrees: f64);

    /// Commit pending camera changes (the controls update step).
    fn commit(&mut self);

    fn camera_position(&self) -> Vec3;
    fn look_at(&self) -> Vec3;
    fn fov(&self) -> f64;
}

/// Apply a preset to a live viewer context.
pub fn apply_viewpoint(context: &mut dyn ViewerContext, viewpoint: &ViewpointPreset) {
    context.set_camera_position(viewpoint.position);
    context.set_look_at(viewpoint.target);
    if let Some(fov) = viewpoint.fov {
        context.set_fov(fov);
    }
    context.commit();
}

/// Snapshot the current camera state as a new custom preset, for saving
/// user-defined viewpoints.
pub fn capture_current_view(context: &dyn ViewerContext) -> ViewpointPreset {
    ViewpointPreset {
        id: format!("custom_{}", Utc::now().timestamp_millis()),
        name: "Custom View".to_string(),
        description: "User-defined viewpoint".to_string(),
        position: context.camera_position(),
        target: context.look_at(),
        fov: Some(context.fov()),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        apply_viewpoint, capture_current_view, distance_multiplier_for, estimate_scene_radius,
        presets_for_radius, scaled_for_scene, scene_presets, standard_viewpoints, Vec3,
        ViewerContext, ViewpointPreset, DEFAULT_DISTANCE_MULTIPLIER,
    };

    struct FakeContext {
        position: Vec3,
        target: Vec3,
        fov: f64,
        commits: usize,
    }

    impl ViewerContext for FakeContext {
        fn set_camera_position(&mut self, position: Vec3) {
            self.position = position;
        }
        fn set_look_at(&mut self, target: Vec3) {
            self.target = target;
        }
        fn set_fov(&mut self, fov_degrees: f64) {
            self.fov = fov_degrees;
        }
        fn commit(&mut self) {
            self.commits += 1;
        }
        fn camera_position(&self) -> Vec3 {
            self.position
        }
        fn look_at(&self) -> Vec3 {
            self.target
        }
        fn fov(&self) -> f64 {
            self.fov
        }
    }

    #[test]
    fn standard_protocol_has_five_views() {
        let views = standard_viewpoints();
        assert_eq!(views.len(), 5);
        let ids: Vec<&str> = views.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["front", "close", "wide", "left45", "right45"]);
    }

    #[test]
    fn known_scenes_use_catalog_multiplier() {
        assert_eq!(distance_multiplier_for("bonsai"), 1.2);
        assert_eq!(distance_multiplier_for("Garden"), 2.0);
        assert_eq!(
            distance_multiplier_for("unknown-scene"),
            DEFAULT_DISTANCE_MULTIPLIER
        );
    }

    #[test]
    fn scaling_touches_position_only_and_leaves_original_intact() {
        let views = standard_viewpoints();
        let front = &views[0];
        let scaled = scaled_for_scene(front, "garden");
        assert_eq!(scaled.position.z, 7.0);
        assert_eq!(scaled.target, front.target);
        assert_eq!(scaled.id, front.id);
        // Source preset unchanged.
        assert_eq!(front.position.z, 3.5);
    }

    #[test]
    fn scene_presets_scale_all_views() {
        let presets = scene_presets("flower");
        assert_eq!(presets.len(), 5);
        assert!((presets[0].position.z - 3.5 * 0.8).abs() < 1e-9);
        assert!((presets[2].position.y - 2.0 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn radius_estimate_finds_furthest_splat() {
        let positions = [0.0f32, 0.0, 0.0, 3.0, 4.0, 0.0, 1.0, 0.0, 0.0];
        assert!((estimate_scene_radius(&positions) - 5.0).abs() < 1e-9);
        assert_eq!(estimate_scene_radius(&[]), 0.0);
    }

    #[test]
    fn radius_presets_put_front_view_at_baseline() {
        let presets = presets_for_radius(7.0);
        assert!((presets[0].position.z - 1.75).abs() < 1e-9);
        // Zero radius falls back to the default multiplier.
        let fallback = presets_for_radius(0.0);
        assert!((fallback[0].position.z - 3.5 * DEFAULT_DISTANCE_MULTIPLIER).abs() < 1e-9);
    }

    #[test]
    fn apply_viewpoint_commits_camera_and_optional_fov() {
        let mut context = FakeContext {
            position: Vec3::new(0.0, 0.0, 0.0),
            target: Vec3::new(0.0, 0.0, 0.0),
            fov: 60.0,
            commits: 0,
        };
        let mut viewpoint = standard_viewpoints().remove(2);
        apply_viewpoint(&mut context, &viewpoint);
        assert_eq!(context.position, viewpoint.position);
        assert_eq!(context.fov, 60.0);
        assert_eq!(context.commits, 1);

        viewpoint = ViewpointPreset {
            fov: Some(45.0),
            ..viewpoint
        };
        apply_viewpoint(&mut context, &viewpoint);
        assert_eq!(context.fov, 45.0);
        assert_eq!(context.commits, 2);
    }

    #[test]
    fn captured_view_is_a_fresh_preset() {
        let context = FakeContext {
            position: Vec3::new(1.0, 2.0, 3.0),
            target: Vec3::new(0.0, 1.0, 0.0),
            fov: 52.0,
            commits: 0,
        };
        let view = capture_current_view(&context);
        assert!(view.id.starts_with("custom_"));
        assert_eq!(view.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(view.fov, Some(52.0));
    }
}
