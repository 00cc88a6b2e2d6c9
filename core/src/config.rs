use std::time::Duration;

use crate::camera_controller::{OrbitConfig, DEFAULT_IDLE_DELAY};
use crate::decal::DecalCatalog;
use crate::highlight::HighlightStyle;
use crate::occlusion::{OcclusionMode, DEFAULT_REALTIME_INTERVAL};
use crate::scene_scale::DEFAULT_REGION_FRACTION;

/// Configuration for a [`Viewer`](crate::Viewer) session.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// When occlusion queries run relative to camera motion.
    pub occlusion_mode: OcclusionMode,
    /// Frame interval between query batches in realtime mode.
    pub realtime_query_interval: u64,
    /// Quiet period after the last camera change before it counts as stopped.
    pub idle_delay: Duration,
    pub orbit: OrbitConfig,
    pub highlight: HighlightStyle,
    /// Default region size as a fraction of the scene bounding size.
    pub default_region_fraction: f32,
    /// Decal kind to texture.
    pub decal_textures: DecalCatalog,
    /// Background color (RGBA, 0.0-1.0).
    pub clear_color: [f32; 4],
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            occlusion_mode: OcclusionMode::default(),
            realtime_query_interval: DEFAULT_REALTIME_INTERVAL,
            idle_delay: DEFAULT_IDLE_DELAY,
            orbit: OrbitConfig::default(),
            highlight: HighlightStyle::default(),
            default_region_fraction: DEFAULT_REGION_FRACTION,
            decal_textures: DecalCatalog::default(),
            clear_color: [0.04, 0.04, 0.04, 1.0],
        }
    }
}
