//! fOS SDF - Signed distance field glyph atlas
//!
//! Rasterizes glyph outlines into single-channel distance tiles packed four
//! to a texel of a growable RGBA atlas:
//! - Curve flattening and the distance encoding ([`segments`], [`encode`])
//! - Software and tiny-skia raster strategies ([`raster`])
//! - Tile addressing and texture growth ([`atlas`])
//! - Bounded context pool and time-sliced drain loop ([`pool`], [`scheduler`])
//! - The size-keyed cache tying it together ([`SdfAtlasCache`])

pub mod config;
pub mod segments;
pub mod encode;
pub mod raster;
pub mod atlas;
pub mod scheduler;
pub mod pool;
mod cache;

pub use atlas::{AtlasLayout, AtlasTexture, TextureSnapshot, TileLocation};
pub use cache::{AtlasStats, DeviceState, SdfAtlasCache, TileAllocation};
pub use config::{AtlasConfig, SchedulerConfig};
pub use encode::{view_box, TileJob};
pub use raster::{RasterBackend, RasterContext, SkiaBackend, SoftwareBackend};

/// SDF atlas error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SdfError {
    #[error("Rendering context lost")]
    ContextLost,

    #[error("Raster backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Raster backend failed: {0}")]
    Backend(String),

    #[error("Cannot grow {tile_size}px atlas to {height}px")]
    AllocationFailed { tile_size: u32, height: u32 },

    #[error("Atlas class {0}px is unusable after an allocation failure")]
    ClassFailed(u32),

    #[error("Invalid SDF tile size: {0}")]
    InvalidTileSize(u32),
}

pub type Result<T> = std::result::Result<T, SdfError>;
