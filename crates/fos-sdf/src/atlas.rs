//! Atlas texture for one tile resolution
//!
//! Four tiles share a texel slot, one per RGBA channel. Slots fill the
//! texture row-major; the width is fixed and the height doubles on demand.

use std::sync::Arc;

use crate::{Result, SdfError};

/// Tiles packed into one slot
pub const CHANNELS_PER_SLOT: u32 = 4;

/// Where a tile index lives in the texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileLocation {
    pub column: u32,
    pub row: u32,
    pub channel: u32,
}

/// Tile index to texture addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasLayout {
    pub tile_size: u32,
    pub columns: u32,
}

impl AtlasLayout {
    /// Width is rounded down to whole tiles, keeping at least one column.
    pub fn new(tile_size: u32, texture_width: u32) -> Result<Self> {
        if tile_size == 0 {
            return Err(SdfError::InvalidTileSize(tile_size));
        }
        Ok(Self { tile_size, columns: (texture_width / tile_size).max(1) })
    }

    pub fn width(&self) -> u32 {
        self.columns * self.tile_size
    }

    pub fn locate(&self, index: u32) -> TileLocation {
        let slot = index / CHANNELS_PER_SLOT;
        TileLocation {
            column: slot % self.columns,
            row: slot / self.columns,
            channel: index % CHANNELS_PER_SLOT,
        }
    }

    /// Tile rows needed to hold `tile_count` tiles
    pub fn rows_for(&self, tile_count: u32) -> u32 {
        let slots = tile_count.div_ceil(CHANNELS_PER_SLOT);
        slots.div_ceil(self.columns)
    }

    /// Tiles that fit in a texture of the given height
    pub fn capacity(&self, height: u32) -> u32 {
        (height / self.tile_size) * self.columns * CHANNELS_PER_SLOT
    }

    /// Normalized `[u0, v0, u1, v1]` of a tile, v growing downward
    pub fn uv_rect(&self, index: u32, texture_height: u32) -> [f32; 4] {
        let loc = self.locate(index);
        let w = self.width() as f32;
        let h = texture_height.max(1) as f32;
        let x = (loc.column * self.tile_size) as f32;
        let y = (loc.row * self.tile_size) as f32;
        let size = self.tile_size as f32;
        [x / w, y / h, (x + size) / w, (y + size) / h]
    }
}

/// Immutable view of an atlas texture
#[derive(Debug, Clone)]
pub struct TextureSnapshot {
    pub tile_size: u32,
    pub width: u32,
    pub height: u32,
    /// Bumped on every published change
    pub version: u64,
    /// RGBA8, row-major
    pub pixels: Arc<[u8]>,
}

impl TextureSnapshot {
    /// Extract the channel of one tile as `tile_size * tile_size` bytes.
    pub fn read_tile(&self, index: u32) -> Option<Vec<u8>> {
        let layout = AtlasLayout::new(self.tile_size, self.width).ok()?;
        read_channel(&layout, self.height, &self.pixels, index)
    }
}

/// Growable RGBA pixel store
#[derive(Debug, Clone)]
pub struct AtlasTexture {
    layout: AtlasLayout,
    height: u32,
    pixels: Vec<u8>,
    version: u64,
}

impl AtlasTexture {
    /// One tile row high
    pub fn new(layout: AtlasLayout) -> Self {
        let height = layout.tile_size;
        Self {
            pixels: vec![0; (layout.width() * height * 4) as usize],
            layout,
            height,
            version: 0,
        }
    }

    pub fn layout(&self) -> &AtlasLayout {
        &self.layout
    }

    pub fn width(&self) -> u32 {
        self.layout.width()
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn capacity(&self) -> u32 {
        self.layout.capacity(self.height)
    }

    /// Number this texture's versions after `previous`, so a replacement
    /// never reports a version a reader has already seen.
    pub fn supersede(&mut self, previous: &AtlasTexture) {
        self.version = self.version.max(previous.version) + 1;
    }

    /// Double the height until `tile_count` tiles fit. Existing rows keep
    /// their bytes; the new rows start cleared.
    ///
    /// Returns whether the texture grew.
    pub fn ensure_capacity(&mut self, tile_count: u32, max_height: u32) -> Result<bool> {
        let needed = self.layout.rows_for(tile_count) * self.layout.tile_size;
        if needed <= self.height {
            return Ok(false);
        }
        let mut height = self.height;
        while height < needed {
            height = height.saturating_mul(2);
        }
        if height > max_height {
            return Err(SdfError::AllocationFailed { tile_size: self.layout.tile_size, height });
        }
        let len = (self.layout.width() as usize) * (height as usize) * 4;
        self.pixels.try_reserve_exact(len - self.pixels.len()).map_err(|_| {
            SdfError::AllocationFailed { tile_size: self.layout.tile_size, height }
        })?;
        self.pixels.resize(len, 0);
        self.height = height;
        self.version += 1;
        Ok(true)
    }

    /// Write `data` into the tile's channel
    pub fn write_tile(&mut self, index: u32, data: &[u8]) -> Result<()> {
        let loc = self.layout.locate(index);
        let size = self.layout.tile_size;
        if (loc.row + 1) * size > self.height || data.len() != (size * size) as usize {
            return Err(SdfError::Backend(format!("tile {index} does not fit the atlas")));
        }
        let stride = self.layout.width() as usize * 4;
        for y in 0..size as usize {
            let row_start = (loc.row as usize * size as usize + y) * stride;
            for x in 0..size as usize {
                let px = row_start + (loc.column as usize * size as usize + x) * 4 + loc.channel as usize;
                self.pixels[px] = data[y * size as usize + x];
            }
        }
        self.version += 1;
        Ok(())
    }

    pub fn read_tile(&self, index: u32) -> Option<Vec<u8>> {
        read_channel(&self.layout, self.height, &self.pixels, index)
    }

    pub fn snapshot(&self) -> TextureSnapshot {
        TextureSnapshot {
            tile_size: self.layout.tile_size,
            width: self.width(),
            height: self.height,
            version: self.version,
            pixels: Arc::from(self.pixels.as_slice()),
        }
    }
}

fn read_channel(layout: &AtlasLayout, height: u32, pixels: &[u8], index: u32) -> Option<Vec<u8>> {
    let loc = layout.locate(index);
    let size = layout.tile_size as usize;
    if (loc.row + 1) * layout.tile_size > height {
        return None;
    }
    let stride = layout.width() as usize * 4;
    let mut out = Vec::with_capacity(size * size);
    for y in 0..size {
        let row_start = (loc.row as usize * size + y) * stride;
        for x in 0..size {
            let px = row_start + (loc.column as usize * size + x) * 4 + loc.channel as usize;
            out.push(*pixels.get(px)?);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate() {
        let layout = AtlasLayout::new(64, 2048).unwrap();
        assert_eq!(layout.columns, 32);
        assert_eq!(layout.locate(0), TileLocation { column: 0, row: 0, channel: 0 });
        assert_eq!(layout.locate(3), TileLocation { column: 0, row: 0, channel: 3 });
        assert_eq!(layout.locate(4), TileLocation { column: 1, row: 0, channel: 0 });
        assert_eq!(layout.locate(129), TileLocation { column: 0, row: 1, channel: 1 });
        assert_eq!(layout.capacity(64), 128);
    }

    #[test]
    fn test_width_rounding() {
        let layout = AtlasLayout::new(48, 100).unwrap();
        assert_eq!(layout.width(), 96);
        let tiny = AtlasLayout::new(64, 10).unwrap();
        assert_eq!(tiny.columns, 1);
        assert!(AtlasLayout::new(0, 100).is_err());
    }

    #[test]
    fn test_uv_rect() {
        let layout = AtlasLayout::new(64, 256).unwrap();
        let uv = layout.uv_rect(4, 128);
        assert_eq!(uv, [0.25, 0.0, 0.5, 0.5]);
    }

    #[test]
    fn test_growth_preserves_tiles() {
        let layout = AtlasLayout::new(4, 8).unwrap();
        let mut texture = AtlasTexture::new(layout);
        assert_eq!(texture.capacity(), 8);
        let tile: Vec<u8> = (0..16).collect();
        texture.write_tile(5, &tile).unwrap();

        assert!(!texture.ensure_capacity(8, 64).unwrap());
        assert!(texture.ensure_capacity(9, 64).unwrap());
        assert_eq!(texture.height(), 8);
        assert!(texture.ensure_capacity(33, 64).unwrap());
        assert_eq!(texture.height(), 32);
        assert_eq!(texture.read_tile(5).unwrap(), tile);
        assert_eq!(texture.read_tile(6).unwrap(), vec![0; 16]);
    }

    #[test]
    fn test_growth_limit() {
        let layout = AtlasLayout::new(4, 8).unwrap();
        let mut texture = AtlasTexture::new(layout);
        let err = texture.ensure_capacity(100, 16).unwrap_err();
        assert_eq!(err, SdfError::AllocationFailed { tile_size: 4, height: 64 });
        assert_eq!(texture.height(), 4);
    }
}
