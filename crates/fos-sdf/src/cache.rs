//! Size-keyed SDF atlas cache
//!
//! Tile indices are allocated synchronously under the class lock, so a
//! (font, glyph) pair maps to exactly one index and one queued job no matter
//! how many callers race. Rasterization happens later, in [`SdfAtlasCache::flush`]
//! or [`SdfAtlasCache::drain_tick`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use fos_font::{BoundingBox, FontKey, FontResource, GlyphId, GlyphPath};

use crate::atlas::{AtlasLayout, AtlasTexture, TextureSnapshot};
use crate::config::{AtlasConfig, SchedulerConfig};
use crate::encode::{view_box, TileJob};
use crate::pool::ContextPool;
use crate::raster::{RasterBackend, SkiaBackend, SoftwareBackend};
use crate::scheduler::{DrainStats, TimeSlicedScheduler};
use crate::{Result, SdfError};

/// Result of [`SdfAtlasCache::get_tile`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileAllocation {
    pub index: u32,
    /// Font-space region covered by the tile
    pub view_box: BoundingBox,
    /// False when the glyph already had a tile
    pub newly_allocated: bool,
}

/// Rendering device state.
///
/// `Live -> Lost -> Restoring -> Live`; writes only happen while `Live`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Live,
    Lost,
    Restoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AtlasStats {
    pub classes: usize,
    pub tiles: usize,
    pub jobs_enqueued: u64,
    pub jobs_completed: u64,
    pub pending: usize,
    pub accelerated: bool,
}

struct TileRecord {
    path: Arc<GlyphPath>,
    view_box: BoundingBox,
    written: bool,
}

struct AtlasClass {
    tiles: HashMap<(FontKey, GlyphId), u32>,
    records: Vec<TileRecord>,
    texture: AtlasTexture,
    published: TextureSnapshot,
    dirty: bool,
}

impl AtlasClass {
    fn new(layout: AtlasLayout) -> Self {
        let texture = AtlasTexture::new(layout);
        Self {
            tiles: HashMap::new(),
            records: Vec::new(),
            published: texture.snapshot(),
            texture,
            dirty: false,
        }
    }

    fn publish(&mut self) {
        if self.dirty {
            self.published = self.texture.snapshot();
            self.dirty = false;
        }
    }
}

enum ClassSlot {
    Live(Arc<Mutex<AtlasClass>>),
    /// Texture allocation failed; the class stays unusable
    Failed,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct SdfAtlasCache {
    config: AtlasConfig,
    classes: Mutex<HashMap<u32, ClassSlot>>,
    queue: TimeSlicedScheduler,
    pool: Option<ContextPool>,
    max_contexts: usize,
    accelerated: AtomicBool,
    device: Mutex<DeviceState>,
    needs_redraw: AtomicBool,
    enqueued: AtomicU64,
    completed: AtomicU64,
}

impl std::fmt::Debug for SdfAtlasCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdfAtlasCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .field("device", &self.device_state())
            .finish()
    }
}

impl SdfAtlasCache {
    /// Create a cache. The accelerated backend, if any, is probed once here;
    /// a failed probe leaves the cache on the software path for good.
    pub fn new(
        config: AtlasConfig,
        scheduler: SchedulerConfig,
        accelerated: Option<Arc<dyn RasterBackend>>,
    ) -> Self {
        let backend = accelerated.filter(|_| config.use_accelerated).and_then(|backend| {
            match backend.probe() {
                Ok(()) => {
                    tracing::info!(backend = backend.name(), "accelerated SDF rasterization available");
                    Some(backend)
                }
                Err(err) => {
                    tracing::warn!(backend = backend.name(), %err, "accelerated SDF rasterization unavailable, using software");
                    None
                }
            }
        });
        let pool = backend.map(|b| ContextPool::new(b, scheduler.max_contexts, scheduler.idle_timeout));
        Self {
            accelerated: AtomicBool::new(pool.is_some()),
            pool,
            max_contexts: scheduler.max_contexts.max(1),
            queue: TimeSlicedScheduler::new(scheduler.time_slice),
            config,
            classes: Mutex::new(HashMap::new()),
            device: Mutex::new(DeviceState::Live),
            needs_redraw: AtomicBool::new(false),
            enqueued: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        }
    }

    /// Cache backed by the tiny-skia raster target
    pub fn with_default_backend(config: AtlasConfig, scheduler: SchedulerConfig) -> Self {
        Self::new(config, scheduler, Some(Arc::new(SkiaBackend)))
    }

    /// Cache using only the time-sliced software path
    pub fn software(config: AtlasConfig, scheduler: SchedulerConfig) -> Self {
        Self::new(config, scheduler, None)
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// Whether jobs currently go through the accelerated pool
    pub fn is_accelerated(&self) -> bool {
        self.accelerated.load(Ordering::Acquire)
    }

    pub fn device_state(&self) -> DeviceState {
        *lock(&self.device)
    }

    /// Set while published textures are stale after a device loss
    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw.load(Ordering::Acquire)
    }

    fn class(&self, tile_size: u32) -> Result<Arc<Mutex<AtlasClass>>> {
        let mut classes = lock(&self.classes);
        match classes.get(&tile_size) {
            Some(ClassSlot::Live(class)) => return Ok(class.clone()),
            Some(ClassSlot::Failed) => return Err(SdfError::ClassFailed(tile_size)),
            None => {}
        }
        if tile_size > self.config.max_texture_size {
            return Err(SdfError::InvalidTileSize(tile_size));
        }
        let layout = AtlasLayout::new(tile_size, self.config.texture_width)?;
        tracing::debug!(tile_size, width = layout.width(), "atlas class created");
        let class = Arc::new(Mutex::new(AtlasClass::new(layout)));
        classes.insert(tile_size, ClassSlot::Live(class.clone()));
        Ok(class)
    }

    fn existing_class(&self, tile_size: u32) -> Option<Arc<Mutex<AtlasClass>>> {
        match lock(&self.classes).get(&tile_size) {
            Some(ClassSlot::Live(class)) => Some(class.clone()),
            _ => None,
        }
    }

    fn live_classes(&self) -> Vec<(u32, Arc<Mutex<AtlasClass>>)> {
        let classes = lock(&self.classes);
        let mut live: Vec<_> = classes
            .iter()
            .filter_map(|(&size, slot)| match slot {
                ClassSlot::Live(class) => Some((size, class.clone())),
                ClassSlot::Failed => None,
            })
            .collect();
        live.sort_by_key(|(size, _)| *size);
        live
    }

    /// Tile index for a glyph at a tile resolution.
    ///
    /// Known glyphs return immediately. A new glyph gets the next index, the
    /// texture grows if needed and exactly one rasterization job is queued.
    pub fn get_tile(&self, font: &FontResource, glyph: GlyphId, tile_size: u32) -> Result<TileAllocation> {
        let class = self.class(tile_size)?;
        let mut state = lock(&class);
        let key = (font.key().clone(), glyph);
        if let Some(&index) = state.tiles.get(&key) {
            let view_box = state.records[index as usize].view_box;
            return Ok(TileAllocation { index, view_box, newly_allocated: false });
        }

        let index = state.records.len() as u32;
        match state.texture.ensure_capacity(index + 1, self.config.max_texture_size) {
            Ok(true) => {
                state.dirty = true;
                tracing::info!(tile_size, height = state.texture.height(), tiles = index + 1, "atlas texture grew");
            }
            Ok(false) => {}
            Err(err) => {
                drop(state);
                tracing::warn!(tile_size, %err, "atlas class disabled");
                lock(&self.classes).insert(tile_size, ClassSlot::Failed);
                return Err(err);
            }
        }

        let path = Arc::new(font.glyph(glyph).path.clone());
        let view_box = view_box(path.bounds(), tile_size, self.config.margin);
        state.records.push(TileRecord { path: path.clone(), view_box, written: false });
        state.tiles.insert(key, index);
        drop(state);

        self.queue.push(TileJob { tile_size, index, path, view_box, exponent: self.config.exponent });
        self.enqueued.fetch_add(1, Ordering::AcqRel);
        Ok(TileAllocation { index, view_box, newly_allocated: true })
    }

    /// Index already assigned to a glyph, without allocating
    pub fn lookup(&self, font: &FontKey, glyph: GlyphId, tile_size: u32) -> Option<u32> {
        let class = self.existing_class(tile_size)?;
        let state = lock(&class);
        state.tiles.get(&(font.clone(), glyph)).copied()
    }

    pub fn layout(&self, tile_size: u32) -> Option<AtlasLayout> {
        self.existing_class(tile_size).map(|class| *lock(&class).texture.layout())
    }

    /// Last published texture of a class
    pub fn texture(&self, tile_size: u32) -> Option<TextureSnapshot> {
        self.existing_class(tile_size).map(|class| lock(&class).published.clone())
    }

    /// One tile's channel from the published texture
    pub fn read_tile(&self, tile_size: u32, index: u32) -> Option<Vec<u8>> {
        self.texture(tile_size)?.read_tile(index)
    }

    /// Whether a tile's content has been rasterized
    pub fn is_written(&self, tile_size: u32, index: u32) -> bool {
        self.existing_class(tile_size)
            .is_some_and(|class| lock(&class).records.get(index as usize).is_some_and(|r| r.written))
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> AtlasStats {
        let classes = self.live_classes();
        AtlasStats {
            classes: classes.len(),
            tiles: classes.iter().map(|(_, c)| lock(c).records.len()).sum(),
            jobs_enqueued: self.enqueued.load(Ordering::Acquire),
            jobs_completed: self.completed.load(Ordering::Acquire),
            pending: self.queue.len(),
            accelerated: self.is_accelerated(),
        }
    }

    fn write(&self, job: &TileJob, data: &[u8]) {
        let Some(class) = self.existing_class(job.tile_size) else { return };
        let mut state = lock(&class);
        if let Err(err) = state.texture.write_tile(job.index, data) {
            tracing::warn!(tile_size = job.tile_size, index = job.index, %err, "tile write failed");
            return;
        }
        if let Some(record) = state.records.get_mut(job.index as usize) {
            record.written = true;
        }
        state.dirty = true;
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    fn publish_all(&self) {
        for (_, class) in self.live_classes() {
            lock(&class).publish();
        }
    }

    fn fall_back(&self, err: &SdfError) {
        if self.accelerated.swap(false, Ordering::AcqRel) {
            tracing::warn!(%err, "accelerated SDF rasterization failed, switching to software");
        }
    }

    fn is_live(&self) -> bool {
        self.device_state() == DeviceState::Live
    }

    /// Run one software time slice. Jobs stay queued while the device is not
    /// live or while the accelerated pool owns the queue.
    pub fn drain_tick(&self) -> DrainStats {
        if !self.is_live() || self.is_accelerated() {
            return DrainStats { processed: 0, remaining: self.queue.len() };
        }
        let stats = self.queue.drain_tick(|job| self.run_software(job));
        self.publish_all();
        stats
    }

    fn run_software(&self, job: TileJob) -> bool {
        if !self.is_live() {
            self.queue.push_front(job);
            return false;
        }
        self.write(&job, &SoftwareBackend::render(&job));
        true
    }

    /// Rasterize everything queued, then publish the textures.
    ///
    /// Returns the number of tiles written. Work stops early (jobs stay
    /// queued) if the device is lost.
    pub async fn flush(&self) -> usize {
        let mut written = 0;
        if let Some(pool) = self.pool.as_ref().filter(|_| self.is_accelerated()) {
            let executor = smol::Executor::new();
            let workers: Vec<_> = (0..self.max_contexts)
                .map(|_| executor.spawn(self.accelerated_worker(pool)))
                .collect();
            written += executor
                .run(async {
                    let mut total = 0;
                    for worker in workers {
                        total += worker.await;
                    }
                    total
                })
                .await;
        }
        // Software path, or leftovers after a fallback
        if self.is_live() && !self.is_accelerated() {
            written += self.queue.run_until_idle(|job| self.run_software(job)).await;
        }
        if self.is_live() {
            self.publish_all();
        }
        written
    }

    async fn accelerated_worker(&self, pool: &ContextPool) -> usize {
        let mut written = 0;
        while self.is_live() && self.is_accelerated() {
            let Some(job) = self.queue.pop() else { break };
            match pool.rasterize(job.clone()).await {
                Ok(_) if !self.is_live() => {
                    self.queue.push_front(job);
                    break;
                }
                Ok(data) => self.write(&job, &data),
                Err(SdfError::ContextLost) => {
                    self.queue.push_front(job);
                    self.device_lost();
                    break;
                }
                Err(err) => {
                    self.fall_back(&err);
                    self.write(&job, &SoftwareBackend::render(&job));
                }
            }
            written += 1;
        }
        written
    }

    /// Release pooled contexts idle past the configured timeout
    pub fn release_idle_contexts(&self) -> usize {
        self.pool.as_ref().map_or(0, |pool| pool.release_idle())
    }

    /// The rendering device went away: stop writing until it is restored.
    pub fn device_lost(&self) {
        let mut device = lock(&self.device);
        if *device == DeviceState::Lost {
            return;
        }
        *device = DeviceState::Lost;
        drop(device);
        self.needs_redraw.store(true, Ordering::Release);
        if let Some(pool) = &self.pool {
            pool.clear();
        }
        tracing::warn!("SDF atlas device lost, writes suspended");
    }

    /// Re-rasterize every written tile into fresh textures, publish them all
    /// at once and resume service.
    ///
    /// If the device is lost again midway the cache stays `Lost` and
    /// [`SdfError::ContextLost`] is returned.
    pub async fn device_restored(&self) -> Result<()> {
        {
            let mut device = lock(&self.device);
            if *device != DeviceState::Lost {
                return Ok(());
            }
            *device = DeviceState::Restoring;
        }

        let rebuilt = match self.rebuild_textures().await {
            Ok(rebuilt) => rebuilt,
            Err(err) => {
                *lock(&self.device) = DeviceState::Lost;
                tracing::warn!(%err, "atlas restoration interrupted");
                return Err(err);
            }
        };

        let mut device = lock(&self.device);
        if *device != DeviceState::Restoring {
            return Err(SdfError::ContextLost);
        }
        let restored = rebuilt.len();
        for (class, mut texture) in rebuilt {
            let mut state = lock(&class);
            // tiles allocated meanwhile may have grown the old texture
            if let Err(err) = texture.ensure_capacity(state.records.len() as u32, u32::MAX) {
                tracing::warn!(%err, "restored texture cannot match current size");
                continue;
            }
            texture.supersede(&state.texture);
            state.texture = texture;
            state.dirty = true;
            state.publish();
        }
        *device = DeviceState::Live;
        self.needs_redraw.store(false, Ordering::Release);
        tracing::info!(classes = restored, "SDF atlas restored");
        Ok(())
    }

    async fn rebuild_textures(&self) -> Result<Vec<(Arc<Mutex<AtlasClass>>, AtlasTexture)>> {
        let mut rebuilt = Vec::new();
        for (tile_size, class) in self.live_classes() {
            let (layout, jobs) = {
                let state = lock(&class);
                let jobs: Vec<TileJob> = state
                    .records
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| r.written)
                    .map(|(i, r)| TileJob {
                        tile_size,
                        index: i as u32,
                        path: r.path.clone(),
                        view_box: r.view_box,
                        exponent: self.config.exponent,
                    })
                    .collect();
                (*state.texture.layout(), jobs)
            };

            let mut texture = AtlasTexture::new(layout);
            for job in jobs {
                let data = self.replay(&job).await?;
                texture.ensure_capacity(job.index + 1, u32::MAX)?;
                texture.write_tile(job.index, &data)?;
            }
            rebuilt.push((class, texture));
        }
        Ok(rebuilt)
    }

    async fn replay(&self, job: &TileJob) -> Result<Vec<u8>> {
        match self.pool.as_ref().filter(|_| self.is_accelerated()) {
            Some(pool) => match pool.rasterize(job.clone()).await {
                Err(SdfError::ContextLost) => Err(SdfError::ContextLost),
                Err(err) => {
                    self.fall_back(&err);
                    Ok(SoftwareBackend::render(job))
                }
                ok => ok,
            },
            None => Ok(SoftwareBackend::render(job)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fos_font::testing::TestFontBuilder;

    use super::*;

    fn font() -> FontResource {
        let bytes = TestFontBuilder::new()
            .rect_glyph(Some('A'), 600, 50, 0, 550, 700)
            .rect_glyph(Some('B'), 600, 100, 0, 500, 700)
            .empty_glyph(' ', 250)
            .build();
        FontResource::parse("mem://test", bytes).unwrap()
    }

    fn small_config() -> AtlasConfig {
        AtlasConfig { texture_width: 32, max_texture_size: 64, use_accelerated: false, ..AtlasConfig::default() }
    }

    #[test]
    fn test_allocation_is_idempotent() {
        let font = font();
        let cache = SdfAtlasCache::software(small_config(), SchedulerConfig::default());
        let a = font.glyph_index('A').unwrap();
        let first = cache.get_tile(&font, a, 16).unwrap();
        let second = cache.get_tile(&font, a, 16).unwrap();
        assert!(first.newly_allocated);
        assert!(!second.newly_allocated);
        assert_eq!(first.index, second.index);
        assert_eq!(cache.stats().jobs_enqueued, 1);
        assert_eq!(cache.pending(), 1);
    }

    #[test]
    fn test_classes_are_independent() {
        let font = font();
        let cache = SdfAtlasCache::software(small_config(), SchedulerConfig::default());
        let a = font.glyph_index('A').unwrap();
        let b = font.glyph_index('B').unwrap();
        assert_eq!(cache.get_tile(&font, a, 16).unwrap().index, 0);
        assert_eq!(cache.get_tile(&font, b, 8).unwrap().index, 0);
        assert_eq!(cache.get_tile(&font, b, 16).unwrap().index, 1);
        assert_eq!(cache.stats().classes, 2);
    }

    #[test]
    fn test_flush_writes_tiles() {
        let font = font();
        let cache = SdfAtlasCache::software(small_config(), SchedulerConfig::default());
        let a = font.glyph_index('A').unwrap();
        let tile = cache.get_tile(&font, a, 16).unwrap();
        assert_eq!(cache.read_tile(16, tile.index).unwrap(), vec![0; 256]);

        assert_eq!(smol::block_on(cache.flush()), 1);
        assert!(cache.is_written(16, tile.index));
        let data = cache.read_tile(16, tile.index).unwrap();
        // the rect covers the tile centre
        assert!(data[8 * 16 + 8] > 128);
        assert_eq!(cache.stats().jobs_completed, 1);
    }

    #[test]
    fn test_growth_failure_disables_class_only() {
        let font = font();
        let config = AtlasConfig { texture_width: 8, max_texture_size: 8, use_accelerated: false, ..AtlasConfig::default() };
        let cache = SdfAtlasCache::software(config, SchedulerConfig::default());
        // one 8px column, 4 tiles per row, one row allowed
        for (i, gid) in (0..4u16).enumerate() {
            assert_eq!(cache.get_tile(&font, GlyphId(gid), 8).unwrap().index, i as u32);
        }
        let err = cache.get_tile(&font, GlyphId(4), 8).unwrap_err();
        assert!(matches!(err, SdfError::AllocationFailed { tile_size: 8, .. }));
        assert_eq!(cache.get_tile(&font, GlyphId(0), 8).unwrap_err(), SdfError::ClassFailed(8));
        assert!(cache.get_tile(&font, GlyphId(0), 4).is_ok());
    }

    #[test]
    fn test_invalid_tile_size() {
        let font = font();
        let cache = SdfAtlasCache::software(small_config(), SchedulerConfig::default());
        assert_eq!(cache.get_tile(&font, GlyphId(1), 0).unwrap_err(), SdfError::InvalidTileSize(0));
        assert_eq!(cache.get_tile(&font, GlyphId(1), 128).unwrap_err(), SdfError::InvalidTileSize(128));
    }

    #[test]
    fn test_drain_tick_respects_device_state() {
        let font = font();
        let sched = SchedulerConfig::default().with_time_slice(Duration::from_secs(1));
        let cache = SdfAtlasCache::software(small_config(), sched);
        cache.get_tile(&font, font.glyph_index('A').unwrap(), 16).unwrap();
        cache.device_lost();
        assert_eq!(cache.drain_tick().processed, 0);
        assert_eq!(cache.pending(), 1);
        assert!(cache.needs_redraw());

        smol::block_on(cache.device_restored()).unwrap();
        assert!(!cache.needs_redraw());
        assert_eq!(cache.drain_tick().processed, 1);
    }
}
