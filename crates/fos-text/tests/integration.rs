//! End-to-end text pipeline scenarios

use std::sync::Arc;
use std::time::Duration;

use fos_font::testing::TestFontBuilder;
use fos_text::{
    AnchorX, Direction, FontDescriptor, MemoryLoader, PipelineConfig, TextAlign, TextConfig, TextPipeline,
};
use tracing_subscriber::EnvFilter;

const DATA: &str = "mem://data/";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_test_writer().try_init();
}

fn mono() -> Vec<u8> {
    TestFontBuilder::new().family("Mono", "Regular").block_glyphs("AB abc", 100).build()
}

fn loader() -> MemoryLoader {
    MemoryLoader::new()
        .with("mem://fonts/mono.ttf", mono())
        .with(
            "mem://fonts/hebrew.ttf",
            TestFontBuilder::new().family("Hebrew", "Regular").block_glyphs("אבג ", 100).build(),
        )
        .with(
            "mem://data/codepoint-index/0000.json",
            br#"{ "families": [
                { "id": "fallback-sans", "ranges": "20-7e,a0-ff" },
                { "id": "serif-fr", "lang": "^fr", "ranges": "c0-ff" }
            ] }"#
                .to_vec(),
        )
        .with(
            "mem://data/font-meta/fallback-sans.json",
            br#"{ "family": "Fallback Sans", "faces": [
                { "style": "normal", "weight": 400, "src": "fonts/fallback-400.ttf" },
                { "style": "normal", "weight": 700, "src": "fonts/fallback-700.ttf" }
            ] }"#
                .to_vec(),
        )
        .with(
            "mem://data/fonts/fallback-400.ttf",
            TestFontBuilder::new().family("Fallback Sans", "Regular").block_glyphs("éè", 120).build(),
        )
        .with(
            "mem://data/fonts/fallback-700.ttf",
            TestFontBuilder::new().family("Fallback Sans", "Bold").weight(700).block_glyphs("éè", 130).build(),
        )
}

fn pipeline(loader: Arc<MemoryLoader>) -> TextPipeline {
    init_tracing();
    let config = PipelineConfig::default().with_data_base_url(DATA).with_accelerated(false);
    TextPipeline::new(config, loader).unwrap()
}

fn mono_text(text: &str) -> TextConfig {
    TextConfig::new(text).with_font(FontDescriptor::new("mem://fonts/mono.ttf")).with_font_size(1000.0)
}

#[test]
fn test_two_glyphs_end_to_end() {
    let pipeline = pipeline(Arc::new(loader()));
    let result = smol::block_on(pipeline.render(&mono_text("AB"))).unwrap();

    let xs: Vec<f32> = result.typeset.glyphs.iter().map(|g| g.x).collect();
    assert_eq!(xs, vec![0.0, 100.0]);
    assert_eq!(result.typeset.block_bounds.width(), 200.0);

    let atlas = pipeline.atlas();
    assert_eq!(atlas.stats().tiles, 2);
    let before = atlas.texture(64).unwrap();
    assert_eq!(before.height, 64);
    assert_eq!(smol::block_on(pipeline.flush()), 2);
    assert_eq!(atlas.texture(64).unwrap().height, 64);

    // the tiles hold distance data after the flush
    let tile = atlas.read_tile(64, result.quads[0].atlas_index).unwrap();
    assert!(tile.iter().any(|&v| v > 128));
}

#[test]
fn test_coverage_fallback_family() {
    let loader = Arc::new(loader());
    let pipeline = pipeline(loader.clone());
    let result = smol::block_on(pipeline.render(&mono_text("AéB"))).unwrap();

    let families: Vec<_> = result.typeset.fonts.iter().map(|f| f.font.names().family.clone().unwrap()).collect();
    assert_eq!(families, vec!["Mono".to_string(), "Fallback Sans".to_string()]);
    let accent = result.typeset.glyphs.iter().find(|g| g.char_index == 1).unwrap();
    assert_eq!(accent.font, 1);
    assert_eq!(accent.x, 100.0);
    assert_eq!(result.typeset.glyphs[2].x, 220.0);
    assert_eq!(loader.fetches_of("mem://data/font-meta/fallback-sans.json"), 1);
}

#[test]
fn test_coverage_weight_selection() {
    let pipeline = pipeline(Arc::new(loader()));
    let json = r#"{ "text": "é", "fontWeight": "bold", "fontSize": 1000 }"#;
    let result = smol::block_on(pipeline.render(&TextConfig::from_json(json).unwrap())).unwrap();
    let font = &result.typeset.fonts[0].font;
    assert_eq!(font.names().weight, 700);
    assert_eq!(result.typeset.glyphs[0].advance, 130.0);
}

#[test]
fn test_overlapping_renders_share_fetches() {
    let loader = Arc::new(loader().with_latency(Duration::from_millis(5)));
    let pipeline = pipeline(loader.clone());
    let (a, b) = smol::block_on(smol::future::zip(pipeline.render(&mono_text("Aé")), pipeline.render(&mono_text("éB"))));
    assert_eq!(a.unwrap().typeset.fonts.len(), 2);
    assert_eq!(b.unwrap().typeset.fonts.len(), 2);

    assert_eq!(loader.fetches_of("mem://data/codepoint-index/0000.json"), 1);
    assert_eq!(loader.fetches_of("mem://data/fonts/fallback-400.ttf"), 1);
    assert_eq!(loader.fetches_of("mem://fonts/mono.ttf"), 1);
    assert_eq!(pipeline.fonts().len(), 2);
}

#[test]
fn test_rtl_text_is_reversed() {
    let pipeline = pipeline(Arc::new(loader()));
    let config = TextConfig::new("אבג").with_font(FontDescriptor::new("mem://fonts/hebrew.ttf")).with_font_size(1000.0);
    let result = smol::block_on(pipeline.render(&config)).unwrap();
    let order: Vec<usize> = result.typeset.glyphs.iter().map(|g| g.char_index).collect();
    assert_eq!(order, vec![2, 1, 0]);

    let ltr = smol::block_on(pipeline.render(&mono_text("abc"))).unwrap();
    let order: Vec<usize> = ltr.typeset.glyphs.iter().map(|g| g.char_index).collect();
    assert_eq!(order, vec![0, 1, 2]);
}

#[test]
fn test_two_words_wrap_at_space() {
    let pipeline = pipeline(Arc::new(loader()));
    // "abc" is 300 wide, "abc abc" 700
    let config = mono_text("abc abc").with_max_width(500.0);
    let result = smol::block_on(pipeline.render(&config)).unwrap();
    assert_eq!(result.typeset.lines.len(), 2);
    assert_eq!(result.typeset.lines[0].end, 4);
    assert!(result.typeset.glyphs.iter().filter(|g| g.char_index >= 4).all(|g| g.line == 1));
}

#[test]
fn test_json_configuration() {
    let pipeline = pipeline(Arc::new(loader()));
    let json = r#"{
        "text": "AB",
        "font": "mem://fonts/mono.ttf",
        "fontSize": 1000,
        "maxWidth": 400,
        "textAlign": "center",
        "anchorX": "center",
        "anchorY": "top-baseline",
        "colorRanges": { "0": 16711680 },
        "includeCaretPositions": true,
        "sdfGlyphSize": 32
    }"#;
    let config = TextConfig::from_json(json).unwrap();
    assert_eq!(config.text_align, TextAlign::Center);
    assert_eq!(config.anchor_x, AnchorX(0.5));
    assert_eq!(config.direction, Direction::Auto);

    let result = smol::block_on(pipeline.render(&config)).unwrap();
    assert_eq!(result.sdf_glyph_size, 32);
    let xs: Vec<f32> = result.typeset.glyphs.iter().map(|g| g.x).collect();
    assert_eq!(xs, vec![-100.0, 0.0]);
    assert_eq!(result.typeset.lines[0].baseline, 0.0);
    assert_eq!(result.typeset.carets.as_ref().map(Vec::len), Some(2));
    assert!(result.typeset.glyphs.iter().all(|g| g.color == Some(0xff0000)));
}
