use std::{
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use crate::foundation::{
    core::{Rgba8, Vec2},
    error::{OverlayError, OverlayResult},
};

pub const DEFAULT_FONT_FAMILY: &str = "Arial";

/// Where overlay fonts come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FontSettings {
    /// Preferred family; any sans-serif face, then any face at all, is used when it is missing.
    pub family: String,
    /// Extra directories scanned for `.ttf`, `.otf` and `.ttc` files.
    pub font_dirs: Vec<PathBuf>,
    pub load_system_fonts: bool,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            family: DEFAULT_FONT_FAMILY.to_string(),
            font_dirs: Vec::new(),
            load_system_fonts: true,
        }
    }
}

/// Font face bytes selected for drawing overlay text.
#[derive(Clone)]
pub struct ResolvedFont {
    pub family: String,
    pub bytes: Arc<Vec<u8>>,
    /// Face index inside a collection file.
    pub index: u32,
}

impl std::fmt::Debug for ResolvedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedFont")
            .field("family", &self.family)
            .field("bytes_len", &self.bytes.len())
            .field("index", &self.index)
            .finish()
    }
}

impl ResolvedFont {
    /// Pick a face matching `settings`.
    pub fn resolve(settings: &FontSettings) -> OverlayResult<Self> {
        let mut db = usvg::fontdb::Database::new();
        if settings.load_system_fonts {
            db.load_system_fonts();
        }
        for dir in &settings.font_dirs {
            load_fonts_from_dir(&mut db, dir);
        }

        let id = select_face(&db, &settings.family).ok_or_else(|| {
            OverlayError::render(format!(
                "no font face available for family '{}' ({} faces loaded)",
                settings.family,
                db.len()
            ))
        })?;

        let family = db
            .face(id)
            .and_then(|f| f.families.first().map(|(name, _)| name.clone()))
            .unwrap_or_else(|| "unknown".to_string());
        let (bytes, index) = db
            .with_face_data(id, |data, index| (data.to_vec(), index))
            .ok_or_else(|| OverlayError::render(format!("font data for '{family}' unreadable")))?;

        if !family.eq_ignore_ascii_case(&settings.family) {
            tracing::warn!(
                requested = %settings.family,
                resolved = %family,
                "requested font family not found, using fallback face"
            );
        }

        Ok(Self {
            family,
            bytes: Arc::new(bytes),
            index,
        })
    }
}

/// Common sans-serif families tried when the requested one is missing.
const SANS_SERIF_FALLBACKS: &[&str] = &[
    "Arial",
    "Helvetica",
    "Liberation Sans",
    "DejaVu Sans",
    "Noto Sans",
    "Roboto",
    "Open Sans",
    "Segoe UI",
    "Verdana",
];

/// Requested family, then a known sans-serif family, then any proportional text face, then
/// anything at all.
fn select_face(db: &usvg::fontdb::Database, requested: &str) -> Option<usvg::fontdb::ID> {
    let query = |family: usvg::fontdb::Family<'_>| {
        db.query(&usvg::fontdb::Query {
            families: &[family],
            weight: usvg::fontdb::Weight::NORMAL,
            stretch: usvg::fontdb::Stretch::Normal,
            style: usvg::fontdb::Style::Normal,
        })
    };

    query(usvg::fontdb::Family::Name(requested))
        .or_else(|| {
            SANS_SERIF_FALLBACKS
                .iter()
                .find_map(|name| query(usvg::fontdb::Family::Name(*name)))
        })
        .or_else(|| {
            db.faces()
                .filter(|f| {
                    let family = f.families.first().map(|(n, _)| n.as_str()).unwrap_or("");
                    is_text_face(family, f.monospaced)
                })
                .min_by_key(|f| (f.style != usvg::fontdb::Style::Normal, f.weight.0.abs_diff(400)))
                .map(|f| f.id)
        })
        .or_else(|| db.faces().next().map(|f| f.id))
}

/// Whether a face is suitable for running text (not monospaced, math, symbol or emoji).
fn is_text_face(family: &str, monospaced: bool) -> bool {
    if monospaced {
        return false;
    }
    let lower = family.to_ascii_lowercase();
    !["math", "symbol", "emoji", "dingbat", "mono", "icon"]
        .iter()
        .any(|w| lower.contains(w))
}

fn load_fonts_from_dir(db: &mut usvg::fontdb::Database, dir: &Path) {
    let Ok(rd) = std::fs::read_dir(dir) else {
        tracing::warn!(dir = %dir.display(), "font directory is not readable");
        return;
    };

    for entry in rd.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" && ext != "ttc" {
            continue;
        }
        if let Err(err) = db.load_font_file(&path) {
            tracing::warn!(path = %path.display(), %err, "skipping unreadable font file");
        }
    }
}

/// Shared, lazily resolved font used by every request.
///
/// Resolution scans the font directories once; the outcome (including failure) is cached.
#[derive(Debug)]
pub struct FontBook {
    settings: FontSettings,
    resolved: OnceLock<Result<Arc<ResolvedFont>, String>>,
}

impl FontBook {
    pub fn new(settings: FontSettings) -> Self {
        Self {
            settings,
            resolved: OnceLock::new(),
        }
    }

    pub fn font(&self) -> OverlayResult<Arc<ResolvedFont>> {
        self.resolved
            .get_or_init(|| {
                ResolvedFont::resolve(&self.settings)
                    .map(Arc::new)
                    .map_err(|e| match e {
                        OverlayError::Render(msg) => msg,
                        other => other.to_string(),
                    })
            })
            .clone()
            .map_err(OverlayError::render)
    }
}

/// Shaped text ready to be drawn, plus its extent in layout space.
#[derive(Clone)]
pub struct PreparedText {
    pub layout: Arc<parley::Layout<Rgba8>>,
    pub width: f64,
    pub height: f64,
}

impl PreparedText {
    /// Center of the text box in layout space.
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width * 0.5, self.height * 0.5)
    }
}

impl std::fmt::Debug for PreparedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedText")
            .field("layout_ptr", &Arc::as_ptr(&self.layout))
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Stateful helper for building Parley text layouts from raw font bytes.
///
/// An engine registers the first font it is given and keeps using that family.
pub struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<Rgba8>,
    family_name: Option<String>,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLayoutEngine {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            family_name: None,
        }
    }

    /// Family name registered from the font bytes, once any text was laid out.
    pub fn family_name(&self) -> Option<&str> {
        self.family_name.as_deref()
    }

    fn register(&mut self, font_bytes: &[u8], face_index: u32) -> OverlayResult<String> {
        if let Some(name) = &self.family_name {
            return Ok(name.clone());
        }

        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.to_vec()), None);
        // A collection registers every face; shape with the family owning the resolved one.
        let family_id = families
            .iter()
            .find(|(_, faces)| faces.iter().any(|f| f.index() == face_index))
            .or_else(|| families.first())
            .map(|(id, _)| *id)
            .ok_or_else(|| OverlayError::render("no font families registered from font bytes"))?;

        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| OverlayError::render("registered font family has no name"))?
            .to_string();
        self.family_name = Some(family_name.clone());
        Ok(family_name)
    }

    /// Shape a single line of text with the face at `face_index` inside `font_bytes`.
    pub fn layout_line(
        &mut self,
        text: &str,
        font_bytes: &[u8],
        face_index: u32,
        size_px: f32,
        brush: Rgba8,
    ) -> OverlayResult<PreparedText> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(OverlayError::validation(
                "text size must be finite and > 0",
            ));
        }

        let family_name = self.register(font_bytes, face_index)?;

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<Rgba8> = builder.build(text);
        layout.break_all_lines(None);

        let mut width = 0.0f64;
        let mut height = 0.0f64;
        for line in layout.lines() {
            let m = line.metrics();
            width = width.max(f64::from(m.advance));
            height += f64::from(m.ascent + m.descent + m.leading);
        }

        Ok(PreparedText {
            layout: Arc::new(layout),
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_font_dirs_without_system_fonts_fail_to_resolve() {
        let settings = FontSettings {
            load_system_fonts: false,
            ..FontSettings::default()
        };
        let err = ResolvedFont::resolve(&settings).unwrap_err();
        assert!(matches!(err, OverlayError::Render(_)));
    }

    #[test]
    fn font_book_caches_failures() {
        let book = FontBook::new(FontSettings {
            load_system_fonts: false,
            font_dirs: vec![PathBuf::from("no/such/dir")],
            ..FontSettings::default()
        });
        assert!(book.font().is_err());
        assert!(book.font().is_err());
    }

    #[test]
    fn math_symbol_and_mono_faces_are_not_text_faces() {
        assert!(is_text_face("DejaVu Sans", false));
        assert!(is_text_face("Liberation Serif", false));
        assert!(!is_text_face("DejaVu Math TeX Gyre", false));
        assert!(!is_text_face("Noto Color Emoji", false));
        assert!(!is_text_face("Standard Symbols PS", false));
        assert!(!is_text_face("DejaVu Sans Mono", false));
        assert!(!is_text_face("Courier", true));
    }

    #[test]
    fn missing_family_falls_back_to_a_text_face() {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        let has_text_face = db.faces().any(|f| {
            let family = f.families.first().map(|(n, _)| n.as_str()).unwrap_or("");
            is_text_face(family, f.monospaced)
        });
        if !has_text_face {
            eprintln!("no proportional text face installed; skipping");
            return;
        }

        let font = ResolvedFont::resolve(&FontSettings {
            family: "No Such Family 7f3a".to_string(),
            ..FontSettings::default()
        })
        .unwrap();
        assert!(
            is_text_face(&font.family, false),
            "fell back to {:?}",
            font.family
        );
    }

    #[test]
    fn layout_rejects_bad_sizes() {
        let mut engine = TextLayoutEngine::new();
        assert!(
            engine
                .layout_line("x", &[], 0, 0.0, Rgba8::BLACK)
                .unwrap_err()
                .to_string()
                .contains("validation error:")
        );
    }

    #[test]
    fn layout_has_positive_extent_when_a_font_is_installed() {
        let Ok(font) = ResolvedFont::resolve(&FontSettings::default()) else {
            eprintln!("no font face installed; skipping");
            return;
        };
        assert!(!font.family.trim().is_empty());

        let mut engine = TextLayoutEngine::new();
        let short = engine
            .layout_line("Hi", font.bytes.as_slice(), font.index, 32.0, Rgba8::BLACK)
            .unwrap();
        let long = engine
            .layout_line(
                "Hello there",
                font.bytes.as_slice(),
                font.index,
                32.0,
                Rgba8::BLACK,
            )
            .unwrap();
        assert!(engine.family_name().is_some());
        assert!(short.width > 0.0 && short.height > 0.0);
        assert!(long.width > short.width);
        assert!((short.center().x - short.width / 2.0).abs() < 1e-9);

        // Shaping must use the resolved face so glyph ids match the face drawn later.
        for line in long.layout.lines() {
            for item in line.items() {
                if let parley::layout::PositionedLayoutItem::GlyphRun(run) = item {
                    assert_eq!(run.run().font().index, font.index);
                }
            }
        }
    }
}
