//! Widget state carried by element kinds.

use galaxis_core::types::{Point, Size};

use crate::draw::TextureId;
use crate::i18n;
use crate::text::{HackerTextEffect, ScrollTextEffect};
use crate::theme::{StyleColor, ThemeColorId};

/// A plain background container.
pub struct Panel {
    pub background: StyleColor,
    pub border: StyleColor,
    pub rounding: f32,
    /// Draw the blurred-scene glass background instead of a flat fill.
    pub glass: bool,
}

impl Default for Panel {
    fn default() -> Self {
        Panel {
            background: StyleColor::theme(ThemeColorId::PanelBg),
            border: StyleColor::none(),
            rounding: 0.0,
            glass: false,
        }
    }
}

/// A clickable button firing an action id.
pub struct Button {
    pub label: String,
    /// Action id emitted as a [`crate::input::UiEvent::Action`] on click.
    pub action: String,
    pub font_size: f32,
    pub background: StyleColor,
    pub background_hover: StyleColor,
    pub background_active: StyleColor,
    pub text_color: StyleColor,
    pub rounding: f32,
}

impl Default for Button {
    fn default() -> Self {
        Button {
            label: String::new(),
            action: String::new(),
            font_size: 14.0,
            background: StyleColor::theme(ThemeColorId::ButtonBg),
            background_hover: StyleColor::theme(ThemeColorId::ButtonHover),
            background_active: StyleColor::theme(ThemeColorId::ButtonActive),
            text_color: StyleColor::theme(ThemeColorId::Text),
            rounding: 2.0,
        }
    }
}

/// A focusable single-line text input.
pub struct InputField {
    pub text: String,
    pub placeholder: String,
    pub font_size: f32,
    pub text_color: StyleColor,
    pub background: StyleColor,
    pub border: StyleColor,
    pub(crate) caret_timer: f32,
}

impl Default for InputField {
    fn default() -> Self {
        InputField {
            text: String::new(),
            placeholder: String::new(),
            font_size: 14.0,
            text_color: StyleColor::theme(ThemeColorId::TextHighlight),
            background: StyleColor::theme(ThemeColorId::ButtonBg),
            border: StyleColor::theme(ThemeColorId::Border),
            caret_timer: 0.0,
        }
    }
}

impl InputField {
    /// Caret visibility follows a 1 Hz blink.
    pub fn caret_visible(&self) -> bool {
        self.caret_timer.fract() < 0.5
    }
}

/// Where a text widget's content comes from.
pub enum TextSource {
    /// A literal string, displayed as-is.
    Literal(String),
    /// A localization key, re-resolved when the language version changes.
    Localized(String),
}

/// Optional reveal effect on a text widget.
pub enum TextEffect {
    Hacker(HackerTextEffect),
    Scroll(ScrollTextEffect),
}

/// A text label, optionally localized and optionally animated.
pub struct TextWidget {
    pub source: TextSource,
    pub font_size: f32,
    pub color: StyleColor,
    pub effect: Option<TextEffect>,
    pub(crate) cached: String,
    pub(crate) cached_version: u64,
}

impl Default for TextWidget {
    fn default() -> Self {
        TextWidget {
            source: TextSource::Literal(String::new()),
            font_size: 14.0,
            color: StyleColor::theme(ThemeColorId::Text),
            effect: None,
            cached: String::new(),
            cached_version: 0,
        }
    }
}

impl TextWidget {
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        TextWidget {
            cached: text.clone(),
            cached_version: u64::MAX,
            source: TextSource::Literal(text),
            ..Default::default()
        }
    }

    pub fn localized(key: impl Into<String>) -> Self {
        TextWidget { source: TextSource::Localized(key.into()), ..Default::default() }
    }

    /// The string drawn this frame, through the active effect if any.
    pub fn display(&self) -> String {
        match &self.effect {
            Some(TextEffect::Hacker(effect)) if effect.is_active() => effect.display(),
            _ => self.cached.clone(),
        }
    }

    /// Refreshes the cache: localized sources re-resolve when the global
    /// version moved; literal sources only seed the cache once.
    pub(crate) fn refresh(&mut self) {
        match &self.source {
            TextSource::Localized(key) => {
                let version = i18n::localization_version();
                if version != self.cached_version {
                    self.cached_version = version;
                    let resolved = i18n::localize(key);
                    self.apply_new_text(resolved);
                }
            }
            TextSource::Literal(text) => {
                if self.cached_version != u64::MAX {
                    self.cached_version = u64::MAX;
                    let text = text.clone();
                    self.apply_new_text(text);
                }
            }
        }
    }

    /// Routes a content change through the active effect.
    pub fn apply_new_text(&mut self, text: String) {
        match &mut self.effect {
            Some(TextEffect::Hacker(effect)) => effect.start(text.clone(), 0.0),
            Some(TextEffect::Scroll(effect)) => effect.set_text(text.clone()),
            None => {}
        }
        self.cached = text;
    }

    pub(crate) fn update_effect(&mut self, dt: f32) {
        match &mut self.effect {
            Some(TextEffect::Hacker(effect)) => effect.update(dt),
            Some(TextEffect::Scroll(effect)) => effect.update(dt),
            None => {}
        }
    }
}

/// A textured quad.
pub struct ImageWidget {
    pub texture: TextureId,
    pub uv_min: Point<f32>,
    pub uv_max: Point<f32>,
    pub tint: StyleColor,
    pub preferred_size: Size<f32>,
}

impl Default for ImageWidget {
    fn default() -> Self {
        ImageWidget {
            texture: 0,
            uv_min: Point::new(0.0, 0.0),
            uv_max: Point::new(1.0, 1.0),
            tint: StyleColor::custom(galaxis_core::types::Color::WHITE),
            preferred_size: Size::new(64.0, 64.0),
        }
    }
}

/// Scroll position and limits of a scroll view.
pub struct ScrollState {
    pub scroll_y: f32,
    pub content_height: f32,
    pub scroll_speed: f32,
    pub show_scrollbar: bool,
}

impl Default for ScrollState {
    fn default() -> Self {
        ScrollState {
            scroll_y: 0.0,
            content_height: 0.0,
            scroll_speed: 20.0,
            show_scrollbar: true,
        }
    }
}

impl ScrollState {
    /// Scrollable overflow for a given viewport height.
    pub fn max_scroll(&self, viewport_height: f32) -> f32 {
        (self.content_height - viewport_height).max(0.0)
    }
}
