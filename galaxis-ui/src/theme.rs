//! Theming.
//!
//! A theme is a named table of colors. Widgets hold [`StyleColor`]s —
//! either a theme id or a custom color, with an optional alpha override —
//! and resolve them at draw time, so swapping the theme recolors the whole
//! tree on the next frame without touching geometry.

use galaxis_core::types::Color;
use serde::{Deserialize, Serialize};

/// The theme's named color slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeColorId {
    Text,
    TextHighlight,
    TextDisabled,
    PanelBg,
    ButtonBg,
    ButtonHover,
    ButtonActive,
    Border,
    Accent,
}

/// A named table of colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub text: Color,
    pub text_highlight: Color,
    pub text_disabled: Color,
    pub panel_bg: Color,
    pub button_bg: Color,
    pub button_hover: Color,
    pub button_active: Color,
    pub border: Color,
    pub accent: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            text: Color::new(0.8, 0.8, 0.8, 1.0),
            text_highlight: Color::new(1.0, 1.0, 1.0, 1.0),
            text_disabled: Color::new(0.5, 0.5, 0.5, 1.0),
            panel_bg: Color::new(0.1, 0.1, 0.1, 0.8),
            button_bg: Color::new(0.2, 0.2, 0.2, 1.0),
            button_hover: Color::new(0.3, 0.3, 0.3, 1.0),
            button_active: Color::new(0.4, 0.4, 0.4, 1.0),
            border: Color::new(0.5, 0.5, 0.5, 1.0),
            accent: Color::from_rgba8(30, 114, 232, 255),
        }
    }
}

impl Theme {
    pub fn color(&self, id: ThemeColorId) -> Color {
        match id {
            ThemeColorId::Text => self.text,
            ThemeColorId::TextHighlight => self.text_highlight,
            ThemeColorId::TextDisabled => self.text_disabled,
            ThemeColorId::PanelBg => self.panel_bg,
            ThemeColorId::ButtonBg => self.button_bg,
            ThemeColorId::ButtonHover => self.button_hover,
            ThemeColorId::ButtonActive => self.button_active,
            ThemeColorId::Border => self.border,
            ThemeColorId::Accent => self.accent,
        }
    }
}

/// A color reference resolved against the current theme at draw time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleColor {
    source: StyleColorSource,
    alpha_override: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StyleColorSource {
    Theme(ThemeColorId),
    Custom(Color),
    None,
}

impl StyleColor {
    pub fn theme(id: ThemeColorId) -> Self {
        StyleColor { source: StyleColorSource::Theme(id), alpha_override: None }
    }

    pub fn custom(color: Color) -> Self {
        StyleColor { source: StyleColorSource::Custom(color), alpha_override: None }
    }

    /// A color that resolves to fully transparent.
    pub fn none() -> Self {
        StyleColor { source: StyleColorSource::None, alpha_override: None }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha_override = Some(alpha);
        self
    }

    /// Looks the color up in `theme` and applies the alpha override.
    pub fn resolve(&self, theme: &Theme) -> Color {
        let base = match self.source {
            StyleColorSource::Theme(id) => theme.color(id),
            StyleColorSource::Custom(color) => color,
            StyleColorSource::None => return Color::TRANSPARENT,
        };
        match self.alpha_override {
            Some(alpha) => base.with_alpha(alpha),
            None => base,
        }
    }
}

impl Default for StyleColor {
    fn default() -> Self {
        StyleColor::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn theme_lookup_resolves() {
        let theme = Theme::default();
        let style = StyleColor::theme(ThemeColorId::Accent);
        assert_eq!(style.resolve(&theme), theme.accent);
    }

    #[test]
    fn alpha_override_applies_after_lookup() {
        let theme = Theme::default();
        let style = StyleColor::theme(ThemeColorId::Text).with_alpha(0.25);
        assert_eq!(style.resolve(&theme).a, 0.25);
        let custom = StyleColor::custom(Color::WHITE).with_alpha(0.5);
        assert_eq!(custom.resolve(&theme).a, 0.5);
    }

    #[test]
    fn theme_switch_changes_resolution() {
        let style = StyleColor::theme(ThemeColorId::Text);
        let default_theme = Theme::default();
        let mut night = Theme::default();
        night.text = Color::rgb(0.0, 1.0, 0.0);
        assert_ne!(style.resolve(&default_theme), style.resolve(&night));
    }

    #[test]
    fn none_resolves_transparent() {
        assert_eq!(StyleColor::none().resolve(&Theme::default()), Color::TRANSPARENT);
    }
}
