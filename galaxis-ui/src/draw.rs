//! The draw-list boundary.
//!
//! The UI tree emits primitives into a [`DrawList`]; the rendering layer
//! replays them however it likes. Text metrics flow the other way through
//! the [`TextMeasure`] trait the host backend implements.

use galaxis_core::types::{Color, Point, Rect, Size};

/// Opaque handle to a texture the draw backend knows about.
pub type TextureId = u64;

/// One draw primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Filled rectangle, optionally rounded.
    RectFilled {
        rect: Rect<f32>,
        color: Color,
        rounding: f32,
    },
    /// Stroked rectangle outline.
    Rect {
        rect: Rect<f32>,
        color: Color,
        rounding: f32,
        thickness: f32,
    },
    Line {
        from: Point<f32>,
        to: Point<f32>,
        color: Color,
        thickness: f32,
    },
    Text {
        pos: Point<f32>,
        color: Color,
        size: f32,
        text: String,
    },
    Image {
        rect: Rect<f32>,
        texture: TextureId,
        uv_min: Point<f32>,
        uv_max: Point<f32>,
        tint: Color,
    },
    PushClip {
        rect: Rect<f32>,
    },
    PopClip,
}

/// An ordered list of primitives for one frame.
#[derive(Debug, Default)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
}

impl DrawList {
    pub fn new() -> Self {
        DrawList::default()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn rect_filled(&mut self, rect: Rect<f32>, color: Color, rounding: f32) {
        if color.a > 0.0 && rect.width > 0.0 && rect.height > 0.0 {
            self.commands.push(DrawCommand::RectFilled { rect, color, rounding });
        }
    }

    pub fn rect(&mut self, rect: Rect<f32>, color: Color, rounding: f32, thickness: f32) {
        if color.a > 0.0 {
            self.commands.push(DrawCommand::Rect { rect, color, rounding, thickness });
        }
    }

    pub fn line(&mut self, from: Point<f32>, to: Point<f32>, color: Color, thickness: f32) {
        if color.a > 0.0 {
            self.commands.push(DrawCommand::Line { from, to, color, thickness });
        }
    }

    pub fn text(&mut self, pos: Point<f32>, color: Color, size: f32, text: impl Into<String>) {
        let text = text.into();
        if color.a > 0.0 && !text.is_empty() {
            self.commands.push(DrawCommand::Text { pos, color, size, text });
        }
    }

    pub fn image(
        &mut self,
        rect: Rect<f32>,
        texture: TextureId,
        uv_min: Point<f32>,
        uv_max: Point<f32>,
        tint: Color,
    ) {
        self.commands.push(DrawCommand::Image { rect, texture, uv_min, uv_max, tint });
    }

    pub fn push_clip(&mut self, rect: Rect<f32>) {
        self.commands.push(DrawCommand::PushClip { rect });
    }

    pub fn pop_clip(&mut self) {
        self.commands.push(DrawCommand::PopClip);
    }
}

/// Text metrics supplied by the host's font backend.
pub trait TextMeasure {
    /// Size of `text` rendered at `font_size`.
    fn measure(&self, text: &str, font_size: f32) -> Size<f32>;

    /// Height of one line at `font_size`.
    fn line_height(&self, font_size: f32) -> f32 {
        font_size * 1.2
    }
}

/// Fixed-advance metrics for tests and headless layout.
pub struct MonospaceTextMeasure {
    /// Horizontal advance as a fraction of the font size.
    pub advance: f32,
}

impl Default for MonospaceTextMeasure {
    fn default() -> Self {
        MonospaceTextMeasure { advance: 0.6 }
    }
}

impl TextMeasure for MonospaceTextMeasure {
    fn measure(&self, text: &str, font_size: f32) -> Size<f32> {
        let longest_line = text.lines().map(|l| l.chars().count()).max().unwrap_or(0);
        let line_count = text.lines().count().max(1);
        Size::new(
            longest_line as f32 * font_size * self.advance,
            line_count as f32 * self.line_height(font_size),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invisible_primitives_are_skipped() {
        let mut list = DrawList::new();
        list.rect_filled(Rect::new(0.0, 0.0, 10.0, 10.0), Color::TRANSPARENT, 0.0);
        list.text(Point::new(0.0, 0.0), Color::WHITE, 14.0, "");
        assert!(list.commands().is_empty());
    }

    #[test]
    fn commands_keep_emission_order() {
        let mut list = DrawList::new();
        list.push_clip(Rect::new(0.0, 0.0, 100.0, 100.0));
        list.rect_filled(Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE, 0.0);
        list.pop_clip();
        assert!(matches!(list.commands()[0], DrawCommand::PushClip { .. }));
        assert!(matches!(list.commands()[2], DrawCommand::PopClip));
    }

    #[test]
    fn monospace_measure_counts_lines() {
        let measure = MonospaceTextMeasure::default();
        let single = measure.measure("abcd", 10.0);
        assert_eq!(single.width, 24.0);
        let double = measure.measure("ab\nabcdef", 10.0);
        assert_eq!(double.height, 24.0);
        assert_eq!(double.width, 36.0);
    }
}
