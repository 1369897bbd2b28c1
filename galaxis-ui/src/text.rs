//! Text reveal effects.
//!
//! The hacker effect scrambles a string with a mask of identical byte
//! layout (ASCII bytes replaced from an ASCII pool, multi-byte characters
//! from a CJK pool, whitespace preserved) and reveals the real characters
//! left to right as the timer advances. The scroll effect slides the old
//! line up and fades it out while the new line rises in from below.

use rand::Rng;

use crate::animation::{ease, Easing};

/// Byte length of a UTF-8 character from its lead byte.
pub fn utf8_char_len(lead: u8) -> usize {
    if lead < 0x80 {
        1
    } else if lead & 0xE0 == 0xC0 {
        2
    } else if lead & 0xF0 == 0xE0 {
        3
    } else if lead & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}

/// Number of UTF-8 characters in `text`.
pub fn utf8_char_count(text: &str) -> usize {
    text.chars().count()
}

const ASCII_POOL: &[u8] = b"!<>-_\\/[]{}=+*^?#________";
const CJK_POOL: &[&str] = &[
    "\u{951F}", "\u{65A4}", "\u{62F7}", "\u{9518}", "\u{94A5}", "\u{70EB}", "\u{5C6F}",
    "\u{847A}", "\u{786A}", "\u{6861}", "\u{6543}", "\u{7404}", "\u{7F0D}", "\u{8106}",
];

/// How often the unrevealed portion of the mask re-scrambles.
const SCRAMBLE_INTERVAL: f32 = 0.016;

/// The hacker-style decode-in effect.
pub struct HackerTextEffect {
    target: String,
    mask: String,
    active: bool,
    timer: f32,
    delay_timer: f32,
    scramble_timer: f32,
    duration: f32,
}

impl HackerTextEffect {
    pub fn new(duration: f32) -> Self {
        HackerTextEffect {
            target: String::new(),
            mask: String::new(),
            active: false,
            timer: 0.0,
            delay_timer: 0.0,
            scramble_timer: 0.0,
            duration,
        }
    }

    /// Starts revealing `text` after `delay` seconds.
    pub fn start(&mut self, text: impl Into<String>, delay: f32) {
        self.target = text.into();
        self.active = true;
        self.timer = 0.0;
        self.delay_timer = delay;
        self.scramble_timer = 0.0;
        self.regenerate_mask(&mut rand::thread_rng());
    }

    pub fn reset(&mut self) {
        self.active = false;
        self.target.clear();
        self.mask.clear();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Reveal progress in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.001 {
            return 1.0;
        }
        (self.timer / self.duration).clamp(0.0, 1.0)
    }

    /// Advances timers; the mask re-scrambles every 16 ms while running.
    pub fn update(&mut self, dt: f32) {
        if !self.active {
            return;
        }
        if self.delay_timer > 0.0 {
            self.delay_timer -= dt;
            return;
        }

        self.timer += dt;
        if self.timer >= self.duration {
            self.timer = self.duration;
            self.active = false;
        }

        self.scramble_timer += dt;
        if self.scramble_timer >= SCRAMBLE_INTERVAL {
            self.regenerate_mask(&mut rand::thread_rng());
            self.scramble_timer = 0.0;
        }
    }

    /// The string to draw this frame: the first
    /// `⌊total_chars × progress⌋` characters from the target, the rest
    /// from the mask.
    pub fn display(&self) -> String {
        self.mixed_substring(&self.target, 0, self.progress())
    }

    /// Mixes a slice of the target (`global_offset` bytes into it) with the
    /// mask at the same byte positions. Used by multi-line consumers that
    /// reveal line by line.
    pub fn mixed_substring(&self, slice: &str, global_offset: usize, progress: f32) -> String {
        if progress >= 1.0 {
            return slice.to_string();
        }
        if progress <= 0.0 {
            if global_offset + slice.len() <= self.mask.len() {
                return self.mask[global_offset..global_offset + slice.len()].to_string();
            }
            return slice.to_string();
        }

        let total_chars = utf8_char_count(slice);
        let reveal_count = (total_chars as f32 * progress) as usize;

        let mut result = String::with_capacity(slice.len());
        let bytes = slice.as_bytes();
        let mut byte_pos = 0;
        let mut chars_done = 0;
        while byte_pos < bytes.len() {
            let char_len = utf8_char_len(bytes[byte_pos]);
            if chars_done < reveal_count {
                result.push_str(&slice[byte_pos..byte_pos + char_len]);
            } else {
                let mask_index = global_offset + byte_pos;
                if mask_index + char_len <= self.mask.len() {
                    // The mask shares the target's byte layout, so the
                    // same range is a whole character there too.
                    result.push_str(&self.mask[mask_index..mask_index + char_len]);
                } else {
                    result.push('?');
                }
            }
            byte_pos += char_len;
            chars_done += 1;
        }
        result
    }

    /// Rebuilds the scramble mask with the target's exact byte layout:
    /// single-byte characters map to ASCII noise, multi-byte characters to
    /// equally wide CJK noise, whitespace passes through.
    fn regenerate_mask(&mut self, rng: &mut impl Rng) {
        let mut mask = String::with_capacity(self.target.len());
        for ch in self.target.chars() {
            if ch.len_utf8() == 1 {
                if ch == '\n' || ch == ' ' || ch == '\t' || ch == '\r' {
                    mask.push(ch);
                } else {
                    let pick = ASCII_POOL[rng.gen_range(0..ASCII_POOL.len())];
                    mask.push(pick as char);
                }
            } else {
                // All pool entries are 3-byte CJK, matching the 3-byte
                // characters this effect targets; other widths fall back
                // to same-length padding.
                let replacement = CJK_POOL[rng.gen_range(0..CJK_POOL.len())];
                if replacement.len() == ch.len_utf8() {
                    mask.push_str(replacement);
                } else {
                    for _ in 0..ch.len_utf8() {
                        mask.push('?');
                    }
                }
            }
        }
        self.mask = mask;
    }
}

/// State of the scroll transition for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollTextState {
    pub old_offset: f32,
    pub old_alpha: f32,
    pub new_offset: f32,
    pub new_alpha: f32,
}

/// The scroll transition: the previous string slides up and fades out
/// while the new one rises from below and fades in.
pub struct ScrollTextEffect {
    old_text: String,
    new_text: String,
    timer: f32,
    duration: f32,
}

impl ScrollTextEffect {
    pub fn new(duration: f32) -> Self {
        ScrollTextEffect {
            old_text: String::new(),
            new_text: String::new(),
            timer: f32::MAX,
            duration,
        }
    }

    /// Begins a transition from the current text to `text`.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.old_text = std::mem::take(&mut self.new_text);
        self.new_text = text.into();
        self.timer = 0.0;
    }

    pub fn update(&mut self, dt: f32) {
        if self.timer < self.duration {
            self.timer += dt;
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.timer < self.duration
    }

    pub fn old_text(&self) -> &str {
        &self.old_text
    }

    pub fn new_text(&self) -> &str {
        &self.new_text
    }

    /// Offsets (in multiples of `line_height`) and alphas for both lines.
    pub fn state(&self, line_height: f32) -> ScrollTextState {
        let t = if self.duration <= f32::EPSILON {
            1.0
        } else {
            (self.timer / self.duration).clamp(0.0, 1.0)
        };
        let p = ease(t, Easing::EaseOutQuad);
        ScrollTextState {
            old_offset: -line_height * p,
            old_alpha: 1.0 - p,
            new_offset: line_height * (1.0 - p),
            new_alpha: p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn char_len_table() {
        assert_eq!(utf8_char_len(b'a'), 1);
        assert_eq!(utf8_char_len(0xC3), 2);
        assert_eq!(utf8_char_len(0xE9), 3);
        assert_eq!(utf8_char_len(0xF0), 4);
    }

    #[test]
    fn mask_preserves_byte_layout() {
        let mut effect = HackerTextEffect::new(1.0);
        effect.start("abc 星系\nxy", 0.0);
        assert_eq!(effect.mask.len(), effect.target.len());
        // Whitespace survives scrambling.
        let mask_bytes = effect.mask.as_bytes();
        let target_bytes = effect.target.as_bytes();
        for (i, &b) in target_bytes.iter().enumerate() {
            if b == b' ' || b == b'\n' {
                assert_eq!(mask_bytes[i], b);
            }
        }
        // Character boundaries line up one-to-one.
        assert_eq!(utf8_char_count(&effect.mask), utf8_char_count(&effect.target));
    }

    #[test]
    fn zero_progress_shows_mask_full_progress_shows_target() {
        let mut effect = HackerTextEffect::new(1.0);
        effect.start("decode me", 0.0);
        let masked = effect.mixed_substring(effect.target(), 0, 0.0);
        assert_eq!(masked.len(), "decode me".len());
        assert_eq!(effect.mixed_substring("decode me", 0, 1.0), "decode me");
    }

    #[test]
    fn reveal_prefix_grows_with_progress() {
        let mut effect = HackerTextEffect::new(1.0);
        effect.start("galaxy", 0.0);
        let half = effect.mixed_substring("galaxy", 0, 0.5);
        assert_eq!(&half[..3], "gal");
        assert_eq!(half.len(), "galaxy".len());
    }

    #[test]
    fn effect_finishes_after_duration() {
        let mut effect = HackerTextEffect::new(0.5);
        effect.start("x", 0.0);
        assert!(effect.is_active());
        effect.update(0.6);
        assert!(!effect.is_active());
        assert_eq!(effect.progress(), 1.0);
        assert_eq!(effect.display(), "x");
    }

    #[test]
    fn delay_defers_the_timer() {
        let mut effect = HackerTextEffect::new(0.5);
        effect.start("x", 1.0);
        effect.update(0.5);
        assert_eq!(effect.progress(), 0.0);
        effect.update(0.6);
        effect.update(0.2);
        assert!(effect.progress() > 0.0);
    }

    #[test]
    fn scroll_effect_crossfades() {
        let mut effect = ScrollTextEffect::new(1.0);
        effect.set_text("first");
        effect.update(2.0);
        assert!(!effect.is_transitioning());

        effect.set_text("second");
        assert_eq!(effect.old_text(), "first");
        let begin = effect.state(20.0);
        assert_eq!(begin.old_alpha, 1.0);
        assert_eq!(begin.new_alpha, 0.0);
        assert_eq!(begin.new_offset, 20.0);

        effect.update(2.0);
        let end = effect.state(20.0);
        assert_eq!(end.old_alpha, 0.0);
        assert_eq!(end.new_alpha, 1.0);
        assert_eq!(end.new_offset, 0.0);
        assert_eq!(end.old_offset, -20.0);
    }
}
