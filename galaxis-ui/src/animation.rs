//! Tween animation.
//!
//! A tween drives one float property of its owning element from `start` to
//! `end` over `duration` seconds through an easing curve. Tweens live
//! inside their element, so destroying an element cancels its tweens, and
//! re-targeting a property replaces the tween already running on it.

/// Easing curves, in closed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutQuad,
    EaseOutBack,
}

/// Applies `easing` to a normalized time `t`, clamped into `[0, 1]`.
pub fn ease(t: f32, easing: Easing) -> f32 {
    let t = t.clamp(0.0, 1.0);
    match easing {
        Easing::Linear => t,
        Easing::EaseInQuad => t * t,
        Easing::EaseOutQuad => t * (2.0 - t),
        Easing::EaseInOutQuad => {
            if t < 0.5 {
                2.0 * t * t
            } else {
                -1.0 + (4.0 - 2.0 * t) * t
            }
        }
        Easing::EaseOutBack => {
            let c1 = 1.70158f32;
            let c3 = c1 + 1.0;
            1.0 + c3 * (t - 1.0).powi(3) + c1 * (t - 1.0).powi(2)
        }
    }
}

/// The animatable float properties of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweenProperty {
    X,
    Y,
    Width,
    Height,
    Alpha,
    ScrollY,
}

/// Callback invoked when a tween reaches its end.
pub type TweenCallback = Box<dyn FnOnce()>;

/// A running animation on one element property.
pub struct Tween {
    pub property: TweenProperty,
    pub start: f32,
    pub end: f32,
    pub current_time: f32,
    pub duration: f32,
    pub easing: Easing,
    pub on_complete: Option<TweenCallback>,
}

impl Tween {
    pub fn new(
        property: TweenProperty,
        start: f32,
        end: f32,
        duration: f32,
        easing: Easing,
        on_complete: Option<TweenCallback>,
    ) -> Self {
        Tween { property, start, end, current_time: 0.0, duration, easing, on_complete }
    }

    /// Advances by `dt` and reports the property's new value plus whether
    /// the tween finished this tick.
    pub fn advance(&mut self, dt: f32) -> (f32, bool) {
        self.current_time += dt;
        let t = if self.duration <= f32::EPSILON {
            1.0
        } else {
            (self.current_time / self.duration).clamp(0.0, 1.0)
        };
        let value = self.start + (self.end - self.start) * ease(t, self.easing);
        (value, t >= 1.0)
    }
}

/// Advances every tween in `tweens`, returning `(property, value)` updates
/// in order. Completed tweens fire their callbacks and are removed.
pub fn advance_tweens(tweens: &mut Vec<Tween>, dt: f32) -> Vec<(TweenProperty, f32)> {
    let mut updates = Vec::with_capacity(tweens.len());
    let mut index = 0;
    while index < tweens.len() {
        let (value, finished) = tweens[index].advance(dt);
        updates.push((tweens[index].property, value));
        if finished {
            let mut tween = tweens.remove(index);
            if let Some(callback) = tween.on_complete.take() {
                callback();
            }
        } else {
            index += 1;
        }
    }
    updates
}

/// Inserts `tween`, replacing any tween already targeting the same
/// property.
pub fn retarget(tweens: &mut Vec<Tween>, tween: Tween) {
    tweens.retain(|existing| existing.property != tween.property);
    tweens.push(tween);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn easing_endpoints_are_fixed() {
        for easing in [
            Easing::Linear,
            Easing::EaseInQuad,
            Easing::EaseOutQuad,
            Easing::EaseInOutQuad,
            Easing::EaseOutBack,
        ] {
            assert!(close(ease(0.0, easing), 0.0), "{easing:?} at 0");
            assert!(close(ease(1.0, easing), 1.0), "{easing:?} at 1");
        }
    }

    #[test]
    fn easing_midpoints_match_closed_forms() {
        assert!(close(ease(0.5, Easing::Linear), 0.5));
        assert!(close(ease(0.5, Easing::EaseInQuad), 0.25));
        assert!(close(ease(0.5, Easing::EaseOutQuad), 0.75));
        assert!(close(ease(0.5, Easing::EaseInOutQuad), 0.5));
        // EaseOutBack overshoots past 1 on the way in.
        assert!(ease(0.8, Easing::EaseOutBack) > 1.0);
    }

    #[test]
    fn time_is_clamped() {
        assert_eq!(ease(-1.0, Easing::Linear), 0.0);
        assert_eq!(ease(2.0, Easing::EaseInQuad), 1.0);
    }

    #[test]
    fn tween_advances_and_completes() {
        let mut tween = Tween::new(TweenProperty::Alpha, 0.0, 1.0, 1.0, Easing::Linear, None);
        let (value, finished) = tween.advance(0.5);
        assert!(close(value, 0.5));
        assert!(!finished);
        let (value, finished) = tween.advance(0.6);
        assert!(close(value, 1.0));
        assert!(finished);
    }

    #[test]
    fn zero_duration_completes_immediately() {
        let mut tween = Tween::new(TweenProperty::X, 3.0, 7.0, 0.0, Easing::Linear, None);
        let (value, finished) = tween.advance(0.001);
        assert!(close(value, 7.0));
        assert!(finished);
    }

    #[test]
    fn completion_fires_callback_and_removes() {
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let mut tweens = vec![Tween::new(
            TweenProperty::Alpha,
            0.0,
            1.0,
            0.1,
            Easing::Linear,
            Some(Box::new(move || flag.set(true))),
        )];
        let updates = advance_tweens(&mut tweens, 0.2);
        assert!(fired.get());
        assert!(tweens.is_empty());
        assert_eq!(updates.len(), 1);
        assert!(close(updates[0].1, 1.0));
    }

    #[test]
    fn retarget_replaces_same_property_only() {
        let mut tweens = Vec::new();
        retarget(&mut tweens, Tween::new(TweenProperty::X, 0.0, 1.0, 1.0, Easing::Linear, None));
        retarget(&mut tweens, Tween::new(TweenProperty::Alpha, 0.0, 1.0, 1.0, Easing::Linear, None));
        retarget(&mut tweens, Tween::new(TweenProperty::X, 5.0, 9.0, 1.0, Easing::Linear, None));
        assert_eq!(tweens.len(), 2);
        let x_tween = tweens.iter().find(|t| t.property == TweenProperty::X).unwrap();
        assert_eq!(x_tween.start, 5.0);
    }
}
