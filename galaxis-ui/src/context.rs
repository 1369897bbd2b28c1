//! UI-wide state and the frame entry points.
//!
//! `UiContext` tracks the two singleton interaction states — at most one
//! focused element, at most one pointer-capturing element (they may
//! differ) — plus the active theme and the event queue the host drains.
//! `UiRoot` owns the tree and runs the per-frame sequence: route input,
//! advance animations, measure, arrange, draw.

use std::collections::VecDeque;

use galaxis_core::types::{Point, Rect, Size};

use crate::draw::{DrawList, TextMeasure};
use crate::element::{DrawParams, Element, ElementId, ElementKind, SizePolicy};
use crate::input::{InputState, UiEvent};
use crate::theme::Theme;
use crate::widgets::Panel;

/// Global UI state: focus, capture, theme, pending events.
pub struct UiContext {
    pub theme: Theme,
    focused: Option<ElementId>,
    captured: Option<ElementId>,
    focus_claimed_this_frame: bool,
    events: VecDeque<UiEvent>,
}

impl Default for UiContext {
    fn default() -> Self {
        UiContext {
            theme: Theme::default(),
            focused: None,
            captured: None,
            focus_claimed_this_frame: false,
            events: VecDeque::new(),
        }
    }
}

impl UiContext {
    pub fn focused(&self) -> Option<ElementId> {
        self.focused
    }

    pub fn captured(&self) -> Option<ElementId> {
        self.captured
    }

    pub fn is_capturing(&self) -> bool {
        self.captured.is_some()
    }

    /// Moves keyboard focus to `id`. The losing element gets a focus-lost
    /// event on this frame; the gaining element a focus-gained event.
    pub fn set_focus(&mut self, id: ElementId) {
        self.focus_claimed_this_frame = true;
        if self.focused == Some(id) {
            return;
        }
        if let Some(old) = self.focused.take() {
            self.events.push_back(UiEvent::FocusLost(old));
        }
        self.focused = Some(id);
        self.events.push_back(UiEvent::FocusGained(id));
    }

    pub fn clear_focus(&mut self) {
        if let Some(old) = self.focused.take() {
            self.events.push_back(UiEvent::FocusLost(old));
        }
    }

    /// Routes all pointer events to `id` until released.
    pub fn set_capture(&mut self, id: ElementId) {
        self.captured = Some(id);
    }

    /// Releases capture if `id` is the captor.
    pub fn release_capture(&mut self, id: ElementId) {
        if self.captured == Some(id) {
            self.captured = None;
        }
    }

    pub fn push_event(&mut self, event: UiEvent) {
        self.events.push_back(event);
    }

    /// Drains the events accumulated since the last call.
    pub fn drain_events(&mut self) -> Vec<UiEvent> {
        self.events.drain(..).collect()
    }

    pub(crate) fn begin_frame(&mut self) {
        self.focus_claimed_this_frame = false;
    }

    pub(crate) fn focus_claimed_this_frame(&self) -> bool {
        self.focus_claimed_this_frame
    }
}

/// The top of the retained tree.
pub struct UiRoot {
    pub root: Element,
    pub context: UiContext,
}

impl Default for UiRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl UiRoot {
    /// An empty, input-transparent root covering the viewport.
    pub fn new() -> Self {
        let mut panel = Panel::default();
        panel.background = crate::theme::StyleColor::none();
        let mut root = Element::named(ElementKind::Panel(panel), "root");
        root.block_input = false;
        root.width = SizePolicy::Stretch(1.0);
        root.height = SizePolicy::Stretch(1.0);
        UiRoot { root, context: UiContext::default() }
    }

    /// Runs one frame: input routing (capture first, then top-down
    /// reverse-child-order hit testing), keyboard delivery to the focused
    /// element, animation updates, then measure and arrange over
    /// `viewport`.
    pub fn update(
        &mut self,
        dt: f32,
        viewport: Size<f32>,
        input: &InputState,
        text: &dyn TextMeasure,
    ) {
        let ctx = &mut self.context;
        ctx.begin_frame();
        self.root.reset_interaction();

        if let Some(captured) = ctx.captured() {
            if let Some(element) = self.root.find_mut(captured) {
                element.handle_mouse(input, ctx);
            } else {
                // Captor vanished; drop the stale capture.
                ctx.release_capture(captured);
            }
        } else {
            self.root.route_mouse(input, ctx);
        }

        // A click that no element claimed clears focus.
        if input.mouse_clicked && !ctx.focus_claimed_this_frame() {
            ctx.clear_focus();
        }

        if !input.chars.is_empty() || !input.keys.is_empty() {
            if let Some(focused) = ctx.focused() {
                if let Some(element) = self.root.find_mut(focused) {
                    element.handle_keyboard(input, ctx);
                }
            }
        }

        self.root.update(dt, ctx);

        self.root.measure(viewport, text);
        self.root
            .arrange(Rect::new(0.0, 0.0, viewport.width, viewport.height), Point::default());
    }

    /// Emits the tree into `list`.
    pub fn draw(&self, list: &mut DrawList, text: &dyn TextMeasure) {
        let params = DrawParams {
            theme: &self.context.theme,
            text,
            focused: self.context.focused(),
        };
        self.root.draw(list, &params, 1.0);
    }

    /// Drains the frame's UI events.
    pub fn drain_events(&mut self) -> Vec<UiEvent> {
        self.context.drain_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::MonospaceTextMeasure;
    use crate::element::Alignment;
    use crate::widgets::{Button, InputField};
    use pretty_assertions::assert_eq;

    fn input_field_at(y: f32) -> Element {
        let mut field = Element::new(ElementKind::InputField(InputField::default()));
        field.width = SizePolicy::Fixed(100.0);
        field.height = SizePolicy::Fixed(20.0);
        field.align_h = Alignment::Start;
        field.align_v = Alignment::Start;
        let _ = y;
        field
    }

    fn click_at(x: f32, y: f32) -> InputState {
        InputState {
            mouse_pos: Point::new(x, y),
            mouse_down: true,
            mouse_clicked: true,
            ..Default::default()
        }
    }

    fn frame(root: &mut UiRoot, input: &InputState) {
        let text = MonospaceTextMeasure::default();
        root.update(0.016, Size::new(400.0, 300.0), input, &text);
    }

    #[test]
    fn focus_hands_off_between_input_fields() {
        let mut ui = UiRoot::new();
        let mut column = Element::new(ElementKind::VBox { padding: 10.0 });
        column.block_input = false;
        column.add_child(input_field_at(0.0));
        column.add_child(input_field_at(30.0));
        ui.root.add_child(column);

        // Initial frame to lay out.
        frame(&mut ui, &InputState::default());
        let first = ui.root.children[0].children[0].id;
        let second = ui.root.children[0].children[1].id;

        frame(&mut ui, &click_at(5.0, 5.0));
        assert_eq!(ui.context.focused(), Some(first));
        let events = ui.drain_events();
        assert!(events.contains(&UiEvent::FocusGained(first)));

        // Typed characters reach the focused field.
        let mut typing = InputState::default();
        typing.chars = vec!['h', 'i'];
        frame(&mut ui, &typing);
        let field = ui.root.find(first).unwrap();
        if let ElementKind::InputField(state) = &field.kind {
            assert_eq!(state.text, "hi");
        } else {
            unreachable!();
        }

        // Click the second field: focus transfers atomically, the loser is
        // notified on the transitioning frame.
        frame(&mut ui, &click_at(5.0, 35.0));
        assert_eq!(ui.context.focused(), Some(second));
        let events = ui.drain_events();
        assert!(events.contains(&UiEvent::FocusLost(first)));
        assert!(events.contains(&UiEvent::FocusGained(second)));
    }

    #[test]
    fn click_outside_clears_focus() {
        let mut ui = UiRoot::new();
        ui.root.add_child(input_field_at(0.0));
        frame(&mut ui, &InputState::default());
        let field = ui.root.children[0].id;

        frame(&mut ui, &click_at(5.0, 5.0));
        assert_eq!(ui.context.focused(), Some(field));

        frame(&mut ui, &click_at(300.0, 200.0));
        assert_eq!(ui.context.focused(), None);
        assert!(ui.drain_events().contains(&UiEvent::FocusLost(field)));
    }

    #[test]
    fn last_child_is_hit_tested_first() {
        let mut ui = UiRoot::new();
        // Two overlapping buttons; the later child wins the hit test.
        let mut first = Element::new(ElementKind::Button(Button {
            action: "under".to_string(),
            ..Default::default()
        }));
        first.width = SizePolicy::Fixed(100.0);
        first.height = SizePolicy::Fixed(100.0);
        first.align_h = Alignment::Start;
        first.align_v = Alignment::Start;
        let mut second = Element::new(ElementKind::Button(Button {
            action: "over".to_string(),
            ..Default::default()
        }));
        second.width = SizePolicy::Fixed(100.0);
        second.height = SizePolicy::Fixed(100.0);
        second.align_h = Alignment::Start;
        second.align_v = Alignment::Start;
        ui.root.add_child(first);
        ui.root.add_child(second);

        frame(&mut ui, &InputState::default());
        frame(&mut ui, &click_at(50.0, 50.0));
        let release = InputState {
            mouse_pos: Point::new(50.0, 50.0),
            mouse_released: true,
            ..Default::default()
        };
        frame(&mut ui, &release);

        let actions: Vec<String> = ui
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Action { action, .. } => Some(action),
                _ => None,
            })
            .collect();
        assert_eq!(actions, vec!["over".to_string()]);
    }

    #[test]
    fn capture_routes_all_events_to_captor() {
        let mut ui = UiRoot::new();
        let mut button = Element::new(ElementKind::Button(Button {
            action: "fire".to_string(),
            ..Default::default()
        }));
        button.width = SizePolicy::Fixed(50.0);
        button.height = SizePolicy::Fixed(20.0);
        button.align_h = Alignment::Start;
        button.align_v = Alignment::Start;
        ui.root.add_child(button);

        frame(&mut ui, &InputState::default());
        frame(&mut ui, &click_at(10.0, 10.0));
        assert!(ui.context.is_capturing());

        // Release outside: capture ends, no action fires.
        let release_outside = InputState {
            mouse_pos: Point::new(300.0, 200.0),
            mouse_released: true,
            ..Default::default()
        };
        frame(&mut ui, &release_outside);
        assert!(!ui.context.is_capturing());
        let actions = ui
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, UiEvent::Action { .. }))
            .count();
        assert_eq!(actions, 0);
    }

    #[test]
    fn at_most_one_focused_and_one_captured() {
        let mut ctx = UiContext::default();
        ctx.set_focus(1);
        ctx.set_focus(2);
        assert_eq!(ctx.focused(), Some(2));
        ctx.set_capture(3);
        ctx.set_capture(4);
        assert_eq!(ctx.captured(), Some(4));
        // Focus and capture may legitimately differ.
        assert_ne!(ctx.focused(), ctx.captured());
        // Releasing with the wrong id is a no-op.
        ctx.release_capture(99);
        assert_eq!(ctx.captured(), Some(4));
    }
}
