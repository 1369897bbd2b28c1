//! The element tree and its measure → arrange → draw lifecycle.
//!
//! Layout runs in two passes every frame. `measure` reports each element's
//! desired size under its width/height policy (Fixed, Content, Stretch);
//! `arrange` assigns final rectangles, with VBox/HBox distributing the
//! residual space to Stretch children by weight only after fixed and
//! content sizes are known. Absolute positions accumulate top-down during
//! arrange, and drawing multiplies alpha down the tree.

use std::sync::atomic::{AtomicU64, Ordering};

use galaxis_core::types::{Point, Rect, Size};

use crate::animation::{advance_tweens, retarget, Easing, Tween, TweenCallback, TweenProperty};
use crate::context::UiContext;
use crate::draw::{DrawList, TextMeasure};
use crate::input::{InputState, Key, UiEvent};
use crate::theme::Theme;
use crate::widgets::{
    Button, ImageWidget, InputField, Panel, ScrollState, TextWidget,
};

/// Stable identity of an element, unique within the process.
pub type ElementId = u64;

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

fn next_element_id() -> ElementId {
    NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// How an element sizes itself along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizePolicy {
    /// Exactly this many pixels.
    Fixed(f32),
    /// Share of the parent's leftover space, proportional to the weight.
    Stretch(f32),
    /// Derived from children or intrinsic content.
    Content,
}

/// Placement of an element inside the slot its parent assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Start,
    Center,
    End,
    Stretch,
}

/// The widget-specific part of an element.
pub enum ElementKind {
    Panel(Panel),
    VBox { padding: f32 },
    HBox { padding: f32 },
    ScrollView(ScrollState),
    Text(TextWidget),
    Image(ImageWidget),
    Button(Button),
    InputField(InputField),
    Spacer,
}

/// Parameters threaded through the draw pass.
pub struct DrawParams<'a> {
    pub theme: &'a Theme,
    pub text: &'a dyn TextMeasure,
    pub focused: Option<ElementId>,
}

/// A node of the retained tree.
pub struct Element {
    pub id: ElementId,
    pub name: String,
    /// Rectangle relative to the parent, assigned by arrange.
    pub rect: Rect<f32>,
    /// Cached top-left in root coordinates.
    pub absolute_pos: Point<f32>,
    pub visible: bool,
    pub alpha: f32,
    pub width: SizePolicy,
    pub height: SizePolicy,
    pub align_h: Alignment,
    pub align_v: Alignment,
    pub block_input: bool,
    pub focusable: bool,
    pub hovered: bool,
    pub pressed: bool,
    pub kind: ElementKind,
    pub children: Vec<Element>,
    tweens: Vec<Tween>,
    desired_size: Size<f32>,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        let focusable = matches!(kind, ElementKind::InputField(_));
        Element {
            id: next_element_id(),
            name: String::new(),
            rect: Rect::default(),
            absolute_pos: Point::default(),
            visible: true,
            alpha: 1.0,
            width: SizePolicy::Stretch(1.0),
            height: SizePolicy::Stretch(1.0),
            align_h: Alignment::Stretch,
            align_v: Alignment::Stretch,
            block_input: true,
            focusable,
            hovered: false,
            pressed: false,
            kind,
            children: Vec::new(),
            tweens: Vec::new(),
            desired_size: Size::default(),
        }
    }

    pub fn named(kind: ElementKind, name: impl Into<String>) -> Self {
        let mut element = Element::new(kind);
        element.name = name.into();
        element
    }

    pub fn with_size(mut self, width: SizePolicy, height: SizePolicy) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn add_child(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn remove_child(&mut self, id: ElementId) {
        self.children.retain(|c| c.id != id);
    }

    pub fn desired_size(&self) -> Size<f32> {
        self.desired_size
    }

    /// The element's rectangle in root coordinates.
    pub fn absolute_rect(&self) -> Rect<f32> {
        Rect::new(self.absolute_pos.x, self.absolute_pos.y, self.rect.width, self.rect.height)
    }

    /// Depth-first lookup by id.
    pub fn find(&self, id: ElementId) -> Option<&Element> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_by_name_mut(name))
    }

    // ----- animation -----

    fn property_value(&self, property: TweenProperty) -> f32 {
        match property {
            TweenProperty::X => self.rect.x,
            TweenProperty::Y => self.rect.y,
            TweenProperty::Width => self.rect.width,
            TweenProperty::Height => self.rect.height,
            TweenProperty::Alpha => self.alpha,
            TweenProperty::ScrollY => match &self.kind {
                ElementKind::ScrollView(scroll) => scroll.scroll_y,
                _ => 0.0,
            },
        }
    }

    fn apply_property(&mut self, property: TweenProperty, value: f32) {
        match property {
            TweenProperty::X => self.rect.x = value,
            TweenProperty::Y => self.rect.y = value,
            TweenProperty::Width => self.rect.width = value,
            TweenProperty::Height => self.rect.height = value,
            TweenProperty::Alpha => self.alpha = value,
            TweenProperty::ScrollY => {
                if let ElementKind::ScrollView(scroll) = &mut self.kind {
                    scroll.scroll_y = value;
                }
            }
        }
    }

    /// Animates `property` from its current value to `end`. A tween
    /// already running on the same property is replaced.
    pub fn animate(&mut self, property: TweenProperty, end: f32, duration: f32, easing: Easing) {
        let start = self.property_value(property);
        retarget(&mut self.tweens, Tween::new(property, start, end, duration, easing, None));
    }

    /// Like [`Self::animate`], firing `on_complete` when the tween ends.
    pub fn animate_with(
        &mut self,
        property: TweenProperty,
        end: f32,
        duration: f32,
        easing: Easing,
        on_complete: TweenCallback,
    ) {
        let start = self.property_value(property);
        retarget(
            &mut self.tweens,
            Tween::new(property, start, end, duration, easing, Some(on_complete)),
        );
    }

    pub fn has_tweens(&self) -> bool {
        !self.tweens.is_empty()
    }

    // ----- per-frame state -----

    /// Clears transient interaction state before input routing.
    pub fn reset_interaction(&mut self) {
        self.hovered = false;
        for child in &mut self.children {
            child.reset_interaction();
        }
    }

    /// Advances tweens, effects and children.
    pub fn update(&mut self, dt: f32, ctx: &mut UiContext) {
        for (property, value) in advance_tweens(&mut self.tweens, dt) {
            self.apply_property(property, value);
        }

        match &mut self.kind {
            ElementKind::Text(text) => {
                text.refresh();
                text.update_effect(dt);
            }
            ElementKind::InputField(field) => {
                field.caret_timer += dt;
            }
            _ => {}
        }

        for child in &mut self.children {
            child.update(dt, ctx);
        }
    }

    // ----- measure -----

    /// Reports the size this element wants under `available` constraints.
    pub fn measure(&mut self, available: Size<f32>, text: &dyn TextMeasure) -> Size<f32> {
        if !self.visible {
            self.desired_size = Size::default();
            return self.desired_size;
        }

        let intrinsic = self.measure_intrinsic(available, text);

        let width = match self.width {
            SizePolicy::Fixed(value) => value,
            SizePolicy::Content => intrinsic.width,
            SizePolicy::Stretch(_) => 0.0,
        };
        let height = match self.height {
            SizePolicy::Fixed(value) => value,
            SizePolicy::Content => intrinsic.height,
            SizePolicy::Stretch(_) => 0.0,
        };

        self.desired_size = Size::new(width, height);
        self.desired_size
    }

    fn measure_intrinsic(&mut self, available: Size<f32>, text: &dyn TextMeasure) -> Size<f32> {
        match &mut self.kind {
            ElementKind::Text(widget) => {
                widget.refresh();
                text.measure(&widget.cached, widget.font_size)
            }
            ElementKind::Button(button) => {
                let label = text.measure(&button.label, button.font_size);
                Size::new(label.width + 16.0, label.height + 8.0)
            }
            ElementKind::InputField(field) => {
                let line = text.line_height(field.font_size);
                Size::new(160.0, line + 8.0)
            }
            ElementKind::Image(image) => image.preferred_size,
            ElementKind::Spacer => Size::default(),
            ElementKind::VBox { padding } => {
                let padding = *padding;
                let mut total: Size<f32> = Size::default();
                let mut visible_children = 0;
                for child in &mut self.children {
                    if !child.visible {
                        continue;
                    }
                    let child_size = child.measure(available, text);
                    total.width = total.width.max(child_size.width);
                    total.height += child_size.height;
                    visible_children += 1;
                }
                if visible_children > 1 {
                    total.height += padding * (visible_children - 1) as f32;
                }
                total
            }
            ElementKind::HBox { padding } => {
                let padding = *padding;
                let mut total: Size<f32> = Size::default();
                let mut visible_children = 0;
                for child in &mut self.children {
                    if !child.visible {
                        continue;
                    }
                    let child_size = child.measure(available, text);
                    total.width += child_size.width;
                    total.height = total.height.max(child_size.height);
                    visible_children += 1;
                }
                if visible_children > 1 {
                    total.width += padding * (visible_children - 1) as f32;
                }
                total
            }
            ElementKind::ScrollView(_) => {
                // One content child, measured without a height constraint.
                let mut size = Size::default();
                for child in &mut self.children {
                    let child_size = child.measure(available, text);
                    size = size.max(child_size);
                }
                size
            }
            ElementKind::Panel(_) => {
                // Union of the children's desires.
                let mut size = Size::default();
                for child in &mut self.children {
                    if child.visible {
                        size = size.max(child.measure(available, text));
                    }
                }
                size
            }
        }
    }

    // ----- arrange -----

    /// Assigns the final rectangle and lays out children.
    pub fn arrange(&mut self, final_rect: Rect<f32>, parent_abs: Point<f32>) {
        self.rect = final_rect;
        self.absolute_pos = Point::new(parent_abs.x + final_rect.x, parent_abs.y + final_rect.y);
        let my_abs = self.absolute_pos;
        let my_size = Size::new(final_rect.width, final_rect.height);

        match &mut self.kind {
            ElementKind::VBox { padding } => {
                let padding = *padding;
                arrange_stack(&mut self.children, my_size, my_abs, padding, Axis::Vertical);
            }
            ElementKind::HBox { padding } => {
                let padding = *padding;
                arrange_stack(&mut self.children, my_size, my_abs, padding, Axis::Horizontal);
            }
            ElementKind::ScrollView(scroll) => {
                // Content extent is known from the measure pass; clamp the
                // scroll before placing so the child never overshoots.
                let content_height = self
                    .children
                    .iter()
                    .map(|c| {
                        if c.desired_size.height > 0.0 { c.desired_size.height } else { my_size.height }
                    })
                    .fold(0.0f32, f32::max);
                scroll.content_height = content_height;
                scroll.scroll_y = scroll
                    .scroll_y
                    .clamp(0.0, (content_height - my_size.height).max(0.0));
                let scroll_y = scroll.scroll_y;

                for child in &mut self.children {
                    let desired = child.desired_size;
                    let height = if desired.height > 0.0 { desired.height } else { my_size.height };
                    child.arrange(Rect::new(0.0, -scroll_y, my_size.width, height), my_abs);
                }
            }
            _ => {
                for child in &mut self.children {
                    if !child.visible {
                        continue;
                    }
                    let slot = place_in_slot(
                        child.desired_size,
                        my_size,
                        child.align_h,
                        child.align_v,
                    );
                    child.arrange(slot, my_abs);
                }
            }
        }
    }

    // ----- input -----

    /// Routes a pointer event: children first in reverse order (last drawn
    /// is hit-tested first), then this element when it blocks input and
    /// contains the pointer. Returns whether the event was consumed.
    pub fn route_mouse(&mut self, input: &InputState, ctx: &mut UiContext) -> bool {
        if !self.visible {
            return false;
        }
        for child in self.children.iter_mut().rev() {
            if child.route_mouse(input, ctx) {
                return true;
            }
        }
        if self.block_input && self.absolute_rect().contains(input.mouse_pos) {
            return self.handle_mouse(input, ctx);
        }
        false
    }

    /// Pointer handling for this element alone. Also the capture target's
    /// entry point, so containment is re-checked per kind as needed.
    pub fn handle_mouse(&mut self, input: &InputState, ctx: &mut UiContext) -> bool {
        let inside = self.absolute_rect().contains(input.mouse_pos);
        match &mut self.kind {
            ElementKind::Button(button) => {
                self.hovered = inside;
                if input.mouse_clicked && inside {
                    self.pressed = true;
                    ctx.set_capture(self.id);
                }
                if input.mouse_released {
                    let fire = self.pressed && inside;
                    self.pressed = false;
                    ctx.release_capture(self.id);
                    if fire && !button.action.is_empty() {
                        ctx.push_event(UiEvent::Action {
                            element: self.id,
                            action: button.action.clone(),
                        });
                    }
                }
                inside
            }
            ElementKind::InputField(_) => {
                self.hovered = inside;
                if input.mouse_clicked && inside && self.focusable {
                    ctx.set_focus(self.id);
                }
                inside
            }
            ElementKind::ScrollView(scroll) => {
                if inside && input.wheel_delta != 0.0 {
                    let viewport = self.rect.height;
                    let max = scroll.max_scroll(viewport);
                    if max > 0.0 {
                        scroll.scroll_y =
                            (scroll.scroll_y - input.wheel_delta * scroll.scroll_speed)
                                .clamp(0.0, max);
                        return true;
                    }
                }
                inside
            }
            _ => {
                self.hovered = inside;
                inside
            }
        }
    }

    /// Keyboard/character input; the root directs this at the focused
    /// element only.
    pub fn handle_keyboard(&mut self, input: &InputState, ctx: &mut UiContext) -> bool {
        let id = self.id;
        if let ElementKind::InputField(field) = &mut self.kind {
            let mut changed = false;
            for ch in &input.chars {
                if !ch.is_control() {
                    field.text.push(*ch);
                    changed = true;
                }
            }
            for key in &input.keys {
                match key {
                    Key::Backspace => {
                        if field.text.pop().is_some() {
                            changed = true;
                        }
                    }
                    Key::Enter => {
                        ctx.push_event(UiEvent::TextCommitted {
                            element: id,
                            text: field.text.clone(),
                        });
                        ctx.clear_focus();
                    }
                    Key::Escape => {
                        ctx.clear_focus();
                    }
                    _ => {}
                }
            }
            if changed {
                ctx.push_event(UiEvent::TextChanged { element: id, text: field.text.clone() });
            }
            return true;
        }
        false
    }

    // ----- draw -----

    /// Emits this element and its children into the draw list. Alpha
    /// multiplies down the tree: `effective = alpha × parent_alpha`.
    pub fn draw(&self, list: &mut DrawList, params: &DrawParams, parent_alpha: f32) {
        if !self.visible {
            return;
        }
        let effective_alpha = self.alpha * parent_alpha;
        if effective_alpha <= 0.0 {
            return;
        }

        let rect = self.absolute_rect();
        match &self.kind {
            ElementKind::Panel(panel) => {
                let background = panel.background.resolve(params.theme).mul_alpha(effective_alpha);
                list.rect_filled(rect, background, panel.rounding);
                let border = panel.border.resolve(params.theme).mul_alpha(effective_alpha);
                list.rect(rect, border, panel.rounding, 1.0);
            }
            ElementKind::Button(button) => {
                let background = if self.pressed {
                    &button.background_active
                } else if self.hovered {
                    &button.background_hover
                } else {
                    &button.background
                };
                list.rect_filled(
                    rect,
                    background.resolve(params.theme).mul_alpha(effective_alpha),
                    button.rounding,
                );
                let label_size = params.text.measure(&button.label, button.font_size);
                let label_pos = Point::new(
                    rect.x + (rect.width - label_size.width) / 2.0,
                    rect.y + (rect.height - label_size.height) / 2.0,
                );
                list.text(
                    label_pos,
                    button.text_color.resolve(params.theme).mul_alpha(effective_alpha),
                    button.font_size,
                    button.label.clone(),
                );
            }
            ElementKind::InputField(field) => {
                list.rect_filled(
                    rect,
                    field.background.resolve(params.theme).mul_alpha(effective_alpha),
                    2.0,
                );
                list.rect(
                    rect,
                    field.border.resolve(params.theme).mul_alpha(effective_alpha),
                    2.0,
                    1.0,
                );
                let shown = if field.text.is_empty() { &field.placeholder } else { &field.text };
                let text_pos = Point::new(rect.x + 4.0, rect.y + 4.0);
                list.text(
                    text_pos,
                    field.text_color.resolve(params.theme).mul_alpha(effective_alpha),
                    field.font_size,
                    shown.clone(),
                );
                if params.focused == Some(self.id) && field.caret_visible() {
                    let caret_x =
                        text_pos.x + params.text.measure(&field.text, field.font_size).width + 1.0;
                    list.line(
                        Point::new(caret_x, rect.y + 3.0),
                        Point::new(caret_x, rect.bottom() - 3.0),
                        field.text_color.resolve(params.theme).mul_alpha(effective_alpha),
                        1.0,
                    );
                }
            }
            ElementKind::Text(widget) => {
                let color = widget.color.resolve(params.theme).mul_alpha(effective_alpha);
                match &widget.effect {
                    Some(crate::widgets::TextEffect::Scroll(effect)) if effect.is_transitioning() => {
                        let line = params.text.line_height(widget.font_size);
                        let state = effect.state(line);
                        list.text(
                            Point::new(rect.x, rect.y + state.old_offset),
                            color.mul_alpha(state.old_alpha),
                            widget.font_size,
                            effect.old_text().to_string(),
                        );
                        list.text(
                            Point::new(rect.x, rect.y + state.new_offset),
                            color.mul_alpha(state.new_alpha),
                            widget.font_size,
                            effect.new_text().to_string(),
                        );
                    }
                    _ => {
                        list.text(Point::new(rect.x, rect.y), color, widget.font_size, widget.display());
                    }
                }
            }
            ElementKind::Image(image) => {
                list.image(
                    rect,
                    image.texture,
                    image.uv_min,
                    image.uv_max,
                    image.tint.resolve(params.theme).mul_alpha(effective_alpha),
                );
            }
            ElementKind::ScrollView(_) | ElementKind::VBox { .. } | ElementKind::HBox { .. }
            | ElementKind::Spacer => {}
        }

        if let ElementKind::ScrollView(scroll) = &self.kind {
            list.push_clip(rect);
            for child in &self.children {
                child.draw(list, params, effective_alpha);
            }
            list.pop_clip();

            let max = scroll.max_scroll(rect.height);
            if scroll.show_scrollbar && max > 0.0 {
                let track_height = rect.height;
                let thumb_height =
                    (rect.height / scroll.content_height * track_height).max(12.0);
                let thumb_y = rect.y + (scroll.scroll_y / max) * (track_height - thumb_height);
                let thumb = Rect::new(rect.right() - 4.0, thumb_y, 3.0, thumb_height);
                list.rect_filled(
                    thumb,
                    params
                        .theme
                        .border
                        .mul_alpha(effective_alpha * 0.8),
                    1.5,
                );
            }
        } else {
            for child in &self.children {
                child.draw(list, params, effective_alpha);
            }
        }
    }
}

enum Axis {
    Vertical,
    Horizontal,
}

/// Stacks children along `axis` with `padding` between them: fixed and
/// content children keep their measured extent, stretch children share the
/// residual proportionally to their weights (the second pass of the
/// two-pass layout).
fn arrange_stack(
    children: &mut [Element],
    parent_size: Size<f32>,
    parent_abs: Point<f32>,
    padding: f32,
    axis: Axis,
) {
    let visible = children.iter().filter(|c| c.visible).count();
    if visible == 0 {
        return;
    }

    let main_total = match axis {
        Axis::Vertical => parent_size.height,
        Axis::Horizontal => parent_size.width,
    };

    let mut fixed_total = padding * (visible.saturating_sub(1)) as f32;
    let mut stretch_weight = 0.0f32;
    for child in children.iter().filter(|c| c.visible) {
        let policy = match axis {
            Axis::Vertical => child.height,
            Axis::Horizontal => child.width,
        };
        match policy {
            SizePolicy::Stretch(weight) => stretch_weight += weight.max(0.0),
            _ => {
                fixed_total += match axis {
                    Axis::Vertical => child.desired_size.height,
                    Axis::Horizontal => child.desired_size.width,
                }
            }
        }
    }
    let residual = (main_total - fixed_total).max(0.0);

    let mut cursor = 0.0f32;
    for child in children.iter_mut().filter(|c| c.visible) {
        let (policy, desired_main) = match axis {
            Axis::Vertical => (child.height, child.desired_size.height),
            Axis::Horizontal => (child.width, child.desired_size.width),
        };
        let main_extent = match policy {
            SizePolicy::Fixed(value) => value,
            SizePolicy::Content => desired_main,
            SizePolicy::Stretch(weight) => {
                if stretch_weight > 0.0 {
                    residual * weight.max(0.0) / stretch_weight
                } else {
                    0.0
                }
            }
        };

        let rect = match axis {
            Axis::Vertical => {
                let (x, width) = place_cross(
                    child.desired_size.width,
                    parent_size.width,
                    child.align_h,
                );
                Rect::new(x, cursor, width, main_extent)
            }
            Axis::Horizontal => {
                let (y, height) = place_cross(
                    child.desired_size.height,
                    parent_size.height,
                    child.align_v,
                );
                Rect::new(cursor, y, main_extent, height)
            }
        };
        child.arrange(rect, parent_abs);
        cursor += main_extent + padding;
    }
}

/// Position and extent along the cross axis for an alignment.
fn place_cross(desired: f32, available: f32, alignment: Alignment) -> (f32, f32) {
    match alignment {
        Alignment::Start => (0.0, desired),
        Alignment::Center => ((available - desired) / 2.0, desired),
        Alignment::End => (available - desired, desired),
        Alignment::Stretch => (0.0, available),
    }
}

/// Full slot placement for free-form containers.
fn place_in_slot(
    desired: Size<f32>,
    parent: Size<f32>,
    align_h: Alignment,
    align_v: Alignment,
) -> Rect<f32> {
    let (x, width) = place_cross(desired.width, parent.width, align_h);
    let (y, height) = place_cross(desired.height, parent.height, align_v);
    Rect::new(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::MonospaceTextMeasure;
    use pretty_assertions::assert_eq;

    fn fixed(width: f32, height: f32) -> Element {
        Element::new(ElementKind::Spacer)
            .with_size(SizePolicy::Fixed(width), SizePolicy::Fixed(height))
    }

    fn stretch(weight: f32) -> Element {
        Element::new(ElementKind::Spacer)
            .with_size(SizePolicy::Stretch(1.0), SizePolicy::Stretch(weight))
    }

    fn measure_and_arrange(root: &mut Element, width: f32, height: f32) {
        let text = MonospaceTextMeasure::default();
        root.measure(Size::new(width, height), &text);
        root.arrange(Rect::new(0.0, 0.0, width, height), Point::default());
    }

    #[test]
    fn vbox_stacks_fixed_children_with_padding() {
        let mut vbox = Element::new(ElementKind::VBox { padding: 10.0 })
            .with_child(fixed(50.0, 20.0))
            .with_child(fixed(50.0, 30.0));
        measure_and_arrange(&mut vbox, 100.0, 200.0);

        assert_eq!(vbox.children[0].rect, Rect::new(0.0, 0.0, 100.0, 20.0));
        assert_eq!(vbox.children[1].rect.y, 30.0);
        assert_eq!(vbox.children[1].rect.height, 30.0);
    }

    #[test]
    fn vbox_distributes_residual_to_stretch_by_weight() {
        let mut vbox = Element::new(ElementKind::VBox { padding: 0.0 })
            .with_child(fixed(10.0, 40.0))
            .with_child(stretch(1.0))
            .with_child(stretch(3.0));
        measure_and_arrange(&mut vbox, 100.0, 200.0);

        // 160 residual split 1:3.
        assert_eq!(vbox.children[1].rect.height, 40.0);
        assert_eq!(vbox.children[2].rect.height, 120.0);
        assert_eq!(vbox.children[2].rect.y, 80.0);
    }

    #[test]
    fn vbox_measures_content_before_distributing() {
        // A Content-height VBox mixing fixed and content children reports
        // their sum, not the parent constraint.
        let mut vbox = Element::new(ElementKind::VBox { padding: 5.0 })
            .with_size(SizePolicy::Content, SizePolicy::Content)
            .with_child(fixed(10.0, 40.0))
            .with_child(fixed(80.0, 25.0));
        let text = MonospaceTextMeasure::default();
        let desired = vbox.measure(Size::new(500.0, 500.0), &text);
        assert_eq!(desired.height, 70.0);
        assert_eq!(desired.width, 80.0);
    }

    #[test]
    fn hbox_is_the_vertical_mirror() {
        let mut hbox = Element::new(ElementKind::HBox { padding: 4.0 })
            .with_child(
                Element::new(ElementKind::Spacer)
                    .with_size(SizePolicy::Fixed(30.0), SizePolicy::Stretch(1.0)),
            )
            .with_child(
                Element::new(ElementKind::Spacer)
                    .with_size(SizePolicy::Stretch(1.0), SizePolicy::Stretch(1.0)),
            );
        measure_and_arrange(&mut hbox, 100.0, 50.0);

        assert_eq!(hbox.children[0].rect.width, 30.0);
        assert_eq!(hbox.children[1].rect.x, 34.0);
        assert_eq!(hbox.children[1].rect.width, 66.0);
    }

    #[test]
    fn alignment_places_within_the_column() {
        let mut child = fixed(40.0, 10.0);
        child.align_h = Alignment::Center;
        let mut vbox = Element::new(ElementKind::VBox { padding: 0.0 }).with_child(child);
        measure_and_arrange(&mut vbox, 100.0, 100.0);
        assert_eq!(vbox.children[0].rect.x, 30.0);

        vbox.children[0].align_h = Alignment::End;
        measure_and_arrange(&mut vbox, 100.0, 100.0);
        assert_eq!(vbox.children[0].rect.x, 60.0);

        vbox.children[0].align_h = Alignment::Stretch;
        measure_and_arrange(&mut vbox, 100.0, 100.0);
        assert_eq!(vbox.children[0].rect.width, 100.0);
    }

    #[test]
    fn invisible_children_are_skipped() {
        let mut hidden = fixed(50.0, 50.0);
        hidden.visible = false;
        let mut vbox = Element::new(ElementKind::VBox { padding: 10.0 })
            .with_child(hidden)
            .with_child(fixed(50.0, 20.0));
        measure_and_arrange(&mut vbox, 100.0, 100.0);
        assert_eq!(vbox.children[1].rect.y, 0.0);
    }

    #[test]
    fn absolute_positions_accumulate() {
        let mut inner = Element::new(ElementKind::VBox { padding: 0.0 }).with_child(fixed(10.0, 10.0));
        inner.width = SizePolicy::Fixed(50.0);
        inner.height = SizePolicy::Fixed(50.0);
        inner.align_h = Alignment::Start;
        inner.align_v = Alignment::Start;
        let mut root = Element::new(ElementKind::Panel(Panel::default())).with_child(inner);
        let text = MonospaceTextMeasure::default();
        root.measure(Size::new(200.0, 200.0), &text);
        root.arrange(Rect::new(20.0, 30.0, 200.0, 200.0), Point::default());

        assert_eq!(root.absolute_pos, Point::new(20.0, 30.0));
        assert_eq!(root.children[0].absolute_pos, Point::new(20.0, 30.0));
        assert_eq!(root.children[0].children[0].absolute_pos, Point::new(20.0, 30.0));
    }

    #[test]
    fn scroll_view_clamps_scroll_to_content() {
        let mut content = fixed(100.0, 300.0);
        content.align_v = Alignment::Start;
        let mut scroll_view = Element::new(ElementKind::ScrollView(ScrollState {
            scroll_y: 500.0,
            ..Default::default()
        }))
        .with_child(content);
        scroll_view.width = SizePolicy::Fixed(100.0);
        scroll_view.height = SizePolicy::Fixed(100.0);
        measure_and_arrange(&mut scroll_view, 100.0, 100.0);

        if let ElementKind::ScrollView(scroll) = &scroll_view.kind {
            assert_eq!(scroll.content_height, 300.0);
            assert_eq!(scroll.scroll_y, 200.0, "clamped to content - viewport");
        } else {
            unreachable!();
        }
        // Content is shifted up by the clamped scroll offset.
        assert_eq!(scroll_view.children[0].rect.y, -200.0);
    }

    #[test]
    fn fully_determined_layout_is_stable_across_passes() {
        let mut vbox = Element::new(ElementKind::VBox { padding: 8.0 })
            .with_child(fixed(60.0, 24.0))
            .with_child(fixed(60.0, 24.0));
        measure_and_arrange(&mut vbox, 120.0, 300.0);
        let first: Vec<Rect<f32>> = vbox.children.iter().map(|c| c.rect).collect();
        measure_and_arrange(&mut vbox, 120.0, 300.0);
        let second: Vec<Rect<f32>> = vbox.children.iter().map(|c| c.rect).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn alpha_multiplies_down_the_tree() {
        use crate::draw::DrawCommand;
        use crate::theme::StyleColor;
        use galaxis_core::types::Color;

        let mut child_panel = Panel::default();
        child_panel.background = StyleColor::custom(Color::new(1.0, 1.0, 1.0, 1.0));
        let mut child = Element::new(ElementKind::Panel(child_panel));
        child.alpha = 0.5;

        let mut parent_panel = Panel::default();
        parent_panel.background = StyleColor::custom(Color::new(1.0, 1.0, 1.0, 0.0));
        let mut root = Element::new(ElementKind::Panel(parent_panel)).with_child(child);
        root.alpha = 0.5;

        measure_and_arrange(&mut root, 100.0, 100.0);
        let mut list = DrawList::new();
        let text = MonospaceTextMeasure::default();
        let theme = Theme::default();
        let params = DrawParams { theme: &theme, text: &text, focused: None };
        root.draw(&mut list, &params, 1.0);

        let alphas: Vec<f32> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::RectFilled { color, .. } => Some(color.a),
                _ => None,
            })
            .collect();
        // Only the child's fill survives (parent fill is transparent), at
        // 0.5 (self) x 0.5 (parent) x 1.0 (white alpha).
        assert_eq!(alphas, vec![0.25]);
    }

    #[test]
    fn tween_retargets_and_applies_to_rect() {
        let mut element = fixed(10.0, 10.0);
        element.rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        element.animate(TweenProperty::X, 100.0, 1.0, Easing::Linear);
        element.animate(TweenProperty::X, 50.0, 1.0, Easing::Linear);
        assert_eq!(element.tweens.len(), 1);

        let mut ctx = UiContext::default();
        element.update(0.5, &mut ctx);
        assert_eq!(element.rect.x, 25.0);
        element.update(0.6, &mut ctx);
        assert_eq!(element.rect.x, 50.0);
        assert!(!element.has_tweens());
    }
}
