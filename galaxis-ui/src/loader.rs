//! JSON UI layout loading.
//!
//! A layout file is a tree of `{type, name, properties, children}` records.
//! Properties are parsed per element type; unknown property keys are
//! ignored so layouts can carry editor metadata. `onClick` values are
//! action ids resolved against the caller's [`ActionRegistry`]; clicks fire
//! as queued [`crate::input::UiEvent::Action`] events which the host
//! dispatches back through the registry.

use std::collections::HashMap;

use galaxis_core::types::{Color, Size};
use log::warn;
use serde_json::Value;
use thiserror::Error;

use crate::element::{Alignment, Element, ElementKind, SizePolicy};
use crate::text::{HackerTextEffect, ScrollTextEffect};
use crate::theme::{StyleColor, ThemeColorId};
use crate::widgets::{
    Button, ImageWidget, InputField, Panel, ScrollState, TextEffect, TextWidget,
};

/// Errors from layout parsing.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("layout JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown element type '{0}'")]
    UnknownType(String),

    #[error("layout root must be an object")]
    MalformedRoot,
}

type ActionCallback = Box<dyn FnMut()>;

/// Named callbacks the host registers before loading a layout.
#[derive(Default)]
pub struct ActionRegistry {
    callbacks: HashMap<String, ActionCallback>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        ActionRegistry::default()
    }

    pub fn register(&mut self, name: impl Into<String>, callback: ActionCallback) {
        self.callbacks.insert(name.into(), callback);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    /// Invokes the callback for `name`; `false` when none is registered.
    pub fn dispatch(&mut self, name: &str) -> bool {
        match self.callbacks.get_mut(name) {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

/// Parses a UI layout from JSON.
pub fn load_ui(json: &str, registry: &ActionRegistry) -> Result<Element, LoaderError> {
    let value: Value = serde_json::from_str(json)?;
    parse_element(&value, registry)
}

fn parse_element(value: &Value, registry: &ActionRegistry) -> Result<Element, LoaderError> {
    let object = value.as_object().ok_or(LoaderError::MalformedRoot)?;

    let type_name = object.get("type").and_then(Value::as_str).unwrap_or("panel");
    let empty = serde_json::Map::new();
    let properties = object
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let kind = parse_kind(type_name, properties, registry)?;
    let mut element = Element::new(kind);

    if let Some(name) = object.get("name").and_then(Value::as_str) {
        element.name = name.to_string();
    }
    apply_common_properties(&mut element, properties);

    if let Some(children) = object.get("children").and_then(Value::as_array) {
        for child in children {
            element.add_child(parse_element(child, registry)?);
        }
    }

    Ok(element)
}

fn parse_kind(
    type_name: &str,
    properties: &serde_json::Map<String, Value>,
    registry: &ActionRegistry,
) -> Result<ElementKind, LoaderError> {
    let kind = match type_name {
        "panel" => {
            let mut panel = Panel::default();
            if let Some(color) = properties.get("bgColor").and_then(parse_style_color) {
                panel.background = color;
            }
            if let Some(color) = properties.get("borderColor").and_then(parse_style_color) {
                panel.border = color;
            }
            if let Some(rounding) = f32_property(properties, "rounding") {
                panel.rounding = rounding;
            }
            if let Some(glass) = properties.get("glass").and_then(Value::as_bool) {
                panel.glass = glass;
            }
            ElementKind::Panel(panel)
        }
        "vbox" => ElementKind::VBox {
            padding: f32_property(properties, "padding").unwrap_or(10.0),
        },
        "hbox" => ElementKind::HBox {
            padding: f32_property(properties, "padding").unwrap_or(10.0),
        },
        "scrollview" => {
            let mut scroll = ScrollState::default();
            if let Some(speed) = f32_property(properties, "scrollSpeed") {
                scroll.scroll_speed = speed;
            }
            if let Some(show) = properties.get("showScrollbar").and_then(Value::as_bool) {
                scroll.show_scrollbar = show;
            }
            ElementKind::ScrollView(scroll)
        }
        "text" => {
            let mut widget = match properties.get("textKey").and_then(Value::as_str) {
                Some(key) => TextWidget::localized(key),
                None => TextWidget::literal(
                    properties.get("text").and_then(Value::as_str).unwrap_or(""),
                ),
            };
            if let Some(size) = f32_property(properties, "fontSize") {
                widget.font_size = size;
            }
            if let Some(color) = properties.get("color").and_then(parse_style_color) {
                widget.color = color;
            }
            match properties.get("effect").and_then(Value::as_str) {
                Some("hacker") => {
                    let duration = f32_property(properties, "effectDuration").unwrap_or(1.0);
                    widget.effect = Some(TextEffect::Hacker(HackerTextEffect::new(duration)));
                }
                Some("scroll") => {
                    let duration = f32_property(properties, "effectDuration").unwrap_or(0.3);
                    widget.effect = Some(TextEffect::Scroll(ScrollTextEffect::new(duration)));
                }
                _ => {}
            }
            ElementKind::Text(widget)
        }
        "image" => {
            let mut image = ImageWidget::default();
            if let Some(texture) = properties.get("texture").and_then(Value::as_u64) {
                image.texture = texture;
            }
            if let (Some(width), Some(height)) =
                (f32_property(properties, "width"), f32_property(properties, "height"))
            {
                image.preferred_size = Size::new(width, height);
            }
            if let Some(tint) = properties.get("tint").and_then(parse_style_color) {
                image.tint = tint;
            }
            ElementKind::Image(image)
        }
        "button" => {
            let mut button = Button::default();
            if let Some(label) = properties.get("text").and_then(Value::as_str) {
                button.label = label.to_string();
            }
            if let Some(size) = f32_property(properties, "fontSize") {
                button.font_size = size;
            }
            if let Some(action) = properties.get("onClick").and_then(Value::as_str) {
                if !registry.contains(action) {
                    warn!("UI layout references unregistered action '{}'.", action);
                }
                button.action = action.to_string();
            }
            ElementKind::Button(button)
        }
        "input" => {
            let mut field = InputField::default();
            if let Some(text) = properties.get("text").and_then(Value::as_str) {
                field.text = text.to_string();
            }
            if let Some(placeholder) = properties.get("placeholder").and_then(Value::as_str) {
                field.placeholder = placeholder.to_string();
            }
            if let Some(size) = f32_property(properties, "fontSize") {
                field.font_size = size;
            }
            ElementKind::InputField(field)
        }
        "spacer" => ElementKind::Spacer,
        other => return Err(LoaderError::UnknownType(other.to_string())),
    };
    Ok(kind)
}

fn apply_common_properties(element: &mut Element, properties: &serde_json::Map<String, Value>) {
    if let Some(width) = properties.get("width").and_then(parse_size_policy) {
        element.width = width;
    }
    if let Some(height) = properties.get("height").and_then(parse_size_policy) {
        element.height = height;
    }
    if let Some(align) = properties.get("alignH").and_then(Value::as_str) {
        if let Some(parsed) = parse_alignment(align) {
            element.align_h = parsed;
        }
    }
    if let Some(align) = properties.get("alignV").and_then(Value::as_str) {
        if let Some(parsed) = parse_alignment(align) {
            element.align_v = parsed;
        }
    }
    if let Some(visible) = properties.get("visible").and_then(Value::as_bool) {
        element.visible = visible;
    }
    if let Some(alpha) = f32_property(properties, "alpha") {
        element.alpha = alpha.clamp(0.0, 1.0);
    }
    if let Some(block) = properties.get("blockInput").and_then(Value::as_bool) {
        element.block_input = block;
    }
    if let Some(focusable) = properties.get("focusable").and_then(Value::as_bool) {
        element.focusable = focusable;
    }
}

fn f32_property(properties: &serde_json::Map<String, Value>, key: &str) -> Option<f32> {
    properties.get(key).and_then(Value::as_f64).map(|v| v as f32)
}

/// `"content"`, `"stretch"`, `"stretch:2.5"` or a number (fixed pixels).
fn parse_size_policy(value: &Value) -> Option<SizePolicy> {
    if let Some(number) = value.as_f64() {
        return Some(SizePolicy::Fixed(number as f32));
    }
    let text = value.as_str()?;
    if text == "content" {
        return Some(SizePolicy::Content);
    }
    if text == "stretch" {
        return Some(SizePolicy::Stretch(1.0));
    }
    if let Some(weight) = text.strip_prefix("stretch:") {
        return weight.parse::<f32>().ok().map(SizePolicy::Stretch);
    }
    None
}

fn parse_alignment(text: &str) -> Option<Alignment> {
    match text {
        "start" => Some(Alignment::Start),
        "center" => Some(Alignment::Center),
        "end" => Some(Alignment::End),
        "stretch" => Some(Alignment::Stretch),
        _ => None,
    }
}

/// `"@accent"`-style theme references or `"#RRGGBB(AA)"` hex literals.
fn parse_style_color(value: &Value) -> Option<StyleColor> {
    let text = value.as_str()?;
    if let Some(theme_name) = text.strip_prefix('@') {
        let id = match theme_name {
            "text" => ThemeColorId::Text,
            "text_highlight" => ThemeColorId::TextHighlight,
            "text_disabled" => ThemeColorId::TextDisabled,
            "panel_bg" => ThemeColorId::PanelBg,
            "button_bg" => ThemeColorId::ButtonBg,
            "button_hover" => ThemeColorId::ButtonHover,
            "button_active" => ThemeColorId::ButtonActive,
            "border" => ThemeColorId::Border,
            "accent" => ThemeColorId::Accent,
            _ => return None,
        };
        return Some(StyleColor::theme(id));
    }
    text.parse::<Color>().ok().map(StyleColor::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LAYOUT: &str = r#"{
        "type": "vbox",
        "name": "sidebar",
        "properties": { "padding": 6, "width": "stretch:2", "height": "content" },
        "children": [
            {
                "type": "text",
                "name": "title",
                "properties": {
                    "textKey": "i18ntext.ui.title",
                    "fontSize": 18,
                    "color": "@accent",
                    "editorOnlyNote": "ignored by the runtime"
                }
            },
            {
                "type": "button",
                "name": "close",
                "properties": { "text": "Close", "onClick": "close_panel", "height": 28 }
            },
            {
                "type": "input",
                "properties": { "placeholder": "search...", "focusable": true }
            }
        ]
    }"#;

    #[test]
    fn parses_tree_with_types_and_names() {
        let mut registry = ActionRegistry::new();
        registry.register("close_panel", Box::new(|| {}));
        let element = load_ui(LAYOUT, &registry).unwrap();

        assert_eq!(element.name, "sidebar");
        assert!(matches!(element.kind, ElementKind::VBox { padding } if padding == 6.0));
        assert_eq!(element.width, SizePolicy::Stretch(2.0));
        assert_eq!(element.height, SizePolicy::Content);
        assert_eq!(element.children.len(), 3);
        assert!(matches!(element.children[0].kind, ElementKind::Text(_)));
        assert!(matches!(element.children[2].kind, ElementKind::InputField(_)));
    }

    #[test]
    fn unknown_property_keys_are_ignored() {
        // "editorOnlyNote" above must not fail the parse.
        let registry = ActionRegistry::new();
        assert!(load_ui(LAYOUT, &registry).is_ok());
    }

    #[test]
    fn button_action_is_kept_even_when_unregistered() {
        let registry = ActionRegistry::new();
        let element = load_ui(LAYOUT, &registry).unwrap();
        if let ElementKind::Button(button) = &element.children[1].kind {
            assert_eq!(button.action, "close_panel");
        } else {
            unreachable!();
        }
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = ActionRegistry::new();
        let result = load_ui(r#"{ "type": "carousel" }"#, &registry);
        assert!(matches!(result, Err(LoaderError::UnknownType(t)) if t == "carousel"));
    }

    #[test]
    fn size_policy_forms() {
        assert_eq!(parse_size_policy(&serde_json::json!(24.0)), Some(SizePolicy::Fixed(24.0)));
        assert_eq!(parse_size_policy(&serde_json::json!("content")), Some(SizePolicy::Content));
        assert_eq!(
            parse_size_policy(&serde_json::json!("stretch")),
            Some(SizePolicy::Stretch(1.0))
        );
        assert_eq!(
            parse_size_policy(&serde_json::json!("stretch:0.5")),
            Some(SizePolicy::Stretch(0.5))
        );
        assert_eq!(parse_size_policy(&serde_json::json!("weird")), None);
    }

    #[test]
    fn registry_dispatches_by_name() {
        use std::cell::Cell;
        use std::rc::Rc;

        let hit = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hit);
        let mut registry = ActionRegistry::new();
        registry.register("fire", Box::new(move || counter.set(counter.get() + 1)));

        assert!(registry.dispatch("fire"));
        assert!(!registry.dispatch("missing"));
        assert_eq!(hit.get(), 1);
    }
}
