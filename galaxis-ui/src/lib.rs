//! Retained-mode UI tree for the Galaxis engine.
//!
//! Every frame the host feeds input into the [`context::UiRoot`], ticks
//! animations, and asks the tree to lay itself out (measure → arrange) and
//! draw into an opaque [`draw::DrawList`] the render layer consumes. Focus,
//! pointer capture, theming and localization live in process-wide context
//! objects; widgets never talk to the GPU.

pub mod animation;
pub mod context;
pub mod draw;
pub mod element;
pub mod i18n;
pub mod input;
pub mod loader;
pub mod text;
pub mod theme;
pub mod widgets;

pub use context::{UiContext, UiRoot};
pub use element::{Alignment, Element, ElementId, ElementKind, SizePolicy};
pub use input::{InputState, UiEvent};
