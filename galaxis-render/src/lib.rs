//! Vulkan runtime for the Galaxis engine.
//!
//! Layered bottom-up: the device core (instance, physical device, logical
//! device, swapchain) in [`instance`], [`physical_device`], [`device`],
//! [`swapchain`] and [`core`]; owning handle wrappers in [`handles`] and
//! [`pipeline`]; memory and resource bundles in [`memory`] and
//! [`attachment`]; transfer services in [`staging`], [`buffers`] and
//! [`texture`]; and the [`context`] facade tying them together for the
//! render thread. [`frame`] provides the frames-in-flight pacing objects.
//!
//! All Vulkan submission happens on the render thread. The staging buffer
//! pool is the only object intended to be shared across threads.

pub mod allocator;
pub mod attachment;
pub mod buffers;
pub mod compressed;
pub mod context;
pub mod core;
pub mod device;
pub mod error;
pub mod format;
pub mod frame;
pub mod handles;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod staging;
pub mod swapchain;
pub mod texture;

pub use error::{RenderError, Result};
