//! Rendering layer
//!
//! This module handles:
//! - The `Renderer` / `RenderContext` / `RenderSession` abstraction the
//!   crawler drives
//! - A W3C WebDriver implementation over HTTP

mod traits;
mod webdriver;

pub use traits::{RenderContext, RenderError, RenderResult, RenderSession, Renderer};
pub use webdriver::{Browser, WebDriverContext, WebDriverRenderer, WebDriverSession};
