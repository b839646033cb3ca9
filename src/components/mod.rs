//! # Declarative Components
//!
//! Components for building fixed-width text receipts declaratively.
//!
//! ## Design Philosophy
//!
//! Instead of padding strings by hand, you describe *what* you want:
//!
//! ```
//! use agentprint::components::*;
//!
//! let receipt = Receipt::new()
//!     .child(Header::new("SRI LAKSHMI CHITS"))
//!     .child(Divider::dashed())
//!     .child(Columns::new("Receipt No:", "R-1024"))
//!     .child(Columns::new("AMOUNT:", "Rs. 1,500.00"))
//!     .feed(2);
//!
//! let text = receipt.render(&Layout::default());
//! assert!(text.contains("R-1024"));
//! ```
//!
//! ## Component Trait
//!
//! All components implement the `Component` trait, which emits finished
//! lines for a given [`Layout`]. Components can be nested (containers hold
//! children).

mod layout;
mod receipt;
mod text;

pub use layout::*;
pub use receipt::*;
pub use text::*;

use crate::printer::{CENTER_DIVISOR, PrinterConfig};

/// Line geometry shared by all components while rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Characters per line
    pub width: usize,
    /// Divisor applied to free space when centering
    pub center_divisor: usize,
}

impl Layout {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            center_divisor: CENTER_DIVISOR,
        }
    }

    pub fn for_printer(config: &PrinterConfig) -> Self {
        Self::new(config.line_width)
    }

    /// Center `text` by left-padding it.
    pub fn center(&self, text: &str) -> String {
        center_line(text, self.width, self.center_divisor)
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::for_printer(&PrinterConfig::default())
    }
}

/// Pad `text` with `floor((width - len) / divisor)` leading spaces.
///
/// Lines as wide as or wider than `width` are returned unchanged. Length is
/// counted in characters.
pub fn center_line(text: &str, width: usize, divisor: usize) -> String {
    let len = text.chars().count();
    let padding = width.saturating_sub(len) / divisor.max(1);
    format!("{}{}", " ".repeat(padding), text)
}

/// Trait for declarative components.
pub trait Component {
    /// Emit finished lines for this component.
    fn emit(&self, layout: &Layout, lines: &mut Vec<String>);
}

/// Extension trait for rendering components.
pub trait ComponentExt: Component {
    /// Render to individual lines.
    fn lines(&self, layout: &Layout) -> Vec<String> {
        let mut lines = Vec::new();
        self.emit(layout, &mut lines);
        lines
    }

    /// Render to one newline-separated string.
    fn render(&self, layout: &Layout) -> String {
        self.lines(layout).join("\n")
    }
}

// Blanket implementation for all components
impl<T: Component + ?Sized> ComponentExt for T {}

// Allow boxed components
impl Component for Box<dyn Component> {
    fn emit(&self, layout: &Layout, lines: &mut Vec<String>) {
        self.as_ref().emit(layout, lines);
    }
}
