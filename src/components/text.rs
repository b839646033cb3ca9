//! # Text Components
//!
//! Components for displaying aligned text.

use super::{Component, Layout};

/// Horizontal placement of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

/// A text component with optional alignment.
///
/// Multi-line content is aligned line by line.
///
/// ## Example
///
/// ```
/// use agentprint::components::*;
///
/// let text = Text::new("Paid with thanks");
/// let centered = Text::new("PAYMENT RECEIPT").center();
/// ```
pub struct Text {
    content: String,
    alignment: Alignment,
    uppercase: bool,
}

impl Text {
    /// Create a new text component.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            alignment: Alignment::Left,
            uppercase: false,
        }
    }

    /// Center alignment.
    pub fn center(mut self) -> Self {
        self.alignment = Alignment::Center;
        self
    }

    /// Right alignment.
    pub fn right(mut self) -> Self {
        self.alignment = Alignment::Right;
        self
    }

    /// Left alignment.
    pub fn left(mut self) -> Self {
        self.alignment = Alignment::Left;
        self
    }

    /// Print in upper case.
    pub fn uppercase(mut self) -> Self {
        self.uppercase = true;
        self
    }
}

impl Component for Text {
    fn emit(&self, layout: &Layout, lines: &mut Vec<String>) {
        let content = if self.uppercase {
            self.content.to_uppercase()
        } else {
            self.content.clone()
        };

        for line in content.lines() {
            let line = line.trim_end();
            let aligned = match self.alignment {
                Alignment::Left => line.to_string(),
                Alignment::Center => layout.center(line),
                Alignment::Right => {
                    format!("{:>width$}", line, width = layout.width)
                }
            };
            lines.push(aligned);
        }
    }
}

/// A header component (centered, upper case).
///
/// ## Example
///
/// ```
/// use agentprint::components::Header;
///
/// let header = Header::new("Sri Lakshmi Chits");
/// ```
pub struct Header {
    text: Text,
}

impl Header {
    /// Create a new header.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            text: Text::new(content).center().uppercase(),
        }
    }
}

impl Component for Header {
    fn emit(&self, layout: &Layout, lines: &mut Vec<String>) {
        self.text.emit(layout, lines);
    }
}
