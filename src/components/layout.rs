//! # Layout Components
//!
//! Components for controlling layout and spacing.

use super::{Component, Layout};

/// Divider style options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DividerStyle {
    /// Dashed line (default): ----------
    #[default]
    Dashed,
    /// Equals line: ==========
    Equals,
}

/// A horizontal divider spanning the full line width.
///
/// ## Example
///
/// ```
/// use agentprint::components::{Divider, DividerStyle};
///
/// let dashed = Divider::dashed();
/// let equals = Divider::new(DividerStyle::Equals);
/// ```
pub struct Divider {
    style: DividerStyle,
}

impl Divider {
    /// Create a divider with a specific style.
    pub fn new(style: DividerStyle) -> Self {
        Self { style }
    }

    /// Create a dashed divider.
    pub fn dashed() -> Self {
        Self::new(DividerStyle::Dashed)
    }

    /// Create an equals-sign divider.
    pub fn equals() -> Self {
        Self::new(DividerStyle::Equals)
    }
}

impl Default for Divider {
    fn default() -> Self {
        Self::dashed()
    }
}

impl Component for Divider {
    fn emit(&self, layout: &Layout, lines: &mut Vec<String>) {
        let line = match self.style {
            DividerStyle::Dashed => "-".repeat(layout.width),
            DividerStyle::Equals => "=".repeat(layout.width),
        };
        lines.push(line);
    }
}

/// Blank lines (paper feed).
///
/// ## Example
///
/// ```
/// use agentprint::components::Spacer;
///
/// let gap = Spacer::lines(2);
/// ```
pub struct Spacer {
    lines: usize,
}

impl Spacer {
    /// Create a spacer of `n` blank lines.
    pub fn lines(n: usize) -> Self {
        Self { lines: n }
    }
}

impl Component for Spacer {
    fn emit(&self, _layout: &Layout, lines: &mut Vec<String>) {
        lines.extend(std::iter::repeat_n(String::new(), self.lines));
    }
}

/// A two-column row (left label, right-aligned value).
///
/// When both sides do not fit on one line, the label is printed on its own
/// line and the value right-aligned on the next.
///
/// ## Example
///
/// ```
/// use agentprint::components::Columns;
///
/// let row = Columns::new("Receipt No:", "R-1024");
/// ```
pub struct Columns {
    left: String,
    right: String,
}

impl Columns {
    /// Create a two-column row.
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

impl Component for Columns {
    fn emit(&self, layout: &Layout, lines: &mut Vec<String>) {
        let left_len = self.left.chars().count();
        let right_len = self.right.chars().count();

        // Keep at least one space between the columns
        if left_len + right_len < layout.width {
            let padding = layout.width - left_len - right_len;
            lines.push(format!("{}{}{}", self.left, " ".repeat(padding), self.right));
        } else {
            lines.push(self.left.clone());
            let padding = layout.width.saturating_sub(right_len);
            lines.push(format!("{}{}", " ".repeat(padding), self.right));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ComponentExt;

    #[test]
    fn test_divider_spans_width() {
        let lines = Divider::dashed().lines(&Layout::new(12));
        assert_eq!(lines, vec!["-".repeat(12)]);
        let lines = Divider::equals().lines(&Layout::new(3));
        assert_eq!(lines, vec!["==="]);
    }

    #[test]
    fn test_spacer() {
        let lines = Spacer::lines(2).lines(&Layout::new(12));
        assert_eq!(lines, vec!["", ""]);
        assert!(Spacer::lines(0).lines(&Layout::new(12)).is_empty());
    }

    #[test]
    fn test_columns_fill_width() {
        let lines = Columns::new("Date:", "16-10-2026").lines(&Layout::new(20));
        assert_eq!(lines, vec!["Date:     16-10-2026"]);
        assert_eq!(lines[0].len(), 20);
    }

    #[test]
    fn test_columns_wrap_when_too_wide() {
        let lines = Columns::new("Customer:", "Venkata Subrahmanyam").lines(&Layout::new(20));
        assert_eq!(lines, vec!["Customer:", "Venkata Subrahmanyam"]);
    }

    #[test]
    fn test_columns_exact_fit_wraps() {
        // 10 + 10 leaves no gap on a 20-column line
        let lines = Columns::new("ABCDEFGHIJ", "KLMNOPQRST").lines(&Layout::new(20));
        assert_eq!(lines.len(), 2);
    }
}
