//! # Receipt Component
//!
//! The root container for building receipts.

use super::{Component, Layout, Spacer};

/// Receipt is the root container component.
///
/// It holds child components and optionally feeds blank lines at the end so
/// the last line clears the tear bar.
///
/// ## Example
///
/// ```
/// use agentprint::components::*;
///
/// let receipt = Receipt::new()
///     .child(Header::new("STORE NAME"))
///     .child(Divider::dashed())
///     .child(Columns::new("Total", "9.99"))
///     .feed(3);
///
/// let text = receipt.render(&Layout::default());
/// ```
pub struct Receipt {
    children: Vec<Box<dyn Component>>,
    feed_lines: usize,
}

impl Default for Receipt {
    fn default() -> Self {
        Self::new()
    }
}

impl Receipt {
    /// Create a new empty receipt.
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            feed_lines: 0,
        }
    }

    /// Add a child component.
    pub fn child<C: Component + 'static>(mut self, component: C) -> Self {
        self.children.push(Box::new(component));
        self
    }

    /// Add multiple child components.
    pub fn children<I, C>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Component + 'static,
    {
        for c in components {
            self.children.push(Box::new(c));
        }
        self
    }

    /// Feed `n` blank lines after the last child.
    pub fn feed(mut self, n: usize) -> Self {
        self.feed_lines = n;
        self
    }
}

impl Component for Receipt {
    fn emit(&self, layout: &Layout, lines: &mut Vec<String>) {
        for child in &self.children {
            child.emit(layout, lines);
        }

        if self.feed_lines > 0 {
            Spacer::lines(self.feed_lines).emit(layout, lines);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ComponentExt, Text};

    #[test]
    fn test_empty_receipt() {
        assert!(Receipt::new().lines(&Layout::default()).is_empty());
    }

    #[test]
    fn test_receipt_with_feed() {
        let lines = Receipt::new().feed(2).lines(&Layout::default());
        assert_eq!(lines, vec!["", ""]);
    }

    #[test]
    fn test_receipt_with_children() {
        let receipt = Receipt::new()
            .child(Text::new("Hello"))
            .child(Text::new("World"))
            .feed(1);

        assert_eq!(receipt.render(&Layout::default()), "Hello\nWorld\n");
    }

    #[test]
    fn test_children_iterator() {
        let receipt = Receipt::new().children(["a", "b", "c"].map(Text::new));
        assert_eq!(receipt.lines(&Layout::default()).len(), 3);
    }
}
