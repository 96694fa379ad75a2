//! Side-table from AST node id to source span, so later passes can report
//! diagnostics against a node without the AST itself carrying back-pointers.

use crate::Span;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct SpanMap {
    spans: HashMap<u32, Span>,
}

impl SpanMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node_id: u32, span: Span) {
        self.spans.insert(node_id, span);
    }

    pub fn get(&self, node_id: u32) -> Option<&Span> {
        self.spans.get(&node_id)
    }

    pub fn get_or_unknown(&self, node_id: u32) -> Span {
        self.get(node_id).cloned().unwrap_or_else(Span::unknown)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_get() {
        let mut map = SpanMap::new();
        let span = Span::new("test.cz".to_string(), 10, 5, 2);
        map.record(1, span.clone());
        assert_eq!(map.get(1), Some(&span));
        assert_eq!(map.get(2), None);
    }
}
