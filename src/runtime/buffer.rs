//! Output sinks
//!
//! The root output and every armed guard own one [`Sink`]. Writes go to the
//! innermost sink; a guard that completes flushes its sink into the parent,
//! a guard that fails has its sink dropped.

use super::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Concatenated text
    Text,
    /// Typed values, concatenated only when the render finishes
    Fragments,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sink {
    Text(String),
    Fragments(Vec<Value>),
}

impl Sink {
    pub fn new(kind: SinkKind) -> Self {
        match kind {
            SinkKind::Text => Sink::Text(String::new()),
            SinkKind::Fragments => Sink::Fragments(Vec::new()),
        }
    }

    pub fn kind(&self) -> SinkKind {
        match self {
            Sink::Text(_) => SinkKind::Text,
            Sink::Fragments(_) => SinkKind::Fragments,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Sink::Text(text) => text.is_empty(),
            Sink::Fragments(parts) => parts.is_empty(),
        }
    }

    /// Write literal template text
    pub fn write_data(&mut self, text: &str) {
        match self {
            Sink::Text(buf) => buf.push_str(text),
            Sink::Fragments(parts) => parts.push(Value::Str(text.to_string())),
        }
    }

    /// Write an evaluated value
    pub fn write_value(&mut self, value: Value) {
        match self {
            Sink::Text(buf) => buf.push_str(&value.to_string()),
            Sink::Fragments(parts) => parts.push(value),
        }
    }

    /// Move everything in `child` to the end of this sink
    pub fn extend(&mut self, child: Sink) {
        match (self, child) {
            (Sink::Text(buf), Sink::Text(text)) => buf.push_str(&text),
            (Sink::Fragments(parts), Sink::Fragments(more)) => parts.extend(more),
            (Sink::Fragments(parts), Sink::Text(text)) => {
                if !text.is_empty() {
                    parts.push(Value::Str(text));
                }
            }
            (Sink::Text(buf), Sink::Fragments(more)) => {
                for part in more {
                    buf.push_str(&part.to_string());
                }
            }
        }
    }
}

/// Stack of sinks; index 0 is the root output
#[derive(Debug, Clone)]
pub struct BufferStack {
    sinks: Vec<Sink>,
}

impl BufferStack {
    pub fn new(root: SinkKind) -> Self {
        Self {
            sinks: vec![Sink::new(root)],
        }
    }

    pub fn depth(&self) -> usize {
        self.sinks.len()
    }

    pub fn push(&mut self, kind: SinkKind) {
        self.sinks.push(Sink::new(kind));
    }

    fn current(&mut self) -> &mut Sink {
        let top = self.sinks.len() - 1;
        &mut self.sinks[top]
    }

    pub fn write_data(&mut self, text: &str) {
        self.current().write_data(text);
    }

    pub fn write_value(&mut self, value: Value) {
        self.current().write_value(value);
    }

    /// Pop the innermost sink into its parent; the root is never popped
    pub fn flush(&mut self) {
        if self.sinks.len() < 2 {
            return;
        }
        if let Some(child) = self.sinks.pop() {
            self.current().extend(child);
        }
    }

    /// Drop every sink above `depth`, discarding its contents
    pub fn truncate(&mut self, depth: usize) {
        self.sinks.truncate(depth.max(1));
    }

    /// Collapse the stack into the root sink
    pub fn into_root(mut self) -> Sink {
        while self.sinks.len() > 1 {
            self.flush();
        }
        self.sinks.pop().unwrap_or(Sink::Text(String::new()))
    }
}
