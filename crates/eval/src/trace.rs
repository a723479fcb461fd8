//! Append-only diagnostic trace of executed rules.

/// Lines such as `"setOutcomeValue executed"`, in execution order.
///
/// The trace is for diagnostics only; nothing reads it to make decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    lines: Vec<String>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn record_rule(&mut self, class_name: &str) {
        self.push(format!("{} executed", class_name));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn append(&mut self, other: Trace) {
        self.lines.extend(other.lines);
    }
}
