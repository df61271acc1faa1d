/// How an edge was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMode {
    /// Plain 1:1 connection.
    Direct,
    /// One of the copies sent by a 1:N broadcast.
    FanOutMember,
    /// One of the inputs joined by an N:1 aggregate.
    FanInMember,
}

/// A directed connection from one node's output to another node's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub mode: EdgeMode,
}

impl Edge {
    pub fn direct(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, EdgeMode::Direct)
    }

    pub fn fan_out(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, EdgeMode::FanOutMember)
    }

    pub fn fan_in(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, EdgeMode::FanInMember)
    }

    fn new(from: impl Into<String>, to: impl Into<String>, mode: EdgeMode) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            mode,
        }
    }
}
