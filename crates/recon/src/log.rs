//! Operator-facing run log.

/// Receives human-readable progress lines from the stages.
///
/// The pipeline's reporter timestamps lines, mirrors them to `tracing` and
/// forwards them as events. Tests collect into a `Vec<String>`.
pub trait StageLog {
    fn line(&mut self, message: String);

    /// A line describing something skipped or degraded.
    fn warn(&mut self, message: String) {
        self.line(message);
    }
}

impl StageLog for Vec<String> {
    fn line(&mut self, message: String) {
        self.push(message);
    }
}
