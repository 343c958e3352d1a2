//! Classifies a server's lifecycle state from its console log tail.
//!
//! There is no health API on a vanilla server process; while the query port
//! is unreachable the only available signal is the append-only log. All
//! markers are searched relative to the most recent start marker so stale
//! lines from earlier runs in the same file cannot leak through.

const START_BEGIN: &str = "[Server thread/INFO]: Starting Minecraft server";
const START_COMPLETE: &str = "[Server thread/INFO]: Done";
const STOP_BEGIN: &str = "[Server thread/INFO]: Stopping server";
const FATAL_EXCEPTION: &str = "[Server thread/ERROR]: Encountered an unexpected exception";
const LISTENER_STOPPED: &str = "[Server thread/INFO]: Thread Query Listener stopped";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    /// No boot in progress: never started, stopped again, or died on an
    /// unexpected exception.
    Stopped,
    /// A boot began and none of the completion, stop or crash markers have
    /// appeared since.
    Starting,
    /// The boot completed but the process is not answering queries; the log
    /// alone cannot tell a hung process from a hard crash.
    Unknown,
}

/// Derives the lifecycle state from a log tail.
pub fn classify(tail: &str) -> LogState {
    let Some(start) = tail.rfind(START_BEGIN) else {
        return LogState::Stopped;
    };
    let since_start = &tail[start..];

    if since_start.contains(STOP_BEGIN) || since_start.contains(FATAL_EXCEPTION) {
        return LogState::Stopped;
    }
    if since_start.contains(START_COMPLETE) {
        return LogState::Unknown;
    }
    LogState::Starting
}

/// True once the query listener thread reported its shutdown, the last line
/// a stopping server writes before the process exits.
pub fn listener_stopped(tail: &str) -> bool {
    tail.contains(LISTENER_STOPPED)
}
