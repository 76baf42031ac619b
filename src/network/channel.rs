// Message channel adapter
// A reliable, ordered text channel between the two peers

/// Lifecycle and data events, drained by the owning session between ticks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Closed,
    Error(String),
}

/// Text transport with open/close lifecycle.
///
/// Implementations must deliver messages in send order, exactly once, once open.
pub trait MessageChannel: Send {
    fn is_open(&self) -> bool;

    /// Silently dropped unless the channel is open
    fn send(&mut self, text: &str);

    /// Next pending event, without blocking
    fn try_recv(&mut self) -> Option<ChannelEvent>;

    /// Idempotent
    fn close(&mut self);
}
