/// Connection state machine for a [`crate::TcpClientSocket`].
///
/// Transitions are monotone except `Disconnected -> Connecting`, which is a
/// deliberate restart. Outbound-queue writes are only accepted in
/// `Connecting`/`Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl SocketState {
    pub fn accepts_writes(self) -> bool {
        matches!(self, SocketState::Connecting | SocketState::Connected)
    }
}
