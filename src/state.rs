use std::fmt;

use serde::Serialize;

/// Where the link to the vehicle currently stands.
///
/// Typical runs:
/// - Disconnected -> ConnectionRequested -> LinkEstablished -> Connected -> Disconnected
/// - Disconnected -> ConnectionRequested -> ConnectionFailed -> ConnectionRetryWait -> ConnectionRequested
/// - ... -> LinkEstablished/Connected -> ConnectionLost -> ConnectionRetryWait -> ConnectionRequested
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Unknown,
    /// Attempting to connect.
    ConnectionRequested,
    /// First packet seen, link is coming up.
    LinkEstablished,
    Connected,
    Disconnected,
    /// Tried to connect but failed.
    ConnectionFailed,
    /// Unintentional disconnect.
    ConnectionLost,
    /// Waiting before trying to connect again.
    ConnectionRetryWait,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    ConnectRequested,
    FirstPacket,
    Ready,
    Disconnect,
    Failed,
    Lost,
    RetryScheduled,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("link event {event:?} is not valid in state {from}")]
pub struct TransitionError {
    pub from: LinkState,
    pub event: LinkEvent,
}

impl LinkState {
    const ACTIVE: [LinkState; 3] = [
        LinkState::ConnectionRequested,
        LinkState::LinkEstablished,
        LinkState::Connected,
    ];

    const DOWN: [LinkState; 4] = [
        LinkState::Disconnected,
        LinkState::ConnectionFailed,
        LinkState::ConnectionLost,
        LinkState::ConnectionRetryWait,
    ];

    pub fn next(self, event: LinkEvent) -> Result<LinkState, TransitionError> {
        use LinkEvent as E;
        use LinkState as S;

        let to = match (self, event) {
            (S::Unknown | S::Disconnected | S::ConnectionRetryWait, E::ConnectRequested) => {
                S::ConnectionRequested
            }
            (S::ConnectionRequested, E::FirstPacket) => S::LinkEstablished,
            (S::LinkEstablished, E::Ready) => S::Connected,
            (S::ConnectionRequested, E::Failed) => S::ConnectionFailed,
            (S::LinkEstablished | S::Connected, E::Lost) => S::ConnectionLost,
            (S::ConnectionFailed | S::ConnectionLost, E::RetryScheduled) => S::ConnectionRetryWait,
            (from, E::Disconnect) if from != S::Disconnected => S::Disconnected,
            (from, event) => return Err(TransitionError { from, event }),
        };
        Ok(to)
    }

    /// Connecting or connected.
    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    /// Not connected, for whatever reason.
    pub fn is_down(self) -> bool {
        Self::DOWN.contains(&self)
    }

    pub fn label(self) -> &'static str {
        match self {
            LinkState::Unknown => "unknown",
            LinkState::ConnectionRequested => "connecting",
            LinkState::LinkEstablished => "link established",
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
            LinkState::ConnectionFailed => "connection failed",
            LinkState::ConnectionLost => "connection lost",
            LinkState::ConnectionRetryWait => "waiting to retry",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(start: LinkState, events: &[LinkEvent]) -> Result<LinkState, TransitionError> {
        events.iter().try_fold(start, |s, e| s.next(*e))
    }

    #[test]
    fn normal_connect_then_disconnect() {
        use LinkEvent::*;
        let s = run(LinkState::Disconnected, &[ConnectRequested, FirstPacket, Ready]).unwrap();
        assert_eq!(s, LinkState::Connected);
        assert_eq!(s.next(Disconnect).unwrap(), LinkState::Disconnected);
    }

    #[test]
    fn failed_connect_retries() {
        use LinkEvent::*;
        let s = run(LinkState::Disconnected, &[ConnectRequested, Failed, RetryScheduled]).unwrap();
        assert_eq!(s, LinkState::ConnectionRetryWait);
        assert_eq!(s.next(ConnectRequested).unwrap(), LinkState::ConnectionRequested);
    }

    #[test]
    fn lost_while_coming_up_or_connected() {
        use LinkEvent::*;
        let s = run(LinkState::Disconnected, &[ConnectRequested, FirstPacket, Lost]).unwrap();
        assert_eq!(s, LinkState::ConnectionLost);
        let s = run(LinkState::Disconnected, &[ConnectRequested, FirstPacket, Ready, Lost]).unwrap();
        assert_eq!(s, LinkState::ConnectionLost);
    }

    #[test]
    fn invalid_events_are_rejected() {
        let err = LinkState::Disconnected.next(LinkEvent::Ready).unwrap_err();
        assert_eq!(err, TransitionError { from: LinkState::Disconnected, event: LinkEvent::Ready });
        assert!(LinkState::Disconnected.next(LinkEvent::Disconnect).is_err());
        assert!(LinkState::Connected.next(LinkEvent::FirstPacket).is_err());
        assert!(LinkState::ConnectionRequested.next(LinkEvent::Lost).is_err());
    }

    #[test]
    fn active_and_down_partition_known_states() {
        let all = [
            LinkState::ConnectionRequested,
            LinkState::LinkEstablished,
            LinkState::Connected,
            LinkState::Disconnected,
            LinkState::ConnectionFailed,
            LinkState::ConnectionLost,
            LinkState::ConnectionRetryWait,
        ];
        for s in all {
            assert_ne!(s.is_active(), s.is_down(), "{s:?}");
        }
        assert!(!LinkState::Unknown.is_active());
        assert!(!LinkState::Unknown.is_down());
    }
}
