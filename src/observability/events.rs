//! Observable events of a shard transaction service
//!
//! Events are explicit and typed.

use std::fmt;

use super::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Service started, storage ready
    ServiceStart,
    /// Storage failed to start; the service is unusable
    ServiceStartFailed,
    /// Service stopped
    ServiceStop,

    // Transactions
    TxnBegin,
    TxnCommit,
    TxnAbort,
    /// Idle transaction aborted by the sweeper
    TxnExpired,
    /// A write lost a row to a concurrent writer
    WriteConflict,
    /// Storage history below the watermark reclaimed
    GcRun,

    // Coordination
    /// Prepare sent to remote participants
    PrepareSent,
    /// A remote participant refused or failed
    ParticipantFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ServiceStart => "SERVICE_START",
            Event::ServiceStartFailed => "SERVICE_START_FAILED",
            Event::ServiceStop => "SERVICE_STOP",

            Event::TxnBegin => "TXN_BEGIN",
            Event::TxnCommit => "TXN_COMMIT",
            Event::TxnAbort => "TXN_ABORT",
            Event::TxnExpired => "TXN_EXPIRED",
            Event::WriteConflict => "WRITE_CONFLICT",
            Event::GcRun => "GC_RUN",

            Event::PrepareSent => "PREPARE_SENT",
            Event::ParticipantFailed => "PARTICIPANT_FAILED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::ServiceStartFailed => Severity::Error,
            Event::TxnExpired | Event::WriteConflict | Event::ParticipantFailed => Severity::Warn,
            Event::TxnBegin | Event::PrepareSent | Event::GcRun => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::ServiceStart,
            Event::ServiceStartFailed,
            Event::ServiceStop,
            Event::TxnBegin,
            Event::TxnCommit,
            Event::TxnAbort,
            Event::TxnExpired,
            Event::WriteConflict,
            Event::GcRun,
            Event::PrepareSent,
            Event::ParticipantFailed,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(Event::ServiceStartFailed.severity(), Severity::Error);
        assert_eq!(Event::WriteConflict.severity(), Severity::Warn);
        assert_eq!(Event::TxnCommit.severity(), Severity::Info);
        assert_eq!(Event::TxnBegin.severity(), Severity::Trace);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::TxnCommit), "TXN_COMMIT");
    }
}
