//! Peer-originated messages that are not replies to a pending call.
//!
//! A TeraScan with automatic output enabled pushes wavelength telemetry on the
//! same socket that carries request/reply traffic, and operations issued with
//! `"report":"finished"` later push a final report (`<op>_f_r`). The reader task
//! classifies every decoded frame with [`classify`]; anything that is not a
//! reply candidate is broadcast to subscribers as a [`Notification`].

use crate::protocol::codec::{Envelope, Parameters};
use crate::protocol::reply::Reply;
use serde::Serialize;
use std::fmt;

/// Op name of the TeraScan "configure wavelength output" telemetry.
pub const SCAN_STITCH_WAVELENGTH: &str = "scan_stitch_wavelength";
/// Op name of the TeraScan "automatic output" telemetry.
pub const AUTOMATIC_OUTPUT: &str = "automatic_output";
/// Suffix of final task reports.
pub const FINAL_REPORT_SUFFIX: &str = "_f_r";

/// Push op names recognised when nothing else is configured.
pub fn default_push_ops() -> Vec<String> {
    vec![SCAN_STITCH_WAVELENGTH.to_string(), AUTOMATIC_OUTPUT.to_string()]
}

/// Stage of a TeraScan reported by push telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanActivity {
    /// Segment start (automatic output).
    Start,
    /// Segment is being repeated.
    Repeat,
    /// Segment restarted after a mode hop.
    Recover,
    /// Intermediate point within a segment (automatic output).
    Scan,
    /// Segment end (automatic output).
    End,
    /// Scanning (wavelength output).
    Scanning,
    /// Stitching segments together (wavelength output).
    Stitching,
    /// Scan finished (wavelength output).
    Finished,
    /// A word this client does not know.
    Other(String),
}

impl ScanActivity {
    /// Parse the activity/status word of a telemetry frame.
    pub fn parse(word: &str) -> Self {
        match word {
            "start" => Self::Start,
            "repeat" => Self::Repeat,
            "recover" => Self::Recover,
            "scan" => Self::Scan,
            "end" => Self::End,
            "scanning" => Self::Scanning,
            "stitching" => Self::Stitching,
            "finished" => Self::Finished,
            other => Self::Other(other.to_string()),
        }
    }

    /// True when the frame marks the end of a segment or of the whole scan.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End | Self::Finished)
    }
}

impl fmt::Display for ScanActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Self::Start => "start",
            Self::Repeat => "repeat",
            Self::Recover => "recover",
            Self::Scan => "scan",
            Self::End => "end",
            Self::Scanning => "scanning",
            Self::Stitching => "stitching",
            Self::Finished => "finished",
            Self::Other(word) => word.as_str(),
        };
        f.write_str(word)
    }
}

/// One TeraScan telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanProgress {
    /// Op name the sample arrived under.
    pub source: String,
    /// Reported wavelength, if the frame carried a readable one.
    pub wavelength_nm: Option<f64>,
    /// Scan stage.
    pub activity: ScanActivity,
}

/// Final report for an operation issued with `"report":"finished"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    /// Operation the report belongs to (without the `_f_r` suffix).
    pub op: String,
    /// `report` was 1 ("task failed").
    pub failed: bool,
    /// Full parameter bag of the report frame.
    pub parameters: Parameters,
}

/// Message broadcast to [`Connection::subscribe`](crate::protocol::Connection::subscribe) receivers.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// TeraScan telemetry.
    ScanProgress(ScanProgress),
    /// Final task report.
    TaskReport(TaskReport),
    /// Frame that matched neither a push op nor any pending call.
    Unsolicited(Envelope),
}

impl Notification {
    /// Op name of the underlying frame.
    pub fn op(&self) -> &str {
        match self {
            Notification::ScanProgress(p) => &p.source,
            Notification::TaskReport(r) => &r.op,
            Notification::Unsolicited(e) => &e.op,
        }
    }
}

/// Result of classifying one decoded frame.
#[derive(Debug)]
pub enum Frame {
    /// Goes to subscribers.
    Notification(Notification),
    /// May be a reply; the dispatcher decides using its pending/orphan state.
    ReplyCandidate(Envelope),
}

/// Classify a frame by op name alone.
pub fn classify(envelope: Envelope, push_ops: &[String]) -> Frame {
    if push_ops.iter().any(|op| *op == envelope.op) {
        return Frame::Notification(Notification::ScanProgress(scan_progress(envelope)));
    }
    if let Some(base) = envelope.op.strip_suffix(FINAL_REPORT_SUFFIX) {
        let op = base.to_string();
        let parameters = envelope.parameters.unwrap_or_default();
        let reply = Reply::new(op.clone(), parameters);
        let failed = reply.opt_integer("report").ok().flatten() == Some(1);
        return Frame::Notification(Notification::TaskReport(TaskReport {
            op,
            failed,
            parameters: reply.into_parameters(),
        }));
    }
    Frame::ReplyCandidate(envelope)
}

fn scan_progress(envelope: Envelope) -> ScanProgress {
    let reply = Reply::new(envelope.op, envelope.parameters.unwrap_or_default());
    // wavelength output uses "activity", automatic output uses "status"
    let word = reply
        .text("activity")
        .or_else(|_| reply.text("status"))
        .unwrap_or_default();
    ScanProgress {
        wavelength_nm: reply.number("wavelength").ok(),
        activity: ScanActivity::parse(word),
        source: reply.op().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::decode_envelope;

    fn frame(raw: &str) -> Frame {
        classify(decode_envelope(raw.as_bytes()).unwrap(), &default_push_ops())
    }

    #[test]
    fn automatic_output_becomes_scan_progress() {
        let f = frame(r#"{"message":{"transmission_id":[0],"op":"automatic_output","parameters":{"wavelength":[780.125],"status":"scan"}}}"#);
        match f {
            Frame::Notification(Notification::ScanProgress(p)) => {
                assert_eq!(p.source, "automatic_output");
                assert_eq!(p.activity, ScanActivity::Scan);
                assert!((p.wavelength_nm.unwrap() - 780.125).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn scan_stitch_wavelength_reads_activity() {
        let f = frame(r#"{"message":{"transmission_id":[0],"op":"scan_stitch_wavelength","parameters":{"wavelength":[801.0],"activity":"stitching"}}}"#);
        match f {
            Frame::Notification(Notification::ScanProgress(p)) => {
                assert_eq!(p.activity, ScanActivity::Stitching);
                assert!(!p.activity.is_terminal());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn final_report_becomes_task_report() {
        let f = frame(r#"{"message":{"transmission_id":[1],"op":"set_wave_m_f_r","parameters":{"report":[1],"wavelength":[780.0]}}}"#);
        match f {
            Frame::Notification(Notification::TaskReport(r)) => {
                assert_eq!(r.op, "set_wave_m");
                assert!(r.failed);
                assert!(r.parameters.contains_key("wavelength"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ordinary_reply_is_a_candidate() {
        let f = frame(r#"{"message":{"transmission_id":[2],"op":"poll_wave_m_reply","parameters":{"status":[1]}}}"#);
        assert!(matches!(f, Frame::ReplyCandidate(e) if e.op == "poll_wave_m_reply"));
    }

    #[test]
    fn unknown_activity_word_is_kept() {
        assert_eq!(
            ScanActivity::parse("paused"),
            ScanActivity::Other("paused".to_string())
        );
        assert_eq!(ScanActivity::parse("end").to_string(), "end");
    }
}
