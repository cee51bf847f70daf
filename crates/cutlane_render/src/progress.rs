//! Engine progress parsing.
//!
//! The engine reports `key=value` lines on stdout (`-progress pipe:1`) and
//! announces the input duration on stderr. One parser owns the snapshot and
//! publishes it after every line, whether or not the line changed anything.

use cutlane_core::types::TimeUs;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Progress update during rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub frame: u64,
    pub fps: f64,
    pub bitrate: Option<String>,
    pub total_size: u64,
    pub out_time: TimeUs,
    pub speed: f64,
    /// Declared job duration, or the duration the engine announced.
    pub duration: Option<TimeUs>,
    pub percent: f64,
    pub eta_seconds: Option<f64>,
    pub finished: bool,
}

impl ProgressSnapshot {
    fn refresh(&mut self) {
        let Some(total) = self.duration.filter(|d| d.0 > 0) else {
            self.percent = 0.0;
            self.eta_seconds = None;
            return;
        };
        let done = self.out_time.0.clamp(0, total.0);
        self.percent = done as f64 / total.0 as f64 * 100.0;
        self.eta_seconds = if self.speed > 0.0 && total.0 > done {
            Some(TimeUs(total.0 - done).as_seconds() / self.speed)
        } else {
            None
        };
    }
}

#[derive(Debug)]
pub struct ProgressParser {
    declared: Option<TimeUs>,
    announced: Option<TimeUs>,
    snapshot: ProgressSnapshot,
    tx: watch::Sender<ProgressSnapshot>,
}

impl ProgressParser {
    /// A parser and the receiving end of its snapshot channel.
    pub fn channel(declared: Option<TimeUs>) -> (Self, watch::Receiver<ProgressSnapshot>) {
        let snapshot = ProgressSnapshot {
            duration: declared,
            ..Default::default()
        };
        let (tx, rx) = watch::channel(snapshot.clone());
        let parser = Self {
            declared,
            announced: None,
            snapshot,
            tx,
        };
        (parser, rx)
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    /// Consume one line of engine output and publish the snapshot.
    pub fn feed(&mut self, line: &str) {
        self.apply(line.trim());
        self.snapshot.duration = self.declared.or(self.announced);
        self.snapshot.refresh();
        self.tx.send_replace(self.snapshot.clone());
    }

    fn apply(&mut self, line: &str) {
        if self.announced.is_none() {
            if let Some(d) = parse_duration_announcement(line) {
                tracing::debug!(duration = %d, "engine announced duration");
                self.announced = Some(d);
                return;
            }
        }

        let Some((key, value)) = line.split_once('=') else {
            return;
        };
        let value = value.trim();
        let snap = &mut self.snapshot;
        match key.trim() {
            "frame" => set_parsed(&mut snap.frame, value),
            "fps" => set_parsed(&mut snap.fps, value),
            "bitrate" if value != "N/A" => snap.bitrate = Some(value.to_string()),
            "total_size" => set_parsed(&mut snap.total_size, value),
            // out_time_ms carries microseconds as well
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    snap.out_time = TimeUs(us);
                }
            }
            "speed" => set_parsed(&mut snap.speed, value.trim_end_matches('x').trim()),
            "progress" if value == "end" => snap.finished = true,
            _ => {}
        }
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, value: &str) {
    if let Ok(v) = value.parse() {
        *slot = v;
    }
}

/// `Duration: 00:00:05.00, start: ...` from the input banner, or a stream
/// metadata line `DURATION        : 00:00:05.000000000`.
fn parse_duration_announcement(line: &str) -> Option<TimeUs> {
    if let Some(rest) = line.strip_prefix("Duration:") {
        return rest.split(',').next()?.trim().parse().ok();
    }
    let (key, value) = line.split_once(':')?;
    if key.trim() == "DURATION" {
        return value.trim().parse().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut ProgressParser, lines: &[&str]) {
        for line in lines {
            parser.feed(line);
        }
    }

    #[test]
    fn key_value_lines_update_snapshot() {
        let (mut parser, rx) = ProgressParser::channel(Some(TimeUs::from_seconds(10.0)));
        feed_all(
            &mut parser,
            &[
                "frame=150",
                "fps=29.97",
                "bitrate=1234.5kbits/s",
                "total_size=524288",
                "out_time_us=5000000",
                "speed=2.0x",
                "progress=continue",
            ],
        );
        let snap = rx.borrow().clone();
        assert_eq!(snap.frame, 150);
        assert_eq!(snap.fps, 29.97);
        assert_eq!(snap.bitrate.as_deref(), Some("1234.5kbits/s"));
        assert_eq!(snap.total_size, 524_288);
        assert_eq!(snap.out_time, TimeUs(5_000_000));
        assert_eq!(snap.speed, 2.0);
        assert_eq!(snap.percent, 50.0);
        assert_eq!(snap.eta_seconds, Some(2.5));
        assert!(!snap.finished);
    }

    #[test]
    fn out_time_ms_is_microseconds() {
        let (mut parser, _rx) = ProgressParser::channel(None);
        parser.feed("out_time_ms=1500000");
        assert_eq!(parser.snapshot().out_time, TimeUs(1_500_000));
    }

    #[test]
    fn continue_marker_never_mutates_state() {
        let (mut parser, _rx) = ProgressParser::channel(None);
        parser.feed("frame=10");
        let before = parser.snapshot().clone();
        parser.feed("progress=continue");
        assert_eq!(parser.snapshot(), &before);
    }

    #[test]
    fn end_marker_finishes() {
        let (mut parser, rx) = ProgressParser::channel(None);
        parser.feed("progress=end");
        assert!(rx.borrow().finished);
    }

    #[test]
    fn bad_numbers_keep_last_value() {
        let (mut parser, _rx) = ProgressParser::channel(None);
        feed_all(&mut parser, &["frame=42", "frame=abc", "speed=N/A", "bitrate=N/A"]);
        let snap = parser.snapshot();
        assert_eq!(snap.frame, 42);
        assert_eq!(snap.speed, 0.0);
        assert_eq!(snap.bitrate, None);
    }

    #[test]
    fn banner_duration_is_parsed_once() {
        let (mut parser, _rx) = ProgressParser::channel(None);
        feed_all(
            &mut parser,
            &[
                "  Duration: 00:00:08.00, start: 0.000000, bitrate: 1024 kb/s",
                "  Duration: 00:01:00.00, start: 0.000000, bitrate: 1024 kb/s",
                "out_time_us=2000000",
            ],
        );
        let snap = parser.snapshot();
        assert_eq!(snap.duration, Some(TimeUs(8_000_000)));
        assert_eq!(snap.percent, 25.0);
    }

    #[test]
    fn stream_metadata_duration_is_parsed() {
        let (mut parser, _rx) = ProgressParser::channel(None);
        parser.feed("      DURATION        : 00:00:04.000000000");
        assert_eq!(parser.snapshot().duration, Some(TimeUs(4_000_000)));
    }

    #[test]
    fn declared_duration_wins_over_announced() {
        let (mut parser, _rx) = ProgressParser::channel(Some(TimeUs::from_seconds(2.0)));
        parser.feed("Duration: 00:00:30.00, start: 0.000000");
        parser.feed("out_time_us=3000000");
        let snap = parser.snapshot();
        assert_eq!(snap.duration, Some(TimeUs(2_000_000)));
        assert_eq!(snap.percent, 100.0);
        assert_eq!(snap.eta_seconds, None);
    }

    #[test]
    fn every_line_publishes() {
        let (mut parser, mut rx) = ProgressParser::channel(None);
        rx.borrow_and_update();
        parser.feed("some unrelated log line");
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn zero_duration_has_no_percent() {
        let (mut parser, _rx) = ProgressParser::channel(None);
        parser.feed("out_time_us=1000");
        assert_eq!(parser.snapshot().percent, 0.0);
        assert_eq!(parser.snapshot().eta_seconds, None);
    }
}
