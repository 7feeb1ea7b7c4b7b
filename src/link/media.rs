//! Medium auto-detection at boot (spec §4.7).
//!
//! Each concrete driver issues its own probe and the facade reports
//! whichever comes back first; once a medium is settled on, the facade
//! exists only as a historical boot record — routing thereafter happens
//! directly against the chosen driver.

use crate::time::{Duration, Instant};

/// 100ms after the first byte is seen on any medium without a clean UHF/
/// Wi-Fi probe match, the serial medium claims the node by default.
pub const SERIAL_FALLBACK_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Uhf,
    Wifi,
    Serial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    Probing,
    Settled(MediaType),
}

/// Drives the cold-start race between the UHF probe (`*ER=0` in response to
/// `AT`), the Wi-Fi probe (`WIFI …` / `OK` sequences) and the serial
/// fallback timeout.
pub struct MediaDetector {
    state: ProbeState,
    first_byte_seen_at: Option<Instant>,
}

impl MediaDetector {
    pub fn new() -> Self {
        Self { state: ProbeState::Probing, first_byte_seen_at: None }
    }

    /// Called by a driver's byte-level reader the first time any byte
    /// arrives on its stream, to start the serial fallback clock.
    pub fn note_byte_seen(&mut self, now: Instant) {
        self.first_byte_seen_at.get_or_insert(now);
    }

    /// Called by the UHF driver once it has seen `*ER=0` for its `AT` probe.
    pub fn report_uhf_match(&mut self) {
        if self.state == ProbeState::Probing {
            self.state = ProbeState::Settled(MediaType::Uhf);
            log::info!("medium detected: UHF");
        }
    }

    /// Called by the Wi-Fi driver once a `WIFI …` or `OK` line arrives.
    pub fn report_wifi_match(&mut self) {
        if self.state == ProbeState::Probing {
            self.state = ProbeState::Settled(MediaType::Wifi);
            log::info!("medium detected: Wi-Fi");
        }
    }

    pub fn poll_media_detection(&mut self, now: Instant) -> crate::poll::Poll<MediaType> {
        match self.state {
            ProbeState::Settled(media) => crate::poll::Poll::Ready(media),
            ProbeState::Probing => match self.first_byte_seen_at {
                Some(seen_at) if now.saturating_duration_since(seen_at) >= SERIAL_FALLBACK_TIMEOUT => {
                    self.state = ProbeState::Settled(MediaType::Serial);
                    log::info!("medium detected: Serial (fallback timeout)");
                    crate::poll::Poll::Ready(MediaType::Serial)
                }
                _ => crate::poll::Poll::Pending,
            },
        }
    }
}

impl Default for MediaDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::Poll;

    #[test]
    fn explicit_match_wins_immediately() {
        let mut detector = MediaDetector::new();
        detector.report_uhf_match();
        assert_eq!(
            detector.poll_media_detection(Instant::from_millis(0)),
            Poll::Ready(MediaType::Uhf)
        );
    }

    #[test]
    fn falls_back_to_serial_after_timeout() {
        let mut detector = MediaDetector::new();
        detector.note_byte_seen(Instant::from_millis(0));
        assert_eq!(detector.poll_media_detection(Instant::from_millis(50)), Poll::Pending);
        assert_eq!(
            detector.poll_media_detection(Instant::from_millis(100)),
            Poll::Ready(MediaType::Serial)
        );
    }
}
