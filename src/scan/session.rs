use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use uuid::Uuid;

use super::decoder::{ChannelDecoder, DecodeEvent, Decoder};
use super::device::{DeviceLease, DeviceSlot};
use crate::attendance::{
    record_scan, PersistenceSink, RecordError, Recorded, RosterProvider, ScanDebouncer,
};
use crate::model::Student;

#[derive(Debug)]
pub enum ScanReport {
    Debounced { code: String },
    Recorded(Recorded),
    Rejected { code: String, error: RecordError },
}

impl ScanReport {
    pub fn outcome(&self) -> &'static str {
        match self {
            ScanReport::Debounced { .. } => "debounced",
            ScanReport::Recorded(_) => "recorded",
            ScanReport::Rejected { error, .. } => error.outcome(),
        }
    }
}

/// An open scanning view: holds the capture device, the decode subscription
/// and the roster snapshot it resolves codes against.
///
/// Dropping the session cancels the decoder and releases the device.
pub struct ScanSession<D: Decoder = ChannelDecoder> {
    id: String,
    decoder: D,
    debouncer: ScanDebouncer,
    roster: Vec<Student>,
    processed: u64,
    debounced: u64,
    _lease: DeviceLease,
}

impl<D: Decoder> ScanSession<D> {
    pub fn open<R: RosterProvider + ?Sized>(
        slot: &DeviceSlot,
        roster: &R,
        decoder: D,
        cooldown: Duration,
    ) -> Result<Self, RecordError> {
        let lease = slot.acquire()?;
        let mut decoder = decoder;
        let roster = match roster.fetch_roster() {
            Ok(r) => r,
            Err(e) => {
                decoder.cancel();
                return Err(RecordError::persistence(e));
            }
        };
        let id = Uuid::new_v4().to_string();
        tracing::info!(
            session_id = %id,
            roster_size = roster.len(),
            cooldown_ms = cooldown.as_millis() as u64,
            "scan session opened"
        );
        Ok(Self {
            id,
            decoder,
            debouncer: ScanDebouncer::new(cooldown),
            roster,
            processed: 0,
            debounced: 0,
            _lease: lease,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn roster(&self) -> &[Student] {
        &self.roster
    }

    pub fn cooldown(&self) -> Duration {
        self.debouncer.window()
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn debounced(&self) -> u64 {
        self.debounced
    }

    pub fn refresh_roster<R: RosterProvider + ?Sized>(
        &mut self,
        roster: &R,
    ) -> anyhow::Result<usize> {
        self.roster = roster.fetch_roster()?;
        tracing::debug!(session_id = %self.id, roster_size = self.roster.len(), "roster refreshed");
        Ok(self.roster.len())
    }

    /// Keep the snapshot in line with a change confirmed through another path
    /// (admin status button, student edits).
    pub fn upsert_roster_entry(&mut self, student: &Student) {
        match self.roster.iter_mut().find(|s| s.id == student.id) {
            Some(existing) => *existing = student.clone(),
            None => self.roster.push(student.clone()),
        }
    }

    pub fn remove_roster_entry(&mut self, student_id: &str) {
        self.roster.retain(|s| s.id != student_id);
    }

    /// Drain every queued decode event through the debouncer and the recorder.
    pub fn pump<S: PersistenceSink + ?Sized>(
        &mut self,
        sink: &S,
        today: NaiveDate,
    ) -> Vec<ScanReport> {
        let mut reports = Vec::new();
        while let Some(ev) = self.decoder.try_next() {
            reports.push(self.process(sink, ev, today));
        }
        reports
    }

    fn process<S: PersistenceSink + ?Sized>(
        &mut self,
        sink: &S,
        ev: DecodeEvent,
        today: NaiveDate,
    ) -> ScanReport {
        let code = ev.text.trim().to_string();
        if !self.debouncer.admit(&code, ev.at) {
            self.debounced += 1;
            return ScanReport::Debounced { code };
        }
        self.processed += 1;
        match record_scan(&mut self.roster, sink, &code, today) {
            Ok(recorded) => ScanReport::Recorded(recorded),
            Err(error) => ScanReport::Rejected { code, error },
        }
    }

    /// Manually typed code: goes straight to the recorder, no debounce.
    pub fn record_manual<S: PersistenceSink + ?Sized>(
        &mut self,
        sink: &S,
        code: &str,
        today: NaiveDate,
    ) -> Result<Recorded, RecordError> {
        record_scan(&mut self.roster, sink, code, today)
    }

    pub fn close(self) {
        tracing::info!(
            session_id = %self.id,
            processed = self.processed,
            debounced = self.debounced,
            "scan session closed"
        );
    }
}

impl<D: Decoder> fmt::Debug for ScanSession<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("id", &self.id)
            .field("roster_size", &self.roster.len())
            .field("processed", &self.processed)
            .field("debounced", &self.debounced)
            .finish_non_exhaustive()
    }
}

impl<D: Decoder> Drop for ScanSession<D> {
    fn drop(&mut self) {
        self.decoder.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{parse_date, AttendanceLogEntry, StudentPatch};
    use assert_matches::assert_matches;
    use std::cell::RefCell;
    use std::time::Instant;

    struct FixedRoster(Vec<Student>);

    impl RosterProvider for FixedRoster {
        fn fetch_roster(&self) -> anyhow::Result<Vec<Student>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenRoster;

    impl RosterProvider for BrokenRoster {
        fn fetch_roster(&self) -> anyhow::Result<Vec<Student>> {
            anyhow::bail!("backend offline")
        }
    }

    #[derive(Default)]
    struct CountingSink {
        updates: RefCell<u32>,
    }

    impl PersistenceSink for CountingSink {
        fn update_student(&self, _id: &str, _patch: &StudentPatch) -> anyhow::Result<()> {
            *self.updates.borrow_mut() += 1;
            Ok(())
        }
        fn upsert_attendance_log(&self, _entry: &AttendanceLogEntry) -> anyhow::Result<()> {
            Ok(())
        }
        fn remove_attendance_log(&self, _id: &str, _date: NaiveDate) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn roster() -> FixedRoster {
        FixedRoster(vec![Student {
            id: "1".into(),
            name: "Budi".into(),
            class_label: "8B".into(),
            points: 0,
            attendance_count: 0,
            code: "STD123".into(),
            marker: None,
            last_counted: None,
            created_at: String::new(),
        }])
    }

    #[test]
    fn burst_of_identical_decodes_records_once() {
        let slot = DeviceSlot::new();
        let (decoder, feed) = ChannelDecoder::new();
        let mut session = ScanSession::open(&slot, &roster(), decoder, Duration::from_millis(1500))
            .expect("open");
        let sink = CountingSink::default();
        let today = parse_date("2024-05-01").unwrap();

        let t0 = Instant::now();
        feed.push_at("STD123", t0);
        feed.push_at("STD123", t0 + Duration::from_millis(100));
        feed.push_at("STD123", t0 + Duration::from_millis(300));
        let reports = session.pump(&sink, today);

        assert_eq!(reports.len(), 3);
        assert_matches!(reports[0], ScanReport::Recorded(_));
        assert_matches!(reports[1], ScanReport::Debounced { .. });
        assert_matches!(reports[2], ScanReport::Debounced { .. });
        assert_eq!(*sink.updates.borrow(), 1);
        assert_eq!(session.roster()[0].attendance_count, 1);
        assert_eq!(session.debounced(), 2);
    }

    #[test]
    fn rescan_after_window_reports_already_present() {
        let slot = DeviceSlot::new();
        let (decoder, feed) = ChannelDecoder::new();
        let mut session = ScanSession::open(&slot, &roster(), decoder, Duration::from_millis(1000))
            .expect("open");
        let sink = CountingSink::default();
        let today = parse_date("2024-05-01").unwrap();

        let t0 = Instant::now();
        feed.push_at("STD123", t0);
        feed.push_at("STD123", t0 + Duration::from_secs(2));
        feed.push_at("STD999", t0 + Duration::from_secs(3));
        let reports = session.pump(&sink, today);

        assert_eq!(reports[1].outcome(), "already_present");
        assert_eq!(reports[2].outcome(), "unknown_code");
        assert_eq!(*sink.updates.borrow(), 1);
    }

    #[test]
    fn closing_session_releases_device_and_stops_feed() {
        let slot = DeviceSlot::new();
        let (decoder, feed) = ChannelDecoder::new();
        let session = ScanSession::open(&slot, &roster(), decoder, Duration::from_millis(1500))
            .expect("open");
        assert!(slot.is_in_use());
        let (decoder2, _feed2) = ChannelDecoder::new();
        assert_matches!(
            ScanSession::open(&slot, &roster(), decoder2, Duration::from_millis(1500)),
            Err(RecordError::DeviceUnavailable)
        );

        session.close();
        assert!(!slot.is_in_use());
        assert!(!feed.push("STD123"));
    }

    #[test]
    fn failed_roster_load_releases_device() {
        let slot = DeviceSlot::new();
        let (decoder, feed) = ChannelDecoder::new();
        let res = ScanSession::open(&slot, &BrokenRoster, decoder, Duration::from_millis(1500));
        assert_matches!(res, Err(RecordError::PersistenceFailure(_)));
        assert!(!slot.is_in_use());
        assert!(!feed.push("STD123"));
    }
}
