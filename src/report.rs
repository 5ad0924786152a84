use crate::error::Result;
use crate::registration::RegistrationOffering;
use crate::source_event::SourceEvent;
use std::io::Write;

/// Accumulates the lines for one event before writing them as a block.
#[derive(Default)]
struct EventReport {
    event_line: Option<String>,
    photo_name: Option<String>,
    registration_lines: Vec<String>,
}

/// Writes a human-readable account of each added event, its photo, and its
/// registration types to an injected output stream.
pub struct Reporter {
    output: Box<dyn Write + Send>,
    current: EventReport,
    photos_downloaded: usize,
}

impl Reporter {
    pub fn new(output: Box<dyn Write + Send>) -> Self {
        Reporter {
            output,
            current: EventReport::default(),
            photos_downloaded: 0,
        }
    }

    /// Discards all report output.
    pub fn silent() -> Self {
        Reporter::new(Box::new(std::io::sink()))
    }

    pub fn report_event(&mut self, event: &SourceEvent) {
        self.current.event_line = Some(format!(
            "{}\n    {} to {}\n",
            event.title,
            event.start.format("%Y-%m-%d %H:%M"),
            event.end.format("%Y-%m-%d %H:%M"),
        ));
    }

    pub fn report_photo_name(&mut self, photo_name: &str) {
        self.current.photo_name = Some(photo_name.to_string());
        self.photos_downloaded += 1;
    }

    pub fn report_registration_type(&mut self, offering: &RegistrationOffering) {
        self.current.registration_lines.push(format!(
            "    {:<12}   ${:6.2}   {}\n",
            offering.name,
            offering.price,
            offering.display_count(),
        ));
    }

    /// Flush the current event's block to the output stream.
    pub fn report(&mut self) -> Result<()> {
        let report = std::mem::take(&mut self.current);
        if let Some(line) = &report.event_line {
            self.output.write_all(line.as_bytes())?;
        }
        if let Some(name) = &report.photo_name {
            self.output
                .write_all(format!("    Downloaded {name}\n").as_bytes())?;
        }
        for line in &report.registration_lines {
            self.output.write_all(line.as_bytes())?;
        }
        Ok(())
    }

    /// Summary line for the whole run.
    pub fn report_downloads(&mut self) -> Result<()> {
        let line = match self.photos_downloaded {
            0 => "\nDownloaded no photos\n".to_string(),
            1 => "\nDownloaded 1 photo\n".to_string(),
            n => format!("\nDownloaded {n} photos\n"),
        };
        self.output.write_all(line.as_bytes())?;
        self.output.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::Availability;
    use crate::restrictions::GuestPolicy;
    use crate::source_event::RawSourceEvent;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Shared in-memory writer so tests can read what the reporter wrote.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sample_event() -> SourceEvent {
        let raw: RawSourceEvent = serde_json::from_value(json!({
            "id": "pfsbvrybcpbmb",
            "name": "AC: Mending Monday",
            "time": 1604966400000i64,
            "duration": 7200000,
            "utc_offset": -18000000,
        }))
        .unwrap();
        SourceEvent::from_raw(raw)
    }

    fn sample_offering() -> RegistrationOffering {
        RegistrationOffering {
            event_id: 12345,
            name: "RSVP".to_string(),
            price: 78.9,
            capacity: None,
            capacity_label: "available",
            is_enabled: true,
            description: String::new(),
            availability: Availability::Everyone,
            guest_policy: GuestPolicy::Disabled,
            waitlist_enabled: true,
        }
    }

    #[test]
    fn event_block_lists_event_photo_and_offerings() {
        let buffer = SharedBuffer::default();
        let mut reporter = Reporter::new(Box::new(buffer.clone()));
        reporter.report_event(&sample_event());
        reporter.report_photo_name("AC_Mending_Monday_2020-11-09.jpeg");
        reporter.report_registration_type(&sample_offering());
        reporter.report().unwrap();

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            written,
            "AC: Mending Monday\n\
             \x20   2020-11-09 19:00 to 2020-11-09 21:00\n\
             \x20   Downloaded AC_Mending_Monday_2020-11-09.jpeg\n\
             \x20   RSVP           $ 78.90   unlimited\n"
        );
    }

    #[test]
    fn report_clears_state_between_events() {
        let buffer = SharedBuffer::default();
        let mut reporter = Reporter::new(Box::new(buffer.clone()));
        reporter.report_event(&sample_event());
        reporter.report().unwrap();
        reporter.report().unwrap();

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written.matches("AC: Mending Monday").count(), 1);
    }

    #[test]
    fn download_summary_counts_photos() {
        let buffer = SharedBuffer::default();
        let mut reporter = Reporter::new(Box::new(buffer.clone()));
        reporter.report_photo_name("a.jpeg");
        reporter.report_photo_name("b.jpeg");
        reporter.report().unwrap();
        reporter.report_downloads().unwrap();

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(written.contains("Downloaded 2 photos"));
    }
}
