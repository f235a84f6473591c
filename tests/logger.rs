//! End-to-end logger scenarios over a RAM-backed volume: console input in,
//! CSV records out, with the mode machine gating everything in between.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use embedded_datalog::acquisition::{CycleCounter, SampleFlag, Sampler, Sensor};
use embedded_datalog::applog::{AppendLog, LogError};
use embedded_datalog::logger::{Logger, Mode};
use embedded_datalog::volume::{FormatKind, MountError, Volume};

#[derive(Default)]
struct VolumeInner {
    formatted: bool,
    mounted: bool,
    files: HashMap<String, Vec<u8>>,
    open: Option<String>,
    open_count: usize,
}

/// A std-backed volume with a shared handle so tests can inspect the
/// files after the logger has consumed the volume.
#[derive(Clone, Default)]
struct RamVolume(Rc<RefCell<VolumeInner>>);

impl RamVolume {
    fn formatted() -> Self {
        let volume = RamVolume::default();
        volume.0.borrow_mut().formatted = true;
        volume
    }

    fn file(&self, name: &str) -> Vec<u8> {
        self.0.borrow().files.get(name).cloned().unwrap_or_default()
    }

    fn open_count(&self) -> usize {
        self.0.borrow().open_count
    }
}

impl Volume for RamVolume {
    type Error = ();

    fn mount(&mut self, _slot: u8) -> Result<(), MountError> {
        let mut inner = self.0.borrow_mut();
        if !inner.formatted {
            return Err(MountError::NoFormat);
        }
        inner.mounted = true;
        Ok(())
    }

    fn format(&mut self, _kind: FormatKind) -> bool {
        let mut inner = self.0.borrow_mut();
        inner.files.clear();
        inner.formatted = true;
        true
    }

    fn create(&mut self, name: &str) -> Result<(), ()> {
        let mut inner = self.0.borrow_mut();
        if !inner.mounted {
            return Err(());
        }
        inner.files.insert(name.to_string(), Vec::new());
        Ok(())
    }

    fn open_append(&mut self, name: &str) -> Result<(), ()> {
        let mut inner = self.0.borrow_mut();
        if !inner.mounted {
            return Err(());
        }
        inner.files.entry(name.to_string()).or_default();
        inner.open = Some(name.to_string());
        inner.open_count += 1;
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> Result<(), ()> {
        let mut inner = self.0.borrow_mut();
        let name = inner.open.clone().ok_or(())?;
        inner.files.get_mut(&name).ok_or(())?.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) {
        self.0.borrow_mut().open = None;
    }
}

/// A sensor whose readings climb by three per sample.
#[derive(Default)]
struct RampAdc {
    value: u16,
}

impl Sensor for RampAdc {
    fn sample(&mut self) -> u16 {
        self.value += 3;
        self.value
    }
}

/// A cycle counter that advances every time it is read.
#[derive(Default)]
struct TickingClock {
    count: Cell<u32>,
}

impl CycleCounter for TickingClock {
    fn now(&self) -> u32 {
        self.count.set(self.count.get() + 1000);
        self.count.get()
    }
}

type TestLogger<'f> = Logger<'f, RamVolume, RampAdc, TickingClock>;

fn logger<'f>(flag: &'f SampleFlag, volume: RamVolume) -> TestLogger<'f> {
    let sampler = Sampler::new(flag, RampAdc::default(), TickingClock::default());
    Logger::new(AppendLog::new(volume), sampler)
}

fn feed(logger: &mut TestLogger<'_>, input: &str, out: &mut String) {
    for ch in input.chars() {
        logger.handle_char(ch, out).unwrap();
    }
}

#[test]
fn end_to_end_logging_session() {
    let volume = RamVolume::formatted();
    let flag = SampleFlag::new();
    let mut logger = logger(&flag, volume.clone());
    let mut out = String::new();

    logger.init(0, "logfile.csv", &mut out).unwrap();
    assert!(out.contains("Partition mounted"));

    // Trailing space arms argument mode; the argument arrives on the
    // next line.
    feed(&mut logger, "file test.csv ", &mut out);
    feed(&mut logger, "test.csv\n", &mut out);
    assert_eq!(logger.active_file(), Some("test.csv"));

    feed(&mut logger, "start\n", &mut out);
    assert_eq!(logger.mode(), Mode::Logging);
    assert!(out.contains("Logging started (file: test.csv)"));

    for _ in 0..10 {
        flag.raise();
        logger.poll(&mut out).unwrap();
    }

    feed(&mut logger, "stop\n", &mut out);
    assert_eq!(logger.mode(), Mode::Waiting);
    assert!(out.contains("Logging stopped (entries: 10)"));

    // Exactly ten CRLF-terminated records, each "cycles, value" with a
    // strictly increasing timestamp.
    let content = String::from_utf8(volume.file("test.csv")).unwrap();
    let lines: Vec<&str> = content.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 10);
    let mut last_cycles = 0u32;
    for (i, line) in lines.iter().enumerate() {
        let mut parts = line.split(", ");
        let cycles: u32 = parts.next().unwrap().parse().unwrap();
        let value: u16 = parts.next().unwrap().parse().unwrap();
        assert!(parts.next().is_none());
        assert!(cycles > last_cycles);
        last_cycles = cycles;
        assert_eq!(value, 3 * (i as u16 + 1));
    }
}

#[test]
fn ticks_coalesce_into_one_record() {
    let volume = RamVolume::formatted();
    let flag = SampleFlag::new();
    let mut logger = logger(&flag, volume.clone());
    let mut out = String::new();

    logger.init(0, "logfile.csv", &mut out).unwrap();
    feed(&mut logger, "start\n", &mut out);

    // Two ticks land before the foreground gets a turn: one record.
    flag.raise();
    flag.raise();
    logger.poll(&mut out).unwrap();
    // No tick pending any more.
    logger.poll(&mut out).unwrap();

    feed(&mut logger, "stop\n", &mut out);
    assert!(out.contains("Logging stopped (entries: 1)"));
}

#[test]
fn start_is_idempotent_while_logging() {
    let volume = RamVolume::formatted();
    let flag = SampleFlag::new();
    let mut logger = logger(&flag, volume.clone());
    let mut out = String::new();

    logger.init(0, "logfile.csv", &mut out).unwrap();
    feed(&mut logger, "start\n", &mut out);
    assert_eq!(volume.open_count(), 1);

    feed(&mut logger, "start\n", &mut out);
    assert!(out.contains("Logging is already running"));
    assert_eq!(logger.mode(), Mode::Logging);
    // No second open of the file.
    assert_eq!(volume.open_count(), 1);
}

#[test]
fn stop_while_waiting_is_a_no_op() {
    let volume = RamVolume::formatted();
    let flag = SampleFlag::new();
    let mut logger = logger(&flag, volume);
    let mut out = String::new();

    logger.init(0, "logfile.csv", &mut out).unwrap();
    feed(&mut logger, "stop\n", &mut out);
    assert!(out.contains("Logging is not running"));
    assert_eq!(logger.mode(), Mode::Waiting);
}

#[test]
fn format_is_rejected_while_logging() {
    let volume = RamVolume::formatted();
    let flag = SampleFlag::new();
    let mut logger = logger(&flag, volume.clone());
    let mut out = String::new();

    logger.init(0, "logfile.csv", &mut out).unwrap();
    feed(&mut logger, "start\n", &mut out);
    flag.raise();
    logger.poll(&mut out).unwrap();

    feed(&mut logger, "format\n", &mut out);
    assert!(out.contains("stop first"));
    assert_eq!(logger.mode(), Mode::Logging);
    // The logfile survived.
    assert!(!volume.file("logfile.csv").is_empty());
}

#[test]
fn format_while_waiting_resets_the_entry_counter() {
    let volume = RamVolume::formatted();
    let flag = SampleFlag::new();
    let mut logger = logger(&flag, volume.clone());
    let mut out = String::new();

    logger.init(0, "logfile.csv", &mut out).unwrap();
    feed(&mut logger, "start\n", &mut out);
    for _ in 0..3 {
        flag.raise();
        logger.poll(&mut out).unwrap();
    }
    feed(&mut logger, "stop\n", &mut out);
    assert_eq!(logger.entries(), 3);

    feed(&mut logger, "format\n", &mut out);
    assert!(out.contains("Formatting drive ... OK"));
    assert_eq!(logger.entries(), 0);
    assert!(volume.file("logfile.csv").is_empty());

    out.clear();
    feed(&mut logger, "status\n", &mut out);
    assert!(out.contains("Log count:  0"));
}

#[test]
fn file_is_rejected_while_logging() {
    let volume = RamVolume::formatted();
    let flag = SampleFlag::new();
    let mut logger = logger(&flag, volume);
    let mut out = String::new();

    logger.init(0, "logfile.csv", &mut out).unwrap();
    feed(&mut logger, "start\n", &mut out);
    feed(&mut logger, "file other.csv\n", &mut out);
    assert!(out.contains("stop first"));
    assert_eq!(logger.active_file(), Some("logfile.csv"));
}

#[test]
fn blank_card_flow_mount_error_then_format() {
    // First-run state: the card mounts with NoFormat, the console says
    // so, and a `format` repairs it without a restart.
    let volume = RamVolume::default();
    let flag = SampleFlag::new();
    let mut logger = logger(&flag, volume.clone());
    let mut out = String::new();

    logger.init(0, "logfile.csv", &mut out).unwrap();
    assert!(out.contains("Error: Disk not formatted"));
    assert!(out.contains("Try to format the drive using 'format'"));

    feed(&mut logger, "format\n", &mut out);
    assert!(out.contains("Formatting drive ... OK"));

    feed(&mut logger, "file run1.csv\n", &mut out);
    assert_eq!(logger.active_file(), Some("run1.csv"));

    feed(&mut logger, "start\n", &mut out);
    assert_eq!(logger.mode(), Mode::Logging);
    flag.raise();
    logger.poll(&mut out).unwrap();
    feed(&mut logger, "stop\n", &mut out);
    assert!(!volume.file("run1.csv").is_empty());
}

#[test]
fn write_record_before_start_is_not_open() {
    let volume = RamVolume::formatted();
    let mut log = AppendLog::new(volume.clone());
    log.init(0).unwrap();
    log.select_file("test.csv").unwrap();

    assert_eq!(log.write_record(123, 456), Err(LogError::NotOpen));
    // Nothing was persisted.
    assert!(volume.file("test.csv").is_empty());
}

#[test]
fn start_without_a_selected_file() {
    let mut log = AppendLog::new(RamVolume::formatted());
    log.init(0).unwrap();
    assert_eq!(log.start(), Err(LogError::NoActiveFile));
}

#[test]
fn records_are_csv_lines() {
    let volume = RamVolume::formatted();
    let mut log = AppendLog::new(volume.clone());
    log.init(0).unwrap();
    log.select_file("test.csv").unwrap();
    log.start().unwrap();
    log.write_record(4_294_967_295, 65_535).unwrap();
    log.write_record(7, 0).unwrap();
    log.stop();

    let content = String::from_utf8(volume.file("test.csv")).unwrap();
    assert_eq!(content, "4294967295, 65535\r\n7, 0\r\n");
}

#[test]
fn long_filenames_are_truncated_silently() {
    let volume = RamVolume::formatted();
    let mut log = AppendLog::new(volume.clone());
    log.init(0).unwrap();

    let long = "x".repeat(64);
    log.select_file(&long).unwrap();
    assert_eq!(log.active_file().map(str::len), Some(40));
}
