//! embedded-datalog - Logger controller
//!
//! Glues the console, the append log and the acquisition pipeline
//! together and drives the two-state logging mode machine. Mode changes
//! only happen here; the mode gates both the sample drain and the
//! volume-mutating commands (`format`, `file`).

use core::fmt;

use crate::acquisition::{CycleCounter, Sampler, Sensor};
use crate::applog::{AppendLog, LogError};
use crate::console::{Command, Console, Input};
use crate::volume::{FormatKind, Volume};

/// Process-wide logging state.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Idle: accepting maintenance commands, not sampling.
    Waiting,
    /// Sampling: ticks are drained into the logfile.
    Logging,
}

/// Console help text.
pub const HELP_TEXT: &str = "Available commands:\r\n\r\n\
                             \x20 start            start logging\r\n\
                             \x20 stop             stops logging\r\n\
                             \x20 status           shows current status\r\n\
                             \x20 format           formats active drive\r\n\
                             \x20 file <filename>  select/create logfile\r\n\
                             \x20 help             displays this message\r\n\r\n";

const PROMPT: &str = "\r\n>";

/// The foreground application: feed it console characters and call
/// [`poll`](Logger::poll) from the main loop.
pub struct Logger<'f, V, S, C>
where
    V: Volume,
    S: Sensor,
    C: CycleCounter,
{
    console: Console,
    log: AppendLog<V>,
    sampler: Sampler<'f, S, C>,
    mode: Mode,
    entries: u64,
}

impl<'f, V, S, C> Logger<'f, V, S, C>
where
    V: Volume,
    S: Sensor,
    C: CycleCounter,
{
    pub fn new(log: AppendLog<V>, sampler: Sampler<'f, S, C>) -> Self {
        Logger {
            console: Console::new(),
            log,
            sampler,
            mode: Mode::Waiting,
            entries: 0,
        }
    }

    /// Mount the volume and select the default logfile, reporting the
    /// outcome on the console. A blank card is expected to land in one of
    /// the formattable mount errors; the device keeps accepting commands
    /// (notably `format`) either way.
    pub fn init<W: fmt::Write>(
        &mut self,
        slot: u8,
        default_file: &str,
        out: &mut W,
    ) -> fmt::Result {
        write!(out, "Trying to mount drive {}\r\n", slot)?;
        match self.log.init(slot) {
            Ok(()) => {
                write!(out, "Partition mounted\r\n")?;
                let _ = self.log.select_file(default_file);
                self.entries = 0;
            }
            Err(e) => {
                write!(out, "Error: {}\r\n", e.as_str())?;
                if e.formattable() {
                    write!(out, "Try to format the drive using 'format'\r\n")?;
                }
            }
        }
        write!(out, "{}", PROMPT)
    }

    /// Feed one console character; dispatches when it completes an input.
    pub fn handle_char<W: fmt::Write>(&mut self, ch: char, out: &mut W) -> fmt::Result {
        match self.console.feed(ch) {
            Some(input) => self.dispatch(input, out),
            None => Ok(()),
        }
    }

    /// One foreground drain step. While `Logging`, a pending tick becomes
    /// one appended record; while `Waiting`, ticks are left to coalesce
    /// and are discarded on the next `start`.
    pub fn poll<W: fmt::Write>(&mut self, out: &mut W) -> fmt::Result {
        if self.mode != Mode::Logging {
            return Ok(());
        }
        match self.sampler.poll(&mut self.log) {
            Ok(true) => {
                self.entries += 1;
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(LogError::NotOpen) => write!(out, "Error: Logfile not open\r\n"),
            Err(_) => write!(out, "Error: Could not write to logfile\r\n"),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Records appended since the counter was last reset (`file`,
    /// `format`).
    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn active_file(&self) -> Option<&str> {
        self.log.active_file()
    }

    fn dispatch<W: fmt::Write>(&mut self, input: Input, out: &mut W) -> fmt::Result {
        match input {
            Input::Bare(Command::Start) => self.cmd_start(out)?,
            Input::Bare(Command::Stop) => self.cmd_stop(out)?,
            Input::Bare(Command::Status) => self.cmd_status(out)?,
            Input::Bare(Command::Format) => self.cmd_format(out)?,
            Input::Bare(Command::Help) => write!(out, "{}", HELP_TEXT)?,
            Input::Bare(Command::File) => write!(out, "Usage: file <filename>\r\n")?,
            Input::WithArgument(Command::File, name) => self.cmd_file(name.as_str(), out)?,
            Input::Bare(Command::Unknown) | Input::WithArgument(..) => {
                write!(out, "Invalid command, type help for more.\r\n")?
            }
        }
        write!(out, "{}", PROMPT)
    }

    fn cmd_start<W: fmt::Write>(&mut self, out: &mut W) -> fmt::Result {
        if self.mode == Mode::Logging {
            return write!(out, "Logging is already running\r\n");
        }
        match self.log.start() {
            Ok(()) => {
                // Discard any tick that accumulated while waiting.
                self.sampler.flag().clear();
                self.mode = Mode::Logging;
                write!(
                    out,
                    "Logging started (file: {})\r\n",
                    self.log.active_file().unwrap_or("?")
                )
            }
            Err(LogError::NoActiveFile) => write!(out, "Error: No logfile selected\r\n"),
            Err(_) => write!(out, "Error: Could not open logfile\r\n"),
        }
    }

    fn cmd_stop<W: fmt::Write>(&mut self, out: &mut W) -> fmt::Result {
        if self.mode == Mode::Waiting {
            return write!(out, "Logging is not running\r\n");
        }
        self.mode = Mode::Waiting;
        self.sampler.flag().clear();
        self.log.stop();
        write!(out, "Logging stopped (entries: {})\r\n", self.entries)
    }

    fn cmd_status<W: fmt::Write>(&mut self, out: &mut W) -> fmt::Result {
        write!(
            out,
            "Logging:    {}\r\n",
            if self.mode == Mode::Logging { "ON" } else { "OFF" }
        )?;
        write!(
            out,
            "Filename:   {}\r\n",
            self.log.active_file().unwrap_or("(none)")
        )?;
        write!(out, "Log count:  {}\r\n", self.entries)
    }

    fn cmd_format<W: fmt::Write>(&mut self, out: &mut W) -> fmt::Result {
        if self.mode == Mode::Logging {
            return write!(out, "Logging is running, stop first\r\n");
        }
        write!(out, "Formatting drive ... ")?;
        match self.log.format(FormatKind::Fat) {
            Ok(()) => {
                self.entries = 0;
                write!(out, "OK\r\nPartition mounted\r\n")
            }
            Err(LogError::Mount(e)) => {
                self.entries = 0;
                write!(out, "OK\r\nError: {}\r\n", e.as_str())
            }
            Err(_) => write!(out, "ERROR\r\n"),
        }
    }

    fn cmd_file<W: fmt::Write>(&mut self, name: &str, out: &mut W) -> fmt::Result {
        if self.mode == Mode::Logging {
            return write!(out, "Logging is running, stop first\r\n");
        }
        let _ = self.log.select_file(name);
        self.entries = 0;
        write!(
            out,
            "Logfile set to: \"{}\"\r\n",
            self.log.active_file().unwrap_or(name)
        )
    }
}
