//! embedded-datalog - Command Console
//!
//! Line-oriented command assembly for the logger. Characters accumulate
//! in a bounded buffer until a newline or space terminator; a newline
//! dispatches the token as a bare command, a space after an
//! argument-taking command arms argument mode, and the next terminated
//! token is then delivered as that command's argument. The two-phase
//! parse is an explicit state machine, not a side-channel flag.

/// Command buffer bound. An over-long token is silently discarded and
/// accumulation restarts; nothing is reported.
pub const LINE_BUFFER_LEN: usize = 40;

/// One bounded token (command or argument).
pub type Line = heapless::String<LINE_BUFFER_LEN>;

/// The closed command set.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Format,
    File,
    Help,
    /// Fallback for anything unrecognised.
    Unknown,
}

impl Command {
    fn parse(token: &str) -> Command {
        match token {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "status" => Command::Status,
            "format" => Command::Format,
            "file" => Command::File,
            "help" => Command::Help,
            _ => Command::Unknown,
        }
    }

    /// Whether the command expects a follow-up argument token.
    pub fn takes_argument(self) -> bool {
        matches!(self, Command::File)
    }
}

/// Where the parser is in the two-phase command/argument exchange.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ParseState {
    AwaitingCommand,
    AwaitingArgumentFor(Command),
}

/// A fully assembled console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A command with no argument. `Bare(File)` means the argument was
    /// never armed (the command was newline-terminated).
    Bare(Command),
    /// An argument-taking command together with its argument.
    WithArgument(Command, Line),
}

/// The line assembler.
pub struct Console {
    buffer: Line,
    state: ParseState,
}

impl Console {
    pub fn new() -> Self {
        Console {
            buffer: Line::new(),
            state: ParseState::AwaitingCommand,
        }
    }

    /// Feed one character. Returns a dispatched input when the character
    /// completed one.
    pub fn feed(&mut self, ch: char) -> Option<Input> {
        match ch {
            '\r' => None,
            '\n' | ' ' => self.terminate(ch == ' '),
            _ => {
                if self.buffer.push(ch).is_err() {
                    // Bound reached: restart accumulation silently.
                    self.buffer.clear();
                    let _ = self.buffer.push(ch);
                }
                None
            }
        }
    }

    fn terminate(&mut self, armed_by_space: bool) -> Option<Input> {
        let token = self.buffer.clone();
        self.buffer.clear();

        match self.state {
            ParseState::AwaitingCommand => {
                if token.is_empty() {
                    return None;
                }
                let command = Command::parse(token.as_str());
                if command.takes_argument() && armed_by_space {
                    self.state = ParseState::AwaitingArgumentFor(command);
                    None
                } else {
                    Some(Input::Bare(command))
                }
            }
            ParseState::AwaitingArgumentFor(command) => {
                if token.is_empty() {
                    // Consecutive spaces are skipped; a bare newline
                    // cancels the pending argument.
                    if !armed_by_space {
                        self.state = ParseState::AwaitingCommand;
                    }
                    None
                } else {
                    self.state = ParseState::AwaitingCommand;
                    Some(Input::WithArgument(command, token))
                }
            }
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Console::new()
    }
}
