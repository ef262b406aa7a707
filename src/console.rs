//! Operator command shell.
//!
//! The console accepts the same commands an IOC startup script would issue:
//!
//! | Command                                  | Effect                                 |
//! |------------------------------------------|----------------------------------------|
//! | `L2MpsL1BsaConfig <streamName> <prefix>` | start an acquisition on a stream       |
//! | `L2MpsL1BsaEnable <0/1>`                 | enable or disable sample processing    |
//! | `L2MpsL1BsaDebug <0/1>`                  | enable or disable the frame dump       |
//! | `L2MpsL1BsaPrintCounter`                 | print the received frame counter       |
//! | `L2MpsL1BsaStop`                         | stop every running acquisition         |
//! | `help [command]`                         | list commands or show one usage line   |
//!
//! Lines are tokenized like iocsh: arguments are separated by whitespace,
//! commas or parentheses, double quotes group a token, and `#` starts a
//! comment. Missing string arguments are empty and missing integers are `0`.
//!
//! Enable and debug settings apply to every running stream and to streams
//! started later.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::acquisition::{BsaStream, StreamConfig};
use crate::archive::{CsvArchive, LogArchive};
use crate::config::ArchiveConfig;
use crate::error::{BsaError, Result};
use crate::source::open_source;

/// Creates a running stream from a validated configuration.
pub trait StreamFactory: Send {
    /// Open the source named by `config.stream_name` and start acquisition.
    fn create(&self, config: StreamConfig) -> Result<BsaStream>;
}

/// Factory opening `udp://` or `file://` sources and archiving through the
/// configured backend.
#[derive(Debug, Clone)]
pub struct DefaultStreamFactory {
    archive: ArchiveConfig,
}

impl DefaultStreamFactory {
    /// Create a factory for the given archive settings.
    pub fn new(archive: ArchiveConfig) -> Self {
        Self { archive }
    }

    /// CSV file receiving the samples of `record_prefix`.
    pub fn csv_path(&self, record_prefix: &str) -> PathBuf {
        let file: String = record_prefix
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.archive.output_dir.join(format!("{file}.csv"))
    }
}

impl StreamFactory for DefaultStreamFactory {
    fn create(&self, config: StreamConfig) -> Result<BsaStream> {
        let source = open_source(&config.stream_name)?;
        match self.archive.backend.as_str() {
            "csv" => {
                let archive = Arc::new(CsvArchive::create(self.csv_path(&config.record_prefix))?);
                BsaStream::start(config, source, archive.as_ref(), archive.clone())
            }
            "log" => {
                let archive = Arc::new(LogArchive::new());
                BsaStream::start(config, source, archive.as_ref(), archive.clone())
            }
            other => Err(BsaError::invalid_config(format!(
                "Unknown archive backend '{other}'"
            ))),
        }
    }
}

/// Registered console command.
#[derive(Debug, Clone, Copy)]
pub struct CommandDef {
    /// Command name
    pub name: &'static str,
    /// Argument names, in order
    pub args: &'static [&'static str],
}

/// Every command the console understands.
pub const COMMANDS: &[CommandDef] = &[
    CommandDef {
        name: "L2MpsL1BsaConfig",
        args: &["streamName", "recordPrefix"],
    },
    CommandDef {
        name: "L2MpsL1BsaEnable",
        args: &["enable"],
    },
    CommandDef {
        name: "L2MpsL1BsaDebug",
        args: &["debug"],
    },
    CommandDef {
        name: "L2MpsL1BsaPrintCounter",
        args: &[],
    },
    CommandDef {
        name: "L2MpsL1BsaStop",
        args: &[],
    },
    CommandDef {
        name: "help",
        args: &["command"],
    },
];

impl CommandDef {
    /// One-line usage string.
    pub fn usage(&self) -> String {
        let mut line = self.name.to_string();
        for arg in self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Split a command line into a command name and its arguments.
///
/// Returns `None` for blank lines and comments.
pub fn tokenize(line: &str) -> Option<(String, Vec<String>)> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;

    for c in line.chars() {
        if in_quotes {
            if c == '"' {
                in_quotes = false;
            } else {
                current.push(c);
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                quoted = true;
            }
            '#' if tokens.is_empty() && current.is_empty() => return None,
            c if c.is_whitespace() || c == ',' || c == '(' || c == ')' => {
                if !current.is_empty() || quoted {
                    tokens.push(std::mem::take(&mut current));
                    quoted = false;
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() || quoted {
        tokens.push(current);
    }

    let mut tokens = tokens.into_iter();
    let name = tokens.next()?;
    Some((name, tokens.collect()))
}

fn int_arg(args: &[String], index: usize) -> Result<i64> {
    let Some(raw) = args.get(index) else {
        return Ok(0);
    };
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|_| BsaError::Command {
        message: format!("Invalid integer argument '{raw}'"),
    })
}

fn str_arg(args: &[String], index: usize) -> &str {
    args.get(index).map(String::as_str).unwrap_or_default()
}

/// Command shell owning the streams it started.
pub struct Console {
    factory: Box<dyn StreamFactory>,
    template: StreamConfig,
    streams: Vec<BsaStream>,
}

impl Console {
    /// Create a console starting streams through `factory`.
    pub fn new(factory: Box<dyn StreamFactory>) -> Self {
        Self::with_template(factory, StreamConfig::default())
    }

    /// Create a console whose `L2MpsL1BsaConfig` streams inherit the timeout,
    /// debug interval, timestamp policy and flags of `template`.
    pub fn with_template(factory: Box<dyn StreamFactory>, template: StreamConfig) -> Self {
        Self {
            factory,
            template,
            streams: Vec::new(),
        }
    }

    /// Running streams, in start order.
    pub fn streams(&self) -> &[BsaStream] {
        &self.streams
    }

    /// Start a stream from a full configuration.
    pub fn start(&mut self, config: StreamConfig) -> Result<()> {
        config.validate()?;
        if self
            .streams
            .iter()
            .any(|s| s.stream_name() == config.stream_name)
        {
            return Err(BsaError::Command {
                message: format!("Stream '{}' is already configured", config.stream_name),
            });
        }
        // Two streams under one prefix would register the same channels twice
        if let Some(owner) = self
            .streams
            .iter()
            .find(|s| s.record_prefix() == config.record_prefix)
        {
            return Err(BsaError::Command {
                message: format!(
                    "Record prefix '{}' is already used by stream '{}'",
                    config.record_prefix,
                    owner.stream_name()
                ),
            });
        }

        let stream = self.factory.create(config)?;
        self.streams.push(stream);
        Ok(())
    }

    /// Stop and drop every running stream. Returns how many were stopped.
    pub fn stop_all(&mut self) -> usize {
        let count = self.streams.len();
        for stream in self.streams.drain(..) {
            stream.stop();
        }
        count
    }

    /// Execute one command line and return its output.
    pub fn execute(&mut self, line: &str) -> Result<String> {
        let Some((name, args)) = tokenize(line) else {
            return Ok(String::new());
        };
        debug!(command = %name, ?args, "Console command");

        match name.as_str() {
            "L2MpsL1BsaConfig" => self.configure(str_arg(&args, 0), str_arg(&args, 1)),
            "L2MpsL1BsaEnable" => {
                let enabled = int_arg(&args, 0)? != 0;
                self.template.enabled = enabled;
                for stream in &self.streams {
                    stream.control().set_enabled(enabled);
                }
                info!(enabled, "LCLS1 BSA processing");
                Ok(String::new())
            }
            "L2MpsL1BsaDebug" => {
                let dump_on = int_arg(&args, 0)? != 0;
                self.template.debug = dump_on;
                for stream in &self.streams {
                    stream.control().set_debug(dump_on);
                }
                info!(enabled = dump_on, "LCLS1 BSA debug dump");
                Ok(String::new())
            }
            "L2MpsL1BsaPrintCounter" => Ok(self.print_counter()),
            "L2MpsL1BsaStop" => {
                let count = self.stop_all();
                Ok(format!("Stopped {count} LCLS1 BSA stream(s)"))
            }
            "help" => help(args.first().map(String::as_str)),
            _ => Err(BsaError::UnknownCommand { name }),
        }
    }

    fn configure(&mut self, stream_name: &str, record_prefix: &str) -> Result<String> {
        let config = StreamConfig {
            stream_name: stream_name.to_string(),
            record_prefix: record_prefix.to_string(),
            ..self.template.clone()
        };
        self.start(config)?;
        Ok(String::new())
    }

    fn print_counter(&self) -> String {
        if self.streams.is_empty() {
            return "Stream received counter = 0".to_string();
        }
        self.streams
            .iter()
            .map(|s| format!("Stream received counter = {}", s.control().frame_counter()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn help(command: Option<&str>) -> Result<String> {
    match command {
        None => Ok(COMMANDS
            .iter()
            .map(CommandDef::usage)
            .collect::<Vec<_>>()
            .join("\n")),
        Some(name) => COMMANDS
            .iter()
            .find(|c| c.name == name)
            .map(CommandDef::usage)
            .ok_or_else(|| BsaError::UnknownCommand {
                name: name.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_plain_and_parenthesized() {
        assert_eq!(
            tokenize("L2MpsL1BsaConfig udp://a:1 MPLN:X"),
            Some((
                "L2MpsL1BsaConfig".to_string(),
                vec!["udp://a:1".to_string(), "MPLN:X".to_string()]
            ))
        );
        assert_eq!(
            tokenize("L2MpsL1BsaEnable(0)"),
            Some(("L2MpsL1BsaEnable".to_string(), vec!["0".to_string()]))
        );
        assert_eq!(
            tokenize(r#"L2MpsL1BsaConfig("udp://a:1", "MPLN:X")"#),
            Some((
                "L2MpsL1BsaConfig".to_string(),
                vec!["udp://a:1".to_string(), "MPLN:X".to_string()]
            ))
        );
    }

    #[test]
    fn test_tokenize_blank_comment_and_empty_quotes() {
        assert_eq!(tokenize("   "), None);
        assert_eq!(tokenize("# L2MpsL1BsaEnable 1"), None);
        assert_eq!(
            tokenize(r#"L2MpsL1BsaConfig "" P"#),
            Some((
                "L2MpsL1BsaConfig".to_string(),
                vec![String::new(), "P".to_string()]
            ))
        );
    }

    #[test]
    fn test_int_arg() {
        let args = vec!["5".to_string(), "0x10".to_string(), "on".to_string()];
        assert_eq!(int_arg(&args, 0).unwrap(), 5);
        assert_eq!(int_arg(&args, 1).unwrap(), 16);
        assert!(int_arg(&args, 2).is_err());
        assert_eq!(int_arg(&args, 3).unwrap(), 0);
    }

    #[test]
    fn test_help_lists_commands() {
        let text = help(None).unwrap();
        assert!(text.contains("L2MpsL1BsaConfig streamName recordPrefix"));
        assert!(text.contains("L2MpsL1BsaPrintCounter"));
        assert_eq!(help(Some("L2MpsL1BsaDebug")).unwrap(), "L2MpsL1BsaDebug debug");
        assert!(help(Some("dbpf")).is_err());
    }

    #[test]
    fn test_csv_path_is_sanitized() {
        let factory = DefaultStreamFactory::new(ArchiveConfig::default());
        assert_eq!(
            factory.csv_path("MPLN:LI21:MP01"),
            PathBuf::from("data").join("MPLN_LI21_MP01.csv")
        );
    }
}
