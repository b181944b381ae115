//! env_logger setup driven by the `logging` settings section.
use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::error::Result;
use crate::settings::{LoggingSettings, parse_level};

const DEFAULT_LOG_FILENAME: &str = "ias-threadfix.log";

/// Writes every record to the log file and, optionally, stdout.
struct TeeWriter {
    file: File,
    stdout: bool,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.stdout {
            io::stdout().write_all(buf)?;
        }
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.stdout {
            io::stdout().flush()?;
        }
        self.file.flush()
    }
}

/// Path of the log file, when a directory or filename is configured.
#[must_use]
pub fn log_file_path(settings: &LoggingSettings) -> Option<PathBuf> {
    match (&settings.directory, &settings.filename) {
        (None, None) => None,
        (directory, filename) => {
            let directory = directory.as_deref().unwrap_or(".");
            let filename = filename.as_deref().unwrap_or(DEFAULT_LOG_FILENAME);
            Some(PathBuf::from(directory).join(filename))
        }
    }
}

fn open_log_file(path: &PathBuf) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Initialise the global logger.
///
/// `level_override` (the `--log-level` flag) wins over the settings file;
/// `RUST_LOG` wins over both.
///
/// # Errors
///
/// Returns an error for an unknown level or an unwritable log file.
pub fn init(settings: &LoggingSettings, level_override: Option<&str>) -> Result<()> {
    let level = match level_override {
        Some(level) => parse_level(level)?,
        None => settings.level_filter()?,
    };

    let mut builder = Builder::from_env(Env::default().default_filter_or(filter_name(level)));
    builder.format_timestamp_secs();

    match log_file_path(settings) {
        Some(path) => {
            let file = open_log_file(&path)?;
            builder.target(Target::Pipe(Box::new(TeeWriter {
                file,
                stdout: settings.stdout,
            })));
        }
        None if settings.stdout => {
            builder.target(Target::Stdout);
        }
        // Rejected by `Settings::validate`; until then env_logger writes to stderr.
        None => {}
    }

    // A logger may already be installed (tests, embedding); keep the first one.
    let _ = builder.try_init();
    Ok(())
}

fn filter_name(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_no_log_file_by_default() {
        assert!(log_file_path(&LoggingSettings::default()).is_none());
    }

    #[test]
    fn test_log_file_defaults_filename() {
        let settings = LoggingSettings {
            directory: Some("/var/log/ias".to_string()),
            ..LoggingSettings::default()
        };
        assert_eq!(
            log_file_path(&settings),
            Some(PathBuf::from("/var/log/ias/ias-threadfix.log"))
        );
    }

    #[test]
    fn test_open_log_file_creates_directory() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("nested").join("sync.log");

        let mut writer = TeeWriter {
            file: open_log_file(&path).expect("opens"),
            stdout: false,
        };
        writer.write_all(b"hello\n").expect("writes");
        writer.flush().expect("flushes");

        assert_eq!(fs::read_to_string(&path).expect("reads"), "hello\n");
    }

    #[test]
    fn test_init_rejects_unknown_override() {
        assert!(init(&LoggingSettings::default(), Some("loud")).is_err());
    }
}
