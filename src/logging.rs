use std::path::Path;

use log::LevelFilter;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Guard returned so the caller can hold it for the lifetime of `main`.
/// Dropping it is harmless; it exists only to keep the pattern the same
/// shape as call sites that expect a `_handle` binding.
pub struct LoggingHandle;

/// Initialize logging for a subcommand invocation. When `log_filepath` is
/// given, debug-level logs are written to that file via log4rs; otherwise
/// `env_logger` is installed at `info` level (overridable with `RUST_LOG`).
pub fn init_logging(log_filepath: Option<&Path>) -> LoggingHandle {
    if let Some(path) = log_filepath {
        let pattern = "{d(%Y-%m-%d %H:%M:%S)} {l} [{t}] {m}{n}";
        match FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(pattern)))
            .build(path)
        {
            Ok(appender) => {
                let config = Config::builder()
                    .appender(Appender::builder().build("file", Box::new(appender)))
                    .build(Root::builder().appender("file").build(LevelFilter::Debug));
                match config {
                    Ok(config) => {
                        let _ = log4rs::init_config(config);
                    }
                    Err(e) => {
                        eprintln!("failed to build logging config: {e}");
                    }
                }
            }
            Err(e) => {
                eprintln!("failed to open log file {}: {e}", path.display());
            }
        }
    } else {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info"),
        )
        .try_init();
    }
    LoggingHandle
}
