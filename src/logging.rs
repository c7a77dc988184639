use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive for this crate's spans and events
fn filter_directive(debug: bool, quiet: bool) -> &'static str {
    if debug {
        "llmpatch=debug"
    } else if quiet {
        "llmpatch=error"
    } else {
        "llmpatch=info"
    }
}

/// Initialize logging to stderr, plus an optional plain-text log file
pub fn init_logging(debug: bool, quiet: bool, log_file: Option<PathBuf>) -> anyhow::Result<()> {
    let env_filter = EnvFilter::new(filter_directive(debug, quiet));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_line_number(debug)
        .with_file(debug)
        .with_writer(std::io::stderr);

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(file)
            .with_target(true)
            .with_line_number(true)
            .with_file(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    Ok(())
}

/// Timestamped log file for one command, under the user config directory
pub fn default_log_path(command: &str) -> anyhow::Result<PathBuf> {
    let log_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("llm-patch")
        .join("logs");

    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    Ok(log_dir.join(format!("{}-{}.log", command, timestamp)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(true, false), "llmpatch=debug");
        assert_eq!(filter_directive(true, true), "llmpatch=debug");
        assert_eq!(filter_directive(false, true), "llmpatch=error");
        assert_eq!(filter_directive(false, false), "llmpatch=info");
    }

    #[test]
    fn test_default_log_path() {
        let path = default_log_path("edit").unwrap();
        assert!(path.parent().unwrap().ends_with("llm-patch/logs"));
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("edit-"));
        assert!(name.ends_with(".log"));
    }
}
