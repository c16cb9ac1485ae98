use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing into a file when `log_file` is set.
///
/// The terminal belongs to the user and the child, so nothing is ever logged
/// there. Files are named `{path}.{timestamp}.{pid}` so concurrent wrappers
/// never share one.
pub fn init_tracing(log_file: Option<&Path>) {
    let Some(log_path) = log_file else {
        return;
    };

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let unique_path = unique_log_path(log_path, timestamp, std::process::id());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Ok(file) = std::fs::File::create(&unique_path) else {
        eprintln!(
            "wrap: warning: failed to create log file: {}",
            unique_path.display()
        );
        return;
    };

    let file_layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init();
}

pub fn unique_log_path(base: &Path, timestamp: u64, pid: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{}.{}", timestamp, pid));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_path_appends_timestamp_and_pid() {
        let path = unique_log_path(Path::new("/tmp/wrap.log"), 1700000000, 42);
        assert_eq!(path, PathBuf::from("/tmp/wrap.log.1700000000.42"));
    }

    #[test]
    fn unset_log_file_is_a_no_op() {
        init_tracing(None);
    }
}
