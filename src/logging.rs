use chrono::Local;
use env_logger::{Builder, Env, Target};
use log::debug;
use std::io::Write;

/// Sets up diagnostic logging on stderr. Stdout is left to the JSON echo of
/// the query log. `RUST_LOG` overrides `default_level`.
pub fn init_logging(default_level: &str) {
    let env = Env::default()
        .filter_or("RUST_LOG", default_level)
        .write_style_or("RUST_LOG_STYLE", "auto");

    // Initialize the logger with custom format
    let result = Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(Target::Stderr)
        .try_init();

    // A second call keeps the logger that is already installed
    if result.is_err() {
        debug!("Diagnostic logger already initialized");
    }
}
