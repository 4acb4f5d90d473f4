// config.rs
use console::style;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::rotation::RotationPolicy;

pub const DEFAULT_LOG_DIR: &str = "/app/logs";
pub const DEFAULT_FILE_NAME: &str = "system_logs.json";
pub const DEFAULT_MAX_BYTES: u64 = 5_000_000;
pub const DEFAULT_BACKUP_COUNT: usize = 5;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub log_dir: PathBuf,
    pub file_name: String,
    pub max_bytes: u64,
    pub backup_count: usize,
    // Pretty-print every entry to stdout
    pub echo_stdout: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            file_name: DEFAULT_FILE_NAME.to_string(),
            max_bytes: DEFAULT_MAX_BYTES,
            backup_count: DEFAULT_BACKUP_COUNT,
            echo_stdout: true,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Config rooted at `log_dir`, everything else default.
    pub fn in_dir<P: Into<PathBuf>>(log_dir: P) -> Self {
        Config {
            log_dir: log_dir.into(),
            ..Config::default()
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.file_name)
    }

    pub fn policy(&self) -> RotationPolicy {
        RotationPolicy::new(self.max_bytes, self.backup_count)
    }

    pub fn print_info(&self) {
        println!("\n\t{}", style("QUERY LOG:").cyan().bold());
        println!(
            "\t  {} {}",
            style("file:").blue(),
            style(self.log_path().display()).magenta()
        );
        println!(
            "\t  {} {} bytes, {} {}",
            style("rotation:").blue(),
            style(self.max_bytes).green(),
            style(self.backup_count).green(),
            style("archives").dim()
        );
        if !self.echo_stdout {
            println!("\t  {}", style("stdout echo disabled").dim());
        }
    }
}
