use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};

/// Everything that controls how charts are drawn and where they land.
///
/// Built once per run and passed to every chart function.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub output_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Prefix that keeps one day's charts apart from the next, `YYYYMMDD`.
    pub stamp: String,
}

impl RenderConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self::for_date(output_dir, Local::now().date_naive())
    }

    pub fn for_date(output_dir: impl Into<PathBuf>, date: NaiveDate) -> Self {
        Self {
            output_dir: output_dir.into(),
            width: 1400,
            height: 800,
            stamp: date.format("%Y%m%d").to_string(),
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `{output_dir}/{stamp}_{subject}_{name}.svg`, creating the directory if needed.
    pub fn chart_path(&self, subject: &str, name: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let subject: String = subject
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        Ok(self.output_dir.join(format!("{}_{}_{}.svg", self.stamp, subject, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_path_is_stamped_and_sanitised() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RenderConfig::for_date(dir.path(), NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
        let path = cfg.chart_path("399006.SZ Daily", "harmonic").unwrap();
        assert_eq!(path.file_name().unwrap(), "20250304_399006.SZ_Daily_harmonic.svg");
        assert!(dir.path().exists());
    }
}
