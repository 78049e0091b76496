//! Node configuration.
//!
//! The host builds one options struct per node and hands it to the node's
//! constructor. Both structs follow the same builder shape:
//!
//! ```
//! use stillframe::{SnapshotOptions, WatermarkOptions};
//!
//! let snapshot = SnapshotOptions::default()
//!     .directory("captures")
//!     .filename("first.png");
//! assert_eq!(snapshot.target_path(), std::path::Path::new("captures/first.png"));
//!
//! let watermark = WatermarkOptions::new("logo.png")
//!     .rate(stillframe::parse_frame_rate("10").unwrap());
//! assert_eq!(watermark.time_base().denominator(), 10);
//! ```

use std::path::{Path, PathBuf};

use ffmpeg_next::Rational;

use crate::error::StillFrameError;

/// Default directory snapshots are written into.
pub const DEFAULT_SNAPSHOT_DIRECTORY: &str = "snapshot";
/// Default snapshot file name.
pub const DEFAULT_SNAPSHOT_FILENAME: &str = "snapshot.png";
/// Default synthetic frame rate of the watermark source (frames per second).
pub const DEFAULT_WATERMARK_RATE: i32 = 25;

/// Options for [`SnapshotEncoder`](crate::SnapshotEncoder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Directory that receives snapshot files. Created on first use.
    pub directory: PathBuf,
    /// File name of the next snapshot. Its extension selects the container
    /// and encoder.
    pub filename: String,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_SNAPSHOT_DIRECTORY),
            filename: DEFAULT_SNAPSHOT_FILENAME.to_string(),
        }
    }
}

impl SnapshotOptions {
    /// Set the output directory.
    #[must_use]
    pub fn directory<P: Into<PathBuf>>(mut self, directory: P) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the snapshot file name.
    #[must_use]
    pub fn filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.filename = filename.into();
        self
    }

    /// The full path the next snapshot will be written to.
    pub fn target_path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }
}

/// Options for [`CachedFrameSource`](crate::CachedFrameSource).
#[derive(Debug, Clone)]
pub struct WatermarkOptions {
    /// Media file holding the watermark image. Required.
    pub filename: Option<PathBuf>,
    /// Synthetic output frame rate.
    pub rate: Rational,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            filename: None,
            rate: Rational::new(DEFAULT_WATERMARK_RATE, 1),
        }
    }
}

impl WatermarkOptions {
    /// Options for the given watermark file at the default rate.
    pub fn new<P: Into<PathBuf>>(filename: P) -> Self {
        Self::default().filename(filename)
    }

    /// Set the watermark file.
    #[must_use]
    pub fn filename<P: Into<PathBuf>>(mut self, filename: P) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the synthetic frame rate.
    #[must_use]
    pub fn rate(mut self, rate: Rational) -> Self {
        self.rate = rate;
        self
    }

    /// Output time base: one tick per synthetic frame.
    pub fn time_base(&self) -> Rational {
        self.rate.invert()
    }

    /// The configured file, or a [`StillFrameError::ConfigError`] when unset or empty.
    pub(crate) fn require_filename(&self) -> Result<&Path, StillFrameError> {
        match self.filename.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(StillFrameError::ConfigError(
                "no watermark filename provided".to_string(),
            )),
        }
    }
}

/// Named rates understood in addition to numeric forms.
const RATE_ABBREVIATIONS: &[(&str, i32, i32)] = &[
    ("ntsc", 30000, 1001),
    ("pal", 25, 1),
    ("qntsc", 30000, 1001),
    ("qpal", 25, 1),
    ("sntsc", 30000, 1001),
    ("spal", 25, 1),
    ("film", 24, 1),
    ("ntsc-film", 24000, 1001),
];

/// Parse a frame rate such as `25`, `30000/1001`, `24:1`, `29.97`, or `ntsc`.
///
/// # Errors
///
/// Returns [`StillFrameError::ConfigError`] for malformed, zero, or negative
/// rates.
pub fn parse_frame_rate(value: &str) -> Result<Rational, StillFrameError> {
    let trimmed = value.trim();
    let invalid = || StillFrameError::ConfigError(format!("invalid frame rate: {value:?}"));

    if let Some(&(_, numerator, denominator)) = RATE_ABBREVIATIONS
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(trimmed))
    {
        return Ok(Rational::new(numerator, denominator));
    }

    let rate = if let Some((numerator, denominator)) = trimmed.split_once(['/', ':']) {
        let numerator: i32 = numerator.trim().parse().map_err(|_| invalid())?;
        let denominator: i32 = denominator.trim().parse().map_err(|_| invalid())?;
        if denominator <= 0 {
            return Err(invalid());
        }
        Rational::new(numerator, denominator)
    } else if let Ok(whole) = trimmed.parse::<i32>() {
        Rational::new(whole, 1)
    } else {
        let seconds: f64 = trimmed.parse().map_err(|_| invalid())?;
        if !seconds.is_finite() {
            return Err(invalid());
        }
        Rational::from(seconds)
    };

    if rate.numerator() <= 0 || rate.denominator() <= 0 {
        return Err(invalid());
    }
    Ok(rate.reduce())
}
