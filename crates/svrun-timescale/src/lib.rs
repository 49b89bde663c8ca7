//! Timescale detection and timeout conversion
//!
//! SystemVerilog sources declare their local time resolution with a
//! `` `timescale <unit> / <precision> `` directive, and different files in
//! the same test are allowed to disagree. A timeout authored once in the
//! project configuration (e.g. "50us") must mean the same real duration no
//! matter which file declared what resolution, so every timeout is converted
//! into a count of the *effective* timescale's units before it is handed to
//! a simulator. Interpreting "100us" as 100 raw units in a 1 ps testbench
//! would hand the design a 100 ps watchdog, which is the exact bug this
//! crate exists to prevent.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors from timescale detection and timeout conversion
#[derive(Debug, Error)]
pub enum TimescaleError {
    /// Source file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A `timescale directive was present but unparsable
    #[error("malformed timescale directive in {path}: `{directive}`")]
    MalformedDirective { path: PathBuf, directive: String },

    /// Time specification string did not match `<magnitude><unit>`
    #[error("invalid time specification `{0}`: expected <number><unit> (e.g. \"50us\", \"10000ns\")")]
    InvalidTimeSpec(String),

    /// Unit token was not one of s/ms/us/ns/ps/fs
    #[error("unrecognized time unit `{0}`")]
    UnknownUnit(String),

    /// Magnitude must be strictly positive
    #[error("non-positive time magnitude in `{0}`")]
    NonPositive(String),

    /// Conversion rounded to zero timescale units
    #[error("timeout `{timeout}` is below one timescale unit of {unit}")]
    BelowResolution { timeout: String, unit: String },
}

/// Result type for timescale operations
pub type Result<T> = std::result::Result<T, TimescaleError>;

/// Seconds-derived time unit as written in SystemVerilog sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    S,
    Ms,
    Us,
    Ns,
    Ps,
    Fs,
}

impl TimeUnit {
    /// Conversion factor to seconds
    pub fn factor(&self) -> f64 {
        match self {
            TimeUnit::S => 1.0,
            TimeUnit::Ms => 1e-3,
            TimeUnit::Us => 1e-6,
            TimeUnit::Ns => 1e-9,
            TimeUnit::Ps => 1e-12,
            TimeUnit::Fs => 1e-15,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::S => "s",
            TimeUnit::Ms => "ms",
            TimeUnit::Us => "us",
            TimeUnit::Ns => "ns",
            TimeUnit::Ps => "ps",
            TimeUnit::Fs => "fs",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = TimescaleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "s" => Ok(TimeUnit::S),
            "ms" => Ok(TimeUnit::Ms),
            "us" => Ok(TimeUnit::Us),
            "ns" => Ok(TimeUnit::Ns),
            "ps" => Ok(TimeUnit::Ps),
            "fs" => Ok(TimeUnit::Fs),
            other => Err(TimescaleError::UnknownUnit(other.to_string())),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A magnitude plus unit, e.g. `1ns` or `100fs`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeValue {
    pub magnitude: f64,
    pub unit: TimeUnit,
}

impl TimeValue {
    pub fn new(magnitude: f64, unit: TimeUnit) -> Self {
        Self { magnitude, unit }
    }

    /// Value expressed in seconds
    pub fn seconds(&self) -> f64 {
        self.magnitude * self.unit.factor()
    }
}

impl FromStr for TimeValue {
    type Err = TimescaleError;

    fn from_str(s: &str) -> Result<Self> {
        static TIME_RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^(\d+\.?\d*)\s*(fs|ps|ns|us|ms|s)$").expect("time spec regex")
        });

        let caps = TIME_RE
            .captures(s.trim())
            .ok_or_else(|| TimescaleError::InvalidTimeSpec(s.to_string()))?;

        let magnitude: f64 = caps[1]
            .parse()
            .map_err(|_| TimescaleError::InvalidTimeSpec(s.to_string()))?;
        if magnitude <= 0.0 {
            return Err(TimescaleError::NonPositive(s.to_string()));
        }
        let unit = caps[2].parse()?;

        Ok(TimeValue { magnitude, unit })
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.magnitude.fract() == 0.0 {
            write!(f, "{}{}", self.magnitude as u64, self.unit)
        } else {
            write!(f, "{}{}", self.magnitude, self.unit)
        }
    }
}

/// A (time-unit, time-precision) pair as declared per source file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timescale {
    pub unit: TimeValue,
    pub precision: TimeValue,
}

impl Timescale {
    pub fn new(unit: TimeValue, precision: TimeValue) -> Self {
        Self { unit, precision }
    }
}

impl Default for Timescale {
    /// Verilator's default of 1 ns / 1 ps
    fn default() -> Self {
        Timescale {
            unit: TimeValue::new(1.0, TimeUnit::Ns),
            precision: TimeValue::new(1.0, TimeUnit::Ps),
        }
    }
}

impl fmt::Display for Timescale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.unit, self.precision)
    }
}

static TIMESCALE_RE: Lazy<Regex> = Lazy::new(|| {
    // Tolerates whitespace variations and coefficients, e.g.
    // `timescale 1ns / 1ps, `timescale 1ps/1fs, `timescale 100 fs / 1 fs
    Regex::new(r"^`timescale\s+(\d+\.?\d*\s*\w+)\s*/\s*(\d+\.?\d*\s*\w+)")
        .expect("timescale directive regex")
});

/// Scan a source file's directives for its first timescale declaration.
///
/// Returns `Ok(None)` when the file declares no timescale. Fails only when
/// the file is unreadable or a directive is present but malformed.
pub fn detect_timescale(path: &Path) -> Result<Option<Timescale>> {
    let contents = std::fs::read_to_string(path).map_err(|source| TimescaleError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    for line in contents.lines() {
        let line = line.trim();
        let Some(caps) = TIMESCALE_RE.captures(line) else {
            continue;
        };

        let unit_tok: String = caps[1].split_whitespace().collect();
        let prec_tok: String = caps[2].split_whitespace().collect();

        let parse = |tok: &str| {
            tok.parse::<TimeValue>()
                .map_err(|_| TimescaleError::MalformedDirective {
                    path: path.to_path_buf(),
                    directive: line.to_string(),
                })
        };
        let timescale = Timescale::new(parse(&unit_tok)?, parse(&prec_tok)?);
        tracing::debug!(file = %path.display(), %timescale, "detected timescale");
        return Ok(Some(timescale));
    }

    Ok(None)
}

/// Convert a human-readable timeout into a count of timescale units.
///
/// `convert_timeout("50us", 1ns)` is 50000; `convert_timeout("50us", 1ps)`
/// is 50000000. Rounds rather than truncates so timeouts that do not divide
/// evenly into the unit are never systematically underestimated.
pub fn convert_timeout(spec: &str, timescale_unit: &TimeValue) -> Result<u64> {
    let timeout: TimeValue = spec.parse()?;

    let units = timeout.seconds() / timescale_unit.seconds();
    let rounded = units.round();
    if rounded < 1.0 {
        return Err(TimescaleError::BelowResolution {
            timeout: spec.to_string(),
            unit: timescale_unit.to_string(),
        });
    }

    Ok(rounded as u64)
}

/// Parse a wall-clock timeout such as "5s" or "100ms" into a [`Duration`].
///
/// This is the real-time regime (freeze protection for hung simulator
/// processes), distinct from the simulated-time conversion above; sub-ns
/// wall-clock bounds are meaningless, so only ns and coarser are accepted.
pub fn parse_wall_timeout(spec: &str) -> Result<Duration> {
    let value: TimeValue = spec.parse()?;
    match value.unit {
        TimeUnit::Ps | TimeUnit::Fs => Err(TimescaleError::UnknownUnit(format!(
            "{} (wall-clock timeouts must be ns or coarser)",
            value.unit
        ))),
        _ => Ok(Duration::from_secs_f64(value.seconds())),
    }
}

/// Role a source file plays in a test, for mismatch reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Testbench,
    Rtl,
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileRole::Testbench => f.write_str("testbench"),
            FileRole::Rtl => f.write_str("RTL"),
        }
    }
}

/// One file whose declared timescale disagrees with its peers
#[derive(Debug, Clone, PartialEq)]
pub struct TimescaleMismatch {
    pub role: FileRole,
    pub path: PathBuf,
    pub unit: TimeValue,
}

impl fmt::Display for TimescaleMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<10} {} declares timescale unit {}",
            self.role.to_string(),
            self.path.display(),
            self.unit
        )
    }
}

/// Check timescale consistency across every source participating in a test.
///
/// Returns one entry per declaring file when more than one distinct unit is
/// in play, and an empty list otherwise. Mixed timescales are tolerated by
/// the simulators themselves, so this is a warning, never an abort; the
/// testbench's unit is what timeout conversion uses either way.
pub fn validate_consistency(testbench: &Path, rtl_files: &[PathBuf]) -> Vec<TimescaleMismatch> {
    let mut declared = Vec::new();

    if let Ok(Some(ts)) = detect_timescale(testbench) {
        declared.push(TimescaleMismatch {
            role: FileRole::Testbench,
            path: testbench.to_path_buf(),
            unit: ts.unit,
        });
    }
    for rtl in rtl_files {
        if let Ok(Some(ts)) = detect_timescale(rtl) {
            declared.push(TimescaleMismatch {
                role: FileRole::Rtl,
                path: rtl.clone(),
                unit: ts.unit,
            });
        }
    }

    let mut units: Vec<TimeValue> = Vec::new();
    for entry in &declared {
        if !units.contains(&entry.unit) {
            units.push(entry.unit);
        }
    }
    if units.len() > 1 {
        declared
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn unit(magnitude: f64, unit: TimeUnit) -> TimeValue {
        TimeValue::new(magnitude, unit)
    }

    #[test]
    fn converts_50us_against_1ns() {
        let n = convert_timeout("50us", &unit(1.0, TimeUnit::Ns)).unwrap();
        assert_eq!(n, 50_000);
    }

    #[test]
    fn converts_100us_against_1ps() {
        let n = convert_timeout("100us", &unit(1.0, TimeUnit::Ps)).unwrap();
        assert_eq!(n, 100_000_000);
    }

    #[test]
    fn converts_10ns_against_100fs() {
        // 10ns / 100fs = 100000, exercising a non-unit coefficient
        let n = convert_timeout("10ns", &unit(100.0, TimeUnit::Fs)).unwrap();
        assert_eq!(n, 100_000);
    }

    #[test]
    fn conversion_rounds_instead_of_truncating() {
        // 1us / 3ns = 333.33..., must round to 333 not truncate after
        // floating error; 0.9999999 style residue must not lose a unit.
        let n = convert_timeout("1us", &unit(3.0, TimeUnit::Ns)).unwrap();
        assert_eq!(n, 333);
        let n = convert_timeout("50us", &unit(1.0, TimeUnit::Ns)).unwrap();
        assert_eq!(n, 50_000);
    }

    #[test]
    fn conversion_rejects_bad_specs() {
        let ns = unit(1.0, TimeUnit::Ns);
        assert!(matches!(
            convert_timeout("50 parsecs", &ns),
            Err(TimescaleError::InvalidTimeSpec(_))
        ));
        assert!(matches!(
            convert_timeout("0us", &ns),
            Err(TimescaleError::NonPositive(_))
        ));
        // 1fs in a 1ns-unit file rounds to zero units
        assert!(matches!(
            convert_timeout("1fs", &ns),
            Err(TimescaleError::BelowResolution { .. })
        ));
    }

    #[test]
    fn detects_standard_directive() {
        let file = sv_file("`timescale 1ns / 1ps\nmodule tb; endmodule\n");
        let ts = detect_timescale(file.path()).unwrap().unwrap();
        assert_eq!(ts.unit, unit(1.0, TimeUnit::Ns));
        assert_eq!(ts.precision, unit(1.0, TimeUnit::Ps));
    }

    #[test]
    fn detects_compact_and_coefficient_forms() {
        let file = sv_file("`timescale 1ps/1fs\n");
        let ts = detect_timescale(file.path()).unwrap().unwrap();
        assert_eq!(ts.unit, unit(1.0, TimeUnit::Ps));

        let file = sv_file("// header\n`timescale 100 fs / 1 fs\n");
        let ts = detect_timescale(file.path()).unwrap().unwrap();
        assert_eq!(ts.unit, unit(100.0, TimeUnit::Fs));
        assert_eq!(ts.precision, unit(1.0, TimeUnit::Fs));
    }

    #[test]
    fn absent_directive_is_none() {
        let file = sv_file("module design; endmodule\n");
        assert!(detect_timescale(file.path()).unwrap().is_none());
    }

    #[test]
    fn malformed_directive_is_an_error() {
        let file = sv_file("`timescale 1xs / 1ps\n");
        assert!(matches!(
            detect_timescale(file.path()),
            Err(TimescaleError::MalformedDirective { .. })
        ));
    }

    #[test]
    fn first_directive_wins() {
        let file = sv_file("`timescale 1ns / 1ps\n`timescale 1ps / 1fs\n");
        let ts = detect_timescale(file.path()).unwrap().unwrap();
        assert_eq!(ts.unit, unit(1.0, TimeUnit::Ns));
    }

    #[test]
    fn wall_timeout_units() {
        assert_eq!(parse_wall_timeout("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(
            parse_wall_timeout("100ms").unwrap(),
            Duration::from_millis(100)
        );
        assert_eq!(
            parse_wall_timeout("10000ns").unwrap(),
            Duration::from_nanos(10_000)
        );
        assert!(parse_wall_timeout("1ps").is_err());
        assert!(parse_wall_timeout("fast").is_err());
    }

    #[test]
    fn consistent_sources_produce_no_warnings() {
        let tb = sv_file("`timescale 1ns / 1ps\n");
        let rtl = sv_file("`timescale 1ns / 1ps\n");
        let warnings = validate_consistency(tb.path(), &[rtl.path().to_path_buf()]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn mixed_timescales_identify_every_declaring_file() {
        let tb = sv_file("`timescale 1ns / 1ps\n");
        let rtl_a = sv_file("`timescale 1ps / 1fs\n");
        let rtl_b = sv_file("module m; endmodule\n");
        let warnings = validate_consistency(
            tb.path(),
            &[rtl_a.path().to_path_buf(), rtl_b.path().to_path_buf()],
        );
        // Both declaring files are listed; the silent one is not.
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].role, FileRole::Testbench);
        assert_eq!(warnings[1].role, FileRole::Rtl);
        assert_eq!(warnings[1].unit, unit(1.0, TimeUnit::Ps));
    }
}
