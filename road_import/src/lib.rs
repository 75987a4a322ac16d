//! File import and export for survey and interchange data.
//!
//! Readers hand fully validated values to the computation core;
//! malformed content surfaces as `io::ErrorKind::InvalidData`.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Read, Write};

use road_cad::geometry::Point3;
use road_cad::pointset::SurveyPoint;

pub mod landxml;

/// Reads a file to string.
pub fn read_to_string(path: &str) -> io::Result<String> {
    let mut buffer = String::new();
    File::open(path)?.read_to_string(&mut buffer)?;
    Ok(buffer)
}

/// Reads a file as a list of lines.
pub fn read_lines(path: &str) -> io::Result<Vec<String>> {
    Ok(read_to_string(path)?.lines().map(str::to_string).collect())
}

/// Writes a string to a file, creating or truncating it.
pub fn write_string(path: &str, content: &str) -> io::Result<()> {
    File::create(path)?.write_all(content.as_bytes())
}

/// Column orders understood by [`read_point_file`]: P point number,
/// N northing (y), E easting (x), Z elevation, D description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointFileFormat {
    PNEZD,
    PENZD,
    PNEZ,
    PENZ,
    NEZ,
    ENZ,
    NEZD,
    ENZD,
}

impl PointFileFormat {
    /// Parses a format name. Case insensitive.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pnezd" => Some(Self::PNEZD),
            "penzd" => Some(Self::PENZD),
            "pnez" => Some(Self::PNEZ),
            "penz" => Some(Self::PENZ),
            "nez" => Some(Self::NEZ),
            "enz" => Some(Self::ENZ),
            "nezd" => Some(Self::NEZD),
            "enzd" => Some(Self::ENZD),
            _ => None,
        }
    }

    /// (leading point number, northing before easting, trailing description)
    fn layout(self) -> (bool, bool, bool) {
        match self {
            Self::PNEZD => (true, true, true),
            Self::PENZD => (true, false, true),
            Self::PNEZ => (true, true, false),
            Self::PENZ => (true, false, false),
            Self::NEZ => (false, true, false),
            Self::ENZ => (false, false, false),
            Self::NEZD => (false, true, true),
            Self::ENZD => (false, false, true),
        }
    }
}

/// Reads a survey point file in the given column order. Rows may be
/// comma or whitespace delimited; blank lines are skipped. Coordinates
/// must parse, the point number is kept only when numeric, and any
/// trailing fields of description formats are joined into one string.
pub fn read_point_file(path: &str, format: PointFileFormat) -> io::Result<Vec<SurveyPoint>> {
    let (numbered, north_first, described) = format.layout();
    let required = 3 + usize::from(numbered);
    let mut pts = Vec::new();
    for line in read_lines(path)? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = if line.contains(',') {
            line.split(',').collect()
        } else {
            line.split_whitespace().collect()
        };
        if fields.len() < required {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected at least {required} fields, got {}", fields.len()),
            ));
        }
        let parse = |s: &str| {
            s.trim()
                .parse::<f64>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        };
        let code = if numbered {
            fields[0].trim().parse::<u32>().ok()
        } else {
            None
        };
        let base = usize::from(numbered);
        let (a, b) = (parse(fields[base])?, parse(fields[base + 1])?);
        let (e, n) = if north_first { (b, a) } else { (a, b) };
        let z = parse(fields[base + 2])?;
        let description = if described && fields.len() > required {
            Some(fields[required..].join(" ").trim().to_string())
        } else {
            None
        };
        pts.push(SurveyPoint::with_attributes(
            Point3::new(e, n, z),
            code,
            description,
        ));
    }
    Ok(pts)
}

/// Reads a CSV file of `x,y,z` rows into [`Point3`]s.
pub fn read_points_csv(path: &str) -> io::Result<Vec<Point3>> {
    let mut pts = Vec::new();
    for line in read_lines(path)? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 3 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "expected x,y,z per row",
            ));
        }
        let parse = |s: &str| {
            s.trim()
                .parse::<f64>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        };
        pts.push(Point3::new(
            parse(fields[0])?,
            parse(fields[1])?,
            parse(fields[2])?,
        ));
    }
    Ok(pts)
}

/// Writes points as `x,y,z` CSV rows.
pub fn write_points_csv(path: &str, points: &[Point3]) -> io::Result<()> {
    let mut out = String::new();
    for p in points {
        writeln!(&mut out, "{},{},{}", p.x, p.y, p.z).unwrap();
    }
    write_string(path, &out)
}
