use std::error::Error;
use std::fs::File;
use std::io::{self, Write as _};

use clap::{Parser, Subcommand, ValueEnum};

use road_cad::alignment::{
    Alignment, ContinuityTolerance, HorizontalAlignment, HorizontalElement, VerticalAlignment,
};
use road_cad::cancel::CancelToken;
use road_cad::corridor::{
    sample_cross_sections, sample_ground_profile, sweep_template, OffsetRange, StationRange,
    TemplateSection,
};
use road_cad::dtm::Tin;
use road_cad::earthworks::{compute_volumes, DesignInput, EarthworksResult};
use road_cad::geometry::{Point, Point3};
use road_cad::pointset::DuplicatePolicy;
use road_import::landxml::{
    read_landxml_alignment, read_landxml_profile, read_landxml_surface, write_landxml_alignment,
    write_landxml_cross_sections, write_landxml_profile, write_landxml_surface,
};
use road_import::{
    read_lines, read_point_file, read_points_csv, read_to_string, write_string, PointFileFormat,
};

fn invalid<E>(e: E) -> io::Error
where
    E: Into<Box<dyn Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Reads a surface from LandXML (`.xml`), JSON (`.json`) or an x,y,z
/// point file triangulated on the fly.
fn read_surface(path: &str) -> io::Result<Tin> {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".xml") {
        read_landxml_surface(path)
    } else if lower.ends_with(".json") {
        serde_json::from_str(&read_to_string(path)?).map_err(invalid)
    } else {
        let pts = read_points_csv(path)?;
        Tin::from_points(pts, DuplicatePolicy::KeepFirst).map_err(invalid)
    }
}

fn write_surface(path: &str, tin: &Tin) -> io::Result<()> {
    if path.to_ascii_lowercase().ends_with(".xml") {
        write_landxml_surface(path, tin)
    } else {
        write_string(path, &serde_json::to_string_pretty(tin).map_err(invalid)?)
    }
}

/// Reads an alignment from LandXML, JSON or a CSV of x,y vertices
/// joined by tangents.
fn read_alignment(path: &str) -> io::Result<HorizontalAlignment> {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".xml") {
        read_landxml_alignment(path)
    } else if lower.ends_with(".json") {
        serde_json::from_str(&read_to_string(path)?).map_err(invalid)
    } else {
        let vertices = read_points_csv(path)?
            .iter()
            .map(|p| Point::new(p.x, p.y))
            .collect();
        HorizontalAlignment::from_tangents(0.0, vertices, ContinuityTolerance::default())
            .map_err(invalid)
    }
}

/// Reads a profile from LandXML, JSON or a CSV of station,elevation
/// PVI rows joined by grades.
fn read_profile(path: &str) -> io::Result<VerticalAlignment> {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".xml") {
        read_landxml_profile(path)
    } else if lower.ends_with(".json") {
        serde_json::from_str(&read_to_string(path)?).map_err(invalid)
    } else {
        let pvis = read_pairs_csv(path, "station,elevation")?;
        let curves = vec![0.0; pvis.len().saturating_sub(2)];
        VerticalAlignment::from_pvis(&pvis, &curves).map_err(invalid)
    }
}

fn read_pairs_csv(path: &str, expected: &str) -> io::Result<Vec<(f64, f64)>> {
    let lines = read_lines(path)?;
    let mut out = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < 2 {
            return Err(invalid(format!("line {}: expected {}", idx + 1, expected)));
        }
        let a: f64 = parts[0]
            .trim()
            .parse()
            .map_err(|e| invalid(format!("line {}: {}", idx + 1, e)))?;
        let b: f64 = parts[1]
            .trim()
            .parse()
            .map_err(|e| invalid(format!("line {}: {}", idx + 1, e)))?;
        out.push((a, b));
    }
    Ok(out)
}

fn write_polylines_csv(path: &str, polylines: &[Vec<Point3>]) -> io::Result<()> {
    let mut file = File::create(path)?;
    for (i, line) in polylines.iter().enumerate() {
        for p in line {
            writeln!(file, "{},{},{}", p.x, p.y, p.z)?;
        }
        if i + 1 < polylines.len() {
            writeln!(file)?;
        }
    }
    Ok(())
}

fn station_range(
    alignment: &HorizontalAlignment,
    from: Option<f64>,
    to: Option<f64>,
    interval: f64,
) -> StationRange {
    let full = StationRange::full(alignment, interval);
    StationRange::new(from.unwrap_or(full.from), to.unwrap_or(full.to), interval)
}

#[derive(Clone, Copy, ValueEnum)]
enum DuplicateArg {
    Reject,
    KeepFirst,
    KeepLast,
}

impl From<DuplicateArg> for DuplicatePolicy {
    fn from(arg: DuplicateArg) -> Self {
        match arg {
            DuplicateArg::Reject => DuplicatePolicy::Reject,
            DuplicateArg::KeepFirst => DuplicatePolicy::KeepFirst,
            DuplicateArg::KeepLast => DuplicatePolicy::KeepLast,
        }
    }
}

/// Command line interface for surfaces, alignments and earthworks.
#[derive(Parser)]
#[command(name = "road_cad_cli", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import survey points from a coded text file to CSV.
    ImportPoints {
        format: String,
        input: String,
        output: String,
    },
    /// Triangulate a surface from an x,y,z point file.
    BuildSurface {
        input: String,
        output: String,
        #[arg(long, value_enum, default_value_t = DuplicateArg::Reject)]
        duplicates: DuplicateArg,
    },
    /// Report the size, elevation range and areas of a surface.
    SurfaceInfo { surface: String },
    /// Interpolate the surface elevation at a point.
    Elevation { surface: String, x: f64, y: f64 },
    /// Generate contour polylines from a surface.
    Contours {
        surface: String,
        output: String,
        #[arg(long)]
        interval: f64,
        #[arg(long, default_value_t = 0)]
        smooth: usize,
    },
    /// Merge two surfaces, averaging vertices that coincide within a
    /// tolerance.
    MergeSurfaces {
        a: String,
        b: String,
        output: String,
        #[arg(long, default_value_t = 0.01)]
        tolerance: f64,
    },
    /// Report the element lengths and station range of an alignment.
    AlignmentReport { halign: String },
    /// Project a point onto an alignment as station and signed offset.
    StationOffset { halign: String, x: f64, y: f64 },
    /// Sample cross-sections through one or more surfaces along an
    /// alignment.
    Sections {
        halign: String,
        output: String,
        #[arg(required = true)]
        surfaces: Vec<String>,
        #[arg(long)]
        from: Option<f64>,
        #[arg(long)]
        to: Option<f64>,
        #[arg(long, default_value_t = 10.0)]
        interval: f64,
        #[arg(long, default_value_t = 20.0)]
        width: f64,
    },
    /// Sample the ground elevation under an alignment centerline.
    GroundProfile {
        halign: String,
        surface: String,
        #[arg(long)]
        from: Option<f64>,
        #[arg(long)]
        to: Option<f64>,
        #[arg(long, default_value_t = 10.0)]
        interval: f64,
    },
    /// Build a design surface by sweeping a template along an alignment.
    SweepTemplate {
        halign: String,
        valign: String,
        template: String,
        output: String,
        #[arg(long)]
        from: Option<f64>,
        #[arg(long)]
        to: Option<f64>,
        #[arg(long, default_value_t = 10.0)]
        interval: f64,
    },
    /// Compute cut and fill volumes between the ground and a design.
    Volumes {
        halign: String,
        ground: String,
        design: String,
        /// Treat DESIGN as a vertical profile instead of a surface.
        #[arg(long)]
        profile: bool,
        #[arg(long)]
        from: Option<f64>,
        #[arg(long)]
        to: Option<f64>,
        #[arg(long, default_value_t = 10.0)]
        interval: f64,
        #[arg(long, default_value_t = 20.0)]
        width: f64,
    },
    /// Print the mass haul diagram between the ground and a design.
    MassHaul {
        halign: String,
        ground: String,
        design: String,
        /// Treat DESIGN as a vertical profile instead of a surface.
        #[arg(long)]
        profile: bool,
        #[arg(long)]
        from: Option<f64>,
        #[arg(long)]
        to: Option<f64>,
        #[arg(long, default_value_t = 10.0)]
        interval: f64,
        #[arg(long, default_value_t = 20.0)]
        width: f64,
    },
    /// Convert a surface, alignment or profile from JSON to LandXML.
    ExportLandxml {
        kind: String,
        input: String,
        output: String,
    },
    /// Convert a surface, alignment or profile from LandXML to JSON.
    ImportLandxml {
        kind: String,
        input: String,
        output: String,
    },
}

fn volumes_input(
    halign: &str,
    ground: &str,
    design: &str,
    profile: bool,
    from: Option<f64>,
    to: Option<f64>,
    interval: f64,
    width: f64,
) -> Result<EarthworksResult, Box<dyn Error>> {
    let alignment = read_alignment(halign)?;
    let ground_tin = read_surface(ground)?;
    let range = station_range(&alignment, from, to, interval);
    let offsets = OffsetRange::symmetric(width / 2.0);
    let cancel = CancelToken::new();
    let result = if profile {
        let design_profile = read_profile(design)?;
        compute_volumes(
            &alignment,
            &ground_tin,
            DesignInput::Profile(&design_profile),
            &range,
            &offsets,
            &cancel,
        )?
    } else {
        let design_tin = read_surface(design)?;
        compute_volumes(
            &alignment,
            &ground_tin,
            DesignInput::Surface(&design_tin),
            &range,
            &offsets,
            &cancel,
        )?
    };
    Ok(result)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_default_env().init();
    let cli = Cli::parse();
    match cli.command {
        Commands::ImportPoints {
            format,
            input,
            output,
        } => {
            let Some(fmt) = PointFileFormat::from_str(&format) else {
                return Err(format!("unknown point file format {format}").into());
            };
            let points = read_point_file(&input, fmt)?;
            let mut file = File::create(&output)?;
            for p in &points {
                if let Some(code) = p.code {
                    write!(file, "{code}")?;
                }
                write!(file, ",{},{},{}", p.position.x, p.position.y, p.position.z)?;
                match &p.description {
                    Some(desc) => writeln!(file, ",{desc}")?,
                    None => writeln!(file)?,
                }
            }
            println!("Imported {} points to {}", points.len(), output);
        }
        Commands::BuildSurface {
            input,
            output,
            duplicates,
        } => {
            let pts = read_points_csv(&input)?;
            let tin = Tin::from_points(pts, duplicates.into())?;
            write_surface(&output, &tin)?;
            println!("Wrote {}", output);
        }
        Commands::SurfaceInfo { surface } => {
            let tin = read_surface(&surface)?;
            println!("Vertices: {}", tin.vertices().len());
            println!("Triangles: {}", tin.triangles().len());
            if let Some((lo, hi)) = tin.elevation_range() {
                println!("Elevation range: {:.3} to {:.3}", lo, hi);
            }
            println!("Plan area: {:.3}", tin.plan_area());
            println!("Surface area: {:.3}", tin.surface_area());
        }
        Commands::Elevation { surface, x, y } => {
            let tin = read_surface(&surface)?;
            match tin.elevation_at(x, y) {
                Some(z) => println!("Elevation: {:.3}", z),
                None => println!("Point is outside the surface"),
            }
        }
        Commands::Contours {
            surface,
            output,
            interval,
            smooth,
        } => {
            let tin = read_surface(&surface)?;
            let lines = tin.contour_polylines(interval, smooth);
            write_polylines_csv(&output, &lines)?;
            println!("Wrote {} contours to {}", lines.len(), output);
        }
        Commands::MergeSurfaces {
            a,
            b,
            output,
            tolerance,
        } => {
            let merged = read_surface(&a)?.merge_with(&read_surface(&b)?, tolerance)?;
            write_surface(&output, &merged)?;
            println!("Wrote {}", output);
        }
        Commands::AlignmentReport { halign } => {
            let alignment = read_alignment(&halign)?;
            println!(
                "Stations {:.3} to {:.3}, length {:.3}",
                alignment.start_station(),
                alignment.end_station(),
                alignment.length()
            );
            for element in alignment.elements() {
                match element {
                    HorizontalElement::Tangent { .. } => {
                        println!("tangent length {:.3}", element.length());
                    }
                    HorizontalElement::Curve { arc } => {
                        println!("curve radius {:.3} length {:.3}", arc.radius, element.length());
                    }
                    HorizontalElement::Spiral { spiral } => {
                        println!(
                            "spiral radius {} to {} length {:.3}",
                            spiral.start_radius,
                            spiral.end_radius,
                            element.length()
                        );
                    }
                }
            }
        }
        Commands::StationOffset { halign, x, y } => {
            let alignment = read_alignment(&halign)?;
            match alignment.station_offset_of(x, y) {
                Ok((station, offset)) => {
                    println!("Station: {:.3} Offset: {:.3}", station, offset);
                }
                Err(e) => println!("{e}"),
            }
        }
        Commands::Sections {
            halign,
            output,
            surfaces,
            from,
            to,
            interval,
            width,
        } => {
            let alignment = read_alignment(&halign)?;
            let tins: Vec<Tin> = surfaces
                .iter()
                .map(|p| read_surface(p))
                .collect::<io::Result<_>>()?;
            let refs: Vec<&Tin> = tins.iter().collect();
            let range = station_range(&alignment, from, to, interval);
            let offsets = OffsetRange::symmetric(width / 2.0);
            let sections =
                sample_cross_sections(&alignment, &refs, &range, &offsets, &CancelToken::new())?;
            if output.to_ascii_lowercase().ends_with(".xml") {
                write_landxml_cross_sections(&output, &sections)?;
            } else {
                write_string(&output, &serde_json::to_string_pretty(&sections)?)?;
            }
            println!("Wrote {} sections to {}", sections.len(), output);
        }
        Commands::GroundProfile {
            halign,
            surface,
            from,
            to,
            interval,
        } => {
            let alignment = read_alignment(&halign)?;
            let tin = read_surface(&surface)?;
            let range = station_range(&alignment, from, to, interval);
            for (station, elev) in
                sample_ground_profile(&alignment, &tin, &range, &CancelToken::new())?
            {
                match elev {
                    Some(z) => println!("{:.3},{:.3}", station, z),
                    None => println!("{:.3},-", station),
                }
            }
        }
        Commands::SweepTemplate {
            halign,
            valign,
            template,
            output,
            from,
            to,
            interval,
        } => {
            let horizontal = read_alignment(&halign)?;
            let vertical = read_profile(&valign)?;
            let section = TemplateSection::new(read_pairs_csv(&template, "offset,elevation")?);
            let range = station_range(&horizontal, from, to, interval);
            let alignment = Alignment::new(horizontal, vertical);
            let tin = sweep_template(&alignment, &section, &range, &CancelToken::new())?;
            write_surface(&output, &tin)?;
            println!("Wrote {}", output);
        }
        Commands::Volumes {
            halign,
            ground,
            design,
            profile,
            from,
            to,
            interval,
            width,
        } => {
            let result =
                volumes_input(&halign, &ground, &design, profile, from, to, interval, width)?;
            println!("Cut: {:.3}", result.cut_volume);
            println!("Fill: {:.3}", result.fill_volume);
            println!("Net: {:.3}", result.net_volume());
            let gaps = result.stations.iter().filter(|s| !s.gaps.is_empty()).count();
            if gaps > 0 {
                println!("Coverage gaps at {} of {} stations", gaps, result.stations.len());
            }
        }
        Commands::MassHaul {
            halign,
            ground,
            design,
            profile,
            from,
            to,
            interval,
            width,
        } => {
            let result =
                volumes_input(&halign, &ground, &design, profile, from, to, interval, width)?;
            for (station, volume) in result.mass_haul() {
                println!("{:.3},{:.3}", station, volume);
            }
        }
        Commands::ExportLandxml {
            kind,
            input,
            output,
        } => {
            match kind.as_str() {
                "surface" => {
                    let tin: Tin = serde_json::from_str(&read_to_string(&input)?)?;
                    write_landxml_surface(&output, &tin)?;
                }
                "alignment" => {
                    let alignment: HorizontalAlignment =
                        serde_json::from_str(&read_to_string(&input)?)?;
                    write_landxml_alignment(&output, &alignment)?;
                }
                "profile" => {
                    let profile: VerticalAlignment =
                        serde_json::from_str(&read_to_string(&input)?)?;
                    write_landxml_profile(&output, &profile)?;
                }
                _ => {
                    return Err(
                        format!("unknown kind {kind}, expected surface, alignment or profile")
                            .into(),
                    );
                }
            }
            println!("Wrote {}", output);
        }
        Commands::ImportLandxml {
            kind,
            input,
            output,
        } => {
            let json = match kind.as_str() {
                "surface" => serde_json::to_string_pretty(&read_landxml_surface(&input)?)?,
                "alignment" => serde_json::to_string_pretty(&read_landxml_alignment(&input)?)?,
                "profile" => serde_json::to_string_pretty(&read_landxml_profile(&input)?)?,
                _ => {
                    return Err(
                        format!("unknown kind {kind}, expected surface, alignment or profile")
                            .into(),
                    );
                }
            };
            write_string(&output, &json)?;
            println!("Wrote {}", output);
        }
    }
    Ok(())
}
