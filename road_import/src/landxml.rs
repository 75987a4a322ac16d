//! LandXML interchange for surfaces, alignments, profiles and
//! cross-sections.
//!
//! Readers rebuild core values through their validating constructors,
//! so a file that parses but describes inconsistent geometry still
//! fails with `InvalidData`.

use std::f64::consts::TAU;
use std::fmt::Write as _;
use std::io;

use roxmltree::{Document, Node};

use road_cad::alignment::{
    ContinuityTolerance, HorizontalAlignment, HorizontalElement, Spiral, VerticalAlignment,
    VerticalElement,
};
use road_cad::corridor::CrossSection;
use road_cad::dtm::Tin;
use road_cad::geometry::{Arc, Point, Point3};

use crate::{read_to_string, write_string};

fn invalid<E>(e: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, e)
}

fn attr_f64(node: Node<'_, '_>, name: &str) -> Option<f64> {
    node.attribute(name).and_then(|v| v.parse().ok())
}

fn text_point(text: Option<&str>) -> Option<Point> {
    let vals: Vec<f64> = text?
        .split_whitespace()
        .filter_map(|s| s.parse().ok())
        .collect();
    (vals.len() >= 2).then(|| Point::new(vals[0], vals[1]))
}

fn child_point(node: Node<'_, '_>, tag: &str) -> Option<Point> {
    node.children()
        .find(|c| c.has_tag_name(tag))
        .and_then(|n| text_point(n.text()))
}

/// Reads a LandXML surface (`Pnts` and 1-based `Faces`) into a [`Tin`].
pub fn read_landxml_surface(path: &str) -> io::Result<Tin> {
    let xml = read_to_string(path)?;
    let doc = Document::parse(&xml).map_err(invalid)?;
    let mut vertices = Vec::new();
    if let Some(pnts) = doc.descendants().find(|n| n.has_tag_name("Pnts")) {
        for p in pnts.children().filter(|c| c.has_tag_name("P")) {
            if let Some(text) = p.text() {
                let nums: Vec<f64> = text
                    .split_whitespace()
                    .filter_map(|s| s.parse().ok())
                    .collect();
                if nums.len() >= 3 {
                    vertices.push(Point3::new(nums[0], nums[1], nums[2]));
                }
            }
        }
    }
    let mut triangles = Vec::new();
    if let Some(faces) = doc.descendants().find(|n| n.has_tag_name("Faces")) {
        for f in faces.children().filter(|c| c.has_tag_name("F")) {
            if let Some(text) = f.text() {
                let nums: Vec<usize> = text
                    .split_whitespace()
                    .filter_map(|s| s.parse().ok())
                    .collect();
                if nums.len() >= 3 {
                    if nums[..3].contains(&0) {
                        return Err(invalid("face indices are 1-based"));
                    }
                    triangles.push([nums[0] - 1, nums[1] - 1, nums[2] - 1]);
                }
            }
        }
    }
    Tin::from_parts(vertices, triangles).map_err(invalid)
}

/// Writes a [`Tin`] as a LandXML surface.
pub fn write_landxml_surface(path: &str, tin: &Tin) -> io::Result<()> {
    let mut xml = String::new();
    writeln!(&mut xml, "<?xml version=\"1.0\"?>").unwrap();
    writeln!(&mut xml, "<LandXML>").unwrap();
    writeln!(&mut xml, "  <Surfaces>").unwrap();
    writeln!(&mut xml, "    <Surface name=\"TIN\">").unwrap();
    writeln!(&mut xml, "      <Definition surfType=\"TIN\">").unwrap();
    writeln!(&mut xml, "        <Pnts>").unwrap();
    for (i, v) in tin.vertices().iter().enumerate() {
        writeln!(
            &mut xml,
            "          <P id=\"{}\">{} {} {}</P>",
            i + 1,
            v.x,
            v.y,
            v.z
        )
        .unwrap();
    }
    writeln!(&mut xml, "        </Pnts>").unwrap();
    writeln!(&mut xml, "        <Faces>").unwrap();
    for t in tin.triangles() {
        writeln!(
            &mut xml,
            "          <F>{} {} {}</F>",
            t[0] + 1,
            t[1] + 1,
            t[2] + 1
        )
        .unwrap();
    }
    writeln!(&mut xml, "        </Faces>").unwrap();
    writeln!(&mut xml, "      </Definition>").unwrap();
    writeln!(&mut xml, "    </Surface>").unwrap();
    writeln!(&mut xml, "  </Surfaces>").unwrap();
    writeln!(&mut xml, "</LandXML>").unwrap();
    write_string(path, &xml)
}

/// Reads a LandXML `CoordGeom` alignment. `Line` elements carry
/// `Start`/`End` points, `Curve` elements a radius, a `rot` winding and
/// `Start`/`End`/`Center` points, `Spiral` elements their radii, length
/// and start heading. The rebuilt chain is validated for continuity.
pub fn read_landxml_alignment(path: &str) -> io::Result<HorizontalAlignment> {
    let xml = read_to_string(path)?;
    let doc = Document::parse(&xml).map_err(invalid)?;
    let start_station = doc
        .descendants()
        .find(|n| n.has_tag_name("Alignment"))
        .and_then(|n| attr_f64(n, "staStart"))
        .unwrap_or(0.0);
    let Some(coord) = doc.descendants().find(|n| n.has_tag_name("CoordGeom")) else {
        return Err(invalid("missing CoordGeom element"));
    };
    let mut elements = Vec::new();
    for child in coord.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "Line" => {
                let (Some(start), Some(end)) =
                    (child_point(child, "Start"), child_point(child, "End"))
                else {
                    return Err(invalid("Line needs Start and End points"));
                };
                elements.push(HorizontalElement::Tangent { start, end });
            }
            "Curve" => {
                let center = child_point(child, "Center");
                let start = child_point(child, "Start");
                let end = child_point(child, "End");
                let (Some(c), Some(s), Some(e), Some(radius)) =
                    (center, start, end, attr_f64(child, "radius"))
                else {
                    return Err(invalid("Curve needs radius, Start, End and Center"));
                };
                let sa = (s.y - c.y).atan2(s.x - c.x);
                let mut ea = (e.y - c.y).atan2(e.x - c.x);
                if child.attribute("rot") == Some("cw") {
                    if ea >= sa {
                        ea -= TAU;
                    }
                } else if ea <= sa {
                    ea += TAU;
                }
                elements.push(HorizontalElement::Curve {
                    arc: Arc::new(c, radius, sa, ea),
                });
            }
            "Spiral" => {
                let (Some(start), Some(length), Some(orientation)) = (
                    child_point(child, "Start"),
                    attr_f64(child, "length"),
                    attr_f64(child, "dirStart"),
                ) else {
                    return Err(invalid("Spiral needs Start, length and dirStart"));
                };
                let spiral = Spiral {
                    start,
                    orientation,
                    length,
                    start_radius: attr_f64(child, "radiusStart").unwrap_or(f64::INFINITY),
                    end_radius: attr_f64(child, "radiusEnd").unwrap_or(f64::INFINITY),
                };
                elements.push(HorizontalElement::Spiral { spiral });
            }
            _ => {}
        }
    }
    HorizontalAlignment::new(start_station, elements, ContinuityTolerance::default())
        .map_err(invalid)
}

/// Writes a [`HorizontalAlignment`] as a LandXML `CoordGeom`.
pub fn write_landxml_alignment(path: &str, alignment: &HorizontalAlignment) -> io::Result<()> {
    let mut xml = String::new();
    writeln!(&mut xml, "<?xml version=\"1.0\"?>").unwrap();
    writeln!(&mut xml, "<LandXML>").unwrap();
    writeln!(&mut xml, "  <Alignments>").unwrap();
    writeln!(
        &mut xml,
        "    <Alignment name=\"HAL\" staStart=\"{}\" length=\"{}\">",
        alignment.start_station(),
        alignment.length()
    )
    .unwrap();
    writeln!(&mut xml, "      <CoordGeom>").unwrap();
    for elem in alignment.elements() {
        match elem {
            HorizontalElement::Tangent { start, end } => {
                writeln!(&mut xml, "        <Line>").unwrap();
                writeln!(&mut xml, "          <Start>{} {}</Start>", start.x, start.y).unwrap();
                writeln!(&mut xml, "          <End>{} {}</End>", end.x, end.y).unwrap();
                writeln!(&mut xml, "        </Line>").unwrap();
            }
            HorizontalElement::Curve { arc } => {
                let rot = if arc.end_angle >= arc.start_angle {
                    "ccw"
                } else {
                    "cw"
                };
                let sp = Point::new(
                    arc.center.x + arc.radius * arc.start_angle.cos(),
                    arc.center.y + arc.radius * arc.start_angle.sin(),
                );
                let ep = Point::new(
                    arc.center.x + arc.radius * arc.end_angle.cos(),
                    arc.center.y + arc.radius * arc.end_angle.sin(),
                );
                writeln!(
                    &mut xml,
                    "        <Curve radius=\"{}\" rot=\"{rot}\">",
                    arc.radius
                )
                .unwrap();
                writeln!(&mut xml, "          <Start>{} {}</Start>", sp.x, sp.y).unwrap();
                writeln!(&mut xml, "          <End>{} {}</End>", ep.x, ep.y).unwrap();
                writeln!(
                    &mut xml,
                    "          <Center>{} {}</Center>",
                    arc.center.x, arc.center.y
                )
                .unwrap();
                writeln!(&mut xml, "        </Curve>").unwrap();
            }
            HorizontalElement::Spiral { spiral } => {
                let s = spiral.start_point();
                let e = spiral.end_point();
                writeln!(
                    &mut xml,
                    "        <Spiral length=\"{}\" radiusStart=\"{}\" radiusEnd=\"{}\" dirStart=\"{}\">",
                    spiral.length, spiral.start_radius, spiral.end_radius, spiral.orientation
                )
                .unwrap();
                writeln!(&mut xml, "          <Start>{} {}</Start>", s.x, s.y).unwrap();
                writeln!(&mut xml, "          <End>{} {}</End>", e.x, e.y).unwrap();
                writeln!(&mut xml, "        </Spiral>").unwrap();
            }
        }
    }
    writeln!(&mut xml, "      </CoordGeom>").unwrap();
    writeln!(&mut xml, "    </Alignment>").unwrap();
    writeln!(&mut xml, "  </Alignments>").unwrap();
    writeln!(&mut xml, "</LandXML>").unwrap();
    write_string(path, &xml)
}

/// Reads a LandXML vertical profile into a validated
/// [`VerticalAlignment`].
pub fn read_landxml_profile(path: &str) -> io::Result<VerticalAlignment> {
    let xml = read_to_string(path)?;
    let doc = Document::parse(&xml).map_err(invalid)?;
    let Some(profile) = doc.descendants().find(|n| n.has_tag_name("Profile")) else {
        return Err(invalid("missing Profile element"));
    };
    let mut elements = Vec::new();
    for child in profile.children().filter(|c| c.is_element()) {
        let station_span = || -> io::Result<(f64, f64)> {
            let ss = attr_f64(child, "startSta").or_else(|| attr_f64(child, "startStation"));
            let es = attr_f64(child, "endSta").or_else(|| attr_f64(child, "endStation"));
            match (ss, es) {
                (Some(ss), Some(es)) => Ok((ss, es)),
                _ => Err(invalid("profile element needs startSta and endSta")),
            }
        };
        match child.tag_name().name() {
            "Grade" => {
                let (start_station, end_station) = station_span()?;
                let (Some(start_elev), Some(end_elev)) =
                    (attr_f64(child, "startElev"), attr_f64(child, "endElev"))
                else {
                    return Err(invalid("Grade needs startElev and endElev"));
                };
                elements.push(VerticalElement::Grade {
                    start_station,
                    end_station,
                    start_elev,
                    end_elev,
                });
            }
            "Parabola" | "Curve" => {
                let (start_station, end_station) = station_span()?;
                let (Some(start_elev), Some(start_grade), Some(end_grade)) = (
                    attr_f64(child, "startElev"),
                    attr_f64(child, "startGrade"),
                    attr_f64(child, "endGrade"),
                ) else {
                    return Err(invalid("Parabola needs startElev, startGrade and endGrade"));
                };
                elements.push(VerticalElement::Parabola {
                    start_station,
                    end_station,
                    start_elev,
                    start_grade,
                    end_grade,
                });
            }
            _ => {}
        }
    }
    VerticalAlignment::from_elements(elements).map_err(invalid)
}

/// Writes a [`VerticalAlignment`] as a LandXML profile.
pub fn write_landxml_profile(path: &str, profile: &VerticalAlignment) -> io::Result<()> {
    let mut xml = String::new();
    writeln!(&mut xml, "<?xml version=\"1.0\"?>").unwrap();
    writeln!(&mut xml, "<LandXML>").unwrap();
    writeln!(&mut xml, "  <Alignments>").unwrap();
    writeln!(&mut xml, "    <Alignment name=\"VAL\">").unwrap();
    writeln!(&mut xml, "      <Profile>").unwrap();
    for elem in profile.elements() {
        match elem {
            VerticalElement::Grade {
                start_station,
                end_station,
                start_elev,
                end_elev,
            } => {
                writeln!(
                    &mut xml,
                    "        <Grade startSta=\"{start_station}\" endSta=\"{end_station}\" startElev=\"{start_elev}\" endElev=\"{end_elev}\"/>"
                )
                .unwrap();
            }
            VerticalElement::Parabola {
                start_station,
                end_station,
                start_elev,
                start_grade,
                end_grade,
            } => {
                writeln!(
                    &mut xml,
                    "        <Parabola startSta=\"{start_station}\" endSta=\"{end_station}\" startElev=\"{start_elev}\" startGrade=\"{start_grade}\" endGrade=\"{end_grade}\"/>"
                )
                .unwrap();
            }
        }
    }
    writeln!(&mut xml, "      </Profile>").unwrap();
    writeln!(&mut xml, "    </Alignment>").unwrap();
    writeln!(&mut xml, "  </Alignments>").unwrap();
    writeln!(&mut xml, "</LandXML>").unwrap();
    write_string(path, &xml)
}

/// Writes sampled cross-sections as LandXML `CrossSects`, one
/// `CrossSectSurf` of `offset elevation` pairs per sampled surface.
pub fn write_landxml_cross_sections(path: &str, sections: &[CrossSection]) -> io::Result<()> {
    let mut xml = String::new();
    writeln!(&mut xml, "<?xml version=\"1.0\"?>").unwrap();
    writeln!(&mut xml, "<LandXML>").unwrap();
    writeln!(&mut xml, "  <CrossSects>").unwrap();
    for sec in sections {
        writeln!(&mut xml, "    <CrossSect sta=\"{}\">", sec.station).unwrap();
        for (i, trace) in sec.traces.iter().enumerate() {
            let coords: Vec<String> = trace.iter().map(|(o, z)| format!("{o} {z}")).collect();
            writeln!(&mut xml, "      <CrossSectSurf name=\"surface{}\">", i + 1).unwrap();
            writeln!(&mut xml, "        <PntList2D>{}</PntList2D>", coords.join(" ")).unwrap();
            writeln!(&mut xml, "      </CrossSectSurf>").unwrap();
        }
        writeln!(&mut xml, "    </CrossSect>").unwrap();
    }
    writeln!(&mut xml, "  </CrossSects>").unwrap();
    writeln!(&mut xml, "</LandXML>").unwrap();
    write_string(path, &xml)
}
