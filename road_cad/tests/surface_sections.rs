use road_cad::{
    alignment::{ContinuityTolerance, HorizontalAlignment},
    cancel::CancelToken,
    corridor::{sample_cross_sections, sample_ground_profile, OffsetRange, StationRange},
    dtm::Tin,
    geometry::{Point, Point3},
    pointset::DuplicatePolicy,
};

/// V-shaped valley with its floor along y = 5 and 1:1 side slopes.
fn valley() -> Tin {
    Tin::from_points(
        vec![
            Point3::new(0.0, 0.0, 5.0),
            Point3::new(10.0, 0.0, 5.0),
            Point3::new(0.0, 5.0, 0.0),
            Point3::new(10.0, 5.0, 0.0),
            Point3::new(0.0, 10.0, 5.0),
            Point3::new(10.0, 10.0, 5.0),
        ],
        DuplicatePolicy::Reject,
    )
    .unwrap()
}

fn valley_centerline() -> HorizontalAlignment {
    HorizontalAlignment::from_tangents(
        0.0,
        vec![Point::new(0.0, 5.0), Point::new(10.0, 5.0)],
        ContinuityTolerance::default(),
    )
    .unwrap()
}

#[test]
fn valley_sections_trace_both_slopes() {
    let ground = valley();
    let overlay = Tin::from_points(
        vec![
            Point3::new(0.0, 0.0, 3.0),
            Point3::new(10.0, 0.0, 3.0),
            Point3::new(10.0, 10.0, 3.0),
            Point3::new(0.0, 10.0, 3.0),
        ],
        DuplicatePolicy::Reject,
    )
    .unwrap();
    let alignment = valley_centerline();
    let sections = sample_cross_sections(
        &alignment,
        &[&ground, &overlay],
        &StationRange::new(2.0, 8.0, 2.0),
        &OffsetRange::symmetric(5.0),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(sections.len(), 4);
    for section in &sections {
        assert_eq!(section.traces.len(), 2);

        let trace = &section.traces[0];
        let (o_first, z_first) = *trace.first().unwrap();
        let (o_last, z_last) = *trace.last().unwrap();
        assert!((o_first + 5.0).abs() < 1e-9);
        assert!((z_first - 5.0).abs() < 1e-6);
        assert!((o_last - 5.0).abs() < 1e-9);
        assert!((z_last - 5.0).abs() < 1e-6);
        let floor = trace
            .iter()
            .find(|(o, _)| o.abs() < 1e-9)
            .expect("section crosses the valley floor");
        assert!(floor.1.abs() < 1e-6);
        for pair in trace.windows(2) {
            assert!(pair[1].0 > pair[0].0);
        }

        for &(_, z) in &section.traces[1] {
            assert!((z - 3.0).abs() < 1e-6);
        }
    }
}

#[test]
fn ground_profile_follows_valley_floor() {
    let ground = valley();
    let alignment = valley_centerline();
    let profile = sample_ground_profile(
        &alignment,
        &ground,
        &StationRange::new(0.0, 10.0, 2.5),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(profile.len(), 5);
    for &(_, z) in &profile {
        assert!(z.unwrap().abs() < 1e-6);
    }
}
