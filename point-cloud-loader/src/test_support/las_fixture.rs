//! LAS fixture writer shared by unit and integration tests.
//!
//! Depends only on `las` and std so the integration tests can include it by path.

use std::path::Path;

use las::point::Format;
use las::{Builder, Color, Point, Writer};

/// One point of a generated LAS fixture.
#[derive(Debug, Clone, Copy)]
pub struct FixturePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rgb: Option<[u16; 3]>,
}

impl FixturePoint {
    pub fn plain(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z, rgb: None }
    }

    pub fn coloured(x: f64, y: f64, z: f64, rgb: [u16; 3]) -> Self {
        Self {
            x,
            y,
            z,
            rgb: Some(rgb),
        }
    }
}

/// Write `points` to a LAS 1.2 file inside `dir` and return its bytes.
///
/// Point format 2 (with colour) is used when the first point is coloured,
/// format 0 otherwise.
pub fn write_las_fixture(dir: &Path, points: &[FixturePoint]) -> Vec<u8> {
    let coloured = points.first().is_some_and(|p| p.rgb.is_some());
    let path = dir.join("fixture.las");

    let mut builder = Builder::from((1, 2));
    builder.point_format = Format::new(if coloured { 2 } else { 0 }).unwrap();
    let header = builder.into_header().unwrap();

    let mut writer = Writer::from_path(&path, header).unwrap();
    for fixture in points {
        let point = Point {
            x: fixture.x,
            y: fixture.y,
            z: fixture.z,
            color: if coloured {
                let [r, g, b] = fixture.rgb.unwrap_or([0, 0, 0]);
                Some(Color::new(r, g, b))
            } else {
                None
            },
            ..Default::default()
        };
        writer.write_point(point).unwrap();
    }
    writer.close().unwrap();
    drop(writer);

    std::fs::read(&path).unwrap()
}
