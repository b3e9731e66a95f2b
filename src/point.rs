//! In-memory point cloud model shared by the PCD and LAS codecs.

/// 3D position
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Vector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector {
    pub fn new(x: f32, y: f32, z: f32) -> Vector {
        Vector { x, y, z }
    }

    /// True when no component is NaN or infinite
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// 8-bit RGB color
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for Color {
    fn default() -> Self {
        // white, matching uncolored PCD/LAS records
        Color {
            r: 255,
            g: 255,
            b: 255,
        }
    }
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Color {
        Color { r, g, b }
    }

    /// Unpacks a PCD-style packed RGB value (red in bits 16..24).
    pub fn from_packed(packed: u32) -> Color {
        Color {
            r: (packed >> 16) as u8,
            g: (packed >> 8) as u8,
            b: packed as u8,
        }
    }

    /// Packs into the PCD wire representation.
    pub fn to_packed(self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

/// A single colored point
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Point {
    pub position: Vector,
    pub color: Color,
}

impl Point {
    pub fn new(position: Vector, color: Color) -> Point {
        Point { position, color }
    }
}

/// 3D bounding box
#[derive(Clone, PartialEq, Debug)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            min_z: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
            max_z: f64::NEG_INFINITY,
        }
    }
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, min_z: f64, max_x: f64, max_y: f64, max_z: f64) -> Bounds {
        Bounds {
            min_x,
            min_y,
            min_z,
            max_x,
            max_y,
            max_z,
        }
    }

    #[inline]
    pub fn expand_xyz(&mut self, x: f64, y: f64, z: f64) {
        if x < self.min_x {
            self.min_x = x;
        }
        if y < self.min_y {
            self.min_y = y;
        }
        if z < self.min_z {
            self.min_z = z;
        }
        if x > self.max_x {
            self.max_x = x;
        }
        if y > self.max_y {
            self.max_y = y;
        }
        if z > self.max_z {
            self.max_z = z;
        }
    }
}

/// Point cloud data, exclusively owning its points.
///
/// `is_dense` is cleared by the codecs whenever a point with a non-finite
/// position had to be dropped during loading.
#[derive(Clone, PartialEq, Debug)]
pub struct PointCloud {
    pub points: Vec<Point>,
    pub width: u32,
    pub height: u32,
    pub is_dense: bool,
}

impl Default for PointCloud {
    fn default() -> Self {
        PointCloud {
            points: Vec::new(),
            width: 0,
            height: 0,
            is_dense: true,
        }
    }
}

impl PointCloud {
    pub fn with_capacity(capacity: usize) -> PointCloud {
        PointCloud {
            points: Vec::with_capacity(capacity),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point> {
        self.points.iter()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.width = 0;
        self.height = 0;
        self.is_dense = true;
    }

    /// Axis-aligned bounding box over all points.
    ///
    /// An empty cloud yields a degenerate box at the origin.
    pub fn bounds(&self) -> Bounds {
        if self.points.is_empty() {
            return Bounds::new(0., 0., 0., 0., 0., 0.);
        }
        let mut bounds = Bounds::default();
        for point in &self.points {
            bounds.expand_xyz(
                point.position.x as f64,
                point.position.y as f64,
                point.position.z as f64,
            );
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_rgb_round_trip() {
        let color = Color::new(255, 128, 64);
        assert_eq!(color.to_packed(), 0x00FF_8040);
        assert_eq!(Color::from_packed(color.to_packed()), color);
    }

    #[test]
    fn non_finite_positions_are_detected() {
        assert!(Vector::new(1.0, 2.0, 3.0).is_finite());
        assert!(!Vector::new(f32::NAN, 2.0, 3.0).is_finite());
        assert!(!Vector::new(1.0, f32::INFINITY, 3.0).is_finite());
    }

    #[test]
    fn bounds_grow_over_all_points() {
        let mut cloud = PointCloud::default();
        cloud.push(Point::new(Vector::new(1.0, -2.0, 3.0), Color::default()));
        cloud.push(Point::new(Vector::new(-4.0, 5.0, 0.5), Color::default()));
        let bounds = cloud.bounds();
        assert_eq!(bounds.min_x, -4.0);
        assert_eq!(bounds.max_y, 5.0);
        assert_eq!(bounds.max_z, 3.0);
    }

    #[test]
    fn empty_cloud_bounds_are_degenerate() {
        let cloud = PointCloud::default();
        assert_eq!(cloud.bounds(), Bounds::new(0., 0., 0., 0., 0., 0.));
    }
}
