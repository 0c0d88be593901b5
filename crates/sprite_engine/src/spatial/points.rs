//! Point containers
//!
//! Ordered point lists behind regions and paths. Points are floored to whole
//! pixels on the way in, so a container saved and loaded again reproduces
//! exactly the same points.
//!
//! # File format
//!
//! ```text
//! "RGN0"  u32 count  count x (f32 x, f32 y)
//! ```
//!
//! All values little-endian.

use crate::assets::FileManager;
use crate::core::{EngineError, EngineResult};
use crate::foundation::math::{floor2, Vec2};

/// Signature of a saved point container
pub const SIGNATURE: &[u8; 4] = b"RGN0";

const HEADER_SIZE: usize = 8;
const POINT_SIZE: usize = 8;

/// Ordered list of whole-pixel points
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointContainer {
    points: Vec<Vec2>,
}

impl PointContainer {
    /// Empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Container holding `points`, floored
    pub fn from_points(points: impl IntoIterator<Item = Vec2>) -> Self {
        Self {
            points: points.into_iter().map(floor2).collect(),
        }
    }

    fn check_index(&self, index: usize) -> EngineResult<()> {
        if index < self.points.len() {
            Ok(())
        } else {
            Err(EngineError::invalid_argument(format!(
                "point index {index} out of range 0..{}",
                self.points.len()
            )))
        }
    }

    /// Append a point
    pub fn push(&mut self, point: Vec2) {
        self.points.push(floor2(point));
    }

    /// Insert a point before `index`
    pub fn insert(&mut self, index: usize, point: Vec2) -> EngineResult<()> {
        self.check_index(index)?;
        self.points.insert(index, floor2(point));
        Ok(())
    }

    /// Remove the point at `index`
    pub fn erase(&mut self, index: usize) -> EngineResult<Vec2> {
        self.check_index(index)?;
        Ok(self.points.remove(index))
    }

    /// Point at `index`
    pub fn get(&self, index: usize) -> EngineResult<Vec2> {
        self.check_index(index)?;
        Ok(self.points[index])
    }

    /// Replace the point at `index`
    pub fn set(&mut self, index: usize, point: Vec2) -> EngineResult<()> {
        self.check_index(index)?;
        self.points[index] = floor2(point);
        Ok(())
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if there are no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Remove every point
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Points in order
    pub fn iter(&self) -> impl Iterator<Item = Vec2> + '_ {
        self.points.iter().copied()
    }

    /// Points as a slice
    pub fn as_slice(&self) -> &[Vec2] {
        &self.points
    }

    /// Encode in the `RGN0` format
    pub fn save_to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.points.len() * POINT_SIZE);
        out.extend_from_slice(SIGNATURE);
        out.extend_from_slice(&(self.points.len() as u32).to_le_bytes());
        for point in &self.points {
            let point = floor2(*point);
            out.extend_from_slice(&point.x.to_le_bytes());
            out.extend_from_slice(&point.y.to_le_bytes());
        }
        out
    }

    /// Replace the points with the contents of an `RGN0` file
    pub fn load_from_bytes(&mut self, bytes: &[u8]) -> EngineResult<()> {
        if bytes.len() < HEADER_SIZE || &bytes[..4] != SIGNATURE {
            return Err(EngineError::FormatValidation(
                "Points file has invalid signature (perhaps, old file format)".to_string(),
            ));
        }
        let count = u32::from_le(bytemuck::pod_read_unaligned(&bytes[4..HEADER_SIZE])) as usize;
        let body = &bytes[HEADER_SIZE..];
        if body.len() < count * POINT_SIZE {
            return Err(EngineError::FormatValidation(format!(
                "Points file truncated: {count} points declared, {} bytes present",
                body.len()
            )));
        }
        self.points = body[..count * POINT_SIZE]
            .chunks_exact(POINT_SIZE)
            .map(|raw| {
                let [x, y]: [u32; 2] = bytemuck::pod_read_unaligned(raw);
                floor2(Vec2::new(f32::from_bits(u32::from_le(x)), f32::from_bits(u32::from_le(y))))
            })
            .collect();
        Ok(())
    }

    /// Save through the file manager
    pub fn save(&self, files: &mut FileManager, path: &str) -> EngineResult<()> {
        files.save(path, &self.save_to_bytes())
    }

    /// Load through the file manager
    pub fn load(&mut self, files: &mut FileManager, path: &str) -> EngineResult<()> {
        let file = files.direct_load(path)?;
        self.load_from_bytes(&file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryLoader;
    use crate::core::FileConfig;

    #[test]
    fn test_points_are_floored() {
        let mut points = PointContainer::new();
        points.push(Vec2::new(1.7, -0.2));
        assert_eq!(points.get(0).unwrap(), Vec2::new(1.0, -1.0));
        points.set(0, Vec2::new(3.9, 4.1)).unwrap();
        points.insert(0, Vec2::new(0.5, 0.5)).unwrap();
        assert_eq!(points.iter().collect::<Vec<_>>(), vec![Vec2::new(0.0, 0.0), Vec2::new(3.0, 4.0)]);
    }

    #[test]
    fn test_out_of_range_index_is_an_error() {
        let mut points = PointContainer::new();
        assert!(points.get(0).is_err());
        assert!(points.insert(0, Vec2::zeros()).is_err());
        points.push(Vec2::zeros());
        assert!(points.erase(1).is_err());
        assert_eq!(points.erase(0).unwrap(), Vec2::zeros());
        assert!(points.is_empty());
    }

    #[test]
    fn test_save_load_reproduces_points() {
        let points = PointContainer::from_points([Vec2::new(10.2, 20.8), Vec2::new(-5.5, 7.0), Vec2::new(300.0, -1.25)]);
        let bytes = points.save_to_bytes();
        assert_eq!(&bytes[..4], b"RGN0");
        assert_eq!(bytes.len(), 8 + 3 * 8);

        let mut loaded = PointContainer::new();
        loaded.load_from_bytes(&bytes).unwrap();
        assert_eq!(loaded, points);
        assert_eq!(loaded.save_to_bytes(), bytes);
    }

    #[test]
    fn test_reads_little_endian_layout() {
        let mut bytes = b"RGN0".to_vec();
        bytes.extend_from_slice(&[1, 0, 0, 0]);
        // 12.5 and -3.0 as little-endian f32
        bytes.extend_from_slice(&[0x00, 0x00, 0x48, 0x41, 0x00, 0x00, 0x40, 0xc0]);

        let mut points = PointContainer::new();
        points.load_from_bytes(&bytes).unwrap();
        assert_eq!(points.iter().collect::<Vec<_>>(), vec![Vec2::new(12.0, -3.0)]);
    }

    #[test]
    fn test_bad_signature_is_rejected() {
        let mut points = PointContainer::new();
        assert!(matches!(
            points.load_from_bytes(b"RGN1\0\0\0\0"),
            Err(EngineError::FormatValidation(_))
        ));
        let mut truncated = PointContainer::from_points([Vec2::new(1.0, 1.0)]).save_to_bytes();
        truncated.pop();
        assert!(points.load_from_bytes(&truncated).is_err());
    }

    #[test]
    fn test_save_through_file_manager() {
        let loader = MemoryLoader::new();
        let mut files = FileManager::new(Box::new(loader.clone()), FileConfig::default());
        let points = PointContainer::from_points([Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0)]);
        points.save(&mut files, "level/walk.rgn").unwrap();
        assert!(loader.get("level/walk.rgn").is_some());

        let mut loaded = PointContainer::new();
        loaded.load(&mut files, "level/walk.rgn").unwrap();
        assert_eq!(loaded, points);
    }
}
