//! Planar YUV 4:2:0 geometry and raster buffers.
//!
//! All pipeline rasters share one layout: a full-resolution luma plane
//! followed by two quarter-resolution chroma planes (half width, half height,
//! rounded up). Plane-start offsets are derived from the geometry; buffers
//! are reused across frames and reallocated only when the layout changes.

use std::fmt;

use crate::error::{RelayError, Result};

/// Chroma neutral value (the subsampling midpoint).
pub const CHROMA_MID: u8 = 128;

/// Frame dimensions in pixels. Both axes are always non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Geometry {
    width: u32,
    height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RelayError::protocol(format!(
                "invalid geometry {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Chroma plane width: luma width halved, rounded up to cover odd edges.
    pub fn chroma_width(&self) -> u32 {
        self.width.div_ceil(2)
    }

    pub fn chroma_height(&self) -> u32 {
        self.height.div_ceil(2)
    }

    /// Luma plane length in bytes.
    pub fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Length of one chroma plane in bytes (width*height/4 for even dims).
    pub fn chroma_len(&self) -> usize {
        self.chroma_width() as usize * self.chroma_height() as usize
    }

    /// Total frame length in bytes (w*h*3/2 for even dims).
    pub fn frame_len(&self) -> usize {
        self.luma_len() + 2 * self.chroma_len()
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Owned planar 4:2:0 pixel buffer with derived plane offsets.
///
/// `ensure_layout` reuses the existing allocation whenever the geometry is
/// unchanged, so steady-state decode/scale/transform runs allocation-free.
#[derive(Debug)]
pub struct PlaneRaster {
    data: Vec<u8>,
    geometry: Geometry,
}

impl PlaneRaster {
    /// Creates a black raster (luma 0, chroma at the midpoint).
    pub fn new(geometry: Geometry) -> Self {
        let mut raster = Self {
            data: Vec::new(),
            geometry,
        };
        raster.reset_planes();
        raster
    }

    fn reset_planes(&mut self) {
        let len = self.geometry.frame_len();
        self.data.clear();
        self.data.resize(len, 0);
        for byte in &mut self.data[self.geometry.luma_len()..] {
            *byte = CHROMA_MID;
        }
    }

    /// Re-sizes the buffer for `geometry` if the layout changed; otherwise a
    /// no-op. Contents are reset to black on a layout change.
    pub fn ensure_layout(&mut self, geometry: Geometry) {
        if self.geometry == geometry && self.data.len() == geometry.frame_len() {
            return;
        }
        self.geometry = geometry;
        self.reset_planes();
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Byte offset of the U plane.
    pub fn u_offset(&self) -> usize {
        self.geometry.luma_len()
    }

    /// Byte offset of the V plane.
    pub fn v_offset(&self) -> usize {
        self.geometry.luma_len() + self.geometry.chroma_len()
    }

    pub fn luma(&self) -> &[u8] {
        &self.data[..self.u_offset()]
    }

    pub fn chroma_u(&self) -> &[u8] {
        &self.data[self.u_offset()..self.v_offset()]
    }

    pub fn chroma_v(&self) -> &[u8] {
        &self.data[self.v_offset()..]
    }

    /// Mutable views of the three planes.
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        let u_offset = self.u_offset();
        let chroma_len = self.geometry.chroma_len();
        let (y, rest) = self.data.split_at_mut(u_offset);
        let (u, v) = rest.split_at_mut(chroma_len);
        (y, u, v)
    }

    /// Copies another raster into this one, adopting its layout.
    pub fn copy_from(&mut self, other: &PlaneRaster) {
        self.ensure_layout(other.geometry);
        self.data.copy_from_slice(&other.data);
    }
}

/// Deterministic vertical-bar frame: four luma bands at 0/64/128/192 with
/// neutral chroma. Presented before the first network frame decodes and by
/// the daemon's dry-run mode.
pub fn test_pattern(geometry: Geometry) -> PlaneRaster {
    let mut raster = PlaneRaster::new(geometry);
    let width = geometry.width() as usize;
    let (luma, _, _) = raster.planes_mut();
    for row in luma.chunks_mut(width) {
        for (x, px) in row.iter_mut().enumerate() {
            let band = (x * 4 / width).min(3) as u8;
            *px = band * 64;
        }
    }
    raster
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_rejects_zero_axis() {
        assert!(Geometry::new(0, 480).is_err());
        assert!(Geometry::new(640, 0).is_err());
        assert!(Geometry::new(640, 480).is_ok());
    }

    #[test]
    fn plane_sizes_for_even_dimensions() {
        let g = Geometry::new(640, 480).unwrap();
        assert_eq!(g.luma_len(), 640 * 480);
        assert_eq!(g.chroma_len(), 640 * 480 / 4);
        assert_eq!(g.frame_len(), 640 * 480 * 3 / 2);
    }

    #[test]
    fn plane_sizes_for_odd_dimensions_round_up() {
        let g = Geometry::new(5, 3).unwrap();
        assert_eq!(g.luma_len(), 15);
        assert_eq!(g.chroma_width(), 3);
        assert_eq!(g.chroma_height(), 2);
        assert_eq!(g.chroma_len(), 6);
    }

    #[test]
    fn new_raster_is_black() {
        let g = Geometry::new(4, 4).unwrap();
        let raster = PlaneRaster::new(g);
        assert!(raster.luma().iter().all(|&b| b == 0));
        assert!(raster.chroma_u().iter().all(|&b| b == CHROMA_MID));
        assert!(raster.chroma_v().iter().all(|&b| b == CHROMA_MID));
    }

    #[test]
    fn ensure_layout_reuses_unchanged_buffer() {
        let g = Geometry::new(4, 4).unwrap();
        let mut raster = PlaneRaster::new(g);
        raster.data_mut()[0] = 200;
        raster.ensure_layout(g);
        // same layout: contents untouched
        assert_eq!(raster.data()[0], 200);

        let g2 = Geometry::new(8, 8).unwrap();
        raster.ensure_layout(g2);
        assert_eq!(raster.data().len(), g2.frame_len());
        assert_eq!(raster.data()[0], 0);
    }

    #[test]
    fn plane_offsets_partition_the_buffer() {
        let g = Geometry::new(6, 4).unwrap();
        let mut raster = PlaneRaster::new(g);
        assert_eq!(raster.u_offset(), 24);
        assert_eq!(raster.v_offset(), 24 + 6);
        let (y, u, v) = raster.planes_mut();
        assert_eq!(y.len(), 24);
        assert_eq!(u.len(), 6);
        assert_eq!(v.len(), 6);
    }

    #[test]
    fn test_pattern_has_four_bands() {
        let g = Geometry::new(8, 2).unwrap();
        let raster = test_pattern(g);
        let row = &raster.luma()[..8];
        assert_eq!(row, &[0, 0, 64, 64, 128, 128, 192, 192]);
        assert!(raster.chroma_u().iter().all(|&b| b == CHROMA_MID));
    }
}
