//! Fixed-angle raster rotation via composed affine maps.
//!
//! Rotation is applied as two 3x3 maps per plane: a "scale" matrix and an
//! "angle" matrix, each sampled inverse (destination pixel pulls from the
//! mapped source position, nearest rounding). Out-of-bounds samples read as
//! 0; on the angle pass a non-zero fill value then replaces zero samples —
//! 0 for luma, 128 for chroma, the subsampling midpoint.
//!
//! Chroma planes are transformed at full resolution: each subsampled sample
//! is duplicated into its 2x2 block, the expanded plane is transformed, and
//! the result is re-subsampled by taking the top-left sample of each block.
//! 90/270 degrees additionally rescale by the width/height ratio so the
//! rotated content keeps its aspect within the fixed output canvas.

use crate::raster::{Geometry, PlaneRaster, CHROMA_MID};

/// Rotation state. `step` cycles 0 -> 90 -> 180 -> 270 -> 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn step(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }
}

type Matrix = [f32; 9];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

fn fill_matrix(shift_x: f32, shift_y: f32, angle: f32, scale: f32) -> Matrix {
    let mut matrix = IDENTITY;
    matrix[0] = scale * angle.cos();
    matrix[1] = -angle.sin();
    matrix[2] = shift_x;
    matrix[3] = -matrix[1];
    matrix[4] = matrix[0];
    matrix[5] = shift_y;
    matrix
}

pub struct Transformer {
    angle: Rotation,
    scale_matrix: Matrix,
    angle_matrix: Matrix,
    /// Working space of twice the luma plane size.
    scratch: Vec<u8>,
    built_for: Option<(Geometry, Rotation)>,
}

impl Transformer {
    pub fn new() -> Self {
        Self {
            angle: Rotation::Deg0,
            scale_matrix: IDENTITY,
            angle_matrix: IDENTITY,
            scratch: Vec::new(),
            built_for: None,
        }
    }

    pub fn angle(&self) -> Rotation {
        self.angle
    }

    /// Sets the rotation directly. Matrices are recomputed lazily on the
    /// next `apply` for the raster geometry seen there.
    pub fn set_angle(&mut self, angle: Rotation) {
        self.angle = angle;
    }

    /// Advances the rotation by one 90-degree step.
    pub fn step(&mut self) {
        self.angle = self.angle.step();
        log::debug!("rotation now {} degrees", self.angle.degrees());
    }

    fn rebuild(&mut self, geometry: Geometry) {
        let width = geometry.width() as f32;
        let height = geometry.height() as f32;
        let mut rotation_deg = 0.0f32;
        let mut scale = 1.0f32;
        let mut shift_x = 0.0f32;
        let mut shift_y = 0.0f32;
        match self.angle {
            Rotation::Deg0 => {}
            Rotation::Deg90 => {
                rotation_deg = 90.0;
                scale = width / height;
                shift_x = height;
                shift_y = (height / scale - width) / 2.0;
            }
            Rotation::Deg180 => {
                rotation_deg = 180.0;
                shift_x = width;
                shift_y = height;
            }
            Rotation::Deg270 => {
                rotation_deg = 270.0;
                scale = width / height;
                shift_y = height;
            }
        }
        let radians = rotation_deg.to_radians();
        self.scale_matrix = fill_matrix(0.0, 0.0, 0.0, scale);
        self.angle_matrix = fill_matrix(shift_x, shift_y, radians, 1.0);
        self.scratch.resize(geometry.luma_len() * 2, 0);
        self.built_for = Some((geometry, self.angle));
    }

    /// Rotates the raster in place. A 0-degree angle is a no-op. Geometries
    /// with an odd axis are left untouched (the 2x2 chroma expansion needs
    /// even dimensions).
    pub fn apply(&mut self, raster: &mut PlaneRaster) {
        if self.angle == Rotation::Deg0 {
            return;
        }
        let geometry = raster.geometry();
        if geometry.width() % 2 != 0 || geometry.height() % 2 != 0 {
            log::warn!("skipping rotation for odd geometry {}", geometry);
            return;
        }
        if self.built_for != Some((geometry, self.angle)) {
            self.rebuild(geometry);
        }

        let width = geometry.width() as usize;
        let height = geometry.height() as usize;
        let luma_len = geometry.luma_len();
        let (front, back) = self.scratch.split_at_mut(luma_len);
        let (luma, chroma_u, chroma_v) = raster.planes_mut();

        // Luma transforms as-is.
        apply_affine(luma, front, width, height, 0, &self.scale_matrix);
        apply_affine(front, luma, width, height, 0, &self.angle_matrix);

        // Chroma: expand, transform at full resolution, re-subsample.
        for chroma in [chroma_u, chroma_v] {
            expand_chroma(chroma, front, width, height);
            apply_affine(front, back, width, height, 0, &self.scale_matrix);
            apply_affine(back, front, width, height, CHROMA_MID, &self.angle_matrix);
            subsample_chroma(front, chroma, width, height);
        }
    }
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

/// Inverse-samples `src` through `matrix` into `dst`. Out-of-bounds reads
/// yield 0; with a non-zero `fill`, zero samples are replaced by it.
fn apply_affine(src: &[u8], dst: &mut [u8], width: usize, height: usize, fill: u8, matrix: &Matrix) {
    for y in 0..height {
        for x in 0..width {
            let xf = x as f32;
            let yf = y as f32;
            let src_x = xf * matrix[0] + yf * matrix[1] + matrix[2];
            let src_y = xf * matrix[3] + yf * matrix[4] + matrix[5];
            let xi = (src_x + 0.5) as i64;
            let yi = (src_y + 0.5) as i64;
            let sample = if xi < 0 || yi < 0 || xi >= width as i64 || yi >= height as i64 {
                0
            } else {
                src[xi as usize + yi as usize * width]
            };
            dst[y * width + x] = if fill > 0 && sample == 0 { fill } else { sample };
        }
    }
}

/// Duplicates each subsampled chroma sample into its 2x2 block of `dst`
/// (full resolution). Dimensions must be even.
fn expand_chroma(src: &[u8], dst: &mut [u8], width: usize, height: usize) {
    let mut read = 0;
    for row in (0..height).step_by(2) {
        for col in (0..width).step_by(2) {
            let sample = src[read];
            read += 1;
            dst[row * width + col] = sample;
            dst[row * width + col + 1] = sample;
            dst[(row + 1) * width + col] = sample;
            dst[(row + 1) * width + col + 1] = sample;
        }
    }
}

/// Re-subsamples a full-resolution plane by taking the top-left sample of
/// each 2x2 block.
fn subsample_chroma(src: &[u8], dst: &mut [u8], width: usize, height: usize) {
    let mut write = 0;
    for row in (0..height).step_by(2) {
        for col in (0..width).step_by(2) {
            dst[write] = src[row * width + col];
            write += 1;
        }
    }
}
