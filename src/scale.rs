//! Per-plane bilinear rescaling with a cached resize context.
//!
//! Each YUV plane is resized independently as a single-channel image: luma at
//! full resolution, the chroma planes at their quarter-resolution geometry.
//! The resize context and destination raster are rebuilt only when the
//! (source, destination) geometry pair changes between calls. Identity
//! geometry is an exact copy, never a resample.

use std::num::NonZeroU32;

use fast_image_resize as fir;

use crate::error::{RelayError, Result};
use crate::raster::{Geometry, PlaneRaster};

pub struct PlaneScaler {
    resizer: fir::Resizer,
    cached_pair: Option<(Geometry, Geometry)>,
    dst: PlaneRaster,
}

impl PlaneScaler {
    pub fn new() -> Result<Self> {
        Ok(Self {
            resizer: fir::Resizer::new(fir::ResizeAlg::Convolution(fir::FilterType::Bilinear)),
            cached_pair: None,
            dst: PlaneRaster::new(Geometry::new(16, 16)?),
        })
    }

    /// Resizes `src` to `dst_geometry`, returning a raster owned by the
    /// scaler and reused across calls.
    pub fn scale(&mut self, src: &PlaneRaster, dst_geometry: Geometry) -> Result<&PlaneRaster> {
        if src.geometry() == dst_geometry {
            self.dst.copy_from(src);
            self.cached_pair = None;
            return Ok(&self.dst);
        }

        let pair = (src.geometry(), dst_geometry);
        if self.cached_pair != Some(pair) {
            self.dst.ensure_layout(dst_geometry);
            self.cached_pair = Some(pair);
        }

        let src_geometry = src.geometry();
        let (dst_y, dst_u, dst_v) = self.dst.planes_mut();
        resize_plane(
            &mut self.resizer,
            src.luma(),
            src_geometry.width(),
            src_geometry.height(),
            dst_y,
            dst_geometry.width(),
            dst_geometry.height(),
        )?;
        resize_plane(
            &mut self.resizer,
            src.chroma_u(),
            src_geometry.chroma_width(),
            src_geometry.chroma_height(),
            dst_u,
            dst_geometry.chroma_width(),
            dst_geometry.chroma_height(),
        )?;
        resize_plane(
            &mut self.resizer,
            src.chroma_v(),
            src_geometry.chroma_width(),
            src_geometry.chroma_height(),
            dst_v,
            dst_geometry.chroma_width(),
            dst_geometry.chroma_height(),
        )?;
        Ok(&self.dst)
    }
}

fn plane_dim(value: u32) -> Result<NonZeroU32> {
    NonZeroU32::new(value)
        .ok_or_else(|| RelayError::allocation("zero-sized plane dimension".to_string()))
}

fn resize_plane(
    resizer: &mut fir::Resizer,
    src: &[u8],
    src_width: u32,
    src_height: u32,
    dst: &mut [u8],
    dst_width: u32,
    dst_height: u32,
) -> Result<()> {
    let src_image = fir::Image::from_vec_u8(
        plane_dim(src_width)?,
        plane_dim(src_height)?,
        src.to_vec(),
        fir::PixelType::U8,
    )
    .map_err(|e| RelayError::allocation(format!("resize source plane: {}", e)))?;
    let mut dst_image = fir::Image::new(
        plane_dim(dst_width)?,
        plane_dim(dst_height)?,
        fir::PixelType::U8,
    );
    resizer
        .resize(&src_image.view(), &mut dst_image.view_mut())
        .map_err(|e| RelayError::allocation(format!("resize plane: {}", e)))?;
    dst.copy_from_slice(dst_image.buffer());
    Ok(())
}
