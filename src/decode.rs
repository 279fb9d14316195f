//! JPEG decode into reusable planar rasters.
//!
//! Wraps turbojpeg behind the narrow interface the pipeline needs: header
//! parse for geometry negotiation and decode into a planar 4:2:0 raster.
//! The destination raster is owned here and reused across frames; it is
//! reallocated only when the decoded layout changes.

use turbojpeg::{Decompressor, Subsamp, YuvImage};

use crate::error::{RelayError, Result};
use crate::raster::{Geometry, PlaneRaster};

/// Row alignment for the planar output buffer. The raster layout packs
/// planes tightly, so each row starts at its natural offset.
const YUV_ALIGN: usize = 1;

pub struct JpegDecoder {
    decompressor: Decompressor,
    raster: PlaneRaster,
}

impl JpegDecoder {
    pub fn new() -> Result<Self> {
        let decompressor = Decompressor::new()
            .map_err(|e| RelayError::decode_fatal(format!("create decompressor: {}", e)))?;
        let raster = PlaneRaster::new(Geometry::new(16, 16)?);
        Ok(Self {
            decompressor,
            raster,
        })
    }

    /// Parses the JPEG header and returns the frame's geometry without
    /// decoding any pixel data.
    pub fn read_header(&mut self, jpeg: &[u8]) -> Result<Geometry> {
        let header = self
            .decompressor
            .read_header(jpeg)
            .map_err(|e| RelayError::decode(format!("parse jpeg header: {}", e)))?;
        Geometry::new(header.width as u32, header.height as u32)
    }

    /// Decodes one compressed frame into the reusable planar raster.
    ///
    /// The stream must be 4:2:0 subsampled; anything else is a fatal decode
    /// error rather than a silent fallback. A frame whose geometry differs
    /// from `expected` yields `GeometryMismatch` and no raster.
    pub fn decode(&mut self, jpeg: &[u8], expected: Geometry) -> Result<&PlaneRaster> {
        let header = self
            .decompressor
            .read_header(jpeg)
            .map_err(|e| RelayError::decode(format!("parse jpeg header: {}", e)))?;
        if header.subsamp != Subsamp::Sub2x2 {
            return Err(RelayError::decode_fatal(format!(
                "unexpected stream subsampling {:?}, need 4:2:0",
                header.subsamp
            )));
        }
        let actual = Geometry::new(header.width as u32, header.height as u32)?;
        if actual != expected {
            return Err(RelayError::GeometryMismatch { expected, actual });
        }

        self.raster.ensure_layout(actual);
        let image = YuvImage {
            pixels: self.raster.data_mut(),
            width: header.width,
            align: YUV_ALIGN,
            height: header.height,
            subsamp: Subsamp::Sub2x2,
        };
        self.decompressor
            .decompress_to_yuv(jpeg, image)
            .map_err(|e| RelayError::decode(format!("decode frame: {}", e)))?;
        Ok(&self.raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::test_pattern;

    fn encode_yuv(geometry: Geometry) -> Vec<u8> {
        let raster = test_pattern(geometry);
        let image = YuvImage {
            pixels: raster.data(),
            width: geometry.width() as usize,
            align: YUV_ALIGN,
            height: geometry.height() as usize,
            subsamp: Subsamp::Sub2x2,
        };
        turbojpeg::compress_yuv(image, 90).unwrap().to_vec()
    }

    #[test]
    fn header_reports_frame_geometry() {
        let geometry = Geometry::new(64, 48).unwrap();
        let jpeg = encode_yuv(geometry);
        let mut decoder = JpegDecoder::new().unwrap();
        assert_eq!(decoder.read_header(&jpeg).unwrap(), geometry);
    }

    #[test]
    fn decodes_to_planar_raster() {
        let geometry = Geometry::new(64, 48).unwrap();
        let jpeg = encode_yuv(geometry);
        let mut decoder = JpegDecoder::new().unwrap();
        let raster = decoder.decode(&jpeg, geometry).unwrap();
        assert_eq!(raster.geometry(), geometry);
        assert_eq!(raster.data().len(), geometry.frame_len());
        // left edge of the test pattern is the darkest band
        assert!(raster.luma()[0] < 32);
        // right edge is the brightest band (JPEG is lossy, stay loose)
        assert!(raster.luma()[63] > 160);
    }

    #[test]
    fn geometry_mismatch_is_detected() {
        let geometry = Geometry::new(64, 48).unwrap();
        let jpeg = encode_yuv(geometry);
        let negotiated = Geometry::new(32, 32).unwrap();
        let mut decoder = JpegDecoder::new().unwrap();
        let err = decoder.decode(&jpeg, negotiated).unwrap_err();
        assert!(matches!(err, RelayError::GeometryMismatch { .. }));
        assert!(err.is_session_fatal());
    }

    #[test]
    fn non_420_subsampling_is_a_fatal_decode_error() {
        let geometry = Geometry::new(32, 32).unwrap();
        // 4:4:4-encoded frame
        let rgb = vec![128u8; 32 * 32 * 3];
        let image = turbojpeg::Image {
            pixels: rgb.as_slice(),
            width: 32,
            pitch: 32 * 3,
            height: 32,
            format: turbojpeg::PixelFormat::RGB,
        };
        let jpeg = turbojpeg::compress(image, 90, Subsamp::None).unwrap();
        let mut decoder = JpegDecoder::new().unwrap();
        let err = decoder.decode(&jpeg, geometry).unwrap_err();
        assert!(matches!(err, RelayError::Decode { fatal: true, .. }));
    }

    #[test]
    fn garbage_input_is_a_recoverable_decode_error() {
        let geometry = Geometry::new(32, 32).unwrap();
        let mut decoder = JpegDecoder::new().unwrap();
        let err = decoder.decode(&[0u8; 64], geometry).unwrap_err();
        assert!(matches!(err, RelayError::Decode { fatal: false, .. }));
        assert!(!err.is_session_fatal());
    }
}
