use crate::bbox::BoundingBox;
use crate::error::Error;

use ndarray::prelude::*;

/// One decoded video frame: HWC, 3 channels in BGR order.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: u64,
    pub pixels: Array3<u8>,
}

/// Single channel luma plane handed to detectors and trackers.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayFrame {
    pub index: u64,
    pub pixels: Array2<u8>,
}

impl Frame {
    #[inline]
    pub fn new(index: u64, pixels: Array3<u8>) -> Self {
        Self { index, pixels }
    }

    /// Black frame of the given size.
    pub fn blank(index: u64, width: u32, height: u32) -> Self {
        Self::new(index, Array3::zeros((height as usize, width as usize, 3)))
    }

    /// Wraps a packed BGR buffer as produced by most decoders.
    pub fn from_bgr(index: u64, width: u32, height: u32, data: Vec<u8>) -> Result<Self, Error> {
        let pixels = Array3::from_shape_vec((height as usize, width as usize, 3), data)
            .map_err(|err| Error::Decode {
                src: "raw buffer".into(),
                index,
                reason: err.to_string(),
            })?;

        Ok(Self::new(index, pixels))
    }

    /// (width, height)
    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        let shape = self.pixels.shape();
        (shape[1] as u32, shape[0] as u32)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.dims().0
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.dims().1
    }

    /// BT.601 luma, the same weights the usual BGR -> GRAY conversion uses.
    pub fn gray(&self) -> GrayFrame {
        let pixels = self.pixels.map_axis(Axis(2), |px| {
            let b = px[0] as f32;
            let g = px[1] as f32;
            let r = px[2] as f32;

            (0.114 * b + 0.587 * g + 0.299 * r).round().min(255.0) as u8
        });

        GrayFrame {
            index: self.index,
            pixels,
        }
    }

    /// Paints a solid rectangle, clipped to the frame. Handy for synthetic footage.
    pub fn fill(&mut self, bbox: &BoundingBox, bgr: [u8; 3]) {
        let (w, h) = self.dims();
        if let Some(r) = bbox.clip(w as i32, h as i32) {
            let ltrb = r.as_ltrb();
            let mut region = self.pixels.slice_mut(s![
                ltrb.top() as usize..ltrb.bottom() as usize,
                ltrb.left() as usize..ltrb.right() as usize,
                ..
            ]);

            for mut px in region.lanes_mut(Axis(2)) {
                px[0] = bgr[0];
                px[1] = bgr[1];
                px[2] = bgr[2];
            }
        }
    }
}

impl GrayFrame {
    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        let shape = self.pixels.shape();
        (shape[1] as u32, shape[0] as u32)
    }

    #[inline]
    pub fn view(&self) -> ArrayView2<'_, u8> {
        self.pixels.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dims() {
        let frame = Frame::blank(1, 640, 480);
        assert_eq!(frame.dims(), (640, 480));
        assert_eq!(frame.pixels.shape(), &[480, 640, 3]);
    }

    #[test]
    fn test_gray_weights() {
        let mut frame = Frame::blank(3, 4, 2);
        frame.fill(&BoundingBox::new(0, 0, 1, 1), [255, 0, 0]);
        frame.fill(&BoundingBox::new(1, 0, 1, 1), [0, 255, 0]);
        frame.fill(&BoundingBox::new(2, 0, 1, 1), [0, 0, 255]);
        frame.fill(&BoundingBox::new(3, 0, 1, 1), [255, 255, 255]);

        let gray = frame.gray();
        assert_eq!(gray.index, 3);
        assert_eq!(gray.pixels[[0, 0]], 29);
        assert_eq!(gray.pixels[[0, 1]], 150);
        assert_eq!(gray.pixels[[0, 2]], 76);
        assert_eq!(gray.pixels[[0, 3]], 255);
        assert_eq!(gray.pixels[[1, 0]], 0);
    }

    #[test]
    fn test_fill_is_clipped() {
        let mut frame = Frame::blank(1, 10, 10);
        frame.fill(&BoundingBox::new(8, 8, 5, 5), [1, 2, 3]);

        assert_eq!(frame.pixels[[9, 9, 2]], 3);
        assert_eq!(frame.pixels[[7, 7, 0]], 0);
    }

    #[test]
    fn test_from_bgr_rejects_bad_length() {
        assert!(Frame::from_bgr(1, 4, 4, vec![0; 10]).is_err());
        assert!(Frame::from_bgr(1, 2, 2, vec![0; 12]).is_ok());
    }
}
