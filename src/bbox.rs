use nalgebra as na;
use num_traits::AsPrimitive;
use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug + Copy + PartialEq {}

/// Left-top-width-height format, contains left top corner and width-height
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Ltwh;
impl BBoxFormat for Ltwh {}

/// Left-top-right-bottom format, contains left top and right bottom corners (exclusive)
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

/// Integer pixel rectangle tagged with its coordinate format
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BBox<F: BBoxFormat>([i32; 4], PhantomData<F>);

/// The box every detector and tracker speaks: `x, y` is the top-left corner.
pub type BoundingBox = BBox<Ltwh>;

impl<F: BBoxFormat> From<BBox<F>> for [i32; 4] {
    fn from(bbox: BBox<F>) -> Self {
        bbox.0
    }
}

impl<F: BBoxFormat> From<[i32; 4]> for BBox<F> {
    fn from(raw: [i32; 4]) -> Self {
        BBox(raw, PhantomData)
    }
}

impl<F: BBoxFormat> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[i32; 4] {
        &self.0
    }
}

impl BBox<Ltwh> {
    #[inline]
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        BBox([x, y, w, h], PhantomData)
    }

    /// Builds a box from floating point (or wider integer) coordinates,
    /// truncating each component toward zero.
    #[inline]
    pub fn from_ltwh<T: AsPrimitive<i32>>(x: T, y: T, w: T, h: T) -> Self {
        Self::new(x.as_(), y.as_(), w.as_(), h.as_())
    }

    #[inline(always)]
    pub fn x(&self) -> i32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn y(&self) -> i32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn width(&self) -> i32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> i32 {
        self.0[3]
    }

    #[inline]
    pub fn top_left(&self) -> na::Point2<f32> {
        na::Point2::new(self.x() as f32, self.y() as f32)
    }

    #[inline]
    pub fn area(&self) -> i64 {
        self.width().max(0) as i64 * self.height().max(0) as i64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    #[inline]
    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x() + dx, self.y() + dy, self.width(), self.height())
    }

    #[inline]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.into()
    }

    /// Intersection with a `width` x `height` image, `None` when nothing is left.
    pub fn clip(&self, width: i32, height: i32) -> Option<Self> {
        let ltrb = self.as_ltrb();
        let clipped = BBox::<Ltrb>::ltrb(
            ltrb.left().max(0),
            ltrb.top().max(0),
            ltrb.right().min(width),
            ltrb.bottom().min(height),
        )
        .as_ltwh();

        if clipped.is_empty() {
            None
        } else {
            Some(clipped)
        }
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(l: i32, t: i32, r: i32, b: i32) -> Self {
        BBox([l, t, r, b], PhantomData)
    }

    #[inline]
    pub fn as_ltwh(&self) -> BBox<Ltwh> {
        self.into()
    }

    #[inline(always)]
    pub fn left(&self) -> i32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> i32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> i32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> i32 {
        self.0[3]
    }
}

impl<'a> From<&'a BBox<Ltwh>> for BBox<Ltrb> {
    #[inline]
    fn from(v: &'a BBox<Ltwh>) -> Self {
        Self::ltrb(v.0[0], v.0[1], v.0[0] + v.0[2], v.0[1] + v.0[3])
    }
}

impl<'a> From<&'a BBox<Ltrb>> for BBox<Ltwh> {
    #[inline]
    fn from(v: &'a BBox<Ltrb>) -> Self {
        Self::new(v.0[0], v.0[1], v.0[2] - v.0[0], v.0[3] - v.0[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_conversion_truncates() {
        let bbox = BoundingBox::from_ltwh(100.9f32, 280.2, 20.7, 19.999);
        assert_eq!(bbox, BoundingBox::new(100, 280, 20, 19));

        let bbox = BoundingBox::from_ltwh(12.5f64, 0.4, 3.0, 3.0);
        assert_eq!(bbox.as_slice(), &[12, 0, 3, 3]);
    }

    #[test]
    fn test_ltrb_conversion() {
        let bbox = BoundingBox::new(10, 20, 30, 40);
        let ltrb = bbox.as_ltrb();
        assert_eq!((ltrb.right(), ltrb.bottom()), (40, 60));
        assert_eq!(ltrb.as_ltwh(), bbox);
    }

    #[test]
    fn test_clip() {
        let bbox = BoundingBox::new(-5, 470, 20, 20);
        assert_eq!(bbox.clip(640, 480), Some(BoundingBox::new(0, 470, 15, 10)));
        assert_eq!(BoundingBox::new(700, 10, 5, 5).clip(640, 480), None);
    }

    #[test]
    fn test_serde_as_array() {
        let bbox = BoundingBox::new(1, 2, 3, 4);
        let json = serde_json::to_string(&bbox).unwrap();
        assert_eq!(json, "[1,2,3,4]");

        let back: BoundingBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bbox);
    }
}
