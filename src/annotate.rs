use crate::bbox::BoundingBox;
use crate::error::Error;
use crate::frame::Frame;
use crate::scene::TrackUpdate;
use crate::speed::SpeedZone;

use ab_glyph::FontVec;
use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use serde_derive::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// 5x7 dot matrix for the characters a speed label can contain, one row per
/// byte, bit 4 is the leftmost column.
const GLYPHS: [(char, [u8; 7]); 15] = [
    ('0', [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E]),
    ('1', [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E]),
    ('2', [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F]),
    ('3', [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E]),
    ('4', [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02]),
    ('5', [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E]),
    ('6', [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E]),
    ('7', [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08]),
    ('8', [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E]),
    ('9', [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C]),
    ('k', [0x10, 0x10, 0x12, 0x14, 0x18, 0x14, 0x12]),
    ('m', [0x00, 0x00, 0x1A, 0x15, 0x15, 0x11, 0x11]),
    ('h', [0x10, 0x10, 0x16, 0x19, 0x11, 0x11, 0x11]),
    ('/', [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00]),
    ('-', [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00]),
];

/// Colors are given in frame channel order (BGR).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AnnotationStyle {
    pub box_color: [u8; 3],
    pub box_thickness: u32,
    pub label_color: [u8; 3],
    pub label_scale: f32,
    pub font_path: Option<PathBuf>,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            box_color: [0, 255, 255],
            box_thickness: 2,
            label_color: [0, 0, 100],
            label_scale: 20.0,
            font_path: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Label {
    pub text: String,
    /// Baseline start of the text, `[x, y]`.
    pub origin: [i32; 2],
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Annotation {
    pub track_id: u64,
    pub bbox: BoundingBox,
    pub speed: Option<f32>,
    pub label: Option<Label>,
}

/// How label text gets onto the frame.
enum LabelFace {
    Font(FontVec),
    #[cfg_attr(feature = "opencv-backend", allow(dead_code))]
    Glyphs,
    #[cfg(feature = "opencv-backend")]
    Hershey,
}

pub struct Annotator {
    style: AnnotationStyle,
    face: LabelFace,
}

impl Annotator {
    pub fn new(style: AnnotationStyle) -> Result<Self, Error> {
        let face = match &style.font_path {
            Some(path) => {
                let data = std::fs::read(path)?;
                let font = FontVec::try_from_vec(data).map_err(|err| {
                    Error::InvalidConfig(format!("font {}: {}", path.display(), err))
                })?;

                LabelFace::Font(font)
            }
            None => Self::fallback_face(),
        };

        Ok(Self { style, face })
    }

    #[cfg(feature = "opencv-backend")]
    fn fallback_face() -> LabelFace {
        warn!("no label font configured, speed labels use the Hershey font");
        LabelFace::Hershey
    }

    #[cfg(not(feature = "opencv-backend"))]
    fn fallback_face() -> LabelFace {
        warn!("no label font configured, speed labels use built-in glyphs");
        LabelFace::Glyphs
    }

    #[inline]
    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    /// One annotation per successfully updated track.
    ///
    /// The speed label is only attached on frames where the box moved, a speed
    /// is on record and the entry row (`box_prev.y`) has reached the display
    /// threshold. It is anchored above the middle of the entry box.
    pub fn annotate(&self, updates: &[TrackUpdate], zone: &SpeedZone) -> Vec<Annotation> {
        updates
            .iter()
            .map(|u| {
                let label = match u.speed {
                    Some(speed) if u.moved() && zone.displayable(u.box_prev.y()) => Some(Label {
                        text: format!("{}km/h", speed as i32),
                        origin: [
                            u.box_prev.x() + u.box_prev.width() / 2,
                            u.box_prev.y() - 5,
                        ],
                    }),
                    _ => None,
                };

                Annotation {
                    track_id: u.track_id,
                    bbox: u.box_curr,
                    speed: u.speed,
                    label,
                }
            })
            .collect()
    }

    /// Draws boxes and labels onto `image`.
    pub fn render(&self, image: &mut Frame, annotations: &[Annotation]) -> Result<(), Error> {
        self.draw(image, annotations)?;

        #[cfg(feature = "opencv-backend")]
        self.put_hershey_labels(image, annotations)?;

        Ok(())
    }

    #[cfg(feature = "opencv-backend")]
    fn put_hershey_labels(
        &self,
        image: &mut Frame,
        annotations: &[Annotation],
    ) -> Result<(), Error> {
        if !matches!(self.face, LabelFace::Hershey) {
            return Ok(());
        }

        let labels: Vec<&Label> = annotations.iter().filter_map(|a| a.label.as_ref()).collect();
        if labels.is_empty() {
            return Ok(());
        }

        crate::opencv_backend::put_labels(image, &labels, self.style.label_color)
    }

    fn draw(&self, image: &mut Frame, annotations: &[Annotation]) -> Result<(), Error> {
        let (width, height) = image.dims();
        let data = image
            .pixels
            .as_slice_mut()
            .ok_or(Error::NonContiguousFrame)?;
        let mut canvas = ImageBuffer::<Rgb<u8>, &mut [u8]>::from_raw(width, height, data)
            .ok_or(Error::NonContiguousFrame)?;

        let box_color = Rgb(self.style.box_color);
        let label_color = Rgb(self.style.label_color);

        for ann in annotations {
            for i in 0..self.style.box_thickness as i32 {
                let w = ann.bbox.width() - 2 * i;
                let h = ann.bbox.height() - 2 * i;
                if w <= 0 || h <= 0 {
                    break;
                }

                let rect = Rect::at(ann.bbox.x() + i, ann.bbox.y() + i).of_size(w as u32, h as u32);
                draw_hollow_rect_mut(&mut canvas, rect, box_color);
            }

            let label = match &ann.label {
                Some(label) => label,
                None => continue,
            };

            let [x, y] = label.origin;
            match &self.face {
                LabelFace::Font(font) => {
                    let top = y - self.style.label_scale as i32;
                    draw_text_mut(
                        &mut canvas,
                        label_color,
                        x,
                        top,
                        self.style.label_scale,
                        font,
                        &label.text,
                    );
                }
                LabelFace::Glyphs => {
                    let dot = (self.style.label_scale / 10.0).round().max(1.0) as u32;
                    draw_glyphs(&mut canvas, label_color, x, y, dot, &label.text);
                }
                #[cfg(feature = "opencv-backend")]
                LabelFace::Hershey => {}
            }
        }

        Ok(())
    }
}

/// Draws `text` with [`GLYPHS`], `dot` pixels per matrix cell, with the
/// baseline at `y`. Characters without a glyph leave a blank cell.
fn draw_glyphs(
    canvas: &mut ImageBuffer<Rgb<u8>, &mut [u8]>,
    color: Rgb<u8>,
    x: i32,
    y: i32,
    dot: u32,
    text: &str,
) {
    let step = dot as i32;
    let top = y - 7 * step;

    for (n, ch) in text.chars().enumerate() {
        let rows = match GLYPHS.iter().find(|(c, _)| *c == ch) {
            Some((_, rows)) => rows,
            None => continue,
        };

        let left = x + n as i32 * 6 * step;
        for (r, bits) in rows.iter().enumerate() {
            for c in 0..5 {
                if bits & (0x10 >> c) != 0 {
                    let rect = Rect::at(left + c * step, top + r as i32 * step).of_size(dot, dot);
                    draw_filled_rect_mut(canvas, rect, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Axis};

    fn update(prev: BoundingBox, curr: BoundingBox, speed: Option<f32>) -> TrackUpdate {
        TrackUpdate {
            track_id: 3,
            box_prev: prev,
            box_curr: curr,
            speed,
            sampled: false,
        }
    }

    #[test]
    fn test_label_text_and_anchor() {
        let annotator = Annotator::new(AnnotationStyle::default()).unwrap();
        let zone = SpeedZone::default();

        let prev = BoundingBox::new(100, 285, 21, 20);
        let ups = [update(prev, prev.translate(5, 5), Some(52.07))];
        let anns = annotator.annotate(&ups, &zone);

        assert_eq!(anns.len(), 1);
        assert_eq!(anns[0].bbox, BoundingBox::new(105, 290, 21, 20));
        assert_eq!(
            anns[0].label,
            Some(Label {
                text: "52km/h".into(),
                origin: [110, 280],
            })
        );
    }

    #[test]
    fn test_label_needs_speed_movement_and_threshold() {
        let annotator = Annotator::new(AnnotationStyle::default()).unwrap();
        let zone = SpeedZone::default();
        let prev = BoundingBox::new(100, 200, 20, 20);

        let ups = [
            update(prev, prev.translate(0, 5), None),
            update(prev, prev, Some(40.0)),
            update(prev.translate(0, -30), prev, Some(40.0)),
            update(prev, prev.translate(0, 5), Some(40.0)),
        ];
        let anns = annotator.annotate(&ups, &zone);

        assert_eq!(anns.len(), 4);
        assert!(anns[0].label.is_none());
        assert!(anns[1].label.is_none());
        // entry row 170 is above the display threshold
        assert!(anns[2].label.is_none());
        assert!(anns[3].label.is_some());
    }

    #[test]
    fn test_render_draws_box_outline() {
        let annotator = Annotator::new(AnnotationStyle::default()).unwrap();
        let mut frame = Frame::blank(1, 64, 48);
        let ann = Annotation {
            track_id: 1,
            bbox: BoundingBox::new(10, 10, 20, 20),
            speed: None,
            label: None,
        };

        annotator.render(&mut frame, &[ann]).unwrap();

        assert_eq!(frame.pixels[[10, 10, 1]], 255);
        assert_eq!(frame.pixels[[11, 15, 2]], 255);
        assert_eq!(frame.pixels[[29, 29, 0]], 0);
        assert_eq!(frame.pixels[[29, 29, 1]], 255);
        // inside stays untouched
        assert_eq!(frame.pixels[[20, 20, 1]], 0);
    }

    #[test]
    fn test_render_clips_boxes_leaving_the_frame() {
        let annotator = Annotator::new(AnnotationStyle::default()).unwrap();
        let mut frame = Frame::blank(1, 64, 48);
        let ann = Annotation {
            track_id: 1,
            bbox: BoundingBox::new(50, 40, 30, 30),
            speed: Some(10.0),
            label: Some(Label {
                text: "10km/h".into(),
                origin: [65, 35],
            }),
        };

        annotator.render(&mut frame, &[ann]).unwrap();
        assert_eq!(frame.pixels[[40, 50, 1]], 255);
    }

    #[test]
    fn test_label_reaches_the_pixels_without_a_font() {
        let annotator = Annotator::new(AnnotationStyle::default()).unwrap();
        let mut frame = Frame::blank(1, 160, 60);
        let ann = Annotation {
            track_id: 1,
            bbox: BoundingBox::new(15, 35, 20, 10),
            speed: Some(52.07),
            label: Some(Label {
                text: "52km/h".into(),
                origin: [15, 25],
            }),
        };

        annotator.render(&mut frame, &[ann]).unwrap();

        let [b, g, r] = AnnotationStyle::default().label_color;
        let inked = frame
            .pixels
            .slice(s![..30, .., ..])
            .lanes(Axis(2))
            .into_iter()
            .filter(|px| px[0] == b && px[1] == g && px[2] == r)
            .count();

        assert!(inked > 20, "only {} label pixels", inked);
        // nothing below the baseline but the box
        assert_eq!(frame.pixels[[30, 20, 2]], 0);
    }

    #[cfg(not(feature = "opencv-backend"))]
    #[test]
    fn test_glyph_labels_sit_on_the_baseline() {
        let annotator = Annotator::new(AnnotationStyle::default()).unwrap();
        let mut frame = Frame::blank(1, 64, 48);
        let ann = Annotation {
            track_id: 1,
            bbox: BoundingBox::new(40, 40, 4, 4),
            speed: Some(7.0),
            label: Some(Label {
                text: "7".into(),
                origin: [10, 25],
            }),
        };

        annotator.render(&mut frame, &[ann]).unwrap();

        // top bar of the 7 spans rows 11..13 at the default scale
        assert_eq!(frame.pixels[[11, 10, 2]], 100);
        assert_eq!(frame.pixels[[12, 19, 2]], 100);
        assert_eq!(frame.pixels[[10, 10, 2]], 0);
        // last row of the stem ends right on the baseline
        assert_eq!(frame.pixels[[24, 12, 2]], 100);
        assert_eq!(frame.pixels[[25, 12, 2]], 0);
    }

    #[test]
    fn test_missing_font_is_an_error() {
        let style = AnnotationStyle {
            font_path: Some("/definitely/not/here.ttf".into()),
            ..Default::default()
        };

        assert!(Annotator::new(style).is_err());
    }
}
