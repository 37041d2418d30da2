use std::rc::Rc;

use crate::{
    brush::{BrushGenerator, BrushParams, BrushTexture},
    math::{lerp, Vec2f},
    pool::{CompositeMode, Stamp, StampPool},
};

/// Most stamps a single segment is filled with. Longer segments get sparser stamps.
pub const MAX_SEGMENT_STAMPS: usize = 1 << 16;

/// Something stamps can be composited onto, once per frame.
pub trait Surface {
    /// Composites `stamps` in order. `stamps` is never empty.
    fn composite(&mut self, stamps: &[Stamp]);
}

/// Turns pen movements into brush stamps and queues them for the next frame.
pub struct StrokeRasterizer {
    brushes: BrushGenerator,
    pool: StampPool,
}

impl StrokeRasterizer {
    pub fn new() -> Self {
        Self {
            brushes: BrushGenerator::new(),
            pool: StampPool::new(),
        }
    }

    /// Stamps the segment `old..=new` with `brush`.
    ///
    /// `new` is always stamped. Stamps are added between the two ends so that no two
    /// consecutive stamps are further than `brush.spacing()` apart; `old` itself is not
    /// stamped, it was the end of the previous segment.
    ///
    /// Segments with a non-finite end are dropped. At most [`MAX_SEGMENT_STAMPS`] stamps are
    /// placed per segment.
    pub fn add_segment(&mut self, old: Vec2f, new: Vec2f, brush: &BrushParams) {
        let dist = old.dist(new);
        if !dist.is_finite() {
            log::warn!("dropping segment {old:?} -> {new:?}");
            return;
        }

        let texture = self.brushes.get(brush);
        let mode = CompositeMode::for_eraser(brush.erase);

        let mut put = |position| {
            *self.pool.acquire() = Stamp {
                position,
                texture: Some(texture.clone()),
                mode,
            };
        };

        put(new);

        let step = brush.spacing();
        if dist >= step {
            let mut n = (dist / step).ceil() as usize;
            if n > MAX_SEGMENT_STAMPS {
                log::warn!(
                    "segment of length {dist} needs {n} stamps, placing {MAX_SEGMENT_STAMPS}"
                );
                n = MAX_SEGMENT_STAMPS;
            }
            for i in 1..n {
                put(lerp(old..=new, i as f32 / n as f32));
            }
        }
    }

    /// The raster `brush` stamps with.
    pub fn brush(&mut self, brush: &BrushParams) -> Rc<BrushTexture> {
        self.brushes.get(brush)
    }

    /// Whether any stamps are waiting for [`StrokeRasterizer::flush_frame`].
    pub fn has_pending(&self) -> bool {
        !self.pool.in_use().is_empty()
    }

    /// Drops all stamps added since the last flush.
    pub fn discard_pending(&mut self) {
        self.pool.reset_frame();
    }

    /// Composites all stamps added since the last flush onto `surface`, then recycles them.
    pub fn flush_frame(&mut self, surface: &mut impl Surface) {
        let stamps = self.pool.in_use();
        if !stamps.is_empty() {
            log::trace!(
                "compositing {} stamps (pool capacity {})",
                stamps.len(),
                self.pool.capacity()
            );
            surface.composite(stamps);
        }
        self.pool.reset_frame();
    }
}

/// Tracks whether the pointer is down and where it was last seen.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Stroke {
    #[default]
    Idle,
    Drawing {
        last: Vec2f,
    },
}

impl Stroke {
    pub fn begin(&mut self, position: Vec2f) {
        *self = Stroke::Drawing { last: position };
    }

    /// Moves the pointer to `position`, returning the segment to draw if a stroke is active.
    pub fn move_to(&mut self, position: Vec2f) -> Option<(Vec2f, Vec2f)> {
        match self {
            Stroke::Idle => None,
            Stroke::Drawing { last } => {
                let segment = (*last, position);
                *last = position;
                Some(segment)
            }
        }
    }

    pub fn end(&mut self) {
        *self = Stroke::Idle;
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self, Stroke::Drawing { .. })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::math::vec2;

    /// Remembers everything composited onto it.
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub frames: Vec<Vec<(Vec2f, CompositeMode, u64)>>,
    }

    impl Surface for Recorder {
        fn composite(&mut self, stamps: &[Stamp]) {
            self.frames.push(
                stamps
                    .iter()
                    .map(|s| {
                        let id = s.texture.as_ref().expect("stamp without texture").id();
                        (s.position, s.mode, id)
                    })
                    .collect(),
            );
        }
    }

    fn brush(size: f32) -> BrushParams {
        BrushParams {
            size,
            ..BrushParams::default()
        }
    }

    fn segment(old: Vec2f, new: Vec2f, size: f32) -> Vec<(Vec2f, CompositeMode, u64)> {
        let mut raster = StrokeRasterizer::new();
        raster.add_segment(old, new, &brush(size));
        let mut rec = Recorder::default();
        raster.flush_frame(&mut rec);
        assert_eq!(rec.frames.len(), 1);
        rec.frames.remove(0)
    }

    #[test]
    fn stamp_counts() {
        // (distance, brush size, expected stamps)
        let cases = [
            (0.0, 48.0, 1),
            (5.9, 48.0, 1),
            (6.0, 48.0, 1),
            (10.0, 48.0, 2),
            (12.0, 48.0, 2),
            (12.5, 48.0, 3),
            (100.0, 8.0, 100),
            (3.0, 0.0, 24),
        ];
        for (dist, size, expected) in cases {
            let stamps = segment(vec2(0.0, 0.0), vec2(dist, 0.0), size);
            assert_eq!(stamps.len(), expected, "dist={dist} size={size}");
        }
    }

    #[test]
    fn endpoint_first_then_interpolated_in_order() {
        let a = vec2(10.0, 20.0);
        let b = vec2(40.0, 60.0); // 50 apart
        let stamps = segment(a, b, 80.0); // step 10 -> 5 stamps
        assert_eq!(stamps.len(), 5);
        assert_eq!(stamps[0].0, b);

        let total = a.dist(b);
        let mut prev = 0.0;
        for &(p, _, _) in &stamps[1..] {
            let from_a = a.dist(p);
            let from_b = p.dist(b);
            assert!(from_a > prev, "not increasing: {from_a} <= {prev}");
            assert!(from_a > 0.0 && from_a < total);
            // On the segment.
            assert!((from_a + from_b - total).abs() < 1e-3);
            prev = from_a;
        }
        assert!((stamps[1].0.dist(vec2(16.0, 28.0))) < 1e-4);
    }

    #[test]
    fn consecutive_stamps_overlap() {
        let a = vec2(0.0, 0.0);
        let b = vec2(300.0, 400.0);
        let brush = brush(24.0);
        let stamps = segment(a, b, brush.size);
        let mut points: Vec<Vec2f> = stamps[1..].iter().map(|s| s.0).collect();
        points.insert(0, a);
        points.push(b);
        for pair in points.windows(2) {
            assert!(pair[0].dist(pair[1]) <= brush.spacing() + 1e-3);
        }
    }

    #[test]
    fn eraser_stamps_use_erase_mode() {
        let mut raster = StrokeRasterizer::new();
        let eraser = BrushParams {
            erase: true,
            ..BrushParams::default()
        };
        raster.add_segment(vec2(0.0, 0.0), vec2(30.0, 0.0), &eraser);
        let mut rec = Recorder::default();
        raster.flush_frame(&mut rec);
        assert!(rec.frames[0].iter().all(|s| s.1 == CompositeMode::Erase));
    }

    #[test]
    fn flush_preserves_order_across_brushes() {
        let mut raster = StrokeRasterizer::new();
        let paint = BrushParams::default();
        let eraser = BrushParams {
            erase: true,
            ..paint
        };
        raster.add_segment(vec2(0.0, 0.0), vec2(1.0, 0.0), &paint);
        raster.add_segment(vec2(1.0, 0.0), vec2(2.0, 0.0), &eraser);
        raster.add_segment(vec2(2.0, 0.0), vec2(3.0, 0.0), &paint);

        let mut rec = Recorder::default();
        raster.flush_frame(&mut rec);
        let modes: Vec<_> = rec.frames[0].iter().map(|s| s.1).collect();
        assert_eq!(
            modes,
            [
                CompositeMode::Normal,
                CompositeMode::Erase,
                CompositeMode::Normal
            ]
        );
        assert_ne!(rec.frames[0][0].2, rec.frames[0][1].2);
    }

    #[test]
    fn flush_resets_pool() {
        let mut raster = StrokeRasterizer::new();
        raster.add_segment(vec2(0.0, 0.0), vec2(60.0, 0.0), &brush(48.0));
        assert!(raster.has_pending());

        let mut rec = Recorder::default();
        raster.flush_frame(&mut rec);
        assert!(!raster.has_pending());
        assert_eq!(rec.frames[0].len(), 10);

        // Nothing new: the surface is left alone.
        raster.flush_frame(&mut rec);
        assert_eq!(rec.frames.len(), 1);

        raster.add_segment(vec2(60.0, 0.0), vec2(61.0, 0.0), &brush(48.0));
        raster.flush_frame(&mut rec);
        assert_eq!(rec.frames[1].len(), 1);
    }

    #[test]
    fn long_segments_are_capped() {
        let stamps = segment(vec2(0.0, 0.0), vec2(1e6, 0.0), 1.0);
        assert_eq!(stamps.len(), MAX_SEGMENT_STAMPS);
        assert_eq!(stamps[0].0, vec2(1e6, 0.0));
        assert!(stamps.iter().all(|s| (0.0..=1e6).contains(&s.0.x())));
    }

    #[test]
    fn non_finite_segments_are_dropped() {
        let mut raster = StrokeRasterizer::new();
        raster.add_segment(vec2(0.0, 0.0), vec2(f32::INFINITY, 0.0), &brush(48.0));
        raster.add_segment(vec2(f32::NAN, 0.0), vec2(1.0, 0.0), &brush(48.0));
        assert!(!raster.has_pending());
    }

    #[test]
    fn discarded_stamps_are_never_composited() {
        let mut raster = StrokeRasterizer::new();
        raster.add_segment(vec2(0.0, 0.0), vec2(30.0, 0.0), &brush(48.0));
        raster.discard_pending();
        assert!(!raster.has_pending());

        let mut rec = Recorder::default();
        raster.flush_frame(&mut rec);
        assert!(rec.frames.is_empty());

        raster.add_segment(vec2(30.0, 0.0), vec2(31.0, 0.0), &brush(48.0));
        raster.flush_frame(&mut rec);
        assert_eq!(rec.frames.len(), 1);
        assert_eq!(rec.frames[0].len(), 1);
    }

    #[test]
    fn tap_without_drag_draws_nothing() {
        let mut stroke = Stroke::default();
        stroke.begin(vec2(5.0, 5.0));
        assert!(stroke.is_drawing());
        stroke.end();
        assert_eq!(stroke, Stroke::Idle);
    }

    #[test]
    fn move_without_down_is_ignored() {
        let mut stroke = Stroke::default();
        assert_eq!(stroke.move_to(vec2(1.0, 1.0)), None);
        assert!(!stroke.is_drawing());
    }

    #[test]
    fn moves_chain_segments() {
        let mut stroke = Stroke::default();
        stroke.begin(vec2(0.0, 0.0));
        assert_eq!(
            stroke.move_to(vec2(1.0, 0.0)),
            Some((vec2(0.0, 0.0), vec2(1.0, 0.0)))
        );
        assert_eq!(
            stroke.move_to(vec2(2.0, 1.0)),
            Some((vec2(1.0, 0.0), vec2(2.0, 1.0)))
        );
        stroke.end();
        assert_eq!(stroke.move_to(vec2(3.0, 3.0)), None);
    }
}
