use std::collections::HashMap;

use serde::Deserialize;

use crate::{
    brush::BrushParams,
    math::{vec2, Vec2f},
    stroke::StrokeRasterizer,
};

/// Layer color that makes the layer erase instead of paint.
pub const ERASE_COLOR: i64 = -1;

/// A call made through the control surface.
///
/// Wire format is one JSON object per call, e.g.
/// `{"pushGraffitiPoint": {"layerId": "L1", "x": 10, "y": 0}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum ApiCall {
    #[serde(rename = "createGraffitiLayer", rename_all = "camelCase")]
    CreateLayer {
        layer_id: String,
        color: i64,
        size: f32,
    },
    #[serde(rename = "pushGraffitiPoint", rename_all = "camelCase")]
    PushPoint { layer_id: String, x: f32, y: f32 },
}

#[derive(Debug)]
struct Layer {
    color: i64,
    size: f32,
    body: Vec<Vec2f>,
}

impl Layer {
    /// The brush to draw this layer with: the layer's size and color on top of `ambient`.
    fn brush(&self, ambient: &BrushParams) -> BrushParams {
        let erase = self.color == ERASE_COLOR;
        BrushParams {
            size: self.size,
            color: if erase {
                ambient.color
            } else {
                self.color as u32
            },
            smoothing: ambient.smoothing,
            erase,
        }
    }
}

/// All layers created during this session.
#[derive(Default)]
pub struct Layers {
    layers: HashMap<String, Layer>,
}

impl Layers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Performs `call`. Returns whether anything was drawn.
    pub fn apply(
        &mut self,
        call: ApiCall,
        ambient: &BrushParams,
        raster: &mut StrokeRasterizer,
    ) -> bool {
        match call {
            ApiCall::CreateLayer {
                layer_id,
                color,
                size,
            } => {
                self.create_layer(layer_id, color, size);
                false
            }
            ApiCall::PushPoint { layer_id, x, y } => {
                self.push_point(&layer_id, vec2(x, y), ambient, raster)
            }
        }
    }

    /// Registers a layer, replacing any existing layer with the same id.
    pub fn create_layer(&mut self, layer_id: String, color: i64, size: f32) {
        log::info!(
            "creating layer '{layer_id}' (color={color}, size={size}, {} layers so far)",
            self.layers.len()
        );
        let layer = Layer {
            color,
            size,
            body: Vec::new(),
        };
        if self.layers.insert(layer_id, layer).is_some() {
            log::debug!("replaced an existing layer");
        }
    }

    /// Appends `point` to a layer and draws the segment from the layer's previous point.
    ///
    /// `ambient` supplies brush settings the layer does not override; it is not modified.
    /// Unknown layers are ignored. Returns whether a segment was drawn.
    pub fn push_point(
        &mut self,
        layer_id: &str,
        point: Vec2f,
        ambient: &BrushParams,
        raster: &mut StrokeRasterizer,
    ) -> bool {
        let Some(layer) = self.layers.get_mut(layer_id) else {
            log::debug!("ignoring point for unknown layer '{layer_id}'");
            return false;
        };
        if !(point.x().is_finite() && point.y().is_finite()) {
            log::warn!("ignoring non-finite point {point:?} for layer '{layer_id}'");
            return false;
        }

        layer.body.push(point);
        let &[.., prev, _] = layer.body.as_slice() else {
            return false;
        };

        raster.add_segment(prev, point, &layer.brush(ambient));
        true
    }
}

#[cfg(test)]
impl Layers {
    fn points(&self, layer_id: &str) -> Option<usize> {
        self.layers.get(layer_id).map(|layer| layer.body.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pool::CompositeMode, stroke::tests::Recorder};

    #[test]
    fn layer_draws_once_it_has_two_points() {
        let ambient = BrushParams::default();
        let mut raster = StrokeRasterizer::new();
        let mut layers = Layers::new();

        layers.create_layer("L1".into(), 0x2ecc71, 48.0);
        assert!(!layers.push_point("L1", vec2(0.0, 0.0), &ambient, &mut raster));
        assert!(!raster.has_pending());

        assert!(layers.push_point("L1", vec2(10.0, 0.0), &ambient, &mut raster));
        let mut rec = Recorder::default();
        raster.flush_frame(&mut rec);

        // step = 48 / 8 = 6, ceil(10 / 6) = 2 stamps: the endpoint and one in between.
        let frame = &rec.frames[0];
        assert_eq!(frame.len(), 2);
        assert_eq!(frame[0].0, vec2(10.0, 0.0));
        assert_eq!(frame[1].0, vec2(5.0, 0.0));
        assert!(frame.iter().all(|s| s.1 == CompositeMode::Normal));
        assert_eq!(layers.points("L1"), Some(2));
    }

    #[test]
    fn each_point_draws_from_the_previous_one() {
        let ambient = BrushParams::default();
        let mut raster = StrokeRasterizer::new();
        let mut layers = Layers::new();
        layers.create_layer("L".into(), 0xff0000, 8.0);
        for x in [0.0, 1.0, 2.0, 3.0] {
            layers.push_point("L", vec2(x, 0.0), &ambient, &mut raster);
        }
        let mut rec = Recorder::default();
        raster.flush_frame(&mut rec);
        let xs: Vec<f32> = rec.frames[0].iter().map(|s| s.0.x()).collect();
        assert_eq!(xs, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn erase_color_erases_and_keeps_ambient_brush() {
        let ambient = BrushParams {
            size: 12.0,
            color: 0x123456,
            smoothing: 0.3,
            erase: false,
        };
        let before = ambient;
        let mut raster = StrokeRasterizer::new();
        let mut layers = Layers::new();

        layers.create_layer("E".into(), ERASE_COLOR, 16.0);
        layers.push_point("E", vec2(0.0, 0.0), &ambient, &mut raster);
        layers.push_point("E", vec2(20.0, 0.0), &ambient, &mut raster);

        let mut rec = Recorder::default();
        raster.flush_frame(&mut rec);
        assert_eq!(rec.frames[0].len(), 10);
        assert!(rec.frames[0].iter().all(|s| s.1 == CompositeMode::Erase));
        assert_eq!(ambient, before);

        // Interactive drawing right after is unaffected.
        raster.add_segment(vec2(0.0, 0.0), vec2(1.0, 0.0), &ambient);
        raster.flush_frame(&mut rec);
        assert_eq!(rec.frames[1][0].1, CompositeMode::Normal);
    }

    #[test]
    fn unknown_layer_is_a_no_op() {
        let ambient = BrushParams::default();
        let mut raster = StrokeRasterizer::new();
        let mut layers = Layers::new();
        for x in [0.0, 50.0] {
            assert!(!layers.push_point("nope", vec2(x, 0.0), &ambient, &mut raster));
        }
        assert!(!raster.has_pending());
        assert_eq!(layers.points("nope"), None);
    }

    #[test]
    fn recreating_a_layer_starts_a_new_body() {
        let ambient = BrushParams::default();
        let mut raster = StrokeRasterizer::new();
        let mut layers = Layers::new();
        layers.create_layer("L".into(), 0, 4.0);
        layers.push_point("L", vec2(0.0, 0.0), &ambient, &mut raster);
        layers.create_layer("L".into(), 0, 4.0);
        assert_eq!(layers.points("L"), Some(0));
        assert!(!layers.push_point("L", vec2(9.0, 9.0), &ambient, &mut raster));
        assert_eq!(layers.layers.len(), 1);
    }

    #[test]
    fn non_finite_points_are_ignored() {
        let ambient = BrushParams::default();
        let mut raster = StrokeRasterizer::new();
        let mut layers = Layers::new();
        layers.create_layer("L".into(), 0xff0000, 48.0);
        layers.push_point("L", vec2(0.0, 0.0), &ambient, &mut raster);

        // JSON numbers beyond f32 range parse as infinity.
        let ApiCall::PushPoint { x, y, .. } = serde_json::from_str::<ApiCall>(
            r#"{"pushGraffitiPoint": {"layerId": "L", "x": 1e39, "y": 0}}"#,
        )
        .unwrap() else {
            panic!("expected a point");
        };
        assert!(x.is_infinite());

        assert!(!layers.push_point("L", vec2(x, y), &ambient, &mut raster));
        assert!(!layers.push_point("L", vec2(0.0, f32::NAN), &ambient, &mut raster));
        assert!(!raster.has_pending());
        assert_eq!(layers.points("L"), Some(1));

        // The layer continues from its last finite point.
        assert!(layers.push_point("L", vec2(1.0, 0.0), &ambient, &mut raster));
        let mut rec = Recorder::default();
        raster.flush_frame(&mut rec);
        assert_eq!(rec.frames[0].len(), 1);
    }

    #[test]
    fn parses_calls() {
        let call: ApiCall = serde_json::from_str(
            r#"{"createGraffitiLayer": {"layerId": "L1", "color": 3066993, "size": 48}}"#,
        )
        .unwrap();
        assert_eq!(
            call,
            ApiCall::CreateLayer {
                layer_id: "L1".into(),
                color: 0x2ecc71,
                size: 48.0,
            }
        );

        let call: ApiCall =
            serde_json::from_str(r#"{"pushGraffitiPoint": {"layerId": "L1", "x": 1.5, "y": -2}}"#)
                .unwrap();
        assert_eq!(
            call,
            ApiCall::PushPoint {
                layer_id: "L1".into(),
                x: 1.5,
                y: -2.0,
            }
        );
    }

    #[test]
    fn apply_dispatches() {
        let ambient = BrushParams::default();
        let mut raster = StrokeRasterizer::new();
        let mut layers = Layers::new();
        let create = ApiCall::CreateLayer {
            layer_id: "A".into(),
            color: 0xffffff,
            size: 10.0,
        };
        let push = |x| ApiCall::PushPoint {
            layer_id: "A".into(),
            x,
            y: 0.0,
        };
        assert!(!layers.apply(create, &ambient, &mut raster));
        assert!(!layers.apply(push(0.0), &ambient, &mut raster));
        assert!(layers.apply(push(1.0), &ambient, &mut raster));
    }
}
