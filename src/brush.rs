use std::rc::Rc;

use serde::Deserialize;

/// Largest brush diameter the generator will rasterize, in canvas pixels.
pub const MAX_BRUSH_SIZE: f32 = 512.0;

/// Width of the anti-aliased rim of a hard-edged brush, in pixels.
const MIN_FEATHER_PX: f32 = 1.0;

/// Everything that determines how a brush raster looks.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrushParams {
    /// Diameter in canvas pixels.
    pub size: f32,
    /// `0xRRGGBB`. Ignored while erasing.
    pub color: u32,
    /// 0 is a hard edge, 1 fades from the center all the way to the rim.
    pub smoothing: f32,
    pub erase: bool,
}

impl Default for BrushParams {
    fn default() -> Self {
        Self {
            size: 48.0,
            color: 0x2ecc71,
            smoothing: 0.5,
            erase: false,
        }
    }
}

impl BrushParams {
    /// Returns a copy with every field brought into its valid range.
    ///
    /// NaN sizes end up at the minimum size.
    pub fn clamped(self) -> Self {
        let size = if self.size.is_nan() { 1.0 } else { self.size };
        let smoothing = if self.smoothing.is_nan() {
            0.0
        } else {
            self.smoothing
        };
        Self {
            size: size.clamp(1.0, MAX_BRUSH_SIZE),
            color: self.color & 0xff_ffff,
            smoothing: smoothing.clamp(0.0, 1.0),
            erase: self.erase,
        }
    }

    /// Distance between two adjacent stamps that still makes them overlap.
    pub fn spacing(&self) -> f32 {
        self.clamped().size / 8.0
    }
}

/// A rasterized brush: a soft-edged disc in premultiplied RGBA.
///
/// Erasing only uses the alpha channel.
#[derive(Debug)]
pub struct BrushTexture {
    id: u64,
    params: BrushParams,
    width: u32,
    height: u32,
    /// Premultiplied RGBA, row-major.
    pixels: Vec<[f32; 4]>,
}

impl BrushTexture {
    /// Identifies this raster among all rasters produced by the same generator.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn params(&self) -> &BrushParams {
        &self.params
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[(y * self.width + x) as usize]
    }
}

/// Produces brush rasters, remembering the most recent one.
#[derive(Default)]
pub struct BrushGenerator {
    cached: Option<Rc<BrushTexture>>,
    next_id: u64,
}

impl BrushGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raster for `params`, rebuilding it only if `params` differ from the previous
    /// call.
    pub fn get(&mut self, params: &BrushParams) -> Rc<BrushTexture> {
        let params = params.clamped();
        if let Some(cached) = &self.cached {
            if cached.params == params {
                return cached.clone();
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        log::debug!(
            "generating brush #{id}: size={} color={:06x} smoothing={} erase={}",
            params.size,
            params.color,
            params.smoothing,
            params.erase,
        );

        let texture = Rc::new(rasterize(id, params));
        self.cached = Some(texture.clone());
        texture
    }
}

fn rasterize(id: u64, params: BrushParams) -> BrushTexture {
    let side = params.size.ceil() as u32;
    let radius = params.size / 2.0;
    let center = side as f32 / 2.0;
    let feather = (params.smoothing * radius).max(MIN_FEATHER_PX);

    let rgb = if params.erase {
        [1.0; 3]
    } else {
        let channel = |shift: u32| ((params.color >> shift) & 0xff) as f32 / 255.0;
        [channel(16), channel(8), channel(0)]
    };

    let mut pixels = Vec::with_capacity((side * side) as usize);
    for y in 0..side {
        for x in 0..side {
            let dx = x as f32 + 0.5 - center;
            let dy = y as f32 + 0.5 - center;
            let dist = (dx * dx + dy * dy).sqrt();
            let t = ((radius - dist) / feather).clamp(0.0, 1.0);
            let alpha = t * t * (3.0 - 2.0 * t);
            pixels.push([rgb[0] * alpha, rgb[1] * alpha, rgb[2] * alpha, alpha]);
        }
    }

    BrushTexture {
        id,
        params,
        width: side,
        height: side,
        pixels,
    }
}
