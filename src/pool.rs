use std::rc::Rc;

use crate::{brush::BrushTexture, math::Vec2f};

/// How a stamp is blended onto the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeMode {
    /// Premultiplied source-over.
    #[default]
    Normal,
    /// Removes destination alpha by the stamp's alpha.
    Erase,
}

impl CompositeMode {
    pub fn for_eraser(erase: bool) -> Self {
        if erase {
            Self::Erase
        } else {
            Self::Normal
        }
    }
}

/// One placed brush impression.
#[derive(Debug, Clone, Default)]
pub struct Stamp {
    /// Center position in canvas pixels.
    pub position: Vec2f,
    /// `None` only while the slot is free.
    pub texture: Option<Rc<BrushTexture>>,
    pub mode: CompositeMode,
}

/// Stamp slots that are reused from frame to frame.
///
/// The pool only ever grows, so its size settles at the densest frame seen so far.
#[derive(Default)]
pub struct StampPool {
    slots: Vec<Stamp>,
    /// Number of slots handed out since the last reset.
    cursor: usize,
}

impl StampPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next free slot, allocating one if all are in use.
    ///
    /// The slot still holds whatever the previous frame wrote to it; callers overwrite every
    /// field.
    pub fn acquire(&mut self) -> &mut Stamp {
        if self.cursor == self.slots.len() {
            self.slots.push(Stamp::default());
        }
        let slot = &mut self.slots[self.cursor];
        self.cursor += 1;
        slot
    }

    /// Frees every slot for the next frame without releasing slot storage.
    pub fn reset_frame(&mut self) {
        for slot in &mut self.slots[..self.cursor] {
            // Don't keep superseded brush rasters alive until the slot is reused.
            slot.texture = None;
        }
        self.cursor = 0;
    }

    /// The stamps handed out since the last reset, in acquisition order.
    pub fn in_use(&self) -> &[Stamp] {
        &self.slots[..self.cursor]
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
