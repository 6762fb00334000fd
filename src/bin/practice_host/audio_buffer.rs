//! Fixed-size engine blocks carried across variable-size device callbacks.

use crate::renderer::BlockRenderer;

pub(crate) struct CarryBuffer<R: BlockRenderer> {
    renderer: R,
    left: Vec<f32>,
    right: Vec<f32>,
    // Frames of the current block not yet handed to the device.
    available: usize,
    index: usize,
}

impl<R: BlockRenderer> CarryBuffer<R> {
    pub(crate) fn new(renderer: R, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            renderer,
            left: vec![0.0; block_size],
            right: vec![0.0; block_size],
            available: 0,
            index: 0,
        }
    }

    /// Fill `frames` output frames, calling `write(frame, left, right)` for each.
    pub(crate) fn pull(&mut self, frames: usize, mut write: impl FnMut(usize, f32, f32)) {
        let mut written = 0;
        while written < frames {
            if self.available == 0 {
                self.left.fill(0.0);
                self.right.fill(0.0);
                self.renderer.render_block(&mut self.left, &mut self.right);
                self.index = 0;
                self.available = self.left.len();
            }

            let count = (frames - written).min(self.available);
            for i in 0..count {
                let at = self.index + i;
                write(written + i, self.left[at], self.right[at]);
            }
            written += count;
            self.index += count;
            self.available -= count;
        }
    }
}
