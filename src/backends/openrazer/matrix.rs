use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{bus::ChromaProxy, options::Rgb};
use crate::backend::Matrix;

/// Custom frame for one device, pushed row by row.
pub struct RazerMatrix {
    chroma: ChromaProxy<'static>,
    rows: u32,
    cols: u32,
    frame: Vec<Rgb>,
}

impl RazerMatrix {
    pub fn new(chroma: ChromaProxy<'static>, rows: u32, cols: u32) -> Self {
        Self {
            chroma,
            rows,
            cols,
            frame: vec![(0, 0, 0); (rows * cols) as usize],
        }
    }
}

/// `setKeyRow` payload for one complete row.
///
/// Row index and last column travel as single bytes.
pub fn key_row_payload(row: usize, colours: &[Rgb]) -> Result<Vec<u8>> {
    let row_byte = u8::try_from(row).with_context(|| format!("Row {row} out of range"))?;
    let last = colours.len().saturating_sub(1);
    let last_byte =
        u8::try_from(last).with_context(|| format!("Row {row} has {} keys", last + 1))?;

    let mut payload = Vec::with_capacity(3 + colours.len() * 3);
    payload.extend([row_byte, 0, last_byte]);
    for (r, g, b) in colours {
        payload.extend([*r, *g, *b]);
    }
    Ok(payload)
}

#[async_trait]
impl Matrix for RazerMatrix {
    fn rows(&self) -> u32 {
        self.rows
    }

    fn cols(&self) -> u32 {
        self.cols
    }

    fn set(&mut self, x: u32, y: u32, rgb: Rgb) {
        if x < self.cols && y < self.rows {
            self.frame[(y * self.cols + x) as usize] = rgb;
        }
    }

    fn clear(&mut self) {
        self.frame.fill((0, 0, 0));
    }

    async fn draw(&self) -> Result<()> {
        for (row, colours) in self.frame.chunks(self.cols.max(1) as usize).enumerate() {
            self.chroma
                .set_key_row(&key_row_payload(row, colours)?)
                .await
                .with_context(|| format!("Failed to send row {row}"))?;
        }
        self.chroma
            .set_custom()
            .await
            .context("Failed to show custom frame")
    }
}
