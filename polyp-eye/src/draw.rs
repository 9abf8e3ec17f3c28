//! Pixel-level drawing on raw frames
//!
//! Colours are always given as RGB; the canvas writes them in the frame's
//! own channel order so annotation can happen before colour conversion.

use polyp_core::{ColorOrder, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const WHITE: Color = Color([255, 255, 255]);
    pub const BLACK: Color = Color([0, 0, 0]);

    /// Pick black or white text for legibility on this background.
    pub fn contrasting_text(&self) -> Color {
        let [r, g, b] = self.0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        if luma > 150.0 {
            Color::BLACK
        } else {
            Color::WHITE
        }
    }
}

const PALETTE: [Color; 8] = [
    Color([0xA3, 0x51, 0xFB]),
    Color([0xFF, 0x40, 0x40]),
    Color([0xFF, 0xA1, 0xA0]),
    Color([0xFF, 0x76, 0x33]),
    Color([0xFF, 0xB6, 0x33]),
    Color([0xD1, 0xD4, 0x35]),
    Color([0x4C, 0xFB, 0x12]),
    Color([0x00, 0xC4, 0xFF]),
];

/// Stable colour for a class id.
pub fn class_color(class_id: usize) -> Color {
    PALETTE[class_id % PALETTE.len()]
}

pub(crate) struct Canvas<'a> {
    frame: &'a mut Frame,
}

impl<'a> Canvas<'a> {
    pub(crate) fn new(frame: &'a mut Frame) -> Self {
        Self { frame }
    }

    pub(crate) fn width(&self) -> i32 {
        self.frame.width as i32
    }

    pub(crate) fn height(&self) -> i32 {
        self.frame.height as i32
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width() || y >= self.height() {
            return None;
        }
        Some((y as usize * self.frame.width as usize + x as usize) * 3)
    }

    fn ordered(&self, color: Color) -> [u8; 3] {
        let [r, g, b] = color.0;
        match self.frame.order {
            ColorOrder::Rgb => [r, g, b],
            ColorOrder::Bgr => [b, g, r],
        }
    }

    pub(crate) fn put(&mut self, x: i32, y: i32, color: Color) {
        if let Some(offset) = self.offset(x, y) {
            let px = self.ordered(color);
            self.frame.data[offset..offset + 3].copy_from_slice(&px);
        }
    }

    /// Alpha-blend `color` over the pixel at (x, y).
    pub(crate) fn blend(&mut self, x: i32, y: i32, color: Color, alpha: f32) {
        if let Some(offset) = self.offset(x, y) {
            let px = self.ordered(color);
            let alpha = alpha.clamp(0.0, 1.0);
            for c in 0..3 {
                let base = self.frame.data[offset + c] as f32;
                let blended = base * (1.0 - alpha) + px[c] as f32 * alpha;
                self.frame.data[offset + c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    pub(crate) fn fill_rect(&mut self, left: i32, top: i32, right: i32, bottom: i32, color: Color) {
        let left = left.max(0);
        let top = top.max(0);
        let right = right.min(self.width() - 1);
        let bottom = bottom.min(self.height() - 1);
        for y in top..=bottom {
            for x in left..=right {
                self.put(x, y, color);
            }
        }
    }

    /// Hollow rectangle with the border growing inwards.
    pub(crate) fn draw_rectangle(
        &mut self,
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
        color: Color,
        thickness: i32,
    ) {
        if right < left || bottom < top {
            return;
        }
        for t in 0..thickness.max(1) {
            let (l, tp, r, b) = (left + t, top + t, right - t, bottom - t);
            if r < l || b < tp {
                break;
            }
            for x in l..=r {
                self.put(x, tp, color);
                self.put(x, b, color);
            }
            for y in tp..=b {
                self.put(l, y, color);
                self.put(r, y, color);
            }
        }
    }

    /// Render text with the built-in 5x7 font, each font pixel drawn as a
    /// `scale x scale` block. Returns the advance width in pixels.
    pub(crate) fn draw_text(&mut self, x: i32, y: i32, text: &str, color: Color, scale: i32) -> i32 {
        let scale = scale.max(1);
        let mut cursor = x;
        for ch in text.chars().flat_map(|c| c.to_uppercase()) {
            if let Some(glyph) = glyph_bits(ch) {
                for (row, pattern) in glyph.iter().enumerate() {
                    for col in 0..5 {
                        if (pattern >> (4 - col)) & 1 == 1 {
                            let px = cursor + col * scale;
                            let py = y + row as i32 * scale;
                            for dy in 0..scale {
                                for dx in 0..scale {
                                    self.put(px + dx, py + dy, color);
                                }
                            }
                        }
                    }
                }
            }
            cursor += GLYPH_ADVANCE * scale;
        }
        cursor - x
    }
}

pub(crate) const GLYPH_ADVANCE: i32 = 6;
pub(crate) const GLYPH_HEIGHT: i32 = 7;

/// Width in pixels of `text` rendered at `scale`.
pub(crate) fn text_width(text: &str, scale: i32) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE * scale.max(1)
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let bits = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '%' => [0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0b00000],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ' ' => [0, 0, 0, 0, 0, 0, 0],
        _ => return None,
    };
    Some(bits)
}
