//! CAPTCHA answer and image generation.
//!
//! Answers are digit strings. Images are drawn as slanted seven-segment
//! glyphs over speckle and line noise, then encoded as PNG.

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use rand::Rng;
use std::io::Cursor;

/// Segment bitmasks (a=1, b=2, c=4, d=8, e=16, f=32, g=64) for digits 0-9
const DIGIT_SEGMENTS: [u8; 10] = [0x3F, 0x06, 0x5B, 0x4F, 0x66, 0x6D, 0x7D, 0x07, 0x7F, 0x6F];

/// Segment endpoints in a unit box, in bit order a..g
const SEGMENT_LINES: [((f32, f32), (f32, f32)); 7] = [
    ((0.0, 0.0), (1.0, 0.0)),
    ((1.0, 0.0), (1.0, 0.5)),
    ((1.0, 0.5), (1.0, 1.0)),
    ((0.0, 1.0), (1.0, 1.0)),
    ((0.0, 0.5), (0.0, 1.0)),
    ((0.0, 0.0), (0.0, 0.5)),
    ((0.0, 0.5), (1.0, 0.5)),
];

const BACKGROUND: Rgb<u8> = Rgb([244, 242, 236]);

/// Generate a cryptographically random challenge ID
pub fn generate_challenge_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a random digit answer of the given length
pub fn generate_answer(rng: &mut impl Rng, length: usize) -> String {
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Normalize a submitted answer.
///
/// Spaces and commas are ignored. Returns `None` if anything other than a
/// digit remains, or nothing remains at all.
pub fn normalize_answer(input: &str) -> Option<String> {
    let mut digits = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | ',' => {}
            _ => return None,
        }
    }
    (!digits.is_empty()).then_some(digits)
}

/// Render an answer as a PNG image
pub fn render_png(answer: &str, width: u32, height: u32) -> Result<Vec<u8>> {
    let mut rng = rand::rng();
    let mut img = RgbImage::from_pixel(width.max(1), height.max(1), BACKGROUND);
    let (w, h) = (img.width() as f32, img.height() as f32);

    // Speckle noise
    let speckles = (img.width() * img.height() / 120).max(8);
    for _ in 0..speckles {
        let center = (
            rng.random_range(0..img.width()) as i32,
            rng.random_range(0..img.height()) as i32,
        );
        let shade = rng.random_range(120..210u8);
        draw_filled_circle_mut(&mut img, center, rng.random_range(0..2), Rgb([shade, shade, shade]));
    }

    // Glyphs
    let count = answer.chars().count().max(1) as f32;
    let cell = w / (count + 1.0);
    let glyph_w = cell * 0.6;
    let glyph_h = h * 0.6;
    let stroke = (h / 20.0).max(1.0);

    for (i, c) in answer.chars().enumerate() {
        let Some(digit) = c.to_digit(10) else {
            continue;
        };
        let color = Rgb([
            rng.random_range(10..90u8),
            rng.random_range(10..90u8),
            rng.random_range(60..140u8),
        ]);
        let origin = (
            cell * (i as f32 + 0.7) + rng.random_range(-cell * 0.1..=cell * 0.1),
            (h - glyph_h) / 2.0 + rng.random_range(-h * 0.08..=h * 0.08),
        );
        let slant = rng.random_range(-0.25f32..=0.25);
        draw_digit(&mut img, digit as usize, origin, (glyph_w, glyph_h), slant, stroke, color);
    }

    // Crossing lines
    for _ in 0..2 {
        let shade = rng.random_range(60..140u8);
        draw_line_segment_mut(
            &mut img,
            (0.0, rng.random_range(0.0..h)),
            (w, rng.random_range(0.0..h)),
            Rgb([shade, shade, shade]),
        );
    }

    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("Failed to encode captcha image")?;
    Ok(bytes)
}

fn draw_digit(
    img: &mut RgbImage,
    digit: usize,
    origin: (f32, f32),
    size: (f32, f32),
    slant: f32,
    stroke: f32,
    color: Rgb<u8>,
) {
    let mask = DIGIT_SEGMENTS[digit % 10];
    let project = |(ux, uy): (f32, f32)| {
        (
            origin.0 + (ux + (1.0 - uy) * slant) * size.0,
            origin.1 + uy * size.1,
        )
    };

    for (bit, &(from, to)) in SEGMENT_LINES.iter().enumerate() {
        if mask & (1 << bit) == 0 {
            continue;
        }
        let (start, end) = (project(from), project(to));
        let mut offset = -stroke / 2.0;
        while offset <= stroke / 2.0 {
            draw_line_segment_mut(img, (start.0 + offset, start.1), (end.0 + offset, end.1), color);
            draw_line_segment_mut(img, (start.0, start.1 + offset), (end.0, end.1 + offset), color);
            offset += 0.5;
        }
    }
}
