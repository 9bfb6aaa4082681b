//! Drawing surfaces the visualiser paints on.

/// Straight (non-premultiplied) RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Same colour at `opacity` (clamped to [0, 1]) of full alpha.
    pub fn with_opacity(self, opacity: f32) -> Self {
        let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self { a: alpha, ..self }
    }

    pub fn opacity(self) -> f32 {
        self.a as f32 / 255.0
    }

    /// Linear blend towards `other`; `t` is clamped to [0, 1].
    pub fn lerp(self, other: Rgba, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Self::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
            mix(self.a, other.a),
        )
    }
}

/// Minimal 2D drawing interface, shaped after an HTML canvas context.
pub trait Canvas {
    fn size(&self) -> (f32, f32);
    fn resize(&mut self, width: u32, height: u32);
    fn clear(&mut self);
    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba);
    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba);
    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: Rgba);

    fn stroke_polyline(&mut self, points: &[(f32, f32)], width: f32, color: Rgba) {
        for pair in points.windows(2) {
            self.stroke_line(pair[0], pair[1], width, color);
        }
    }
}

/// One recorded call on a [`RecordingCanvas`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgba,
    },
    Circle {
        cx: f32,
        cy: f32,
        radius: f32,
        color: Rgba,
    },
    Line {
        from: (f32, f32),
        to: (f32, f32),
        width: f32,
        color: Rgba,
    },
}

/// Canvas that keeps the draw calls issued since the last clear.
#[derive(Debug, Clone, Default)]
pub struct RecordingCanvas {
    width: u32,
    height: u32,
    commands: Vec<DrawCommand>,
    clears: usize,
}

impl RecordingCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn clears(&self) -> usize {
        self.clears
    }

    pub fn rects(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::Rect { .. }))
    }

    pub fn circles(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::Circle { .. }))
    }

    pub fn lines(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::Line { .. }))
    }
}

impl Canvas for RecordingCanvas {
    fn size(&self) -> (f32, f32) {
        (self.width as f32, self.height as f32)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn clear(&mut self) {
        self.commands.clear();
        self.clears += 1;
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba) {
        self.commands.push(DrawCommand::Rect {
            x,
            y,
            width,
            height,
            color,
        });
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba) {
        self.commands.push(DrawCommand::Circle {
            cx,
            cy,
            radius,
            color,
        });
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: Rgba) {
        self.commands.push(DrawCommand::Line {
            from,
            to,
            width,
            color,
        });
    }
}

/// Software RGBA8 rasteriser with source-over blending.
#[derive(Debug, Clone)]
pub struct PixelCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PixelCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[index..index + 4];
        Some(Rgba::new(px[0], px[1], px[2], px[3]))
    }

    fn blend(&mut self, x: i64, y: i64, color: Rgba, coverage: f32) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let alpha = color.opacity() * coverage.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let index = (y as usize * self.width as usize + x as usize) * 4;
        let dst = &mut self.pixels[index..index + 4];
        let dst_alpha = dst[3] as f32 / 255.0;
        let out_alpha = alpha + dst_alpha * (1.0 - alpha);
        for (channel, src) in [color.r, color.g, color.b].into_iter().enumerate() {
            let blended = src as f32 * alpha + dst[channel] as f32 * dst_alpha * (1.0 - alpha);
            dst[channel] = if out_alpha > 0.0 {
                (blended / out_alpha).round().clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
        dst[3] = (out_alpha * 255.0).round() as u8;
    }
}

impl Canvas for PixelCanvas {
    fn size(&self) -> (f32, f32) {
        (self.width as f32, self.height as f32)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width as usize * height as usize * 4];
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba) {
        let x0 = x.max(0.0).floor() as i64;
        let y0 = y.max(0.0).floor() as i64;
        let x1 = (x + width).min(self.width as f32).ceil() as i64;
        let y1 = (y + height).min(self.height as f32).ceil() as i64;
        for py in y0..y1 {
            for px in x0..x1 {
                self.blend(px, py, color, 1.0);
            }
        }
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba) {
        if radius <= 0.0 {
            return;
        }
        let x0 = (cx - radius).floor() as i64;
        let x1 = (cx + radius).ceil() as i64;
        let y0 = (cy - radius).floor() as i64;
        let y1 = (cy + radius).ceil() as i64;
        for py in y0..=y1 {
            for px in x0..=x1 {
                let dx = px as f32 + 0.5 - cx;
                let dy = py as f32 + 0.5 - cy;
                let distance = (dx * dx + dy * dy).sqrt();
                // One pixel of edge falloff.
                let coverage = radius + 0.5 - distance;
                if coverage > 0.0 {
                    self.blend(px, py, color, coverage);
                }
            }
        }
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: Rgba) {
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;
        let half = (width * 0.5).max(0.5);
        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            let x = from.0 + dx * t;
            let y = from.1 + dy * t;
            if half <= 0.5 {
                self.blend(x.floor() as i64, y.floor() as i64, color, 1.0);
            } else {
                self.fill_rect(x - half, y - half, half * 2.0, half * 2.0, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opacity_is_clamped() {
        let color = Rgba::rgb(10, 20, 30);
        assert_eq!(color.with_opacity(2.0).a, 255);
        assert_eq!(color.with_opacity(-1.0).a, 0);
        assert_eq!(color.with_opacity(0.5).a, 128);
    }

    #[test]
    fn lerp_hits_endpoints() {
        let from = Rgba::rgb(0, 0, 0);
        let to = Rgba::rgb(200, 100, 50);
        assert_eq!(from.lerp(to, 0.0), from);
        assert_eq!(from.lerp(to, 1.0), to);
        assert_eq!(from.lerp(to, 0.5), Rgba::rgb(100, 50, 25));
    }

    #[test]
    fn recording_canvas_resets_on_clear() {
        let mut canvas = RecordingCanvas::new(10, 10);
        canvas.fill_rect(0.0, 0.0, 1.0, 1.0, Rgba::rgb(1, 2, 3));
        canvas.stroke_polyline(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)], 1.0, Rgba::rgb(1, 2, 3));
        assert_eq!(canvas.rects().count(), 1);
        assert_eq!(canvas.lines().count(), 2);

        canvas.clear();
        assert!(canvas.commands().is_empty());
        assert_eq!(canvas.clears(), 1);
    }

    #[test]
    fn pixel_canvas_fills_and_clips() {
        let mut canvas = PixelCanvas::new(4, 4);
        canvas.fill_rect(-2.0, -2.0, 4.0, 4.0, Rgba::rgb(255, 0, 0));
        assert_eq!(canvas.pixel(0, 0), Some(Rgba::rgb(255, 0, 0)));
        assert_eq!(canvas.pixel(1, 1), Some(Rgba::rgb(255, 0, 0)));
        assert_eq!(canvas.pixel(2, 2), Some(Rgba::TRANSPARENT));
        assert_eq!(canvas.pixel(4, 0), None);
    }

    #[test]
    fn pixel_canvas_blends_translucent_colours() {
        let mut canvas = PixelCanvas::new(1, 1);
        canvas.fill_rect(0.0, 0.0, 1.0, 1.0, Rgba::rgb(0, 0, 255));
        canvas.fill_rect(0.0, 0.0, 1.0, 1.0, Rgba::rgb(255, 0, 0).with_opacity(0.5));
        let px = canvas.pixel(0, 0).unwrap();
        assert_eq!(px.a, 255);
        assert!((127..=129).contains(&px.r));
        assert!((126..=128).contains(&px.b));
    }

    #[test]
    fn circles_cover_their_centre() {
        let mut canvas = PixelCanvas::new(9, 9);
        canvas.fill_circle(4.5, 4.5, 2.0, Rgba::rgb(0, 255, 0));
        assert_eq!(canvas.pixel(4, 4), Some(Rgba::rgb(0, 255, 0)));
        assert_eq!(canvas.pixel(0, 0), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn resize_reallocates() {
        let mut canvas = PixelCanvas::new(2, 2);
        canvas.resize(3, 5);
        assert_eq!(canvas.pixels().len(), 3 * 5 * 4);
        assert_eq!(canvas.size(), (3.0, 5.0));
    }
}
