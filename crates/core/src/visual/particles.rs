use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{render::Canvas, theme::Palette};

/// A single drifting dot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
    pub opacity: f32,
}

/// Persistent particle set for the particle visualisation. Linking is
/// quadratic in the particle count, which stays bounded by configuration.
#[derive(Debug, Clone)]
pub struct ParticleField {
    particles: Vec<Particle>,
    count: usize,
    rng: StdRng,
}

impl ParticleField {
    pub fn new(count: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            particles: Vec::with_capacity(count),
            count,
            rng,
        }
    }

    pub fn from_particles(particles: Vec<Particle>) -> Self {
        Self {
            count: particles.len(),
            particles,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn is_populated(&self) -> bool {
        !self.particles.is_empty() || self.count == 0
    }

    /// Scatters the configured number of particles across the canvas.
    pub fn populate(&mut self, width: f32, height: f32) {
        self.particles.clear();
        for _ in 0..self.count {
            self.particles.push(Particle {
                x: self.rng.gen_range(0.0..width.max(1.0)),
                y: self.rng.gen_range(0.0..height.max(1.0)),
                vx: self.rng.gen_range(-0.5..0.5),
                vy: self.rng.gen_range(-0.5..0.5),
                radius: self.rng.gen_range(1.0..3.0),
                opacity: self.rng.gen_range(0.2..0.7),
            });
        }
    }

    /// Moves every particle, faster with higher intensity, wrapping at the
    /// canvas edges.
    pub fn step(&mut self, width: f32, height: f32, intensity: f32) {
        let speed = 1.0 + intensity * 3.0;
        for particle in &mut self.particles {
            particle.x += particle.vx * speed;
            particle.y += particle.vy * speed;
            if width > 0.0 {
                particle.x = particle.x.rem_euclid(width);
            }
            if height > 0.0 {
                particle.y = particle.y.rem_euclid(height);
            }
        }
    }

    pub fn draw<C: Canvas>(
        &self,
        canvas: &mut C,
        palette: &Palette,
        intensity: f32,
        link_distance: f32,
    ) {
        for (i, a) in self.particles.iter().enumerate() {
            for b in &self.particles[i + 1..] {
                let distance = ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
                if distance < link_distance {
                    let opacity = (1.0 - distance / link_distance) * 0.4 * (0.25 + intensity);
                    canvas.stroke_line(
                        (a.x, a.y),
                        (b.x, b.y),
                        1.0,
                        palette.accent.with_opacity(opacity),
                    );
                }
            }
        }

        for particle in &self.particles {
            let radius = particle.radius * (1.0 + intensity);
            let opacity = (particle.opacity * (1.0 + intensity)).min(1.0);
            canvas.fill_circle(
                particle.x,
                particle.y,
                radius,
                palette.primary.with_opacity(opacity),
            );
        }
    }
}
