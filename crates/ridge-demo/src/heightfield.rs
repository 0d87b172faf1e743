//! Multi-octave fractal Brownian motion (fBm) height field.
//!
//! Feeds the mesh through [`HeightSource`], so the core never sees the noise.

use noise::{NoiseFn, Simplex};
use ridge_config::TerrainConfig;
use ridge_lod::HeightSource;

/// Simplex fBm sampled on an integer grid.
pub struct NoiseTerrain {
    noise: Simplex,
    params: TerrainConfig,
}

impl NoiseTerrain {
    pub fn new(params: TerrainConfig) -> Self {
        let noise = Simplex::new(params.seed);
        Self { noise, params }
    }

    /// fBm value at grid coordinate `(x, y)`.
    ///
    /// Each octave multiplies frequency by the lacunarity and amplitude by
    /// the persistence.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.frequency;
        let mut amplitude = self.params.amplitude;

        for _ in 0..self.params.octaves {
            total += self.noise.get([x * frequency, y * frequency]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }

        total
    }

    /// Geometric sum of the octave amplitudes; bounds `|sample|`.
    pub fn max_amplitude(&self) -> f64 {
        let mut sum = 0.0;
        let mut amp = self.params.amplitude;
        for _ in 0..self.params.octaves {
            sum += amp;
            amp *= self.params.persistence;
        }
        sum
    }
}

impl HeightSource for NoiseTerrain {
    fn rows(&self) -> usize {
        self.params.rows
    }

    fn cols(&self) -> usize {
        self.params.cols
    }

    fn height(&self, row: usize, col: usize) -> f32 {
        self.sample(row as f64, col as f64) as f32
    }
}
