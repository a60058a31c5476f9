// Technical indicators module
// ADX for trend strength, dual fractals for entry structure

pub mod adx;
pub mod fractal;

pub use adx::{calculate_adx, calculate_adx_series};
pub use fractal::{detect_dual_fractals, is_dual_fractal, FractalLevels, FractalPoint};
