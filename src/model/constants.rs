pub const CHANNELS: usize = 3;
pub const IMAGE_SIZE: usize = 256;
pub const HOLE_SIZE: usize = 64;
pub const DISCOUNT_GAMMA: f64 = 0.999;
