pub mod geometry;
pub mod model;
pub mod polygon;
pub mod units;
