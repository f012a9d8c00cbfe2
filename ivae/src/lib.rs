pub mod data;
pub mod metrics;
pub mod model;
pub mod training;
pub mod utils;
