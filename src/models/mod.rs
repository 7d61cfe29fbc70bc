pub mod generation;
pub mod photo;
