pub mod input;
pub mod label_map;
pub mod output;

pub use input::load_label_map;
pub use label_map::{ImageGeometry, LabelMap};
