mod captured;
mod item;

pub use captured::{CapturedItem, Checkpoint};
pub use item::Item;
