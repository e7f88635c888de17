pub mod inverted;
pub mod posting;
pub mod scorer;

pub use inverted::InvertedIndex;
