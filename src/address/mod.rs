// Address heuristics: classify, trim, normalize
pub mod classifier;
pub mod normalizer;
pub mod selector;

pub use classifier::looks_like_address_block;
pub use normalizer::Normalizer;
pub use selector::LineSelector;
