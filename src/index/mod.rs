pub mod immutable;
pub mod merged;

pub use immutable::ImmutableIndex;
pub use merged::MergedIndex;
