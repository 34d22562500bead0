// Batch processing: normalization, similarity scoring and duplicate detection

pub mod dedup;
pub mod normalize;
pub mod similarity;
