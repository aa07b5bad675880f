pub mod domain;
pub mod gram_count;
pub mod prediction_record;
pub mod price_snapshot;
