//! Core data model: immutable series and the series store.

mod series;
mod store;

pub use series::{category_one_hot, clean_series_id, parse_observations, Series, CATEGORIES};
pub use store::SeriesStore;
