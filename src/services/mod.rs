pub mod cache;
pub mod coordinates;
pub mod enrichment;
pub mod meteostat;
pub mod provider;
pub mod timestamp;
