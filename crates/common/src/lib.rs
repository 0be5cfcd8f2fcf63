// provenance-common: evidence types and wire envelopes shared by the provenance crates

pub mod protocol;
pub mod resource;
pub mod types;
