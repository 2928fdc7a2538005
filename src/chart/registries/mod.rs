//! Registry implementations for listing and fetching charts

pub mod oci;

pub use oci::{OciChartGetter, OciRegistry};
