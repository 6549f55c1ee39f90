//! ERA5-Land feature extractor.
//!
//! Validates a request, runs it as a Climate Data Store job (submit, poll,
//! download), decodes the NetCDF result and reduces it to the input
//! features: a time series per point, or a clipped raster or vector grid per
//! polygon set.

pub mod config;
pub mod download;
pub mod input;
pub mod job;
pub mod orchestrator;
pub mod process;
pub mod provider;
pub mod request;

pub use config::ExtractorConfig;
pub use job::{ExtractionOutput, JobId, JobOutcome, JobState};
#[cfg(feature = "native")]
pub use orchestrator::NetCdfDecoder;
pub use orchestrator::{GridDecoder, JobObserver, LoggingObserver, Orchestrator};
pub use provider::{CdsProvider, ClimateDataProvider, ProviderJobHandle, ProviderStatus};
pub use request::{PolygonOutput, RequestBuilder, RequestDescriptor};
