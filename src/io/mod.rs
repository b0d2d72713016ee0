//! I/O modules for acquisition lists, raster stacks and persisted model arrays

pub mod acquisition;
pub mod stack_reader;
pub mod npy;
pub mod coefficient_store;
pub mod manifest;
pub mod raster_writer;

pub use acquisition::{read_acquisitions, Acquisition, SourceFamily};
pub use stack_reader::{AssembledStack, StackReader};
pub use coefficient_store::{CoefficientStore, Corner, ModelArrays};
pub use manifest::RunManifest;
pub use raster_writer::GeoTiffWriter;
