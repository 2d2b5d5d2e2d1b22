//! I/O adapters for scene metadata, scene archives, classifier models and vector exports

pub mod metadata;
pub mod archive;
pub mod model;
pub mod export;

pub use metadata::{MetadataParser, ProductId, SceneMetadata};
pub use archive::{SceneArchive, MemoryArchive};
pub use model::ForestReader;
pub use export::{ExportSink, GeoJsonFolderSink, MemorySink, VectorDataset, export_name, tile_target};
