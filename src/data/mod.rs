/// Data layer: core types, loading, and class selection.
///
/// Architecture:
/// ```text
///   root/<class>/<image>.png
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  decode folders → ImageDataset
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ ImageDataset  │  n × h·w pixels, class labels
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  selected classes → visible rows
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod filter;
