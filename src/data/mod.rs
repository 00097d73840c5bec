/// Data layer: core types, the external collaborators and their loaders.
///
/// Architecture:
/// ```text
///  dataset.json / responses.csv / spheres.csv / flux.json
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse files → Dataset
///   └──────────┘
///        │
///        ▼
///   ┌────────────────────────────────────────────┐
///   │ Dataset                                    │
///   │   catalog    InMemoryCatalog   (catalog)    │
///   │   flux       TabulatedFlux     (flux)       │
///   │   foil       TabulatedFoilData (experiment) │
///   │   spheres    SphereSpectra     (experiment) │
///   └────────────────────────────────────────────┘
///        │
///        ▼
///   model: ResponseMatrix, DefaultSpectrum, MeasurementVector, ...
/// ```

pub mod catalog;
pub mod experiment;
pub mod flux;
pub mod loader;
pub mod model;
