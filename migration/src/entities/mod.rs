pub mod dataset_generation;

pub use dataset_generation::Entity as DatasetGenerationEntity;
