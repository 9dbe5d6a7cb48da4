pub mod mapping_store;

pub use mapping_store::MappingStore;
