pub mod approach;
pub mod binning;
pub mod builder;
pub mod detector;
pub mod error;
pub mod geometry;
pub mod identifier;
pub mod intersection;
pub mod layer;
pub mod layer_creator;
pub mod material;
pub mod navigation;
pub mod navigator;
pub mod output;
pub mod passive_layer_builder;
pub mod propagator;
pub mod scan;
pub mod settings;
pub mod surface;
pub mod surface_array;
pub mod volume;
