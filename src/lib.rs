//! Principal component analysis of surface-roughness image datasets.
//!
//! The [`pipeline`] loads a folder of class directories, standardizes every
//! pixel and fits a [`analysis::Pca`]; the [`app`] renders the results with
//! egui.

pub mod analysis;
pub mod app;
pub mod color;
pub mod config;
pub mod data;
pub mod export;
pub mod pipeline;
pub mod state;
pub mod ui;
