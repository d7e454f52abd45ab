// ABOUTME: Library module for the slidev-pipeline program.
// ABOUTME: Contains the transform stages, virtual module providers and the pipeline that composes them.

// Reexport modules
pub mod components;
pub mod config;
pub mod deck;
pub mod errors;
pub mod escape;
pub mod layout;
pub mod markdown;
pub mod pipeline;
pub mod remote_assets;
pub mod server_ref;
pub mod unit;
pub mod utils;
pub mod virtual_modules;
pub mod watch;
pub mod windicss;

// Reexport common types and functions
pub use components::{
    ComponentImporter, ComponentResolution, ComponentResolver, FactoryResolver, IconResolver,
};
pub use config::{Config, PluginOptions, ResolvedOptions};
pub use deck::{parse_deck, SlideDeckState};
pub use errors::{Degradation, Result, SlidevError};
pub use escape::EscapePostProcessor;
pub use layout::{resolve_layout, ProjectLayout};
pub use markdown::MarkdownCompiler;
pub use pipeline::{BuildOutput, Pipeline, PipelineBuilder, Plugin, TransformOutcome};
pub use remote_assets::{AssetCache, HttpAssetCache, RemoteAssetRewriter};
pub use server_ref::{ServerRef, StateUpdate};
pub use unit::{FileKind, TransformUnit};
pub use virtual_modules::{VirtualModuleId, VirtualModuleProviders};
pub use watch::{serve, DevServerConfig};
pub use windicss::UtilityStyleCompiler;

#[cfg(test)]
mod tests;
