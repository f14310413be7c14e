//! Configuration module.
//!
//! Handles label formats, rendering switches, operator template overrides
//! and the static entity metamodel.

mod settings;

pub use settings::{
    CompilerSettings, LabelSettings, RenderingSettings, SettingsError, TemplateOverride,
};
