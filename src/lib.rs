pub mod archive;
pub mod matcher;
pub mod metadata;
pub mod package;
pub mod publish;
pub mod registry;
pub mod resolver;
pub mod rules;
pub mod synthesizer;
pub mod version;
