use anyhow::Result;
use clap::Parser;
use sitepack::metadata::PeMetadataReader;
use sitepack::package::NupkgWriter;
use sitepack::publish::{Publisher, ServerInfo};
use sitepack::registry::{DEFAULT_REGISTRY_URL, NuGetRegistry};
use sitepack::synthesizer::{Mode, Synthesizer};
use std::path::PathBuf;

/// sitepack - Sitecore NuGet package generator
///
/// Convert Sitecore distribution archives into NuGet packages, one per
/// binary module or functional group, with dependency metadata resolved
/// against the public NuGet registry.
///
/// Examples:
///   sitepack "Sitecore 6.2 rev. 101105.zip" ./packages
///   sitepack ./distributions ./packages user:pass@nuget.example.org
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// A distribution zip file, or a folder scanned recursively for them
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// The output folder (created if absent)
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Server to push packages to, in user:pass@server form
    #[arg(value_name = "PUSH")]
    push: Option<String>,

    /// Packaging mode: grouped or per-module
    #[arg(long, default_value = "grouped", value_name = "MODE")]
    mode: Mode,

    /// Package registry URL (defaults to the public NuGet flat container)
    #[arg(long = "registry-url", value_name = "URL")]
    registry_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            e.print().ok();
            // Help and version are successes; only usage problems exit -1,
            // and processing failures never do.
            match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    std::process::exit(0)
                }
                _ => std::process::exit(-1),
            }
        }
    };

    let push = match cli.push.as_deref() {
        Some(text) => ServerInfo::parse(text)?,
        None => None,
    };

    let client = reqwest::Client::new();
    let registry_url = cli
        .registry_url
        .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string());
    let synthesizer = Synthesizer::new(
        NuGetRegistry::new(client.clone(), &registry_url),
        PeMetadataReader,
        NupkgWriter,
        Publisher::new(client),
        push,
        cli.output,
        cli.mode,
    );

    synthesizer.run(&cli.input).await
}
