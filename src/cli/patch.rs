use std::path::PathBuf;

use anyhow::{bail, Context};
use bundle_codec::{Compression, DocumentCodec};
use clap::Parser;

use crate::{
    batch::Parallelism,
    patcher::{check_output_dir, PatchEngine},
    remap::RemapTable,
    report::LogReporter,
    settings::Settings,
};

use super::{resolve_path, save_settings, show_summary, GlobalOptions};

/// Applies a remap table to every bundle under a directory.
#[derive(Debug, Parser)]
pub struct PatchCommand {
    /// Directory of bundles to patch. Defaults to the last input directory
    /// used.
    #[clap(long, short)]
    pub input: Option<PathBuf>,

    /// Directory to write patched bundles to. Subdirectories of the input
    /// are mirrored. May be the input directory itself to patch in place.
    #[clap(long, short)]
    pub output: Option<PathBuf>,

    /// Remap table to apply. Defaults to the last generated table when
    /// loadLastRemapOnStart is enabled in the settings.
    #[clap(long, short)]
    pub remap: Option<PathBuf>,

    /// Recompress patched bundles with LZMA, overriding the settings.
    #[clap(long)]
    pub compress: bool,

    /// Write patched bundles uncompressed, overriding the settings.
    #[clap(long)]
    pub no_compress: bool,

    /// Number of worker threads. Defaults to the number of processors.
    #[clap(long, short)]
    pub jobs: Option<usize>,
}

impl PatchCommand {
    pub fn run(self, global: GlobalOptions) -> anyhow::Result<()> {
        let (settings_path, mut settings) = global.load_settings()?;

        let compression = self.compression(&settings)?;
        let remap_path = self.remap_path(&settings)?;

        let input = self
            .input
            .or_else(|| settings.last_bundle_path.clone())
            .context("No input directory given. Pass one with --input.")?;
        let output = self
            .output
            .or_else(|| settings.last_output_path.clone())
            .context("No output directory given. Pass one with --output.")?;

        let input = resolve_path(&input)?.into_owned();
        let output = resolve_path(&output)?.into_owned();
        let remap_path = resolve_path(&remap_path)?.into_owned();

        check_output_dir(&input, &output)?;

        let table = RemapTable::load(&remap_path)?;
        log::info!(
            "Loaded remap file with {} entries",
            table.asset_remap_count()
        );

        let engine = PatchEngine::new(DocumentCodec::new)
            .with_compression(compression)
            .with_parallelism(Parallelism::from_jobs(self.jobs, Parallelism::AllCores));
        let summary = engine.patch(&input, &output, &table, &LogReporter)?;

        settings.last_bundle_path = Some(input);
        settings.last_output_path = Some(output.clone());
        save_settings(&settings_path, &settings);

        let _ = show_summary(
            "Bundles patched:",
            &[
                ("Output", output.display().to_string()),
                ("Patched", summary.patched().to_string()),
                ("Unchanged", summary.copied().to_string()),
            ],
            summary.failures.len(),
            global.color.into(),
        );

        Ok(())
    }

    fn compression(&self, settings: &Settings) -> anyhow::Result<Compression> {
        let compress = match (self.compress, self.no_compress) {
            (true, true) => bail!("--compress and --no-compress cannot be used together"),
            (true, false) => true,
            (false, true) => false,
            (false, false) => settings.compress_bundles,
        };

        Ok(if compress {
            Compression::Lzma
        } else {
            Compression::None
        })
    }

    fn remap_path(&self, settings: &Settings) -> anyhow::Result<PathBuf> {
        if let Some(remap) = &self.remap {
            return Ok(remap.clone());
        }

        if !settings.load_last_remap_on_start {
            bail!("No remap table given. Pass one with --remap.");
        }

        let last = settings
            .last_remap_output_path
            .clone()
            .context("No remap table given and none has been generated yet. Pass one with --remap.")?;

        log::info!("Using last generated remap table {}", last.display());
        Ok(last)
    }
}
