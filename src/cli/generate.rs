use std::path::PathBuf;

use anyhow::Context;
use bundle_codec::DocumentCodec;
use clap::Parser;

use crate::{
    batch::Parallelism,
    generator::RemapGenerator,
    report::LogReporter,
};

use super::{resolve_path, save_settings, show_summary, GlobalOptions};

/// Generates a remap table by matching the bundles of a modified build
/// against the bundles of a reference build.
#[derive(Debug, Parser)]
pub struct GenerateCommand {
    /// Root of the reference build, usually the shipped game's bundles.
    /// Defaults to the last reference root used.
    #[clap(long, short)]
    pub reference: Option<PathBuf>,

    /// Root of the modified build, usually an SDK export. Defaults to the
    /// last modified root used.
    #[clap(long, short)]
    pub modified: Option<PathBuf>,

    /// Where to write the remap table. Defaults to the last table written.
    ///
    /// Should end in .json.
    #[clap(long, short)]
    pub output: Option<PathBuf>,

    /// Number of worker threads. Defaults to one less than the number of
    /// processors.
    #[clap(long, short)]
    pub jobs: Option<usize>,
}

impl GenerateCommand {
    pub fn run(self, global: GlobalOptions) -> anyhow::Result<()> {
        let (settings_path, mut settings) = global.load_settings()?;

        let reference = self
            .reference
            .or_else(|| settings.last_remap_reference_path.clone())
            .context("No reference root given. Pass one with --reference.")?;
        let modified = self
            .modified
            .or_else(|| settings.last_remap_modified_path.clone())
            .context("No modified root given. Pass one with --modified.")?;
        let output = self
            .output
            .or_else(|| settings.last_remap_output_path.clone())
            .context("No output path given. Pass one with --output.")?;

        let reference = resolve_path(&reference)?.into_owned();
        let modified = resolve_path(&modified)?.into_owned();
        let output = resolve_path(&output)?.into_owned();

        let generator = RemapGenerator::new(DocumentCodec::new)
            .with_parallelism(Parallelism::from_jobs(self.jobs, Parallelism::AllButOne));
        let summary = generator.generate_to_file(&reference, &modified, &output, &LogReporter)?;

        settings.last_remap_reference_path = Some(reference);
        settings.last_remap_modified_path = Some(modified);
        settings.last_remap_output_path = Some(output.clone());
        save_settings(&settings_path, &settings);

        let _ = show_summary(
            "Remap table written:",
            &[
                ("Table", output.display().to_string()),
                ("Bundles", summary.processed.to_string()),
                ("Entries", summary.table.len().to_string()),
                ("Assets", summary.table.asset_remap_count().to_string()),
            ],
            summary.failures.len(),
            global.color.into(),
        );

        Ok(())
    }
}
