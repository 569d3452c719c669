use std::{
    io::{stdout, BufWriter, Write},
    path::PathBuf,
};

use bundle_codec::DocumentCodec;
use clap::Parser;
use fs_err::File;

use crate::identity::IdentityExtractor;

use super::resolve_path;

/// Prints the container id and every object identity of a bundle as JSON.
#[derive(Debug, Parser)]
pub struct InspectCommand {
    /// Path to the bundle to inspect.
    pub bundle: PathBuf,

    /// Where to write the JSON. Omit this to use stdout instead of writing
    /// to a file.
    #[clap(long, short)]
    pub output: Option<PathBuf>,
}

impl InspectCommand {
    pub fn run(self) -> anyhow::Result<()> {
        let bundle_path = resolve_path(&self.bundle)?;

        let mut extractor = IdentityExtractor::new(DocumentCodec::new());
        let identity = extractor.extract(&bundle_path)?;

        if let Some(output_path) = self.output {
            let mut file = BufWriter::new(File::create(&output_path)?);
            serde_json::to_writer_pretty(&mut file, &identity)?;
            file.flush()?;

            log::info!("Wrote identities to {}", output_path.display());
        } else {
            let mut stdout = stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &identity)?;
            writeln!(stdout)?;
        }

        Ok(())
    }
}
