//! Builds a remap table by matching the objects of a modified build against
//! the objects of a reference build.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use bundle_codec::BundleCodec;

use crate::{
    batch::{
        find_bundles, BatchFailure, BatchRunner, Parallelism, SignatureFilter,
        GENERATOR_CHUNK_SIZE,
    },
    identity::{AssetIdentity, BundleIdentity, IdentityExtractor},
    remap::{AssetRemap, BundleRemapEntry, RemapTable},
    report::{Level, Reporter},
};

/// The result of one generator run.
#[derive(Debug)]
pub struct GenerateSummary {
    pub table: RemapTable,

    /// Number of modified-side bundles that were looked at.
    pub processed: usize,

    pub failures: Vec<BatchFailure>,
}

/// Matches bundles of a modified build with the bundles at the same relative
/// paths in a reference build.
///
/// `new_codec` is called once per bundle pair, so that no codec is shared
/// between workers.
pub struct RemapGenerator<F> {
    new_codec: F,
    parallelism: Parallelism,
}

impl<F, C> RemapGenerator<F>
where
    F: Fn() -> C + Sync,
    C: BundleCodec,
{
    pub fn new(new_codec: F) -> Self {
        Self {
            new_codec,
            parallelism: Parallelism::AllButOne,
        }
    }

    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Generates a table without writing it anywhere. Entries are sorted by
    /// relative path.
    pub fn generate(
        &self,
        reference_root: &Path,
        modified_root: &Path,
        reporter: &dyn Reporter,
    ) -> anyhow::Result<GenerateSummary> {
        let modified_files = find_bundles(modified_root, SignatureFilter::UnityFsOnly)?;
        log::info!(
            "Found {} bundles under {}",
            modified_files.len(),
            modified_root.display()
        );

        let runner =
            BatchRunner::new(self.parallelism, reporter)?.with_chunk_size(GENERATOR_CHUNK_SIZE);

        let outcome = runner.run(&modified_files, |modified_path| {
            self.process_pair(reference_root, modified_root, modified_path, reporter)
        });

        let processed = outcome.total();
        let mut entries: Vec<_> = outcome
            .completed
            .into_iter()
            .filter_map(|(_, entry)| entry)
            .collect();
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        Ok(GenerateSummary {
            table: RemapTable::new(entries),
            processed,
            failures: outcome.failures,
        })
    }

    /// Generates a table, writes it to `output` and loads it back.
    ///
    /// The returned summary holds the table as read back from disk.
    pub fn generate_to_file(
        &self,
        reference_root: &Path,
        modified_root: &Path,
        output: &Path,
        reporter: &dyn Reporter,
    ) -> anyhow::Result<GenerateSummary> {
        let mut summary = self.generate(reference_root, modified_root, reporter)?;

        summary.table.save(output)?;
        reporter.log(
            Level::Success,
            &format!(
                "Processed {} files, {} assets remapped",
                summary.processed,
                summary.table.asset_remap_count()
            ),
        );

        summary.table = RemapTable::load(output)?;
        reporter.log(
            Level::Info,
            &format!(
                "Loaded remap file with {} entries",
                summary.table.asset_remap_count()
            ),
        );

        Ok(summary)
    }

    fn process_pair(
        &self,
        reference_root: &Path,
        modified_root: &Path,
        modified_path: &Path,
        reporter: &dyn Reporter,
    ) -> anyhow::Result<Option<BundleRemapEntry>> {
        let relative_path = modified_path.strip_prefix(modified_root).with_context(|| {
            format!(
                "{} is not inside {}",
                modified_path.display(),
                modified_root.display()
            )
        })?;

        let reference_path = reference_root.join(relative_path);
        if !reference_path.is_file() {
            reporter.log(
                Level::Warning,
                &format!(
                    "Skipping {} - reference bundle not found",
                    relative_path.display()
                ),
            );
            return Ok(None);
        }

        let mut extractor = IdentityExtractor::new((self.new_codec)());
        let modified = extractor.extract(modified_path)?;
        let reference = extractor.extract(&reference_path)?;

        let has_assets = |identity: &BundleIdentity| identity.eligible_assets().next().is_some();
        if !has_assets(&modified) || !has_assets(&reference) {
            reporter.log(
                Level::Warning,
                &format!("Skipping {} - no named assets", relative_path.display()),
            );
            return Ok(None);
        }

        let entry = match_bundles(relative_path.to_path_buf(), &modified, &reference);
        match &entry {
            Some(entry) => log::debug!(
                "{}: {} assets remapped",
                relative_path.display(),
                entry.asset_remaps.len()
            ),
            None => log::debug!("{}: no matching assets", relative_path.display()),
        }

        Ok(entry)
    }
}

/// Pairs every eligible modified-side asset with the first eligible
/// reference-side asset that has the same name and type.
///
/// Returns `None` when nothing matched.
pub fn match_bundles(
    relative_path: PathBuf,
    modified: &BundleIdentity,
    reference: &BundleIdentity,
) -> Option<BundleRemapEntry> {
    let mut reference_lookup: HashMap<(&str, &str), &AssetIdentity> = HashMap::new();

    for asset in reference.eligible_assets() {
        reference_lookup
            .entry((asset.name.as_str(), asset.type_name.as_str()))
            .or_insert(asset);
    }

    let asset_remaps: Vec<_> = modified
        .eligible_assets()
        .filter_map(|asset| {
            let key = (asset.name.as_str(), asset.type_name.as_str());
            let original = reference_lookup.get(&key)?;

            Some(AssetRemap {
                name: asset.name.clone(),
                type_name: asset.type_name.clone(),
                old_identifier: asset.identifier,
                new_identifier: original.identifier,
            })
        })
        .collect();

    if asset_remaps.is_empty() {
        return None;
    }

    Some(BundleRemapEntry {
        relative_path,
        old_container_id: modified.container_id.clone(),
        new_container_id: reference.container_id.clone(),
        asset_remaps,
    })
}
