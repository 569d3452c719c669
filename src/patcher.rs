//! Rewrites bundles so that they refer to a reference build's identifiers
//! and container ids instead of a modified build's.

use std::{
    io::{self, BufWriter, Write},
    path::{Component, Path, PathBuf},
};

use anyhow::{bail, Context};
use bundle_codec::{
    AssetsFile, BundleCodec, Compression, FieldNode, FieldValue, OpenBundle, Primitive,
};

use crate::{
    batch::{find_bundles, BatchFailure, BatchRunner, Parallelism, SignatureFilter},
    remap::{CabMap, PathMap, RemapTable},
    report::{Level, Reporter},
    scratch::{copy_atomic, ScratchFile},
};

/// What happened to one input bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// At least one identifier or container id was rewritten.
    Patched,

    /// Nothing matched; the bundle was copied unchanged.
    Copied,
}

#[derive(Debug)]
pub struct PatchSummary {
    /// Every completed bundle, by input path, in input order.
    pub outcomes: Vec<(PathBuf, PatchOutcome)>,
    pub failures: Vec<BatchFailure>,
}

impl PatchSummary {
    pub fn patched(&self) -> usize {
        self.count(PatchOutcome::Patched)
    }

    pub fn copied(&self) -> usize {
        self.count(PatchOutcome::Copied)
    }

    fn count(&self, wanted: PatchOutcome) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == wanted)
            .count()
    }
}

/// The maps derived from a remap table, shared by every worker.
#[derive(Debug, Clone)]
pub struct PatchMaps {
    pub cab_map: CabMap,
    pub path_map: PathMap,
}

impl PatchMaps {
    pub fn from_table(table: &RemapTable) -> anyhow::Result<Self> {
        let cab_map = table
            .cab_map()
            .context("Could not build container id matcher")?;
        let path_map = table.path_map();

        log::debug!(
            "Derived {} container ids and {} identifiers from remap table",
            cab_map.len(),
            path_map.len()
        );

        Ok(Self { cab_map, path_map })
    }
}

/// Applies a remap table to every bundle under a directory.
///
/// `new_codec` is called once per bundle, so that no codec is shared
/// between workers.
pub struct PatchEngine<F> {
    new_codec: F,
    compression: Compression,
    parallelism: Parallelism,
}

impl<F, C> PatchEngine<F>
where
    F: Fn() -> C + Sync,
    C: BundleCodec,
{
    pub fn new(new_codec: F) -> Self {
        Self {
            new_codec,
            compression: Compression::Lzma,
            parallelism: Parallelism::AllCores,
        }
    }

    /// Compression used for bundles that were modified. Unmodified bundles
    /// are always copied as they are.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Patches every bundle under `input_dir` into the same relative path
    /// under `output_dir`.
    pub fn patch(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        table: &RemapTable,
        reporter: &dyn Reporter,
    ) -> anyhow::Result<PatchSummary> {
        let maps = PatchMaps::from_table(table)?;

        fs_err::create_dir_all(output_dir).with_context(|| {
            format!("Could not create output directory {}", output_dir.display())
        })?;

        let bundles = find_bundles(input_dir, SignatureFilter::AnyBundle)?;
        log::info!("Found {} bundles under {}", bundles.len(), input_dir.display());

        let runner = BatchRunner::new(self.parallelism, reporter)?;
        let outcome = runner.run(&bundles, |input_path| {
            let relative_path = input_path.strip_prefix(input_dir).with_context(|| {
                format!("{} is not inside {}", input_path.display(), input_dir.display())
            })?;
            let output_path = output_dir.join(relative_path);

            let outcome = self.patch_file(input_path, &output_path, &maps)?;
            reporter.log(
                Level::Debug,
                &format!("Processed {} ({:?})", relative_path.display(), outcome),
            );

            Ok(outcome)
        });

        let summary = PatchSummary {
            outcomes: outcome.completed,
            failures: outcome.failures,
        };

        reporter.log(
            Level::Success,
            &format!(
                "Patched {} bundles, copied {} unchanged, {} failed",
                summary.patched(),
                summary.copied(),
                summary.failures.len()
            ),
        );

        Ok(summary)
    }

    /// Patches a single bundle. `output_path` is replaced atomically; on
    /// failure it is left as it was.
    pub fn patch_file(
        &self,
        input_path: &Path,
        output_path: &Path,
        maps: &PatchMaps,
    ) -> anyhow::Result<PatchOutcome> {
        if let Some(parent) = output_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let mut codec = (self.new_codec)();
        let mut bundle = OpenBundle::open(&mut codec, input_path)?;

        let mut file = match bundle.load_assets_file(0)? {
            Some(file) => file,
            None => {
                log::debug!(
                    "First entry of {} is not a serialized file, copying",
                    input_path.display()
                );
                bundle.close();
                copy_atomic(input_path, output_path)?;
                return Ok(PatchOutcome::Copied);
            }
        };

        if !rewrite_assets_file(&mut bundle, &mut file, maps)? {
            bundle.close();
            copy_atomic(input_path, output_path)?;
            return Ok(PatchOutcome::Copied);
        }

        bundle.replace_assets_file(0, file)?;

        let written = ScratchFile::for_destination(output_path)?;
        {
            let mut writer = BufWriter::new(written.create()?);
            bundle.write(&mut writer)?;
            writer.flush()?;
        }
        bundle.close();

        match self.compression {
            Compression::None => written.persist(output_path)?,
            Compression::Lzma => {
                let packed = ScratchFile::for_destination(output_path)?;
                {
                    let mut writer = BufWriter::new(packed.create()?);
                    codec.pack(written.path(), &mut writer, Compression::Lzma)?;
                    writer.flush()?;
                }
                packed.persist(output_path)?;
            }
        }

        Ok(PatchOutcome::Patched)
    }
}

/// Applies both rewriting passes to an object set. Returns whether anything
/// changed.
fn rewrite_assets_file<C: BundleCodec>(
    bundle: &mut OpenBundle<'_, C>,
    file: &mut AssetsFile,
    maps: &PatchMaps,
) -> anyhow::Result<bool> {
    let mut modified = rewrite_externals(&mut file.externals, &maps.cab_map);

    for object in &mut file.objects {
        let mut tree = bundle.read_tree(object)?;

        if let Some(new_path_id) = maps.path_map.get(object.path_id) {
            if new_path_id != object.path_id {
                object.path_id = new_path_id;
                modified = true;
            }
        }

        let mut tree_modified = rewrite_strings(&mut tree, &maps.cab_map);
        tree_modified |= rewrite_pointers(&mut tree, &maps.path_map);

        if tree_modified {
            object.data = bundle.write_tree(&tree)?;
            modified = true;
        }
    }

    Ok(modified)
}

/// Substitutes container ids inside external dependency paths.
pub fn rewrite_externals(externals: &mut [String], cab_map: &CabMap) -> bool {
    let mut modified = false;

    for external in externals {
        if let Some(replaced) = cab_map.substitute(external) {
            log::trace!("Rewrote external {} to {}", external, replaced);
            *external = replaced;
            modified = true;
        }
    }

    modified
}

/// Substitutes container ids inside every string field of a tree.
pub fn rewrite_strings(tree: &mut FieldNode, cab_map: &CabMap) -> bool {
    if cab_map.is_empty() {
        return false;
    }

    tree.visit_mut(&mut |node: &mut FieldNode| {
        if let FieldValue::Primitive(Primitive::String(value)) = &mut node.value {
            if let Some(replaced) = cab_map.substitute(value) {
                *value = replaced;
                return true;
            }
        }

        false
    })
}

/// Rewrites the `m_PathID` half of every `m_FileID`/`m_PathID` pair whose
/// identifier is in the map.
pub fn rewrite_pointers(tree: &mut FieldNode, path_map: &PathMap) -> bool {
    if path_map.is_empty() {
        return false;
    }

    tree.visit_mut(&mut |node: &mut FieldNode| {
        if !node.is_pointer() {
            return false;
        }

        let path_id = &mut node.children_mut()[1];
        match path_id.as_i64().and_then(|old| Some((old, path_map.get(old)?))) {
            Some((old, new)) if old != new => path_id.set_i64(new),
            _ => false,
        }
    })
}

/// Fails if the path cannot hold the output of a batch.
///
/// Both paths are compared after resolving symlinks and `..`, so the output
/// directory does not need to exist yet.
pub fn check_output_dir(input_dir: &Path, output_dir: &Path) -> anyhow::Result<()> {
    let input = resolve_existing(input_dir)
        .with_context(|| format!("Could not resolve input directory {}", input_dir.display()))?;
    let output = resolve_existing(output_dir)
        .with_context(|| format!("Could not resolve output directory {}", output_dir.display()))?;

    if output.starts_with(&input) && output != input {
        bail!(
            "Output directory {} is inside input directory {}",
            output_dir.display(),
            input_dir.display()
        );
    }

    Ok(())
}

/// Canonicalizes the longest existing prefix of `path` and appends the rest
/// of it, resolving any `..` left in the part that doesn't exist.
fn resolve_existing(path: &Path) -> io::Result<PathBuf> {
    let mut missing = Vec::new();
    let mut existing = path;

    let mut resolved = loop {
        match fs_err::canonicalize(existing) {
            Ok(canonical) => break canonical,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                match existing.components().next_back() {
                    Some(last) => missing.push(last),
                    None => return Err(err),
                }

                existing = match existing.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent,
                    Some(_) => Path::new("."),
                    None => return Err(err),
                };
            }
            Err(err) => return Err(err),
        }
    };

    for component in missing.into_iter().rev() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            other => resolved.push(other),
        }
    }

    Ok(resolved)
}
