use std::{path::PathBuf, sync::Arc};

use libbundlemaster::{
    batch::Parallelism,
    bundle_codec::{BundleSnapshot, Compression, DocumentCodec, FieldNode, ObjectSnapshot},
    generator::RemapGenerator,
    remap::{AssetRemap, BundleRemapEntry, RemapTable},
    report::{ChannelReporter, Level, LogReporter, ReportEvent},
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::bundle_test::{
    counting_codec::{Counters, CountingCodec, FailAt},
    fixtures::{bundle, named, rock_builds, write},
};

#[test]
fn rock_mesh_scenario() {
    let _ = env_logger::try_init();

    let dir = tempdir().unwrap();
    let reference = dir.path().join("game");
    let modified = dir.path().join("sdk");
    let output = dir.path().join("remap").join("remap.json");
    rock_builds(&reference, &modified);

    let summary = RemapGenerator::new(DocumentCodec::new)
        .generate_to_file(&reference, &modified, &output, &LogReporter)
        .unwrap();

    let expected = RemapTable::new(vec![BundleRemapEntry {
        relative_path: PathBuf::from("props").join("rock.bundle"),
        old_container_id: "CAB-sdk".to_owned(),
        new_container_id: "CAB-game".to_owned(),
        asset_remaps: vec![AssetRemap {
            name: "Rock".to_owned(),
            type_name: "Mesh".to_owned(),
            old_identifier: 5,
            new_identifier: 77,
        }],
    }]);

    assert_eq!(summary.processed, 1);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.table, expected);
    assert_eq!(RemapTable::load(&output).unwrap(), expected);

    let contents = fs_err::read_to_string(&output).unwrap();
    assert!(contents.contains(r#""relativePath": "props/rock.bundle""#));
}

#[test]
fn missing_counterparts_and_empty_bundles_are_skipped() {
    let dir = tempdir().unwrap();
    let reference = dir.path().join("game");
    let modified = dir.path().join("sdk");
    rock_builds(&reference, &modified);

    // No reference counterpart.
    write(
        &modified.join("only_sdk.bundle"),
        &bundle("CAB-only", &[], vec![named(1, "Mesh", "Lonely")]),
    );

    // Only placeholder names on one side.
    write(
        &reference.join("unnamed.bundle"),
        &bundle("CAB-u1", &[], vec![named(3, "Mesh", "Thing")]),
    );
    write(
        &modified.join("unnamed.bundle"),
        &bundle(
            "CAB-u2",
            &[],
            vec![ObjectSnapshot::new(
                4,
                1,
                FieldNode::composite("Base", "Mesh", vec![]),
            )],
        ),
    );

    // Not a bundle at all.
    fs_err::write(modified.join("notes.txt"), "remember to remap").unwrap();

    let (reporter, receiver) = ChannelReporter::new();
    let summary = RemapGenerator::new(DocumentCodec::new)
        .with_parallelism(Parallelism::AllCores)
        .generate(&reference, &modified, &reporter)
        .unwrap();
    drop(reporter);

    assert_eq!(summary.processed, 3);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.table.len(), 1);
    assert_eq!(
        summary.table.entries[0].relative_path,
        PathBuf::from("props").join("rock.bundle")
    );

    let mut warnings: Vec<_> = receiver
        .iter()
        .filter_map(|event| match event {
            ReportEvent::Log {
                level: Level::Warning,
                message,
            } => Some(message),
            _ => None,
        })
        .collect();
    warnings.sort();

    assert_eq!(
        warnings,
        vec![
            "Skipping only_sdk.bundle - reference bundle not found".to_owned(),
            "Skipping unnamed.bundle - no named assets".to_owned(),
        ]
    );
}

#[test]
fn corrupt_bundles_are_reported_not_fatal() {
    let dir = tempdir().unwrap();
    let reference = dir.path().join("game");
    let modified = dir.path().join("sdk");
    rock_builds(&reference, &modified);

    fs_err::write(reference.join("broken.bundle"), b"UnityFS\0DOC1\0{").unwrap();
    fs_err::write(modified.join("broken.bundle"), b"UnityFS\0DOC1\0{").unwrap();

    let summary = RemapGenerator::new(DocumentCodec::new)
        .generate(&reference, &modified, &LogReporter)
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.table.len(), 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].path, modified.join("broken.bundle"));
}

#[test]
fn repeated_runs_write_identical_tables() {
    let dir = tempdir().unwrap();
    let reference = dir.path().join("game");
    let modified = dir.path().join("sdk");

    for index in 0..12 {
        let name = format!("bundle_{:02}.bundle", index);
        write(
            &reference.join(&name),
            &bundle(
                &format!("CAB-game-{}", index),
                &[],
                vec![named(1000 + index, "Texture2D", &format!("Tex{}", index))],
            ),
        );
        write(
            &modified.join(&name),
            &bundle(
                &format!("CAB-sdk-{}", index),
                &[],
                vec![named(index + 1, "Texture2D", &format!("Tex{}", index))],
            ),
        );
    }

    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");

    let generator = RemapGenerator::new(DocumentCodec::new);
    generator
        .generate_to_file(&reference, &modified, &first, &LogReporter)
        .unwrap();
    generator
        .generate_to_file(&reference, &modified, &second, &LogReporter)
        .unwrap();

    assert_eq!(
        fs_err::read(&first).unwrap(),
        fs_err::read(&second).unwrap()
    );
    assert_eq!(RemapTable::load(&first).unwrap().asset_remap_count(), 12);
}

#[test]
fn every_opened_bundle_is_released() {
    let dir = tempdir().unwrap();
    let reference = dir.path().join("game");
    let modified = dir.path().join("sdk");
    rock_builds(&reference, &modified);
    write(
        &reference.join("tree.bundle"),
        &bundle("CAB-t1", &[], vec![named(8, "Mesh", "Tree")]),
    );
    write(
        &modified.join("tree.bundle"),
        &bundle("CAB-t2", &[], vec![named(9, "Mesh", "Bush")]),
    );

    let counters = Arc::new(Counters::default());
    let summary = RemapGenerator::new(|| CountingCodec::new(Arc::clone(&counters)))
        .generate(&reference, &modified, &LogReporter)
        .unwrap();

    assert_eq!(summary.table.len(), 1);
    assert_eq!(counters.opened(), 4);
    assert_eq!(counters.unloaded(), 4);
}

#[test]
fn bundles_are_released_when_extraction_fails() {
    let dir = tempdir().unwrap();
    let reference = dir.path().join("game");
    let modified = dir.path().join("sdk");
    rock_builds(&reference, &modified);

    let counters = Arc::new(Counters::default());
    let summary =
        RemapGenerator::new(|| CountingCodec::failing(Arc::clone(&counters), FailAt::LoadAssetsFile))
            .generate(&reference, &modified, &LogReporter)
            .unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert!(summary.table.is_empty());
    assert_eq!(counters.opened(), 1);
    assert_eq!(counters.unloaded(), 1);

    // Unreadable trees are named, not fatal, and still released.
    let counters = Arc::new(Counters::default());
    let summary =
        RemapGenerator::new(|| CountingCodec::failing(Arc::clone(&counters), FailAt::ReadTree))
            .generate(&reference, &modified, &LogReporter)
            .unwrap();

    assert!(summary.failures.is_empty());
    assert!(summary.table.is_empty());
    assert_eq!(counters.opened(), 2);
    assert_eq!(counters.unloaded(), 2);
}

#[test]
fn bundles_without_entries_are_released() {
    let dir = tempdir().unwrap();
    let reference = dir.path().join("game");
    let modified = dir.path().join("sdk");

    for root in [&reference, &modified] {
        BundleSnapshot::new()
            .write_to_path(root.join("empty.bundle"), Compression::None)
            .unwrap();
    }

    let counters = Arc::new(Counters::default());
    let summary = RemapGenerator::new(|| CountingCodec::new(Arc::clone(&counters)))
        .generate(&reference, &modified, &LogReporter)
        .unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(counters.opened(), 1);
    assert_eq!(counters.unloaded(), 1);
}
