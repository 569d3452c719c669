use std::{path::Path, sync::Arc};

use libbundlemaster::{
    bundle_codec::{BundleSnapshot, Compression, DocumentCodec, FieldNode},
    generator::RemapGenerator,
    patcher::{PatchEngine, PatchOutcome},
    remap::RemapTable,
    report::LogReporter,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::bundle_test::{
    counting_codec::{Counters, CountingCodec, FailAt},
    fixtures::{bundle, named, renderer, rock_builds, rock_dependent, write},
    io_util::list_files,
};

fn rock_table(root: &Path) -> RemapTable {
    let reference = root.join("game");
    let modified = root.join("sdk");
    rock_builds(&reference, &modified);

    RemapGenerator::new(DocumentCodec::new)
        .generate_to_file(&reference, &modified, &root.join("remap.json"), &LogReporter)
        .unwrap()
        .table
}

fn path_id(node: &FieldNode) -> Option<i64> {
    node.get("m_PathID").and_then(FieldNode::as_i64)
}

#[test]
fn rewrites_only_matching_references() {
    let _ = env_logger::try_init();

    let dir = tempdir().unwrap();
    let table = rock_table(dir.path());

    let input = dir.path().join("mod");
    let output = dir.path().join("out");
    write(&input.join("characters").join("golem.bundle"), &rock_dependent());

    let summary = PatchEngine::new(DocumentCodec::new)
        .patch(&input, &output, &table, &LogReporter)
        .unwrap();

    assert_eq!(summary.patched(), 1);
    assert_eq!(summary.copied(), 0);
    assert!(summary.failures.is_empty());
    assert_eq!(list_files(&output), vec!["characters/golem.bundle"]);

    let patched = BundleSnapshot::read_from_path(output.join("characters").join("golem.bundle"))
        .unwrap();
    assert_eq!(patched.externals(), ["archive:/CAB-game/CAB-game".to_owned()]);

    let tree = &patched.object(100).unwrap().tree;
    assert_eq!(path_id(tree.get("m_Mesh").unwrap()), Some(77));
    assert_eq!(
        path_id(&tree.get("m_Materials").unwrap().children()[0]),
        Some(6)
    );
    assert_eq!(
        tree.get("m_SortingOrder").and_then(FieldNode::as_i64),
        Some(5)
    );
    assert_eq!(
        tree.get("m_Name").and_then(FieldNode::as_str),
        Some("RockRenderer")
    );
}

#[test]
fn objects_keep_or_change_their_own_identifier() {
    let dir = tempdir().unwrap();
    let table = rock_table(dir.path());

    let input = dir.path().join("mod");
    let output = dir.path().join("out");
    write(
        &input.join("rock.bundle"),
        &bundle("CAB-sdk", &[], vec![named(5, "Mesh", "Rock"), named(6, "Material", "Rock")]),
    );

    PatchEngine::new(DocumentCodec::new)
        .patch(&input, &output, &table, &LogReporter)
        .unwrap();

    let patched = BundleSnapshot::read_from_path(output.join("rock.bundle")).unwrap();
    assert!(patched.object(5).is_none());
    assert!(patched.object(77).is_some());
    assert!(patched.object(6).is_some());
}

#[test]
fn untouched_bundles_are_copied_exactly() {
    let dir = tempdir().unwrap();
    let table = rock_table(dir.path());

    let input = dir.path().join("mod");
    let output = dir.path().join("out");
    let unrelated = bundle("CAB-other", &["library/unity default resources"], vec![renderer(1, 2, 3)]);
    write(&input.join("unrelated.bundle"), &unrelated);
    fs_err::write(input.join("readme.txt"), "not a bundle").unwrap();

    let summary = PatchEngine::new(DocumentCodec::new)
        .patch(&input, &output, &table, &LogReporter)
        .unwrap();

    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.outcomes[0].1, PatchOutcome::Copied);
    assert_eq!(
        fs_err::read(output.join("unrelated.bundle")).unwrap(),
        fs_err::read(input.join("unrelated.bundle")).unwrap()
    );
    assert_eq!(list_files(&output), vec!["unrelated.bundle"]);
}

#[test]
fn patching_is_idempotent() {
    let dir = tempdir().unwrap();
    let table = rock_table(dir.path());

    let input = dir.path().join("mod");
    write(&input.join("golem.bundle"), &rock_dependent());
    write(
        &input.join("other.bundle"),
        &bundle("CAB-other", &[], vec![renderer(1, 2, 3)]),
    );

    for compression in [Compression::Lzma, Compression::None] {
        let engine = PatchEngine::new(DocumentCodec::new).with_compression(compression);
        let first = dir.path().join(format!("first-{:?}", compression));
        let second = dir.path().join(format!("second-{:?}", compression));

        engine.patch(&input, &first, &table, &LogReporter).unwrap();
        engine.patch(&input, &second, &table, &LogReporter).unwrap();

        for name in ["golem.bundle", "other.bundle"] {
            assert_eq!(
                fs_err::read(first.join(name)).unwrap(),
                fs_err::read(second.join(name)).unwrap(),
                "{} differs between runs",
                name
            );
        }
    }
}

#[test]
fn corrupt_bundles_do_not_stop_the_batch() {
    let dir = tempdir().unwrap();
    let table = rock_table(dir.path());

    let input = dir.path().join("mod");
    let output = dir.path().join("out");
    write(&input.join("a.bundle"), &rock_dependent());
    write(&input.join("b.bundle"), &rock_dependent());
    fs_err::write(input.join("c.bundle"), b"UnityFS\0DOC1\0{ truncated").unwrap();

    let summary = PatchEngine::new(DocumentCodec::new)
        .patch(&input, &output, &table, &LogReporter)
        .unwrap();

    assert_eq!(summary.outcomes.len(), 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].path, input.join("c.bundle"));
    assert_eq!(list_files(&output), vec!["a.bundle", "b.bundle"]);
    assert_eq!(
        fs_err::read(output.join("a.bundle")).unwrap(),
        fs_err::read(output.join("b.bundle")).unwrap()
    );
}

#[test]
fn patches_in_place() {
    let dir = tempdir().unwrap();
    let table = rock_table(dir.path());

    let input = dir.path().join("mod");
    write(&input.join("golem.bundle"), &rock_dependent());

    PatchEngine::new(DocumentCodec::new)
        .with_compression(Compression::None)
        .patch(&input, &input, &table, &LogReporter)
        .unwrap();

    let patched = BundleSnapshot::read_from_path(input.join("golem.bundle")).unwrap();
    assert_eq!(
        path_id(patched.object(100).unwrap().tree.get("m_Mesh").unwrap()),
        Some(77)
    );
    assert_eq!(list_files(&input), vec!["golem.bundle"]);
}

#[test]
fn every_opened_bundle_is_released() {
    let dir = tempdir().unwrap();
    let table = rock_table(dir.path());

    let input = dir.path().join("mod");
    let output = dir.path().join("out");
    write(&input.join("golem.bundle"), &rock_dependent());
    write(
        &input.join("other.bundle"),
        &bundle("CAB-other", &[], vec![renderer(1, 2, 3)]),
    );

    let counters = Arc::new(Counters::default());
    PatchEngine::new(|| CountingCodec::new(Arc::clone(&counters)))
        .patch(&input, &output, &table, &LogReporter)
        .unwrap();

    assert_eq!(counters.opened(), 2);
    assert_eq!(counters.unloaded(), 2);
}

#[test]
fn bundles_are_released_when_patching_fails() {
    let dir = tempdir().unwrap();
    let table = rock_table(dir.path());

    let input = dir.path().join("mod");
    write(&input.join("golem.bundle"), &rock_dependent());

    for fail_at in [
        FailAt::LoadAssetsFile,
        FailAt::ReadTree,
        FailAt::ReplaceAssetsFile,
        FailAt::Write,
        FailAt::Pack,
    ] {
        let output = dir.path().join(format!("out-{:?}", fail_at));
        let counters = Arc::new(Counters::default());

        let summary = PatchEngine::new(|| CountingCodec::failing(Arc::clone(&counters), fail_at))
            .with_compression(Compression::Lzma)
            .patch(&input, &output, &table, &LogReporter)
            .unwrap();

        assert_eq!(summary.failures.len(), 1, "{:?}", fail_at);
        assert_eq!(counters.opened(), 1, "{:?}", fail_at);
        assert_eq!(counters.unloaded(), 1, "{:?}", fail_at);

        // Neither the output nor any temporary file is left behind.
        assert!(list_files(&output).is_empty(), "{:?}", fail_at);
    }
}
