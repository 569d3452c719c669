//! Builders for the small bundle trees the tests run against.

use std::path::Path;

use libbundlemaster::bundle_codec::{
    BundleSnapshot, Compression, FieldNode, ObjectSnapshot, PathId,
};

/// A named object of the given type with no references.
pub fn named(path_id: PathId, type_name: &str, name: &str) -> ObjectSnapshot {
    ObjectSnapshot::new(
        path_id,
        1,
        FieldNode::composite("Base", type_name, vec![FieldNode::string("m_Name", name)]),
    )
}

/// A renderer that points at `mesh` and `material` inside the file
/// referenced by external index 1.
pub fn renderer(path_id: PathId, mesh: PathId, material: PathId) -> ObjectSnapshot {
    ObjectSnapshot::new(
        path_id,
        23,
        FieldNode::composite(
            "Base",
            "MeshRenderer",
            vec![
                FieldNode::string("m_Name", "RockRenderer"),
                FieldNode::pointer("m_Mesh", 1, mesh),
                FieldNode::composite(
                    "m_Materials",
                    "Array",
                    vec![FieldNode::pointer("data", 1, material)],
                ),
                FieldNode::int("m_SortingOrder", mesh),
            ],
        ),
    )
}

pub fn bundle(container_id: &str, externals: &[&str], objects: Vec<ObjectSnapshot>) -> BundleSnapshot {
    BundleSnapshot::new().with_assets_file(
        container_id,
        externals.iter().map(|external| external.to_string()).collect(),
        objects,
    )
}

pub fn write(path: &Path, snapshot: &BundleSnapshot) {
    snapshot.write_to_path(path, Compression::Lzma).unwrap();
}

/// Lays out a reference and a modified build holding the same `Rock` mesh
/// under different identifiers and container ids.
pub fn rock_builds(reference_root: &Path, modified_root: &Path) {
    write(
        &reference_root.join("props").join("rock.bundle"),
        &bundle("CAB-game", &[], vec![named(77, "Mesh", "Rock")]),
    );
    write(
        &modified_root.join("props").join("rock.bundle"),
        &bundle("CAB-sdk", &[], vec![named(5, "Mesh", "Rock")]),
    );
}

/// A bundle from the modified build that depends on the `Rock` mesh.
pub fn rock_dependent() -> BundleSnapshot {
    bundle(
        "CAB-mod",
        &["archive:/CAB-sdk/CAB-sdk"],
        vec![renderer(100, 5, 6)],
    )
}
