// Test serialization using json
#![cfg(feature = "serde")]

use kas_atlas::atlas::{Atlas, AtlasNode};
use kas_atlas::{Config, ConfigFlags, KerningPolicy, RenderMode, TexCoords};
use serde::{de::Deserialize, ser::Serialize};
use std::cmp::PartialEq;
use std::fmt::Debug;

fn test<X: Debug + PartialEq + Serialize + for<'a> Deserialize<'a>>(x: X, t: &str) {
    match serde_json::to_string(&x) {
        Ok(text) => assert_eq!(text, t),
        Err(err) => panic!("Ser of '{x:?}' failed: {err}"),
    }

    match serde_json::from_str::<X>(t) {
        Ok(v) => assert_eq!(v, x),
        Err(err) => panic!("Deser of '{t}' failed: {err}"),
    }
}

#[test]
fn config() {
    test(RenderMode::SignedDistanceField, "\"SignedDistanceField\"");
    test(TexCoords::Pixels, "\"Pixels\"");
    test(KerningPolicy::Deferred, "\"Deferred\"");
    test(ConfigFlags::HINTING | ConfigFlags::KERNING, "\"HINTING | KERNING\"");

    let config = Config {
        render_mode: RenderMode::OutlineEdge,
        outline_thickness: 1.5,
        padding: 2,
        ..Config::default()
    };
    let text = serde_json::to_string(&config).unwrap();
    assert_eq!(serde_json::from_str::<Config>(&text).unwrap(), config);
}

#[test]
fn atlas_node() {
    test(
        AtlasNode {
            x: 1,
            y: 2,
            width: 3,
        },
        "{\"x\":1,\"y\":2,\"width\":3}",
    );
}

#[test]
fn atlas() {
    let mut atlas = Atlas::new(4, 3, 1).unwrap();
    atlas.get_region(1, 1).unwrap();
    atlas.set_region(1, 1, 1, 1, &[7], 1).unwrap();
    atlas.mark_clean();
    test(
        atlas,
        "{\"width\":4,\"height\":3,\"depth\":1,\
        \"data\":[0,0,0,0,0,7,0,0,0,0,0,0],\
        \"nodes\":[{\"x\":1,\"y\":2,\"width\":1},{\"x\":2,\"y\":1,\"width\":1}],\
        \"used\":1,\"dirty\":false}",
    );
}

#[test]
fn atlas_rejects_inconsistent_state() {
    let valid = "{\"width\":4,\"height\":3,\"depth\":1,\
        \"data\":[0,0,0,0,0,0,0,0,0,0,0,0],\
        \"nodes\":[{\"x\":1,\"y\":1,\"width\":2}],\
        \"used\":0,\"dirty\":false}";
    let atlas = serde_json::from_str::<Atlas>(valid).unwrap();
    assert_eq!(atlas.nodes(), &[AtlasNode { x: 1, y: 1, width: 2 }]);

    let short_data = valid.replace("[0,0,0,0,0,0,0,0,0,0,0,0]", "[0,0,0]");
    assert!(serde_json::from_str::<Atlas>(&short_data).is_err());

    let bad_depth = valid.replace("\"depth\":1", "\"depth\":2");
    assert!(serde_json::from_str::<Atlas>(&bad_depth).is_err());

    let no_nodes = valid.replace("[{\"x\":1,\"y\":1,\"width\":2}]", "[]");
    assert!(serde_json::from_str::<Atlas>(&no_nodes).is_err());

    let gap = valid.replace(
        "[{\"x\":1,\"y\":1,\"width\":2}]",
        "[{\"x\":1,\"y\":1,\"width\":1}]",
    );
    assert!(serde_json::from_str::<Atlas>(&gap).is_err());

    let overrun = valid.replace(
        "[{\"x\":1,\"y\":1,\"width\":2}]",
        "[{\"x\":1,\"y\":1,\"width\":4294967295}]",
    );
    assert!(serde_json::from_str::<Atlas>(&overrun).is_err());

    let too_tall = valid.replace("\"y\":1", "\"y\":3");
    assert!(serde_json::from_str::<Atlas>(&too_tall).is_err());

    let overused = valid.replace("\"used\":0", "\"used\":13");
    assert!(serde_json::from_str::<Atlas>(&overused).is_err());
}
