use serde_json::json;

use edgeset::domain::{MetadataSet, Post, PostId};

fn posts(ids: &[i64]) -> Vec<Post> {
    ids.iter()
        .map(|id| Post::try_from(json!({ "id": id })).unwrap())
        .collect()
}

fn ids(set: &MetadataSet) -> Vec<PostId> {
    set.ids().cloned().collect()
}

#[test]
fn merge_in_two_batches_drops_duplicate() {
    let mut set = MetadataSet::new();
    set.merge(posts(&[1, 2]));
    set.merge(posts(&[2, 3]));
    assert_eq!(ids(&set), vec![PostId::Int(1), PostId::Int(2), PostId::Int(3)]);
}

#[test]
fn every_id_appears_once_across_many_batches() {
    let mut set = MetadataSet::new();
    for batch in [[1, 2, 3], [3, 2, 1], [4, 1, 4], [5, 5, 5]] {
        set.merge(posts(&batch));
    }
    assert_eq!(set.len(), 5);
    let mut seen = ids(&set);
    seen.dedup();
    assert_eq!(seen.len(), 5);
}

#[test]
fn deserialized_set_is_deduplicated() {
    let raw = json!([{"id": 1}, {"id": 2}, {"id": 2}, {"id": 3}]);
    let set: MetadataSet = serde_json::from_value(raw).unwrap();
    assert_eq!(ids(&set), vec![PostId::Int(1), PostId::Int(2), PostId::Int(3)]);
}

#[test]
fn platform_fields_survive_serialization() {
    let raw = json!([{"id": "53", "server": "65535", "secret": "f00d", "title": "corgi"}]);
    let set: MetadataSet = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(serde_json::to_value(&set).unwrap(), raw);
    assert_eq!(set.posts()[0].get_str("title"), Some("corgi"));
}
