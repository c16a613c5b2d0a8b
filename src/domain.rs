use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EdgesetError;

/// Remote post identifier. Galleries deliver either integers or strings,
/// and the value is kept in whichever form it arrived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PostId {
    Int(i64),
    Str(String),
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostId::Int(value) => write!(f, "{value}"),
            PostId::Str(value) => write!(f, "{value}"),
        }
    }
}

impl TryFrom<&Value> for PostId {
    type Error = EdgesetError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Number(number) => number
                .as_i64()
                .map(PostId::Int)
                .ok_or_else(|| EdgesetError::Metadata(format!("non-integer post id {number}"))),
            Value::String(text) if !text.is_empty() => Ok(PostId::Str(text.clone())),
            other => Err(EdgesetError::Metadata(format!("invalid post id {other}"))),
        }
    }
}

/// One gallery item. Fields other than `id` are platform specific and are
/// kept verbatim so the persisted metadata mirrors the remote response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Post {
    id: PostId,
    fields: Map<String, Value>,
}

impl Post {
    pub fn id(&self) -> &PostId {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// String or numeric field rendered as text, for URL templating.
    pub fn get_text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }
}

impl TryFrom<Map<String, Value>> for Post {
    type Error = EdgesetError;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        let id = fields
            .get("id")
            .ok_or_else(|| EdgesetError::Metadata("post without id".to_string()))
            .and_then(PostId::try_from)?;
        Ok(Self { id, fields })
    }
}

impl TryFrom<Value> for Post {
    type Error = EdgesetError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Post::try_from(fields),
            other => Err(EdgesetError::Metadata(format!(
                "expected post object, got {other}"
            ))),
        }
    }
}

impl From<Post> for Map<String, Value> {
    fn from(post: Post) -> Self {
        post.fields
    }
}

impl PartialEq for Post {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Post {}

/// Posts in discovery order with unique ids. Duplicates are rejected when
/// they are merged in, so the first sighting of an id always wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Post>", into = "Vec<Post>")]
pub struct MetadataSet {
    posts: Vec<Post>,
    seen: HashSet<PostId>,
}

impl MetadataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every post whose id is not yet present and returns how many
    /// were added.
    pub fn merge<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = Post>,
    {
        let before = self.posts.len();
        for post in batch {
            if self.seen.insert(post.id.clone()) {
                self.posts.push(post);
            }
        }
        self.posts.len() - before
    }

    pub fn contains(&self, id: &PostId) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn ids(&self) -> impl Iterator<Item = &PostId> {
        self.posts.iter().map(Post::id)
    }
}

impl From<Vec<Post>> for MetadataSet {
    fn from(posts: Vec<Post>) -> Self {
        let mut set = MetadataSet::new();
        set.merge(posts);
        set
    }
}

impl From<MetadataSet> for Vec<Post> {
    fn from(set: MetadataSet) -> Self {
        set.posts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(value: Value) -> Post {
        Post::try_from(value).unwrap()
    }

    #[test]
    fn merge_keeps_first_sighting() {
        let mut set = MetadataSet::new();
        set.merge([post(json!({"id": 1, "tag": "a"}))]);
        let added = set.merge([post(json!({"id": 1, "tag": "b"})), post(json!({"id": 2}))]);
        assert_eq!(added, 1);
        assert_eq!(set.posts()[0].get_str("tag"), Some("a"));
    }

    #[test]
    fn string_and_integer_ids_are_distinct() {
        let a = post(json!({"id": 7}));
        let b = post(json!({"id": "7"}));
        assert_ne!(a, b);
        assert_eq!(a.id().to_string(), b.id().to_string());
    }

    #[test]
    fn rejects_post_without_id() {
        assert!(Post::try_from(json!({"file_url": "x"})).is_err());
    }
}
