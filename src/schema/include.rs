use std::collections::BTreeMap;

/// Relations to expand during dump, from dotted `with` paths: `["author", "notes.author"]`
/// becomes `{author: {}, notes: {author: {}}}`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncludeTree(BTreeMap<String, IncludeTree>);

impl IncludeTree {
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = IncludeTree::default();
        for path in paths {
            let mut node = &mut root;
            for segment in path.as_ref().split('.').filter(|s| !s.is_empty()) {
                node = node.0.entry(segment.to_string()).or_default();
            }
        }
        root
    }

    /// Subtree for `name`, or `None` when it should collapse to keys.
    pub fn child(&self, name: &str) -> Option<&IncludeTree> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
