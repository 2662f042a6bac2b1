//! Path resolution shared by the backends.
//!
//! A backend describes its node graph through [`Walk`]; [`resolve`] does the
//! component walk, `..` handling and symbolic link substitution.

use tsumiki_io::{Error, Result, path};

/// Symbolic links followed in one resolution before giving up with `Loop`.
pub const MAX_SYMLINK_HOPS: usize = 40;

/// What a node is, as far as the walk cares.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Dir,
    Link(String),
    Leaf,
}

/// A node graph that can be walked by name.
pub(crate) trait Walk {
    type Node: Clone;

    fn root(&self) -> Result<Self::Node>;

    /// Child `name` of directory `dir`.
    fn child(&self, dir: &Self::Node, name: &str) -> Result<Option<Self::Node>>;

    fn step(&self, node: &Self::Node) -> Result<Step>;
}

/// Outcome of resolving a path.
#[derive(Debug)]
pub(crate) struct Lookup<N> {
    /// Directory holding `name`.
    pub parent: N,
    /// The node named `name`, if present.
    pub entry: Option<N>,
    /// Last component walked.
    pub name: String,
    /// Components left after `name`; non-empty when the walk stopped early.
    pub rest: String,
    /// Directories from the root down to and including `parent`.
    pub ancestors: Vec<N>,
}

impl<N> Lookup<N> {
    /// Fails unless the walk reached the final component.
    ///
    /// A missing intermediate directory is `NotExist`, a non-directory in
    /// the middle of the path is `NotDirectory`.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.rest.is_empty() {
            return Ok(());
        }
        match self.entry {
            None => Err(Error::NotExist),
            Some(_) => Err(Error::NotDirectory),
        }
    }

    /// The resolved entry, which must exist.
    pub fn found(&self) -> Result<&N> {
        self.ensure_complete()?;
        self.entry.as_ref().ok_or(Error::NotExist)
    }

    /// Fails with `Exist` if the entry is present.
    pub fn ensure_vacant(&self) -> Result<()> {
        self.ensure_complete()?;
        match self.entry {
            Some(_) => Err(Error::Exist),
            None => Ok(()),
        }
    }

    pub fn is_root(&self) -> bool {
        self.ancestors.is_empty()
    }
}

/// Resolve `name` against the graph.
///
/// Symbolic links in the middle of the path are always followed; a link in
/// the final position only when `follow_last` is set. Relative link targets
/// resolve against the directory holding the link, absolute ones against
/// the root. `..` never climbs above the root.
pub(crate) fn resolve<W: Walk>(w: &W, name: &str, follow_last: bool) -> Result<Lookup<W::Node>> {
    let root = w.root()?;
    let mut name = path::clean(name);
    let mut stack: Vec<(String, W::Node)> = vec![("/".to_string(), root.clone())];
    let mut hops = 0;

    loop {
        let mut substituted = None;
        for (elem, rest) in path::entries(&name) {
            match elem {
                "." => continue,
                ".." => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                    continue;
                }
                _ => {}
            }

            let dir = stack.last().map_or_else(|| root.clone(), |(_, n)| n.clone());
            let Some(node) = w.child(&dir, elem)? else {
                return Ok(Lookup {
                    parent: dir,
                    entry: None,
                    name: elem.to_string(),
                    rest: rest.to_string(),
                    ancestors: nodes(&stack),
                });
            };

            match w.step(&node)? {
                Step::Dir => stack.push((elem.to_string(), node)),
                Step::Link(target) if follow_last || !rest.is_empty() => {
                    if target.is_empty() {
                        return Err(Error::NotExist);
                    }
                    hops += 1;
                    if hops > MAX_SYMLINK_HOPS {
                        return Err(Error::Loop);
                    }
                    if target.starts_with('/') {
                        stack.truncate(1);
                    }
                    substituted = Some(path::join(&[target.as_str(), rest]));
                    break;
                }
                _ => {
                    return Ok(Lookup {
                        parent: dir,
                        entry: Some(node),
                        name: elem.to_string(),
                        rest: rest.to_string(),
                        ancestors: nodes(&stack),
                    });
                }
            }
        }

        if let Some(next) = substituted {
            name = next;
            continue;
        }

        // The walk ended on a directory: the top of the stack.
        let (name, entry) = stack.pop().unwrap_or_else(|| ("/".to_string(), root.clone()));
        return Ok(match stack.last() {
            Some((_, parent)) => Lookup {
                parent: parent.clone(),
                entry: Some(entry),
                name,
                rest: String::new(),
                ancestors: nodes(&stack),
            },
            None => Lookup {
                parent: entry.clone(),
                entry: Some(entry),
                name,
                rest: String::new(),
                ancestors: Vec::new(),
            },
        });
    }
}

fn nodes<N: Clone>(stack: &[(String, N)]) -> Vec<N> {
    stack.iter().map(|(_, n)| n.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tsumiki_io::ErrorKind;

    /// Node ids into a flat table; 0 is the root.
    struct Graph {
        nodes: Vec<(Step, HashMap<String, usize>)>,
    }

    impl Graph {
        fn new() -> Self {
            Self {
                nodes: vec![(Step::Dir, HashMap::new())],
            }
        }

        fn dir(&mut self, parent: usize, name: &str) -> usize {
            self.add(parent, name, Step::Dir)
        }

        fn file(&mut self, parent: usize, name: &str) -> usize {
            self.add(parent, name, Step::Leaf)
        }

        fn link(&mut self, parent: usize, name: &str, target: &str) -> usize {
            self.add(parent, name, Step::Link(target.to_string()))
        }

        fn add(&mut self, parent: usize, name: &str, step: Step) -> usize {
            let id = self.nodes.len();
            self.nodes.push((step, HashMap::new()));
            self.nodes[parent].1.insert(name.to_string(), id);
            id
        }
    }

    impl Walk for Graph {
        type Node = usize;

        fn root(&self) -> Result<usize> {
            Ok(0)
        }

        fn child(&self, dir: &usize, name: &str) -> Result<Option<usize>> {
            Ok(self.nodes[*dir].1.get(name).copied())
        }

        fn step(&self, node: &usize) -> Result<Step> {
            Ok(self.nodes[*node].0.clone())
        }
    }

    fn sample() -> (Graph, usize, usize, usize) {
        let mut g = Graph::new();
        let a = g.dir(0, "a");
        let b = g.dir(a, "b");
        let f = g.file(b, "f");
        (g, a, b, f)
    }

    #[test]
    fn test_root() {
        let (g, ..) = sample();
        for name in ["", ".", "/", "a/..", "/../.."] {
            let l = resolve(&g, name, true).unwrap();
            assert_eq!(l.entry, Some(0), "{name:?}");
            assert_eq!(l.parent, 0);
            assert_eq!(l.name, "/");
            assert!(l.is_root());
        }
    }

    #[test]
    fn test_walks_to_file_and_dir() {
        let (g, a, b, f) = sample();
        let l = resolve(&g, "/a/b/f", true).unwrap();
        assert_eq!((l.parent, l.entry, l.name.as_str()), (b, Some(f), "f"));
        assert_eq!(l.ancestors, vec![0, a, b]);

        let l = resolve(&g, "a/b", true).unwrap();
        assert_eq!((l.parent, l.entry, l.name.as_str()), (a, Some(b), "b"));
        assert_eq!(l.ancestors, vec![0, a]);
    }

    #[test]
    fn test_missing_and_not_directory() {
        let (g, _, b, _) = sample();
        let l = resolve(&g, "a/b/x", true).unwrap();
        assert_eq!((l.parent, l.entry), (b, None));
        assert!(l.ensure_vacant().is_ok());

        let l = resolve(&g, "a/x/y", true).unwrap();
        assert_eq!(l.rest, "y");
        assert_eq!(l.found().unwrap_err().kind(), ErrorKind::NotExist);

        let l = resolve(&g, "a/b/f/y", true).unwrap();
        assert_eq!(l.found().unwrap_err().kind(), ErrorKind::NotDirectory);
    }

    #[test]
    fn test_relative_and_absolute_links() {
        let (mut g, a, b, f) = sample();
        g.link(a, "rel", "b/f");
        g.link(b, "abs", "/a");
        g.link(b, "up", "../b");

        let l = resolve(&g, "a/rel", true).unwrap();
        assert_eq!(l.entry, Some(f));

        let l = resolve(&g, "a/b/abs/b/f", true).unwrap();
        assert_eq!(l.entry, Some(f));
        assert_eq!(l.ancestors, vec![0, a, b]);

        let l = resolve(&g, "a/b/up/f", true).unwrap();
        assert_eq!(l.entry, Some(f));
    }

    #[test]
    fn test_final_link_not_followed() {
        let (mut g, a, _, _) = sample();
        let rel = g.link(a, "rel", "b/f");
        let l = resolve(&g, "a/rel", false).unwrap();
        assert_eq!(l.entry, Some(rel));
        assert_eq!(l.parent, a);
    }

    #[test]
    fn test_dangling_link() {
        let (mut g, a, b, _) = sample();
        g.link(a, "dangling", "b/nope");
        let l = resolve(&g, "a/dangling", true).unwrap();
        assert_eq!((l.parent, l.entry), (b, None));
        assert_eq!(l.found().unwrap_err().kind(), ErrorKind::NotExist);
    }

    #[test]
    fn test_link_cycle_is_loop() {
        let (mut g, a, _, _) = sample();
        g.link(a, "x", "y");
        g.link(a, "y", "x");
        let err = resolve(&g, "a/x", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Loop);

        g.link(a, "self", "self/more");
        let err = resolve(&g, "a/self", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Loop);
    }

    #[test]
    fn test_empty_link_target() {
        let (mut g, a, _, _) = sample();
        g.link(a, "empty", "");
        let err = resolve(&g, "a/empty", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExist);
        let err = resolve(&g, "a/empty/x", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExist);

        // The link itself is still reachable.
        let l = resolve(&g, "a/empty", false).unwrap();
        assert_eq!(l.parent, a);
    }
}
