//! Slash-separated path strings.
//!
//! Pure textual manipulation with POSIX semantics. Nothing here touches a
//! filesystem.

/// Shortest path equivalent to `path` by purely lexical processing.
///
/// Collapses repeated slashes, drops `.` elements and resolves `..` against
/// the preceding element. A `..` at the root of an absolute path is dropped;
/// leading `..` elements of a relative path are kept. The empty path cleans
/// to `"."`.
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    // Leading `..` elements that cannot be backtracked.
    let mut dotdot = 0;

    for elem in path.split('/') {
        match elem {
            "" | "." => {}
            ".." => {
                if out.len() > dotdot {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                    dotdot += 1;
                }
            }
            elem => out.push(elem),
        }
    }

    let joined = out.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Split after the last slash: `dir` keeps its trailing slash.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(pos) => (&path[..=pos], &path[pos + 1..]),
        None => ("", path),
    }
}

/// Join the non-empty elements with slashes and clean the result.
///
/// Returns the empty string when every element is empty.
pub fn join<S: AsRef<str>>(elems: &[S]) -> String {
    let parts: Vec<&str> = elems
        .iter()
        .map(AsRef::as_ref)
        .filter(|e| !e.is_empty())
        .collect();
    if parts.is_empty() {
        return String::new();
    }
    clean(&parts.join("/"))
}

/// Last element of `path`, ignoring trailing slashes.
pub fn base(path: &str) -> &str {
    if path.is_empty() {
        return ".";
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// Everything but the last element, cleaned.
pub fn dir(path: &str) -> String {
    clean(split(path).0)
}

/// Iterate `(element, rest)` pairs from the front.
///
/// ```
/// let v: Vec<_> = tsumiki_io::path::entries("/a/b/c").collect();
/// assert_eq!(v, [("a", "b/c"), ("b", "c"), ("c", "")]);
/// ```
pub fn entries(path: &str) -> Entries<'_> {
    let pos = usize::from(path.starts_with('/'));
    Entries { path, pos }
}

/// Iterate `(element, rest)` pairs from the back, where `rest` is what
/// follows the element.
///
/// ```
/// let v: Vec<_> = tsumiki_io::path::entries_reverse("a/b/c").collect();
/// assert_eq!(v, [("c", ""), ("b", "c"), ("a", "b/c")]);
/// ```
pub fn entries_reverse(path: &str) -> EntriesReverse<'_> {
    let begin = usize::from(path.starts_with('/'));
    let end = if path.len() > begin && path.ends_with('/') {
        path.len() - 1
    } else {
        path.len()
    };
    EntriesReverse { path, begin, end }
}

/// See [`entries`].
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    path: &'a str,
    pos: usize,
}

impl<'a> Iterator for Entries<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.path.len() {
            return None;
        }
        let tail = &self.path[self.pos..];
        match tail.find('/') {
            Some(i) => {
                self.pos += i + 1;
                Some((&tail[..i], &tail[i + 1..]))
            }
            None => {
                self.pos = self.path.len();
                Some((tail, ""))
            }
        }
    }
}

/// See [`entries_reverse`].
#[derive(Debug, Clone)]
pub struct EntriesReverse<'a> {
    path: &'a str,
    begin: usize,
    // One past the last byte of the next element to yield.
    end: usize,
}

impl<'a> Iterator for EntriesReverse<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.end <= self.begin {
            return None;
        }
        let rest = self.path.get(self.end + 1..).unwrap_or("");
        let head = &self.path[self.begin..self.end];
        match head.rfind('/') {
            Some(i) => {
                let elem = &head[i + 1..];
                self.end = self.begin + i;
                Some((elem, rest))
            }
            None => {
                self.end = self.begin;
                Some((head, rest))
            }
        }
    }
}
