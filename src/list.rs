//! Singly-linked, order-preserving list of text entries.
//!
//! [`OrderedList`] is the backing store of the environment, alias and history
//! registries kept by an [`ExecutionContext`](crate::context::ExecutionContext).
//! Every [`Node`] exclusively owns its text and the remainder of the chain, and the
//! list owns the head, so a chain is always acyclic and released exactly once.

use std::borrow::Cow;
use std::collections::TryReserveError;
use std::io::{self, Write};
use thiserror::Error;

/// Text written in place of a node that carries no text.
pub const NIL_PLACEHOLDER: &str = "(nil)";

/// Failure to grow a list.
#[derive(Debug, Error)]
pub enum ListError {
    /// Storage for the node text could not be reserved. The list is left untouched.
    #[error("cannot allocate list entry: {0}")]
    Allocation(#[from] TryReserveError),
}

/// One entry of an [`OrderedList`].
///
/// The payload is kept as raw bytes; entries read from a file need not be UTF-8.
#[derive(Debug)]
pub struct Node {
    text: Option<Vec<u8>>,
    tag: usize,
    next: Option<Box<Node>>,
}

impl Node {
    fn new(text: Option<&[u8]>, tag: usize) -> Result<Box<Self>, ListError> {
        let text = text.map(duplicate).transpose()?;
        Ok(Box::new(Self {
            text,
            tag,
            next: None,
        }))
    }

    /// The owned payload, `None` when the node was created without text.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.text.as_deref()
    }

    /// The payload as text, `None` when it is absent or not valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        self.bytes().and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Bytes as printed: the payload or [`NIL_PLACEHOLDER`].
    pub fn display_bytes(&self) -> &[u8] {
        self.bytes().unwrap_or(NIL_PLACEHOLDER.as_bytes())
    }

    /// Printable text, with invalid UTF-8 replaced.
    pub fn display_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.display_bytes())
    }

    /// Replace the payload. On failure the old payload is kept.
    pub fn set_text(&mut self, text: Option<&str>) -> Result<(), ListError> {
        self.text = text.map(str::as_bytes).map(duplicate).transpose()?;
        Ok(())
    }

    pub fn tag(&self) -> usize {
        self.tag
    }

    pub fn set_tag(&mut self, tag: usize) {
        self.tag = tag;
    }
}

fn duplicate(text: &[u8]) -> Result<Vec<u8>, ListError> {
    let mut owned = Vec::new();
    owned.try_reserve_exact(text.len())?;
    owned.extend_from_slice(text);
    Ok(owned)
}

/// Head reference of a chain of [`Node`]s.
#[derive(Debug, Default)]
pub struct OrderedList {
    head: Option<Box<Node>>,
}

impl OrderedList {
    pub fn new() -> Self {
        Self { head: None }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of nodes, counted by traversal.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Link a new node carrying a copy of `text` in front of the current head.
    pub fn insert_front(&mut self, text: Option<&str>, tag: usize) -> Result<&mut Node, ListError> {
        let mut node = Node::new(text.map(str::as_bytes), tag)?;
        node.next = self.head.take();
        Ok(&mut **self.head.insert(node))
    }

    /// Append a new node carrying a copy of `text` after the current tail.
    ///
    /// Walks the whole chain, so this is O(n).
    pub fn insert_end(&mut self, text: Option<&str>, tag: usize) -> Result<&mut Node, ListError> {
        self.insert_end_bytes(text.map(str::as_bytes), tag)
    }

    /// [`insert_end`](Self::insert_end) for a payload that is not necessarily UTF-8.
    pub fn insert_end_bytes(
        &mut self,
        text: Option<&[u8]>,
        tag: usize,
    ) -> Result<&mut Node, ListError> {
        let node = Node::new(text, tag)?;
        let mut cursor = &mut self.head;
        while let Some(current) = cursor {
            cursor = &mut current.next;
        }
        Ok(&mut **cursor.insert(node))
    }

    /// Remove the zero-based `index`-th node.
    ///
    /// Returns `false` and leaves the list as is when `index` is out of range.
    pub fn delete_at(&mut self, index: usize) -> bool {
        if index == 0 {
            return match self.head.take() {
                Some(mut removed) => {
                    self.head = removed.next.take();
                    true
                }
                None => false,
            };
        }

        let mut prev = match self.head.as_deref_mut() {
            Some(node) => node,
            None => return false,
        };
        for _ in 1..index {
            prev = match prev.next.as_deref_mut() {
                Some(node) => node,
                None => return false,
            };
        }
        match prev.next.take() {
            Some(mut removed) => {
                prev.next = removed.next.take();
                true
            }
            None => false,
        }
    }

    /// Release every node in traversal order and leave the list empty.
    pub fn release_all(&mut self) {
        let mut next = self.head.take();
        while let Some(mut node) = next {
            next = node.next.take();
        }
    }

    /// Move every node of `other` onto the tail of this list, leaving `other` empty.
    pub fn append(&mut self, other: &mut OrderedList) {
        let Some(chain) = other.head.take() else {
            return;
        };
        let mut cursor = &mut self.head;
        while let Some(current) = cursor {
            cursor = &mut current.next;
        }
        *cursor = Some(chain);
    }

    /// Write each node's text on its own line and return how many were written.
    pub fn print_ordered(&self, out: &mut dyn Write) -> io::Result<usize> {
        let mut count = 0;
        for node in self.iter() {
            out.write_all(node.display_bytes())?;
            out.write_all(b"\n")?;
            count += 1;
        }
        Ok(count)
    }

    /// Like [`print_ordered`](Self::print_ordered), each line prefixed with `"<tag>: "`.
    pub fn print_numbered(&self, out: &mut dyn Write) -> io::Result<usize> {
        let mut count = 0;
        for node in self.iter() {
            write!(out, "{}: ", node.tag())?;
            out.write_all(node.display_bytes())?;
            out.write_all(b"\n")?;
            count += 1;
        }
        Ok(count)
    }

    /// First node whose text starts with `prefix`, and, when `next` is given,
    /// continues with that character right after the prefix.
    pub fn find_prefixed(&self, prefix: &str, next: Option<char>) -> Option<&Node> {
        self.iter().find(|node| starts_with(node, prefix, next))
    }

    pub fn find_prefixed_mut(&mut self, prefix: &str, next: Option<char>) -> Option<&mut Node> {
        let mut cursor = self.head.as_deref_mut();
        while let Some(node) = cursor {
            if starts_with(node, prefix, next) {
                return Some(node);
            }
            cursor = node.next.as_deref_mut();
        }
        None
    }

    /// Position of the first node matching `predicate`.
    pub fn position<P>(&self, predicate: P) -> Option<usize>
    where
        P: FnMut(&Node) -> bool,
    {
        self.iter().position(predicate)
    }

    /// Tag the nodes `0, 1, 2, …` in order and return how many there are.
    pub fn renumber(&mut self) -> usize {
        let mut count = 0;
        let mut cursor = self.head.as_deref_mut();
        while let Some(node) = cursor {
            node.tag = count;
            count += 1;
            cursor = node.next.as_deref_mut();
        }
        count
    }

    /// Owned copies of every present text, in order.
    pub fn to_strings(&self) -> Vec<String> {
        self.iter()
            .filter_map(|node| node.text().map(str::to_owned))
            .collect()
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head.as_deref(),
        }
    }
}

fn starts_with(node: &Node, prefix: &str, next: Option<char>) -> bool {
    match node.text().and_then(|text| text.strip_prefix(prefix)) {
        Some(rest) => next.is_none_or(|c| rest.starts_with(c)),
        None => false,
    }
}

impl Drop for OrderedList {
    // Iterative so that long chains do not recurse once per node.
    fn drop(&mut self) {
        self.release_all();
    }
}

pub struct Iter<'a> {
    next: Option<&'a Node>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|node| {
            self.next = node.next.as_deref();
            node
        })
    }
}

impl<'a> IntoIterator for &'a OrderedList {
    type Item = &'a Node;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
