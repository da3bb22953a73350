//! Binary search tree
//!
//! A plain unbalanced BST plus [`InstrumentedTree`], the thread-safe
//! wrapper that routes `add` and `remove` through the advice dispatcher.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::advice::Dispatcher;
use crate::error::FailedRemove;

type Link<T> = Option<Box<Node<T>>>;

#[derive(Debug)]
struct Node<T> {
    value: T,
    left: Link<T>,
    right: Link<T>,
}

impl<T> Node<T> {
    fn leaf(value: T) -> Box<Self> {
        Box::new(Self {
            value,
            left: None,
            right: None,
        })
    }
}

/// Unbalanced binary search tree without duplicates
#[derive(Debug)]
pub struct Bst<T> {
    root: Link<T>,
    len: usize,
}

impl<T> Bst<T> {
    pub fn new() -> Self {
        Self { root: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// In-order iterator
    pub fn iter(&self) -> Iter<'_, T> {
        let mut iter = Iter { stack: Vec::new() };
        iter.push_left(self.root.as_deref());
        iter
    }
}

impl<T: Ord> Bst<T> {
    /// Insert `value`. Returns false if it was already present.
    pub fn add(&mut self, value: T) -> bool {
        let mut link = &mut self.root;
        while let Some(node) = link {
            link = match value.cmp(&node.value) {
                Ordering::Less => &mut node.left,
                Ordering::Greater => &mut node.right,
                Ordering::Equal => return false,
            };
        }
        *link = Some(Node::leaf(value));
        self.len += 1;
        true
    }

    /// Remove `value` and return the stored item
    pub fn remove(&mut self, value: &T) -> Result<T, FailedRemove> {
        let removed = remove_from(&mut self.root, value).ok_or(FailedRemove)?;
        self.len -= 1;
        Ok(removed)
    }

    pub fn contains(&self, value: &T) -> bool {
        let mut link = &self.root;
        while let Some(node) = link {
            link = match value.cmp(&node.value) {
                Ordering::Less => &node.left,
                Ordering::Greater => &node.right,
                Ordering::Equal => return true,
            };
        }
        false
    }
}

impl<T> Default for Bst<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Degenerate trees are linked lists; drop iteratively so a deep tree
// cannot overflow the stack.
impl<T> Drop for Bst<T> {
    fn drop(&mut self) {
        let mut stack: Vec<Box<Node<T>>> = self.root.take().into_iter().collect();
        while let Some(mut node) = stack.pop() {
            stack.extend(node.left.take());
            stack.extend(node.right.take());
        }
    }
}

fn remove_from<T: Ord>(mut link: &mut Link<T>, value: &T) -> Option<T> {
    loop {
        let ord = value.cmp(&link.as_ref()?.value);
        if ord == Ordering::Equal {
            break;
        }
        let node = link.as_mut()?;
        link = if ord == Ordering::Less {
            &mut node.left
        } else {
            &mut node.right
        };
    }

    let mut node = link.take()?;
    *link = match (node.left.take(), node.right.take()) {
        (None, None) => None,
        (Some(child), None) | (None, Some(child)) => Some(child),
        (Some(left), Some(right)) => {
            let mut rest = Some(right);
            match take_min(&mut rest) {
                Some(mut successor) => {
                    successor.left = Some(left);
                    successor.right = rest;
                    Some(successor)
                }
                None => rest,
            }
        }
    };
    Some(node.value)
}

/// Detach the smallest node under `link`, splicing its right child into
/// its place
fn take_min<T>(mut link: &mut Link<T>) -> Option<Box<Node<T>>> {
    while link.as_ref()?.left.is_some() {
        link = &mut link.as_mut()?.left;
    }
    let mut min = link.take()?;
    *link = min.right.take();
    Some(min)
}

/// In-order iterator over a [`Bst`]
pub struct Iter<'a, T> {
    stack: Vec<&'a Node<T>>,
}

impl<'a, T> Iter<'a, T> {
    fn push_left(&mut self, mut node: Option<&'a Node<T>>) {
        while let Some(n) = node {
            self.stack.push(n);
            node = n.left.as_deref();
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right.as_deref());
        Some(&node.value)
    }
}

/// Shared tree whose operations report to a [`Dispatcher`]
pub struct InstrumentedTree<T> {
    inner: Mutex<Bst<T>>,
    dispatcher: Arc<Dispatcher>,
}

impl<T: Ord> InstrumentedTree<T> {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            inner: Mutex::new(Bst::new()),
            dispatcher,
        }
    }

    /// Add under the around-add advice. Returns whether `item` was inserted.
    pub fn add(&self, item: T) -> bool {
        let mut tree = self.inner.lock();
        self.dispatcher.around_add(|| tree.add(item))
    }

    /// Remove under the around-remove advice. A missing item is counted as
    /// a failed remove and yields `None`.
    pub fn remove(&self, item: &T) -> Option<T> {
        let mut tree = self.inner.lock();
        // FailedRemove is the only error and the advice always absorbs it
        self.dispatcher
            .around_remove(|| tree.remove(item))
            .unwrap_or_default()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.inner.lock().contains(item)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

impl<T: Ord + Clone> InstrumentedTree<T> {
    /// Sorted copy of the current contents
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.lock().iter().cloned().collect()
    }
}
