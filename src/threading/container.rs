//! Container data structures for the JWZ threading algorithm
//!
//! The JWZ algorithm uses a "container" abstraction to represent both real messages
//! and placeholders (messages referenced but not present in the input). Containers
//! live in an arena and refer to each other by index, so a malformed reference
//! graph can never produce aliased ownership.

use std::collections::HashMap;

use crate::models::MessageKey;

/// A node in the thread graph while it is being built.
///
/// ## Placeholder Containers
///
/// Placeholders are created for identifiers that some message references but
/// that no input message carries. They keep the reference chain intact until
/// pruning splices their children upward.
#[derive(Debug, Clone)]
pub struct Container {
    /// Normalized key of this container
    pub key: MessageKey,

    /// Index of the message held here (None for placeholders)
    pub message: Option<usize>,

    /// Arena index of the parent container (None for root candidates)
    pub parent: Option<usize>,

    /// Arena indices of the children, in link order
    pub children: Vec<usize>,
}

impl Container {
    /// Create a new container for a real message
    pub fn new_with_message(key: MessageKey, message: usize) -> Self {
        Container {
            key,
            message: Some(message),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Create a placeholder container (for referenced but missing messages)
    pub fn new_placeholder(key: MessageKey) -> Self {
        Container {
            key,
            message: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.message.is_none()
    }

    /// Add a child to this container (avoiding duplicates)
    pub fn add_child(&mut self, child: usize) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }
}

/// Arena of containers addressed by index, with a key lookup table.
#[derive(Debug, Default)]
pub struct ContainerArena {
    containers: Vec<Container>,
    index: HashMap<MessageKey, usize>,
}

impl ContainerArena {
    pub fn with_capacity(capacity: usize) -> Self {
        ContainerArena {
            containers: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn lookup(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn get(&self, index: usize) -> &Container {
        &self.containers[index]
    }

    pub fn parent_of(&self, index: usize) -> Option<usize> {
        self.containers[index].parent
    }

    /// Place a message in the container for `key`, filling a placeholder if one exists.
    pub fn insert_message(&mut self, key: &str, message: usize) -> usize {
        match self.index.get(key) {
            Some(&existing) => {
                self.containers[existing].message = Some(message);
                existing
            }
            None => self.push(Container::new_with_message(key.to_string(), message)),
        }
    }

    /// Container for `key`, creating a placeholder when none exists yet.
    pub fn get_or_insert_placeholder(&mut self, key: &str) -> usize {
        match self.index.get(key) {
            Some(&existing) => existing,
            None => self.push(Container::new_placeholder(key.to_string())),
        }
    }

    /// Make `child` a child of `parent`, detaching it from any previous parent.
    ///
    /// Callers are responsible for the cycle check.
    pub fn link(&mut self, child: usize, parent: usize) {
        if let Some(previous) = self.containers[child].parent.take() {
            self.containers[previous].children.retain(|&c| c != child);
        }
        self.containers[child].parent = Some(parent);
        self.containers[parent].add_child(child);
    }

    /// Indices of all containers without a parent, in creation order.
    pub fn roots(&self) -> Vec<usize> {
        self.containers
            .iter()
            .enumerate()
            .filter(|(_, container)| container.parent.is_none())
            .map(|(index, _)| index)
            .collect()
    }

    fn push(&mut self, container: Container) -> usize {
        let index = self.containers.len();
        self.index.insert(container.key.clone(), index);
        self.containers.push(container);
        index
    }
}
