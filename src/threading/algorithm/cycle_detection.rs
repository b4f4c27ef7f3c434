//! Ancestry check run before every parent link.
//!
//! Reference headers are untrusted; two messages citing each other must not
//! turn the arena into a loop.

use std::collections::HashSet;

use super::super::container::ContainerArena;

/// Returns true when making `child` a child of `parent` would close a loop,
/// i.e. `child` is `parent` or one of its ancestors.
///
/// ## Example
///
/// ```text
/// Current tree:  A → B → C
///
/// Trying to link: A under C (would create cycle A → B → C → A)
/// Result: true (cycle detected)
///
/// Trying to link: D under C (D is not in chain)
/// Result: false (safe to link)
/// ```
pub fn detect_cycle_in_ancestry(arena: &ContainerArena, child: usize, parent: usize) -> bool {
    // Guards against a corrupted parent chain as well as the child itself
    let mut visited = HashSet::new();
    let mut current = Some(parent);

    while let Some(index) = current {
        if index == child || !visited.insert(index) {
            return true;
        }
        current = arena.parent_of(index);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A → B → C
    fn chain() -> (ContainerArena, usize, usize, usize) {
        let mut arena = ContainerArena::default();
        let a = arena.insert_message("a", 0);
        let b = arena.insert_message("b", 1);
        let c = arena.insert_message("c", 2);
        arena.link(b, a);
        arena.link(c, b);
        (arena, a, b, c)
    }

    #[test]
    fn test_no_cycle_simple_chain() {
        let (mut arena, _, _, c) = chain();
        let d = arena.insert_message("d", 3);
        assert!(!detect_cycle_in_ancestry(&arena, d, c));
    }

    #[test]
    fn test_cycle_detected() {
        let (arena, a, _, c) = chain();
        assert!(detect_cycle_in_ancestry(&arena, a, c));
    }

    #[test]
    fn test_self_loop() {
        let (arena, a, _, _) = chain();
        assert!(detect_cycle_in_ancestry(&arena, a, a));
    }
}
