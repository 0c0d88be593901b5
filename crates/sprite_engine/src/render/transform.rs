//! World transform stack
//!
//! Scene objects push their local transform while their subtree updates.
//! The stack is shared by everything that needs the active world transform
//! (sequences, sounds, hit tests), so it lives behind an `Rc` with interior
//! mutability. Pushing returns a [`TransformGuard`] that pops on drop, which
//! keeps the stack balanced when an update returns early with an error.

use crate::foundation::math::Mat3;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared stack of world transforms
#[derive(Debug, Clone)]
pub struct TransformStack {
    stack: Rc<RefCell<Vec<Mat3>>>,
}

impl Default for TransformStack {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformStack {
    /// Stack holding only the identity transform
    pub fn new() -> Self {
        Self {
            stack: Rc::new(RefCell::new(vec![Mat3::identity()])),
        }
    }

    /// Active world transform
    pub fn top(&self) -> Mat3 {
        self.stack.borrow().last().copied().unwrap_or_else(Mat3::identity)
    }

    /// Combine `local` with the active transform and make it active until
    /// the guard is dropped
    pub fn push(&self, local: &Mat3) -> TransformGuard {
        let world = self.top() * local;
        self.stack.borrow_mut().push(world);
        TransformGuard {
            stack: self.clone(),
            world,
        }
    }

    /// Number of pushed transforms above the root
    pub fn depth(&self) -> usize {
        self.stack.borrow().len() - 1
    }

    /// Drop everything above the root; used once per frame and after device loss
    pub fn reset(&self) {
        self.stack.borrow_mut().truncate(1);
    }

    fn pop(&self) {
        let mut stack = self.stack.borrow_mut();
        if stack.len() > 1 {
            stack.pop();
        }
    }
}

/// Active push on a [`TransformStack`]; pops when dropped
#[must_use = "the transform is popped as soon as the guard is dropped"]
#[derive(Debug)]
pub struct TransformGuard {
    stack: TransformStack,
    world: Mat3,
}

impl TransformGuard {
    /// World transform established by this push
    pub fn world(&self) -> Mat3 {
        self.world
    }
}

impl Drop for TransformGuard {
    fn drop(&mut self) {
        self.stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{transform_point, translation, Vec2};
    use approx::assert_relative_eq;

    #[test]
    fn test_nested_pushes_compose() {
        let stack = TransformStack::new();
        let outer = stack.push(&translation(Vec2::new(10.0, 0.0)));
        {
            let inner = stack.push(&translation(Vec2::new(0.0, 5.0)));
            let p = transform_point(&inner.world(), Vec2::zeros());
            assert_relative_eq!(p.x, 10.0);
            assert_relative_eq!(p.y, 5.0);
            assert_eq!(stack.depth(), 2);
        }
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.top(), outer.world());
        drop(outer);
        assert_eq!(stack.top(), Mat3::identity());
    }

    #[test]
    fn test_guard_pops_on_error_path() {
        fn failing(stack: &TransformStack) -> Result<(), String> {
            let _guard = stack.push(&translation(Vec2::new(1.0, 1.0)));
            Err("hook failed".into())
        }
        let stack = TransformStack::new();
        assert!(failing(&stack).is_err());
        assert_eq!(stack.depth(), 0);
    }
}
