//! Diagnostic marker for the mapping call tree
//!
//! Each `map` call pushes a frame describing its source onto a thread-local
//! stack and pops it when the guard drops, on success or failure. Nested
//! mapper calls therefore observe a depth greater than one, which the engine
//! uses to indent its debug output.

use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    static STACK: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// RAII guard for one level of the mapping call tree
#[derive(Debug)]
#[must_use = "the scope is exited when the guard is dropped"]
pub struct MappingScope {
    // Frames belong to the thread that pushed them
    _not_send: PhantomData<*const ()>,
}

impl MappingScope {
    /// Push a frame for the object being mapped
    pub fn enter(label: impl Into<String>) -> Self {
        STACK.with(|stack| stack.borrow_mut().push(label.into()));
        Self {
            _not_send: PhantomData,
        }
    }

    /// Number of active frames on this thread
    #[must_use]
    pub fn depth() -> usize {
        STACK.with(|stack| stack.borrow().len())
    }

    /// Label of the innermost frame
    #[must_use]
    pub fn current() -> Option<String> {
        STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Indentation prefix for log lines at the current depth
    #[must_use]
    pub fn level() -> String {
        "  ".repeat(Self::depth().saturating_sub(1))
    }
}

impl Drop for MappingScope {
    fn drop(&mut self) {
        STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nesting() {
        assert_eq!(MappingScope::depth(), 0);
        {
            let _outer = MappingScope::enter("Person");
            assert_eq!(MappingScope::depth(), 1);
            assert_eq!(MappingScope::level(), "");
            {
                let _inner = MappingScope::enter("Address");
                assert_eq!(MappingScope::depth(), 2);
                assert_eq!(MappingScope::level(), "  ");
                assert_eq!(MappingScope::current().as_deref(), Some("Address"));
            }
            assert_eq!(MappingScope::current().as_deref(), Some("Person"));
        }
        assert_eq!(MappingScope::depth(), 0);
        assert!(MappingScope::current().is_none());
    }

    #[test]
    fn test_frames_are_per_thread() {
        let _scope = MappingScope::enter("main");
        let depth = std::thread::spawn(MappingScope::depth).join().unwrap();
        assert_eq!(depth, 0);
        assert_eq!(MappingScope::depth(), 1);
    }
}
