//! Include cycle detection.
//!
//! Each top-level expansion owns one [`CycleDetector`]. Entering a template
//! returns a [`FrameGuard`]; dropping the guard leaves the template again, so
//! the frame is restored on every exit path, errors included.

use crate::error::{Result, TemplateError};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

/// The chain of resolved template paths currently being expanded.
#[derive(Debug, Default)]
pub struct CycleDetector {
    frame: Vec<PathBuf>,
}

impl CycleDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `path` onto the frame, failing if it is already being expanded.
    ///
    /// The error carries the chain from the first occurrence of `path` to its
    /// repetition, e.g. `a -> b -> a`.
    pub fn enter(&mut self, path: &Path) -> Result<FrameGuard<'_>> {
        if let Some(start) = self.frame.iter().position(|p| p == path) {
            let mut chain = self.frame[start..].to_vec();
            chain.push(path.to_path_buf());
            return Err(TemplateError::CircularReference { chain });
        }

        self.frame.push(path.to_path_buf());
        Ok(FrameGuard {
            detector: self,
            path: path.to_path_buf(),
        })
    }

    /// Pop `path` from the frame. Normally called by [`FrameGuard`]'s drop.
    pub fn leave(&mut self, path: &Path) {
        match self.frame.iter().rposition(|p| p == path) {
            Some(index) => {
                if index + 1 != self.frame.len() {
                    tracing::warn!(
                        path = %path.display(),
                        "leaving a template that is not on top of the include frame"
                    );
                }
                self.frame.truncate(index);
            }
            None => {
                tracing::warn!(path = %path.display(), "leaving a template that was never entered")
            }
        }
    }

    pub fn frame(&self) -> &[PathBuf] {
        &self.frame
    }

    pub fn depth(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.frame.iter().any(|p| p == path)
    }
}

/// Scope of one entered template; leaves it on drop.
#[derive(Debug)]
pub struct FrameGuard<'a> {
    detector: &'a mut CycleDetector,
    path: PathBuf,
}

impl Deref for FrameGuard<'_> {
    type Target = CycleDetector;

    fn deref(&self) -> &CycleDetector {
        self.detector
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut CycleDetector {
        self.detector
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.detector.leave(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str) -> PathBuf {
        PathBuf::from(format!("/templates/{name}.yaml"))
    }

    #[test]
    fn test_enter_and_leave_on_drop() {
        let mut detector = CycleDetector::new();
        {
            let guard = detector.enter(&p("a")).unwrap();
            assert_eq!(guard.depth(), 1);
            assert!(guard.contains(&p("a")));
        }
        assert!(detector.is_empty());
    }

    #[test]
    fn test_nested_guards() {
        let mut detector = CycleDetector::new();
        let mut outer = detector.enter(&p("a")).unwrap();
        {
            let inner = outer.enter(&p("b")).unwrap();
            assert_eq!(inner.frame(), &[p("a"), p("b")]);
        }
        assert_eq!(outer.frame(), &[p("a")]);
        drop(outer);
        assert!(detector.is_empty());
    }

    #[test]
    fn test_circular_include_detection() {
        let mut detector = CycleDetector::new();
        let mut a = detector.enter(&p("a")).unwrap();
        let mut b = a.enter(&p("b")).unwrap();
        let chain = match b.enter(&p("a")) {
            Err(TemplateError::CircularReference { chain }) => chain,
            Err(other) => panic!("expected circular reference, got {other:?}"),
            Ok(_) => panic!("expected circular reference, got a frame"),
        };
        assert_eq!(chain, vec![p("a"), p("b"), p("a")]);
        assert_eq!(b.frame(), &[p("a"), p("b")]);
    }

    #[test]
    fn test_chain_starts_at_first_occurrence() {
        let mut detector = CycleDetector::new();
        let mut root = detector.enter(&p("root")).unwrap();
        let mut a = root.enter(&p("a")).unwrap();
        let mut b = a.enter(&p("b")).unwrap();
        let chain = match b.enter(&p("a")) {
            Err(TemplateError::CircularReference { chain }) => chain,
            Err(other) => panic!("expected circular reference, got {other:?}"),
            Ok(_) => panic!("expected circular reference, got a frame"),
        };
        assert_eq!(chain, vec![p("a"), p("b"), p("a")]);
        assert_eq!(b.depth(), 3);
    }

    #[test]
    fn test_frame_restored_after_error_in_scope() {
        fn failing(detector: &mut CycleDetector) -> Result<()> {
            let mut guard = detector.enter(&p("a"))?;
            guard.enter(&p("a"))?;
            Ok(())
        }

        let mut detector = CycleDetector::new();
        assert!(failing(&mut detector).is_err());
        assert!(detector.is_empty());
        assert!(detector.enter(&p("a")).is_ok());
    }

    #[test]
    fn test_siblings_may_repeat() {
        let mut detector = CycleDetector::new();
        let mut root = detector.enter(&p("root")).unwrap();
        drop(root.enter(&p("item")).unwrap());
        assert!(root.enter(&p("item")).is_ok());
    }

    #[test]
    fn test_manual_leave() {
        let mut detector = CycleDetector::new();
        std::mem::forget(detector.enter(&p("a")).unwrap());
        assert_eq!(detector.depth(), 1);
        detector.leave(&p("a"));
        assert!(detector.is_empty());
    }
}
