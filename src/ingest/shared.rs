//! One camera, several consumers.
//!
//! A device node can only be streamed by one open handle, so the detection
//! pipeline and the annotator grab through clones of a `SharedSource` that
//! wraps a single opened source. Grabs are serialized by the lock; each
//! consumer still fills its own `Frame`.

use std::sync::{Arc, Mutex};

use crate::frame::{Frame, FrameSource};

pub struct SharedSource<S> {
    name: String,
    inner: Arc<Mutex<S>>,
}

impl<S: FrameSource> SharedSource<S> {
    pub fn new(source: S) -> Self {
        Self {
            name: source.name().to_string(),
            inner: Arc::new(Mutex::new(source)),
        }
    }

    /// True when both handles grab from the same underlying source.
    pub fn same_source(&self, other: &SharedSource<S>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S> Clone for SharedSource<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<S: FrameSource> FrameSource for SharedSource<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn grab(&mut self, frame: &mut Frame) -> bool {
        match self.inner.lock() {
            Ok(mut source) => source.grab(frame),
            Err(_) => {
                log::warn!("{}: frame source lock poisoned", self.name);
                false
            }
        }
    }

    fn last_error(&self) -> String {
        match self.inner.lock() {
            Ok(source) => source.last_error(),
            Err(_) => "frame source lock poisoned".to_string(),
        }
    }
}
