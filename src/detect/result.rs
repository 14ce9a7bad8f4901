use crate::geometry::Contour;

/// Candidate regions produced by one pipeline invocation, in pipeline order.
///
/// Lives for a single cycle; the loop never keeps it past the cycle that produced it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetectionResult {
    pub candidates: Vec<Contour>,
}

impl DetectionResult {
    pub fn new(candidates: Vec<Contour>) -> Self {
        Self { candidates }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// First candidate in pipeline order. No scoring is applied.
    pub fn first(&self) -> Option<&Contour> {
        self.candidates.first()
    }
}

impl From<Vec<Contour>> for DetectionResult {
    fn from(candidates: Vec<Contour>) -> Self {
        Self::new(candidates)
    }
}
