//! Output write mode for multiply-into calls

/// How a multiply writes its product into the output buffer
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// `C = op(A) op(B)`; prior contents of C are never read
    #[default]
    Overwrite,
    /// `C = op(A) op(B) + C`
    Accumulate,
    /// Leave C untouched and issue no backend work
    Skip,
}

impl WriteMode {
    /// `(alpha, beta)` for the general multiply, `None` for [`WriteMode::Skip`]
    pub const fn scalars(self) -> Option<(f64, f64)> {
        match self {
            Self::Overwrite => Some((1.0, 0.0)),
            Self::Accumulate => Some((1.0, 1.0)),
            Self::Skip => None,
        }
    }
}
