use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SkeletonError {
    #[error("Joint {joint} ({name:?}) has parent {parent}, but parents must precede their children")]
    ParentAfterChild {
        joint: usize,
        name: String,
        parent: usize,
    },
    #[error("Joint name {0:?} is used more than once")]
    DuplicateJointName(String),
    #[error("The bind pose has {got} transforms but the skeleton has {expected} joints")]
    BindPoseSizeMismatch { expected: usize, got: usize },
}
