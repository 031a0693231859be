use std::{any::Any, fmt::Debug};

/// Extra per-pose state carried alongside the joint transforms (ragdoll weights, IK targets,
/// ...). At most one block of each type is stored on a pose.
pub trait PoseData: PoseDataClone + Any + Debug + Send + Sync + 'static {
    /// Called when the owning pose is blended toward another pose carrying the same data type.
    #[allow(unused_variables)]
    fn blend(&mut self, other: &dyn PoseData, weight: f32) {}
}

pub trait PoseDataClone {
    fn clone_pose_data(&self) -> Box<dyn PoseData>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> PoseDataClone for T
where
    T: 'static + PoseData + Clone,
{
    fn clone_pose_data(&self) -> Box<dyn PoseData> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Clone for Box<dyn PoseData> {
    fn clone(&self) -> Self {
        self.clone_pose_data()
    }
}
