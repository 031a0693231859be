use std::fmt::Debug;

use bevy::{platform::collections::HashMap, reflect::Reflect};
use serde::{Deserialize, Serialize};

use crate::errors::SkeletonError;

/// Serialized description of a single joint.
#[derive(Reflect, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    pub parent: Option<usize>,
}

impl Joint {
    pub fn new(name: impl Into<String>, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            parent,
        }
    }
}

/// Joint hierarchy of an actor.
///
/// Joints are stored in an order where every parent precedes its children, so iterating by
/// index visits the hierarchy top-down. This is validated on construction.
#[derive(Reflect, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Joint>", into = "Vec<Joint>")]
pub struct Skeleton {
    joints: Vec<Joint>,
    children: Vec<Vec<usize>>,
    name_to_index: HashMap<String, usize>,
}

impl Skeleton {
    pub fn new(joints: Vec<Joint>) -> Result<Self, SkeletonError> {
        let mut children = vec![Vec::new(); joints.len()];
        let mut name_to_index = HashMap::default();

        for (index, joint) in joints.iter().enumerate() {
            if let Some(parent) = joint.parent {
                if parent >= index {
                    return Err(SkeletonError::ParentAfterChild {
                        joint: index,
                        name: joint.name.clone(),
                        parent,
                    });
                }
                children[parent].push(index);
            }

            if name_to_index.insert(joint.name.clone(), index).is_some() {
                return Err(SkeletonError::DuplicateJointName(joint.name.clone()));
            }
        }

        Ok(Self {
            joints,
            children,
            name_to_index,
        })
    }

    /// Builds a single chain `joint_0 -> joint_1 -> ...`.
    pub fn chain(num_joints: usize) -> Self {
        let joints = (0..num_joints)
            .map(|i| Joint::new(format!("joint_{i}"), i.checked_sub(1)))
            .collect();
        // A chain always satisfies the ordering invariant.
        Self::new(joints).unwrap_or_default()
    }

    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    pub fn joint(&self, index: usize) -> &Joint {
        &self.joints[index]
    }

    pub fn joint_name(&self, index: usize) -> &str {
        &self.joints[index].name
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.joints[index].parent
    }

    pub fn children(&self, index: usize) -> &[usize] {
        &self.children[index]
    }

    pub fn find_joint_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn root_joints(&self) -> impl Iterator<Item = usize> + '_ {
        self.joints
            .iter()
            .enumerate()
            .filter(|(_, joint)| joint.parent.is_none())
            .map(|(index, _)| index)
    }

    /// Whether `joint` lies strictly below `ancestor` in the hierarchy.
    pub fn is_descendant_of(&self, joint: usize, ancestor: usize) -> bool {
        let mut current = self.parent(joint);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Calls `f` for `joint` and every joint below it, parents first.
    pub fn for_each_in_subtree(&self, joint: usize, mut f: impl FnMut(usize)) {
        let mut stack = vec![joint];
        while let Some(current) = stack.pop() {
            f(current);
            stack.extend(self.children[current].iter().rev().copied());
        }
    }

    fn indent(f: &mut std::fmt::Formatter<'_>, level: u32) -> std::fmt::Result {
        if level == 0 {
            return Ok(());
        }
        for _ in 0..(level - 1) {
            write!(f, "┃ ")?;
        }
        write!(f, "┣━")?;
        Ok(())
    }

    fn fmt_level(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        level: u32,
        joint: usize,
    ) -> std::fmt::Result {
        Self::indent(f, level)?;
        writeln!(f, "🦴 {:?} [{}]", self.joints[joint].name, joint)?;
        for child in self.children[joint].iter() {
            self.fmt_level(f, level + 1, *child)?;
        }
        Ok(())
    }
}

impl Debug for Skeleton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Skeleton hierarchy:")?;
        for root in self.root_joints() {
            self.fmt_level(f, 0, root)?;
        }
        Ok(())
    }
}

impl TryFrom<Vec<Joint>> for Skeleton {
    type Error = SkeletonError;

    fn try_from(value: Vec<Joint>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Skeleton> for Vec<Joint> {
    fn from(value: Skeleton) -> Self {
        value.joints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Skeleton {
        // root
        // ├─ spine
        // │  └─ head
        // └─ hip
        Skeleton::new(vec![
            Joint::new("root", None),
            Joint::new("spine", Some(0)),
            Joint::new("head", Some(1)),
            Joint::new("hip", Some(0)),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_parent_after_child() {
        let result = Skeleton::new(vec![Joint::new("a", Some(1)), Joint::new("b", None)]);
        assert!(matches!(
            result,
            Err(SkeletonError::ParentAfterChild { joint: 0, .. })
        ));
    }

    #[test]
    fn rejects_duplicate_names() {
        let result = Skeleton::new(vec![Joint::new("a", None), Joint::new("a", Some(0))]);
        assert_eq!(
            result.err(),
            Some(SkeletonError::DuplicateJointName("a".into()))
        );
    }

    #[test]
    fn hierarchy_queries() {
        let skeleton = tree();
        assert_eq!(skeleton.num_joints(), 4);
        assert_eq!(skeleton.children(0), &[1, 3]);
        assert_eq!(skeleton.find_joint_by_name("head"), Some(2));
        assert!(skeleton.is_descendant_of(2, 0));
        assert!(!skeleton.is_descendant_of(3, 1));

        let mut subtree = Vec::new();
        skeleton.for_each_in_subtree(1, |j| subtree.push(j));
        assert_eq!(subtree, vec![1, 2]);
    }

    #[test]
    fn ron_roundtrip_keeps_topology() {
        let serialized = ron::to_string(&tree()).unwrap();
        let skeleton: Skeleton = ron::de::from_str(&serialized).unwrap();
        assert_eq!(skeleton.parent(2), Some(1));
        assert_eq!(skeleton.find_joint_by_name("hip"), Some(3));
    }
}
