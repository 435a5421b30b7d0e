use crate::renderer::AffineTransform;

use super::MeshError;

/// Bone hierarchy of a skinned mesh.
///
/// Bones are stored parents-first. Only the bones listed in
/// `shader_bone_indices` influence vertices; they are uploaded in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    bone_names: Vec<String>,
    bone_parents: Vec<Option<usize>>,
    bone_transform_inverses: Vec<AffineTransform>,
    shader_bone_indices: Vec<usize>,
}

impl Skeleton {
    pub fn new(
        bone_names: Vec<String>,
        bone_parents: Vec<Option<usize>>,
        bone_transform_inverses: Vec<AffineTransform>,
        shader_bone_indices: Vec<usize>,
    ) -> Result<Self, MeshError> {
        let num_bones = bone_names.len();
        if bone_parents.len() != num_bones || bone_transform_inverses.len() != num_bones {
            return Err(MeshError::InvalidSkeleton(format!(
                "{} names, {} parents, {} inverse transforms",
                num_bones,
                bone_parents.len(),
                bone_transform_inverses.len()
            )));
        }
        for (bone, parent) in bone_parents.iter().enumerate() {
            if let Some(parent) = *parent {
                if parent >= bone {
                    return Err(MeshError::InvalidSkeleton(format!(
                        "bone {} has parent {} which does not precede it",
                        bone, parent
                    )));
                }
            }
        }
        if let Some(&bad) = shader_bone_indices.iter().find(|&&i| i >= num_bones) {
            return Err(MeshError::InvalidSkeleton(format!(
                "shader bone index {} out of range",
                bad
            )));
        }

        Ok(Self {
            bone_names,
            bone_parents,
            bone_transform_inverses,
            shader_bone_indices,
        })
    }

    pub fn num_bones(&self) -> usize {
        self.bone_names.len()
    }

    pub fn num_shader_bones(&self) -> usize {
        self.shader_bone_indices.len()
    }

    pub fn bone_names(&self) -> &[String] {
        &self.bone_names
    }

    pub fn bone_parents(&self) -> &[Option<usize>] {
        &self.bone_parents
    }

    pub fn bone_transform_inverses(&self) -> &[AffineTransform] {
        &self.bone_transform_inverses
    }

    pub fn shader_bone_indices(&self) -> &[usize] {
        &self.shader_bone_indices
    }

    /// Composes local bone transforms down the hierarchy into model space.
    pub fn global_transforms(&self, local: &[AffineTransform]) -> Vec<AffineTransform> {
        let mut global: Vec<AffineTransform> = Vec::with_capacity(local.len());
        for (bone, transform) in local.iter().enumerate() {
            let parent = self.bone_parents.get(bone).copied().flatten();
            global.push(match parent {
                Some(parent) => global[parent] * *transform,
                None => *transform,
            });
        }
        global
    }

    /// Skinning transforms for the shader: each influencing bone's model
    /// space transform times its inverse bind pose, in shader order.
    /// `bone_transforms` holds one transform per bone.
    pub fn gather_shader_transforms(
        &self,
        bone_transforms: &[AffineTransform],
    ) -> Result<Vec<AffineTransform>, MeshError> {
        if bone_transforms.len() != self.num_bones() {
            return Err(MeshError::InvalidSkeleton(format!(
                "{} bone transforms for {} bones",
                bone_transforms.len(),
                self.num_bones()
            )));
        }
        Ok(self
            .shader_bone_indices
            .iter()
            .map(|&bone| bone_transforms[bone] * self.bone_transform_inverses[bone])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};

    fn translation(x: f32, y: f32, z: f32) -> AffineTransform {
        AffineTransform::from_mat4(&Mat4::from_translation(Vec3::new(x, y, z)))
    }

    fn two_bone_skeleton() -> Skeleton {
        Skeleton::new(
            vec!["root".to_string(), "arm".to_string()],
            vec![None, Some(0)],
            vec![translation(0.0, -1.0, 0.0), translation(0.0, -2.0, 0.0)],
            vec![1],
        )
        .unwrap()
    }

    #[test]
    fn test_global_transforms_follow_parents() {
        let skeleton = two_bone_skeleton();
        let global =
            skeleton.global_transforms(&[translation(0.0, 1.0, 0.0), translation(0.0, 1.0, 0.0)]);
        assert_eq!(global[1].translation(), Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_gather_uses_shader_order_and_inverses() {
        let skeleton = two_bone_skeleton();
        let gathered = skeleton
            .gather_shader_transforms(&[translation(0.0, 1.0, 0.0), translation(0.0, 2.0, 0.0)])
            .unwrap();
        assert_eq!(gathered.len(), 1);
        // Bind pose composed with its inverse is identity.
        assert_eq!(gathered[0].translation(), Vec3::ZERO);
    }

    #[test]
    fn test_gather_rejects_wrong_transform_count() {
        let skeleton = two_bone_skeleton();
        let result = skeleton.gather_shader_transforms(&[translation(0.0, 1.0, 0.0)]);
        assert_eq!(
            result,
            Err(MeshError::InvalidSkeleton(
                "1 bone transforms for 2 bones".to_string()
            ))
        );
    }

    #[test]
    fn test_invalid_skeletons() {
        assert!(Skeleton::new(vec!["a".to_string()], vec![], vec![], vec![]).is_err());
        assert!(Skeleton::new(
            vec!["a".to_string()],
            vec![Some(0)],
            vec![AffineTransform::IDENTITY],
            vec![]
        )
        .is_err());
        assert!(Skeleton::new(
            vec!["a".to_string()],
            vec![None],
            vec![AffineTransform::IDENTITY],
            vec![3]
        )
        .is_err());
    }
}
