//! Option validation.
//!
//! Each group checks its own ranges with `validate() -> Result<(), String>`; the free
//! function [`validate`] adds the cross-group rules and converts failures into
//! [`NeuralAdvError::Configuration`].

use crate::error::{NeuralAdvError, Result};

use super::options::{
    AttackOptions, DataFormat, DatasetOptions, ExperimentalOptions, MeshOptions, Options,
    TextureOptions, TrainingOptions,
};

impl AttackOptions {
    /// Validate the attack options.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.task == 1 || self.task == 2) {
            return Err(format!("task must be 1 or 2, got {}", self.task));
        }
        if self.task == 2 && self.back_file.is_none() {
            return Err("task 2 requires --back_file".to_string());
        }
        if self.nc == 0 {
            return Err("nc must be positive".to_string());
        }
        if self.adv_reso == 0 {
            return Err("adv_reso must be positive".to_string());
        }
        Ok(())
    }
}

impl DatasetOptions {
    /// Validate the dataset options.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.bound <= 0.0 {
            return Err(format!("bound must be positive, got {}", self.bound));
        }
        if self.downscale == 0 {
            return Err("downscale must be positive".to_string());
        }
        if self.offset.len() != 3 {
            return Err(format!("offset needs 3 values, got {}", self.offset.len()));
        }
        if (self.enable_sparse_depth || self.enable_dense_depth)
            && self.data_format != DataFormat::Colmap
        {
            return Err("depth supervision requires --data_format colmap".to_string());
        }
        Ok(())
    }
}

impl TrainingOptions {
    /// Validate the training options.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.iters == 0 {
            return Err("iters must be positive".to_string());
        }
        if self.lr <= 0.0 {
            return Err("lr must be positive".to_string());
        }
        if self.num_rays == 0 || self.max_ray_batch == 0 {
            return Err("num_rays and max_ray_batch must be positive".to_string());
        }
        if self.max_steps == 0 {
            return Err("max_steps must be positive".to_string());
        }
        if self.grid_size < 2 {
            return Err("grid_size must be at least 2".to_string());
        }
        if self.update_extra_interval == 0 {
            return Err("update_extra_interval must be positive".to_string());
        }
        Ok(())
    }
}

impl ExperimentalOptions {
    /// Validate the experimental options against the ray budget.
    pub fn validate(&self, num_rays: usize) -> std::result::Result<(), String> {
        if self.patch_size == 0 {
            return Err("patch_size must be positive".to_string());
        }
        let patch = self.patch_size * self.patch_size;
        if self.patch_size > 1 && num_rays % patch != 0 {
            return Err(format!(
                "patch_size ** 2 ({}) must divide num_rays ({})",
                patch, num_rays
            ));
        }
        Ok(())
    }
}

impl MeshOptions {
    /// Validate the mesh options.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.mcubes_reso < 2 {
            return Err("mcubes_reso must be at least 2".to_string());
        }
        if self.decimate_target < 0.0 {
            return Err("decimate_target must not be negative".to_string());
        }
        Ok(())
    }
}

impl TextureOptions {
    /// Validate the texture options.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(r) = self
            .refine_steps_ratio
            .iter()
            .find(|r| !(0.0..=1.0).contains(*r))
        {
            return Err(format!("refine_steps_ratio values must be in [0, 1], got {}", r));
        }
        if self.ssaa == 0 || self.texture_size == 0 {
            return Err("ssaa and texture_size must be positive".to_string());
        }
        Ok(())
    }
}

/// Validate a normalized option set.
pub fn validate(options: &Options) -> Result<()> {
    options
        .attack
        .validate()
        .and_then(|_| options.dataset.validate())
        .and_then(|_| options.training.validate())
        .and_then(|_| options.experimental.validate(options.training.num_rays))
        .and_then(|_| options.mesh.validate())
        .and_then(|_| options.texture.validate())
        .map_err(NeuralAdvError::config)
}

/// Check the per-image embedding table against the training set size.
pub fn validate_dataset_len(options: &Options, len: usize) -> Result<()> {
    let ind_dim = options.experimental.ind_dim;
    let ind_num = options.experimental.ind_num;
    if ind_dim > 0 && len >= ind_num {
        return Err(NeuralAdvError::config(format!(
            "ind_num ({}) must exceed the number of training images ({})",
            ind_num, len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::options::RunOptions;

    fn base() -> Options {
        Options::new(RunOptions::new("data".to_string()))
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&base()).is_ok());
    }

    #[test]
    fn test_patch_size_must_divide_num_rays() {
        let mut options = base();
        options.experimental.patch_size = 3;
        let err = validate(&options).unwrap_err();
        assert!(matches!(err, NeuralAdvError::Configuration { .. }));

        options.experimental.patch_size = 4;
        assert!(validate(&options).is_ok());
    }

    #[test]
    fn test_task2_requires_back_file() {
        let mut options = base();
        options.attack.task = 2;
        assert!(validate(&options).is_err());
        options.attack.back_file = Some("backgrounds".to_string());
        assert!(validate(&options).is_ok());

        options.attack.task = 3;
        assert!(validate(&options).is_err());
    }

    #[test]
    fn test_depth_requires_colmap() {
        let mut options = base();
        options.dataset.enable_dense_depth = true;
        assert!(validate(&options).is_err());
        options.dataset.data_format = DataFormat::Colmap;
        assert!(validate(&options).is_ok());
    }

    #[test]
    fn test_ranges() {
        let mut options = base();
        options.training.iters = 0;
        assert!(validate(&options).is_err());

        let mut options = base();
        options.dataset.bound = 0.0;
        assert!(validate(&options).is_err());

        let mut options = base();
        options.texture.refine_steps_ratio = vec![0.5, 1.5];
        assert!(validate(&options).is_err());

        let mut options = base();
        options.dataset.offset = vec![0.0, 1.0];
        assert!(validate(&options).is_err());
    }

    #[test]
    fn test_dataset_len() {
        let mut options = base();
        assert!(validate_dataset_len(&options, 1000).is_ok());

        options.experimental.ind_dim = 4;
        options.experimental.ind_num = 100;
        assert!(validate_dataset_len(&options, 99).is_ok());
        assert!(validate_dataset_len(&options, 100).is_err());
    }
}
