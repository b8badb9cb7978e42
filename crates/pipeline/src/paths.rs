//! Relative artifact paths under the per-subject working root. Artifact
//! addressing is deterministic: these names never carry timestamps or
//! random components.

/// Structural reference image, also the densification grid.
pub const T1: &str = "t1.nii.gz";
/// FreeSurfer-style parcellation volume, as delivered.
pub const PARCELLATION: &str = "aparc_aseg.nii.gz";
/// Parcellation resampled onto the native diffusion grid.
pub const PARCELLATION_NATIVE: &str = "parc_native.nii.gz";
/// Mean b=0 volume defining the native diffusion grid.
pub const MEAN_B0: &str = "mean_b0.nii.gz";
/// Preprocessed diffusion series, the tensor-variant source.
pub const DWI_PREPROC: &str = "dwi_preproc.nii.gz";
/// Whole-brain diffusion mask bounding streamline propagation.
pub const BRAIN_MASK: &str = "brain_mask.nii.gz";
/// Fiber-orientation-distribution field, the probabilistic-variant source.
pub const WM_FOD: &str = "wmfod.nii.gz";

pub const FIVE_TT: &str = "5tt/5tt.nii.gz";
pub const GMWMI: &str = "5tt/gmwmi.nii.gz";

/// Registration outputs of the externally run structural pipeline.
pub const T1_TO_MNI_WARP: &str = "xfm/t1_to_mni_warp.nii.gz";
pub const T1_TO_MNI_AFFINE: &str = "xfm/t1_to_mni_affine.mat";
pub const MNI_TO_T1_WARP: &str = "xfm/mni_to_t1_warp.nii.gz";

pub const MNI_TEMPLATE: &str = "standard/mni152_t1.nii.gz";
pub const T1_MNI: &str = "standard/t1_mni.nii.gz";
pub const BRAIN_MASK_MNI: &str = "standard/brain_mask_mni.nii.gz";

/// Binary anatomical mask for a ROI identifier.
pub fn roi(id: &str) -> String {
    format!("roi/{id}.nii.gz")
}

/// Atlas-space source mask for a ROI warped into subject space.
pub fn atlas_roi(id: &str) -> String {
    format!("atlas/{id}_mni.nii.gz")
}

/// Subdirectories a run writes into, created up front because the external
/// tools refuse to write into missing directories.
pub const LAYOUT: &[&str] = &[
    "roi",
    "5tt",
    "standard",
    "tracts_probabilistic",
    "tracts_tensor",
];
