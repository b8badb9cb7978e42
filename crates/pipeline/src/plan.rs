//! The reference stage sequence: parcellation resampling, tissue
//! segmentation, ROI extraction, spatial transforms, and the per-tract
//! expansions. Stage ordering is a data structure, not textual position;
//! the driver executes the returned list front to back.

use crate::paths;
use crate::runner::{Tool, ToolCommand};
use crate::stage::Stage;
use crate::tracts::{TractDefinition, TractError};

/// Parcellation labels extracted into binary masks, FreeSurfer numbering.
/// The supplementary-motor ROIs reuse the superior-frontal labels.
pub const ROI_LABELS: &[(&str, u32)] = &[
    ("thalamus_left", 10),
    ("thalamus_right", 49),
    ("precentral_left", 1024),
    ("precentral_right", 2024),
    ("postcentral_left", 1022),
    ("postcentral_right", 2022),
    ("sma_left", 1028),
    ("sma_right", 2028),
];

/// ROIs defined in atlas space and warped into the subject, because the
/// parcellation does not cover the cerebellar and midbrain nuclei.
pub const ATLAS_ROIS: &[&str] = &[
    "dentate_left",
    "dentate_right",
    "red_nucleus_left",
    "red_nucleus_right",
];

/// Build the full reference sequence for one subject: five fixed stages
/// followed by two variant stages per tract definition.
pub fn reference_stages(tracts: &[TractDefinition]) -> Result<Vec<Stage>, TractError> {
    let mut stages = vec![
        resample_parcellation(),
        tissue_segmentation(),
        roi_extraction(),
        standard_space_transforms(),
        atlas_roi_transforms(),
    ];
    for tract in tracts {
        stages.extend(tract.stages()?);
    }
    Ok(stages)
}

/// Stage 1: resample the parcellation volume onto the native diffusion
/// grid, nearest-neighbour so label values survive.
fn resample_parcellation() -> Stage {
    Stage::new("resample_parcellation")
        .input(paths::PARCELLATION)
        .input(paths::MEAN_B0)
        .output(paths::PARCELLATION_NATIVE)
        .invoke(
            ToolCommand::new(Tool::GridResample)
                .arg(paths::PARCELLATION)
                .arg("regrid")
                .args(["-template", paths::MEAN_B0])
                .args(["-interp", "nearest"])
                .arg(paths::PARCELLATION_NATIVE)
                .arg("-force"),
        )
}

/// Stage 2: five-tissue-type segmentation and the derived gray/white
/// interface. Two outputs, both gating the resume predicate.
fn tissue_segmentation() -> Stage {
    Stage::new("tissue_segmentation")
        .input(paths::T1)
        .output(paths::FIVE_TT)
        .output(paths::GMWMI)
        .invoke(
            ToolCommand::new(Tool::TissueSegment)
                .arg("fsl")
                .arg(paths::T1)
                .arg(paths::FIVE_TT)
                .arg("-nocrop")
                .arg("-force"),
        )
        .invoke(
            ToolCommand::new(Tool::InterfaceExtract)
                .arg(paths::FIVE_TT)
                .arg(paths::GMWMI)
                .arg("-force"),
        )
}

/// Stage 3: binary masks for every parcellation-derived ROI, one
/// threshold-and-binarize invocation per label.
fn roi_extraction() -> Stage {
    let mut stage = Stage::new("roi_extraction").input(paths::PARCELLATION_NATIVE);
    for (id, label) in ROI_LABELS {
        let label = label.to_string();
        stage = stage.output(paths::roi(id)).invoke(
            ToolCommand::new(Tool::VoxelMath)
                .arg(paths::PARCELLATION_NATIVE)
                .args(["-thr", &label, "-uthr", &label, "-bin"])
                .arg(paths::roi(id)),
        );
    }
    stage
}

/// Stage 4: the two structural-to-standard transform applications. The
/// warp and affine are produced by a separately run registration pipeline;
/// declaring them as inputs turns their absence into a pipeline error
/// instead of a raw tool diagnostic.
fn standard_space_transforms() -> Stage {
    Stage::new("standard_space_transforms")
        .inputs([
            paths::T1,
            paths::BRAIN_MASK,
            paths::MNI_TEMPLATE,
            paths::T1_TO_MNI_WARP,
            paths::T1_TO_MNI_AFFINE,
        ])
        .output(paths::T1_MNI)
        .output(paths::BRAIN_MASK_MNI)
        .invoke(apply_transform(
            paths::T1,
            paths::MNI_TEMPLATE,
            &[paths::T1_TO_MNI_WARP, paths::T1_TO_MNI_AFFINE],
            paths::T1_MNI,
            "Linear",
        ))
        .invoke(apply_transform(
            paths::BRAIN_MASK,
            paths::MNI_TEMPLATE,
            &[paths::T1_TO_MNI_WARP, paths::T1_TO_MNI_AFFINE],
            paths::BRAIN_MASK_MNI,
            "NearestNeighbor",
        ))
}

/// Stage 5: atlas-space ROIs warped into the subject's structural space.
fn atlas_roi_transforms() -> Stage {
    let mut stage = Stage::new("atlas_roi_transforms")
        .input(paths::T1)
        .input(paths::MNI_TO_T1_WARP)
        .inputs(ATLAS_ROIS.iter().map(|id| paths::atlas_roi(id)));
    for id in ATLAS_ROIS {
        stage = stage.output(paths::roi(id)).invoke(apply_transform(
            &paths::atlas_roi(id),
            paths::T1,
            &[paths::MNI_TO_T1_WARP],
            &paths::roi(id),
            "NearestNeighbor",
        ));
    }
    stage
}

fn apply_transform(
    input: &str,
    reference: &str,
    transforms: &[&str],
    output: &str,
    interpolation: &str,
) -> ToolCommand {
    let mut command = ToolCommand::new(Tool::ApplyTransform)
        .args(["-d", "3"])
        .args(["-i", input])
        .args(["-r", reference]);
    for transform in transforms {
        command = command.args(["-t", transform]);
    }
    command
        .args(["-o", output])
        .args(["-n", interpolation])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracts::default_tracts;

    #[test]
    fn test_reference_sequence_shape() {
        let stages = reference_stages(&default_tracts()).unwrap();
        // Five fixed stages plus eight definitions times two variants.
        assert_eq!(stages.len(), 21);
        assert_eq!(stages[0].name(), "resample_parcellation");
        assert_eq!(stages[4].name(), "atlas_roi_transforms");
        assert!(stages[5].name().starts_with("tract_"));
    }

    #[test]
    fn test_roi_extraction_declares_every_mask() {
        let stage = roi_extraction();
        assert_eq!(stage.declared_outputs().len(), ROI_LABELS.len());
        assert!(stage
            .declared_outputs()
            .iter()
            .any(|p| p.to_str() == Some("roi/thalamus_right.nii.gz")));
    }

    #[test]
    fn test_atlas_rois_land_in_roi_namespace() {
        let stage = atlas_roi_transforms();
        assert_eq!(stage.declared_outputs().len(), ATLAS_ROIS.len());
        assert!(stage
            .declared_outputs()
            .iter()
            .all(|p| p.starts_with("roi")));
    }
}
