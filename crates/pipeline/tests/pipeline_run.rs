use pipeline::plan::reference_stages;
use pipeline::runner::{Tool, ToolCommand, ToolError, ToolOutput, ToolRunner};
use pipeline::stage::{Stage, StageError};
use pipeline::tracts::{default_tracts, TractDefinition};
use pipeline::{Pipeline, PipelineError};
use std::cell::RefCell;
use std::path::Path;
use tract_kit_common::{ArtifactStore, Subject};

/// Fake process boundary: records every invocation, optionally fails on a
/// chosen tool, and stands in for the external tools' writes by touching
/// any image/streamline argument that does not exist yet.
struct RecordingRunner {
    calls: RefCell<Vec<ToolCommand>>,
    fail_on: Option<Tool>,
    range_output: String,
}

impl RecordingRunner {
    fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            fail_on: None,
            range_output: "0.000000 87.000000".to_string(),
        }
    }

    fn failing_on(tool: Tool) -> Self {
        Self {
            fail_on: Some(tool),
            ..Self::new()
        }
    }

    fn calls(&self) -> Vec<ToolCommand> {
        self.calls.borrow().clone()
    }

    fn invoked(&self, tool: Tool) -> bool {
        self.calls.borrow().iter().any(|c| c.tool == tool)
    }
}

impl ToolRunner for RecordingRunner {
    fn invoke(&self, command: &ToolCommand, working_dir: &Path) -> Result<ToolOutput, ToolError> {
        self.calls.borrow_mut().push(command.clone());

        if self.fail_on == Some(command.tool) {
            return Err(ToolError::Failed {
                tool: command.tool.executable(),
                code: 1,
                stderr: "injected failure".to_string(),
            });
        }

        if command.tool == Tool::VolumeStats {
            return Ok(ToolOutput {
                stdout: self.range_output.clone(),
                stderr: String::new(),
            });
        }

        for arg in &command.args {
            if (arg.ends_with(".nii.gz") || arg.ends_with(".tck"))
                && !working_dir.join(arg).exists()
            {
                let path = working_dir.join(arg);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                std::fs::write(path, b"").unwrap();
            }
        }
        Ok(ToolOutput::default())
    }
}

fn scratch_store(tmp: &tempfile::TempDir) -> ArtifactStore {
    let subject = Subject::new("pat001").unwrap();
    ArtifactStore::new(tmp.path(), &subject)
}

fn seed(store: &ArtifactStore, relative: &str) {
    let path = store.path_of(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"seed").unwrap();
}

/// The externally produced collaborator inputs a fresh run expects.
fn seed_external_inputs(store: &ArtifactStore) {
    for relative in [
        "t1.nii.gz",
        "aparc_aseg.nii.gz",
        "mean_b0.nii.gz",
        "dwi_preproc.nii.gz",
        "brain_mask.nii.gz",
        "wmfod.nii.gz",
        "xfm/t1_to_mni_warp.nii.gz",
        "xfm/t1_to_mni_affine.mat",
        "xfm/mni_to_t1_warp.nii.gz",
        "standard/mni152_t1.nii.gz",
        "atlas/dentate_left_mni.nii.gz",
        "atlas/dentate_right_mni.nii.gz",
        "atlas/red_nucleus_left_mni.nii.gz",
        "atlas/red_nucleus_right_mni.nii.gz",
    ] {
        seed(store, relative);
    }
}

#[test]
fn fresh_run_produces_sixteen_final_maps() {
    let tmp = tempfile::tempdir().unwrap();
    let store = scratch_store(&tmp);
    seed_external_inputs(&store);

    let tracts = default_tracts();
    let stages = reference_stages(&tracts).unwrap();
    let pipeline = Pipeline::new(RecordingRunner::new(), store);
    let summary = pipeline.run(&stages).unwrap();

    assert_eq!(summary.completed, 21);
    assert_eq!(summary.skipped, 0);

    let mut finals = 0;
    for tract in &tracts {
        for algorithm in ["probabilistic", "tensor"] {
            let name = format!("{}_{algorithm}.nii.gz", tract.name);
            assert!(pipeline.store().exists(&name), "missing {name}");
            assert!(pipeline
                .store()
                .exists(format!("tracts_{algorithm}/{}.tck", tract.name)));
            finals += 1;
        }
    }
    assert_eq!(finals, 16);
}

#[test]
fn done_stage_runs_zero_invocations() {
    let tmp = tempfile::tempdir().unwrap();
    let store = scratch_store(&tmp);
    seed(&store, "parc_native.nii.gz");

    let stage = Stage::new("resample_parcellation")
        .input("aparc_aseg.nii.gz")
        .output("parc_native.nii.gz")
        .invoke(ToolCommand::new(Tool::GridResample).arg("aparc_aseg.nii.gz"));

    let pipeline = Pipeline::new(RecordingRunner::new(), store);
    let summary = pipeline.run(std::slice::from_ref(&stage)).unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.completed, 0);
    assert!(pipeline.runner().calls().is_empty());
    // The pre-existing artifact is untouched.
    assert_eq!(
        std::fs::read(pipeline.store().path_of("parc_native.nii.gz")).unwrap(),
        b"seed"
    );
}

#[test]
fn fail_fast_halts_the_sequence() {
    let tmp = tempfile::tempdir().unwrap();
    let store = scratch_store(&tmp);
    seed(&store, "aparc_aseg.nii.gz");

    let failing = Stage::new("resample_parcellation")
        .input("aparc_aseg.nii.gz")
        .output("parc_native.nii.gz")
        .invoke(ToolCommand::new(Tool::GridResample).arg("aparc_aseg.nii.gz"));
    let downstream = Stage::new("roi_extraction")
        .output("roi/thalamus_left.nii.gz")
        .invoke(ToolCommand::new(Tool::VoxelMath).arg("roi/thalamus_left.nii.gz"));

    let pipeline = Pipeline::new(RecordingRunner::failing_on(Tool::GridResample), store);
    let err = pipeline.run(&[failing, downstream]).unwrap_err();

    match err {
        PipelineError::Stage { stage, source } => {
            assert_eq!(stage, "resample_parcellation");
            assert!(matches!(source, StageError::Tool(ToolError::Failed { code: 1, .. })));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!pipeline.runner().invoked(Tool::VoxelMath));
    assert_eq!(pipeline.runner().calls().len(), 1);
}

#[test]
fn partial_resume_skips_finished_tissue_segmentation() {
    let tmp = tempfile::tempdir().unwrap();
    let store = scratch_store(&tmp);
    seed_external_inputs(&store);
    seed(&store, "5tt/5tt.nii.gz");
    seed(&store, "5tt/gmwmi.nii.gz");

    let stages = reference_stages(&default_tracts()).unwrap();
    let pipeline = Pipeline::new(RecordingRunner::new(), store);
    let summary = pipeline.run(&stages).unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.completed, 20);
    assert!(!pipeline.runner().invoked(Tool::TissueSegment));
    assert!(!pipeline.runner().invoked(Tool::InterfaceExtract));
    // Downstream stages still ran.
    assert!(pipeline.runner().invoked(Tool::Tractography));
}

#[test]
fn crash_during_normalization_reruns_the_stage_on_resume() {
    let tmp = tempfile::tempdir().unwrap();
    let store = scratch_store(&tmp);
    seed_external_inputs(&store);
    for roi in ["thalamus_left", "red_nucleus_left", "dentate_right"] {
        seed(&store, &format!("roi/{roi}.nii.gz"));
    }

    let tract =
        TractDefinition::new("drt_left", ["thalamus_left", "red_nucleus_left", "dentate_right"]);
    let stage = tract.stages().unwrap().remove(0);

    // First attempt dies at the statistics read inside the normalization
    // step, after masking has already run.
    let pipeline = Pipeline::new(RecordingRunner::failing_on(Tool::VolumeStats), store.clone());
    let err = pipeline.run(std::slice::from_ref(&stage)).unwrap_err();
    assert!(matches!(err, PipelineError::Stage { .. }));
    assert!(pipeline
        .store()
        .exists("tracts_probabilistic/drt_left_masked.nii.gz"));
    // The guard artifact never appeared, so the stage is not mistaken for
    // finished.
    assert!(!pipeline.store().exists("drt_left_probabilistic.nii.gz"));

    // Resume with a healthy runner: the stage re-runs and produces the
    // normalized map.
    let pipeline = Pipeline::new(RecordingRunner::new(), store);
    let summary = pipeline.run(std::slice::from_ref(&stage)).unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.skipped, 0);
    assert!(pipeline.runner().invoked(Tool::VolumeStats));
    assert!(pipeline.store().exists("drt_left_probabilistic.nii.gz"));
}

#[test]
fn missing_upstream_artifact_is_a_structured_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let store = scratch_store(&tmp);

    let stage = Stage::new("standard_space_transforms")
        .input("xfm/t1_to_mni_warp.nii.gz")
        .output("standard/t1_mni.nii.gz")
        .invoke(ToolCommand::new(Tool::ApplyTransform));

    let pipeline = Pipeline::new(RecordingRunner::new(), store);
    let err = pipeline.run(std::slice::from_ref(&stage)).unwrap_err();

    match err {
        PipelineError::Stage { stage, source } => {
            assert_eq!(stage, "standard_space_transforms");
            match source {
                StageError::MissingInput(path) => {
                    assert!(path.contains("t1_to_mni_warp"));
                }
                other => panic!("unexpected stage error: {other}"),
            }
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(pipeline.runner().calls().is_empty());
}

#[test]
fn stage_reports_outputs_its_body_failed_to_produce() {
    let tmp = tempfile::tempdir().unwrap();
    let store = scratch_store(&tmp);
    seed(&store, "density.nii.gz");

    // The volume-statistics tool writes nothing, so the declared output
    // never appears.
    let stage = Stage::new("broken")
        .input("density.nii.gz")
        .output("normalized.nii.gz")
        .invoke(ToolCommand::new(Tool::VolumeStats).arg("density.nii.gz").arg("-R"));

    let pipeline = Pipeline::new(RecordingRunner::new(), store);
    let err = pipeline.run(std::slice::from_ref(&stage)).unwrap_err();
    match err {
        PipelineError::Stage { source: StageError::MissingOutput(path), .. } => {
            assert!(path.contains("normalized"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
