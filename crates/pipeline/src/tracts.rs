use crate::paths;
use crate::runner::{Tool, ToolCommand};
use crate::stage::{Stage, StageStep};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, IntoEnumIterator};

/// Streamlines generated per tract variant.
pub const STREAMLINE_TARGET: u32 = 20_000;
/// Anisotropy cutoff for the tensor-based variant.
pub const TENSOR_CUTOFF: f64 = 0.01;

#[derive(thiserror::Error, Debug)]
pub enum TractError {
    #[error("Tract '{0}' declares no seed ROIs; the first seed is the masking ROI")]
    MissingSeeds(String),
}

/// The two tractography algorithm variants every tract is run with.
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Algorithm {
    /// iFOD2 sampling on the fiber-orientation-distribution field.
    Probabilistic,
    /// Tensor-based sampling on the preprocessed diffusion data.
    Tensor,
}

impl Algorithm {
    /// The image the streamline generator samples from.
    pub fn source_image(&self) -> &'static str {
        match self {
            Algorithm::Probabilistic => paths::WM_FOD,
            Algorithm::Tensor => paths::DWI_PREPROC,
        }
    }

    fn generation_args(&self) -> Vec<String> {
        match self {
            Algorithm::Probabilistic => vec!["-algorithm".into(), "iFOD2".into()],
            Algorithm::Tensor => vec![
                "-algorithm".into(),
                "Tensor_Prob".into(),
                "-cutoff".into(),
                TENSOR_CUTOFF.to_string(),
            ],
        }
    }

    /// Directory holding the variant's raw streamlines and density volumes.
    pub fn tract_dir(&self) -> String {
        format!("tracts_{self}")
    }
}

/// One tract to segment: a name, the ordered seed ROIs, and an optional
/// exclusion ROI. Seeds double as inclusion masks, so every seed region
/// must be mutually connected for a streamline to survive. The first seed
/// is the thalamic ROI; the final map is masked with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TractDefinition {
    pub name: String,
    pub seeds: Vec<String>,
    pub exclude: Option<String>,
}

impl TractDefinition {
    pub fn new<I, S>(name: impl Into<String>, seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            seeds: seeds.into_iter().map(Into::into).collect(),
            exclude: None,
        }
    }

    pub fn with_exclude(mut self, roi: impl Into<String>) -> Self {
        self.exclude = Some(roi.into());
        self
    }

    /// Final normalized connectivity map for one algorithm variant.
    pub fn final_map(&self, algorithm: Algorithm) -> String {
        format!("{}_{algorithm}.nii.gz", self.name)
    }

    /// Expand this definition into its per-variant stages.
    pub fn stages(&self) -> Result<Vec<Stage>, TractError> {
        if self.seeds.is_empty() {
            return Err(TractError::MissingSeeds(self.name.clone()));
        }
        Ok(Algorithm::iter()
            .map(|algorithm| self.variant_stage(algorithm))
            .collect())
    }

    /// One guarded sub-pipeline: generation, densification, thalamic
    /// masking, normalization. The stage's sole declared output is the
    /// final normalized map, and only the normalization step writes that
    /// path: masking goes to an intermediate, so a run that dies between
    /// the two leaves no final artifact behind and the stage re-runs on
    /// resume.
    fn variant_stage(&self, algorithm: Algorithm) -> Stage {
        let dir = algorithm.tract_dir();
        let streamlines = format!("{dir}/{}.tck", self.name);
        let density = format!("{dir}/{}.nii.gz", self.name);
        let masked = format!("{dir}/{}_masked.nii.gz", self.name);
        let final_map = self.final_map(algorithm);

        let mut generate = ToolCommand::new(Tool::Tractography)
            .arg(algorithm.source_image())
            .arg(&streamlines)
            .args(algorithm.generation_args());
        for seed in &self.seeds {
            generate = generate.arg("-seed_image").arg(paths::roi(seed));
        }
        for seed in &self.seeds {
            generate = generate.arg("-include").arg(paths::roi(seed));
        }
        if let Some(exclude) = &self.exclude {
            generate = generate.arg("-exclude").arg(paths::roi(exclude));
        }
        generate = generate
            .args(["-mask", paths::BRAIN_MASK])
            .args(["-select", &STREAMLINE_TARGET.to_string()])
            .arg("-force");

        let densify = ToolCommand::new(Tool::Densify)
            .arg(&streamlines)
            .args(["-template", paths::T1])
            .arg(&density)
            .arg("-force");

        let mask = ToolCommand::new(Tool::VoxelMath)
            .arg(&density)
            .arg("-mas")
            .arg(paths::roi(&self.seeds[0]))
            .arg(&masked);

        let mut stage = Stage::new(format!("tract_{}_{algorithm}", self.name))
            .input(algorithm.source_image())
            .input(paths::BRAIN_MASK)
            .input(paths::T1)
            .inputs(self.seeds.iter().map(|seed| paths::roi(seed)));
        if let Some(exclude) = &self.exclude {
            stage = stage.input(paths::roi(exclude));
        }
        stage
            .output(&final_map)
            .invoke(generate)
            .invoke(densify)
            .invoke(mask)
            .step(StageStep::NormalizeToMax {
                input: masked.into(),
                output: final_map.into(),
            })
    }
}

/// The reference tract set: bilateral motor, somatosensory,
/// supplementary-motor and dentato-rubro-thalamic connections. The DRT
/// crosses hemispheres at the dentate; its right-hemisphere definition
/// carries no exclusion ROI.
pub fn default_tracts() -> Vec<TractDefinition> {
    vec![
        TractDefinition::new("drt_left", ["thalamus_left", "red_nucleus_left", "dentate_right"])
            .with_exclude("dentate_left"),
        TractDefinition::new("drt_right", ["thalamus_right", "red_nucleus_right", "dentate_left"]),
        TractDefinition::new("motor_left", ["thalamus_left", "precentral_left"])
            .with_exclude("precentral_right"),
        TractDefinition::new("motor_right", ["thalamus_right", "precentral_right"])
            .with_exclude("precentral_left"),
        TractDefinition::new("somatosensory_left", ["thalamus_left", "postcentral_left"])
            .with_exclude("postcentral_right"),
        TractDefinition::new("somatosensory_right", ["thalamus_right", "postcentral_right"])
            .with_exclude("postcentral_left"),
        TractDefinition::new("sma_left", ["thalamus_left", "sma_left"])
            .with_exclude("sma_right"),
        TractDefinition::new("sma_right", ["thalamus_right", "sma_right"])
            .with_exclude("sma_left"),
    ]
}
