//! Workspace file naming

use std::fs;
use std::path::{Path, PathBuf};

use greenaccess_core::Result;

/// Fixed artifacts of every run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    GreenspaceSupply,
    Aois,
    AlignedPopulation,
    AlignedLulc,
    GreenspaceArea,
    GreenspacePopulationRatio,
    GreenspaceBudget,
    GreenspaceSupplyDemandBudget,
    UndersuppliedPopulation,
    OversuppliedPopulation,
    ReprojectedAois,
    AoisIds,
}

impl Artifact {
    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::GreenspaceSupply => "greenspace_supply.tif",
            Artifact::Aois => "aois.geojson",
            Artifact::AlignedPopulation => "aligned_population.tif",
            Artifact::AlignedLulc => "aligned_lulc.tif",
            Artifact::GreenspaceArea => "greenspace_area.tif",
            Artifact::GreenspacePopulationRatio => "greenspace_population_ratio.tif",
            Artifact::GreenspaceBudget => "greenspace_budget.tif",
            Artifact::GreenspaceSupplyDemandBudget => "greenspace_supply_demand_budget.tif",
            Artifact::UndersuppliedPopulation => "undersupplied_population.tif",
            Artifact::OversuppliedPopulation => "oversupplied_population.tif",
            Artifact::ReprojectedAois => "reprojected_aois.geojson",
            Artifact::AoisIds => "aois_ids.tif",
        }
    }

    /// Whether the artifact is a final output rather than an intermediate
    pub fn is_output(self) -> bool {
        matches!(self, Artifact::GreenspaceSupply | Artifact::Aois)
    }
}

/// Paths of every file a run reads back or produces.
///
/// Names get the results suffix inserted before the extension.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    output_dir: PathBuf,
    intermediate_dir: PathBuf,
    suffix: String,
}

impl FileRegistry {
    pub fn new(workspace_dir: impl AsRef<Path>, suffix: impl Into<String>) -> Self {
        let workspace_dir = workspace_dir.as_ref();
        Self {
            output_dir: workspace_dir.join("output"),
            intermediate_dir: workspace_dir.join("intermediate"),
            suffix: suffix.into(),
        }
    }

    /// Create the output and intermediate directories
    pub fn create_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        fs::create_dir_all(&self.intermediate_dir)?;
        Ok(())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn intermediate_dir(&self) -> &Path {
        &self.intermediate_dir
    }

    /// Where task tokens live
    pub fn taskgraph_dir(&self) -> PathBuf {
        self.intermediate_dir.join("_taskgraph_working_dir")
    }

    pub fn get(&self, artifact: Artifact) -> PathBuf {
        let dir = if artifact.is_output() {
            &self.output_dir
        } else {
            &self.intermediate_dir
        };
        dir.join(self.with_suffix(artifact.file_name()))
    }

    /// Path of a derived artifact in the intermediate directory
    pub fn intermediate(&self, name: &str) -> PathBuf {
        self.intermediate_dir.join(self.with_suffix(name))
    }

    fn with_suffix(&self, name: &str) -> String {
        match name.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}{}.{ext}", self.suffix),
            None => format!("{name}{}", self.suffix),
        }
    }
}

/// File-name label of a radius, e.g. `100.0` or `12.5`
pub fn radius_label(radius_m: f64) -> String {
    format!("{radius_m:?}")
}
