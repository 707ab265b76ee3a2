//! # GreenAccess Model
//!
//! Urban greenspace accessibility with the two-step floating catchment area
//! method. Greenspace supply per pixel is compared with a per-capita demand
//! and summarized per administrative unit.
//!
//! Search radii can be set three ways (see [`SearchRadiusMode`]): one radius
//! for everything, one per greenspace land-cover class, or one per population
//! group.
//!
//! ```no_run
//! use greenaccess_model::{run, ModelArgs};
//!
//! let args = ModelArgs::from_json_file("args.json")?;
//! let outcome = run(&args)?;
//! println!("supply written to {}", outcome.supply.display());
//! # Ok::<(), greenaccess_core::Error>(())
//! ```

pub mod aggregate;
pub mod aoi;
pub mod config;
pub mod pipeline;
pub mod radii;
pub mod registry;
pub mod steps;

pub use aoi::{AdminUnits, PopGroup};
pub use config::{ModelArgs, SearchRadiusMode, ValidatedArgs};
pub use pipeline::{build_graph, ResolvedModel, RunOutcome};
pub use radii::{LulcTable, SearchRadii};
pub use registry::{Artifact, FileRegistry};

use greenaccess_core::Result;

/// Run the model with `args`, skipping tasks whose outputs are up to date.
pub fn run(args: &ModelArgs) -> Result<RunOutcome> {
    pipeline::execute(args)
}
