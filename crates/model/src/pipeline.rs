//! Model orchestration
//!
//! A run is built in two phases. [`ResolvedModel::resolve`] does every read
//! needed to decide the shape of the graph: argument validation, land-cover
//! metadata, administrative units and the radius tables. [`build_graph`] then
//! declares every task up front; nothing is read while the graph is built.

use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::info;

use greenaccess_algorithms::access::SupplyFilter;
use greenaccess_algorithms::kernel::DecayFunction;
use greenaccess_algorithms::resample::{square_off_pixels, GridSpec};
use greenaccess_core::io::read_geotiff;
use greenaccess_core::{Error, Result};
use greenaccess_parallel::{Task, TaskGraph, TaskId, TaskReport};

use crate::aggregate::{self, GroupLayers, Summary, TotalLayers};
use crate::aoi::{AdminUnits, PopGroup};
use crate::config::{ModelArgs, SearchRadiusMode, ValidatedArgs};
use crate::radii::{LulcTable, SearchRadii};
use crate::registry::{radius_label, Artifact, FileRegistry};
use crate::steps::{self, LulcRaster};

/// User-supplied files a run reads
#[derive(Debug, Clone)]
struct Sources {
    lulc: PathBuf,
    lulc_table: PathBuf,
    population: PathBuf,
}

/// Everything decided before the task graph is built
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub args: ValidatedArgs,
    pub registry: FileRegistry,
    pub radii: SearchRadii,
    /// Square working pixel size
    pub pixel_size: (f64, f64),
    /// Grid every aligned raster sits on
    pub grid: GridSpec,
    pub units: AdminUnits,
    /// `{lucode -> is greenspace}`
    pub greenspace: HashMap<i64, bool>,
    pub aggregate_by_pop_group: bool,
    sources: Sources,
}

impl ResolvedModel {
    /// Validate arguments and read what the graph shape depends on.
    ///
    /// Creates the workspace directories and writes the identified unit
    /// layer to `intermediate/reprojected_aois.geojson`.
    pub fn resolve(args: &ModelArgs) -> Result<Self> {
        let validated = args.validate()?;
        let registry = FileRegistry::new(&args.workspace_dir, validated.suffix.clone());
        registry.create_dirs()?;

        let lulc: LulcRaster = read_geotiff(&args.lulc_raster_path)?;
        if let Some(crs) = lulc.crs() {
            crs.linear_units()?;
        }
        let pixel_size = square_off_pixels(lulc.pixel_size());
        let grid = GridSpec::of(&lulc).with_pixel_size(pixel_size);
        let (rows, cols) = grid.shape();
        info!(
            "working grid: {}x{} pixels of {:.3} m",
            rows,
            cols,
            pixel_size.0.abs()
        );

        let units = AdminUnits::prepare(&args.aoi_vector_path, lulc.crs())?;
        units.write(&registry.get(Artifact::ReprojectedAois))?;

        let table = LulcTable::load(&args.lulc_attribute_table)?;
        let radii = SearchRadii::resolve(&validated, &table, &units)?;

        let model = Self {
            registry,
            radii,
            pixel_size,
            grid,
            greenspace: table.greenspace_flags(),
            aggregate_by_pop_group: args.aggregate_by_pop_group,
            sources: Sources {
                lulc: args.lulc_raster_path.clone(),
                lulc_table: args.lulc_attribute_table.clone(),
                population: args.population_raster_path.clone(),
            },
            units,
            args: validated,
        };
        if model.uses_groups() {
            model.units.warn_if_overlapping();
        }
        Ok(model)
    }

    /// Whether population-group rasters are needed
    pub fn uses_groups(&self) -> bool {
        self.radii.mode() == SearchRadiusMode::PerPopGroup
            || (self.aggregate_by_pop_group && !self.units.groups.is_empty())
    }

    /// Radius in metres converted to working pixels
    pub fn radius_px(&self, radius_m: f64) -> f64 {
        (radius_m / self.pixel_size.0).abs()
    }
}

/// A file and the task that writes it
#[derive(Debug, Clone)]
struct Node {
    path: PathBuf,
    id: TaskId,
}

/// Rasters shared by every population group
#[derive(Debug, Clone)]
struct GroupNodes {
    group: PopGroup,
    population: Node,
    proportion: Node,
}

struct GraphBuilder<'a> {
    model: &'a ResolvedModel,
    graph: TaskGraph,
}

impl<'a> GraphBuilder<'a> {
    fn add<F>(
        &mut self,
        name: impl Into<String>,
        target: PathBuf,
        deps: &[&Node],
        inputs: Vec<PathBuf>,
        fingerprint: serde_json::Value,
        func: F,
    ) -> Result<Node>
    where
        F: FnOnce(&Path) -> Result<()> + Send + 'static,
    {
        let out = target.clone();
        let ids: Vec<TaskId> = deps.iter().map(|n| n.id).collect();
        let id = self.graph.add_task(
            Task::new(name, move || func(&out))
                .targets([target.clone()])
                .inputs(inputs)
                .depends_on(&ids)
                .fingerprint(fingerprint),
        )?;
        Ok(Node { path: target, id })
    }

    fn intermediate(&self, name: &str) -> PathBuf {
        self.model.registry.intermediate(name)
    }

    fn artifact(&self, artifact: Artifact) -> PathBuf {
        self.model.registry.get(artifact)
    }

    fn aligned_lulc(&mut self) -> Result<Node> {
        let source = self.model.sources.lulc.clone();
        let pixel_size = self.model.pixel_size;
        self.add(
            "align land cover",
            self.artifact(Artifact::AlignedLulc),
            &[],
            vec![source.clone()],
            json!({ "pixel_size": [pixel_size.0, pixel_size.1] }),
            move |target| steps::align_lulc(&source, pixel_size, target),
        )
    }

    fn aligned_population(&mut self) -> Result<Node> {
        let source = self.model.sources.population.clone();
        let grid = self.model.grid.clone();
        let working_dir = self.model.registry.intermediate_dir().to_path_buf();
        let (min_x, min_y, max_x, max_y) = grid.bounds;
        self.add(
            "align population",
            self.artifact(Artifact::AlignedPopulation),
            &[],
            vec![source.clone()],
            json!({
                "pixel_size": [grid.pixel_size.0, grid.pixel_size.1],
                "bounds": [min_x, min_y, max_x, max_y],
            }),
            move |target| steps::align_population(&source, &grid, &working_dir, target),
        )
    }

    /// One kernel per distinct radius, keyed by radius label
    fn kernels(&mut self) -> Result<BTreeMap<String, Node>> {
        let decay = self.model.args.decay;
        let mut kernels = BTreeMap::new();
        for radius_m in self.model.radii.distinct() {
            let label = radius_label(radius_m);
            let radius_px = self.model.radius_px(radius_m);
            let node = self.add(
                format!("kernel {label}"),
                self.intermediate(&format!("kernel_{label}.tif")),
                &[],
                vec![],
                json!({ "decay": decay.to_string(), "radius_px": radius_px }),
                move |target| steps::create_kernel(decay, radius_px, target),
            )?;
            kernels.insert(label, node);
        }
        Ok(kernels)
    }

    fn greenspace_area(&mut self, lulc: &Node, target: PathBuf, only: Option<BTreeSet<i64>>) -> Result<Node> {
        let flags = self.model.greenspace.clone();
        let sorted: BTreeMap<i64, bool> = flags.iter().map(|(k, v)| (*k, *v)).collect();
        let source = lulc.path.clone();
        let name = match &only {
            Some(codes) => format!("greenspace area {:?}", codes),
            None => "greenspace area".to_string(),
        };
        self.add(
            name,
            target,
            &[lulc],
            vec![self.model.sources.lulc_table.clone()],
            json!({ "greenspace": sorted, "only_codes": only }),
            move |target| steps::greenspace_area(&source, &flags, only, target),
        )
    }

    fn convolve(&mut self, name: String, signal: &Node, kernel: &Node, clamp: bool, target: PathBuf) -> Result<Node> {
        let (s, k) = (signal.path.clone(), kernel.path.clone());
        self.add(name, target, &[signal, kernel], vec![], json!({ "clamp": clamp }), move |t| {
            steps::convolve_rasters(&s, &k, clamp, t)
        })
    }

    fn ratio(&mut self, name: String, area: &Node, decayed: &Node, target: PathBuf) -> Result<Node> {
        let (a, d) = (area.path.clone(), decayed.path.clone());
        self.add(name, target, &[area, decayed], vec![], json!(null), move |t| {
            steps::population_ratio(&a, &d, t)
        })
    }

    fn budget(&mut self, name: String, supply: &Node, target: PathBuf) -> Result<Node> {
        let demand = self.model.args.demand;
        let s = supply.path.clone();
        self.add(name, target, &[supply], vec![], json!({ "demand": demand }), move |t| {
            steps::budget(&s, demand, t)
        })
    }

    fn supply_demand(&mut self, name: String, budget: &Node, population: &Node, target: PathBuf) -> Result<Node> {
        let (b, p) = (budget.path.clone(), population.path.clone());
        self.add(name, target, &[budget, population], vec![], json!(null), move |t| {
            steps::supply_demand(&b, &p, t)
        })
    }

    fn filter(
        &mut self,
        name: String,
        population: &Node,
        budget: &Node,
        filter: SupplyFilter,
        target: PathBuf,
    ) -> Result<Node> {
        let (p, b) = (population.path.clone(), budget.path.clone());
        self.add(
            name,
            target,
            &[population, budget],
            vec![],
            json!({ "filter": format!("{:?}", filter) }),
            move |t| steps::filter_population(&p, &b, filter, t),
        )
    }

    fn sum(&mut self, name: &str, parts: &[Node], target: PathBuf) -> Result<Node> {
        let paths: Vec<PathBuf> = parts.iter().map(|n| n.path.clone()).collect();
        let deps: Vec<&Node> = parts.iter().collect();
        self.add(name, target, &deps, vec![], json!({ "parts": paths }), move |t| {
            steps::sum(&paths, t)
        })
    }

    /// Unit ID raster plus population and proportion rasters for every group
    fn group_rasters(&mut self, lulc: &Node, population: &Node) -> Result<Vec<GroupNodes>> {
        let aois = self.artifact(Artifact::ReprojectedAois);
        let ids = {
            let (aois, template) = (aois.clone(), lulc.path.clone());
            self.add(
                "rasterize unit ids",
                self.artifact(Artifact::AoisIds),
                &[lulc],
                vec![aois.clone()],
                json!(null),
                move |t| steps::rasterize_ids(&aois, &template, t),
            )?
        };

        let mut groups = Vec::with_capacity(self.model.units.groups.len());
        for group in self.model.units.groups.clone() {
            let field = group.field().to_string();
            let proportions = self.model.units.proportions(&group)?;
            let sorted: BTreeMap<i64, f64> = proportions.iter().map(|(k, v)| (*k, *v)).collect();

            let population_node = {
                let (id_path, pop_path, field) = (ids.path.clone(), population.path.clone(), field.clone());
                self.add(
                    format!("population in {field}"),
                    self.intermediate(&format!("population_in_{field}.tif")),
                    &[&ids, population],
                    vec![],
                    json!({ "proportions": sorted }),
                    move |t| steps::group_population(&id_path, proportions, &field, &pop_path, t),
                )?
            };
            let proportion_node = {
                let (aois, template, field) = (aois.clone(), lulc.path.clone(), field.clone());
                self.add(
                    format!("proportion of unit in {field}"),
                    self.intermediate(&format!("proportion_of_aoi_in_{field}.tif")),
                    &[lulc],
                    vec![aois.clone()],
                    json!({ "field": field }),
                    move |t| steps::rasterize_proportion(&aois, &field, &template, t),
                )?
            };
            groups.push(GroupNodes {
                group,
                population: population_node,
                proportion: proportion_node,
            });
        }
        Ok(groups)
    }

    /// Budget and population filters shared by the single-supply modes
    fn single_supply_tail(
        &mut self,
        supply: &Node,
        population: &Node,
        groups: &[GroupNodes],
    ) -> Result<(Vec<Node>, Summary)> {
        let budget = self.budget(
            "greenspace budget".into(),
            supply,
            self.artifact(Artifact::GreenspaceBudget),
        )?;
        let supply_demand = self.supply_demand(
            "supply-demand budget".into(),
            &budget,
            population,
            self.artifact(Artifact::GreenspaceSupplyDemandBudget),
        )?;
        let under = self.filter(
            "undersupplied population".into(),
            population,
            &budget,
            SupplyFilter::Undersupplied,
            self.artifact(Artifact::UndersuppliedPopulation),
        )?;
        let over = self.filter(
            "oversupplied population".into(),
            population,
            &budget,
            SupplyFilter::Oversupplied,
            self.artifact(Artifact::OversuppliedPopulation),
        )?;

        let mut deps = vec![supply_demand.clone(), population.clone(), under.clone(), over.clone()];
        let mut group_layers = Vec::new();
        if self.model.aggregate_by_pop_group {
            for g in groups {
                let field = g.group.field();
                let g_under = self.filter(
                    format!("undersupplied population {field}"),
                    &g.population,
                    &budget,
                    SupplyFilter::Undersupplied,
                    self.intermediate(&format!("undersupplied_population_{field}.tif")),
                )?;
                let g_over = self.filter(
                    format!("oversupplied population {field}"),
                    &g.population,
                    &budget,
                    SupplyFilter::Oversupplied,
                    self.intermediate(&format!("oversupplied_population_{field}.tif")),
                )?;
                group_layers.push(GroupLayers {
                    group: g.group.clone(),
                    population: g.population.path.clone(),
                    undersupplied: g_under.path.clone(),
                    oversupplied: g_over.path.clone(),
                    supply_demand: None,
                });
                deps.extend([g.population.clone(), g_under, g_over]);
            }
        }

        let summary = Summary::SingleRaster {
            totals: TotalLayers {
                supply_demand: supply_demand.path,
                population: population.path.clone(),
                undersupplied: under.path,
                oversupplied: over.path,
            },
            groups: group_layers,
        };
        Ok((deps, summary))
    }

    fn uniform(
        &mut self,
        radius_m: f64,
        lulc: &Node,
        population: &Node,
        kernels: &BTreeMap<String, Node>,
        groups: &[GroupNodes],
    ) -> Result<(Vec<Node>, Summary)> {
        let label = radius_label(radius_m);
        let kernel = kernel_for(kernels, radius_m)?;
        let decayed = self.convolve(
            "decayed population".into(),
            population,
            kernel,
            true,
            self.intermediate(&format!("decayed_population_within_{label}.tif")),
        )?;
        let area = self.greenspace_area(lulc, self.artifact(Artifact::GreenspaceArea), None)?;
        let ratio = self.ratio(
            "greenspace population ratio".into(),
            &area,
            &decayed,
            self.artifact(Artifact::GreenspacePopulationRatio),
        )?;
        let supply = self.convolve(
            "greenspace supply".into(),
            &ratio,
            kernel,
            true,
            self.artifact(Artifact::GreenspaceSupply),
        )?;
        self.single_supply_tail(&supply, population, groups)
    }

    fn per_greenspace_class(
        &mut self,
        by_class: &BTreeMap<i64, f64>,
        lulc: &Node,
        population: &Node,
        kernels: &BTreeMap<String, Node>,
        groups: &[GroupNodes],
    ) -> Result<(Vec<Node>, Summary)> {
        let mut decayed: BTreeMap<String, Node> = BTreeMap::new();
        for (label, kernel) in kernels {
            let node = self.convolve(
                format!("decayed population within {label}"),
                population,
                kernel,
                true,
                self.intermediate(&format!("decayed_population_within_{label}.tif")),
            )?;
            decayed.insert(label.clone(), node);
        }

        let mut partials = Vec::with_capacity(by_class.len());
        for (&code, &radius_m) in by_class {
            let label = radius_label(radius_m);
            let area = self.greenspace_area(
                lulc,
                self.intermediate(&format!("greenspace_area_lucode_{code}.tif")),
                Some(BTreeSet::from([code])),
            )?;
            let decayed_for_radius = decayed.get(&label).ok_or_else(|| missing_radius(radius_m))?;
            let ratio = self.ratio(
                format!("greenspace population ratio lucode {code}"),
                &area,
                decayed_for_radius,
                self.intermediate(&format!("greenspace_population_ratio_lucode_{code}.tif")),
            )?;
            let partial = self.convolve(
                format!("greenspace supply lucode {code}"),
                &ratio,
                kernel_for(kernels, radius_m)?,
                false,
                self.intermediate(&format!("greenspace_supply_lucode_{code}.tif")),
            )?;
            partials.push(partial);
        }
        let supply = self.sum(
            "greenspace supply total",
            &partials,
            self.artifact(Artifact::GreenspaceSupply),
        )?;
        self.single_supply_tail(&supply, population, groups)
    }

    fn per_population_group(
        &mut self,
        by_group: &BTreeMap<PopGroup, f64>,
        lulc: &Node,
        kernels: &BTreeMap<String, Node>,
        groups: &[GroupNodes],
    ) -> Result<(Vec<Node>, Summary)> {
        let area = self.greenspace_area(lulc, self.artifact(Artifact::GreenspaceArea), None)?;

        let mut decayed = Vec::with_capacity(groups.len());
        for g in groups {
            let field = g.group.field();
            let radius_m = group_radius(by_group, &g.group)?;
            let node = self.convolve(
                format!("decayed population in {field}"),
                &g.population,
                kernel_for(kernels, radius_m)?,
                true,
                self.intermediate(&format!("decayed_population_in_{field}.tif")),
            )?;
            decayed.push(node);
        }
        let decayed_all = self.sum(
            "decayed population all groups",
            &decayed,
            self.intermediate("decayed_population_all_groups.tif"),
        )?;
        let ratio = self.ratio(
            "greenspace population ratio".into(),
            &area,
            &decayed_all,
            self.artifact(Artifact::GreenspacePopulationRatio),
        )?;

        let mut supplies = Vec::with_capacity(groups.len());
        let mut supply_demands = Vec::with_capacity(groups.len());
        let mut unders = Vec::with_capacity(groups.len());
        let mut overs = Vec::with_capacity(groups.len());
        let mut group_layers = Vec::with_capacity(groups.len());
        for g in groups {
            let field = g.group.field();
            let radius_m = group_radius(by_group, &g.group)?;
            let supply = self.convolve(
                format!("greenspace supply to {field}"),
                &ratio,
                kernel_for(kernels, radius_m)?,
                false,
                self.intermediate(&format!("greenspace_supply_to_{field}.tif")),
            )?;
            let budget = self.budget(
                format!("greenspace budget {field}"),
                &supply,
                self.intermediate(&format!("greenspace_budget_{field}.tif")),
            )?;
            let supply_demand = self.supply_demand(
                format!("supply-demand budget {field}"),
                &budget,
                &g.population,
                self.intermediate(&format!("greenspace_supply_demand_budget_{field}.tif")),
            )?;
            let under = self.filter(
                format!("undersupplied population {field}"),
                &g.population,
                &budget,
                SupplyFilter::Undersupplied,
                self.intermediate(&format!("undersupplied_population_{field}.tif")),
            )?;
            let over = self.filter(
                format!("oversupplied population {field}"),
                &g.population,
                &budget,
                SupplyFilter::Oversupplied,
                self.intermediate(&format!("oversupplied_population_{field}.tif")),
            )?;
            group_layers.push(GroupLayers {
                group: g.group.clone(),
                population: g.population.path.clone(),
                undersupplied: under.path.clone(),
                oversupplied: over.path.clone(),
                supply_demand: Some(supply_demand.path.clone()),
            });
            supplies.push(supply);
            supply_demands.push(supply_demand);
            unders.push(under);
            overs.push(over);
        }

        let supply = {
            let values: Vec<PathBuf> = supplies.iter().map(|n| n.path.clone()).collect();
            let weights: Vec<PathBuf> = groups.iter().map(|g| g.proportion.path.clone()).collect();
            let deps: Vec<&Node> = supplies.iter().chain(groups.iter().map(|g| &g.proportion)).collect();
            self.add(
                "greenspace supply",
                self.artifact(Artifact::GreenspaceSupply),
                &deps,
                vec![],
                json!({ "values": values, "weights": weights }),
                move |t| steps::weighted_sum(&values, &weights, t),
            )?
        };
        let budget = self.budget(
            "greenspace budget".into(),
            &supply,
            self.artifact(Artifact::GreenspaceBudget),
        )?;
        let supply_demand = self.sum(
            "supply-demand budget",
            &supply_demands,
            self.artifact(Artifact::GreenspaceSupplyDemandBudget),
        )?;
        let under = self.sum(
            "undersupplied population",
            &unders,
            self.artifact(Artifact::UndersuppliedPopulation),
        )?;
        let over = self.sum(
            "oversupplied population",
            &overs,
            self.artifact(Artifact::OversuppliedPopulation),
        )?;

        let mut deps = vec![budget, supply_demand, under, over];
        deps.extend(groups.iter().map(|g| g.population.clone()));
        deps.extend(supply_demands);
        deps.extend(unders);
        deps.extend(overs);
        Ok((deps, Summary::PerGroup { groups: group_layers }))
    }

    fn summary(&mut self, deps: &[Node], template: &Node, summary: Summary) -> Result<Node> {
        let aois = self.artifact(Artifact::ReprojectedAois);
        let template_path = template.path.clone();
        let refs: Vec<&Node> = deps.iter().chain(std::iter::once(template)).collect();
        self.add(
            "aggregate by administrative unit",
            self.artifact(Artifact::Aois),
            &refs,
            vec![aois.clone()],
            json!({ "summary": format!("{:?}", summary) }),
            move |t| aggregate::write_summary(&aois, &template_path, &summary, t),
        )
    }
}

fn kernel_for(kernels: &BTreeMap<String, Node>, radius_m: f64) -> Result<&Node> {
    kernels
        .get(&radius_label(radius_m))
        .ok_or_else(|| missing_radius(radius_m))
}

fn missing_radius(radius_m: f64) -> Error {
    Error::Algorithm(format!("no kernel was created for radius {radius_m} m"))
}

fn group_radius(by_group: &BTreeMap<PopGroup, f64>, group: &PopGroup) -> Result<f64> {
    by_group.get(group).copied().ok_or_else(|| {
        Error::Algorithm(format!("no search radius for group {}", group.field()))
    })
}

/// Declare every task of the run.
pub fn build_graph(model: &ResolvedModel) -> Result<TaskGraph> {
    let graph = TaskGraph::new(model.registry.taskgraph_dir(), model.args.processing)?;
    let mut builder = GraphBuilder { model, graph };

    let lulc = builder.aligned_lulc()?;
    let population = builder.aligned_population()?;
    let kernels = builder.kernels()?;
    let groups = if model.uses_groups() {
        builder.group_rasters(&lulc, &population)?
    } else {
        Vec::new()
    };

    let (deps, summary) = match &model.radii {
        SearchRadii::Uniform(radius_m) => {
            builder.uniform(*radius_m, &lulc, &population, &kernels, &groups)?
        }
        SearchRadii::PerGreenspaceClass(by_class) => {
            builder.per_greenspace_class(by_class, &lulc, &population, &kernels, &groups)?
        }
        SearchRadii::PerPopulationGroup(by_group) => {
            builder.per_population_group(by_group, &lulc, &kernels, &groups)?
        }
    };
    builder.summary(&deps, &population, summary)?;

    info!("declared {} tasks", builder.graph.len());
    Ok(builder.graph)
}

/// Outcome of a model run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub mode: SearchRadiusMode,
    pub decay: DecayFunction,
    pub supply: PathBuf,
    pub summary: PathBuf,
    pub report: TaskReport,
}

/// Run the model end to end.
pub fn execute(args: &ModelArgs) -> Result<RunOutcome> {
    let model = ResolvedModel::resolve(args)?;
    info!(
        "running with search radius mode {} and {} decay",
        model.radii.mode(),
        model.args.decay
    );
    let graph = build_graph(&model)?;
    let report = graph.join()?;
    info!(
        "run complete: {} task(s) executed, {} up to date",
        report.executed.len(),
        report.skipped.len()
    );
    Ok(RunOutcome {
        mode: model.radii.mode(),
        decay: model.args.decay,
        supply: model.registry.get(Artifact::GreenspaceSupply),
        summary: model.registry.get(Artifact::Aois),
        report,
    })
}
