//! The per-tree evolution driver.
//!
//! FOF groups are processed in snapshot order. For each group:
//!
//! 1. Every halo in the group inherits the galaxies of its progenitors.
//!    The host galaxy of the first occupied progenitor follows the halo;
//!    every other inherited galaxy becomes an orphan. A halo that inherits
//!    no host gets a fresh galaxy.
//! 2. The group is evolved through [`STEPS`] substeps: infall onto the
//!    central, reincorporation, cooling, star formation with supernova
//!    feedback, then satellite mergers and disruption.
//! 3. Every galaxy still live is recorded at the group's snapshot.

use tracing::{debug, trace};

use rsage_galaxies::{
    Baryons, Galaxy, GalaxyError, GalaxyStore, HaloProperties, MergedStore, MergerSite,
    ModelContext, apply_feedback, disrupt_to_ics, estimate_merge_time, form_stars, is_disrupted,
    perform_merger, record,
};
use rsage_grid::SelfconGrid;
use rsage_recipes::physics::{
    cooling_mass, infall_mass, metallicity, reincorporated_mass, reionization_modifier,
    star_formation_mass, supernova_feedback,
};
use rsage_types::{FileNr, GalaxyIndex, GalaxyType, Halo, HaloIndex, MergeType, STEPS};

use crate::context::WorkerCounters;
use crate::snapshots::SnapshotTable;
use crate::tree::{TreeError, validate_tree};

/// Errors raised while evolving a tree. Each names the tree and file.
#[derive(Debug, thiserror::Error)]
pub enum EvolveError {
    /// The tree failed validation.
    #[error("file {file}: {source}")]
    Tree {
        /// The tree file.
        file: FileNr,
        /// The validation error.
        source: TreeError,
    },

    /// A galaxy operation failed.
    #[error("file {file}, tree {tree}: {source}")]
    Galaxy {
        /// The tree file.
        file: FileNr,
        /// Tree within the file.
        tree: usize,
        /// The underlying error.
        source: GalaxyError,
    },

    /// A FOF group ended up without a central galaxy.
    #[error("file {file}, tree {tree}: FOF group rooted at halo {halo} has no central galaxy")]
    MissingCentral {
        /// The tree file.
        file: FileNr,
        /// Tree within the file.
        tree: usize,
        /// The FOF root.
        halo: HaloIndex,
    },

    /// A halo link chain loops back on itself.
    #[error("file {file}, tree {tree}: {link} chain from halo {halo} does not terminate")]
    LinkCycle {
        /// The tree file.
        file: FileNr,
        /// Tree within the file.
        tree: usize,
        /// Where the chain starts.
        halo: HaloIndex,
        /// Which link.
        link: &'static str,
    },
}

/// Failures inside the driver, before the file and tree are attached.
enum Fault {
    Galaxy(GalaxyError),
    MissingCentral(HaloIndex),
    LinkCycle(HaloIndex, &'static str),
}

impl From<GalaxyError> for Fault {
    fn from(source: GalaxyError) -> Self {
        Self::Galaxy(source)
    }
}

/// One tree to evolve.
#[derive(Debug, Clone, Copy)]
pub struct TreeRun<'a> {
    /// The file the tree came from.
    pub file: FileNr,
    /// Position of the tree within the file.
    pub tree: usize,
    /// The tree's halos.
    pub halos: &'a [Halo],
}

/// What a worker keeps across the trees of a file.
#[derive(Debug, Default)]
pub struct WorkerState {
    /// Galaxies of the tree being evolved.
    pub store: GalaxyStore,
    /// Terminal records of merged and disrupted galaxies.
    pub merged: MergedStore,
    /// Running totals.
    pub counters: WorkerCounters,
}

impl WorkerState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Evolve every galaxy of `run` through the snapshots of its halos.
///
/// On return the store holds the tree's galaxies (merged ones frozen) and
/// every terminal record sits in the merged store.
///
/// # Errors
///
/// Returns [`EvolveError::Tree`] for an invalid tree, or the first galaxy,
/// missing-central or link-cycle failure, tagged with file and tree.
pub fn evolve_tree(
    run: &TreeRun<'_>,
    ctx: &ModelContext<'_>,
    snapshots: &SnapshotTable,
    state: &mut WorkerState,
    selfcon: Option<&mut SelfconGrid>,
) -> Result<(), EvolveError> {
    validate_tree(run.tree, run.halos, ctx.snapshots()).map_err(|source| EvolveError::Tree {
        file: run.file,
        source,
    })?;

    let mut driver = Driver {
        halos: run.halos,
        ctx,
        snapshots,
        state,
        selfcon,
        halo_galaxies: vec![Vec::new(); run.halos.len()],
    };
    driver.run().map_err(|fault| match fault {
        Fault::Galaxy(source) => EvolveError::Galaxy {
            file: run.file,
            tree: run.tree,
            source,
        },
        Fault::MissingCentral(halo) => EvolveError::MissingCentral {
            file: run.file,
            tree: run.tree,
            halo,
        },
        Fault::LinkCycle(halo, link) => EvolveError::LinkCycle {
            file: run.file,
            tree: run.tree,
            halo,
            link,
        },
    })?;

    debug!(
        file = %run.file,
        tree = run.tree,
        halos = run.halos.len(),
        galaxies = state.store.len(),
        "tree evolved"
    );
    Ok(())
}

struct Driver<'d, 'c, 'w> {
    halos: &'d [Halo],
    ctx: &'d ModelContext<'c>,
    snapshots: &'d SnapshotTable,
    state: &'w mut WorkerState,
    selfcon: Option<&'w mut SelfconGrid>,
    /// Galaxies hosted by each halo once it has been constructed.
    halo_galaxies: Vec<Vec<GalaxyIndex>>,
}

impl Driver<'_, '_, '_> {
    fn run(&mut self) -> Result<(), Fault> {
        let mut roots: Vec<usize> = self
            .halos
            .iter()
            .enumerate()
            .filter(|(i, h)| h.is_fof_root(HaloIndex::new(*i)))
            .map(|(i, _)| i)
            .collect();
        roots.sort_by_key(|&i| (self.halos.get(i).map_or(0, |h| h.snap_num), i));

        for root in roots {
            let mut group = Vec::new();
            for member in self.fof_members(root)? {
                group.extend(self.construct(member, root)?);
            }
            self.evolve_group(root, &group)?;
        }
        Ok(())
    }

    fn halo(&self, index: usize) -> Result<&Halo, Fault> {
        self.halos
            .get(index)
            .ok_or(Fault::Galaxy(GalaxyError::HaloNotFound(HaloIndex::new(index))))
    }

    /// Follow a link chain starting at `start`, guarding against loops.
    fn chain(
        &self,
        start: Option<HaloIndex>,
        link: &'static str,
        next: impl Fn(&Halo) -> Option<HaloIndex>,
    ) -> Result<Vec<usize>, Fault> {
        let mut members = Vec::new();
        let mut cursor = start;
        while let Some(index) = cursor {
            if members.len() > self.halos.len() {
                return Err(Fault::LinkCycle(start.unwrap_or(index), link));
            }
            let i = index.into_inner();
            members.push(i);
            cursor = next(self.halo(i)?);
        }
        Ok(members)
    }

    fn fof_members(&self, root: usize) -> Result<Vec<usize>, Fault> {
        self.chain(Some(HaloIndex::new(root)), "next_halo_in_fof_group", |h| {
            h.next_halo_in_fof_group
        })
    }

    /// Whether `halo` hosts a live galaxy that is not an orphan.
    fn is_occupied(&self, halo: usize) -> bool {
        self.halo_galaxies.get(halo).is_some_and(|list| {
            list.iter().any(|&g| {
                self.state
                    .store
                    .get(g)
                    .is_ok_and(|gal| !gal.is_merged() && gal.galaxy_type != GalaxyType::Orphan)
            })
        })
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Hand the galaxies of `h`'s progenitors to `h`. Returns them, host
    /// first.
    fn construct(&mut self, h: usize, root: usize) -> Result<Vec<GalaxyIndex>, Fault> {
        let halo = self.halo(h)?;
        let progenitors = self.chain(halo.first_progenitor, "next_progenitor", |p| {
            p.next_progenitor
        })?;

        let first_occupied = match halo.first_progenitor {
            Some(fp) if self.is_occupied(fp.into_inner()) => Some(fp.into_inner()),
            _ => progenitors
                .iter()
                .copied()
                .filter(|&p| self.is_occupied(p))
                .max_by_key(|&p| {
                    (
                        self.halos.get(p).map_or(0, |x| x.len),
                        std::cmp::Reverse(p),
                    )
                }),
        };

        let mut host = None;
        let mut inherited = Vec::new();
        for p in progenitors {
            let list = self
                .halo_galaxies
                .get_mut(p)
                .map(std::mem::take)
                .unwrap_or_default();
            for g in list {
                let galaxy = self.state.store.get(g)?;
                if galaxy.is_merged() {
                    continue;
                }
                if host.is_none()
                    && Some(p) == first_occupied
                    && galaxy.galaxy_type != GalaxyType::Orphan
                {
                    self.follow(g, h, root)?;
                    host = Some(g);
                } else {
                    self.make_orphan(g, p, h, root)?;
                    inherited.push(g);
                }
            }
        }

        let host = match host {
            Some(g) => g,
            None => self.create(h, root)?,
        };
        let mut galaxies = Vec::with_capacity(inherited.len().saturating_add(1));
        galaxies.push(host);
        galaxies.extend(inherited);
        if let Some(slot) = self.halo_galaxies.get_mut(h) {
            slot.clone_from(&galaxies);
        }
        Ok(galaxies)
    }

    /// The host galaxy moves into its progenitor's descendant.
    fn follow(&mut self, g: GalaxyIndex, h: usize, root: usize) -> Result<(), Fault> {
        let index = HaloIndex::new(h);
        let props = HaloProperties::of_halo(self.halo(h)?, index, self.ctx);
        let galaxy = self.state.store.get(g)?;
        let infall = h != root && galaxy.galaxy_type == GalaxyType::Central;
        let merge_time = if infall {
            estimate_merge_time(index, HaloIndex::new(root), galaxy, self.halos, self.ctx)?
        } else {
            galaxy.merge.merge_time
        };

        let galaxy = self.state.store.get_mut(g)?;
        let old_mvir = galaxy.props.mvir;
        galaxy.props = HaloProperties {
            delta_mvir: props.mvir - old_mvir,
            ..props
        };
        galaxy.halo = index;
        if h == root {
            galaxy.galaxy_type = GalaxyType::Central;
            galaxy.merge.merge_time = None;
        } else {
            galaxy.galaxy_type = GalaxyType::Satellite;
            galaxy.merge.merge_time = merge_time;
            if infall {
                trace!(galaxy = %galaxy.id, halo = h, merge_time, "central fell in");
            }
        }
        Ok(())
    }

    /// A galaxy whose subhalo is gone keeps its last position and is
    /// scheduled to merge if it was not already.
    fn make_orphan(&mut self, g: GalaxyIndex, p: usize, h: usize, root: usize) -> Result<(), Fault> {
        let galaxy = self.state.store.get(g)?;
        let merge_time = match galaxy.merge.merge_time {
            Some(t) => Some(t),
            None => estimate_merge_time(
                HaloIndex::new(p),
                HaloIndex::new(root),
                galaxy,
                self.halos,
                self.ctx,
            )?,
        };

        let galaxy = self.state.store.get_mut(g)?;
        if galaxy.galaxy_type != GalaxyType::Orphan {
            self.state.counters.orphans = self.state.counters.orphans.saturating_add(1);
        }
        galaxy.galaxy_type = GalaxyType::Orphan;
        galaxy.halo = HaloIndex::new(h);
        galaxy.merge.merge_time = merge_time;
        galaxy.props.delta_mvir = -galaxy.props.mvir;
        galaxy.props.mvir = 0.0;
        Ok(())
    }

    fn create(&mut self, h: usize, root: usize) -> Result<GalaxyIndex, Fault> {
        let index = HaloIndex::new(h);
        let g = self.state.store.allocate(index, self.halos, self.ctx)?;
        self.state.counters.galaxies_created =
            self.state.counters.galaxies_created.saturating_add(1);
        if h != root {
            let galaxy = self.state.store.get(g)?;
            let merge_time =
                estimate_merge_time(index, HaloIndex::new(root), galaxy, self.halos, self.ctx)?;
            let galaxy = self.state.store.get_mut(g)?;
            galaxy.galaxy_type = GalaxyType::Satellite;
            galaxy.merge.merge_time = merge_time;
        }
        Ok(g)
    }

    // -----------------------------------------------------------------------
    // Evolution
    // -----------------------------------------------------------------------

    fn evolve_group(&mut self, root: usize, group: &[GalaxyIndex]) -> Result<(), Fault> {
        let ctx = self.ctx;
        let snapshot = self.halo(root)?.snap_num;
        let root_index = HaloIndex::new(root);

        let central = group
            .iter()
            .copied()
            .find(|&g| {
                self.state.store.get(g).is_ok_and(|gal| {
                    gal.halo == root_index && gal.galaxy_type == GalaxyType::Central
                })
            })
            .ok_or(Fault::MissingCentral(root_index))?;

        let mut group_baryons = 0.0;
        for &g in group {
            let galaxy = self.state.store.get_mut(g)?;
            galaxy.reset_sfr();
            group_baryons += galaxy.baryons.total();
        }

        let central_mvir = self.state.store.get(central)?.props.mvir;
        let reion = reionization_modifier(
            central_mvir,
            ctx.redshift(snapshot),
            ctx.physics,
            ctx.cosmo,
            ctx.units,
        );
        let infall = infall_mass(central_mvir, group_baryons, ctx.cosmo.baryon_frac, reion);

        let dt = self.snapshots.delta_t(snapshot);
        if dt > 0.0 {
            #[allow(clippy::cast_precision_loss)]
            let steps = STEPS as f64;
            let step_dt = dt / steps;
            let start = self.snapshots.age(snapshot.saturating_sub(1));
            for step in 0..STEPS {
                #[allow(clippy::cast_precision_loss)]
                let time = start - (step as f64 + 0.5) * step_dt;
                let site = MergerSite {
                    satellite: central,
                    merger_central: central,
                    central,
                    snapshot,
                    time,
                    dt: step_dt,
                    step,
                };
                self.substep(group, infall / steps, &site)?;
            }
        }

        let dt_myr = dt * ctx.units.time_in_megayears;
        let mut recorded = 0_u64;
        for &g in group {
            let galaxy = self.state.store.get_mut(g)?;
            if galaxy.is_merged() {
                continue;
            }
            if !ctx.physics.instantaneous_recycling && dt > 0.0 {
                galaxy.supernovae.advance(dt_myr);
            }
            record(galaxy, self.halos, STEPS, ctx, self.selfcon.as_deref_mut())?;
            recorded = recorded.saturating_add(1);
        }

        debug!(
            snapshot,
            root,
            galaxies = group.len(),
            recorded,
            infall,
            "FOF group evolved"
        );
        Ok(())
    }

    /// One substep of the group. `site` carries the central and timing;
    /// its satellite is filled in per merger.
    fn substep(&mut self, group: &[GalaxyIndex], infall: f64, site: &MergerSite) -> Result<(), Fault> {
        let ctx = self.ctx;
        let physics = ctx.physics;
        let central = site.central;
        let step_dt = site.dt;

        let central_vvir = {
            let c = self.state.store.get_mut(central)?;
            add_infall(&mut c.baryons, infall);
            reincorporate(c, step_dt, ctx);
            c.props.vvir
        };

        let energy = ctx.supernova_energy_per_mass();
        #[allow(clippy::cast_precision_loss)]
        let steps = STEPS as f64;
        for &g in group {
            let galaxy = self.state.store.get_mut(g)?;
            if galaxy.is_merged() {
                continue;
            }
            cool(galaxy, step_dt);

            let b = galaxy.baryons;
            let stars = star_formation_mass(
                b.cold_gas,
                galaxy.props.vvir,
                galaxy.props.disk_scale_radius,
                step_dt,
                physics,
            );
            let feedback_stars = if physics.instantaneous_recycling {
                stars
            } else {
                galaxy.supernovae.release() / steps
            };
            let masses =
                supernova_feedback(stars, feedback_stars, b.cold_gas, central_vvir, energy, physics);
            form_stars(galaxy, masses.stars, step_dt, site.step, false, ctx);
            apply_feedback(galaxy, masses.reheated, masses.ejected);
        }

        for &g in group {
            if g == central {
                continue;
            }
            let galaxy = self.state.store.get_mut(g)?;
            if galaxy.is_merged() || !galaxy.galaxy_type.is_satellite() {
                continue;
            }
            let Some(t) = galaxy.merge.merge_time else {
                continue;
            };
            let t = t - step_dt;
            galaxy.merge.merge_time = Some(t);
            if !(is_disrupted(galaxy, site.step, ctx) || t < 0.0) {
                continue;
            }

            let counters = &mut self.state.counters;
            if t > 0.0 {
                disrupt_to_ics(
                    &mut self.state.store,
                    &mut self.state.merged,
                    g,
                    central,
                    site.step.saturating_add(1),
                    self.halos,
                    ctx,
                    self.selfcon.as_deref_mut(),
                )?;
                counters.disruptions = counters.disruptions.saturating_add(1);
            } else {
                let merger = MergerSite {
                    satellite: g,
                    ..*site
                };
                let kind = perform_merger(
                    &mut self.state.store,
                    &mut self.state.merged,
                    &merger,
                    self.halos,
                    ctx,
                    self.selfcon.as_deref_mut(),
                )?;
                if kind == MergeType::Major {
                    counters.major_mergers = counters.major_mergers.saturating_add(1);
                } else {
                    counters.minor_mergers = counters.minor_mergers.saturating_add(1);
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Gas cycle
// ---------------------------------------------------------------------------

/// Add infalling gas to the hot halo. Negative infall drains the ejected
/// reservoir first, then the hot gas.
fn add_infall(b: &mut Baryons, infall: f64) {
    let mut infall = infall;
    if infall < 0.0 && b.ejected_mass > 0.0 {
        let removed = (-infall).min(b.ejected_mass);
        b.remove_ejected(removed);
        infall += removed;
    }
    if infall < 0.0 && b.hot_gas > 0.0 {
        let z = metallicity(b.hot_gas, b.metals_hot_gas);
        let removed = (-infall).min(b.hot_gas);
        b.hot_gas -= removed;
        b.metals_hot_gas -= z * removed;
    }
    if infall > 0.0 {
        b.hot_gas += infall;
    }
}

fn reincorporate(galaxy: &mut Galaxy, dt: f64, ctx: &ModelContext<'_>) {
    let b = &mut galaxy.baryons;
    let mass = reincorporated_mass(
        b.ejected_mass,
        galaxy.props.vvir,
        galaxy.props.rvir,
        dt,
        ctx.physics,
    );
    if mass <= 0.0 {
        return;
    }
    let z = metallicity(b.ejected_mass, b.metals_ejected_mass);
    b.remove_ejected(mass);
    b.hot_gas += mass;
    b.metals_hot_gas += z * mass;
}

fn cool(galaxy: &mut Galaxy, dt: f64) {
    let b = &mut galaxy.baryons;
    let mass = cooling_mass(b.hot_gas, galaxy.props.rvir, galaxy.props.vvir, dt);
    if mass <= 0.0 {
        return;
    }
    let z = metallicity(b.hot_gas, b.metals_hot_gas);
    b.hot_gas -= mass;
    b.metals_hot_gas -= z * mass;
    b.cold_gas += mass;
    b.metals_cold_gas += z * mass;
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::panic)]
mod tests {
    use rsage_recipes::{Cosmology, EscapeFractionPrescription, PhysicsConfig, Units};
    use rsage_types::GalaxyId;

    use super::*;

    struct Setup {
        physics: PhysicsConfig,
        cosmo: Cosmology,
        units: Units,
        snapshots: SnapshotTable,
        fesc: rsage_recipes::EscapeFractionFn,
    }

    impl Setup {
        fn new() -> Self {
            let cosmo = Cosmology::default();
            let units = Units::new();
            let snapshots = SnapshotTable::from_scale_factors(
                vec![0.06, 0.08, 0.1, 0.12, 0.14],
                &cosmo,
                &units,
            );
            let Ok(snapshots) = snapshots else {
                panic!("snapshot table");
            };
            Self {
                physics: PhysicsConfig::default(),
                cosmo,
                units,
                snapshots,
                fesc: EscapeFractionPrescription::Constant { fesc: 0.2 }.bind(cosmo.hubble_h),
            }
        }

        fn ctx(&self) -> ModelContext<'_> {
            ModelContext {
                physics: &self.physics,
                cosmo: &self.cosmo,
                units: &self.units,
                redshifts: &self.snapshots.redshifts,
                grid_size: 4,
                halo_part_cut: 10,
                reion_snapshot: None,
                fesc: &self.fesc,
            }
        }
    }

    fn halo(snap: u32, len: u32, root: usize, pos: [f64; 3]) -> Halo {
        Halo {
            snap_num: snap,
            len,
            first_halo_in_fof_group: HaloIndex::new(root),
            next_halo_in_fof_group: None,
            descendant: None,
            first_progenitor: None,
            next_progenitor: None,
            pos,
            vel: [0.0; 3],
            mvir: f64::from(len) * 0.0860657,
            vmax: 150.0,
            spin: [0.02, 0.01, 0.01],
            most_bound_id: 1,
        }
    }

    /// A main branch across every snapshot.
    fn single_branch() -> Vec<Halo> {
        let lens = [2000, 3000, 4000, 5000, 6000];
        let mut halos: Vec<Halo> = (0_u32..)
            .zip(lens)
            .zip(0_usize..)
            .map(|((snap, len), i)| halo(snap, len, i, [10.0, 10.0, 10.0]))
            .collect();
        for (i, next) in [(0, 1), (1, 2), (2, 3), (3, 4)] {
            halos[i].descendant = Some(HaloIndex::new(next));
            halos[next].first_progenitor = Some(HaloIndex::new(i));
        }
        halos
    }

    /// Main branch 0..=4, plus a branch that is its own group at snapshot
    /// 1, falls in at 2, and sinks into the main halo at 3. `sat_lens`
    /// sizes the infalling branch at snapshots 1 and 2.
    fn infall_tree(sat_lens: [u32; 2]) -> Vec<Halo> {
        let [before, after] = sat_lens;
        let mut halos = single_branch();
        // 5: snap 1 independent root; 6: snap 2 subhalo of halo 2.
        halos.push(halo(1, before, 5, [12.0, 10.0, 10.0]));
        halos.push(halo(2, after, 2, [10.5, 10.0, 10.0]));
        halos[5].descendant = Some(HaloIndex::new(6));
        halos[6].first_progenitor = Some(HaloIndex::new(5));
        halos[6].descendant = Some(HaloIndex::new(3));
        halos[2].next_halo_in_fof_group = Some(HaloIndex::new(6));
        // Halo 3's progenitors: the main branch first, then the subhalo.
        halos[2].next_progenitor = Some(HaloIndex::new(6));
        halos
    }

    fn run(setup: &Setup, halos: &[Halo], state: &mut WorkerState) -> Result<(), EvolveError> {
        let tree = TreeRun {
            file: FileNr::new(0),
            tree: 0,
            halos,
        };
        evolve_tree(&tree, &setup.ctx(), &setup.snapshots, state, None)
    }

    #[test]
    fn single_branch_grows_one_central() {
        let setup = Setup::new();
        let halos = single_branch();
        let mut state = WorkerState::new();
        let r = run(&setup, &halos, &mut state);
        assert!(r.is_ok(), "{r:?}");
        assert_eq!(state.store.len(), 1);
        assert_eq!(state.counters.galaxies_created, 1);

        let galaxy = state.store.get(GalaxyIndex::new(0));
        assert!(galaxy.is_ok());
        if let Ok(g) = galaxy {
            assert_eq!(g.galaxy_type, GalaxyType::Central);
            assert_eq!(g.halo, HaloIndex::new(4));
            assert!(g.baryons.stellar_mass > 0.0);
            assert!(g.baryons.hot_gas + g.baryons.cold_gas > 0.0);
            let history = g.history();
            assert!(history.is_some_and(|h| h.rows().iter().all(|r| r.is_recorded())));
            // Snapshot 0 has no time step, so nothing forms there.
            assert!(history.is_some_and(|h| h.rows()[0].sfr.abs() < f64::EPSILON));
            assert!(history.is_some_and(|h| h.rows()[4].sfr > 0.0));
        }
    }

    #[test]
    fn infalling_central_becomes_satellite_then_orphan() {
        let mut setup = Setup::new();
        // Never disrupt, so only the merger clock can end the satellite.
        setup.physics.threshold_sat_disruption = -1.0;
        let halos = infall_tree([60, 20]);
        let mut state = WorkerState::new();
        let r = run(&setup, &halos, &mut state);
        assert!(r.is_ok(), "{r:?}");
        assert_eq!(state.counters.galaxies_created, 2);
        assert_eq!(state.counters.orphans, 1);
        assert_eq!(state.counters.disruptions, 0);

        let sat = state.store.iter().find(|g| g.id == GalaxyId::new(1));
        let Some(sat) = sat else {
            panic!("second galaxy missing");
        };
        // A small satellite in a massive host sinks slowly.
        assert!(!sat.is_merged());
        let types = sat.history().map(|h| h.column(|r| r.galaxy_type));
        assert_eq!(types, Some(vec![-1, 0, 1, 2, 2]));
        assert!(sat.props.mvir.abs() < f64::EPSILON);
        assert!(sat.merge.merge_time.is_some_and(|t| t > 0.0));
    }

    #[test]
    fn stripped_satellite_is_disrupted_into_the_central() {
        let mut setup = Setup::new();
        // Any satellite with baryons counts as stripped.
        setup.physics.threshold_sat_disruption = 1.0e12;
        let halos = infall_tree([60, 20]);
        let mut state = WorkerState::new();
        let r = run(&setup, &halos, &mut state);
        assert!(r.is_ok(), "{r:?}");

        assert_eq!(state.counters.disruptions, 1);
        assert_eq!(state.merged.len(), 1);
        let record = &state.merged.records()[0];
        assert_eq!(record.id, GalaxyId::new(1));
        assert_eq!(record.merge.merge_type, MergeType::Disruption);
        assert_eq!(record.merge.merge_into_id, Some(GalaxyId::new(0)));
        // Disrupted while a satellite of halo 2, at snapshot 2.
        assert!(record.history().is_some_and(|h| h.rows()[2].galaxy_type == 1));

        let live: Vec<_> = state.store.iter_live().collect();
        assert_eq!(live.len(), 1);
        assert!(live[0].1.baryons.ics > 0.0);
    }

    /// A satellite nearly as large as its host, which sinks within the
    /// tree. Disruption is off so the merger clock decides.
    fn merge_through_tree(setup: &mut Setup) -> WorkerState {
        setup.physics.threshold_sat_disruption = -1.0;
        let halos = infall_tree([1900, 1800]);
        let mut state = WorkerState::new();
        let r = run(setup, &halos, &mut state);
        assert!(r.is_ok(), "{r:?}");
        assert_eq!(state.counters.disruptions, 0);
        assert_eq!(state.merged.len(), 1);
        assert_eq!(state.store.iter_live().count(), 1);
        state
    }

    /// Snapshot whose substeps contain lookback time `t`.
    fn snapshot_of(setup: &Setup, t: f64) -> Option<usize> {
        let ages = &setup.snapshots;
        (1_u32..5)
            .find(|&s| ages.age(s) <= t && t <= ages.age(s.saturating_sub(1)))
            .and_then(|s| usize::try_from(s).ok())
    }

    #[test]
    fn sinking_satellite_merges_into_the_central() {
        let mut setup = Setup::new();
        let state = merge_through_tree(&mut setup);
        assert_eq!(state.counters.major_mergers, 1);
        assert_eq!(state.counters.minor_mergers, 0);

        let record = &state.merged.records()[0];
        assert_eq!(record.id, GalaxyId::new(1));
        assert_eq!(record.merge.merge_type, MergeType::Major);
        assert_eq!(record.merge.merge_into_id, Some(GalaxyId::new(0)));

        let Some((_, central)) = state.store.iter_live().next() else {
            panic!("central missing");
        };
        assert_eq!(central.id, GalaxyId::new(0));
        assert_eq!(central.merge.last_merge_type, MergeType::Major);
        assert!(central.merge.time_of_last_minor_merger.is_none());
        let Some(t) = central.merge.time_of_last_major_merger else {
            panic!("major merger time not set");
        };

        // The satellite's history stops at the snapshot it merged in.
        let merged_at = snapshot_of(&setup, t);
        assert!(merged_at.is_some_and(|s| s >= 2), "merge time {t}");
        let last_row = record
            .history()
            .and_then(|h| h.rows().iter().rposition(|r| r.is_recorded()));
        assert_eq!(last_row, merged_at);
    }

    #[test]
    fn small_mass_ratio_merger_is_minor() {
        let mut setup = Setup::new();
        // Mass ratios never exceed one, so every merger is minor.
        setup.physics.thresh_major_merger = 1.0;
        let state = merge_through_tree(&mut setup);
        assert_eq!(state.counters.minor_mergers, 1);
        assert_eq!(state.counters.major_mergers, 0);

        let record = &state.merged.records()[0];
        assert_eq!(record.merge.merge_type, MergeType::Minor);
        assert_eq!(record.merge.merge_into_id, Some(GalaxyId::new(0)));

        let Some((_, central)) = state.store.iter_live().next() else {
            panic!("central missing");
        };
        assert_eq!(central.merge.last_merge_type, MergeType::Minor);
        assert!(central.merge.time_of_last_minor_merger.is_some());
        assert!(central.merge.time_of_last_major_merger.is_none());
    }

    #[test]
    fn missing_halo_link_is_reported_with_tree() {
        let setup = Setup::new();
        let mut halos = single_branch();
        halos[1].first_progenitor = Some(HaloIndex::new(99));
        let mut state = WorkerState::new();
        let r = run(&setup, &halos, &mut state);
        assert!(matches!(r, Err(EvolveError::Tree { .. })));
    }

    #[test]
    fn negative_infall_drains_ejected_then_hot() {
        let mut b = Baryons {
            ejected_mass: 1.0,
            metals_ejected_mass: 0.1,
            hot_gas: 2.0,
            metals_hot_gas: 0.2,
            ..Baryons::default()
        };
        add_infall(&mut b, -1.5);
        assert!(b.ejected_mass.abs() < 1e-12);
        assert!((b.hot_gas - 1.5).abs() < 1e-12);
        assert!((b.metals_hot_gas - 0.15).abs() < 1e-12);
        add_infall(&mut b, 0.5);
        assert!((b.hot_gas - 2.0).abs() < 1e-12);
    }
}
