//! Seeded voxel scenario with a row of rigs.

use quarry_rig_core::{
    BlockPos, Command, EnvelopeSize, Event, Facing, MaterialId, RigId, RigTuning,
};
use quarry_rig_world::{
    self as world, query,
    voxel::{Battery, Hopper, SimHost, Voxel, VoxelGrid},
    World,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

/// Floor height every rig is anchored at.
const FLOOR_Y: i32 = 64;
/// Horizontal gap between neighbouring envelopes.
const RIG_SPACING: i32 = 3;
/// Number of ore kinds scattered through the ground.
const ORE_KINDS: u32 = 4;
/// Material used for obstacles inside the envelopes.
const RUBBLE: MaterialId = MaterialId::new(99);

/// Parameters describing the generated site.
#[derive(Clone, Debug)]
pub(crate) struct ScenarioSpec {
    pub(crate) rigs: u32,
    pub(crate) size: EnvelopeSize,
    pub(crate) layers: u32,
    pub(crate) seed: u64,
    pub(crate) obstacle_density: f64,
    pub(crate) recharge: f64,
    pub(crate) hopper: Option<usize>,
}

/// Builds the world, places and frames every rig, and returns the placement
/// events.
pub(crate) fn build(spec: &ScenarioSpec, tuning: RigTuning) -> (World<SimHost>, Vec<Event>) {
    let mut rng = ChaCha8Rng::seed_from_u64(spec.seed);
    let width = i32::try_from(spec.size.width()).unwrap_or(i32::MAX);
    let length = i32::try_from(spec.size.length()).unwrap_or(i32::MAX);
    let height = i32::try_from(spec.size.height()).unwrap_or(i32::MAX);
    let layers = i32::try_from(spec.layers).unwrap_or(i32::MAX);
    let rigs = i32::try_from(spec.rigs).unwrap_or(i32::MAX);
    let pitch = width.saturating_add(RIG_SPACING);

    let lowest_layer_y = FLOOR_Y.saturating_sub(layers);
    let grid = VoxelGrid::new(
        BlockPos::new(-1, lowest_layer_y.saturating_sub(1), -1),
        BlockPos::new(
            pitch.saturating_mul(rigs),
            FLOOR_Y.saturating_add(height),
            length.saturating_add(1),
        ),
    );
    let guard = tuning.obstacles.guard_height;
    let mut world = World::new(SimHost::new(grid), tuning);
    let mut events = Vec::new();

    for index in 0..spec.rigs {
        let rig = RigId::new(index + 1);
        let offset = pitch.saturating_mul(i32::try_from(index).unwrap_or(i32::MAX));
        let anchor = BlockPos::new(offset + width / 2, FLOOR_Y, 0);
        world.host_mut().add_rig(
            rig,
            Battery::new(spec.recharge * 50.0, spec.recharge),
            spec.hopper.map(Hopper::new),
        );
        world::apply(
            &mut world,
            Command::PlaceRig {
                rig,
                anchor,
                facing: Facing::North,
                size: spec.size,
                lowest_layer_y,
            },
            &mut events,
        );

        let Some(bounds) = query::pending(&world, rig).map(|placement| placement.bounds) else {
            continue;
        };
        let (min, max) = (bounds.min(), bounds.max());
        let grid = world.host_mut().grid_mut();
        for y in lowest_layer_y..bounds.floor() {
            for z in min.z..=max.z {
                for x in min.x..=max.x {
                    let ore = MaterialId::new(rng.gen_range(1..=ORE_KINDS));
                    let _ = grid.set(BlockPos::new(x, y, z), Voxel::solid(ore));
                }
            }
        }

        // Obstacles stay below the guard band so no column is sealed.
        let top = bounds.ceiling() - i32::try_from(guard).unwrap_or(0) - 1;
        let mut obstacles = 0_u32;
        for column in bounds.interior_columns() {
            for y in bounds.floor() + 1..top {
                if rng.gen_bool(spec.obstacle_density.clamp(0.0, 1.0)) {
                    let _ = grid.set(column.at(y), Voxel::solid(RUBBLE));
                    obstacles += 1;
                }
            }
        }
        debug!(%rig, obstacles, "terrain generated");
        world.host_mut().build_frame(&bounds);
    }

    info!(rigs = spec.rigs, seed = spec.seed, "scenario built");
    (world, events)
}
