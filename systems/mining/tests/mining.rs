use std::collections::{HashMap, HashSet};

use quarry_rig_core::{
    BlockPos, Bounds, CellState, ColumnCoord, Environment, Event, Facing, MaterialId,
    MaterialRecord, MiningTuning, RigId,
};
use quarry_rig_system_mining::{LayerPhase, MiningContext, MiningManager};
use quarry_rig_system_movement::{RecoveryRequest, TargetSource};

const RIG: RigId = RigId::new(3);
const GUARD: u32 = 2;

#[derive(Default)]
struct Terrain {
    cells: HashMap<BlockPos, CellState>,
}

impl Terrain {
    fn fill_layer(&mut self, bounds: &Bounds, y: i32) {
        for column in bounds.interior_columns() {
            let _ = self.cells.insert(column.at(y), CellState::Solid);
        }
    }
}

impl Environment for Terrain {
    fn cell_state(&self, pos: BlockPos) -> CellState {
        self.cells.get(&pos).copied().unwrap_or(CellState::Empty)
    }

    fn collision_geometry_empty(&self, pos: BlockPos) -> bool {
        self.cell_state(pos) == CellState::Empty
    }

    fn remove_cell(&mut self, pos: BlockPos) -> Vec<MaterialRecord> {
        match self.cells.remove(&pos) {
            Some(CellState::Solid) => vec![MaterialRecord::new(MaterialId::new(1), 1)],
            _ => Vec::new(),
        }
    }

    fn eject(&mut self, _pos: BlockPos, _record: MaterialRecord) {}
}

fn bounds() -> Bounds {
    // Floor 10, first layer 9, interior x in 1..=4, z in 1..=3.
    Bounds::from_corners(BlockPos::new(0, 10, 0), BlockPos::new(5, 16, 4))
}

fn select(
    manager: &mut MiningManager,
    terrain: &Terrain,
    tuning: &MiningTuning,
    from: ColumnCoord,
    out: &mut Vec<Event>,
) -> Option<ColumnCoord> {
    let bounds = bounds();
    let ctx = MiningContext {
        rig: RIG,
        env: terrain,
        bounds: &bounds,
        tuning,
        guard_height: GUARD,
    };
    manager.select_target(&ctx, from, out)
}

fn recover(
    manager: &mut MiningManager,
    terrain: &Terrain,
    tuning: &MiningTuning,
    unreachable: ColumnCoord,
    reachable: &mut dyn FnMut(ColumnCoord) -> bool,
) -> Option<ColumnCoord> {
    let bounds = bounds();
    let request = RecoveryRequest {
        env: terrain,
        bounds: &bounds,
        unreachable,
        from: unreachable,
    };
    manager.recovery(tuning, GUARD, 0).recover(request, reachable)
}

#[test]
fn obstacle_free_layer_is_excavated_completely() {
    let mut terrain = Terrain::default();
    terrain.fill_layer(&bounds(), 9);
    terrain.fill_layer(&bounds(), 8);
    let tuning = MiningTuning::default();
    let mut manager = MiningManager::new(&bounds(), Facing::North, 0);
    let mut events = Vec::new();

    let mut visited = Vec::new();
    let mut from = ColumnCoord::new(1, 1);
    while manager.layer_y() == 9 {
        let Some(target) = select(&mut manager, &terrain, &tuning, from, &mut events) else {
            break;
        };
        if manager.layer_y() != 9 {
            break;
        }
        visited.push(target);
        let (cell, records) = manager.complete_removal(&mut terrain).expect("removal");
        assert_eq!(cell, target.at(9));
        assert_eq!(records.len(), 1);
        from = target;
    }

    let unique: HashSet<_> = visited.iter().copied().collect();
    assert_eq!(visited.len(), 12);
    assert_eq!(unique.len(), 12);
    assert!(visited.windows(2).all(|pair| pair[0].is_adjacent(pair[1])));
    assert!(events.contains(&Event::LayerCompleted { rig: RIG, layer_y: 9 }));
    assert!(!events
        .iter()
        .any(|event| matches!(event, Event::FinalSweepStarted { .. })));

    // The next layer starts in the corner the previous one ended in.
    assert_eq!(manager.layer_y(), 8);
    assert_eq!(manager.target(), visited.last().copied());
}

#[test]
fn finishes_at_lowest_layer() {
    let mut terrain = Terrain::default();
    terrain.fill_layer(&bounds(), 9);
    let tuning = MiningTuning::default();
    let mut manager = MiningManager::new(&bounds(), Facing::East, 9);
    let mut events = Vec::new();

    let mut removed = 0;
    while select(
        &mut manager,
        &terrain,
        &tuning,
        ColumnCoord::new(1, 1),
        &mut events,
    )
    .is_some()
    {
        let _ = manager.complete_removal(&mut terrain);
        removed += 1;
    }

    assert_eq!(removed, 12);
    assert!(manager.is_finished());
    assert_eq!(manager.phase(), LayerPhase::Finished);
    assert!(events.ends_with(&[
        Event::LayerCompleted { rig: RIG, layer_y: 9 },
        Event::Finished { rig: RIG },
    ]));
}

#[test]
fn skipped_cell_is_revisited_by_final_sweep() {
    let mut terrain = Terrain::default();
    terrain.fill_layer(&bounds(), 9);
    let tuning = MiningTuning::default();
    let mut manager = MiningManager::new(&bounds(), Facing::North, 9);
    let mut events = Vec::new();

    let first = select(&mut manager, &terrain, &tuning, ColumnCoord::new(1, 1), &mut events)
        .expect("first target");
    let alternative =
        recover(&mut manager, &terrain, &tuning, first, &mut |_| true).expect("alternative");
    assert_ne!(alternative, first);
    assert!(manager.is_skipped(first.at(9)));

    let mut from = alternative;
    let _ = manager.complete_removal(&mut terrain);
    let mut last = None;
    while let Some(target) = select(&mut manager, &terrain, &tuning, from, &mut events) {
        if manager.phase() == LayerPhase::FinalSweep {
            last = Some(target);
            break;
        }
        let _ = manager.complete_removal(&mut terrain);
        from = target;
    }

    assert_eq!(last, Some(first));
    assert!(events.contains(&Event::FinalSweepStarted {
        rig: RIG,
        layer_y: 9,
        count: 1
    }));
}

#[test]
fn recovery_falls_back_to_ring_search() {
    let mut terrain = Terrain::default();
    terrain.fill_layer(&bounds(), 9);
    let tuning = MiningTuning {
        recovery_probe_limit: 2,
        ..MiningTuning::default()
    };
    let mut manager = MiningManager::new(&bounds(), Facing::North, 0);
    let mut events = Vec::new();

    let first = select(&mut manager, &terrain, &tuning, ColumnCoord::new(1, 1), &mut events)
        .expect("first target");
    assert_eq!(first, ColumnCoord::new(1, 1));

    let goal = ColumnCoord::new(3, 2);
    let found = recover(&mut manager, &terrain, &tuning, first, &mut |column| column == goal);

    assert_eq!(found, Some(goal));
    assert_eq!(manager.target(), Some(goal));
    assert_eq!(manager.skipped_len(), 3);
    assert!(manager.is_skipped(ColumnCoord::new(2, 1).at(9)));
    assert!(manager.is_skipped(ColumnCoord::new(3, 1).at(9)));
}

#[test]
fn failed_recovery_leaves_no_target() {
    let mut terrain = Terrain::default();
    terrain.fill_layer(&bounds(), 9);
    let tuning = MiningTuning::default();
    let mut manager = MiningManager::new(&bounds(), Facing::North, 0);
    let mut events = Vec::new();

    let first = select(&mut manager, &terrain, &tuning, ColumnCoord::new(1, 1), &mut events)
        .expect("first target");
    let found = recover(&mut manager, &terrain, &tuning, first, &mut |_| false);

    assert_eq!(found, None);
    assert_eq!(manager.target(), None);
}

#[test]
fn skips_expire() {
    let mut terrain = Terrain::default();
    terrain.fill_layer(&bounds(), 9);
    let tuning = MiningTuning::default();
    let mut manager = MiningManager::new(&bounds(), Facing::North, 0);
    let mut events = Vec::new();

    let first = select(&mut manager, &terrain, &tuning, ColumnCoord::new(1, 1), &mut events)
        .expect("first target");
    let _ = recover(&mut manager, &terrain, &tuning, first, &mut |_| true);

    manager.purge_expired(tuning.temp_skip_steps - 1);
    assert!(manager.is_skipped(first.at(9)));
    manager.purge_expired(tuning.temp_skip_steps);
    assert!(!manager.is_skipped(first.at(9)));
}

#[test]
fn removal_needs_presence_and_power() {
    let mut terrain = Terrain::default();
    terrain.fill_layer(&bounds(), 9);
    let tuning = MiningTuning::default();
    let mut manager = MiningManager::new(&bounds(), Facing::North, 0);
    let mut events = Vec::new();
    let _ = select(&mut manager, &terrain, &tuning, ColumnCoord::new(1, 1), &mut events);

    assert!(!manager.advance_removal(false, 1.0, 3));
    assert!(!manager.advance_removal(true, 0.0, 3));
    assert_eq!(manager.removal_progress(), 0);

    assert!(!manager.advance_removal(true, 1.0, 3));
    assert!(!manager.advance_removal(true, 1.0, 3));
    assert!(manager.advance_removal(true, 1.0, 3));
    assert!(manager.advance_removal(true, 1.0, 3));
    assert_eq!(manager.removal_progress(), 3);
}

#[test]
fn reset_restarts_the_layer_and_rearms_the_final_sweep() {
    let mut terrain = Terrain::default();
    terrain.fill_layer(&bounds(), 9);
    let tuning = MiningTuning::default();
    let mut manager = MiningManager::new(&bounds(), Facing::North, 9);
    let mut events = Vec::new();

    let first = select(&mut manager, &terrain, &tuning, ColumnCoord::new(1, 1), &mut events)
        .expect("first target");
    let alternative =
        recover(&mut manager, &terrain, &tuning, first, &mut |_| true).expect("alternative");
    let _ = manager.complete_removal(&mut terrain);
    let mut from = alternative;
    while let Some(target) = select(&mut manager, &terrain, &tuning, from, &mut events) {
        if manager.phase() == LayerPhase::FinalSweep {
            break;
        }
        let _ = manager.complete_removal(&mut terrain);
        from = target;
    }
    assert_eq!(manager.phase(), LayerPhase::FinalSweep);
    assert!(manager.advance_removal(true, 1.0, 1));

    manager.reset_progress();

    assert_eq!(manager.target(), None);
    assert_eq!(manager.removal_progress(), 0);
    assert_eq!(manager.skipped_len(), 0);
    assert_eq!(manager.phase(), LayerPhase::Raster);
    assert!(manager.final_sweep_pending());
    assert_eq!(manager.final_sweep_targets().count(), 0);

    // The raster pass starts over and finds the one cell left on the layer.
    let again = select(&mut manager, &terrain, &tuning, from, &mut events);
    assert_eq!(again, Some(first));
    assert_eq!(manager.phase(), LayerPhase::Raster);
    let _ = manager.complete_removal(&mut terrain);
    assert_eq!(select(&mut manager, &terrain, &tuning, first, &mut events), None);
    assert!(manager.is_finished());
}

#[test]
fn reset_keeps_a_finished_rig_finished() {
    let terrain = Terrain::default();
    let tuning = MiningTuning::default();
    let mut manager = MiningManager::new(&bounds(), Facing::North, 9);
    let mut events = Vec::new();
    assert_eq!(
        select(&mut manager, &terrain, &tuning, ColumnCoord::new(1, 1), &mut events),
        None
    );
    assert!(manager.is_finished());

    manager.reset_progress();

    assert!(manager.is_finished());
}
