use std::time::Duration;

use quarry_rig_core::{RigId, SchedulerTuning};
use quarry_rig_system_scheduler::{phase_slot, TickScheduler};

#[test]
fn half_speed_world_processes_four_of_ten_removals() {
    let mut scheduler = TickScheduler::new(SchedulerTuning::default());
    assert!(scheduler.begin_step(1, Duration::from_micros(37_500)));
    assert_eq!(scheduler.tokens(), 4);

    let mut processed = 0;
    let mut deferred = 0;
    for id in 0..10 {
        let slot = phase_slot(RigId::new(id));
        assert!(scheduler.is_phase_open(slot));
        if scheduler.try_consume_token() {
            processed += 1;
        } else {
            deferred += 1;
        }
    }

    assert_eq!(processed, 4);
    assert_eq!(deferred, 6);
    assert_eq!(scheduler.tokens(), 0);
}

#[test]
fn every_rig_gets_a_turn_within_a_phase_cycle() {
    let mut scheduler = TickScheduler::new(SchedulerTuning::default());
    let rigs: Vec<RigId> = (0..12).map(RigId::new).collect();
    let _ = scheduler.begin_step(0, Duration::ZERO);
    for _ in &rigs {
        scheduler.register_active();
    }

    let mut served = vec![false; rigs.len()];
    for step in 1..=3 {
        let _ = scheduler.begin_step(step, Duration::ZERO);
        assert_eq!(scheduler.phase_count(), 3);
        for (index, rig) in rigs.iter().enumerate() {
            scheduler.register_active();
            if scheduler.is_phase_open(phase_slot(*rig)) {
                served[index] = true;
            }
        }
    }

    assert!(served.iter().all(|turn| *turn));
}
