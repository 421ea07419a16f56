//! Property tests: poll cadence and command demultiplexing.

use ecm_common::messages::{DriveCommand, DriveCommandBatch, RestoreConfigRequest, SaveConfigRequest};
use ecm_common::sdo::{RESTORE_DEFAULT_PARAMETERS, RESTORE_TOKEN, SAVE_TOKEN, STORE_PARAMETERS};
use ecm_control_loop::drive::DriveDevice;
use ecm_control_loop::poll::SdoPollTimer;
use ecm_control_loop::sdo::{SdoClient, SdoService, SimulatedSdoTransfer};
use proptest::prelude::*;

use super::{Node, config};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The timer fires every `ceil(threshold / period) + 1` cycles.
    #[test]
    fn poll_timer_cadence(cycle_us in 1u64..=5_000, threshold_us in 0u64..=50_000) {
        let mut timer = SdoPollTimer::new(cycle_us);
        let threshold_sec = threshold_us as f64 / 1e6;
        let interval = threshold_us.div_ceil(cycle_us) + 1;

        for tick in 0..(3 * interval) {
            let expected = tick % interval == interval - 1;
            prop_assert_eq!(timer.tick(threshold_sec), expected, "tick {}", tick);
        }
    }

    /// Drive `i < min(N, L)` takes `batch[i]`; the rest keep their command.
    #[test]
    fn batch_prefix_applied(drives in 0usize..8, len in 0usize..12) {
        let mut node = Node::operating(&config(drives, 0));

        let initial: DriveCommandBatch = (0..drives)
            .map(|i| DriveCommand::new(0x1000 + i as u16, 1))
            .collect();
        node.bus.send_drive_commands(initial);
        node.tick();

        let update: DriveCommandBatch = (0..len)
            .map(|i| DriveCommand::new(0x2000 + i as u16, 2))
            .collect();
        node.bus.send_drive_commands(update);
        let report = node.tick();
        prop_assert_eq!(report.drive_commands_applied, drives.min(len));

        for i in 0..drives {
            let base: u16 = if i < len { 0x2000 } else { 0x1000 };
            let expected = base + i as u16;
            prop_assert_eq!(node.cl.drive(i).unwrap().control_word(), expected);
            prop_assert_eq!(node.tree.get::<u16>("root/controlword", i).unwrap(), expected);
        }

        let feedback = node.bus.take_drive_feedback().unwrap();
        prop_assert_eq!(feedback.len(), drives);
    }

    /// Save and Restore only ever write their own token to their own object,
    /// and only on selected drives.
    #[test]
    fn tokens_never_swapped(
        save in proptest::collection::vec(any::<bool>(), 0..6),
        restore in proptest::collection::vec(any::<bool>(), 0..6),
    ) {
        let mut probes = Vec::new();
        let svc = SdoService::from_fn(4, |_| {
            let (transfer, probe) = SimulatedSdoTransfer::new();
            probes.push(probe);
            SdoClient::new(transfer)
        });

        let saved = svc.save_config(&SaveConfigRequest { save: save.clone() });
        let restored = svc.restore_config(&RestoreConfigRequest { reset_to_default: restore.clone() });
        prop_assert_eq!(saved.success.len(), save.len().min(4));
        prop_assert_eq!(restored.success.len(), restore.len().min(4));
        prop_assert!(saved.all_succeeded() && restored.all_succeeded());

        for (i, probe) in probes.iter().enumerate() {
            let saves = probe.tokens_written_to(STORE_PARAMETERS);
            let restores = probe.tokens_written_to(RESTORE_DEFAULT_PARAMETERS);
            prop_assert!(saves.iter().all(|t| *t == SAVE_TOKEN));
            prop_assert!(restores.iter().all(|t| *t == RESTORE_TOKEN));
            prop_assert_eq!(saves.len(), usize::from(save.get(i).copied().unwrap_or(false)));
            prop_assert_eq!(restores.len(), usize::from(restore.get(i).copied().unwrap_or(false)));
        }
    }
}
