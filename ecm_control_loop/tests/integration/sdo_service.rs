//! Integration test: configuration service and bulk reads.

use std::sync::Arc;
use std::thread;

use ecm_common::messages::{
    GetSdoConfigRequest, RestoreConfigRequest, SaveConfigRequest, SetSdoConfigRequest,
};
use ecm_common::sdo::{
    PositionControllerConfig, RESTORE_DEFAULT_PARAMETERS, RESTORE_TOKEN, SAVE_TOKEN,
    STORE_PARAMETERS, SdoAddress, SdoConfig, VelocityControllerConfig,
};
use ecm_control_loop::sdo::{
    BulkReadOutcome, SdoAccess, SdoClient, SdoService, SimProbe, SimulatedSdoTransfer,
};

use super::Node;

type Service = SdoService<SdoClient<SimulatedSdoTransfer>>;

fn service(count: usize) -> (Service, Vec<SimProbe>) {
    let mut probes = Vec::with_capacity(count);
    let svc = SdoService::from_fn(count, |_| {
        let (transfer, probe) = SimulatedSdoTransfer::new();
        probes.push(probe);
        SdoClient::new(transfer)
    });
    (svc, probes)
}

#[test]
fn save_persists_only_selected_drives() {
    let (svc, probes) = service(2);
    let res = svc.save_config(&SaveConfigRequest {
        save: vec![true, false],
    });

    assert_eq!(res.success, vec![true, true]);
    assert_eq!(probes[0].downloads(), vec![(STORE_PARAMETERS, SAVE_TOKEN)]);
    assert_eq!(STORE_PARAMETERS, SdoAddress::new(0x1010, 0x01));
    assert_eq!(SAVE_TOKEN, 0x6576_6173);
    assert!(probes[1].downloads().is_empty());
}

#[test]
fn restore_writes_its_own_token() {
    let (svc, probes) = service(1);
    let res = svc.restore_config(&RestoreConfigRequest {
        reset_to_default: vec![true],
    });

    assert!(res.all_succeeded());
    assert_eq!(RESTORE_DEFAULT_PARAMETERS, SdoAddress::new(0x1011, 0x01));
    assert_eq!(
        probes[0].tokens_written_to(RESTORE_DEFAULT_PARAMETERS),
        vec![RESTORE_TOKEN]
    );
    assert!(probes[0].tokens_written_to(STORE_PARAMETERS).is_empty());
    assert_eq!(probes[0].restores(), 1);
    assert_eq!(probes[0].saves(), 0);
}

#[test]
fn get_truncates_to_pool() {
    let (svc, _) = service(2);
    let res = svc.get_config(&GetSdoConfigRequest {
        read_cfg: vec![true; 5],
    });
    assert_eq!(res.torque_controller_cfg.len(), 2);
    assert_eq!(res.velocity_controller_cfg.len(), 2);
    assert_eq!(res.position_controller_cfg.len(), 2);
    assert_eq!(res.success, vec![true, true]);

    let res = svc.get_config(&GetSdoConfigRequest { read_cfg: vec![] });
    assert!(res.success.is_empty());
}

#[test]
fn set_save_and_power_cycle() {
    let (svc, probes) = service(2);
    let velocity = VelocityControllerConfig {
        kp: 0.5,
        ki: 2.5,
        ..Default::default()
    };
    let position = PositionControllerConfig {
        kp: 12.0,
        ..Default::default()
    };

    let res = svc.set_config(&SetSdoConfigRequest {
        velocity_controller_cfg: vec![velocity],
        position_controller_cfg: vec![position, position],
        ..Default::default()
    });
    assert_eq!(res.success, vec![true, true]);

    let save = svc.save_config(&SaveConfigRequest {
        save: vec![true, true],
    });
    assert!(save.all_succeeded());
    for probe in &probes {
        probe.power_cycle();
    }

    let res = svc.get_config(&GetSdoConfigRequest {
        read_cfg: vec![true, true],
    });
    assert_eq!(res.velocity_controller_cfg[0], velocity);
    assert_eq!(res.velocity_controller_cfg[1], SdoConfig::default().velocity);
    assert_eq!(res.position_controller_cfg, vec![position, position]);
}

#[test]
fn unsaved_changes_lost_after_restore() {
    let (svc, _) = service(1);
    let position = PositionControllerConfig {
        kp: 99.0,
        ..Default::default()
    };
    svc.set_config(&SetSdoConfigRequest {
        position_controller_cfg: vec![position],
        ..Default::default()
    });
    svc.restore_config(&RestoreConfigRequest {
        reset_to_default: vec![true],
    });
    let cfg = svc.with_drive(0, |d| d.sdo_config()).unwrap();
    assert_eq!(cfg, SdoConfig::default());
}

#[test]
fn failures_reported_per_drive() {
    let (svc, probes) = service(3);
    probes[1].set_offline(true);
    let res = svc.save_config(&SaveConfigRequest {
        save: vec![true, true, true],
    });
    assert_eq!(res.success, vec![true, false, true]);
    assert!(!res.all_succeeded());
}

#[test]
fn bulk_read_follows_cycle_trigger() {
    let mut node = Node::operating(&ecm_common::config::ControlLoopConfig {
        drives: 2,
        ios: 0,
        cycle_time_us: 1000,
        read_sdo_update_sec: 0.01,
    });
    let (svc, probes) = service(2);
    let svc = svc.with_trigger(node.cl.sdo_read_trigger());

    for _ in 0..10 {
        node.tick();
        assert_eq!(svc.poll_bulk_read(), None);
    }
    node.tick();
    assert_eq!(
        svc.poll_bulk_read(),
        Some(BulkReadOutcome {
            drives: 2,
            failed: 0
        })
    );
    assert!(probes.iter().all(|p| p.uploads() > 0));
    assert_eq!(svc.poll_bulk_read(), None);
}

#[test]
fn concurrent_requests_serialized_per_drive() {
    let (svc, probes) = service(4);
    let svc = Arc::new(svc);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let svc = Arc::clone(&svc);
            thread::spawn(move || {
                for _ in 0..25 {
                    let res = svc.get_config(&GetSdoConfigRequest {
                        read_cfg: vec![true; 4],
                    });
                    assert_eq!(res.success, vec![true; 4]);
                    let res = svc.save_config(&SaveConfigRequest {
                        save: vec![true; 4],
                    });
                    assert_eq!(res.success, vec![true; 4]);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    for probe in &probes {
        assert_eq!(probe.saves(), 100);
    }
}
