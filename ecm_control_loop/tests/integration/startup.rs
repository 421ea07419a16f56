//! Integration test: lifecycle sequencing and binding registration.

use std::sync::Arc;

use ecm_common::config::{ConfigError, ConfigLoader, NodeConfig};
use ecm_common::consts::MAX_DRIVES;
use ecm_common::messages::{DriveCommand, DriveFeedback};
use ecm_control_loop::device::{
    Device, DeviceContext, DeviceError, DeviceHandle, DeviceKind, TaskTime,
};
use ecm_control_loop::dio::DigitalIo;
use ecm_control_loop::drive::{Drive, DriveDevice};
use ecm_control_loop::lifecycle::{LifecycleError, LifecycleEvent};
use ecm_control_loop::params::{Direction, ParameterTree};
use ecm_control_loop::transport::MailboxTransport;
use ecm_control_loop::{ControlLoop, ControlLoopError, LifecyclePhase};
use parking_lot::Mutex;
use tempfile::TempDir;

use super::{Node, config};

const NODE_TOML: &str = r#"
[shared]
service_name = "ecm-it"

[control_loop]
drives = 2
ios = 1
cycle_time_us = 500
read_sdo_update_sec = 0.25
"#;

#[test]
fn full_lifecycle_from_toml() {
    let cfg = NodeConfig::from_toml(NODE_TOML).unwrap();
    let mut node = Node::created(&cfg.control_loop);
    assert_eq!(node.cl.phase(), LifecyclePhase::Created);
    assert_eq!(node.cl.drive_count(), 2);
    assert_eq!(node.cl.io_count(), 1);
    assert_eq!(node.cl.cycle_period().as_micros(), 500);

    node.cl.init_phase1().unwrap();
    assert_eq!(node.cl.phase(), LifecyclePhase::Phase1Initialized);
    node.cl.init_phase2().unwrap();
    assert_eq!(node.cl.phase(), LifecyclePhase::Phase2Initialized);
    node.cl.start().unwrap();
    assert_eq!(node.cl.phase(), LifecyclePhase::Operating);
    assert_eq!(node.cl.drive(1).unwrap().phase(), LifecyclePhase::Operating);
    assert_eq!(node.cl.io(0).unwrap().phase(), LifecyclePhase::Operating);

    assert!(node.tick().all_ok());

    node.cl.stop().unwrap();
    assert_eq!(node.cl.phase(), LifecyclePhase::Stopped);
    assert_eq!(node.cl.drive(0).unwrap().phase(), LifecyclePhase::Stopped);
}

#[test]
fn node_config_loaded_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("node.toml");
    std::fs::write(&path, NODE_TOML).unwrap();

    let cfg = NodeConfig::load(&path).unwrap();
    cfg.validate().unwrap();
    let mut node = Node::created(&cfg.control_loop);
    node.cl.init_phase1().unwrap();
    assert_eq!(node.cl.read_sdo_update_sec(), 0.25);
    assert_eq!(node.tree.get::<f64>("root/read_sdo_update_sec", 0).unwrap(), 0.25);

    let missing = NodeConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(missing, ConfigError::FileNotFound));
}

#[test]
fn bindings_registered_under_module_paths() {
    let mut node = Node::created(&config(2, 1));
    assert!(node.tree.is_empty());
    node.cl.init_phase1().unwrap();

    for path in [
        "root/controlword",
        "root/opmode",
        "root/statusword",
        "root/read_sdo",
        "root/read_sdo_update_sec",
        "root/axis1/statusword",
        "root/axis2/secondaryVelocityValue",
        "root/axis2/analogInput4",
        "root/axis1/targetTorque",
        "root/device1/digitalInput8",
        "root/device1/digitalOutput1",
    ] {
        assert!(node.tree.contains(path), "{path} missing");
    }
    assert!(!node.tree.contains("root/axis3/statusword"));
    assert!(!node.tree.contains("root/device2/digitalInput1"));

    let info = node.tree.info("root/controlword").unwrap();
    assert_eq!(info.len, 2);
    assert_eq!(info.direction, Direction::Output);
    assert_eq!(node.tree.info("root/statusword").unwrap().direction, Direction::Input);
    assert_eq!(
        node.tree.info("root/read_sdo_update_sec").unwrap().direction,
        Direction::Tunable
    );
}

#[test]
fn empty_pools_register_empty_arrays() {
    let mut node = Node::created(&config(0, 0));
    node.cl.init_phase1().unwrap();
    assert_eq!(node.tree.info("root/controlword").unwrap().len, 0);
}

#[test]
fn iterate_rejected_outside_operating() {
    let mut node = Node::created(&config(1, 0));
    let err = node.cl.iterate(TaskTime::default()).unwrap_err();
    assert!(matches!(err, ControlLoopError::NotOperating(LifecyclePhase::Created)));

    node.cl.init_phase1().unwrap();
    node.cl.init_phase2().unwrap();
    node.cl.start().unwrap();
    node.tick();
    node.cl.stop().unwrap();
    let err = node.cl.iterate(TaskTime::default()).unwrap_err();
    assert!(matches!(err, ControlLoopError::NotOperating(LifecyclePhase::Stopped)));
    assert_eq!(node.bus.drive_feedback_published(), 1);
}

#[test]
fn phases_must_run_in_order() {
    let mut node = Node::created(&config(1, 0));
    let err = node.cl.start().unwrap_err();
    assert!(matches!(
        err,
        ControlLoopError::Lifecycle(LifecycleError::InvalidTransition {
            event: LifecycleEvent::Start,
            ..
        })
    ));
    // A rejected call does not change the phase.
    assert_eq!(node.cl.phase(), LifecyclePhase::Created);
}

#[test]
fn oversized_pool_rejected_at_construction() {
    let tree = Arc::new(ParameterTree::new());
    let mut transport = MailboxTransport::new();
    let err = ControlLoop::standard(&config(MAX_DRIVES + 1, 0), tree, &mut transport).unwrap_err();
    assert!(matches!(
        err,
        ControlLoopError::Config(ConfigError::ValidationError(_))
    ));
    assert!(transport.handle().open_topics().is_empty());
}

// ── Scripted drive ─────────────────────────────────────────────────

type CallLog = Arc<Mutex<Vec<(usize, LifecycleEvent)>>>;

/// Drive that records lifecycle calls and fails one of them.
struct ScriptedDrive {
    inner: Drive,
    index: usize,
    fail: Option<(usize, LifecycleEvent)>,
    log: CallLog,
}

impl ScriptedDrive {
    fn step(&mut self, event: LifecycleEvent) -> Result<(), DeviceError> {
        self.log.lock().push((self.index, event));
        if self.fail == Some((self.index, event)) {
            return Err(DeviceError::Fault(format!("scripted {event:?} failure")));
        }
        Ok(())
    }
}

impl Device for ScriptedDrive {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn init_phase1(&mut self) -> Result<(), DeviceError> {
        self.step(LifecycleEvent::InitPhase1)?;
        self.inner.init_phase1()
    }

    fn init_phase2(&mut self) -> Result<(), DeviceError> {
        self.step(LifecycleEvent::InitPhase2)?;
        self.inner.init_phase2()
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.step(LifecycleEvent::Start)?;
        self.inner.start()
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        let scripted = self.step(LifecycleEvent::Stop);
        self.inner.stop()?;
        scripted
    }

    fn iterate(&mut self, time: TaskTime) -> Result<(), DeviceError> {
        self.inner.iterate(time)
    }
}

impl DriveDevice for ScriptedDrive {
    fn set_drive_command(&mut self, command: &DriveCommand) {
        self.inner.set_drive_command(command);
    }

    fn drive_command(&self) -> DriveCommand {
        self.inner.drive_command()
    }

    fn set_status_word(&mut self, status_word: u16) {
        self.inner.set_status_word(status_word);
    }

    fn drive_feedback(&self) -> DriveFeedback {
        self.inner.drive_feedback()
    }
}

fn scripted_loop(
    drives: usize,
    ios: usize,
    fail: Option<(usize, LifecycleEvent)>,
) -> (ControlLoop<ScriptedDrive, DigitalIo>, CallLog) {
    let log = CallLog::default();
    let tree = Arc::new(ParameterTree::new());
    let mut transport = MailboxTransport::new();
    let drive_log = log.clone();
    let cl = ControlLoop::new(
        &config(drives, ios),
        tree,
        &mut transport,
        |ctx: DeviceContext| ScriptedDrive {
            index: ctx.handle.index,
            inner: Drive::new(ctx),
            fail,
            log: drive_log.clone(),
        },
        DigitalIo::new,
    )
    .unwrap();
    (cl, log)
}

#[test]
fn failing_drive_aborts_phase_and_skips_the_rest() {
    let (mut cl, log) = scripted_loop(3, 1, Some((1, LifecycleEvent::InitPhase1)));
    let err = cl.init_phase1().unwrap_err();

    match err {
        ControlLoopError::Lifecycle(LifecycleError::DeviceFailed { device, event, .. }) => {
            assert_eq!(device, DeviceHandle::new(DeviceKind::Drive, 1));
            assert_eq!(event, LifecycleEvent::InitPhase1);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(
        *log.lock(),
        vec![(0, LifecycleEvent::InitPhase1), (1, LifecycleEvent::InitPhase1)]
    );
    assert_eq!(cl.phase(), LifecyclePhase::Failed);
    assert_eq!(cl.io(0).unwrap().phase(), LifecyclePhase::Created);

    // Terminal: nothing else runs.
    assert!(cl.init_phase2().is_err());
    assert_eq!(log.lock().len(), 2);
}

#[test]
fn failing_start_leaves_loop_failed() {
    let (mut cl, log) = scripted_loop(2, 0, Some((0, LifecycleEvent::Start)));
    cl.init_phase1().unwrap();
    cl.init_phase2().unwrap();
    assert!(cl.start().is_err());
    assert_eq!(cl.phase(), LifecyclePhase::Failed);
    assert!(!log.lock().contains(&(1, LifecycleEvent::Start)));
    assert!(matches!(
        cl.iterate(TaskTime::default()),
        Err(ControlLoopError::NotOperating(LifecyclePhase::Failed))
    ));
}

#[test]
fn failing_stop_still_stops_loop() {
    let (mut cl, _) = scripted_loop(2, 0, Some((0, LifecycleEvent::Stop)));
    cl.init_phase1().unwrap();
    cl.init_phase2().unwrap();
    cl.start().unwrap();
    assert!(cl.stop().is_err());
    assert_eq!(cl.phase(), LifecyclePhase::Stopped);
}

#[test]
fn device_reached_twice_reports_invalid_state() {
    let mut drive = {
        let tree = Arc::new(ParameterTree::new());
        let root = ecm_control_loop::params::BindingScope::root(tree, "root");
        let handle = DeviceHandle::new(DeviceKind::Drive, 0);
        Drive::new(DeviceContext {
            handle,
            scope: root.child(&handle.module_name()),
        })
    };
    drive.init_phase1().unwrap();
    assert!(matches!(drive.init_phase1(), Err(DeviceError::InvalidState(_))));
    assert!(matches!(drive.start(), Err(DeviceError::InvalidState(_))));
}
