//! Integration test: command demultiplexing and feedback multiplexing.

use ecm_common::consts::{
    IO_CHANNELS, TOPIC_DIGITAL_INPUTS, TOPIC_DIGITAL_OUTPUTS, TOPIC_DRIVE_CONTROL,
    TOPIC_DRIVE_FEEDBACK,
};
use ecm_common::messages::{
    DigitalIoCommand, DriveCommand, DriveCommandBatch, DriveSetpoint, IoCommandBatch,
};
use ecm_control_loop::drive::DriveDevice;
use ecm_control_loop::dio::DigitalIoDevice;

use super::{Node, config};

fn batch(commands: &[DriveCommand]) -> DriveCommandBatch {
    DriveCommandBatch::from_slice(commands).expect("batch fits")
}

#[test]
fn batch_applied_before_update() {
    let mut node = Node::operating(&config(2, 1));
    node.bus
        .send_drive_commands(batch(&[DriveCommand::new(1, 2), DriveCommand::new(3, 4)]));

    let report = node.tick();
    assert_eq!(report.drive_commands_applied, 2);

    assert_eq!(node.cl.drive(0).unwrap().drive_command(), DriveCommand::new(1, 2));
    assert_eq!(node.cl.drive(1).unwrap().drive_command(), DriveCommand::new(3, 4));

    // Mirrored in the same cycle.
    assert_eq!(node.tree.get::<u16>("root/controlword", 0).unwrap(), 1);
    assert_eq!(node.tree.get::<i8>("root/opmode", 0).unwrap(), 2);
    assert_eq!(node.tree.get::<u16>("root/controlword", 1).unwrap(), 3);
    assert_eq!(node.tree.get::<i8>("root/opmode", 1).unwrap(), 4);
}

#[test]
fn setpoints_reach_output_bindings() {
    let mut node = Node::operating(&config(1, 0));
    let command = DriveCommand {
        control_word: 0x000F,
        op_mode: 8,
        setpoint: DriveSetpoint {
            target_position: 12_345,
            target_velocity: -50,
            target_torque: 7,
        },
    };
    node.bus.send_drive_commands(batch(&[command]));
    node.tick();

    assert_eq!(node.tree.get::<i32>("root/axis1/targetPosition", 0).unwrap(), 12_345);
    assert_eq!(node.tree.get::<i32>("root/axis1/targetVelocity", 0).unwrap(), -50);
    assert_eq!(node.tree.get::<i32>("root/axis1/targetTorque", 0).unwrap(), 7);
}

#[test]
fn shorter_batch_keeps_previous_commands() {
    let mut node = Node::operating(&config(3, 0));
    node.bus.send_drive_commands(batch(&[
        DriveCommand::new(0x06, 1),
        DriveCommand::new(0x07, 3),
        DriveCommand::new(0x0F, 8),
    ]));
    node.tick();

    node.bus.send_drive_commands(batch(&[DriveCommand::new(0x80, 9)]));
    let report = node.tick();
    assert_eq!(report.drive_commands_applied, 1);

    assert_eq!(node.cl.drive(0).unwrap().control_word(), 0x80);
    assert_eq!(node.cl.drive(1).unwrap().control_word(), 0x07);
    assert_eq!(node.cl.drive(2).unwrap().control_word(), 0x0F);
    assert_eq!(node.cl.drive(2).unwrap().op_mode(), 8);
}

#[test]
fn longer_batch_truncated_to_pool() {
    let mut node = Node::operating(&config(2, 0));
    node.bus.send_drive_commands(batch(&[
        DriveCommand::new(1, 1),
        DriveCommand::new(2, 2),
        DriveCommand::new(3, 3),
    ]));
    let report = node.tick();
    assert_eq!(report.drive_commands_applied, 2);
    assert_eq!(node.cl.drive(1).unwrap().control_word(), 2);
}

#[test]
fn no_new_batch_keeps_commands() {
    let mut node = Node::operating(&config(1, 0));
    node.bus.send_drive_commands(batch(&[DriveCommand::new(0x0F, 8)]));
    node.tick();
    let report = node.tick();
    assert_eq!(report.drive_commands_applied, 0);
    assert_eq!(node.cl.drive(0).unwrap().control_word(), 0x0F);
}

#[test]
fn only_newest_batch_applied() {
    let mut node = Node::operating(&config(1, 0));
    node.bus.send_drive_commands(batch(&[DriveCommand::new(1, 1)]));
    node.bus.send_drive_commands(batch(&[DriveCommand::new(2, 2)]));
    node.tick();
    assert_eq!(node.cl.drive(0).unwrap().control_word(), 2);
    assert!(!node.bus.drive_commands_pending());
}

#[test]
fn feedback_published_every_cycle_in_pool_order() {
    let mut node = Node::operating(&config(3, 0));
    for i in 0..3 {
        let path = format!("root/axis{}/positionValue", i + 1);
        node.tree.set(&path, 0, 100 * i as i32).unwrap();
    }
    node.tree.set("root/statusword", 1, 0x0237u16).unwrap();

    for cycle in 1..=3u64 {
        node.tick();
        assert_eq!(node.bus.drive_feedback_published(), cycle);
        let fb = node.bus.take_drive_feedback().expect("feedback published");
        assert_eq!(fb.len(), 3);
        for (i, record) in fb.iter().enumerate() {
            assert_eq!(record.position_value, 100 * i as i32);
        }
        assert_eq!(fb[1].status_word, 0x0237);
        assert!(fb[1].drive_enabled);
        assert!(!fb[0].drive_enabled);
    }
}

#[test]
fn bus_inputs_flow_into_feedback() {
    let mut node = Node::operating(&config(1, 0));
    let t = &node.tree;
    t.set("root/axis1/driveErrorCode", 0, 0x7500u16).unwrap();
    t.set("root/axis1/slaveTimestamp", 0, 42u32).unwrap();
    t.set("root/axis1/velocityValue", 0, -3i32).unwrap();
    t.set("root/axis1/analogInput2", 0, 1.5f64).unwrap();
    t.set("root/axis1/digitalInput4", 0, true).unwrap();

    node.tick();
    let fb = node.bus.take_drive_feedback().unwrap();
    assert_eq!(fb[0].error_code, 0x7500);
    assert_eq!(fb[0].slave_timestamp, 42);
    assert_eq!(fb[0].velocity_value, -3);
    assert_eq!(fb[0].analog_inputs, [0.0, 1.5, 0.0, 0.0]);
    assert_eq!(fb[0].digital_inputs, [false, false, false, true]);
}

#[test]
fn empty_drive_pool_still_publishes() {
    let mut node = Node::operating(&config(0, 0));
    node.tick();
    let fb = node.bus.take_drive_feedback().expect("empty batch published");
    assert!(fb.is_empty());
}

#[test]
fn io_channels_absent_without_modules() {
    let mut node = Node::operating(&config(2, 0));
    assert!(!node.cl.has_io_channels());
    assert_eq!(
        node.bus.open_topics(),
        vec![TOPIC_DRIVE_CONTROL.to_string(), TOPIC_DRIVE_FEEDBACK.to_string()]
    );

    node.bus.send_io_commands(IoCommandBatch::new());
    let report = node.tick();
    assert_eq!(report.io_commands_applied, 0);
    assert_eq!(node.bus.io_feedback_published(), 0);
    assert!(node.bus.take_io_feedback().is_none());
}

#[test]
fn topics_opened_in_order_with_modules() {
    let node = Node::created(&config(1, 2));
    assert_eq!(
        node.bus.open_topics(),
        vec![
            TOPIC_DRIVE_CONTROL.to_string(),
            TOPIC_DIGITAL_OUTPUTS.to_string(),
            TOPIC_DRIVE_FEEDBACK.to_string(),
            TOPIC_DIGITAL_INPUTS.to_string(),
        ]
    );
}

#[test]
fn digital_io_round_trip() {
    let mut node = Node::operating(&config(1, 2));
    let mut outputs = [false; IO_CHANNELS];
    outputs[0] = true;
    outputs[7] = true;
    let commands = IoCommandBatch::from_slice(&[DigitalIoCommand {
        digital_outputs: outputs,
    }])
    .unwrap();
    node.bus.send_io_commands(commands);
    node.tree.set("root/device2/digitalInput3", 0, true).unwrap();

    let report = node.tick();
    assert_eq!(report.io_commands_applied, 1);
    assert_eq!(node.cl.io(0).unwrap().digital_outputs().digital_outputs, outputs);
    assert!(node.tree.get::<bool>("root/device1/digitalOutput8", 0).unwrap());

    let fb = node.bus.take_io_feedback().expect("io feedback published");
    assert_eq!(fb.len(), 2);
    assert_eq!(fb[0].digital_outputs, outputs);
    assert_eq!(fb[1].digital_outputs, [false; IO_CHANNELS]);
    assert!(fb[1].digital_inputs[2]);
    assert_eq!(node.bus.io_feedback_published(), 1);
}
